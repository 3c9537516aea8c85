//! XSD validation for XML response bodies
//!
//! Supports the subset of XML Schema that record-style API payloads use:
//! global and local element declarations, named and anonymous complex
//! types, `sequence` / `choice` / `all` compositors with occurrence
//! bounds, element references, `nillable`, builtin simple types,
//! simple-type restrictions (enumeration, length and inclusive bounds) and
//! local attribute declarations with `use`, `fixed` and `anyAttribute`.
//! Anything outside the subset is rejected when the schema is loaded, so a
//! schema is either fully understood or not used at all.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::schema::SchemaIssue;
use crate::xml::{self, XmlElement};

const XS_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";

#[derive(Debug, thiserror::Error)]
pub enum XsdError {
    #[error("cannot open {}: {reason}", .path.display())]
    Missing { path: PathBuf, reason: String },
    #[error("invalid XSD {}: {reason}", .path.display())]
    Invalid { path: PathBuf, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Builtin {
    String,
    Boolean,
    Int,
    Integer,
    Long,
    Short,
    Byte,
    NonNegativeInteger,
    PositiveInteger,
    UnsignedInt,
    Decimal,
    Float,
    Double,
    Date,
    DateTime,
}

impl Builtin {
    fn from_local(name: &str) -> Option<Self> {
        Some(match name {
            "string" | "normalizedString" | "token" | "anyURI" => Self::String,
            "boolean" => Self::Boolean,
            "int" => Self::Int,
            "integer" => Self::Integer,
            "long" => Self::Long,
            "short" => Self::Short,
            "byte" => Self::Byte,
            "nonNegativeInteger" => Self::NonNegativeInteger,
            "positiveInteger" => Self::PositiveInteger,
            "unsignedInt" => Self::UnsignedInt,
            "decimal" => Self::Decimal,
            "float" => Self::Float,
            "double" => Self::Double,
            "date" => Self::Date,
            "dateTime" => Self::DateTime,
            _ => return None,
        })
    }

    const fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Int => "int",
            Self::Integer => "integer",
            Self::Long => "long",
            Self::Short => "short",
            Self::Byte => "byte",
            Self::NonNegativeInteger => "nonNegativeInteger",
            Self::PositiveInteger => "positiveInteger",
            Self::UnsignedInt => "unsignedInt",
            Self::Decimal => "decimal",
            Self::Float => "float",
            Self::Double => "double",
            Self::Date => "date",
            Self::DateTime => "dateTime",
        }
    }

    fn accepts(self, raw: &str) -> bool {
        let v = raw.trim();
        match self {
            Self::String => true,
            Self::Boolean => matches!(v, "true" | "false" | "1" | "0"),
            Self::Int => v.parse::<i32>().is_ok(),
            Self::Integer => v.parse::<i128>().is_ok(),
            Self::Long => v.parse::<i64>().is_ok(),
            Self::Short => v.parse::<i16>().is_ok(),
            Self::Byte => v.parse::<i8>().is_ok(),
            Self::NonNegativeInteger => v.parse::<u128>().is_ok(),
            Self::PositiveInteger => v.parse::<u128>().is_ok_and(|n| n > 0),
            Self::UnsignedInt => v.parse::<u32>().is_ok(),
            Self::Decimal => {
                !v.is_empty()
                    && v.chars().any(|c| c.is_ascii_digit())
                    && v.chars()
                        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+'))
                    && v.parse::<f64>().is_ok()
            }
            Self::Float | Self::Double => {
                matches!(v, "INF" | "-INF" | "NaN")
                    || (v.chars().any(|c| c.is_ascii_digit()) && v.parse::<f64>().is_ok())
            }
            Self::Date => is_date(v),
            Self::DateTime => v
                .split_once('T')
                .is_some_and(|(date, time)| is_plain_date(date) && is_time(time)),
        }
    }
}

fn is_plain_date(s: &str) -> bool {
    let b = s.as_bytes();
    if b.len() != 10 || b[4] != b'-' || b[7] != b'-' {
        return false;
    }
    let digits = |r: std::ops::Range<usize>| b[r].iter().all(u8::is_ascii_digit);
    if !(digits(0..4) && digits(5..7) && digits(8..10)) {
        return false;
    }
    let month: u32 = s[5..7].parse().unwrap_or(0);
    let day: u32 = s[8..10].parse().unwrap_or(0);
    (1..=12).contains(&month) && (1..=31).contains(&day)
}

fn is_timezone(s: &str) -> bool {
    if s.is_empty() || s == "Z" {
        return true;
    }
    let b = s.as_bytes();
    b.len() == 6
        && matches!(b[0], b'+' | b'-')
        && b[3] == b':'
        && [1, 2, 4, 5].iter().all(|&i| b[i].is_ascii_digit())
}

fn is_date(s: &str) -> bool {
    s.len() >= 10 && s.is_char_boundary(10) && is_plain_date(&s[..10]) && is_timezone(&s[10..])
}

fn is_time(s: &str) -> bool {
    let b = s.as_bytes();
    if b.len() < 8 || b[2] != b':' || b[5] != b':' {
        return false;
    }
    if ![0, 1, 3, 4, 6, 7].iter().all(|&i| b[i].is_ascii_digit()) {
        return false;
    }
    let mut rest = &s[8..];
    if let Some(frac) = rest.strip_prefix('.') {
        let digits = frac.chars().take_while(char::is_ascii_digit).count();
        if digits == 0 {
            return false;
        }
        rest = &frac[digits..];
    }
    is_timezone(rest)
}

#[derive(Debug, Clone, PartialEq)]
enum Facet {
    Enumeration(Vec<String>),
    MinLength(usize),
    MaxLength(usize),
    MinInclusive(f64),
    MaxInclusive(f64),
}

#[derive(Debug, Clone, PartialEq)]
struct SimpleType {
    base: Builtin,
    facets: Vec<Facet>,
}

impl SimpleType {
    const fn builtin(base: Builtin) -> Self {
        Self {
            base,
            facets: Vec::new(),
        }
    }

    fn check(&self, text: &str) -> Result<(), String> {
        if !self.base.accepts(text) {
            return Err(format!("'{text}' is not a valid {}", self.base.name()));
        }
        let numeric = || text.trim().parse::<f64>().ok();
        for facet in &self.facets {
            let ok = match facet {
                Facet::Enumeration(values) => values.iter().any(|v| v == text),
                Facet::MinLength(n) => text.chars().count() >= *n,
                Facet::MaxLength(n) => text.chars().count() <= *n,
                Facet::MinInclusive(min) => numeric().is_some_and(|v| v >= *min),
                Facet::MaxInclusive(max) => numeric().is_some_and(|v| v <= *max),
            };
            if !ok {
                return Err(format!("'{text}' violates {facet:?}"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Occurs {
    min: u32,
    /// `None` = unbounded
    max: Option<u32>,
}

impl Occurs {
    const ONCE: Self = Self {
        min: 1,
        max: Some(1),
    };

    fn allows_more(self, count: u32) -> bool {
        self.max.is_none_or(|m| count < m)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TypeDef {
    /// `xs:anyType` or an element without a type
    Any,
    Simple(SimpleType),
    Complex(ComplexType),
}

#[derive(Debug, Clone, PartialEq)]
enum TypeRef {
    Inline(Box<TypeDef>),
    /// Named type declared in this schema
    Named(String),
    /// Type of the global element with this name (`ref=`)
    OfElement(String),
}

#[derive(Debug, Clone, PartialEq)]
struct ComplexType {
    particle: Option<Particle>,
    mixed: bool,
    attributes: Vec<AttributeDecl>,
    /// `xs:anyAttribute`: undeclared attributes are accepted
    any_attribute: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct AttributeDecl {
    name: String,
    /// Always resolves to a simple type
    ty: TypeRef,
    required: bool,
    fixed: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
struct ElementDecl {
    name: String,
    ty: TypeRef,
    nillable: bool,
    occurs: Occurs,
}

#[derive(Debug, Clone, PartialEq)]
enum Particle {
    Element(ElementDecl),
    Sequence(Vec<Particle>, Occurs),
    Choice(Vec<Particle>, Occurs),
    All(Vec<ElementDecl>, Occurs),
}

/// A loaded XSD document.
#[derive(Debug, Clone)]
pub struct XsdSchema {
    elements: HashMap<String, ElementDecl>,
    types: HashMap<String, TypeDef>,
}

/// Reads the schema document; knows which prefixes denote the XSD namespace.
struct SchemaReader {
    xs_prefixes: Vec<String>,
}

impl SchemaReader {
    fn is_xs(&self, el: &XmlElement, local: &str) -> bool {
        let prefix = el.name.split_once(':').map_or("", |(p, _)| p);
        el.local_name() == local && self.xs_prefixes.iter().any(|p| p == prefix)
    }

    fn is_annotation(&self, el: &XmlElement) -> bool {
        self.is_xs(el, "annotation")
    }

    fn type_ref(&self, qname: &str) -> Result<TypeRef, String> {
        let (prefix, local) = qname.split_once(':').unwrap_or(("", qname));
        if self.xs_prefixes.iter().any(|p| p == prefix) {
            if local == "anyType" {
                return Ok(TypeRef::Inline(Box::new(TypeDef::Any)));
            }
            return Builtin::from_local(local)
                .map(|b| TypeRef::Inline(Box::new(TypeDef::Simple(SimpleType::builtin(b)))))
                .ok_or_else(|| format!("unsupported builtin type '{qname}'"));
        }
        Ok(TypeRef::Named(local.to_string()))
    }

    fn occurs(el: &XmlElement) -> Result<Occurs, String> {
        let min = match el.attribute("minOccurs") {
            Some(v) => v
                .parse()
                .map_err(|_| format!("invalid minOccurs '{v}'"))?,
            None => 1,
        };
        let max = match el.attribute("maxOccurs") {
            Some("unbounded") => None,
            Some(v) => Some(v.parse().map_err(|_| format!("invalid maxOccurs '{v}'"))?),
            None => Some(1),
        };
        if max.is_some_and(|m| m < min) {
            return Err(format!("maxOccurs below minOccurs on <{}>", el.name));
        }
        Ok(Occurs { min, max })
    }

    fn element(&self, el: &XmlElement, global: bool) -> Result<ElementDecl, String> {
        let occurs = if global { Occurs::ONCE } else { Self::occurs(el)? };

        if let Some(reference) = el.attribute("ref") {
            if global {
                return Err("global element cannot use ref".into());
            }
            let name = reference.rsplit(':').next().unwrap_or(reference).to_string();
            return Ok(ElementDecl {
                ty: TypeRef::OfElement(name.clone()),
                name,
                nillable: false,
                occurs,
            });
        }

        let name = el
            .attribute("name")
            .ok_or_else(|| "element declaration without name".to_string())?
            .to_string();
        let nillable = matches!(el.attribute("nillable"), Some("true" | "1"));

        let mut inline = None;
        for child in &el.children {
            if self.is_annotation(child) {
                continue;
            }
            let def = if self.is_xs(child, "complexType") {
                TypeDef::Complex(self.complex_type(child)?)
            } else if self.is_xs(child, "simpleType") {
                TypeDef::Simple(self.simple_type(child)?)
            } else {
                return Err(format!("unsupported <{}> in element '{name}'", child.name));
            };
            if inline.replace(def).is_some() {
                return Err(format!("element '{name}' declares more than one type"));
            }
        }

        let ty = match (el.attribute("type"), inline) {
            (Some(_), Some(_)) => {
                return Err(format!("element '{name}' has both type= and an inline type"));
            }
            (Some(qname), None) => self.type_ref(qname)?,
            (None, Some(def)) => TypeRef::Inline(Box::new(def)),
            (None, None) => TypeRef::Inline(Box::new(TypeDef::Any)),
        };

        Ok(ElementDecl {
            name,
            ty,
            nillable,
            occurs,
        })
    }

    fn complex_type(&self, el: &XmlElement) -> Result<ComplexType, String> {
        let mixed = matches!(el.attribute("mixed"), Some("true" | "1"));
        let mut particle = None;
        let mut attributes: Vec<AttributeDecl> = Vec::new();
        let mut any_attribute = false;
        for child in &el.children {
            if self.is_annotation(child) {
                continue;
            }
            if self.is_xs(child, "attribute") {
                if let Some(decl) = self.attribute(child)? {
                    if attributes.iter().any(|a| a.name == decl.name) {
                        return Err(format!("attribute '{}' declared twice", decl.name));
                    }
                    attributes.push(decl);
                }
                continue;
            }
            if self.is_xs(child, "anyAttribute") {
                any_attribute = true;
                continue;
            }
            if self.is_xs(child, "attributeGroup") {
                return Err(format!("unsupported <{}>", child.name));
            }
            let p = self.particle(child)?;
            if particle.replace(p).is_some() {
                return Err("complexType with more than one content model".into());
            }
        }
        Ok(ComplexType {
            particle,
            mixed,
            attributes,
            any_attribute,
        })
    }

    /// `None` for a prohibited attribute.
    fn attribute(&self, el: &XmlElement) -> Result<Option<AttributeDecl>, String> {
        if el.attribute("ref").is_some() {
            return Err(format!("unsupported attribute reference <{}>", el.name));
        }
        let name = el
            .attribute("name")
            .ok_or_else(|| "attribute declaration without name".to_string())?
            .to_string();

        let mut inline = None;
        for child in &el.children {
            if self.is_annotation(child) {
                continue;
            }
            if !self.is_xs(child, "simpleType") {
                return Err(format!("unsupported <{}> in attribute '{name}'", child.name));
            }
            if inline.replace(self.simple_type(child)?).is_some() {
                return Err(format!("attribute '{name}' declares more than one type"));
            }
        }
        let ty = match (el.attribute("type"), inline) {
            (Some(_), Some(_)) => {
                return Err(format!("attribute '{name}' has both type= and an inline type"));
            }
            (Some(qname), None) => self.type_ref(qname)?,
            (None, inline) => {
                let st = inline.unwrap_or(SimpleType::builtin(Builtin::String));
                TypeRef::Inline(Box::new(TypeDef::Simple(st)))
            }
        };

        let required = match el.attribute("use") {
            None | Some("optional") => false,
            Some("required") => true,
            Some("prohibited") => return Ok(None),
            Some(other) => return Err(format!("invalid use '{other}' on attribute '{name}'")),
        };
        Ok(Some(AttributeDecl {
            name,
            ty,
            required,
            fixed: el.attribute("fixed").map(str::to_string),
        }))
    }

    fn particle(&self, el: &XmlElement) -> Result<Particle, String> {
        if self.is_xs(el, "element") {
            return self.element(el, false).map(Particle::Element);
        }
        let occurs = Self::occurs(el)?;
        let items = el.children.iter().filter(|c| !self.is_annotation(c));
        if self.is_xs(el, "sequence") {
            let parts = items.map(|c| self.particle(c)).collect::<Result<_, _>>()?;
            Ok(Particle::Sequence(parts, occurs))
        } else if self.is_xs(el, "choice") {
            let parts = items.map(|c| self.particle(c)).collect::<Result<_, _>>()?;
            Ok(Particle::Choice(parts, occurs))
        } else if self.is_xs(el, "all") {
            let mut decls = Vec::new();
            for c in items {
                if !self.is_xs(c, "element") {
                    return Err(format!("only elements are allowed in xs:all, found <{}>", c.name));
                }
                decls.push(self.element(c, false)?);
            }
            Ok(Particle::All(decls, occurs))
        } else {
            Err(format!("unsupported content model <{}>", el.name))
        }
    }

    fn simple_type(&self, el: &XmlElement) -> Result<SimpleType, String> {
        let restriction = el
            .children
            .iter()
            .find(|c| self.is_xs(c, "restriction"))
            .ok_or_else(|| "simpleType without restriction is not supported".to_string())?;
        let base_name = restriction
            .attribute("base")
            .ok_or_else(|| "restriction without base".to_string())?;
        let base = match self.type_ref(base_name)? {
            TypeRef::Inline(def) => match *def {
                TypeDef::Simple(st) => st.base,
                _ => return Err(format!("restriction base '{base_name}' is not simple")),
            },
            _ => {
                return Err(format!(
                    "restriction base '{base_name}' must be a builtin type"
                ));
            }
        };

        let mut facets = Vec::new();
        let mut enumeration = Vec::new();
        for f in &restriction.children {
            if self.is_annotation(f) {
                continue;
            }
            let value = f.attribute("value").unwrap_or("");
            let number = || {
                value
                    .parse::<f64>()
                    .map_err(|_| format!("invalid facet value '{value}'"))
            };
            let length = || {
                value
                    .parse::<usize>()
                    .map_err(|_| format!("invalid facet value '{value}'"))
            };
            match f.local_name() {
                "enumeration" => enumeration.push(value.to_string()),
                "minLength" => facets.push(Facet::MinLength(length()?)),
                "maxLength" => facets.push(Facet::MaxLength(length()?)),
                "length" => {
                    let n = length()?;
                    facets.push(Facet::MinLength(n));
                    facets.push(Facet::MaxLength(n));
                }
                "minInclusive" => facets.push(Facet::MinInclusive(number()?)),
                "maxInclusive" => facets.push(Facet::MaxInclusive(number()?)),
                other => return Err(format!("unsupported facet '{other}'")),
            }
        }
        if !enumeration.is_empty() {
            facets.push(Facet::Enumeration(enumeration));
        }
        Ok(SimpleType { base, facets })
    }
}

impl XsdSchema {
    /// Load and compile the XSD document at `path`.
    ///
    /// # Errors
    ///
    /// [`XsdError::Missing`] if the file cannot be read,
    /// [`XsdError::Invalid`] if it is not a usable schema.
    pub fn load(path: &Path) -> Result<Self, XsdError> {
        let text = std::fs::read_to_string(path).map_err(|e| XsdError::Missing {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::parse(&text).map_err(|reason| XsdError::Invalid {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Compile a schema from its text.
    ///
    /// # Errors
    ///
    /// Returns a description of the first unsupported or inconsistent
    /// construct.
    pub fn parse(text: &str) -> Result<Self, String> {
        let root = xml::parse(text).map_err(|e| e.to_string())?;

        let xs_prefixes: Vec<String> = root
            .attributes
            .iter()
            .filter(|(_, v)| v == XS_NAMESPACE)
            .filter_map(|(k, _)| {
                if k == "xmlns" {
                    Some(String::new())
                } else {
                    k.strip_prefix("xmlns:").map(str::to_string)
                }
            })
            .collect();
        if xs_prefixes.is_empty() {
            return Err(format!("root element does not bind {XS_NAMESPACE}"));
        }
        let reader = SchemaReader { xs_prefixes };
        if !reader.is_xs(&root, "schema") {
            return Err(format!("root element is <{}>, expected xs:schema", root.name));
        }

        let mut schema = Self {
            elements: HashMap::new(),
            types: HashMap::new(),
        };
        for child in &root.children {
            if reader.is_annotation(child) {
                continue;
            }
            if reader.is_xs(child, "element") {
                let decl = reader.element(child, true)?;
                schema.elements.insert(decl.name.clone(), decl);
            } else if reader.is_xs(child, "complexType") || reader.is_xs(child, "simpleType") {
                let name = child
                    .attribute("name")
                    .ok_or_else(|| format!("top-level <{}> without name", child.name))?
                    .to_string();
                let def = if child.local_name() == "complexType" {
                    TypeDef::Complex(reader.complex_type(child)?)
                } else {
                    TypeDef::Simple(reader.simple_type(child)?)
                };
                schema.types.insert(name, def);
            } else {
                return Err(format!("unsupported top-level <{}>", child.name));
            }
        }

        if schema.elements.is_empty() {
            return Err("schema declares no global elements".into());
        }
        schema.check_references()?;
        Ok(schema)
    }

    fn check_references(&self) -> Result<(), String> {
        for decl in self.elements.values() {
            self.check_decl(decl)?;
        }
        for def in self.types.values() {
            self.check_def(def)?;
        }
        Ok(())
    }

    fn check_decl(&self, decl: &ElementDecl) -> Result<(), String> {
        match &decl.ty {
            TypeRef::Inline(def) => self.check_def(def),
            TypeRef::Named(name) if self.types.contains_key(name) => Ok(()),
            TypeRef::Named(name) => Err(format!("unknown type '{name}'")),
            TypeRef::OfElement(name) if self.elements.contains_key(name) => Ok(()),
            TypeRef::OfElement(name) => Err(format!("unknown element reference '{name}'")),
        }
    }

    fn check_def(&self, def: &TypeDef) -> Result<(), String> {
        let TypeDef::Complex(ct) = def else {
            return Ok(());
        };
        for attr in &ct.attributes {
            match self.resolve(&attr.ty) {
                Some(TypeDef::Simple(_)) => {}
                Some(_) => {
                    return Err(format!("attribute '{}' must have a simple type", attr.name));
                }
                None => return Err(format!("unknown type for attribute '{}'", attr.name)),
            }
        }
        ct.particle
            .as_ref()
            .map_or(Ok(()), |p| self.check_particle(p))
    }

    fn check_particle(&self, particle: &Particle) -> Result<(), String> {
        match particle {
            Particle::Element(decl) => self.check_decl(decl),
            Particle::Sequence(items, _) | Particle::Choice(items, _) => {
                items.iter().try_for_each(|p| self.check_particle(p))
            }
            Particle::All(decls, _) => decls.iter().try_for_each(|d| self.check_decl(d)),
        }
    }

    fn resolve<'a>(&'a self, ty: &'a TypeRef) -> Option<&'a TypeDef> {
        match ty {
            TypeRef::Inline(def) => Some(def),
            TypeRef::Named(name) => self.types.get(name),
            TypeRef::OfElement(name) => self.elements.get(name).and_then(|d| self.resolve(&d.ty)),
        }
    }

    /// Validate a parsed document, returning one issue per violation.
    #[must_use]
    pub fn validate(&self, root: &XmlElement) -> Vec<SchemaIssue> {
        let mut errors = Vec::new();
        let path = format!("/{}", root.name);
        match self.elements.get(root.local_name()) {
            Some(decl) => self.validate_element(root, decl, &path, &mut errors),
            None => errors.push(format!("{path}: root element is not declared in the schema")),
        }
        // Messages are "<path>: <problem>"; element paths never contain ": ".
        errors
            .into_iter()
            .map(|e| match e.split_once(": ") {
                Some((path, message)) => SchemaIssue::violation(path, message),
                None => SchemaIssue::violation(&path, e),
            })
            .collect()
    }

    fn validate_element(
        &self,
        el: &XmlElement,
        decl: &ElementDecl,
        path: &str,
        errors: &mut Vec<String>,
    ) {
        let Some(def) = self.resolve(&decl.ty) else {
            errors.push(format!("{path}: unresolved type"));
            return;
        };
        self.validate_attributes(el, def, path, errors);

        let nil = el
            .attributes
            .iter()
            .any(|(k, v)| {
                k.rsplit(':').next() == Some("nil") && matches!(v.as_str(), "true" | "1")
            });
        if nil {
            if !decl.nillable {
                errors.push(format!("{path}: element is not nillable"));
            } else if !el.children.is_empty() || !el.text_or_empty().is_empty() {
                errors.push(format!("{path}: nil element must be empty"));
            }
            return;
        }

        match def {
            TypeDef::Any => {}
            TypeDef::Simple(st) => {
                if let Some(child) = el.children.first() {
                    errors.push(format!(
                        "{path}: simple content expected, found element <{}>",
                        child.name
                    ));
                } else if let Err(e) = st.check(el.text_or_empty()) {
                    errors.push(format!("{path}: {e}"));
                }
            }
            TypeDef::Complex(ct) => {
                if !ct.mixed && el.text.as_deref().is_some_and(|t| !t.trim().is_empty()) {
                    errors.push(format!("{path}: text content is not allowed"));
                }
                let end = match &ct.particle {
                    None => 0,
                    Some(p) => match self.match_particle(p, &el.children, 0, path, errors) {
                        Ok(end) => end,
                        Err(e) => {
                            errors.push(format!("{path}: {e}"));
                            return;
                        }
                    },
                };
                if let Some(extra) = el.children.get(end) {
                    errors.push(format!("{path}: unexpected element <{}>", extra.name));
                }
            }
        }
    }

    fn validate_attributes(
        &self,
        el: &XmlElement,
        def: &TypeDef,
        path: &str,
        errors: &mut Vec<String>,
    ) {
        let (declared, open): (&[AttributeDecl], bool) = match def {
            TypeDef::Any => return,
            TypeDef::Simple(_) => (&[][..], false),
            TypeDef::Complex(ct) => (ct.attributes.as_slice(), ct.any_attribute),
        };

        for decl in declared {
            let Some(value) = el.attribute(&decl.name) else {
                if decl.required {
                    errors.push(format!("{path}: missing required attribute '{}'", decl.name));
                }
                continue;
            };
            let attr_path = format!("{path}/@{}", decl.name);
            if let Some(TypeDef::Simple(st)) = self.resolve(&decl.ty) {
                if let Err(e) = st.check(value) {
                    errors.push(format!("{attr_path}: {e}"));
                    continue;
                }
            }
            if let Some(fixed) = &decl.fixed {
                if value != fixed {
                    errors.push(format!("{attr_path}: '{value}' differs from fixed '{fixed}'"));
                }
            }
        }

        if open {
            return;
        }
        for (key, _) in &el.attributes {
            if !is_instance_meta(key) && !declared.iter().any(|d| &d.name == key) {
                errors.push(format!("{path}: attribute '{key}' is not allowed"));
            }
        }
    }

    /// Consume children starting at `pos`; returns the position after the
    /// match. Content errors of consumed children go to `errors`.
    fn match_particle(
        &self,
        particle: &Particle,
        children: &[XmlElement],
        pos: usize,
        path: &str,
        errors: &mut Vec<String>,
    ) -> Result<usize, String> {
        match particle {
            Particle::Element(decl) => self.match_element(decl, children, pos, path, errors),
            Particle::Sequence(items, occurs) => {
                self.repeat(*occurs, pos, errors, |start, scratch| {
                    items.iter().try_fold(start, |at, item| {
                        self.match_particle(item, children, at, path, scratch)
                    })
                })
            }
            Particle::Choice(alternatives, occurs) => {
                self.repeat(*occurs, pos, errors, |start, scratch| {
                    let mut empty_match = None;
                    for alt in alternatives {
                        let mut attempt = Vec::new();
                        let matched = self.match_particle(alt, children, start, path, &mut attempt);
                        if let Ok(end) = matched {
                            if end > start {
                                scratch.extend(attempt);
                                return Ok(end);
                            }
                            empty_match.get_or_insert(end);
                        }
                    }
                    empty_match.ok_or_else(|| {
                        let names: Vec<String> =
                            alternatives.iter().map(Self::first_name).collect();
                        match children.get(start) {
                            Some(c) => format!(
                                "expected one of {}, found <{}>",
                                names.join(", "),
                                c.name
                            ),
                            None => format!("expected one of {}", names.join(", ")),
                        }
                    })
                })
            }
            Particle::All(decls, occurs) => {
                let mut counts = vec![0u32; decls.len()];
                let mut at = pos;
                while let Some(child) = children.get(at) {
                    let Some(i) = decls.iter().position(|d| d.name == child.local_name()) else {
                        break;
                    };
                    if !decls[i].occurs.allows_more(counts[i]) {
                        break;
                    }
                    self.validate_element(child, &decls[i], &child_path(path, child, at), errors);
                    counts[i] += 1;
                    at += 1;
                }
                if at == pos && occurs.min == 0 {
                    return Ok(pos);
                }
                for (decl, count) in decls.iter().zip(&counts) {
                    if *count < decl.occurs.min {
                        return Err(format!("missing required element <{}>", decl.name));
                    }
                }
                Ok(at)
            }
        }
    }

    /// Apply a group's occurrence bounds to one-repetition matcher `once`.
    ///
    /// Errors of a repetition that fails are discarded; a repetition that
    /// consumes nothing ends the loop.
    fn repeat<F>(
        &self,
        occurs: Occurs,
        pos: usize,
        errors: &mut Vec<String>,
        once: F,
    ) -> Result<usize, String>
    where
        F: Fn(usize, &mut Vec<String>) -> Result<usize, String>,
    {
        let mut at = pos;
        let mut count = 0;
        while occurs.allows_more(count) {
            let mut scratch = Vec::new();
            match once(at, &mut scratch) {
                Ok(end) => {
                    errors.extend(scratch);
                    count += 1;
                    if end == at {
                        break;
                    }
                    at = end;
                }
                Err(e) if count < occurs.min => return Err(e),
                Err(_) => break,
            }
        }
        Ok(at)
    }

    fn match_element(
        &self,
        decl: &ElementDecl,
        children: &[XmlElement],
        pos: usize,
        path: &str,
        errors: &mut Vec<String>,
    ) -> Result<usize, String> {
        let mut at = pos;
        let mut count = 0;
        while decl.occurs.allows_more(count) {
            match children.get(at) {
                Some(child) if child.local_name() == decl.name => {
                    self.validate_element(child, decl, &child_path(path, child, at), errors);
                    at += 1;
                    count += 1;
                }
                _ => break,
            }
        }
        if count < decl.occurs.min {
            return Err(match children.get(at) {
                Some(c) => format!("expected element <{}>, found <{}>", decl.name, c.name),
                None => format!("missing required element <{}>", decl.name),
            });
        }
        Ok(at)
    }

    fn first_name(particle: &Particle) -> String {
        match particle {
            Particle::Element(d) => format!("<{}>", d.name),
            Particle::Sequence(items, _) | Particle::Choice(items, _) => items
                .first()
                .map_or_else(|| "(empty group)".to_string(), Self::first_name),
            Particle::All(decls, _) => decls
                .first()
                .map_or_else(|| "(empty group)".to_string(), |d| format!("<{}>", d.name)),
        }
    }
}

/// Namespace declarations and `xsi:` attributes are never declared in a schema.
fn is_instance_meta(key: &str) -> bool {
    key == "xmlns"
        || key.starts_with("xmlns:")
        || key.split_once(':').is_some_and(|(_, local)| {
            matches!(local, "nil" | "type" | "schemaLocation" | "noNamespaceSchemaLocation")
        })
}

fn child_path(parent: &str, child: &XmlElement, index: usize) -> String {
    format!("{parent}/{}[{}]", child.name, index + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TODOS_XSD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="todos">
    <xs:complexType>
      <xs:sequence>
        <xs:element ref="todo" minOccurs="0" maxOccurs="unbounded"/>
      </xs:sequence>
    </xs:complexType>
  </xs:element>
  <xs:element name="todo" type="todoType"/>
  <xs:complexType name="todoType">
    <xs:all>
      <xs:element name="id" type="xs:integer"/>
      <xs:element name="title" type="xs:string"/>
      <xs:element name="description" type="xs:string" minOccurs="0" nillable="true"/>
      <xs:element name="doneStatus" type="xs:boolean"/>
    </xs:all>
  </xs:complexType>
</xs:schema>"#;

    fn todos() -> XsdSchema {
        XsdSchema::parse(TODOS_XSD).unwrap()
    }

    fn check(schema: &XsdSchema, doc: &str) -> Vec<String> {
        schema
            .validate(&xml::parse(doc).unwrap())
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn valid_document_passes() {
        let errors = check(
            &todos(),
            "<todos><todo><doneStatus>false</doneStatus><description/><id>1</id><title>a</title></todo>\
             <todo><id>2</id><title>b</title><doneStatus>true</doneStatus></todo></todos>",
        );
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn empty_collection_passes() {
        assert!(check(&todos(), "<todos/>").is_empty());
    }

    #[test]
    fn single_record_root_passes() {
        let errors = check(
            &todos(),
            "<todo><id>2</id><title>b</title><doneStatus>true</doneStatus></todo>",
        );
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn wrong_simple_type_is_reported() {
        let errors = check(
            &todos(),
            "<todos><todo><id>x</id><title>a</title><doneStatus>true</doneStatus></todo></todos>",
        );
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("/todos/todo[1]/id[1]"), "{errors:?}");
        assert!(errors[0].contains("not a valid integer"));
    }

    #[test]
    fn missing_required_element_is_reported() {
        let errors = check(
            &todos(),
            "<todos><todo><id>1</id><doneStatus>true</doneStatus></todo></todos>",
        );
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("missing required element <title>"));
    }

    #[test]
    fn unknown_element_is_reported() {
        let errors = check(
            &todos(),
            "<todos><todo><id>1</id><title>a</title><doneStatus>true</doneStatus><priority>1</priority></todo></todos>",
        );
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("unexpected element <priority>"));
    }

    #[test]
    fn duplicate_element_in_all_is_reported() {
        let errors = check(
            &todos(),
            "<todos><todo><id>1</id><id>2</id><title>a</title><doneStatus>true</doneStatus></todo></todos>",
        );
        assert!(!errors.is_empty());
    }

    #[test]
    fn undeclared_root_is_reported() {
        let errors = check(&todos(), "<challenges/>");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("not declared"));
    }

    #[test]
    fn nil_requires_nillable() {
        let ok = check(
            &todos(),
            r#"<todo xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"><id>1</id><title>a</title><description xsi:nil="true"/><doneStatus>0</doneStatus></todo>"#,
        );
        assert!(ok.is_empty(), "{ok:?}");
        let bad = check(
            &todos(),
            r#"<todo xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"><id xsi:nil="true"/><title>a</title><doneStatus>0</doneStatus></todo>"#,
        );
        assert_eq!(bad.len(), 1);
    }

    #[test]
    fn sequence_enforces_order_and_bounds() {
        let schema = XsdSchema::parse(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:element name="r"><xs:complexType><xs:sequence>
                   <xs:element name="a" type="xs:int"/>
                   <xs:element name="b" type="xs:string" minOccurs="0" maxOccurs="2"/>
                 </xs:sequence></xs:complexType></xs:element>
               </xs:schema>"#,
        )
        .unwrap();
        assert!(check(&schema, "<r><a>1</a><b/><b/></r>").is_empty());
        assert!(!check(&schema, "<r><b/><a>1</a></r>").is_empty());
        assert!(!check(&schema, "<r><a>1</a><b/><b/><b/></r>").is_empty());
    }

    #[test]
    fn choice_accepts_any_alternative() {
        let schema = XsdSchema::parse(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:element name="r"><xs:complexType><xs:choice maxOccurs="unbounded">
                   <xs:element name="a" type="xs:int"/>
                   <xs:element name="b" type="xs:boolean"/>
                 </xs:choice></xs:complexType></xs:element>
               </xs:schema>"#,
        )
        .unwrap();
        assert!(check(&schema, "<r><b>true</b><a>3</a><a>4</a></r>").is_empty());
        let errors = check(&schema, "<r/>");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("expected one of <a>, <b>"));
    }

    #[test]
    fn restricted_simple_type() {
        let schema = XsdSchema::parse(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:simpleType name="state"><xs:restriction base="xs:string">
                   <xs:enumeration value="open"/><xs:enumeration value="done"/>
                 </xs:restriction></xs:simpleType>
                 <xs:element name="s" type="state"/>
               </xs:schema>"#,
        )
        .unwrap();
        assert!(check(&schema, "<s>open</s>").is_empty());
        assert_eq!(check(&schema, "<s>closed</s>").len(), 1);
    }

    #[test]
    fn unsupported_constructs_are_rejected_at_load() {
        let err = XsdSchema::parse(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:import namespace="urn:x"/>
                 <xs:element name="s" type="xs:string"/>
               </xs:schema>"#,
        )
        .unwrap_err();
        assert!(err.contains("unsupported"));
    }

    const VERSIONED_XSD: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:simpleType name="priority"><xs:restriction base="xs:string">
    <xs:enumeration value="low"/><xs:enumeration value="high"/>
  </xs:restriction></xs:simpleType>
  <xs:element name="todo">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="id" type="xs:int"/>
      </xs:sequence>
      <xs:attribute name="version" type="xs:int" use="required"/>
      <xs:attribute name="priority" type="priority"/>
      <xs:attribute name="kind" type="xs:string" fixed="task"/>
    </xs:complexType>
  </xs:element>
</xs:schema>"#;

    #[test]
    fn declared_attributes_are_validated() {
        let schema = XsdSchema::parse(VERSIONED_XSD).unwrap();
        let ok = check(
            &schema,
            r#"<todo version="2" priority="high" kind="task"><id>1</id></todo>"#,
        );
        assert!(ok.is_empty(), "{ok:?}");

        let missing = check(&schema, "<todo><id>1</id></todo>");
        assert_eq!(missing.len(), 1);
        assert!(missing[0].contains("missing required attribute 'version'"));

        let bad_int = check(&schema, r#"<todo version="abc"><id>1</id></todo>"#);
        assert_eq!(bad_int.len(), 1);
        assert!(bad_int[0].starts_with("/todo/@version"), "{bad_int:?}");
        assert!(bad_int[0].contains("not a valid int"));

        let bad_enum = check(&schema, r#"<todo version="1" priority="urgent"><id>1</id></todo>"#);
        assert_eq!(bad_enum.len(), 1);

        let bad_fixed = check(&schema, r#"<todo version="1" kind="bug"><id>1</id></todo>"#);
        assert_eq!(bad_fixed.len(), 1);
        assert!(bad_fixed[0].contains("fixed"));
    }

    #[test]
    fn undeclared_attributes_are_rejected() {
        let schema = XsdSchema::parse(VERSIONED_XSD).unwrap();
        let errors = check(&schema, r#"<todo version="1" owner="me"><id>1</id></todo>"#);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("attribute 'owner' is not allowed"));

        let on_simple = check(&schema, r#"<todo version="1"><id unit="n">1</id></todo>"#);
        assert_eq!(on_simple.len(), 1);
        assert!(on_simple[0].contains("attribute 'unit' is not allowed"));

        let meta = check(
            &schema,
            r#"<todo xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" version="1"
                 xsi:noNamespaceSchemaLocation="todo.xsd"><id>1</id></todo>"#,
        );
        assert!(meta.is_empty(), "{meta:?}");
    }

    #[test]
    fn any_attribute_accepts_undeclared_attributes() {
        let schema = XsdSchema::parse(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:element name="r"><xs:complexType>
                   <xs:attribute name="n" type="xs:int"/>
                   <xs:anyAttribute processContents="lax"/>
                 </xs:complexType></xs:element>
               </xs:schema>"#,
        )
        .unwrap();
        assert!(check(&schema, r#"<r n="1" extra="x"/>"#).is_empty());
        assert_eq!(check(&schema, r#"<r n="x"/>"#).len(), 1);
    }

    #[test]
    fn unsupported_attribute_constructs_are_rejected_at_load() {
        let group = XsdSchema::parse(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:element name="r"><xs:complexType>
                   <xs:attributeGroup ref="common"/>
                 </xs:complexType></xs:element>
               </xs:schema>"#,
        )
        .unwrap_err();
        assert!(group.contains("unsupported"), "{group}");

        let reference = XsdSchema::parse(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:element name="r"><xs:complexType>
                   <xs:attribute ref="xml:lang"/>
                 </xs:complexType></xs:element>
               </xs:schema>"#,
        )
        .unwrap_err();
        assert!(reference.contains("unsupported"), "{reference}");

        let complex_typed = XsdSchema::parse(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:complexType name="box"><xs:sequence/></xs:complexType>
                 <xs:element name="r"><xs:complexType>
                   <xs:attribute name="b" type="box"/>
                 </xs:complexType></xs:element>
               </xs:schema>"#,
        )
        .unwrap_err();
        assert!(complex_typed.contains("simple type"), "{complex_typed}");
    }

    #[test]
    fn unknown_type_reference_is_rejected_at_load() {
        let err = XsdSchema::parse(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:element name="s" type="nowhere"/>
               </xs:schema>"#,
        )
        .unwrap_err();
        assert!(err.contains("unknown type 'nowhere'"));
    }

    #[test]
    fn non_schema_document_is_rejected() {
        assert!(XsdSchema::parse("<todos/>").is_err());
        assert!(XsdSchema::parse("<xs:schema").is_err());
    }

    #[test]
    fn missing_file_is_reported_as_missing() {
        let err = XsdSchema::load(Path::new("/nonexistent/todos.xsd")).unwrap_err();
        assert!(matches!(err, XsdError::Missing { .. }));
    }

    #[test]
    fn builtin_lexical_forms() {
        assert!(Builtin::Boolean.accepts(" true "));
        assert!(!Builtin::Boolean.accepts("True"));
        assert!(Builtin::Integer.accepts("-42"));
        assert!(!Builtin::Integer.accepts("4.2"));
        assert!(Builtin::Decimal.accepts("4.20"));
        assert!(!Builtin::Decimal.accepts("1e5"));
        assert!(Builtin::Double.accepts("1e5"));
        assert!(Builtin::Date.accepts("2024-02-29"));
        assert!(!Builtin::Date.accepts("2024-13-01"));
        assert!(Builtin::DateTime.accepts("2024-02-29T10:00:00.123Z"));
        assert!(!Builtin::DateTime.accepts("2024-02-29 10:00:00"));
    }
}
