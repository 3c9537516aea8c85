//! Minimal XML element tree built on `quick-xml`
//!
//! Response bodies and XSD documents are both small, so the whole document
//! is materialized as an owned [`XmlElement`] tree. Comments, processing
//! instructions and the prolog are dropped. Nesting is capped at
//! [`MAX_DEPTH`] so every walk over a parsed tree stays shallow.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

/// Deepest element nesting [`parse`] accepts.
pub const MAX_DEPTH: usize = 256;

/// One element with its attributes, direct text and child elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    /// Qualified tag name as written, e.g. `todo` or `xs:element`
    pub name: String,
    pub attributes: Vec<(String, String)>,
    /// Direct text content; `None` when the element has no text
    pub text: Option<String>,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    fn from_start(start: &BytesStart<'_>, position: u64) -> Result<Self, XmlError> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| XmlError::Syntax {
                position,
                message: e.to_string(),
            })?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| XmlError::Syntax {
                    position,
                    message: e.to_string(),
                })?
                .into_owned();
            attributes.push((key, value));
        }
        Ok(Self {
            name,
            attributes,
            text: None,
            children: Vec::new(),
        })
    }

    /// Tag name without its namespace prefix.
    #[must_use]
    pub fn local_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Text content, empty string when there is none.
    #[must_use]
    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    /// All descendants in document order, excluding `self`.
    #[must_use]
    pub fn descendants(&self) -> Vec<&XmlElement> {
        let mut out = Vec::new();
        let mut stack: Vec<&XmlElement> = self.children.iter().rev().collect();
        while let Some(el) = stack.pop() {
            out.push(el);
            stack.extend(el.children.iter().rev());
        }
        out
    }

    /// Descendants whose tag name equals `tag` (the `.//tag` search).
    #[must_use]
    pub fn find_all(&self, tag: &str) -> Vec<&XmlElement> {
        self.descendants()
            .into_iter()
            .filter(|el| el.name == tag)
            .collect()
    }

    /// Only text before the first child counts as the element's text.
    fn push_text(&mut self, text: &str) {
        if !self.children.is_empty() {
            return;
        }
        match &mut self.text {
            Some(existing) => existing.push_str(text),
            None => self.text = Some(text.to_string()),
        }
    }

    /// Drop indentation-only text from elements that have children.
    fn normalize(&mut self) {
        if !self.children.is_empty()
            && self.text.as_deref().is_some_and(|t| t.trim().is_empty())
        {
            self.text = None;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum XmlError {
    #[error("malformed XML at byte {position}: {message}")]
    Syntax { position: u64, message: String },
    #[error("unclosed tag <{0}>")]
    Unclosed(String),
    #[error("content after the root element <{0}>")]
    TrailingContent(String),
    #[error("document has no root element")]
    Empty,
    #[error("elements nested too deeply at byte {position}")]
    TooDeep { position: u64 },
}

/// Parse a complete document into its root element.
///
/// # Errors
///
/// Returns error if the text is not well-formed XML.
pub fn parse(text: &str) -> Result<XmlElement, XmlError> {
    let mut reader = Reader::from_str(text);
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let position = reader.buffer_position() as u64;
        let event = reader.read_event().map_err(|e| XmlError::Syntax {
            position,
            message: e.to_string(),
        })?;
        match event {
            Event::Start(start) => {
                if let Some(r) = &root {
                    return Err(XmlError::TrailingContent(r.name.clone()));
                }
                if stack.len() >= MAX_DEPTH {
                    return Err(XmlError::TooDeep { position });
                }
                stack.push(XmlElement::from_start(&start, position)?);
            }
            Event::Empty(start) => {
                if stack.len() >= MAX_DEPTH {
                    return Err(XmlError::TooDeep { position });
                }
                let el = XmlElement::from_start(&start, position)?;
                close(el, &mut stack, &mut root)?;
            }
            Event::End(end) => {
                let mut el = stack.pop().ok_or_else(|| XmlError::Syntax {
                    position,
                    message: format!(
                        "unexpected closing tag </{}>",
                        String::from_utf8_lossy(end.name().as_ref())
                    ),
                })?;
                el.normalize();
                close(el, &mut stack, &mut root)?;
            }
            Event::Text(t) => {
                let s = t.unescape().map_err(|e| XmlError::Syntax {
                    position,
                    message: e.to_string(),
                })?;
                match stack.last_mut() {
                    Some(top) => top.push_text(&s),
                    None if s.trim().is_empty() => {}
                    None => {
                        return Err(XmlError::Syntax {
                            position,
                            message: "text outside the root element".into(),
                        });
                    }
                }
            }
            Event::CData(c) => {
                let s = String::from_utf8_lossy(&c).into_owned();
                match stack.last_mut() {
                    Some(top) => top.push_text(&s),
                    None => {
                        return Err(XmlError::Syntax {
                            position,
                            message: "CDATA outside the root element".into(),
                        });
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(XmlError::Unclosed(open.name.clone()));
    }
    root.ok_or(XmlError::Empty)
}

fn close(
    el: XmlElement,
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(el);
            Ok(())
        }
        None => match root {
            Some(r) => Err(XmlError::TrailingContent(r.name.clone())),
            None => {
                *root = Some(el);
                Ok(())
            }
        },
    }
}

/// Re-render an XML document with one element per line for report output.
///
/// Unparseable input is returned unchanged.
#[must_use]
pub fn format_xml(text: &str) -> String {
    const INDENT: &str = "    ";

    fn render(el: &XmlElement, level: usize, lines: &mut Vec<String>) {
        let pad = INDENT.repeat(level);
        let mut attrs: Vec<&(String, String)> = el.attributes.iter().collect();
        attrs.sort();
        let attr_str: String = attrs
            .iter()
            .map(|(k, v)| format!(" {k}=\"{}\"", escape(v)))
            .collect();
        let text = el.text.as_deref().map(str::trim).filter(|t| !t.is_empty());

        if text.is_none() && el.children.is_empty() {
            lines.push(format!("{pad}<{}{attr_str}/>", el.name));
            return;
        }
        lines.push(format!("{pad}<{}{attr_str}>", el.name));
        if let Some(t) = text {
            lines.push(format!("{pad}{INDENT}{}", escape(t)));
        }
        for child in &el.children {
            render(child, level + 1, lines);
        }
        lines.push(format!("{pad}</{}>", el.name));
    }

    match parse(text) {
        Ok(root) => {
            let mut lines = vec![r#"<?xml version="1.0" encoding="utf-8"?>"#.to_string()];
            render(&root, 0, &mut lines);
            lines.join("\n")
        }
        Err(_) => text.to_string(),
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_elements_and_text() {
        let root = parse("<todos><todo><id>1</id><title>a &amp; b</title></todo></todos>").unwrap();
        assert_eq!(root.name, "todos");
        assert_eq!(root.text, None);
        let todo = &root.children[0];
        assert_eq!(todo.children[0].text.as_deref(), Some("1"));
        assert_eq!(todo.children[1].text.as_deref(), Some("a & b"));
    }

    #[test]
    fn indentation_text_is_dropped_for_parents() {
        let root = parse("<a>\n  <b>x</b>\n</a>\n").unwrap();
        assert_eq!(root.text, None);
        assert_eq!(root.children.len(), 1);
    }

    #[test]
    fn text_after_first_child_is_not_element_text() {
        let root = parse("<todo>x<id>1</id>y</todo>").unwrap();
        assert_eq!(root.text.as_deref(), Some("x"));
        assert_eq!(root.children[0].text.as_deref(), Some("1"));

        let root = parse("<todo><id>1</id>tail</todo>").unwrap();
        assert_eq!(root.text, None);
    }

    #[test]
    fn nesting_is_capped() {
        let nested = |depth: usize| format!("{}{}", "<a>".repeat(depth), "</a>".repeat(depth));

        assert!(parse(&nested(MAX_DEPTH)).is_ok());
        assert!(matches!(
            parse(&nested(MAX_DEPTH + 1)),
            Err(XmlError::TooDeep { .. })
        ));
        let deep = nested(20_000);
        assert!(matches!(parse(&deep), Err(XmlError::TooDeep { .. })));
        assert_eq!(format_xml(&deep), deep);

        let self_closing = format!("{}<a/>{}", "<a>".repeat(MAX_DEPTH), "</a>".repeat(MAX_DEPTH));
        assert!(matches!(parse(&self_closing), Err(XmlError::TooDeep { .. })));
    }

    #[test]
    fn empty_element_has_no_text() {
        let root = parse(r#"<?xml version="1.0"?><todo><description/></todo>"#).unwrap();
        assert_eq!(root.children[0].text, None);
        assert_eq!(root.children[0].text_or_empty(), "");
    }

    #[test]
    fn unclosed_tag_is_an_error() {
        assert!(parse("<todos><todo>").is_err());
    }

    #[test]
    fn mismatched_end_tag_is_an_error() {
        assert!(parse("<a><b></a></b>").is_err());
    }

    #[test]
    fn second_root_is_an_error() {
        assert!(matches!(
            parse("<a/><b/>"),
            Err(XmlError::TrailingContent(_))
        ));
    }

    #[test]
    fn empty_input_has_no_root() {
        assert_eq!(parse("  "), Err(XmlError::Empty));
    }

    #[test]
    fn find_all_searches_descendants_only() {
        let root = parse("<id><x><id>1</id></x><id>2</id></id>").unwrap();
        let found: Vec<&str> = root.find_all("id").iter().map(|e| e.text_or_empty()).collect();
        assert_eq!(found, vec!["1", "2"]);
    }

    #[test]
    fn local_name_strips_prefix() {
        let root = parse(r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"/>"#).unwrap();
        assert_eq!(root.local_name(), "schema");
        assert_eq!(
            root.attribute("xmlns:xs"),
            Some("http://www.w3.org/2001/XMLSchema")
        );
    }

    #[test]
    fn format_xml_indents_elements() {
        let formatted =
            format_xml(r#"<todos><todo b="2" a="1"><id>1</id><description/></todo></todos>"#);
        insta::assert_snapshot!(formatted, @r#"
        <?xml version="1.0" encoding="utf-8"?>
        <todos>
            <todo a="1" b="2">
                <id>
                    1
                </id>
                <description/>
            </todo>
        </todos>
        "#);
    }

    #[test]
    fn format_xml_returns_invalid_input_unchanged() {
        assert_eq!(format_xml("<todos><todo>"), "<todos><todo>");
    }
}
