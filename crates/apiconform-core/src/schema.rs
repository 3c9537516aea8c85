//! Structural JSON schema descriptors
//!
//! A [`CollectionSchema`] describes a root object exposing one named
//! collection field whose items all follow a [`RecordSchema`]. Validation
//! produces a structural diff (missing, wrong-typed and unexpected fields)
//! rather than a single message. Arbitrary JSON Schema documents are also
//! accepted and checked with `jsonschema`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Primitive type of a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Integer,
    Number,
    String,
    Boolean,
}

impl FieldType {
    #[must_use]
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::String => value.is_string(),
            Self::Boolean => value.is_boolean(),
        }
    }

    /// JSON Schema `type` keyword for this field type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Number => "number",
            Self::String => "string",
            Self::Boolean => "boolean",
        }
    }
}

/// JSON type name of a concrete value, for diagnostics.
#[must_use]
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Required fields must be present and non-null; optional ones may be
    /// absent or null.
    pub required: bool,
}

impl FieldSpec {
    #[must_use]
    pub fn required(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            required: true,
        }
    }

    #[must_use]
    pub fn optional(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            required: false,
        }
    }
}

/// One record shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSchema {
    pub name: String,
    pub fields: Vec<FieldSpec>,
    /// Reject fields not listed in `fields`
    pub deny_unknown: bool,
}

/// Root object holding a named array of records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub name: String,
    /// Name of the array field, e.g. `todos`
    pub collection: String,
    pub record: RecordSchema,
}

/// What went wrong at one location in the body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "problem", rename_all = "snake_case")]
pub enum IssueProblem {
    Missing,
    WrongType { expected: String, actual: String },
    Unexpected,
    /// Message from a generic JSON Schema validator
    Violation { message: String },
}

/// One entry of a structural diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaIssue {
    /// Location such as `$.todos[1].doneStatus`
    pub path: String,
    #[serde(flatten)]
    pub problem: IssueProblem,
}

impl SchemaIssue {
    fn new(path: &str, problem: IssueProblem) -> Self {
        Self {
            path: path.to_string(),
            problem,
        }
    }

    #[must_use]
    pub fn violation(path: &str, message: impl Into<String>) -> Self {
        Self::new(
            path,
            IssueProblem::Violation {
                message: message.into(),
            },
        )
    }
}

impl fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.problem {
            IssueProblem::Missing => write!(f, "{}: missing required field", self.path),
            IssueProblem::WrongType { expected, actual } => {
                write!(f, "{}: expected {expected}, got {actual}", self.path)
            }
            IssueProblem::Unexpected => write!(f, "{}: unexpected field", self.path),
            IssueProblem::Violation { message } => write!(f, "{}: {message}", self.path),
        }
    }
}

impl RecordSchema {
    /// Append every deviation of `value` from this record shape to `issues`.
    pub fn check(&self, value: &Value, path: &str, issues: &mut Vec<SchemaIssue>) {
        let Some(obj) = value.as_object() else {
            issues.push(SchemaIssue::new(
                path,
                IssueProblem::WrongType {
                    expected: "object".into(),
                    actual: json_type_name(value).into(),
                },
            ));
            return;
        };

        for field in &self.fields {
            let field_path = format!("{path}.{}", field.name);
            match obj.get(&field.name) {
                None if field.required => {
                    issues.push(SchemaIssue::new(&field_path, IssueProblem::Missing));
                }
                None => {}
                Some(Value::Null) if !field.required => {}
                Some(v) if field.field_type.matches(v) => {}
                Some(v) => issues.push(SchemaIssue::new(
                    &field_path,
                    IssueProblem::WrongType {
                        expected: field.field_type.as_str().into(),
                        actual: json_type_name(v).into(),
                    },
                )),
            }
        }

        if self.deny_unknown {
            for key in obj.keys() {
                if !self.fields.iter().any(|f| &f.name == key) {
                    issues.push(SchemaIssue::new(
                        &format!("{path}.{key}"),
                        IssueProblem::Unexpected,
                    ));
                }
            }
        }
    }

    /// Equivalent JSON Schema document.
    #[must_use]
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for field in &self.fields {
            let ty = if field.required {
                json!(field.field_type.as_str())
            } else {
                json!([field.field_type.as_str(), "null"])
            };
            properties.insert(field.name.clone(), json!({ "type": ty }));
        }
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect();
        json!({
            "title": self.name,
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": !self.deny_unknown,
        })
    }
}

impl CollectionSchema {
    #[must_use]
    pub fn validate(&self, body: &Value) -> Vec<SchemaIssue> {
        let mut issues = Vec::new();
        let Some(root) = body.as_object() else {
            issues.push(SchemaIssue::new(
                "$",
                IssueProblem::WrongType {
                    expected: "object".into(),
                    actual: json_type_name(body).into(),
                },
            ));
            return issues;
        };

        let path = format!("$.{}", self.collection);
        match root.get(&self.collection) {
            None => issues.push(SchemaIssue::new(&path, IssueProblem::Missing)),
            Some(Value::Array(items)) => {
                for (idx, item) in items.iter().enumerate() {
                    self.record
                        .check(item, &format!("{path}[{idx}]"), &mut issues);
                }
            }
            Some(other) => issues.push(SchemaIssue::new(
                &path,
                IssueProblem::WrongType {
                    expected: "array".into(),
                    actual: json_type_name(other).into(),
                },
            )),
        }
        issues
    }

    /// Equivalent JSON Schema document (draft 2020-12).
    #[must_use]
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        properties.insert(
            self.collection.clone(),
            json!({ "type": "array", "items": self.record.to_json_schema() }),
        );
        json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "title": self.name,
            "type": "object",
            "properties": properties,
            "required": [self.collection],
        })
    }
}

/// A JSON body contract: a typed descriptor or a raw JSON Schema document.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonSchema {
    Collection(CollectionSchema),
    Document { name: String, schema: Value },
}

impl JsonSchema {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Collection(c) => &c.name,
            Self::Document { name, .. } => name,
        }
    }

    /// Validate `body`, returning the structural diff (empty when valid).
    ///
    /// # Errors
    ///
    /// Returns error if a raw JSON Schema document cannot be compiled.
    pub fn validate(&self, body: &Value) -> Result<Vec<SchemaIssue>, String> {
        match self {
            Self::Collection(c) => Ok(c.validate(body)),
            Self::Document { schema, .. } => {
                let validator = jsonschema::validator_for(schema).map_err(|e| e.to_string())?;
                Ok(validator
                    .iter_errors(body)
                    .map(|e| {
                        SchemaIssue::new(
                            "$",
                            IssueProblem::Violation {
                                message: e.to_string(),
                            },
                        )
                    })
                    .collect())
            }
        }
    }

    #[must_use]
    pub fn to_json_schema(&self) -> Value {
        match self {
            Self::Collection(c) => c.to_json_schema(),
            Self::Document { schema, .. } => schema.clone(),
        }
    }
}

impl From<CollectionSchema> for JsonSchema {
    fn from(c: CollectionSchema) -> Self {
        Self::Collection(c)
    }
}

/// `{ id: integer, name: string, description?: string, status: boolean }`
#[must_use]
pub fn challenge_record() -> RecordSchema {
    RecordSchema {
        name: "Challenge".into(),
        fields: vec![
            FieldSpec::required("id", FieldType::Integer),
            FieldSpec::required("name", FieldType::String),
            FieldSpec::optional("description", FieldType::String),
            FieldSpec::required("status", FieldType::Boolean),
        ],
        deny_unknown: true,
    }
}

/// `{ id: integer, title: string, description?: string, doneStatus: boolean }`
#[must_use]
pub fn todo_record() -> RecordSchema {
    RecordSchema {
        name: "Todo".into(),
        fields: vec![
            FieldSpec::required("id", FieldType::Integer),
            FieldSpec::required("title", FieldType::String),
            FieldSpec::optional("description", FieldType::String),
            FieldSpec::required("doneStatus", FieldType::Boolean),
        ],
        deny_unknown: true,
    }
}

#[must_use]
pub fn challenges_schema() -> CollectionSchema {
    CollectionSchema {
        name: "Challenges".into(),
        collection: "challenges".into(),
        record: challenge_record(),
    }
}

#[must_use]
pub fn todos_schema() -> CollectionSchema {
    CollectionSchema {
        name: "Todos".into(),
        collection: "todos".into(),
        record: todo_record(),
    }
}
