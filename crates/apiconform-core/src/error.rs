//! Check failure taxonomy
//!
//! Every assertion returns [`CheckError`] on the first violated expectation.
//! Variants fall into two classes: the API answered wrongly
//! ([`FailureClass::Response`]) or the test itself is misconfigured
//! ([`FailureClass::Setup`]). Reports keep the two apart.

use std::fmt;
use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::response::BodyFormat;
use crate::schema::SchemaIssue;

/// Who is at fault for a failed check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// The response violates an expectation
    Response,
    /// The test case or schema registry is misconfigured
    Setup,
}

/// Serializable discriminant of [`CheckError`], used in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    StatusMismatch,
    TimeExceeded,
    HeaderMissing,
    HeaderValueMismatch,
    BodyKeyMissing,
    BodyKeyValueMismatch,
    TagMissing,
    TagValueMismatch,
    BodyNotParsable,
    SchemaValidation,
    ContentTypeMismatch,
    SchemaNotConfigured,
    XsdResourceMissing,
    SchemaInvalid,
    FilterViolation,
}

impl FailureKind {
    #[must_use]
    pub const fn class(self) -> FailureClass {
        match self {
            Self::SchemaNotConfigured | Self::XsdResourceMissing | Self::SchemaInvalid => {
                FailureClass::Setup
            }
            _ => FailureClass::Response,
        }
    }

    /// Human-readable description
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::StatusMismatch => "Unexpected status code",
            Self::TimeExceeded => "Response time limit exceeded",
            Self::HeaderMissing => "Expected header missing",
            Self::HeaderValueMismatch => "Header value mismatch",
            Self::BodyKeyMissing => "Expected body key missing",
            Self::BodyKeyValueMismatch => "Body key value mismatch",
            Self::TagMissing => "Expected XML tag missing",
            Self::TagValueMismatch => "XML tag value mismatch",
            Self::BodyNotParsable => "Response body could not be parsed",
            Self::SchemaValidation => "Response body does not match schema",
            Self::ContentTypeMismatch => "Unexpected Content-Type",
            Self::SchemaNotConfigured => "No schema registered for validation",
            Self::XsdResourceMissing => "XSD document cannot be opened",
            Self::SchemaInvalid => "Schema document is invalid",
            Self::FilterViolation => "Query filter not honored",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A header whose actual value differs from the expected one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderMismatch {
    pub name: String,
    pub expected: String,
    /// `None` when the header is absent
    pub actual: Option<String>,
}

impl fmt::Display for HeaderMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.actual {
            Some(actual) => write!(
                f,
                "{}: expected '{}', got '{actual}'",
                self.name, self.expected
            ),
            None => write!(
                f,
                "{}: expected '{}', header absent",
                self.name, self.expected
            ),
        }
    }
}

/// A key or tag for which no occurrence holds the expected value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueMismatch {
    pub key: String,
    pub expected: serde_json::Value,
    /// Every occurrence found; empty when the key is absent
    pub found: Vec<serde_json::Value>,
}

impl fmt::Display for ValueMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.found.is_empty() {
            write!(f, "{}: key not found in any record", self.key)
        } else {
            let found: Vec<String> = self.found.iter().map(ToString::to_string).collect();
            write!(
                f,
                "{}: expected {}, no match among [{}]",
                self.key,
                self.expected,
                found.join(", ")
            )
        }
    }
}

fn lines<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CheckError {
    #[error("expected status code {expected}, got {actual}")]
    StatusMismatch { expected: u16, actual: u16 },

    #[error("response time {elapsed:.3}s exceeds max {limit:.3}s")]
    TimeExceeded { elapsed: f64, limit: f64 },

    #[error("headers not found: {}", .missing.join(", "))]
    HeaderMissing {
        missing: Vec<String>,
        available: Vec<String>,
    },

    #[error("header value mismatches:\n{}", lines(.mismatches))]
    HeaderValueMismatch { mismatches: Vec<HeaderMismatch> },

    #[error("body keys not found: {}", .missing.join(", "))]
    BodyKeyMissing { missing: Vec<String> },

    #[error("body key value mismatches:\n{}", lines(.mismatches))]
    BodyKeyValueMismatch { mismatches: Vec<ValueMismatch> },

    #[error("XML tags not found: {}", .missing.join(", "))]
    TagMissing { missing: Vec<String> },

    #[error("XML tag value mismatches:\n{}", lines(.mismatches))]
    TagValueMismatch { mismatches: Vec<ValueMismatch> },

    #[error("response body is not valid {format}: {reason}")]
    BodyNotParsable { format: BodyFormat, reason: String },

    #[error("response body does not match schema {schema}:\n{}", lines(.issues))]
    SchemaValidation {
        schema: String,
        issues: Vec<SchemaIssue>,
    },

    #[error("expected Content-Type {expected}, got {}", .actual.as_deref().unwrap_or("none"))]
    ContentTypeMismatch {
        expected: String,
        actual: Option<String>,
    },

    #[error("no {format} schema registered for profile '{profile}'")]
    SchemaNotConfigured { format: BodyFormat, profile: String },

    #[error("XSD document {} cannot be opened: {reason}", .path.display())]
    XsdResourceMissing { path: PathBuf, reason: String },

    #[error("schema {schema} is invalid: {reason}")]
    SchemaInvalid { schema: String, reason: String },

    #[error("filter {field}={expected} not honored: found {actual}")]
    FilterViolation {
        field: String,
        expected: String,
        actual: serde_json::Value,
    },
}

impl CheckError {
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::StatusMismatch { .. } => FailureKind::StatusMismatch,
            Self::TimeExceeded { .. } => FailureKind::TimeExceeded,
            Self::HeaderMissing { .. } => FailureKind::HeaderMissing,
            Self::HeaderValueMismatch { .. } => FailureKind::HeaderValueMismatch,
            Self::BodyKeyMissing { .. } => FailureKind::BodyKeyMissing,
            Self::BodyKeyValueMismatch { .. } => FailureKind::BodyKeyValueMismatch,
            Self::TagMissing { .. } => FailureKind::TagMissing,
            Self::TagValueMismatch { .. } => FailureKind::TagValueMismatch,
            Self::BodyNotParsable { .. } => FailureKind::BodyNotParsable,
            Self::SchemaValidation { .. } => FailureKind::SchemaValidation,
            Self::ContentTypeMismatch { .. } => FailureKind::ContentTypeMismatch,
            Self::SchemaNotConfigured { .. } => FailureKind::SchemaNotConfigured,
            Self::XsdResourceMissing { .. } => FailureKind::XsdResourceMissing,
            Self::SchemaInvalid { .. } => FailureKind::SchemaInvalid,
            Self::FilterViolation { .. } => FailureKind::FilterViolation,
        }
    }

    #[must_use]
    pub const fn class(&self) -> FailureClass {
        self.kind().class()
    }

    #[must_use]
    pub const fn is_setup_failure(&self) -> bool {
        matches!(self.class(), FailureClass::Setup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_failures_are_classified_apart() {
        let err = CheckError::SchemaNotConfigured {
            format: BodyFormat::Xml,
            profile: "todos".into(),
        };
        assert!(err.is_setup_failure());
        assert_eq!(err.kind(), FailureKind::SchemaNotConfigured);

        let err = CheckError::XsdResourceMissing {
            path: PathBuf::from("schemas/none.xsd"),
            reason: "No such file".into(),
        };
        assert_eq!(err.class(), FailureClass::Setup);

        let err = CheckError::StatusMismatch {
            expected: 200,
            actual: 404,
        };
        assert_eq!(err.class(), FailureClass::Response);
    }

    #[test]
    fn status_mismatch_names_both_codes() {
        let err = CheckError::StatusMismatch {
            expected: 200,
            actual: 500,
        };
        assert_eq!(err.to_string(), "expected status code 200, got 500");
    }

    #[test]
    fn value_mismatch_lists_found_values() {
        let m = ValueMismatch {
            key: "id".into(),
            expected: serde_json::json!(60),
            found: vec![serde_json::json!(59)],
        };
        assert_eq!(m.to_string(), "id: expected 60, no match among [59]");

        let absent = ValueMismatch {
            key: "id".into(),
            expected: serde_json::json!(60),
            found: vec![],
        };
        assert_eq!(absent.to_string(), "id: key not found in any record");
    }

    #[test]
    fn header_mismatch_display() {
        let m = HeaderMismatch {
            name: "content-type".into(),
            expected: "application/xml".into(),
            actual: Some("application/json".into()),
        };
        assert_eq!(
            m.to_string(),
            "content-type: expected 'application/xml', got 'application/json'"
        );
    }

    #[test]
    fn failure_kind_serializes_snake_case() {
        let json = serde_json::to_string(&FailureKind::BodyKeyValueMismatch).unwrap();
        assert_eq!(json, "\"body_key_value_mismatch\"");
    }

    #[test]
    fn content_type_mismatch_without_header() {
        let err = CheckError::ContentTypeMismatch {
            expected: "application/json".into(),
            actual: None,
        };
        assert_eq!(err.to_string(), "expected Content-Type application/json, got none");
    }
}
