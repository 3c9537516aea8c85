//! Parsed response body in either supported format

use crate::response::BodyFormat;
use crate::xml::{self, XmlElement};

/// A response body parsed as JSON or XML.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Json(serde_json::Value),
    Xml(XmlElement),
}

impl Document {
    /// Parse `text` in the given format.
    ///
    /// # Errors
    ///
    /// Returns a human-readable parser message if the text is not valid
    /// in that format.
    pub fn parse(text: &str, format: BodyFormat) -> Result<Self, String> {
        match format {
            BodyFormat::Json => serde_json::from_str(text)
                .map(Self::Json)
                .map_err(|e| e.to_string()),
            BodyFormat::Xml => xml::parse(text).map(Self::Xml).map_err(|e| e.to_string()),
        }
    }

    #[must_use]
    pub const fn format(&self) -> BodyFormat {
        match self {
            Self::Json(_) => BodyFormat::Json,
            Self::Xml(_) => BodyFormat::Xml,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_dispatches_on_format() {
        let json = Document::parse(r#"{"a":1}"#, BodyFormat::Json).unwrap();
        assert_eq!(json.format(), BodyFormat::Json);
        let xml = Document::parse("<a>1</a>", BodyFormat::Xml).unwrap();
        assert_eq!(xml.format(), BodyFormat::Xml);
    }

    #[test]
    fn parse_reports_errors() {
        assert!(Document::parse("{", BodyFormat::Json).is_err());
        assert!(Document::parse("<a>", BodyFormat::Xml).is_err());
        assert!(Document::parse(r#"{"a":1}"#, BodyFormat::Xml).is_err());
    }
}
