//! Recursive key / tag search over parsed bodies

use std::collections::BTreeMap;

use log::warn;
use serde_json::Value;

use crate::document::Document;
use crate::error::CheckError;
use crate::response::{MediaType, Response};
use crate::sink::{AttachmentKind, DiagnosticSink, attach_body};
use crate::xml::XmlElement;

/// All values found under `key`, in document order.
///
/// JSON: every object holding `key` contributes its value, at any depth,
/// including objects nested inside an already matched value.
/// XML: every descendant element named `key` (the root is not a candidate)
/// contributes its text as a string, empty when it has none.
#[must_use]
pub fn extract(doc: &Document, key: &str) -> Vec<Value> {
    match doc {
        Document::Json(value) => extract_json(value, key),
        Document::Xml(root) => extract_xml(root, key),
    }
}

#[must_use]
pub fn extract_json(root: &Value, key: &str) -> Vec<Value> {
    let mut found = Vec::new();
    let mut stack = vec![root];
    while let Some(value) = stack.pop() {
        match value {
            Value::Object(map) => {
                if let Some(v) = map.get(key) {
                    found.push(v.clone());
                }
                stack.extend(map.values().rev());
            }
            Value::Array(items) => stack.extend(items.iter().rev()),
            _ => {}
        }
    }
    found
}

#[must_use]
pub fn extract_xml(root: &XmlElement, tag: &str) -> Vec<Value> {
    root.find_all(tag)
        .into_iter()
        .map(|el| Value::String(el.text_or_empty().to_string()))
        .collect()
}

/// Values per requested key; keys with no match map to an empty list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionResult {
    values: BTreeMap<String, Vec<Value>>,
}

impl ExtractionResult {
    /// Run [`extract`] once per key.
    #[must_use]
    pub fn collect<S: AsRef<str>>(doc: &Document, keys: &[S]) -> Self {
        let values = keys
            .iter()
            .map(|k| (k.as_ref().to_string(), extract(doc, k.as_ref())))
            .collect();
        Self { values }
    }

    /// Every requested key with an empty list.
    #[must_use]
    pub fn empty<S: AsRef<str>>(keys: &[S]) -> Self {
        let values = keys
            .iter()
            .map(|k| (k.as_ref().to_string(), Vec::new()))
            .collect();
        Self { values }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> &[Value] {
        self.values.get(key).map_or(&[][..], Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Value])> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    #[must_use]
    pub fn into_inner(self) -> BTreeMap<String, Vec<Value>> {
        self.values
    }
}

/// Parse `response` by its declared content type and extract every key.
///
/// A content type other than JSON or XML yields an all-empty result; the
/// body is attached so the reason is visible in reports.
///
/// # Errors
///
/// [`CheckError::BodyNotParsable`] if the body does not parse in the
/// declared format.
pub fn extract_keys<S: AsRef<str>>(
    response: &Response,
    keys: &[S],
    sink: &dyn DiagnosticSink,
) -> Result<ExtractionResult, CheckError> {
    let media = response.media_type();
    let Some(format) = media.as_ref().and_then(MediaType::body_format) else {
        let declared = media.map_or_else(|| "none".to_string(), |m| m.to_string());
        warn!("cannot extract keys from content type {declared}");
        sink.attach(
            &format!("Unsupported content type: {declared}"),
            "Extraction Skipped",
            AttachmentKind::Text,
        );
        attach_body(sink, response, "Response Body");
        return Ok(ExtractionResult::empty(keys));
    };

    let doc = Document::parse(response.body(), format).map_err(|reason| {
        attach_body(sink, response, "Unparsable Body");
        CheckError::BodyNotParsable { format, reason }
    })?;
    Ok(ExtractionResult::collect(&doc, keys))
}
