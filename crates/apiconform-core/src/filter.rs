//! Query-filter verification
//!
//! For a request like `GET /todos?doneStatus=true`, every occurrence of
//! `doneStatus` in the response must equal `true`. Unlike the key-value
//! assertion, a single non-matching record fails the check.

use log::{debug, error, info};
use serde_json::Value;

use crate::error::CheckError;
use crate::extract::extract_keys;
use crate::response::Response;
use crate::sink::{AttachmentKind, DiagnosticSink, attach_body};

/// Text form of a body value as it would appear in a query string.
fn query_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Verify that the response honors every `(field, value)` filter.
///
/// A field that never occurs in the body passes.
///
/// # Errors
///
/// [`CheckError::FilterViolation`] for the first occurrence that differs,
/// [`CheckError::BodyNotParsable`] if the body cannot be parsed.
pub fn verify_query_filter(
    response: &Response,
    query: &[(String, String)],
    sink: &dyn DiagnosticSink,
) -> Result<(), CheckError> {
    info!("verifying {} query filters", query.len());
    let fields: Vec<&str> = query.iter().map(|(k, _)| k.as_str()).collect();
    let extracted = extract_keys(response, &fields, sink)?;

    for (field, expected) in query {
        let found = extracted.get(field);
        if found.is_empty() {
            debug!("filter field '{field}' absent from response");
            continue;
        }
        if let Some(actual) = found.iter().find(|v| query_text(v) != *expected) {
            let err = CheckError::FilterViolation {
                field: field.clone(),
                expected: expected.clone(),
                actual: actual.clone(),
            };
            error!("{err}");
            let values: Vec<String> = found.iter().map(query_text).collect();
            sink.attach(
                &format!("{field}={expected}\nfound: [{}]", values.join(", ")),
                "Filter Violation",
                AttachmentKind::Text,
            );
            attach_body(sink, response, "Response Body");
            return Err(err);
        }
        debug!("all {} occurrences of '{field}' equal '{expected}'", found.len());
    }
    Ok(())
}
