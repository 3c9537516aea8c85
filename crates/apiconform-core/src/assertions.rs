//! Assertion primitives
//!
//! Each primitive checks one expectation. On failure it logs at error
//! level, attaches expected and actual values to the sink, then returns the
//! matching [`CheckError`].

use std::collections::BTreeMap;
use std::path::Path;

use log::{debug, error, info};
use serde_json::Value;

use crate::error::{CheckError, HeaderMismatch, ValueMismatch};
use crate::extract::{extract_json, extract_xml};
use crate::response::{BodyFormat, Response};
use crate::schema::{JsonSchema, SchemaIssue};
use crate::sink::{AttachmentKind, DiagnosticSink, attach_body};
use crate::xml::XmlElement;
use crate::xsd::{XsdError, XsdSchema};

fn fail(err: CheckError, sink: &dyn DiagnosticSink) -> CheckError {
    error!("{err}");
    sink.attach(&err.to_string(), err.kind().description(), AttachmentKind::Text);
    err
}

/// JSON equality where numbers compare by value, so `59 == 59.0`.
#[must_use]
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            match (x.as_i64(), y.as_i64(), x.as_u64(), y.as_u64()) {
                (Some(i), Some(j), _, _) => i == j,
                (_, _, Some(i), Some(j)) => i == j,
                _ => x.as_f64() == y.as_f64(),
            }
        }
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

/// Text form of an expected value for comparison with XML text:
/// strings verbatim, everything else as JSON text.
#[must_use]
pub fn expected_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ── Response-level primitives ──

/// # Errors
///
/// [`CheckError::StatusMismatch`] when the status differs.
pub fn assert_status_code(
    response: &Response,
    expected: u16,
    sink: &dyn DiagnosticSink,
) -> Result<(), CheckError> {
    info!("checking status code is {expected}");
    if response.status() == expected {
        debug!("status code {expected} as expected");
        return Ok(());
    }
    attach_body(sink, response, "Response Body");
    Err(fail(
        CheckError::StatusMismatch {
            expected,
            actual: response.status(),
        },
        sink,
    ))
}

/// Passes when the elapsed time is at most `limit` seconds.
///
/// # Errors
///
/// [`CheckError::TimeExceeded`] otherwise.
pub fn assert_response_time(
    response: &Response,
    limit: f64,
    sink: &dyn DiagnosticSink,
) -> Result<(), CheckError> {
    info!("checking response time <= {limit:.3}s");
    let elapsed = response.elapsed();
    if elapsed <= limit {
        debug!("response time {elapsed:.3}s within limit");
        return Ok(());
    }
    Err(fail(CheckError::TimeExceeded { elapsed, limit }, sink))
}

/// # Errors
///
/// [`CheckError::HeaderMissing`] listing every absent header and the
/// headers that were present.
pub fn assert_headers_present<S: AsRef<str>>(
    response: &Response,
    names: &[S],
    sink: &dyn DiagnosticSink,
) -> Result<(), CheckError> {
    info!("checking {} headers are present", names.len());
    let missing: Vec<String> = names
        .iter()
        .map(AsRef::as_ref)
        .filter(|n| !response.headers().contains(n))
        .map(str::to_string)
        .collect();
    if missing.is_empty() {
        debug!("all expected headers present");
        return Ok(());
    }
    let available: Vec<String> = response.headers().names().map(str::to_string).collect();
    sink.attach(&available.join("\n"), "Available Headers", AttachmentKind::Text);
    Err(fail(CheckError::HeaderMissing { missing, available }, sink))
}

/// # Errors
///
/// [`CheckError::HeaderValueMismatch`] listing every header whose value
/// differs or which is absent.
pub fn assert_header_values(
    response: &Response,
    expected: &BTreeMap<String, String>,
    sink: &dyn DiagnosticSink,
) -> Result<(), CheckError> {
    info!("checking {} header values", expected.len());
    let mismatches: Vec<HeaderMismatch> = expected
        .iter()
        .filter_map(|(name, value)| {
            let actual = response.header(name);
            (actual != Some(value.as_str())).then(|| HeaderMismatch {
                name: name.clone(),
                expected: value.clone(),
                actual: actual.map(str::to_string),
            })
        })
        .collect();
    if mismatches.is_empty() {
        debug!("all header values match");
        return Ok(());
    }
    Err(fail(CheckError::HeaderValueMismatch { mismatches }, sink))
}

/// # Errors
///
/// [`CheckError::ContentTypeMismatch`] unless the declared media type is
/// the one `format` requires.
pub fn assert_content_type(
    response: &Response,
    format: BodyFormat,
    sink: &dyn DiagnosticSink,
) -> Result<(), CheckError> {
    let expected = format.media_type();
    info!("checking Content-Type is {expected}");
    let media = response.media_type();
    if media.as_ref().and_then(|m| m.body_format()) == Some(format) {
        debug!("Content-Type {expected} as expected");
        return Ok(());
    }
    attach_body(sink, response, "Response Body");
    Err(fail(
        CheckError::ContentTypeMismatch {
            expected: expected.to_string(),
            actual: response.header("content-type").map(str::to_string),
        },
        sink,
    ))
}

// ── JSON body primitives ──

/// Every key must occur at least once, at any depth.
///
/// # Errors
///
/// [`CheckError::BodyKeyMissing`] listing the absent keys.
pub fn assert_body_keys_present<S: AsRef<str>>(
    body: &Value,
    keys: &[S],
    sink: &dyn DiagnosticSink,
) -> Result<(), CheckError> {
    info!("checking {} body keys are present", keys.len());
    let missing: Vec<String> = keys
        .iter()
        .map(AsRef::as_ref)
        .filter(|k| extract_json(body, k).is_empty())
        .map(str::to_string)
        .collect();
    if missing.is_empty() {
        debug!("all body keys present");
        return Ok(());
    }
    sink.attach(&body.to_string(), "Response Body", AttachmentKind::Json);
    Err(fail(CheckError::BodyKeyMissing { missing }, sink))
}

/// Per key, at least one occurrence must equal the expected value.
///
/// # Errors
///
/// [`CheckError::BodyKeyValueMismatch`] listing each key without a
/// matching occurrence together with everything that was found.
pub fn assert_body_key_values(
    body: &Value,
    expected: &BTreeMap<String, Value>,
    sink: &dyn DiagnosticSink,
) -> Result<(), CheckError> {
    info!("checking {} body key values", expected.len());
    let mismatches: Vec<ValueMismatch> = expected
        .iter()
        .filter_map(|(key, want)| {
            let found = extract_json(body, key);
            (!found.iter().any(|v| values_equal(v, want))).then(|| ValueMismatch {
                key: key.clone(),
                expected: want.clone(),
                found,
            })
        })
        .collect();
    if mismatches.is_empty() {
        debug!("all body key values match");
        return Ok(());
    }
    sink.attach(&body.to_string(), "Response Body", AttachmentKind::Json);
    Err(fail(CheckError::BodyKeyValueMismatch { mismatches }, sink))
}

// ── XML body primitives ──

/// Every tag must be the root element or one of its descendants.
///
/// # Errors
///
/// [`CheckError::TagMissing`] listing the absent tags.
pub fn assert_xml_tag_present<S: AsRef<str>>(
    root: &XmlElement,
    tags: &[S],
    sink: &dyn DiagnosticSink,
) -> Result<(), CheckError> {
    info!("checking {} XML tags are present", tags.len());
    let missing: Vec<String> = tags
        .iter()
        .map(AsRef::as_ref)
        .filter(|t| root.name != *t && root.find_all(t).is_empty())
        .map(str::to_string)
        .collect();
    if missing.is_empty() {
        debug!("all XML tags present");
        return Ok(());
    }
    let tree: Vec<&str> = std::iter::once(root)
        .chain(root.descendants())
        .map(|el| el.name.as_str())
        .collect();
    sink.attach(&tree.join("\n"), "Available Tags", AttachmentKind::Text);
    Err(fail(CheckError::TagMissing { missing }, sink))
}

/// Per tag, at least one descendant's text must equal the expected value
/// rendered as text.
///
/// # Errors
///
/// [`CheckError::TagValueMismatch`] listing each tag without a matching
/// occurrence.
pub fn assert_xml_tag_value(
    root: &XmlElement,
    expected: &BTreeMap<String, Value>,
    sink: &dyn DiagnosticSink,
) -> Result<(), CheckError> {
    info!("checking {} XML tag values", expected.len());
    let mismatches: Vec<ValueMismatch> = expected
        .iter()
        .filter_map(|(tag, want)| {
            let want_text = expected_text(want);
            let found = extract_xml(root, tag);
            (!found.iter().any(|v| v.as_str() == Some(want_text.as_str()))).then(|| {
                ValueMismatch {
                    key: tag.clone(),
                    expected: Value::String(want_text),
                    found,
                }
            })
        })
        .collect();
    if mismatches.is_empty() {
        debug!("all XML tag values match");
        return Ok(());
    }
    Err(fail(CheckError::TagValueMismatch { mismatches }, sink))
}

// ── Schema primitives ──

fn schema_failure(
    schema: &str,
    issues: Vec<SchemaIssue>,
    sink: &dyn DiagnosticSink,
) -> Result<(), CheckError> {
    if issues.is_empty() {
        debug!("body conforms to schema {schema}");
        return Ok(());
    }
    Err(fail(
        CheckError::SchemaValidation {
            schema: schema.to_string(),
            issues,
        },
        sink,
    ))
}

/// # Errors
///
/// [`CheckError::SchemaValidation`] with the structural diff, or
/// [`CheckError::SchemaInvalid`] if a raw JSON Schema does not compile.
pub fn assert_json_schema(
    body: &Value,
    schema: &JsonSchema,
    sink: &dyn DiagnosticSink,
) -> Result<(), CheckError> {
    info!("validating JSON body against schema {}", schema.name());
    let issues = schema.validate(body).map_err(|reason| {
        fail(
            CheckError::SchemaInvalid {
                schema: schema.name().to_string(),
                reason,
            },
            sink,
        )
    })?;
    if !issues.is_empty() {
        sink.attach(
            &serde_json::to_string_pretty(body).unwrap_or_else(|_| body.to_string()),
            "Response Body",
            AttachmentKind::Json,
        );
    }
    schema_failure(schema.name(), issues, sink)
}

/// Load the XSD at `xsd_path` and validate `root` against it.
///
/// # Errors
///
/// [`CheckError::XsdResourceMissing`] if the file cannot be read,
/// [`CheckError::SchemaInvalid`] if it is outside the supported subset,
/// [`CheckError::SchemaValidation`] with one issue per violation.
pub fn assert_xml_schema(
    root: &XmlElement,
    xsd_path: &Path,
    sink: &dyn DiagnosticSink,
) -> Result<(), CheckError> {
    info!("validating XML body against {}", xsd_path.display());
    let xsd = XsdSchema::load(xsd_path).map_err(|e| {
        let err = match e {
            XsdError::Missing { path, reason } => CheckError::XsdResourceMissing { path, reason },
            XsdError::Invalid { path, reason } => CheckError::SchemaInvalid {
                schema: path.display().to_string(),
                reason,
            },
        };
        fail(err, sink)
    })?;
    let issues = xsd.validate(root);
    schema_failure(&xsd_path.display().to_string(), issues, sink)
}
