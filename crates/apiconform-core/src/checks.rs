//! Composite check runner and format-aware body validation

use std::collections::BTreeMap;

use log::{debug, info};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::assertions::{
    assert_body_key_values, assert_body_keys_present, assert_content_type, assert_header_values,
    assert_headers_present, assert_json_schema, assert_response_time, assert_status_code,
    assert_xml_schema, assert_xml_tag_present, assert_xml_tag_value,
};
use crate::document::Document;
use crate::error::CheckError;
use crate::profile::EntityProfile;
use crate::response::{BodyFormat, MediaType, Response};
use crate::sink::{DiagnosticSink, attach_body};

/// Expectations for one response. Absent fields are not checked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct ExpectedChecks {
    /// Exact status code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,

    /// Ceiling on elapsed time, in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time: Option<f64>,

    /// Header names that must be present (case-insensitive)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers_present: Option<Vec<String>>,

    /// Header name → exact expected value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_values: Option<BTreeMap<String, String>>,

    /// Validate the body against the entity's JSON schema or XSD
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub schema: bool,

    /// Keys (JSON) or tags (XML) that must occur at least once
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_present: Option<Vec<String>>,

    /// Key or tag → value that at least one occurrence must equal
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_value: Option<BTreeMap<String, serde_json::Value>>,

    /// Headers that were sent; an XML `Accept` switches body checks to XML
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_headers: Option<BTreeMap<String, String>>,
}

impl ExpectedChecks {
    /// Whether the request asked for XML.
    #[must_use]
    pub fn expects_xml(&self) -> bool {
        self.request_headers.as_ref().is_some_and(|headers| {
            headers.iter().any(|(name, value)| {
                name.eq_ignore_ascii_case("accept")
                    && MediaType::from_content_type(value) == MediaType::Xml
            })
        })
    }

    /// Body format the response is expected in.
    #[must_use]
    pub fn expected_format(&self) -> BodyFormat {
        if self.expects_xml() {
            BodyFormat::Xml
        } else {
            BodyFormat::Json
        }
    }

    const fn has_body_checks(&self) -> bool {
        self.schema || self.key_present.is_some() || self.key_value.is_some()
    }
}

/// Parse the body in `format`.
///
/// # Errors
///
/// [`CheckError::BodyNotParsable`] with the parser message.
pub fn parse_body(
    response: &Response,
    format: BodyFormat,
    sink: &dyn DiagnosticSink,
) -> Result<Document, CheckError> {
    Document::parse(response.body(), format).map_err(|reason| {
        attach_body(sink, response, "Unparsable Body");
        let err = CheckError::BodyNotParsable { format, reason };
        log::error!("{err}");
        err
    })
}

fn validate_document(
    doc: &Document,
    profile: &EntityProfile,
    sink: &dyn DiagnosticSink,
) -> Result<(), CheckError> {
    let not_configured = || {
        let err = CheckError::SchemaNotConfigured {
            format: doc.format(),
            profile: profile.name().to_string(),
        };
        log::error!("{err}");
        err
    };
    match doc {
        Document::Json(body) => {
            let schema = profile.json_schema().ok_or_else(not_configured)?;
            assert_json_schema(body, schema, sink)
        }
        Document::Xml(root) => {
            let xsd = profile.xsd_path().ok_or_else(not_configured)?;
            assert_xml_schema(root, xsd, sink)
        }
    }
}

/// Check that the response is in the requested format and conforms to the
/// profile's schema for it.
///
/// # Errors
///
/// [`CheckError::ContentTypeMismatch`] before any parsing,
/// [`CheckError::BodyNotParsable`], [`CheckError::SchemaNotConfigured`],
/// or whatever the schema validator reports.
pub fn validate_body(
    response: &Response,
    checks: &ExpectedChecks,
    profile: &EntityProfile,
    sink: &dyn DiagnosticSink,
) -> Result<(), CheckError> {
    let format = checks.expected_format();
    assert_content_type(response, format, sink)?;
    let doc = parse_body(response, format, sink)?;
    validate_document(&doc, profile, sink)
}

/// Run every configured check in fixed order, stopping at the first
/// failure.
///
/// Body checks run only for 2xx responses. The content type is asserted
/// for every 2xx response that has a body or a body check.
///
/// # Errors
///
/// The first [`CheckError`] raised.
pub fn run_checks(
    response: &Response,
    checks: &ExpectedChecks,
    profile: &EntityProfile,
    sink: &dyn DiagnosticSink,
) -> Result<(), CheckError> {
    info!("running checks against profile '{}'", profile.name());

    if let Some(expected) = checks.status_code {
        assert_status_code(response, expected, sink)?;
    }
    if let Some(limit) = checks.response_time {
        assert_response_time(response, limit, sink)?;
    }
    if let Some(names) = &checks.headers_present {
        assert_headers_present(response, names, sink)?;
    }
    if let Some(values) = &checks.header_values {
        assert_header_values(response, values, sink)?;
    }

    if !response.is_success() {
        debug!("status {} is not 2xx, body checks skipped", response.status());
        return Ok(());
    }
    if response.body().is_empty() && !checks.has_body_checks() {
        debug!("empty body and no body checks");
        return Ok(());
    }

    let format = checks.expected_format();
    assert_content_type(response, format, sink)?;
    if !checks.has_body_checks() {
        info!("all checks passed");
        return Ok(());
    }

    let doc = parse_body(response, format, sink)?;
    if checks.schema {
        validate_document(&doc, profile, sink)?;
    }
    match &doc {
        Document::Json(body) => {
            if let Some(keys) = &checks.key_present {
                assert_body_keys_present(body, keys, sink)?;
            }
            if let Some(expected) = &checks.key_value {
                assert_body_key_values(body, expected, sink)?;
            }
        }
        Document::Xml(root) => {
            if let Some(tags) = &checks.key_present {
                assert_xml_tag_present(root, tags, sink)?;
            }
            if let Some(expected) = &checks.key_value {
                assert_xml_tag_value(root, expected, sink)?;
            }
        }
    }

    info!("all checks passed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use serde_json::json;

    use super::*;
    use crate::error::FailureKind;
    use crate::sink::{MemorySink, NullSink};

    fn challenges_response() -> Response {
        Response::new(
            200,
            r#"{"challenges":[{"id":59,"name":"X","description":null,"status":false}]}"#,
        )
        .with_header("Content-Type", "application/json")
    }

    fn profile() -> EntityProfile {
        EntityProfile::challenges(Path::new("schemas"))
    }

    #[test]
    fn expects_xml_only_for_xml_accept() {
        let mut checks = ExpectedChecks::default();
        assert!(!checks.expects_xml());
        checks.request_headers = Some(BTreeMap::from([(
            "accept".to_string(),
            "application/xml".to_string(),
        )]));
        assert!(checks.expects_xml());
        checks.request_headers = Some(BTreeMap::from([(
            "Accept".to_string(),
            "application/json".to_string(),
        )]));
        assert!(!checks.expects_xml());
    }

    #[test]
    fn empty_checks_pass() {
        run_checks(&challenges_response(), &ExpectedChecks::default(), &profile(), &NullSink)
            .unwrap();
    }

    #[test]
    fn full_json_pass() {
        let checks = ExpectedChecks {
            status_code: Some(200),
            response_time: Some(5.0),
            headers_present: Some(vec!["content-type".into()]),
            header_values: Some(BTreeMap::from([(
                "Content-Type".into(),
                "application/json".into(),
            )])),
            schema: true,
            key_present: Some(vec!["challenges".into(), "id".into()]),
            key_value: Some(BTreeMap::from([("id".into(), json!(59))])),
            request_headers: None,
        };
        let sink = MemorySink::new();
        run_checks(&challenges_response(), &checks, &profile(), &sink).unwrap();
        assert!(sink.is_empty());
    }

    #[test]
    fn status_is_checked_before_headers() {
        let checks = ExpectedChecks {
            status_code: Some(201),
            headers_present: Some(vec!["location".into()]),
            ..Default::default()
        };
        let err = run_checks(&challenges_response(), &checks, &profile(), &NullSink).unwrap_err();
        assert_eq!(err.kind(), FailureKind::StatusMismatch);
    }

    #[test]
    fn non_success_skips_body_checks() {
        let response = Response::new(404, "not json").with_header("Content-Type", "text/html");
        let checks = ExpectedChecks {
            status_code: Some(404),
            schema: true,
            key_present: Some(vec!["id".into()]),
            ..Default::default()
        };
        run_checks(&response, &checks, &profile(), &NullSink).unwrap();
    }

    #[test]
    fn xml_accept_with_json_body_is_content_type_mismatch() {
        let checks = ExpectedChecks {
            key_present: Some(vec!["id".into()]),
            request_headers: Some(BTreeMap::from([(
                "Accept".into(),
                "application/xml".into(),
            )])),
            ..Default::default()
        };
        let err = run_checks(&challenges_response(), &checks, &profile(), &NullSink).unwrap_err();
        assert_eq!(err.kind(), FailureKind::ContentTypeMismatch);
    }

    #[test]
    fn schema_without_descriptor_is_setup_failure() {
        let checks = ExpectedChecks {
            schema: true,
            ..Default::default()
        };
        let err = run_checks(
            &challenges_response(),
            &checks,
            &EntityProfile::new("bare"),
            &NullSink,
        )
        .unwrap_err();
        assert_eq!(err.kind(), FailureKind::SchemaNotConfigured);
        assert!(err.is_setup_failure());
    }

    #[test]
    fn schema_failure_precedes_key_checks() {
        let response = Response::new(
            200,
            r#"{"challenges":[{"id":"59","name":"X","status":false}]}"#,
        )
        .with_header("content-type", "application/json");
        let checks = ExpectedChecks {
            schema: true,
            key_present: Some(vec!["missing".into()]),
            ..Default::default()
        };
        let err = run_checks(&response, &checks, &profile(), &NullSink).unwrap_err();
        assert_eq!(err.kind(), FailureKind::SchemaValidation);
    }

    #[test]
    fn validate_body_rejects_wrong_content_type_before_parsing() {
        let response = Response::new(200, "{").with_header("content-type", "text/plain");
        let err = validate_body(&response, &ExpectedChecks::default(), &profile(), &NullSink)
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::ContentTypeMismatch);
    }

    #[test]
    fn checks_deserialize_from_toml() {
        let checks: ExpectedChecks = toml::from_str(
            r#"
            status_code = 200
            schema = true
            key_present = ["todos"]

            [key_value]
            id = 3
            doneStatus = false
            "#,
        )
        .unwrap();
        assert_eq!(checks.status_code, Some(200));
        assert!(checks.schema);
        let kv = checks.key_value.unwrap();
        assert_eq!(kv["id"], json!(3));
        assert_eq!(kv["doneStatus"], json!(false));
    }

    #[test]
    fn unknown_check_is_rejected() {
        let parsed: Result<ExpectedChecks, _> = toml::from_str("status = 200");
        assert!(parsed.is_err());
    }
}
