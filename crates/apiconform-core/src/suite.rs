//! Declarative test suites and their reports
//!
//! A suite file lists cases; each case names an endpoint, the request
//! headers and query to send, and the [`ExpectedChecks`] to run on the
//! response.
//!
//! ```toml
//! [[cases]]
//! name = "todos filtered by doneStatus"
//! endpoint = "todos"
//! query = { doneStatus = "true" }
//! verify_filter = true
//! checks = { status_code = 200, schema = true }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::checks::ExpectedChecks;
use crate::error::{CheckError, FailureClass, FailureKind};
use crate::profile::EntityProfile;

/// Endpoint family a case talks to.
///
/// Written as `challenges`, `todos`, `todos/<id>` or `challenger`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Endpoint {
    Challenges,
    Todos,
    Todo { id: u64 },
    /// `POST /challenger`
    NewChallenger,
}

impl Endpoint {
    #[must_use]
    pub const fn method(self) -> &'static str {
        match self {
            Self::NewChallenger => "POST",
            _ => "GET",
        }
    }

    /// Schemas that apply to this endpoint's responses.
    #[must_use]
    pub fn profile(self, schema_dir: &Path) -> EntityProfile {
        match self {
            Self::Challenges => EntityProfile::challenges(schema_dir),
            Self::Todos | Self::Todo { .. } => EntityProfile::todos(schema_dir),
            Self::NewChallenger => EntityProfile::new("challenger"),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Challenges => f.write_str("challenges"),
            Self::Todos => f.write_str("todos"),
            Self::Todo { id } => write!(f, "todos/{id}"),
            Self::NewChallenger => f.write_str("challenger"),
        }
    }
}

impl TryFrom<String> for Endpoint {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.trim().trim_matches('/') {
            "challenges" => Ok(Self::Challenges),
            "todos" => Ok(Self::Todos),
            "challenger" => Ok(Self::NewChallenger),
            other => other
                .strip_prefix("todos/")
                .and_then(|id| id.parse().ok())
                .map(|id| Self::Todo { id })
                .ok_or_else(|| {
                    format!(
                        "unknown endpoint '{s}' (expected challenges, todos, todos/<id> or challenger)"
                    )
                }),
        }
    }
}

impl From<Endpoint> for String {
    fn from(e: Endpoint) -> Self {
        e.to_string()
    }
}

/// One request and the checks to run on its response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TestCase {
    pub name: String,

    /// `challenges`, `todos`, `todos/<id>` or `challenger`
    #[schemars(with = "String")]
    pub endpoint: Endpoint,

    /// Request headers, e.g. `Accept = "application/xml"`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    /// Query parameters
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub query: BTreeMap<String, String>,

    #[serde(default)]
    pub checks: ExpectedChecks,

    /// Require every returned record to honor the query filters
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub verify_filter: bool,
}

impl TestCase {
    /// Checks with `request_headers` defaulted to the case headers.
    #[must_use]
    pub fn effective_checks(&self) -> ExpectedChecks {
        let mut checks = self.checks.clone();
        if checks.request_headers.is_none() && !self.headers.is_empty() {
            checks.request_headers = Some(self.headers.clone());
        }
        checks
    }

    #[must_use]
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.query
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// A suite file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SuiteFile {
    #[serde(default)]
    pub cases: Vec<TestCase>,
}

impl SuiteFile {
    /// Load a suite from TOML, JSON or YAML.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, parsed or is inconsistent
    pub fn load(path: &Path) -> Result<Self, SuiteError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SuiteError::Io(path.to_path_buf(), e.to_string()))?;
        let suite = Self::parse(path, &content)?;
        suite.validate()?;
        Ok(suite)
    }

    /// Parse by extension, sniffing the content when the extension is unknown.
    ///
    /// # Errors
    ///
    /// Returns error if the content is not a valid suite in the detected format
    pub fn parse(path: &Path, content: &str) -> Result<Self, SuiteError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        match ext.as_str() {
            "toml" => parse_toml(content),
            "yaml" | "yml" => parse_yaml(content),
            "json" => parse_json(content),
            _ => {
                // Content sniffing: trimmed first char, then TOML table headers
                let trimmed = content.trim_start();
                if trimmed.starts_with('{') {
                    parse_json(content)
                } else if trimmed.starts_with("[[") {
                    parse_toml(content)
                } else {
                    parse_yaml(content)
                }
            }
        }
    }

    /// # Errors
    ///
    /// Returns error on blank or duplicate case names
    pub fn validate(&self) -> Result<(), SuiteError> {
        let mut seen = std::collections::HashSet::new();
        for case in &self.cases {
            if case.name.trim().is_empty() {
                return Err(SuiteError::Invalid("case with blank name".into()));
            }
            if !seen.insert(case.name.as_str()) {
                return Err(SuiteError::Invalid(format!(
                    "duplicate case name '{}'",
                    case.name
                )));
            }
        }
        Ok(())
    }

    /// Example suite written by `init`.
    #[must_use]
    pub fn example() -> &'static str {
        r#"# apiconform suite

[[cases]]
name = "list challenges"
endpoint = "challenges"
checks = { status_code = 200, response_time = 5.0, headers_present = ["content-type"], schema = true }

[[cases]]
name = "list todos as XML"
endpoint = "todos"
headers = { Accept = "application/xml" }
checks = { status_code = 200, schema = true, key_present = ["todo", "doneStatus"] }

[[cases]]
name = "todos filtered by doneStatus"
endpoint = "todos"
query = { doneStatus = "true" }
verify_filter = true
checks = { status_code = 200, schema = true }

[[cases]]
name = "single todo"
endpoint = "todos/3"

[cases.checks]
status_code = 200
schema = true
key_value = { id = 3 }

[[cases]]
name = "missing todo"
endpoint = "todos/99999"
checks = { status_code = 404 }
"#
    }
}

fn parse_toml(content: &str) -> Result<SuiteFile, SuiteError> {
    toml::from_str(content).map_err(|e| SuiteError::Parse(format!("Invalid TOML: {e}")))
}

fn parse_yaml(content: &str) -> Result<SuiteFile, SuiteError> {
    serde_yml::from_str(content).map_err(|e| SuiteError::Parse(format!("Invalid YAML: {e}")))
}

fn parse_json(content: &str) -> Result<SuiteFile, SuiteError> {
    serde_json::from_str(content).map_err(|e| SuiteError::Parse(format!("Invalid JSON: {e}")))
}

#[derive(Debug, thiserror::Error)]
pub enum SuiteError {
    #[error("Cannot read {0}: {1}")]
    Io(PathBuf, String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Invalid suite: {0}")]
    Invalid(String),
}

/// Outcome class of one case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Pass,
    /// The response violated an expectation
    Fail,
    /// The case or its schemas are misconfigured
    SetupError,
    /// The request could not be completed
    Error,
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => f.write_str("PASS"),
            Self::Fail => f.write_str("FAIL"),
            Self::SetupError => f.write_str("SETUP"),
            Self::Error => f.write_str("ERROR"),
        }
    }
}

/// Result of running one case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CaseOutcome {
    pub name: String,
    pub endpoint: String,
    pub status: CaseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CaseOutcome {
    #[must_use]
    pub fn pass(case: &TestCase, status_code: u16, elapsed: f64) -> Self {
        Self {
            name: case.name.clone(),
            endpoint: case.endpoint.to_string(),
            status: CaseStatus::Pass,
            status_code: Some(status_code),
            elapsed: Some(elapsed),
            failure: None,
            message: None,
        }
    }

    #[must_use]
    pub fn failed(case: &TestCase, status_code: u16, elapsed: f64, err: &CheckError) -> Self {
        let status = match err.class() {
            FailureClass::Response => CaseStatus::Fail,
            FailureClass::Setup => CaseStatus::SetupError,
        };
        Self {
            name: case.name.clone(),
            endpoint: case.endpoint.to_string(),
            status,
            status_code: Some(status_code),
            elapsed: Some(elapsed),
            failure: Some(err.kind()),
            message: Some(err.to_string()),
        }
    }

    /// The request itself failed; no response to check.
    #[must_use]
    pub fn error(case: &TestCase, message: impl Into<String>) -> Self {
        Self {
            name: case.name.clone(),
            endpoint: case.endpoint.to_string(),
            status: CaseStatus::Error,
            status_code: None,
            elapsed: None,
            failure: None,
            message: Some(message.into()),
        }
    }
}

/// Aggregated result of a suite run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SuiteReport {
    pub cases: Vec<CaseOutcome>,
    pub passed: u64,
    pub failed: u64,
    pub setup_errors: u64,
    pub errors: u64,
}

impl SuiteReport {
    #[must_use]
    pub fn from_outcomes(cases: Vec<CaseOutcome>) -> Self {
        let count = |s: CaseStatus| cases.iter().filter(|c| c.status == s).count() as u64;
        Self {
            passed: count(CaseStatus::Pass),
            failed: count(CaseStatus::Fail),
            setup_errors: count(CaseStatus::SetupError),
            errors: count(CaseStatus::Error),
            cases,
        }
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.cases.len() as u64
    }

    /// PASS requires every case to pass, and at least one case.
    #[must_use]
    pub fn is_pass(&self) -> bool {
        self.total() > 0 && self.passed == self.total()
    }

    /// 0 = all passed, 1 = response failures, 3 = setup/transport errors
    /// or nothing ran.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.total() == 0 || self.setup_errors > 0 || self.errors > 0 {
            3
        } else if self.failed > 0 {
            1
        } else {
            0
        }
    }

    #[must_use]
    pub fn reason(&self) -> String {
        if self.total() == 0 {
            return "No cases were run".to_string();
        }
        if self.is_pass() {
            return format!("All {} cases passed", self.total());
        }
        let mut parts = Vec::new();
        if self.failed > 0 {
            parts.push(format!("{} failed", self.failed));
        }
        if self.setup_errors > 0 {
            parts.push(format!("{} setup errors", self.setup_errors));
        }
        if self.errors > 0 {
            parts.push(format!("{} errors (connection/transport)", self.errors));
        }
        format!("{} of {} cases passed; {}", self.passed, self.total(), parts.join("; "))
    }
}

/// Generate JSON Schema for the suite file format.
#[must_use]
pub fn generate_schema() -> String {
    let schema = schemars::schema_for!(SuiteFile);
    serde_json::to_string_pretty(&schema).expect("schema serialization should not fail")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_parses_from_string() {
        assert_eq!(Endpoint::try_from("todos".to_string()), Ok(Endpoint::Todos));
        assert_eq!(
            Endpoint::try_from("/todos/3".to_string()),
            Ok(Endpoint::Todo { id: 3 })
        );
        assert_eq!(
            Endpoint::try_from("challenger".to_string()),
            Ok(Endpoint::NewChallenger)
        );
        assert!(Endpoint::try_from("todos/x".to_string()).is_err());
        assert!(Endpoint::try_from("users".to_string()).is_err());
    }

    #[test]
    fn endpoint_profiles() {
        let dir = Path::new("schemas");
        assert_eq!(Endpoint::Todo { id: 1 }.profile(dir).name(), "todos");
        assert_eq!(Endpoint::Challenges.profile(dir).name(), "challenges");
        assert!(Endpoint::NewChallenger.profile(dir).json_schema().is_none());
        assert_eq!(Endpoint::NewChallenger.method(), "POST");
    }

    #[test]
    fn example_suite_parses() {
        let suite = SuiteFile::parse(Path::new("suite.toml"), SuiteFile::example()).unwrap();
        suite.validate().unwrap();
        assert_eq!(suite.cases.len(), 5);
        assert_eq!(suite.cases[3].endpoint, Endpoint::Todo { id: 3 });
        assert_eq!(
            suite.cases[3].checks.key_value.as_ref().unwrap()["id"],
            serde_json::json!(3)
        );
        assert!(suite.cases[2].verify_filter);
    }

    #[test]
    fn yaml_and_json_suites_parse() {
        let yaml = "cases:\n  - name: a\n    endpoint: todos\n    checks:\n      status_code: 200\n";
        let suite = SuiteFile::parse(Path::new("s.yaml"), yaml).unwrap();
        assert_eq!(suite.cases[0].checks.status_code, Some(200));

        let json = r#"{"cases":[{"name":"a","endpoint":"todos/2"}]}"#;
        let suite = SuiteFile::parse(Path::new("s.json"), json).unwrap();
        assert_eq!(suite.cases[0].endpoint, Endpoint::Todo { id: 2 });
    }

    #[test]
    fn unknown_extension_is_sniffed() {
        let json = r#"{"cases":[{"name":"a","endpoint":"todos"}]}"#;
        assert_eq!(SuiteFile::parse(Path::new("suite"), json).unwrap().cases.len(), 1);
        let toml = "[[cases]]\nname = \"a\"\nendpoint = \"todos\"\n";
        assert_eq!(SuiteFile::parse(Path::new("suite"), toml).unwrap().cases.len(), 1);
        let yaml = "cases:\n  - name: a\n    endpoint: todos\n";
        assert_eq!(SuiteFile::parse(Path::new("suite"), yaml).unwrap().cases.len(), 1);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let toml = "[[cases]]\nname = \"a\"\nendpoint = \"todos\"\n[[cases]]\nname = \"a\"\nendpoint = \"challenges\"\n";
        let suite = SuiteFile::parse(Path::new("s.toml"), toml).unwrap();
        assert!(matches!(suite.validate(), Err(SuiteError::Invalid(_))));
    }

    #[test]
    fn request_headers_default_to_case_headers() {
        let case = TestCase {
            name: "xml".into(),
            endpoint: Endpoint::Todos,
            headers: BTreeMap::from([("Accept".into(), "application/xml".into())]),
            query: BTreeMap::new(),
            checks: ExpectedChecks::default(),
            verify_filter: false,
        };
        assert!(case.effective_checks().expects_xml());

        let mut explicit = case.clone();
        explicit.checks.request_headers = Some(BTreeMap::new());
        assert!(!explicit.effective_checks().expects_xml());
    }

    fn outcome(status: CaseStatus) -> CaseOutcome {
        CaseOutcome {
            name: "c".into(),
            endpoint: "todos".into(),
            status,
            status_code: None,
            elapsed: None,
            failure: None,
            message: None,
        }
    }

    #[test]
    fn exit_codes() {
        let report = SuiteReport::from_outcomes(vec![outcome(CaseStatus::Pass)]);
        assert_eq!(report.exit_code(), 0);
        assert!(report.is_pass());

        let report =
            SuiteReport::from_outcomes(vec![outcome(CaseStatus::Pass), outcome(CaseStatus::Fail)]);
        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.reason(), "1 of 2 cases passed; 1 failed");

        let report = SuiteReport::from_outcomes(vec![
            outcome(CaseStatus::Fail),
            outcome(CaseStatus::SetupError),
        ]);
        assert_eq!(report.exit_code(), 3);

        let report = SuiteReport::from_outcomes(vec![outcome(CaseStatus::Error)]);
        assert_eq!(report.exit_code(), 3);

        assert_eq!(SuiteReport::default().exit_code(), 3);
    }

    #[test]
    fn setup_failures_map_to_setup_status() {
        let case = TestCase {
            name: "c".into(),
            endpoint: Endpoint::Todos,
            headers: BTreeMap::new(),
            query: BTreeMap::new(),
            checks: ExpectedChecks::default(),
            verify_filter: false,
        };
        let err = CheckError::SchemaNotConfigured {
            format: crate::response::BodyFormat::Xml,
            profile: "todos".into(),
        };
        let out = CaseOutcome::failed(&case, 200, 0.1, &err);
        assert_eq!(out.status, CaseStatus::SetupError);
        assert_eq!(out.failure, Some(FailureKind::SchemaNotConfigured));
    }

    #[test]
    fn report_serializes_snake_case() {
        let json = serde_json::to_value(SuiteReport::from_outcomes(vec![outcome(
            CaseStatus::SetupError,
        )]))
        .unwrap();
        assert_eq!(json["cases"][0]["status"], "setup_error");
        assert_eq!(json["setup_errors"], 1);
    }

    #[test]
    fn generate_schema_is_valid_json() {
        let schema = generate_schema();
        let value: serde_json::Value = serde_json::from_str(&schema).unwrap();
        assert!(value["properties"]["cases"].is_object());
    }
}
