//! Sequential suite execution

use std::path::PathBuf;

use apiconform_core::sink::AttachmentKind;
use apiconform_core::{
    CaseOutcome, DiagnosticSink, SuiteFile, SuiteReport, TestCase, run_checks, verify_query_filter,
};
use log::{error, info, warn};

use crate::client::ApiClient;

/// Runs suite cases one after another against a single client.
pub struct SuiteRunner<'a> {
    client: &'a ApiClient,
    schema_dir: PathBuf,
    sink: &'a dyn DiagnosticSink,
}

impl<'a> SuiteRunner<'a> {
    #[must_use]
    pub fn new(
        client: &'a ApiClient,
        schema_dir: impl Into<PathBuf>,
        sink: &'a dyn DiagnosticSink,
    ) -> Self {
        Self {
            client,
            schema_dir: schema_dir.into(),
            sink,
        }
    }

    #[must_use]
    pub fn run(&self, suite: &SuiteFile) -> SuiteReport {
        if suite.cases.is_empty() {
            warn!("suite has no cases");
        }
        let outcomes = suite.cases.iter().map(|case| self.run_case(case)).collect();
        SuiteReport::from_outcomes(outcomes)
    }

    /// Send the case's request, run its checks, then verify query filters
    /// when asked to.
    #[must_use]
    pub fn run_case(&self, case: &TestCase) -> CaseOutcome {
        info!("case '{}' ({})", case.name, case.endpoint);
        self.sink.attach(&case.name, "Case", AttachmentKind::Text);

        let headers: Vec<(String, String)> = case
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let query = case.query_pairs();

        let response = match self.client.request(case.endpoint, &headers, &query, self.sink) {
            Ok(response) => response,
            Err(e) => {
                error!("case '{}': {e}", case.name);
                return CaseOutcome::error(case, e.to_string());
            }
        };

        let checks = case.effective_checks();
        let profile = case.endpoint.profile(&self.schema_dir);
        let result = run_checks(&response, &checks, &profile, self.sink).and_then(|()| {
            if case.verify_filter && !query.is_empty() {
                verify_query_filter(&response, &query, self.sink)
            } else {
                Ok(())
            }
        });

        match result {
            Ok(()) => {
                info!("case '{}' passed", case.name);
                CaseOutcome::pass(case, response.status(), response.elapsed())
            }
            Err(e) => CaseOutcome::failed(case, response.status(), response.elapsed(), &e),
        }
    }
}
