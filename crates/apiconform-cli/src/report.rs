//! Run reports under the report directory
//!
//! Each `apiconform run` with a report directory gets its own session
//! folder `{host_port}_{timestamp}/` holding the attachments written during
//! the run plus `summary.json`, `cases.json` and a `config.toml` snapshot.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use apiconform_core::{Config, SuiteReport};

/// Everything persisted for one suite run.
pub struct ReportData<'a> {
    pub config: &'a Config,
    pub suite: &'a Path,
    pub report: &'a SuiteReport,
    pub duration_secs: f64,
}

/// `{base}/{host_port}_{timestamp}` for a run against `base_url`.
pub fn session_dir(base: &Path, base_url: &str) -> PathBuf {
    let (compact, _) = timestamps();
    base.join(format!("{}_{compact}", host_port(base_url)))
}

/// Write the run's summary files into `dir`.
pub fn save_report(dir: &Path, data: &ReportData) -> Result<(), std::io::Error> {
    std::fs::create_dir_all(dir)?;

    // The token is a live session credential; keep it out of the snapshot.
    let mut snapshot = data.config.clone();
    if snapshot.x_challenger.is_some() {
        snapshot.x_challenger = Some("***".into());
    }
    let config_toml =
        toml::to_string_pretty(&snapshot).map_err(|e| std::io::Error::other(e.to_string()))?;
    std::fs::write(dir.join("config.toml"), config_toml)?;

    let (_, iso) = timestamps();
    let summary = serde_json::json!({
        "verdict": {
            "status": if data.report.is_pass() { "PASS" } else { "FAIL" },
            "exit_code": data.report.exit_code(),
            "reason": data.report.reason(),
        },
        "stats": {
            "total": data.report.total(),
            "passed": data.report.passed,
            "failed": data.report.failed,
            "setup_errors": data.report.setup_errors,
            "errors": data.report.errors,
        },
        "meta": {
            "timestamp": iso,
            "duration_secs": data.duration_secs,
            "base_url": data.config.base_url,
            "suite": data.suite.display().to_string(),
        },
    });
    std::fs::write(
        dir.join("summary.json"),
        serde_json::to_string_pretty(&summary).map_err(std::io::Error::other)?,
    )?;
    std::fs::write(
        dir.join("cases.json"),
        serde_json::to_string_pretty(&data.report.cases).map_err(std::io::Error::other)?,
    )?;
    Ok(())
}

/// `"http://localhost:4567/path"` → `"localhost_4567"`
fn host_port(url: &str) -> String {
    url.split("://")
        .nth(1)
        .unwrap_or(url)
        .split('/')
        .next()
        .filter(|h| !h.is_empty())
        .unwrap_or("unknown")
        .replace(':', "_")
}

/// Current UTC time as `20261019T193000` and `2026-10-19T19:30:00Z`.
fn timestamps() -> (String, String) {
    let secs = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let (y, mo, d) = date_from_epoch_days((secs / 86_400) as i64);
    let tod = secs % 86_400;
    let (h, mi, s) = (tod / 3600, (tod % 3600) / 60, tod % 60);
    (
        format!("{y:04}{mo:02}{d:02}T{h:02}{mi:02}{s:02}"),
        format!("{y:04}-{mo:02}-{d:02}T{h:02}:{mi:02}:{s:02}Z"),
    )
}

/// Days since 1970-01-01 to a proleptic Gregorian (year, month, day).
///
/// Hinnant's `civil_from_days`:
/// <https://howardhinnant.github.io/date_algorithms.html#civil_from_days>
fn date_from_epoch_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097) as u32;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = i64::from(yoe) + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use apiconform_core::{CaseOutcome, Endpoint, ExpectedChecks, TestCase};

    use super::*;

    #[test]
    fn host_port_from_urls() {
        assert_eq!(host_port("http://localhost:4567"), "localhost_4567");
        assert_eq!(
            host_port("https://apichallenges.herokuapp.com/"),
            "apichallenges.herokuapp.com"
        );
        assert_eq!(host_port("http://"), "unknown");
    }

    #[test]
    fn epoch_days_to_dates() {
        assert_eq!(date_from_epoch_days(0), (1970, 1, 1));
        assert_eq!(date_from_epoch_days(20_745), (2026, 10, 19));
        assert_eq!(date_from_epoch_days(11_016), (2000, 2, 29));
        assert_eq!(date_from_epoch_days(-1), (1969, 12, 31));
    }

    #[test]
    fn session_dir_is_named_after_host() {
        let dir = session_dir(Path::new("reports"), "http://localhost:4567");
        let name = dir.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("localhost_4567_"), "{name}");
        assert_eq!(dir.parent(), Some(Path::new("reports")));
    }

    #[test]
    fn save_report_masks_token() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            x_challenger: Some("secret-token".into()),
            ..Config::default()
        };
        let case = TestCase {
            name: "list challenges".into(),
            endpoint: Endpoint::Challenges,
            headers: Default::default(),
            query: Default::default(),
            checks: ExpectedChecks::default(),
            verify_filter: false,
        };
        let report = SuiteReport::from_outcomes(vec![CaseOutcome::pass(&case, 200, 0.1)]);
        let data = ReportData {
            config: &config,
            suite: Path::new("suites/api_challenges.toml"),
            report: &report,
            duration_secs: 0.2,
        };
        save_report(dir.path(), &data).unwrap();

        let snapshot = std::fs::read_to_string(dir.path().join("config.toml")).unwrap();
        assert!(!snapshot.contains("secret-token"));
        let summary: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("summary.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(summary["verdict"]["status"], "PASS");
        assert_eq!(summary["verdict"]["exit_code"], 0);
        assert_eq!(summary["stats"]["passed"], 1);
        assert!(dir.path().join("cases.json").exists());
    }
}
