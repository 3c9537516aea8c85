//! Harness configuration

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Harness configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the API under test
    pub base_url: String,

    /// Request timeout in seconds
    pub timeout: f64,

    /// Challenger session token, sent as `X-Challenger`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x_challenger: Option<String>,

    /// `log` level filter: off, error, warn, info, debug, trace
    pub log_level: String,

    /// Directory holding `challenges.xsd` and `todos.xsd`
    pub schema_dir: PathBuf,

    /// Directory for diagnostic attachments (disabled when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_dir: Option<PathBuf>,

    /// Extra headers sent with every request
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "https://apichallenges.herokuapp.com".to_string(),
            timeout: 10.0,
            x_challenger: None,
            log_level: "debug".to_string(),
            schema_dir: PathBuf::from("schemas"),
            report_dir: None,
            headers: HashMap::new(),
        }
    }
}

impl Config {
    /// Load config from file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e.to_string()))?;

        if is_json(path) {
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
        }
    }

    /// Path of the first existing default config file, if any.
    #[must_use]
    pub fn find_default() -> Option<PathBuf> {
        [".apiconform.toml", ".apiconform.json", "apiconform.toml"]
            .into_iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
    }

    /// Load from default location (.apiconform.toml)
    ///
    /// # Errors
    ///
    /// Returns error if a config file exists but cannot be read or parsed
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::find_default() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    /// Override fields from `API_URL`, `API_TIMEOUT`, `API_X_CHALLENGER`
    /// and `LOG_LEVEL`.
    ///
    /// # Errors
    ///
    /// Returns error if `API_TIMEOUT` is not a number
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    /// Like [`Config::apply_env`], with the dotenv file at `path` as
    /// fallback for variables the process environment does not set. A
    /// missing file is ignored.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed, or a
    /// value is invalid
    pub fn apply_env_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let file_vars = read_env_file(path)?;
        self.apply_vars(|name| {
            std::env::var(name)
                .ok()
                .or_else(|| file_vars.get(name).cloned())
        })
    }

    fn apply_vars<F>(&mut self, var: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = var("API_URL") {
            self.base_url = url;
        }
        if let Some(timeout) = var("API_TIMEOUT") {
            self.timeout = timeout.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("API_TIMEOUT is not a number: '{timeout}'"))
            })?;
        }
        if let Some(token) = var("API_X_CHALLENGER") {
            self.x_challenger = Some(token);
        }
        if let Some(level) = var("LOG_LEVEL") {
            self.log_level = level;
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns the first invalid setting
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        if !(self.timeout.is_finite() && self.timeout > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "timeout must be positive, got {}",
                self.timeout
            )));
        }
        if self
            .x_challenger
            .as_deref()
            .is_some_and(|t| t.trim().is_empty())
        {
            return Err(ConfigError::Invalid("x_challenger must not be blank".into()));
        }
        self.level_filter().map(|_| ())
    }

    /// # Errors
    ///
    /// Returns error if `log_level` is not a known level
    pub fn level_filter(&self) -> Result<log::LevelFilter, ConfigError> {
        log::LevelFilter::from_str(self.log_level.trim())
            .map_err(|_| ConfigError::Invalid(format!("unknown log_level '{}'", self.log_level)))
    }

    /// Write config to file, TOML or JSON by extension
    ///
    /// # Errors
    ///
    /// Returns error if serialization or the write fails
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = if is_json(path) {
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        };
        std::fs::write(path, content)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e.to_string()))
    }

    /// Create example config file
    #[must_use]
    pub fn example() -> &'static str {
        r#"# apiconform configuration

# API under test
base_url = "https://apichallenges.herokuapp.com"

# Request timeout in seconds
timeout = 10.0

# Challenger token (written by `apiconform token`)
# x_challenger = "00000000-0000-0000-0000-000000000000"

# off, error, warn, info, debug, trace
log_level = "info"

# Directory holding challenges.xsd and todos.xsd
schema_dir = "schemas"

# Write request/response attachments here (disabled by default)
# report_dir = "reports"

# Extra headers sent with every request
# [headers]
# User-Agent = "apiconform"
"#
    }
}

/// Variables of a dotenv file, without touching the process environment.
fn read_env_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    match dotenvy::from_path_iter(path) {
        Ok(iter) => iter
            .collect::<Result<HashMap<_, _>, _>>()
            .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display()))),
        Err(e) if e.not_found() => Ok(HashMap::new()),
        Err(e) => Err(ConfigError::Io(path.to_path_buf(), e.to_string())),
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read {0}: {1}")]
    Io(PathBuf, String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Invalid config: {0}")]
    Invalid(String),
    #[error("Serialization error: {0}")]
    Serialize(String),
}
