//! Challenger session token
//!
//! The API issues a token on `POST /challenger` (201, `X-Challenger`
//! header). The token is written back to the config file so later runs
//! reuse the same session.

use std::path::Path;

use apiconform_core::{Config, ConfigError, DiagnosticSink};
use log::info;

use crate::client::{ApiClient, CHALLENGER_HEADER, ClientError};

/// Request a new challenger token.
///
/// # Errors
///
/// Returns error if the request fails, the status is not 201, or the
/// response carries no usable token
pub fn obtain_challenger_token(
    client: &ApiClient,
    sink: &dyn DiagnosticSink,
) -> Result<String, TokenError> {
    let response = client.new_challenger(sink)?;
    if response.status() != 201 {
        return Err(TokenError::UnexpectedStatus(response.status()));
    }
    let token = response
        .header(CHALLENGER_HEADER)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(TokenError::MissingHeader)?;
    info!("obtained challenger token");
    Ok(token.to_string())
}

/// Store `token` in `config` and save it to `path`.
///
/// # Errors
///
/// Returns error if the config cannot be written
pub fn persist_token(config: &mut Config, path: &Path, token: &str) -> Result<(), TokenError> {
    config.x_challenger = Some(token.to_string());
    config.save(path)?;
    info!("challenger token saved to {}", path.display());
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error(transparent)]
    Request(#[from] ClientError),
    #[error("expected status 201 from the challenger endpoint, got {0}")]
    UnexpectedStatus(u16),
    #[error("response has no X-Challenger header")]
    MissingHeader,
    #[error(transparent)]
    Config(#[from] ConfigError),
}
