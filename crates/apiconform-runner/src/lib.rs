//! apiconform-runner: HTTP transport and suite execution

pub mod client;
pub mod suite;
pub mod token;

pub use client::{ApiClient, ApiRoutes, ClientError};
pub use suite::SuiteRunner;
pub use token::{TokenError, obtain_challenger_token, persist_token};
