//! apiconform-core: Response verification engine for API conformance tests
//!
//! This crate extracts values from JSON and XML bodies, validates bodies
//! against JSON descriptors and XSD documents, and composes assertion
//! primitives into fail-fast check runs with diagnostic attachments.

pub mod assertions;
pub mod checks;
pub mod config;
pub mod document;
pub mod error;
pub mod extract;
pub mod filter;
pub mod profile;
pub mod response;
pub mod schema;
pub mod sink;
pub mod suite;
pub mod xml;
pub mod xsd;

pub use checks::{ExpectedChecks, run_checks, validate_body};
pub use config::{Config, ConfigError};
pub use document::Document;
pub use error::{CheckError, FailureClass, FailureKind};
pub use extract::{ExtractionResult, extract, extract_keys};
pub use filter::verify_query_filter;
pub use profile::EntityProfile;
pub use response::{BodyFormat, Headers, MediaType, Response};
pub use sink::{
    AttachmentKind, DiagnosticSink, DirectorySink, LogSink, MemorySink, NullSink, SinkError,
};
pub use suite::{CaseOutcome, CaseStatus, Endpoint, SuiteError, SuiteFile, SuiteReport, TestCase};
pub use xsd::{XsdError, XsdSchema};
