//! Diagnostic attachments
//!
//! Checks hand their evidence (expected values, actual values, raw bodies)
//! to a [`DiagnosticSink`]. Sinks only observe: attaching never fails from
//! the caller's point of view and never changes a check outcome.
//!
//! ```text
//! reports/
//! ├── 001_request.txt
//! ├── 002_response_body.json
//! ├── 003_status_code_mismatch.txt
//! └── index.json
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::response::{MediaType, Response};
use crate::xml::format_xml;

/// Content type of an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Text,
    Json,
    Xml,
}

impl AttachmentKind {
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Json => "json",
            Self::Xml => "xml",
        }
    }
}

/// Receiver of diagnostic attachments.
pub trait DiagnosticSink {
    fn attach(&self, content: &str, label: &str, kind: AttachmentKind);
}

impl<T: DiagnosticSink + ?Sized> DiagnosticSink for &T {
    fn attach(&self, content: &str, label: &str, kind: AttachmentKind) {
        (**self).attach(content, label, kind);
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn attach(&self, _content: &str, _label: &str, _kind: AttachmentKind) {}
}

/// Forwards attachments to the `log` facade at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn attach(&self, content: &str, label: &str, kind: AttachmentKind) {
        log::debug!("[{label}] ({}):\n{content}", kind.extension());
    }
}

/// One recorded attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub label: String,
    pub kind: AttachmentKind,
    pub content: String,
}

/// Keeps attachments in memory, in arrival order.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<Attachment>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Attachment>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn attachments(&self) -> Vec<Attachment> {
        self.lock().clone()
    }

    /// Attachments with the given label.
    #[must_use]
    pub fn find(&self, label: &str) -> Vec<Attachment> {
        self.lock()
            .iter()
            .filter(|a| a.label == label)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove and return everything recorded so far.
    pub fn take(&self) -> Vec<Attachment> {
        std::mem::take(&mut *self.lock())
    }
}

impl DiagnosticSink for MemorySink {
    fn attach(&self, content: &str, label: &str, kind: AttachmentKind) {
        self.lock().push(Attachment {
            label: label.to_string(),
            kind,
            content: content.to_string(),
        });
    }
}

/// `index.json` written by [`DirectorySink`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttachmentIndex {
    pub total: u64,
    pub entries: Vec<AttachmentIndexEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentIndexEntry {
    pub label: String,
    pub kind: AttachmentKind,
    /// Filename within the report directory
    pub file: String,
}

/// Writes each attachment to its own numbered file.
///
/// Write failures are logged and otherwise ignored.
#[derive(Debug)]
pub struct DirectorySink {
    dir: PathBuf,
    index: Mutex<AttachmentIndex>,
}

impl DirectorySink {
    /// Create the sink, creating `dir` if needed.
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| SinkError::Io(format!("create {}: {e}", dir.display())))?;
        Ok(Self {
            dir,
            index: Mutex::new(AttachmentIndex::default()),
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn index(&self) -> AttachmentIndex {
        self.index
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn write(&self, content: &str, label: &str, kind: AttachmentKind) -> Result<(), SinkError> {
        let mut index = self.index.lock().unwrap_or_else(PoisonError::into_inner);
        let file = sanitize_filename(index.total + 1, label, kind);
        let path = self.dir.join(&file);
        std::fs::write(&path, content)
            .map_err(|e| SinkError::Io(format!("write {}: {e}", path.display())))?;

        index.total += 1;
        index.entries.push(AttachmentIndexEntry {
            label: label.to_string(),
            kind,
            file,
        });

        let index_path = self.dir.join("index.json");
        let json = serde_json::to_string_pretty(&*index)
            .map_err(|e| SinkError::Serialize(e.to_string()))?;
        std::fs::write(&index_path, json)
            .map_err(|e| SinkError::Io(format!("write {}: {e}", index_path.display())))
    }
}

impl DiagnosticSink for DirectorySink {
    fn attach(&self, content: &str, label: &str, kind: AttachmentKind) {
        if let Err(e) = self.write(content, label, kind) {
            log::warn!("attachment '{label}' not saved: {e}");
        }
    }
}

/// Maximum characters kept from the label in the filename.
const MAX_LABEL_LEN: usize = 120;

/// "Response Body" #2 as JSON → "002_response_body.json"
fn sanitize_filename(seq: u64, label: &str, kind: AttachmentKind) -> String {
    let sanitized: String = label
        .chars()
        .take(MAX_LABEL_LEN)
        .map(|c| match c {
            'A'..='Z' => c.to_ascii_lowercase(),
            'a'..='z' | '0'..='9' | '-' | '.' => c,
            _ => '_',
        })
        .collect();
    format!("{seq:03}_{sanitized}.{}", kind.extension())
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialize(String),
}

// ── Request / response artifacts ──

/// Headers masked in request artifacts.
const SENSITIVE_HEADERS: &[&str] = &["authorization", "cookie", "proxy-authorization"];

const MASK: &str = "***";

fn header_lines<'a>(headers: impl Iterator<Item = (&'a str, &'a str)>, mask: bool) -> String {
    headers
        .map(|(k, v)| {
            let value = if mask && SENSITIVE_HEADERS.iter().any(|h| k.eq_ignore_ascii_case(h)) {
                MASK
            } else {
                v
            };
            format!("{k}: {value}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Attach the outgoing request: request line, headers and query parameters.
pub fn attach_request(
    sink: &dyn DiagnosticSink,
    method: &str,
    url: &str,
    headers: &[(String, String)],
    query: &[(String, String)],
) {
    sink.attach(&format!("{method} {url}"), "Request", AttachmentKind::Text);
    if !headers.is_empty() {
        let lines = header_lines(headers.iter().map(|(k, v)| (k.as_str(), v.as_str())), true);
        sink.attach(&lines, "Request Headers", AttachmentKind::Text);
    }
    if !query.is_empty() {
        let lines = query
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("\n");
        sink.attach(&lines, "Query Parameters", AttachmentKind::Text);
    }
}

/// Attach the received response: status line, headers and body.
///
/// JSON bodies are attached verbatim, XML bodies pretty-printed, anything
/// else as text.
pub fn attach_response(sink: &dyn DiagnosticSink, response: &Response) {
    let status_line = match response.reason() {
        Some(reason) => format!("{} {reason}", response.status()),
        None => response.status().to_string(),
    };
    sink.attach(&status_line, "Response Status", AttachmentKind::Text);
    if !response.headers().is_empty() {
        sink.attach(
            &header_lines(response.headers().iter(), false),
            "Response Headers",
            AttachmentKind::Text,
        );
    }
    attach_body(sink, response, "Response Body");
}

/// Attach a response body under `label`, typed by its declared content type.
pub fn attach_body(sink: &dyn DiagnosticSink, response: &Response, label: &str) {
    let body = response.body();
    match response.media_type() {
        Some(MediaType::Json) => sink.attach(body, label, AttachmentKind::Json),
        Some(MediaType::Xml) => sink.attach(&format_xml(body), label, AttachmentKind::Xml),
        _ => sink.attach(body, label, AttachmentKind::Text),
    }
}
