//! Captured HTTP exchange result
//!
//! A [`Response`] is built once by the transport layer and is read-only
//! afterwards. Header lookups are always case-insensitive.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Body format the engine knows how to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum BodyFormat {
    Json,
    Xml,
}

impl BodyFormat {
    /// Media type a response in this format must declare.
    #[must_use]
    pub const fn media_type(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Xml => "application/xml",
        }
    }
}

impl fmt::Display for BodyFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => f.write_str("JSON"),
            Self::Xml => f.write_str("XML"),
        }
    }
}

/// Media type declared by a `Content-Type` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaType {
    Json,
    Xml,
    /// Anything else, lowercased, parameters stripped
    Other(String),
}

impl MediaType {
    /// Parse a `Content-Type` value, ignoring parameters such as `charset`.
    #[must_use]
    pub fn from_content_type(value: &str) -> Self {
        let essence = value
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "application/json" => Self::Json,
            "application/xml" => Self::Xml,
            _ => Self::Other(essence),
        }
    }

    /// The body format this media type maps to, if any.
    #[must_use]
    pub const fn body_format(&self) -> Option<BodyFormat> {
        match self {
            Self::Json => Some(BodyFormat::Json),
            Self::Xml => Some(BodyFormat::Xml),
            Self::Other(_) => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Json => BodyFormat::Json.media_type(),
            Self::Xml => BodyFormat::Xml.media_type(),
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive header map holding a single value per name.
///
/// Insertion order is kept so diagnostics list headers the way the
/// server sent them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header, replacing any existing value with the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (k, v) in iter {
            headers.insert(k, v);
        }
        headers
    }
}

/// An immutable captured HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    reason: Option<String>,
    elapsed: f64,
    headers: Headers,
    body: String,
}

impl Response {
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            reason: None,
            elapsed: 0.0,
            headers: Headers::new(),
            body: body.into(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Elapsed round-trip time in seconds.
    #[must_use]
    pub fn with_elapsed(mut self, elapsed: f64) -> Self {
        self.elapsed = elapsed;
        self
    }

    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    #[must_use]
    pub const fn elapsed(&self) -> f64 {
        self.elapsed
    }

    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Media type from the `Content-Type` header, `None` when absent.
    #[must_use]
    pub fn media_type(&self) -> Option<MediaType> {
        self.header("content-type").map(MediaType::from_content_type)
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let resp = Response::new(200, "").with_header("Content-Type", "application/json");
        assert_eq!(resp.header("content-type"), Some("application/json"));
        assert_eq!(resp.header("CONTENT-TYPE"), Some("application/json"));
        assert!(resp.headers().contains("Content-type"));
    }

    #[test]
    fn insert_replaces_existing_name() {
        let mut headers = Headers::new();
        headers.insert("X-Challenger", "a");
        headers.insert("x-challenger", "b");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("X-CHALLENGER"), Some("b"));
        assert_eq!(headers.names().collect::<Vec<_>>(), vec!["X-Challenger"]);
    }

    #[test]
    fn media_type_strips_parameters() {
        assert_eq!(
            MediaType::from_content_type("application/json; charset=utf-8"),
            MediaType::Json
        );
        assert_eq!(
            MediaType::from_content_type("Application/XML"),
            MediaType::Xml
        );
        assert_eq!(
            MediaType::from_content_type("text/html"),
            MediaType::Other("text/html".into())
        );
    }

    #[test]
    fn missing_content_type_is_none() {
        let resp = Response::new(204, "");
        assert_eq!(resp.media_type(), None);
    }

    #[test]
    fn success_range() {
        assert!(Response::new(200, "").is_success());
        assert!(Response::new(201, "").is_success());
        assert!(!Response::new(199, "").is_success());
        assert!(!Response::new(300, "").is_success());
        assert!(!Response::new(404, "").is_success());
    }
}
