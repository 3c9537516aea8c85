//! Blocking HTTP client for the API under test
//!
//! Every exchange is captured as an [`apiconform_core::Response`] with its
//! elapsed time, and request/response artifacts go to the diagnostic sink.

use std::time::{Duration, Instant};

use apiconform_core::sink::{attach_request, attach_response};
use apiconform_core::{Config, DiagnosticSink, Endpoint, Headers, Response};
use log::{debug, info};

/// Paths of the endpoints the harness talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRoutes {
    pub new_token: String,
    pub challenges: String,
    pub todos: String,
}

impl Default for ApiRoutes {
    fn default() -> Self {
        Self {
            new_token: "/challenger".to_string(),
            challenges: "/challenges".to_string(),
            todos: "/todos".to_string(),
        }
    }
}

impl ApiRoutes {
    #[must_use]
    pub fn todo(&self, id: u64) -> String {
        format!("{}/{id}", self.todos)
    }

    #[must_use]
    pub fn path(&self, endpoint: Endpoint) -> String {
        match endpoint {
            Endpoint::Challenges => self.challenges.clone(),
            Endpoint::Todos => self.todos.clone(),
            Endpoint::Todo { id } => self.todo(id),
            Endpoint::NewChallenger => self.new_token.clone(),
        }
    }
}

/// Header carrying the challenger session token.
pub const CHALLENGER_HEADER: &str = "X-Challenger";

pub struct ApiClient {
    client: reqwest::blocking::Client,
    base_url: String,
    routes: ApiRoutes,
    default_headers: Headers,
}

impl ApiClient {
    /// Client with the default routes.
    ///
    /// # Errors
    ///
    /// Returns error if the timeout is unusable or the client cannot be built
    pub fn from_config(config: &Config) -> Result<Self, ClientError> {
        Self::with_routes(config, ApiRoutes::default())
    }

    /// # Errors
    ///
    /// Returns error if the timeout is unusable or the client cannot be built
    pub fn with_routes(config: &Config, routes: ApiRoutes) -> Result<Self, ClientError> {
        let timeout = Duration::try_from_secs_f64(config.timeout)
            .map_err(|e| ClientError::Build(format!("timeout {}: {e}", config.timeout)))?;
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;

        let mut extra: Vec<(&String, &String)> = config.headers.iter().collect();
        extra.sort();
        let mut default_headers: Headers = extra
            .into_iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(token) = &config.x_challenger {
            default_headers.insert(CHALLENGER_HEADER, token.clone());
        }

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            routes,
            default_headers,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub const fn routes(&self) -> &ApiRoutes {
        &self.routes
    }

    /// Send `X-Challenger: token` with every later request.
    pub fn set_token(&mut self, token: &str) {
        self.default_headers.insert(CHALLENGER_HEADER, token);
    }

    /// Default headers overlaid with `headers`; names compare case-insensitively.
    #[must_use]
    pub fn merged_headers(&self, headers: &[(String, String)]) -> Headers {
        let mut merged = self.default_headers.clone();
        for (k, v) in headers {
            merged.insert(k.clone(), v.clone());
        }
        merged
    }

    /// Perform one request and capture the response.
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be built or sent, or the body
    /// cannot be read
    pub fn send(
        &self,
        method: &str,
        path: &str,
        headers: &[(String, String)],
        query: &[(String, String)],
        json_body: Option<&serde_json::Value>,
        sink: &dyn DiagnosticSink,
    ) -> Result<Response, ClientError> {
        let url = format!("{}{path}", self.base_url);
        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|_| ClientError::InvalidMethod(method.to_string()))?;
        let merged = self.merged_headers(headers);

        info!("{method} {url}");
        debug!("headers {merged:?} query {query:?}");
        let sent: Vec<(String, String)> = merged
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        attach_request(sink, method.as_str(), &url, &sent, query);

        let mut req = self.client.request(method, &url);
        for (k, v) in merged.iter() {
            if reqwest::header::HeaderValue::from_str(v).is_err() {
                return Err(ClientError::InvalidHeader(k.to_string()));
            }
            req = req.header(k, v);
        }
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(body) = json_body {
            req = req.json(body);
        }

        let start = Instant::now();
        let resp = req.send().map_err(|e| ClientError::Http(e.to_string()))?;
        let elapsed = start.elapsed().as_secs_f64();

        let status = resp.status();
        let mut resp_headers = Headers::new();
        for (name, value) in resp.headers() {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            let combined = match resp_headers.get(name.as_str()) {
                Some(existing) => format!("{existing}, {value}"),
                None => value,
            };
            resp_headers.insert(name.as_str(), combined);
        }
        let body = resp.text().map_err(|e| ClientError::Http(e.to_string()))?;

        let mut response = Response::new(status.as_u16(), body)
            .with_headers(resp_headers)
            .with_elapsed(elapsed);
        if let Some(reason) = status.canonical_reason() {
            response = response.with_reason(reason);
        }
        info!("{} in {elapsed:.3}s", status.as_u16());
        attach_response(sink, &response);
        Ok(response)
    }

    /// `GET`/`POST` on the endpoint's route.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::send`]
    pub fn request(
        &self,
        endpoint: Endpoint,
        headers: &[(String, String)],
        query: &[(String, String)],
        sink: &dyn DiagnosticSink,
    ) -> Result<Response, ClientError> {
        let path = self.routes.path(endpoint);
        self.send(endpoint.method(), &path, headers, query, None, sink)
    }

    /// `POST /challenger`
    ///
    /// # Errors
    ///
    /// See [`ApiClient::send`]
    pub fn new_challenger(&self, sink: &dyn DiagnosticSink) -> Result<Response, ClientError> {
        self.request(Endpoint::NewChallenger, &[], &[], sink)
    }

    /// # Errors
    ///
    /// See [`ApiClient::send`]
    pub fn get_challenges(
        &self,
        headers: &[(String, String)],
        query: &[(String, String)],
        sink: &dyn DiagnosticSink,
    ) -> Result<Response, ClientError> {
        self.request(Endpoint::Challenges, headers, query, sink)
    }

    /// # Errors
    ///
    /// See [`ApiClient::send`]
    pub fn get_todos(
        &self,
        headers: &[(String, String)],
        query: &[(String, String)],
        sink: &dyn DiagnosticSink,
    ) -> Result<Response, ClientError> {
        self.request(Endpoint::Todos, headers, query, sink)
    }

    /// # Errors
    ///
    /// See [`ApiClient::send`]
    pub fn get_todo(
        &self,
        id: u64,
        headers: &[(String, String)],
        sink: &dyn DiagnosticSink,
    ) -> Result<Response, ClientError> {
        self.request(Endpoint::Todo { id }, headers, &[], sink)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Client setup error: {0}")]
    Build(String),
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),
    #[error("Invalid value for header {0}")]
    InvalidHeader(String),
    #[error("HTTP error: {0}")]
    Http(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_routes() {
        let routes = ApiRoutes::default();
        assert_eq!(routes.path(Endpoint::NewChallenger), "/challenger");
        assert_eq!(routes.path(Endpoint::Challenges), "/challenges");
        assert_eq!(routes.path(Endpoint::Todo { id: 7 }), "/todos/7");
    }

    #[test]
    fn request_headers_override_defaults_case_insensitively() {
        let config = Config {
            x_challenger: Some("abc".into()),
            headers: [("Accept".to_string(), "application/json".to_string())].into(),
            ..Config::default()
        };
        let client = ApiClient::from_config(&config).unwrap();
        let merged = client.merged_headers(&[("accept".into(), "application/xml".into())]);
        assert_eq!(merged.get("ACCEPT"), Some("application/xml"));
        assert_eq!(merged.get("x-challenger"), Some("abc"));
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn base_url_trailing_slash_is_dropped() {
        let config = Config {
            base_url: "http://localhost:4567/".into(),
            ..Config::default()
        };
        assert_eq!(ApiClient::from_config(&config).unwrap().base_url(), "http://localhost:4567");
    }

    #[test]
    fn negative_timeout_is_a_build_error() {
        let config = Config {
            timeout: -1.0,
            ..Config::default()
        };
        assert!(matches!(
            ApiClient::from_config(&config),
            Err(ClientError::Build(_))
        ));
    }

    #[test]
    fn set_token_replaces_existing() {
        let config = Config {
            x_challenger: Some("old".into()),
            ..Config::default()
        };
        let mut client = ApiClient::from_config(&config).unwrap();
        client.set_token("new");
        assert_eq!(client.merged_headers(&[]).get(CHALLENGER_HEADER), Some("new"));
    }
}
