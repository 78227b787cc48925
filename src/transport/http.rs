//! HTTP transport backed by a pooled `ureq` agent.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64_STANDARD};
use chrono::Utc;
use native_tls::TlsConnector;
use ureq::{Agent, AgentBuilder};

use super::{Transport, TransportError, TransportResponse};
use crate::batch::{Batch, LIBRARY_NAME, LIBRARY_VERSION};

/// Default collection endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.segment.io";
/// Path batches are posted to, relative to the endpoint.
pub const IMPORT_PATH: &str = "/v1/import";
/// Default connection timeout applied when establishing HTTP connections.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default timeout for a whole request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for [`HttpTransport`].
#[derive(Clone, Debug)]
pub struct HttpTransportConfig {
    /// Base URL; [`IMPORT_PATH`] is appended.
    pub endpoint: String,
    /// Pre-shared write key sent as the Basic auth user name.
    pub write_key: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Additional HTTP headers to include in requests.
    pub headers: HashMap<String, String>,
}

impl HttpTransportConfig {
    pub fn new(write_key: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            write_key: write_key.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            headers: HashMap::new(),
        }
    }
}

/// Posts each batch as JSON with Basic credentials derived from the write key.
pub struct HttpTransport {
    agent: Agent,
    url: String,
    authorization: String,
    user_agent: String,
    headers: HashMap<String, String>,
}

impl HttpTransport {
    /// Build the agent and resolve the request URL.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Tls`] if the platform TLS connector cannot be
    /// initialised.
    pub fn new(config: HttpTransportConfig) -> Result<Self, TransportError> {
        let agent = AgentBuilder::new()
            .tls_connector(Arc::new(TlsConnector::new()?))
            .timeout_connect(config.connect_timeout)
            .timeout(config.request_timeout)
            .build();
        Ok(Self {
            agent,
            url: import_url(&config.endpoint),
            authorization: basic_credentials(&config.write_key, ""),
            user_agent: format!("{LIBRARY_NAME}/{LIBRARY_VERSION}"),
            headers: config.headers,
        })
    }

    /// Fully resolved request URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    fn post(&self, body: &str) -> Result<ureq::Response, Box<ureq::Error>> {
        let mut req = self
            .agent
            .post(&self.url)
            .set("Authorization", &self.authorization)
            .set("Content-Type", "application/json")
            .set("User-Agent", &self.user_agent);
        for (key, value) in &self.headers {
            req = req.set(key, value);
        }
        req.send_string(body).map_err(Box::new)
    }
}

impl Transport for HttpTransport {
    fn send(&self, batch: &Batch) -> Result<TransportResponse, TransportError> {
        let body = batch.payload(Utc::now()).to_json()?;
        match self.post(&body) {
            Ok(response) => Ok(read_response(response)),
            Err(err) => match *err {
                ureq::Error::Status(_, response) => Ok(read_response(response)),
                ureq::Error::Transport(transport_err) => {
                    Err(TransportError::Network(transport_err.to_string()))
                }
            },
        }
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

fn read_response(response: ureq::Response) -> TransportResponse {
    let status = response.status();
    let body = response.into_string().unwrap_or_default();
    TransportResponse { status, body }
}

fn import_url(endpoint: &str) -> String {
    format!("{}{IMPORT_PATH}", endpoint.trim_end_matches('/'))
}

/// `Authorization` header value for HTTP Basic credentials.
pub(crate) fn basic_credentials(username: &str, password: &str) -> String {
    let encoded = BASE64_STANDARD.encode(format!("{username}:{password}"));
    format!("Basic {encoded}")
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn encodes_write_key_as_user_name() {
        assert_eq!(basic_credentials("user", "pass"), "Basic dXNlcjpwYXNz");
        assert_eq!(basic_credentials("key", ""), "Basic a2V5Og==");
    }

    #[rstest]
    #[case("https://api.segment.io", "https://api.segment.io/v1/import")]
    #[case("http://127.0.0.1:9000/", "http://127.0.0.1:9000/v1/import")]
    fn appends_import_path(#[case] endpoint: &str, #[case] expected: &str) {
        let mut config = HttpTransportConfig::new("key");
        config.endpoint = endpoint.to_owned();
        let transport = HttpTransport::new(config).expect("tls connector");
        assert_eq!(transport.url(), expected);
    }
}
