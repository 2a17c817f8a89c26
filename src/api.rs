//! Doppler API interactions.
//!
//! Only the secrets download endpoint is used by the core: it returns the
//! map of secret names to values for a project/config pair, authenticated by
//! the API key.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::{Error, Result};

/// Default Doppler API base URL
pub const DEFAULT_API_HOST: &str = "https://api.doppler.com";

/// User-Agent header sent with every request
const USER_AGENT: &str = concat!("doppler-cli/", env!("CARGO_PKG_VERSION"));

/// Request timeout for API calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Secret names mapped to their values.
pub type SecretMap = BTreeMap<String, String>;

/// Response body of the secrets download endpoint (only fields we care about).
#[derive(Debug, Deserialize)]
struct SecretsResponse {
    secrets: SecretMap,
}

/// Error body shape returned by the API on failure.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    messages: Vec<String>,
}

/// Render an error body for display, preferring the API's `messages` list.
pub fn describe_error_body(body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(parsed) if !parsed.messages.is_empty() => parsed.messages.join("; "),
        _ => body.trim().to_string(),
    }
}

/// Blocking client for the Doppler API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    host: String,
    agent: ureq::Agent,
}

impl ApiClient {
    /// Create a client for `host` (e.g. `https://api.doppler.com`).
    pub fn new(host: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build();
        Self {
            host: host.trim_end_matches('/').to_string(),
            agent,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Download the secret map for `project`/`config`.
    ///
    /// Empty selectors are left out of the query so the key's own scope
    /// applies (service tokens are bound to a single config).
    ///
    /// # Returns
    /// * `Ok(SecretMap)` - name to value for every secret
    /// * `Err(Error::Remote)` - the API answered with a non-2xx status
    /// * `Err(Error::Http)` - transport failure or unreadable response
    pub fn fetch_secrets(&self, key: &str, project: &str, config: &str) -> Result<SecretMap> {
        let url = format!("{}/v3/configs/config/secrets/download", self.host);
        tracing::debug!(url = %url, project, config, "fetching secrets");

        let mut request = self
            .agent
            .get(&url)
            .set("Authorization", &format!("Bearer {}", key))
            .set("Accept", "application/json")
            .query("format", "json");
        if !project.is_empty() {
            request = request.query("project", project);
        }
        if !config.is_empty() {
            request = request.query("config", config);
        }

        match request.call() {
            Ok(resp) => {
                let parsed: SecretsResponse = resp
                    .into_json()
                    .map_err(|e| Error::Http(format!("invalid response from Doppler API: {}", e)))?;
                tracing::debug!(count = parsed.secrets.len(), "fetched secrets");
                Ok(parsed.secrets)
            }
            Err(ureq::Error::Status(status, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                Err(Error::Remote { status, body })
            }
            Err(e) => Err(Error::Http(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;

    /// Serve a single canned HTTP response and hand back the request line
    /// and headers that were received.
    fn serve_once(status: &str, body: &str) -> (String, mpsc::Receiver<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut lines = Vec::new();
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                lines.push(line.trim_end().to_string());
            }
            stream.write_all(response.as_bytes()).unwrap();
            let _ = tx.send(lines);
        });
        (format!("http://{}", addr), rx)
    }

    #[test]
    fn test_fetch_secrets_success() {
        let (host, rx) = serve_once("200 OK", r#"{"secrets":{"FOO":"1","BAR":"2"}}"#);
        let client = ApiClient::new(&host);

        let secrets = client.fetch_secrets("dp.st.test", "backend", "dev").unwrap();

        assert_eq!(secrets.len(), 2);
        assert_eq!(secrets["FOO"], "1");
        assert_eq!(secrets["BAR"], "2");

        let request = rx.recv().unwrap();
        assert!(request[0].starts_with("GET /v3/configs/config/secrets/download?"));
        assert!(request[0].contains("project=backend"));
        assert!(request[0].contains("config=dev"));
        assert!(
            request
                .iter()
                .any(|h| h.eq_ignore_ascii_case("authorization: Bearer dp.st.test"))
        );
    }

    #[test]
    fn test_fetch_secrets_omits_empty_selectors() {
        let (host, rx) = serve_once("200 OK", r#"{"secrets":{}}"#);
        let client = ApiClient::new(&host);

        assert!(client.fetch_secrets("dp.st.test", "", "").unwrap().is_empty());

        let request = rx.recv().unwrap();
        assert!(!request[0].contains("project="));
        assert!(!request[0].contains("config="));
    }

    #[test]
    fn test_fetch_secrets_remote_error_keeps_body() {
        let body = r#"{"messages":["Invalid Auth token"],"success":false}"#;
        let (host, _rx) = serve_once("401 Unauthorized", body);
        let client = ApiClient::new(&host);

        match client.fetch_secrets("bad", "p", "c") {
            Err(Error::Remote { status, body: got }) => {
                assert_eq!(status, 401);
                assert_eq!(got, body);
            }
            other => panic!("Expected Remote error, got: {:?}", other),
        }
    }

    #[test]
    fn test_fetch_secrets_rejects_unexpected_shape() {
        let (host, _rx) = serve_once("200 OK", r#"{"FOO":"1"}"#);
        let client = ApiClient::new(&host);

        assert!(matches!(
            client.fetch_secrets("k", "p", "c"),
            Err(Error::Http(_))
        ));
    }

    #[test]
    fn test_unreachable_host_is_http_error() {
        // Bind then drop to get a port nothing listens on
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let client = ApiClient::new(&format!("http://127.0.0.1:{}", port));

        assert!(matches!(
            client.fetch_secrets("k", "p", "c"),
            Err(Error::Http(_))
        ));
    }

    #[test]
    fn test_describe_error_body() {
        assert_eq!(
            describe_error_body(r#"{"messages":["a","b"]}"#),
            "a; b"
        );
        assert_eq!(describe_error_body("plain text\n"), "plain text");
        assert_eq!(describe_error_body(r#"{"messages":[]}"#), r#"{"messages":[]}"#);
    }

    #[test]
    fn test_host_trailing_slash_trimmed() {
        assert_eq!(ApiClient::new("http://localhost:8080/").host(), "http://localhost:8080");
    }
}
