//! HTTP seam between the session and the network.
//!
//! Blocking reqwest client (no Tokio runtime required). Status codes are
//! returned as-is; the session decides what a non-2xx status means.

use serde_json::Value;

use crate::config::SessionConfig;
use crate::error::ApiError;

pub const AUTH_HEADER: &str = "X-Auth-Token";

/// A raw HTTP response, already fully read.
#[derive(Debug, Clone, Default)]
pub struct HttpReply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// One blocking round trip per call. Errors are connection-level only.
pub trait Transport: Send {
    /// POST a JSON body, with `X-Auth-Token` when `auth_token` is set.
    fn post_json(&self, url: &str, auth_token: Option<&str>, body: &Value) -> Result<HttpReply, ApiError>;

    /// POST raw bytes as `application/octet-stream`. Never authenticated.
    fn post_bytes(&self, url: &str, data: Vec<u8>) -> Result<HttpReply, ApiError>;

    /// Plain GET. Never authenticated.
    fn get(&self, url: &str) -> Result<HttpReply, ApiError>;
}

/// Production transport over `reqwest::blocking`.
pub struct HttpTransport {
    http: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(config: &SessionConfig) -> Result<Self, ApiError> {
        if config.insecure_skip_verify {
            log::warn!("TLS certificate verification disabled for {}", config.host);
        }

        let http = reqwest::blocking::Client::builder()
            .user_agent(format!("plcweb/{}", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout())
            .danger_accept_invalid_certs(config.insecure_skip_verify)
            .build()
            .map_err(|e| ApiError::Transport(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self { http })
    }

    fn finish(response: reqwest::blocking::Response) -> Result<HttpReply, ApiError> {
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = response
            .bytes()
            .map_err(|e| ApiError::Transport(e.to_string()))?
            .to_vec();

        Ok(HttpReply { status, headers, body })
    }
}

impl Transport for HttpTransport {
    fn post_json(&self, url: &str, auth_token: Option<&str>, body: &Value) -> Result<HttpReply, ApiError> {
        let mut req = self.http.post(url).json(body);
        if let Some(token) = auth_token {
            req = req.header(AUTH_HEADER, token);
        }

        let response = req.send().map_err(|e| ApiError::Transport(e.to_string()))?;
        Self::finish(response)
    }

    fn post_bytes(&self, url: &str, data: Vec<u8>) -> Result<HttpReply, ApiError> {
        let response = self.http.post(url)
            .header("Content-Type", "application/octet-stream")
            .body(data)
            .send()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Self::finish(response)
    }

    fn get(&self, url: &str) -> Result<HttpReply, ApiError> {
        let response = self.http.get(url)
            .send()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Self::finish(response)
    }
}
