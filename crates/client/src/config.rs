//! Connection settings.
//!
//! A `SessionConfig` is built from CLI flags, optionally seeded from a
//! profile file at ~/.config/plcweb/config.toml. Passwords never come
//! from the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ApiError;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Everything needed to reach and authenticate against one device.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Device host or IP (e.g., "192.168.0.1")
    pub host: String,
    pub username: String,
    pub password: String,
    /// Accept self-signed / mismatched device certificates
    pub insecure_skip_verify: bool,
    pub timeout_secs: u64,
    /// Overrides `https://{host}` (plain-http test servers, reverse proxies)
    pub base_url: Option<String>,
}

impl SessionConfig {
    pub fn new(host: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
            insecure_skip_verify: false,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            base_url: None,
        }
    }

    /// Point the session at an explicit base URL instead of `https://{host}`.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn insecure(mut self, skip_verify: bool) -> Self {
        self.insecure_skip_verify = skip_verify;
        self
    }

    pub fn base_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}", self.host),
        }
    }

    pub fn rpc_url(&self) -> String {
        format!("{}/api/jsonrpc", self.base_url())
    }

    pub fn ticket_url(&self, ticket_id: &str) -> String {
        format!("{}/api/ticket?id={}", self.base_url(), ticket_id)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Profile file contents. Every field is optional; CLI flags win.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub insecure_skip_verify: Option<bool>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Returns the path to the default profile file.
pub fn profile_path() -> Option<PathBuf> {
    dirs::config_dir().map(|c| c.join("plcweb/config.toml"))
}

/// Load the profile at `path`. A missing file yields the empty profile.
pub fn load_profile_at(path: &Path) -> Result<Profile, ApiError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Profile::default()),
        Err(e) => {
            return Err(ApiError::Config(format!("cannot read {}: {}", path.display(), e)));
        }
    };
    toml::from_str(&contents)
        .map_err(|e| ApiError::Config(format!("invalid {}: {}", path.display(), e)))
}

/// Load the profile from the default location.
pub fn load_profile() -> Result<Profile, ApiError> {
    match profile_path() {
        Some(path) => load_profile_at(&path),
        None => Ok(Profile::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_default_to_https_host() {
        let cfg = SessionConfig::new("192.168.0.1", "admin", "pw");
        assert_eq!(cfg.rpc_url(), "https://192.168.0.1/api/jsonrpc");
        assert_eq!(cfg.ticket_url("abc"), "https://192.168.0.1/api/ticket?id=abc");
        assert!(!cfg.insecure_skip_verify);
        assert_eq!(cfg.timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }

    #[test]
    fn test_base_url_override_trims_slash() {
        let cfg = SessionConfig::new("plc", "admin", "pw").with_base_url("http://127.0.0.1:8080/");
        assert_eq!(cfg.rpc_url(), "http://127.0.0.1:8080/api/jsonrpc");
    }

    #[test]
    fn test_missing_profile_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let profile = load_profile_at(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(profile, Profile::default());
    }

    #[test]
    fn test_profile_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "host = \"10.0.0.5\"\nusername = \"admin\"\ninsecure_skip_verify = true\n").unwrap();

        let profile = load_profile_at(&path).unwrap();
        assert_eq!(profile.host.as_deref(), Some("10.0.0.5"));
        assert_eq!(profile.username.as_deref(), Some("admin"));
        assert_eq!(profile.insecure_skip_verify, Some(true));
        assert_eq!(profile.timeout_secs, None);
    }

    #[test]
    fn test_invalid_profile_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "host = [").unwrap();
        assert!(matches!(load_profile_at(&path), Err(ApiError::Config(_))));
    }
}
