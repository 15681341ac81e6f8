//! Token storage between runs.
//!
//! Reads/writes ~/.config/plcweb/tokens.json (0600 on Unix), one entry per
//! device host. A stored token may have expired on the device; the CLI
//! then reports the device error and suggests logging in again.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A session token saved for one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedToken {
    pub host: String,
    pub token: String,
    pub saved_at: DateTime<Utc>,
}

impl SavedToken {
    pub fn new(host: impl Into<String>, token: impl Into<String>) -> Self {
        Self { host: host.into(), token: token.into(), saved_at: Utc::now() }
    }
}

type TokenFile = BTreeMap<String, SavedToken>;

/// Returns the path to the token file.
pub fn token_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|c| c.join("plcweb/tokens.json"))
}

/// Load the saved token for `host`, if any.
pub fn load_token(host: &str) -> Option<SavedToken> {
    load_token_at(&token_file_path()?, host)
}

/// Save a token, replacing any earlier one for the same host.
pub fn save_token(saved: &SavedToken) -> Result<(), String> {
    let path = token_file_path().ok_or("Could not determine config directory")?;
    save_token_at(&path, saved)
}

/// Forget the token for `host`.
pub fn delete_token(host: &str) -> Result<(), String> {
    let Some(path) = token_file_path() else {
        return Ok(());
    };
    delete_token_at(&path, host)
}

pub fn load_token_at(path: &Path, host: &str) -> Option<SavedToken> {
    read_file(path).remove(host)
}

pub fn save_token_at(path: &Path, saved: &SavedToken) -> Result<(), String> {
    let mut tokens = read_file(path);
    tokens.insert(saved.host.clone(), saved.clone());
    write_file(path, &tokens)
}

pub fn delete_token_at(path: &Path, host: &str) -> Result<(), String> {
    if !path.exists() {
        return Ok(());
    }
    let mut tokens = read_file(path);
    if tokens.remove(host).is_none() {
        return Ok(());
    }
    if tokens.is_empty() {
        return std::fs::remove_file(path)
            .map_err(|e| format!("Failed to delete token file: {}", e));
    }
    write_file(path, &tokens)
}

/// Unreadable or invalid files count as empty.
fn read_file(path: &Path) -> TokenFile {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|c| serde_json::from_str(&c).ok())
        .unwrap_or_default()
}

fn write_file(path: &Path, tokens: &TokenFile) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }

    let contents = serde_json::to_string_pretty(tokens)
        .map_err(|e| format!("Failed to serialize tokens: {}", e))?;

    std::fs::write(path, &contents)
        .map_err(|e| format!("Failed to write token file: {}", e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let permissions = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, permissions)
            .map_err(|e| format!("Failed to set file permissions: {}", e))?;
    }

    Ok(())
}
