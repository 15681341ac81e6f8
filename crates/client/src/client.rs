//! Web API session.
//!
//! One session per device + credential set. Every typed operation goes
//! through one of two primitives: `call` (JSON-RPC over /api/jsonrpc) or
//! the ticket transfer (raw bytes over /api/ticket).
//! Ticket flow: create resource → upload bytes → close ticket.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::call_log::{CallLog, CallRecord, LogCallLog};
use crate::config::SessionConfig;
use crate::error::ApiError;
use crate::media::media_type_for;
use crate::transport::{HttpReply, HttpTransport, Transport};

// JSON-RPC method names
pub const LOGIN: &str = "Api.Login";
pub const LOGOUT: &str = "Api.Logout";
pub const PING: &str = "Api.Ping";
pub const BROWSE_TICKETS: &str = "Api.BrowseTickets";
pub const CLOSE_TICKET: &str = "Api.CloseTicket";
pub const WEBAPP_CREATE: &str = "WebApp.Create";
pub const WEBAPP_DELETE: &str = "WebApp.Delete";
pub const WEBAPP_BROWSE: &str = "WebApp.Browse";
pub const WEBAPP_SET_DEFAULT_PAGE: &str = "WebApp.SetDefaultPage";
pub const WEBAPP_CREATE_RESOURCE: &str = "WebApp.CreateResource";
pub const WEBAPP_BROWSE_RESOURCES: &str = "WebApp.BrowseResources";
pub const FILES_BROWSE: &str = "Files.Browse";
pub const FILES_DOWNLOAD: &str = "Files.Download";

/// Stands in for the session token in call records.
const REDACTED: &str = "<redacted>";

/// Server-issued handle for a single binary transfer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(String);

impl TicketId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TicketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Web application entry from `WebApp.Browse`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebAppInfo {
    pub name: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub default_page: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Resource entry from `WebApp.BrowseResources`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceInfo {
    pub name: String,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub last_modified: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Ticket entry from `Api.BrowseTickets`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketInfo {
    pub id: TicketId,
    #[serde(default)]
    pub date_created: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Bytes fetched from a ticket, with the server-provided file name.
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Stateful Web API session (blocking, one request in flight at a time).
pub struct WebApiSession {
    config: SessionConfig,
    transport: Box<dyn Transport>,
    call_log: Box<dyn CallLog>,
    token: Option<String>,
    last_id: u64,
}

impl WebApiSession {
    /// Create a session over HTTPS using `config`.
    pub fn new(config: SessionConfig) -> Result<Self, ApiError> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(config, transport))
    }

    /// Create a session over an explicit transport.
    pub fn with_transport(config: SessionConfig, transport: impl Transport + 'static) -> Self {
        Self {
            config,
            transport: Box::new(transport),
            call_log: Box::new(LogCallLog),
            token: None,
            last_id: 0,
        }
    }

    /// Replace the default `log`-backed call sink.
    pub fn with_call_log(mut self, call_log: impl CallLog + 'static) -> Self {
        self.call_log = Box::new(call_log);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Adopt a token saved by an earlier run instead of logging in.
    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = Some(token.into());
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Id of the most recent request (0 before the first one).
    pub fn last_request_id(&self) -> u64 {
        self.last_id
    }

    // ── JSON-RPC primitive ──────────────────────────────────────────

    /// One JSON-RPC round trip. Returns the `result` member.
    ///
    /// Sends the current token (if any) on every method except `Api.Login`.
    /// Does not check for a token; typed operations do that before calling.
    pub fn call(&mut self, method: &str, params: Option<Value>) -> Result<Value, ApiError> {
        self.last_id += 1;
        let id = self.last_id;

        let mut body = json!({
            "id": id,
            "jsonrpc": "2.0",
            "method": method,
        });
        if let Some(params) = params {
            body["params"] = params;
        }

        let auth = if method == LOGIN { None } else { self.token.as_deref() };
        let url = self.config.rpc_url();
        log::debug!("#{} {}", id, method);

        let reply = match self.transport.post_json(&url, auth, &body) {
            Ok(reply) => reply,
            Err(e) => {
                self.record(Some(id), method, None, Value::String(e.to_string()));
                log::warn!("{} failed: {}", method, e);
                return Err(e);
            }
        };

        let parsed = serde_json::from_slice::<Value>(&reply.body);
        let mut logged = match &parsed {
            Ok(v) => v.clone(),
            Err(_) => Value::String(reply.text()),
        };
        if method == LOGIN {
            if let Some(token) = logged.pointer_mut("/result/token") {
                *token = Value::String(REDACTED.into());
            }
        }
        self.record(Some(id), method, Some(reply.status), logged);

        if !reply.is_success() {
            return Err(ApiError::Http(reply.status, reply.text()));
        }

        let parsed = parsed
            .map_err(|e| ApiError::Protocol(format!("{} returned invalid JSON: {}", method, e)))?;

        if let Some(reply_id) = parsed.get("id").and_then(Value::as_u64) {
            if reply_id != id {
                return Err(ApiError::Protocol(format!(
                    "{} response id {} does not match request id {}",
                    method, reply_id, id
                )));
            }
        }

        if let Some(err) = parsed.get("error").filter(|e| !e.is_null()) {
            return Err(ApiError::Rpc {
                code: err["code"].as_i64().unwrap_or(0),
                message: err["message"].as_str().unwrap_or("unknown error").to_string(),
            });
        }

        parsed
            .get("result")
            .cloned()
            .ok_or_else(|| ApiError::Protocol(format!("{} response has no result", method)))
    }

    /// `call`, but only with a token held.
    fn authed_call(&mut self, method: &str, params: Option<Value>) -> Result<Value, ApiError> {
        self.require_token()?;
        self.call(method, params)
    }

    fn require_token(&self) -> Result<(), ApiError> {
        if self.token.is_none() {
            return Err(ApiError::NotAuthenticated);
        }
        Ok(())
    }

    fn record(&self, id: Option<u64>, method: &str, status: Option<u16>, response: Value) {
        self.call_log.record(&CallRecord {
            id,
            method: method.to_string(),
            status,
            response,
        });
    }

    // ── Authentication ──────────────────────────────────────────────

    /// Log in with the configured credentials and store the token.
    pub fn login(&mut self) -> Result<String, ApiError> {
        self.token = None;

        let params = json!({
            "user": self.config.username,
            "password": self.config.password,
        });
        let result = self.call(LOGIN, Some(params)).map_err(|e| match e {
            ApiError::Rpc { code, message } => ApiError::AuthFailure(format!("{} ({})", message, code)),
            other => ApiError::AuthFailure(other.to_string()),
        })?;

        let token = result
            .get("token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::AuthFailure("response carried no token".into()))?
            .to_string();

        log::info!("logged in to {} as {}", self.config.host, self.config.username);
        self.token = Some(token.clone());
        Ok(token)
    }

    /// Log out. The local token is dropped whatever the device answers.
    pub fn logout(&mut self) -> Result<(), ApiError> {
        self.require_token()?;
        let outcome = self.call(LOGOUT, None);
        self.token = None;
        outcome.map(|_| {
            log::info!("logged out of {}", self.config.host);
        })
    }

    // ── Diagnostics ─────────────────────────────────────────────────

    /// Liveness check. Works without a token; any failure is `false`.
    pub fn ping(&mut self) -> bool {
        match self.call(PING, None) {
            Ok(_) => true,
            Err(e) => {
                log::warn!("ping {} failed: {}", self.config.host, e);
                false
            }
        }
    }

    // ── Web applications ────────────────────────────────────────────

    pub fn create_app(&mut self, name: &str) -> Result<(), ApiError> {
        self.authed_call(WEBAPP_CREATE, Some(json!({ "name": name })))?;
        Ok(())
    }

    /// Delete an application. "Not found" comes back as the device's error.
    pub fn delete_app(&mut self, name: &str) -> Result<(), ApiError> {
        self.authed_call(WEBAPP_DELETE, Some(json!({ "name": name })))?;
        Ok(())
    }

    pub fn browse_apps(&mut self) -> Result<Vec<WebAppInfo>, ApiError> {
        let result = self.authed_call(WEBAPP_BROWSE, None)?;
        list_field(result, "applications")
    }

    pub fn set_default_page(&mut self, app_name: &str, resource_name: &str) -> Result<(), ApiError> {
        self.authed_call(
            WEBAPP_SET_DEFAULT_PAGE,
            Some(json!({ "name": app_name, "resource_name": resource_name })),
        )?;
        Ok(())
    }

    pub fn browse_resources(&mut self, app_name: &str) -> Result<Vec<ResourceInfo>, ApiError> {
        let result = self.authed_call(WEBAPP_BROWSE_RESOURCES, Some(json!({ "app_name": app_name })))?;
        list_field(result, "resources")
    }

    // ── Resources and tickets ───────────────────────────────────────

    /// Create a resource record; its content goes up against the returned ticket.
    pub fn create_resource(&mut self, app_name: &str, resource_name: &str) -> Result<TicketId, ApiError> {
        self.create_resource_at(app_name, resource_name, Utc::now())
    }

    /// `create_resource` with an explicit last-modified time.
    pub fn create_resource_at(
        &mut self,
        app_name: &str,
        resource_name: &str,
        last_modified: DateTime<Utc>,
    ) -> Result<TicketId, ApiError> {
        let params = json!({
            "app_name": app_name,
            "name": resource_name,
            "media_type": media_type_for(resource_name),
            "last_modified": format_timestamp(last_modified),
        });
        let result = self.authed_call(WEBAPP_CREATE_RESOURCE, Some(params))?;
        ticket_from(result, WEBAPP_CREATE_RESOURCE)
    }

    /// Upload raw bytes against a ticket. The ticket is the capability;
    /// no auth header is sent.
    pub fn upload_bytes(&mut self, ticket: &TicketId, data: Vec<u8>) -> Result<(), ApiError> {
        self.require_token()?;
        let url = self.config.ticket_url(ticket.as_str());
        let size = data.len();

        let reply = match self.transport.post_bytes(&url, data) {
            Ok(reply) => reply,
            Err(e) => {
                self.record(None, "ticket.upload", None, Value::String(e.to_string()));
                log::warn!("upload to ticket {} failed: {}", ticket, e);
                return Err(e);
            }
        };
        self.record(None, "ticket.upload", Some(reply.status), json!({ "ticket": ticket, "bytes": size }));

        if !reply.is_success() {
            return Err(ApiError::Http(reply.status, reply.text()));
        }
        Ok(())
    }

    /// Read `path` fully and upload it against `ticket`.
    pub fn upload_file(&mut self, ticket: &TicketId, path: &Path) -> Result<(), ApiError> {
        self.require_token()?;
        let data = read_source(path)?;
        log::debug!("{}: {} bytes", path.display(), data.len());
        self.upload_bytes(ticket, data)
    }

    /// Download the content behind a ticket. The file name comes from
    /// `Content-Disposition`; a missing or unparsable header is a protocol error.
    pub fn download_file(&mut self, ticket: &TicketId) -> Result<DownloadedFile, ApiError> {
        self.require_token()?;
        let url = self.config.ticket_url(ticket.as_str());

        let reply = match self.transport.get(&url) {
            Ok(reply) => reply,
            Err(e) => {
                self.record(None, "ticket.download", None, Value::String(e.to_string()));
                return Err(e);
            }
        };
        self.record(
            None,
            "ticket.download",
            Some(reply.status),
            json!({ "ticket": ticket, "bytes": reply.body.len() }),
        );

        if !reply.is_success() {
            return Err(ApiError::Http(reply.status, reply.text()));
        }

        let filename = download_filename(&reply)?;
        Ok(DownloadedFile { filename, bytes: reply.body })
    }

    pub fn close_ticket(&mut self, ticket: &TicketId) -> Result<(), ApiError> {
        self.authed_call(CLOSE_TICKET, Some(json!({ "id": ticket })))?;
        Ok(())
    }

    pub fn browse_tickets(&mut self) -> Result<Vec<TicketInfo>, ApiError> {
        let result = self.authed_call(BROWSE_TICKETS, None)?;
        list_field(result, "tickets")
    }

    // ── User files ──────────────────────────────────────────────────

    /// Browse the device's user file area. Result is returned verbatim.
    pub fn browse_files(&mut self, resource: &str) -> Result<Value, ApiError> {
        self.authed_call(FILES_BROWSE, Some(json!({ "resource": resource })))
    }

    /// Ask the device to stage a user file for download; returns the ticket.
    pub fn request_file_download(&mut self, resource: &str) -> Result<TicketId, ApiError> {
        let result = self.authed_call(FILES_DOWNLOAD, Some(json!({ "resource": resource })))?;
        ticket_from(result, FILES_DOWNLOAD)
    }
}

// ── Free functions ──────────────────────────────────────────────────

/// UTC timestamp in the device's `YYYY-MM-DDTHH:MM:SSZ` format.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Extract the file name from a `Content-Disposition` value.
pub fn parse_content_disposition(value: &str) -> Option<String> {
    static FILENAME: OnceLock<Regex> = OnceLock::new();
    let re = FILENAME.get_or_init(|| Regex::new(r"filename=(.+)").expect("valid regex"));

    let raw = re.captures(value)?.get(1)?.as_str();
    let name = raw.trim().trim_matches('"').trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Write a download under `dir`, keeping only the base name from the header.
pub fn save_download(dir: &Path, file: &DownloadedFile) -> Result<PathBuf, ApiError> {
    let name = Path::new(&file.filename)
        .file_name()
        .ok_or_else(|| ApiError::Protocol(format!("unusable download file name '{}'", file.filename)))?;
    let path = dir.join(name);
    std::fs::write(&path, &file.bytes)
        .map_err(|e| ApiError::Io(format!("cannot write {}: {}", path.display(), e)))?;
    Ok(path)
}

/// Read a local upload source; a missing file is `FileNotFound`.
pub(crate) fn read_source(path: &Path) -> Result<Vec<u8>, ApiError> {
    std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ApiError::FileNotFound(path.to_path_buf()),
        _ => ApiError::Io(format!("cannot read {}: {}", path.display(), e)),
    })
}

fn download_filename(reply: &HttpReply) -> Result<String, ApiError> {
    let header = reply
        .header("Content-Disposition")
        .ok_or_else(|| ApiError::Protocol("download response has no Content-Disposition header".into()))?;
    parse_content_disposition(header)
        .ok_or_else(|| ApiError::Protocol(format!("cannot parse Content-Disposition '{}'", header)))
}

fn ticket_from(result: Value, method: &str) -> Result<TicketId, ApiError> {
    match result {
        Value::String(id) if !id.is_empty() => Ok(TicketId(id)),
        other => Err(ApiError::Protocol(format!("{} returned no ticket id (got {})", method, other))),
    }
}

fn list_field<T: serde::de::DeserializeOwned>(mut result: Value, key: &str) -> Result<Vec<T>, ApiError> {
    match result.get_mut(key).map(Value::take) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(list) => serde_json::from_value(list)
            .map_err(|e| ApiError::Protocol(format!("unexpected '{}' shape: {}", key, e))),
    }
}
