//! Per-call observability sink.

use serde::Serialize;
use serde_json::Value;

/// One completed (or failed) round trip.
#[derive(Debug, Clone, Serialize)]
pub struct CallRecord {
    /// JSON-RPC request id; `None` for ticket transfers
    pub id: Option<u64>,
    /// JSON-RPC method, or "ticket.upload" / "ticket.download"
    pub method: String,
    /// HTTP status; `None` when the request never got a response
    pub status: Option<u16>,
    /// Parsed JSON body, raw text, or the transport error message
    pub response: Value,
}

/// Receives a record for every call a session makes.
pub trait CallLog: Send {
    fn record(&self, entry: &CallRecord);
}

/// Default sink: forwards every record to the `log` facade at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogCallLog;

impl CallLog for LogCallLog {
    fn record(&self, entry: &CallRecord) {
        let response = serde_json::to_string_pretty(&entry.response)
            .unwrap_or_else(|_| entry.response.to_string());
        match (entry.id, entry.status) {
            (Some(id), Some(status)) => log::debug!("#{} {} -> {}\n{}", id, entry.method, status, response),
            (None, Some(status)) => log::debug!("{} -> {}\n{}", entry.method, status, response),
            (_, None) => log::debug!("{} -> no response: {}", entry.method, response),
        }
    }
}
