//! PLC Web API client, shared by the CLI and any front-end.
//!
//! This crate is the single source of truth for the device wire contract:
//! JSON-RPC session (login, logout, ping), web application and resource
//! lifecycle, and the ticket transfer (create resource → upload → close).
//!
//! No GUI concepts. No retries. One request in flight per session.

mod auth;
mod call_log;
mod client;
mod config;
mod error;
mod media;
mod transport;
mod workflow;

#[cfg(test)]
mod testing;

pub use auth::{
    SavedToken, token_file_path, load_token, save_token, delete_token,
    load_token_at, save_token_at, delete_token_at,
};
pub use call_log::{CallLog, CallRecord, LogCallLog};
pub use client::{
    WebApiSession, TicketId, WebAppInfo, ResourceInfo, TicketInfo, DownloadedFile,
    format_timestamp, parse_content_disposition, save_download,
};
pub use config::{SessionConfig, Profile, profile_path, load_profile, load_profile_at, DEFAULT_TIMEOUT_SECS};
pub use error::ApiError;
pub use media::{media_type_for, OCTET_STREAM};
pub use transport::{HttpReply, HttpTransport, Transport, AUTH_HEADER};
pub use workflow::{
    DeployPlan, DeployReport, DeployFailure, DeployStep, UploadedResource,
    deploy_app, download_user_file, list_source_files,
};

/// JSON-RPC method names used by the session.
pub mod methods {
    pub use crate::client::{
        LOGIN, LOGOUT, PING, BROWSE_TICKETS, CLOSE_TICKET,
        WEBAPP_CREATE, WEBAPP_DELETE, WEBAPP_BROWSE, WEBAPP_SET_DEFAULT_PAGE,
        WEBAPP_CREATE_RESOURCE, WEBAPP_BROWSE_RESOURCES,
        FILES_BROWSE, FILES_DOWNLOAD,
    };
}
