//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract. Scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain           | Description                              |
//! |---------|------------------|------------------------------------------|
//! | 0       | Universal        | Success                                  |
//! | 1       | Universal        | General error (unspecified)              |
//! | 2       | Universal        | CLI usage error (bad args, bad config)   |
//! | 20-29   | device           | Web API session codes                    |

use plcweb_client::ApiError;

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing host or credentials, bad profile file.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Device (20-29)
// =============================================================================

/// Device unreachable (ping failed, connection refused, timeout).
pub const EXIT_UNREACHABLE: u8 = 20;

/// Malformed response (bad JSON, missing result, missing Content-Disposition).
pub const EXIT_PROTOCOL: u8 = 21;

/// Login rejected, or no valid token.
pub const EXIT_AUTH: u8 = 22;

/// Device returned a JSON-RPC error object.
pub const EXIT_RPC: u8 = 23;

/// Device returned a non-2xx HTTP status.
pub const EXIT_HTTP: u8 = 24;

/// Local file missing or unreadable/unwritable.
pub const EXIT_LOCAL_FILE: u8 = 25;

/// Map an ApiError to its exit code.
pub fn api_exit_code(err: &ApiError) -> u8 {
    match err {
        ApiError::Transport(_) => EXIT_UNREACHABLE,
        ApiError::Protocol(_) => EXIT_PROTOCOL,
        ApiError::AuthFailure(_) | ApiError::NotAuthenticated => EXIT_AUTH,
        ApiError::Rpc { .. } => EXIT_RPC,
        ApiError::Http(_, _) => EXIT_HTTP,
        ApiError::FileNotFound(_) | ApiError::Io(_) => EXIT_LOCAL_FILE,
        ApiError::Config(_) => EXIT_USAGE,
    }
}
