use std::fmt;
use std::path::PathBuf;

/// Error type for every session operation.
#[derive(Debug)]
pub enum ApiError {
    /// Connection refused, DNS failure, TLS failure or timeout
    Transport(String),
    /// Non-2xx HTTP status, with the response body text
    Http(u16, String),
    /// Malformed JSON, missing result field, missing Content-Disposition
    Protocol(String),
    /// JSON-RPC error object returned by the device
    Rpc { code: i64, message: String },
    /// Login rejected or login response carried no token
    AuthFailure(String),
    /// Operation attempted without a session token
    NotAuthenticated,
    /// Local source file or directory does not exist
    FileNotFound(PathBuf),
    /// Local file I/O error other than "not found"
    Io(String),
    /// Local configuration could not be read or parsed
    Config(String),
}

/// JSON-RPC error codes the device uses for "no such entity".
const NOT_FOUND_CODES: &[i64] = &[1101, 1102];

impl ApiError {
    /// True when the device reported that the addressed entity does not exist.
    ///
    /// Orchestration uses this to treat "delete app that is not there" as
    /// success; the session itself never interprets it.
    pub fn is_not_found(&self) -> bool {
        match self {
            ApiError::Rpc { code, message } => {
                let msg = message.to_ascii_lowercase();
                NOT_FOUND_CODES.contains(code)
                    || msg.contains("not found")
                    || msg.contains("does not exist")
                    || msg.contains("invalid application name")
            }
            _ => false,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Http(code, body) if body.is_empty() => write!(f, "HTTP {code}"),
            Self::Http(code, body) => write!(f, "HTTP {code}: {body}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Self::Rpc { code, message } => write!(f, "device error {code}: {message}"),
            Self::AuthFailure(msg) => write!(f, "login failed: {msg}"),
            Self::NotAuthenticated => write!(f, "not authenticated (login first)"),
            Self::FileNotFound(path) => write!(f, "file not found: {}", path.display()),
            Self::Io(msg) => write!(f, "I/O error: {msg}"),
            Self::Config(msg) => write!(f, "config error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_by_code() {
        let err = ApiError::Rpc { code: 1101, message: "Application state error".into() };
        assert!(err.is_not_found());
    }

    #[test]
    fn test_not_found_by_message() {
        let err = ApiError::Rpc { code: 9, message: "Web application does not exist".into() };
        assert!(err.is_not_found());
    }

    #[test]
    fn test_other_errors_are_not_not_found() {
        assert!(!ApiError::Rpc { code: 2, message: "Permission denied".into() }.is_not_found());
        assert!(!ApiError::Http(404, String::new()).is_not_found());
        assert!(!ApiError::NotAuthenticated.is_not_found());
    }

    #[test]
    fn test_display() {
        assert_eq!(ApiError::Http(502, String::new()).to_string(), "HTTP 502");
        assert_eq!(
            ApiError::Rpc { code: 1, message: "Permission denied".into() }.to_string(),
            "device error 1: Permission denied"
        );
    }
}
