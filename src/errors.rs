use std::path::PathBuf;

use strum_macros::Display;

/// All error types that can occur when talking to a Hue bridge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failed to serialize data to JSON.
    #[error("failed to dump json: {0:?}")]
    JsonDump(serde_json::Error),

    /// Failed to deserialize JSON data.
    #[error("failed to load json: {0:?}")]
    JsonLoad(serde_json::Error),

    /// A UDP socket operation failed during discovery.
    #[error("socket {action} error: {err:?}")]
    Socket { action: String, err: std::io::Error },

    /// An HTTP request to the bridge could not be completed.
    #[error("http {action} error: {err}")]
    Http { action: String, err: reqwest::Error },

    /// The bridge answered with an unexpected HTTP status.
    #[error("http {action} returned status {status}")]
    Status { action: String, status: u16 },

    /// The bridge returned a structured error item.
    #[error("bridge error {code}: {description}")]
    Bridge { code: u16, description: String },

    /// The link button was not pressed before the pairing attempts ran out.
    #[error("link button not pressed after {attempts} attempts")]
    LinkButtonNotPressed { attempts: u32 },

    /// The connection has no credential yet.
    #[error("bridge connection is not authenticated")]
    NotAuthenticated,

    /// Refreshing cached data failed; the previous data is still in place.
    #[error("stale data, refresh failed: {0}")]
    StaleData(Box<Error>),

    /// Failed to parse a [`crate::Color`] from a string.
    #[error("invalid color string: {0}")]
    InvalidColorString(String),

    /// The bridge address cannot be turned into a URL.
    #[error("invalid bridge address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    /// The bridge answered with a body of an unexpected shape.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Reading or writing the persisted connection failed.
    #[error("storage error at {path:?}: {err:?}")]
    Storage { path: PathBuf, err: std::io::Error },
}

/// Coarse classification of an [`Error`], matching the remediation a user
/// interface should present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCategory {
    /// The bridge wants its link button pressed.
    NeedsPhysicalConfirmation,
    /// The bridge rejected the request with a described error.
    Protocol,
    /// Timeout, refused connection or unexpected status.
    Transport,
    /// A refresh failed but previously fetched data is still usable.
    StaleData,
    /// Local input or decoding problem.
    Invalid,
}

impl Error {
    /// Bridge error type for "link button not pressed".
    pub const LINK_BUTTON_NOT_PRESSED: u16 = 101;

    /// Create a new socket error
    pub fn socket(action: &str, err: std::io::Error) -> Self {
        Error::Socket {
            action: action.to_string(),
            err,
        }
    }

    /// Create a new http error
    pub fn http(action: &str, err: reqwest::Error) -> Self {
        Error::Http {
            action: action.to_string(),
            err,
        }
    }

    /// Create a new status error
    pub fn status(action: &str, status: reqwest::StatusCode) -> Self {
        Error::Status {
            action: action.to_string(),
            status: status.as_u16(),
        }
    }

    /// Create a new invalid address error
    pub fn invalid_address(address: &str, reason: &str) -> Self {
        Error::InvalidAddress {
            address: address.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::LinkButtonNotPressed { .. } => ErrorCategory::NeedsPhysicalConfirmation,
            Error::Bridge { code, .. } if *code == Self::LINK_BUTTON_NOT_PRESSED => {
                ErrorCategory::NeedsPhysicalConfirmation
            }
            Error::Bridge { .. } => ErrorCategory::Protocol,
            Error::Socket { .. } | Error::Http { .. } | Error::Status { .. } => {
                ErrorCategory::Transport
            }
            Error::StaleData(_) => ErrorCategory::StaleData,
            Error::JsonDump(_)
            | Error::JsonLoad(_)
            | Error::NotAuthenticated
            | Error::InvalidColorString(_)
            | Error::InvalidAddress { .. }
            | Error::UnexpectedResponse(_)
            | Error::Storage { .. } => ErrorCategory::Invalid,
        }
    }

    /// Whether retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self.category(), ErrorCategory::Transport)
    }
}

/// Hacky implementation of PartialEq for testing
#[cfg(test)]
impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}
