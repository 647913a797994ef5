use std::error::Error as StdError;
use std::fmt;

/// Failures surfaced by the completion client.
///
/// Malformed lines inside an otherwise healthy stream are not represented
/// here: the decoder recovers from them locally and keeps reading.
#[derive(Debug)]
pub enum ChatError {
    /// The remote rejected the credential (HTTP 401/403).
    Auth(String),
    /// The remote rejected the request for any other reason. Carries the
    /// message extracted from the response body when one was parseable.
    Api(String),
    /// The network request or response body could not be read.
    Transport(String),
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatError::Auth(msg) => write!(f, "{msg}"),
            ChatError::Api(msg) => write!(f, "{msg}"),
            ChatError::Transport(msg) => write!(f, "{msg}"),
        }
    }
}

impl StdError for ChatError {}
