use std::error::Error as StdError;
use std::fmt;

use reqwest::StatusCode;

/// Failure modes for inference server calls.
///
/// Every client operation reports failure through this type (or absorbs it
/// into a documented neutral value such as an empty model list); errors are
/// never smuggled through response text.
#[derive(Debug)]
pub enum ClientError {
    /// Network-level failure: connect, reset, or timeout.
    Transport(reqwest::Error),

    /// The server answered with a non-success status.
    Status { status: StatusCode, body: String },

    /// The server reported an error inside an otherwise valid payload.
    Api(String),

    /// The response body could not be decoded as the expected shape.
    Malformed(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Transport(source) => write!(f, "request failed: {source}"),
            ClientError::Status { status, body } => {
                let body = body.trim();
                if body.is_empty() {
                    write!(f, "server returned {status}")
                } else {
                    write!(f, "server returned {status}: {body}")
                }
            }
            ClientError::Api(message) => write!(f, "server error: {message}"),
            ClientError::Malformed(detail) => write!(f, "malformed response: {detail}"),
        }
    }
}

impl StdError for ClientError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ClientError::Transport(source) => Some(source),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(source: reqwest::Error) -> Self {
        ClientError::Transport(source)
    }
}
