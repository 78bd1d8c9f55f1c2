use thiserror::Error;

use crate::graphql::GraphqlError;
use crate::types::TaskStatus;

/// Errors returned by PixAI operations.
#[derive(Error, Debug)]
pub enum PixaiError {
    /// The server rejected the request or reported GraphQL errors.
    #[error("{message}")]
    Api {
        message: String,
        /// GraphQL errors reported by the server, if any.
        errors: Vec<GraphqlError>,
        /// HTTP status of the response, when the failure came from a request.
        status: Option<u16>,
        /// Raw response body, when one was captured.
        body: Option<String>,
    },

    /// The subscription socket closed.
    #[error("WebSocket closed: {reason} (code {code})")]
    SocketClosed { code: u16, reason: String },

    /// The subscription socket reported an error event.
    #[error("WebSocket error: {0}")]
    Socket(String),

    /// The generation task ended in a failed or cancelled state.
    #[error("generation task {id} ended with status {status}")]
    TaskFailed { id: String, status: TaskStatus },

    /// The content type is neither an image nor a video.
    #[error("unsupported media content type: {0}")]
    UnsupportedMediaType(String),

    /// The media record carries no public-variant URL.
    #[error("media {id} has no public URL")]
    MissingPublicUrl { id: String },

    /// Media was requested from a task that has not completed.
    #[error("task {id} is not completed (status: {status})")]
    TaskNotCompleted { id: String, status: TaskStatus },

    /// The operation was used in a way the client cannot honor.
    #[error("{0}")]
    Usage(String),

    /// Network-level request failure with context.
    #[error("{context}: {source}")]
    Network {
        context: String,
        source: reqwest::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PixaiError {
    /// An API failure with just a message, no GraphQL error list attached.
    pub(crate) fn api(message: impl Into<String>) -> Self {
        PixaiError::Api {
            message: message.into(),
            errors: Vec::new(),
            status: None,
            body: None,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, PixaiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let err = PixaiError::api("no task returned");
        assert_eq!(err.to_string(), "no task returned");
    }

    #[test]
    fn test_socket_closed_display() {
        let err = PixaiError::SocketClosed {
            code: 4205,
            reason: "Client Restart".into(),
        };
        assert_eq!(err.to_string(), "WebSocket closed: Client Restart (code 4205)");
    }

    #[test]
    fn test_task_failed_display() {
        let err = PixaiError::TaskFailed {
            id: "t1".into(),
            status: TaskStatus::Cancelled,
        };
        assert_eq!(
            err.to_string(),
            "generation task t1 ended with status cancelled"
        );
    }
}
