use std::time::Duration;

use thiserror::Error;

/// Failure to obtain a usable access token.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("refresh token rejected ({status}): {body}")]
    RefreshRejected { status: u16, body: String },

    #[error("token endpoint returned {status}: {body}")]
    TokenEndpoint { status: u16, body: String },

    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to bind authorization listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid redirect uri {uri:?}: {reason}")]
    RedirectUri { uri: String, reason: String },

    #[error("authorization callback failed: {0}")]
    Callback(String),

    #[error("authorization code exchange failed ({status}): {body}")]
    Exchange { status: u16, body: String },

    #[error("no authorization received within {0:?}")]
    Timeout(Duration),

    #[error("credential storage failed: {0:#}")]
    Store(anyhow::Error),
}

/// Failure of a whole batch call.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("batch request returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("batch response declares no multipart boundary (content-type: {0:?})")]
    MissingBoundary(String),

    #[error("batch response body is not delimited by boundary {0:?}")]
    UnmatchedBoundary(String),
}

/// Failure of one sub-response; only that entry is dropped.
#[derive(Debug, Error)]
pub enum PartError {
    #[error("part has no response Content-ID")]
    MissingContentId,

    #[error("correlation id {0} matches no request")]
    UnknownCorrelation(usize),

    #[error("part has no embedded HTTP status line")]
    MissingStatusLine,

    #[error("sub-request returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid metadata body: {0}")]
    Body(#[from] serde_json::Error),
}
