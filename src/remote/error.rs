use thiserror::Error;

use crate::remote::http::TransportError;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("access token request rejected: {status} {body}")]
    TokenRejected { status: u16, body: String },

    #[error("unexpected {status} response: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("not a valid playlist url: {0}")]
    InvalidPlaylistUrl(String),

    #[error("playlist file error: {0}")]
    Io(#[from] std::io::Error),
}
