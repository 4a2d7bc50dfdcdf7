use thiserror::Error;

/// Errors from Gitter API operations.
#[derive(Debug, Error)]
pub enum GitterError {
    /// Connection-level failure before any response was received.
    #[error("transport error: {0}")]
    Transport(String),
    /// The service answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Api { status: u16, body: String },
    /// A payload did not match the expected record shape.
    #[error("decode error: {0}")]
    Decode(String),
    /// A realtime session ended with an unrecoverable failure.
    #[error("realtime stream for room {room_id} faulted: {source}")]
    StreamFault {
        room_id: String,
        #[source]
        source: Box<GitterError>,
    },
    /// The token cannot be carried in an Authorization header.
    #[error("invalid token: {0}")]
    InvalidToken(String),
    /// Configuration could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),
}

impl GitterError {
    /// HTTP status carried by this error, looking through stream faults.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::StreamFault { source, .. } => source.status(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn is_auth(&self) -> bool {
        matches!(self.status(), Some(401 | 403)) || matches!(self, Self::InvalidToken(_))
    }

    /// Whether this is (or wraps) a payload decoding failure.
    pub fn is_decode(&self) -> bool {
        match self {
            Self::Decode(_) => true,
            Self::StreamFault { source, .. } => source.is_decode(),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for GitterError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for GitterError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

/// Build the error for a non-2xx response, keeping the raw body.
pub(crate) fn api_error(status: u16, body: &[u8]) -> GitterError {
    GitterError::Api {
        status,
        body: String::from_utf8_lossy(body).into_owned(),
    }
}
