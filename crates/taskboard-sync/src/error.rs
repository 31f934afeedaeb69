use thiserror::Error;

/// Failures of the data synchronizer.
///
/// None of these is fatal: callers log them and keep the previous snapshot.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A required URL is missing; the dependent feature stays disabled.
    #[error("configuration error: {0}")]
    Config(String),

    /// Non-2xx status, transport failure or unparsable body.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// Transport-level failure of the live channel.
    #[error("channel error: {0}")]
    Channel(String),

    /// A live-channel frame that could not be decoded.
    #[error("malformed message: {0}")]
    MalformedMessage(String),
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        SyncError::Fetch(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        SyncError::Channel(e.to_string())
    }
}
