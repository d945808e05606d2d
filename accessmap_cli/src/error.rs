use thiserror::Error;

/// Errors surfaced by the AccessMap client.
///
/// `Http` and `JobFailed` display as the bare message so it can be shown to
/// the user verbatim.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Network(#[from] reqwest::Error),

    #[error("{message}")]
    Http { status: u16, message: String },

    #[error("Invalid JSON response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Unknown analysis type: {0}")]
    UnknownAnalysisType(String),

    #[error("{0}")]
    JobFailed(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// HTTP status for errors that came back from a server.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            ApiError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
