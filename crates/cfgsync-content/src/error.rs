//! Error types for cfgsync-content

/// Result type for cfgsync-content operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in cfgsync-content operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to render {format} content: {message}")]
    Render { format: String, message: String },

    #[error("Invalid list key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },
}

impl Error {
    pub fn render(format: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Render {
            format: format.into(),
            message: message.into(),
        }
    }
}
