//! Domain-level error taxonomy for previewbot.

use remote_state::RemoteError;

/// previewbot domain errors.
#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PreviewError {
    /// The underlying remote failure, if this error came from GitHub or Vercel.
    pub fn as_remote(&self) -> Option<&RemoteError> {
        match self {
            PreviewError::Remote(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type for previewbot domain operations.
pub type Result<T> = std::result::Result<T, PreviewError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_display() {
        let err = PreviewError::Configuration("glob too long".to_string());
        assert!(err.to_string().contains("configuration error"));
        assert!(err.to_string().contains("glob too long"));
    }

    #[test]
    fn test_remote_error_converts() {
        let err: PreviewError = RemoteError::Http {
            status: 500,
            body: "boom".to_string(),
        }
        .into();
        assert_eq!(err.as_remote().and_then(|e| e.status()), Some(500));
        assert!(PreviewError::Configuration("x".to_string())
            .as_remote()
            .is_none());
    }
}
