//! Error types for remote-state

use thiserror::Error;

/// Raw failures from the GitHub or Vercel APIs.
///
/// These are never inspected for meaning beyond their shape; the
/// classifier in `previewbot-core` turns them into actionable diagnoses.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// The remote answered with a non-2xx status
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The request never produced a response (DNS, TLS, timeout)
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body did not have the expected shape
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// A 2xx deploy response that carried no deployment URL
    #[error("deployment response did not include a deployment URL")]
    MissingDeploymentUrl,

    /// A resource addressed by id does not exist (fakes and GraphQL nulls)
    #[error("not found: {0}")]
    NotFound(String),

    /// GraphQL-level errors returned with a 200 status
    #[error("GraphQL error: {0}")]
    GraphQl(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RemoteError {
    /// HTTP status carried by this error, if the remote answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Http { status, .. } => Some(*status),
            RemoteError::NotFound(_) => Some(404),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RemoteError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            RemoteError::Http {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            RemoteError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RemoteError {
    fn from(err: serde_json::Error) -> Self {
        RemoteError::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_display_includes_status_and_body() {
        let err = RemoteError::Http {
            status: 404,
            body: "{\"error\":\"Project not found\"}".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("404"));
        assert!(msg.contains("Project not found"));
    }

    #[test]
    fn test_status_accessor() {
        let err = RemoteError::Http {
            status: 403,
            body: String::new(),
        };
        assert_eq!(err.status(), Some(403));
        assert_eq!(RemoteError::NotFound("x".into()).status(), Some(404));
        assert_eq!(RemoteError::Transport("reset".into()).status(), None);
        assert_eq!(RemoteError::MissingDeploymentUrl.status(), None);
    }
}
