//! Comment store with a fallback identity.
//!
//! When a call through the primary token is classified as an
//! authentication failure and a fallback store is configured, the call is
//! repeated exactly once through the fallback.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use previewbot_core::{classify_api_error, ErrorKind};
use remote_state::{CommentId, CommentPage, CommentStore, CommentTarget, RemoteResult};
use tracing::warn;

/// [`CommentStore`] that retries authentication failures through a second identity.
pub struct FallbackCommentStore {
    primary: Arc<dyn CommentStore>,
    fallback: Option<Arc<dyn CommentStore>>,
}

impl FallbackCommentStore {
    pub fn new(primary: Arc<dyn CommentStore>, fallback: Option<Arc<dyn CommentStore>>) -> Self {
        Self { primary, fallback }
    }

    async fn call<T, F, Fut>(&self, operation: &str, call: F) -> RemoteResult<T>
    where
        F: Fn(Arc<dyn CommentStore>) -> Fut,
        Fut: Future<Output = RemoteResult<T>>,
    {
        let err = match call(self.primary.clone()).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let diagnosis = classify_api_error(err.status(), &err.to_string());
        match &self.fallback {
            Some(fallback) if diagnosis.kind == ErrorKind::Authentication => {
                warn!(
                    operation = %operation,
                    error = %err,
                    "Authentication failed; retrying with fallback token"
                );
                call(fallback.clone()).await
            }
            _ => Err(err),
        }
    }
}

#[async_trait]
impl CommentStore for FallbackCommentStore {
    async fn viewer_login(&self) -> RemoteResult<String> {
        self.call("viewer_login", |store| async move { store.viewer_login().await })
            .await
    }

    /// Comments written through either token count as ours.
    async fn identities(&self) -> RemoteResult<Vec<String>> {
        let mut logins = self
            .call("identities", |store| async move { store.identities().await })
            .await?;
        if let Some(fallback) = &self.fallback {
            match fallback.identities().await {
                Ok(more) => {
                    for login in more {
                        if !logins.contains(&login) {
                            logins.push(login);
                        }
                    }
                }
                Err(err) => warn!(error = %err, "Could not resolve fallback identity"),
            }
        }
        Ok(logins)
    }

    async fn list_comments(
        &self,
        target: &CommentTarget,
        cursor: Option<&str>,
    ) -> RemoteResult<CommentPage> {
        self.call("list_comments", |store| async move {
            store.list_comments(target, cursor).await
        })
        .await
    }

    async fn create_comment(&self, target: &CommentTarget, body: &str) -> RemoteResult<CommentId> {
        self.call("create_comment", |store| async move {
            store.create_comment(target, body).await
        })
        .await
    }

    async fn update_comment(
        &self,
        target: &CommentTarget,
        id: &CommentId,
        body: &str,
    ) -> RemoteResult<()> {
        self.call("update_comment", |store| async move {
            store.update_comment(target, id, body).await
        })
        .await
    }

    async fn delete_comment(&self, target: &CommentTarget, id: &CommentId) -> RemoteResult<()> {
        self.call("delete_comment", |store| async move {
            store.delete_comment(target, id).await
        })
        .await
    }

    async fn minimize_comment(&self, target: &CommentTarget, id: &CommentId) -> RemoteResult<()> {
        self.call("minimize_comment", |store| async move {
            store.minimize_comment(target, id).await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remote_state::fakes::MemoryCommentStore;

    fn pr() -> CommentTarget {
        CommentTarget::PullRequest { number: 1 }
    }

    #[tokio::test]
    async fn test_forbidden_write_uses_fallback_once() {
        let primary = Arc::new(MemoryCommentStore::new("actions"));
        let fallback = Arc::new(MemoryCommentStore::new("bot"));
        primary.fail_next_write(403, "Resource not accessible by integration");

        let store = FallbackCommentStore::new(primary.clone(), Some(fallback.clone()));
        store.create_comment(&pr(), "hello").await.unwrap();

        assert!(primary.writes().is_empty());
        assert_eq!(fallback.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_fallback_failure_is_returned() {
        let primary = Arc::new(MemoryCommentStore::new("actions"));
        let fallback = Arc::new(MemoryCommentStore::new("bot"));
        primary.fail_next_write(403, "forbidden");
        fallback.fail_next_write(403, "still forbidden");

        let store = FallbackCommentStore::new(primary, Some(fallback.clone()));
        let err = store.create_comment(&pr(), "hello").await.unwrap_err();
        assert_eq!(err.status(), Some(403));
        assert!(fallback.writes().is_empty());
    }

    #[tokio::test]
    async fn test_other_errors_do_not_fall_back() {
        let primary = Arc::new(MemoryCommentStore::new("actions"));
        let fallback = Arc::new(MemoryCommentStore::new("bot"));
        primary.fail_next_write(500, "boom");

        let store = FallbackCommentStore::new(primary, Some(fallback.clone()));
        assert!(store.create_comment(&pr(), "hello").await.is_err());
        assert!(fallback.writes().is_empty());
    }

    #[tokio::test]
    async fn test_identities_cover_both_tokens() {
        let primary = Arc::new(MemoryCommentStore::new("github-actions[bot]"));
        let fallback = Arc::new(MemoryCommentStore::new("release-bot"));

        let store = FallbackCommentStore::new(primary.clone(), Some(fallback));
        assert_eq!(
            store.identities().await.unwrap(),
            vec!["github-actions[bot]".to_string(), "release-bot".to_string()]
        );

        let alone = FallbackCommentStore::new(primary, None);
        assert_eq!(
            alone.identities().await.unwrap(),
            vec!["github-actions[bot]".to_string()]
        );
    }

    #[tokio::test]
    async fn test_without_fallback_error_passes_through() {
        let primary = Arc::new(MemoryCommentStore::new("actions"));
        primary.fail_next_write(403, "forbidden");
        let store = FallbackCommentStore::new(primary, None);
        assert!(store.create_comment(&pr(), "hello").await.is_err());
    }
}
