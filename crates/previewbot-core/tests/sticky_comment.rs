//! Sticky comment protocol tests against the in-memory comment store.

use std::sync::Arc;

use previewbot_core::{
    CommentAction, CommentMode, CommentOptions, Markers, SkipReason, StickyCommentManager,
};
use remote_state::fakes::{CommentWrite, MemoryCommentStore};
use remote_state::CommentTarget;

fn pr() -> CommentTarget {
    CommentTarget::PullRequest { number: 7 }
}

fn manager(store: &Arc<MemoryCommentStore>, options: CommentOptions) -> StickyCommentManager {
    StickyCommentManager::new(store.clone(), options)
}

fn inner_of(body: &str) -> String {
    Markers::new("preview")
        .split(body)
        .expect("body carries both markers")
        .inner
        .to_string()
}

#[tokio::test]
async fn test_first_run_creates_comment() {
    let store = Arc::new(MemoryCommentStore::new("previewbot[bot]"));
    let outcome = manager(&store, CommentOptions::default())
        .upsert(&pr(), "Deployed")
        .await
        .unwrap();

    assert_eq!(outcome.action, CommentAction::Created);
    assert!(outcome.previous_id.is_none());
    assert!(outcome.created_id.is_some());
    let comments = store.comments(&pr());
    assert_eq!(comments.len(), 1);
    assert_eq!(inner_of(&comments[0].body), "Deployed");
}

#[tokio::test]
async fn test_unchanged_body_writes_once() {
    let store = Arc::new(MemoryCommentStore::new("previewbot"));
    let options = CommentOptions {
        skip_unchanged: true,
        ..Default::default()
    };
    let m = manager(&store, options);

    let first = m.upsert(&pr(), "same body").await.unwrap();
    let inner_first = inner_of(&store.comments(&pr())[0].body);
    let second = m.upsert(&pr(), "same body").await.unwrap();
    let inner_second = inner_of(&store.comments(&pr())[0].body);

    assert_eq!(first.action, CommentAction::Created);
    assert_eq!(second.action, CommentAction::Skipped(SkipReason::Unchanged));
    assert_eq!(second.previous_id, first.created_id);
    assert_eq!(store.writes().len(), 1);
    assert_eq!(inner_first, inner_second);
}

#[tokio::test]
async fn test_open_details_body_written_once_with_hide_details() {
    let body = "<details open><summary>Build log</summary>ok</details>";
    for append in [false, true] {
        let store = Arc::new(MemoryCommentStore::new("previewbot"));
        let options = CommentOptions {
            append,
            hide_details: true,
            skip_unchanged: true,
            ..Default::default()
        };
        let m = manager(&store, options);

        for _ in 0..3 {
            m.upsert(&pr(), body).await.unwrap();
        }

        assert_eq!(store.writes().len(), 1, "append = {}", append);
        assert_eq!(inner_of(&store.comments(&pr())[0].body), body);
    }
}

#[tokio::test]
async fn test_changed_body_updates_in_place() {
    let store = Arc::new(MemoryCommentStore::new("previewbot"));
    let m = manager(&store, CommentOptions::default());

    m.upsert(&pr(), "A").await.unwrap();
    let outcome = m.upsert(&pr(), "B").await.unwrap();

    assert_eq!(outcome.action, CommentAction::Updated);
    assert!(outcome.created_id.is_none());
    let comments = store.comments(&pr());
    assert_eq!(comments.len(), 1);
    assert_eq!(inner_of(&comments[0].body), "B");
}

#[tokio::test]
async fn test_append_joins_with_newline() {
    let store = Arc::new(MemoryCommentStore::new("previewbot"));
    let markers = Markers::new("preview");
    store.seed(&pr(), "previewbot", &markers.wrap("A"), false);

    let options = CommentOptions {
        append: true,
        ..Default::default()
    };
    manager(&store, options).upsert(&pr(), "B").await.unwrap();

    assert_eq!(inner_of(&store.comments(&pr())[0].body), "A\nB");
}

#[tokio::test]
async fn test_discovery_scans_every_page() {
    let store = Arc::new(MemoryCommentStore::new("previewbot").with_page_size(2));
    for i in 0..5 {
        store.seed(&pr(), "someone", &format!("comment {}", i), false);
    }
    let markers = Markers::new("preview");
    let sticky = store.seed(&pr(), "previewbot", &markers.wrap("old"), false);

    let outcome = manager(&store, CommentOptions::default())
        .upsert(&pr(), "new")
        .await
        .unwrap();

    assert_eq!(outcome.previous_id, Some(sticky.clone()));
    assert_eq!(store.list_calls(), 3);
    assert_eq!(
        store.writes(),
        vec![CommentWrite::Update {
            id: sticky,
            body: markers.wrap("new"),
        }]
    );
}

#[tokio::test]
async fn test_minimized_and_foreign_comments_are_ignored() {
    let store = Arc::new(MemoryCommentStore::new("previewbot"));
    let markers = Markers::new("preview");
    store.seed(&pr(), "previewbot", &markers.wrap("hidden"), true);
    store.seed(&pr(), "mallory", &markers.wrap("spoofed"), false);
    store.seed(&pr(), "previewbot", &Markers::new("other").wrap("x"), false);

    let outcome = manager(&store, CommentOptions::default())
        .upsert(&pr(), "fresh")
        .await
        .unwrap();

    assert_eq!(outcome.action, CommentAction::Created);
    assert!(outcome.previous_id.is_none());
}

#[tokio::test]
async fn test_author_override_and_bot_suffix() {
    let store = Arc::new(MemoryCommentStore::new("token-user"));
    let markers = Markers::new("preview");
    let existing = store.seed(&pr(), "Deploy-App[bot]", &markers.wrap("old"), false);

    let options = CommentOptions {
        author: Some("deploy-app".to_string()),
        ..Default::default()
    };
    let outcome = manager(&store, options).upsert(&pr(), "new").await.unwrap();
    assert_eq!(outcome.previous_id, Some(existing));
    assert_eq!(outcome.action, CommentAction::Updated);
}

#[tokio::test]
async fn test_human_text_outside_markers_survives() {
    let store = Arc::new(MemoryCommentStore::new("previewbot"));
    let markers = Markers::new("preview");
    let body = format!("Reviewer note\n{}\nfooter", markers.wrap("A"));
    store.seed(&pr(), "previewbot", &body, false);

    manager(&store, CommentOptions::default())
        .upsert(&pr(), "B")
        .await
        .unwrap();

    let updated = &store.comments(&pr())[0].body;
    assert!(updated.starts_with("Reviewer note\n"));
    assert!(updated.ends_with("\nfooter"));
    assert_eq!(inner_of(updated), "B");
}

#[tokio::test]
async fn test_empty_bodies_never_posted() {
    let store = Arc::new(MemoryCommentStore::new("previewbot"));
    let outcome = manager(&store, CommentOptions::default())
        .upsert(&pr(), "   ")
        .await
        .unwrap();
    assert_eq!(outcome.action, CommentAction::Skipped(SkipReason::Empty));
    assert!(store.writes().is_empty());
}

#[tokio::test]
async fn test_only_create_leaves_existing_alone() {
    let store = Arc::new(MemoryCommentStore::new("previewbot"));
    let markers = Markers::new("preview");
    store.seed(&pr(), "previewbot", &markers.wrap("old"), false);

    let options = CommentOptions {
        mode: CommentMode::OnlyCreate,
        ..Default::default()
    };
    let outcome = manager(&store, options).upsert(&pr(), "new").await.unwrap();
    assert_eq!(outcome.action, CommentAction::Skipped(SkipReason::Mode));
    assert!(store.writes().is_empty());
}

#[tokio::test]
async fn test_only_update_never_creates() {
    let store = Arc::new(MemoryCommentStore::new("previewbot"));
    let options = CommentOptions {
        mode: CommentMode::OnlyUpdate,
        ..Default::default()
    };
    let outcome = manager(&store, options).upsert(&pr(), "new").await.unwrap();
    assert_eq!(outcome.action, CommentAction::Skipped(SkipReason::Mode));
    assert!(store.writes().is_empty());
}

#[tokio::test]
async fn test_recreate_deletes_then_creates() {
    let store = Arc::new(MemoryCommentStore::new("previewbot"));
    let markers = Markers::new("preview");
    let old = store.seed(&pr(), "previewbot", &markers.wrap("old"), false);

    let options = CommentOptions {
        mode: CommentMode::Recreate,
        ..Default::default()
    };
    let outcome = manager(&store, options).upsert(&pr(), "new").await.unwrap();

    assert_eq!(outcome.action, CommentAction::Recreated);
    assert_eq!(outcome.previous_id, Some(old.clone()));
    let writes = store.writes();
    assert_eq!(writes[0], CommentWrite::Delete { id: old });
    assert!(matches!(writes[1], CommentWrite::Create { .. }));
    assert_eq!(store.comments(&pr()).len(), 1);
}

#[tokio::test]
async fn test_hide_and_recreate_minimizes_previous() {
    let store = Arc::new(MemoryCommentStore::new("previewbot"));
    let markers = Markers::new("preview");
    let old = store.seed(&pr(), "previewbot", &markers.wrap("old"), false);

    let options = CommentOptions {
        mode: CommentMode::HideAndRecreate,
        ..Default::default()
    };
    let outcome = manager(&store, options).upsert(&pr(), "new").await.unwrap();

    assert_eq!(outcome.action, CommentAction::HiddenAndCreated);
    let comments = store.comments(&pr());
    assert_eq!(comments.len(), 2);
    assert!(comments[0].is_minimized);
    assert_eq!(inner_of(&comments[1].body), "new");
    assert_eq!(outcome.previous_id, Some(old));
}

#[tokio::test]
async fn test_commit_target_is_separate() {
    let store = Arc::new(MemoryCommentStore::new("previewbot"));
    let commit = CommentTarget::Commit {
        sha: "abc123".to_string(),
    };
    let m = manager(&store, CommentOptions::default());
    m.upsert(&pr(), "on pr").await.unwrap();
    m.upsert(&commit, "on commit").await.unwrap();

    assert_eq!(store.comments(&pr()).len(), 1);
    assert_eq!(store.comments(&commit).len(), 1);
}

#[tokio::test]
async fn test_write_failure_propagates() {
    let store = Arc::new(MemoryCommentStore::new("previewbot"));
    store.fail_next_write(403, "Resource not accessible by integration");
    let err = manager(&store, CommentOptions::default())
        .upsert(&pr(), "body")
        .await
        .unwrap_err();
    assert_eq!(err.as_remote().and_then(|e| e.status()), Some(403));
}
