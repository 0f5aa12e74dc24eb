//! Sticky comments: one identified comment per PR or commit, found and
//! updated in place across runs.

pub mod manager;
pub mod markers;

pub use manager::{
    same_identity, CommentAction, CommentMode, CommentOptions, CommentOutcome, SkipReason,
    StickyCommentManager,
};
pub use markers::{collapse_details, decide, CommentDecision, DecisionOptions, MarkedBody, Markers};
