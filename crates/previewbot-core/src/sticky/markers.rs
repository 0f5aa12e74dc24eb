//! Header markers and the pure comment decision.
//!
//! The machine-owned part of a sticky comment sits between a start and an
//! end marker line. Only that span is ever read or replaced; text outside
//! it belongs to humans and is carried over verbatim.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Start/end marker pair for one header key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Markers {
    start: String,
    end: String,
}

/// A body carrying both markers, split around them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkedBody<'a> {
    pub before: &'a str,
    pub inner: &'a str,
    pub after: &'a str,
}

impl Markers {
    pub fn new(header: &str) -> Self {
        let header = header.trim();
        Self {
            start: format!("<!-- previewbot:{}:start -->", header),
            end: format!("<!-- previewbot:{}:end -->", header),
        }
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    pub fn end(&self) -> &str {
        &self.end
    }

    /// Wrap `inner` in the marker pair.
    pub fn wrap(&self, inner: &str) -> String {
        format!("{}\n{}\n{}", self.start, inner, self.end)
    }

    /// Whether `body` belongs to this header (start token present).
    pub fn is_marked(&self, body: &str) -> bool {
        body.contains(&self.start)
    }

    /// Split a body carrying both markers, start before end.
    ///
    /// `None` for legacy bodies that only carry the start token.
    pub fn split<'a>(&self, body: &'a str) -> Option<MarkedBody<'a>> {
        let start = body.find(&self.start)?;
        let inner_from = start + self.start.len();
        let end = inner_from + body[inner_from..].find(&self.end)?;
        let inner = &body[inner_from..end];
        let inner = inner.strip_prefix('\n').unwrap_or(inner);
        let inner = inner.strip_suffix('\n').unwrap_or(inner);
        Some(MarkedBody {
            before: &body[..start],
            inner,
            after: &body[end + self.end.len()..],
        })
    }
}

fn details_open() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)(<details\b[^>]*?)\s+open\b(?:=(?:"[^"]*"|'[^']*'|[^\s>]*))?"#).ok()
    })
    .as_ref()
}

/// Drop the `open` attribute from every `<details>` tag.
pub fn collapse_details(body: &str) -> String {
    match details_open() {
        Some(re) => re.replace_all(body, "$1").into_owned(),
        None => body.to_string(),
    }
}

/// Knobs that shape the decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecisionOptions {
    pub append: bool,
    pub hide_details: bool,
    pub skip_unchanged: bool,
    pub ignore_empty: bool,
}

/// What to do with the sticky comment this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum CommentDecision {
    SkipEmpty,
    SkipUnchanged,
    Create { body: String },
    Update { body: String },
}

impl CommentDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommentDecision::SkipEmpty => "skip-empty",
            CommentDecision::SkipUnchanged => "skip-unchanged",
            CommentDecision::Create { .. } => "create",
            CommentDecision::Update { .. } => "update",
        }
    }
}

/// Decide the write for `new_body` given the current comment body, if any.
pub fn decide(
    markers: &Markers,
    previous: Option<&str>,
    new_body: &str,
    options: DecisionOptions,
) -> CommentDecision {
    let new_blank = new_body.trim().is_empty();
    if new_blank && options.ignore_empty {
        return CommentDecision::SkipEmpty;
    }

    let previous_inner = previous.map(|body| match markers.split(body) {
        Some(marked) => marked.inner,
        None => body,
    });
    if new_blank && previous_inner.map_or(true, |inner| inner.trim().is_empty()) {
        return CommentDecision::SkipEmpty;
    }

    let Some(previous) = previous else {
        return CommentDecision::Create {
            body: markers.wrap(new_body),
        };
    };

    let Some(marked) = markers.split(previous) else {
        // Legacy body without an end marker: replaced whole, never appended to.
        return CommentDecision::Update {
            body: markers.wrap(new_body),
        };
    };

    // Compared as stored, before any collapsing.
    if options.skip_unchanged {
        let unchanged = if options.append {
            marked.inner.trim_end().ends_with(new_body.trim())
        } else {
            marked.inner.trim() == new_body.trim()
        };
        if unchanged {
            return CommentDecision::SkipUnchanged;
        }
    }

    let inner = if options.append && !marked.inner.is_empty() {
        let kept = if options.hide_details {
            collapse_details(marked.inner)
        } else {
            marked.inner.to_string()
        };
        format!("{}\n{}", kept, new_body)
    } else {
        new_body.to_string()
    };
    CommentDecision::Update {
        body: format!("{}{}{}", marked.before, markers.wrap(&inner), marked.after),
    }
}
