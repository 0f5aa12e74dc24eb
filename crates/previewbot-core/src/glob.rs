//! Bounded glob matching for change detection.
//!
//! Supported syntax: `**` matches any sequence of path segments, `*` matches
//! a run of non-`/` characters. Everything else is literal. Patterns are
//! compiled to anchored regexes after validation.

use regex::Regex;

use crate::domain::{PreviewError, Result};

/// Longest accepted pattern, in characters.
pub const MAX_PATTERN_LEN: usize = 1000;

/// Most wildcard tokens (`*` or `**`) accepted in one pattern.
pub const MAX_WILDCARDS: usize = 20;

/// A validated, compiled glob pattern.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    source: String,
    regex: Regex,
}

impl GlobPattern {
    /// Validate and compile a pattern.
    pub fn compile(pattern: &str) -> Result<Self> {
        if pattern.chars().count() > MAX_PATTERN_LEN {
            return Err(PreviewError::Configuration(format!(
                "glob pattern exceeds {} characters",
                MAX_PATTERN_LEN
            )));
        }

        let mut expr = String::with_capacity(pattern.len() * 2 + 2);
        expr.push('^');
        let mut wildcards = 0usize;
        let mut chars = pattern.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '*' {
                expr.push_str(&regex::escape(c.encode_utf8(&mut [0u8; 4])));
                continue;
            }
            wildcards += 1;
            if wildcards > MAX_WILDCARDS {
                return Err(PreviewError::Configuration(format!(
                    "glob pattern '{}' has more than {} wildcards",
                    truncate(pattern),
                    MAX_WILDCARDS
                )));
            }
            if chars.peek() == Some(&'*') {
                chars.next();
                if chars.peek() == Some(&'/') {
                    chars.next();
                    expr.push_str("(?:.*/)?");
                } else {
                    expr.push_str(".*");
                }
            } else {
                expr.push_str("[^/]*");
            }
        }
        expr.push('$');

        let regex = Regex::new(&expr).map_err(|e| {
            PreviewError::Configuration(format!("invalid glob '{}': {}", truncate(pattern), e))
        })?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// Compile `pattern` and test `path` against it.
pub fn glob_match(path: &str, pattern: &str) -> Result<bool> {
    Ok(GlobPattern::compile(pattern)?.is_match(path))
}

/// Compile a list of patterns, failing on the first invalid one.
pub fn compile_all(patterns: &[String]) -> Result<Vec<GlobPattern>> {
    patterns.iter().map(|p| GlobPattern::compile(p)).collect()
}

fn truncate(pattern: &str) -> String {
    pattern.chars().take(40).collect()
}
