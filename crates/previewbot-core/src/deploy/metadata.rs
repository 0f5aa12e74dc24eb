//! Deployment metadata.
//!
//! Built-in keys describe the commit and (for PR runs) the pull request.
//! Author email is never included. Pairs parsed from the free-form extra
//! metadata string are merged last.

use std::collections::BTreeMap;

use tracing::debug;

use crate::domain::{PreviewError, Result, RunContext};

/// Metadata describing the commit and pull request being deployed.
pub fn build_metadata(ctx: &RunContext, branch: &str) -> BTreeMap<String, String> {
    let mut meta = BTreeMap::new();
    meta.insert("githubDeployment".to_string(), "1".to_string());
    meta.insert("githubCommitSha".to_string(), ctx.sha.clone());
    meta.insert("githubCommitRef".to_string(), branch.to_string());
    meta.insert("githubRepo".to_string(), ctx.repository.clone());
    if let Some((org, repo)) = ctx.repository.split_once('/') {
        meta.insert("githubCommitOrg".to_string(), org.to_string());
        meta.insert("githubCommitRepo".to_string(), repo.to_string());
    }
    if let Some(message) = &ctx.commit_message {
        meta.insert("githubCommitMessage".to_string(), message.clone());
    }
    if let Some(author) = &ctx.commit_author {
        meta.insert("githubCommitAuthorName".to_string(), author.clone());
    }
    if let Some(pr) = &ctx.pull_request {
        meta.insert("githubPrId".to_string(), pr.number.to_string());
        meta.insert("githubPrHeadRef".to_string(), pr.head_ref.clone());
        meta.insert("githubPrBaseRef".to_string(), pr.base_ref.clone());
    }
    meta
}

/// Parse `-m key=value` / `--meta key=value` / `--meta=key=value` pairs out
/// of a free-form argument string. Single and double quotes group words;
/// a backslash escapes the next character outside single quotes. Other
/// tokens are ignored.
pub fn parse_extra_metadata(input: &str) -> Result<BTreeMap<String, String>> {
    let tokens = split_args(input)?;
    let mut meta = BTreeMap::new();
    let mut iter = tokens.into_iter();

    while let Some(token) = iter.next() {
        let pair = if token == "-m" || token == "--meta" {
            iter.next().ok_or_else(|| {
                PreviewError::Configuration(format!("'{}' expects a key=value argument", token))
            })?
        } else if let Some(rest) = token.strip_prefix("--meta=") {
            rest.to_string()
        } else {
            debug!(token = %token, "Ignoring non-metadata argument");
            continue;
        };

        match pair.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                meta.insert(key.to_string(), value.to_string());
            }
            _ => {
                return Err(PreviewError::Configuration(format!(
                    "metadata '{}' is not of the form key=value",
                    pair
                )))
            }
        }
    }

    Ok(meta)
}

fn split_args(input: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some('"'), '\\') | (None, '\\') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
                in_token = true;
            }
            (Some(_), c) => current.push(c),
            (None, '"') | (None, '\'') => {
                quote = Some(c);
                in_token = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if quote.is_some() {
        return Err(PreviewError::Configuration(
            "unterminated quote in metadata arguments".to_string(),
        ));
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}
