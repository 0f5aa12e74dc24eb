//! Alias templates.

use crate::domain::AliasSpec;

const BRANCH_TOKEN: &str = "{{BRANCH}}";
const PR_NUMBER_TOKEN: &str = "{{PR_NUMBER}}";

/// Make a branch name safe for a DNS label.
///
/// Lowercases, strips everything but word characters, whitespace and `-`,
/// collapses separator runs to one `-` and trims `-` from both ends.
pub fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_separator = false;

    for c in input.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !out.is_empty() {
                out.push('-');
            }
            pending_separator = false;
            out.push(c);
        } else if c == '_' || c == '-' || c.is_whitespace() {
            pending_separator = true;
        }
    }
    out
}

/// Render one alias template, or `None` when a token stays unresolved.
pub fn render_alias(template: &str, branch: &str, pr_number: Option<u64>) -> Option<String> {
    let mut alias = template.replace(BRANCH_TOKEN, &slugify(branch));
    if let Some(number) = pr_number {
        alias = alias.replace(PR_NUMBER_TOKEN, &number.to_string());
    }
    let alias = alias.trim().to_string();
    if alias.is_empty() || (alias.contains("{{") && alias.contains("}}")) {
        None
    } else {
        Some(alias)
    }
}

/// Trigger branch that matches every branch.
pub const ANY_BRANCH: &str = "*";

/// Aliases to assign for `branch`, in configuration order.
pub fn candidate_aliases(
    candidates: &[AliasSpec],
    branch: &str,
    pr_number: Option<u64>,
) -> Vec<String> {
    candidates
        .iter()
        .filter(|spec| spec.trigger_branch == branch || spec.trigger_branch == ANY_BRANCH)
        .filter_map(|spec| render_alias(&spec.domain_template, branch, pr_number))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Feature/X"), "featurex");
        assert_eq!(slugify("fix_some  thing--now"), "fix-some-thing-now");
        assert_eq!(slugify("--Release 1.2--"), "release-12");
        assert_eq!(slugify("__"), "");
    }

    #[test]
    fn test_render_branch_and_pr() {
        assert_eq!(
            render_alias("{{BRANCH}}-pr{{PR_NUMBER}}.example.com", "My_Branch", Some(7)),
            Some("my-branch-pr7.example.com".to_string())
        );
    }

    #[test]
    fn test_unresolved_token_is_skipped() {
        assert_eq!(render_alias("pr-{{PR_NUMBER}}.example.com", "main", None), None);
        assert_eq!(render_alias("{{UNKNOWN}}.example.com", "main", Some(1)), None);
    }

    #[test]
    fn test_candidates_filter_on_trigger_branch() {
        let specs = vec![
            AliasSpec {
                domain_template: "x.example.com".to_string(),
                trigger_branch: "main".to_string(),
            },
            AliasSpec {
                domain_template: "dev.example.com".to_string(),
                trigger_branch: "dev".to_string(),
            },
            AliasSpec {
                domain_template: "pr-{{PR_NUMBER}}.example.com".to_string(),
                trigger_branch: "main".to_string(),
            },
        ];
        assert_eq!(
            candidate_aliases(&specs, "main", None),
            vec!["x.example.com".to_string()]
        );
    }

    #[test]
    fn test_any_branch_trigger() {
        let specs = vec![AliasSpec {
            domain_template: "pr-{{PR_NUMBER}}.example.com".to_string(),
            trigger_branch: ANY_BRANCH.to_string(),
        }];
        assert_eq!(
            candidate_aliases(&specs, "feature/x", Some(9)),
            vec!["pr-9.example.com".to_string()]
        );
    }
}
