//! core::naming
//!
//! Branch-name derivation from work type, issue number, and description.
//!
//! # Rules
//!
//! - Slugs are lower-case ASCII alphanumerics plus dash, at most 30 chars
//! - Full names are `<prefix><issue-prefix><slug>`, e.g.
//!   `feature/issue-123-user-profile`
//! - Descriptions with no usable ASCII (e.g. Japanese-only titles) fall
//!   back to a fixed slug so the branch name is still valid

use crate::core::types::{BranchPlan, WorkType};

/// Maximum slug length in characters.
pub const MAX_SLUG_LEN: usize = 30;

/// Slug used when the description yields no usable characters.
const FALLBACK_SLUG: &str = "work";

/// Generate a branch slug from a free-form description.
///
/// Lower-cases ASCII alphanumerics, converts spaces and underscores to
/// dashes, drops everything else, collapses dash runs, and truncates to
/// [`MAX_SLUG_LEN`].
///
/// # Example
///
/// ```
/// use teamflow::core::naming::slugify;
///
/// assert_eq!(slugify("Add user authentication"), "add-user-authentication");
/// assert_eq!(slugify("Fix bug #123"), "fix-bug-123");
/// assert_eq!(slugify("ユーザープロファイル機能"), "work");
/// ```
pub fn slugify(description: &str) -> String {
    let first_line = description.lines().next().unwrap_or("");

    let slug: String = first_line
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else if c == ' ' || c == '_' || c == '-' {
                '-'
            } else {
                '\0'
            }
        })
        .filter(|&c| c != '\0')
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    let slug = truncate_on_boundary(&slug, MAX_SLUG_LEN);

    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

/// Truncate a slug without leaving a trailing dash.
fn truncate_on_boundary(slug: &str, max: usize) -> String {
    let truncated: String = slug.chars().take(max).collect();
    truncated.trim_end_matches('-').to_string()
}

/// Build a [`BranchPlan`] from work type, optional issue, and description.
///
/// # Example
///
/// ```
/// use teamflow::core::naming::build_branch_plan;
/// use teamflow::core::types::WorkType;
///
/// let plan = build_branch_plan(WorkType::Feature, Some(123), "User profile");
/// assert_eq!(plan.full_name, "feature/issue-123-user-profile");
/// ```
pub fn build_branch_plan(
    work_type: WorkType,
    issue_number: Option<u64>,
    description: &str,
) -> BranchPlan {
    let slug = slugify(description);
    let issue_prefix = match issue_number {
        Some(n) => format!("issue-{}-", n),
        None => String::new(),
    };
    let full_name = format!("{}{}{}", work_type.branch_prefix(), issue_prefix, slug);

    BranchPlan {
        work_type,
        issue_number,
        slug,
        full_name,
    }
}

/// Extract the issue number encoded in a branch name, if any.
///
/// Branch names carry their issue as `issue-<N>-`, e.g.
/// `bugfix/issue-5-login`.
///
/// # Example
///
/// ```
/// use teamflow::core::naming::issue_number_from_branch;
///
/// assert_eq!(issue_number_from_branch("bugfix/issue-5-login"), Some(5));
/// assert_eq!(issue_number_from_branch("feature/cleanup"), None);
/// ```
pub fn issue_number_from_branch(branch: &str) -> Option<u64> {
    let idx = branch.find("issue-")?;
    let rest = &branch[idx + "issue-".len()..];
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() || !rest[digits.len()..].starts_with('-') {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_basic() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("fix: something"), "fix-something");
        assert_eq!(slugify("Add feature"), "add-feature");
    }

    #[test]
    fn slugify_removes_invalid_chars() {
        assert_eq!(slugify("Fix bug [WIP]"), "fix-bug-wip");
        assert_eq!(slugify("Test: foo/bar"), "test-foobar");
    }

    #[test]
    fn slugify_truncates_to_max() {
        let long = "a".repeat(100);
        assert_eq!(slugify(&long).len(), MAX_SLUG_LEN);
    }

    #[test]
    fn slugify_no_trailing_dash_after_truncation() {
        // 30th char lands on a dash boundary
        let input = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaa b";
        let slug = slugify(input);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn slugify_non_ascii_falls_back() {
        assert_eq!(slugify("ユーザープロファイル機能"), "work");
        assert_eq!(slugify(""), "work");
    }

    #[test]
    fn slugify_uses_first_line() {
        assert_eq!(slugify("First line\nSecond line"), "first-line");
    }

    #[test]
    fn plan_with_issue() {
        let plan = build_branch_plan(WorkType::Feature, Some(123), "ユーザープロファイル機能");
        assert!(plan.full_name.starts_with("feature/"));
        assert!(plan.full_name.contains("issue-123-"));
        assert!(plan.slug.len() <= MAX_SLUG_LEN);
        assert!(plan
            .slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
    }

    #[test]
    fn plan_without_issue() {
        let plan = build_branch_plan(WorkType::Bugfix, None, "Login timeout");
        assert_eq!(plan.full_name, "bugfix/login-timeout");
    }

    #[test]
    fn issue_number_roundtrip() {
        let plan = build_branch_plan(WorkType::Bugfix, Some(5), "login");
        assert_eq!(issue_number_from_branch(&plan.full_name), Some(5));
    }

    #[test]
    fn issue_number_absent() {
        assert_eq!(issue_number_from_branch("feature/cleanup"), None);
        assert_eq!(issue_number_from_branch("feature/issue-x-cleanup"), None);
        // "issue-5" with no trailing dash is not the encoded form
        assert_eq!(issue_number_from_branch("feature/issue-5"), None);
    }
}
