//! Property tests: validators agree with their reference definitions.

use proptest::prelude::*;
use regex::Regex;

use teamflow::core::naming::{build_branch_plan, slugify, MAX_SLUG_LEN};
use teamflow::core::types::WorkType;
use teamflow::core::validate::{
    validate_branch_name, validate_commit_message, validate_discord_webhook, validate_token,
};

/// Reference predicate for branch names, written independently of the
/// validator: trimmed, 1..=100 chars, no whitespace, no "..", none of
/// the forbidden characters, no forbidden leading/trailing characters,
/// no "//", not HEAD.
fn reference_branch_ok(input: &str) -> bool {
    let name = input.trim();
    if name.is_empty() || name.len() > 100 {
        return false;
    }
    if name.eq_ignore_ascii_case("head") {
        return false;
    }
    if name.chars().any(|c| c.is_whitespace()) {
        return false;
    }
    if name.contains("..") || name.contains("//") {
        return false;
    }
    if name.chars().any(|c| "~^:?*[]\\".contains(c)) {
        return false;
    }
    for (first, last) in [('-', '-'), ('.', '.'), ('/', '/')] {
        if name.starts_with(first) || name.ends_with(last) {
            return false;
        }
    }
    true
}

proptest! {
    #[test]
    fn branch_validator_agrees_with_reference(input in "[ -~]{0,110}") {
        let validated = validate_branch_name(&input).is_valid();
        prop_assert_eq!(validated, reference_branch_ok(&input), "input: {:?}", input);
    }

    #[test]
    fn branch_validator_returns_trimmed_value(core in "[a-z0-9][a-z0-9/-]{0,30}[a-z0-9]") {
        prop_assume!(reference_branch_ok(&core));
        let padded = format!("  {}  ", core);
        let result = validate_branch_name(&padded);
        prop_assert!(result.is_valid());
        prop_assert_eq!(result.value(), Some(core.as_str()));
    }

    #[test]
    fn commit_validator_is_exactly_the_length_rule(input in "\\PC{0,220}") {
        let trimmed_len = input.trim().chars().count();
        let expected = (5..=200).contains(&trimmed_len);
        prop_assert_eq!(validate_commit_message(&input).is_valid(), expected);
    }

    #[test]
    fn classic_tokens_of_right_shape_are_accepted(body in "[A-Za-z0-9]{36}") {
        let token = format!("ghp_{}", body);
        prop_assert!(validate_token(&token).is_valid());
    }

    #[test]
    fn classic_tokens_of_wrong_length_are_rejected(body in "[A-Za-z0-9]{0,60}") {
        prop_assume!(body.len() != 36);
        let token = format!("ghp_{}", body);
        prop_assert!(!validate_token(&token).is_valid());
    }

    #[test]
    fn fine_grained_tokens_of_right_shape_are_accepted(body in "[A-Za-z0-9_]{82}") {
        let token = format!("github_pat_{}", body);
        prop_assert!(validate_token(&token).is_valid());
    }

    #[test]
    fn arbitrary_strings_rarely_pass_token_validator(input in "[ -~]{0,100}") {
        let reference = Regex::new(
            r"^(ghp_[A-Za-z0-9]{36}|github_pat_[A-Za-z0-9_]{82})$"
        ).unwrap();
        prop_assert_eq!(
            validate_token(&input).is_valid(),
            reference.is_match(input.trim())
        );
    }

    #[test]
    fn discord_webhook_agrees_with_reference(id in 0u64..u64::MAX, token in "[A-Za-z0-9_-]{1,40}") {
        let url = format!("https://discord.com/api/webhooks/{}/{}", id, token);
        prop_assert!(validate_discord_webhook(&url).is_valid());
    }

    #[test]
    fn slugs_are_lowercase_dash_bounded(input in "\\PC{0,80}") {
        let slug = slugify(&input);
        prop_assert!(!slug.is_empty());
        prop_assert!(slug.chars().count() <= MAX_SLUG_LEN);
        prop_assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        prop_assert!(!slug.starts_with('-'));
        prop_assert!(!slug.ends_with('-'));
    }

    #[test]
    fn branch_plans_always_validate(issue in proptest::option::of(1u64..100_000), input in "\\PC{0,60}") {
        let plan = build_branch_plan(WorkType::Feature, issue, &input);
        prop_assert!(plan.full_name.starts_with("feature/"));
        prop_assert!(validate_branch_name(&plan.full_name).is_valid(), "name: {:?}", plan.full_name);
        if let Some(number) = issue {
            let marker = format!("issue-{}-", number);
            prop_assert!(plan.full_name.contains(&marker));
        }
    }
}
