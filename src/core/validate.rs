//! core::validate
//!
//! Input validation for user-supplied values.
//!
//! # Contract
//!
//! Every validator returns a [`ValidationResult`]: either the normalized
//! value (validators trim and canonicalize their input) or a human-readable
//! error string. Error strings are shown to the user as-is, so they are
//! kept in Japanese alongside the rest of the user-facing text.
//!
//! Validators never panic and never touch the filesystem or network.

use std::sync::OnceLock;

use regex::Regex;

/// User-facing validation messages.
pub mod messages {
    pub const BRANCH_EMPTY: &str = "ブランチ名を入力してください";
    pub const BRANCH_TOO_LONG: &str = "ブランチ名は100文字以内にしてください";
    pub const BRANCH_INVALID_CHARS: &str = "ブランチ名に使用できない文字が含まれています";
    pub const BRANCH_RESERVED: &str = "このブランチ名は予約されています";
    pub const COMMIT_TOO_SHORT: &str = "コミットメッセージは5文字以上にしてください";
    pub const COMMIT_TOO_LONG: &str = "コミットメッセージは200文字以内にしてください";
    pub const TOKEN_INVALID: &str =
        "GitHubトークンの形式が正しくありません (ghp_ または github_pat_ で始まる必要があります)";
    pub const SLACK_CHANNEL_INVALID: &str =
        "Slackチャンネル名の形式が正しくありません (例: #general)";
    pub const URL_INVALID: &str = "URLの形式が正しくありません";
    pub const URL_SCHEME_INVALID: &str = "URLのスキームが許可されていません";
    pub const DISCORD_WEBHOOK_INVALID: &str = "Discord Webhook URLの形式が正しくありません";
    pub const PATH_UNSAFE: &str = "このパスは安全でないため使用できません";
}

/// Outcome of a validation: the normalized value or a human error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    valid: bool,
    value: Option<String>,
    error: Option<String>,
}

impl ValidationResult {
    /// A successful validation carrying the normalized value.
    pub fn ok(value: impl Into<String>) -> Self {
        Self {
            valid: true,
            value: Some(value.into()),
            error: None,
        }
    }

    /// A failed validation carrying the user-facing message.
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            value: None,
            error: Some(message.into()),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// The normalized value, when valid.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// The error message, when invalid.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Convert into a `Result` for `?`-style call sites.
    pub fn into_result(self) -> Result<String, String> {
        match (self.value, self.error) {
            (Some(v), _) => Ok(v),
            (None, Some(e)) => Err(e),
            (None, None) => Err(String::new()),
        }
    }
}

/// Validate a Git branch name.
///
/// Trims the input, then enforces: length in `[1, 100]`, no whitespace,
/// no `..`, none of `` ~^:?*[]\ ``, no leading/trailing `-`, `.`, or `/`,
/// no `//`, and not exactly `HEAD` (case-insensitive).
///
/// # Example
///
/// ```
/// use teamflow::core::validate::validate_branch_name;
///
/// assert!(validate_branch_name("feature/issue-1-login").is_valid());
/// assert!(!validate_branch_name("bad..name").is_valid());
/// assert!(!validate_branch_name("HEAD").is_valid());
/// ```
pub fn validate_branch_name(input: &str) -> ValidationResult {
    let name = input.trim();

    if name.is_empty() {
        return ValidationResult::err(messages::BRANCH_EMPTY);
    }
    if name.len() > 100 {
        return ValidationResult::err(messages::BRANCH_TOO_LONG);
    }
    if name.eq_ignore_ascii_case("HEAD") {
        return ValidationResult::err(messages::BRANCH_RESERVED);
    }
    if name.chars().any(|c| c.is_whitespace()) {
        return ValidationResult::err(messages::BRANCH_INVALID_CHARS);
    }
    if name.contains("..") || name.contains("//") {
        return ValidationResult::err(messages::BRANCH_INVALID_CHARS);
    }
    const FORBIDDEN: [char; 8] = ['~', '^', ':', '?', '*', '[', ']', '\\'];
    if name.chars().any(|c| FORBIDDEN.contains(&c)) {
        return ValidationResult::err(messages::BRANCH_INVALID_CHARS);
    }
    if name.starts_with('-') || name.ends_with('-') {
        return ValidationResult::err(messages::BRANCH_INVALID_CHARS);
    }
    if name.starts_with('.') || name.ends_with('.') {
        return ValidationResult::err(messages::BRANCH_INVALID_CHARS);
    }
    if name.starts_with('/') || name.ends_with('/') {
        return ValidationResult::err(messages::BRANCH_INVALID_CHARS);
    }

    ValidationResult::ok(name)
}

/// Validate a commit message: trimmed length in `[5, 200]`.
pub fn validate_commit_message(input: &str) -> ValidationResult {
    let message = input.trim();
    if message.chars().count() < 5 {
        return ValidationResult::err(messages::COMMIT_TOO_SHORT);
    }
    if message.chars().count() > 200 {
        return ValidationResult::err(messages::COMMIT_TOO_LONG);
    }
    ValidationResult::ok(message)
}

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(ghp_[A-Za-z0-9]{36}|github_pat_[A-Za-z0-9_]{82})$")
            .expect("token pattern is valid")
    })
}

/// Validate a GitHub personal access token.
///
/// Accepts exactly two shapes: classic `ghp_` followed by 36 alphanumerics,
/// or fine-grained `github_pat_` followed by 82 characters of
/// `[A-Za-z0-9_]`.
pub fn validate_token(input: &str) -> ValidationResult {
    let token = input.trim();
    if token_regex().is_match(token) {
        ValidationResult::ok(token)
    } else {
        ValidationResult::err(messages::TOKEN_INVALID)
    }
}

fn slack_channel_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^#[a-z0-9_-]+$").expect("channel pattern is valid"))
}

/// Validate a Slack channel name, prepending `#` when absent.
///
/// The normalized channel (including `#`) must be 2-22 characters and
/// match `#[a-z0-9_-]+`.
pub fn validate_slack_channel(input: &str) -> ValidationResult {
    let trimmed = input.trim();
    let channel = if trimmed.starts_with('#') {
        trimmed.to_string()
    } else {
        format!("#{}", trimmed)
    };

    let len = channel.chars().count();
    if !(2..=22).contains(&len) || !slack_channel_regex().is_match(&channel) {
        return ValidationResult::err(messages::SLACK_CHANNEL_INVALID);
    }
    ValidationResult::ok(channel)
}

/// Validate a URL, optionally restricting the scheme.
pub fn validate_url(input: &str, allowed_schemes: Option<&[&str]>) -> ValidationResult {
    let trimmed = input.trim();
    let parsed = match reqwest::Url::parse(trimmed) {
        Ok(url) => url,
        Err(_) => return ValidationResult::err(messages::URL_INVALID),
    };

    if let Some(schemes) = allowed_schemes {
        if !schemes.contains(&parsed.scheme()) {
            return ValidationResult::err(messages::URL_SCHEME_INVALID);
        }
    }
    ValidationResult::ok(trimmed)
}

fn discord_webhook_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^https://discord\.com/api/webhooks/\d+/[\w-]+$")
            .expect("webhook pattern is valid")
    })
}

/// Validate a Discord webhook URL.
///
/// The value must parse as a URL and match
/// `https://discord.com/api/webhooks/<id>/<token>`.
pub fn validate_discord_webhook(input: &str) -> ValidationResult {
    let trimmed = input.trim();
    if reqwest::Url::parse(trimmed).is_err() || !discord_webhook_regex().is_match(trimmed) {
        return ValidationResult::err(messages::DISCORD_WEBHOOK_INVALID);
    }
    ValidationResult::ok(trimmed)
}

/// Validate a file path for tool-managed writes.
///
/// Rejects `..` traversal, absolute paths under `/etc`, `/root`, and
/// `/var/log`, and embedded NUL bytes.
pub fn validate_file_path(input: &str) -> ValidationResult {
    let path = input.trim();

    if path.contains('\0') {
        return ValidationResult::err(messages::PATH_UNSAFE);
    }
    if path.split(['/', '\\']).any(|component| component == "..") {
        return ValidationResult::err(messages::PATH_UNSAFE);
    }
    const FORBIDDEN_PREFIXES: [&str; 3] = ["/etc", "/root", "/var/log"];
    for prefix in FORBIDDEN_PREFIXES {
        if path == prefix || path.starts_with(&format!("{}/", prefix)) {
            return ValidationResult::err(messages::PATH_UNSAFE);
        }
    }
    ValidationResult::ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    mod branch_name {
        use super::*;

        #[test]
        fn accepts_typical_names() {
            for name in [
                "feature/issue-1-login",
                "bugfix/timeout",
                "main",
                "a",
                "hotfix/issue-99-crash-on-boot",
            ] {
                assert!(validate_branch_name(name).is_valid(), "{name}");
            }
        }

        #[test]
        fn trims_and_returns_trimmed_value() {
            let result = validate_branch_name("  feature/x  ");
            assert_eq!(result.value(), Some("feature/x"));
        }

        #[test]
        fn rejects_reserved_head() {
            assert!(!validate_branch_name("HEAD").is_valid());
            assert!(!validate_branch_name("head").is_valid());
            assert!(!validate_branch_name("HeAd").is_valid());
        }

        #[test]
        fn rejects_forbidden_shapes() {
            for name in [
                "",
                "has space",
                "dots..dots",
                "tilde~1",
                "caret^2",
                "colon:x",
                "question?",
                "star*",
                "bracket[",
                "bracket]",
                "back\\slash",
                "-leading",
                "trailing-",
                ".leading",
                "trailing.",
                "/leading",
                "trailing/",
                "double//slash",
            ] {
                assert!(!validate_branch_name(name).is_valid(), "{name:?}");
            }
        }

        #[test]
        fn rejects_over_100_chars() {
            let long = "a".repeat(101);
            assert!(!validate_branch_name(&long).is_valid());
            let exactly = "a".repeat(100);
            assert!(validate_branch_name(&exactly).is_valid());
        }
    }

    mod commit_message {
        use super::*;

        #[test]
        fn boundary_lengths() {
            assert!(!validate_commit_message("1234").is_valid());
            assert!(validate_commit_message("12345").is_valid());
            assert!(validate_commit_message(&"x".repeat(200)).is_valid());
            assert!(!validate_commit_message(&"x".repeat(201)).is_valid());
        }

        #[test]
        fn trims_before_measuring() {
            assert!(!validate_commit_message("  abc  ").is_valid());
            assert_eq!(
                validate_commit_message("  feat: add login  ").value(),
                Some("feat: add login")
            );
        }
    }

    mod token {
        use super::*;

        #[test]
        fn accepts_classic_token() {
            let token = format!("ghp_{}", "A1b2C3d4".repeat(5).chars().take(36).collect::<String>());
            assert_eq!(token.len(), 40);
            assert!(validate_token(&token).is_valid());
        }

        #[test]
        fn accepts_fine_grained_token() {
            let token = format!("github_pat_{}", "a_Z9".repeat(21).chars().take(82).collect::<String>());
            assert!(validate_token(&token).is_valid());
        }

        #[test]
        fn rejects_wrong_lengths_and_prefixes() {
            assert!(!validate_token("ghp_short").is_valid());
            assert!(!validate_token(&format!("ghp_{}", "a".repeat(37))).is_valid());
            assert!(!validate_token(&format!("gho_{}", "a".repeat(36))).is_valid());
            assert!(!validate_token(&format!("github_pat_{}", "a".repeat(81))).is_valid());
            assert!(!validate_token("").is_valid());
        }
    }

    mod slack_channel {
        use super::*;

        #[test]
        fn prepends_hash() {
            assert_eq!(validate_slack_channel("general").value(), Some("#general"));
            assert_eq!(validate_slack_channel("#general").value(), Some("#general"));
        }

        #[test]
        fn rejects_bad_shapes() {
            assert!(!validate_slack_channel("").is_valid());
            assert!(!validate_slack_channel("#").is_valid());
            assert!(!validate_slack_channel("UPPER").is_valid());
            assert!(!validate_slack_channel("has space").is_valid());
            // 22 chars total is the cap, including '#'
            assert!(validate_slack_channel(&"a".repeat(21)).is_valid());
            assert!(!validate_slack_channel(&"a".repeat(22)).is_valid());
        }
    }

    mod url {
        use super::*;

        #[test]
        fn parses_and_checks_scheme() {
            assert!(validate_url("https://example.com/x", None).is_valid());
            assert!(validate_url("https://example.com", Some(&["https"])).is_valid());
            assert!(!validate_url("http://example.com", Some(&["https"])).is_valid());
            assert!(!validate_url("not a url", None).is_valid());
        }
    }

    mod discord_webhook {
        use super::*;

        #[test]
        fn accepts_documented_shape() {
            assert!(validate_discord_webhook(
                "https://discord.com/api/webhooks/123456789/abc-DEF_123"
            )
            .is_valid());
        }

        #[test]
        fn rejects_other_hosts_and_shapes() {
            assert!(!validate_discord_webhook("https://example.com/api/webhooks/1/a").is_valid());
            assert!(!validate_discord_webhook("https://discord.com/api/webhooks/abc/def").is_valid());
            assert!(!validate_discord_webhook("https://discord.com/api/webhooks/1").is_valid());
        }
    }

    mod file_path {
        use super::*;

        #[test]
        fn rejects_traversal_and_system_paths() {
            assert!(!validate_file_path("../secrets").is_valid());
            assert!(!validate_file_path("a/../../b").is_valid());
            assert!(!validate_file_path("/etc/passwd").is_valid());
            assert!(!validate_file_path("/root/.ssh/id_rsa").is_valid());
            assert!(!validate_file_path("/var/log/syslog").is_valid());
            assert!(!validate_file_path("file\0name").is_valid());
        }

        #[test]
        fn accepts_project_relative_paths() {
            assert!(validate_file_path(".env").is_valid());
            assert!(validate_file_path("src/main.rs").is_valid());
            assert!(validate_file_path("/etcetera/notes.txt").is_valid());
        }
    }
}
