//! errors
//!
//! Error classification and process-level failure handling.
//!
//! # Design
//!
//! The adapters (Git, gateway, backup) map platform errors into tagged
//! domain errors. This module is the only place that decides severity:
//! every error that bubbles out of a phase step goes through
//! [`ErrorHandler::handle`], which classifies it, counts it, logs it,
//! and tells the caller whether recovery should be attempted.
//!
//! Critical tags never trigger recovery. Warning tags never abort a
//! phase. Recoverable tags are dispatched to the recovery manager by
//! the phase driver.

pub mod messages;

use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;

use crate::backup::BackupError;
use crate::core::config::ConfigError;
use crate::core::logger::Logger;
use crate::gateway::GatewayError;
use crate::git::GitError;

/// Severity of a classified error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Critical,
    Recoverable,
    Warning,
    Unknown,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Critical => write!(f, "critical"),
            Severity::Recoverable => write!(f, "recoverable"),
            Severity::Warning => write!(f, "warning"),
            Severity::Unknown => write!(f, "unknown"),
        }
    }
}

/// The full error tag taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorTag {
    // Critical
    GitRepositoryCorruption,
    PermissionDenied,
    DiskSpaceFull,
    OutOfMemory,
    AuthenticationFailed,
    UnknownCritical,
    // Recoverable
    NetworkTimeout,
    ConnectionRefused,
    MergeConflict,
    ApiRateLimit,
    FileNotFound,
    ConfigurationMissing,
    FileBusy,
    UnknownRecoverable,
    // Warning
    OptionalFeatureUnavailable,
    ConfigurationMissingNonfatal,
    PerformanceWarning,
    DeprecatedFeature,
    // Fallback
    Unknown,
}

impl ErrorTag {
    /// All tags, for exhaustive tests.
    pub fn all() -> &'static [ErrorTag] {
        &[
            ErrorTag::GitRepositoryCorruption,
            ErrorTag::PermissionDenied,
            ErrorTag::DiskSpaceFull,
            ErrorTag::OutOfMemory,
            ErrorTag::AuthenticationFailed,
            ErrorTag::UnknownCritical,
            ErrorTag::NetworkTimeout,
            ErrorTag::ConnectionRefused,
            ErrorTag::MergeConflict,
            ErrorTag::ApiRateLimit,
            ErrorTag::FileNotFound,
            ErrorTag::ConfigurationMissing,
            ErrorTag::FileBusy,
            ErrorTag::UnknownRecoverable,
            ErrorTag::OptionalFeatureUnavailable,
            ErrorTag::ConfigurationMissingNonfatal,
            ErrorTag::PerformanceWarning,
            ErrorTag::DeprecatedFeature,
            ErrorTag::Unknown,
        ]
    }

    /// The severity class this tag belongs to.
    pub fn severity(&self) -> Severity {
        match self {
            ErrorTag::GitRepositoryCorruption
            | ErrorTag::PermissionDenied
            | ErrorTag::DiskSpaceFull
            | ErrorTag::OutOfMemory
            | ErrorTag::AuthenticationFailed
            | ErrorTag::UnknownCritical => Severity::Critical,
            ErrorTag::NetworkTimeout
            | ErrorTag::ConnectionRefused
            | ErrorTag::MergeConflict
            | ErrorTag::ApiRateLimit
            | ErrorTag::FileNotFound
            | ErrorTag::ConfigurationMissing
            | ErrorTag::FileBusy
            | ErrorTag::UnknownRecoverable => Severity::Recoverable,
            ErrorTag::OptionalFeatureUnavailable
            | ErrorTag::ConfigurationMissingNonfatal
            | ErrorTag::PerformanceWarning
            | ErrorTag::DeprecatedFeature => Severity::Warning,
            ErrorTag::Unknown => Severity::Unknown,
        }
    }

    /// Stable wire name, SCREAMING_SNAKE_CASE.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorTag::GitRepositoryCorruption => "GIT_REPOSITORY_CORRUPTION",
            ErrorTag::PermissionDenied => "PERMISSION_DENIED",
            ErrorTag::DiskSpaceFull => "DISK_SPACE_FULL",
            ErrorTag::OutOfMemory => "OUT_OF_MEMORY",
            ErrorTag::AuthenticationFailed => "AUTHENTICATION_FAILED",
            ErrorTag::UnknownCritical => "UNKNOWN_CRITICAL",
            ErrorTag::NetworkTimeout => "NETWORK_TIMEOUT",
            ErrorTag::ConnectionRefused => "CONNECTION_REFUSED",
            ErrorTag::MergeConflict => "MERGE_CONFLICT",
            ErrorTag::ApiRateLimit => "API_RATE_LIMIT",
            ErrorTag::FileNotFound => "FILE_NOT_FOUND",
            ErrorTag::ConfigurationMissing => "CONFIGURATION_MISSING",
            ErrorTag::FileBusy => "FILE_BUSY",
            ErrorTag::UnknownRecoverable => "UNKNOWN_RECOVERABLE",
            ErrorTag::OptionalFeatureUnavailable => "OPTIONAL_FEATURE_UNAVAILABLE",
            ErrorTag::ConfigurationMissingNonfatal => "CONFIGURATION_MISSING_NONFATAL",
            ErrorTag::PerformanceWarning => "PERFORMANCE_WARNING",
            ErrorTag::DeprecatedFeature => "DEPRECATED_FEATURE",
            ErrorTag::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for ErrorTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classification of one error occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorClassification {
    pub severity: Severity,
    pub tag: ErrorTag,
    pub recoverable: bool,
}

impl ErrorClassification {
    pub fn of(tag: ErrorTag) -> Self {
        let severity = tag.severity();
        Self {
            severity,
            tag,
            recoverable: severity == Severity::Recoverable,
        }
    }
}

/// The tagged error type phases propagate.
///
/// Adapters produce their own domain errors; this enum is the meeting
/// point the error handler classifies.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Backup(#[from] BackupError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{message}")]
    Other { message: String },
}

impl WorkflowError {
    /// Wrap a free-form message.
    pub fn other(message: impl Into<String>) -> Self {
        WorkflowError::Other {
            message: message.into(),
        }
    }

    /// Derive the error tag for this error.
    pub fn tag(&self) -> ErrorTag {
        match self {
            WorkflowError::Git(err) => classify_git(err),
            WorkflowError::Gateway(err) => classify_gateway(err),
            WorkflowError::Backup(err) => classify_backup(err),
            WorkflowError::Config(_) => ErrorTag::ConfigurationMissing,
            WorkflowError::Other { message } => classify_message(message),
        }
    }
}

fn classify_git(err: &GitError) -> ErrorTag {
    match err {
        GitError::MergeConflict { .. } => ErrorTag::MergeConflict,
        GitError::PermissionDenied { .. } => ErrorTag::PermissionDenied,
        GitError::AuthFailed { .. } => ErrorTag::AuthenticationFailed,
        GitError::Timeout { .. } => ErrorTag::NetworkTimeout,
        GitError::NetworkError { message } => {
            if message.to_ascii_lowercase().contains("refused") {
                ErrorTag::ConnectionRefused
            } else {
                ErrorTag::NetworkTimeout
            }
        }
        GitError::UnknownGit { message } => classify_message(message),
        // Flow-control errors the phases normally intercept themselves
        _ => ErrorTag::Unknown,
    }
}

fn classify_gateway(err: &GatewayError) -> ErrorTag {
    match err {
        GatewayError::Unauthorized => ErrorTag::AuthenticationFailed,
        GatewayError::Forbidden { .. } => ErrorTag::PermissionDenied,
        GatewayError::RateLimit { .. } => ErrorTag::ApiRateLimit,
        GatewayError::Timeout => ErrorTag::NetworkTimeout,
        GatewayError::Network { message } => {
            if message.to_ascii_lowercase().contains("refused") {
                ErrorTag::ConnectionRefused
            } else {
                ErrorTag::NetworkTimeout
            }
        }
        GatewayError::NotAvailable { .. } => ErrorTag::OptionalFeatureUnavailable,
        GatewayError::NotFound { .. } => ErrorTag::UnknownCritical,
        GatewayError::Validation { .. } | GatewayError::Api { .. } => ErrorTag::Unknown,
    }
}

fn classify_backup(err: &BackupError) -> ErrorTag {
    match err {
        BackupError::Io { source, .. } => classify_io(source),
        BackupError::NotFound(_) => ErrorTag::FileNotFound,
        BackupError::ChecksumMismatch { .. } => ErrorTag::UnknownCritical,
        BackupError::NothingToBackUp => ErrorTag::OptionalFeatureUnavailable,
        BackupError::Index(_) => ErrorTag::Unknown,
    }
}

fn classify_io(err: &std::io::Error) -> ErrorTag {
    use std::io::ErrorKind;
    match err.kind() {
        ErrorKind::PermissionDenied => ErrorTag::PermissionDenied,
        ErrorKind::NotFound => ErrorTag::FileNotFound,
        ErrorKind::TimedOut => ErrorTag::NetworkTimeout,
        ErrorKind::ConnectionRefused => ErrorTag::ConnectionRefused,
        ErrorKind::OutOfMemory => ErrorTag::OutOfMemory,
        _ => classify_message(&err.to_string()),
    }
}

/// Last-resort classification by message patterns and platform error
/// code names.
pub fn classify_message(message: &str) -> ErrorTag {
    let lower = message.to_ascii_lowercase();
    if lower.contains("enospc") || lower.contains("no space left") {
        ErrorTag::DiskSpaceFull
    } else if lower.contains("out of memory") || lower.contains("enomem") {
        ErrorTag::OutOfMemory
    } else if lower.contains("eacces") || lower.contains("eperm") || lower.contains("permission denied") {
        ErrorTag::PermissionDenied
    } else if lower.contains("corrupt") {
        ErrorTag::GitRepositoryCorruption
    } else if lower.contains("auth") && lower.contains("fail") {
        ErrorTag::AuthenticationFailed
    } else if lower.contains("rate limit") {
        ErrorTag::ApiRateLimit
    } else if lower.contains("connection refused") || lower.contains("econnrefused") {
        ErrorTag::ConnectionRefused
    } else if lower.contains("timed out") || lower.contains("timeout") || lower.contains("etimedout") {
        ErrorTag::NetworkTimeout
    } else if lower.contains("conflict") {
        ErrorTag::MergeConflict
    } else if lower.contains("ebusy") || lower.contains("resource busy") {
        ErrorTag::FileBusy
    } else if lower.contains("enoent") || lower.contains("no such file") {
        ErrorTag::FileNotFound
    } else if lower.contains("deprecated") {
        ErrorTag::DeprecatedFeature
    } else {
        ErrorTag::Unknown
    }
}

/// Counts surfaced by [`ErrorHandler::diagnostics`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorDiagnostics {
    pub critical: u64,
    pub recoverable: u64,
    pub warning: u64,
    pub unknown: u64,
}

impl ErrorDiagnostics {
    pub fn total(&self) -> u64 {
        self.critical + self.recoverable + self.warning + self.unknown
    }
}

type CleanupFn = Box<dyn FnOnce() + Send>;

/// The process-wide error handler.
///
/// Owns the classification counters, per-operation retry counters, and
/// the shutdown cleanup callbacks.
pub struct ErrorHandler {
    logger: Logger,
    max_retries: u32,
    counters: Mutex<HashMap<Severity, u64>>,
    retries: Mutex<HashMap<String, u32>>,
    cleanups: Mutex<Vec<CleanupFn>>,
}

impl ErrorHandler {
    /// Default retry bound for recoverable errors.
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    pub fn new(logger: Logger) -> Self {
        Self {
            logger,
            max_retries: Self::DEFAULT_MAX_RETRIES,
            counters: Mutex::new(HashMap::new()),
            retries: Mutex::new(HashMap::new()),
            cleanups: Mutex::new(Vec::new()),
        }
    }

    /// Override the retry bound. Used by tests.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Classify an error, record it, and log it.
    pub fn handle(&self, error: &WorkflowError) -> ErrorClassification {
        let classification = ErrorClassification::of(error.tag());

        {
            let mut counters = self.counters.lock().unwrap();
            *counters.entry(classification.severity).or_insert(0) += 1;
        }

        let line = format!(
            "[{}] {} ({})",
            classification.tag, error, classification.severity
        );
        match classification.severity {
            Severity::Critical | Severity::Unknown => self.logger.error(&line),
            Severity::Recoverable => self.logger.warn(&line),
            Severity::Warning => self.logger.info(&line),
        }

        classification
    }

    /// The user-facing report for a classification: tag, symptom, and
    /// remediation steps.
    pub fn report(&self, classification: &ErrorClassification) -> String {
        let mut out = format!(
            "[{}] {}\n",
            classification.tag,
            messages::symptom(classification.tag)
        );
        for (i, step) in messages::remediation(classification.tag).iter().enumerate() {
            out.push_str(&format!("  {}. {}\n", i + 1, step));
        }
        out
    }

    /// Account one retry for an operation. Returns the attempt number
    /// (1-based) while the bound allows, or `None` once exceeded.
    pub fn next_retry(&self, operation: &str) -> Option<u32> {
        let mut retries = self.retries.lock().unwrap();
        let count = retries.entry(operation.to_string()).or_insert(0);
        if *count >= self.max_retries {
            // Bound exceeded: reset so a later invocation starts fresh
            retries.remove(operation);
            return None;
        }
        *count += 1;
        Some(*count)
    }

    /// Clear the retry counter after success.
    pub fn clear_retries(&self, operation: &str) {
        self.retries.lock().unwrap().remove(operation);
    }

    /// Current classification counts.
    pub fn diagnostics(&self) -> ErrorDiagnostics {
        let counters = self.counters.lock().unwrap();
        ErrorDiagnostics {
            critical: counters.get(&Severity::Critical).copied().unwrap_or(0),
            recoverable: counters.get(&Severity::Recoverable).copied().unwrap_or(0),
            warning: counters.get(&Severity::Warning).copied().unwrap_or(0),
            unknown: counters.get(&Severity::Unknown).copied().unwrap_or(0),
        }
    }

    /// Register a cleanup callback for graceful shutdown.
    pub fn register_cleanup(&self, cleanup: impl FnOnce() + Send + 'static) {
        self.cleanups.lock().unwrap().push(Box::new(cleanup));
    }

    /// Run all registered cleanup callbacks, newest first.
    pub fn run_cleanups(&self) {
        let cleanups: Vec<CleanupFn> = self.cleanups.lock().unwrap().drain(..).collect();
        for cleanup in cleanups.into_iter().rev() {
            cleanup();
        }
    }

    /// Install the process panic hook for unhandled failures: emit a
    /// structured report and exit with status 1.
    pub fn install_panic_hook(logger: Logger) {
        std::panic::set_hook(Box::new(move |info| {
            let message = info
                .payload()
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| info.payload().downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panic with non-string payload".to_string());
            let location = info
                .location()
                .map(|l| format!("{}:{}", l.file(), l.line()))
                .unwrap_or_else(|| "unknown".to_string());
            logger.error(&format!("panic at {}: {}", location, message));
            eprintln!("予期しないエラーで終了します。詳細はログを確認してください");
            std::process::exit(1);
        }));
    }
}

impl std::fmt::Debug for ErrorHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorHandler")
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler() -> ErrorHandler {
        ErrorHandler::new(Logger::disabled())
    }

    #[test]
    fn tags_have_documented_severities() {
        assert_eq!(ErrorTag::PermissionDenied.severity(), Severity::Critical);
        assert_eq!(ErrorTag::DiskSpaceFull.severity(), Severity::Critical);
        assert_eq!(ErrorTag::AuthenticationFailed.severity(), Severity::Critical);
        assert_eq!(ErrorTag::NetworkTimeout.severity(), Severity::Recoverable);
        assert_eq!(ErrorTag::MergeConflict.severity(), Severity::Recoverable);
        assert_eq!(ErrorTag::ApiRateLimit.severity(), Severity::Recoverable);
        assert_eq!(
            ErrorTag::OptionalFeatureUnavailable.severity(),
            Severity::Warning
        );
        assert_eq!(ErrorTag::Unknown.severity(), Severity::Unknown);
    }

    #[test]
    fn only_recoverable_tags_are_recoverable() {
        for tag in ErrorTag::all() {
            let classification = ErrorClassification::of(*tag);
            assert_eq!(
                classification.recoverable,
                tag.severity() == Severity::Recoverable,
                "{tag}"
            );
        }
    }

    #[test]
    fn git_errors_classify_to_expected_tags() {
        let cases: Vec<(GitError, ErrorTag)> = vec![
            (
                GitError::MergeConflict { files: vec![] },
                ErrorTag::MergeConflict,
            ),
            (
                GitError::PermissionDenied {
                    message: "EACCES".into(),
                },
                ErrorTag::PermissionDenied,
            ),
            (
                GitError::AuthFailed {
                    message: "bad credentials".into(),
                },
                ErrorTag::AuthenticationFailed,
            ),
            (
                GitError::Timeout {
                    operation: "push".into(),
                },
                ErrorTag::NetworkTimeout,
            ),
            (
                GitError::NetworkError {
                    message: "connection refused".into(),
                },
                ErrorTag::ConnectionRefused,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(WorkflowError::Git(err).tag(), expected);
        }
    }

    #[test]
    fn gateway_errors_classify_to_expected_tags() {
        assert_eq!(
            WorkflowError::Gateway(GatewayError::Unauthorized).tag(),
            ErrorTag::AuthenticationFailed
        );
        assert_eq!(
            WorkflowError::Gateway(GatewayError::RateLimit { reset_epoch: 0 }).tag(),
            ErrorTag::ApiRateLimit
        );
        assert_eq!(
            WorkflowError::Gateway(GatewayError::Timeout).tag(),
            ErrorTag::NetworkTimeout
        );
        assert_eq!(
            WorkflowError::Gateway(GatewayError::NotAvailable {
                reason: "offline".into()
            })
            .tag(),
            ErrorTag::OptionalFeatureUnavailable
        );
    }

    #[test]
    fn message_patterns_classify() {
        assert_eq!(classify_message("ENOSPC: no space left"), ErrorTag::DiskSpaceFull);
        assert_eq!(classify_message("EACCES: permission denied"), ErrorTag::PermissionDenied);
        assert_eq!(classify_message("process out of memory"), ErrorTag::OutOfMemory);
        assert_eq!(classify_message("object database corrupt"), ErrorTag::GitRepositoryCorruption);
        assert_eq!(classify_message("API rate limit exceeded"), ErrorTag::ApiRateLimit);
        assert_eq!(classify_message("connect ECONNREFUSED"), ErrorTag::ConnectionRefused);
        assert_eq!(classify_message("request timed out"), ErrorTag::NetworkTimeout);
        assert_eq!(classify_message("merge conflict in a.txt"), ErrorTag::MergeConflict);
        assert_eq!(classify_message("EBUSY: resource busy"), ErrorTag::FileBusy);
        assert_eq!(classify_message("ENOENT: no such file"), ErrorTag::FileNotFound);
        assert_eq!(classify_message("this API is deprecated"), ErrorTag::DeprecatedFeature);
        assert_eq!(classify_message("something else"), ErrorTag::Unknown);
    }

    #[test]
    fn handle_counts_by_severity() {
        let handler = handler();
        handler.handle(&WorkflowError::Gateway(GatewayError::Unauthorized));
        handler.handle(&WorkflowError::Gateway(GatewayError::Timeout));
        handler.handle(&WorkflowError::Gateway(GatewayError::Timeout));
        handler.handle(&WorkflowError::other("???"));

        let diagnostics = handler.diagnostics();
        assert_eq!(diagnostics.critical, 1);
        assert_eq!(diagnostics.recoverable, 2);
        assert_eq!(diagnostics.unknown, 1);
        assert_eq!(diagnostics.total(), 4);
    }

    #[test]
    fn retry_counter_bounds_and_resets() {
        let handler = handler().with_max_retries(2);
        assert_eq!(handler.next_retry("push"), Some(1));
        assert_eq!(handler.next_retry("push"), Some(2));
        assert_eq!(handler.next_retry("push"), None);
        // Bound-exceeded cleared the counter
        assert_eq!(handler.next_retry("push"), Some(1));
        handler.clear_retries("push");
        assert_eq!(handler.next_retry("push"), Some(1));
    }

    #[test]
    fn cleanups_run_newest_first() {
        let handler = handler();
        let order = std::sync::Arc::new(Mutex::new(Vec::new()));

        let first = order.clone();
        handler.register_cleanup(move || first.lock().unwrap().push(1));
        let second = order.clone();
        handler.register_cleanup(move || second.lock().unwrap().push(2));

        handler.run_cleanups();
        assert_eq!(*order.lock().unwrap(), vec![2, 1]);
        // Idempotent: already drained
        handler.run_cleanups();
        assert_eq!(order.lock().unwrap().len(), 2);
    }

    #[test]
    fn report_contains_tag_and_steps() {
        let handler = handler();
        let classification = ErrorClassification::of(ErrorTag::MergeConflict);
        let report = handler.report(&classification);
        assert!(report.contains("MERGE_CONFLICT"));
        assert!(report.contains("1."));
    }
}
