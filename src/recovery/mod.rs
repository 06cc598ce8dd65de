//! recovery
//!
//! Recovery strategies for recoverable failures.
//!
//! # Strategy table
//!
//! | Tag | Strategy |
//! |---|---|
//! | `NETWORK_TIMEOUT` | Exponential backoff retry (base 1s, Nth = base * 2^(N-1)) |
//! | `CONNECTION_REFUSED` | Enable offline mode and persist the reason |
//! | `MERGE_CONFLICT` | Restore the newest backup for the operation, after confirmation |
//! | `API_RATE_LIMIT` | Sleep until the window resets plus one second, then retry |
//! | `FILE_NOT_FOUND` | Write default content at the missing path |
//! | `CONFIGURATION_MISSING` | Write the default project configuration file |
//!
//! Every attempt is recorded in a bounded ring buffer that diagnostics
//! can query.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

use crate::backup::BackupStore;
use crate::core::logger::Logger;
use crate::core::paths::AppPaths;
use crate::errors::ErrorTag;
use crate::gateway::OfflineMarker;

/// Base delay for exponential backoff.
pub const BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Default retry bound.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// How many recovery attempts the history keeps.
const HISTORY_CAP: usize = 50;

/// Default content written for known missing files.
///
/// Only files the backup store itself snapshots have defaults; anything
/// else is not recoverable this way.
pub fn default_content_for(file_name: &str) -> Option<&'static str> {
    match file_name {
        ".gitignore" => Some("target/\nnode_modules/\n.env\n.teamflow/\n"),
        ".env" => Some(
            "# teamflow configuration\n\
             # GITHUB_TOKEN=ghp_your_token_here\n\
             # SLACK_TOKEN=\n\
             # SLACK_CHANNEL=#general\n\
             # DISCORD_WEBHOOK_URL=\n",
        ),
        _ => None,
    }
}

/// The algorithm the manager runs for one error tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStrategy {
    BackoffRetry,
    EnableOfflineMode,
    RestoreBackup,
    WaitForRateLimit,
    WriteDefaultFile,
    WriteDefaultConfig,
}

impl std::fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RecoveryStrategy::BackoffRetry => "backoff-retry",
            RecoveryStrategy::EnableOfflineMode => "enable-offline-mode",
            RecoveryStrategy::RestoreBackup => "restore-backup",
            RecoveryStrategy::WaitForRateLimit => "wait-for-rate-limit",
            RecoveryStrategy::WriteDefaultFile => "write-default-file",
            RecoveryStrategy::WriteDefaultConfig => "write-default-config",
        };
        write!(f, "{}", name)
    }
}

/// The strategy for a tag, if one exists.
pub fn strategy_for(tag: ErrorTag) -> Option<RecoveryStrategy> {
    match tag {
        ErrorTag::NetworkTimeout => Some(RecoveryStrategy::BackoffRetry),
        ErrorTag::ConnectionRefused => Some(RecoveryStrategy::EnableOfflineMode),
        ErrorTag::MergeConflict => Some(RecoveryStrategy::RestoreBackup),
        ErrorTag::ApiRateLimit => Some(RecoveryStrategy::WaitForRateLimit),
        ErrorTag::FileNotFound => Some(RecoveryStrategy::WriteDefaultFile),
        ErrorTag::ConfigurationMissing => Some(RecoveryStrategy::WriteDefaultConfig),
        _ => None,
    }
}

/// The Nth backoff delay: `base * 2^(N-1)`.
pub fn backoff_delay(attempt: u32) -> Duration {
    BACKOFF_BASE * 2u32.saturating_pow(attempt.saturating_sub(1))
}

/// Context for one recovery dispatch.
#[derive(Debug, Clone, Default)]
pub struct RecoveryContext {
    /// The operation being recovered (e.g. "start", "push").
    pub operation: String,
    /// The missing path, for `FILE_NOT_FOUND`.
    pub path: Option<PathBuf>,
    /// Rate-limit reset, for `API_RATE_LIMIT`.
    pub reset_epoch: Option<u64>,
    /// 1-based attempt number, for backoff.
    pub attempt: u32,
}

/// Outcome of one recovery dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// The caller should retry the failed operation.
    Retry,
    /// Recovery succeeded and the operation should not be retried.
    Recovered { message: String },
    /// Recovery failed; the error surfaces to the user.
    Failed { message: String },
}

/// One recorded attempt.
#[derive(Debug, Clone)]
pub struct RecoveryAttempt {
    pub tag: ErrorTag,
    pub strategy: RecoveryStrategy,
    pub success: bool,
    pub context: String,
    pub ts: DateTime<Utc>,
}

/// The recovery manager.
pub struct RecoveryManager {
    paths: AppPaths,
    store: BackupStore,
    logger: Logger,
    max_retries: u32,
    history: Mutex<VecDeque<RecoveryAttempt>>,
}

impl RecoveryManager {
    pub fn new(paths: AppPaths, store: BackupStore, logger: Logger) -> Self {
        Self {
            paths,
            store,
            logger,
            max_retries: DEFAULT_MAX_RETRIES,
            history: Mutex::new(VecDeque::new()),
        }
    }

    /// Override the retry bound. Used by tests.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Dispatch the strategy for a tag.
    ///
    /// `confirm` gates destructive strategies (backup restore); it
    /// receives the question and returns the user's answer.
    pub async fn recover(
        &self,
        tag: ErrorTag,
        context: &RecoveryContext,
        confirm: &dyn Fn(&str) -> bool,
    ) -> RecoveryOutcome {
        let Some(strategy) = strategy_for(tag) else {
            return RecoveryOutcome::Failed {
                message: format!("{} に対する復旧戦略はありません", tag),
            };
        };

        let outcome = match strategy {
            RecoveryStrategy::BackoffRetry => self.backoff(context).await,
            RecoveryStrategy::EnableOfflineMode => self.enable_offline_mode(context),
            RecoveryStrategy::RestoreBackup => self.restore_backup(context, confirm),
            RecoveryStrategy::WaitForRateLimit => self.wait_for_rate_limit(context).await,
            RecoveryStrategy::WriteDefaultFile => self.write_default_file(context),
            RecoveryStrategy::WriteDefaultConfig => self.write_default_config(),
        };

        let success = !matches!(outcome, RecoveryOutcome::Failed { .. });
        self.record(RecoveryAttempt {
            tag,
            strategy,
            success,
            context: context.operation.clone(),
            ts: Utc::now(),
        });
        self.logger.info(&format!(
            "recovery {} for {}: success={}",
            strategy, tag, success
        ));

        outcome
    }

    /// The recorded attempt history, oldest first.
    pub fn history(&self) -> Vec<RecoveryAttempt> {
        self.history.lock().unwrap().iter().cloned().collect()
    }

    fn record(&self, attempt: RecoveryAttempt) {
        let mut history = self.history.lock().unwrap();
        if history.len() == HISTORY_CAP {
            history.pop_front();
        }
        history.push_back(attempt);
    }

    async fn backoff(&self, context: &RecoveryContext) -> RecoveryOutcome {
        let attempt = context.attempt.max(1);
        if attempt > self.max_retries {
            return RecoveryOutcome::Failed {
                message: format!("{}回のリトライがすべて失敗しました", self.max_retries),
            };
        }
        let delay = backoff_delay(attempt);
        tokio::time::sleep(delay).await;
        RecoveryOutcome::Retry
    }

    fn enable_offline_mode(&self, context: &RecoveryContext) -> RecoveryOutcome {
        let marker = OfflineMarker {
            reason: format!("connection refused during {}", context.operation),
            since: Utc::now(),
        };
        let path = self.paths.offline_mode_path();
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return RecoveryOutcome::Failed {
                    message: format!("オフラインモードを記録できません: {}", e),
                };
            }
        }
        let json = match serde_json::to_string_pretty(&marker) {
            Ok(json) => json,
            Err(e) => {
                return RecoveryOutcome::Failed {
                    message: format!("オフラインモードを記録できません: {}", e),
                }
            }
        };
        match std::fs::write(&path, json) {
            Ok(()) => RecoveryOutcome::Recovered {
                message: "offline-enabled".to_string(),
            },
            Err(e) => RecoveryOutcome::Failed {
                message: format!("オフラインモードを記録できません: {}", e),
            },
        }
    }

    fn restore_backup(
        &self,
        context: &RecoveryContext,
        confirm: &dyn Fn(&str) -> bool,
    ) -> RecoveryOutcome {
        let record = match self.store.latest_for_operation(&context.operation) {
            Ok(Some(record)) => record,
            Ok(None) => {
                return RecoveryOutcome::Failed {
                    message: format!(
                        "操作 '{}' のバックアップが見つかりません",
                        context.operation
                    ),
                }
            }
            Err(e) => {
                return RecoveryOutcome::Failed {
                    message: format!("バックアップ一覧の取得に失敗しました: {}", e),
                }
            }
        };

        let question = format!(
            "バックアップ {} ({}) から復元しますか? 現在の変更は上書きされます",
            record.id, record.timestamp
        );
        if !confirm(&question) {
            return RecoveryOutcome::Failed {
                message: "復元はキャンセルされました".to_string(),
            };
        }

        match self.store.restore(&record.id) {
            Ok(_) => RecoveryOutcome::Recovered {
                message: format!("バックアップ {} から復元しました", record.id),
            },
            Err(e) => RecoveryOutcome::Failed {
                message: format!("復元に失敗しました: {}", e),
            },
        }
    }

    async fn wait_for_rate_limit(&self, context: &RecoveryContext) -> RecoveryOutcome {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs();
        let reset = context.reset_epoch.unwrap_or(now);
        let wait = Duration::from_secs(reset.saturating_sub(now) + 1);
        tokio::time::sleep(wait).await;
        RecoveryOutcome::Retry
    }

    fn write_default_file(&self, context: &RecoveryContext) -> RecoveryOutcome {
        let Some(path) = &context.path else {
            return RecoveryOutcome::Failed {
                message: "復旧対象のファイルパスが不明です".to_string(),
            };
        };
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let Some(content) = default_content_for(&file_name) else {
            return RecoveryOutcome::Failed {
                message: format!("{} のデフォルト内容は定義されていません", file_name),
            };
        };
        match std::fs::write(path, content) {
            Ok(()) => RecoveryOutcome::Recovered {
                message: format!("{} をデフォルト内容で作成しました", path.display()),
            },
            Err(e) => RecoveryOutcome::Failed {
                message: format!("ファイルを作成できません: {}", e),
            },
        }
    }

    fn write_default_config(&self) -> RecoveryOutcome {
        match crate::core::config::Config::fix(&self.paths) {
            Ok(repairs) if repairs.is_empty() => RecoveryOutcome::Recovered {
                message: "設定は既に存在します".to_string(),
            },
            Ok(repairs) => RecoveryOutcome::Recovered {
                message: repairs.join("; "),
            },
            Err(e) => RecoveryOutcome::Failed {
                message: format!("設定ファイルを作成できません: {}", e),
            },
        }
    }
}

impl std::fmt::Debug for RecoveryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryManager")
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager_in(dir: &TempDir) -> RecoveryManager {
        let paths = AppPaths::new(dir.path());
        RecoveryManager::new(
            paths.clone(),
            BackupStore::new(paths),
            Logger::disabled(),
        )
    }

    fn always(_: &str) -> bool {
        true
    }

    fn never(_: &str) -> bool {
        false
    }

    #[test]
    fn backoff_schedule_doubles() {
        assert_eq!(backoff_delay(1), Duration::from_secs(1));
        assert_eq!(backoff_delay(2), Duration::from_secs(2));
        assert_eq!(backoff_delay(3), Duration::from_secs(4));
        assert_eq!(backoff_delay(4), Duration::from_secs(8));
    }

    #[test]
    fn strategy_table_matches_tags() {
        assert_eq!(
            strategy_for(ErrorTag::NetworkTimeout),
            Some(RecoveryStrategy::BackoffRetry)
        );
        assert_eq!(
            strategy_for(ErrorTag::ConnectionRefused),
            Some(RecoveryStrategy::EnableOfflineMode)
        );
        assert_eq!(
            strategy_for(ErrorTag::MergeConflict),
            Some(RecoveryStrategy::RestoreBackup)
        );
        assert_eq!(
            strategy_for(ErrorTag::ApiRateLimit),
            Some(RecoveryStrategy::WaitForRateLimit)
        );
        assert_eq!(
            strategy_for(ErrorTag::FileNotFound),
            Some(RecoveryStrategy::WriteDefaultFile)
        );
        assert_eq!(
            strategy_for(ErrorTag::ConfigurationMissing),
            Some(RecoveryStrategy::WriteDefaultConfig)
        );
        assert_eq!(strategy_for(ErrorTag::PermissionDenied), None);
        assert_eq!(strategy_for(ErrorTag::Unknown), None);
    }

    #[tokio::test]
    async fn connection_refused_enables_offline_mode() {
        let dir = TempDir::new().unwrap();
        let manager = manager_in(&dir);

        let outcome = manager
            .recover(
                ErrorTag::ConnectionRefused,
                &RecoveryContext {
                    operation: "team".to_string(),
                    ..Default::default()
                },
                &always,
            )
            .await;

        assert_eq!(
            outcome,
            RecoveryOutcome::Recovered {
                message: "offline-enabled".to_string()
            }
        );
        let marker_path = AppPaths::new(dir.path()).offline_mode_path();
        assert!(marker_path.exists());
        let marker: OfflineMarker =
            serde_json::from_str(&std::fs::read_to_string(marker_path).unwrap()).unwrap();
        assert!(marker.reason.contains("team"));
    }

    #[tokio::test]
    async fn file_not_found_writes_known_defaults_only() {
        let dir = TempDir::new().unwrap();
        let manager = manager_in(&dir);

        let gitignore = dir.path().join(".gitignore");
        let outcome = manager
            .recover(
                ErrorTag::FileNotFound,
                &RecoveryContext {
                    operation: "start".to_string(),
                    path: Some(gitignore.clone()),
                    ..Default::default()
                },
                &always,
            )
            .await;
        assert!(matches!(outcome, RecoveryOutcome::Recovered { .. }));
        assert!(std::fs::read_to_string(&gitignore)
            .unwrap()
            .contains("target/"));

        let unknown = dir.path().join("mystery.bin");
        let outcome = manager
            .recover(
                ErrorTag::FileNotFound,
                &RecoveryContext {
                    operation: "start".to_string(),
                    path: Some(unknown.clone()),
                    ..Default::default()
                },
                &always,
            )
            .await;
        assert!(matches!(outcome, RecoveryOutcome::Failed { .. }));
        assert!(!unknown.exists());
    }

    #[tokio::test]
    async fn backoff_retries_then_fails_past_bound() {
        let dir = TempDir::new().unwrap();
        let manager = manager_in(&dir).with_max_retries(2);

        // Attempts within the bound sleep and signal retry; use attempt 1
        // so the test only sleeps one second.
        let outcome = manager
            .recover(
                ErrorTag::NetworkTimeout,
                &RecoveryContext {
                    operation: "push".to_string(),
                    attempt: 1,
                    ..Default::default()
                },
                &always,
            )
            .await;
        assert_eq!(outcome, RecoveryOutcome::Retry);

        let outcome = manager
            .recover(
                ErrorTag::NetworkTimeout,
                &RecoveryContext {
                    operation: "push".to_string(),
                    attempt: 3,
                    ..Default::default()
                },
                &always,
            )
            .await;
        assert!(matches!(outcome, RecoveryOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn restore_requires_confirmation() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(".env"), "GITHUB_TOKEN=x\n").unwrap();
        let manager = manager_in(&dir);
        manager.store.create_full("start", None).unwrap();

        let declined = manager
            .recover(
                ErrorTag::MergeConflict,
                &RecoveryContext {
                    operation: "start".to_string(),
                    ..Default::default()
                },
                &never,
            )
            .await;
        assert!(matches!(declined, RecoveryOutcome::Failed { .. }));

        let accepted = manager
            .recover(
                ErrorTag::MergeConflict,
                &RecoveryContext {
                    operation: "start".to_string(),
                    ..Default::default()
                },
                &always,
            )
            .await;
        assert!(matches!(accepted, RecoveryOutcome::Recovered { .. }));
    }

    #[tokio::test]
    async fn history_is_recorded_and_bounded() {
        let dir = TempDir::new().unwrap();
        let manager = manager_in(&dir);

        for _ in 0..3 {
            let _ = manager
                .recover(
                    ErrorTag::ConnectionRefused,
                    &RecoveryContext {
                        operation: "team".to_string(),
                        ..Default::default()
                    },
                    &always,
                )
                .await;
        }
        let history = manager.history();
        assert_eq!(history.len(), 3);
        assert!(history.iter().all(|a| a.success));
        assert!(history
            .iter()
            .all(|a| a.strategy == RecoveryStrategy::EnableOfflineMode));
    }

    #[tokio::test]
    async fn unknown_tag_has_no_strategy() {
        let dir = TempDir::new().unwrap();
        let manager = manager_in(&dir);
        let outcome = manager
            .recover(ErrorTag::Unknown, &RecoveryContext::default(), &always)
            .await;
        assert!(matches!(outcome, RecoveryOutcome::Failed { .. }));
    }
}
