//! gateway::traits
//!
//! Gateway trait for rate-limited access to the remote hosting service.
//!
//! # Design
//!
//! The `Gateway` trait is async because every operation involves network
//! I/O. The production implementation serializes calls through a single
//! queue and honors the remote's rate limits; the mock implementation
//! answers from memory. Phases only see this trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::core::types::{Issue, PullRequest};
use super::rate_limit::RateLimitState;

/// Errors from gateway operations.
///
/// Each variant carries enough context for the error handler to classify
/// it and for the user to act on it.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// The gateway never became available (bad token, unparsable remote,
    /// offline mode). Carries a human-oriented remediation string.
    #[error("GitHub連携が利用できません: {reason}")]
    NotAvailable { reason: String },

    /// 401: the token was rejected.
    #[error("GitHubトークンが無効です")]
    Unauthorized,

    /// 403 without rate-limit markers: missing permission.
    #[error("アクセスが拒否されました: {message}")]
    Forbidden { message: String },

    /// 403/429 with rate-limit markers.
    #[error("APIレート制限に達しました (リセット: {reset_epoch})")]
    RateLimit { reset_epoch: u64 },

    /// 404: repository or resource missing.
    #[error("見つかりません: {resource}")]
    NotFound { resource: String },

    /// 422: the API rejected the payload.
    #[error("リクエストが不正です: {message}")]
    Validation { message: String },

    /// The request hit the client-side timeout.
    #[error("APIリクエストがタイムアウトしました")]
    Timeout,

    /// Connection-level failure.
    #[error("ネットワークエラー: {message}")]
    Network { message: String },

    /// Any other API failure.
    #[error("APIエラー: {status} - {message}")]
    Api { status: u16, message: String },
}

impl GatewayError {
    /// 422 for PR creation when head and base have no commits between them.
    pub fn is_no_commits_between(&self) -> bool {
        matches!(self, GatewayError::Validation { message }
            if message.contains("No commits between"))
    }

    /// 422 for PR creation when an identical PR already exists.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, GatewayError::Validation { message }
            if message.contains("already exists"))
    }
}

/// Request to create a pull request.
#[derive(Debug, Clone)]
pub struct CreatePrRequest {
    pub head: String,
    pub base: String,
    pub title: String,
    pub body: Option<String>,
    pub draft: bool,
    pub reviewers: Vec<String>,
}

/// A branch on the remote, as listed by the branches endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteBranch {
    pub name: String,
    pub last_commit_sha: String,
}

/// One commit in an activity window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitActivity {
    pub sha: String,
    pub author: String,
    pub message: String,
    pub date: DateTime<Utc>,
}

/// Aggregate activity over a metrics window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepoMetrics {
    pub window_days: u32,
    pub commits: usize,
    pub prs_created: usize,
    pub prs_merged: usize,
    /// Mean hours from PR creation to first review, over reviewed PRs.
    pub mean_review_hours: Option<f64>,
}

/// Rate-limited access to the remote hosting service.
///
/// # Ordering
///
/// Implementations must complete requests in FIFO order of call and
/// respect a minimum inter-request interval. Callers may therefore
/// issue requests back to back without their own throttling.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// True when initialization succeeded and calls can be made.
    fn available(&self) -> bool;

    /// The authenticated user's login, when available.
    fn identity(&self) -> Option<String>;

    /// Read-only view of the last-seen rate-limit window.
    fn rate_limit(&self) -> RateLimitState;

    /// List open issues, most recently updated first.
    async fn list_open_issues(&self) -> Result<Vec<Issue>, GatewayError>;

    /// Create an issue.
    async fn create_issue(&self, title: &str, body: &str) -> Result<Issue, GatewayError>;

    /// Fetch one issue by number.
    async fn get_issue(&self, number: u64) -> Result<Issue, GatewayError>;

    /// Add a comment to an issue.
    async fn comment_issue(&self, number: u64, body: &str) -> Result<(), GatewayError>;

    /// List open pull requests.
    async fn list_open_prs(&self) -> Result<Vec<PullRequest>, GatewayError>;

    /// List open pull requests with their reviews populated.
    async fn list_prs_with_reviews(&self) -> Result<Vec<PullRequest>, GatewayError>;

    /// Create a pull request, requesting reviewers when given.
    async fn create_pr(&self, request: CreatePrRequest) -> Result<PullRequest, GatewayError>;

    /// List branches on the remote.
    async fn list_branches(&self) -> Result<Vec<RemoteBranch>, GatewayError>;

    /// List contributor logins.
    async fn list_contributors(&self) -> Result<Vec<String>, GatewayError>;

    /// Suggest reviewers: contributors minus the authenticated user and
    /// the explicit exclude list.
    async fn suggest_reviewers(&self, exclude: &[String]) -> Result<Vec<String>, GatewayError> {
        let contributors = self.list_contributors().await?;
        let own = self.identity();
        Ok(contributors
            .into_iter()
            .filter(|login| Some(login.as_str()) != own.as_deref())
            .filter(|login| !exclude.iter().any(|e| e == login))
            .collect())
    }

    /// Commits on the default branch since the given time.
    async fn commits_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<CommitActivity>, GatewayError>;

    /// Aggregate repository activity over the last `window_days` days.
    async fn repo_metrics(&self, window_days: u32) -> Result<RepoMetrics, GatewayError>;
}
