//! gateway::github
//!
//! GitHub gateway implementation over the REST API.
//!
//! # Design
//!
//! All outbound calls flow through a single dispatch queue (a fair async
//! mutex), so requests complete in FIFO order of call. Before each
//! dispatch the gateway enforces a minimum inter-request interval and
//! consults the last-seen rate-limit window; an exhausted window sleeps
//! until one second past the reset. A 403 that carries rate-limit
//! markers puts the request back at the head of the queue (the caller
//! still holds the queue lock) and sleeps before retrying.
//!
//! # Initialization
//!
//! `connect` runs the full sequence: offline-mode check, token check,
//! owner/repo derivation from the remote URL, `GET /user`, repository
//! probe, and collaborator-permission probe. Any failure leaves the
//! gateway in the unavailable state where every operation returns
//! [`GatewayError::NotAvailable`] with a remediation string.

use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Method, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::core::types::{Issue, IssueState, PrState, PullRequest, Review, ReviewState};

use super::rate_limit::RateLimitState;
use super::traits::{
    CommitActivity, CreatePrRequest, Gateway, GatewayError, RemoteBranch, RepoMetrics,
};

/// Default GitHub API base URL.
const DEFAULT_API_BASE: &str = "https://api.github.com";

/// User-Agent header value for API requests.
const USER_AGENT_VALUE: &str = "teamflow-cli";

/// Minimum spacing between consecutive dispatches.
const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(100);

/// Client-side request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How many pull requests the metrics pass will fetch reviews for.
const METRICS_REVIEW_SAMPLE: usize = 20;

/// Contents of `state/offline-mode.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineMarker {
    /// Why offline mode was entered.
    pub reason: String,
    /// When it was entered.
    pub since: DateTime<Utc>,
}

/// GitHub gateway. Construct with [`GitHubGateway::connect`].
pub struct GitHubGateway {
    inner: Inner,
}

enum Inner {
    Available(Connected),
    Unavailable { reason: String },
}

struct Connected {
    client: Client,
    token: String,
    owner: String,
    repo: String,
    api_base: String,
    user: String,
    /// Fair async mutex: lock order is FIFO, which gives the dispatch
    /// queue its ordering guarantee.
    queue: tokio::sync::Mutex<()>,
    shared: Mutex<Shared>,
}

struct Shared {
    rate: RateLimitState,
    last_dispatch: Option<Instant>,
}

impl GitHubGateway {
    /// Run the full initialization sequence.
    ///
    /// Never fails: on any initialization error the gateway is returned
    /// in the unavailable state with a remediation reason, and every
    /// operation fails fast with [`GatewayError::NotAvailable`].
    pub async fn connect(
        token: Option<&str>,
        remote_url: Option<&str>,
        offline_marker_path: &Path,
    ) -> Self {
        // Offline mode wins over everything else: fail fast with the
        // persisted reason.
        if let Some(marker) = read_offline_marker(offline_marker_path) {
            return Self::unavailable(format!(
                "オフラインモードが有効です ({})。state/offline-mode.json を削除すると復帰します",
                marker.reason
            ));
        }

        let Some(token) = token else {
            return Self::unavailable(
                "GITHUB_TOKENが設定されていません。.env または環境変数に設定してください"
                    .to_string(),
            );
        };

        let Some(url) = remote_url else {
            return Self::unavailable(
                "リモート origin が設定されていません。git remote add origin <url> を実行してください"
                    .to_string(),
            );
        };

        let Some((owner, repo)) = parse_github_remote(url) else {
            return Self::unavailable(format!(
                "リモートURLからowner/repoを取得できませんでした: {}",
                url
            ));
        };

        let client = match Client::builder().timeout(REQUEST_TIMEOUT).build() {
            Ok(client) => client,
            Err(e) => return Self::unavailable(format!("HTTPクライアントの初期化に失敗: {}", e)),
        };

        Self::connect_with(client, token, owner, repo, DEFAULT_API_BASE.to_string()).await
    }

    /// Initialization against a custom API base. Used for GitHub
    /// Enterprise and for tests against a local mock server.
    pub async fn connect_with(
        client: Client,
        token: &str,
        owner: String,
        repo: String,
        api_base: String,
    ) -> Self {
        let connected = Connected {
            client,
            token: token.to_string(),
            owner,
            repo,
            api_base,
            user: String::new(),
            queue: tokio::sync::Mutex::new(()),
            shared: Mutex::new(Shared {
                rate: RateLimitState::default(),
                last_dispatch: None,
            }),
        };

        // Authenticate and capture identity
        let user: GitHubUser = match connected.get_json("user").await {
            Ok(user) => user,
            Err(GatewayError::Unauthorized) => {
                return Self::unavailable(
                    "GitHubトークンが無効です。https://github.com/settings/tokens で再発行してください"
                        .to_string(),
                )
            }
            Err(e) => return Self::unavailable(format!("GitHub認証に失敗しました: {}", e)),
        };

        let mut connected = connected;
        connected.user = user.login;

        // Probe repository access
        let repo_path = format!("repos/{}/{}", connected.owner, connected.repo);
        if let Err(e) = connected.get_json::<serde_json::Value>(&repo_path).await {
            return Self::unavailable(format!(
                "リポジトリ {}/{} にアクセスできません: {}",
                connected.owner, connected.repo, e
            ));
        }

        // Probe collaborator permission
        let perm_path = format!(
            "repos/{}/{}/collaborators/{}/permission",
            connected.owner, connected.repo, connected.user
        );
        if let Err(e) = connected.get_json::<serde_json::Value>(&perm_path).await {
            return Self::unavailable(format!(
                "コラボレーター権限を確認できません: {}",
                e
            ));
        }

        Self {
            inner: Inner::Available(connected),
        }
    }

    fn unavailable(reason: String) -> Self {
        Self {
            inner: Inner::Unavailable { reason },
        }
    }

    fn connected(&self) -> Result<&Connected, GatewayError> {
        match &self.inner {
            Inner::Available(connected) => Ok(connected),
            Inner::Unavailable { reason } => Err(GatewayError::NotAvailable {
                reason: reason.clone(),
            }),
        }
    }

    /// The unavailable reason, when initialization failed.
    pub fn unavailable_reason(&self) -> Option<&str> {
        match &self.inner {
            Inner::Available(_) => None,
            Inner::Unavailable { reason } => Some(reason),
        }
    }
}

impl Connected {
    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(auth) = HeaderValue::from_str(&format!("Bearer {}", self.token)) {
            headers.insert(AUTHORIZATION, auth);
        }
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        headers
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path)
    }

    fn repo_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.api_base, self.owner, self.repo, path
        )
    }

    /// Wait out the minimum inter-request interval and any exhausted
    /// rate-limit window. Called with the queue lock held.
    async fn throttle(&self) {
        let (interval_wait, rate_wait) = {
            let shared = self.shared.lock().unwrap();
            let interval_wait = shared.last_dispatch.and_then(|last| {
                MIN_REQUEST_INTERVAL.checked_sub(last.elapsed())
            });
            let rate_wait = if shared.rate.is_exhausted() {
                Some(shared.rate.wait_until_reset())
            } else {
                None
            };
            (interval_wait, rate_wait)
        };

        if let Some(wait) = interval_wait {
            tokio::time::sleep(wait).await;
        }
        if let Some(wait) = rate_wait {
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }
        }
    }

    /// Dispatch one request through the queue, retrying in place when
    /// the remote reports rate-limiting.
    async fn dispatch(
        &self,
        method: Method,
        url: &str,
        body: Option<serde_json::Value>,
    ) -> Result<Response, GatewayError> {
        let _queue = self.queue.lock().await;

        loop {
            self.throttle().await;

            let mut request = self
                .client
                .request(method.clone(), url)
                .headers(self.headers());
            if let Some(body) = &body {
                request = request.json(body);
            }

            let result = request.send().await;
            {
                let mut shared = self.shared.lock().unwrap();
                shared.last_dispatch = Some(Instant::now());
                if let Ok(response) = &result {
                    shared.rate.update_from_headers(response.headers());
                }
            }

            let response = result.map_err(map_transport_error)?;

            if is_rate_limited(&response) {
                // Holding the queue lock keeps this request at the head;
                // sleep until the window resets and try again.
                let wait = {
                    let shared = self.shared.lock().unwrap();
                    shared.rate.wait_until_reset()
                };
                tokio::time::sleep(wait.max(Duration::from_secs(1))).await;
                continue;
            }

            return Ok(response);
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
    ) -> Result<T, GatewayError> {
        let url = self.url(path);
        let response = self.dispatch(Method::GET, &url, None).await?;
        decode_response(response).await
    }

    async fn repo_get_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
    ) -> Result<T, GatewayError> {
        let url = self.repo_url(path);
        let response = self.dispatch(Method::GET, &url, None).await?;
        decode_response(response).await
    }

    async fn repo_post_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, GatewayError> {
        let url = self.repo_url(path);
        let response = self.dispatch(Method::POST, &url, Some(body)).await?;
        decode_response(response).await
    }

    async fn fetch_reviews(&self, pr_number: u64) -> Result<Vec<Review>, GatewayError> {
        let reviews: Vec<GitHubReview> = self
            .repo_get_json(&format!("pulls/{}/reviews", pr_number))
            .await?;
        Ok(reviews.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl Gateway for GitHubGateway {
    fn available(&self) -> bool {
        matches!(self.inner, Inner::Available(_))
    }

    fn identity(&self) -> Option<String> {
        match &self.inner {
            Inner::Available(connected) => Some(connected.user.clone()),
            Inner::Unavailable { .. } => None,
        }
    }

    fn rate_limit(&self) -> RateLimitState {
        match &self.inner {
            Inner::Available(connected) => connected.shared.lock().unwrap().rate,
            Inner::Unavailable { .. } => RateLimitState::default(),
        }
    }

    async fn list_open_issues(&self) -> Result<Vec<Issue>, GatewayError> {
        let connected = self.connected()?;
        let issues: Vec<GitHubIssue> = connected
            .repo_get_json("issues?state=open&sort=updated&direction=desc&per_page=50")
            .await?;
        Ok(issues
            .into_iter()
            // The issues endpoint also returns PRs; drop them
            .filter(|issue| issue.pull_request.is_none())
            .map(Into::into)
            .collect())
    }

    async fn create_issue(&self, title: &str, body: &str) -> Result<Issue, GatewayError> {
        let connected = self.connected()?;
        let issue: GitHubIssue = connected
            .repo_post_json(
                "issues",
                serde_json::json!({ "title": title, "body": body }),
            )
            .await?;
        Ok(issue.into())
    }

    async fn get_issue(&self, number: u64) -> Result<Issue, GatewayError> {
        let connected = self.connected()?;
        let issue: GitHubIssue = connected
            .repo_get_json(&format!("issues/{}", number))
            .await?;
        Ok(issue.into())
    }

    async fn comment_issue(&self, number: u64, body: &str) -> Result<(), GatewayError> {
        let connected = self.connected()?;
        let _: serde_json::Value = connected
            .repo_post_json(
                &format!("issues/{}/comments", number),
                serde_json::json!({ "body": body }),
            )
            .await?;
        Ok(())
    }

    async fn list_open_prs(&self) -> Result<Vec<PullRequest>, GatewayError> {
        let connected = self.connected()?;
        let prs: Vec<GitHubPull> = connected
            .repo_get_json("pulls?state=open&sort=updated&direction=desc&per_page=50")
            .await?;
        Ok(prs.into_iter().map(Into::into).collect())
    }

    async fn list_prs_with_reviews(&self) -> Result<Vec<PullRequest>, GatewayError> {
        let connected = self.connected()?;
        let prs: Vec<GitHubPull> = connected
            .repo_get_json("pulls?state=open&sort=updated&direction=desc&per_page=50")
            .await?;

        let mut result = Vec::with_capacity(prs.len());
        for pr in prs {
            let mut pr: PullRequest = pr.into();
            pr.reviews = connected.fetch_reviews(pr.number).await?;
            result.push(pr);
        }
        Ok(result)
    }

    async fn create_pr(&self, request: CreatePrRequest) -> Result<PullRequest, GatewayError> {
        let connected = self.connected()?;
        let pr: GitHubPull = connected
            .repo_post_json(
                "pulls",
                serde_json::json!({
                    "head": request.head,
                    "base": request.base,
                    "title": request.title,
                    "body": request.body,
                    "draft": request.draft,
                }),
            )
            .await?;
        let number = pr.number;

        if !request.reviewers.is_empty() {
            let _: serde_json::Value = connected
                .repo_post_json(
                    &format!("pulls/{}/requested_reviewers", number),
                    serde_json::json!({ "reviewers": request.reviewers }),
                )
                .await?;
        }

        Ok(pr.into())
    }

    async fn list_branches(&self) -> Result<Vec<RemoteBranch>, GatewayError> {
        let connected = self.connected()?;
        let branches: Vec<GitHubBranch> = connected
            .repo_get_json("branches?per_page=100")
            .await?;
        Ok(branches
            .into_iter()
            .map(|b| RemoteBranch {
                name: b.name,
                last_commit_sha: b.commit.sha,
            })
            .collect())
    }

    async fn list_contributors(&self) -> Result<Vec<String>, GatewayError> {
        let connected = self.connected()?;
        let contributors: Vec<GitHubContributor> = connected
            .repo_get_json("contributors?per_page=100")
            .await?;
        Ok(contributors.into_iter().map(|c| c.login).collect())
    }

    async fn commits_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<CommitActivity>, GatewayError> {
        let connected = self.connected()?;
        let commits: Vec<GitHubCommitItem> = connected
            .repo_get_json(&format!(
                "commits?since={}&per_page=100",
                since.to_rfc3339()
            ))
            .await?;
        Ok(commits.into_iter().map(Into::into).collect())
    }

    async fn repo_metrics(&self, window_days: u32) -> Result<RepoMetrics, GatewayError> {
        let connected = self.connected()?;
        let since = Utc::now() - chrono::Duration::days(i64::from(window_days));

        let commits = self.commits_since(since).await?;

        let prs: Vec<GitHubPull> = connected
            .repo_get_json("pulls?state=all&sort=updated&direction=desc&per_page=100")
            .await?;

        let in_window: Vec<&GitHubPull> =
            prs.iter().filter(|pr| pr.created_at >= since).collect();
        let prs_created = in_window.len();
        let prs_merged = prs
            .iter()
            .filter(|pr| pr.merged_at.map(|t| t >= since).unwrap_or(false))
            .count();

        // Review latency over a bounded sample of recent PRs
        let mut review_hours = Vec::new();
        for pr in in_window.iter().take(METRICS_REVIEW_SAMPLE) {
            let reviews = connected.fetch_reviews(pr.number).await?;
            let first_review = reviews
                .iter()
                .filter_map(|r| r.submitted_at)
                .min();
            if let Some(submitted) = first_review {
                let hours = (submitted - pr.created_at).num_minutes() as f64 / 60.0;
                if hours >= 0.0 {
                    review_hours.push(hours);
                }
            }
        }
        let mean_review_hours = if review_hours.is_empty() {
            None
        } else {
            Some(review_hours.iter().sum::<f64>() / review_hours.len() as f64)
        };

        Ok(RepoMetrics {
            window_days,
            commits: commits.len(),
            prs_created,
            prs_merged,
            mean_review_hours,
        })
    }
}

// --------------------------------------------------------------------------
// Response handling
// --------------------------------------------------------------------------

/// True when a response carries rate-limit semantics: 403 or 429 with
/// either an exhausted window header or a rate-limit message.
fn is_rate_limited(response: &Response) -> bool {
    let status = response.status();
    if status != StatusCode::FORBIDDEN && status != StatusCode::TOO_MANY_REQUESTS {
        return false;
    }
    response
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == "0")
        .unwrap_or(status == StatusCode::TOO_MANY_REQUESTS)
}

fn map_transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Network {
            message: err.to_string(),
        }
    }
}

/// Decode a response, mapping error statuses into gateway errors.
async fn decode_response<T: for<'de> Deserialize<'de>>(
    response: Response,
) -> Result<T, GatewayError> {
    let status = response.status();

    if status.is_success() {
        return response.json().await.map_err(|e| GatewayError::Api {
            status: status.as_u16(),
            message: format!("failed to parse response: {}", e),
        });
    }

    let reset_epoch = response
        .headers()
        .get("x-ratelimit-reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    let message = match response.json::<GitHubErrorResponse>().await {
        Ok(err) => err.message,
        Err(_) => "Unknown error".to_string(),
    };

    Err(match status {
        StatusCode::UNAUTHORIZED => GatewayError::Unauthorized,
        StatusCode::FORBIDDEN => {
            if message.to_ascii_lowercase().contains("rate limit") {
                GatewayError::RateLimit { reset_epoch }
            } else {
                GatewayError::Forbidden { message }
            }
        }
        StatusCode::TOO_MANY_REQUESTS => GatewayError::RateLimit { reset_epoch },
        StatusCode::NOT_FOUND => GatewayError::NotFound { resource: message },
        StatusCode::UNPROCESSABLE_ENTITY => {
            // 422 bodies put the useful detail in `errors[].message`
            GatewayError::Validation { message }
        }
        _ => GatewayError::Api {
            status: status.as_u16(),
            message,
        },
    })
}

// --------------------------------------------------------------------------
// URL parsing
// --------------------------------------------------------------------------

/// Parse a GitHub remote URL (SSH or HTTPS) into `(owner, repo)`.
///
/// # Example
///
/// ```
/// use teamflow::gateway::github::parse_github_remote;
///
/// let (owner, repo) = parse_github_remote("git@github.com:octocat/hello.git").unwrap();
/// assert_eq!(owner, "octocat");
/// assert_eq!(repo, "hello");
/// ```
pub fn parse_github_remote(url: &str) -> Option<(String, String)> {
    static PATTERN: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        Regex::new(r"github\.com[:/]([^/\s]+)/([^/\s]+?)(?:\.git)?/?$")
            .expect("remote pattern is valid")
    });
    let captures = re.captures(url)?;
    let owner = captures.get(1)?.as_str().to_string();
    let repo = captures.get(2)?.as_str().to_string();
    if owner.is_empty() || repo.is_empty() {
        return None;
    }
    Some((owner, repo))
}

/// Read the offline marker, if present and parsable.
fn read_offline_marker(path: &Path) -> Option<OfflineMarker> {
    let contents = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&contents).ok()
}

// --------------------------------------------------------------------------
// API Response Types
// --------------------------------------------------------------------------

/// GitHub error response format.
#[derive(Deserialize)]
struct GitHubErrorResponse {
    message: String,
}

#[derive(Deserialize)]
struct GitHubUser {
    login: String,
}

#[derive(Deserialize)]
struct GitHubLabel {
    name: String,
}

#[derive(Deserialize)]
struct GitHubAccount {
    login: String,
}

#[derive(Deserialize)]
struct GitHubIssue {
    number: u64,
    title: String,
    body: Option<String>,
    #[serde(default)]
    labels: Vec<GitHubLabel>,
    #[serde(default)]
    assignees: Vec<GitHubAccount>,
    state: String,
    updated_at: DateTime<Utc>,
    html_url: String,
    /// Present when the "issue" is actually a pull request.
    pull_request: Option<serde_json::Value>,
}

impl From<GitHubIssue> for Issue {
    fn from(gh: GitHubIssue) -> Self {
        Issue {
            number: gh.number,
            title: gh.title,
            body: gh.body.unwrap_or_default(),
            labels: gh.labels.into_iter().map(|l| l.name).collect(),
            assignees: gh.assignees.into_iter().map(|a| a.login).collect(),
            state: if gh.state == "closed" {
                IssueState::Closed
            } else {
                IssueState::Open
            },
            updated_at: gh.updated_at,
            url: gh.html_url,
        }
    }
}

#[derive(Deserialize)]
struct GitHubRef {
    #[serde(rename = "ref")]
    ref_name: String,
}

#[derive(Deserialize)]
struct GitHubPull {
    number: u64,
    title: String,
    body: Option<String>,
    head: GitHubRef,
    base: GitHubRef,
    state: String,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    requested_reviewers: Vec<GitHubAccount>,
    created_at: DateTime<Utc>,
    merged_at: Option<DateTime<Utc>>,
    html_url: String,
}

impl From<GitHubPull> for PullRequest {
    fn from(gh: GitHubPull) -> Self {
        let state = if gh.merged_at.is_some() {
            PrState::Merged
        } else if gh.state == "closed" {
            PrState::Closed
        } else {
            PrState::Open
        };
        PullRequest {
            number: gh.number,
            title: gh.title,
            body: gh.body.unwrap_or_default(),
            head_ref: gh.head.ref_name,
            base_ref: gh.base.ref_name,
            state,
            draft: gh.draft,
            reviewers: gh
                .requested_reviewers
                .into_iter()
                .map(|a| a.login)
                .collect(),
            reviews: Vec::new(),
            created_at: gh.created_at,
            merged_at: gh.merged_at,
            url: gh.html_url,
        }
    }
}

#[derive(Deserialize)]
struct GitHubReview {
    user: GitHubAccount,
    state: String,
    submitted_at: Option<DateTime<Utc>>,
}

impl From<GitHubReview> for Review {
    fn from(gh: GitHubReview) -> Self {
        let state = match gh.state.as_str() {
            "APPROVED" => ReviewState::Approved,
            "CHANGES_REQUESTED" => ReviewState::ChangesRequested,
            "COMMENTED" => ReviewState::Commented,
            _ => ReviewState::Pending,
        };
        Review {
            user: gh.user.login,
            state,
            submitted_at: gh.submitted_at,
        }
    }
}

#[derive(Deserialize)]
struct GitHubBranchCommit {
    sha: String,
}

#[derive(Deserialize)]
struct GitHubBranch {
    name: String,
    commit: GitHubBranchCommit,
}

#[derive(Deserialize)]
struct GitHubContributor {
    login: String,
}

#[derive(Deserialize)]
struct GitHubCommitAuthor {
    name: String,
    date: DateTime<Utc>,
}

#[derive(Deserialize)]
struct GitHubCommitDetail {
    message: String,
    author: GitHubCommitAuthor,
}

#[derive(Deserialize)]
struct GitHubCommitItem {
    sha: String,
    commit: GitHubCommitDetail,
}

impl From<GitHubCommitItem> for CommitActivity {
    fn from(gh: GitHubCommitItem) -> Self {
        CommitActivity {
            sha: gh.sha,
            author: gh.commit.author.name,
            message: gh.commit.message,
            date: gh.commit.author.date,
        }
    }
}
