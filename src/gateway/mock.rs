//! gateway::mock
//!
//! Mock gateway implementation for deterministic testing.
//!
//! # Design
//!
//! Stores issues and pull requests in memory, assigns sequential
//! numbers, records every operation for verification, and can be
//! configured to fail a specific operation with a specific error.
//!
//! # Example
//!
//! ```
//! use teamflow::gateway::mock::MockGateway;
//! use teamflow::gateway::{CreatePrRequest, Gateway};
//!
//! # tokio_test::block_on(async {
//! let gateway = MockGateway::new();
//! let pr = gateway.create_pr(CreatePrRequest {
//!     head: "feature/x".to_string(),
//!     base: "main".to_string(),
//!     title: "Add x".to_string(),
//!     body: None,
//!     draft: false,
//!     reviewers: vec![],
//! }).await.unwrap();
//! assert_eq!(pr.number, 1);
//! # });
//! ```

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::core::types::{Issue, IssueState, PrState, PullRequest, Review};

use super::rate_limit::RateLimitState;
use super::traits::{
    CommitActivity, CreatePrRequest, Gateway, GatewayError, RemoteBranch, RepoMetrics,
};

/// Which operation should fail, and how.
#[derive(Debug, Clone)]
pub enum FailOn {
    ListOpenIssues(GatewayError),
    CreateIssue(GatewayError),
    GetIssue(GatewayError),
    CommentIssue(GatewayError),
    ListOpenPrs(GatewayError),
    CreatePr(GatewayError),
    ListBranches(GatewayError),
    ListContributors(GatewayError),
    CommitsSince(GatewayError),
    RepoMetrics(GatewayError),
}

/// Recorded operation for test verification.
#[derive(Debug, Clone)]
pub enum MockOperation {
    ListOpenIssues,
    CreateIssue { title: String },
    GetIssue { number: u64 },
    CommentIssue { number: u64, body: String },
    ListOpenPrs,
    ListPrsWithReviews,
    CreatePr { head: String, base: String, title: String, body: Option<String> },
    ListBranches,
    ListContributors,
    CommitsSince { since: DateTime<Utc> },
    RepoMetrics { window_days: u32 },
}

#[derive(Debug)]
struct MockGatewayInner {
    available: bool,
    identity: String,
    issues: HashMap<u64, Issue>,
    next_issue_number: u64,
    prs: HashMap<u64, PullRequest>,
    next_pr_number: u64,
    branches: Vec<RemoteBranch>,
    contributors: Vec<String>,
    commits: Vec<CommitActivity>,
    fail_on: Option<FailOn>,
    operations: Vec<MockOperation>,
    rate: RateLimitState,
}

/// Mock gateway for testing.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping.
#[derive(Debug, Clone)]
pub struct MockGateway {
    inner: Arc<Mutex<MockGatewayInner>>,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGateway {
    /// Create a new empty mock gateway authenticated as `tester`.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockGatewayInner {
                available: true,
                identity: "tester".to_string(),
                issues: HashMap::new(),
                next_issue_number: 1,
                prs: HashMap::new(),
                next_pr_number: 1,
                branches: Vec::new(),
                contributors: Vec::new(),
                commits: Vec::new(),
                fail_on: None,
                operations: Vec::new(),
                rate: RateLimitState::default(),
            })),
        }
    }

    /// A gateway that never became available.
    pub fn unavailable() -> Self {
        let gateway = Self::new();
        gateway.inner.lock().unwrap().available = false;
        gateway
    }

    /// Configure the mock to fail on a specific operation.
    pub fn fail_on(&self, fail: FailOn) {
        self.inner.lock().unwrap().fail_on = Some(fail);
    }

    /// Seed an existing issue.
    pub fn add_issue(&self, issue: Issue) {
        let mut inner = self.inner.lock().unwrap();
        inner.next_issue_number = inner.next_issue_number.max(issue.number + 1);
        inner.issues.insert(issue.number, issue);
    }

    /// Seed an existing pull request.
    pub fn add_pr(&self, pr: PullRequest) {
        let mut inner = self.inner.lock().unwrap();
        inner.next_pr_number = inner.next_pr_number.max(pr.number + 1);
        inner.prs.insert(pr.number, pr);
    }

    /// Seed remote branches.
    pub fn set_branches(&self, branches: Vec<RemoteBranch>) {
        self.inner.lock().unwrap().branches = branches;
    }

    /// Seed contributors.
    pub fn set_contributors(&self, contributors: Vec<String>) {
        self.inner.lock().unwrap().contributors = contributors;
    }

    /// Seed commit activity.
    pub fn set_commits(&self, commits: Vec<CommitActivity>) {
        self.inner.lock().unwrap().commits = commits;
    }

    /// All operations recorded so far.
    pub fn operations(&self) -> Vec<MockOperation> {
        self.inner.lock().unwrap().operations.clone()
    }

    /// Comments recorded against an issue.
    pub fn comments_for(&self, number: u64) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .operations
            .iter()
            .filter_map(|op| match op {
                MockOperation::CommentIssue { number: n, body } if *n == number => {
                    Some(body.clone())
                }
                _ => None,
            })
            .collect()
    }

    fn check_available(&self) -> Result<(), GatewayError> {
        if self.inner.lock().unwrap().available {
            Ok(())
        } else {
            Err(GatewayError::NotAvailable {
                reason: "mock gateway configured unavailable".to_string(),
            })
        }
    }
}

#[async_trait]
impl Gateway for MockGateway {
    fn available(&self) -> bool {
        self.inner.lock().unwrap().available
    }

    fn identity(&self) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        if inner.available {
            Some(inner.identity.clone())
        } else {
            None
        }
    }

    fn rate_limit(&self) -> RateLimitState {
        self.inner.lock().unwrap().rate
    }

    async fn list_open_issues(&self) -> Result<Vec<Issue>, GatewayError> {
        self.check_available()?;
        let mut inner = self.inner.lock().unwrap();
        inner.operations.push(MockOperation::ListOpenIssues);
        if let Some(FailOn::ListOpenIssues(err)) = &inner.fail_on {
            return Err(err.clone());
        }
        let mut issues: Vec<Issue> = inner
            .issues
            .values()
            .filter(|issue| issue.state == IssueState::Open)
            .cloned()
            .collect();
        issues.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(issues)
    }

    async fn create_issue(&self, title: &str, body: &str) -> Result<Issue, GatewayError> {
        self.check_available()?;
        let mut inner = self.inner.lock().unwrap();
        inner.operations.push(MockOperation::CreateIssue {
            title: title.to_string(),
        });
        if let Some(FailOn::CreateIssue(err)) = &inner.fail_on {
            return Err(err.clone());
        }
        let number = inner.next_issue_number;
        inner.next_issue_number += 1;
        let issue = Issue {
            number,
            title: title.to_string(),
            body: body.to_string(),
            labels: BTreeSet::new(),
            assignees: BTreeSet::new(),
            state: IssueState::Open,
            updated_at: Utc::now(),
            url: format!("https://github.com/mock/mock/issues/{}", number),
        };
        inner.issues.insert(number, issue.clone());
        Ok(issue)
    }

    async fn get_issue(&self, number: u64) -> Result<Issue, GatewayError> {
        self.check_available()?;
        let mut inner = self.inner.lock().unwrap();
        inner.operations.push(MockOperation::GetIssue { number });
        if let Some(FailOn::GetIssue(err)) = &inner.fail_on {
            return Err(err.clone());
        }
        inner
            .issues
            .get(&number)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound {
                resource: format!("issue #{}", number),
            })
    }

    async fn comment_issue(&self, number: u64, body: &str) -> Result<(), GatewayError> {
        self.check_available()?;
        let mut inner = self.inner.lock().unwrap();
        inner.operations.push(MockOperation::CommentIssue {
            number,
            body: body.to_string(),
        });
        if let Some(FailOn::CommentIssue(err)) = &inner.fail_on {
            return Err(err.clone());
        }
        if inner.issues.contains_key(&number) {
            Ok(())
        } else {
            Err(GatewayError::NotFound {
                resource: format!("issue #{}", number),
            })
        }
    }

    async fn list_open_prs(&self) -> Result<Vec<PullRequest>, GatewayError> {
        self.check_available()?;
        let mut inner = self.inner.lock().unwrap();
        inner.operations.push(MockOperation::ListOpenPrs);
        if let Some(FailOn::ListOpenPrs(err)) = &inner.fail_on {
            return Err(err.clone());
        }
        let mut prs: Vec<PullRequest> = inner
            .prs
            .values()
            .filter(|pr| pr.state == PrState::Open)
            .cloned()
            .collect();
        prs.sort_by_key(|pr| pr.number);
        Ok(prs)
    }

    async fn list_prs_with_reviews(&self) -> Result<Vec<PullRequest>, GatewayError> {
        self.check_available()?;
        {
            let mut inner = self.inner.lock().unwrap();
            inner.operations.push(MockOperation::ListPrsWithReviews);
        }
        // Seeded PRs already carry their reviews
        self.list_open_prs().await
    }

    async fn create_pr(&self, request: CreatePrRequest) -> Result<PullRequest, GatewayError> {
        self.check_available()?;
        let mut inner = self.inner.lock().unwrap();
        inner.operations.push(MockOperation::CreatePr {
            head: request.head.clone(),
            base: request.base.clone(),
            title: request.title.clone(),
            body: request.body.clone(),
        });
        if let Some(FailOn::CreatePr(err)) = &inner.fail_on {
            return Err(err.clone());
        }
        if inner
            .prs
            .values()
            .any(|pr| pr.head_ref == request.head && pr.state == PrState::Open)
        {
            return Err(GatewayError::Validation {
                message: format!("A pull request already exists for {}", request.head),
            });
        }
        let number = inner.next_pr_number;
        inner.next_pr_number += 1;
        let pr = PullRequest {
            number,
            title: request.title,
            body: request.body.unwrap_or_default(),
            head_ref: request.head,
            base_ref: request.base,
            state: PrState::Open,
            draft: request.draft,
            reviewers: request.reviewers.into_iter().collect(),
            reviews: Vec::<Review>::new(),
            created_at: Utc::now(),
            merged_at: None,
            url: format!("https://github.com/mock/mock/pull/{}", number),
        };
        inner.prs.insert(number, pr.clone());
        Ok(pr)
    }

    async fn list_branches(&self) -> Result<Vec<RemoteBranch>, GatewayError> {
        self.check_available()?;
        let mut inner = self.inner.lock().unwrap();
        inner.operations.push(MockOperation::ListBranches);
        if let Some(FailOn::ListBranches(err)) = &inner.fail_on {
            return Err(err.clone());
        }
        Ok(inner.branches.clone())
    }

    async fn list_contributors(&self) -> Result<Vec<String>, GatewayError> {
        self.check_available()?;
        let mut inner = self.inner.lock().unwrap();
        inner.operations.push(MockOperation::ListContributors);
        if let Some(FailOn::ListContributors(err)) = &inner.fail_on {
            return Err(err.clone());
        }
        Ok(inner.contributors.clone())
    }

    async fn commits_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<CommitActivity>, GatewayError> {
        self.check_available()?;
        let mut inner = self.inner.lock().unwrap();
        inner.operations.push(MockOperation::CommitsSince { since });
        if let Some(FailOn::CommitsSince(err)) = &inner.fail_on {
            return Err(err.clone());
        }
        Ok(inner
            .commits
            .iter()
            .filter(|c| c.date >= since)
            .cloned()
            .collect())
    }

    async fn repo_metrics(&self, window_days: u32) -> Result<RepoMetrics, GatewayError> {
        self.check_available()?;
        let since = Utc::now() - chrono::Duration::days(i64::from(window_days));
        let (commits, prs): (usize, Vec<PullRequest>) = {
            let mut inner = self.inner.lock().unwrap();
            inner
                .operations
                .push(MockOperation::RepoMetrics { window_days });
            if let Some(FailOn::RepoMetrics(err)) = &inner.fail_on {
                return Err(err.clone());
            }
            (
                inner.commits.iter().filter(|c| c.date >= since).count(),
                inner.prs.values().cloned().collect(),
            )
        };

        let prs_created = prs.iter().filter(|pr| pr.created_at >= since).count();
        let prs_merged = prs
            .iter()
            .filter(|pr| pr.merged_at.map(|t| t >= since).unwrap_or(false))
            .count();

        let mut review_hours = Vec::new();
        for pr in prs.iter().filter(|pr| pr.created_at >= since) {
            if let Some(first) = pr.reviews.iter().filter_map(|r| r.submitted_at).min() {
                let hours = (first - pr.created_at).num_minutes() as f64 / 60.0;
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
            commits,
            prs_created,
            prs_merged,
            mean_review_hours,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_issue_assigns_sequential_numbers() {
        let gateway = MockGateway::new();
        let first = gateway.create_issue("one", "").await.unwrap();
        let second = gateway.create_issue("two", "").await.unwrap();
        assert_eq!(first.number, 1);
        assert_eq!(second.number, 2);
    }

    #[tokio::test]
    async fn duplicate_open_pr_head_is_validation_error() {
        let gateway = MockGateway::new();
        let request = CreatePrRequest {
            head: "feature/x".to_string(),
            base: "main".to_string(),
            title: "x".to_string(),
            body: None,
            draft: false,
            reviewers: vec![],
        };
        gateway.create_pr(request.clone()).await.unwrap();
        let err = gateway.create_pr(request).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn fail_on_configuration() {
        let gateway = MockGateway::new();
        gateway.fail_on(FailOn::ListOpenIssues(GatewayError::Timeout));
        assert!(matches!(
            gateway.list_open_issues().await,
            Err(GatewayError::Timeout)
        ));
    }

    #[tokio::test]
    async fn unavailable_gateway_fails_fast() {
        let gateway = MockGateway::unavailable();
        assert!(!gateway.available());
        assert!(matches!(
            gateway.list_open_issues().await,
            Err(GatewayError::NotAvailable { .. })
        ));
    }

    #[tokio::test]
    async fn suggest_reviewers_excludes_self_and_list() {
        let gateway = MockGateway::new();
        gateway.set_contributors(vec![
            "tester".to_string(),
            "alice".to_string(),
            "bob".to_string(),
            "carol".to_string(),
        ]);
        let reviewers = gateway.suggest_reviewers(&["carol".to_string()]).await.unwrap();
        assert_eq!(reviewers, vec!["alice".to_string(), "bob".to_string()]);
    }

    #[tokio::test]
    async fn operations_are_recorded() {
        let gateway = MockGateway::new();
        let _ = gateway.create_issue("x", "y").await;
        let _ = gateway.comment_issue(1, "progress").await;
        let ops = gateway.operations();
        assert_eq!(ops.len(), 2);
        assert_eq!(gateway.comments_for(1), vec!["progress".to_string()]);
    }
}
