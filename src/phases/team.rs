//! phases::team
//!
//! The Team phase: aggregate branch activity, open PRs with review
//! state, potential file conflicts between active branches, and a
//! 7-day metrics window into one report.
//!
//! The conflict scan is O(n^2) over active branches; above
//! [`SCAN_SAMPLE_LIMIT`] branches it samples the most recent ones and
//! says so in the report.

use std::collections::BTreeMap;

use crate::core::types::{PhaseResult, PullRequest, ReviewSummary};
use crate::gateway::RepoMetrics;
use crate::git::CommitInfo;
use crate::ui::output;

use super::context::PhaseContext;

/// Metrics window in days.
pub const METRICS_WINDOW_DAYS: u32 = 7;

/// Above this many active branches the conflict scan samples.
pub const SCAN_SAMPLE_LIMIT: usize = 50;

/// One active branch in the report.
#[derive(Debug, Clone)]
pub struct ActiveBranch {
    pub name: String,
    pub last_commit: Option<CommitInfo>,
}

/// One potential conflict: a file touched by two or more branches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictEntry {
    pub path: String,
    pub branches: Vec<String>,
}

/// The aggregated team report.
#[derive(Debug, Clone, Default)]
pub struct TeamReport {
    pub branches: Vec<ActiveBranch>,
    pub prs: Vec<PullRequest>,
    pub conflicts: Vec<ConflictEntry>,
    pub metrics: Option<RepoMetrics>,
    /// True when the conflict scan sampled instead of covering all pairs.
    pub sampled: bool,
}

impl TeamReport {
    /// Render the report for the terminal.
    pub fn render(&self) -> String {
        let mut out = String::new();

        out.push_str(&format!(
            "アクティブなブランチ ({})\n",
            self.branches.len()
        ));
        for branch in &self.branches {
            match &branch.last_commit {
                Some(commit) => out.push_str(&format!(
                    "  {} - {} ({})\n",
                    branch.name, commit.summary, commit.author_name
                )),
                None => out.push_str(&format!("  {}\n", branch.name)),
            }
        }

        out.push_str(&format!("\nオープンなPR ({})\n", self.prs.len()));
        for pr in &self.prs {
            out.push_str(&format!(
                "  #{} {} [{}]\n",
                pr.number,
                pr.title,
                pr.review_summary()
            ));
        }

        out.push_str(&format!(
            "\n競合の可能性があるファイル ({})\n",
            self.conflicts.len()
        ));
        if self.sampled {
            out.push_str("  (ブランチ数が多いため一部をサンプリングしています)\n");
        }
        for conflict in &self.conflicts {
            out.push_str(&format!(
                "  {} <- {}\n",
                conflict.path,
                conflict.branches.join(", ")
            ));
        }

        if let Some(metrics) = &self.metrics {
            out.push_str(&format!(
                "\n直近{}日間の活動\n  コミット: {}\n  PR作成: {} / マージ: {}\n",
                metrics.window_days, metrics.commits, metrics.prs_created, metrics.prs_merged
            ));
            match metrics.mean_review_hours {
                Some(hours) => {
                    out.push_str(&format!("  平均レビュー時間: {:.1}時間\n", hours))
                }
                None => out.push_str("  平均レビュー時間: データなし\n"),
            }
        }

        out
    }

    /// Count PRs whose review state matches.
    pub fn prs_in_state(&self, state: ReviewSummary) -> usize {
        self.prs
            .iter()
            .filter(|pr| pr.review_summary() == state)
            .count()
    }
}

/// Run the Team phase.
pub async fn run(ctx: &PhaseContext) -> PhaseResult {
    if !ctx.git.is_repository() {
        return PhaseResult::failed("Gitリポジトリではありません");
    }

    let report = build_report(ctx).await;
    let rendered = report.render();
    output::heading("チーム状況", ctx.verbosity);
    output::print(&rendered, ctx.verbosity);

    PhaseResult::completed().with_message(rendered)
}

/// Gather every section of the report. Reads are independent; the
/// gateway serializes the remote ones, so this runs them in sequence.
pub async fn build_report(ctx: &PhaseContext) -> TeamReport {
    let mut report = TeamReport::default();

    // (a) active local branches with their last commit
    let branch_names: Vec<String> = ctx
        .git
        .local_branches()
        .unwrap_or_default()
        .into_iter()
        .filter(|name| name != &ctx.config.default_branch && name != "main" && name != "master")
        .collect();
    for name in &branch_names {
        report.branches.push(ActiveBranch {
            name: name.clone(),
            last_commit: ctx.git.branch_last_commit(name).ok(),
        });
    }

    // (b) open PRs with review state
    if ctx.gateway.available() {
        match ctx.gateway.list_prs_with_reviews().await {
            Ok(prs) => report.prs = prs,
            Err(e) => ctx.logger.warn(&format!("pr list failed: {}", e)),
        }
    }

    // (c) pairwise conflict scan over changed files
    let (conflicts, sampled) = scan_conflicts(ctx, &branch_names);
    report.conflicts = conflicts;
    report.sampled = sampled;

    // (d) metrics window
    if ctx.gateway.available() {
        match ctx.gateway.repo_metrics(METRICS_WINDOW_DAYS).await {
            Ok(metrics) => report.metrics = Some(metrics),
            Err(e) => ctx.logger.warn(&format!("metrics failed: {}", e)),
        }
    }

    report
}

/// Intersect changed-file sets across branch pairs. Each branch's
/// changed set is its name-only diff against the default branch.
fn scan_conflicts(ctx: &PhaseContext, branches: &[String]) -> (Vec<ConflictEntry>, bool) {
    let sampled = branches.len() > SCAN_SAMPLE_LIMIT;
    let scan_set: Vec<&String> = branches.iter().take(SCAN_SAMPLE_LIMIT).collect();

    let mut touched: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for branch in &scan_set {
        let files = ctx
            .git
            .diff_branches(&ctx.config.default_branch, branch)
            .unwrap_or_default();
        for file in files {
            touched.entry(file).or_default().push((*branch).clone());
        }
    }

    let conflicts = touched
        .into_iter()
        .filter(|(_, branches)| branches.len() >= 2)
        .map(|(path, branches)| ConflictEntry { path, branches })
        .collect();

    (conflicts, sampled)
}
