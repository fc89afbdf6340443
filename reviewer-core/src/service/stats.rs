//! System-wide counters and the top-reviewers ranking.

use tracing::debug;

use super::ReviewService;
use crate::error::ServiceError;
use crate::model::{ReviewerLoad, Stats, UserId};

/// Number of entries in the top-reviewers ranking.
pub const TOP_REVIEWERS_LIMIT: usize = 10;

impl ReviewService {
    /// Read-only snapshot of teams, users, pull requests and review load.
    ///
    /// Review load counts every assignment ever recorded, merged pull
    /// requests included.
    pub async fn compute_stats(&self) -> Result<Stats, ServiceError> {
        let stored = self.store.aggregate_stats().await?;

        let stats = Stats {
            total_teams: stored.total_teams,
            total_users: stored.total_users,
            total_prs: stored.open_prs + stored.merged_prs,
            open_prs: stored.open_prs,
            merged_prs: stored.merged_prs,
            top_reviewers: rank_top_reviewers(stored.reviewer_assignments, TOP_REVIEWERS_LIMIT),
        };
        debug!(
            "Computed stats: {} pull requests, {} ranked reviewers",
            stats.total_prs,
            stats.top_reviewers.len()
        );
        Ok(stats)
    }
}

/// Highest assignment counts first, at most `limit` entries.
///
/// The sort is stable, so ties keep the order the backend returned them in.
/// That order is not guaranteed and callers must not depend on it.
pub fn rank_top_reviewers(mut assignments: Vec<(UserId, u64)>, limit: usize) -> Vec<ReviewerLoad> {
    assignments.retain(|(_, count)| *count > 0);
    assignments.sort_by(|a, b| b.1.cmp(&a.1));
    assignments.truncate(limit);
    assignments
        .into_iter()
        .map(|(user_id, assignment_count)| ReviewerLoad {
            user_id,
            assignment_count,
        })
        .collect()
}
