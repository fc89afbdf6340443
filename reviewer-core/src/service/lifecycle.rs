//! Pull request creation and merge.
//!
//! `Open` is the only initial state and `Merged` is terminal. Merge is a
//! compare-and-set on the status, so concurrent merges stamp `merged_at` once.

use chrono::Utc;
use tracing::{info, warn};

use super::selector::select_reviewers;
use super::{require_non_empty, ReviewService};
use crate::error::ServiceError;
use crate::model::{PrStatus, PullRequest, PullRequestId, UserId};

impl ReviewService {
    /// Create an open pull request and assign up to two reviewers from the
    /// author's active teammates.
    ///
    /// A team with no eligible teammates still gets its pull request, just
    /// without reviewers.
    pub async fn create_pr(
        &self,
        pr_id: PullRequestId,
        pr_name: String,
        author_id: UserId,
    ) -> Result<PullRequest, ServiceError> {
        require_non_empty("pull_request_id", pr_id.as_str())?;
        require_non_empty("author_id", author_id.as_str())?;

        if self.store.pr_exists(&pr_id).await? {
            return Err(ServiceError::DuplicateId(pr_id));
        }

        let team = self
            .directory
            .get_user_team(&author_id)
            .await?
            .ok_or_else(|| ServiceError::AuthorNotFound(author_id.clone()))?;

        let candidates = self.directory.get_active_members(&team, &author_id).await?;
        let reviewers = select_reviewers(candidates, self.random.as_ref());

        let pr = PullRequest {
            pull_request_id: pr_id,
            pull_request_name: pr_name,
            author_id,
            status: PrStatus::Open,
            assigned_reviewers: reviewers,
            created_at: Utc::now(),
            merged_at: None,
        };

        if !self.store.create_pr(&pr).await? {
            warn!(
                "Pull request {} was created concurrently, rejecting duplicate",
                pr.pull_request_id
            );
            return Err(ServiceError::DuplicateId(pr.pull_request_id));
        }

        info!(
            "Created pull request {} by {} in team {} with reviewers {:?}",
            pr.pull_request_id, pr.author_id, team, pr.assigned_reviewers
        );
        Ok(pr)
    }

    /// Merge a pull request. Merging an already merged pull request returns
    /// it unchanged.
    pub async fn merge_pr(&self, pr_id: &PullRequestId) -> Result<PullRequest, ServiceError> {
        require_non_empty("pull_request_id", pr_id.as_str())?;

        let pr = self.fetch_pr(pr_id).await?;
        if pr.is_merged() {
            return Ok(pr);
        }

        // Clock skew between processes must not put the merge before creation.
        let merged_at = Utc::now().max(pr.created_at);
        let applied = self
            .store
            .cas_update_status(pr_id, PrStatus::Open, PrStatus::Merged, Some(merged_at))
            .await?;

        let current = self.fetch_pr(pr_id).await?;
        if applied {
            info!("Merged pull request {}", pr_id);
            return Ok(current);
        }

        // Another writer changed the status first.
        if current.is_merged() {
            info!("Pull request {} was merged concurrently", pr_id);
            Ok(current)
        } else {
            warn!("Conditional merge of {} failed with status {}", pr_id, current.status);
            Err(ServiceError::ConcurrentModification(pr_id.clone()))
        }
    }

    pub(super) async fn fetch_pr(&self, pr_id: &PullRequestId) -> Result<PullRequest, ServiceError> {
        self.store
            .get_pr(pr_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("pull request", pr_id))
    }
}
