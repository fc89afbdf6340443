//! Replacing one reviewer on an open pull request.
//!
//! The replacement comes from the old reviewer's team and must be active,
//! must not be the old reviewer, the author, or anyone already assigned.
//! The write is conditioned on the reviewer list observed at the start, so
//! two concurrent reassignments cannot silently overwrite each other.

use tracing::{debug, info, warn};

use super::{require_non_empty, ReviewService};
use crate::error::ServiceError;
use crate::model::{PullRequest, PullRequestId, UserId};

impl ReviewService {
    /// Replace `old_reviewer` on `pr_id` with a random eligible teammate.
    ///
    /// Returns the refreshed pull request and the id of the new reviewer.
    pub async fn reassign_reviewer(
        &self,
        pr_id: &PullRequestId,
        old_reviewer: &UserId,
    ) -> Result<(PullRequest, UserId), ServiceError> {
        require_non_empty("pull_request_id", pr_id.as_str())?;
        require_non_empty("old_user_id", old_reviewer.as_str())?;

        let pr = self.fetch_pr(pr_id).await?;
        if pr.is_merged() {
            return Err(ServiceError::PrMerged(pr_id.clone()));
        }
        if !pr.has_reviewer(old_reviewer) {
            return Err(ServiceError::NotAssigned {
                pr: pr_id.clone(),
                reviewer: old_reviewer.clone(),
            });
        }

        let team = self
            .directory
            .get_user_team(old_reviewer)
            .await?
            .ok_or_else(|| ServiceError::not_found("user", old_reviewer))?;

        let active = self.directory.get_active_members(&team, old_reviewer).await?;
        let pool = candidate_pool(active, &pr, old_reviewer);
        debug!(
            "Reassigning {} on {}: {} candidates in team {}",
            old_reviewer,
            pr_id,
            pool.len(),
            team
        );
        if pool.is_empty() {
            return Err(ServiceError::NoCandidate {
                pr: pr_id.clone(),
                reviewer: old_reviewer.clone(),
            });
        }

        let new_reviewer = pool[self.random.pick_index(pool.len())].clone();
        let reviewers = replace_reviewer(&pr.assigned_reviewers, old_reviewer, &new_reviewer);

        let applied = self
            .store
            .cas_update_reviewers(pr_id, &pr.assigned_reviewers, &reviewers)
            .await?;
        if !applied {
            let current = self.fetch_pr(pr_id).await?;
            if current.is_merged() {
                return Err(ServiceError::PrMerged(pr_id.clone()));
            }
            warn!(
                "Reviewer list of {} changed during reassignment of {}",
                pr_id, old_reviewer
            );
            return Err(ServiceError::ConcurrentModification(pr_id.clone()));
        }

        info!(
            "Reassigned reviewer on {} from {} to {} (team {})",
            pr_id, old_reviewer, new_reviewer, team
        );
        let refreshed = self.fetch_pr(pr_id).await?;
        Ok((refreshed, new_reviewer))
    }
}

/// Active teammates eligible to take over from `old_reviewer`.
///
/// `active` already excludes `old_reviewer`; it is filtered again so the pool
/// is correct whatever the directory returns.
fn candidate_pool(active: Vec<UserId>, pr: &PullRequest, old_reviewer: &UserId) -> Vec<UserId> {
    active
        .into_iter()
        .filter(|c| c != old_reviewer && c != &pr.author_id && !pr.has_reviewer(c))
        .collect()
}

/// Swap `old` for `new` in place, keeping order and length.
fn replace_reviewer(reviewers: &[UserId], old: &UserId, new: &UserId) -> Vec<UserId> {
    reviewers
        .iter()
        .map(|r| if r == old { new.clone() } else { r.clone() })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use proptest::prelude::*;

    use super::super::test_support::*;
    use super::*;
    use crate::error::RepositoryError;
    use crate::model::{PrStatus, PullRequestShort};
    use crate::random::StdRandom;
    use crate::repository::{InMemoryRepository, PullRequestStore, StoredStats};

    /// What another writer does between the service's read and its
    /// conditional write.
    #[derive(Clone, Copy)]
    enum Interleaved {
        ReplaceReviewers,
        Merge,
    }

    /// Store that applies one competing write right before every
    /// `cas_update_reviewers`.
    struct RacingStore {
        inner: Arc<InMemoryRepository>,
        competing: Interleaved,
    }

    #[async_trait]
    impl PullRequestStore for RacingStore {
        async fn pr_exists(&self, id: &PullRequestId) -> Result<bool, RepositoryError> {
            self.inner.pr_exists(id).await
        }

        async fn create_pr(&self, pr: &PullRequest) -> Result<bool, RepositoryError> {
            self.inner.create_pr(pr).await
        }

        async fn get_pr(&self, id: &PullRequestId) -> Result<Option<PullRequest>, RepositoryError> {
            self.inner.get_pr(id).await
        }

        async fn cas_update_status(
            &self,
            id: &PullRequestId,
            expected: PrStatus,
            new_status: PrStatus,
            merged_at: Option<DateTime<Utc>>,
        ) -> Result<bool, RepositoryError> {
            self.inner
                .cas_update_status(id, expected, new_status, merged_at)
                .await
        }

        async fn cas_update_reviewers(
            &self,
            id: &PullRequestId,
            expected: &[UserId],
            new_reviewers: &[UserId],
        ) -> Result<bool, RepositoryError> {
            match self.competing {
                Interleaved::ReplaceReviewers => {
                    let mut theirs = expected.to_vec();
                    theirs[0] = UserId::from("u9");
                    assert!(self.inner.cas_update_reviewers(id, expected, &theirs).await?);
                }
                Interleaved::Merge => {
                    assert!(self
                        .inner
                        .cas_update_status(id, PrStatus::Open, PrStatus::Merged, Some(Utc::now()))
                        .await?);
                }
            }
            self.inner.cas_update_reviewers(id, expected, new_reviewers).await
        }

        async fn list_prs_by_reviewer(
            &self,
            user_id: &UserId,
        ) -> Result<Vec<PullRequestShort>, RepositoryError> {
            self.inner.list_prs_by_reviewer(user_id).await
        }

        async fn aggregate_stats(&self) -> Result<StoredStats, RepositoryError> {
            self.inner.aggregate_stats().await
        }
    }

    fn racing_service(competing: Interleaved) -> (ReviewService, Arc<InMemoryRepository>) {
        let repo = Arc::new(InMemoryRepository::new());
        let store = Arc::new(RacingStore {
            inner: repo.clone(),
            competing,
        });
        let service = ReviewService::new(repo.clone(), store, Arc::new(StdRandom::seeded(3)));
        (service, repo)
    }

    async fn team_and_pr(service: &ReviewService) -> PullRequest {
        create_team(
            service,
            "core",
            &[("u1", true), ("u2", true), ("u3", true), ("u4", true), ("u5", true)],
        )
        .await;
        service
            .create_pr("pr1".into(), "Fix bug".to_string(), "u1".into())
            .await
            .unwrap()
    }

    fn open_pr(author: &str, reviewers: &[&str]) -> PullRequest {
        PullRequest {
            pull_request_id: "pr1".into(),
            pull_request_name: "Fix bug".to_string(),
            author_id: author.into(),
            status: PrStatus::Open,
            assigned_reviewers: ids(reviewers),
            created_at: Utc::now(),
            merged_at: None,
        }
    }

    #[test]
    fn test_candidate_pool_three_way_exclusion() {
        let pr = open_pr("u1", &["u2", "u3"]);
        let active = ids(&["u1", "u2", "u3", "u4", "u5"]);
        let pool = candidate_pool(active, &pr, &"u2".into());
        assert_eq!(pool, ids(&["u4", "u5"]));
    }

    #[test]
    fn test_replace_reviewer_keeps_position() {
        let replaced = replace_reviewer(&ids(&["u2", "u3"]), &"u2".into(), &"u4".into());
        assert_eq!(replaced, ids(&["u4", "u3"]));

        let untouched = replace_reviewer(&ids(&["u2", "u3"]), &"u9".into(), &"u4".into());
        assert_eq!(untouched, ids(&["u2", "u3"]));
    }

    /// Team core = u1 (author), u2, u3, u4. After creation two of u2..u4 are
    /// assigned, so the only candidate is the third. A second reassignment
    /// then has nobody left.
    #[tokio::test]
    async fn test_reassign_scenario_until_no_candidate() {
        let service = service_with_seed(2024);
        create_team(
            &service,
            "core",
            &[("u1", true), ("u2", true), ("u3", true), ("u4", true)],
        )
        .await;

        let pr = service
            .create_pr("pr1".into(), "Fix bug".to_string(), "u1".into())
            .await
            .unwrap();
        assert_eq!(pr.assigned_reviewers.len(), 2);

        let remaining: Vec<UserId> = ids(&["u2", "u3", "u4"])
            .into_iter()
            .filter(|u| !pr.has_reviewer(u))
            .collect();
        assert_eq!(remaining.len(), 1);

        let old = pr.assigned_reviewers[0].clone();
        let (updated, new_reviewer) = service
            .reassign_reviewer(&"pr1".into(), &old)
            .await
            .unwrap();
        assert_eq!(new_reviewer, remaining[0]);
        assert_eq!(updated.assigned_reviewers[0], new_reviewer);
        assert_eq!(updated.assigned_reviewers[1], pr.assigned_reviewers[1]);

        let next_old = updated.assigned_reviewers[0].clone();
        let err = service
            .reassign_reviewer(&"pr1".into(), &next_old)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NoCandidate { .. }));
        assert_eq!(err.code(), "NO_CANDIDATE");
    }

    #[tokio::test]
    async fn test_no_candidate_leaves_reviewers_unchanged() {
        let (service, repo) = service_and_repo(1);
        create_team(&service, "core", &[("u1", true), ("u2", true), ("u3", false)]).await;
        service
            .create_pr("pr1".into(), "Fix bug".to_string(), "u1".into())
            .await
            .unwrap();

        let err = service
            .reassign_reviewer(&"pr1".into(), &"u2".into())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NoCandidate { .. }));

        let stored = repo.get_pr(&"pr1".into()).await.unwrap().unwrap();
        assert_eq!(stored.assigned_reviewers, ids(&["u2"]));
    }

    #[tokio::test]
    async fn test_reassign_on_merged_pr_fails() {
        let service = service_with_seed(1);
        create_team(&service, "core", &[("u1", true), ("u2", true), ("u3", true)]).await;
        let pr = service
            .create_pr("pr1".into(), "Fix bug".to_string(), "u1".into())
            .await
            .unwrap();
        service.merge_pr(&"pr1".into()).await.unwrap();

        let err = service
            .reassign_reviewer(&"pr1".into(), &pr.assigned_reviewers[0])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::PrMerged(_)));
    }

    #[tokio::test]
    async fn test_reassign_unassigned_user_fails() {
        let service = service_with_seed(1);
        create_team(&service, "core", &[("u1", true), ("u2", true)]).await;
        service
            .create_pr("pr1".into(), "Fix bug".to_string(), "u1".into())
            .await
            .unwrap();

        let err = service
            .reassign_reviewer(&"pr1".into(), &"u1".into())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotAssigned { .. }));
    }

    #[tokio::test]
    async fn test_reassign_unknown_pr_fails() {
        let service = service_with_seed(1);
        let err = service
            .reassign_reviewer(&"nope".into(), &"u2".into())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_reassign_draws_from_old_reviewers_team() {
        let (service, repo) = service_and_repo(8);
        create_team(&service, "core", &[("u1", true)]).await;
        create_team(&service, "infra", &[("i1", true), ("i2", true)]).await;

        // Cross-team reviewer only reachable through a direct store insert.
        repo.create_pr(&open_pr("u1", &["i1"])).await.unwrap();

        let (updated, new_reviewer) = service
            .reassign_reviewer(&"pr1".into(), &"i1".into())
            .await
            .unwrap();
        assert_eq!(new_reviewer, UserId::from("i2"));
        assert_eq!(updated.assigned_reviewers, ids(&["i2"]));
    }

    #[tokio::test]
    async fn test_inactive_teammates_are_not_candidates() {
        let service = service_with_seed(4);
        create_team(
            &service,
            "core",
            &[("u1", true), ("u2", true), ("u3", true), ("u4", true)],
        )
        .await;
        let pr = service
            .create_pr("pr1".into(), "Fix bug".to_string(), "u1".into())
            .await
            .unwrap();

        // Deactivate the only free teammate.
        for id in ["u2", "u3", "u4"] {
            let id = UserId::from(id);
            if !pr.has_reviewer(&id) {
                service.set_user_active(&id, false).await.unwrap();
            }
        }

        let err = service
            .reassign_reviewer(&"pr1".into(), &pr.assigned_reviewers[0])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NoCandidate { .. }));
    }

    #[tokio::test]
    async fn test_reviewer_list_changed_underneath_is_concurrent_update() {
        let (service, repo) = racing_service(Interleaved::ReplaceReviewers);
        let pr = team_and_pr(&service).await;
        let old = pr.assigned_reviewers[0].clone();

        let err = service
            .reassign_reviewer(&"pr1".into(), &old)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::ConcurrentModification(_)));
        assert_eq!(err.code(), "CONCURRENT_UPDATE");

        // Only the competing write landed.
        let stored = repo.get_pr(&"pr1".into()).await.unwrap().unwrap();
        assert_eq!(stored.assigned_reviewers[0], UserId::from("u9"));
        assert_eq!(stored.assigned_reviewers[1], pr.assigned_reviewers[1]);
    }

    #[tokio::test]
    async fn test_merge_during_reassignment_is_pr_merged() {
        let (service, repo) = racing_service(Interleaved::Merge);
        let pr = team_and_pr(&service).await;

        let err = service
            .reassign_reviewer(&"pr1".into(), &pr.assigned_reviewers[0])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::PrMerged(_)));

        let stored = repo.get_pr(&"pr1".into()).await.unwrap().unwrap();
        assert_eq!(stored.status, PrStatus::Merged);
        assert_eq!(stored.assigned_reviewers, pr.assigned_reviewers);
    }

    proptest! {
        /// Property: reassignment keeps the list size, never assigns the author,
        /// never duplicates, and always removes the old reviewer.
        #[test]
        fn reassign_preserves_invariants(team_size in 4usize..10, seed in any::<u64>()) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let service = service_with_seed(seed);
                let names: Vec<String> = (0..team_size).map(|i| format!("u{i}")).collect();
                let members: Vec<(&str, bool)> =
                    names.iter().map(|n| (n.as_str(), true)).collect();
                create_team(&service, "core", &members).await;

                let pr = service
                    .create_pr("pr1".into(), "Change".to_string(), "u0".into())
                    .await
                    .unwrap();
                let old = pr.assigned_reviewers[0].clone();

                let (updated, new_reviewer) = service
                    .reassign_reviewer(&"pr1".into(), &old)
                    .await
                    .unwrap();

                assert_eq!(updated.assigned_reviewers.len(), pr.assigned_reviewers.len());
                assert!(!updated.has_reviewer(&old));
                assert!(updated.has_reviewer(&new_reviewer));
                assert!(!updated.has_reviewer(&updated.author_id));
                let unique: HashSet<_> = updated.assigned_reviewers.iter().collect();
                assert_eq!(unique.len(), updated.assigned_reviewers.len());
            });
        }
    }
}
