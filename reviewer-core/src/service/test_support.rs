//! Fixtures shared by the service tests.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::ReviewService;
use crate::error::RepositoryError;
use crate::model::{
    PrStatus, PullRequest, PullRequestId, PullRequestShort, Team, TeamMember, TeamName, User,
    UserId,
};
use crate::random::StdRandom;
use crate::repository::{Directory, InMemoryRepository, PullRequestStore, StoredStats};

pub fn service_with_seed(seed: u64) -> ReviewService {
    let repo = Arc::new(InMemoryRepository::new());
    ReviewService::with_repository(repo, Arc::new(StdRandom::seeded(seed)))
}

/// A service plus direct access to its backing repository.
pub fn service_and_repo(seed: u64) -> (ReviewService, Arc<InMemoryRepository>) {
    let repo = Arc::new(InMemoryRepository::new());
    let service = ReviewService::with_repository(repo.clone(), Arc::new(StdRandom::seeded(seed)));
    (service, repo)
}

pub async fn create_team(service: &ReviewService, name: &str, members: &[(&str, bool)]) {
    service
        .create_team(Team {
            team_name: TeamName::from(name),
            members: members
                .iter()
                .map(|(id, is_active)| TeamMember {
                    user_id: UserId::from(*id),
                    username: format!("User {id}"),
                    is_active: *is_active,
                })
                .collect(),
        })
        .await
        .expect("team creation should succeed");
}

pub fn ids(raw: &[&str]) -> Vec<UserId> {
    raw.iter().map(|id| UserId::from(*id)).collect()
}

pub fn failing_service() -> ReviewService {
    ReviewService::with_repository(Arc::new(FailingRepository), Arc::new(StdRandom::seeded(0)))
}

/// Backend whose every call fails, for exercising the storage error path.
pub struct FailingRepository;

fn down(operation: &str) -> RepositoryError {
    RepositoryError::storage(operation, "backend unreachable")
}

#[async_trait]
impl Directory for FailingRepository {
    async fn create_team(&self, _team: &Team) -> Result<bool, RepositoryError> {
        Err(down("create_team"))
    }

    async fn team_exists(&self, _team_name: &TeamName) -> Result<bool, RepositoryError> {
        Err(down("team_exists"))
    }

    async fn get_team_members(
        &self,
        _team_name: &TeamName,
    ) -> Result<Vec<TeamMember>, RepositoryError> {
        Err(down("get_team_members"))
    }

    async fn get_active_members(
        &self,
        _team_name: &TeamName,
        _exclude: &UserId,
    ) -> Result<Vec<UserId>, RepositoryError> {
        Err(down("get_active_members"))
    }

    async fn get_user_team(&self, _user_id: &UserId) -> Result<Option<TeamName>, RepositoryError> {
        Err(down("get_user_team"))
    }

    async fn set_user_active(
        &self,
        _user_id: &UserId,
        _is_active: bool,
    ) -> Result<Option<User>, RepositoryError> {
        Err(down("set_user_active"))
    }
}

#[async_trait]
impl PullRequestStore for FailingRepository {
    async fn pr_exists(&self, _id: &PullRequestId) -> Result<bool, RepositoryError> {
        Err(down("pr_exists"))
    }

    async fn create_pr(&self, _pr: &PullRequest) -> Result<bool, RepositoryError> {
        Err(down("create_pr"))
    }

    async fn get_pr(&self, _id: &PullRequestId) -> Result<Option<PullRequest>, RepositoryError> {
        Err(down("get_pr"))
    }

    async fn cas_update_status(
        &self,
        _id: &PullRequestId,
        _expected: PrStatus,
        _new_status: PrStatus,
        _merged_at: Option<DateTime<Utc>>,
    ) -> Result<bool, RepositoryError> {
        Err(down("cas_update_status"))
    }

    async fn cas_update_reviewers(
        &self,
        _id: &PullRequestId,
        _expected: &[UserId],
        _new_reviewers: &[UserId],
    ) -> Result<bool, RepositoryError> {
        Err(down("cas_update_reviewers"))
    }

    async fn list_prs_by_reviewer(
        &self,
        _user_id: &UserId,
    ) -> Result<Vec<PullRequestShort>, RepositoryError> {
        Err(down("list_prs_by_reviewer"))
    }

    async fn aggregate_stats(&self) -> Result<StoredStats, RepositoryError> {
        Err(down("aggregate_stats"))
    }
}
