//! Storage collaborator abstractions.
//!
//! `Directory` owns teams and users; `PullRequestStore` owns pull request
//! records. `ReviewService` only talks to storage through these traits, so
//! backends (in-memory, SQLite) can be swapped without touching the
//! assignment logic.
//!
//! # Conditional updates
//!
//! Pull request mutations are compare-and-set: the caller passes the value it
//! last observed and the write only commits if the record still holds that
//! value. A `false` return means nothing was written and the caller should
//! re-read.

mod memory;

pub use memory::InMemoryRepository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::RepositoryError;
use crate::model::{
    PrStatus, PullRequest, PullRequestId, PullRequestShort, Team, TeamMember, TeamName, User,
    UserId,
};

/// Raw aggregates read from storage in a single pass.
///
/// `reviewer_assignments` is one entry per distinct reviewer, in whatever
/// order the backend produces. Ranking happens in the service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredStats {
    pub total_teams: u64,
    pub total_users: u64,
    pub open_prs: u64,
    pub merged_prs: u64,
    pub reviewer_assignments: Vec<(UserId, u64)>,
}

/// Team and user directory.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Create a team and upsert its members into it.
    ///
    /// Returns `false` without writing anything if the team already exists.
    async fn create_team(&self, team: &Team) -> Result<bool, RepositoryError>;

    async fn team_exists(&self, team_name: &TeamName) -> Result<bool, RepositoryError>;

    /// All members of a team, active or not. Empty for unknown teams.
    async fn get_team_members(
        &self,
        team_name: &TeamName,
    ) -> Result<Vec<TeamMember>, RepositoryError>;

    /// Active members of a team, excluding `exclude`.
    async fn get_active_members(
        &self,
        team_name: &TeamName,
        exclude: &UserId,
    ) -> Result<Vec<UserId>, RepositoryError>;

    /// The team a user belongs to, or `None` for unknown users.
    async fn get_user_team(&self, user_id: &UserId) -> Result<Option<TeamName>, RepositoryError>;

    /// Set the active flag, returning the updated user or `None` if unknown.
    async fn set_user_active(
        &self,
        user_id: &UserId,
        is_active: bool,
    ) -> Result<Option<User>, RepositoryError>;
}

/// Pull request record store.
#[async_trait]
pub trait PullRequestStore: Send + Sync {
    async fn pr_exists(&self, id: &PullRequestId) -> Result<bool, RepositoryError>;

    /// Insert a new record. Returns `false` if the id is already taken.
    async fn create_pr(&self, pr: &PullRequest) -> Result<bool, RepositoryError>;

    async fn get_pr(&self, id: &PullRequestId) -> Result<Option<PullRequest>, RepositoryError>;

    /// Set `status` and `merged_at` if the current status equals `expected`.
    async fn cas_update_status(
        &self,
        id: &PullRequestId,
        expected: PrStatus,
        new_status: PrStatus,
        merged_at: Option<DateTime<Utc>>,
    ) -> Result<bool, RepositoryError>;

    /// Replace the reviewer list if it still equals `expected` and the pull
    /// request is still open.
    async fn cas_update_reviewers(
        &self,
        id: &PullRequestId,
        expected: &[UserId],
        new_reviewers: &[UserId],
    ) -> Result<bool, RepositoryError>;

    /// Every pull request, of any status, that lists `user_id` as reviewer.
    async fn list_prs_by_reviewer(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<PullRequestShort>, RepositoryError>;

    async fn aggregate_stats(&self) -> Result<StoredStats, RepositoryError>;
}
