//! In-memory implementation of `Directory` and `PullRequestStore`.
//!
//! All state is held in memory and lost on restart. Every method takes the
//! lock once, so each call is atomic with respect to the others.
//!
//! Maps are ordered by id so listings come back in a stable order, matching
//! the `ORDER BY` of the SQLite backend. Seeded selection depends on it.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{Directory, PullRequestStore, StoredStats};
use crate::error::RepositoryError;
use crate::model::{
    PrStatus, PullRequest, PullRequestId, PullRequestShort, Team, TeamMember, TeamName, User,
    UserId,
};

#[derive(Default)]
struct Inner {
    teams: BTreeSet<TeamName>,
    users: BTreeMap<UserId, User>,
    prs: BTreeMap<PullRequestId, PullRequest>,
}

/// In-memory repository backing both collaborator traits.
pub struct InMemoryRepository {
    inner: RwLock<Inner>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Directory for InMemoryRepository {
    async fn create_team(&self, team: &Team) -> Result<bool, RepositoryError> {
        let mut inner = self.inner.write().await;
        if !inner.teams.insert(team.team_name.clone()) {
            return Ok(false);
        }
        for member in &team.members {
            inner.users.insert(
                member.user_id.clone(),
                User {
                    user_id: member.user_id.clone(),
                    username: member.username.clone(),
                    team_name: team.team_name.clone(),
                    is_active: member.is_active,
                },
            );
        }
        Ok(true)
    }

    async fn team_exists(&self, team_name: &TeamName) -> Result<bool, RepositoryError> {
        let inner = self.inner.read().await;
        Ok(inner.teams.contains(team_name))
    }

    async fn get_team_members(
        &self,
        team_name: &TeamName,
    ) -> Result<Vec<TeamMember>, RepositoryError> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .values()
            .filter(|u| &u.team_name == team_name)
            .map(|u| TeamMember {
                user_id: u.user_id.clone(),
                username: u.username.clone(),
                is_active: u.is_active,
            })
            .collect())
    }

    async fn get_active_members(
        &self,
        team_name: &TeamName,
        exclude: &UserId,
    ) -> Result<Vec<UserId>, RepositoryError> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .values()
            .filter(|u| &u.team_name == team_name && u.is_active && &u.user_id != exclude)
            .map(|u| u.user_id.clone())
            .collect())
    }

    async fn get_user_team(&self, user_id: &UserId) -> Result<Option<TeamName>, RepositoryError> {
        let inner = self.inner.read().await;
        Ok(inner.users.get(user_id).map(|u| u.team_name.clone()))
    }

    async fn set_user_active(
        &self,
        user_id: &UserId,
        is_active: bool,
    ) -> Result<Option<User>, RepositoryError> {
        let mut inner = self.inner.write().await;
        Ok(inner.users.get_mut(user_id).map(|user| {
            user.is_active = is_active;
            user.clone()
        }))
    }
}

#[async_trait]
impl PullRequestStore for InMemoryRepository {
    async fn pr_exists(&self, id: &PullRequestId) -> Result<bool, RepositoryError> {
        let inner = self.inner.read().await;
        Ok(inner.prs.contains_key(id))
    }

    async fn create_pr(&self, pr: &PullRequest) -> Result<bool, RepositoryError> {
        use std::collections::btree_map::Entry;

        let mut inner = self.inner.write().await;
        match inner.prs.entry(pr.pull_request_id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(entry) => {
                entry.insert(pr.clone());
                Ok(true)
            }
        }
    }

    async fn get_pr(&self, id: &PullRequestId) -> Result<Option<PullRequest>, RepositoryError> {
        let inner = self.inner.read().await;
        Ok(inner.prs.get(id).cloned())
    }

    async fn cas_update_status(
        &self,
        id: &PullRequestId,
        expected: PrStatus,
        new_status: PrStatus,
        merged_at: Option<DateTime<Utc>>,
    ) -> Result<bool, RepositoryError> {
        let mut inner = self.inner.write().await;
        match inner.prs.get_mut(id) {
            Some(pr) if pr.status == expected => {
                pr.status = new_status;
                pr.merged_at = merged_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn cas_update_reviewers(
        &self,
        id: &PullRequestId,
        expected: &[UserId],
        new_reviewers: &[UserId],
    ) -> Result<bool, RepositoryError> {
        let mut inner = self.inner.write().await;
        match inner.prs.get_mut(id) {
            Some(pr) if pr.status == PrStatus::Open && pr.assigned_reviewers == expected => {
                pr.assigned_reviewers = new_reviewers.to_vec();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_prs_by_reviewer(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<PullRequestShort>, RepositoryError> {
        let inner = self.inner.read().await;
        Ok(inner
            .prs
            .values()
            .filter(|pr| pr.has_reviewer(user_id))
            .map(PullRequest::to_short)
            .collect())
    }

    async fn aggregate_stats(&self) -> Result<StoredStats, RepositoryError> {
        let inner = self.inner.read().await;

        let mut counts: BTreeMap<&UserId, u64> = BTreeMap::new();
        let mut open_prs = 0;
        let mut merged_prs = 0;
        for pr in inner.prs.values() {
            match pr.status {
                PrStatus::Open => open_prs += 1,
                PrStatus::Merged => merged_prs += 1,
            }
            for reviewer in &pr.assigned_reviewers {
                *counts.entry(reviewer).or_insert(0) += 1;
            }
        }

        Ok(StoredStats {
            total_teams: inner.teams.len() as u64,
            total_users: inner.users.len() as u64,
            open_prs,
            merged_prs,
            reviewer_assignments: counts
                .into_iter()
                .map(|(user_id, count)| (user_id.clone(), count))
                .collect(),
        })
    }
}
