//! Reviewer assignment service.
//!
//! `ReviewService` composes the storage collaborators with a single,
//! long-lived `RandomSource`. Operations are split by concern:
//! - `selector`: reviewer choice for new pull requests
//! - `lifecycle`: create and merge
//! - `reassign`: replacing one reviewer on an open pull request
//! - `stats`: counters and the top-reviewers ranking
//!
//! The service holds no locks of its own. Concurrent calls against the same
//! pull request are made safe by the conditional updates of
//! `PullRequestStore`.

mod lifecycle;
mod reassign;
pub mod selector;
pub mod stats;

#[cfg(test)]
pub(crate) mod test_support;

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::ServiceError;
use crate::model::{PullRequestShort, Team, TeamName, User, UserId};
use crate::random::RandomSource;
use crate::repository::{Directory, PullRequestStore};

pub use stats::TOP_REVIEWERS_LIMIT;

pub struct ReviewService {
    directory: Arc<dyn Directory>,
    store: Arc<dyn PullRequestStore>,
    random: Arc<dyn RandomSource>,
}

impl ReviewService {
    pub fn new(
        directory: Arc<dyn Directory>,
        store: Arc<dyn PullRequestStore>,
        random: Arc<dyn RandomSource>,
    ) -> Self {
        Self {
            directory,
            store,
            random,
        }
    }

    /// Build a service over one backend that serves both collaborator roles.
    pub fn with_repository<R>(repository: Arc<R>, random: Arc<dyn RandomSource>) -> Self
    where
        R: Directory + PullRequestStore + 'static,
    {
        Self::new(repository.clone(), repository, random)
    }

    /// Create a team and upsert its members into it.
    pub async fn create_team(&self, team: Team) -> Result<Team, ServiceError> {
        require_non_empty("team_name", team.team_name.as_str())?;

        let mut seen = HashSet::new();
        for member in &team.members {
            require_non_empty("user_id", member.user_id.as_str())?;
            if !seen.insert(&member.user_id) {
                return Err(ServiceError::Validation(format!(
                    "user {} listed twice in team {}",
                    member.user_id, team.team_name
                )));
            }
        }

        if !self.directory.create_team(&team).await? {
            return Err(ServiceError::TeamExists(team.team_name));
        }

        info!(
            "Created team {} with {} members",
            team.team_name,
            team.members.len()
        );
        Ok(team)
    }

    /// Look up a team and its current roster.
    ///
    /// A team with no members, including one whose members all moved to
    /// other teams, is reported as not found.
    pub async fn get_team(&self, team_name: &TeamName) -> Result<Team, ServiceError> {
        require_non_empty("team_name", team_name.as_str())?;

        if !self.directory.team_exists(team_name).await? {
            return Err(ServiceError::not_found("team", team_name));
        }
        let members = self.directory.get_team_members(team_name).await?;
        if members.is_empty() {
            return Err(ServiceError::not_found("team", team_name));
        }

        Ok(Team {
            team_name: team_name.clone(),
            members,
        })
    }

    pub async fn set_user_active(
        &self,
        user_id: &UserId,
        is_active: bool,
    ) -> Result<User, ServiceError> {
        require_non_empty("user_id", user_id.as_str())?;

        let user = self
            .directory
            .set_user_active(user_id, is_active)
            .await?
            .ok_or_else(|| ServiceError::not_found("user", user_id))?;

        info!("Set user {} active={}", user_id, is_active);
        Ok(user)
    }

    /// Pull requests, of any status, that `user_id` is assigned to review.
    pub async fn get_user_reviews(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<PullRequestShort>, ServiceError> {
        require_non_empty("user_id", user_id.as_str())?;

        let prs = self.store.list_prs_by_reviewer(user_id).await?;
        debug!("User {} reviews {} pull requests", user_id, prs.len());
        Ok(prs)
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), ServiceError> {
    if value.trim().is_empty() {
        return Err(ServiceError::Validation(format!("{field} is required")));
    }
    Ok(())
}
