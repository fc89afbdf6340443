//! Error types surfaced by the storage collaborators and by `ReviewService`.

use thiserror::Error;

use crate::model::{PullRequestId, TeamName, UserId};

/// Failure inside a storage collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepositoryError {
    /// The backend could not complete an operation (I/O, SQL, lock poisoning).
    #[error("storage error during {operation}: {message}")]
    Storage { operation: String, message: String },

    /// A persisted value could not be decoded.
    #[error("corrupt data: {what}")]
    Corruption { what: String },
}

impl RepositoryError {
    pub fn storage(operation: impl Into<String>, message: impl Into<String>) -> Self {
        RepositoryError::Storage {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn corruption(what: impl Into<String>) -> Self {
        RepositoryError::Corruption { what: what.into() }
    }
}

/// Errors returned by `ReviewService` operations.
///
/// The transport maps these to status codes through [`ServiceError::code`].
#[derive(Debug, Error)]
pub enum ServiceError {
    /// An identifier was empty or otherwise unusable.
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("pull request {0} already exists")]
    DuplicateId(PullRequestId),

    #[error("team {0} already exists")]
    TeamExists(TeamName),

    /// The author could not be resolved to a team.
    #[error("author {0} not found")]
    AuthorNotFound(UserId),

    #[error("{resource} {id} not found")]
    NotFound { resource: &'static str, id: String },

    #[error("pull request {0} is merged")]
    PrMerged(PullRequestId),

    #[error("user {reviewer} is not assigned to pull request {pr}")]
    NotAssigned { pr: PullRequestId, reviewer: UserId },

    #[error("no active replacement candidate for {reviewer} on pull request {pr}")]
    NoCandidate { pr: PullRequestId, reviewer: UserId },

    /// A conditional write lost against a concurrent writer; the whole
    /// operation may be retried.
    #[error("pull request {0} was modified concurrently")]
    ConcurrentModification(PullRequestId),

    #[error(transparent)]
    StorageUnavailable(#[from] RepositoryError),
}

impl ServiceError {
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        ServiceError::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "INVALID_REQUEST",
            ServiceError::DuplicateId(_) => "PR_EXISTS",
            ServiceError::TeamExists(_) => "TEAM_EXISTS",
            ServiceError::AuthorNotFound(_) | ServiceError::NotFound { .. } => "NOT_FOUND",
            ServiceError::PrMerged(_) => "PR_MERGED",
            ServiceError::NotAssigned { .. } => "NOT_ASSIGNED",
            ServiceError::NoCandidate { .. } => "NO_CANDIDATE",
            ServiceError::ConcurrentModification(_) => "CONCURRENT_UPDATE",
            ServiceError::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
        }
    }
}
