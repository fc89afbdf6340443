//! Reviewer assignment and pull request lifecycle for fixed teams.
//!
//! The crate is storage-agnostic: `ReviewService` works against the
//! `Directory` and `PullRequestStore` traits, and an in-memory backend is
//! provided for tests and embedding.

pub mod error;
pub mod model;
pub mod random;
pub mod repository;
pub mod service;

pub use error::{RepositoryError, ServiceError};
pub use model::*;
pub use random::{RandomSource, StdRandom};
pub use repository::{Directory, InMemoryRepository, PullRequestStore, StoredStats};
pub use service::ReviewService;
