//! Persistent storage backends for `reviewer_core`'s collaborator traits.

mod sqlite;

pub use sqlite::SqliteRepository;
