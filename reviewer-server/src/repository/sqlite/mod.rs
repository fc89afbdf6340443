//! SQLite implementation of `Directory` and `PullRequestStore`.
//!
//! This provides persistent storage that survives service restarts.
//!
//! # Schema Versioning
//!
//! The database has a `schema_version` table that tracks the schema version.
//! When the schema needs to change, increment `CURRENT_SCHEMA_VERSION` and add
//! a migration in `run_migrations()`. Migrations run sequentially from the
//! current version to the target version.
//!
//! # Conditional updates
//!
//! Merge and reassignment are single `UPDATE` statements whose `WHERE`
//! clause carries the expected prior value. The affected-row count tells the
//! caller whether the write committed.


use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use reviewer_core::{
    Directory, PrStatus, PullRequest, PullRequestId, PullRequestShort, PullRequestStore,
    RepositoryError, StoredStats, Team, TeamMember, TeamName, User, UserId,
};

/// Current schema version. Increment this when making schema changes and add
/// corresponding migration logic in `run_migrations()`.
const CURRENT_SCHEMA_VERSION: i64 = 2;

const PR_COLUMNS: &str = "pull_request_id, pull_request_name, author_id, status, \
                          assigned_reviewers, created_at, merged_at";

/// SQLite-backed repository for teams, users and pull requests.
///
/// Uses `tokio::task::spawn_blocking` to run synchronous rusqlite operations
/// without blocking the async runtime.
pub struct SqliteRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    /// Open (or create) the reviewer database at `path`.
    ///
    /// Missing parent directories are created, so `STATE_DIR` may point at a
    /// directory that does not exist yet. A database written by an older
    /// build is migrated in place; one written by a newer build is refused
    /// rather than read with the wrong schema.
    ///
    /// # Durability
    ///
    /// - `journal_mode = WAL`: `GetUserReviews` and `/stats` keep reading
    ///   while a merge or reassignment is being written. Opening fails if
    ///   the filesystem cannot provide WAL.
    /// - `synchronous = FULL`: a merge or reassignment that returned success
    ///   is on disk, even after a power loss.
    /// - `busy_timeout = 5000ms`: a second process sharing the file waits for
    ///   the write lock instead of failing at once.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
        let path_ref = path.as_ref();

        let path_str = path_ref.to_string_lossy();
        let is_in_memory = path_str == ":memory:";
        if !is_in_memory && !path_str.is_empty() {
            if let Some(parent) = path_ref.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        RepositoryError::storage(
                            "create database directory",
                            format!("{}: {}", parent.display(), e),
                        )
                    })?;
                }
            }
        }

        let conn = Connection::open(path_ref)
            .map_err(|e| RepositoryError::storage("open database", e.to_string()))?;

        // In-memory databases report "memory" and have nothing to make durable.
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| RepositoryError::storage("set journal_mode", e.to_string()))?;
        let journal_mode_ok = journal_mode.eq_ignore_ascii_case("wal")
            || (is_in_memory && journal_mode.eq_ignore_ascii_case("memory"));
        if !journal_mode_ok {
            return Err(RepositoryError::storage(
                "configure journal_mode",
                format!(
                    "Failed to enable WAL mode: SQLite returned '{}' instead of 'wal'",
                    journal_mode
                ),
            ));
        }

        conn.execute_batch(
            r#"
            PRAGMA synchronous = FULL;
            PRAGMA busy_timeout = 5000;
            "#,
        )
        .map_err(|e| RepositoryError::storage("configure pragmas", e.to_string()))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| RepositoryError::storage("create schema_version table", e.to_string()))?;

        let current_version: i64 = conn
            .query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RepositoryError::storage("get schema version", e.to_string()))?
            .unwrap_or(0);

        Self::run_migrations(&conn, current_version)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory SQLite repository (for testing).
    pub fn new_in_memory() -> Result<Self, RepositoryError> {
        Self::new(":memory:")
    }

    /// Run migrations from `from_version` to `CURRENT_SCHEMA_VERSION`.
    fn run_migrations(conn: &Connection, from_version: i64) -> Result<(), RepositoryError> {
        if from_version > CURRENT_SCHEMA_VERSION {
            return Err(RepositoryError::storage(
                "schema version",
                format!(
                    "Database schema version {} is newer than supported version {}. \
                     Please upgrade the application.",
                    from_version, CURRENT_SCHEMA_VERSION
                ),
            ));
        }

        if from_version == CURRENT_SCHEMA_VERSION {
            return Ok(());
        }
        info!(
            "Migrating reviewer database from schema v{} to v{}",
            from_version, CURRENT_SCHEMA_VERSION
        );

        // Migration from version 0 (fresh database) to version 1
        if from_version < 1 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS teams (
                    team_name TEXT PRIMARY KEY
                );

                CREATE TABLE IF NOT EXISTS users (
                    user_id TEXT PRIMARY KEY,
                    username TEXT NOT NULL,
                    team_name TEXT NOT NULL REFERENCES teams(team_name),
                    is_active INTEGER NOT NULL DEFAULT 1
                );

                CREATE TABLE IF NOT EXISTS pull_requests (
                    pull_request_id TEXT PRIMARY KEY,
                    pull_request_name TEXT NOT NULL,
                    author_id TEXT NOT NULL,
                    status TEXT NOT NULL CHECK (status IN ('OPEN', 'MERGED')),
                    assigned_reviewers TEXT NOT NULL DEFAULT '[]',
                    created_at TEXT NOT NULL,
                    merged_at TEXT
                );
                "#,
            )
            .map_err(|e| RepositoryError::storage("migration v1", e.to_string()))?;
        }

        // Migration from version 1 to version 2: indexes for roster lookups
        // and status counts
        if from_version < 2 {
            conn.execute_batch(
                r#"
                CREATE INDEX IF NOT EXISTS idx_users_team_active
                    ON users(team_name, is_active);
                CREATE INDEX IF NOT EXISTS idx_pull_requests_status
                    ON pull_requests(status);
                "#,
            )
            .map_err(|e| RepositoryError::storage("migration v2", e.to_string()))?;
        }

        conn.execute(
            "INSERT INTO schema_version (id, version) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET version = excluded.version",
            params![CURRENT_SCHEMA_VERSION],
        )
        .map_err(|e| RepositoryError::storage("update schema version", e.to_string()))?;

        Ok(())
    }

    /// Run `f` against the connection on the blocking thread pool.
    async fn with_conn<T, F>(&self, operation: &'static str, f: F) -> Result<T, RepositoryError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, RepositoryError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| RepositoryError::storage(operation, "connection lock poisoned"))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| RepositoryError::storage(operation, e.to_string()))?
    }
}

fn sql_error(operation: &'static str) -> impl Fn(rusqlite::Error) -> RepositoryError {
    move |e| RepositoryError::storage(operation, e.to_string())
}

fn encode_reviewers(reviewers: &[UserId]) -> Result<String, RepositoryError> {
    serde_json::to_string(reviewers)
        .map_err(|e| RepositoryError::storage("serialize reviewers", e.to_string()))
}

fn decode_time(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| RepositoryError::corruption(format!("timestamp '{raw}'")))
}

fn decode_status(raw: &str) -> Result<PrStatus, RepositoryError> {
    PrStatus::parse(raw).ok_or_else(|| RepositoryError::corruption(format!("status '{raw}'")))
}

/// A `pull_requests` row before decoding.
struct PrRow {
    id: String,
    name: String,
    author: String,
    status: String,
    reviewers_json: String,
    created_at: String,
    merged_at: Option<String>,
}

impl PrRow {
    /// Reads the columns listed in `PR_COLUMNS`, in order.
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            author: row.get(2)?,
            status: row.get(3)?,
            reviewers_json: row.get(4)?,
            created_at: row.get(5)?,
            merged_at: row.get(6)?,
        })
    }

    fn into_pull_request(self) -> Result<PullRequest, RepositoryError> {
        let assigned_reviewers: Vec<UserId> = serde_json::from_str(&self.reviewers_json)
            .map_err(|_| RepositoryError::corruption("assigned_reviewers JSON"))?;
        let merged_at = self.merged_at.as_deref().map(decode_time).transpose()?;

        Ok(PullRequest {
            pull_request_id: PullRequestId(self.id),
            pull_request_name: self.name,
            author_id: UserId(self.author),
            status: decode_status(&self.status)?,
            assigned_reviewers,
            created_at: decode_time(&self.created_at)?,
            merged_at,
        })
    }
}

#[async_trait]
impl Directory for SqliteRepository {
    async fn create_team(&self, team: &Team) -> Result<bool, RepositoryError> {
        let team = team.clone();

        self.with_conn("create_team", move |conn| {
            let err = sql_error("create_team");
            let tx = conn.transaction().map_err(&err)?;

            let inserted = tx
                .execute(
                    "INSERT INTO teams (team_name) VALUES (?1)
                     ON CONFLICT(team_name) DO NOTHING",
                    params![team.team_name.as_str()],
                )
                .map_err(&err)?;
            if inserted == 0 {
                // Dropping the transaction rolls it back.
                return Ok(false);
            }

            for member in &team.members {
                tx.execute(
                    "INSERT INTO users (user_id, username, team_name, is_active)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(user_id) DO UPDATE SET
                         username = excluded.username,
                         team_name = excluded.team_name,
                         is_active = excluded.is_active",
                    params![
                        member.user_id.as_str(),
                        member.username,
                        team.team_name.as_str(),
                        member.is_active
                    ],
                )
                .map_err(&err)?;
            }

            tx.commit().map_err(&err)?;
            Ok(true)
        })
        .await
    }

    async fn team_exists(&self, team_name: &TeamName) -> Result<bool, RepositoryError> {
        let name = team_name.0.clone();

        self.with_conn("team_exists", move |conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM teams WHERE team_name = ?1)",
                params![name],
                |row| row.get(0),
            )
            .map_err(sql_error("team_exists"))
        })
        .await
    }

    async fn get_team_members(
        &self,
        team_name: &TeamName,
    ) -> Result<Vec<TeamMember>, RepositoryError> {
        let name = team_name.0.clone();

        self.with_conn("get_team_members", move |conn| {
            let err = sql_error("get_team_members");
            let mut stmt = conn
                .prepare(
                    "SELECT user_id, username, is_active FROM users
                     WHERE team_name = ?1 ORDER BY user_id",
                )
                .map_err(&err)?;

            let rows = stmt
                .query_map(params![name], |row| {
                    Ok(TeamMember {
                        user_id: UserId(row.get(0)?),
                        username: row.get(1)?,
                        is_active: row.get(2)?,
                    })
                })
                .map_err(&err)?;

            rows.collect::<Result<Vec<_>, _>>().map_err(&err)
        })
        .await
    }

    async fn get_active_members(
        &self,
        team_name: &TeamName,
        exclude: &UserId,
    ) -> Result<Vec<UserId>, RepositoryError> {
        let name = team_name.0.clone();
        let exclude = exclude.0.clone();

        self.with_conn("get_active_members", move |conn| {
            let err = sql_error("get_active_members");
            let mut stmt = conn
                .prepare(
                    "SELECT user_id FROM users
                     WHERE team_name = ?1 AND is_active = 1 AND user_id != ?2
                     ORDER BY user_id",
                )
                .map_err(&err)?;

            let rows = stmt
                .query_map(params![name, exclude], |row| row.get::<_, String>(0))
                .map_err(&err)?;

            rows.map(|r| r.map(UserId))
                .collect::<Result<Vec<_>, _>>()
                .map_err(&err)
        })
        .await
    }

    async fn get_user_team(&self, user_id: &UserId) -> Result<Option<TeamName>, RepositoryError> {
        let id = user_id.0.clone();

        self.with_conn("get_user_team", move |conn| {
            conn.query_row(
                "SELECT team_name FROM users WHERE user_id = ?1",
                params![id],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map(|name| name.map(TeamName))
            .map_err(sql_error("get_user_team"))
        })
        .await
    }

    async fn set_user_active(
        &self,
        user_id: &UserId,
        is_active: bool,
    ) -> Result<Option<User>, RepositoryError> {
        let id = user_id.0.clone();

        self.with_conn("set_user_active", move |conn| {
            conn.query_row(
                "UPDATE users SET is_active = ?1 WHERE user_id = ?2
                 RETURNING user_id, username, team_name, is_active",
                params![is_active, id],
                |row| {
                    Ok(User {
                        user_id: UserId(row.get(0)?),
                        username: row.get(1)?,
                        team_name: TeamName(row.get(2)?),
                        is_active: row.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(sql_error("set_user_active"))
        })
        .await
    }
}

#[async_trait]
impl PullRequestStore for SqliteRepository {
    async fn pr_exists(&self, id: &PullRequestId) -> Result<bool, RepositoryError> {
        let id = id.0.clone();

        self.with_conn("pr_exists", move |conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM pull_requests WHERE pull_request_id = ?1)",
                params![id],
                |row| row.get(0),
            )
            .map_err(sql_error("pr_exists"))
        })
        .await
    }

    async fn create_pr(&self, pr: &PullRequest) -> Result<bool, RepositoryError> {
        let reviewers_json = encode_reviewers(&pr.assigned_reviewers)?;
        let pr = pr.clone();

        self.with_conn("create_pr", move |conn| {
            let inserted = conn
                .execute(
                    "INSERT INTO pull_requests (pull_request_id, pull_request_name, author_id,
                                                status, assigned_reviewers, created_at, merged_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(pull_request_id) DO NOTHING",
                    params![
                        pr.pull_request_id.as_str(),
                        pr.pull_request_name,
                        pr.author_id.as_str(),
                        pr.status.as_str(),
                        reviewers_json,
                        pr.created_at.to_rfc3339(),
                        pr.merged_at.map(|t| t.to_rfc3339())
                    ],
                )
                .map_err(sql_error("create_pr"))?;
            Ok(inserted == 1)
        })
        .await
    }

    async fn get_pr(&self, id: &PullRequestId) -> Result<Option<PullRequest>, RepositoryError> {
        let id = id.0.clone();

        self.with_conn("get_pr", move |conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {PR_COLUMNS} FROM pull_requests WHERE pull_request_id = ?1"),
                    params![id],
                    PrRow::from_row,
                )
                .optional()
                .map_err(sql_error("get_pr"))?;

            row.map(PrRow::into_pull_request).transpose()
        })
        .await
    }

    async fn cas_update_status(
        &self,
        id: &PullRequestId,
        expected: PrStatus,
        new_status: PrStatus,
        merged_at: Option<DateTime<Utc>>,
    ) -> Result<bool, RepositoryError> {
        let id = id.0.clone();

        self.with_conn("cas_update_status", move |conn| {
            let changed = conn
                .execute(
                    "UPDATE pull_requests SET status = ?1, merged_at = ?2
                     WHERE pull_request_id = ?3 AND status = ?4",
                    params![
                        new_status.as_str(),
                        merged_at.map(|t| t.to_rfc3339()),
                        id,
                        expected.as_str()
                    ],
                )
                .map_err(sql_error("cas_update_status"))?;
            Ok(changed == 1)
        })
        .await
    }

    async fn cas_update_reviewers(
        &self,
        id: &PullRequestId,
        expected: &[UserId],
        new_reviewers: &[UserId],
    ) -> Result<bool, RepositoryError> {
        let id = id.0.clone();
        let expected_json = encode_reviewers(expected)?;
        let new_json = encode_reviewers(new_reviewers)?;

        self.with_conn("cas_update_reviewers", move |conn| {
            let changed = conn
                .execute(
                    "UPDATE pull_requests SET assigned_reviewers = ?1
                     WHERE pull_request_id = ?2 AND status = 'OPEN'
                       AND assigned_reviewers = ?3",
                    params![new_json, id, expected_json],
                )
                .map_err(sql_error("cas_update_reviewers"))?;
            Ok(changed == 1)
        })
        .await
    }

    async fn list_prs_by_reviewer(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<PullRequestShort>, RepositoryError> {
        let id = user_id.0.clone();

        self.with_conn("list_prs_by_reviewer", move |conn| {
            let err = sql_error("list_prs_by_reviewer");
            let mut stmt = conn
                .prepare(
                    "SELECT p.pull_request_id, p.pull_request_name, p.author_id, p.status
                     FROM pull_requests p
                     WHERE EXISTS (
                         SELECT 1 FROM json_each(p.assigned_reviewers) r WHERE r.value = ?1
                     )
                     ORDER BY p.created_at, p.pull_request_id",
                )
                .map_err(&err)?;

            let rows = stmt
                .query_map(params![id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })
                .map_err(&err)?;

            let mut results = Vec::new();
            for row in rows {
                let (pr_id, name, author, status) = row.map_err(&err)?;
                results.push(PullRequestShort {
                    status: decode_status(&status)?,
                    pull_request_id: PullRequestId(pr_id),
                    pull_request_name: name,
                    author_id: UserId(author),
                });
            }

            Ok(results)
        })
        .await
    }

    async fn aggregate_stats(&self) -> Result<StoredStats, RepositoryError> {
        self.with_conn("aggregate_stats", move |conn| {
            let err = sql_error("aggregate_stats");
            let count = |sql: &str| -> Result<u64, RepositoryError> {
                conn.query_row(sql, [], |row| row.get::<_, i64>(0))
                    .map(|n| n as u64)
                    .map_err(&err)
            };

            let total_teams = count("SELECT COUNT(*) FROM teams")?;
            let total_users = count("SELECT COUNT(*) FROM users")?;
            let open_prs = count("SELECT COUNT(*) FROM pull_requests WHERE status = 'OPEN'")?;
            let merged_prs = count("SELECT COUNT(*) FROM pull_requests WHERE status = 'MERGED'")?;

            let mut stmt = conn
                .prepare(
                    "SELECT r.value, COUNT(*)
                     FROM pull_requests p, json_each(p.assigned_reviewers) r
                     GROUP BY r.value",
                )
                .map_err(&err)?;
            let reviewer_assignments = stmt
                .query_map([], |row| {
                    Ok((UserId(row.get(0)?), row.get::<_, i64>(1)? as u64))
                })
                .map_err(&err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(&err)?;

            Ok(StoredStats {
                total_teams,
                total_users,
                open_prs,
                merged_prs,
                reviewer_assignments,
            })
        })
        .await
    }
}
