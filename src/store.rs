//! SQLite-backed user and plant store.
//!
//! rusqlite is synchronous, so every public operation runs its SQL on the
//! blocking pool behind a single connection mutex. Writes use a local
//! transaction; dropping it without commit rolls back.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::password;

/// Status given to every newly added plant.
pub const INITIAL_HEALTH: &str = "Healthy";

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS plants (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    plant_type TEXT NOT NULL,
    health_data TEXT NOT NULL,
    user_id INTEGER NOT NULL REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_plants_user ON plants(user_id);
";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip)]
    pub password_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plant {
    pub id: i64,
    pub name: String,
    pub plant_type: String,
    pub health_status: String,
    pub owner_id: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to open database at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
    #[error("username already exists: {0}")]
    DuplicateUsername(String),
    #[error("database query failed: {0}")]
    Query(#[from] rusqlite::Error),
    #[error("store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Shared handle to the user/plant database.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Open or create the database file and initialize the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).map_err(|source| StoreError::Open {
            path: path.clone(),
            source,
        })?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::init(conn, path)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let path = PathBuf::from(":memory:");
        let conn = Connection::open_in_memory().map_err(|source| StoreError::Open {
            path: path.clone(),
            source,
        })?;
        Self::init(conn, path)
    }

    fn init(conn: Connection, path: PathBuf) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        tracing::info!(path = %path.display(), "store initialized");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut guard)
        })
        .await?
    }

    /// Create a user with a freshly salted password hash.
    ///
    /// A taken username yields [`StoreError::DuplicateUsername`]; on any
    /// failure the transaction is rolled back.
    pub async fn create_user(&self, username: &str, password: &str) -> Result<User, StoreError> {
        let username = username.to_string();
        let password_hash = password::hash_password(password);
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let inserted = tx.execute(
                "INSERT INTO users (username, password_hash) VALUES (?1, ?2)",
                params![username, password_hash],
            );
            match inserted {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => {
                    return Err(StoreError::DuplicateUsername(username));
                }
                Err(e) => return Err(e.into()),
            }
            let id = tx.last_insert_rowid();
            tx.commit()?;
            Ok(User {
                id,
                username,
                password_hash,
            })
        })
        .await
    }

    /// Return the user if the username exists and the password matches.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, StoreError> {
        let username = username.to_string();
        let user = self
            .run(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT id, username, password_hash FROM users WHERE username = ?1",
                        [username],
                        user_from_row,
                    )
                    .optional()?)
            })
            .await?;
        Ok(user.filter(|u| password::verify_password(&u.password_hash, password)))
    }

    pub async fn get_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        self.run(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT id, username, password_hash FROM users WHERE id = ?1",
                    [id],
                    user_from_row,
                )
                .optional()?)
        })
        .await
    }

    pub async fn count_users_named(&self, username: &str) -> Result<i64, StoreError> {
        let username = username.to_string();
        self.run(move |conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM users WHERE username = ?1",
                [username],
                |row| row.get(0),
            )?)
        })
        .await
    }

    /// Insert a plant owned by `owner_id` with the initial health status.
    pub async fn create_plant(
        &self,
        owner_id: i64,
        name: &str,
        plant_type: &str,
    ) -> Result<Plant, StoreError> {
        let name = name.to_string();
        let plant_type = plant_type.to_string();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO plants (name, plant_type, health_data, user_id) VALUES (?1, ?2, ?3, ?4)",
                params![name, plant_type, INITIAL_HEALTH, owner_id],
            )?;
            let id = tx.last_insert_rowid();
            tx.commit()?;
            Ok(Plant {
                id,
                name,
                plant_type,
                health_status: INITIAL_HEALTH.to_string(),
                owner_id,
            })
        })
        .await
    }

    /// All plants owned by a user, oldest first.
    pub async fn plants_for_owner(&self, owner_id: i64) -> Result<Vec<Plant>, StoreError> {
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, plant_type, health_data, user_id FROM plants \
                 WHERE user_id = ?1 ORDER BY id",
            )?;
            let plants = stmt
                .query_map([owner_id], |row| {
                    Ok(Plant {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        plant_type: row.get(2)?,
                        health_status: row.get(3)?,
                        owner_id: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(plants)
        })
        .await
    }
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error(),
        Some(e) if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

#[cfg(test)]
impl Store {
    /// Run raw SQL, used by tests to break the schema on purpose.
    pub(crate) async fn execute_batch(&self, sql: &'static str) -> Result<(), StoreError> {
        self.run(move |conn| Ok(conn.execute_batch(sql)?)).await
    }

    /// Recreate any missing tables.
    pub(crate) async fn restore_schema(&self) -> Result<(), StoreError> {
        self.execute_batch(SCHEMA).await
    }
}
