//! Database connection management
//!
//! `DatabaseConn` wraps a SQLite connection behind `Arc<Mutex<_>>` so that the
//! builder, the seeding handle and the returned handle can share it, and so
//! that work can be moved onto blocking tasks.

use anyhow::{anyhow, Result};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Settings every connection gets before caller supplied pragmas
const REQUIRED_PRAGMAS: &[(&str, &str)] = &[("foreign_keys", "ON"), ("temp_store", "MEMORY")];

/// Identity of the physical store behind a connection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreIdentity {
    /// Named shared-cache memory database, alive while any connection to it is open
    Memory(String),
    /// Private `:memory:` database owned by a single connection
    Private(Uuid),
    File(PathBuf),
}

impl std::fmt::Display for StoreIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreIdentity::Memory(name) => write!(f, "memory:{}", name),
            StoreIdentity::Private(id) => write!(f, "private:{}", id),
            StoreIdentity::File(path) => write!(f, "file:{}", path.display()),
        }
    }
}

/// Low level engine settings merged over the required defaults
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineOptions {
    /// Extra `PRAGMA name=value` settings, applied in order after the defaults
    pub pragmas: Vec<(String, String)>,
    pub busy_timeout: Option<Duration>,
}

impl EngineOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pragma(mut self, name: &str, value: &str) -> Self {
        self.pragmas.push((name.to_string(), value.to_string()));
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = Some(timeout);
        self
    }

    /// Required settings followed by the caller's; later entries win
    pub fn merged_pragmas(&self) -> Vec<(String, String)> {
        REQUIRED_PRAGMAS
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .chain(self.pragmas.iter().cloned())
            .collect()
    }
}

/// Shared SQLite connection together with the identity of its store
#[derive(Clone)]
pub struct DatabaseConn {
    conn: Arc<Mutex<Connection>>,
    identity: StoreIdentity,
    options: EngineOptions,
}

impl std::fmt::Debug for DatabaseConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConn")
            .field("identity", &self.identity)
            .field("options", &self.options)
            .finish()
    }
}

impl DatabaseConn {
    /// Open a new uniquely named shared-cache memory database
    pub fn open_shared_memory(options: &EngineOptions) -> Result<Self> {
        Self::open_memory_named(&format!("seedbed-{}", Uuid::new_v4()), options)
    }

    /// Open (or attach to) a named shared-cache memory database
    pub fn open_memory_named(name: &str, options: &EngineOptions) -> Result<Self> {
        let uri = format!("file:{}?mode=memory&cache=shared", name);
        let conn = Connection::open(&uri)
            .map_err(|e| anyhow!("Failed to open in-memory database '{}': {}", name, e))?;
        Self::configured(conn, StoreIdentity::Memory(name.to_string()), options)
    }

    /// Open a private `:memory:` database
    pub fn open_private_memory(options: &EngineOptions) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| anyhow!("Failed to create in-memory database: {}", e))?;
        Self::configured(conn, StoreIdentity::Private(Uuid::new_v4()), options)
    }

    /// Open a database file, creating it when missing
    pub fn open_path(path: &Path, options: &EngineOptions) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| anyhow!("Failed to open database at '{}': {}", path.display(), e))?;
        Self::configured(conn, StoreIdentity::File(path.to_path_buf()), options)
    }

    fn configured(conn: Connection, identity: StoreIdentity, options: &EngineOptions) -> Result<Self> {
        let db = DatabaseConn {
            conn: Arc::new(Mutex::new(conn)),
            identity,
            options: options.clone(),
        };
        db.configure()?;
        debug!("Opened database connection to {}", db.identity);
        Ok(db)
    }

    fn configure(&self) -> Result<()> {
        let is_file = matches!(self.identity, StoreIdentity::File(_));
        self.with_conn(|conn| {
            if is_file {
                let _: String = conn
                    .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
                    .map_err(|e| anyhow!("Failed to set journal mode: {}", e))?;
                conn.execute("PRAGMA synchronous=NORMAL", [])
                    .map_err(|e| anyhow!("Failed to set synchronous mode: {}", e))?;
            }

            for (name, value) in self.options.merged_pragmas() {
                apply_pragma(conn, &name, &value)?;
            }

            if let Some(timeout) = self.options.busy_timeout {
                conn.busy_timeout(timeout)
                    .map_err(|e| anyhow!("Failed to set busy timeout: {}", e))?;
            }
            Ok(())
        })
    }

    /// A handle on the same store without any state of this one
    ///
    /// Memory stores get a new connection bound by name; private and file
    /// stores share the single held connection.
    pub fn reopen(&self) -> Result<Self> {
        match &self.identity {
            StoreIdentity::Memory(name) => Self::open_memory_named(name, &self.options),
            StoreIdentity::Private(_) | StoreIdentity::File(_) => Ok(self.clone()),
        }
    }

    pub fn identity(&self) -> &StoreIdentity {
        &self.identity
    }

    /// True when both handles use the same underlying connection
    pub fn shares_connection(&self, other: &DatabaseConn) -> bool {
        Arc::ptr_eq(&self.conn, &other.conn)
    }

    /// Run a closure with exclusive access to the connection
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow!("Database connection lock poisoned"))?;
        f(&conn)
    }

    /// Execute a SQL statement
    pub fn execute(&self, sql: &str) -> Result<usize> {
        self.with_conn(|conn| {
            conn.execute(sql, [])
                .map_err(|e| anyhow!("Failed to execute SQL: {}", e))
        })
    }

    /// Check if a table exists in the database
    pub fn table_exists(&self, table_name: &str) -> Result<bool> {
        self.with_conn(|conn| table_exists(conn, table_name))
    }

    /// Get the row count for a table
    pub fn table_count(&self, table_name: &str) -> Result<u64> {
        let query = format!("SELECT COUNT(*) FROM {}", quote_ident(table_name));
        self.with_conn(|conn| {
            conn.query_row(&query, [], |row| row.get(0))
                .map_err(|e| anyhow!("Failed to get table count: {}", e))
        })
    }
}

pub(crate) fn table_exists(conn: &Connection, table_name: &str) -> Result<bool> {
    let count: i32 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1 COLLATE NOCASE",
            [table_name],
            |row| row.get(0),
        )
        .map_err(|e| anyhow!("Failed to check table existence: {}", e))?;
    Ok(count > 0)
}

/// Quote an identifier for use in generated SQL
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

// some pragmas report the new value as a row, so the result is drained
fn apply_pragma(conn: &Connection, name: &str, value: &str) -> Result<()> {
    let sql = format!("PRAGMA {}={}", name, value);
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| anyhow!("Failed to prepare '{}': {}", sql, e))?;
    let mut rows = stmt
        .query([])
        .map_err(|e| anyhow!("Failed to apply '{}': {}", sql, e))?;
    while rows
        .next()
        .map_err(|e| anyhow!("Failed to apply '{}': {}", sql, e))?
        .is_some()
    {}
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn pragma_i64(db: &DatabaseConn, name: &str) -> i64 {
        db.with_conn(|conn| {
            conn.query_row(&format!("PRAGMA {}", name), [], |row| row.get(0))
                .map_err(|e| anyhow!("{}", e))
        })
        .unwrap()
    }

    #[test]
    fn test_open_private_memory() {
        let db = DatabaseConn::open_private_memory(&EngineOptions::new());
        assert!(db.is_ok());
    }

    #[test]
    fn test_required_pragmas_are_applied() {
        let db = DatabaseConn::open_shared_memory(&EngineOptions::new()).unwrap();
        assert_eq!(pragma_i64(&db, "foreign_keys"), 1);
        // temp_store=MEMORY is 2
        assert_eq!(pragma_i64(&db, "temp_store"), 2);
    }

    #[test]
    fn test_caller_pragmas_win() {
        let options = EngineOptions::new()
            .pragma("foreign_keys", "OFF")
            .pragma("cache_size", "-4000");
        let db = DatabaseConn::open_private_memory(&options).unwrap();
        assert_eq!(pragma_i64(&db, "foreign_keys"), 0);
        assert_eq!(pragma_i64(&db, "cache_size"), -4000);
    }

    #[test]
    fn test_invalid_pragma_fails() {
        let options = EngineOptions::new().pragma("journal_mode", "(");
        assert!(DatabaseConn::open_private_memory(&options).is_err());
    }

    #[test]
    fn test_execute() {
        let db = DatabaseConn::open_private_memory(&EngineOptions::new()).unwrap();
        let result = db.execute("CREATE TABLE test (id INTEGER PRIMARY KEY)");
        assert!(result.is_ok());
    }

    #[test]
    fn test_table_exists() {
        let db = DatabaseConn::open_private_memory(&EngineOptions::new()).unwrap();
        db.execute("CREATE TABLE test_table (id INTEGER PRIMARY KEY)")
            .unwrap();

        assert!(db.table_exists("test_table").unwrap());
        assert!(db.table_exists("TEST_TABLE").unwrap());
        assert!(!db.table_exists("nonexistent_table").unwrap());
    }

    #[test]
    fn test_table_count() {
        let db = DatabaseConn::open_private_memory(&EngineOptions::new()).unwrap();
        db.execute("CREATE TABLE test_table (id INTEGER PRIMARY KEY)")
            .unwrap();
        db.execute("INSERT INTO test_table (id) VALUES (1), (2), (3)")
            .unwrap();

        assert_eq!(db.table_count("test_table").unwrap(), 3);
    }

    #[test]
    fn test_reopen_shared_memory_sees_same_store() {
        let db = DatabaseConn::open_shared_memory(&EngineOptions::new()).unwrap();
        db.execute("CREATE TABLE t (id INTEGER)").unwrap();
        db.execute("INSERT INTO t VALUES (1)").unwrap();

        let other = db.reopen().unwrap();
        assert!(!other.shares_connection(&db));
        assert_eq!(other.identity(), db.identity());
        drop(db);
        assert_eq!(other.table_count("t").unwrap(), 1);
    }

    #[test]
    fn test_shared_memory_stores_are_distinct() {
        let first = DatabaseConn::open_shared_memory(&EngineOptions::new()).unwrap();
        let second = DatabaseConn::open_shared_memory(&EngineOptions::new()).unwrap();
        first.execute("CREATE TABLE t (id INTEGER)").unwrap();
        assert_ne!(first.identity(), second.identity());
        assert!(!second.table_exists("t").unwrap());
    }

    #[test]
    fn test_reopen_private_shares_connection() {
        let db = DatabaseConn::open_private_memory(&EngineOptions::new()).unwrap();
        assert!(db.reopen().unwrap().shares_connection(&db));
    }

    #[test]
    fn test_open_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("seed.sqlite3");
        let db = DatabaseConn::open_path(&path, &EngineOptions::new()).unwrap();
        db.execute("CREATE TABLE t (id INTEGER)").unwrap();
        assert!(path.exists());
        assert_eq!(db.identity(), &StoreIdentity::File(path));
    }
}
