use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::Result;

/// Tables in dependency order (children first), used by the admin operations
const TABLES: &[&str] = &[
    "tag_assignments",
    "tags",
    "insights",
    "models",
    "executions",
    "workflows",
];

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the catalog's SQLite store.
///
/// Every component receives the handle explicitly; nothing in the crate keeps
/// a process-wide connection.
pub struct Database {
    pub(crate) conn: Connection,
}

impl Database {
    /// Open (or create) the database file and provision the schema
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Private in-memory database, mostly useful in tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        // SQLite leaves FK enforcement off per connection unless asked
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        let db = Self { conn };
        db.create_all_tables()?;

        info!("Database initialized");
        Ok(db)
    }

    /// Create all tables and indexes. Idempotent.
    pub fn create_all_tables(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS workflows (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS executions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL,
                workflow_id INTEGER NOT NULL,
                FOREIGN KEY (workflow_id) REFERENCES workflows(id) ON DELETE CASCADE
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS models (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                model_version TEXT NOT NULL,
                created_at TEXT NOT NULL,
                execution_id INTEGER,
                FOREIGN KEY (execution_id) REFERENCES executions(id) ON DELETE SET NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS insights (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                data TEXT,
                created_at TEXT NOT NULL,
                execution_id INTEGER,
                workflow_id INTEGER,
                model_id INTEGER,
                FOREIGN KEY (execution_id) REFERENCES executions(id) ON DELETE SET NULL,
                FOREIGN KEY (workflow_id) REFERENCES workflows(id) ON DELETE SET NULL,
                FOREIGN KEY (model_id) REFERENCES models(id) ON DELETE SET NULL
            )",
            [],
        )?;

        // === TAGGING TABLES ===

        // Vocabulary: one row per (key, value)
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (key, value)
            )",
            [],
        )?;

        // Polymorphic index: target is a (label, id) pair with no foreign key
        // and no uniqueness, duplicates are kept
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS tag_assignments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tag_id INTEGER NOT NULL,
                target_type TEXT NOT NULL,
                target_id INTEGER NOT NULL,
                FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
            )",
            [],
        )?;

        // Indexes for performance
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_executions_workflow ON executions(workflow_id)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_models_execution ON models(execution_id)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_insights_execution ON insights(execution_id)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_insights_workflow ON insights(workflow_id)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_insights_model ON insights(model_id)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_tag_assignments_target
             ON tag_assignments(target_type, target_id)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_tag_assignments_tag ON tag_assignments(tag_id)",
            [],
        )?;

        Ok(())
    }

    // ========== ADMINISTRATION ==========

    /// Delete every row from every table. Each delete is its own statement.
    pub fn clear_all_data(&self) -> Result<()> {
        for table in TABLES {
            let removed = self.conn.execute(&format!("DELETE FROM {}", table), [])?;
            info!("Cleared {} rows from {}", removed, table);
        }
        Ok(())
    }

    /// Drop every catalog table. Queries fail until `create_all_tables` runs again.
    pub fn drop_all_tables(&self) -> Result<()> {
        for table in TABLES {
            self.conn
                .execute(&format!("DROP TABLE IF EXISTS {}", table), [])?;
        }
        warn!("Dropped all catalog tables");
        Ok(())
    }

    /// Count rows in a catalog table
    pub fn count_rows(&self, table: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", table),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Whether a catalog table is currently provisioned
    pub fn has_table(&self, table: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

/// Creation timestamp for new rows.
///
/// Fixed-width microsecond RFC3339 so that text ordering matches time ordering.
pub(crate) fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
