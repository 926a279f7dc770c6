use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

#[cfg(test)]
use mockall::automock;
use rusqlite::Connection;
use tracing::{debug, info};

use crate::version::error::CacheError;
use crate::version::operator::Mode;
use crate::version::tracker::DependencyRecord;

/// What is remembered about the last successful run over a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    /// SHA-256 of the input text
    pub input_hash: String,
    /// Output path the input was rendered to
    pub output: String,
    pub mode: Mode,
    pub dependencies: DependencyRecord,
}

/// Trait for persisting dependency records per source file
#[cfg_attr(test, automock)]
pub trait RecordStore: Send + Sync {
    /// Get the record of the last run over `source`
    fn get_record(&self, source: &str) -> Result<Option<StoredRecord>, CacheError>;

    /// Replace the record for `source`; the previous program set is discarded
    fn replace_record(&self, source: &str, record: &StoredRecord) -> Result<(), CacheError>;

    /// Remove the record for `source`, returning whether one existed
    fn remove_record(&self, source: &str) -> Result<bool, CacheError>;

    /// All sources with a record, sorted
    fn list_sources(&self) -> Result<Vec<String>, CacheError>;
}

/// Schema migrations
/// Each version contains a list of SQL statements to execute
const MIGRATIONS: &[&[&str]] = &[
    // v1: output column
    &["ALTER TABLE records ADD COLUMN output TEXT NOT NULL DEFAULT ''"],
];

pub struct Cache {
    conn: Mutex<Connection>,
}

impl Cache {
    pub fn new(db_path: &Path) -> Result<Self, CacheError> {
        info!("Initializing record database at {:?}", db_path);

        let conn = Connection::open(db_path)?;

        // Enable WAL mode for better concurrency
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        debug!("Database connection established");

        let cache = Self {
            conn: Mutex::new(conn),
        };

        cache.create_schema()?;
        info!("Record database initialized successfully");

        Ok(cache)
    }

    /// Acquire database connection lock with proper error handling
    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, CacheError> {
        self.conn.lock().map_err(|_| CacheError::LockPoisoned)
    }

    /// Get current timestamp in milliseconds since UNIX epoch
    fn current_timestamp_ms() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default()
    }

    fn create_schema(&self) -> Result<(), CacheError> {
        debug!("Creating database schema");

        let conn = self.lock_conn()?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source TEXT NOT NULL UNIQUE,
                input_hash TEXT NOT NULL,
                mode TEXT NOT NULL,
                signature TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS record_programs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                record_id INTEGER NOT NULL,
                program TEXT NOT NULL,
                FOREIGN KEY (record_id) REFERENCES records(id) ON DELETE CASCADE,
                UNIQUE(record_id, program)
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_record_id ON record_programs(record_id)",
            [],
        )?;

        // Apply migrations
        Self::apply_migrations(&conn)?;

        debug!("Database schema created successfully");
        Ok(())
    }

    /// Apply pending migrations based on user_version pragma
    fn apply_migrations(conn: &Connection) -> Result<(), CacheError> {
        let current_version: i32 =
            conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

        for (i, statements) in MIGRATIONS.iter().enumerate() {
            let version = (i + 1) as i32;
            if version > current_version {
                for sql in *statements {
                    match conn.execute(sql, []) {
                        Ok(_) => {}
                        Err(rusqlite::Error::SqliteFailure(_, Some(ref msg)))
                            if msg.contains("duplicate column name") =>
                        {
                            debug!("Column already exists, skipping: {}", sql);
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                debug!("Applied migration v{}", version);
            }
        }

        let target_version = MIGRATIONS.len() as i32;
        if target_version > current_version {
            conn.pragma_update(None, "user_version", target_version)?;
            debug!("Updated schema version to v{}", target_version);
        }

        Ok(())
    }

    fn programs_for(conn: &Connection, record_id: i64) -> Result<BTreeSet<String>, CacheError> {
        let mut stmt = conn.prepare("SELECT program FROM record_programs WHERE record_id = ?1")?;
        let programs = stmt
            .query_map([record_id], |row| row.get(0))?
            .collect::<Result<BTreeSet<String>, _>>()?;
        Ok(programs)
    }
}

impl RecordStore for Cache {
    fn get_record(&self, source: &str) -> Result<Option<StoredRecord>, CacheError> {
        let conn = self.lock_conn()?;
        let result = conn.query_row(
            "SELECT id, input_hash, output, mode, signature FROM records WHERE source = ?1",
            [source],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        );

        let (record_id, input_hash, output, mode, signature) = match result {
            Ok(row) => row,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mode = mode
            .parse::<Mode>()
            .map_err(|_| CacheError::InvalidMode(mode.clone()))?;
        let programs = Self::programs_for(&conn, record_id)?;

        Ok(Some(StoredRecord {
            input_hash,
            output,
            mode,
            dependencies: DependencyRecord {
                programs,
                signature,
            },
        }))
    }

    fn replace_record(&self, source: &str, record: &StoredRecord) -> Result<(), CacheError> {
        debug!(
            "Saving record for {} with {} programs",
            source,
            record.dependencies.programs.len()
        );

        let now = Self::current_timestamp_ms();

        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            r#"
            INSERT INTO records (source, input_hash, output, mode, signature, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(source) DO UPDATE SET
                input_hash = excluded.input_hash,
                output = excluded.output,
                mode = excluded.mode,
                signature = excluded.signature,
                updated_at = excluded.updated_at
            "#,
            (
                source,
                &record.input_hash,
                &record.output,
                record.mode.as_str(),
                &record.dependencies.signature,
                now,
            ),
        )?;

        let record_id: i64 = tx.query_row(
            "SELECT id FROM records WHERE source = ?1",
            [source],
            |row| row.get(0),
        )?;

        // A record is re-derived on every run, never merged with the last one
        tx.execute(
            "DELETE FROM record_programs WHERE record_id = ?1",
            [record_id],
        )?;

        {
            let mut stmt =
                tx.prepare("INSERT INTO record_programs (record_id, program) VALUES (?1, ?2)")?;
            for program in &record.dependencies.programs {
                stmt.execute((record_id, program))?;
            }
        }

        tx.commit()?;

        debug!("Successfully saved record for {}", source);
        Ok(())
    }

    fn remove_record(&self, source: &str) -> Result<bool, CacheError> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM record_programs WHERE record_id IN (SELECT id FROM records WHERE source = ?1)",
            [source],
        )?;
        let removed = tx.execute("DELETE FROM records WHERE source = ?1", [source])?;

        tx.commit()?;
        Ok(removed > 0)
    }

    fn list_sources(&self) -> Result<Vec<String>, CacheError> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare("SELECT source FROM records ORDER BY source")?;
        let sources = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(sources)
    }
}
