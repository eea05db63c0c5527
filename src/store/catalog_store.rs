//! libSQL-backed catalog source.
//!
//! The catalog is read once at start into an immutable [`Catalog`]; nothing
//! writes to these tables while the service runs.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use libsql::{Connection, Database as LibSqlDatabase};
use tracing::{debug, info, warn};

use crate::advisor::catalog::{CareerOutlook, Catalog, CatalogEntry};
use crate::error::DatabaseError;
use crate::store::migrations;
use crate::stream::StreamLabel;

/// Catalog database handle.
pub struct CatalogStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl CatalogStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        Self::from_database(db).await
    }

    /// In-memory database seeded with the built-in catalog.
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Get the connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Read every stream with financial data into a [`Catalog`].
    ///
    /// Rows naming a stream outside the label set are skipped with a warning.
    /// Streams without a `financials` row are left out, so lookups for them
    /// report a miss. Legacy files may hold repeated `financials` and `jobs`
    /// rows; the first row per stream (and per role) wins.
    pub async fn load_catalog(&self) -> Result<Catalog, DatabaseError> {
        let mut careers = self.load_careers().await?;

        let mut rows = self
            .conn
            .query(
                "SELECT s.name, COALESCE(s.description, ''), f.coaching_fee, f.college_fee_min, f.college_fee_max
                 FROM streams s JOIN financials f ON f.stream_name = s.name
                 ORDER BY s.name, f.rowid",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load_catalog: {e}")))?;

        let mut entries = Vec::new();
        let mut seen = HashSet::new();
        while let Some(row) = next_row(&mut rows, "load_catalog").await? {
            match row_to_entry(&row) {
                Ok(Some(entry)) if !seen.insert(entry.stream) => {
                    debug!(stream = %entry.stream, "Ignoring repeated financials row");
                }
                Ok(Some(mut entry)) => {
                    entry.careers = careers.remove(&entry.stream).unwrap_or_default();
                    entries.push(entry);
                }
                Ok(None) => {}
                Err(e) => warn!("Skipping catalog row: {e}"),
            }
        }

        let catalog = Catalog::from_entries(entries);
        info!(streams = catalog.len(), "Catalog loaded");
        Ok(catalog)
    }

    async fn load_careers(&self) -> Result<HashMap<StreamLabel, Vec<CareerOutlook>>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                "SELECT stream_name, role, avg_salary FROM jobs ORDER BY stream_name, rowid",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load_careers: {e}")))?;

        let mut careers: HashMap<StreamLabel, Vec<CareerOutlook>> = HashMap::new();
        while let Some(row) = next_row(&mut rows, "load_careers").await? {
            let name: String = match row.get(0) {
                Ok(name) => name,
                Err(e) => {
                    warn!("Skipping job row: {e}");
                    continue;
                }
            };
            let Some(stream) = known_stream(&name) else {
                continue;
            };
            let role: String = row.get(1).unwrap_or_default();
            let salary = row.get::<i64>(2).ok().and_then(|s| u64::try_from(s).ok());
            let Some(average_salary) = salary.filter(|_| !role.is_empty()) else {
                warn!(stream = %stream, "Skipping job row with missing role or salary");
                continue;
            };
            let roles = careers.entry(stream).or_default();
            if roles.iter().any(|c| c.role == role) {
                debug!(stream = %stream, role = %role, "Ignoring repeated job row");
                continue;
            }
            roles.push(CareerOutlook { role, average_salary });
        }
        Ok(careers)
    }
}

/// Advance a row cursor; a failed step is a query error, not the end.
async fn next_row(
    rows: &mut libsql::Rows,
    context: &str,
) -> Result<Option<libsql::Row>, DatabaseError> {
    rows.next()
        .await
        .map_err(|e| DatabaseError::Query(format!("{context}: {e}")))
}

fn known_stream(name: &str) -> Option<StreamLabel> {
    match name.parse() {
        Ok(stream) => Some(stream),
        Err(e) => {
            warn!("Ignoring catalog row: {e}");
            None
        }
    }
}

fn amount(row: &libsql::Row, idx: i32, column: &str) -> Result<u64, String> {
    let value: i64 = row.get(idx).map_err(|e| e.to_string())?;
    u64::try_from(value).map_err(|_| format!("negative {column}: {value}"))
}

/// Map a row to an entry (careers filled in by the caller).
///
/// Column order: 0:name, 1:description, 2:coaching_fee, 3:college_fee_min,
/// 4:college_fee_max
fn row_to_entry(row: &libsql::Row) -> Result<Option<CatalogEntry>, String> {
    let name: String = row.get(0).map_err(|e| e.to_string())?;
    let Some(stream) = known_stream(&name) else {
        return Ok(None);
    };
    Ok(Some(CatalogEntry {
        stream,
        description: row.get(1).map_err(|e| e.to_string())?,
        coaching_fee: amount(row, 2, "coaching_fee")?,
        college_fee_min: amount(row, 3, "college_fee_min")?,
        college_fee_max: amount(row, 4, "college_fee_max")?,
        careers: Vec::new(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_round_trips_builtin_catalog() {
        let store = CatalogStore::new_memory().await.unwrap();
        let catalog = store.load_catalog().await.unwrap();
        let builtin = Catalog::builtin();

        assert_eq!(catalog.len(), builtin.len());
        for stream in StreamLabel::ALL {
            assert_eq!(catalog.lookup(stream), builtin.lookup(stream), "{stream}");
        }
    }

    #[tokio::test]
    async fn local_file_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("career.db");

        {
            let store = CatalogStore::new_local(&path).await.unwrap();
            store
                .conn()
                .execute(
                    "UPDATE financials SET coaching_fee = 1 WHERE stream_name = 'Arts'",
                    (),
                )
                .await
                .unwrap();
        }

        let store = CatalogStore::new_local(&path).await.unwrap();
        let catalog = store.load_catalog().await.unwrap();
        let arts = catalog.lookup(StreamLabel::Arts).unwrap();
        assert_eq!(arts.coaching_fee, 1);
        assert_eq!(arts.min_investment(), 1 + arts.college_fee_min);
    }

    #[tokio::test]
    async fn unknown_stream_rows_are_skipped() {
        let store = CatalogStore::new_memory().await.unwrap();
        store
            .conn()
            .execute_batch(
                "INSERT INTO streams VALUES ('Engineering', 'not a label');
                 INSERT INTO financials VALUES ('Engineering', 1, 2, 3);
                 INSERT INTO jobs VALUES ('Engineering', 'Robot Wrangler', 10);",
            )
            .await
            .unwrap();

        let catalog = store.load_catalog().await.unwrap();
        assert_eq!(catalog.len(), StreamLabel::ALL.len());
    }

    #[tokio::test]
    async fn stream_without_financials_is_a_miss() {
        let store = CatalogStore::new_memory().await.unwrap();
        store
            .conn()
            .execute(
                "DELETE FROM financials WHERE stream_name = 'Science (PCB)'",
                (),
            )
            .await
            .unwrap();

        let catalog = store.load_catalog().await.unwrap();
        assert!(catalog.lookup(StreamLabel::SciencePcb).is_none());
        assert!(catalog.lookup(StreamLabel::SciencePcm).is_some());
    }

    /// Tables and rows exactly as the old setup script leaves them after
    /// running twice: no keys, so every `INSERT OR IGNORE` adds a row.
    const LEGACY_SETUP: &str = "
        CREATE TABLE IF NOT EXISTS streams (name TEXT PRIMARY KEY, description TEXT);
        CREATE TABLE IF NOT EXISTS financials (
            stream_name TEXT, coaching_fee INT, college_fee_min INT, college_fee_max INT,
            FOREIGN KEY(stream_name) REFERENCES streams(name));
        CREATE TABLE IF NOT EXISTS jobs (
            stream_name TEXT, role TEXT, avg_salary INT,
            FOREIGN KEY(stream_name) REFERENCES streams(name));
        INSERT OR IGNORE INTO streams VALUES ('Science (PCM)', 'Engineering, Tech, Physics');
        INSERT OR IGNORE INTO financials VALUES ('Science (PCM)', 200000, 800000, 1500000);
        INSERT OR IGNORE INTO jobs VALUES ('Science (PCM)', 'Software Engineer', 600000);
        INSERT OR IGNORE INTO jobs VALUES ('Science (PCM)', 'Data Scientist', 800000);
        INSERT OR IGNORE INTO streams VALUES ('Arts', 'Humanities, Design, Psychology');
        INSERT OR IGNORE INTO financials VALUES ('Arts', 60000, 300000, 800000);
        INSERT OR IGNORE INTO jobs VALUES ('Arts', 'Graphic Designer', 400000);
        INSERT OR IGNORE INTO jobs VALUES ('Arts', 'Psychologist', 500000);
    ";

    #[tokio::test]
    async fn legacy_file_seeded_twice_keeps_careers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("career.db");
        {
            let db = libsql::Builder::new_local(&path).build().await.unwrap();
            let conn = db.connect().unwrap();
            conn.execute_batch(LEGACY_SETUP).await.unwrap();
            conn.execute_batch(LEGACY_SETUP).await.unwrap();
        }

        let store = CatalogStore::new_local(&path).await.unwrap();
        let catalog = store.load_catalog().await.unwrap();
        assert_eq!(catalog.len(), 2);

        let pcm = catalog.lookup(StreamLabel::SciencePcm).unwrap();
        let roles: Vec<&str> = pcm.careers.iter().map(|c| c.role.as_str()).collect();
        assert_eq!(roles, ["Software Engineer", "Data Scientist"]);
        assert_eq!(pcm.min_investment(), 1_000_000);

        let arts = catalog.lookup(StreamLabel::Arts).unwrap();
        assert_eq!(arts.careers.len(), 2);
    }

    #[tokio::test]
    async fn failed_row_step_is_an_error() {
        let store = CatalogStore::new_memory().await.unwrap();
        let outcome = match store
            .conn()
            .query("SELECT abs(-9223372036854775808)", ())
            .await
        {
            Ok(mut rows) => next_row(&mut rows, "overflow").await.map(|_| ()),
            Err(e) => Err(DatabaseError::Query(e.to_string())),
        };
        assert!(matches!(outcome, Err(DatabaseError::Query(_))));
    }
}
