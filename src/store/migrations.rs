//! Version-tracked migrations for the catalog database.
//!
//! Each migration has a version number and a step. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.
//! A `career.db` created before version tracking (tables exist, no
//! `_migrations` table) is adopted as-is: its data is kept and both versions
//! are recorded without re-seeding.

use libsql::{Connection, params};

use crate::advisor::catalog::builtin_entries;
use crate::error::DatabaseError;

/// What a migration does.
enum Step {
    Sql(&'static str),
    /// Insert the built-in catalog, ignoring rows that already exist.
    SeedBuiltin,
}

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    step: Step,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        step: Step::Sql(
            r#"
            CREATE TABLE IF NOT EXISTS streams (
                name TEXT PRIMARY KEY,
                description TEXT
            );

            CREATE TABLE IF NOT EXISTS financials (
                stream_name TEXT PRIMARY KEY REFERENCES streams(name),
                coaching_fee INTEGER NOT NULL,
                college_fee_min INTEGER NOT NULL,
                college_fee_max INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS jobs (
                stream_name TEXT NOT NULL REFERENCES streams(name),
                role TEXT NOT NULL,
                avg_salary INTEGER NOT NULL,
                UNIQUE (stream_name, role)
            );
            CREATE INDEX IF NOT EXISTS idx_jobs_stream ON jobs(stream_name);
        "#,
        ),
    },
    Migration {
        version: 2,
        name: "seed_builtin_catalog",
        step: Step::SeedBuiltin,
    },
];

/// Run all pending migrations against the given connection.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let mut current_version = get_current_version(conn).await?;

    if current_version == 0 && legacy_tables_exist(conn).await? {
        for migration in MIGRATIONS {
            seed_version(conn, migration.version, migration.name).await?;
        }
        current_version = get_current_version(conn).await?;
        tracing::info!("Unversioned catalog database detected, adopted at V{current_version}");
    }

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            apply(conn, migration).await?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    tracing::info!(
        "Catalog migrations complete (at V{})",
        get_current_version(conn).await?
    );
    Ok(())
}

async fn apply(conn: &Connection, migration: &Migration) -> Result<(), DatabaseError> {
    let fail = |e: libsql::Error| {
        DatabaseError::Migration(format!(
            "Migration V{} ({}) failed: {e}",
            migration.version, migration.name
        ))
    };

    match migration.step {
        Step::Sql(sql) => conn.execute_batch(sql).await.map(|_| ()).map_err(fail),
        Step::SeedBuiltin => {
            for entry in builtin_entries() {
                let stream = entry.stream.as_str();
                conn.execute(
                    "INSERT OR IGNORE INTO streams (name, description) VALUES (?1, ?2)",
                    params![stream, entry.description.as_str()],
                )
                .await
                .map_err(fail)?;
                conn.execute(
                    "INSERT OR IGNORE INTO financials (stream_name, coaching_fee, college_fee_min, college_fee_max)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        stream,
                        to_sql_amount(entry.coaching_fee)?,
                        to_sql_amount(entry.college_fee_min)?,
                        to_sql_amount(entry.college_fee_max)?
                    ],
                )
                .await
                .map_err(fail)?;
                for career in &entry.careers {
                    conn.execute(
                        "INSERT OR IGNORE INTO jobs (stream_name, role, avg_salary) VALUES (?1, ?2, ?3)",
                        params![stream, career.role.as_str(), to_sql_amount(career.average_salary)?],
                    )
                    .await
                    .map_err(fail)?;
                }
            }
            Ok(())
        }
    }
}

fn to_sql_amount(amount: u64) -> Result<i64, DatabaseError> {
    i64::try_from(amount)
        .map_err(|_| DatabaseError::Migration(format!("Amount {amount} does not fit in INTEGER")))
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => row.get(0).map_err(|e| {
            DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
        }),
        None => Ok(0),
    }
}

/// Check if an unversioned `streams` table already exists.
async fn legacy_tables_exist(conn: &Connection) -> Result<bool, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='streams'",
            (),
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("Failed to check legacy tables: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Query(format!("Failed to read legacy check: {e}")))?;

    match row {
        Some(row) => {
            let count: i64 = row.get(0).unwrap_or(0);
            Ok(count > 0)
        }
        None => Ok(false),
    }
}

/// Insert a version record into `_migrations`.
async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}
