//! Per-module migration runner.
//!
//! Each module's history lives in its own table `tenantkit_migrations__<module>__<hash8>`,
//! where `<hash8>` comes from `xxh3_64` of the module name. Migrations are applied in name
//! order, each one together with its history row in a single transaction.
//!
//! Tenant-scoped tables register their isolation policy from inside their migration
//! (see [`crate::secure::migrate::enable_tenant_policy`]), so a module that has been
//! migrated has also been protected.

use sea_orm::{
    ConnectionTrait, DatabaseBackend, DbErr, FromQueryResult, Statement, TransactionTrait,
};
use sea_orm_migration::MigrationTrait;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, info};
use xxhash_rust::xxh3::xxh3_64;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("failed to create migration table for module '{module}': {source}")]
    CreateTable { module: String, source: DbErr },

    #[error("failed to query migration history for module '{module}': {source}")]
    QueryHistory { module: String, source: DbErr },

    #[error("migration '{migration}' failed for module '{module}': {source}")]
    MigrationFailed {
        module: String,
        migration: String,
        source: DbErr,
    },

    #[error("failed to record migration '{migration}' for module '{module}': {source}")]
    RecordFailed {
        module: String,
        migration: String,
        source: DbErr,
    },

    #[error("duplicate migration name '{name}' for module '{module}'")]
    DuplicateMigrationName { module: String, name: String },

    #[error("unsupported database backend for module '{module}'")]
    UnsupportedBackend { module: String },
}

#[derive(Debug, Clone, Default)]
pub struct MigrationResult {
    pub applied: usize,
    pub skipped: usize,
    pub applied_names: Vec<String>,
}

#[derive(Debug, FromQueryResult)]
struct MigrationRecord {
    version: String,
}

fn sanitize_module_name(name: &str) -> String {
    let out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() { "_".to_owned() } else { out }
}

fn migration_table_name(module_name: &str) -> String {
    const PREFIX: &str = "tenantkit_migrations__";
    const SEP: &str = "__";
    const HASH_LEN: usize = 8;
    const PG_IDENT_MAX: usize = 63;

    let sanitized = sanitize_module_name(module_name);
    let hash = format!("{:016x}", xxh3_64(module_name.as_bytes()));

    let max_name_len = PG_IDENT_MAX.saturating_sub(PREFIX.len() + SEP.len() + HASH_LEN);
    let name_part: String = sanitized.chars().take(max_name_len).collect();

    format!("{PREFIX}{name_part}{SEP}{}", &hash[..HASH_LEN])
}

fn history_ddl(backend: DatabaseBackend, table_name: &str) -> Option<String> {
    match backend {
        DatabaseBackend::Postgres => Some(format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{table_name}" (
                version VARCHAR(255) PRIMARY KEY,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        )),
        DatabaseBackend::Sqlite => Some(format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{table_name}" (
                version TEXT PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#
        )),
        DatabaseBackend::MySql => None,
    }
}

async fn ensure_migration_table(
    conn: &impl ConnectionTrait,
    table_name: &str,
    module_name: &str,
) -> Result<(), MigrationError> {
    let backend = conn.get_database_backend();
    let sql = history_ddl(backend, table_name).ok_or_else(|| {
        MigrationError::UnsupportedBackend {
            module: module_name.to_owned(),
        }
    })?;

    conn.execute(Statement::from_string(backend, sql))
        .await
        .map_err(|e| MigrationError::CreateTable {
            module: module_name.to_owned(),
            source: e,
        })?;
    Ok(())
}

async fn get_applied_migrations(
    conn: &impl ConnectionTrait,
    table_name: &str,
    module_name: &str,
) -> Result<HashSet<String>, MigrationError> {
    let backend = conn.get_database_backend();
    let sql = format!(r#"SELECT version FROM "{table_name}""#);

    let records = MigrationRecord::find_by_statement(Statement::from_string(backend, sql))
        .all(conn)
        .await
        .map_err(|e| MigrationError::QueryHistory {
            module: module_name.to_owned(),
            source: e,
        })?;

    Ok(records.into_iter().map(|r| r.version).collect())
}

async fn record_migration(
    conn: &impl ConnectionTrait,
    table_name: &str,
    module_name: &str,
    migration_name: &str,
) -> Result<(), MigrationError> {
    let backend = conn.get_database_backend();
    let sql = format!(r#"INSERT INTO "{table_name}" (version) VALUES ($1)"#);

    conn.execute(Statement::from_sql_and_values(
        backend,
        &sql,
        [migration_name.into()],
    ))
    .await
    .map_err(|e| MigrationError::RecordFailed {
        module: module_name.to_owned(),
        migration: migration_name.to_owned(),
        source: e,
    })?;
    Ok(())
}

/// Apply the pending migrations of one module.
///
/// # Errors
/// Returns `MigrationError` if history cannot be read or a migration fails; a failed
/// migration is rolled back together with its history row.
pub async fn run_migrations_for_module(
    db: &crate::Db,
    module_name: &str,
    migrations: Vec<Box<dyn MigrationTrait>>,
) -> Result<MigrationResult, MigrationError> {
    run_module_migrations(db.sea_internal(), module_name, migrations).await
}

async fn run_module_migrations<C>(
    conn: &C,
    module_name: &str,
    migrations: Vec<Box<dyn MigrationTrait>>,
) -> Result<MigrationResult, MigrationError>
where
    C: ConnectionTrait + TransactionTrait,
{
    if migrations.is_empty() {
        debug!(module = module_name, "No migrations to run");
        return Ok(MigrationResult::default());
    }

    let mut seen = HashSet::new();
    for m in &migrations {
        if !seen.insert(m.name().to_owned()) {
            return Err(MigrationError::DuplicateMigrationName {
                module: module_name.to_owned(),
                name: m.name().to_owned(),
            });
        }
    }

    let table_name = migration_table_name(module_name);
    ensure_migration_table(conn, &table_name, module_name).await?;
    let applied = get_applied_migrations(conn, &table_name, module_name).await?;

    let mut sorted = migrations;
    sorted.sort_by(|a, b| a.name().cmp(b.name()));

    let mut result = MigrationResult::default();

    for migration in sorted {
        let name = migration.name().to_owned();

        if applied.contains(&name) {
            debug!(module = module_name, migration = %name, "Migration already applied, skipping");
            result.skipped += 1;
            continue;
        }

        info!(module = module_name, migration = %name, "Applying migration");

        let failed = |source: DbErr| MigrationError::MigrationFailed {
            module: module_name.to_owned(),
            migration: name.clone(),
            source,
        };

        let txn = conn.begin().await.map_err(failed)?;
        let manager = sea_orm_migration::SchemaManager::new(&txn);
        let res: Result<(), MigrationError> = async {
            migration.up(&manager).await.map_err(failed)?;
            record_migration(&txn, &table_name, module_name, &name).await
        }
        .await;

        match res {
            Ok(()) => txn.commit().await.map_err(failed)?,
            Err(err) => {
                _ = txn.rollback().await;
                return Err(err);
            }
        }

        result.applied += 1;
        result.applied_names.push(name);
    }

    info!(
        module = module_name,
        applied = result.applied,
        skipped = result.skipped,
        "Migration run complete"
    );

    Ok(result)
}

/// Names of migrations not yet applied for a module.
///
/// # Errors
/// Returns `MigrationError::QueryHistory` if the history cannot be read.
pub async fn get_pending_migrations(
    db: &crate::Db,
    module_name: &str,
    migrations: &[Box<dyn MigrationTrait>],
) -> Result<Vec<String>, MigrationError> {
    let conn = db.sea_internal();
    if migrations.is_empty() {
        return Ok(vec![]);
    }

    let table_name = migration_table_name(module_name);
    let backend = conn.get_database_backend();
    let probe = match backend {
        DatabaseBackend::Postgres => Statement::from_sql_and_values(
            backend,
            "SELECT COUNT(*) AS n FROM information_schema.tables WHERE table_name = $1",
            [table_name.as_str().into()],
        ),
        DatabaseBackend::Sqlite => Statement::from_sql_and_values(
            backend,
            "SELECT COUNT(*) AS n FROM sqlite_master WHERE type = 'table' AND name = $1",
            [table_name.as_str().into()],
        ),
        DatabaseBackend::MySql => {
            return Err(MigrationError::UnsupportedBackend {
                module: module_name.to_owned(),
            });
        }
    };
    let history_err = |source: DbErr| MigrationError::QueryHistory {
        module: module_name.to_owned(),
        source,
    };
    let table_exists = conn
        .query_one(probe)
        .await
        .map_err(history_err)?
        .map(|r| r.try_get::<i64>("", "n"))
        .transpose()
        .map_err(history_err)?
        .is_some_and(|n| n > 0);

    if !table_exists {
        return Ok(migrations.iter().map(|m| m.name().to_owned()).collect());
    }

    let applied = get_applied_migrations(conn, &table_name, module_name).await?;
    Ok(migrations
        .iter()
        .filter(|m| !applied.contains(m.name()))
        .map(|m| m.name().to_owned())
        .collect())
}
