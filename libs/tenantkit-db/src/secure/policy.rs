//! Startup self-verification of tenant policies.
//!
//! A process must not serve tenant traffic when any tenant-scoped table has lost its
//! isolation policy. [`verify_policies`] checks the `tenant_policies` registry on every
//! backend and, on `PostgreSQL`, the catalog state of row-level security as well.

use sea_orm::{ConnectionTrait, DbBackend, DbErr, FromQueryResult, Statement};

use super::migrate::{POLICY_NAME, POLICY_REGISTRY_TABLE};
use super::Db;

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("tenant isolation policy inactive on: {}", tables.join(", "))]
    Inactive { tables: Vec<String> },

    #[error(transparent)]
    Db(#[from] DbErr),
}

/// Observed protection of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePolicy {
    pub table: String,
    /// `None` when the table is missing from the registry.
    pub tenant_column: Option<String>,
    pub registry_active: bool,
    /// `PostgreSQL` only: `pg_class.relrowsecurity`.
    pub rls_enabled: Option<bool>,
    /// `PostgreSQL` only: `pg_class.relforcerowsecurity`.
    pub rls_forced: Option<bool>,
    /// `PostgreSQL` only: the `tenant_isolation` policy exists.
    pub policy_present: Option<bool>,
}

impl TablePolicy {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.registry_active
            && self.rls_enabled != Some(false)
            && self.rls_forced != Some(false)
            && self.policy_present != Some(false)
    }
}

#[derive(Debug, Clone)]
pub struct PolicyReport {
    pub backend: &'static str,
    pub tables: Vec<TablePolicy>,
}

impl PolicyReport {
    #[must_use]
    pub fn inactive(&self) -> Vec<String> {
        self.tables
            .iter()
            .filter(|t| !t.is_active())
            .map(|t| t.table.clone())
            .collect()
    }
}

#[derive(Debug, FromQueryResult)]
struct RegistryRow {
    table_name: String,
    tenant_column: String,
    policy_active: bool,
}

#[derive(Debug, FromQueryResult)]
struct PgRlsRow {
    relrowsecurity: bool,
    relforcerowsecurity: bool,
    has_policy: bool,
}

async fn registry_exists(conn: &impl ConnectionTrait) -> Result<bool, DbErr> {
    let backend = conn.get_database_backend();
    let stmt = match backend {
        DbBackend::Postgres => Statement::from_sql_and_values(
            backend,
            "SELECT EXISTS (
                 SELECT 1 FROM information_schema.tables
                 WHERE table_schema = current_schema() AND table_name = $1
             ) AS present",
            [POLICY_REGISTRY_TABLE.into()],
        ),
        DbBackend::Sqlite => Statement::from_sql_and_values(
            backend,
            "SELECT COUNT(*) > 0 AS present FROM sqlite_master WHERE type = 'table' AND name = $1",
            [POLICY_REGISTRY_TABLE.into()],
        ),
        DbBackend::MySql => {
            return Err(DbErr::Custom(
                "tenant policy verification: MySQL is not supported".to_owned(),
            ));
        }
    };
    let row = conn.query_one(stmt).await?;
    Ok(row
        .map(|r| r.try_get::<bool>("", "present"))
        .transpose()?
        .unwrap_or(false))
}

async fn pg_rls_state(conn: &impl ConnectionTrait, table: &str) -> Result<Option<PgRlsRow>, DbErr> {
    let stmt = Statement::from_sql_and_values(
        DbBackend::Postgres,
        r"SELECT c.relrowsecurity, c.relforcerowsecurity,
                 EXISTS (
                     SELECT 1 FROM pg_policies p
                     WHERE p.schemaname = n.nspname AND p.tablename = c.relname AND p.policyname = $2
                 ) AS has_policy
          FROM pg_class c
          JOIN pg_namespace n ON n.oid = c.relnamespace
          WHERE c.relname = $1 AND n.nspname = current_schema()",
        [table.into(), POLICY_NAME.into()],
    );
    PgRlsRow::find_by_statement(stmt).one(conn).await
}

/// Verify that every table in `expected` is protected.
///
/// # Errors
/// - `PolicyError::Inactive` listing the tables without an active policy
/// - `PolicyError::Db` if the checks cannot be run
pub async fn verify_policies(db: &Db, expected: &[&str]) -> Result<PolicyReport, PolicyError> {
    let conn = db.sea_internal();
    let backend = conn.get_database_backend();

    let registry: Vec<RegistryRow> = if registry_exists(conn).await? {
        RegistryRow::find_by_statement(Statement::from_string(
            backend,
            format!(
                r#"SELECT table_name, tenant_column, policy_active FROM "{POLICY_REGISTRY_TABLE}""#
            ),
        ))
        .all(conn)
        .await?
    } else {
        Vec::new()
    };

    let mut tables = Vec::with_capacity(expected.len());
    for &table in expected {
        let entry = registry.iter().find(|r| r.table_name == table);
        let mut observed = TablePolicy {
            table: table.to_owned(),
            tenant_column: entry.map(|r| r.tenant_column.clone()),
            registry_active: entry.is_some_and(|r| r.policy_active),
            rls_enabled: None,
            rls_forced: None,
            policy_present: None,
        };

        if backend == DbBackend::Postgres {
            let state = pg_rls_state(conn, table).await?;
            observed.rls_enabled = Some(state.as_ref().is_some_and(|s| s.relrowsecurity));
            observed.rls_forced = Some(state.as_ref().is_some_and(|s| s.relforcerowsecurity));
            observed.policy_present = Some(state.as_ref().is_some_and(|s| s.has_policy));
        }

        if observed.is_active() {
            tracing::debug!(table, "tenant policy active");
        } else {
            tracing::warn!(
                table,
                registry_active = observed.registry_active,
                rls_enabled = ?observed.rls_enabled,
                rls_forced = ?observed.rls_forced,
                policy_present = ?observed.policy_present,
                "tenant policy inactive"
            );
        }
        tables.push(observed);
    }

    let report = PolicyReport {
        backend: db.db_engine(),
        tables,
    };
    let inactive = report.inactive();
    if !inactive.is_empty() {
        return Err(PolicyError::Inactive { tables: inactive });
    }
    tracing::info!(
        backend = report.backend,
        tables = report.tables.len(),
        "tenant policies verified"
    );
    Ok(report)
}
