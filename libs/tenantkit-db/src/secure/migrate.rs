//! Migration helpers for tenant-scoped tables.
//!
//! A tenant-scoped table is created by an ordinary `SeaORM` migration and then registered
//! with [`enable_tenant_policy`]:
//!
//! ```rust,ignore
//! manager.create_table(
//!     Table::create()
//!         .table(Accounts::Table)
//!         .col(ColumnDef::new(Accounts::Id).uuid().not_null().primary_key())
//!         .col(ColumnDef::new(Accounts::TenantId).string().not_null())
//!         // ...
//!         .to_owned(),
//! ).await?;
//! manager.create_index(
//!     Index::create()
//!         .name("idx_accounts_tenant")
//!         .table(Accounts::Table)
//!         .col(Accounts::TenantId)
//!         .to_owned(),
//! ).await?;
//! enable_tenant_policy(manager, "accounts", "tenant_id").await?;
//! ```
//!
//! Unique keys of tenant-scoped tables lead with the tenant column
//! (`uk_{table}_tenant_{col}`), so uniqueness never spans tenants.
//!
//! On `PostgreSQL` this installs row-level security:
//!
//! ```sql
//! ALTER TABLE accounts ENABLE ROW LEVEL SECURITY;
//! ALTER TABLE accounts FORCE ROW LEVEL SECURITY;
//! CREATE POLICY tenant_isolation ON accounts
//!     USING (tenant_id = current_setting('app.current_tenant', true))
//!     WITH CHECK (tenant_id = current_setting('app.current_tenant', true));
//! ```
//!
//! An unset setting reads as `NULL`, which matches no row. Every backend records the table
//! in the `tenant_policies` registry checked by [`super::policy::verify_policies`].

use sea_orm::{ConnectionTrait, DbBackend, DbErr, Statement};
use sea_orm_migration::SchemaManager;

use super::TENANT_SETTING;

/// Registry of tables protected by a tenant policy.
pub const POLICY_REGISTRY_TABLE: &str = "tenant_policies";

/// Name of the row-level security policy on every tenant-scoped table.
pub const POLICY_NAME: &str = "tenant_isolation";

const PG_IDENT_MAX: usize = 63;

/// Identifiers are interpolated into DDL, so only plain lowercase names are accepted.
fn check_ident(ident: &str) -> Result<(), DbErr> {
    let mut chars = ident.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid_start && valid_rest && ident.len() <= PG_IDENT_MAX {
        Ok(())
    } else {
        Err(DbErr::Custom(format!("invalid identifier for tenant policy: {ident:?}")))
    }
}

fn registry_ddl(backend: DbBackend) -> Result<String, DbErr> {
    match backend {
        DbBackend::Postgres => Ok(format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{POLICY_REGISTRY_TABLE}" (
                table_name VARCHAR(63) PRIMARY KEY,
                tenant_column VARCHAR(63) NOT NULL,
                policy_active BOOLEAN NOT NULL,
                installed_at TIMESTAMPTZ NOT NULL
            )
            "#
        )),
        DbBackend::Sqlite => Ok(format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{POLICY_REGISTRY_TABLE}" (
                table_name TEXT PRIMARY KEY,
                tenant_column TEXT NOT NULL,
                policy_active BOOLEAN NOT NULL,
                installed_at TEXT NOT NULL
            )
            "#
        )),
        DbBackend::MySql => Err(DbErr::Custom(
            "tenant policy registry: MySQL is not supported".to_owned(),
        )),
    }
}

/// Create the registry table if it does not exist yet.
///
/// # Errors
/// Returns `DbErr` if the DDL fails or the backend is not supported.
pub async fn ensure_policy_registry(conn: &impl ConnectionTrait) -> Result<(), DbErr> {
    let backend = conn.get_database_backend();
    conn.execute(Statement::from_string(backend, registry_ddl(backend)?))
        .await?;
    Ok(())
}

fn rls_enable_statements(table: &str, tenant_column: &str) -> Vec<String> {
    let predicate = format!(r#""{tenant_column}" = current_setting('{TENANT_SETTING}', true)"#);
    vec![
        format!(r#"ALTER TABLE "{table}" ENABLE ROW LEVEL SECURITY"#),
        format!(r#"ALTER TABLE "{table}" FORCE ROW LEVEL SECURITY"#),
        format!(r#"DROP POLICY IF EXISTS {POLICY_NAME} ON "{table}""#),
        format!(
            r#"CREATE POLICY {POLICY_NAME} ON "{table}" USING ({predicate}) WITH CHECK ({predicate})"#
        ),
    ]
}

fn rls_disable_statements(table: &str) -> Vec<String> {
    vec![
        format!(r#"DROP POLICY IF EXISTS {POLICY_NAME} ON "{table}""#),
        format!(r#"ALTER TABLE "{table}" NO FORCE ROW LEVEL SECURITY"#),
        format!(r#"ALTER TABLE "{table}" DISABLE ROW LEVEL SECURITY"#),
    ]
}

async fn upsert_registry(
    conn: &impl ConnectionTrait,
    table: &str,
    tenant_column: &str,
    active: bool,
) -> Result<(), DbErr> {
    let backend = conn.get_database_backend();
    let sql = format!(
        r#"INSERT INTO "{POLICY_REGISTRY_TABLE}" (table_name, tenant_column, policy_active, installed_at)
           VALUES ($1, $2, $3, $4)
           ON CONFLICT (table_name) DO UPDATE SET
               tenant_column = excluded.tenant_column,
               policy_active = excluded.policy_active,
               installed_at = excluded.installed_at"#
    );
    conn.execute(Statement::from_sql_and_values(
        backend,
        &sql,
        [
            table.into(),
            tenant_column.into(),
            active.into(),
            chrono::Utc::now().into(),
        ],
    ))
    .await?;
    Ok(())
}

/// Protect `table` by its `tenant_column` and record it as active.
///
/// Idempotent: re-running replaces the policy and refreshes the registry row.
///
/// # Errors
/// Returns `DbErr` on invalid identifiers or failing DDL.
pub async fn enable_tenant_policy(
    manager: &SchemaManager<'_>,
    table: &str,
    tenant_column: &str,
) -> Result<(), DbErr> {
    check_ident(table)?;
    check_ident(tenant_column)?;

    let conn = manager.get_connection();
    ensure_policy_registry(conn).await?;

    if manager.get_database_backend() == DbBackend::Postgres {
        for sql in rls_enable_statements(table, tenant_column) {
            conn.execute_unprepared(&sql).await?;
        }
    }
    upsert_registry(conn, table, tenant_column, true).await?;
    tracing::info!(table, tenant_column, "tenant policy enabled");
    Ok(())
}

/// Remove the policy from `table` and mark it inactive. Used by `down` migrations.
///
/// # Errors
/// Returns `DbErr` on invalid identifiers or failing DDL.
pub async fn disable_tenant_policy(
    manager: &SchemaManager<'_>,
    table: &str,
    tenant_column: &str,
) -> Result<(), DbErr> {
    check_ident(table)?;
    check_ident(tenant_column)?;

    let conn = manager.get_connection();
    ensure_policy_registry(conn).await?;

    if manager.get_database_backend() == DbBackend::Postgres {
        for sql in rls_disable_statements(table) {
            conn.execute_unprepared(&sql).await?;
        }
    }
    upsert_registry(conn, table, tenant_column, false).await?;
    tracing::warn!(table, "tenant policy disabled");
    Ok(())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_restricted() {
        assert!(check_ident("accounts").is_ok());
        assert!(check_ident("audit_logs").is_ok());
        assert!(check_ident("_t1").is_ok());
        assert!(check_ident("").is_err());
        assert!(check_ident("1abc").is_err());
        assert!(check_ident("Accounts").is_err());
        assert!(check_ident(r#"x"; DROP TABLE y; --"#).is_err());
        assert!(check_ident(&"a".repeat(64)).is_err());
    }

    #[test]
    fn rls_policy_compares_against_session_setting() {
        let stmts = rls_enable_statements("accounts", "tenant_id");
        assert_eq!(stmts.len(), 4);
        assert!(stmts[1].contains("FORCE ROW LEVEL SECURITY"));
        let create = &stmts[3];
        assert!(create.starts_with("CREATE POLICY tenant_isolation"), "{create}");
        assert!(
            create.contains(r#"USING ("tenant_id" = current_setting('app.current_tenant', true))"#),
            "{create}"
        );
        assert!(create.contains("WITH CHECK ("), "{create}");
    }

    #[test]
    fn registry_ddl_rejects_mysql() {
        assert!(registry_ddl(DbBackend::Sqlite).is_ok());
        assert!(registry_ddl(DbBackend::Postgres).is_ok());
        assert!(registry_ddl(DbBackend::MySql).is_err());
    }
}
