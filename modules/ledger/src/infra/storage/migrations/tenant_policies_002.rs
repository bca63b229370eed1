use sea_orm_migration::prelude::*;
use tenantkit_db::secure::migrate::{disable_tenant_policy, enable_tenant_policy};

use super::TENANT_SCOPED;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for (table, column) in TENANT_SCOPED {
            enable_tenant_policy(manager, table, column).await?;
        }
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for (table, column) in TENANT_SCOPED.iter().rev() {
            disable_tenant_policy(manager, table, column).await?;
        }
        Ok(())
    }
}
