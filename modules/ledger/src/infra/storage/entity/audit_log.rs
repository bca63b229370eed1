use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::Serialize;
use tenantkit_db::secure::Scopable;

/// Append-only. `user_id` has no foreign key so entries outlive deleted users.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Scopable, Serialize)]
#[sea_orm(table_name = "audit_logs")]
#[secure(tenant_col = "tenant_id", resource_col = "id")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: String,
    pub user_id: Uuid,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub details: Json,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
