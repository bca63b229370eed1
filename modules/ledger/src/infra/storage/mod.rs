//! Storage layer.
//!
//! - `entity/` - `SeaORM` entities, one per table
//! - `migrations/` - schema plus tenant policies
//! - `repos` - the per-entity [`tenantkit_db::secure::TenantRepo`] instances every service uses
//! - `transactions_query` - search filters and aggregate shapes for transactions
//! - `audit_sea_sink` - the database-backed audit sink

pub mod audit_sea_sink;
pub mod db;
pub mod entity;
pub mod migrations;
pub mod repos;
pub mod transactions_query;
