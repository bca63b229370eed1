//! `SeaORM` entities of the ledger schema.
//!
//! Every table except `tenants` carries a `tenant_id` column; `tenants` is scoped on its own
//! primary key, so a unit of work only ever sees its own tenant row.

pub mod account;
pub mod audit_log;
pub mod budget;
pub mod card;
pub mod category;
pub mod tenant;
pub mod transaction;
pub mod user;
