//! Infrastructure: `SeaORM` entities, migrations, repositories and the audit sink.
pub mod storage;
