#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::{Arc, Mutex};

use common::{FOLDERS, NOTES, TABLES, ctx, folder, migrated_memdb, new_note, note, seed_note};
use sea_orm::sea_query::{Alias, Expr, Func, SimpleExpr};
use sea_orm::{Condition, DbErr, FromQueryResult, Set};
use sea_orm_migration::{MigrationName, MigrationTrait, SchemaManager};
use tenantkit_db::migration_runner::run_migrations_for_module;
use tenantkit_db::secure::migrate::{disable_tenant_policy, enable_tenant_policy};
use tenantkit_db::secure::policy::{PolicyError, verify_policies};
use tenantkit_db::secure::{RepoError, SecurityContext, TenantContextStore};
use tenantkit_db::DbError;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
enum TestError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("boom")]
    Boom,
}

#[tokio::test]
async fn context_is_cleared_after_commit_and_rollback() {
    let db = migrated_memdb().await;

    let uow = db.begin_unit_of_work(&ctx("t1")).await.unwrap();
    let store = uow.context_handle();
    assert_eq!(store.get_context(), "t1");
    uow.commit().await.unwrap();
    assert!(store.is_empty());

    let uow = db.begin_unit_of_work(&ctx("t1")).await.unwrap();
    let store = uow.context_handle();
    uow.rollback().await.unwrap();
    assert!(store.is_empty());
}

#[tokio::test]
async fn context_is_cleared_when_unit_is_dropped() {
    let db = migrated_memdb().await;

    let uow = db.begin_unit_of_work(&ctx("t1")).await.unwrap();
    let store = uow.context_handle();
    drop(uow);
    assert!(store.is_empty());
}

#[tokio::test]
async fn failed_closure_rolls_back_and_clears_context() {
    let db = migrated_memdb().await;
    let seen: Arc<Mutex<Option<Arc<TenantContextStore>>>> = Arc::default();
    let id = Uuid::new_v4();

    let slot = Arc::clone(&seen);
    let res: Result<(), TestError> = db
        .with_unit_of_work(&ctx("t1"), move |uow| {
            Box::pin(async move {
                *slot.lock().unwrap() = Some(uow.context_handle());
                let mut am = new_note("t1", "draft", 10);
                am.id = Set(id);
                NOTES.create(uow, am).await?;
                Err(TestError::Boom)
            })
        })
        .await;
    assert!(matches!(res, Err(TestError::Boom)));

    let store = seen.lock().unwrap().take().unwrap();
    assert!(store.is_empty());

    let uow = db.begin_unit_of_work(&ctx("t1")).await.unwrap();
    assert!(NOTES.find_by_id(&uow, id).await.unwrap().is_none());
    uow.commit().await.unwrap();
}

#[tokio::test]
async fn successful_closure_commits() {
    let db = migrated_memdb().await;

    let created: note::Model = db
        .with_unit_of_work(&ctx("t1"), |uow| {
            Box::pin(async move {
                Ok::<_, TestError>(NOTES.create(uow, new_note("t1", "kept", 5)).await?)
            })
        })
        .await
        .unwrap();

    let uow = db.begin_unit_of_work(&ctx("t1")).await.unwrap();
    assert_eq!(NOTES.get(&uow, created.id).await.unwrap().body, "kept");
    uow.commit().await.unwrap();
}

#[tokio::test]
async fn plain_connection_is_refused_inside_unit_of_work() {
    let db = migrated_memdb().await;
    assert!(db.conn().is_ok());

    let inner = db.clone();
    let refused = db
        .with_unit_of_work(&ctx("t1"), move |_uow| {
            Box::pin(async move {
                Ok::<_, TestError>(matches!(inner.conn(), Err(DbError::ConnRequestedInsideTx)))
            })
        })
        .await
        .unwrap();
    assert!(refused);
}

#[tokio::test]
async fn switching_tenant_replaces_visibility() {
    let db = migrated_memdb().await;
    let a = seed_note(&db, "t1", "a", 1).await;
    let b = seed_note(&db, "t2", "b", 2).await;

    let uow = db.begin_unit_of_work(&ctx("t1")).await.unwrap();
    let seen: Vec<Uuid> = NOTES
        .find_many(&uow, Condition::all())
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.id)
        .collect();
    assert_eq!(seen, vec![a.id]);

    uow.switch_tenant("t2").await.unwrap();
    assert_eq!(uow.tenant_id(), "t2");
    let seen: Vec<Uuid> = NOTES
        .find_many(&uow, Condition::all())
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.id)
        .collect();
    assert_eq!(seen, vec![b.id]);
    uow.commit().await.unwrap();
}

#[tokio::test]
async fn savepoint_rollback_keeps_parent_usable() {
    let db = migrated_memdb().await;

    let uow = db.begin_unit_of_work(&ctx("t1")).await.unwrap();
    let kept = NOTES.create(&uow, new_note("t1", "kept", 1)).await.unwrap();

    let sp = uow.savepoint().await.unwrap();
    assert!(sp.is_nested());
    let dropped = NOTES.create(&sp, new_note("t1", "dropped", 2)).await.unwrap();
    sp.rollback().await.unwrap();

    assert_eq!(uow.tenant_id(), "t1");
    assert!(NOTES.find_by_id(&uow, kept.id).await.unwrap().is_some());
    assert!(NOTES.find_by_id(&uow, dropped.id).await.unwrap().is_none());
    NOTES.create(&uow, new_note("t1", "after", 3)).await.unwrap();
    uow.commit().await.unwrap();

    let uow = db.begin_unit_of_work(&ctx("t1")).await.unwrap();
    assert_eq!(NOTES.count(&uow, Condition::all()).await.unwrap(), 2);
    uow.commit().await.unwrap();
}

#[tokio::test]
async fn empty_context_reads_nothing_and_cannot_write() {
    let db = migrated_memdb().await;
    seed_note(&db, "t1", "a", 1).await;

    let uow = db
        .begin_unit_of_work(&SecurityContext::anonymous())
        .await
        .unwrap();
    assert!(uow.context_store().is_empty());
    assert!(NOTES.find_many(&uow, Condition::all()).await.unwrap().is_empty());
    assert_eq!(NOTES.count(&uow, Condition::all()).await.unwrap(), 0);

    let err = NOTES.create(&uow, new_note("t1", "x", 1)).await.unwrap_err();
    assert!(matches!(err, RepoError::ContextMissing));
    let err = NOTES.delete_where(&uow, Condition::all()).await.unwrap_err();
    assert!(matches!(err, RepoError::ContextMissing));
    uow.rollback().await.unwrap();
}

#[tokio::test]
async fn foreign_rows_look_missing() {
    let db = migrated_memdb().await;
    let foreign = seed_note(&db, "t2", "theirs", 7).await;

    let uow = db.begin_unit_of_work(&ctx("t1")).await.unwrap();
    assert!(matches!(
        NOTES.get(&uow, foreign.id).await.unwrap_err(),
        RepoError::NotFound
    ));
    assert!(!NOTES.exists_in_tenant(&uow, foreign.id).await.unwrap());

    let patch = note::ActiveModel {
        body: Set("mine now".to_owned()),
        ..Default::default()
    };
    assert!(matches!(
        NOTES.update(&uow, foreign.id, patch).await.unwrap_err(),
        RepoError::NotFound
    ));
    assert!(matches!(
        NOTES.delete(&uow, foreign.id).await.unwrap_err(),
        RepoError::NotFound
    ));
    assert!(matches!(
        NOTES.delete(&uow, Uuid::new_v4()).await.unwrap_err(),
        RepoError::NotFound
    ));
    uow.commit().await.unwrap();

    let uow = db.begin_unit_of_work(&ctx("t2")).await.unwrap();
    assert_eq!(NOTES.get(&uow, foreign.id).await.unwrap().body, "theirs");
    uow.commit().await.unwrap();
}

#[tokio::test]
async fn foreign_tenant_insert_is_denied() {
    let db = migrated_memdb().await;

    let uow = db.begin_unit_of_work(&ctx("t1")).await.unwrap();
    let err = NOTES.create(&uow, new_note("t2", "smuggled", 1)).await.unwrap_err();
    assert!(matches!(err, RepoError::Denied(_)));
    uow.rollback().await.unwrap();
}

#[tokio::test]
async fn tenant_column_is_immutable() {
    let db = migrated_memdb().await;
    let own = seed_note(&db, "t1", "mine", 1).await;

    let uow = db.begin_unit_of_work(&ctx("t1")).await.unwrap();
    let patch = note::ActiveModel {
        tenant_id: Set("t2".to_owned()),
        body: Set("moved".to_owned()),
        ..Default::default()
    };
    assert!(matches!(
        NOTES.update(&uow, own.id, patch).await.unwrap_err(),
        RepoError::Denied(_)
    ));

    let err = NOTES
        .update_many(
            &uow,
            &[own.id],
            vec![(note::Column::TenantId, Expr::value("t2"))],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::Denied(_)));

    let patch = note::ActiveModel {
        body: Set("edited".to_owned()),
        ..Default::default()
    };
    let updated = NOTES.update(&uow, own.id, patch).await.unwrap();
    assert_eq!(updated.body, "edited");
    assert_eq!(updated.tenant_id, "t1");
    uow.commit().await.unwrap();
}

#[tokio::test]
async fn bulk_writes_only_touch_own_rows() {
    let db = migrated_memdb().await;
    let a = seed_note(&db, "t1", "a", 1).await;
    let b = seed_note(&db, "t1", "b", 2).await;
    let theirs = seed_note(&db, "t2", "c", 3).await;
    let ids = [a.id, b.id, theirs.id, Uuid::new_v4()];

    let uow = db.begin_unit_of_work(&ctx("t1")).await.unwrap();
    let touched = NOTES
        .update_many(&uow, &ids, vec![(note::Column::Amount, Expr::value(100_i64))])
        .await
        .unwrap();
    assert_eq!(touched, 2);
    assert_eq!(NOTES.delete_many(&uow, &ids).await.unwrap(), 2);
    uow.commit().await.unwrap();

    let uow = db.begin_unit_of_work(&ctx("t2")).await.unwrap();
    let survivor = NOTES.get(&uow, theirs.id).await.unwrap();
    assert_eq!(survivor.amount, 3);
    uow.commit().await.unwrap();
}

#[tokio::test]
async fn create_many_reports_rejected_positions() {
    let db = migrated_memdb().await;

    let uow = db.begin_unit_of_work(&ctx("t1")).await.unwrap();
    let outcome = NOTES
        .create_many(
            &uow,
            vec![
                new_note("t1", "one", 1),
                new_note("t2", "foreign", 2),
                new_note("t1", "two", 3),
            ],
        )
        .await
        .unwrap();
    assert_eq!(outcome.inserted_count(), 2);
    assert_eq!(outcome.rejected, vec![1]);
    uow.commit().await.unwrap();
}

#[tokio::test]
async fn joined_rows_are_scoped_on_both_sides() {
    let db = migrated_memdb().await;

    let uow = db.begin_unit_of_work(&ctx("t2")).await.unwrap();
    let foreign_folder = FOLDERS
        .create(
            &uow,
            folder::ActiveModel {
                id: Set(Uuid::new_v4()),
                tenant_id: Set("t2".to_owned()),
                name: Set("theirs".to_owned()),
            },
        )
        .await
        .unwrap();
    uow.commit().await.unwrap();

    let uow = db.begin_unit_of_work(&ctx("t1")).await.unwrap();
    let own_folder = FOLDERS
        .create(
            &uow,
            folder::ActiveModel {
                id: Set(Uuid::new_v4()),
                tenant_id: Set("t1".to_owned()),
                name: Set("mine".to_owned()),
            },
        )
        .await
        .unwrap();

    let mut filed = new_note("t1", "filed", 1);
    filed.folder_id = Set(Some(own_folder.id));
    let filed = NOTES.create(&uow, filed).await.unwrap();

    // The storage layer alone does not reject a foreign reference; the join must hide it.
    let mut dangling = new_note("t1", "dangling", 1);
    dangling.folder_id = Set(Some(foreign_folder.id));
    NOTES.create(&uow, dangling).await.unwrap();

    let joined = NOTES
        .select(&uow)
        .inner_join_scoped::<folder::Entity>(&uow.scope())
        .all(&uow)
        .await
        .unwrap();
    assert_eq!(joined.len(), 1);
    assert_eq!(joined[0].id, filed.id);
    uow.commit().await.unwrap();
}

#[derive(Debug, FromQueryResult)]
struct BodyTotal {
    body: String,
    total: i64,
    n: i64,
}

#[tokio::test]
async fn aggregates_range_over_current_tenant() {
    let db = migrated_memdb().await;
    seed_note(&db, "t1", "rent", 100).await;
    seed_note(&db, "t1", "rent", 50).await;
    seed_note(&db, "t1", "food", 7).await;
    seed_note(&db, "t2", "rent", 10_000).await;

    let uow = db.begin_unit_of_work(&ctx("t1")).await.unwrap();
    let mut rows: Vec<BodyTotal> = NOTES
        .aggregate(&uow, Condition::all(), |q| {
            q.select_only()
                .column(note::Column::Body)
                .column_as(
                    SimpleExpr::from(Func::cast_as(
                        Func::sum(Expr::col((note::Entity, note::Column::Amount))),
                        Alias::new("bigint"),
                    )),
                    "total",
                )
                .column_as(Expr::col((note::Entity, note::Column::Id)).count(), "n")
                .group_by(note::Column::Body)
        })
        .await
        .unwrap();
    rows.sort_by(|a, b| a.body.cmp(&b.body));

    assert_eq!(rows.len(), 2);
    assert_eq!((rows[0].body.as_str(), rows[0].total, rows[0].n), ("food", 7, 1));
    assert_eq!((rows[1].body.as_str(), rows[1].total, rows[1].n), ("rent", 150, 2));
    uow.commit().await.unwrap();
}

#[tokio::test]
async fn hostile_tenant_ids_match_nothing() {
    let db = migrated_memdb().await;
    seed_note(&db, "t1", "a", 1).await;

    for hostile in ["t1' OR '1'='1", "%", "t_", "t1\"; DROP TABLE notes; --"] {
        let uow = db.begin_unit_of_work(&ctx(hostile)).await.unwrap();
        assert!(
            NOTES.find_many(&uow, Condition::all()).await.unwrap().is_empty(),
            "{hostile}"
        );
        uow.rollback().await.unwrap();
    }

    let uow = db.begin_unit_of_work(&ctx("t1")).await.unwrap();
    assert_eq!(NOTES.count(&uow, Condition::all()).await.unwrap(), 1);
    uow.commit().await.unwrap();
}

#[tokio::test]
async fn search_text_wildcards_are_literal() {
    let db = migrated_memdb().await;
    seed_note(&db, "t1", "50%_off", 1).await;
    seed_note(&db, "t1", "5000 offers", 2).await;

    let uow = db.begin_unit_of_work(&ctx("t1")).await.unwrap();
    let hits = NOTES
        .find_many(
            &uow,
            Condition::all().add(tenantkit_db::secure::like_contains(note::Column::Body, "0%_o")),
        )
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].body, "50%_off");
    uow.commit().await.unwrap();
}

#[tokio::test]
async fn policies_verify_after_migration() {
    let db = migrated_memdb().await;
    let report = verify_policies(&db, TABLES).await.unwrap();
    assert_eq!(report.backend, "sqlite");
    assert!(report.tables.iter().all(|t| t.is_active()));
    assert_eq!(report.tables[0].tenant_column.as_deref(), Some("tenant_id"));
}

#[tokio::test]
async fn unregistered_table_fails_verification() {
    let db = migrated_memdb().await;
    let err = verify_policies(&db, &["notes", "ghosts"]).await.unwrap_err();
    match err {
        PolicyError::Inactive { tables } => assert_eq!(tables, vec!["ghosts".to_owned()]),
        other => panic!("unexpected: {other}"),
    }
}

struct DropNotesPolicy;

impl MigrationName for DropNotesPolicy {
    fn name(&self) -> &str {
        "m002_drop_notes_policy"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for DropNotesPolicy {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        disable_tenant_policy(manager, "notes", "tenant_id").await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        enable_tenant_policy(manager, "notes", "tenant_id").await
    }
}

#[tokio::test]
async fn disabled_policy_fails_verification() {
    let db = migrated_memdb().await;
    run_migrations_for_module(&db, "notes_test", vec![Box::new(DropNotesPolicy)])
        .await
        .unwrap();
    let err = verify_policies(&db, TABLES).await.unwrap_err();
    assert!(matches!(err, PolicyError::Inactive { ref tables } if tables == &["notes".to_owned()]));
}

#[tokio::test]
async fn fresh_database_has_no_active_policies() {
    let db = common::memdb().await;
    let err = verify_policies(&db, TABLES).await.unwrap_err();
    assert!(matches!(err, PolicyError::Inactive { ref tables } if tables.len() == 2));
}
