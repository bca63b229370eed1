#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{TwoTenants, account, book, category, expense, onboard, service, two_tenants};
use futures::future::join_all;
use ledger::infra::storage::repos::TRANSACTIONS;
use ledger::models::{
    AccountKind, ActivationOutcome, CardStatus, NewAccount, NewBudget, NewCard, NewCategory,
    NewTransaction, NewUser, TransactionPatch, TransactionQuery,
};
use ledger::{ConstraintKind, DomainError};
use sea_orm::Condition;
use tenantkit_security::SecurityContext;
use uuid::Uuid;

fn all() -> TransactionQuery {
    TransactionQuery::default()
}

fn ids<T>(rows: &[T], id: impl Fn(&T) -> Uuid) -> Vec<Uuid> {
    rows.iter().map(id).collect()
}

#[tokio::test]
async fn each_tenant_reads_only_its_own_transactions() {
    let TwoTenants { svc, a, b, t1, t2, .. } = two_tenants().await;

    let seen_a = svc.search_transactions(&a.ctx, all()).await.unwrap();
    assert_eq!(seen_a, vec![t1.clone()]);
    let seen_b = svc.search_transactions(&b.ctx, all()).await.unwrap();
    assert_eq!(seen_b, vec![t2]);

    let nobody = SecurityContext::anonymous();
    assert!(svc.search_transactions(&nobody, all()).await.unwrap().is_empty());

    assert_eq!(svc.get_transaction(&a.ctx, t1.id).await.unwrap(), t1);
}

#[tokio::test]
async fn aggregates_and_joins_range_over_own_rows() {
    let TwoTenants {
        svc,
        a,
        b,
        a_account,
        b_account,
        ..
    } = two_tenants().await;
    book(&svc, &a, expense(&a_account, 50, "A2")).await;
    book(&svc, &b, expense(&b_account, 10_000, "B2")).await;

    let stats = svc.transaction_stats(&a.ctx, all()).await.unwrap();
    assert_eq!(stats.count, 2);
    assert_eq!(stats.sum_cents, 150);
    assert_eq!(stats.avg_cents, Some(75));
    assert_eq!((stats.min_cents, stats.max_cents), (Some(50), Some(100)));

    let totals = svc.totals_by_category(&a.ctx).await.unwrap();
    assert_eq!(totals.len(), 1);
    assert_eq!((totals[0].total_cents, totals[0].count), (150, 2));

    let accounts = svc.list_accounts(&a.ctx, None).await.unwrap();
    assert_eq!(ids(&accounts, |x| x.id), vec![a_account.id]);

    let audit = svc.list_audit_log(&a.ctx, None).await.unwrap();
    assert!(!audit.is_empty());
    assert!(audit.iter().all(|e| e.tenant_id == a.id()));

    let me = svc.current_tenant(&a.ctx).await.unwrap();
    assert_eq!(me.id, a.id());
}

#[tokio::test]
async fn foreign_rows_look_missing_to_writers() {
    let TwoTenants {
        svc,
        a,
        b,
        b_account,
        t2,
        ..
    } = two_tenants().await;

    let patch = TransactionPatch {
        description: Some("hack".to_owned()),
        ..TransactionPatch::default()
    };
    let foreign = svc.update_transaction(&a.ctx, t2.id, patch.clone()).await.unwrap_err();
    let missing = svc
        .update_transaction(&a.ctx, Uuid::new_v4(), patch)
        .await
        .unwrap_err();
    assert!(matches!(foreign, DomainError::NotFound { entity: "transaction" }));
    assert_eq!(foreign.to_string(), missing.to_string());

    assert!(matches!(
        svc.delete_transaction(&a.ctx, t2.id).await.unwrap_err(),
        DomainError::NotFound { .. }
    ));
    assert!(matches!(
        svc.rename_account(&a.ctx, b_account.id, "mine".to_owned())
            .await
            .unwrap_err(),
        DomainError::NotFound { entity: "account" }
    ));
    assert!(matches!(
        svc.delete_account(&a.ctx, b_account.id).await.unwrap_err(),
        DomainError::NotFound { entity: "account" }
    ));
    assert!(matches!(
        svc.delete_user(&a.ctx, b.owner.id).await.unwrap_err(),
        DomainError::NotFound { entity: "user" }
    ));

    assert_eq!(svc.get_transaction(&b.ctx, t2.id).await.unwrap(), t2);
    assert_eq!(svc.get_account(&b.ctx, b_account.id).await.unwrap(), b_account);
    assert_eq!(svc.list_users(&b.ctx).await.unwrap().len(), 1);
}

#[tokio::test]
async fn tenant_of_a_row_never_changes() {
    let TwoTenants { svc, a, b, t1, .. } = two_tenants().await;

    let err = svc
        .update_transaction(
            &a.ctx,
            t1.id,
            TransactionPatch {
                tenant_id: Some(b.id().to_owned()),
                description: Some("moved".to_owned()),
                ..TransactionPatch::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DomainError::ConstraintViolation {
            kind: ConstraintKind::TenantMismatch
        }
    ));

    let same_tenant = svc
        .update_transaction(
            &a.ctx,
            t1.id,
            TransactionPatch {
                tenant_id: Some(a.id().to_owned()),
                description: Some("renamed".to_owned()),
                ..TransactionPatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(same_tenant.tenant_id, a.id());
    assert_eq!(same_tenant.description, "renamed");
    assert_eq!(svc.search_transactions(&b.ctx, all()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn payload_tenant_is_checked_before_references() {
    let TwoTenants {
        svc,
        a,
        b,
        a_account,
        b_account,
        ..
    } = two_tenants().await;

    for account_id in [a_account.id, b_account.id] {
        let err = svc
            .create_transaction(
                &a.ctx,
                NewTransaction {
                    tenant_id: Some(b.id().to_owned()),
                    account_id,
                    ..expense(&a_account, 50, "smuggled")
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::ConstraintViolation {
                kind: ConstraintKind::TenantMismatch
            }
        ));
    }
    assert_eq!(svc.search_transactions(&b.ctx, all()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn references_into_another_tenant_are_rejected() {
    let TwoTenants {
        svc,
        a,
        b,
        a_account,
        b_account,
        ..
    } = two_tenants().await;
    let b_food = category(&svc, &b, "Food").await;

    let err = svc
        .create_transaction(
            &a.ctx,
            NewTransaction {
                tenant_id: Some(a.id().to_owned()),
                ..expense(&b_account, 50, "A->B")
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DomainError::CrossTenantReference { field: "account_id" }
    ));

    let err = svc
        .create_transaction(
            &a.ctx,
            NewTransaction {
                category_id: Some(b_food.id),
                ..expense(&a_account, 50, "A->B category")
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DomainError::CrossTenantReference { field: "category_id" }
    ));

    let err = svc
        .issue_card(
            &a.ctx,
            NewCard {
                account_id: b_account.id,
                holder_name: "Mallory".to_owned(),
                last4: "4242".to_owned(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DomainError::CrossTenantReference { field: "account_id" }
    ));

    let err = svc
        .create_budget(
            &a.ctx,
            NewBudget {
                category_id: b_food.id,
                name: "food".to_owned(),
                limit_cents: 1_000,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DomainError::CrossTenantReference { field: "category_id" }
    ));

    let err = svc
        .create_account(
            &a.ctx,
            NewAccount {
                user_id: b.owner.id,
                name: "stolen".to_owned(),
                kind: AccountKind::Savings,
                currency: "EUR".to_owned(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DomainError::CrossTenantReference { field: "user_id" }
    ));

    assert_eq!(svc.search_transactions(&a.ctx, all()).await.unwrap().len(), 1);
    assert!(svc.list_cards(&a.ctx).await.unwrap().is_empty());
}

#[tokio::test]
async fn empty_context_reads_nothing_and_writes_nothing() {
    let TwoTenants {
        svc,
        a,
        a_account,
        t1,
        ..
    } = two_tenants().await;
    let nobody = SecurityContext::builder().subject_id(Uuid::new_v4()).build();

    assert!(svc.list_accounts(&nobody, None).await.unwrap().is_empty());
    assert!(svc.list_users(&nobody).await.unwrap().is_empty());
    assert!(svc.list_audit_log(&nobody, None).await.unwrap().is_empty());
    assert!(svc.totals_by_category(&nobody).await.unwrap().is_empty());
    assert_eq!(svc.transaction_stats(&nobody, all()).await.unwrap().count, 0);
    assert!(matches!(
        svc.get_transaction(&nobody, t1.id).await.unwrap_err(),
        DomainError::NotFound { .. }
    ));

    let writes = [
        svc.create_category(
            &nobody,
            NewCategory {
                name: "x".to_owned(),
            },
        )
        .await
        .map(drop),
        svc.create_transaction(&nobody, expense(&a_account, 1, "x"))
            .await
            .map(drop),
        svc.rename_account(&nobody, a_account.id, "x".to_owned())
            .await
            .map(drop),
        svc.delete_transactions(&nobody, vec![t1.id]).await.map(drop),
        svc.bulk_activate_cards(&nobody, vec![Uuid::new_v4()])
            .await
            .map(drop),
        svc.delete_account(&nobody, a_account.id).await,
        svc.offboard_tenant(&nobody).await.map(drop),
    ];
    for res in writes {
        assert!(matches!(res, Err(DomainError::ContextMissing)), "{res:?}");
    }

    assert_eq!(svc.get_transaction(&a.ctx, t1.id).await.unwrap(), t1);
}

#[tokio::test]
async fn writes_for_unknown_tenant_are_rejected() {
    let TwoTenants {
        svc,
        a,
        a_account,
        t1,
        ..
    } = two_tenants().await;
    let ghost = a.ctx.for_tenant("tenant-ghost");

    let writes = [
        svc.create_category(
            &ghost,
            NewCategory {
                name: "x".to_owned(),
            },
        )
        .await
        .map(drop),
        svc.create_account(
            &ghost,
            NewAccount {
                user_id: a.owner.id,
                name: "x".to_owned(),
                kind: AccountKind::Checking,
                currency: "EUR".to_owned(),
            },
        )
        .await
        .map(drop),
        svc.create_transaction(&ghost, expense(&a_account, 1, "x"))
            .await
            .map(drop),
        svc.create_user(
            &ghost,
            NewUser {
                email: "ghost@example.test".to_owned(),
                display_name: "Ghost".to_owned(),
            },
        )
        .await
        .map(drop),
        svc.delete_account(&ghost, a_account.id).await,
    ];
    for res in writes {
        assert!(matches!(res, Err(DomainError::UnknownTenant)), "{res:?}");
    }

    assert!(svc.list_accounts(&ghost, None).await.unwrap().is_empty());
    assert_eq!(svc.get_transaction(&a.ctx, t1.id).await.unwrap(), t1);
    assert_eq!(svc.list_accounts(&a.ctx, None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn hostile_strings_are_inert() {
    let TwoTenants {
        svc,
        a,
        a_account,
        t1,
        ..
    } = two_tenants().await;

    let injection = svc
        .search_transactions(
            &a.ctx,
            TransactionQuery {
                description_contains: Some("'; DROP TABLE transactions; --".to_owned()),
                ..all()
            },
        )
        .await
        .unwrap();
    assert!(injection.is_empty());
    assert_eq!(svc.search_transactions(&a.ctx, all()).await.unwrap(), vec![t1.clone()]);

    let hostile_ctx = a.ctx.for_tenant("tenant-alpha' OR '1'='1");
    assert!(svc.search_transactions(&hostile_ctx, all()).await.unwrap().is_empty());
    assert!(svc.list_users(&hostile_ctx).await.unwrap().is_empty());

    let payload = "<script>alert('x')</script> \u{7}\u{1b}[2J 100% _ \\ \"; --";
    let stored = book(&svc, &a, expense(&a_account, 5, payload)).await;
    let read = svc.get_transaction(&a.ctx, stored.id).await.unwrap();
    assert_eq!(read.description.as_bytes(), payload.as_bytes());

    let percent = svc
        .search_transactions(
            &a.ctx,
            TransactionQuery {
                description_contains: Some("%".to_owned()),
                ..all()
            },
        )
        .await
        .unwrap();
    assert_eq!(ids(&percent, |t| t.id), vec![stored.id]);

    let tagged = svc
        .search_transactions(
            &a.ctx,
            TransactionQuery {
                tags_any: vec!["%".to_owned(), "_".to_owned()],
                ..all()
            },
        )
        .await
        .unwrap();
    assert!(tagged.is_empty());
}

#[tokio::test]
async fn batch_delete_skips_foreign_rows() {
    let TwoTenants { svc, a, b, t1, t2, .. } = two_tenants().await;

    let deleted = svc
        .delete_transactions(&a.ctx, vec![t1.id, t2.id])
        .await
        .unwrap();
    assert_eq!(deleted, 1);
    assert!(matches!(
        svc.get_transaction(&a.ctx, t1.id).await.unwrap_err(),
        DomainError::NotFound { .. }
    ));
    assert_eq!(svc.get_transaction(&b.ctx, t2.id).await.unwrap(), t2);
}

#[tokio::test]
async fn bulk_activation_reports_each_card() {
    let TwoTenants {
        svc,
        a,
        b,
        a_account,
        b_account,
        ..
    } = two_tenants().await;
    let card = |account_id| NewCard {
        account_id,
        holder_name: "Holder".to_owned(),
        last4: "1234".to_owned(),
    };
    let mine = svc.issue_card(&a.ctx, card(a_account.id)).await.unwrap();
    let theirs = svc.issue_card(&b.ctx, card(b_account.id)).await.unwrap();
    let unknown = Uuid::new_v4();

    let outcome = svc
        .bulk_activate_cards(&a.ctx, vec![mine.id, theirs.id, unknown])
        .await
        .unwrap();
    assert_eq!(outcome.activated, 1);
    let outcomes: Vec<_> = outcome.results.iter().map(|r| (r.id, r.outcome)).collect();
    assert_eq!(
        outcomes,
        vec![
            (mine.id, ActivationOutcome::Activated),
            (theirs.id, ActivationOutcome::NotFound),
            (unknown, ActivationOutcome::NotFound),
        ]
    );
    assert_eq!(outcome.failed_ids(), vec![theirs.id, unknown]);

    assert_eq!(
        svc.get_card(&a.ctx, mine.id).await.unwrap().status,
        CardStatus::Active
    );
    assert_eq!(
        svc.get_card(&b.ctx, theirs.id).await.unwrap().status,
        CardStatus::Inactive
    );
}

#[tokio::test]
async fn concurrent_units_see_only_their_tenant() {
    let (db, svc) = service().await;
    let mut tenants = Vec::new();
    for i in 0..4 {
        let t = onboard(&svc, &format!("t{i}")).await;
        let acc = account(&svc, &t, "main").await;
        for n in 0..3 {
            book(&svc, &t, expense(&acc, 100 * (i + 1), &format!("t{i}-{n}"))).await;
        }
        tenants.push(t);
    }

    let tasks = tenants.iter().map(|t| {
        let db = db.clone();
        let svc = svc.clone();
        let ctx = t.ctx.clone();
        tokio::spawn(async move {
            let expected = ctx.tenant_id().to_owned();
            for _ in 0..5 {
                let uow = db.begin_unit_of_work(&ctx).await.unwrap();
                tokio::task::yield_now().await;
                let rows = TRANSACTIONS.find_many(&uow, Condition::all()).await.unwrap();
                assert_eq!(rows.len(), 3);
                assert!(rows.iter().all(|r| r.tenant_id == expected));
                tokio::task::yield_now().await;
                assert_eq!(uow.tenant_id(), expected);
                uow.rollback().await.unwrap();

                let seen = svc.search_transactions(&ctx, TransactionQuery::default()).await.unwrap();
                assert!(seen.iter().all(|r| r.tenant_id == expected));
            }
        })
    });
    for res in join_all(tasks).await {
        res.unwrap();
    }
}
