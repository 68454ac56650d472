/// Compound operation tests
///
/// Cascading deletes must leave no trace when any step fails.
/// Run with: cargo test --test compound_tests

use crmstore::core::StoreError;
use crmstore::prelude::*;
use crmstore::storage::{Fault, StorageOp, StorageTransaction};
use std::time::Duration;

struct Fixture {
    store: RecordStore<InMemoryStorage>,
    contact: RecordId,
    deals: Vec<RecordId>,
}

async fn fixture() -> Fixture {
    let store = RecordStore::in_memory(StoreConfig::default());
    let contact = store
        .create(
            EntityType::Contact,
            Patch::new().set("firstName", "Linus").set("email", "linus@example.com"),
        )
        .await
        .unwrap()
        .id;
    let bystander = store
        .create(EntityType::Contact, Patch::new().set("email", "other@example.com"))
        .await
        .unwrap()
        .id;

    let mut deals = vec![];
    for (i, owner) in [contact, contact, bystander].into_iter().enumerate() {
        let deal = store
            .create(
                EntityType::Deal,
                Patch::new()
                    .set("title", format!("Deal {}", i))
                    .set("contactId", owner),
            )
            .await
            .unwrap();
        deals.push(deal.id);
    }
    for i in 0..3 {
        store
            .create(
                EntityType::Activity,
                Patch::new()
                    .set("subject", format!("Follow-up {}", i))
                    .set("contactId", contact)
                    .set("dealId", deals[0]),
            )
            .await
            .unwrap();
    }

    Fixture {
        store,
        contact,
        deals,
    }
}

async fn affected_sets(store: &RecordStore<InMemoryStorage>) -> Vec<Vec<VersionedRecord>> {
    let mut sets = vec![];
    for entity in [EntityType::Deal, EntityType::Activity, EntityType::Contact] {
        sets.push(store.find(entity, &Filter::all()).await.unwrap());
    }
    sets
}

#[tokio::test]
async fn test_delete_contact_commits_all_steps() {
    let f = fixture().await;

    let outcome = f.store.delete_contact(f.contact).await.unwrap();

    assert_eq!(outcome.state, TransactionState::Committed);
    assert_eq!(outcome.operations_completed, 3);
    let rows: Vec<u64> = outcome.steps.iter().map(|s| s.rows_affected).collect();
    assert_eq!(rows, vec![2, 3, 1]);

    let remaining = f
        .store
        .find(EntityType::Deal, &Filter::eq("contactId", f.contact))
        .await
        .unwrap();
    assert!(remaining.is_empty());
    assert_eq!(f.store.storage().row_count(EntityType::Activity).await, 0);
    assert_eq!(f.store.storage().row_count(EntityType::Deal).await, 3);
    assert_eq!(f.store.storage().row_count(EntityType::Contact).await, 1);
}

#[tokio::test]
async fn test_failure_at_any_step_restores_pre_state() {
    let faults = [
        (1, StorageOp::UpdateMany, EntityType::Deal),
        (2, StorageOp::DeleteMany, EntityType::Activity),
        (3, StorageOp::DeleteOne, EntityType::Contact),
    ];

    for (step, op, entity) in faults {
        let f = fixture().await;
        let before = affected_sets(&f.store).await;
        f.store
            .storage()
            .faults()
            .arm(Fault::new(op, StoreError::Timeout(Duration::from_millis(100))).on(entity))
            .unwrap();

        let failure = f.store.delete_contact(f.contact).await.unwrap_err();

        assert_eq!(failure.operations_completed, 0, "step {}", step);
        assert_eq!(failure.state, TransactionState::RolledBack);
        assert_eq!(failure.failed_step, Some(step - 1));
        assert_eq!(failure.error.kind, ErrorKind::Database);
        assert_eq!(affected_sets(&f.store).await, before, "step {} leaked", step);
    }
}

#[tokio::test]
async fn test_step_error_kinds_pass_through() {
    let f = fixture().await;
    let before = affected_sets(&f.store).await;

    let op = CompoundOperation::new("relink_then_clash")
        .update_many(
            "move deals",
            EntityType::Deal,
            Filter::eq("contactId", f.contact),
            Patch::new().clear("contactId"),
        )
        .create(
            "duplicate contact",
            EntityType::Contact,
            Patch::new().set("email", "linus@example.com"),
        );
    let failure = f.store.execute_compound(op).await.unwrap_err();
    assert_eq!(failure.error.kind, ErrorKind::Conflict);
    assert_eq!(failure.failed_step, Some(1));

    let op = CompoundOperation::new("dangling").update_many(
        "point deals nowhere",
        EntityType::Deal,
        Filter::all(),
        Patch::new().set("companyId", RecordId::new()),
    );
    let failure = f.store.execute_compound(op).await.unwrap_err();
    assert_eq!(failure.error.kind, ErrorKind::Validation);

    assert_eq!(affected_sets(&f.store).await, before);
}

#[tokio::test]
async fn test_failed_compound_is_not_retried() {
    let f = fixture().await;
    f.store
        .storage()
        .faults()
        .arm(
            Fault::new(StorageOp::DeleteOne, StoreError::Connection("reset".into()))
                .on(EntityType::Deal),
        )
        .unwrap();

    let failure = f.store.delete_deal(f.deals[0]).await.unwrap_err();
    assert_eq!(failure.error.kind, ErrorKind::Database);
    assert_eq!(f.store.storage().faults().armed_count(), 0);
    assert!(
        f.store
            .get_with_version(EntityType::Deal, f.deals[0])
            .await
            .is_ok()
    );

    let outcome = f.store.delete_deal(f.deals[0]).await.unwrap();
    assert_eq!(outcome.step("delete activities").unwrap().rows_affected, 3);
}

#[tokio::test]
async fn test_dropped_transaction_rolls_back() {
    let f = fixture().await;
    let before = affected_sets(&f.store).await;

    let mut tx = f.store.storage().begin_transaction().await.unwrap();
    let deleted = tx
        .delete_many(EntityType::Activity, &Filter::eq("contactId", f.contact))
        .await
        .unwrap();
    assert_eq!(deleted, 3);
    drop(tx);

    assert_eq!(affected_sets(&f.store).await, before);
}

#[tokio::test]
async fn test_cancelled_compound_leaves_no_trace() {
    let f = fixture().await;
    let before = affected_sets(&f.store).await;

    // Hold the writer so the compound operation is parked mid-flight.
    let blocker = f.store.storage().begin_transaction().await.unwrap();
    let cancelled = tokio::time::timeout(
        Duration::from_millis(50),
        f.store.delete_contact(f.contact),
    )
    .await;
    assert!(cancelled.is_err());
    drop(blocker);

    assert_eq!(affected_sets(&f.store).await, before);
    assert!(f.store.delete_contact(f.contact).await.is_ok());
}

#[tokio::test]
async fn test_operation_timeout_is_database_error() {
    let f = fixture().await;
    let store = RecordStore::from_shared(
        std::sync::Arc::new(f.store.storage().clone()),
        StoreConfig::new().operation_timeout(Duration::from_millis(30)),
    );

    let blocker = store.storage().begin_transaction().await.unwrap();
    let failure = store.delete_contact(f.contact).await.unwrap_err();
    drop(blocker);

    assert_eq!(failure.error.kind, ErrorKind::Database);
    assert!(matches!(failure.error.cause, Some(StoreError::Timeout(_))));
    assert_eq!(failure.failed_step, None);
    assert_eq!(failure.operations_completed, 0);
}

#[tokio::test]
async fn test_cascade_follows_references_in_any_id_spelling() {
    let store = RecordStore::in_memory(StoreConfig::default());
    let contact = store
        .create(EntityType::Contact, Patch::new().set("email", "ada@example.com"))
        .await
        .unwrap()
        .id;
    let deal = store
        .create(
            EntityType::Deal,
            Patch::new()
                .set("title", "Engine")
                .set("contactId", contact.to_string().to_uppercase()),
        )
        .await
        .unwrap();
    assert_eq!(deal.reference("contactId"), Some(contact));

    // A plain delete is still blocked by the upper-cased reference.
    let blocked = store
        .execute_compound(
            CompoundOperation::new("naive").delete_one("delete contact", EntityType::Contact, contact),
        )
        .await
        .unwrap_err();
    assert_eq!(blocked.error.kind, ErrorKind::Validation);

    let outcome = store.delete_contact(contact).await.unwrap();
    assert_eq!(outcome.step("unlink deals").unwrap().rows_affected, 1);

    let deal = store.get_with_version(EntityType::Deal, deal.id).await.unwrap();
    assert_eq!(deal.reference("contactId"), None);
    assert!(
        store
            .get_with_version(EntityType::Contact, contact)
            .await
            .is_err()
    );
}
