/// Error contract tests
///
/// Every failure reaching a caller is one of four kinds with a stable body.
/// Run with: cargo test --test error_contract_tests

use crmstore::core::StoreError;
use crmstore::prelude::*;
use crmstore::storage::{Fault, StorageOp};
use serde_json::json;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

fn kind_of(err: &AppError) -> &'static str {
    // Exhaustive on purpose: a fifth kind must fail to compile here.
    match err.kind {
        ErrorKind::Validation => "VALIDATION",
        ErrorKind::Conflict => "CONFLICT",
        ErrorKind::NotFound => "NOT_FOUND",
        ErrorKind::Database => "DATABASE",
    }
}

#[tokio::test]
async fn test_store_failures_surface_as_the_four_kinds() {
    let store = RecordStore::in_memory(StoreConfig::default());
    let contact = assert_ok!(
        store
            .create(EntityType::Contact, Patch::new().set("email", "a@example.com"))
            .await
    );

    let validation = assert_err!(
        store
            .safe_update(
                EntityType::Contact,
                contact.id,
                0,
                Patch::new().set("id", "x"),
                ConflictResolutionStrategy::Fail,
            )
            .await
    );
    assert_eq!(kind_of(&validation), "VALIDATION");

    let dangling = assert_err!(
        store
            .create(EntityType::Deal, Patch::new().set("contactId", RecordId::new()))
            .await
    );
    assert_eq!(kind_of(&dangling), "VALIDATION");

    let duplicate = assert_err!(
        store
            .create(EntityType::Contact, Patch::new().set("email", "a@example.com"))
            .await
    );
    assert_eq!(kind_of(&duplicate), "CONFLICT");

    let missing = assert_err!(
        store
            .get_with_version(EntityType::Contact, RecordId::new())
            .await
    );
    assert_eq!(kind_of(&missing), "NOT_FOUND");

    store
        .storage()
        .faults()
        .arm(Fault::new(StorageOp::Read, StoreError::Connection("refused".into())))
        .unwrap();
    let database = assert_err!(store.get_with_version(EntityType::Contact, contact.id).await);
    assert_eq!(kind_of(&database), "DATABASE");
}

#[tokio::test]
async fn test_handle_api_error_on_compound_failure() {
    let store = RecordStore::in_memory(StoreConfig::default());
    let failure = assert_err!(store.delete_contact(RecordId::new()).await);

    let ctx = RequestContext::new()
        .actor("user-7")
        .organization("org-3")
        .request_id("req-1");
    let outcome = handle_api_error(failure.clone(), &ctx);

    assert_eq!(outcome.status_code(), 404);
    assert_eq!(outcome.error, failure.error);

    let body = serde_json::to_value(&outcome.response).unwrap();
    assert_eq!(body["type"], json!("NOT_FOUND"));
    assert_eq!(body["error"], json!(failure.error.message));
}

#[tokio::test]
async fn test_unclassified_failure_is_database() {
    let outcome = handle_api_error(
        std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed"),
        &RequestContext::new(),
    );
    assert_eq!(outcome.response.kind, ErrorKind::Database);
    assert_eq!(outcome.status_code(), 500);
}

#[tokio::test]
async fn test_snapshot_survives_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("crm.json");

    let store = RecordStore::in_memory(StoreConfig::default());
    let company = store
        .create(EntityType::Company, Patch::new().set("name", "Umbrella"))
        .await
        .unwrap();
    let updated = store
        .safe_update(
            EntityType::Company,
            company.id,
            company.version,
            Patch::new().set("industry", "pharma"),
            ConflictResolutionStrategy::Fail,
        )
        .await
        .unwrap();
    assert_eq!(assert_ok!(store.storage().save_snapshot(&path).await), 1);

    let restored = RecordStore::in_memory(StoreConfig::default());
    assert_ok!(restored.storage().restore_snapshot(&path).await);

    let loaded = restored
        .get_with_version(EntityType::Company, company.id)
        .await
        .unwrap();
    assert_eq!(loaded, updated);

    // Restored versions keep guarding writes.
    let stale = restored
        .safe_update(
            EntityType::Company,
            company.id,
            company.version,
            Patch::new().set("industry", "biotech"),
            ConflictResolutionStrategy::Fail,
        )
        .await
        .unwrap_err();
    assert!(stale.is_conflict());
}
