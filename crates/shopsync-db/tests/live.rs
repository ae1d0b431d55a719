//! Live integration tests for shopsync-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness. The `migrations` path is relative to the crate root
//! (`crates/shopsync-db/`), so `"../../migrations"` resolves to the workspace
//! migration directory.

use rust_decimal::Decimal;
use serde_json::json;
use shopsync_core::{
    ApprovalRule, BatchStatus, ChangeStatus, ChangeType, CollectionSnapshot, CollectionType,
    EntityType, FieldChange, FieldChanges, ProductSnapshot,
};
use shopsync_db::{
    approve_staged_change, cancel_sync_batch, create_sync_batch, delete_product,
    fail_sync_batch, finish_sync_batch, get_collection_by_handle, get_product,
    get_product_by_shopify_id, get_staged_change, get_sync_batch, insert_collection,
    insert_product, insert_staged_change, list_active_approval_rules,
    list_audit_entries_for_change, list_collection_product_ids, list_products_with_sku,
    list_recent_staged_changes, list_staged_changes, list_sync_versions, mark_product_synced,
    mark_staged_change_applied, mark_staged_change_rolled_back, product_ids_by_shopify_ids,
    record_audit, record_sync_version, reject_staged_change, replace_collection_products,
    seed_approval_rules, supersede_pending_changes, update_product, BatchCounts, BatchType, DbError, NewAuditEntry,
    NewStagedChange,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn snapshot(shopify_id: &str, handle: &str) -> ProductSnapshot {
    ProductSnapshot {
        shopify_id: Some(shopify_id.to_string()),
        handle: handle.to_string(),
        title: format!("Product {handle}"),
        description_html: None,
        vendor: Some("Acme".to_string()),
        product_type: Some("Apron".to_string()),
        status: "active".to_string(),
        tags: vec!["linen".to_string()],
        sku: Some(format!("SKU-{handle}")),
        price: Some(Decimal::new(3400, 2)),
        compare_at_price: None,
        default_variant_id: Some("77".to_string()),
    }
}

fn new_change(shopify_id: &str, target_version: &str) -> NewStagedChange {
    let mut field_changes = FieldChanges::new();
    field_changes.insert(
        "title".to_string(),
        FieldChange {
            old: json!("Old"),
            new: json!("New"),
        },
    );
    NewStagedChange {
        batch_id: None,
        product_id: None,
        shopify_id: Some(shopify_id.to_string()),
        change_type: ChangeType::Update,
        current_data: Some(json!({"title": "Old"})),
        proposed_data: json!({"title": "New"}),
        field_changes,
        has_conflicts: false,
        source_version: Some("old-hash".to_string()),
        target_version: target_version.to_string(),
    }
}

async fn staged(pool: &sqlx::PgPool, shopify_id: &str, target: &str) -> uuid::Uuid {
    insert_staged_change(pool, &new_change(shopify_id, target))
        .await
        .expect("insert_staged_change failed")
        .expect("change should be inserted")
        .change_id
}

// ---------------------------------------------------------------------------
// Section 1: Products
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn product_round_trips_with_matching_hash(pool: sqlx::PgPool) {
    let product = snapshot("1001", "linen-apron");
    let hash = product.content_hash();
    let id = insert_product(&pool, &product, Some(&hash))
        .await
        .expect("insert_product failed");

    let row = get_product(&pool, id).await.expect("get_product failed");
    assert_eq!(row.to_snapshot(), product.normalized());
    assert_eq!(row.last_synced_hash.as_deref(), Some(hash.as_str()));
    assert!(row.last_synced_at.is_some());
    assert!(!row.has_local_edits());
}

#[sqlx::test(migrations = "../../migrations")]
async fn update_without_hash_marks_local_edit(pool: sqlx::PgPool) {
    let product = snapshot("1001", "linen-apron");
    let id = insert_product(&pool, &product, Some(&product.content_hash()))
        .await
        .unwrap();

    let edited = ProductSnapshot {
        title: "Edited locally".to_string(),
        ..product.clone()
    };
    update_product(&pool, id, &edited, None).await.unwrap();

    let row = get_product_by_shopify_id(&pool, "1001")
        .await
        .unwrap()
        .expect("product should exist");
    assert_eq!(row.title, "Edited locally");
    assert!(row.has_local_edits());

    mark_product_synced(&pool, id, &edited.content_hash())
        .await
        .unwrap();
    let row = get_product(&pool, id).await.unwrap();
    assert!(!row.has_local_edits());
}

#[sqlx::test(migrations = "../../migrations")]
async fn update_and_delete_missing_product_is_not_found(pool: sqlx::PgPool) {
    let product = snapshot("1001", "linen-apron");
    assert!(matches!(
        update_product(&pool, 999, &product, None).await,
        Err(DbError::NotFound)
    ));
    assert!(matches!(
        delete_product(&pool, 999).await,
        Err(DbError::NotFound)
    ));
}

#[sqlx::test(migrations = "../../migrations")]
async fn sku_listing_and_shopify_id_mapping(pool: sqlx::PgPool) {
    let a = insert_product(&pool, &snapshot("1", "a"), None).await.unwrap();
    let b = insert_product(&pool, &snapshot("2", "b"), None).await.unwrap();
    let no_sku = ProductSnapshot {
        sku: None,
        ..snapshot("3", "c")
    };
    insert_product(&pool, &no_sku, None).await.unwrap();

    let with_sku = list_products_with_sku(&pool, None).await.unwrap();
    assert_eq!(with_sku.len(), 2);
    let limited = list_products_with_sku(&pool, Some(1)).await.unwrap();
    assert_eq!(limited.len(), 1);

    let mut mapping = product_ids_by_shopify_ids(
        &pool,
        &["1".to_string(), "2".to_string(), "404".to_string()],
    )
    .await
    .unwrap();
    mapping.sort();
    assert_eq!(mapping, vec![("1".to_string(), a), ("2".to_string(), b)]);
}

// ---------------------------------------------------------------------------
// Section 2: Staged change lifecycle
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn staged_change_full_lifecycle(pool: sqlx::PgPool) {
    let product_id = insert_product(&pool, &snapshot("1001", "linen-apron"), None)
        .await
        .unwrap();
    let change_id = staged(&pool, "1001", "v2").await;

    let row = get_staged_change(&pool, change_id).await.unwrap();
    assert_eq!(row.status().unwrap(), ChangeStatus::Pending);
    assert_eq!(row.view().unwrap().changed_fields().collect::<Vec<_>>(), ["title"]);

    approve_staged_change(&pool, change_id, "ana", Some("looks right"), false)
        .await
        .expect("approve failed");

    let version = record_sync_version(
        &pool,
        EntityType::Product,
        product_id,
        "old-hash",
        &json!({"title": "Old"}),
        Some(change_id),
        "ana",
    )
    .await
    .unwrap();
    mark_staged_change_applied(&pool, change_id, product_id, version.id, "ana")
        .await
        .expect("apply failed");

    mark_staged_change_rolled_back(&pool, change_id, "ana")
        .await
        .expect("rollback failed");

    let row = get_staged_change(&pool, change_id).await.unwrap();
    assert_eq!(row.status().unwrap(), ChangeStatus::RolledBack);
    assert_eq!(row.reviewed_by.as_deref(), Some("ana"));
    assert_eq!(row.review_note.as_deref(), Some("looks right"));
    assert_eq!(row.product_id, Some(product_id));
    assert_eq!(row.applied_version_id, Some(version.id));
    assert!(row.applied_at.is_some());
    assert!(row.rolled_back_at.is_some());
}

#[sqlx::test(migrations = "../../migrations")]
async fn approving_a_non_pending_change_fails(pool: sqlx::PgPool) {
    let change_id = staged(&pool, "1001", "v2").await;
    reject_staged_change(&pool, change_id, "ana", None)
        .await
        .unwrap();

    let err = approve_staged_change(&pool, change_id, "ana", None, false)
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            DbError::InvalidStagedChangeTransition {
                expected_status: "pending",
                ..
            }
        ),
        "got {err:?}"
    );

    let row = get_staged_change(&pool, change_id).await.unwrap();
    assert_eq!(row.status().unwrap(), ChangeStatus::Rejected);
}

#[sqlx::test(migrations = "../../migrations")]
async fn reviewing_a_missing_change_is_not_found(pool: sqlx::PgPool) {
    let missing = uuid::Uuid::new_v4();

    let err = approve_staged_change(&pool, missing, "ana", None, false)
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::NotFound), "got {err:?}");

    let err = reject_staged_change(&pool, missing, "ana", None)
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::NotFound), "got {err:?}");
}

#[sqlx::test(migrations = "../../migrations")]
async fn applying_a_non_approved_change_fails(pool: sqlx::PgPool) {
    let product_id = insert_product(&pool, &snapshot("1001", "linen-apron"), None)
        .await
        .unwrap();
    let version = record_sync_version(
        &pool,
        EntityType::Product,
        product_id,
        "h",
        &json!({}),
        None,
        "test",
    )
    .await
    .unwrap();
    let change_id = staged(&pool, "1001", "v2").await;

    let err = mark_staged_change_applied(&pool, change_id, product_id, version.id, "ana")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DbError::InvalidStagedChangeTransition {
            expected_status: "approved",
            ..
        }
    ));

    let err = mark_staged_change_rolled_back(&pool, change_id, "ana")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DbError::InvalidStagedChangeTransition {
            expected_status: "applied",
            ..
        }
    ));
}

#[sqlx::test(migrations = "../../migrations")]
async fn duplicate_pending_change_is_skipped(pool: sqlx::PgPool) {
    staged(&pool, "1001", "v2").await;
    let duplicate = insert_staged_change(&pool, &new_change("1001", "v2"))
        .await
        .unwrap();
    assert!(duplicate.is_none());

    let different_target = insert_staged_change(&pool, &new_change("1001", "v3"))
        .await
        .unwrap();
    assert!(different_target.is_some());
}

#[sqlx::test(migrations = "../../migrations")]
async fn identical_change_may_be_restaged_once_reviewed(pool: sqlx::PgPool) {
    let first = staged(&pool, "1001", "v2").await;
    reject_staged_change(&pool, first, "ana", None).await.unwrap();

    let again = insert_staged_change(&pool, &new_change("1001", "v2"))
        .await
        .unwrap();
    assert!(again.is_some());
}

#[sqlx::test(migrations = "../../migrations")]
async fn list_staged_changes_filters_by_status(pool: sqlx::PgPool) {
    let a = staged(&pool, "1", "v").await;
    staged(&pool, "2", "v").await;
    approve_staged_change(&pool, a, "ana", None, true).await.unwrap();

    let all = list_staged_changes(&pool, None, None).await.unwrap();
    assert_eq!(all.len(), 2);

    let approved = list_staged_changes(&pool, Some(ChangeStatus::Approved), None)
        .await
        .unwrap();
    assert_eq!(approved.len(), 1);
    assert_eq!(approved[0].change_id, a);
    assert!(approved[0].auto_approved);
}

#[sqlx::test(migrations = "../../migrations")]
async fn recent_staged_changes_are_newest_first(pool: sqlx::PgPool) {
    let first = staged(&pool, "1", "v").await;
    let second = staged(&pool, "2", "v").await;
    let third = staged(&pool, "3", "v").await;

    let oldest_first: Vec<_> = list_staged_changes(&pool, None, None)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.change_id)
        .collect();
    assert_eq!(oldest_first, vec![first, second, third]);

    let recent: Vec<_> = list_recent_staged_changes(&pool, None, 2)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.change_id)
        .collect();
    assert_eq!(recent, vec![third, second]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn newer_change_supersedes_pending_ones(pool: sqlx::PgPool) {
    let oldest = staged(&pool, "1001", "v2").await;
    let older = staged(&pool, "1001", "v3").await;
    let approved = staged(&pool, "1001", "v4").await;
    approve_staged_change(&pool, approved, "ana", None, false)
        .await
        .unwrap();
    let other_product = staged(&pool, "2002", "v2").await;
    let newest = staged(&pool, "1001", "v5").await;

    let superseded = supersede_pending_changes(&pool, "1001", newest, "pull")
        .await
        .unwrap();
    assert_eq!(superseded, vec![oldest, older]);

    for change_id in [oldest, older] {
        let row = get_staged_change(&pool, change_id).await.unwrap();
        assert_eq!(row.status().unwrap(), ChangeStatus::Rejected);
        assert_eq!(row.reviewed_by.as_deref(), Some("pull"));
        assert_eq!(
            row.review_note.as_deref(),
            Some(format!("superseded by {newest}").as_str())
        );
    }
    for (change_id, expected) in [
        (approved, ChangeStatus::Approved),
        (other_product, ChangeStatus::Pending),
        (newest, ChangeStatus::Pending),
    ] {
        let row = get_staged_change(&pool, change_id).await.unwrap();
        assert_eq!(row.status().unwrap(), expected, "change {change_id}");
    }
}

// ---------------------------------------------------------------------------
// Section 3: Sync versions and audit log
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn version_numbers_increase_per_entity(pool: sqlx::PgPool) {
    for i in 0..3 {
        record_sync_version(
            &pool,
            EntityType::Product,
            7,
            &format!("h{i}"),
            &json!({"i": i}),
            None,
            "test",
        )
        .await
        .unwrap();
    }
    let other = record_sync_version(
        &pool,
        EntityType::Product,
        8,
        "x",
        &json!({}),
        None,
        "test",
    )
    .await
    .unwrap();

    let history = list_sync_versions(&pool, EntityType::Product, 7).await.unwrap();
    let numbers: Vec<i32> = history.iter().map(|v| v.version_number).collect();
    assert_eq!(numbers, [1, 2, 3]);
    assert_eq!(history[2].data_snapshot, json!({"i": 2}));
    assert_eq!(other.version_number, 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn audit_entries_are_listed_per_change(pool: sqlx::PgPool) {
    let change_id = uuid::Uuid::new_v4();
    for action in ["approve", "apply"] {
        record_audit(
            &pool,
            &NewAuditEntry {
                entity_type: "product",
                entity_id: Some(1),
                action,
                actor: "ana",
                change_id: Some(change_id),
                batch_id: None,
                details: json!({"action": action}),
            },
        )
        .await
        .unwrap();
    }

    let entries = list_audit_entries_for_change(&pool, change_id).await.unwrap();
    let actions: Vec<&str> = entries.iter().map(|e| e.action.as_str()).collect();
    assert_eq!(actions, ["approve", "apply"]);
}

// ---------------------------------------------------------------------------
// Section 4: Sync batches
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn batch_finishes_with_status_from_counts(pool: sqlx::PgPool) {
    let batch = create_sync_batch(&pool, BatchType::Pull, "cli").await.unwrap();
    assert_eq!(batch.status, "running");

    let status = finish_sync_batch(
        &pool,
        batch.batch_id,
        BatchCounts {
            total: 5,
            successful: 3,
            failed: 1,
            skipped: 1,
        },
    )
    .await
    .unwrap();
    assert_eq!(status, BatchStatus::Partial);

    let row = get_sync_batch(&pool, batch.batch_id).await.unwrap();
    assert_eq!(row.status, "partial");
    assert_eq!(row.total_items, 5);
    assert_eq!(row.skipped_items, 1);
    assert!(row.completed_at.is_some());

    let err = cancel_sync_batch(&pool, batch.batch_id).await.unwrap_err();
    assert!(matches!(err, DbError::InvalidSyncBatchTransition { .. }));
}

#[sqlx::test(migrations = "../../migrations")]
async fn batch_can_fail_or_cancel_only_while_running(pool: sqlx::PgPool) {
    let failed = create_sync_batch(&pool, BatchType::Push, "cli").await.unwrap();
    fail_sync_batch(&pool, failed.batch_id, "Shopify unreachable")
        .await
        .unwrap();
    let row = get_sync_batch(&pool, failed.batch_id).await.unwrap();
    assert_eq!(row.status, "failed");
    assert_eq!(row.error_message.as_deref(), Some("Shopify unreachable"));

    let cancelled = create_sync_batch(&pool, BatchType::Apply, "cli").await.unwrap();
    cancel_sync_batch(&pool, cancelled.batch_id).await.unwrap();
    assert!(matches!(
        fail_sync_batch(&pool, cancelled.batch_id, "late").await,
        Err(DbError::InvalidSyncBatchTransition { .. })
    ));
}

// ---------------------------------------------------------------------------
// Section 5: Collections and approval rules
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn collection_membership_is_replaced(pool: sqlx::PgPool) {
    let a = insert_product(&pool, &snapshot("1", "a"), None).await.unwrap();
    let b = insert_product(&pool, &snapshot("2", "b"), None).await.unwrap();
    let c = insert_product(&pool, &snapshot("3", "c"), None).await.unwrap();

    let collection = CollectionSnapshot {
        shopify_id: "900".to_string(),
        handle: "summer".to_string(),
        title: "Summer".to_string(),
        description_html: None,
        collection_type: CollectionType::Custom,
        rules: None,
        sort_order: Some("MANUAL".to_string()),
        product_ids: vec![],
    };
    let collection_id = insert_collection(&pool, &collection).await.unwrap();

    let mut tx = pool.begin().await.unwrap();
    replace_collection_products(&mut tx, collection_id, &[b, a])
        .await
        .unwrap();
    tx.commit().await.unwrap();
    assert_eq!(
        list_collection_product_ids(&pool, collection_id).await.unwrap(),
        [b, a]
    );

    let mut tx = pool.begin().await.unwrap();
    let inserted = replace_collection_products(&mut tx, collection_id, &[c])
        .await
        .unwrap();
    tx.commit().await.unwrap();
    assert_eq!(inserted, 1);
    assert_eq!(
        list_collection_product_ids(&pool, collection_id).await.unwrap(),
        [c]
    );

    let row = get_collection_by_handle(&pool, "summer")
        .await
        .unwrap()
        .expect("collection should exist");
    assert_eq!(row.to_snapshot().unwrap(), collection);
}

#[sqlx::test(migrations = "../../migrations")]
async fn approval_rules_seed_is_idempotent(pool: sqlx::PgPool) {
    let mut rules = vec![
        ApprovalRule {
            name: "small-price-moves".to_string(),
            entity_type: EntityType::Product,
            change_types: vec![ChangeType::Update],
            exclude_fields: vec![],
            max_price_change: Some(Decimal::new(10, 0)),
            no_conflicts: false,
            is_active: true,
        },
        ApprovalRule {
            name: "manual-new-products".to_string(),
            entity_type: EntityType::Product,
            change_types: vec![ChangeType::Create],
            exclude_fields: vec!["handle".to_string()],
            max_price_change: None,
            no_conflicts: true,
            is_active: false,
        },
    ];

    assert_eq!(seed_approval_rules(&pool, &rules).await.unwrap(), 2);
    rules[0].exclude_fields = vec!["status".to_string()];
    assert_eq!(seed_approval_rules(&pool, &rules).await.unwrap(), 2);

    let active = list_active_approval_rules(&pool).await.unwrap();
    assert_eq!(active, vec![rules[0].clone()]);
}
