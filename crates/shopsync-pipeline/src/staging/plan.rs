use shopsync_core::{detect_changes, ChangeType, ProductSnapshot};
use shopsync_db::{NewStagedChange, ProductRow};
use uuid::Uuid;

/// Decides what, if anything, to stage for one Shopify product.
///
/// Returns `None` when the local row already matches, or when Shopify still
/// holds the content last synced and only the local row moved (there is
/// nothing new to pull). A local row edited since its last sync flags the
/// change as conflicted.
#[must_use]
pub fn plan_change(
    local: Option<&ProductRow>,
    remote: &ProductSnapshot,
    batch_id: Option<Uuid>,
) -> Option<NewStagedChange> {
    let remote = remote.normalized();
    let target_version = remote.content_hash();
    let proposed_data = serde_json::Value::Object(remote.to_json_map());

    let Some(local) = local else {
        return Some(NewStagedChange {
            batch_id,
            product_id: None,
            shopify_id: remote.shopify_id.clone(),
            change_type: ChangeType::Create,
            current_data: None,
            proposed_data,
            field_changes: detect_changes(&serde_json::Map::new(), &remote.versioned_fields()),
            has_conflicts: false,
            source_version: None,
            target_version,
        });
    };

    if local.last_synced_hash.as_deref() == Some(target_version.as_str()) {
        return None;
    }

    let current = local.to_snapshot();
    let field_changes = detect_changes(&current.versioned_fields(), &remote.versioned_fields());
    if field_changes.is_empty() {
        return None;
    }

    Some(NewStagedChange {
        batch_id,
        product_id: Some(local.id),
        shopify_id: remote.shopify_id.clone(),
        change_type: ChangeType::Update,
        current_data: Some(serde_json::Value::Object(current.to_json_map())),
        proposed_data,
        field_changes,
        has_conflicts: local.has_local_edits(),
        source_version: Some(current.content_hash()),
        target_version,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::*;

    fn remote() -> ProductSnapshot {
        ProductSnapshot {
            shopify_id: Some("1001".to_owned()),
            handle: "linen-apron".to_owned(),
            title: "Linen Apron".to_owned(),
            description_html: None,
            vendor: Some("Acme".to_owned()),
            product_type: None,
            status: "active".to_owned(),
            tags: vec!["kitchen".to_owned()],
            sku: Some("AP-1".to_owned()),
            price: Some(Decimal::new(2500, 2)),
            compare_at_price: None,
            default_variant_id: Some("55".to_owned()),
        }
    }

    fn row_from(snapshot: &ProductSnapshot, last_synced_hash: Option<String>) -> ProductRow {
        ProductRow {
            id: 7,
            shopify_id: snapshot.shopify_id.clone(),
            handle: snapshot.handle.clone(),
            title: snapshot.title.clone(),
            description_html: snapshot.description_html.clone(),
            vendor: snapshot.vendor.clone(),
            product_type: snapshot.product_type.clone(),
            status: snapshot.status.clone(),
            tags: snapshot.tags.clone(),
            sku: snapshot.sku.clone(),
            price: snapshot.price,
            compare_at_price: snapshot.compare_at_price,
            default_variant_id: snapshot.default_variant_id.clone(),
            last_synced_hash,
            last_synced_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn unknown_product_is_staged_as_create() {
        let batch = Uuid::new_v4();
        let change = plan_change(None, &remote(), Some(batch)).expect("create planned");

        assert_eq!(change.change_type, ChangeType::Create);
        assert_eq!(change.batch_id, Some(batch));
        assert!(change.current_data.is_none());
        assert!(!change.has_conflicts);
        assert_eq!(change.target_version, remote().content_hash());
        assert_eq!(change.field_changes["title"].new, json!("Linen Apron"));
        assert_eq!(change.field_changes["title"].old, json!(null));
    }

    #[test]
    fn identical_product_is_not_staged() {
        let r = remote();
        let local = row_from(&r, Some(r.content_hash()));
        assert!(plan_change(Some(&local), &r, None).is_none());
    }

    #[test]
    fn remote_edit_on_clean_row_is_staged_without_conflict() {
        let synced = remote();
        let local = row_from(&synced, Some(synced.content_hash()));
        let mut changed = synced.clone();
        changed.title = "Linen Apron (Natural)".to_owned();

        let change = plan_change(Some(&local), &changed, None).expect("update planned");

        assert_eq!(change.change_type, ChangeType::Update);
        assert_eq!(change.product_id, Some(7));
        assert!(!change.has_conflicts);
        assert_eq!(change.source_version, Some(synced.content_hash()));
        assert_eq!(change.field_changes.len(), 1);
        assert_eq!(
            change.field_changes["title"].old,
            json!("Linen Apron"),
        );
    }

    #[test]
    fn remote_edit_on_locally_edited_row_is_conflicted() {
        let synced = remote();
        let mut edited = synced.clone();
        edited.price = Some(Decimal::new(2200, 2));
        let local = row_from(&edited, Some(synced.content_hash()));
        let mut changed = synced.clone();
        changed.title = "Renamed".to_owned();

        let change = plan_change(Some(&local), &changed, None).expect("update planned");

        assert!(change.has_conflicts);
        assert!(change.field_changes.contains_key("price"));
        assert!(change.field_changes.contains_key("title"));
    }

    #[test]
    fn local_only_edit_is_not_pulled_back() {
        let synced = remote();
        let mut edited = synced.clone();
        edited.title = "Local title".to_owned();
        let local = row_from(&edited, Some(synced.content_hash()));

        assert!(plan_change(Some(&local), &synced, None).is_none());
    }

    #[test]
    fn never_synced_row_with_differences_is_conflicted() {
        let r = remote();
        let mut local_snapshot = r.clone();
        local_snapshot.vendor = Some("Other".to_owned());
        let local = row_from(&local_snapshot, None);

        let change = plan_change(Some(&local), &r, None).expect("update planned");
        assert!(change.has_conflicts);
    }
}
