use shopsync_core::ChangeStatus;
use uuid::Uuid;

pub(crate) async fn run_stage_list(
    pool: &sqlx::PgPool,
    status: Option<&str>,
    limit: i64,
) -> anyhow::Result<()> {
    let status = status
        .map(str::parse::<ChangeStatus>)
        .transpose()
        .map_err(|e| anyhow::anyhow!("invalid --status: {e}"))?;
    let changes = shopsync_db::list_recent_staged_changes(pool, status, limit).await?;

    if changes.is_empty() {
        println!("no staged changes");
        return Ok(());
    }

    println!(
        "{:<38}{:<8}{:<13}{:<10}{:>7}  SHOPIFY_ID",
        "CHANGE", "TYPE", "STATUS", "CONFLICT", "FIELDS"
    );
    for change in &changes {
        let fields = change.field_changes.as_object().map_or(0, serde_json::Map::len);
        println!(
            "{:<38}{:<8}{:<13}{:<10}{:>7}  {}",
            change.change_id,
            change.change_type,
            change.status,
            if change.has_conflicts { "yes" } else { "" },
            fields,
            change.shopify_id.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

pub(crate) async fn run_stage_show(pool: &sqlx::PgPool, change_id: Uuid) -> anyhow::Result<()> {
    let change = match shopsync_db::get_staged_change(pool, change_id).await {
        Ok(change) => change,
        Err(shopsync_db::DbError::NotFound) => {
            anyhow::bail!("staged change {change_id} not found")
        }
        Err(e) => return Err(e.into()),
    };

    println!("change:      {}", change.change_id);
    println!("type:        {}", change.change_type);
    println!("status:      {}", change.status);
    println!(
        "product:     {} (shopify {})",
        change
            .product_id
            .map_or_else(|| "-".to_owned(), |id| id.to_string()),
        change.shopify_id.as_deref().unwrap_or("-")
    );
    println!("conflicts:   {}", change.has_conflicts);
    println!("auto:        {}", change.auto_approved);
    if let Some(reviewer) = &change.reviewed_by {
        println!(
            "reviewed:    {reviewer}{}",
            change
                .review_note
                .as_deref()
                .map(|note| format!(" ({note})"))
                .unwrap_or_default()
        );
    }
    if let Some(actor) = &change.applied_by {
        println!("applied by:  {actor}");
    }
    if let Some(actor) = &change.rolled_back_by {
        println!("rolled back: {actor}");
    }

    println!("\nfield changes:");
    for (field, diff) in change.field_changes()? {
        println!("  {field}");
        println!("    - {}", diff.old);
        println!("    + {}", diff.new);
    }

    let entries = shopsync_db::list_audit_entries_for_change(pool, change_id).await?;
    if !entries.is_empty() {
        println!("\naudit trail:");
        for entry in &entries {
            println!(
                "  {}  {:<12}{}",
                entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                entry.action,
                entry.actor
            );
        }
    }
    Ok(())
}
