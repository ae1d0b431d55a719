//! Persistence for auto-approval rules loaded from YAML.

use rust_decimal::Decimal;
use shopsync_core::{ApprovalRule, ChangeType, EntityType};
use sqlx::{PgExecutor, PgPool};

use crate::{corrupt, DbError};

#[derive(Debug, Clone, sqlx::FromRow)]
struct ApprovalRuleRow {
    name: String,
    entity_type: String,
    change_types: Vec<String>,
    exclude_fields: Vec<String>,
    max_price_change: Option<Decimal>,
    no_conflicts: bool,
    is_active: bool,
}

impl ApprovalRuleRow {
    fn into_rule(self) -> Result<ApprovalRule, DbError> {
        let entity_type = self
            .entity_type
            .parse::<EntityType>()
            .map_err(corrupt("approval_rules"))?;
        let change_types = self
            .change_types
            .iter()
            .map(|s| s.parse::<ChangeType>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(corrupt("approval_rules"))?;

        Ok(ApprovalRule {
            name: self.name,
            entity_type,
            change_types,
            exclude_fields: self.exclude_fields,
            max_price_change: self.max_price_change,
            no_conflicts: self.no_conflicts,
            is_active: self.is_active,
        })
    }
}

/// Upserts rules by name. Returns the number of rules written.
///
/// All upserts run inside a single transaction; if any fails the whole set is
/// rolled back. Rules absent from `rules` are left as they are.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any database operation fails.
pub async fn seed_approval_rules(pool: &PgPool, rules: &[ApprovalRule]) -> Result<usize, DbError> {
    let mut tx = pool.begin().await?;
    let mut count = 0usize;

    for rule in rules {
        let change_types: Vec<&str> = rule.change_types.iter().map(|c| c.as_str()).collect();

        sqlx::query(
            "INSERT INTO approval_rules \
                 (name, entity_type, change_types, exclude_fields, max_price_change, \
                  no_conflicts, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (name) DO UPDATE SET \
                 entity_type      = EXCLUDED.entity_type, \
                 change_types     = EXCLUDED.change_types, \
                 exclude_fields   = EXCLUDED.exclude_fields, \
                 max_price_change = EXCLUDED.max_price_change, \
                 no_conflicts     = EXCLUDED.no_conflicts, \
                 is_active        = EXCLUDED.is_active, \
                 updated_at       = NOW()",
        )
        .bind(&rule.name)
        .bind(rule.entity_type.as_str())
        .bind(&change_types)
        .bind(&rule.exclude_fields)
        .bind(rule.max_price_change)
        .bind(rule.no_conflicts)
        .bind(rule.is_active)
        .execute(&mut *tx)
        .await?;

        count += 1;
    }

    tx.commit().await?;
    Ok(count)
}

/// Active rules ordered by name.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or [`DbError::Corrupt`] if
/// a stored rule holds an unknown entity or change type.
pub async fn list_active_approval_rules<'e, E>(executor: E) -> Result<Vec<ApprovalRule>, DbError>
where
    E: PgExecutor<'e>,
{
    let rows = sqlx::query_as::<_, ApprovalRuleRow>(
        "SELECT name, entity_type, change_types, exclude_fields, max_price_change, \
                no_conflicts, is_active \
         FROM approval_rules \
         WHERE is_active \
         ORDER BY name",
    )
    .fetch_all(executor)
    .await?;

    rows.into_iter().map(ApprovalRuleRow::into_rule).collect()
}
