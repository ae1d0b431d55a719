//! Staged-change state machine and field diffing.

use std::collections::BTreeMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::products::{ProductSnapshot, VERSIONED_PRODUCT_FIELDS};
use crate::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Product,
    Collection,
}

impl EntityType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Product => "product",
            EntityType::Collection => "collection",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "product" => Ok(EntityType::Product),
            "collection" => Ok(EntityType::Collection),
            other => Err(CoreError::UnknownVariant {
                kind: "entity type",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Create,
    Update,
}

impl ChangeType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeType::Create => "create",
            ChangeType::Update => "update",
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(ChangeType::Create),
            "update" => Ok(ChangeType::Update),
            other => Err(CoreError::UnknownVariant {
                kind: "change type",
                value: other.to_string(),
            }),
        }
    }
}

/// Lifecycle of a staged change.
///
/// ```text
/// pending ──► approved ──► applied ──► rolled_back
///    │
///    └──────► rejected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Pending,
    Approved,
    Rejected,
    Applied,
    RolledBack,
}

impl ChangeStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeStatus::Pending => "pending",
            ChangeStatus::Approved => "approved",
            ChangeStatus::Rejected => "rejected",
            ChangeStatus::Applied => "applied",
            ChangeStatus::RolledBack => "rolled_back",
        }
    }

    #[must_use]
    pub fn can_transition_to(self, next: ChangeStatus) -> bool {
        matches!(
            (self, next),
            (
                ChangeStatus::Pending,
                ChangeStatus::Approved | ChangeStatus::Rejected
            ) | (ChangeStatus::Approved, ChangeStatus::Applied)
                | (ChangeStatus::Applied, ChangeStatus::RolledBack)
        )
    }

    /// Validates a transition, returning the new status.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidTransition`] for any edge not in the
    /// lifecycle diagram, including self-transitions.
    pub fn transition(self, next: ChangeStatus) -> Result<ChangeStatus, CoreError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    /// The only status a change must be in to move to `next`, if any.
    #[must_use]
    pub fn required_predecessor(next: ChangeStatus) -> Option<ChangeStatus> {
        match next {
            ChangeStatus::Approved | ChangeStatus::Rejected => Some(ChangeStatus::Pending),
            ChangeStatus::Applied => Some(ChangeStatus::Approved),
            ChangeStatus::RolledBack => Some(ChangeStatus::Applied),
            ChangeStatus::Pending => None,
        }
    }
}

impl std::fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ChangeStatus::Pending),
            "approved" => Ok(ChangeStatus::Approved),
            "rejected" => Ok(ChangeStatus::Rejected),
            "applied" => Ok(ChangeStatus::Applied),
            "rolled_back" => Ok(ChangeStatus::RolledBack),
            other => Err(CoreError::UnknownVariant {
                kind: "change status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Running,
    Completed,
    Partial,
    Failed,
    Cancelled,
}

impl BatchStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            BatchStatus::Running => "running",
            BatchStatus::Completed => "completed",
            BatchStatus::Partial => "partial",
            BatchStatus::Failed => "failed",
            BatchStatus::Cancelled => "cancelled",
        }
    }

    /// Final status of a finished batch.
    #[must_use]
    pub fn from_counts(successful: i32, failed: i32) -> BatchStatus {
        if failed == 0 {
            BatchStatus::Completed
        } else if successful == 0 {
            BatchStatus::Failed
        } else {
            BatchStatus::Partial
        }
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(BatchStatus::Running),
            "completed" => Ok(BatchStatus::Completed),
            "partial" => Ok(BatchStatus::Partial),
            "failed" => Ok(BatchStatus::Failed),
            "cancelled" => Ok(BatchStatus::Cancelled),
            other => Err(CoreError::UnknownVariant {
                kind: "batch status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub old: serde_json::Value,
    pub new: serde_json::Value,
}

/// Field name → `{old, new}`, ordered by field name.
pub type FieldChanges = BTreeMap<String, FieldChange>;

/// Diffs two JSON objects over the union of their keys.
///
/// A key missing on one side compares as `null`, so a field present only in
/// `current` with a `null` value is not reported.
#[must_use]
pub fn detect_changes(
    current: &serde_json::Map<String, serde_json::Value>,
    proposed: &serde_json::Map<String, serde_json::Value>,
) -> FieldChanges {
    let null = serde_json::Value::Null;
    let mut changes = FieldChanges::new();

    for key in current.keys().chain(proposed.keys()) {
        if changes.contains_key(key) {
            continue;
        }
        let old = current.get(key).unwrap_or(&null);
        let new = proposed.get(key).unwrap_or(&null);
        if old != new {
            changes.insert(
                key.clone(),
                FieldChange {
                    old: old.clone(),
                    new: new.clone(),
                },
            );
        }
    }

    changes
}

/// Overlays the versioned fields of `proposed` onto `current`.
///
/// Identifier fields are taken from `proposed` only when `current` lacks
/// them. With no `current` (a `create` change) the proposal is decoded as-is.
///
/// # Errors
///
/// Returns [`CoreError::Snapshot`] if the merged object is not a valid
/// product snapshot.
pub fn apply_proposed_fields(
    current: Option<&ProductSnapshot>,
    proposed: &serde_json::Value,
) -> Result<ProductSnapshot, CoreError> {
    let Some(current) = current else {
        return ProductSnapshot::from_json(proposed).map(|p| p.normalized());
    };

    let mut merged = current.to_json_map();
    if let serde_json::Value::Object(fields) = proposed {
        for (key, value) in fields {
            let versioned = VERSIONED_PRODUCT_FIELDS.contains(&key.as_str());
            let fills_gap = merged.get(key).is_none_or(serde_json::Value::is_null);
            if versioned || fills_gap {
                merged.insert(key.clone(), value.clone());
            }
        }
    }

    ProductSnapshot::from_json(&serde_json::Value::Object(merged)).map(|p| p.normalized())
}

/// The parts of a staged change that approval rules look at.
#[derive(Debug, Clone)]
pub struct StagedChangeView {
    pub entity_type: EntityType,
    pub change_type: ChangeType,
    pub field_changes: FieldChanges,
    pub has_conflicts: bool,
}

impl StagedChangeView {
    pub fn changed_fields(&self) -> impl Iterator<Item = &str> {
        self.field_changes.keys().map(String::as_str)
    }

    /// Absolute price change in percent of the old price.
    ///
    /// `None` when the change does not touch `price`. `Some(None)` when it
    /// does but the change cannot be expressed as a percentage (no old price,
    /// an old price of zero, or a value that is not a decimal).
    #[must_use]
    pub fn price_change_percent(&self) -> Option<Option<Decimal>> {
        let change = self.field_changes.get("price")?;
        let (Some(old), Some(new)) = (json_decimal(&change.old), json_decimal(&change.new)) else {
            return Some(None);
        };
        if old.is_zero() {
            return Some(None);
        }
        Some(Some(((new - old) / old * Decimal::ONE_HUNDRED).abs()))
    }
}

fn json_decimal(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::String(s) => Decimal::from_str(s.trim()).ok(),
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}
