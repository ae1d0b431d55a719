use std::collections::HashSet;
use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::staging::{ChangeType, EntityType, StagedChangeView};
use crate::ConfigError;

fn default_true() -> bool {
    true
}

/// One auto-approval rule. Rules only ever veto; a change no rule vetoes is
/// approved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRule {
    pub name: String,
    pub entity_type: EntityType,
    /// Change types the rule applies to. Empty means all.
    #[serde(default)]
    pub change_types: Vec<ChangeType>,
    /// Changes touching any of these fields need a human reviewer.
    #[serde(default)]
    pub exclude_fields: Vec<String>,
    /// Largest price change, in percent, that may be auto-approved.
    #[serde(default)]
    pub max_price_change: Option<Decimal>,
    /// Veto changes flagged as conflicting with local edits.
    #[serde(default)]
    pub no_conflicts: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl ApprovalRule {
    fn applies_to(&self, change: &StagedChangeView) -> bool {
        self.is_active
            && self.entity_type == change.entity_type
            && (self.change_types.is_empty() || self.change_types.contains(&change.change_type))
    }

    /// Returns the reason this rule blocks `change`, if it does.
    #[must_use]
    pub fn veto_reason(&self, change: &StagedChangeView) -> Option<String> {
        if !self.applies_to(change) {
            return None;
        }

        if let Some(field) = change
            .changed_fields()
            .find(|f| self.exclude_fields.iter().any(|x| x == f))
        {
            return Some(format!("rule '{}': field '{field}' needs review", self.name));
        }

        if let Some(max) = self.max_price_change {
            match change.price_change_percent() {
                Some(Some(pct)) if pct > max => {
                    return Some(format!(
                        "rule '{}': price change {pct}% exceeds {max}%",
                        self.name
                    ));
                }
                Some(None) => {
                    return Some(format!(
                        "rule '{}': price change cannot be measured",
                        self.name
                    ));
                }
                _ => {}
            }
        }

        if self.no_conflicts && change.has_conflicts {
            return Some(format!("rule '{}': change has conflicts", self.name));
        }

        None
    }
}

#[derive(Debug, Deserialize)]
pub struct ApprovalRulesFile {
    pub rules: Vec<ApprovalRule>,
}

/// Whether `change` may be approved without a reviewer.
#[must_use]
pub fn check_auto_approval(change: &StagedChangeView, rules: &[ApprovalRule]) -> bool {
    rules.iter().all(|rule| rule.veto_reason(change).is_none())
}

/// Load and validate approval rules from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_approval_rules(path: &Path) -> Result<ApprovalRulesFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::RulesFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let rules_file: ApprovalRulesFile =
        serde_yaml::from_str(&content).map_err(ConfigError::RulesFileParse)?;

    validate_rules(&rules_file)?;

    Ok(rules_file)
}

fn validate_rules(rules_file: &ApprovalRulesFile) -> Result<(), ConfigError> {
    let mut seen_names = HashSet::new();

    for rule in &rules_file.rules {
        if rule.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "approval rule name must be non-empty".to_string(),
            ));
        }

        if !seen_names.insert(rule.name.to_lowercase()) {
            return Err(ConfigError::Validation(format!(
                "duplicate approval rule name: '{}'",
                rule.name
            )));
        }

        if rule.max_price_change.is_some_and(|m| m.is_sign_negative()) {
            return Err(ConfigError::Validation(format!(
                "approval rule '{}' has a negative max_price_change",
                rule.name
            )));
        }
    }

    Ok(())
}
