//! Declaration compatibility checking
//!
//! Compares the definition a type had in the current snapshot with the one a
//! reload would install, to decide whether units already stored under the old
//! definition can be carried over.

use serde::{Deserialize, Serialize};

use crate::schema::TypeDefinition;

/// Type of definition change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// The type is absent from the new declarations
    TypeRemoved,
    /// Unit key fields or their order changed
    UnitKeyChanged,
    /// Search indexes were added, removed or reordered
    IndexesChanged,
    /// Referenced types changed
    ReferencesChanged,
    /// Display name or description changed
    DocumentationChanged,
}

impl ChangeType {
    /// Whether stored units become unreachable under this change
    pub fn is_breaking(&self) -> bool {
        matches!(self, ChangeType::TypeRemoved | ChangeType::UnitKeyChanged)
    }
}

/// A detected change between two generations of one type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionChange {
    pub change_type: ChangeType,
    pub description: String,
}

/// Result of comparing one type across a reload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompatibilityResult {
    pub type_id: String,
    pub changes: Vec<DefinitionChange>,
}

impl CompatibilityResult {
    pub fn is_breaking(&self) -> bool {
        self.changes.iter().any(|c| c.change_type.is_breaking())
    }

    /// Whether the type's index tables must be rebuilt
    pub fn needs_reindex(&self) -> bool {
        self.changes
            .iter()
            .any(|c| c.change_type == ChangeType::IndexesChanged)
    }

    /// First breaking change, for error reporting
    pub fn breaking_reason(&self) -> Option<&str> {
        self.changes
            .iter()
            .find(|c| c.change_type.is_breaking())
            .map(|c| c.description.as_str())
    }
}

/// Compare `old` with its replacement (`None` when the reload drops the type)
pub fn compare(old: &TypeDefinition, new: Option<&TypeDefinition>) -> CompatibilityResult {
    let mut changes = Vec::new();
    let Some(new) = new else {
        changes.push(DefinitionChange {
            change_type: ChangeType::TypeRemoved,
            description: "type is no longer declared".to_string(),
        });
        return CompatibilityResult {
            type_id: old.id.clone(),
            changes,
        };
    };

    if old.unit_key != new.unit_key {
        changes.push(DefinitionChange {
            change_type: ChangeType::UnitKeyChanged,
            description: format!(
                "unit_key changed from [{}] to [{}]",
                old.unit_key.join(", "),
                new.unit_key.join(", ")
            ),
        });
    }
    if old.search_indexes != new.search_indexes {
        changes.push(DefinitionChange {
            change_type: ChangeType::IndexesChanged,
            description: format!(
                "search_indexes changed from [{}] to [{}]",
                old.search_indexes.join(", "),
                new.search_indexes.join(", ")
            ),
        });
    }
    if old.referenced_types != new.referenced_types {
        changes.push(DefinitionChange {
            change_type: ChangeType::ReferencesChanged,
            description: format!(
                "referenced_types changed from [{}] to [{}]",
                old.referenced_types.join(", "),
                new.referenced_types.join(", ")
            ),
        });
    }
    if old.display_name != new.display_name || old.description != new.description {
        changes.push(DefinitionChange {
            change_type: ChangeType::DocumentationChanged,
            description: "display name or description changed".to_string(),
        });
    }

    CompatibilityResult {
        type_id: old.id.clone(),
        changes,
    }
}
