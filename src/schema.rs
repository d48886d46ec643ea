//! Content type declarations
//!
//! The shape read from a declaration document:
//!
//! ```json
//! {"types": [
//!     {"id": "erratum", "display_name": "Erratum", "description": "...",
//!      "unit_key": ["id"], "search_indexes": ["id", "title"],
//!      "referenced_types": ["rpm"]}
//! ]}
//! ```

use serde::{Deserialize, Serialize};

/// One content kind.
///
/// Definitions are validated once by [`crate::TypeRegistry::load`] and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeDefinition {
    /// Unique type id (e.g. "rpm", "erratum")
    pub id: String,
    /// Human readable name
    pub display_name: String,
    /// Free-form description
    pub description: String,
    /// Ordered fields composing a unit's identity
    pub unit_key: Vec<String>,
    /// Fields that must be queryable
    pub search_indexes: Vec<String>,
    /// Types units of this type may link to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub referenced_types: Vec<String>,
}

impl TypeDefinition {
    /// Create a definition with no search indexes or references
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        unit_key: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            description: String::new(),
            unit_key: unit_key.into_iter().map(Into::into).collect(),
            search_indexes: Vec::new(),
            referenced_types: Vec::new(),
        }
    }

    /// Builder: set the searchable fields
    pub fn with_indexes(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.search_indexes = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Builder: set the referenced type ids
    pub fn with_references(mut self, types: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.referenced_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Whether units of this type may link to units of `target_type`
    pub fn references(&self, target_type: &str) -> bool {
        self.referenced_types.iter().any(|t| t == target_type)
    }
}

/// A batch of declarations, the unit of registry (re)load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeDeclarations {
    pub types: Vec<TypeDefinition>,
}

impl TypeDeclarations {
    pub fn new(types: Vec<TypeDefinition>) -> Self {
        Self { types }
    }

    /// Append every declaration of `other`, keeping order
    pub fn extend(&mut self, other: TypeDeclarations) {
        self.types.extend(other.types);
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_declaration() {
        let decls: TypeDeclarations = serde_json::from_value(serde_json::json!({
            "types": [{
                "id": "erratum",
                "display_name": "Erratum",
                "description": "Erratum advisory information",
                "unit_key": ["id"],
                "search_indexes": ["id", "title"],
                "referenced_types": ["rpm"]
            }]
        }))
        .unwrap();

        let erratum = &decls.types[0];
        assert_eq!(erratum.unit_key, vec!["id"]);
        assert!(erratum.references("rpm"));
        assert!(!erratum.references("srpm"));
        assert_eq!(erratum.search_indexes, vec!["id", "title"]);
    }

    #[test]
    fn test_referenced_types_optional() {
        let def: TypeDefinition = serde_json::from_str(
            r#"{"id": "iso", "display_name": "ISO", "description": "",
                "unit_key": ["name"], "search_indexes": []}"#,
        )
        .unwrap();
        assert!(def.referenced_types.is_empty());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let result: Result<TypeDefinition, _> = serde_json::from_str(
            r#"{"id": "iso", "display_name": "ISO", "description": "",
                "unit_key": ["name"], "search_indexes": [], "indexes": []}"#,
        );
        assert!(result.is_err());
    }
}
