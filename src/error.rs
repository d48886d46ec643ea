//! Error types for the content registry

use thiserror::Error;

use crate::identity::Identity;

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, ContentError>;

/// Structural problems found while loading type declarations.
///
/// Any of these aborts the whole load; the previous snapshot stays current.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaViolation {
    #[error("type id '{0}' is declared more than once")]
    DuplicateTypeId(String),

    #[error("type '{0}' declares an empty unit_key")]
    EmptyUnitKey(String),

    #[error("type '{type_id}' lists field '{field}' more than once in {list}")]
    DuplicateField {
        type_id: String,
        list: &'static str,
        field: String,
    },

    #[error("type '{type_id}' references undeclared type '{target}'")]
    UndeclaredTarget { type_id: String, target: String },

    #[error("'{0}' is not a valid identifier")]
    InvalidIdentifier(String),

    #[error("declaration document is malformed: {0}")]
    Malformed(String),

    #[error("reload would orphan stored units of type '{type_id}': {reason}")]
    Incompatible { type_id: String, reason: String },
}

/// Content registry errors
#[derive(Error, Debug)]
pub enum ContentError {
    #[error("schema error: {0}")]
    Schema(#[from] SchemaViolation),

    #[error("unknown content type '{type_id}'{}", suggestion_hint(.suggestion))]
    UnknownType {
        type_id: String,
        suggestion: Option<String>,
    },

    #[error("unit of type '{type_id}' is missing unit key field '{field}'")]
    MissingField { type_id: String, field: String },

    #[error("unit of type '{type_id}' with identity {identity} already exists")]
    DuplicateUnit { type_id: String, identity: Identity },

    #[error("type '{source_type}' does not declare references to '{target_type}'")]
    UndeclaredReference {
        source_type: String,
        target_type: String,
    },

    #[error("no unit of type '{type_id}' with identity {identity}")]
    DanglingReference { type_id: String, identity: Identity },

    #[error("field '{field}' is not a search index of type '{type_id}'")]
    NotIndexed { type_id: String, field: String },

    #[error("unit fields must be a JSON object")]
    InvalidUnit,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn suggestion_hint(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!(" (did you mean '{}'?)", s),
        None => String::new(),
    }
}
