//! Content units

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ContentError, Result};
use crate::identity::{compute_identity, Identity};
use crate::schema::TypeDefinition;

/// One concrete record of a content type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentUnit {
    /// Owning type id
    pub type_id: String,
    /// Field name -> value; always holds every unit-key field
    pub fields: Map<String, Value>,
    /// Unit-key values in declared order
    pub identity: Identity,
    /// When the identity was first accepted
    pub created_at: DateTime<Utc>,
    /// When the stored fields last changed
    pub updated_at: DateTime<Utc>,
}

impl ContentUnit {
    /// Build a unit, computing its identity under `def`
    pub fn new(def: &TypeDefinition, fields: Map<String, Value>) -> Result<Self> {
        let identity = compute_identity(def, &fields)?;
        let now = Utc::now();
        Ok(Self {
            type_id: def.id.clone(),
            fields,
            identity,
            created_at: now,
            updated_at: now,
        })
    }

    /// Build a unit from an arbitrary JSON value, which must be an object
    pub fn from_value(def: &TypeDefinition, value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Self::new(def, fields),
            _ => Err(ContentError::InvalidUnit),
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Merge `incoming` over this unit for an upsert.
    ///
    /// Supplied fields replace stored ones, fields not supplied are kept.
    /// Returns false when nothing changed.
    pub fn merge(&mut self, incoming: Map<String, Value>) -> bool {
        let mut changed = false;
        for (name, value) in incoming {
            if self.fields.get(&name) != Some(&value) {
                self.fields.insert(name, value);
                changed = true;
            }
        }
        if changed {
            self.updated_at = Utc::now();
        }
        changed
    }
}
