//! Search index maintenance
//!
//! Every field a type lists in `search_indexes` gets a posting table mapping
//! field value -> identities holding it. Indexing is best-effort: a field the
//! unit does not carry (or carries as `null`) produces no entry. A field whose
//! value is an array produces one entry per distinct element, so an erratum
//! can be found by any one of its `references`.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ContentError, Result};
use crate::identity::Identity;
use crate::schema::TypeDefinition;
use crate::unit::ContentUnit;

/// One queryable projection of a unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub type_id: String,
    pub field_name: String,
    pub value: Value,
    /// Back-reference to the owning unit
    pub identity: Identity,
}

/// Compute the entries `unit` contributes under `def`.
///
/// Entries come out in `search_indexes` order, array elements in first
/// appearance order.
pub fn build_indexes(def: &TypeDefinition, unit: &ContentUnit) -> Vec<IndexEntry> {
    let mut entries = Vec::new();
    for field in &def.search_indexes {
        let values: Vec<&Value> = match unit.fields.get(field) {
            None | Some(Value::Null) => continue,
            Some(Value::Array(items)) => {
                let mut seen = BTreeSet::new();
                items
                    .iter()
                    .filter(|v| !v.is_null())
                    .filter(|v| seen.insert(value_key(v)))
                    .collect()
            }
            Some(value) => vec![value],
        };
        for value in values {
            entries.push(IndexEntry {
                type_id: def.id.clone(),
                field_name: field.clone(),
                value: value.clone(),
                identity: unit.identity.clone(),
            });
        }
    }
    entries
}

fn value_key(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

/// Index state for a single type
#[derive(Debug)]
pub struct IndexTable {
    type_id: String,
    postings: HashMap<String, HashMap<String, BTreeSet<Identity>>>,
    by_unit: HashMap<Identity, Vec<IndexEntry>>,
}

impl IndexTable {
    pub fn new(def: &TypeDefinition) -> Self {
        Self {
            type_id: def.id.clone(),
            postings: def
                .search_indexes
                .iter()
                .map(|f| (f.clone(), HashMap::new()))
                .collect(),
            by_unit: HashMap::new(),
        }
    }

    /// Replace the unit's entries with those of its current state.
    ///
    /// Calling this twice on an unchanged unit leaves the table as after the
    /// first call.
    pub fn update_indexes(&mut self, def: &TypeDefinition, unit: &ContentUnit) {
        self.drop_indexes(&unit.identity);

        let entries = build_indexes(def, unit);
        for entry in &entries {
            self.postings
                .entry(entry.field_name.clone())
                .or_default()
                .entry(value_key(&entry.value))
                .or_default()
                .insert(entry.identity.clone());
        }
        if !entries.is_empty() {
            self.by_unit.insert(unit.identity.clone(), entries);
        }
    }

    /// Remove every entry owned by `identity`, returning how many went
    pub fn drop_indexes(&mut self, identity: &Identity) -> usize {
        let Some(entries) = self.by_unit.remove(identity) else {
            return 0;
        };
        for entry in &entries {
            if let Some(by_value) = self.postings.get_mut(&entry.field_name) {
                let key = value_key(&entry.value);
                if let Some(holders) = by_value.get_mut(&key) {
                    holders.remove(identity);
                    if holders.is_empty() {
                        by_value.remove(&key);
                    }
                }
            }
        }
        entries.len()
    }

    /// Identities whose `field` holds `value`, in identity order
    pub fn lookup(&self, field: &str, value: &Value) -> Result<Vec<Identity>> {
        let by_value = self.postings.get(field).ok_or_else(|| ContentError::NotIndexed {
            type_id: self.type_id.clone(),
            field: field.to_string(),
        })?;
        Ok(by_value
            .get(&value_key(value))
            .map(|holders| holders.iter().cloned().collect())
            .unwrap_or_default())
    }

    /// Current entries for one unit
    pub fn entries(&self, identity: &Identity) -> &[IndexEntry] {
        self.by_unit.get(identity).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn entry_count(&self) -> usize {
        self.by_unit.values().map(Vec::len).sum()
    }

    /// Start over under a (possibly changed) definition
    pub fn rebuild<'a>(&mut self, def: &TypeDefinition, units: impl IntoIterator<Item = &'a ContentUnit>) {
        *self = IndexTable::new(def);
        for unit in units {
            self.update_indexes(def, unit);
        }
    }
}
