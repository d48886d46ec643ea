//! Unit identity
//!
//! A unit's identity is the tuple of its unit-key field values, taken in the
//! order the type declares them. Two identities are equal iff the tuples are
//! equal position by position; values are compared as JSON without any
//! coercion, so `"0"` and `0` are different epochs.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{ContentError, Result};
use crate::schema::TypeDefinition;
use crate::unit::ContentUnit;

/// Ordered tuple of unit-key values.
///
/// Equality, hashing and ordering all go through a canonical JSON rendering
/// computed once at construction.
#[derive(Clone)]
pub struct Identity {
    values: Vec<Value>,
    canonical: String,
}

impl Identity {
    pub fn new(values: Vec<Value>) -> Self {
        let canonical = serde_json::to_string(&values).unwrap_or_default();
        Self { values, canonical }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for Identity {}

impl Hash for Identity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl PartialOrd for Identity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Identity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.canonical.cmp(&other.canonical)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity{}", self.canonical)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", value)?;
        }
        write!(f, ")")
    }
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.values.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Vec::<Value>::deserialize(deserializer).map(Identity::new)
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Identity {
    fn from(values: [T; N]) -> Self {
        Identity::new(values.into_iter().map(Into::into).collect())
    }
}

impl From<Vec<Value>> for Identity {
    fn from(values: Vec<Value>) -> Self {
        Identity::new(values)
    }
}

/// Extract the identity of `fields` under `def`.
///
/// Fails on the first unit-key field (in declared order) that is absent or
/// `null`.
pub fn compute_identity(def: &TypeDefinition, fields: &Map<String, Value>) -> Result<Identity> {
    let mut values = Vec::with_capacity(def.unit_key.len());
    for field in &def.unit_key {
        match fields.get(field) {
            Some(Value::Null) | None => {
                return Err(ContentError::MissingField {
                    type_id: def.id.clone(),
                    field: field.clone(),
                });
            }
            Some(value) => values.push(value.clone()),
        }
    }
    Ok(Identity::new(values))
}

/// How an ingest treats an identity that already exists
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestMode {
    /// Collisions are rejected with `DuplicateUnit`
    #[default]
    Strict,
    /// Collisions merge into the existing unit
    Upsert,
}

/// The unit namespace of one type: identity -> unit.
#[derive(Debug, Default)]
pub struct UnitSet {
    units: BTreeMap<Identity, ContentUnit>,
}

impl UnitSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check `identity` against the existing units.
    ///
    /// Strict mode fails on a collision; upsert mode hands back a copy of
    /// the prior unit so the caller can merge into it.
    pub fn check_unique(
        &self,
        type_id: &str,
        identity: &Identity,
        mode: IngestMode,
    ) -> Result<Option<ContentUnit>> {
        match (self.units.get(identity), mode) {
            (None, _) => Ok(None),
            (Some(_), IngestMode::Strict) => Err(ContentError::DuplicateUnit {
                type_id: type_id.to_string(),
                identity: identity.clone(),
            }),
            (Some(existing), IngestMode::Upsert) => Ok(Some(existing.clone())),
        }
    }

    pub fn get(&self, identity: &Identity) -> Option<&ContentUnit> {
        self.units.get(identity)
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.units.contains_key(identity)
    }

    /// Store `unit`, returning whatever previously held its identity
    pub fn put(&mut self, unit: ContentUnit) -> Option<ContentUnit> {
        self.units.insert(unit.identity.clone(), unit)
    }

    pub fn remove(&mut self, identity: &Identity) -> Option<ContentUnit> {
        self.units.remove(identity)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Units in identity order
    pub fn iter(&self) -> impl Iterator<Item = &ContentUnit> {
        self.units.values()
    }
}
