//! Reference Resolver
//!
//! Links are directed edges between units. A type's `referenced_types` only
//! authorizes edges leaving units of that type, so `rpm -> erratum` and
//! `erratum -> rpm` are declared and checked independently even though the
//! RPM declaration set allows both.
//!
//! Edge lists are copy-on-write: [`LinkTable::targets`] hands out a pinned
//! [`References`] that can be walked any number of times while the table
//! keeps changing.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ContentError, Result};
use crate::identity::Identity;
use crate::schema::TypeDefinition;

/// A unit addressed by type and identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitRef {
    pub type_id: String,
    pub identity: Identity,
}

impl UnitRef {
    pub fn new(type_id: impl Into<String>, identity: Identity) -> Self {
        Self {
            type_id: type_id.into(),
            identity,
        }
    }
}

/// Fail unless `source` declares `target_type` in `referenced_types`
pub fn check_declared(source: &TypeDefinition, target_type: &str) -> Result<()> {
    if source.references(target_type) {
        Ok(())
    } else {
        Err(ContentError::UndeclaredReference {
            source_type: source.id.clone(),
            target_type: target_type.to_string(),
        })
    }
}

/// Pinned edge list in link-creation order
#[derive(Debug, Clone, Default)]
pub struct References {
    refs: Arc<Vec<UnitRef>>,
}

impl References {
    pub fn iter(&self) -> std::slice::Iter<'_, UnitRef> {
        self.refs.iter()
    }

    /// Identities only, for callers that already know the target type
    pub fn identities(&self) -> impl Iterator<Item = &Identity> {
        self.refs.iter().map(|r| &r.identity)
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }
}

impl<'a> IntoIterator for &'a References {
    type Item = &'a UnitRef;
    type IntoIter = std::slice::Iter<'a, UnitRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.refs.iter()
    }
}

/// Forward and reverse adjacency of all links
#[derive(Debug, Default)]
pub struct LinkTable {
    forward: HashMap<UnitRef, Arc<Vec<UnitRef>>>,
    reverse: HashMap<UnitRef, Arc<Vec<UnitRef>>>,
    edges: usize,
}

impl LinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `source -> target`; false when the edge already existed
    pub fn insert(&mut self, source: UnitRef, target: UnitRef) -> bool {
        let targets = self.forward.entry(source.clone()).or_default();
        if targets.contains(&target) {
            return false;
        }
        Arc::make_mut(targets).push(target.clone());
        Arc::make_mut(self.reverse.entry(target).or_default()).push(source);
        self.edges += 1;
        true
    }

    /// Remove `source -> target`; false when there was no such edge
    pub fn remove(&mut self, source: &UnitRef, target: &UnitRef) -> bool {
        if !detach(&mut self.forward, source, target) {
            return false;
        }
        detach(&mut self.reverse, target, source);
        self.edges -= 1;
        true
    }

    /// Drop every edge that starts or ends at `unit`
    pub fn remove_unit(&mut self, unit: &UnitRef) -> usize {
        let mut removed = 0;
        if let Some(targets) = self.forward.remove(unit) {
            for target in targets.iter() {
                detach(&mut self.reverse, target, unit);
                removed += 1;
            }
        }
        if let Some(sources) = self.reverse.remove(unit) {
            for source in sources.iter() {
                // Self-edges were detached with the forward list.
                if detach(&mut self.forward, source, unit) {
                    removed += 1;
                }
            }
        }
        self.edges -= removed;
        removed
    }

    /// Targets of `source`, in link-creation order
    pub fn targets(&self, source: &UnitRef) -> References {
        References {
            refs: self.forward.get(source).cloned().unwrap_or_default(),
        }
    }

    /// Units linking to `target`, in link-creation order
    pub fn sources(&self, target: &UnitRef) -> References {
        References {
            refs: self.reverse.get(target).cloned().unwrap_or_default(),
        }
    }

    pub fn contains(&self, source: &UnitRef, target: &UnitRef) -> bool {
        self.forward
            .get(source)
            .map(|t| t.contains(target))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.edges
    }

    pub fn is_empty(&self) -> bool {
        self.edges == 0
    }
}

fn detach(adjacency: &mut HashMap<UnitRef, Arc<Vec<UnitRef>>>, from: &UnitRef, to: &UnitRef) -> bool {
    let Some(list) = adjacency.get_mut(from) else {
        return false;
    };
    let Some(pos) = list.iter().position(|r| r == to) else {
        return false;
    };
    Arc::make_mut(list).remove(pos);
    if list.is_empty() {
        adjacency.remove(from);
    }
    true
}
