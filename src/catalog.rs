//! Content Catalog
//!
//! The engine behind the ingest and query interfaces. It owns the
//! [`TypeRegistry`], one store per declared type (units + index tables) and
//! the link table.
//!
//! Locking, outermost first:
//!
//! 1. `stores` map: shared by every operation, exclusive only for reload.
//! 2. One `RwLock` per type store. Ingest and delete hold the write lock for
//!    the whole identity check + index update + commit, which serialises
//!    concurrent ingests of one `(type_id, identity)`. Link takes read locks
//!    on both endpoint stores, in type id order.
//! 3. `links`.
//!
//! Because link holds its endpoint stores while committing the edge, and
//! delete holds its store while dropping edges, an edge can never survive
//! or be created against a deleted endpoint.

use std::collections::HashMap;
use std::ptr;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::checksum::Checksum;
use crate::compatibility;
use crate::error::{ContentError, Result, SchemaViolation};
use crate::identity::{Identity, IngestMode, UnitSet};
use crate::index::{IndexEntry, IndexTable};
use crate::reference::{check_declared, LinkTable, References, UnitRef};
use crate::registry::{TypeRegistry, TypeSnapshot};
use crate::schema::{TypeDeclarations, TypeDefinition};
use crate::unit::ContentUnit;

/// What an accepted ingest did
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    /// A new identity was stored
    Accepted { identity: Identity },
    /// Upsert merged new field values into an existing unit
    Updated {
        identity: Identity,
        previous: Box<ContentUnit>,
    },
    /// Upsert matched an existing unit and changed nothing
    Unchanged { identity: Identity },
}

impl IngestOutcome {
    pub fn identity(&self) -> &Identity {
        match self {
            IngestOutcome::Accepted { identity }
            | IngestOutcome::Updated { identity, .. }
            | IngestOutcome::Unchanged { identity } => identity,
        }
    }
}

/// Per-unit results of a batch ingest, in input order
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<Result<IngestOutcome>>,
}

impl BatchReport {
    pub fn accepted(&self) -> usize {
        self.count(|o| matches!(o, Ok(IngestOutcome::Accepted { .. })))
    }

    pub fn updated(&self) -> usize {
        self.count(|o| matches!(o, Ok(IngestOutcome::Updated { .. })))
    }

    pub fn unchanged(&self) -> usize {
        self.count(|o| matches!(o, Ok(IngestOutcome::Unchanged { .. })))
    }

    pub fn duplicates(&self) -> usize {
        self.count(|o| matches!(o, Err(ContentError::DuplicateUnit { .. })))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| o.is_err())
    }

    fn count(&self, pred: impl Fn(&Result<IngestOutcome>) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(*o)).count()
    }
}

/// What a reload did
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReloadReport {
    /// False when the new declarations matched the stored definitions and
    /// their order
    pub swapped: bool,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// Types whose index tables were rebuilt
    pub reindexed: Vec<String>,
}

/// Per-type counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeStats {
    pub type_id: String,
    pub units: usize,
    pub index_entries: usize,
}

/// Catalog-wide counters
#[derive(Debug, Clone, Serialize)]
pub struct CatalogStats {
    pub fingerprint: String,
    pub types: Vec<TypeStats>,
    pub links: usize,
}

struct TypeStore {
    def: Arc<TypeDefinition>,
    units: UnitSet,
    indexes: IndexTable,
}

impl TypeStore {
    fn new(def: Arc<TypeDefinition>) -> Self {
        let indexes = IndexTable::new(&def);
        Self {
            def,
            units: UnitSet::new(),
            indexes,
        }
    }
}

/// Registry, unit stores and links behind one API
pub struct Catalog {
    registry: TypeRegistry,
    stores: RwLock<HashMap<String, RwLock<TypeStore>>>,
    links: RwLock<LinkTable>,
}

impl Catalog {
    /// A catalog serving `declarations`
    pub fn new(declarations: TypeDeclarations) -> Result<Self> {
        let registry = TypeRegistry::with_declarations(declarations)?;
        let stores = stores_for(&registry.snapshot());
        Ok(Self {
            registry,
            stores: RwLock::new(stores),
            links: RwLock::new(LinkTable::new()),
        })
    }

    /// A catalog serving the embedded RPM declaration set
    pub fn builtin() -> Result<Self> {
        Self::new(crate::loader::builtin()?)
    }

    /// Pin the declarations the unit stores are currently built from
    pub fn snapshot(&self) -> Arc<TypeSnapshot> {
        self.registry.snapshot()
    }

    /// Look up a type definition
    pub fn definition(&self, type_id: &str) -> Result<Arc<TypeDefinition>> {
        self.registry.get(type_id)
    }

    // ----- ingest -----

    /// Ingest one unit.
    ///
    /// Strict mode rejects an existing identity with `DuplicateUnit`. Upsert
    /// mode merges `fields` into the existing unit.
    pub fn ingest(&self, type_id: &str, fields: Map<String, Value>, mode: IngestMode) -> Result<IngestOutcome> {
        let stores = self.stores.read();
        let store_lock = self.store(&stores, type_id)?;
        let mut store = store_lock.write();
        let TypeStore { def, units, indexes } = &mut *store;

        let unit = ContentUnit::new(def, fields)?;
        let identity = unit.identity.clone();

        let outcome = match units.check_unique(type_id, &identity, mode)? {
            None => {
                indexes.update_indexes(def, &unit);
                units.put(unit);
                IngestOutcome::Accepted {
                    identity: identity.clone(),
                }
            }
            Some(previous) => {
                let mut merged = previous.clone();
                if merged.merge(unit.fields) {
                    indexes.update_indexes(def, &merged);
                    units.put(merged);
                    IngestOutcome::Updated {
                        identity: identity.clone(),
                        previous: Box::new(previous),
                    }
                } else {
                    IngestOutcome::Unchanged {
                        identity: identity.clone(),
                    }
                }
            }
        };

        debug!(type_id, %identity, ?mode, "ingested unit");
        Ok(outcome)
    }

    /// Ingest a unit given as an arbitrary JSON value (must be an object)
    pub fn ingest_value(&self, type_id: &str, value: Value, mode: IngestMode) -> Result<IngestOutcome> {
        match value {
            Value::Object(fields) => self.ingest(type_id, fields, mode),
            _ => Err(ContentError::InvalidUnit),
        }
    }

    /// Ingest many units; each succeeds or fails on its own
    pub fn ingest_batch(
        &self,
        type_id: &str,
        units: impl IntoIterator<Item = Value>,
        mode: IngestMode,
    ) -> BatchReport {
        let outcomes: Vec<_> = units
            .into_iter()
            .map(|value| self.ingest_value(type_id, value, mode))
            .collect();
        let report = BatchReport { outcomes };
        info!(
            type_id,
            accepted = report.accepted(),
            updated = report.updated(),
            failed = report.failed(),
            "batch ingest finished"
        );
        report
    }

    // ----- queries -----

    /// Fetch a unit by identity
    pub fn get_unit(&self, type_id: &str, identity: &Identity) -> Result<Option<ContentUnit>> {
        let stores = self.stores.read();
        let store = self.store(&stores, type_id)?.read();
        Ok(store.units.get(identity).cloned())
    }

    /// Units whose indexed `field` holds `value`
    pub fn find_by_index(&self, type_id: &str, field: &str, value: &Value) -> Result<Vec<ContentUnit>> {
        let stores = self.stores.read();
        let store = self.store(&stores, type_id)?.read();
        let identities = store.indexes.lookup(field, value)?;
        Ok(identities
            .iter()
            .filter_map(|identity| store.units.get(identity).cloned())
            .collect())
    }

    /// The index entries currently held for a unit
    pub fn index_entries(&self, type_id: &str, identity: &Identity) -> Result<Vec<IndexEntry>> {
        let stores = self.stores.read();
        let store = self.store(&stores, type_id)?.read();
        Ok(store.indexes.entries(identity).to_vec())
    }

    /// All units of a type, in identity order
    pub fn units(&self, type_id: &str) -> Result<Vec<ContentUnit>> {
        let stores = self.stores.read();
        let store = self.store(&stores, type_id)?.read();
        Ok(store.units.iter().cloned().collect())
    }

    // ----- deletion -----

    /// Remove a unit together with its index entries and every link that
    /// touches it. Returns the removed unit, if there was one.
    pub fn delete(&self, type_id: &str, identity: &Identity) -> Result<Option<ContentUnit>> {
        let stores = self.stores.read();
        let mut store = self.store(&stores, type_id)?.write();
        if !store.units.contains(identity) {
            return Ok(None);
        }

        let edges = self
            .links
            .write()
            .remove_unit(&UnitRef::new(type_id, identity.clone()));
        let entries = store.indexes.drop_indexes(identity);
        let removed = store.units.remove(identity);

        debug!(type_id, %identity, edges, entries, "deleted unit");
        Ok(removed)
    }

    // ----- references -----

    /// Link two existing units.
    ///
    /// Returns false when the edge already existed.
    pub fn link(
        &self,
        source_type: &str,
        source_identity: &Identity,
        target_type: &str,
        target_identity: &Identity,
    ) -> Result<bool> {
        let stores = self.stores.read();
        let source_lock = self.store(&stores, source_type)?;
        let target_lock = self.store(&stores, target_type)?;

        let with_endpoints = |source: &TypeStore, target: &TypeStore| -> Result<bool> {
            check_declared(&source.def, target_type)?;
            for (store, identity) in [(source, source_identity), (target, target_identity)] {
                if !store.units.contains(identity) {
                    return Err(ContentError::DanglingReference {
                        type_id: store.def.id.clone(),
                        identity: identity.clone(),
                    });
                }
            }
            Ok(self.links.write().insert(
                UnitRef::new(source_type, source_identity.clone()),
                UnitRef::new(target_type, target_identity.clone()),
            ))
        };

        let created = if ptr::eq(source_lock, target_lock) {
            let guard = source_lock.read();
            with_endpoints(&*guard, &*guard)?
        } else if source_type < target_type {
            let source = source_lock.read();
            let target = target_lock.read();
            with_endpoints(&*source, &*target)?
        } else {
            let target = target_lock.read();
            let source = source_lock.read();
            with_endpoints(&*source, &*target)?
        };

        debug!(
            source_type,
            %source_identity,
            target_type,
            %target_identity,
            created,
            "linked units"
        );
        Ok(created)
    }

    /// Remove a link; false when there was none
    pub fn unlink(
        &self,
        source_type: &str,
        source_identity: &Identity,
        target_type: &str,
        target_identity: &Identity,
    ) -> Result<bool> {
        let stores = self.stores.read();
        self.store(&stores, source_type)?;
        self.store(&stores, target_type)?;
        Ok(self.links.write().remove(
            &UnitRef::new(source_type, source_identity.clone()),
            &UnitRef::new(target_type, target_identity.clone()),
        ))
    }

    /// Units linked from the given unit, in link-creation order
    pub fn resolve(&self, source_type: &str, source_identity: &Identity) -> Result<References> {
        let stores = self.stores.read();
        self.store(&stores, source_type)?;
        Ok(self
            .links
            .read()
            .targets(&UnitRef::new(source_type, source_identity.clone())))
    }

    /// Units linking to the given unit, in link-creation order
    pub fn referrers(&self, target_type: &str, target_identity: &Identity) -> Result<References> {
        let stores = self.stores.read();
        self.store(&stores, target_type)?;
        Ok(self
            .links
            .read()
            .sources(&UnitRef::new(target_type, target_identity.clone())))
    }

    // ----- reload -----

    /// Replace the type declarations.
    ///
    /// The new batch is validated first; a type that currently holds units
    /// must still be declared with the same `unit_key`. Types whose
    /// `search_indexes` changed are reindexed. On any error nothing changes.
    ///
    /// The fingerprint ignores declaration order, so a batch that only
    /// reorders the current types still swaps in the new order.
    pub fn reload(&self, declarations: TypeDeclarations) -> Result<ReloadReport> {
        let candidate = TypeSnapshot::build(declarations)?;
        let mut stores = self.stores.write();
        let current = self.registry.snapshot();

        let stored: Vec<Arc<TypeDefinition>> = stores
            .values()
            .map(|store| Arc::clone(&store.read().def))
            .collect();
        let applied = Checksum::of_definitions(stored.iter().map(|def| def.as_ref()));
        if candidate.fingerprint() == &applied && candidate.type_ids() == current.type_ids() {
            debug!("reload skipped, declarations unchanged");
            return Ok(ReloadReport::default());
        }

        let mut reindex = Vec::new();
        for type_id in current.type_ids() {
            let Some(store_lock) = stores.get(type_id) else {
                continue;
            };
            let store = store_lock.read();
            let new_def = candidate.get(type_id).ok();
            let result = compatibility::compare(&store.def, new_def.as_deref());
            if result.is_breaking() && !store.units.is_empty() {
                let reason = result.breaking_reason().unwrap_or("incompatible change").to_string();
                warn!(type_id, units = store.units.len(), %reason, "reload rejected");
                return Err(SchemaViolation::Incompatible {
                    type_id: type_id.clone(),
                    reason,
                }
                .into());
            }
            if result.needs_reindex() {
                reindex.push(type_id.clone());
            }
        }

        let snapshot = self.registry.publish(candidate);
        let mut report = ReloadReport {
            swapped: true,
            ..ReloadReport::default()
        };

        stores.retain(|type_id, _| {
            let keep = snapshot.contains(type_id);
            if !keep {
                report.removed.push(type_id.clone());
            }
            keep
        });

        for def in snapshot.definitions() {
            match stores.get(&def.id) {
                None => {
                    stores.insert(def.id.clone(), RwLock::new(TypeStore::new(Arc::clone(def))));
                    report.added.push(def.id.clone());
                }
                Some(store_lock) => {
                    let mut store = store_lock.write();
                    store.def = Arc::clone(def);
                    if reindex.contains(&def.id) {
                        let TypeStore { def, units, indexes } = &mut *store;
                        indexes.rebuild(def, units.iter());
                        report.reindexed.push(def.id.clone());
                    }
                }
            }
        }

        report.removed.sort();
        info!(
            added = report.added.len(),
            removed = report.removed.len(),
            reindexed = report.reindexed.len(),
            "reloaded content types"
        );
        Ok(report)
    }

    /// Counters per type, in declaration order
    pub fn stats(&self) -> CatalogStats {
        let stores = self.stores.read();
        let snapshot = self.registry.snapshot();
        let types = snapshot
            .type_ids()
            .iter()
            .filter_map(|type_id| {
                let store = stores.get(type_id)?.read();
                Some(TypeStats {
                    type_id: type_id.clone(),
                    units: store.units.len(),
                    index_entries: store.indexes.entry_count(),
                })
            })
            .collect();
        CatalogStats {
            fingerprint: snapshot.fingerprint().to_string(),
            types,
            links: self.links.read().len(),
        }
    }

    fn store<'a>(
        &self,
        stores: &'a HashMap<String, RwLock<TypeStore>>,
        type_id: &str,
    ) -> Result<&'a RwLock<TypeStore>> {
        stores.get(type_id).ok_or_else(|| ContentError::UnknownType {
            type_id: type_id.to_string(),
            suggestion: self.registry.snapshot().suggest(type_id),
        })
    }
}

fn stores_for(snapshot: &TypeSnapshot) -> HashMap<String, RwLock<TypeStore>> {
    snapshot
        .definitions()
        .map(|def| (def.id.clone(), RwLock::new(TypeStore::new(Arc::clone(def)))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalog() -> Catalog {
        Catalog::new(TypeDeclarations::new(declarations())).unwrap()
    }

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_upsert_reports_previous() {
        let catalog = catalog();
        catalog
            .ingest("erratum", fields(json!({"id": "E1", "severity": "Low"})), IngestMode::Strict)
            .unwrap();

        let outcome = catalog
            .ingest("erratum", fields(json!({"id": "E1", "severity": "High"})), IngestMode::Upsert)
            .unwrap();
        match outcome {
            IngestOutcome::Updated { previous, .. } => {
                assert_eq!(previous.field("severity"), Some(&json!("Low")));
            }
            other => panic!("Expected Updated, got {:?}", other),
        }

        let high = catalog.find_by_index("erratum", "severity", &json!("High")).unwrap();
        assert_eq!(high.len(), 1);
        assert!(catalog
            .find_by_index("erratum", "severity", &json!("Low"))
            .unwrap()
            .is_empty());

        let again = catalog
            .ingest("erratum", fields(json!({"id": "E1", "severity": "High"})), IngestMode::Upsert)
            .unwrap();
        assert!(matches!(again, IngestOutcome::Unchanged { .. }));
    }

    #[test]
    fn test_delete_drops_indexes_and_links() {
        let catalog = catalog();
        catalog
            .ingest("rpm", fields(json!({"name": "foo", "version": "1", "arch": "noarch"})), IngestMode::Strict)
            .unwrap();
        catalog
            .ingest("erratum", fields(json!({"id": "E1"})), IngestMode::Strict)
            .unwrap();
        let foo = Identity::from(["foo", "1"]);
        let e1 = Identity::from(["E1"]);
        assert!(catalog.link("rpm", &foo, "erratum", &e1).unwrap());

        let removed = catalog.delete("erratum", &e1).unwrap();
        assert_eq!(removed.map(|u| u.identity), Some(e1.clone()));
        assert!(catalog.resolve("rpm", &foo).unwrap().is_empty());
        assert!(catalog.index_entries("erratum", &e1).unwrap().is_empty());
        assert_eq!(catalog.stats().links, 0);
        assert!(catalog.delete("erratum", &e1).unwrap().is_none());
    }

    #[test]
    fn test_unknown_type_everywhere() {
        let catalog = catalog();
        let id = Identity::from(["x"]);
        assert!(matches!(
            catalog.ingest("srpm", Map::new(), IngestMode::Strict),
            Err(ContentError::UnknownType { suggestion: Some(s), .. }) if s == "rpm"
        ));
        assert!(matches!(catalog.get_unit("iso", &id), Err(ContentError::UnknownType { .. })));
        assert!(matches!(catalog.resolve("iso", &id), Err(ContentError::UnknownType { .. })));
    }

    #[test]
    fn test_reload_reindexes_changed_indexes() {
        let catalog = catalog();
        catalog
            .ingest("erratum", fields(json!({"id": "E1", "title": "Fix"})), IngestMode::Strict)
            .unwrap();
        assert!(matches!(
            catalog.find_by_index("erratum", "title", &json!("Fix")),
            Err(ContentError::NotIndexed { .. })
        ));

        let report = catalog
            .reload(TypeDeclarations::new(vec![
                TypeDefinition::new("rpm", "RPM", ["name", "version"])
                    .with_indexes(["name", "arch"])
                    .with_references(["erratum"]),
                TypeDefinition::new("erratum", "Erratum", ["id"]).with_indexes(["id", "title"]),
                TypeDefinition::new("iso", "ISO", ["name"]),
            ]))
            .unwrap();

        assert!(report.swapped);
        assert_eq!(report.added, vec!["iso"]);
        assert_eq!(report.reindexed, vec!["erratum"]);
        assert_eq!(
            catalog.find_by_index("erratum", "title", &json!("Fix")).unwrap().len(),
            1
        );
    }

    #[test]
    fn test_reload_refuses_to_orphan_units() {
        let catalog = catalog();
        catalog
            .ingest("erratum", fields(json!({"id": "E1"})), IngestMode::Strict)
            .unwrap();
        let before = catalog.snapshot().fingerprint().clone();

        let rekeyed = TypeDeclarations::new(vec![
            TypeDefinition::new("rpm", "RPM", ["name", "version"]).with_references(["erratum"]),
            TypeDefinition::new("erratum", "Erratum", ["id", "version"]),
        ]);
        match catalog.reload(rekeyed) {
            Err(ContentError::Schema(SchemaViolation::Incompatible { type_id, .. })) => {
                assert_eq!(type_id, "erratum")
            }
            other => panic!("Expected Incompatible, got {:?}", other),
        }
        assert_eq!(catalog.snapshot().fingerprint(), &before);

        // rpm holds no units, so dropping it is fine
        let report = catalog
            .reload(TypeDeclarations::new(vec![TypeDefinition::new("erratum", "Erratum", ["id"])]))
            .unwrap();
        assert_eq!(report.removed, vec!["rpm"]);
        assert!(catalog.get_unit("erratum", &Identity::from(["E1"])).unwrap().is_some());
    }

    fn declarations() -> Vec<TypeDefinition> {
        vec![
            TypeDefinition::new("rpm", "RPM", ["name", "version"])
                .with_indexes(["name", "arch"])
                .with_references(["erratum"]),
            TypeDefinition::new("erratum", "Erratum", ["id"]).with_indexes(["id", "severity"]),
        ]
    }

    #[test]
    fn test_reload_same_declarations_is_noop() {
        let catalog = catalog();
        let report = catalog.reload(TypeDeclarations::new(declarations())).unwrap();
        assert!(!report.swapped);
    }

    #[test]
    fn test_reload_reorder_only_swaps_order() {
        let catalog = catalog();
        let mut reordered = declarations();
        reordered.reverse();
        let before = catalog.snapshot().fingerprint().clone();

        let report = catalog.reload(TypeDeclarations::new(reordered)).unwrap();
        assert!(report.swapped);
        assert!(report.added.is_empty());
        assert!(report.removed.is_empty());
        assert!(report.reindexed.is_empty());

        assert_eq!(catalog.snapshot().fingerprint(), &before);
        assert_eq!(catalog.snapshot().type_ids().to_vec(), vec!["erratum", "rpm"]);
        let order: Vec<_> = catalog.stats().types.into_iter().map(|t| t.type_id).collect();
        assert_eq!(order, vec!["erratum", "rpm"]);
    }

    #[test]
    fn test_reloaded_types_are_served_by_stores() {
        let catalog = catalog();
        let pinned = catalog.snapshot();
        let mut with_iso = declarations();
        with_iso.push(TypeDefinition::new("iso", "ISO", ["name", "checksum", "size"]));

        let report = catalog.reload(TypeDeclarations::new(with_iso.clone())).unwrap();
        assert!(report.swapped);
        assert_eq!(report.added, vec!["iso"]);

        assert!(catalog.definition("iso").is_ok());
        let outcome = catalog
            .ingest(
                "iso",
                fields(json!({"name": "boot.iso", "checksum": "abc", "size": 1024})),
                IngestMode::Strict,
            )
            .unwrap();
        assert!(matches!(outcome, IngestOutcome::Accepted { .. }));

        // the earlier snapshot is unaffected, and reloading the same set is a no-op
        assert!(!pinned.contains("iso"));
        assert!(!catalog.reload(TypeDeclarations::new(with_iso)).unwrap().swapped);
        assert_eq!(catalog.units("iso").unwrap().len(), 1);
    }
}
