//! Type Registry
//!
//! Holds the validated content type declarations as an immutable
//! [`TypeSnapshot`] published through an `ArcSwap`. Readers pin a snapshot
//! and never block; a load validates a whole batch into a new snapshot and
//! swaps it in only if every declaration passed, so no partially loaded
//! registry is ever observable.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwap;
use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use regex::Regex;
use tracing::{debug, info};

use crate::checksum::Checksum;
use crate::error::{ContentError, Result, SchemaViolation};
use crate::schema::{TypeDeclarations, TypeDefinition};

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("static pattern"))
}

/// One immutable, fully validated generation of the registry
#[derive(Debug)]
pub struct TypeSnapshot {
    /// Definitions by id
    types: HashMap<String, Arc<TypeDefinition>>,
    /// Ids in declaration order
    order: Vec<String>,
    /// Edge `a -> b` when `a` declares `b` in `referenced_types`
    graph: DiGraph<String, ()>,
    nodes: HashMap<String, NodeIndex>,
    fingerprint: Checksum,
}

impl TypeSnapshot {
    /// The registry before anything was loaded
    pub fn empty() -> Self {
        Self {
            types: HashMap::new(),
            order: Vec::new(),
            graph: DiGraph::new(),
            nodes: HashMap::new(),
            fingerprint: Checksum::of_definitions(std::iter::empty()),
        }
    }

    /// Validate a batch of declarations into a snapshot.
    ///
    /// Reports the first violation in declaration order. Structural checks on
    /// every type run before reference resolution, so a type may reference
    /// one declared after it.
    pub fn build(declarations: TypeDeclarations) -> std::result::Result<Self, SchemaViolation> {
        let mut types = HashMap::with_capacity(declarations.len());
        let mut order = Vec::with_capacity(declarations.len());

        for def in declarations.types {
            validate_definition(&def)?;
            if types.contains_key(&def.id) {
                return Err(SchemaViolation::DuplicateTypeId(def.id));
            }
            order.push(def.id.clone());
            types.insert(def.id.clone(), Arc::new(def));
        }

        let mut graph = DiGraph::with_capacity(order.len(), order.len());
        let nodes: HashMap<String, NodeIndex> = order
            .iter()
            .map(|id| (id.clone(), graph.add_node(id.clone())))
            .collect();

        for id in &order {
            let def = &types[id];
            for target in &def.referenced_types {
                let Some(&to) = nodes.get(target) else {
                    return Err(SchemaViolation::UndeclaredTarget {
                        type_id: id.clone(),
                        target: target.clone(),
                    });
                };
                graph.add_edge(nodes[id], to, ());
            }
        }

        let fingerprint = Checksum::of_definitions(types.values().map(|d| d.as_ref()));
        Ok(Self {
            types,
            order,
            graph,
            nodes,
            fingerprint,
        })
    }

    /// Look up a definition by type id
    pub fn get(&self, type_id: &str) -> Result<Arc<TypeDefinition>> {
        self.types
            .get(type_id)
            .cloned()
            .ok_or_else(|| ContentError::UnknownType {
                type_id: type_id.to_string(),
                suggestion: self.suggest(type_id),
            })
    }

    pub fn contains(&self, type_id: &str) -> bool {
        self.types.contains_key(type_id)
    }

    /// Type ids in declaration order
    pub fn type_ids(&self) -> &[String] {
        &self.order
    }

    /// Definitions in declaration order
    pub fn definitions(&self) -> impl Iterator<Item = &Arc<TypeDefinition>> {
        self.order.iter().map(move |id| &self.types[id])
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn fingerprint(&self) -> &Checksum {
        &self.fingerprint
    }

    /// Types whose declarations allow linking to `type_id`
    pub fn referencing_types(&self, type_id: &str) -> Vec<String> {
        let Some(&idx) = self.nodes.get(type_id) else {
            return Vec::new();
        };
        let mut ids: Vec<String> = self
            .graph
            .neighbors_directed(idx, Direction::Incoming)
            .map(|n| self.graph[n].clone())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Groups of types that (transitively) reference each other, such as
    /// `erratum` and `rpm`. Each group and the list are sorted.
    pub fn mutual_reference_groups(&self) -> Vec<Vec<String>> {
        let mut groups: Vec<Vec<String>> = kosaraju_scc(&self.graph)
            .into_iter()
            .filter(|scc| scc.len() > 1)
            .map(|scc| {
                let mut ids: Vec<String> = scc.into_iter().map(|n| self.graph[n].clone()).collect();
                ids.sort();
                ids
            })
            .collect();
        groups.sort();
        groups
    }

    /// Closest declared id within a small edit distance
    pub fn suggest(&self, type_id: &str) -> Option<String> {
        self.order
            .iter()
            .min_by_key(|id| strsim::levenshtein(type_id, id))
            .filter(|id| strsim::levenshtein(type_id, id) <= 2)
            .cloned()
    }

    /// Fuzzy search over type ids and display names, best match first
    pub fn search(&self, query: &str) -> Vec<(String, i64)> {
        use fuzzy_matcher::skim::SkimMatcherV2;
        use fuzzy_matcher::FuzzyMatcher;

        let matcher = SkimMatcherV2::default();
        let mut results: Vec<(String, i64)> = self
            .definitions()
            .filter_map(|def| {
                let by_id = matcher.fuzzy_match(&def.id, query);
                let by_name = matcher.fuzzy_match(&def.display_name, query);
                by_id.max(by_name).map(|score| (def.id.clone(), score))
            })
            .collect();
        results.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        results
    }

    /// Render the reference graph in Graphviz DOT
    pub fn to_dot(&self) -> String {
        let mut output = String::new();
        output.push_str("digraph ContentTypes {\n");
        output.push_str("  rankdir=LR;\n");
        output.push_str("  node [shape=box, style=rounded, fontname=\"Helvetica\"];\n\n");

        for def in self.definitions() {
            output.push_str(&format!(
                "  \"{}\" [label=\"{}\\n[{}]\"];\n",
                dot_escape(&def.id),
                dot_escape(&def.display_name),
                dot_escape(&def.unit_key.join(", "))
            ));
        }
        output.push('\n');
        for def in self.definitions() {
            for target in &def.referenced_types {
                output.push_str(&format!(
                    "  \"{}\" -> \"{}\";\n",
                    dot_escape(&def.id),
                    dot_escape(target)
                ));
            }
        }
        output.push_str("}\n");
        output
    }
}

/// Escape a quoted DOT id or label
fn dot_escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

fn validate_definition(def: &TypeDefinition) -> std::result::Result<(), SchemaViolation> {
    check_identifier(&def.id)?;
    if def.unit_key.is_empty() {
        return Err(SchemaViolation::EmptyUnitKey(def.id.clone()));
    }
    check_field_list(&def.id, "unit_key", &def.unit_key)?;
    check_field_list(&def.id, "search_indexes", &def.search_indexes)?;
    check_field_list(&def.id, "referenced_types", &def.referenced_types)?;
    Ok(())
}

fn check_identifier(name: &str) -> std::result::Result<(), SchemaViolation> {
    if identifier_pattern().is_match(name) {
        Ok(())
    } else {
        Err(SchemaViolation::InvalidIdentifier(name.to_string()))
    }
}

fn check_field_list(
    type_id: &str,
    list: &'static str,
    fields: &[String],
) -> std::result::Result<(), SchemaViolation> {
    let mut seen = HashSet::with_capacity(fields.len());
    for field in fields {
        check_identifier(field)?;
        if !seen.insert(field.as_str()) {
            return Err(SchemaViolation::DuplicateField {
                type_id: type_id.to_string(),
                list,
                field: field.clone(),
            });
        }
    }
    Ok(())
}

/// The swappable registry
pub struct TypeRegistry {
    snap: ArcSwap<TypeSnapshot>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self {
            snap: ArcSwap::from_pointee(TypeSnapshot::empty()),
        }
    }

    /// A registry holding `declarations`
    pub fn with_declarations(declarations: TypeDeclarations) -> Result<Self> {
        let snapshot = TypeSnapshot::build(declarations)?;
        Ok(Self {
            snap: ArcSwap::from_pointee(snapshot),
        })
    }

    /// Validate `declarations` and atomically replace the current snapshot.
    ///
    /// On error nothing changes.
    pub fn load(&self, declarations: TypeDeclarations) -> Result<Arc<TypeSnapshot>> {
        let snapshot = TypeSnapshot::build(declarations)?;
        Ok(self.publish(snapshot))
    }

    /// Swap in an already validated snapshot
    pub(crate) fn publish(&self, snapshot: TypeSnapshot) -> Arc<TypeSnapshot> {
        let snapshot = Arc::new(snapshot);
        let previous = self.snap.swap(Arc::clone(&snapshot));
        info!(
            types = snapshot.len(),
            fingerprint = snapshot.fingerprint().short(),
            previous = previous.fingerprint().short(),
            "published content type snapshot"
        );
        snapshot
    }

    /// Pin the current snapshot
    pub fn snapshot(&self) -> Arc<TypeSnapshot> {
        self.snap.load_full()
    }

    /// Look up a definition in the current snapshot
    pub fn get(&self, type_id: &str) -> Result<Arc<TypeDefinition>> {
        let result = self.snap.load().get(type_id);
        if result.is_err() {
            debug!(type_id, "lookup of undeclared content type");
        }
        result
    }

    pub fn fingerprint(&self) -> Checksum {
        self.snap.load().fingerprint().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rpm() -> TypeDefinition {
        TypeDefinition::new(
            "rpm",
            "RPM",
            ["name", "epoch", "version", "release", "arch", "checksumtype", "checksum"],
        )
        .with_indexes(["name", "filename"])
        .with_references(["erratum"])
    }

    fn erratum() -> TypeDefinition {
        TypeDefinition::new("erratum", "Erratum", ["id"])
            .with_indexes(["id", "title"])
            .with_references(["rpm"])
    }

    fn iso() -> TypeDefinition {
        TypeDefinition::new("iso", "ISO", ["name", "checksum", "size"])
    }

    fn schema_violation(result: Result<Arc<TypeSnapshot>>) -> SchemaViolation {
        match result {
            Err(ContentError::Schema(v)) => v,
            other => panic!("Expected schema error, got {:?}", other.map(|s| s.len())),
        }
    }

    #[test]
    fn test_load_and_get() {
        let registry = TypeRegistry::new();
        registry
            .load(TypeDeclarations::new(vec![rpm(), erratum(), iso()]))
            .unwrap();

        assert_eq!(*registry.get("rpm").unwrap(), rpm());
        assert_eq!(*registry.get("erratum").unwrap(), erratum());
        assert_eq!(*registry.get("iso").unwrap(), iso());
        assert_eq!(registry.snapshot().type_ids(), ["rpm", "erratum", "iso"]);
    }

    #[test]
    fn test_unknown_type_suggests() {
        let registry = TypeRegistry::with_declarations(TypeDeclarations::new(vec![rpm(), erratum()])).unwrap();
        match registry.get("srpm") {
            Err(ContentError::UnknownType { type_id, suggestion }) => {
                assert_eq!(type_id, "srpm");
                assert_eq!(suggestion.as_deref(), Some("rpm"));
            }
            other => panic!("Expected UnknownType, got {:?}", other),
        }
        assert!(matches!(
            registry.get("package_category"),
            Err(ContentError::UnknownType { suggestion: None, .. })
        ));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let registry = TypeRegistry::new();
        let v = schema_violation(registry.load(TypeDeclarations::new(vec![rpm(), erratum(), rpm()])));
        assert_eq!(v, SchemaViolation::DuplicateTypeId("rpm".to_string()));
    }

    #[test]
    fn test_empty_unit_key_rejected() {
        let empty: Vec<String> = Vec::new();
        let bad = TypeDefinition::new("iso", "ISO", empty);
        let v = schema_violation(TypeRegistry::new().load(TypeDeclarations::new(vec![bad])));
        assert_eq!(v, SchemaViolation::EmptyUnitKey("iso".to_string()));
    }

    #[test]
    fn test_duplicate_fields_rejected() {
        let bad = iso().with_indexes(["name", "size", "name"]);
        let v = schema_violation(TypeRegistry::new().load(TypeDeclarations::new(vec![bad])));
        assert_eq!(
            v,
            SchemaViolation::DuplicateField {
                type_id: "iso".to_string(),
                list: "search_indexes",
                field: "name".to_string(),
            }
        );

        let bad = TypeDefinition::new("iso", "ISO", ["name", "name"]);
        let v = schema_violation(TypeRegistry::new().load(TypeDeclarations::new(vec![bad])));
        assert!(matches!(v, SchemaViolation::DuplicateField { list: "unit_key", .. }));
    }

    #[test]
    fn test_undeclared_reference_rejected() {
        let v = schema_violation(TypeRegistry::new().load(TypeDeclarations::new(vec![rpm()])));
        assert_eq!(
            v,
            SchemaViolation::UndeclaredTarget {
                type_id: "rpm".to_string(),
                target: "erratum".to_string(),
            }
        );
    }

    #[test]
    fn test_invalid_identifier_rejected() {
        let bad = TypeDefinition::new("iso", "ISO", ["na me"]);
        let v = schema_violation(TypeRegistry::new().load(TypeDeclarations::new(vec![bad])));
        assert_eq!(v, SchemaViolation::InvalidIdentifier("na me".to_string()));
    }

    #[test]
    fn test_failed_load_keeps_previous_snapshot() {
        let registry = TypeRegistry::with_declarations(TypeDeclarations::new(vec![iso()])).unwrap();
        let before = registry.fingerprint();

        assert!(registry.load(TypeDeclarations::new(vec![rpm()])).is_err());
        assert_eq!(registry.fingerprint(), before);
        assert!(registry.get("iso").is_ok());
        assert!(registry.get("rpm").is_err());
    }

    #[test]
    fn test_pinned_snapshot_survives_reload() {
        let registry = TypeRegistry::with_declarations(TypeDeclarations::new(vec![iso()])).unwrap();
        let pinned = registry.snapshot();

        registry
            .load(TypeDeclarations::new(vec![rpm(), erratum()]))
            .unwrap();

        assert!(pinned.contains("iso"));
        assert!(!pinned.contains("rpm"));
        assert!(registry.get("iso").is_err());
    }

    #[test]
    fn test_reference_graph() {
        let snapshot = TypeSnapshot::build(TypeDeclarations::new(vec![rpm(), erratum(), iso()])).unwrap();
        assert_eq!(snapshot.referencing_types("erratum"), vec!["rpm"]);
        assert_eq!(snapshot.referencing_types("rpm"), vec!["erratum"]);
        assert!(snapshot.referencing_types("iso").is_empty());
        assert_eq!(
            snapshot.mutual_reference_groups(),
            vec![vec!["erratum".to_string(), "rpm".to_string()]]
        );

        let dot = snapshot.to_dot();
        assert!(dot.contains("\"rpm\" -> \"erratum\";"));
        assert!(dot.contains("\"erratum\" -> \"rpm\";"));
    }

    #[test]
    fn test_dot_labels_are_escaped() {
        let snapshot = TypeSnapshot::build(TypeDeclarations::new(vec![TypeDefinition::new(
            "iso",
            r#"ISO "9660" \ image"#,
            ["name"],
        )]))
        .unwrap();

        let dot = snapshot.to_dot();
        assert!(
            dot.contains(r#"  "iso" [label="ISO \"9660\" \\ image\n[name]"];"#),
            "{}",
            dot
        );
    }

    #[test]
    fn test_search() {
        let snapshot = TypeSnapshot::build(TypeDeclarations::new(vec![rpm(), erratum(), iso()])).unwrap();
        let results = snapshot.search("errat");
        assert_eq!(results.first().map(|r| r.0.as_str()), Some("erratum"));
    }
}
