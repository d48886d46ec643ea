//! Content Type Registry
//!
//! Loads content type declarations (RPMs, errata, package groups,
//! distributions, ...) and enforces what they promise about content units:
//! unique composite identities, maintained search indexes and declared
//! cross-type references.
//!
//! ## Components
//!
//! - **Type Registry** ([`registry`]): validated, atomically swappable
//!   snapshot of type definitions
//! - **Identity Resolver** ([`identity`]): unit-key extraction and uniqueness
//! - **Index Maintainer** ([`index`]): per-field posting tables
//! - **Reference Resolver** ([`reference`]): directed links between units
//! - **Catalog** ([`catalog`]): the ingest/query surface tying them together
//!
//! ## Declaration format
//!
//! ```text
//! {"types": [
//!     {"id": "rpm", "display_name": "RPM", "description": "RPM",
//!      "unit_key": ["name", "epoch", "version", "release", "arch", "checksumtype", "checksum"],
//!      "search_indexes": ["name", "epoch", "version", "release", "arch", "filename", "checksum", "checksumtype"],
//!      "referenced_types": ["erratum"]},
//!     ...
//! ]}
//! ```

pub mod catalog;
pub mod checksum;
pub mod compatibility;
pub mod config;
pub mod error;
pub mod identity;
pub mod index;
pub mod loader;
pub mod reference;
pub mod registry;
pub mod schema;
pub mod unit;

pub use catalog::{BatchReport, Catalog, CatalogStats, IngestOutcome, ReloadReport};
pub use checksum::Checksum;
pub use config::RegistryConfig;
pub use error::{ContentError, Result, SchemaViolation};
pub use identity::{compute_identity, Identity, IngestMode};
pub use index::{build_indexes, IndexEntry};
pub use reference::{References, UnitRef};
pub use registry::{TypeRegistry, TypeSnapshot};
pub use schema::{TypeDeclarations, TypeDefinition};
pub use unit::ContentUnit;
