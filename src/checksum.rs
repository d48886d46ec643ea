//! SHA256 fingerprints of declaration snapshots

use sha2::{Digest, Sha256};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::schema::TypeDefinition;

/// SHA256 checksum over a canonical rendering of type declarations
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum(String);

impl Checksum {
    /// Fingerprint a set of definitions.
    ///
    /// Declaration order is not part of the fingerprint: definitions are
    /// hashed sorted by id. Snapshots track order separately.
    pub fn of_definitions<'a>(defs: impl IntoIterator<Item = &'a TypeDefinition>) -> Self {
        let mut defs: Vec<&TypeDefinition> = defs.into_iter().collect();
        defs.sort_by(|a, b| a.id.cmp(&b.id));

        let mut hasher = Sha256::new();
        for def in defs {
            // Struct field order is fixed, so this rendering is canonical.
            let rendered = serde_json::to_string(def).unwrap_or_default();
            hasher.update(rendered.as_bytes());
            hasher.update(b"\n");
        }
        Self(format!("{:x}", hasher.finalize()))
    }

    /// First 12 hex digits, for log lines
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
