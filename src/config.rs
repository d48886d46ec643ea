//! Configuration management for the content registry
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (content-registry.toml)
//! - Environment variables (CONTENT_REGISTRY__*)
//!
//! ## Example config file (content-registry.toml):
//! ```toml
//! [types]
//! dir = "/etc/pulp/types"
//! builtin = true
//!
//! [ingest]
//! mode = "upsert"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;
use crate::identity::IngestMode;
use crate::loader;
use crate::schema::TypeDeclarations;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Where type declarations come from
    #[serde(default)]
    pub types: TypesConfig,

    /// Ingest defaults
    #[serde(default)]
    pub ingest: IngestConfig,
}

/// Declaration source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypesConfig {
    /// File or directory of declaration documents
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Use the embedded declarations when `dir` is unset
    #[serde(default = "default_true")]
    pub builtin: bool,
}

/// Ingest settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Mode used when a caller does not pick one
    #[serde(default)]
    pub mode: IngestMode,
}

fn default_true() -> bool {
    true
}

impl Default for TypesConfig {
    fn default() -> Self {
        Self {
            dir: None,
            builtin: true,
        }
    }
}

impl RegistryConfig {
    /// Load configuration from default locations
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, adding `config_path` as a required source
    pub fn load_from(config_path: Option<&str>) -> std::result::Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = [
            "content-registry.toml",
            ".content-registry.toml",
            "config/content-registry.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(config_dir) = directories::ProjectDirs::from("org", "pulp", "content-registry") {
            let xdg_config = config_dir.config_dir().join("content-registry.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("CONTENT_REGISTRY")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Read the declarations this configuration points at.
    ///
    /// An explicit `dir` wins; otherwise the embedded set, if enabled.
    pub fn declarations(&self) -> Result<TypeDeclarations> {
        match &self.types.dir {
            Some(path) => loader::from_path(path),
            None if self.types.builtin => loader::builtin(),
            None => Ok(TypeDeclarations::default()),
        }
    }
}
