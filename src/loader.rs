//! Declaration Loading
//!
//! Reads `{"types": [...]}` documents from strings, files, directories or the
//! embedded built-in set. Documents are checked against a JSON Schema before
//! typed deserialization so structural problems point at a JSON path.

use std::fs;
use std::path::{Path, PathBuf};

use include_dir::{include_dir, Dir};
use jsonschema::JSONSchema;
use serde_json::{json, Value};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{Result, SchemaViolation};
use crate::schema::TypeDeclarations;

/// Declaration files shipped with the crate
static BUILTIN_TYPES: Dir<'static> = include_dir!("$CARGO_MANIFEST_DIR/types");

/// JSON Schema every declaration document must satisfy
fn document_schema() -> Value {
    let field_list = json!({"type": "array", "items": {"type": "string"}});
    json!({
        "type": "object",
        "required": ["types"],
        "additionalProperties": false,
        "properties": {
            "types": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["id", "display_name", "description", "unit_key", "search_indexes"],
                    "additionalProperties": false,
                    "properties": {
                        "id": {"type": "string"},
                        "display_name": {"type": "string"},
                        "description": {"type": "string"},
                        "unit_key": field_list,
                        "search_indexes": field_list,
                        "referenced_types": field_list
                    }
                }
            }
        }
    })
}

/// Configuration for directory loading
#[derive(Debug, Clone)]
pub struct LoadConfig {
    /// Skip files whose path (relative to the root) starts with one of these
    pub skip_prefixes: Vec<String>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            skip_prefixes: vec![".git/".to_string(), "target/".to_string()],
        }
    }
}

/// Validate and deserialize one declaration document
pub fn parse_declarations(document: &Value) -> Result<TypeDeclarations> {
    let schema = document_schema();
    let compiled = JSONSchema::compile(&schema)
        .map_err(|e| SchemaViolation::Malformed(format!("invalid document schema: {}", e)))?;

    if let Err(mut errors) = compiled.validate(document) {
        let message = match errors.next() {
            Some(error) => {
                let path = error.instance_path.to_string();
                if path.is_empty() {
                    error.to_string()
                } else {
                    format!("{}: {}", path, error)
                }
            }
            None => "document does not match the declaration schema".to_string(),
        };
        return Err(SchemaViolation::Malformed(message).into());
    }

    Ok(serde_json::from_value(document.clone())?)
}

/// Parse declarations from JSON text
pub fn from_str(content: &str) -> Result<TypeDeclarations> {
    let document: Value = serde_json::from_str(content)?;
    parse_declarations(&document)
}

/// Load declarations from one file
pub fn from_file(path: &Path) -> Result<TypeDeclarations> {
    let content = fs::read_to_string(path)?;
    from_str(&content).map_err(|e| with_source(e, path))
}

/// Load and concatenate every `*.json` file under `dir`, in path order
pub fn from_directory(dir: &Path, config: &LoadConfig) -> Result<TypeDeclarations> {
    let mut paths: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().map(|ext| ext == "json").unwrap_or(false))
        .filter(|p| {
            let relative = p.strip_prefix(dir).unwrap_or(p).to_string_lossy().replace('\\', "/");
            !config.skip_prefixes.iter().any(|prefix| relative.starts_with(prefix))
        })
        .collect();
    paths.sort();

    let mut declarations = TypeDeclarations::default();
    for path in paths {
        let batch = from_file(&path)?;
        debug!(path = %path.display(), types = batch.len(), "read declaration file");
        declarations.extend(batch);
    }
    Ok(declarations)
}

/// Load a file or a directory, whichever `path` is
pub fn from_path(path: &Path) -> Result<TypeDeclarations> {
    if path.is_dir() {
        from_directory(path, &LoadConfig::default())
    } else {
        from_file(path)
    }
}

/// The embedded RPM declaration set
pub fn builtin() -> Result<TypeDeclarations> {
    let mut files: Vec<(&Path, &str)> = Vec::new();
    collect_embedded_files(&BUILTIN_TYPES, &mut files);
    files.sort_by(|a, b| a.0.cmp(b.0));

    let mut declarations = TypeDeclarations::default();
    for (path, content) in files {
        declarations.extend(from_str(content).map_err(|e| with_source(e, path))?);
    }
    Ok(declarations)
}

fn collect_embedded_files<'a>(dir: &'a Dir<'static>, files: &mut Vec<(&'a Path, &'a str)>) {
    for file in dir.files() {
        let path = file.path();
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            if let Some(content) = file.contents_utf8() {
                files.push((path, content));
            }
        }
    }

    for subdir in dir.dirs() {
        collect_embedded_files(subdir, files);
    }
}

/// Prefix malformed-document errors with the file they came from
fn with_source(error: crate::ContentError, path: &Path) -> crate::ContentError {
    match error {
        crate::ContentError::Schema(SchemaViolation::Malformed(message)) => {
            SchemaViolation::Malformed(format!("{}: {}", path.display(), message)).into()
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ContentError;
    use tempfile::tempdir;

    #[test]
    fn test_builtin_declarations() {
        let decls = builtin().unwrap();
        let ids: Vec<_> = decls.types.iter().map(|t| t.id.as_str()).collect();
        for expected in [
            "distribution",
            "drpm",
            "erratum",
            "package_group",
            "package_category",
            "rpm",
            "srpm",
            "iso",
        ] {
            assert!(ids.contains(&expected), "missing builtin type {}", expected);
        }
    }

    #[test]
    fn test_missing_required_key_reports_path() {
        let err = from_str(r#"{"types": [{"id": "iso", "display_name": "ISO", "unit_key": ["name"], "search_indexes": []}]}"#)
            .unwrap_err();
        match err {
            ContentError::Schema(SchemaViolation::Malformed(message)) => {
                assert!(message.contains("/types/0"), "{}", message);
                assert!(message.contains("description"), "{}", message);
            }
            other => panic!("Expected Malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_wrong_field_list_type() {
        let err = from_str(
            r#"{"types": [{"id": "iso", "display_name": "ISO", "description": "",
                "unit_key": "name", "search_indexes": []}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ContentError::Schema(SchemaViolation::Malformed(_))));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(from_str("{\"types\": ["), Err(ContentError::Json(_))));
    }

    #[test]
    fn test_directory_concatenates_in_path_order() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("nested")).unwrap();
        fs::write(
            dir.path().join("b.json"),
            r#"{"types": [{"id": "rpm", "display_name": "RPM", "description": "",
                "unit_key": ["name"], "search_indexes": [], "referenced_types": ["erratum"]}]}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("a.json"),
            r#"{"types": [{"id": "erratum", "display_name": "Erratum", "description": "",
                "unit_key": ["id"], "search_indexes": ["id"]}]}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("nested/iso.json"),
            r#"{"types": [{"id": "iso", "display_name": "ISO", "description": "",
                "unit_key": ["name"], "search_indexes": []}]}"#,
        )
        .unwrap();
        fs::write(dir.path().join("README.md"), "not json").unwrap();

        let decls = from_directory(dir.path(), &LoadConfig::default()).unwrap();
        let ids: Vec<_> = decls.types.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["erratum", "rpm", "iso"]);
    }

    #[test]
    fn test_bad_file_named_in_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, r#"{"types": [{"id": 7}]}"#).unwrap();

        let err = from_path(&path).unwrap_err();
        assert!(err.to_string().contains("broken.json"), "{}", err);
    }
}
