//! Type registry: the runtime source of truth for supported document types.
//!
//! Loaded once from a declarative YAML schema. If the schema cannot be read
//! or parsed, a small built-in table is used instead so the pipeline keeps
//! running with reduced type coverage.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("cannot read type schema {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid type schema: {0}")]
    Parse(String),

    #[error("type schema defines no document types")]
    Empty,

    #[error("document type '{type_name}' names unknown extraction agent '{agent}'")]
    UnknownAgent { type_name: String, agent: String },

    #[error("no implementation registered for agent '{agent}' (used by '{type_name}')")]
    MissingAgent { type_name: String, agent: String },
}

/// Keywords used by text-analysis classification.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TypeKeywords {
    #[serde(default)]
    pub strong: Vec<String>,
    #[serde(default)]
    pub medium: Vec<String>,
}

/// Processing configuration for one document type.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentTypeConfig {
    pub type_name: String,
    pub display_name: String,
    /// Storage target for structured records.
    pub table_name: String,
    /// Extraction agent identifier.
    pub agent_name: String,
    /// Derived from the table name, e.g. `bank_statements` -> `saveBankStatements`.
    pub save_function: String,
    pub required_fields: Vec<String>,
    pub keywords: TypeKeywords,
}

/// Where the loaded configuration came from.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaSource {
    File(PathBuf),
    /// Parsed from an in-memory string.
    Inline,
    BuiltIn { reason: String },
}

impl SchemaSource {
    pub fn is_fallback(&self) -> bool {
        matches!(self, SchemaSource::BuiltIn { .. })
    }
}

impl std::fmt::Display for SchemaSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaSource::File(path) => write!(f, "{}", path.display()),
            SchemaSource::Inline => f.write_str("inline schema"),
            SchemaSource::BuiltIn { reason } => write!(f, "built-in table ({})", reason),
        }
    }
}

/// One schema entry as written in YAML.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SchemaEntry {
    display_name: String,
    table_name: String,
    agent_name: String,
    #[serde(default)]
    required_fields: Vec<String>,
    #[serde(default)]
    keywords: TypeKeywords,
}

/// Read-only map from type name to its configuration.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    types: BTreeMap<String, DocumentTypeConfig>,
    source: SchemaSource,
}

impl TypeRegistry {
    /// Load from a schema file, falling back to the built-in table on any error.
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(registry) => {
                info!(
                    "Loaded {} document types from {}",
                    registry.types.len(),
                    path.display()
                );
                registry
            }
            Err(e) => {
                warn!("{}; using built-in document types", e);
                Self::built_in(e.to_string())
            }
        }
    }

    pub fn try_load(path: &Path) -> Result<Self, RegistryError> {
        let content = std::fs::read_to_string(path).map_err(|source| RegistryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut registry = Self::from_yaml_str(&content)?;
        registry.source = SchemaSource::File(path.to_path_buf());
        Ok(registry)
    }

    /// Parse a schema document (YAML or JSON).
    pub fn from_yaml_str(content: &str) -> Result<Self, RegistryError> {
        let entries: BTreeMap<String, SchemaEntry> =
            serde_yaml::from_str(content).map_err(|e| RegistryError::Parse(e.to_string()))?;
        if entries.is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut types = BTreeMap::new();
        for (name, entry) in entries {
            let type_name = normalize_key(&name);
            if entry.table_name.trim().is_empty() || entry.agent_name.trim().is_empty() {
                return Err(RegistryError::Parse(format!(
                    "type '{}' needs tableName and agentName",
                    name
                )));
            }
            types.insert(
                type_name.clone(),
                DocumentTypeConfig {
                    save_function: save_function_name(&entry.table_name),
                    type_name,
                    display_name: entry.display_name,
                    table_name: entry.table_name,
                    agent_name: entry.agent_name,
                    required_fields: entry.required_fields,
                    keywords: entry.keywords,
                },
            );
        }

        Ok(Self {
            types,
            source: SchemaSource::Inline,
        })
    }

    /// The minimal table used when the schema is unavailable.
    pub fn built_in(reason: impl Into<String>) -> Self {
        let entries = [
            (
                "factura",
                "Factura",
                "facturas",
                "invoice",
                &["numero_factura", "fecha_emision", "total"][..],
            ),
            (
                "nomina",
                "Nómina",
                "nominas",
                "payslip",
                &["empleado", "periodo", "salario_neto"][..],
            ),
            (
                "contrato",
                "Contrato",
                "contratos",
                "contract",
                &["partes", "fecha_firma"][..],
            ),
        ];

        let types = entries
            .into_iter()
            .map(|(name, display, table, agent, required)| {
                (
                    name.to_string(),
                    DocumentTypeConfig {
                        type_name: name.to_string(),
                        display_name: display.to_string(),
                        table_name: table.to_string(),
                        agent_name: agent.to_string(),
                        save_function: save_function_name(table),
                        required_fields: required.iter().map(|s| s.to_string()).collect(),
                        keywords: TypeKeywords::default(),
                    },
                )
            })
            .collect();

        Self {
            types,
            source: SchemaSource::BuiltIn {
                reason: reason.into(),
            },
        }
    }

    pub fn get_config(&self, type_name: &str) -> Option<&DocumentTypeConfig> {
        self.types.get(&normalize_key(type_name))
    }

    /// Supported type names in a stable (sorted) order.
    pub fn supported_types(&self) -> Vec<&str> {
        self.types.keys().map(String::as_str).collect()
    }

    pub fn is_supported(&self, type_name: &str) -> bool {
        self.get_config(type_name).is_some()
    }

    pub fn configs(&self) -> impl Iterator<Item = &DocumentTypeConfig> {
        self.types.values()
    }

    pub fn source(&self) -> &SchemaSource {
        &self.source
    }
}

fn normalize_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// `"save"` + PascalCase of the storage target's base name.
///
/// `public.bank_statements` -> `saveBankStatements`.
pub fn save_function_name(table_name: &str) -> String {
    let base = table_name.rsplit('.').next().unwrap_or(table_name);
    let pascal: String = base
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect();
    format!("save{}", pascal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SCHEMA: &str = r#"
factura:
  displayName: Factura
  tableName: facturas
  agentName: invoice
  requiredFields: [numero_factura, total]
  keywords:
    strong: [factura]
    medium: [iva]
extracto_bancario:
  displayName: Extracto bancario
  tableName: bank_statements
  agentName: bank-statement
"#;

    #[test]
    fn test_parse_schema() {
        let registry = TypeRegistry::from_yaml_str(SCHEMA).unwrap();
        let config = registry.get_config("Factura").unwrap();
        assert_eq!(config.table_name, "facturas");
        assert_eq!(config.save_function, "saveFacturas");
        assert_eq!(config.required_fields, vec!["numero_factura", "total"]);
        assert_eq!(config.keywords.strong, vec!["factura"]);

        let bank = registry.get_config("extracto_bancario").unwrap();
        assert_eq!(bank.save_function, "saveBankStatements");
        assert!(bank.required_fields.is_empty());
    }

    #[test]
    fn test_supported_types_is_stable() {
        let registry = TypeRegistry::from_yaml_str(SCHEMA).unwrap();
        let first = registry.supported_types();
        assert_eq!(first, registry.supported_types());
        assert_eq!(first, vec!["extracto_bancario", "factura"]);
    }

    #[test]
    fn test_missing_file_falls_back() {
        let dir = TempDir::new().unwrap();
        let registry = TypeRegistry::load(&dir.path().join("missing.yaml"));
        assert!(registry.source().is_fallback());
        assert_eq!(registry.supported_types(), vec!["contrato", "factura", "nomina"]);
    }

    #[test]
    fn test_invalid_file_falls_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("types.yaml");
        std::fs::write(&path, "factura: 42\nnomina: {displayName: x").unwrap();
        let registry = TypeRegistry::load(&path);
        assert!(registry.source().is_fallback());
        assert!(registry.is_supported("nomina"));
    }

    #[test]
    fn test_load_from_file_records_source() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("types.yaml");
        std::fs::write(&path, SCHEMA).unwrap();
        let registry = TypeRegistry::load(&path);
        assert_eq!(registry.source(), &SchemaSource::File(path));
        assert!(!registry.is_supported("nomina"));
    }

    #[test]
    fn test_empty_schema_is_error() {
        assert!(matches!(
            TypeRegistry::from_yaml_str("{}"),
            Err(RegistryError::Empty)
        ));
    }

    #[test]
    fn test_save_function_name() {
        assert_eq!(save_function_name("public.polizas_seguro"), "savePolizasSeguro");
        assert_eq!(save_function_name("nominas"), "saveNominas");
    }
}
