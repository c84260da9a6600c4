//! Structured-metadata extraction agents.
//!
//! Every extraction agent named in the type schema must map to an
//! [`AgentKind`]; [`AgentRegistry::validate`] checks this at startup so a
//! typo in the schema fails fast instead of at first use.

mod generic;
mod schema_agent;
mod validation;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::llm::{LanguageModel, LlmError, ModelConfig};
use crate::registry::{DocumentTypeConfig, RegistryError, TypeRegistry};

pub use generic::GenericMetadataAgent;
pub use schema_agent::SchemaAgent;
pub use validation::{validate_required, ValidationError};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("malformed agent response: {0}")]
    MalformedResponse(String),
}

impl AgentError {
    /// A malformed reply is worth asking again. Model transport errors are
    /// already retried by the client and are final here.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::MalformedResponse(_))
    }
}

/// A field an agent is asked to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub description: &'static str,
}

const fn field(name: &'static str, description: &'static str) -> FieldSpec {
    FieldSpec { name, description }
}

const INVOICE_FIELDS: &[FieldSpec] = &[
    field("numero_factura", "invoice number"),
    field("fecha_emision", "issue date"),
    field("emisor", "issuer name"),
    field("nif_emisor", "issuer tax id"),
    field("receptor", "customer name"),
    field("base_imponible", "taxable base amount"),
    field("iva", "VAT amount"),
    field("total", "total amount"),
];

const PAYSLIP_FIELDS: &[FieldSpec] = &[
    field("empleado", "employee name"),
    field("empresa", "employer name"),
    field("periodo", "pay period"),
    field("salario_bruto", "gross pay"),
    field("irpf", "income tax withheld"),
    field("seguridad_social", "social security contributions"),
    field("salario_neto", "net pay"),
];

const CONTRACT_FIELDS: &[FieldSpec] = &[
    field("partes", "list of contracting parties"),
    field("objeto", "subject of the contract"),
    field("fecha_firma", "signature date"),
    field("fecha_inicio", "start date"),
    field("fecha_fin", "end date"),
    field("importe", "contract amount"),
];

const RECEIPT_FIELDS: &[FieldSpec] = &[
    field("comercio", "merchant name"),
    field("fecha", "purchase date"),
    field("metodo_pago", "payment method"),
    field("total", "total amount"),
];

const BANK_STATEMENT_FIELDS: &[FieldSpec] = &[
    field("entidad", "bank name"),
    field("iban", "account IBAN"),
    field("titular", "account holder"),
    field("periodo", "statement period"),
    field("saldo_inicial", "opening balance"),
    field("saldo_final", "closing balance"),
];

const IDENTITY_FIELDS: &[FieldSpec] = &[
    field("nombre", "full name"),
    field("numero_documento", "document number"),
    field("nacionalidad", "nationality"),
    field("fecha_nacimiento", "date of birth"),
    field("fecha_caducidad", "expiry date"),
];

const INSURANCE_FIELDS: &[FieldSpec] = &[
    field("aseguradora", "insurer"),
    field("numero_poliza", "policy number"),
    field("tomador", "policy holder"),
    field("ramo", "line of insurance"),
    field("prima", "premium amount"),
    field("fecha_efecto", "effective date"),
    field("fecha_vencimiento", "expiry date"),
];

/// Closed set of extraction agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AgentKind {
    Invoice,
    Payslip,
    Contract,
    Receipt,
    BankStatement,
    IdentityDocument,
    InsurancePolicy,
}

impl AgentKind {
    pub const ALL: [AgentKind; 7] = [
        AgentKind::Invoice,
        AgentKind::Payslip,
        AgentKind::Contract,
        AgentKind::Receipt,
        AgentKind::BankStatement,
        AgentKind::IdentityDocument,
        AgentKind::InsurancePolicy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invoice => "invoice",
            Self::Payslip => "payslip",
            Self::Contract => "contract",
            Self::Receipt => "receipt",
            Self::BankStatement => "bank-statement",
            Self::IdentityDocument => "identity-document",
            Self::InsurancePolicy => "insurance-policy",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "invoice" => Some(Self::Invoice),
            "payslip" => Some(Self::Payslip),
            "contract" => Some(Self::Contract),
            "receipt" => Some(Self::Receipt),
            "bank-statement" => Some(Self::BankStatement),
            "identity-document" => Some(Self::IdentityDocument),
            "insurance-policy" => Some(Self::InsurancePolicy),
            _ => None,
        }
    }

    pub fn fields(&self) -> &'static [FieldSpec] {
        match self {
            Self::Invoice => INVOICE_FIELDS,
            Self::Payslip => PAYSLIP_FIELDS,
            Self::Contract => CONTRACT_FIELDS,
            Self::Receipt => RECEIPT_FIELDS,
            Self::BankStatement => BANK_STATEMENT_FIELDS,
            Self::IdentityDocument => IDENTITY_FIELDS,
            Self::InsurancePolicy => INSURANCE_FIELDS,
        }
    }

    /// Field names to request: the kind's own fields plus any extra required ones.
    pub fn field_names(&self, config: &DocumentTypeConfig) -> Vec<String> {
        let mut names: Vec<String> = self.fields().iter().map(|f| f.name.to_string()).collect();
        for required in &config.required_fields {
            if !names.contains(required) {
                names.push(required.clone());
            }
        }
        names
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a metadata extraction: real data, or a best-effort fallback.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataOutcome {
    Extracted(Value),
    Degraded { data: Value, reason: String },
}

impl MetadataOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

/// Extracts structured fields for one document type.
#[async_trait]
pub trait MetadataAgent: Send + Sync {
    fn kind(&self) -> AgentKind;

    /// Returns a JSON object of extracted fields.
    async fn extract(&self, text: &str, config: &DocumentTypeConfig) -> Result<Value, AgentError>;
}

/// Load-time map from agent kind to implementation.
#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: HashMap<AgentKind, Arc<dyn MetadataAgent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an LLM-backed [`SchemaAgent`] for every kind.
    pub fn with_llm(model: Arc<dyn LanguageModel>, model_config: ModelConfig) -> Self {
        let mut registry = Self::new();
        for kind in AgentKind::ALL {
            registry.register(Arc::new(SchemaAgent::new(kind, model.clone(), model_config)));
        }
        registry
    }

    /// Register (or replace) the implementation for `agent.kind()`.
    pub fn register(&mut self, agent: Arc<dyn MetadataAgent>) {
        self.agents.insert(agent.kind(), agent);
    }

    /// Check that every schema entry names a known, registered agent.
    pub fn validate(&self, types: &TypeRegistry) -> Result<(), RegistryError> {
        for config in types.configs() {
            let kind = AgentKind::from_str(&config.agent_name).ok_or_else(|| {
                RegistryError::UnknownAgent {
                    type_name: config.type_name.clone(),
                    agent: config.agent_name.clone(),
                }
            })?;
            if !self.agents.contains_key(&kind) {
                return Err(RegistryError::MissingAgent {
                    type_name: config.type_name.clone(),
                    agent: config.agent_name.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn agent_for(&self, config: &DocumentTypeConfig) -> Option<Arc<dyn MetadataAgent>> {
        AgentKind::from_str(&config.agent_name).and_then(|kind| self.agents.get(&kind).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub(AgentKind);

    #[async_trait]
    impl MetadataAgent for Stub {
        fn kind(&self) -> AgentKind {
            self.0
        }
        async fn extract(
            &self,
            _text: &str,
            _config: &DocumentTypeConfig,
        ) -> Result<Value, AgentError> {
            Ok(Value::Null)
        }
    }

    fn full_registry() -> AgentRegistry {
        let mut registry = AgentRegistry::new();
        for kind in AgentKind::ALL {
            registry.register(Arc::new(Stub(kind)));
        }
        registry
    }

    #[test]
    fn test_kind_names_round_trip() {
        for kind in AgentKind::ALL {
            assert_eq!(AgentKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(AgentKind::from_str("Bank_Statement"), Some(AgentKind::BankStatement));
        assert_eq!(AgentKind::from_str("horoscope"), None);
    }

    #[test]
    fn test_validate_accepts_built_in_schema() {
        let types = TypeRegistry::built_in("test");
        assert!(full_registry().validate(&types).is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_agent() {
        let types = TypeRegistry::from_yaml_str(
            "carta:\n  displayName: Carta\n  tableName: cartas\n  agentName: letter\n",
        )
        .unwrap();
        let err = full_registry().validate(&types).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownAgent { .. }));
    }

    #[test]
    fn test_validate_rejects_unregistered_agent() {
        let mut registry = AgentRegistry::new();
        registry.register(Arc::new(Stub(AgentKind::Invoice)));
        let err = registry
            .validate(&TypeRegistry::built_in("test"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::MissingAgent { .. }));
    }

    #[test]
    fn test_field_names_include_required_extras() {
        let types = TypeRegistry::from_yaml_str(
            "factura:\n  displayName: Factura\n  tableName: facturas\n  agentName: invoice\n  \
             requiredFields: [total, referencia_pedido]\n",
        )
        .unwrap();
        let config = types.get_config("factura").unwrap();
        let names = AgentKind::Invoice.field_names(config);
        assert!(names.contains(&"referencia_pedido".to_string()));
        assert_eq!(names.iter().filter(|n| *n == "total").count(), 1);
    }
}
