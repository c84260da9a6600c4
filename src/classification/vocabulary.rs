//! Built-in classification vocabulary: filename patterns, keyword tables and
//! the synonym map used to canonicalize type labels.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::registry::TypeRegistry;
use crate::text::{fold, fold_key};

/// Type label used when nothing matched.
pub const UNKNOWN_TYPE: &str = "desconocido";

/// Filename patterns matched against the folded filename, with fixed confidences.
static FILENAME_PATTERNS: LazyLock<Vec<(Regex, &'static str, f64)>> = LazyLock::new(|| {
    vec![
        (Regex::new(r"factura|invoice").unwrap(), "factura", 0.95),
        (Regex::new(r"(^|[^a-z])fra[-_ ]?\d").unwrap(), "factura", 0.9),
        (Regex::new(r"nomina|payslip|payroll").unwrap(), "nomina", 0.95),
        (Regex::new(r"contrato|contract").unwrap(), "contrato", 0.9),
        (Regex::new(r"extracto|bank[-_ ]?statement").unwrap(), "extracto_bancario", 0.9),
        (
            Regex::new(r"(^|[^a-z])(dni|nie|pasaporte|passport)([^a-z]|$)").unwrap(),
            "documento_identidad",
            0.9,
        ),
        (Regex::new(r"poliza|insurance[-_ ]?policy").unwrap(), "poliza_seguro", 0.9),
        (Regex::new(r"recibo|receipt|ticket").unwrap(), "recibo", 0.85),
    ]
});

struct BuiltInKeywords {
    type_name: &'static str,
    strong: &'static [&'static str],
    medium: &'static [&'static str],
}

const BUILT_IN_KEYWORDS: &[BuiltInKeywords] = &[
    BuiltInKeywords {
        type_name: "factura",
        strong: &["factura", "numero de factura", "base imponible"],
        medium: &["iva", "total", "cif", "nif", "importe", "vencimiento"],
    },
    BuiltInKeywords {
        type_name: "nomina",
        strong: &["nomina", "salario base", "liquido a percibir", "devengos"],
        medium: &["irpf", "seguridad social", "trabajador", "empresa", "deducciones"],
    },
    BuiltInKeywords {
        type_name: "contrato",
        strong: &["contrato", "clausula", "las partes"],
        medium: &["firma", "acuerdan", "duracion", "estipulaciones"],
    },
    BuiltInKeywords {
        type_name: "recibo",
        strong: &["recibo", "ticket"],
        medium: &["pagado", "efectivo", "tarjeta", "cambio"],
    },
    BuiltInKeywords {
        type_name: "extracto_bancario",
        strong: &["extracto", "saldo anterior", "iban"],
        medium: &["saldo", "movimientos", "cargo", "abono"],
    },
    BuiltInKeywords {
        type_name: "documento_identidad",
        strong: &["documento nacional de identidad", "pasaporte"],
        medium: &["nacionalidad", "fecha de nacimiento", "caducidad"],
    },
    BuiltInKeywords {
        type_name: "poliza_seguro",
        strong: &["poliza", "aseguradora", "tomador"],
        medium: &["prima", "cobertura", "siniestro", "asegurado"],
    },
];

/// Labels (already folded) that mean the same canonical type.
const SYNONYMS: &[(&str, &str)] = &[
    ("invoice", "factura"),
    ("bill", "factura"),
    ("facturas", "factura"),
    ("payslip", "nomina"),
    ("payroll", "nomina"),
    ("pay_slip", "nomina"),
    ("salary_slip", "nomina"),
    ("nominas", "nomina"),
    ("contract", "contrato"),
    ("agreement", "contrato"),
    ("contratos", "contrato"),
    ("receipt", "recibo"),
    ("ticket", "recibo"),
    ("recibos", "recibo"),
    ("bank_statement", "extracto_bancario"),
    ("statement", "extracto_bancario"),
    ("extracto", "extracto_bancario"),
    ("identity_document", "documento_identidad"),
    ("id_card", "documento_identidad"),
    ("dni", "documento_identidad"),
    ("passport", "documento_identidad"),
    ("pasaporte", "documento_identidad"),
    ("insurance_policy", "poliza_seguro"),
    ("insurance", "poliza_seguro"),
    ("poliza", "poliza_seguro"),
];

/// Map a free-form type label to its canonical key.
///
/// Accents, case and separators are folded first; known synonyms and
/// translations then map onto the canonical name. Unknown labels come back
/// folded.
pub fn canonical_type(label: &str) -> String {
    let key = fold_key(label);
    SYNONYMS
        .iter()
        .find(|(synonym, _)| *synonym == key)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(key)
}

/// Every filename pattern that matches, in declaration order.
pub(crate) fn filename_matches(filename: &str) -> Vec<(&'static str, f64)> {
    let folded = fold(filename);
    FILENAME_PATTERNS
        .iter()
        .filter(|(pattern, _, _)| pattern.is_match(&folded))
        .map(|(_, type_name, confidence)| (*type_name, *confidence))
        .collect()
}

/// Folded keyword lists per type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeywordTable {
    pub strong: Vec<String>,
    pub medium: Vec<String>,
}

/// Built-in tables extended with keywords declared in the type schema.
pub(crate) fn keyword_tables(types: &TypeRegistry) -> BTreeMap<String, KeywordTable> {
    let mut tables: BTreeMap<String, KeywordTable> = BUILT_IN_KEYWORDS
        .iter()
        .map(|k| {
            (
                k.type_name.to_string(),
                KeywordTable {
                    strong: k.strong.iter().map(|s| s.to_string()).collect(),
                    medium: k.medium.iter().map(|s| s.to_string()).collect(),
                },
            )
        })
        .collect();

    for config in types.configs() {
        let table = tables.entry(config.type_name.clone()).or_default();
        for keyword in &config.keywords.strong {
            let keyword = fold(keyword);
            if !table.strong.contains(&keyword) {
                table.strong.push(keyword);
            }
        }
        for keyword in &config.keywords.medium {
            let keyword = fold(keyword);
            if !table.medium.contains(&keyword) {
                table.medium.push(keyword);
            }
        }
    }
    tables
}
