//! Classifier behaviour across the filename, keyword and model tiers.

mod common;

use std::sync::Arc;

use common::FakeModel;
use docpipe::classification::{
    canonical_type, score_confidence, ClassificationMethod, ClassifierConfig, DocumentClassifier,
};
use docpipe::llm::ModelConfig;
use docpipe::registry::TypeRegistry;

const PAYSLIP_TEXT: &str = "NOMINA MENSUAL - RECIBO INDIVIDUAL DE SALARIOS\n\
Empresa: Talleres Norte S.A.  Trabajador: Luis Gil\n\
Devengos: salario base 1.500,00  plus transporte 80,00\n\
Deducciones: IRPF 12%  Seguridad Social 6,35%\n\
Total devengos 1.580,00\n\
Liquido a percibir 1.290,00";

fn types() -> Arc<TypeRegistry> {
    Arc::new(TypeRegistry::built_in("integration tests"))
}

fn classifier() -> DocumentClassifier {
    DocumentClassifier::new(types(), ClassifierConfig::default())
}

fn with_model(reply: &str) -> (DocumentClassifier, Arc<FakeModel>) {
    let model = Arc::new(FakeModel::replying(reply));
    let classifier = classifier().with_model(model.clone(), ModelConfig::new(0.1, 256, 1_000));
    (classifier, model)
}

#[tokio::test]
async fn test_confident_filename_wins_without_reading_text() {
    let (classifier, model) = with_model(r#"{"type": "contrato", "confidence": 0.99}"#);
    let result = classifier
        .classify("Factura_2024_017.pdf", Some(PAYSLIP_TEXT), true)
        .await;

    assert_eq!(result.document_type, "factura");
    assert_eq!(result.method, ClassificationMethod::Filename);
    assert!(!result.fallback_used);
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn test_keywords_classify_when_filename_says_nothing() {
    let result = classifier().classify("scan_0001.pdf", Some(PAYSLIP_TEXT), false).await;

    assert_eq!(result.document_type, "nomina");
    assert_eq!(result.method, ClassificationMethod::TextAnalysis);
    assert!(result.confidence >= ClassifierConfig::default().text_threshold);
}

#[tokio::test]
async fn test_model_tier_normalizes_translated_labels() {
    let text = "Documento de varias paginas sin palabras clave reconocibles, redactado de forma libre \
        y con referencias a un servicio prestado durante el mes pasado.";
    let (classifier, model) =
        with_model(r#"{"type": "Invoice", "confidence": 0.85, "reasoning": "itemised charges"}"#);
    let result = classifier.classify("scan_0002.pdf", Some(text), true).await;

    assert_eq!(result.document_type, "factura");
    assert_eq!(result.method, ClassificationMethod::AiAgent);
    assert_eq!(result.reasoning.as_deref(), Some("itemised charges"));
    assert_eq!(model.calls(), 1);
}

#[tokio::test]
async fn test_model_confidence_is_capped() {
    let text = "Texto neutro ".repeat(20);
    let (classifier, _) = with_model(r#"{"type": "contrato", "confidence": 1.7}"#);
    let result = classifier.classify("scan.pdf", Some(&text), true).await;
    assert!(result.confidence <= 0.95);
}

#[tokio::test]
async fn test_short_text_without_hints_is_unknown() {
    let (classifier, model) = with_model(r#"{"type": "factura", "confidence": 0.9}"#);
    let result = classifier.classify("scan.pdf", Some("hola"), true).await;

    assert_eq!(result.document_type, "desconocido");
    assert_eq!(result.method, ClassificationMethod::None);
    assert_eq!(result.confidence, 0.0);
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn test_low_confidence_tiers_fall_back_to_best_guess() {
    let text = "Pagina con una sola mencion de iva y nada mas relevante para clasificar el documento \
        que estamos leyendo en esta prueba de integracion.";
    let (classifier, _) = with_model(r#"{"type": "contrato", "confidence": 0.2}"#);
    let result = classifier.classify("scan.pdf", Some(text), true).await;

    assert!(result.fallback_used);
    assert!(result.confidence < 0.7);
}

#[test]
fn test_score_confidence_is_monotonic_and_bounded() {
    let mut previous = score_confidence(0);
    assert_eq!(previous, 0.0);
    for score in 1..200 {
        let next = score_confidence(score);
        assert!(next >= previous);
        assert!(next < 0.95);
        previous = next;
    }
}

#[test]
fn test_canonical_type_folds_accents_and_synonyms() {
    assert_eq!(canonical_type("Nómina"), "nomina");
    assert_eq!(canonical_type("payslip"), "nomina");
    assert_eq!(canonical_type("Extracto Bancario"), "extracto_bancario");
}

#[test]
fn test_supported_types_are_stable_across_loads() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("schema/document_types.yaml");
    let first = TypeRegistry::load(&path);
    let second = TypeRegistry::load(&path);
    assert!(!first.source().is_fallback());
    assert_eq!(first.supported_types(), second.supported_types());
}
