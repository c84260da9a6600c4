//! Splitting a bundled PDF into its logical documents.

mod common;

use std::sync::Arc;

use common::{FakeModel, FixedStrategy};
use docpipe::boundary::{FragmentResolution, MultiDocumentBoundaryDetector};
use docpipe::extraction::{
    ExtractionConfig, ExtractionMethod, ExtractionOrchestrator, ExtractionStrategy,
};
use docpipe::llm::{LlmError, ModelConfig};
use docpipe::registry::TypeRegistry;

const BUNDLE: &str =
    "FACTURA F-7\nCliente Ana\nTotal 121,00 EUR\x0cNOMINA marzo\nEmpleado Luis\nLiquido 900 EUR";

const TWO_DOCUMENTS: &str = r#"Found two documents:
{"documents": [
  {"type": "factura", "start_line": 1, "end_line": 4, "start_marker": "--- Page 1 ---",
   "end_marker": "--- Page 2 ---", "confidence": 0.9, "title": "Factura F-7"},
  {"type": "Payslip", "start_line": 5, "end_line": 8, "start_marker": "--- Page 2 ---",
   "confidence": 0.8, "title": "Nomina marzo"}
]}"#;

fn detector(
    model: FakeModel,
    strategies: Vec<Arc<dyn ExtractionStrategy>>,
) -> MultiDocumentBoundaryDetector {
    MultiDocumentBoundaryDetector::new(
        ExtractionOrchestrator::new(strategies),
        ExtractionConfig::default(),
        Arc::new(model),
        ModelConfig::new(0.1, 2048, 5_000),
        Arc::new(TypeRegistry::built_in("integration tests")),
    )
}

#[tokio::test]
async fn test_two_documents_are_reconstructed() {
    let result = detector(FakeModel::replying(TWO_DOCUMENTS), Vec::new())
        .analyze_text(BUNDLE, "lote.pdf")
        .await;

    assert!(result.has_multiple_documents);
    assert!(result.error.is_none());
    assert_eq!(result.segments.len(), 2);

    let invoice = &result.segments[0];
    assert_eq!(invoice.document_type, "factura");
    assert!(invoice.is_supported_by_pipeline);
    assert_eq!(invoice.resolution, FragmentResolution::Markers);
    assert!(invoice.fragment.contains("FACTURA F-7"));
    assert!(invoice.fragment.contains("Total 121,00 EUR"));
    assert!(!invoice.fragment.contains("NOMINA"));
    assert_eq!(invoice.title.as_deref(), Some("Factura F-7"));

    let payslip = &result.segments[1];
    assert_eq!(payslip.document_type, "nomina");
    assert!(matches!(payslip.resolution, FragmentResolution::LineRange { .. }));
    assert!(payslip.fragment.contains("NOMINA marzo"));
    assert!(payslip.fragment.contains("Liquido 900 EUR"));
    assert!(!payslip.fragment.contains("FACTURA"));
}

#[tokio::test]
async fn test_model_failure_keeps_the_whole_text() {
    let model = FakeModel::new(|_| Err(LlmError::EmptyResponse));
    let result = detector(model, Vec::new()).analyze_text(BUNDLE, "lote.pdf").await;

    assert!(!result.has_multiple_documents);
    assert!(result.error.is_some());
    assert_eq!(result.segments.len(), 1);
    assert!(result.segments[0].fragment.contains("FACTURA F-7"));
    assert!(result.segments[0].fragment.contains("Liquido 900 EUR"));
}

#[tokio::test]
async fn test_analyze_reports_extraction_details() {
    let strategies = vec![Arc::new(FixedStrategy::text(BUNDLE)) as Arc<dyn ExtractionStrategy>];
    let result = detector(FakeModel::replying(TWO_DOCUMENTS), strategies)
        .analyze(b"%PDF-1.4 bundle".to_vec(), "lote.pdf")
        .await;

    assert_eq!(result.extraction_method, Some(ExtractionMethod::DirectText));
    assert_eq!(result.page_count, Some(1));
    assert_eq!(result.segments.len(), 2);
}

#[tokio::test]
async fn test_marker_fragments_reconstruct_the_analyzed_text() {
    let text =
        "INICIO-A\nFactura F-9 total 50 EUR\nFIN-A\nINICIO-B\nNomina abril liquido 800\nFIN-B";
    let reply = r#"{"documents": [
      {"type": "factura", "start_line": 2, "end_line": 4,
       "start_marker": "INICIO-A", "end_marker": "FIN-A"},
      {"type": "nomina", "start_line": 5, "end_line": 7,
       "start_marker": "INICIO-B", "end_marker": "FIN-B"}
    ]}"#;
    let result = detector(FakeModel::replying(reply), Vec::new())
        .analyze_text(text, "lote.pdf")
        .await;

    assert_eq!(result.segments.len(), 2);
    assert!(result.segments.iter().all(|s| s.resolution.is_precise()));
    let rebuilt = format!(
        "INICIO-A{}FIN-A\nINICIO-B{}FIN-B",
        result.segments[0].fragment, result.segments[1].fragment
    );
    assert_eq!(rebuilt, text);
}
