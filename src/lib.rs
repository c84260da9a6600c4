//! docpipe - PDF document ingestion pipeline.
//!
//! A registered PDF moves through four stages: text extraction (direct,
//! OCR or a single multimodal model call), classification, typed metadata
//! extraction and chunking. [`pipeline::PipelineOrchestrator`] drives the
//! stages and records per-stage status in a [`repository::DocumentStore`].

pub mod agents;
pub mod boundary;
pub mod classification;
pub mod config;
pub mod extraction;
pub mod llm;
pub mod models;
pub mod ocr;
pub mod pdf;
pub mod pipeline;
pub mod registry;
pub mod repository;
pub mod retry;
pub mod schema;
pub mod storage;
pub mod text;
