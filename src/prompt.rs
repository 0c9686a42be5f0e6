//! Prompt construction: resolve a document + page selection to an encoded
//! image and a structured instruction for the inference service.
//!
//! Instruction text is centralised here so behaviour changes touch exactly
//! one place and unit tests can inspect prompts without a live model.
//!
//! One builder serves both request shapes, selected explicitly at the call
//! boundary through [`InstructionMode`]: the fixed-taxonomy classification
//! used by the analyze surface, and field extraction against a
//! caller-supplied schema.

use crate::error::DoctriageError;
use crate::store::DocumentStore;
use crate::types::{content_type_for, DocumentId};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use tracing::debug;

/// Which instruction the inference service receives.
#[derive(Debug, Clone)]
pub enum InstructionMode {
    /// Classify into the fixed document taxonomy.
    Classify,
    /// Extract the fields named by a caller-supplied JSON schema.
    Extract { fields: serde_json::Value },
}

/// A page image encoded for transport.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    /// Base64 of the raw image bytes.
    pub data: String,
    /// `image/jpeg` or `image/png`, inferred from the page file extension.
    pub mime_type: &'static str,
}

/// Everything the inference client needs for one call.
#[derive(Debug, Clone)]
pub struct BuiltPrompt {
    pub instruction: String,
    pub image: EncodedImage,
    /// Size of the resolved page set (not caller-supplied).
    pub page_count: usize,
    /// The 1-based page actually selected.
    pub selected_page: usize,
}

/// Clamp an optional 1-based page selector against the resolved page set.
///
/// Out-of-range selectors behave exactly like omitted ones: page 1.
pub fn select_page(selector: Option<usize>, page_count: usize) -> usize {
    match selector {
        Some(p) if p >= 1 && p <= page_count => p,
        _ => 1,
    }
}

/// Resolve, select, encode, and render the instruction for one document.
///
/// Fails with a distinguished no-content error when the document resolves
/// to zero pages — a malformed request must never reach the service.
pub async fn build_prompt(
    store: &dyn DocumentStore,
    id: DocumentId,
    page_selector: Option<usize>,
    mode: &InstructionMode,
) -> Result<BuiltPrompt, DoctriageError> {
    let pages = store.resolve_pages(id).await?;
    if pages.is_empty() {
        return Err(DoctriageError::NoPages { id: id.to_string() });
    }

    let page_count = pages.len();
    let selected_page = select_page(page_selector, page_count);
    let path = &pages[selected_page - 1];

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| DoctriageError::storage(path, e))?;
    let image = EncodedImage {
        data: STANDARD.encode(&bytes),
        mime_type: content_type_for(&path.file_name().unwrap_or_default().to_string_lossy()),
    };
    debug!(
        "Built prompt for {} page {}/{} ({} bytes base64)",
        id,
        selected_page,
        page_count,
        image.data.len()
    );

    let instruction = match mode {
        InstructionMode::Classify => classify_instruction(page_count),
        InstructionMode::Extract { fields } => extract_instruction(fields),
    };

    Ok(BuiltPrompt {
        instruction,
        image,
        page_count,
        selected_page,
    })
}

/// Fixed-taxonomy classification instruction.
///
/// Paging metadata is computed from the resolved page set, never taken
/// from the caller.
pub fn classify_instruction(page_count: usize) -> String {
    format!(
        r#"You are an expert document classifier. Analyze the provided document image and classify it as exactly one of the following document types:

- tax_statement
- drivers_license
- payslip
- other

Respond with a JSON object containing exactly these fields:

{{
  "documentType": "one of: tax_statement, drivers_license, payslip, other",
  "confidence": "a number between 0.0 and 1.0",
  "reasoning": "a brief explanation of your classification",
  "extractedText": "the key text visible in the document",
  "hasMultiplePages": {has_multiple},
  "pageCount": {page_count}
}}

Base documentType, confidence, reasoning, and extractedText only on what is visible in the image. Output only the JSON object, with no commentary."#,
        has_multiple = page_count > 1,
        page_count = page_count,
    )
}

/// Field-extraction instruction for a caller-supplied schema.
///
/// An `extractionDateTime` field is appended to the schema so every
/// extraction is self-dating.
pub fn extract_instruction(fields: &serde_json::Value) -> String {
    let mut fields = fields.clone();
    if let Some(map) = fields.as_object_mut() {
        map.insert(
            "extractionDateTime".to_string(),
            serde_json::Value::String("Current ISO 8601 date and time".to_string()),
        );
    }
    let schema = serde_json::to_string_pretty(&fields).unwrap_or_else(|_| fields.to_string());

    format!(
        r#"You are an expert in analyzing documents. The current time is {now}. Analyze the provided document page and extract the information for the following fields in JSON format:

{schema}

Please provide the extracted data in a structured JSON format."#,
        now = Utc::now().to_rfc3339(),
    )
}
