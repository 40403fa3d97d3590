//! Document loaders
//!
//! PDFs are extracted on a blocking thread and split into one document per
//! page when the extracted text carries form-feed page breaks. Plain text
//! and markdown files are loaded as a single document.

use crate::errors::RagError;
use crate::rag::Document;
use std::path::Path;

const PAGE_BREAK: char = '\u{c}';

/// Kind of file accepted for upload, decided by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Text,
}

impl DocumentKind {
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())?
            .to_ascii_lowercase();

        match extension.as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "txt" | "md" | "markdown" => Some(DocumentKind::Text),
            _ => None,
        }
    }
}

/// Load a document from disk
pub async fn load_document(path: impl AsRef<Path>) -> Result<Vec<Document>, RagError> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        RagError::DocumentLoad(format!("Failed to read {}: {}", path.display(), e))
    })?;

    load_bytes(&path.to_string_lossy(), bytes).await
}

/// Load a document from an in-memory upload; `file_name` selects the loader
/// and becomes the `source` metadata.
pub async fn load_bytes(file_name: &str, bytes: Vec<u8>) -> Result<Vec<Document>, RagError> {
    let kind = DocumentKind::from_file_name(file_name).ok_or_else(|| {
        RagError::DocumentLoad(format!("Unsupported file type: {}", file_name))
    })?;

    let text = match kind {
        DocumentKind::Text => String::from_utf8_lossy(&bytes).into_owned(),
        DocumentKind::Pdf => extract_pdf_text(file_name, bytes).await?,
    };

    let documents = match kind {
        DocumentKind::Pdf => split_pages(file_name, &text),
        DocumentKind::Text if text.trim().is_empty() => Vec::new(),
        DocumentKind::Text => vec![Document::new(text).with_metadata("source", file_name)],
    };

    if documents.is_empty() {
        return Err(RagError::DocumentLoad(format!(
            "No extractable text in {}",
            file_name
        )));
    }

    log::info!("Loaded {} page(s) from {}", documents.len(), file_name);
    Ok(documents)
}

async fn extract_pdf_text(file_name: &str, bytes: Vec<u8>) -> Result<String, RagError> {
    let name = file_name.to_string();

    // The extractor is synchronous and may panic on malformed input; a panic
    // surfaces here as a join error.
    tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| RagError::DocumentLoad(format!("PDF extraction aborted for {}: {}", name, e)))?
        .map_err(|e| RagError::DocumentLoad(format!("Failed to extract text from {}: {}", name, e)))
}

/// One document per non-blank page; page numbers are 0-based.
fn split_pages(file_name: &str, text: &str) -> Vec<Document> {
    text.split(PAGE_BREAK)
        .enumerate()
        .filter(|(_, content)| !content.trim().is_empty())
        .map(|(page, content)| {
            Document::new(content)
                .with_metadata("source", file_name)
                .with_metadata("page", page)
        })
        .collect()
}
