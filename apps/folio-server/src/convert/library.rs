//! In-process conversion: PDF page text → DOCX
//!
//! Pages are read with `lopdf` in page-number order, joined with a form feed
//! so page boundaries survive, and laid out by `docx-rs` as one paragraph per
//! line with a page break between pages. Layout beyond line structure is not
//! reconstructed.

use std::io::Cursor;
use std::path::Path;

use async_trait::async_trait;
use docx_rs::{BreakType, Docx, Paragraph, Run};
use lopdf::Document;

use super::{ConversionEngine, ConversionError, EngineReport};
use crate::config::EngineKind;

/// Separator between pages in the intermediate text
pub const PAGE_SEPARATOR: char = '\u{000C}';

/// Strategy A: parse and assemble inside the server process
#[derive(Debug, Default)]
pub struct LibraryEngine;

impl LibraryEngine {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ConversionEngine for LibraryEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Library
    }

    fn describe(&self) -> String {
        "library (lopdf + docx-rs)".to_string()
    }

    async fn convert(&self, input: &Path, output: &Path) -> Result<EngineReport, ConversionError> {
        let data = tokio::fs::read(input).await?;

        // Parsing and packing are CPU-bound; keep them off the async workers
        let (docx, page_count) = tokio::task::spawn_blocking(move || pdf_to_docx(&data))
            .await
            .map_err(|e| ConversionError::Internal(format!("conversion task failed: {}", e)))??;

        tokio::fs::write(output, &docx).await?;

        Ok(EngineReport {
            diagnostics: format!("{} page(s) converted", page_count),
        })
    }
}

fn pdf_to_docx(data: &[u8]) -> Result<(Vec<u8>, usize), ConversionError> {
    let pages = extract_pages(data)?;

    if pages.iter().all(|page| page.trim().is_empty()) {
        tracing::warn!(pages = pages.len(), "No extractable text, PDF may be scanned");
    }

    let separator = PAGE_SEPARATOR.to_string();
    let text = pages.join(separator.as_str());
    let docx = assemble_docx(&text)?;
    Ok((docx, pages.len()))
}

/// Extract the text of every page, in page order.
///
/// A page whose text cannot be decoded contributes an empty page rather than
/// failing the whole document.
pub fn extract_pages(data: &[u8]) -> Result<Vec<String>, ConversionError> {
    let document = Document::load_mem(data).map_err(|e| ConversionError::Parse(e.to_string()))?;

    // BTreeMap: ascending page numbers
    let page_numbers: Vec<u32> = document.get_pages().into_keys().collect();
    if page_numbers.is_empty() {
        return Err(ConversionError::Parse("document has no pages".to_string()));
    }

    let pages = page_numbers
        .into_iter()
        .map(|page_number| match document.extract_text(&[page_number]) {
            Ok(text) => clean_text(&text),
            Err(e) => {
                tracing::warn!(page = page_number, error = %e, "Failed to extract page text");
                String::new()
            }
        })
        .collect();

    Ok(pages)
}

/// Build a DOCX from text whose pages are separated by [`PAGE_SEPARATOR`]
pub fn assemble_docx(text: &str) -> Result<Vec<u8>, ConversionError> {
    let mut docx = Docx::new();

    for (index, page) in text.split(PAGE_SEPARATOR).enumerate() {
        if index > 0 {
            docx = docx.add_paragraph(Paragraph::new().add_run(Run::new().add_break(BreakType::Page)));
        }
        for line in page.trim_end_matches('\n').split('\n') {
            docx = docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text(line)));
        }
    }

    let mut buffer = Cursor::new(Vec::new());
    docx.build()
        .pack(&mut buffer)
        .map_err(|e| ConversionError::Assembly(e.to_string()))?;

    Ok(buffer.into_inner())
}

/// Normalise line endings and drop characters that cannot appear in DOCX XML
fn clean_text(text: &str) -> String {
    text.replace("\r\n", "\n")
        .chars()
        .map(|c| if c == '\r' { '\n' } else { c })
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}
