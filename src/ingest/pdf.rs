//! PDF text extraction

use super::{Document, IngestionError};

/// Extract one document per page
///
/// pdf-extract separates pages with form feeds; pages that carry no text
/// (scans, blank separators) are dropped.
pub fn extract_pages(bytes: &[u8], file_name: &str) -> Result<Vec<Document>, IngestionError> {
    // pdf-extract panics on some malformed inputs
    let text = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes))
        .map_err(|_| IngestionError::Parse {
            file: file_name.to_string(),
            reason: "PDF parser aborted".to_string(),
        })?
        .map_err(|e| IngestionError::Parse {
            file: file_name.to_string(),
            reason: e.to_string(),
        })?;

    if text.trim().is_empty() {
        tracing::warn!(
            "No text extracted from {}; it might be a scanned document",
            file_name
        );
        return Ok(Vec::new());
    }

    Ok(split_pages(&text)
        .into_iter()
        .filter(|(_, page)| !page.is_empty())
        .map(|(number, page)| {
            let mut document = Document::new(page, file_name);
            document
                .metadata
                .insert("page".to_string(), serde_json::json!(number));
            document
        })
        .collect())
}

/// Split extracted text at form feeds, numbering pages from 1
fn split_pages(text: &str) -> Vec<(usize, String)> {
    text.split('\x0c')
        .enumerate()
        .map(|(i, page)| (i + 1, page.trim().to_string()))
        .collect()
}
