// src/document.rs

use lopdf::Document;
use tracing::{debug, info, warn};

/// Result of turning an uploaded invoice into text.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentText {
    /// The document carries extractable text (already normalized).
    Text(String),
    /// The PDF appears to be scanned / image-only — needs OCR or manual entry.
    ScannedImage,
    /// Something went wrong during extraction.
    Error(String),
}

impl DocumentText {
    pub fn text(&self) -> Option<&str> {
        match self {
            DocumentText::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Minimum number of non-whitespace characters we expect from a
/// "real" text PDF. Below this threshold we treat it as scanned.
const MIN_TEXT_CHARS: usize = 30;

/// Share of image-only pages above which the whole PDF counts as scanned.
const SCANNED_PAGE_RATIO: f64 = 0.8;

const PDF_MAGIC: &[u8] = b"%PDF";

/// Main entry point: takes raw document bytes and returns normalized text.
///
/// PDFs go through `lopdf` (structural check) and `pdf-extract`; anything
/// else is read as a plain-text invoice.
pub fn document_to_text(bytes: &[u8]) -> DocumentText {
    if !bytes.starts_with(PDF_MAGIC) {
        debug!(bytes = bytes.len(), "Not a PDF — reading as plain text");
        let text = normalize_text(&String::from_utf8_lossy(bytes));
        if text.is_empty() {
            return DocumentText::Error("Document is empty".to_string());
        }
        return DocumentText::Text(text);
    }

    // --- Phase 1: structural check with lopdf ---
    let doc = match Document::load_mem(bytes) {
        Ok(d) => d,
        Err(e) => return DocumentText::Error(format!("Failed to parse PDF: {e}")),
    };

    if looks_like_scanned(&doc) {
        info!("PDF structural check: likely scanned / image-only");
        return DocumentText::ScannedImage;
    }

    // --- Phase 2: full text extraction ---
    match pdf_extract::extract_text_from_mem(bytes) {
        Ok(text) => classify(normalize_text(&text)),
        Err(e) => {
            warn!(error = %e, "pdf-extract failed — may be scanned or corrupted");
            DocumentText::ScannedImage
        }
    }
}

fn classify(text: String) -> DocumentText {
    let meaningful = text.chars().filter(|c| !c.is_whitespace()).count();
    if meaningful < MIN_TEXT_CHARS {
        info!(
            chars = meaningful,
            "Extracted text too short — treating as scanned"
        );
        DocumentText::ScannedImage
    } else {
        info!(chars = meaningful, "Text extracted successfully");
        DocumentText::Text(text)
    }
}

/// Heuristic: a page with XObject images but no Font resources is
/// almost certainly a scanned page.
fn looks_like_scanned(doc: &Document) -> bool {
    let pages = doc.get_pages();
    if pages.is_empty() {
        return false; // Can't tell — let text extraction try
    }

    let image_only_pages = pages
        .values()
        .filter(|&&object_id| {
            let Ok(page_dict) = doc.get_dictionary(object_id) else {
                return false;
            };
            let resources = page_dict
                .get(b"Resources")
                .ok()
                .and_then(|r| doc.dereference(r).ok())
                .and_then(|(_, resolved)| resolved.as_dict().ok());
            let non_empty = |key: &[u8]| {
                resources
                    .and_then(|res| res.get(key).ok())
                    .and_then(|o| doc.dereference(o).ok())
                    .and_then(|(_, resolved)| resolved.as_dict().ok())
                    .is_some_and(|d| !d.is_empty())
            };
            non_empty(b"XObject") && !non_empty(b"Font")
        })
        .count();

    let ratio = image_only_pages as f64 / pages.len() as f64;
    info!(
        total_pages = pages.len(),
        image_only = image_only_pages,
        ratio = format!("{ratio:.2}"),
        "Scanned-page analysis"
    );

    ratio >= SCANNED_PAGE_RATIO
}

/// Canonical text form the field rules run against: `\n` line breaks,
/// ASCII spaces only, no runs of horizontal whitespace, no blank lines.
pub fn normalize_text(raw: &str) -> String {
    raw.replace("\r\n", "\n")
        .replace('\r', "\n")
        .lines()
        .map(|line| {
            line.split(|c: char| c.is_whitespace() || c == '\u{feff}')
                .filter(|word| !word.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_pdf_bytes() {
        let result = document_to_text(b"%PDF-1.4 this is not really a pdf");
        assert!(matches!(result, DocumentText::Error(_)));
    }

    #[test]
    fn test_plain_text_passthrough() {
        let raw = "FATURA DE ENERGIA\r\n\r\nENERGIA INJETADA\u{a0}\u{a0} -120 kWh\t\n  CONSUMO   350 kWh  ";
        let result = document_to_text(raw.as_bytes());
        assert_eq!(
            result,
            DocumentText::Text(
                "FATURA DE ENERGIA\nENERGIA INJETADA -120 kWh\nCONSUMO 350 kWh".to_string()
            )
        );
    }

    #[test]
    fn test_short_plain_text_is_kept() {
        assert_eq!(
            document_to_text(b"  ENERGIA INJETADA -120 kWh \n"),
            DocumentText::Text("ENERGIA INJETADA -120 kWh".to_string())
        );
        assert!(matches!(document_to_text(b" \r\n\t "), DocumentText::Error(_)));
    }

    #[test]
    fn test_rendered_report_reads_back_as_text() {
        use crate::heuristics::InvoiceReading;
        use crate::metrics::{MetricsConfig, compute};
        use crate::report::{ReportSettings, render_report};

        let reading = InvoiceReading {
            grid_consumption_kwh: Some(300.0),
            energy_injected_kwh: Some(400.0),
            ..Default::default()
        };
        let result = compute(&reading, 1000.0, &MetricsConfig::default());
        let pdf = render_report(&result, None, &ReportSettings::default()).unwrap();

        let text = match document_to_text(&pdf) {
            DocumentText::Text(text) => text,
            other => panic!("expected text, got {other:?}"),
        };
        assert!(text.contains("Consumo da rede: 300.00 kWh"), "{text}");
        assert!(text.contains("Energia injetada"), "{text}");
        assert!(text.contains("Consumo P"), "{text}");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let raw = "  Saldo\u{2007}acumulado:   42,5 kWh \r\n\n\nLeitura 01/02/2024 ";
        let once = normalize_text(raw);
        assert_eq!(once, "Saldo acumulado: 42,5 kWh\nLeitura 01/02/2024");
        assert_eq!(normalize_text(&once), once);
    }
}
