// src/analysis.rs

use crate::document::{DocumentText, document_to_text};
use crate::generation::{PeriodWindow, aggregate_tables};
use crate::heuristics::{self, InvoiceReading, ManualEntry, MissingInput};
use crate::metrics::{AnalysisResult, MetricsConfig, compute};
use crate::table::{TableFormat, decode_table};
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

/// One uploaded generation log.
#[derive(Debug, Clone)]
pub struct LogUpload {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Everything one user interaction provides. Nothing is carried over
/// between calls; the caller owns the session.
#[derive(Debug, Clone, Default)]
pub struct AnalysisInputs {
    pub invoice: Option<Vec<u8>>,
    pub logs: Vec<LogUpload>,
    pub manual: ManualEntry,
    /// Inverter total typed in by hand; wins over the logs.
    pub generation_kwh: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    NotProvided,
    Text,
    Scanned,
    Unreadable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationSource {
    Manual,
    Logs,
    Missing,
}

/// Inputs the user still has to supply before the numbers can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NeedsInput {
    Invoice(MissingInput),
    Generation,
}

impl fmt::Display for NeedsInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NeedsInput::Invoice(missing) => missing.fmt(f),
            NeedsInput::Generation => f.write_str("generation total"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub invoice_status: InvoiceStatus,
    pub reading: InvoiceReading,
    pub window: Option<PeriodWindow>,
    pub generation_source: GenerationSource,
    pub logs_used: Vec<String>,
    pub logs_skipped: Vec<String>,
    pub result: AnalysisResult,
    pub needs_input: Vec<NeedsInput>,
}

impl Analysis {
    pub fn is_complete(&self) -> bool {
        self.needs_input.is_empty()
    }
}

/// Run the whole pipeline for one request: document → reading, logs → generation,
/// both → metrics. Every failure degrades to a default; nothing here returns `Err`.
pub fn analyze(inputs: &AnalysisInputs, config: &MetricsConfig) -> Analysis {
    let (invoice_status, extracted) = read_invoice(inputs.invoice.as_deref());
    let reading = extracted.apply(&inputs.manual);

    let window = reading
        .period()
        .map(|(start, end)| PeriodWindow::new(start, end));
    if window.is_some_and(|w| w.is_empty()) {
        warn!("Billing period ends before it starts — treated as empty");
    }

    let mut logs_used = Vec::new();
    let mut logs_skipped = Vec::new();
    let (generation_source, generation_total) = match (inputs.generation_kwh, window) {
        (Some(manual), _) => (GenerationSource::Manual, manual),
        (None, Some(window)) if !inputs.logs.is_empty() => {
            let mut tables = Vec::with_capacity(inputs.logs.len());
            for log in &inputs.logs {
                match decode_table(&log.name, &log.bytes, TableFormat::from_file_name(&log.name)) {
                    Ok(table) => tables.push(table),
                    Err(e) => {
                        warn!(name = %log.name, error = %e, "Generation log could not be decoded");
                        logs_skipped.push(log.name.clone());
                    }
                }
            }
            let aggregation = aggregate_tables(&tables, &window);
            logs_used = aggregation.logs_used;
            logs_skipped.extend(aggregation.logs_skipped);
            if logs_used.is_empty() {
                (GenerationSource::Missing, 0.0)
            } else {
                (GenerationSource::Logs, aggregation.total_kwh)
            }
        }
        (None, None) if !inputs.logs.is_empty() => {
            warn!(
                logs = inputs.logs.len(),
                "No billing period — generation logs cannot be filtered"
            );
            (GenerationSource::Missing, 0.0)
        }
        _ => (GenerationSource::Missing, 0.0),
    };

    let mut needs_input: Vec<NeedsInput> = reading
        .missing_fields()
        .into_iter()
        .map(NeedsInput::Invoice)
        .collect();
    if generation_source == GenerationSource::Missing {
        needs_input.push(NeedsInput::Generation);
    }

    let result = compute(&reading, generation_total, config);
    info!(
        generation_kwh = result.generation_total_kwh,
        source = ?generation_source,
        interpretation = %result.interpretation,
        needs_input = needs_input.len(),
        "Analysis complete"
    );

    Analysis {
        invoice_status,
        reading,
        window,
        generation_source,
        logs_used,
        logs_skipped,
        result,
        needs_input,
    }
}

fn read_invoice(bytes: Option<&[u8]>) -> (InvoiceStatus, InvoiceReading) {
    let Some(bytes) = bytes else {
        return (InvoiceStatus::NotProvided, InvoiceReading::default());
    };
    let span = tracing::info_span!("invoice", bytes = bytes.len());
    let _guard = span.enter();

    match document_to_text(bytes) {
        DocumentText::Text(text) => {
            let reading = heuristics::extract(&text);
            let (filled, total) = reading.coverage();
            info!(
                filled,
                total,
                grid_consumption = ?reading.grid_consumption_kwh,
                energy_injected = ?reading.energy_injected_kwh,
                accumulated_credit = ?reading.accumulated_credit_kwh,
                "Heuristic coverage"
            );
            (InvoiceStatus::Text, reading)
        }
        DocumentText::ScannedImage => {
            warn!("Invoice is scanned / image-only — values must be entered manually");
            (InvoiceStatus::Scanned, InvoiceReading::default())
        }
        DocumentText::Error(e) => {
            warn!(error = %e, "Invoice could not be read — values must be entered manually");
            (InvoiceStatus::Unreadable, InvoiceReading::default())
        }
    }
}
