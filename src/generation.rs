// src/generation.rs

use crate::error::{Error, Result};
use crate::heuristics::parse_decimal;
use crate::table::{Cell, Table, excel_serial_to_datetime};
use serde::Serialize;
use std::fmt;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, PrimitiveDateTime};
use tracing::{debug, info, warn};

/// Billing period, inclusive on both ends. `start > end` is an empty window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PeriodWindow {
    pub start: Date,
    pub end: Date,
}

impl PeriodWindow {
    pub fn new(start: Date, end: Date) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    /// Covers `[start 00:00, end 23:59:59.999999999]`.
    pub fn contains(&self, timestamp: PrimitiveDateTime) -> bool {
        (self.start..=self.end).contains(&timestamp.date())
    }
}

impl fmt::Display for PeriodWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} até {}", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationRecord {
    pub timestamp: PrimitiveDateTime,
    pub yield_kwh: f64,
}

/// Records decoded from one spreadsheet, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationLog {
    pub name: String,
    pub records: Vec<GenerationRecord>,
    /// Rows below the header with an unreadable timestamp or yield.
    pub skipped_rows: usize,
}

impl GenerationLog {
    pub fn from_records(name: impl Into<String>, records: Vec<GenerationRecord>) -> Self {
        Self {
            name: name.into(),
            records,
            skipped_rows: 0,
        }
    }

    /// Locate the timestamp and yield columns and decode every row below them.
    pub fn from_table(table: &Table) -> Result<Self> {
        let columns = locate_columns(&table.rows)?;
        debug!(
            header_row = columns.header_row,
            timestamp_col = columns.timestamp,
            yield_col = columns.yield_kwh,
            "Generation columns identified"
        );

        let mut log = GenerationLog {
            name: table.name.clone(),
            ..Default::default()
        };
        for row in table.rows.iter().skip(columns.header_row + 1) {
            let timestamp = row.get(columns.timestamp).and_then(timestamp_from_cell);
            let yield_kwh = row.get(columns.yield_kwh).and_then(yield_from_cell);
            match (timestamp, yield_kwh) {
                (Some(timestamp), Some(yield_kwh)) => log.records.push(GenerationRecord {
                    timestamp,
                    yield_kwh,
                }),
                _ => log.skipped_rows += 1,
            }
        }
        Ok(log)
    }

    /// Sum of yields whose timestamp falls inside `window`.
    pub fn total_in(&self, window: &PeriodWindow) -> f64 {
        self.records
            .iter()
            .filter(|r| window.contains(r.timestamp))
            .map(|r| r.yield_kwh)
            .sum()
    }
}

/// Total generation across logs. Overlapping logs are summed as-is.
pub fn aggregate(logs: &[GenerationLog], window: &PeriodWindow) -> f64 {
    if window.is_empty() {
        warn!(
            start = %window.start,
            end = %window.end,
            "Period ends before it starts — no generation counted"
        );
        return 0.0;
    }
    logs.iter().map(|log| log.total_in(window)).sum()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Aggregation {
    pub total_kwh: f64,
    pub logs_used: Vec<String>,
    pub logs_skipped: Vec<String>,
}

/// Decode and aggregate a batch of tables. A table without recognizable
/// columns contributes nothing; the rest of the batch still counts.
pub fn aggregate_tables(tables: &[Table], window: &PeriodWindow) -> Aggregation {
    let mut logs = Vec::with_capacity(tables.len());
    let mut aggregation = Aggregation::default();

    for table in tables {
        let span = tracing::info_span!("generation_log", name = %table.name);
        let _guard = span.enter();

        match GenerationLog::from_table(table) {
            Ok(log) => {
                info!(
                    records = log.records.len(),
                    skipped_rows = log.skipped_rows,
                    in_window = log.total_in(window),
                    "Generation log decoded"
                );
                aggregation.logs_used.push(log.name.clone());
                logs.push(log);
            }
            Err(e) => {
                warn!(error = %e, "Generation log ignored");
                aggregation.logs_skipped.push(table.name.clone());
            }
        }
    }

    aggregation.total_kwh = aggregate(&logs, window);
    aggregation
}

// ---------------------------------------------------------------------------
// Column identification
// ---------------------------------------------------------------------------

/// Header search depth; inverter exports put a few lines of metadata first.
const HEADER_SCAN_ROWS: usize = 20;

const TIMESTAMP_TOKENS: &[&str] = &[
    "time", "date", "data", "hora", "timestamp", "período", "periodo",
];
const STRONG_YIELD_TOKENS: &[&str] = &[
    "yield", "generation", "geração", "geracao", "produção", "producao", "gerada",
];
const WEAK_YIELD_TOKENS: &[&str] = &["energy", "energia", "kwh"];
const CUMULATIVE_TOKENS: &[&str] = &["total", "acumulad", "lifetime", "cumulative"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Columns {
    header_row: usize,
    timestamp: usize,
    yield_kwh: usize,
}

fn has_any(label: &str, tokens: &[&str]) -> bool {
    tokens.iter().any(|t| label.contains(t))
}

fn locate_columns(rows: &[Vec<Cell>]) -> Result<Columns> {
    let mut saw_timestamp = false;
    for (header_row, row) in rows.iter().enumerate().take(HEADER_SCAN_ROWS) {
        let labels: Vec<(usize, String)> = row
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_text().map(|s| (i, s.to_lowercase())))
            .collect();

        let is_timestamp = |l: &str| has_any(l, TIMESTAMP_TOKENS);
        let is_yield = |l: &str| has_any(l, STRONG_YIELD_TOKENS) || has_any(l, WEAK_YIELD_TOKENS);

        // Prefer per-interval over cumulative counters, explicit yield
        // words over bare units, and labels that are not also time-like.
        let yield_kwh = labels
            .iter()
            .filter(|(_, l)| is_yield(l))
            .min_by_key(|(i, l)| {
                (
                    has_any(l, CUMULATIVE_TOKENS),
                    !has_any(l, STRONG_YIELD_TOKENS),
                    is_timestamp(l),
                    *i,
                )
            })
            .map(|(i, _)| *i);

        let timestamp = labels
            .iter()
            .filter(|(i, l)| is_timestamp(l) && Some(*i) != yield_kwh)
            .min_by_key(|(i, l)| (is_yield(l), *i))
            .map(|(i, _)| *i);

        saw_timestamp |= timestamp.is_some();
        if let (Some(timestamp), Some(yield_kwh)) = (timestamp, yield_kwh) {
            return Ok(Columns {
                header_row,
                timestamp,
                yield_kwh,
            });
        }
    }
    Err(Error::MissingColumn(if saw_timestamp { "yield" } else { "timestamp" }))
}

// ---------------------------------------------------------------------------
// Cell coercion
// ---------------------------------------------------------------------------

const DATETIME_FORMATS: &[&[BorrowedFormatItem<'static>]] = &[
    format_description!("[year]-[month]-[day] [hour padding:none]:[minute]:[second].[subsecond]"),
    format_description!("[year]-[month]-[day]T[hour padding:none]:[minute]:[second].[subsecond]"),
    format_description!("[year]-[month]-[day] [hour padding:none]:[minute]:[second]"),
    format_description!("[year]-[month]-[day]T[hour padding:none]:[minute]:[second]"),
    format_description!("[year]-[month]-[day] [hour padding:none]:[minute]"),
    format_description!("[year]-[month]-[day]T[hour padding:none]:[minute]"),
    format_description!("[day padding:none]/[month padding:none]/[year] [hour padding:none]:[minute]:[second]"),
    format_description!("[day padding:none]/[month padding:none]/[year] [hour padding:none]:[minute]"),
    format_description!("[year]/[month padding:none]/[day padding:none] [hour padding:none]:[minute]:[second]"),
    format_description!("[year]/[month padding:none]/[day padding:none] [hour padding:none]:[minute]"),
];

const DATE_FORMATS: &[&[BorrowedFormatItem<'static>]] = &[
    format_description!("[year]-[month]-[day]"),
    format_description!("[day padding:none]/[month padding:none]/[year]"),
    format_description!("[year]/[month padding:none]/[day padding:none]"),
];

/// Parse the timestamp spellings found in inverter exports.
pub fn parse_timestamp(raw: &str) -> Option<PrimitiveDateTime> {
    // Some portals end timestamps with a stray '.' or a UTC 'Z'.
    let s = raw.trim().trim_end_matches(['.', 'Z']);
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| PrimitiveDateTime::parse(s, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| Date::parse(s, fmt).ok())
                .map(Date::midnight)
        })
}

fn timestamp_from_cell(cell: &Cell) -> Option<PrimitiveDateTime> {
    match cell {
        Cell::DateTime(dt) => Some(*dt),
        Cell::Number(serial) => excel_serial_to_datetime(*serial),
        Cell::Text(s) => parse_timestamp(s),
        Cell::Empty => None,
    }
}

fn yield_from_cell(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Number(v) if v.is_finite() => Some(*v),
        Cell::Text(s) => {
            let number = s.trim_end_matches(|c: char| c.is_alphabetic() || c.is_whitespace());
            let value = parse_decimal(number);
            if value.is_none() {
                debug!(raw = %s, "Non-numeric yield");
            }
            value
        }
        _ => None,
    }
}
