use thiserror::Error;

/// Failures that abort a single action (loading an input, exporting a report).
///
/// Everything the analysis can absorb (fields missing from the invoice text,
/// unreadable generation logs, an inverted period) is represented as data instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("workbook error: {0}")]
    Workbook(#[from] calamine::Error),
    #[error("workbook has no worksheets")]
    EmptyWorkbook,
    #[error("generation log has no {0} column")]
    MissingColumn(&'static str),
    #[error("report rendering failed: {0}")]
    Render(#[from] lopdf::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
