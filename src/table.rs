// src/table.rs

use crate::error::{Error, Result};
use calamine::{Data, Reader};
use std::borrow::Cow;
use std::io::Cursor;
use std::path::Path;
use time::macros::datetime;
use time::{Duration, PrimitiveDateTime};
use tracing::{debug, info};

/// One decoded spreadsheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    DateTime(PrimitiveDateTime),
}

impl Cell {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// A decoded generation log before any column has been identified.
/// Rows are kept verbatim; exporters often put a preamble above the header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub name: String,
    pub rows: Vec<Vec<Cell>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    /// xlsx / xlsm / xlsb / xls / ods — calamine sniffs the container itself.
    Workbook,
    /// Decide from the leading bytes.
    Sniff,
}

impl TableFormat {
    pub fn from_file_name(name: impl AsRef<Path>) -> Self {
        let ext = name
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("csv" | "txt" | "tsv") => TableFormat::Csv,
            Some("xlsx" | "xlsm" | "xlsb" | "xls" | "ods") => TableFormat::Workbook,
            _ => TableFormat::Sniff,
        }
    }
}

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0];

/// Decode one uploaded log into rows of cells.
pub fn decode_table(name: &str, bytes: &[u8], format: TableFormat) -> Result<Table> {
    let format = match format {
        TableFormat::Sniff if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(OLE_MAGIC) => {
            TableFormat::Workbook
        }
        TableFormat::Sniff => TableFormat::Csv,
        other => other,
    };

    let rows = match format {
        TableFormat::Workbook => decode_workbook(bytes)?,
        _ => decode_csv(bytes)?,
    };
    info!(name = %name, rows = rows.len(), format = ?format, "Decoded generation log");

    Ok(Table {
        name: name.to_string(),
        rows,
    })
}

fn decode_csv(bytes: &[u8]) -> Result<Vec<Vec<Cell>>> {
    let delimiter = sniff_delimiter(bytes);
    debug!(delimiter = %(delimiter as char).escape_default(), "CSV delimiter");

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(bytes);

    let mut rows = Vec::new();
    // Byte records: inverter portals happily export Latin-1.
    for record in reader.byte_records() {
        let record = record?;
        rows.push(
            record
                .iter()
                .map(|field| {
                    let text = decode_field(field);
                    let text = text.trim().trim_start_matches('\u{feff}');
                    if text.is_empty() {
                        Cell::Empty
                    } else {
                        Cell::Text(text.to_string())
                    }
                })
                .collect(),
        );
    }
    Ok(rows)
}

/// UTF-8 when valid, otherwise Latin-1 (every byte is its own code point).
fn decode_field(field: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(field) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => Cow::Owned(field.iter().map(|&b| char::from(b)).collect()),
    }
}

/// Pick the most frequent of `,` `\t` `;` on the first line that has any
/// of them (skipping single-cell preamble lines). Ties go to `;`, the usual
/// choice when commas are decimal separators.
fn sniff_delimiter(bytes: &[u8]) -> u8 {
    bytes
        .split(|&b| b == b'\n')
        .take(PREAMBLE_SCAN_LINES)
        .find_map(|line| {
            [b',', b'\t', b';']
                .into_iter()
                .map(|d| (d, line.iter().filter(|&&b| b == d).count()))
                .filter(|&(_, count)| count > 0)
                .max_by_key(|&(_, count)| count)
                .map(|(d, _)| d)
        })
        .unwrap_or(b',')
}

const PREAMBLE_SCAN_LINES: usize = 20;

fn decode_workbook(bytes: &[u8]) -> Result<Vec<Vec<Cell>>> {
    let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(Error::EmptyWorkbook)??;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_from_data).collect())
        .collect())
}

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::String(s) if s.trim().is_empty() => Cell::Empty,
        Data::String(s) | Data::DateTimeIso(s) => Cell::Text(s.trim().to_string()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::DateTime(dt) => {
            excel_serial_to_datetime(dt.as_f64()).map_or(Cell::Number(dt.as_f64()), Cell::DateTime)
        }
        _ => Cell::Empty,
    }
}

/// Last serial Excel can represent (9999-12-31).
const MAX_EXCEL_SERIAL: f64 = 2_958_466.0;

/// Excel stores date-times as days since 1899-12-30 (1900 date system).
pub fn excel_serial_to_datetime(serial: f64) -> Option<PrimitiveDateTime> {
    if !serial.is_finite() || !(1.0..MAX_EXCEL_SERIAL).contains(&serial) {
        return None;
    }
    let millis = (serial * 86_400_000.0).round() as i64;
    datetime!(1899-12-30 0:00).checked_add(Duration::milliseconds(millis))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_file_name() {
        assert_eq!(TableFormat::from_file_name("march.CSV"), TableFormat::Csv);
        assert_eq!(TableFormat::from_file_name("inverter.xlsx"), TableFormat::Workbook);
        assert_eq!(TableFormat::from_file_name("export.ods"), TableFormat::Workbook);
        assert_eq!(TableFormat::from_file_name("upload"), TableFormat::Sniff);
    }

    #[test]
    fn test_semicolon_csv_with_preamble() {
        let csv = "Relatório do inversor\n\nTempo;Rendimento (kWh)\n2024-03-01 12:00;12,5\n2024-03-02 12:00;;\n";
        let table = decode_table("log.csv", csv.as_bytes(), TableFormat::Sniff).unwrap();
        assert_eq!(table.name, "log.csv");
        assert_eq!(table.rows.len(), 4);
        assert_eq!(table.rows[0], vec![Cell::Text("Relatório do inversor".into())]);
        assert_eq!(
            table.rows[2],
            vec![
                Cell::Text("2024-03-01 12:00".into()),
                Cell::Text("12,5".into())
            ]
        );
        assert_eq!(
            table.rows[3],
            vec![Cell::Text("2024-03-02 12:00".into()), Cell::Empty, Cell::Empty]
        );
    }

    #[test]
    fn test_comma_and_tab_delimiters() {
        assert_eq!(sniff_delimiter(b"Update time,Daily PV Yield(kWh),Total PV Yield(kWh)\n"), b',');
        assert_eq!(sniff_delimiter(b"\n\ntime\tyield\n"), b'\t');
        assert_eq!(sniff_delimiter(b"timestamp\n"), b',');
    }

    #[test]
    fn test_latin1_csv_keeps_accented_headers() {
        let bytes = b"Data;Gera\xe7\xe3o\n01/03/2024;10\n";
        let table = decode_table("latin1.csv", bytes, TableFormat::Csv).unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(
            table.rows[0],
            vec![Cell::Text("Data".into()), Cell::Text("Geração".into())]
        );
        assert_eq!(table.rows[1][1], Cell::Text("10".into()));

        let log = crate::generation::GenerationLog::from_table(&table).unwrap();
        assert_eq!(log.records.len(), 1);
        assert_eq!(log.records[0].yield_kwh, 10.0);
    }

    #[test]
    fn test_utf8_fields_pass_through() {
        assert_eq!(decode_field("Produção".as_bytes()), "Produção");
        assert_eq!(decode_field(b"Produ\xe7\xe3o"), "Produção");
    }

    #[test]
    fn test_workbook_cells() {
        use calamine::{ExcelDateTime, ExcelDateTimeType};

        let serial = ExcelDateTime::new(45352.5, ExcelDateTimeType::DateTime, false);
        assert_eq!(
            cell_from_data(&Data::DateTime(serial)),
            Cell::DateTime(datetime!(2024-03-01 12:00))
        );
        assert_eq!(
            cell_from_data(&Data::DateTimeIso("2024-03-01T12:00:00".into())),
            Cell::Text("2024-03-01T12:00:00".into())
        );
        assert_eq!(cell_from_data(&Data::Int(42)), Cell::Number(42.0));
        assert_eq!(cell_from_data(&Data::Float(12.5)), Cell::Number(12.5));
        assert_eq!(
            cell_from_data(&Data::String(" Daily Yield ".into())),
            Cell::Text("Daily Yield".into())
        );
        assert_eq!(cell_from_data(&Data::String("   ".into())), Cell::Empty);
        assert_eq!(cell_from_data(&Data::Empty), Cell::Empty);
    }

    #[test]
    fn test_garbage_workbook_is_an_error() {
        let result = decode_table("broken.xlsx", b"PK\x03\x04 not a zip", TableFormat::Sniff);
        assert!(matches!(result, Err(Error::Workbook(_))));
    }

    #[test]
    fn test_excel_serial_conversion() {
        // 45352.5 = 2024-03-01 12:00
        assert_eq!(
            excel_serial_to_datetime(45352.5),
            Some(datetime!(2024-03-01 12:00))
        );
        assert_eq!(excel_serial_to_datetime(-3.0), None);
        assert_eq!(excel_serial_to_datetime(f64::NAN), None);
    }
}
