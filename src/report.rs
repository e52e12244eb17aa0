// src/report.rs

use crate::error::Result;
use crate::generation::PeriodWindow;
use crate::metrics::AnalysisResult;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    pub title: String,
    pub file_name: String,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            title: "Relatório - Consumo Pós Energia Solar".to_string(),
            file_name: "relatorio_energia_solar.pdf".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStyle {
    Title,
    Heading,
    Body,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportLine {
    pub style: LineStyle,
    pub text: String,
    /// Extra vertical space before this line, in text lines.
    pub gap_before: u8,
}

impl ReportLine {
    fn new(style: LineStyle, text: impl Into<String>) -> Self {
        Self {
            style,
            text: text.into(),
            gap_before: 0,
        }
    }

    fn after_gap(mut self) -> Self {
        self.gap_before = 1;
        self
    }
}

const WRAP_COLUMNS: usize = 90;

/// The fixed report layout as text lines, shared by the terminal view and the PDF.
pub fn report_lines(
    result: &AnalysisResult,
    window: Option<&PeriodWindow>,
    title: &str,
) -> Vec<ReportLine> {
    let period = window.map_or_else(|| "não informado".to_string(), ToString::to_string);

    let mut lines = vec![
        ReportLine::new(LineStyle::Title, title),
        ReportLine::new(LineStyle::Body, format!("Período: {period}")).after_gap(),
        ReportLine::new(
            LineStyle::Body,
            format!(
                "Geração total do sistema: {:.2} kWh",
                result.generation_total_kwh
            ),
        ),
        ReportLine::new(
            LineStyle::Body,
            format!("Consumo da rede: {:.2} kWh", result.grid_consumption_kwh),
        ),
        ReportLine::new(
            LineStyle::Body,
            format!(
                "Energia injetada (créditos): {:.2} kWh",
                result.energy_injected_kwh
            ),
        ),
        ReportLine::new(
            LineStyle::Body,
            format!(
                "Saldo de créditos na fatura: {:.2} kWh",
                result.accumulated_credit_kwh
            ),
        ),
        ReportLine::new(
            LineStyle::Body,
            format!(
                "Crédito acumulado estimado: {:.2} kWh",
                result.credit_estimate_kwh
            ),
        ),
        ReportLine::new(
            LineStyle::Body,
            format!(
                "Aproveitamento local da geração: {:.2}%",
                result.local_use_efficiency_pct
            ),
        ),
        ReportLine::new(
            LineStyle::Body,
            format!(
                "Eficiência total da geração: {:.2}%",
                result.overall_efficiency_pct
            ),
        ),
    ];

    if let Some(target) = result.generation_target_kwh {
        lines.push(ReportLine::new(
            LineStyle::Body,
            format!(
                "Desempenho vs. meta ({target:.2} kWh): {:.2}%",
                result.performance_pct
            ),
        ));
    }

    lines.push(ReportLine::new(LineStyle::Heading, "Interpretação:").after_gap());
    lines.extend(
        wrap(result.interpretation.report_text(), WRAP_COLUMNS)
            .into_iter()
            .map(|l| ReportLine::new(LineStyle::Body, l)),
    );
    lines
}

fn wrap(paragraph: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in paragraph.split_whitespace() {
        if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

// ---------------------------------------------------------------------------
// PDF layout
// ---------------------------------------------------------------------------

/// A4 in points.
const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN_LEFT: i64 = 56;
const TOP_BASELINE: i64 = 780;
const LINE_HEIGHT: i64 = 22;

/// Base-14 fonts only hold WinAnsi glyphs; Latin-1 maps straight across.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\u{2013}' | '\u{2014}' => b'-',
            c if (c as u32) < 0x100 => c as u8,
            _ => b'?',
        })
        .collect()
}

/// Render the single-page summary as PDF bytes.
pub fn render_report(
    result: &AnalysisResult,
    window: Option<&PeriodWindow>,
    settings: &ReportSettings,
) -> Result<Vec<u8>> {
    let lines = report_lines(result, window, &settings.title);

    let mut operations = Vec::new();
    let mut baseline = TOP_BASELINE;
    for line in &lines {
        baseline -= LINE_HEIGHT * i64::from(line.gap_before);
        let (font, size) = match line.style {
            LineStyle::Title => ("F2", 14),
            LineStyle::Heading => ("F2", 12),
            LineStyle::Body => ("F1", 12),
        };
        operations.extend([
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![Object::Name(font.as_bytes().to_vec()), Object::Integer(size)],
            ),
            Operation::new(
                "Td",
                vec![Object::Integer(MARGIN_LEFT), Object::Integer(baseline)],
            ),
            Operation::new("Tj", vec![Object::string_literal(win_ansi(&line.text))]),
            Operation::new("ET", vec![]),
        ]);
        baseline -= LINE_HEIGHT;
    }

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let regular_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular_id,
            "F2" => bold_id,
        },
    });
    let content = Content { operations };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    info!(bytes = bytes.len(), lines = lines.len(), "Report rendered");
    Ok(bytes)
}
