use super::{Field, InvoiceReading};
use regex::Regex;
use std::sync::LazyLock;
use time::{Date, Month};
use tracing::debug;

/// Numeric capture: optional minus (utilities print injection as negative),
/// digits with `.`/`,` grouping or decimal separators.
const NUMBER: &str = r"((?:-\s?)?\d(?:[\d.,]*\d)?)";

/// What may follow a loose numeric capture. Rejects "01/2024"-style
/// reference months being read as quantities.
const NUMBER_END: &str = r"(?:[^\d/.,]|$)";

struct FieldRule {
    field: Field,
    /// Most specific first. `{num}` and `{end}` are substituted before compiling.
    patterns: &'static [&'static str],
}

// ---------------------------------------------------------------------------
// Rule table
// ---------------------------------------------------------------------------

static RULES: &[FieldRule] = &[
    FieldRule {
        field: Field::EnergyInjected,
        patterns: &[
            r"(?i)(?:energia\s+(?:el[eé]t(?:rica)?\.?\s+)?injetada|energy\s+injected|injected\s+energy|energy\s+exported|exported\s+energy)\b[^\n]*?{num}\s*kwh",
            r"(?i)(?:energia\s+(?:el[eé]t(?:rica)?\.?\s+)?injetada|energy\s+injected|injected\s+energy|energy\s+exported|exported\s+energy|inje[cç][aã]o)\s*(?:\(?kwh\)?)?\s*[:=]?\s*{num}{end}",
        ],
    },
    FieldRule {
        field: Field::GridConsumption,
        patterns: &[
            r"(?i)(?:consumo\s+da\s+rede|grid\s+(?:energy\s+)?consumption|energy\s+consumed\s+from\s+(?:the\s+)?grid|energia\s+(?:el[eé]t(?:rica)?\.?\s+)?consumo|energia\s+ativa\s+fornecida|consumo\s+(?:faturado|total|ativo|medido))\b[^\n]*?{num}\s*kwh",
            r"(?i)(?:consumo\s+da\s+rede|grid\s+(?:energy\s+)?consumption|energia\s+(?:el[eé]t(?:rica)?\.?\s+)?consumo|energia\s+ativa\s+fornecida|consumo\s+(?:faturado|total|ativo|medido))\s*(?:\(?kwh\)?)?\s*[:=]?\s*{num}{end}",
            r"(?i)\b(?:consumo|consumption)\s*(?:\(?kwh\)?)?\s*[:=]?\s*{num}{end}",
        ],
    },
    FieldRule {
        field: Field::AccumulatedCredit,
        patterns: &[
            r"(?i)(?:saldo\s+(?:acumulado|atual|de\s+cr[eé]ditos?)|cr[eé]ditos?\s+acumulados?|accumulated\s+(?:balance|credits?)|credit\s+balance)\b[^\n]*?{num}\s*kwh",
            r"(?i)(?:saldo\s+(?:acumulado|atual|de\s+cr[eé]ditos?)|cr[eé]ditos?\s+acumulados?|accumulated\s+(?:balance|credits?)|credit\s+balance)\s*(?:\(?kwh\)?)?\s*[:=]?\s*{num}{end}",
        ],
    },
];

struct CompiledRule {
    field: Field,
    patterns: Vec<Regex>,
}

static COMPILED: LazyLock<Vec<CompiledRule>> = LazyLock::new(|| {
    RULES
        .iter()
        .map(|rule| CompiledRule {
            field: rule.field,
            patterns: rule
                .patterns
                .iter()
                .map(|p| {
                    let pattern = p.replace("{num}", NUMBER).replace("{end}", NUMBER_END);
                    Regex::new(&pattern).expect("invalid field pattern")
                })
                .collect(),
        })
        .collect()
});

static DATE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{2})/(\d{2})/(\d{4})\b").expect("invalid date pattern"));

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

pub fn extract(text: &str) -> InvoiceReading {
    let mut reading = InvoiceReading::default();

    for rule in COMPILED.iter() {
        let value = first_match(&rule.patterns, text);
        match value {
            Some(v) => debug!(field = %rule.field, value = v, "Field recovered"),
            None => debug!(field = %rule.field, "No rule matched — needs manual input"),
        }
        *reading.slot(rule.field) = value;
    }

    let mut dates = DATE_TOKEN.captures_iter(text).filter_map(|c| {
        let day: u8 = c[1].parse().ok()?;
        let month: u8 = c[2].parse().ok()?;
        let year: i32 = c[3].parse().ok()?;
        Date::from_calendar_date(year, Month::try_from(month).ok()?, day).ok()
    });
    // No ordering check: the first two dates on the bill are the reading dates.
    if let (Some(start), Some(end)) = (dates.next(), dates.next()) {
        reading.period_start = Some(start);
        reading.period_end = Some(end);
    }

    reading
}

/// First pattern (in table order) whose capture parses wins.
fn first_match(patterns: &[Regex], text: &str) -> Option<f64> {
    patterns.iter().find_map(|re| {
        re.captures_iter(text)
            .find_map(|c| parse_decimal(&c[1]))
            .map(f64::abs)
    })
}

/// Parse a human-formatted number: `1.234,56`, `-120`, `42,5`, `1,234.5` is rejected.
///
/// A comma is always the decimal separator (dots around it are grouping).
/// Without a comma, a single dot is decimal and several dots are grouping.
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let normalized = match (compact.find(','), compact.rfind('.')) {
        (Some(comma), Some(dot)) if dot > comma => return None,
        (Some(_), _) => compact.replace('.', "").replacen(',', ".", 1),
        (None, _) if compact.matches('.').count() > 1 => compact.replace('.', ""),
        _ => compact,
    };
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}
