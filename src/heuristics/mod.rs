// src/heuristics/mod.rs

mod rules;

use serde::{Deserialize, Serialize};
use std::fmt;
use time::Date;

pub use rules::parse_decimal;

/// Numeric invoice fields the rule table knows how to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    GridConsumption,
    EnergyInjected,
    AccumulatedCredit,
}

impl Field {
    pub const ALL: [Field; 3] = [
        Field::GridConsumption,
        Field::EnergyInjected,
        Field::AccumulatedCredit,
    ];
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Field::GridConsumption => "grid consumption",
            Field::EnergyInjected => "energy injected",
            Field::AccumulatedCredit => "accumulated credit",
        })
    }
}

/// Anything the caller may have to type in by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingInput {
    Period,
    Value(Field),
}

impl fmt::Display for MissingInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingInput::Period => f.write_str("billing period"),
            MissingInput::Value(field) => field.fmt(f),
        }
    }
}

/// What could be recovered from one invoice. `None` means the text did not
/// contain the field; that is an expected state, not an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceReading {
    pub period_start: Option<Date>,
    pub period_end: Option<Date>,
    pub grid_consumption_kwh: Option<f64>,
    pub energy_injected_kwh: Option<f64>,
    pub accumulated_credit_kwh: Option<f64>,
}

/// Values typed in by the user. Each one present replaces the extracted value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManualEntry {
    pub period_start: Option<Date>,
    pub period_end: Option<Date>,
    pub grid_consumption_kwh: Option<f64>,
    pub energy_injected_kwh: Option<f64>,
    pub accumulated_credit_kwh: Option<f64>,
}

impl InvoiceReading {
    pub fn get(&self, field: Field) -> Option<f64> {
        match field {
            Field::GridConsumption => self.grid_consumption_kwh,
            Field::EnergyInjected => self.energy_injected_kwh,
            Field::AccumulatedCredit => self.accumulated_credit_kwh,
        }
    }

    fn slot(&mut self, field: Field) -> &mut Option<f64> {
        match field {
            Field::GridConsumption => &mut self.grid_consumption_kwh,
            Field::EnergyInjected => &mut self.energy_injected_kwh,
            Field::AccumulatedCredit => &mut self.accumulated_credit_kwh,
        }
    }

    pub fn grid_consumption(&self) -> f64 {
        self.grid_consumption_kwh.unwrap_or(0.0)
    }

    pub fn energy_injected(&self) -> f64 {
        self.energy_injected_kwh.unwrap_or(0.0)
    }

    pub fn accumulated_credit(&self) -> f64 {
        self.accumulated_credit_kwh.unwrap_or(0.0)
    }

    /// Both period dates, in the order they appeared on the invoice.
    pub fn period(&self) -> Option<(Date, Date)> {
        self.period_start.zip(self.period_end)
    }

    /// Overlay manually entered values on top of the extracted ones.
    pub fn apply(mut self, manual: &ManualEntry) -> Self {
        self.period_start = manual.period_start.or(self.period_start);
        self.period_end = manual.period_end.or(self.period_end);
        for (field, value) in [
            (Field::GridConsumption, manual.grid_consumption_kwh),
            (Field::EnergyInjected, manual.energy_injected_kwh),
            (Field::AccumulatedCredit, manual.accumulated_credit_kwh),
        ] {
            if let Some(v) = value {
                *self.slot(field) = Some(v.abs());
            }
        }
        self
    }

    /// Inputs that still need to be supplied by hand.
    pub fn missing_fields(&self) -> Vec<MissingInput> {
        let mut missing = Vec::new();
        if self.period().is_none() {
            missing.push(MissingInput::Period);
        }
        missing.extend(
            Field::ALL
                .into_iter()
                .filter(|&f| self.get(f).is_none())
                .map(MissingInput::Value),
        );
        missing
    }

    /// How many fields were successfully recovered (dates count as one).
    pub fn coverage(&self) -> (usize, usize) {
        let total = Field::ALL.len() + 1;
        (total - self.missing_fields().len(), total)
    }

    pub fn is_fully_recovered(&self) -> bool {
        self.missing_fields().is_empty()
    }
}

/// Extract invoice readings from normalized document text.
pub fn extract(text: &str) -> InvoiceReading {
    rules::extract(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn test_empty_reading_needs_everything() {
        let reading = InvoiceReading::default();
        assert_eq!(reading.coverage(), (0, 4));
        assert!(!reading.is_fully_recovered());
        assert_eq!(reading.grid_consumption(), 0.0);
        assert_eq!(
            reading.missing_fields(),
            vec![
                MissingInput::Period,
                MissingInput::Value(Field::GridConsumption),
                MissingInput::Value(Field::EnergyInjected),
                MissingInput::Value(Field::AccumulatedCredit),
            ]
        );
    }

    #[test]
    fn test_manual_entry_overrides_extraction() {
        let reading = InvoiceReading {
            grid_consumption_kwh: Some(300.0),
            energy_injected_kwh: Some(400.0),
            ..Default::default()
        };
        let manual = ManualEntry {
            period_start: Some(date!(2024 - 01 - 10)),
            period_end: Some(date!(2024 - 02 - 09)),
            energy_injected_kwh: Some(-410.0),
            accumulated_credit_kwh: Some(55.0),
            ..Default::default()
        };
        let merged = reading.apply(&manual);
        assert_eq!(merged.grid_consumption_kwh, Some(300.0));
        assert_eq!(merged.energy_injected_kwh, Some(410.0));
        assert_eq!(merged.accumulated_credit_kwh, Some(55.0));
        assert_eq!(
            merged.period(),
            Some((date!(2024 - 01 - 10), date!(2024 - 02 - 09)))
        );
        assert!(merged.is_fully_recovered());
        assert_eq!(merged.coverage(), (4, 4));
    }
}
