// src/metrics.rs

use crate::heuristics::InvoiceReading;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification thresholds and the optional generation target.
/// Deployments disagree on the right values, so none of them are baked in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub excess_credit_threshold_kwh: f64,
    pub low_efficiency_threshold_pct: f64,
    pub generation_target_kwh: Option<f64>,
    pub underperformance_threshold_pct: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            excess_credit_threshold_kwh: 500.0,
            low_efficiency_threshold_pct: 50.0,
            generation_target_kwh: None,
            underperformance_threshold_pct: 80.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Interpretation {
    Adequate,
    ExcessCredit,
    LowEfficiency,
    LowGeneration,
    Underperforming,
}

impl Interpretation {
    /// One-line verdict for the results panel.
    pub fn message(self) -> &'static str {
        match self {
            Interpretation::Adequate => "✅ Sistema com geração adequada ao consumo.",
            Interpretation::ExcessCredit => {
                "📌 Muitos créditos sobrando: pode estar gerando mais do que consome."
            }
            Interpretation::LowEfficiency => {
                "⚠️ Pouco aproveitamento local: verifique consumo diurno ou ajuste de carga."
            }
            Interpretation::LowGeneration => {
                "⚠️ Nenhuma geração registrada no período: verifique o inversor ou os arquivos enviados."
            }
            Interpretation::Underperforming => {
                "📉 Geração abaixo da meta: verifique sombreamento, sujeira ou falhas no sistema."
            }
        }
    }

    /// Paragraph for the exported report (no emoji; the PDF font cannot draw them).
    pub fn report_text(self) -> &'static str {
        match self {
            Interpretation::Adequate => "Geração adequada ao consumo.",
            Interpretation::ExcessCredit => {
                "Créditos altos acumulando: pode estar gerando mais que o necessário. \
                 Avalie o aumento do consumo diurno ou a transferência de créditos para outra unidade."
            }
            Interpretation::LowEfficiency => {
                "Baixo aproveitamento da geração: reavalie perfil de consumo. \
                 Deslocar cargas para o horário de sol aumenta o uso direto da energia gerada."
            }
            Interpretation::LowGeneration => {
                "Nenhuma geração foi registrada no período analisado. \
                 Confira se o inversor está operando e se os registros cobrem as datas da fatura."
            }
            Interpretation::Underperforming => {
                "A geração ficou abaixo da meta esperada para o período. \
                 Verifique sombreamento, limpeza dos módulos e alarmes do inversor."
            }
        }
    }
}

impl fmt::Display for Interpretation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Interpretation::Adequate => "ADEQUATE",
            Interpretation::ExcessCredit => "EXCESS_CREDIT",
            Interpretation::LowEfficiency => "LOW_EFFICIENCY",
            Interpretation::LowGeneration => "LOW_GENERATION",
            Interpretation::Underperforming => "UNDERPERFORMING",
        })
    }
}

/// Everything derived for one billing period. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub generation_total_kwh: f64,
    pub grid_consumption_kwh: f64,
    pub energy_injected_kwh: f64,
    pub accumulated_credit_kwh: f64,
    pub local_use_kwh: f64,
    pub total_consumed_kwh: f64,
    pub credit_estimate_kwh: f64,
    pub local_use_efficiency_pct: f64,
    pub overall_efficiency_pct: f64,
    pub generation_target_kwh: Option<f64>,
    pub performance_pct: f64,
    pub interpretation: Interpretation,
}

/// Non-negative, finite, or zero.
fn sanitize(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

fn percent(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator * 100.0
    } else {
        0.0
    }
}

/// Derive the ratios and classify them. Total: never fails, never divides by zero.
pub fn compute(
    reading: &InvoiceReading,
    generation_total: f64,
    config: &MetricsConfig,
) -> AnalysisResult {
    let generation = sanitize(generation_total);
    let grid = sanitize(reading.grid_consumption());
    let injected = sanitize(reading.energy_injected());
    let target = config.generation_target_kwh.map(sanitize).filter(|&t| t > 0.0);

    let local_use_kwh = (generation - injected).max(0.0);
    let total_consumed_kwh = grid + injected;
    let credit_estimate_kwh = (generation - total_consumed_kwh).max(0.0);
    let local_use_efficiency_pct = percent(local_use_kwh, generation);
    let overall_efficiency_pct = percent(generation, total_consumed_kwh);
    let performance_pct = target.map_or(0.0, |t| percent(generation, t));

    let interpretation = if credit_estimate_kwh > config.excess_credit_threshold_kwh {
        Interpretation::ExcessCredit
    } else if generation > 0.0 && local_use_efficiency_pct < config.low_efficiency_threshold_pct {
        Interpretation::LowEfficiency
    } else if generation == 0.0 {
        Interpretation::LowGeneration
    } else if target.is_some() && performance_pct < config.underperformance_threshold_pct {
        Interpretation::Underperforming
    } else {
        Interpretation::Adequate
    };

    AnalysisResult {
        generation_total_kwh: generation,
        grid_consumption_kwh: grid,
        energy_injected_kwh: injected,
        accumulated_credit_kwh: sanitize(reading.accumulated_credit()),
        local_use_kwh,
        total_consumed_kwh,
        credit_estimate_kwh,
        local_use_efficiency_pct,
        overall_efficiency_pct,
        generation_target_kwh: target,
        performance_pct,
        interpretation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(grid: f64, injected: f64) -> InvoiceReading {
        InvoiceReading {
            grid_consumption_kwh: Some(grid),
            energy_injected_kwh: Some(injected),
            ..Default::default()
        }
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 0.005
    }

    #[test]
    fn test_balanced_period_is_adequate() {
        let result = compute(&reading(300.0, 400.0), 1000.0, &MetricsConfig::default());
        assert_eq!(result.total_consumed_kwh, 700.0);
        assert_eq!(result.credit_estimate_kwh, 300.0);
        assert_eq!(result.local_use_kwh, 600.0);
        assert!(approx(result.local_use_efficiency_pct, 60.0));
        assert!(approx(result.overall_efficiency_pct, 142.86));
        assert_eq!(result.performance_pct, 0.0);
        assert_eq!(result.interpretation, Interpretation::Adequate);
    }

    #[test]
    fn test_zero_generation() {
        let result = compute(&reading(350.0, 0.0), 0.0, &MetricsConfig::default());
        assert_eq!(result.local_use_efficiency_pct, 0.0);
        assert_eq!(result.overall_efficiency_pct, 0.0);
        assert_eq!(result.interpretation, Interpretation::LowGeneration);

        let result = compute(&InvoiceReading::default(), 0.0, &MetricsConfig::default());
        assert_eq!(result.overall_efficiency_pct, 0.0);
        assert_eq!(result.interpretation, Interpretation::LowGeneration);
    }

    #[test]
    fn test_excess_credit_wins_first() {
        // Also below the efficiency threshold; excess credit is checked first.
        let result = compute(&reading(50.0, 800.0), 1500.0, &MetricsConfig::default());
        assert!(approx(result.credit_estimate_kwh, 650.0));
        assert!(result.local_use_efficiency_pct < 50.0);
        assert_eq!(result.interpretation, Interpretation::ExcessCredit);
    }

    #[test]
    fn test_thresholds_are_configurable() {
        let config = MetricsConfig {
            excess_credit_threshold_kwh: 200.0,
            low_efficiency_threshold_pct: 70.0,
            ..Default::default()
        };
        let result = compute(&reading(300.0, 400.0), 1000.0, &config);
        assert_eq!(result.interpretation, Interpretation::ExcessCredit);

        let result = compute(&reading(500.0, 400.0), 1000.0, &config);
        assert_eq!(result.credit_estimate_kwh, 100.0);
        assert_eq!(result.interpretation, Interpretation::LowEfficiency);
    }

    #[test]
    fn test_performance_against_target() {
        let config = MetricsConfig {
            generation_target_kwh: Some(800.0),
            ..Default::default()
        };
        let result = compute(&reading(500.0, 100.0), 600.0, &config);
        assert_eq!(result.performance_pct, 75.0);
        assert_eq!(result.generation_target_kwh, Some(800.0));
        assert_eq!(result.interpretation, Interpretation::Underperforming);

        let result = compute(&reading(500.0, 100.0), 700.0, &config);
        assert_eq!(result.performance_pct, 87.5);
        assert_eq!(result.interpretation, Interpretation::Adequate);
    }

    #[test]
    fn test_zero_target_counts_as_absent() {
        let config = MetricsConfig {
            generation_target_kwh: Some(0.0),
            ..Default::default()
        };
        let result = compute(&reading(500.0, 100.0), 600.0, &config);
        assert_eq!(result.generation_target_kwh, None);
        assert_eq!(result.performance_pct, 0.0);
    }

    #[test]
    fn test_garbage_inputs_are_sanitized() {
        let result = compute(&reading(f64::NAN, -40.0), f64::INFINITY, &MetricsConfig::default());
        assert_eq!(result.generation_total_kwh, 0.0);
        assert_eq!(result.grid_consumption_kwh, 0.0);
        assert_eq!(result.energy_injected_kwh, 0.0);
        assert_eq!(result.interpretation, Interpretation::LowGeneration);
    }

    #[test]
    fn test_ratio_bounds_hold_across_inputs() {
        let config = MetricsConfig::default();
        for generation in [0.0, 0.5, 10.0, 333.3, 1000.0, 12_500.0] {
            for grid in [0.0, 1.0, 250.0, 9_000.0] {
                for share in [0.0, 0.1, 0.5, 0.99, 1.0, 1.5] {
                    let injected = generation * share;
                    let result = compute(&reading(grid, injected), generation, &config);
                    assert!(result.credit_estimate_kwh >= 0.0);
                    assert!(result.local_use_kwh >= 0.0);
                    if injected <= generation {
                        assert!((0.0..=100.0).contains(&result.local_use_efficiency_pct));
                    }
                }
            }
        }
    }
}
