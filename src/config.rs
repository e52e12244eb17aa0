use crate::error::Result;
use crate::metrics::MetricsConfig;
use crate::report::ReportSettings;
use serde::Deserialize;
use std::{fs, path::Path};
use tracing::info;

pub const DEFAULT_CONFIG_PATH: &str = "solar_reconcile.toml";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub analysis: MetricsConfig,
    pub report: ReportSettings,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Like [`Config::load`], but a missing file means "use the defaults".
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "No config file — using defaults");
            return Ok(Self::default());
        }
        let cfg = Self::load(path)?;
        info!(
            path = %path.display(),
            excess_credit_threshold_kwh = cfg.analysis.excess_credit_threshold_kwh,
            low_efficiency_threshold_pct = cfg.analysis.low_efficiency_threshold_pct,
            generation_target_kwh = ?cfg.analysis.generation_target_kwh,
            "Config loaded"
        );
        Ok(cfg)
    }
}
