use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::core::{
    MAX_GRID_PRICE_INCREMENTS, MAX_GRID_RATE_DELTA, RatioLimits, ReserveRules, TaxBasis,
};

pub const DEFAULT_CONFIG_PATH: &str = "affordability.toml";

/// Shape of the rate/price what-if grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GridConfig {
    /// Percentage points either side of the base rate.
    pub rate_delta: f64,
    pub price_step: f64,
    /// Steps either side of the base price.
    pub price_increments: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            rate_delta: 1.0,
            price_step: 10_000.0,
            price_increments: 10,
        }
    }
}

/// Calculator assumptions that are not per-request inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CalculatorConfig {
    /// Annual PMI rate as a decimal.
    pub pmi_rate: f64,
    /// Annual effective property tax rate as a decimal.
    pub property_tax_rate: f64,
    pub property_tax_basis: TaxBasis,
    /// PMI is dropped when loan-to-value is at or below this. 0 always charges PMI.
    pub waive_pmi_at_ltv: f64,
    pub housing_ratio_limit: f64,
    pub total_ratio_limit: f64,
    pub emergency_fund_months: u32,
    pub closing_cost_low: f64,
    pub closing_cost_high: f64,
    pub grid: GridConfig,
}

impl Default for CalculatorConfig {
    fn default() -> Self {
        Self {
            pmi_rate: 0.0055,
            property_tax_rate: 0.0202,
            property_tax_basis: TaxBasis::LoanAmount,
            waive_pmi_at_ltv: 0.80,
            housing_ratio_limit: 28.0,
            total_ratio_limit: 36.0,
            emergency_fund_months: 6,
            closing_cost_low: 0.02,
            closing_cost_high: 0.05,
            grid: GridConfig::default(),
        }
    }
}

impl CalculatorConfig {
    pub fn ratio_limits(&self) -> RatioLimits {
        RatioLimits {
            housing: self.housing_ratio_limit,
            total: self.total_ratio_limit,
        }
    }

    pub fn reserve_rules(&self) -> ReserveRules {
        ReserveRules {
            emergency_fund_months: self.emergency_fund_months,
            closing_cost_low: self.closing_cost_low,
            closing_cost_high: self.closing_cost_high,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("pmi_rate", self.pmi_rate),
            ("property_tax_rate", self.property_tax_rate),
            ("closing_cost_low", self.closing_cost_low),
            ("closing_cost_high", self.closing_cost_high),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a decimal between 0 and 1"
                )));
            }
        }
        if self.closing_cost_low > self.closing_cost_high {
            return Err(ConfigError::Invalid(
                "closing_cost_low cannot exceed closing_cost_high".to_string(),
            ));
        }
        if !self.waive_pmi_at_ltv.is_finite() || !(0.0..=1.0).contains(&self.waive_pmi_at_ltv) {
            return Err(ConfigError::Invalid(
                "waive_pmi_at_ltv must be between 0 and 1".to_string(),
            ));
        }
        if self.housing_ratio_limit <= 0.0 || self.total_ratio_limit <= 0.0 {
            return Err(ConfigError::Invalid(
                "ratio limits must be > 0".to_string(),
            ));
        }
        if !self.grid.price_step.is_finite() || self.grid.price_step <= 0.0 {
            return Err(ConfigError::Invalid(
                "grid.price_step must be > 0".to_string(),
            ));
        }
        if !self.grid.rate_delta.is_finite()
            || !(0.0..=MAX_GRID_RATE_DELTA).contains(&self.grid.rate_delta)
        {
            return Err(ConfigError::Invalid(format!(
                "grid.rate_delta must be between 0 and {MAX_GRID_RATE_DELTA}"
            )));
        }
        if self.grid.price_increments > MAX_GRID_PRICE_INCREMENTS {
            return Err(ConfigError::Invalid(format!(
                "grid.price_increments must be <= {MAX_GRID_PRICE_INCREMENTS}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub fn parse(content: &str) -> Result<CalculatorConfig, ConfigError> {
    let cfg: CalculatorConfig = toml::from_str(content)?;
    cfg.validate()?;
    Ok(cfg)
}

/// Loads the config at `path`, or the built-in defaults when the file does not exist.
pub fn load_or_default(path: &Path) -> Result<CalculatorConfig, ConfigError> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "config file not found, using defaults");
        return Ok(CalculatorConfig::default());
    }
    let content = fs::read_to_string(path)?;
    let cfg = parse(&content)?;
    tracing::info!(path = %path.display(), "loaded config");
    Ok(cfg)
}
