use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest loan term the calculator accepts.
pub const MAX_TERM_YEARS: u32 = 50;
/// Widest what-if grid, in price steps either side of the base price.
pub const MAX_GRID_PRICE_INCREMENTS: u32 = 100;
/// Widest what-if grid, in rate points either side of the base rate.
pub const MAX_GRID_RATE_DELTA: f64 = 10.0;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaxBasis {
    LoanAmount,
    HomePrice,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum PropertyTax {
    /// Annual rate as a decimal (0.0202 for 2.02%) applied to `basis`.
    Rate { annual_rate: f64, basis: TaxBasis },
    /// Absolute annual amount.
    Annual(f64),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GuidelineStatus {
    WithinGuidelines,
    ExceedsGuidelines,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalcError {
    #[error("loan term must be > 0 years")]
    NonPositiveTerm,
    #[error("loan term must be <= {max} years, got {years}")]
    TermTooLong { years: u32, max: u32 },
    #[error("principal must be >= 0, got {0}")]
    NegativePrincipal(f64),
    #[error("annual interest rate must be >= 0, got {0}")]
    NegativeRate(f64),
    #[error("{0} must be a finite number")]
    NonFinite(&'static str),
    #[error("annual income must be > 0, got {0}")]
    NonPositiveIncome(f64),
    #[error("grid step must be > 0")]
    InvalidGridStep,
    #[error("grid price increments must be <= {max}, got {increments}")]
    TooManyGridIncrements { increments: u32, max: u32 },
    #[error("grid rate delta must be <= {max}, got {delta}")]
    GridRateDeltaTooLarge { delta: f64, max: f64 },
}

#[derive(Debug, Clone)]
pub struct LoanInputs {
    pub principal: f64,
    pub home_price: f64,
    /// Annual interest rate in percent (6.8 for 6.8%).
    pub annual_rate: f64,
    pub term_years: u32,
    pub property_tax: PropertyTax,
    /// Annual PMI rate as a decimal.
    pub pmi_rate: f64,
}

impl LoanInputs {
    pub fn total_payments(&self) -> u32 {
        self.term_years.saturating_mul(12)
    }

    pub fn monthly_rate(&self) -> f64 {
        self.annual_rate / 100.0 / 12.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MonthlyDebts {
    pub student_loans: f64,
    pub car_payments: f64,
    pub other: f64,
}

impl MonthlyDebts {
    pub fn total(self) -> f64 {
        self.student_loans + self.car_payments + self.other
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatioLimits {
    /// Percent of gross income, e.g. 28.
    pub housing: f64,
    /// Percent of gross income, e.g. 36.
    pub total: f64,
}

impl Default for RatioLimits {
    fn default() -> Self {
        Self {
            housing: 28.0,
            total: 36.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReserveRules {
    pub emergency_fund_months: u32,
    pub closing_cost_low: f64,
    pub closing_cost_high: f64,
}

impl Default for ReserveRules {
    fn default() -> Self {
        Self {
            emergency_fund_months: 6,
            closing_cost_low: 0.02,
            closing_cost_high: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HousingCost {
    pub monthly_mortgage: f64,
    pub monthly_property_tax: f64,
    pub monthly_pmi: f64,
    pub monthly_total: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeRatios {
    pub percent_housing: f64,
    pub percent_other: f64,
    pub percent_total: f64,
    pub housing_exceeds: bool,
    pub total_exceeds: bool,
    pub status: GuidelineStatus,
    /// Limits the flags were checked against, in percent.
    pub housing_limit: f64,
    pub total_limit: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AffordabilitySummary {
    pub loan_amount: f64,
    pub housing: HousingCost,
    pub annual_housing_cost: f64,
    pub monthly_non_housing: f64,
    pub annual_non_housing: f64,
    pub monthly_expenses: f64,
    pub ratios: IncomeRatios,
    pub emergency_fund: f64,
    pub closing_cost_low: f64,
    pub closing_cost_high: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AmortizationRow {
    pub period: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    pub principal: f64,
    pub interest: f64,
    pub remaining_balance: f64,
    pub cumulative_principal: f64,
    pub cumulative_interest: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AmortizationSchedule {
    pub monthly_payment: f64,
    pub rows: Vec<AmortizationRow>,
    pub total_interest: f64,
    pub total_paid: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct BuydownInputs {
    pub principal: f64,
    pub base_rate: f64,
    pub bought_rate: f64,
    pub cost: f64,
    pub term_years: u32,
    pub holding_period_years: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuydownEvaluation {
    pub monthly_payment_current: f64,
    pub monthly_payment_buydown: f64,
    pub monthly_savings: f64,
    /// `f64::INFINITY` when the buydown never pays for itself.
    pub break_even_months: f64,
    pub break_even_years: f64,
    pub total_savings_if_held_to_term: f64,
    pub net_savings_at_holding_period: Option<f64>,
}

impl BuydownEvaluation {
    pub fn breaks_even(&self) -> bool {
        self.break_even_months.is_finite()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GridSpec {
    pub base_rate: f64,
    pub rate_delta: f64,
    pub base_price: f64,
    pub price_step: f64,
    pub price_increments: u32,
    pub term_years: u32,
    pub property_tax_rate: f64,
    pub pmi_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridCell {
    pub rate: f64,
    pub price: f64,
    pub monthly_payment: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateGrid {
    pub rates: Vec<f64>,
    pub prices: Vec<f64>,
    pub cells: Vec<GridCell>,
}
