mod engine;
mod types;

pub use engine::{
    amortization_schedule, evaluate_affordability, evaluate_buydown, income_ratios,
    monthly_housing_cost, monthly_payment, monthly_property_tax, rate_price_grid,
};
pub use types::{
    AffordabilitySummary, AmortizationRow, AmortizationSchedule, BuydownEvaluation, BuydownInputs,
    CalcError, GridCell, GridSpec, GuidelineStatus, HousingCost, IncomeRatios, LoanInputs,
    MAX_GRID_PRICE_INCREMENTS, MAX_GRID_RATE_DELTA, MAX_TERM_YEARS, MonthlyDebts, PropertyTax,
    RateGrid, RatioLimits, ReserveRules, TaxBasis,
};
