use chrono::{Months, NaiveDate};

use super::types::{
    AffordabilitySummary, AmortizationRow, AmortizationSchedule, BuydownEvaluation, BuydownInputs,
    CalcError, GridCell, GridSpec, GuidelineStatus, HousingCost, IncomeRatios, LoanInputs,
    MAX_GRID_PRICE_INCREMENTS, MAX_GRID_RATE_DELTA, MAX_TERM_YEARS, MonthlyDebts, PropertyTax,
    RateGrid, RatioLimits, ReserveRules, TaxBasis,
};

const GRID_RATE_STEP: f64 = 0.1;
const GRID_RATE_SLACK: f64 = 1e-8;

fn ensure_finite(name: &'static str, value: f64) -> Result<(), CalcError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(CalcError::NonFinite(name))
    }
}

fn validate_loan(principal: f64, annual_rate: f64, term_years: u32) -> Result<(), CalcError> {
    ensure_finite("principal", principal)?;
    ensure_finite("annual rate", annual_rate)?;
    validate_term(term_years)?;
    if principal < 0.0 {
        return Err(CalcError::NegativePrincipal(principal));
    }
    if annual_rate < 0.0 {
        return Err(CalcError::NegativeRate(annual_rate));
    }
    Ok(())
}

fn validate_term(term_years: u32) -> Result<(), CalcError> {
    if term_years == 0 {
        return Err(CalcError::NonPositiveTerm);
    }
    if term_years > MAX_TERM_YEARS {
        return Err(CalcError::TermTooLong {
            years: term_years,
            max: MAX_TERM_YEARS,
        });
    }
    Ok(())
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// Level monthly payment for a fully amortizing loan.
///
/// `annual_rate` is in percent. A zero rate falls back to straight-line
/// repayment of `principal / months`. Terms above [`MAX_TERM_YEARS`] are
/// rejected.
pub fn monthly_payment(principal: f64, annual_rate: f64, term_years: u32) -> Result<f64, CalcError> {
    validate_loan(principal, annual_rate, term_years)?;
    Ok(level_payment(principal, annual_rate / 100.0 / 12.0, term_years * 12))
}

fn level_payment(principal: f64, monthly_rate: f64, periods: u32) -> f64 {
    if monthly_rate > 0.0 {
        let growth = (1.0 + monthly_rate).powi(periods as i32);
        principal * monthly_rate * growth / (growth - 1.0)
    } else {
        principal / periods as f64
    }
}

pub fn monthly_property_tax(inputs: &LoanInputs) -> f64 {
    match inputs.property_tax {
        PropertyTax::Rate { annual_rate, basis } => {
            let base = match basis {
                TaxBasis::LoanAmount => inputs.principal,
                TaxBasis::HomePrice => inputs.home_price,
            };
            base * annual_rate / 12.0
        }
        PropertyTax::Annual(amount) => amount / 12.0,
    }
}

pub fn monthly_housing_cost(inputs: &LoanInputs) -> Result<HousingCost, CalcError> {
    let monthly_mortgage = monthly_payment(inputs.principal, inputs.annual_rate, inputs.term_years)?;
    ensure_finite("PMI rate", inputs.pmi_rate)?;

    let monthly_property_tax = monthly_property_tax(inputs);
    ensure_finite("property tax", monthly_property_tax)?;
    let monthly_pmi = inputs.pmi_rate * inputs.principal / 12.0;

    Ok(HousingCost {
        monthly_mortgage,
        monthly_property_tax,
        monthly_pmi,
        monthly_total: monthly_mortgage + monthly_property_tax + monthly_pmi,
    })
}

/// Unrolls the loan month by month. Row dates start at `start` (if given)
/// and advance one calendar month per period.
pub fn amortization_schedule(
    inputs: &LoanInputs,
    start: Option<NaiveDate>,
) -> Result<AmortizationSchedule, CalcError> {
    let payment = monthly_payment(inputs.principal, inputs.annual_rate, inputs.term_years)?;
    let monthly_rate = inputs.monthly_rate();
    let total_periods = inputs.total_payments();

    let mut rows = Vec::with_capacity(total_periods as usize);
    let mut balance = inputs.principal;
    let mut cumulative_principal = 0.0;
    let mut cumulative_interest = 0.0;

    for period in 1..=total_periods {
        let interest = balance * monthly_rate;
        let principal = payment - interest;
        balance -= principal;
        // The last payment retires whatever drift is left.
        balance = if period == total_periods {
            0.0
        } else {
            balance.max(0.0)
        };

        cumulative_principal += principal;
        cumulative_interest += interest;

        rows.push(AmortizationRow {
            period,
            date: start.and_then(|d| d.checked_add_months(Months::new(period - 1))),
            principal,
            interest,
            remaining_balance: balance,
            cumulative_principal,
            cumulative_interest,
        });
    }

    Ok(AmortizationSchedule {
        monthly_payment: payment,
        rows,
        total_interest: cumulative_interest,
        total_paid: payment * total_periods as f64,
    })
}

pub fn income_ratios(
    monthly_housing: f64,
    monthly_non_housing: f64,
    annual_income: f64,
    limits: RatioLimits,
) -> Result<IncomeRatios, CalcError> {
    ensure_finite("annual income", annual_income)?;
    ensure_finite("monthly housing cost", monthly_housing)?;
    ensure_finite("monthly non-housing debt", monthly_non_housing)?;
    if annual_income <= 0.0 {
        return Err(CalcError::NonPositiveIncome(annual_income));
    }

    let percent_housing = monthly_housing * 12.0 * 100.0 / annual_income;
    let percent_other = monthly_non_housing * 12.0 * 100.0 / annual_income;
    let percent_total = percent_housing + percent_other;
    let housing_exceeds = percent_housing > limits.housing;
    let total_exceeds = percent_total > limits.total;

    Ok(IncomeRatios {
        percent_housing,
        percent_other,
        percent_total,
        housing_exceeds,
        total_exceeds,
        status: if housing_exceeds || total_exceeds {
            GuidelineStatus::ExceedsGuidelines
        } else {
            GuidelineStatus::WithinGuidelines
        },
        housing_limit: limits.housing,
        total_limit: limits.total,
    })
}

pub fn evaluate_affordability(
    loan: &LoanInputs,
    debts: MonthlyDebts,
    annual_income: f64,
    limits: RatioLimits,
    reserves: ReserveRules,
) -> Result<AffordabilitySummary, CalcError> {
    let housing = monthly_housing_cost(loan)?;
    let monthly_non_housing = debts.total();
    let ratios = income_ratios(
        housing.monthly_total,
        monthly_non_housing,
        annual_income,
        limits,
    )?;
    let monthly_expenses = housing.monthly_total + monthly_non_housing;

    Ok(AffordabilitySummary {
        loan_amount: loan.principal,
        housing,
        annual_housing_cost: housing.monthly_total * 12.0,
        monthly_non_housing,
        annual_non_housing: monthly_non_housing * 12.0,
        monthly_expenses,
        ratios,
        emergency_fund: monthly_expenses * reserves.emergency_fund_months as f64,
        closing_cost_low: loan.principal * reserves.closing_cost_low,
        closing_cost_high: loan.principal * reserves.closing_cost_high,
    })
}

pub fn evaluate_buydown(inputs: &BuydownInputs) -> Result<BuydownEvaluation, CalcError> {
    ensure_finite("buydown cost", inputs.cost)?;
    let current = monthly_payment(inputs.principal, inputs.base_rate, inputs.term_years)?;
    let buydown = monthly_payment(inputs.principal, inputs.bought_rate, inputs.term_years)?;
    let monthly_savings = current - buydown;

    let break_even_months = if monthly_savings > 0.0 {
        inputs.cost / monthly_savings
    } else {
        f64::INFINITY
    };
    let total_months = f64::from(inputs.term_years) * 12.0;

    Ok(BuydownEvaluation {
        monthly_payment_current: current,
        monthly_payment_buydown: buydown,
        monthly_savings,
        break_even_months,
        break_even_years: break_even_months / 12.0,
        total_savings_if_held_to_term: monthly_savings * total_months,
        net_savings_at_holding_period: inputs
            .holding_period_years
            .map(|years| monthly_savings * f64::from(years) * 12.0 - inputs.cost),
    })
}

fn grid_rates(base_rate: f64, rate_delta: f64) -> Vec<f64> {
    let lower = base_rate - rate_delta;
    let upper = base_rate + rate_delta;
    // rate_delta is bounded, so this stays small.
    let steps = (2.0 * rate_delta / GRID_RATE_STEP).round() as u32;

    (0..=steps)
        .map(|k| round_to(lower + f64::from(k) * GRID_RATE_STEP, 3))
        .take_while(|rate| *rate <= upper + GRID_RATE_SLACK)
        .filter(|rate| *rate >= 0.0)
        .collect()
}

fn grid_prices(base_price: f64, step: f64, increments: u32) -> Vec<f64> {
    let start = base_price - f64::from(increments) * step;
    (0..=u64::from(increments) * 2)
        .map(|k| start + k as f64 * step)
        .filter(|price| *price >= 0.0)
        .collect()
}

/// Monthly housing cost over a band of rates and prices around a base case.
///
/// Each price is treated as the full loan amount. Rows are ordered by rate,
/// then by ascending price.
pub fn rate_price_grid(spec: &GridSpec) -> Result<RateGrid, CalcError> {
    for (name, value) in [
        ("base rate", spec.base_rate),
        ("rate delta", spec.rate_delta),
        ("base price", spec.base_price),
        ("price step", spec.price_step),
    ] {
        ensure_finite(name, value)?;
    }
    if spec.price_step <= 0.0 || spec.rate_delta < 0.0 {
        return Err(CalcError::InvalidGridStep);
    }
    if spec.rate_delta > MAX_GRID_RATE_DELTA {
        return Err(CalcError::GridRateDeltaTooLarge {
            delta: spec.rate_delta,
            max: MAX_GRID_RATE_DELTA,
        });
    }
    if spec.price_increments > MAX_GRID_PRICE_INCREMENTS {
        return Err(CalcError::TooManyGridIncrements {
            increments: spec.price_increments,
            max: MAX_GRID_PRICE_INCREMENTS,
        });
    }
    validate_term(spec.term_years)?;

    let rates = grid_rates(spec.base_rate, spec.rate_delta);
    let prices = grid_prices(spec.base_price, spec.price_step, spec.price_increments);

    let mut cells = Vec::with_capacity(rates.len() * prices.len());
    for &rate in &rates {
        for &price in &prices {
            let loan = LoanInputs {
                principal: price,
                home_price: price,
                annual_rate: rate,
                term_years: spec.term_years,
                property_tax: PropertyTax::Rate {
                    annual_rate: spec.property_tax_rate,
                    basis: TaxBasis::LoanAmount,
                },
                pmi_rate: spec.pmi_rate,
            };
            let cost = monthly_housing_cost(&loan)?;
            cells.push(GridCell {
                rate,
                price,
                monthly_payment: cost.monthly_total.round(),
            });
        }
    }

    Ok(RateGrid {
        rates,
        prices,
        cells,
    })
}
