use std::fmt::Write;

use crate::api::{AffordabilityResponse, BuydownResponse, GridResponse};
use crate::core::{AmortizationSchedule, GuidelineStatus};

/// `$1,234,567` style rounding to whole dollars.
pub fn format_money(amount: f64) -> String {
    let rounded = amount.round();
    let sign = if rounded < 0.0 { "-" } else { "" };
    let digits = format!("{:.0}", rounded.abs());

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{sign}${grouped}")
}

fn line(out: &mut String, label: &str, value: &str) {
    let _ = writeln!(out, "  {label:<40}{value:>16}");
}

pub fn render_summary(response: &AffordabilityResponse) -> String {
    let summary = &response.summary;
    let ratios = &summary.ratios;
    let mut out = String::new();

    let _ = writeln!(out, "{}/{} Rule", ratios.housing_limit, ratios.total_limit);
    line(&mut out, "Housing as % of income:", &format!("{:.2}%", ratios.percent_housing));
    line(
        &mut out,
        "Other expenses as % of income:",
        &format!("{:.2}%", ratios.percent_other),
    );
    line(&mut out, "Total costs as % of income:", &format!("{:.2}%", ratios.percent_total));
    let _ = writeln!(
        out,
        "  Monthly housing costs are {} than {}% of gross monthly income.",
        if ratios.housing_exceeds { "MORE" } else { "less" },
        ratios.housing_limit
    );
    let _ = writeln!(
        out,
        "  Total monthly expenses are {} than {}% of gross monthly income.",
        if ratios.total_exceeds { "MORE" } else { "less" },
        ratios.total_limit
    );
    if ratios.status == GuidelineStatus::ExceedsGuidelines {
        let _ = writeln!(
            out,
            "  warning: exceeds the {}/{} guideline",
            ratios.housing_limit, ratios.total_limit
        );
    }

    let _ = writeln!(out, "\nMonthly Housing Costs");
    line(&mut out, "Mortgage:", &format_money(summary.housing.monthly_mortgage));
    line(&mut out, "Property Taxes:", &format_money(summary.housing.monthly_property_tax));
    line(&mut out, "PMI:", &format_money(summary.housing.monthly_pmi));
    line(&mut out, "Total:", &format_money(summary.housing.monthly_total));

    let _ = writeln!(out, "\nOther Considerations");
    line(&mut out, "Loan amount:", &format_money(summary.loan_amount));
    line(&mut out, "Emergency fund:", &format_money(summary.emergency_fund));
    line(
        &mut out,
        "Closing costs:",
        &format!(
            "{} - {}",
            format_money(summary.closing_cost_low),
            format_money(summary.closing_cost_high)
        ),
    );
    line(&mut out, "Total interest over term:", &format_money(response.schedule.total_interest));

    out
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct YearTotals {
    year: u32,
    principal: f64,
    interest: f64,
    ending_balance: f64,
}

fn yearly_totals(schedule: &AmortizationSchedule) -> Vec<YearTotals> {
    schedule
        .rows
        .chunks(12)
        .enumerate()
        .map(|(idx, months)| YearTotals {
            year: idx as u32 + 1,
            principal: months.iter().map(|row| row.principal).sum(),
            interest: months.iter().map(|row| row.interest).sum(),
            ending_balance: months.last().map_or(0.0, |row| row.remaining_balance),
        })
        .collect()
}

pub fn render_schedule(schedule: &AmortizationSchedule, yearly: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Monthly payment {}, total paid {}, total interest {}",
        format_money(schedule.monthly_payment),
        format_money(schedule.total_paid),
        format_money(schedule.total_interest)
    );

    if yearly {
        let _ = writeln!(out, "{:>6}{:>14}{:>14}{:>16}", "Year", "Principal", "Interest", "Balance");
        for year in yearly_totals(schedule) {
            let _ = writeln!(
                out,
                "{:>6}{:>14}{:>14}{:>16}",
                year.year,
                format_money(year.principal),
                format_money(year.interest),
                format_money(year.ending_balance)
            );
        }
        return out;
    }

    let _ = writeln!(
        out,
        "{:>6}{:>12}{:>14}{:>14}{:>16}",
        "Month", "Date", "Principal", "Interest", "Balance"
    );
    for row in &schedule.rows {
        let date = row
            .date
            .map(|d| d.format("%b %Y").to_string())
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "{:>6}{:>12}{:>14.2}{:>14.2}{:>16.2}",
            row.period, date, row.principal, row.interest, row.remaining_balance
        );
    }
    out
}

pub fn render_buydown(response: &BuydownResponse) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Interest Rate Buydown");
    line(
        &mut out,
        "Monthly payment (current):",
        &format!("{:.2}", response.monthly_payment_current),
    );
    line(
        &mut out,
        "Monthly payment (buydown):",
        &format!("{:.2}", response.monthly_payment_buydown),
    );
    line(&mut out, "Monthly savings:", &format!("{:.2}", response.monthly_savings));
    match (response.break_even_months, response.break_even_years) {
        (Some(months), Some(years)) => {
            line(&mut out, "Break-even:", &format!("{months:.1} months ({years:.1} years)"));
        }
        _ => line(&mut out, "Break-even:", "never"),
    }
    line(
        &mut out,
        "Total savings if held to term:",
        &format_money(response.total_savings_if_held_to_term),
    );
    if let Some(net) = response.net_savings_at_holding_period {
        line(&mut out, "Net savings at holding period:", &format_money(net));
    }
    out
}

/// Prices descend down the rows and rates ascend across the columns.
pub fn render_grid(response: &GridResponse) -> String {
    let grid = &response.grid;
    let mut out = String::new();

    let _ = write!(out, "{:>12}", "Price \\ Rate");
    for rate in &grid.rates {
        let _ = write!(out, "{rate:>8.1}");
    }
    let _ = writeln!(out);

    for price in grid.prices.iter().rev() {
        let _ = write!(out, "{:>12}", format_money(*price));
        for rate in &grid.rates {
            let payment = grid
                .cells
                .iter()
                .find(|cell| cell.rate == *rate && cell.price == *price)
                .map_or(0.0, |cell| cell.monthly_payment);
            let _ = write!(out, "{payment:>8.0}");
        }
        let _ = writeln!(out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{
        affordability_response, buydown_response, default_affordability_args,
        default_buydown_args, default_grid_args, grid_response,
    };
    use crate::config::CalculatorConfig;

    #[test]
    fn money_is_grouped_and_rounded() {
        assert_eq!(format_money(0.0), "$0");
        assert_eq!(format_money(999.4), "$999");
        assert_eq!(format_money(2_661.21), "$2,661");
        assert_eq!(format_money(1_234_567.8), "$1,234,568");
        assert_eq!(format_money(-5_000.0), "-$5,000");
    }

    #[test]
    fn summary_mentions_each_section() {
        let response =
            affordability_response(&default_affordability_args(), &CalculatorConfig::default())
                .expect("valid inputs");
        let text = render_summary(&response);
        assert!(text.contains("28/36 Rule"));
        assert!(text.contains("Monthly Housing Costs"));
        assert!(text.contains("Closing costs:"));
        assert!(text.contains("$8,000 - $20,000"));
        assert!(text.contains("warning: exceeds"));
    }

    #[test]
    fn summary_quotes_the_configured_limits() {
        // Housing lands near 30.8% of income with these inputs.
        let mut args = default_affordability_args();
        args.annual_income = 135_000.0;
        args.student_loans = 0.0;
        args.car_payments = 0.0;
        args.other_expenses = 0.0;
        let cfg = CalculatorConfig {
            housing_ratio_limit: 33.0,
            total_ratio_limit: 40.0,
            ..CalculatorConfig::default()
        };
        let response = affordability_response(&args, &cfg).expect("valid inputs");
        let text = render_summary(&response);
        assert!(text.contains("33/40 Rule"));
        assert!(text.contains("less than 33% of gross monthly income"));
        assert!(text.contains("less than 40% of gross monthly income"));
        assert!(!text.contains("28%"));
        assert!(!text.contains("warning"));

        let defaults = affordability_response(&args, &CalculatorConfig::default())
            .expect("valid inputs");
        let text = render_summary(&defaults);
        assert!(text.contains("MORE than 28% of gross monthly income"));
    }

    #[test]
    fn yearly_schedule_has_one_row_per_year() {
        let response =
            affordability_response(&default_affordability_args(), &CalculatorConfig::default())
                .expect("valid inputs");
        let totals = yearly_totals(&response.schedule);
        assert_eq!(totals.len(), 30);
        assert_eq!(totals[29].ending_balance, 0.0);
        let principal: f64 = totals.iter().map(|year| year.principal).sum();
        assert!((principal - 400_000.0).abs() < 1e-4);

        let text = render_schedule(&response.schedule, true);
        assert_eq!(text.lines().count(), 32);
    }

    #[test]
    fn buydown_prints_never_without_savings() {
        let mut args = default_buydown_args();
        args.bought_rate = args.base_rate;
        let text = render_buydown(&buydown_response(&args).expect("valid inputs"));
        assert!(text.contains("never"));
    }

    #[test]
    fn grid_has_header_plus_one_line_per_price() {
        let response =
            grid_response(&default_grid_args(), &CalculatorConfig::default()).expect("valid grid");
        let text = render_grid(&response);
        assert_eq!(text.lines().count(), 22);
        assert!(text.lines().nth(1).is_some_and(|l| l.contains("$550,000")));
    }
}
