use axum::{
    Router,
    extract::{
        Json, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use chrono::NaiveDate;
use clap::Args;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::CalculatorConfig;
use crate::core::{
    AffordabilitySummary, AmortizationSchedule, BuydownEvaluation, BuydownInputs, GridSpec,
    LoanInputs, MAX_GRID_PRICE_INCREMENTS, MAX_GRID_RATE_DELTA, MAX_TERM_YEARS, MonthlyDebts,
    PropertyTax, RateGrid, amortization_schedule, evaluate_affordability, evaluate_buydown,
    rate_price_grid,
};

const INDEX_HTML: &str = include_str!("../../web/index.html");
const STYLES_CSS: &str = include_str!("../../web/styles.css");
const APP_JS: &str = include_str!("../../web/app.js");

#[derive(Args, Debug, Clone)]
pub struct AffordabilityArgs {
    #[arg(long, default_value_t = 100_000.0, help = "Annual gross income")]
    pub annual_income: f64,
    #[arg(long, default_value_t = 450_000.0)]
    pub house_price: f64,
    #[arg(long, default_value_t = 50_000.0)]
    pub down_payment: f64,
    #[arg(
        long,
        default_value_t = 6.8,
        help = "Annual mortgage interest rate in percent, e.g. 6.8"
    )]
    pub interest_rate: f64,
    #[arg(long, default_value_t = 30, help = "Loan term in years")]
    pub loan_term: u32,
    #[arg(
        long,
        help = "Annual property taxes; 0 or unset derives them from the configured rate"
    )]
    pub property_tax_annual: Option<f64>,
    #[arg(
        long,
        help = "Annual PMI rate in percent; defaults to the configured rate"
    )]
    pub pmi_rate: Option<f64>,
    #[arg(long, default_value_t = 1_000.0, help = "Monthly student loan payments")]
    pub student_loans: f64,
    #[arg(long, default_value_t = 400.0, help = "Monthly car payments")]
    pub car_payments: f64,
    #[arg(long, default_value_t = 500.0, help = "Other monthly debt payments")]
    pub other_expenses: f64,
    #[arg(long, help = "Date of the first payment (YYYY-MM-DD)")]
    pub start_date: Option<NaiveDate>,
}

#[derive(Args, Debug, Clone)]
pub struct BuydownArgs {
    #[arg(long, default_value_t = 400_000.0, help = "Loan amount")]
    pub principal: f64,
    #[arg(long, default_value_t = 7.0, help = "Annual rate without the buydown in percent")]
    pub base_rate: f64,
    #[arg(long, default_value_t = 6.5, help = "Annual rate after the buydown in percent")]
    pub bought_rate: f64,
    #[arg(long, default_value_t = 5_000.0, help = "Upfront cost of the buydown")]
    pub buydown_cost: f64,
    #[arg(long, default_value_t = 30, help = "Loan term in years")]
    pub loan_term: u32,
    #[arg(long, help = "Years the loan is expected to be held")]
    pub holding_period: Option<u32>,
}

#[derive(Args, Debug, Clone)]
pub struct GridArgs {
    #[arg(long, default_value_t = 450_000.0, help = "Centre of the price band")]
    pub house_price: f64,
    #[arg(long, default_value_t = 6.8, help = "Centre of the rate band in percent")]
    pub interest_rate: f64,
    #[arg(long, default_value_t = 30, help = "Loan term in years")]
    pub loan_term: u32,
    #[arg(long, help = "Rate points either side of the centre; defaults to config")]
    pub rate_delta: Option<f64>,
    #[arg(long, help = "Price step; defaults to config")]
    pub price_step: Option<f64>,
    #[arg(long, help = "Price steps either side of the centre; defaults to config")]
    pub price_increments: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct AffordabilityRequest {
    pub loan: LoanInputs,
    pub debts: MonthlyDebts,
    pub annual_income: f64,
    pub start_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AffordabilityResponse {
    pub summary: AffordabilitySummary,
    pub schedule: AmortizationSchedule,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuydownResponse {
    pub monthly_payment_current: f64,
    pub monthly_payment_buydown: f64,
    pub monthly_savings: f64,
    pub breaks_even: bool,
    pub break_even_months: Option<f64>,
    pub break_even_years: Option<f64>,
    pub total_savings_if_held_to_term: f64,
    pub net_savings_at_holding_period: Option<f64>,
}

impl From<BuydownEvaluation> for BuydownResponse {
    fn from(value: BuydownEvaluation) -> Self {
        let finite = |v: f64| v.is_finite().then_some(v);
        Self {
            monthly_payment_current: value.monthly_payment_current,
            monthly_payment_buydown: value.monthly_payment_buydown,
            monthly_savings: value.monthly_savings,
            breaks_even: value.breaks_even(),
            break_even_months: finite(value.break_even_months),
            break_even_years: finite(value.break_even_years),
            total_savings_if_held_to_term: value.total_savings_if_held_to_term,
            net_savings_at_holding_period: value.net_savings_at_holding_period,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridResponse {
    pub term_years: u32,
    #[serde(flatten)]
    pub grid: RateGrid,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct AffordabilityPayload {
    income: Option<f64>,
    house_price: Option<f64>,
    down_payment: Option<f64>,
    interest_rate: Option<f64>,
    loan_term: Option<u32>,
    property_tax_annual: Option<f64>,
    pmi_rate: Option<f64>,
    student_loans: Option<f64>,
    car_payments: Option<f64>,
    other_expenses: Option<f64>,
    start_date: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct BuydownPayload {
    principal: Option<f64>,
    base_rate: Option<f64>,
    bought_rate: Option<f64>,
    buydown_cost: Option<f64>,
    loan_term: Option<u32>,
    holding_period: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct GridPayload {
    house_price: Option<f64>,
    interest_rate: Option<f64>,
    loan_term: Option<u32>,
    rate_delta: Option<f64>,
    price_step: Option<f64>,
    price_increments: Option<u32>,
}

fn require_finite(fields: &[(&str, f64)]) -> Result<(), String> {
    for (name, value) in fields {
        if !value.is_finite() {
            return Err(format!("{name} must be a finite number"));
        }
    }
    Ok(())
}

fn require_non_negative(fields: &[(&str, f64)]) -> Result<(), String> {
    for (name, value) in fields {
        if *value < 0.0 {
            return Err(format!("{name} must be >= 0"));
        }
    }
    Ok(())
}

fn require_loan_term(years: u32) -> Result<(), String> {
    if years == 0 {
        return Err("--loan-term must be > 0".to_string());
    }
    if years > MAX_TERM_YEARS {
        return Err(format!("--loan-term must be <= {MAX_TERM_YEARS}"));
    }
    Ok(())
}

pub fn build_affordability_request(
    args: &AffordabilityArgs,
    cfg: &CalculatorConfig,
) -> Result<AffordabilityRequest, String> {
    require_finite(&[
        ("--annual-income", args.annual_income),
        ("--house-price", args.house_price),
        ("--down-payment", args.down_payment),
        ("--interest-rate", args.interest_rate),
        ("--property-tax-annual", args.property_tax_annual.unwrap_or(0.0)),
        ("--pmi-rate", args.pmi_rate.unwrap_or(0.0)),
        ("--student-loans", args.student_loans),
        ("--car-payments", args.car_payments),
        ("--other-expenses", args.other_expenses),
    ])?;
    require_non_negative(&[
        ("--house-price", args.house_price),
        ("--down-payment", args.down_payment),
        ("--interest-rate", args.interest_rate),
        ("--property-tax-annual", args.property_tax_annual.unwrap_or(0.0)),
        ("--pmi-rate", args.pmi_rate.unwrap_or(0.0)),
        ("--student-loans", args.student_loans),
        ("--car-payments", args.car_payments),
        ("--other-expenses", args.other_expenses),
    ])?;

    if args.annual_income <= 0.0 {
        return Err("--annual-income must be > 0".to_string());
    }

    if args.down_payment > args.house_price {
        return Err("--down-payment cannot exceed --house-price".to_string());
    }

    require_loan_term(args.loan_term)?;

    let principal = args.house_price - args.down_payment;
    let property_tax = match args.property_tax_annual {
        Some(amount) if amount != 0.0 => PropertyTax::Annual(amount),
        _ => PropertyTax::Rate {
            annual_rate: cfg.property_tax_rate,
            basis: cfg.property_tax_basis,
        },
    };

    let pmi_rate = args.pmi_rate.map(|rate| rate / 100.0).unwrap_or(cfg.pmi_rate);
    let loan_to_value = if args.house_price > 0.0 {
        principal / args.house_price
    } else {
        0.0
    };
    let pmi_rate = if loan_to_value <= cfg.waive_pmi_at_ltv {
        0.0
    } else {
        pmi_rate
    };

    Ok(AffordabilityRequest {
        loan: LoanInputs {
            principal,
            home_price: args.house_price,
            annual_rate: args.interest_rate,
            term_years: args.loan_term,
            property_tax,
            pmi_rate,
        },
        debts: MonthlyDebts {
            student_loans: args.student_loans,
            car_payments: args.car_payments,
            other: args.other_expenses,
        },
        annual_income: args.annual_income,
        start_date: args.start_date,
    })
}

pub fn build_buydown_inputs(args: &BuydownArgs) -> Result<BuydownInputs, String> {
    require_finite(&[
        ("--principal", args.principal),
        ("--base-rate", args.base_rate),
        ("--bought-rate", args.bought_rate),
        ("--buydown-cost", args.buydown_cost),
    ])?;
    require_non_negative(&[
        ("--principal", args.principal),
        ("--base-rate", args.base_rate),
        ("--bought-rate", args.bought_rate),
        ("--buydown-cost", args.buydown_cost),
    ])?;

    require_loan_term(args.loan_term)?;

    if let Some(years) = args.holding_period {
        if years > args.loan_term {
            return Err("--holding-period cannot exceed --loan-term".to_string());
        }
    }

    Ok(BuydownInputs {
        principal: args.principal,
        base_rate: args.base_rate,
        bought_rate: args.bought_rate,
        cost: args.buydown_cost,
        term_years: args.loan_term,
        holding_period_years: args.holding_period,
    })
}

pub fn build_grid_spec(args: &GridArgs, cfg: &CalculatorConfig) -> Result<GridSpec, String> {
    let rate_delta = args.rate_delta.unwrap_or(cfg.grid.rate_delta);
    let price_step = args.price_step.unwrap_or(cfg.grid.price_step);
    let price_increments = args.price_increments.unwrap_or(cfg.grid.price_increments);

    require_finite(&[
        ("--house-price", args.house_price),
        ("--interest-rate", args.interest_rate),
        ("--rate-delta", rate_delta),
        ("--price-step", price_step),
    ])?;
    require_non_negative(&[
        ("--house-price", args.house_price),
        ("--interest-rate", args.interest_rate),
        ("--rate-delta", rate_delta),
    ])?;

    if price_step <= 0.0 {
        return Err("--price-step must be > 0".to_string());
    }

    if rate_delta > MAX_GRID_RATE_DELTA {
        return Err(format!("--rate-delta must be <= {MAX_GRID_RATE_DELTA}"));
    }

    if price_increments > MAX_GRID_PRICE_INCREMENTS {
        return Err(format!(
            "--price-increments must be <= {MAX_GRID_PRICE_INCREMENTS}"
        ));
    }

    require_loan_term(args.loan_term)?;

    Ok(GridSpec {
        base_rate: args.interest_rate,
        rate_delta,
        base_price: args.house_price,
        price_step,
        price_increments,
        term_years: args.loan_term,
        property_tax_rate: cfg.property_tax_rate,
        pmi_rate: cfg.pmi_rate,
    })
}

pub fn affordability_response(
    args: &AffordabilityArgs,
    cfg: &CalculatorConfig,
) -> Result<AffordabilityResponse, String> {
    let request = build_affordability_request(args, cfg)?;
    let summary = evaluate_affordability(
        &request.loan,
        request.debts,
        request.annual_income,
        cfg.ratio_limits(),
        cfg.reserve_rules(),
    )
    .map_err(|e| e.to_string())?;
    let schedule =
        amortization_schedule(&request.loan, request.start_date).map_err(|e| e.to_string())?;

    Ok(AffordabilityResponse { summary, schedule })
}

pub fn buydown_response(args: &BuydownArgs) -> Result<BuydownResponse, String> {
    let inputs = build_buydown_inputs(args)?;
    let evaluation = evaluate_buydown(&inputs).map_err(|e| e.to_string())?;
    Ok(evaluation.into())
}

pub fn grid_response(args: &GridArgs, cfg: &CalculatorConfig) -> Result<GridResponse, String> {
    let spec = build_grid_spec(args, cfg)?;
    let grid = rate_price_grid(&spec).map_err(|e| e.to_string())?;
    Ok(GridResponse {
        term_years: spec.term_years,
        grid,
    })
}

pub fn default_affordability_args() -> AffordabilityArgs {
    AffordabilityArgs {
        annual_income: 100_000.0,
        house_price: 450_000.0,
        down_payment: 50_000.0,
        interest_rate: 6.8,
        loan_term: 30,
        property_tax_annual: None,
        pmi_rate: None,
        student_loans: 1_000.0,
        car_payments: 400.0,
        other_expenses: 500.0,
        start_date: None,
    }
}

pub fn default_buydown_args() -> BuydownArgs {
    BuydownArgs {
        principal: 400_000.0,
        base_rate: 7.0,
        bought_rate: 6.5,
        buydown_cost: 5_000.0,
        loan_term: 30,
        holding_period: None,
    }
}

pub fn default_grid_args() -> GridArgs {
    GridArgs {
        house_price: 450_000.0,
        interest_rate: 6.8,
        loan_term: 30,
        rate_delta: None,
        price_step: None,
        price_increments: None,
    }
}

fn affordability_args_from_payload(payload: AffordabilityPayload) -> AffordabilityArgs {
    let mut args = default_affordability_args();

    if let Some(v) = payload.income {
        args.annual_income = v;
    }
    if let Some(v) = payload.house_price {
        args.house_price = v;
    }
    if let Some(v) = payload.down_payment {
        args.down_payment = v;
    }
    if let Some(v) = payload.interest_rate {
        args.interest_rate = v;
    }
    if let Some(v) = payload.loan_term {
        args.loan_term = v;
    }
    if let Some(v) = payload.property_tax_annual {
        args.property_tax_annual = Some(v);
    }
    if let Some(v) = payload.pmi_rate {
        args.pmi_rate = Some(v);
    }
    if let Some(v) = payload.student_loans {
        args.student_loans = v;
    }
    if let Some(v) = payload.car_payments {
        args.car_payments = v;
    }
    if let Some(v) = payload.other_expenses {
        args.other_expenses = v;
    }
    if let Some(v) = payload.start_date {
        args.start_date = Some(v);
    }

    args
}

fn buydown_args_from_payload(payload: BuydownPayload) -> BuydownArgs {
    let mut args = default_buydown_args();

    if let Some(v) = payload.principal {
        args.principal = v;
    }
    if let Some(v) = payload.base_rate {
        args.base_rate = v;
    }
    if let Some(v) = payload.bought_rate {
        args.bought_rate = v;
    }
    if let Some(v) = payload.buydown_cost {
        args.buydown_cost = v;
    }
    if let Some(v) = payload.loan_term {
        args.loan_term = v;
    }
    if let Some(v) = payload.holding_period {
        args.holding_period = Some(v);
    }

    args
}

fn grid_args_from_payload(payload: GridPayload) -> GridArgs {
    let mut args = default_grid_args();

    if let Some(v) = payload.house_price {
        args.house_price = v;
    }
    if let Some(v) = payload.interest_rate {
        args.interest_rate = v;
    }
    if let Some(v) = payload.loan_term {
        args.loan_term = v;
    }
    args.rate_delta = payload.rate_delta;
    args.price_step = payload.price_step;
    args.price_increments = payload.price_increments;

    args
}

type SharedConfig = Arc<CalculatorConfig>;

pub fn router(cfg: CalculatorConfig) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/index.html", get(index_handler))
        .route("/styles.css", get(styles_handler))
        .route("/app.js", get(app_js_handler))
        .route("/health", get(health_handler))
        .route(
            "/api/affordability",
            get(affordability_get_handler).post(affordability_post_handler),
        )
        .route(
            "/api/buydown",
            get(buydown_get_handler).post(buydown_post_handler),
        )
        .route("/api/grid", get(grid_get_handler).post(grid_post_handler))
        .fallback(not_found_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(cfg))
}

pub async fn run_http_server(port: u16, cfg: CalculatorConfig) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router(cfg);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("affordability HTTP API listening on http://{addr}");
    tracing::info!("local access: http://127.0.0.1:{port}/");

    axum::serve(listener, app).await
}

async fn index_handler() -> impl IntoResponse {
    with_cache_control(Html(INDEX_HTML))
}

async fn styles_handler() -> impl IntoResponse {
    with_cache_control((
        [(header::CONTENT_TYPE, "text/css; charset=utf-8")],
        STYLES_CSS,
    ))
}

async fn app_js_handler() -> impl IntoResponse {
    with_cache_control((
        [(
            header::CONTENT_TYPE,
            "application/javascript; charset=utf-8",
        )],
        APP_JS,
    ))
}

async fn health_handler() -> Response {
    json_response(StatusCode::OK, serde_json::json!({ "status": "ok" }))
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

// Extractor rejections are turned into the same `{"error": ...}` 400 as
// validation failures.
fn from_query<T>(payload: Result<Query<T>, QueryRejection>) -> Result<T, String> {
    payload.map(|Query(p)| p).map_err(|e| e.body_text())
}

fn from_json<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, String> {
    payload.map(|Json(p)| p).map_err(|e| e.body_text())
}

async fn affordability_get_handler(
    State(cfg): State<SharedConfig>,
    payload: Result<Query<AffordabilityPayload>, QueryRejection>,
) -> Response {
    affordability_handler_impl(&cfg, from_query(payload))
}

async fn affordability_post_handler(
    State(cfg): State<SharedConfig>,
    payload: Result<Json<AffordabilityPayload>, JsonRejection>,
) -> Response {
    affordability_handler_impl(&cfg, from_json(payload))
}

fn affordability_handler_impl(
    cfg: &CalculatorConfig,
    payload: Result<AffordabilityPayload, String>,
) -> Response {
    let result = payload.and_then(|payload| {
        affordability_response(&affordability_args_from_payload(payload), cfg)
    });
    respond("affordability", result)
}

async fn buydown_get_handler(
    payload: Result<Query<BuydownPayload>, QueryRejection>,
) -> Response {
    buydown_handler_impl(from_query(payload))
}

async fn buydown_post_handler(payload: Result<Json<BuydownPayload>, JsonRejection>) -> Response {
    buydown_handler_impl(from_json(payload))
}

fn buydown_handler_impl(payload: Result<BuydownPayload, String>) -> Response {
    let result =
        payload.and_then(|payload| buydown_response(&buydown_args_from_payload(payload)));
    respond("buydown", result)
}

async fn grid_get_handler(
    State(cfg): State<SharedConfig>,
    payload: Result<Query<GridPayload>, QueryRejection>,
) -> Response {
    grid_handler_impl(&cfg, from_query(payload))
}

async fn grid_post_handler(
    State(cfg): State<SharedConfig>,
    payload: Result<Json<GridPayload>, JsonRejection>,
) -> Response {
    grid_handler_impl(&cfg, from_json(payload))
}

fn grid_handler_impl(cfg: &CalculatorConfig, payload: Result<GridPayload, String>) -> Response {
    let result = payload.and_then(|payload| grid_response(&grid_args_from_payload(payload), cfg));
    respond("grid", result)
}

fn respond<T: Serialize>(endpoint: &str, result: Result<T, String>) -> Response {
    match result {
        Ok(body) => {
            tracing::debug!(endpoint, "request handled");
            json_response(StatusCode::OK, body)
        }
        Err(msg) => {
            tracing::warn!(endpoint, error = %msg, "rejected request");
            error_response(StatusCode::BAD_REQUEST, &msg)
        }
    }
}

fn with_cache_control<R: IntoResponse>(response: R) -> Response {
    let mut response = response.into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    with_cache_control((status, Json(body)))
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{GuidelineStatus, TaxBasis};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn sample_args() -> AffordabilityArgs {
        default_affordability_args()
    }

    async fn send(request: Request<Body>) -> (StatusCode, Value) {
        let response = router(CalculatorConfig::default())
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL),
            Some(&HeaderValue::from_static("no-store"))
        );
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body collects")
            .to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("valid request")
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("valid request")
    }

    #[test]
    fn build_request_derives_loan_and_charges_pmi_below_twenty_percent_down() {
        let request =
            build_affordability_request(&sample_args(), &CalculatorConfig::default())
                .expect("valid inputs");
        assert_approx(request.loan.principal, 400_000.0);
        assert_approx(request.loan.pmi_rate, 0.0055);
        assert_eq!(
            request.loan.property_tax,
            PropertyTax::Rate {
                annual_rate: 0.0202,
                basis: TaxBasis::LoanAmount,
            }
        );
        assert_approx(request.debts.total(), 1_900.0);
    }

    #[test]
    fn build_request_waives_pmi_at_twenty_percent_down() {
        let mut args = sample_args();
        args.down_payment = 90_000.0;
        let request = build_affordability_request(&args, &CalculatorConfig::default())
            .expect("valid inputs");
        assert_eq!(request.loan.pmi_rate, 0.0);

        let always_charge = CalculatorConfig {
            waive_pmi_at_ltv: 0.0,
            ..CalculatorConfig::default()
        };
        let request = build_affordability_request(&args, &always_charge).expect("valid inputs");
        assert_approx(request.loan.pmi_rate, 0.0055);
    }

    #[test]
    fn build_request_uses_explicit_property_tax_and_pmi_percent() {
        let mut args = sample_args();
        args.property_tax_annual = Some(9_000.0);
        args.pmi_rate = Some(0.8);
        let request = build_affordability_request(&args, &CalculatorConfig::default())
            .expect("valid inputs");
        assert_eq!(request.loan.property_tax, PropertyTax::Annual(9_000.0));
        assert_approx(request.loan.pmi_rate, 0.008);

        args.property_tax_annual = Some(0.0);
        let request = build_affordability_request(&args, &CalculatorConfig::default())
            .expect("valid inputs");
        assert!(matches!(request.loan.property_tax, PropertyTax::Rate { .. }));
    }

    #[test]
    fn build_request_rejects_invalid_inputs() {
        let cfg = CalculatorConfig::default();

        let mut args = sample_args();
        args.loan_term = 0;
        let err = build_affordability_request(&args, &cfg).expect_err("zero term");
        assert!(err.contains("--loan-term"));

        let mut args = sample_args();
        args.down_payment = 500_000.0;
        let err = build_affordability_request(&args, &cfg).expect_err("down > price");
        assert!(err.contains("--down-payment"));

        let mut args = sample_args();
        args.annual_income = 0.0;
        let err = build_affordability_request(&args, &cfg).expect_err("zero income");
        assert!(err.contains("--annual-income"));

        let mut args = sample_args();
        args.interest_rate = f64::NAN;
        let err = build_affordability_request(&args, &cfg).expect_err("nan rate");
        assert!(err.contains("--interest-rate"));

        let mut args = sample_args();
        args.car_payments = -10.0;
        let err = build_affordability_request(&args, &cfg).expect_err("negative debt");
        assert!(err.contains("--car-payments"));
    }

    #[test]
    fn loan_term_is_bounded_in_every_builder() {
        let cfg = CalculatorConfig::default();

        let mut args = sample_args();
        args.loan_term = MAX_TERM_YEARS;
        assert!(build_affordability_request(&args, &cfg).is_ok());
        args.loan_term = MAX_TERM_YEARS + 1;
        let err = build_affordability_request(&args, &cfg).expect_err("term too long");
        assert!(err.contains("--loan-term"));

        let mut args = default_buydown_args();
        args.loan_term = 400_000_000;
        let err = buydown_response(&args).expect_err("term too long");
        assert!(err.contains("--loan-term"));

        let mut args = default_grid_args();
        args.loan_term = u32::MAX;
        let err = grid_response(&args, &cfg).expect_err("term too long");
        assert!(err.contains("--loan-term"));
    }

    #[test]
    fn grid_shape_overrides_are_bounded() {
        let cfg = CalculatorConfig::default();

        let mut args = default_grid_args();
        args.price_increments = Some(MAX_GRID_PRICE_INCREMENTS);
        assert!(build_grid_spec(&args, &cfg).is_ok());
        args.price_increments = Some(u32::MAX);
        let err = grid_response(&args, &cfg).expect_err("too many increments");
        assert!(err.contains("--price-increments"));

        let mut args = default_grid_args();
        args.rate_delta = Some(MAX_GRID_RATE_DELTA);
        assert!(build_grid_spec(&args, &cfg).is_ok());
        args.rate_delta = Some(1e9);
        let err = grid_response(&args, &cfg).expect_err("rate band too wide");
        assert!(err.contains("--rate-delta"));
    }

    #[test]
    fn buydown_inputs_reject_holding_beyond_term() {
        let mut args = default_buydown_args();
        args.holding_period = Some(31);
        let err = build_buydown_inputs(&args).expect_err("holding > term");
        assert!(err.contains("--holding-period"));
    }

    #[test]
    fn buydown_response_reports_never_as_null() {
        let mut args = default_buydown_args();
        args.bought_rate = 7.5;
        let response = buydown_response(&args).expect("valid inputs");
        assert!(!response.breaks_even);
        assert_eq!(response.break_even_months, None);

        let json = serde_json::to_value(&response).expect("response serializes");
        assert_eq!(json["breakEvenMonths"], Value::Null);
        assert_eq!(json["breaksEven"], Value::Bool(false));
    }

    #[test]
    fn grid_spec_takes_shape_from_config_unless_overridden() {
        let cfg = CalculatorConfig::default();
        let spec = build_grid_spec(&default_grid_args(), &cfg).expect("valid grid");
        assert_eq!(spec.price_step, 10_000.0);
        assert_eq!(spec.price_increments, 10);

        let mut args = default_grid_args();
        args.price_step = Some(0.0);
        let err = build_grid_spec(&args, &cfg).expect_err("zero step");
        assert!(err.contains("--price-step"));
    }

    #[test]
    fn payload_overrides_only_given_fields() {
        let payload: AffordabilityPayload = serde_json::from_str(
            r#"{ "income": 150000, "interestRate": 5.5, "startDate": "2025-06-01" }"#,
        )
        .expect("payload parses");
        let args = affordability_args_from_payload(payload);
        assert_approx(args.annual_income, 150_000.0);
        assert_approx(args.interest_rate, 5.5);
        assert_approx(args.house_price, 450_000.0);
        assert_eq!(args.start_date, NaiveDate::from_ymd_opt(2025, 6, 1));
    }

    #[test]
    fn affordability_response_serializes_expected_fields() {
        let response =
            affordability_response(&sample_args(), &CalculatorConfig::default())
                .expect("valid inputs");
        assert_eq!(
            response.summary.ratios.status,
            GuidelineStatus::ExceedsGuidelines
        );
        let json = serde_json::to_string(&response).expect("response serializes");
        assert!(json.contains("\"summary\""));
        assert!(json.contains("\"schedule\""));
        assert!(json.contains("\"monthlyMortgage\""));
        assert!(json.contains("\"percentHousing\""));
        assert!(json.contains("\"remainingBalance\""));
        assert!(json.contains("\"exceeds-guidelines\""));
    }

    #[tokio::test]
    async fn get_affordability_uses_query_parameters() {
        let (status, json) =
            send(get("/api/affordability?income=250000&downPayment=100000")).await;
        assert_eq!(status, StatusCode::OK);
        assert_approx(json["summary"]["loanAmount"].as_f64().expect("number"), 350_000.0);
        assert_eq!(json["summary"]["ratios"]["status"], "within-guidelines");
        assert_eq!(
            json["schedule"]["rows"].as_array().map(|rows| rows.len()),
            Some(360)
        );
    }

    #[tokio::test]
    async fn post_buydown_returns_break_even() {
        let (status, json) = send(post_json("/api/buydown", r#"{ "holdingPeriod": 7 }"#)).await;
        assert_eq!(status, StatusCode::OK);
        let months = json["breakEvenMonths"].as_f64().expect("finite break-even");
        assert!((months - 37.6).abs() < 0.05);
        assert!(json["netSavingsAtHoldingPeriod"].as_f64().is_some());
    }

    #[tokio::test]
    async fn get_grid_returns_default_band() {
        let (status, json) = send(get("/api/grid")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["termYears"], 30);
        assert_eq!(json["rates"].as_array().map(|r| r.len()), Some(21));
        assert_eq!(json["cells"].as_array().map(|c| c.len()), Some(441));
    }

    #[tokio::test]
    async fn invalid_input_is_bad_request() {
        let (status, json) = send(get("/api/affordability?loanTerm=0")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(
            json["error"]
                .as_str()
                .is_some_and(|msg| msg.contains("--loan-term"))
        );
    }

    #[tokio::test]
    async fn oversized_requests_are_rejected() {
        let (status, json) = send(get("/api/buydown?loanTerm=400000000")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().is_some_and(|msg| msg.contains("--loan-term")));

        let (status, json) = send(get("/api/grid?priceIncrements=4294967295")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(
            json["error"]
                .as_str()
                .is_some_and(|msg| msg.contains("--price-increments"))
        );
    }

    #[tokio::test]
    async fn malformed_query_is_json_bad_request() {
        for uri in [
            "/api/affordability?income=abc",
            "/api/affordability?loanTerm=-1",
            "/api/buydown?holdingPeriod=x",
            "/api/grid?rateDelta=wide",
        ] {
            let (status, json) = send(get(uri)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert!(json["error"].is_string(), "{uri}");
        }
    }

    #[tokio::test]
    async fn malformed_json_body_is_json_bad_request() {
        let (status, json) = send(post_json("/api/affordability", "{ not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].is_string());

        let (status, json) = send(post_json("/api/grid", r#"{ "loanTerm": "thirty" }"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].is_string());

        let request = Request::builder()
            .method("POST")
            .uri("/api/buydown")
            .body(Body::from("{}"))
            .expect("valid request");
        let (status, json) = send(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let (status, json) = send(get("/api/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "Not found");
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (status, json) = send(get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }
}
