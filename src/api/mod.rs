use axum::{
    Router,
    extract::Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Datelike;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::core::{
    EngineError, GlobalRates, ScenarioMode, SimulationRequest, SimulationResult, Summary,
    YearMonth, compare_scenarios, preset_rates, simulate,
};

const PRESET_MODES: [ScenarioMode; 3] = [
    ScenarioMode::Optimistic,
    ScenarioMode::Average,
    ScenarioMode::Pessimistic,
];

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliScenario {
    Individual,
    Custom,
    Optimistic,
    Average,
    Pessimistic,
}

impl From<CliScenario> for ScenarioMode {
    fn from(value: CliScenario) -> Self {
        match value {
            CliScenario::Individual => ScenarioMode::Individual,
            CliScenario::Custom => ScenarioMode::Custom,
            CliScenario::Optimistic => ScenarioMode::Optimistic,
            CliScenario::Average => ScenarioMode::Average,
            CliScenario::Pessimistic => ScenarioMode::Pessimistic,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "lifeplan",
    about = "Deterministic month-by-month household cash-flow and net-worth projection"
)]
pub struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the JSON API
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Project one plan from a JSON request file
    Run(RunArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[arg(long, help = "Path to a JSON simulation request")]
    pub input: PathBuf,
    #[arg(long, help = "Include monthly snapshots in the output")]
    pub monthly: bool,
    #[arg(long, help = "Pretty-print the JSON output")]
    pub pretty: bool,
    #[arg(long, value_enum, help = "Override the scenario mode in the request")]
    pub scenario: Option<CliScenario>,
    #[arg(long, help = "Override life expectancy in years")]
    pub life_expectancy: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PresetEntry {
    scenario: ScenarioMode,
    rates: GlobalRates,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PresetsResponse {
    presets: Vec<PresetEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ComparePayload {
    #[serde(flatten)]
    request: SimulationRequest,
    #[serde(default)]
    scenarios: Option<Vec<ScenarioMode>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScenarioOutcome {
    scenario: ScenarioMode,
    rates: Option<GlobalRates>,
    final_net_worth: f64,
    summary: Summary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompareResponse {
    start_year: i32,
    end_year: i32,
    scenarios: Vec<ScenarioOutcome>,
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router();

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "lifeplan HTTP API listening");

    axum::serve(listener, app).await
}

fn router() -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/presets", get(presets_handler))
        .route("/api/simulate", post(simulate_handler))
        .route("/api/compare", post(compare_handler))
        .fallback(not_found_handler)
}

async fn health_handler() -> Response {
    json_response(
        StatusCode::OK,
        HealthResponse {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
        },
    )
}

async fn presets_handler() -> Response {
    json_response(StatusCode::OK, presets_response())
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_handler(body: String) -> Response {
    let request = match api_request_from_json(&body, current_month()) {
        Ok(request) => request,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    match simulate(&request) {
        Ok(result) => json_response(StatusCode::OK, result),
        Err(err) => engine_error_response(err),
    }
}

async fn compare_handler(body: String) -> Response {
    let payload = match compare_payload_from_json(&body, current_month()) {
        Ok(payload) => payload,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    let modes = payload
        .scenarios
        .clone()
        .filter(|modes| !modes.is_empty())
        .unwrap_or_else(|| PRESET_MODES.to_vec());

    // Each mode is an independent run over its own copy of the request.
    let handles: Vec<_> = modes
        .into_iter()
        .map(|mode| {
            let request = payload.request.clone();
            tokio::task::spawn_blocking(move || {
                compare_scenarios(&request, &[mode]).map(|mut runs| runs.remove(0))
            })
        })
        .collect();

    let mut runs = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(Ok(run)) => runs.push(run),
            Ok(Err(err)) => return engine_error_response(err),
            Err(join_err) => {
                error!(%join_err, "scenario run panicked");
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, "scenario run failed");
            }
        }
    }

    json_response(StatusCode::OK, build_compare_response(&payload.request, runs))
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

fn engine_error_response(err: EngineError) -> Response {
    info!(%err, "rejected simulation request");
    error_response(StatusCode::BAD_REQUEST, &err.to_string())
}

/// The calendar month used when a request leaves `options.start` empty.
pub fn current_month() -> YearMonth {
    let today = chrono::Local::now().date_naive();
    YearMonth::new(today.year(), today.month())
}

/// Parses a request body and fills boundary defaults.
pub fn api_request_from_json(json: &str, today: YearMonth) -> Result<SimulationRequest, String> {
    let request = serde_json::from_str::<SimulationRequest>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    Ok(with_default_start(request, today))
}

fn compare_payload_from_json(json: &str, today: YearMonth) -> Result<ComparePayload, String> {
    let mut payload = serde_json::from_str::<ComparePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    payload.request = with_default_start(payload.request, today);
    Ok(payload)
}

fn with_default_start(mut request: SimulationRequest, today: YearMonth) -> SimulationRequest {
    if request.options.start.is_none() {
        request.options.start = Some(today);
    }
    request
}

fn presets_response() -> PresetsResponse {
    PresetsResponse {
        presets: PRESET_MODES
            .iter()
            .filter_map(|&scenario| {
                preset_rates(scenario).map(|rates| PresetEntry { scenario, rates })
            })
            .collect(),
    }
}

fn build_compare_response(
    request: &SimulationRequest,
    runs: Vec<(ScenarioMode, SimulationResult)>,
) -> CompareResponse {
    let (start_year, end_year) = runs
        .first()
        .map_or((0, 0), |(_, result)| (result.start_year, result.end_year));
    CompareResponse {
        start_year,
        end_year,
        scenarios: runs
            .into_iter()
            .map(|(scenario, result)| ScenarioOutcome {
                scenario,
                rates: match scenario {
                    ScenarioMode::Custom => Some(request.assumptions.custom_rates),
                    other => preset_rates(other),
                },
                final_net_worth: result
                    .yearly
                    .last()
                    .map_or(result.summary.current_net_worth, |y| y.balances.net_worth),
                summary: result.summary,
            })
            .collect(),
    }
}

/// Runs one request file's contents with CLI overrides applied and renders
/// the result as JSON.
pub fn run_request_json(json: &str, args: &RunArgs, today: YearMonth) -> Result<String, String> {
    let mut request = api_request_from_json(json, today)?;
    if args.monthly {
        request.options.monthly_detail = true;
    }
    if let Some(scenario) = args.scenario {
        request.assumptions.scenario = scenario.into();
    }
    if let Some(years) = args.life_expectancy {
        request.options.life_expectancy = years;
    }

    let result = simulate(&request).map_err(|e| e.to_string())?;
    let rendered = if args.pretty {
        serde_json::to_string_pretty(&result)
    } else {
        serde_json::to_string(&result)
    };
    rendered.map_err(|e| format!("Failed to serialize result: {e}"))
}
