use axum::{
    Router,
    extract::{Json, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use clap::Args;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::SessionStore;
use crate::config::{ServerConfig, validate_max_periods};
use crate::core::{Inputs, OverrideMap, ProjectionError, RateOverride, project};
use crate::report::{CompanyInfo, SimulationReport, XLSX_CONTENT_TYPE, XLSX_FILE_NAME};

const INDEX_HTML: &str = include_str!("../../web/index.html");
const STYLES_CSS: &str = include_str!("../../web/styles.css");
const APP_JS: &str = include_str!("../../web/app.js");

pub const SESSION_COOKIE: &str = "margin_sim_session";
pub const MAX_OVERRIDES: usize = 100;

/// A manual override as entered by a person: 1-based period, rates in percent.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideEntry {
    pub period: u32,
    #[serde(default, alias = "rate")]
    pub margin_rate: Option<f64>,
    #[serde(default, alias = "tax")]
    pub tax_rate: Option<f64>,
}

#[derive(Args, Debug, Clone)]
pub struct ProjectionArgs {
    #[arg(long, default_value = "")]
    pub company_name: String,
    #[arg(long, default_value = "")]
    pub tax_id: String,
    #[arg(long)]
    pub initial_capital: f64,
    #[arg(long, help = "Gross margin rate per period in percent, e.g. 10")]
    pub margin_rate: f64,
    #[arg(long, help = "Tax on gross margin in percent, e.g. 20")]
    pub tax_rate: f64,
    #[arg(long, help = "Cumulative net margin at which the projection stops")]
    pub target: f64,
    #[arg(
        long = "override",
        value_name = "PERIOD:RATE[:TAX]",
        value_parser = parse_override_entry,
        help = "Per-period override, rates in percent; leave RATE empty to keep the default (e.g. 3::15)"
    )]
    pub overrides: Vec<OverrideEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    company_name: Option<String>,
    tax_id: Option<String>,
    initial_capital: Option<f64>,
    margin_rate: Option<f64>,
    tax_rate: Option<f64>,
    target: Option<f64>,
    overrides: Option<Vec<OverrideEntry>>,
}

#[derive(Debug, Deserialize)]
struct LoginPayload {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    authenticated: bool,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug)]
struct ApiRequest {
    inputs: Inputs,
    company: CompanyInfo,
}

/// Shared server state: immutable configuration plus the session table.
#[derive(Debug)]
pub struct AppState {
    pub config: ServerConfig,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            sessions: SessionStore::new(),
        }
    }
}

fn parse_override_entry(raw: &str) -> Result<OverrideEntry, String> {
    let mut parts = raw.split(':');
    let period = parts
        .next()
        .unwrap_or_default()
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid override period in '{raw}'"))?;
    let mut optional_pct = |name: &str| -> Result<Option<f64>, String> {
        match parts.next().map(str::trim) {
            None | Some("") => Ok(None),
            Some(v) => v
                .parse::<f64>()
                .map(Some)
                .map_err(|_| format!("invalid override {name} in '{raw}'")),
        }
    };
    let margin_rate = optional_pct("rate")?;
    let tax_rate = optional_pct("tax")?;
    if parts.next().is_some() {
        return Err(format!("expected PERIOD:RATE[:TAX], got '{raw}'"));
    }
    Ok(OverrideEntry {
        period,
        margin_rate,
        tax_rate,
    })
}

fn build_inputs(args: ProjectionArgs, max_periods: u32) -> Result<(Inputs, CompanyInfo), String> {
    if !args.initial_capital.is_finite() || args.initial_capital < 0.0 {
        return Err("--initial-capital must be >= 0".to_string());
    }
    if !(0.0..=100.0).contains(&args.margin_rate) {
        return Err("--margin-rate must be between 0 and 100".to_string());
    }
    if !(0.0..=100.0).contains(&args.tax_rate) {
        return Err("--tax-rate must be between 0 and 100".to_string());
    }
    if !args.target.is_finite() || args.target < 0.0 {
        return Err("--target must be >= 0".to_string());
    }
    if args.overrides.len() > MAX_OVERRIDES {
        return Err(format!("at most {MAX_OVERRIDES} overrides are allowed"));
    }

    let count = args.overrides.len() as u32;
    let mut overrides = OverrideMap::new();
    for entry in &args.overrides {
        if entry.period == 0 || entry.period > count {
            return Err(format!(
                "override period must be between 1 and {count}, got {}",
                entry.period
            ));
        }
        for (name, pct) in [("rate", entry.margin_rate), ("tax", entry.tax_rate)] {
            if pct.is_some_and(|v| !(0.0..=100.0).contains(&v)) {
                return Err(format!(
                    "override {name} for period {} must be between 0 and 100",
                    entry.period
                ));
            }
        }
        let rates = RateOverride::new(
            entry.margin_rate.map(|v| v / 100.0),
            entry.tax_rate.map(|v| v / 100.0),
        )
        .map_err(|e| e.to_string())?;
        // Person-facing period N is engine period index N-1.
        overrides.insert(entry.period - 1, rates);
    }

    let inputs = Inputs::new(
        args.initial_capital,
        args.margin_rate / 100.0,
        args.tax_rate / 100.0,
        args.target,
        overrides,
    )
    .map_err(|e| e.to_string())?
    .with_max_periods(max_periods);

    let company = CompanyInfo {
        company_name: args.company_name,
        tax_id: args.tax_id,
    };
    Ok((inputs, company))
}

/// Runs one projection from command-line arguments and renders it as text or CSV.
pub fn run_projection_command(
    args: ProjectionArgs,
    max_periods: u32,
    csv: bool,
) -> Result<Vec<u8>, String> {
    let max_periods = validate_max_periods(max_periods)?;
    let (inputs, company) = build_inputs(args, max_periods)?;
    let projection = project(&inputs).map_err(|e| e.to_string())?;
    let report = SimulationReport::new(&projection, &company);

    if csv {
        return report.to_csv().map_err(|e| e.to_string());
    }

    let mut out = report.to_text_table();
    out.push_str(&format!(
        "\nPeriods needed to reach the target: {}\n",
        report.period_count
    ));
    Ok(out.into_bytes())
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/index.html", get(index_handler))
        .route("/styles.css", get(styles_handler))
        .route("/app.js", get(app_js_handler))
        .route("/api/session", get(session_handler))
        .route("/api/login", post(login_handler))
        .route("/api/simulate", post(simulate_handler))
        .route("/api/export", post(export_handler))
        .fallback(not_found_handler)
        .with_state(state)
}

pub async fn run_http_server(config: ServerConfig) -> std::io::Result<()> {
    let addr = config.addr;
    let port = addr.port();
    let state = Arc::new(AppState::new(config));
    let app = create_router(state);

    let listener = TcpListener::bind(addr).await?;
    info!("Margin simulator listening on http://{addr}");
    info!("Local access: http://127.0.0.1:{port}/");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
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

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn session_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let (id, is_new) = resolve_session(&state.sessions, &headers);
    let body = SessionResponse {
        authenticated: state.sessions.is_authenticated(&id),
    };
    let response = json_response(StatusCode::OK, body);
    if is_new {
        with_session_cookie(response, id)
    } else {
        response
    }
}

async fn login_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<LoginPayload>,
) -> Response {
    match state.sessions.login(
        &state.config.credentials,
        &payload.username,
        &payload.password,
    ) {
        Some(id) => {
            info!(session = %id, "login succeeded");
            let response = json_response(
                StatusCode::OK,
                SessionResponse {
                    authenticated: true,
                },
            );
            with_session_cookie(response, id)
        }
        None => {
            let (id, is_new) = resolve_session(&state.sessions, &headers);
            warn!(session = %id, "login rejected: invalid credentials");
            let response =
                error_response(StatusCode::UNAUTHORIZED, "Invalid username or password");
            if is_new {
                with_session_cookie(response, id)
            } else {
                response
            }
        }
    }
}

async fn simulate_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<SimulatePayload>,
) -> Response {
    match run_authorized(&state, &headers, payload).await {
        Ok(report) => json_response(StatusCode::OK, report),
        Err(response) => response,
    }
}

async fn export_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<SimulatePayload>,
) -> Response {
    let report = match run_authorized(&state, &headers, payload).await {
        Ok(report) => report,
        Err(response) => return response,
    };

    match report.to_xlsx() {
        Ok(bytes) => with_cache_control((
            [
                (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{XLSX_FILE_NAME}\""),
                ),
            ],
            bytes,
        )),
        Err(e) => {
            warn!("export failed: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

async fn run_authorized(
    state: &AppState,
    headers: &HeaderMap,
    payload: SimulatePayload,
) -> Result<SimulationReport, Response> {
    let authorized = session_id_from_headers(headers)
        .map(|id| state.sessions.is_authenticated(&id))
        .unwrap_or(false);
    if !authorized {
        return Err(error_response(StatusCode::UNAUTHORIZED, "Login required"));
    }

    let ApiRequest { inputs, company } =
        api_request_from_payload(payload, state.config.max_periods)
            .map_err(|msg| error_response(StatusCode::BAD_REQUEST, &msg))?;

    // A run is bounded by max_periods but can still take a while; keep it off
    // the request workers.
    let outcome = tokio::task::spawn_blocking(move || {
        let outcome = project(&inputs);
        (outcome, inputs.overrides.len())
    })
    .await;

    match outcome {
        Ok((Ok(projection), overrides)) => {
            debug!(
                periods = projection.period_count,
                overrides, "projection complete"
            );
            Ok(SimulationReport::new(&projection, &company))
        }
        Ok((Err(e @ ProjectionError::TargetUnreachable { .. }), _)) => {
            warn!("{e}");
            Err(error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                &e.to_string(),
            ))
        }
        Ok((Err(e), _)) => Err(error_response(StatusCode::BAD_REQUEST, &e.to_string())),
        Err(e) => {
            warn!("projection task failed: {e}");
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "projection failed",
            ))
        }
    }
}

/// Returns the session id from the cookie, or mints an anonymous one (`true`
/// when minted). Anonymous ids are never stored.
fn resolve_session(sessions: &SessionStore, headers: &HeaderMap) -> (Uuid, bool) {
    match session_id_from_headers(headers) {
        Some(id) => (id, false),
        None => (sessions.open(), true),
    }
}

fn session_id_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| {
            pair.trim()
                .strip_prefix(SESSION_COOKIE)
                .and_then(|rest| rest.strip_prefix('='))
        })
        .find_map(|raw| Uuid::parse_str(raw.trim()).ok())
}

fn with_session_cookie(mut response: Response, id: Uuid) -> Response {
    let cookie = format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Strict");
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    response
}

fn with_cache_control<R: IntoResponse>(response: R) -> Response {
    let mut response = response.into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store"),
    );
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
fn api_request_from_json(json: &str) -> Result<ApiRequest, String> {
    let payload = serde_json::from_str::<SimulatePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload, crate::core::DEFAULT_MAX_PERIODS)
}

fn api_request_from_payload(
    payload: SimulatePayload,
    max_periods: u32,
) -> Result<ApiRequest, String> {
    let mut args = default_args_for_api();

    if let Some(v) = payload.company_name {
        args.company_name = v;
    }
    if let Some(v) = payload.tax_id {
        args.tax_id = v;
    }
    if let Some(v) = payload.initial_capital {
        args.initial_capital = v;
    }
    if let Some(v) = payload.margin_rate {
        args.margin_rate = v;
    }
    if let Some(v) = payload.tax_rate {
        args.tax_rate = v;
    }
    if let Some(v) = payload.target {
        args.target = v;
    }
    if let Some(v) = payload.overrides {
        args.overrides = v;
    }

    let (inputs, company) = build_inputs(args, max_periods)?;
    Ok(ApiRequest { inputs, company })
}

/// Starting values of the web form.
fn default_args_for_api() -> ProjectionArgs {
    ProjectionArgs {
        company_name: String::new(),
        tax_id: String::new(),
        initial_capital: 0.0,
        margin_rate: 0.0,
        tax_rate: 0.0,
        target: 0.0,
        overrides: Vec::new(),
    }
}
