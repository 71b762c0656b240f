use crate::install_relay::RelayedInstallPrompt;
use crate::page;
use alphasense_core::controller::{AnalysisSession, ControllerSnapshot};
use alphasense_core::domain::analysis::{AnalysisRequest, AnalysisType, BacktestStrategy};
use alphasense_core::install::{InstallOutcome, InstallPromptSlot};
use axum::{
    extract::{
        rejection::{FormRejection, JsonRejection},
        State,
    },
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use minijinja::Environment;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

#[derive(Clone)]
pub struct AppState {
    pub session: AnalysisSession,
    pub install: Arc<InstallPromptSlot<RelayedInstallPrompt>>,
    pub templates: Arc<Environment<'static>>,
}

impl AppState {
    pub fn new(session: AnalysisSession) -> anyhow::Result<Self> {
        Ok(Self {
            session,
            install: Arc::new(InstallPromptSlot::new()),
            templates: Arc::new(page::environment()?),
        })
    }
}

pub fn router(state: AppState) -> Router {
    let templates = state.templates.clone();
    let routes = Router::new()
        .route("/healthz", get(healthz))
        .route("/", get(index))
        .route("/analyze", post(analyze_form))
        .route("/retry", post(retry_form))
        .route("/api/state", get(api_state))
        .route("/api/analyze", post(api_analyze))
        .route("/api/retry", post(api_retry))
        .route("/manifest.webmanifest", get(manifest))
        .route("/install/offer", post(install_offer))
        .route("/install/outcome", post(install_outcome))
        .with_state(state);
    with_middleware(routes, templates)
}

fn with_middleware(routes: Router, templates: Arc<Environment<'static>>) -> Router {
    routes
        .layer(CatchPanicLayer::custom(
            move |panic: Box<dyn Any + Send + 'static>| panic_response(&templates, panic),
        ))
        .layer(TraceLayer::new_for_http())
}

fn panic_response(templates: &Environment<'static>, panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        *s
    } else {
        ""
    };
    // The sentry panic hook has already reported it.
    tracing::warn!(panic = message, "handler panicked, serving fallback page");
    fallback_response(templates, message)
}

fn fallback_response(templates: &Environment<'static>, message: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(page::render_fallback(templates, message)),
    )
        .into_response()
}

async fn healthz() -> &'static str {
    "ok"
}

async fn index(State(state): State<AppState>) -> Response {
    let install_available = state.install.is_available();
    let rendered = state
        .session
        .with_controller(|controller| page::render(&state.templates, controller, install_available))
        .await;
    match rendered {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::warn!(error = %format!("{e:#}"), "page render failed");
            fallback_response(&state.templates, &e.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
struct AnalyzeForm {
    #[serde(rename = "type")]
    analysis_type: String,
    #[serde(default)]
    period: Option<String>,
    #[serde(default)]
    strategy: Option<String>,
}

/// Builds a request from loosely typed fields; type and strategy are matched
/// case-insensitively.
fn parse_request(
    analysis_type: &str,
    period: Option<&str>,
    strategy: Option<&str>,
) -> anyhow::Result<AnalysisRequest> {
    let analysis_type = analysis_type.parse::<AnalysisType>()?;
    let strategy = strategy
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse::<BacktestStrategy>)
        .transpose()?;
    AnalysisRequest::new(analysis_type, period, strategy)
}

fn bad_request(err: impl std::fmt::Display) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, err.to_string())
}

async fn analyze_form(
    State(state): State<AppState>,
    form: Result<Form<AnalyzeForm>, FormRejection>,
) -> Result<Redirect, (StatusCode, String)> {
    let Form(form) = form.map_err(|e| bad_request(e.body_text()))?;
    let request = parse_request(
        &form.analysis_type,
        form.period.as_deref(),
        form.strategy.as_deref(),
    )
    .map_err(bad_request)?;

    // The page renders the buttons inert while analyzing; a stale page posting
    // anyway just lands back on the loading view.
    state.session.dispatch(request).await;
    Ok(Redirect::to("/"))
}

async fn retry_form(State(state): State<AppState>) -> Redirect {
    state.session.retry().await;
    Redirect::to("/")
}

async fn api_state(State(state): State<AppState>) -> Json<ControllerSnapshot> {
    Json(state.session.snapshot().await)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiAnalyzeRequest {
    #[serde(rename = "type")]
    analysis_type: String,
    #[serde(default)]
    backtest_period: Option<String>,
    #[serde(default)]
    backtest_strategy: Option<String>,
}

async fn api_analyze(
    State(state): State<AppState>,
    body: Result<Json<ApiAnalyzeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ControllerSnapshot>), (StatusCode, String)> {
    let Json(body) = body.map_err(|e| bad_request(e.body_text()))?;
    let request = parse_request(
        &body.analysis_type,
        body.backtest_period.as_deref(),
        body.backtest_strategy.as_deref(),
    )
    .map_err(bad_request)?;

    if !state.session.dispatch(request).await {
        return Err((
            StatusCode::CONFLICT,
            "an analysis is already in progress".to_string(),
        ));
    }
    Ok((StatusCode::ACCEPTED, Json(state.session.snapshot().await)))
}

async fn api_retry(
    State(state): State<AppState>,
) -> Result<Json<ControllerSnapshot>, (StatusCode, String)> {
    if !state.session.retry().await {
        return Err((
            StatusCode::CONFLICT,
            "retry is only available after a failed analysis".to_string(),
        ));
    }
    Ok(Json(state.session.snapshot().await))
}

async fn manifest() -> Response {
    let body = serde_json::json!({
        "name": "AlphaSense",
        "short_name": "AlphaSense",
        "description": "AI-audited fundamental and technical stock picks for the Nifty 200",
        "start_url": "/",
        "display": "standalone",
        "background_color": "#020617",
        "theme_color": "#2563eb",
    });
    (
        [(header::CONTENT_TYPE, "application/manifest+json")],
        body.to_string(),
    )
        .into_response()
}

async fn install_offer(State(state): State<AppState>) -> StatusCode {
    state.install.capture(RelayedInstallPrompt::new());
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
struct InstallOutcomeBody {
    outcome: InstallOutcome,
}

#[derive(Debug, Serialize)]
struct InstallOutcomeResponse {
    outcome: InstallOutcome,
    available: bool,
}

async fn install_outcome(
    State(state): State<AppState>,
    Json(body): Json<InstallOutcomeBody>,
) -> Result<Json<InstallOutcomeResponse>, StatusCode> {
    let prompt = state.install.current().ok_or(StatusCode::NOT_FOUND)?;
    prompt.deliver(body.outcome);

    let outcome = state
        .install
        .request_install()
        .await
        .unwrap_or(body.outcome);
    Ok(Json(InstallOutcomeResponse {
        outcome,
        available: state.install.is_available(),
    }))
}
