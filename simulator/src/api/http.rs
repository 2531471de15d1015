use axum::{
    extract::{Path, State as AxumState},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use rollquest_types::analysis::{ChiSquareResult, ModeComparison, ZTestResult};
use rollquest_types::api::{
    AddFundsRequest, BalanceResponse, BatchRequest, ChiSquareRequest, CompareModesRequest,
    ConvergenceRequest, DistributionRequest, PlayerResponse, RollRequest, RollResponse,
    SessionCreated, SetPlayerRequest, SimulationRequest, SimulationResponse, ZTestRequest,
};
use rollquest_types::session::{SessionExport, SessionSnapshot};
use rollquest_types::{
    BatchResult, ConvergenceResult, DistributionInfo, EngineError, ErrorKind, ErrorResponse,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use crate::Simulator;

#[derive(Serialize)]
struct HealthzResponse {
    ok: bool,
}

/// Failure surfaced by a handler.
#[derive(Debug, Error)]
pub(super) enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("worker failed: {0}")]
    Worker(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Engine(err) => {
                let status = match err.kind() {
                    ErrorKind::InvalidParameter | ErrorKind::InvalidBet => StatusCode::BAD_REQUEST,
                    ErrorKind::InsufficientData => StatusCode::UNPROCESSABLE_ENTITY,
                    ErrorKind::NoActiveSession => StatusCode::NOT_FOUND,
                    ErrorKind::InvalidState => StatusCode::CONFLICT,
                };
                (status, Json(ErrorResponse::from(&err))).into_response()
            }
            ApiError::Worker(message) => {
                tracing::error!(%message, "blocking task failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
            }
        }
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Run CPU-bound engine work off the async runtime.
async fn blocking<T, F>(simulator: &Arc<Simulator>, work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Simulator) -> Result<T, EngineError> + Send + 'static,
{
    let simulator = Arc::clone(simulator);
    let result = tokio::task::spawn_blocking(move || work(&simulator))
        .await
        .map_err(|err| ApiError::Worker(err.to_string()))?;
    Ok(result?)
}

pub(super) async fn healthz() -> Response {
    Json(HealthzResponse { ok: true }).into_response()
}

pub(super) async fn config(AxumState(simulator): AxumState<Arc<Simulator>>) -> Response {
    Json(simulator.config().clone()).into_response()
}

pub(super) async fn http_metrics(
    headers: HeaderMap,
    AxumState(simulator): AxumState<Arc<Simulator>>,
) -> Response {
    if let Some(status) = metrics_auth_error(&headers) {
        return status.into_response();
    }
    Json(simulator.http_metrics_snapshot()).into_response()
}

fn metrics_auth_error(headers: &HeaderMap) -> Option<StatusCode> {
    let token = std::env::var("METRICS_AUTH_TOKEN").unwrap_or_default();
    if token.is_empty() {
        return None;
    }
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    let header_token = headers
        .get("x-metrics-token")
        .and_then(|value| value.to_str().ok());
    if bearer == Some(token.as_str()) || header_token == Some(token.as_str()) {
        None
    } else {
        Some(StatusCode::UNAUTHORIZED)
    }
}

pub(super) async fn create_session(
    AxumState(simulator): AxumState<Arc<Simulator>>,
) -> ApiResult<SessionCreated> {
    let (session_id, balance) = simulator.create_session();
    Ok(Json(SessionCreated {
        session_id,
        balance,
    }))
}

pub(super) async fn delete_session(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    simulator.delete_session(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn roll(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    Path(id): Path<String>,
    Json(request): Json<RollRequest>,
) -> ApiResult<RollResponse> {
    let start = Instant::now();
    let result = simulator.roll(&id, &request);
    simulator.http_metrics().record_roll(start.elapsed());
    Ok(Json(result?))
}

pub(super) async fn session_stats(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    Path(id): Path<String>,
) -> ApiResult<SessionSnapshot> {
    Ok(Json(simulator.session_stats(&id)?))
}

pub(super) async fn export_session(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    Path(id): Path<String>,
) -> ApiResult<SessionExport> {
    Ok(Json(simulator.export_session(&id)?))
}

pub(super) async fn set_player(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    Path(id): Path<String>,
    Json(request): Json<SetPlayerRequest>,
) -> ApiResult<PlayerResponse> {
    let player_name = simulator.set_player_name(&id, &request.name)?;
    Ok(Json(PlayerResponse { player_name }))
}

pub(super) async fn add_funds(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    Path(id): Path<String>,
    Json(request): Json<AddFundsRequest>,
) -> ApiResult<BalanceResponse> {
    let balance = simulator.add_funds(&id, request.amount)?;
    Ok(Json(BalanceResponse { balance }))
}

pub(super) async fn reset_session(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    Path(id): Path<String>,
) -> ApiResult<BalanceResponse> {
    let balance = simulator.reset_session(&id)?;
    Ok(Json(BalanceResponse { balance }))
}

pub(super) async fn chi_square(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    Json(request): Json<ChiSquareRequest>,
) -> ApiResult<ChiSquareResult> {
    let start = Instant::now();
    let result = simulator.chi_square(&request);
    simulator.http_metrics().record_analysis(start.elapsed());
    Ok(Json(result?))
}

pub(super) async fn z_test(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    Json(request): Json<ZTestRequest>,
) -> ApiResult<ZTestResult> {
    let start = Instant::now();
    let result = simulator.z_test(&request);
    simulator.http_metrics().record_analysis(start.elapsed());
    Ok(Json(result?))
}

pub(super) async fn compare_modes(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    Json(request): Json<CompareModesRequest>,
) -> Json<ModeComparison> {
    Json(simulator.compare_modes(&request))
}

pub(super) async fn run_simulation(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    Json(request): Json<SimulationRequest>,
) -> ApiResult<SimulationResponse> {
    let start = Instant::now();
    let result = blocking(&simulator, move |sim| sim.run_simulation(request)).await;
    simulator.http_metrics().record_simulation(start.elapsed());
    Ok(Json(result?))
}

pub(super) async fn run_batch(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    Json(request): Json<BatchRequest>,
) -> ApiResult<BatchResult> {
    let start = Instant::now();
    let result = blocking(&simulator, move |sim| sim.run_batch(&request)).await;
    simulator.http_metrics().record_batch(start.elapsed());
    Ok(Json(result?))
}

pub(super) async fn run_convergence(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    Json(request): Json<ConvergenceRequest>,
) -> ApiResult<ConvergenceResult> {
    let start = Instant::now();
    let result = blocking(&simulator, move |sim| sim.run_convergence(&request)).await;
    simulator.http_metrics().record_convergence(start.elapsed());
    Ok(Json(result?))
}

pub(super) async fn dice_info(
    AxumState(simulator): AxumState<Arc<Simulator>>,
) -> ApiResult<DistributionInfo> {
    Ok(Json(simulator.dice_info(None, None)?))
}

pub(super) async fn dice_info_custom(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    Json(request): Json<DistributionRequest>,
) -> ApiResult<DistributionInfo> {
    Ok(Json(simulator.dice_info(
        request.probabilities.as_deref(),
        request.adjust,
    )?))
}
