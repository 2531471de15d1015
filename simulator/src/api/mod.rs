use axum::{
    extract::{DefaultBodyLimit, Request, State as AxumState},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use governor::middleware::NoOpMiddleware;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::Simulator;

mod http;

pub struct Api {
    simulator: Arc<Simulator>,
}

#[derive(Clone)]
struct OriginConfig {
    allowed_origins: Arc<HashSet<String>>,
    allow_any_origin: bool,
    allow_no_origin: bool,
}

type IpGovernorConfig =
    tower_governor::governor::GovernorConfig<SmartIpKeyExtractor, NoOpMiddleware>;

fn default_governor_config() -> Option<IpGovernorConfig> {
    GovernorConfigBuilder::default()
        .key_extractor(SmartIpKeyExtractor)
        .finish()
}

impl Api {
    pub fn new(simulator: Arc<Simulator>) -> Self {
        Self { simulator }
    }

    pub fn router(&self) -> Router {
        let config = self.simulator.config();

        // Environment variables override config
        let allowed_origins = parse_allowed_origins("ALLOWED_HTTP_ORIGINS")
            .unwrap_or_else(|| config.allowed_http_origins.iter().cloned().collect());
        let allow_any_origin = allowed_origins.contains("*");
        let allow_no_origin =
            parse_env_bool("ALLOW_HTTP_NO_ORIGIN").unwrap_or(config.allow_http_no_origin);
        if allowed_origins.is_empty() {
            tracing::warn!("ALLOWED_HTTP_ORIGINS is empty; all browser origins will be rejected");
        }
        let cors_origins = allowed_origins
            .iter()
            .filter(|origin| *origin != "*")
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!("Invalid origin in ALLOWED_HTTP_ORIGINS: {}", origin);
                    None
                }
            })
            .collect::<Vec<_>>();
        let origin_config = OriginConfig {
            allowed_origins: Arc::new(allowed_origins),
            allow_any_origin,
            allow_no_origin,
        };

        let cors = if allow_any_origin {
            CorsLayer::new().allow_origin(AllowOrigin::any())
        } else {
            CorsLayer::new().allow_origin(AllowOrigin::list(cors_origins))
        }
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::HeaderName::from_static("x-request-id"),
        ])
        .expose_headers([header::HeaderName::from_static("x-request-id")]);

        let http_rate_per_sec =
            parse_env_u64("RATE_LIMIT_HTTP_PER_SEC").or(config.http_rate_limit_per_second);
        let http_rate_burst =
            parse_env_u32("RATE_LIMIT_HTTP_BURST").or(config.http_rate_limit_burst);

        let governor_conf = match (http_rate_per_sec, http_rate_burst) {
            (Some(rate_per_second), Some(burst_size))
                if rate_per_second > 0 && burst_size > 0 =>
            {
                let nanos_per_request = (1_000_000_000u64 / rate_per_second).max(1);
                let period = Duration::from_nanos(nanos_per_request);
                tracing::info!(
                    rate_per_second,
                    burst_size,
                    "HTTP rate limit configured"
                );
                let config = GovernorConfigBuilder::default()
                    .period(period)
                    .burst_size(burst_size)
                    .key_extractor(SmartIpKeyExtractor)
                    .finish()
                    .or_else(|| {
                        tracing::warn!("invalid rate-limit config; falling back to defaults");
                        default_governor_config()
                    });
                config.map(Arc::new)
            }
            _ => None,
        };

        let router = Router::new()
            .route("/healthz", get(http::healthz))
            .route("/config", get(http::config))
            .route("/metrics/http", get(http::http_metrics))
            .route("/sessions", post(http::create_session))
            .route("/sessions/:id", delete(http::delete_session))
            .route("/sessions/:id/roll", post(http::roll))
            .route("/sessions/:id/stats", get(http::session_stats))
            .route("/sessions/:id/export", get(http::export_session))
            .route("/sessions/:id/player", post(http::set_player))
            .route("/sessions/:id/funds", post(http::add_funds))
            .route("/sessions/:id/reset", post(http::reset_session))
            .route("/analysis/chi-square", post(http::chi_square))
            .route("/analysis/z-test", post(http::z_test))
            .route("/analysis/compare-modes", post(http::compare_modes))
            .route("/simulation/run", post(http::run_simulation))
            .route("/simulation/batch", post(http::run_batch))
            .route("/simulation/convergence", post(http::run_convergence))
            .route(
                "/dice/info",
                get(http::dice_info).post(http::dice_info_custom),
            );

        let router = match governor_conf {
            Some(config) => router.layer(GovernorLayer { config }),
            None => router,
        };

        let router = router.layer(cors);
        let router = router.layer(middleware::from_fn(move |req, next| {
            let origin_config = origin_config.clone();
            async move { enforce_origin(origin_config, req, next).await }
        }));
        let router = match config.http_body_limit_bytes {
            Some(limit) if limit > 0 => router.layer(DefaultBodyLimit::max(limit)),
            _ => router,
        };
        let router = router.layer(middleware::from_fn_with_state(
            self.simulator.clone(),
            request_id_middleware,
        ));
        let router = router.layer(TraceLayer::new_for_http());

        router.with_state(self.simulator.clone())
    }
}

/// `None` when the variable is unset, so config can supply the list.
fn parse_allowed_origins(var: &str) -> Option<HashSet<String>> {
    std::env::var(var).ok().map(|raw| {
        raw.split(',')
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .collect()
    })
}

fn parse_env_bool(var: &str) -> Option<bool> {
    std::env::var(var)
        .ok()
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
}

fn parse_env_u64(var: &str) -> Option<u64> {
    std::env::var(var).ok().and_then(|v| v.parse().ok())
}

fn parse_env_u32(var: &str) -> Option<u32> {
    std::env::var(var).ok().and_then(|v| v.parse().ok())
}

async fn enforce_origin(config: OriginConfig, req: Request, next: Next) -> Response {
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok());
    if let Some(origin) = origin {
        if !config.allow_any_origin && !config.allowed_origins.contains(origin) {
            return (StatusCode::FORBIDDEN, "Origin not allowed").into_response();
        }
    } else if !config.allow_no_origin {
        return (StatusCode::FORBIDDEN, "Origin required").into_response();
    }
    next.run(req).await
}

async fn request_id_middleware(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    req: Request,
    next: Next,
) -> Response {
    let request_id = req
        .headers()
        .get(header::HeaderName::from_static("x-request-id"))
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();
    let mut response = next.run(req).await;
    match response.status() {
        StatusCode::FORBIDDEN => simulator.http_metrics().inc_reject_origin(),
        StatusCode::PAYLOAD_TOO_LARGE => simulator.http_metrics().inc_reject_body_limit(),
        StatusCode::TOO_MANY_REQUESTS => simulator.http_metrics().inc_reject_rate_limit(),
        _ => {}
    }
    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(
            header::HeaderName::from_static("x-request-id"),
            header_value,
        );
    }
    tracing::info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "http.request"
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimulatorConfig;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> Router {
        let config = SimulatorConfig {
            seed: Some(11),
            max_trials: 20_000,
            http_rate_limit_per_second: None,
            http_rate_limit_burst: None,
            allow_http_no_origin: true,
            ..SimulatorConfig::default()
        };
        Api::new(Arc::new(Simulator::new(config))).router()
    }

    async fn send(app: Router, request: HttpRequest<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn post_json(uri: &str, body: Value) -> HttpRequest<Body> {
        HttpRequest::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> HttpRequest<Body> {
        HttpRequest::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_healthz_echoes_request_id() {
        let request = HttpRequest::builder()
            .uri("/healthz")
            .header("x-request-id", "abc-123")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-request-id"], "abc-123");
    }

    #[tokio::test]
    async fn test_roll_then_stats() {
        let app = app();
        let (status, body) = send(
            app.clone(),
            post_json("/sessions/alice/roll", json!({"bet_face": 3, "bet_amount": 10})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_rounds"], 1);
        let result = body["result"].as_u64().unwrap();
        assert!((1..=6).contains(&result));

        let (status, stats) = send(app.clone(), get("/sessions/alice/stats")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["basic_stats"]["total_rounds"], 1);
        assert_eq!(stats["basic_stats"]["balance"], body["balance"]);

        let (status, export) = send(app, get("/sessions/alice/export")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(export["history"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_bet_maps_to_bad_request() {
        let (status, body) = send(
            app(),
            post_json("/sessions/bob/roll", json!({"bet_face": 7, "bet_amount": 10})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_bet");
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let (status, body) = send(app(), get("/sessions/nobody/export")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "no_active_session");
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let app = app();
        let (status, created) = send(app.clone(), post_json("/sessions", json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        let id = created["session_id"].as_str().unwrap().to_string();
        assert_eq!(created["balance"], 1000.0);

        let (_, player) = send(
            app.clone(),
            post_json(&format!("/sessions/{id}/player"), json!({"name": "  Ada  "})),
        )
        .await;
        assert_eq!(player["player_name"], "Ada");

        let (_, funds) = send(
            app.clone(),
            post_json(&format!("/sessions/{id}/funds"), json!({"amount": 250})),
        )
        .await;
        assert_eq!(funds["balance"], 1250.0);

        let (status, _) = send(
            app.clone(),
            post_json(&format!("/sessions/{id}/funds"), json!({"amount": 0})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, reset) = send(
            app.clone(),
            post_json(&format!("/sessions/{id}/reset"), json!({})),
        )
        .await;
        assert_eq!(reset["balance"], 1000.0);

        let (_, stats) = send(app.clone(), get(&format!("/sessions/{id}/stats"))).await;
        assert_eq!(stats["basic_stats"]["player_name"], "Ada");

        let remove = || {
            HttpRequest::builder()
                .method("DELETE")
                .uri(format!("/sessions/{id}"))
                .body(Body::empty())
                .unwrap()
        };
        let (status, _) = send(app.clone(), remove()).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(app.clone(), get(&format!("/sessions/{id}/stats"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(app, remove()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_chi_square_endpoint() {
        let app = app();
        let (status, body) = send(
            app.clone(),
            post_json("/analysis/chi-square", json!({"observed": [100, 100, 100, 100, 100, 100]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_fair_at_95_confidence"], true);

        let (status, body) = send(
            app,
            post_json("/analysis/chi-square", json!({"observed": [0, 0, 0, 0, 0, 0]})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["kind"], "insufficient_data");
    }

    #[tokio::test]
    async fn test_simulation_endpoint() {
        let (status, body) = send(
            app(),
            post_json(
                "/simulation/run",
                json!({
                    "num_trials": 1000,
                    "starting_balance": 1000,
                    "bet_amount": 10,
                    "bet_strategy": "fixed",
                    "game_mode": "fair",
                    "target_face": 1,
                    "seed": 3
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let trajectory = body["balance_trajectory"].as_array().unwrap();
        assert_eq!(trajectory.len(), 1001);
        assert_eq!(trajectory[0], 1000.0);
        assert_eq!(body["parameters"]["seed"], 3);
        assert_eq!(body["trajectory_sampled"], false);
    }

    #[tokio::test]
    async fn test_simulation_ceiling() {
        let (status, body) = send(
            app(),
            post_json("/simulation/run", json!({"num_trials": 20_001})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_parameter");
    }

    #[tokio::test]
    async fn test_batch_and_convergence_endpoints() {
        let app = app();
        let (status, batch) = send(
            app.clone(),
            post_json(
                "/simulation/batch",
                json!({"num_simulations": 20, "trials_per_sim": 100, "seed": 4}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(batch["num_simulations"], 20);
        assert_eq!(batch["distribution"]["histogram"]["counts"].as_array().unwrap().len(), 20);

        let (status, convergence) = send(
            app,
            post_json(
                "/simulation/convergence",
                json!({"max_trials": 5000, "target_face": 2, "seed": 4}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(convergence["target_face"], 2);
        assert_eq!(convergence["trials"].as_array().unwrap().last().unwrap(), 5000);
    }

    #[tokio::test]
    async fn test_convergence_rejects_huge_checkpoint_count() {
        let (status, body) = send(
            app(),
            post_json(
                "/simulation/convergence",
                json!({"max_trials": 100, "target_face": 1, "checkpoints": u64::MAX}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_parameter");
    }

    #[tokio::test]
    async fn test_dice_info() {
        let app = app();
        let (status, fair) = send(app.clone(), get("/dice/info")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fair["mode"], "fair");
        assert!((fair["expected_value"].as_f64().unwrap() - 3.5).abs() < 1e-12);

        let (status, adjusted) = send(
            app.clone(),
            post_json("/dice/info", json!({"adjust": {"face": 6, "probability": 0.5}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(adjusted["mode"], "tweaked");
        let probabilities = adjusted["probabilities"].as_array().unwrap();
        assert!((probabilities[5].as_f64().unwrap() - 0.5).abs() < 1e-12);
        assert!((probabilities[0].as_f64().unwrap() - 0.1).abs() < 1e-12);

        let (status, _) = send(
            app.clone(),
            post_json("/dice/info", json!({"adjust": {"face": 7, "probability": 0.5}})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            app,
            post_json("/dice/info", json!({"probabilities": [1, 2, 3]})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_origin_required_by_default() {
        let config = SimulatorConfig {
            http_rate_limit_per_second: None,
            allowed_http_origins: vec!["https://rollquest.example".to_string()],
            ..SimulatorConfig::default()
        };
        let simulator = Arc::new(Simulator::new(config));
        let app = Api::new(simulator.clone()).router();
        if std::env::var("ALLOW_HTTP_NO_ORIGIN").is_ok()
            || std::env::var("ALLOWED_HTTP_ORIGINS").is_ok()
        {
            return;
        }
        let response = app.clone().oneshot(get("/healthz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let allowed = HttpRequest::builder()
            .uri("/healthz")
            .header(header::ORIGIN, "https://rollquest.example")
            .body(Body::empty())
            .unwrap();
        assert_eq!(app.oneshot(allowed).await.unwrap().status(), StatusCode::OK);
        assert_eq!(simulator.http_metrics_snapshot().reject_origin, 1);
    }
}
