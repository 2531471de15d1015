use anyhow::{Context, Result};
use clap::Parser;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use rollquest_simulator::{Api, Simulator, SimulatorConfig};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() -> Result<()> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .ok()
        .and_then(|value| {
            let trimmed = value.trim().to_string();
            (!trimmed.is_empty()).then_some(trimmed)
        });

    if let Some(endpoint) = endpoint {
        let service_name = std::env::var("OTEL_SERVICE_NAME")
            .unwrap_or_else(|_| "rollquest-simulator".to_string());
        let rate = std::env::var("OTEL_SAMPLING_RATE")
            .ok()
            .and_then(|value| value.parse::<f64>().ok())
            .map(|value| value.clamp(0.0, 1.0))
            .unwrap_or(1.0);
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .with_endpoint(endpoint)
            .build()
            .context("failed to build OTLP exporter")?;
        let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
            .with_sampler(opentelemetry_sdk::trace::Sampler::TraceIdRatioBased(rate))
            .with_resource(
                opentelemetry_sdk::Resource::builder_empty()
                    .with_attributes([opentelemetry::KeyValue::new("service.name", service_name)])
                    .build(),
            )
            .with_batch_exporter(exporter)
            .build();
        let tracer = tracer_provider.tracer("rollquest-simulator");
        opentelemetry::global::set_tracer_provider(tracer_provider);

        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_filter(LevelFilter::INFO))
            .with(tracing_opentelemetry::layer().with_tracer(tracer))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    Ok(())
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host interface to bind (default: localhost).
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Seed for the service RNG; makes rolls and unseeded simulations reproducible.
    #[arg(long)]
    seed: Option<u64>,

    /// Maximum trials in a single simulation.
    #[arg(long)]
    max_trials: Option<u64>,

    /// Maximum simulations in one batch.
    #[arg(long)]
    max_batch_simulations: Option<u64>,

    /// Maximum trials per batch simulation.
    #[arg(long)]
    max_batch_trials: Option<u64>,

    /// Maximum rolls in a convergence run.
    #[arg(long)]
    max_convergence_trials: Option<u64>,

    /// Balance new sessions start with.
    #[arg(long)]
    starting_balance: Option<f64>,

    /// Rounds of history kept per session (default: 100, 0 disables limit).
    #[arg(long)]
    session_history_limit: Option<usize>,

    /// Live sessions kept before the least recently used is evicted (0 disables limit).
    #[arg(long)]
    max_sessions: Option<usize>,

    /// HTTP requests per second per IP (0 disables rate limiting).
    #[arg(long)]
    http_rate_limit_per_second: Option<u64>,

    /// HTTP burst size per IP (0 disables rate limiting).
    #[arg(long)]
    http_rate_limit_burst: Option<u32>,

    /// Maximum request body size in bytes (0 disables limit).
    #[arg(long)]
    http_body_limit_bytes: Option<usize>,
}

fn is_production() -> bool {
    matches!(
        std::env::var("NODE_ENV").as_deref(),
        Ok("production") | Ok("prod")
    )
}

/// Maps an optional arg value to Option: 0 => None, Some(v) => Some(v), None => default
fn map_optional_limit<T: Copy + PartialEq + From<u8>>(
    arg: Option<T>,
    default: Option<T>,
) -> Option<T> {
    match arg {
        Some(v) if v == T::from(0) => None,
        Some(v) => Some(v),
        None => default,
    }
}

fn positive_ceiling(name: &str, arg: Option<u64>, default: u64) -> Result<u64> {
    match arg {
        Some(0) => anyhow::bail!("{name} must be > 0 when set"),
        Some(value) => Ok(value),
        None => Ok(default),
    }
}

fn build_config(args: &Args) -> Result<SimulatorConfig> {
    let defaults = SimulatorConfig::default();
    let starting_balance = args.starting_balance.unwrap_or(defaults.starting_balance);
    if !starting_balance.is_finite() || starting_balance <= 0.0 {
        anyhow::bail!("starting_balance must be positive");
    }

    Ok(SimulatorConfig {
        seed: args.seed.or(defaults.seed),
        max_trials: positive_ceiling("max_trials", args.max_trials, defaults.max_trials)?,
        max_batch_simulations: positive_ceiling(
            "max_batch_simulations",
            args.max_batch_simulations,
            defaults.max_batch_simulations,
        )?,
        max_batch_trials: positive_ceiling(
            "max_batch_trials",
            args.max_batch_trials,
            defaults.max_batch_trials,
        )?,
        max_convergence_trials: positive_ceiling(
            "max_convergence_trials",
            args.max_convergence_trials,
            defaults.max_convergence_trials,
        )?,
        starting_balance,
        session_history_limit: map_optional_limit(
            args.session_history_limit,
            defaults.session_history_limit,
        ),
        max_sessions: map_optional_limit(args.max_sessions, defaults.max_sessions),
        http_rate_limit_per_second: map_optional_limit(
            args.http_rate_limit_per_second,
            defaults.http_rate_limit_per_second,
        ),
        http_rate_limit_burst: map_optional_limit(
            args.http_rate_limit_burst,
            defaults.http_rate_limit_burst,
        ),
        http_body_limit_bytes: map_optional_limit(
            args.http_body_limit_bytes,
            defaults.http_body_limit_bytes,
        ),
        allowed_http_origins: defaults.allowed_http_origins,
        allow_http_no_origin: defaults.allow_http_no_origin,
    })
}

fn require_env(var: &str) -> Result<String> {
    let value = std::env::var(var).unwrap_or_default();
    if value.trim().is_empty() {
        anyhow::bail!("Missing required env: {var}");
    }
    Ok(value)
}

fn require_positive_u64(var: &str) -> Result<()> {
    let value = require_env(var)?;
    let parsed: u64 = value
        .parse()
        .with_context(|| format!("Invalid {var}: {value}"))?;
    if parsed == 0 {
        anyhow::bail!("Invalid {var}: {value}");
    }
    Ok(())
}

fn ensure_production_env() -> Result<()> {
    if !is_production() {
        return Ok(());
    }

    require_env("ALLOWED_HTTP_ORIGINS")?;
    require_positive_u64("RATE_LIMIT_HTTP_PER_SEC")?;
    require_positive_u64("RATE_LIMIT_HTTP_BURST")?;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse args
    let args = Args::parse();

    // Create logger
    init_tracing()?;

    ensure_production_env()?;

    let config = build_config(&args)?;
    info!(
        max_trials = config.max_trials,
        max_batch_simulations = config.max_batch_simulations,
        max_convergence_trials = config.max_convergence_trials,
        "simulator config loaded"
    );
    let simulator = Arc::new(Simulator::new(config));
    let api = Api::new(simulator);
    let app = api.router();

    // Start server
    let addr = SocketAddr::new(args.host, args.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on {}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .context("axum server error")?;

    Ok(())
}
