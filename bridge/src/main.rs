use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use niivue_bridge::BridgeConfig;
use niivue_bridge::config::Config;
use niivue_bridge::server::{AppState, viewer_routes, ws_handler};
use serde::Serialize;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application start time for uptime calculation
static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    bundle: &'static str,
    active_instances: usize,
    connected_viewers: usize,
    uptime_seconds: u64,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = START_TIME.get().map(|t| t.elapsed().as_secs()).unwrap_or(0);

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        bundle: if BUNDLE_SERVED.get().copied().unwrap_or(false) {
            "served"
        } else {
            "external"
        },
        active_instances: state.bridge.instance_count().await,
        connected_viewers: state.transport.connection_count().await,
        uptime_seconds: uptime,
    })
}

#[derive(Serialize)]
struct MetricsResponse {
    uptime_seconds: u64,
    version: &'static str,
    /// Number of live viewer instances
    active_instances: usize,
    /// Number of attached viewer connections
    connected_viewers: usize,
}

async fn metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    let uptime = START_TIME.get().map(|t| t.elapsed().as_secs()).unwrap_or(0);

    Json(MetricsResponse {
        uptime_seconds: uptime,
        version: env!("CARGO_PKG_VERSION"),
        active_instances: state.bridge.instance_count().await,
        connected_viewers: state.transport.connection_count().await,
    })
}

/// Prometheus metrics handle for exposing metrics in Prometheus format
static PROMETHEUS_HANDLE: std::sync::OnceLock<PrometheusHandle> = std::sync::OnceLock::new();

/// Whether the viewer bundle is served by this process
static BUNDLE_SERVED: std::sync::OnceLock<bool> = std::sync::OnceLock::new();

fn setup_prometheus_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

async fn prometheus_metrics() -> impl IntoResponse {
    let handle = PROMETHEUS_HANDLE
        .get()
        .expect("Prometheus handle not initialized");
    handle.render()
}

/// Update gauge metrics (called periodically)
async fn update_gauge_metrics(state: &AppState) {
    metrics::gauge!("nvbridge_instances_active").set(state.bridge.instance_count().await as f64);
    metrics::gauge!("nvbridge_ws_connections_active")
        .set(state.transport.connection_count().await as f64);

    let uptime = START_TIME.get().map(|t| t.elapsed().as_secs()).unwrap_or(0);
    metrics::gauge!("nvbridge_uptime_seconds").set(uptime as f64);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Record server start time
    START_TIME.set(Instant::now()).ok();

    // Initialize Prometheus metrics recorder (must be done before any metrics are recorded)
    let prometheus_handle = setup_prometheus_metrics();
    PROMETHEUS_HANDLE.set(prometheus_handle).ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nvbridge=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = Config::from_env();
    info!(
        "Loaded configuration: host={}, port={}, ready_timeout={:?}",
        config.host, config.port, config.bridge.ready_timeout
    );
    if let Some(ref base_url) = config.public_base_url {
        info!("Public base URL: {}", base_url);
    }

    // Create the bridge and its WebSocket-backed transport
    let app_state = AppState::with_bridge_config(BridgeConfig {
        ready_timeout: config.bridge.ready_timeout,
        event_buffer: config.bridge.event_buffer,
    });

    // Periodic update of gauge metrics (every 5 seconds)
    let metrics_state = app_state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            interval.tick().await;
            update_gauge_metrics(&metrics_state).await;
        }
    });

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the router
    let app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/metrics/prometheus", get(prometheus_metrics))
        .route("/ws/:key", get(ws_handler))
        .with_state(app_state.clone())
        .merge(Router::new().nest("/api", viewer_routes(app_state)))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Serve the embedded viewer's prebuilt bundle if configured
    let app = if let Some(ref bundle_dir) = config.bundle.dir {
        if bundle_dir.exists() {
            info!("Serving viewer bundle from: {:?}", bundle_dir);
            BUNDLE_SERVED.set(true).ok();

            // ServeDir with index fallback so the embed page loads for any
            // unmatched route
            let index_path = bundle_dir.join("index.html");
            let serve_dir =
                ServeDir::new(bundle_dir).not_found_service(ServeFile::new(&index_path));

            let static_service = ServiceBuilder::new()
                .layer(CompressionLayer::new())
                .service(serve_dir);

            app.fallback_service(static_service)
        } else {
            warn!(
                "Viewer bundle directory not found: {:?} - bundle serving disabled",
                bundle_dir
            );
            BUNDLE_SERVED.set(false).ok();
            app
        }
    } else {
        info!("Viewer bundle serving disabled (VIEWER_BUNDLE_DIR not set)");
        BUNDLE_SERVED.set(false).ok();
        app
    };

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("nvbridge listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
