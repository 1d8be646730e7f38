use crate::ai::AiClient;
use crate::api;
use crate::api::middleware::{self, IpLimiter};
use crate::config::Config;
use crate::db::ConnectionPool;
use crate::scheduler;
use crate::store::Store;
use crate::upstream::HttpUpstreamClient;
use crate::vector::VectorStore;
use axum::extract::Request;
use axum::{Router, ServiceExt};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal::unix::SignalKind;
use tower::ServiceBuilder;
use tower_http::normalize_path::NormalizePathLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub config: Arc<Config>,
    pub upstream: Arc<HttpUpstreamClient>,
    pub ai: Arc<AiClient>,
    pub vector_store: Arc<VectorStore>,
    pub ip_limiter: Arc<IpLimiter>,
}

impl AppState {
    pub fn new(connection_pool: ConnectionPool, config: Config) -> Self {
        let config = Arc::new(config);
        let upstream = HttpUpstreamClient::new(
            config.upstream_base_url.clone(),
            config.rate_limit.upstream_capacity,
            config.rate_limit.upstream_refill_per_sec,
        );
        let ai = AiClient::new(config.ai_endpoint.clone(), config.ai_api_key.as_deref());
        let vector_store = VectorStore::new(config.vector_store_endpoint.clone(), config.vector_store_api_key.as_deref());
        let ip_limiter = middleware::build_ip_limiter(config.rate_limit.admission_requests_per_window, config.rate_limit.admission_window_secs);
        AppState {
            store: Store::new(connection_pool),
            config,
            upstream: Arc::new(upstream),
            ai: Arc::new(ai),
            vector_store: Arc::new(vector_store),
            ip_limiter,
        }
    }
}

/// Initializes logging using [`tracing_subscriber`].
pub fn enable_tracing(config: &Config) {
    let filter = match EnvFilter::try_new(&config.log_filter) {
        Ok(filter) => filter,
        Err(err) => {
            warn!("Log filter is invalid. Some or all directives may be ignored. Details:\n{err}");
            EnvFilter::new(&config.log_filter)
        }
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();
}

/// Builds the router, spawns the scheduler's background ticks, and serves
/// HTTP until a shutdown signal arrives (spec.md section 2).
pub async fn run(state: AppState) -> std::io::Result<()> {
    let router = api::router(state.clone()).layer(TraceLayer::new_for_http());
    let normalized_router = ServiceBuilder::new().layer(NormalizePathLayer::trim_trailing_slash()).service(router);
    let app = Router::new().fallback_service(normalized_router);

    let scheduler_handles = scheduler::spawn(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    let listener = TcpListener::bind(&address).await?;
    info!(%address, "listening");
    let result = axum::serve(listener, ServiceExt::<Request>::into_make_service(app)).with_graceful_shutdown(shutdown_signal()).await;

    for handle in scheduler_handles {
        handle.abort();
    }
    result
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("Ctrl+C handler must be installable");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(SignalKind::terminate())
            .expect("Signal handler must be installable")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Stopping archivist...");
}
