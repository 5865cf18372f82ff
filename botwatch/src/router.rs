use std::future::ready;
use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::Config;
use crate::health;
use crate::prometheus::{track_metrics, PROMETHEUS_CONTENT_TYPE};
use crate::redis::Client;

#[derive(Clone)]
pub struct State {
    pub redis: Arc<dyn Client + Send + Sync>,
    pub environment: String,
    pub debug: bool,
}

async fn index() -> &'static str {
    "botwatch"
}

/// Assemble the HTTP surface: diagnostics routes plus the externally supplied
/// API router nested under the configured prefix, all behind the tracing,
/// CORS and metrics middleware.
pub fn router(
    config: &Config,
    redis: Arc<dyn Client + Send + Sync>,
    api: Router,
    metrics: Option<PrometheusHandle>,
) -> Router {
    let state = State {
        redis,
        environment: config.environment.clone(),
        debug: config.debug,
    };

    let router = Router::new()
        .route("/", get(index))
        .route("/health", get(health::health_check))
        .with_state(state)
        .nest(&config.api_prefix, api)
        .layer(TraceLayer::new_for_http());

    let router = match cors_layer(config) {
        Some(cors) => router.layer(cors),
        None => router,
    };

    let router = router.layer(axum::middleware::from_fn(track_metrics));

    // Mounted after the middleware stack: scrapes must not count towards the
    // aggregates they render.
    match metrics {
        Some(handle) => router.route(
            "/metrics",
            get(move || {
                ready((
                    [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
                    handle.render(),
                ))
            }),
        ),
        None => router,
    }
}

fn cors_layer(config: &Config) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .filter_map(|origin| {
            let origin = origin.trim();
            if origin.is_empty() {
                return None;
            }
            match origin.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin, "ignoring malformed CORS origin");
                    None
                }
            }
        })
        .collect();

    if origins.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers(AllowHeaders::mirror_request())
            .allow_credentials(true)
            .allow_origin(AllowOrigin::list(origins)),
    )
}
