use std::sync::Arc;

use envconfig::Envconfig;
use tokio::signal;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use botwatch::config::Config;
use botwatch::redis::{Client, RedisClient};
use botwatch::server::serve;

mod jobs;

async fn shutdown() {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("failed to register SIGTERM handler");

    let mut interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .expect("failed to register SIGINT handler");

    tokio::select! {
        _ = term.recv() => {},
        _ = interrupt.recv() => {},
    };

    tracing::info!("Shutting down gracefully...");
}

#[tokio::main]
async fn main() {
    let config = Config::init_from_env().expect("Invalid configuration:");

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    // Error reporting is init-only: the integration hooks panics and error
    // events on its own, nothing else in the process calls into it.
    let _sentry_guard = config.sentry_dsn.clone().map(|dsn| {
        let guard = sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                environment: Some(config.environment.clone().into()),
                traces_sample_rate: config.sentry_traces_sample_rate,
                ..Default::default()
            },
        ));
        tracing::info!("sentry initialized");
        guard
    });

    tracing::info!(
        project = %config.project_name,
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        debug = config.debug,
        "starting"
    );

    let redis: Arc<dyn Client + Send + Sync> = Arc::new(
        RedisClient::new(config.redis_url.clone()).expect("failed to create redis client"),
    );
    let jobs = jobs::monitoring_jobs(redis.clone(), &config);

    let listener = tokio::net::TcpListener::bind(config.bind())
        .await
        .expect("could not bind port");

    // Instance-monitoring API routes are mounted here once they exist; the
    // shell only guarantees them CORS, tracing and request metrics.
    serve(config, listener, redis, jobs, axum::Router::new(), shutdown()).await;
}
