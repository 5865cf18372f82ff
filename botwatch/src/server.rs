use std::future::Future;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::Config;
use crate::lifecycle::Lifecycle;
use crate::prometheus::setup_metrics_recorder;
use crate::redis::Client;
use crate::router;
use crate::scheduler::{JobSpec, TaskScheduler};

/// Run the service: bring up dependent resources, serve HTTP until the
/// shutdown future resolves and in-flight requests have drained, then tear
/// the resources down. Blocks for the whole process lifetime.
pub async fn serve<F>(
    config: Config,
    listener: TcpListener,
    redis: Arc<dyn Client + Send + Sync>,
    jobs: Vec<JobSpec>,
    api: Router,
    shutdown: F,
) where
    F: Future<Output = ()> + Send + 'static,
{
    let scheduler = Arc::new(TaskScheduler::new());
    let lifecycle = Lifecycle::new(redis.clone(), scheduler.clone(), jobs);

    lifecycle.start().await;
    info!(jobs = ?scheduler.job_names(), "periodic jobs registered");

    // Don't install the recorder unless asked to: installing a global one
    // when botwatch is used as a library (during tests etc) does not work well.
    let metrics = config.export_prometheus.then(setup_metrics_recorder);
    let app = router::router(&config, redis, api, metrics);

    info!("listening on {:?}", listener.local_addr().unwrap());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .unwrap();

    let report = lifecycle.stop().await;
    if report.is_clean() {
        info!("shutdown complete");
    } else {
        warn!(errors = ?report.errors, "shutdown finished with errors");
    }
}
