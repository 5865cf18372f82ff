use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use botwatch::config::Config;
use botwatch::redis::{probe, Client};
use botwatch::scheduler::{Job, JobSpec};

/// Periodically re-probes the shared cache connection so outages show up in
/// the logs and on the `cache_up` gauge between health-endpoint polls.
pub struct CacheHeartbeat {
    redis: Arc<dyn Client + Send + Sync>,
}

#[async_trait]
impl Job for CacheHeartbeat {
    async fn run(&self) {
        if probe(self.redis.as_ref()).await {
            metrics::gauge!("cache_up").set(1.0);
            debug!("cache heartbeat ok");
        } else {
            metrics::gauge!("cache_up").set(0.0);
            warn!("cache heartbeat failed");
        }
    }
}

/// The job set registered at startup. Instance-polling jobs plug in here once
/// their bodies exist; the shell itself only ships the cache heartbeat.
pub fn monitoring_jobs(redis: Arc<dyn Client + Send + Sync>, config: &Config) -> Vec<JobSpec> {
    vec![JobSpec {
        name: "cache_heartbeat".to_string(),
        interval: Duration::from_secs(config.heartbeat_interval_secs),
        task: Arc::new(CacheHeartbeat { redis }),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use botwatch::redis::MockRedisClient;
    use envconfig::Envconfig;

    #[test]
    fn heartbeat_is_always_registered() {
        let config = Config::init_from_hashmap(&std::collections::HashMap::new()).unwrap();
        let jobs = monitoring_jobs(Arc::new(MockRedisClient::new()), &config);

        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].name, "cache_heartbeat");
        assert_eq!(jobs[0].interval, Duration::from_secs(30));
    }
}
