use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::redis::{probe, Client, CustomRedisError};
use crate::scheduler::{JobSpec, Scheduler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Starting,
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("failed to release cache connection: {0}")]
    Release(#[from] CustomRedisError),
}

#[derive(Debug)]
pub struct StartupReport {
    pub cache_ok: bool,
}

#[derive(Debug, Default)]
pub struct ShutdownReport {
    pub errors: Vec<LifecycleError>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Sequences resource bring-up and teardown around the process lifetime.
///
/// Both `start` and `stop` are best-effort: every step is attempted, failures
/// are logged and accumulated into the returned report, and nothing is
/// retried. Repeated invocations are safe because idempotency is derived from
/// the collaborators themselves (the scheduler's running flag, the cache
/// handle's connection state), not from an orchestrator-local flag.
pub struct Lifecycle {
    redis: Arc<dyn Client + Send + Sync>,
    scheduler: Arc<dyn Scheduler + Send + Sync>,
    jobs: Vec<JobSpec>,
    state: Mutex<LifecycleState>,
}

impl Lifecycle {
    pub fn new(
        redis: Arc<dyn Client + Send + Sync>,
        scheduler: Arc<dyn Scheduler + Send + Sync>,
        jobs: Vec<JobSpec>,
    ) -> Lifecycle {
        Lifecycle {
            redis,
            scheduler,
            jobs,
            state: Mutex::new(LifecycleState::Uninitialized),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.lock_state()
    }

    fn lock_state(&self) -> MutexGuard<'_, LifecycleState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn transition(&self, next: LifecycleState) {
        let mut state = self.lock_state();
        debug!(from = ?*state, to = ?next, "lifecycle transition");
        *state = next;
    }

    /// Bring up dependent resources: verify the cache, register the periodic
    /// jobs, start the scheduler. Reaching `Running` does not require the
    /// cache to be healthy — a down dependency degrades, it does not crash.
    pub async fn start(&self) -> StartupReport {
        self.transition(LifecycleState::Starting);

        let cache_ok = probe(self.redis.as_ref()).await;
        if cache_ok {
            info!("cache connection verified on startup");
        } else {
            warn!("cache unreachable on startup, continuing degraded");
        }

        self.scheduler.register(self.jobs.clone());

        if self.scheduler.is_running() {
            info!("scheduler was already running");
        } else {
            self.scheduler.start().await;
        }

        self.transition(LifecycleState::Running);
        StartupReport { cache_ok }
    }

    /// Tear down in the mirrored order: scheduler first, since its jobs may
    /// still be using the cache, then the cache connection. Always runs to
    /// completion; release errors are captured in the report.
    pub async fn stop(&self) -> ShutdownReport {
        self.transition(LifecycleState::Stopping);
        let mut report = ShutdownReport::default();

        if self.scheduler.is_running() {
            self.scheduler.stop().await;
        } else {
            info!("scheduler was not running, nothing to stop");
        }

        if self.redis.is_connected() {
            match self.redis.release().await {
                Ok(()) => info!("cache connection released"),
                Err(err) => {
                    warn!(error = %err, "failed to release cache connection");
                    report.errors.push(LifecycleError::Release(err));
                }
            }
        } else {
            info!("no live cache connection to release");
        }

        self.transition(LifecycleState::Stopped);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redis::{MockRedisCall, MockRedisClient};
    use crate::scheduler::{Job, TaskScheduler};
    use async_trait::async_trait;
    use std::time::Duration;

    struct NoopJob;

    #[async_trait]
    impl Job for NoopJob {
        async fn run(&self) {}
    }

    fn job(name: &str) -> JobSpec {
        JobSpec {
            name: name.to_string(),
            interval: Duration::from_secs(60),
            task: Arc::new(NoopJob),
        }
    }

    fn lifecycle_with(
        mock: MockRedisClient,
        jobs: Vec<JobSpec>,
    ) -> (Lifecycle, Arc<TaskScheduler>) {
        let scheduler = Arc::new(TaskScheduler::new());
        let lifecycle = Lifecycle::new(Arc::new(mock), scheduler.clone(), jobs);
        (lifecycle, scheduler)
    }

    #[tokio::test]
    async fn start_brings_up_scheduler_and_reports_cache() {
        let mock = MockRedisClient::new();
        let (lifecycle, scheduler) = lifecycle_with(mock, vec![job("poll_instances")]);
        assert_eq!(lifecycle.state(), LifecycleState::Uninitialized);

        let report = lifecycle.start().await;

        assert!(report.cache_ok);
        assert!(scheduler.is_running());
        assert_eq!(scheduler.job_names(), vec!["poll_instances".to_string()]);
        assert_eq!(lifecycle.state(), LifecycleState::Running);
    }

    #[tokio::test]
    async fn start_twice_registers_jobs_once_and_keeps_scheduler_running() {
        let mock = MockRedisClient::new();
        let (lifecycle, scheduler) = lifecycle_with(mock, vec![job("poll_instances")]);

        lifecycle.start().await;
        lifecycle.start().await;

        assert!(scheduler.is_running());
        assert_eq!(scheduler.job_names(), vec!["poll_instances".to_string()]);
    }

    #[tokio::test]
    async fn start_survives_an_unreachable_cache() {
        let mock = MockRedisClient::new().ping_ret(Err(CustomRedisError::Timeout));
        let (lifecycle, scheduler) = lifecycle_with(mock, vec![job("poll_instances")]);

        let report = lifecycle.start().await;

        assert!(!report.cache_ok);
        assert!(scheduler.is_running());
        assert_eq!(lifecycle.state(), LifecycleState::Running);
    }

    #[tokio::test]
    async fn stop_without_start_touches_nothing() {
        let mock = MockRedisClient::new();
        let (lifecycle, scheduler) = lifecycle_with(mock.clone(), vec![job("poll_instances")]);

        let report = lifecycle.stop().await;

        assert!(report.is_clean());
        assert!(!scheduler.is_running());
        assert!(mock.get_calls().is_empty());
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn stop_releases_the_connection_once() {
        let mock = MockRedisClient::new();
        let (lifecycle, scheduler) = lifecycle_with(mock.clone(), vec![job("poll_instances")]);

        lifecycle.start().await;
        let report = lifecycle.stop().await;

        assert!(report.is_clean());
        assert!(!scheduler.is_running());
        assert_eq!(
            mock.get_calls(),
            vec![MockRedisCall::Ping, MockRedisCall::Release]
        );
    }

    #[tokio::test]
    async fn stop_completes_even_when_release_fails() {
        let mock = MockRedisClient::new().release_ret(Err(CustomRedisError::Timeout));
        let (lifecycle, scheduler) = lifecycle_with(mock, vec![job("poll_instances")]);

        lifecycle.start().await;
        let report = lifecycle.stop().await;

        assert_eq!(report.errors.len(), 1);
        assert!(!scheduler.is_running());
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
    }
}
