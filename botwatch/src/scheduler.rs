use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A unit of periodic work. Job bodies live outside this crate; the scheduler
/// only owns their cadence.
#[async_trait]
pub trait Job: Send + Sync {
    async fn run(&self);
}

#[derive(Clone)]
pub struct JobSpec {
    pub name: String,
    pub interval: Duration,
    pub task: Arc<dyn Job>,
}

#[async_trait]
pub trait Scheduler {
    fn is_running(&self) -> bool;

    /// Idempotent: registering a job under an existing name replaces the
    /// previous definition, it never duplicates it.
    fn register(&self, jobs: Vec<JobSpec>);

    async fn start(&self);

    async fn stop(&self);
}

struct Runner {
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

#[derive(Default)]
struct Inner {
    jobs: HashMap<String, JobSpec>,
    runner: Option<Runner>,
}

/// Runs each registered job on its own tokio task, on a fixed interval, until
/// stopped. Start and stop are safe to call redundantly.
#[derive(Default)]
pub struct TaskScheduler {
    inner: Mutex<Inner>,
}

impl TaskScheduler {
    pub fn new() -> TaskScheduler {
        Self::default()
    }

    /// Names of the currently registered jobs, for startup diagnostics.
    pub fn job_names(&self) -> Vec<String> {
        let inner = self.lock_inner();
        let mut names: Vec<String> = inner.jobs.keys().cloned().collect();
        names.sort();
        names
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

async fn run_job(job: JobSpec, token: CancellationToken) {
    let mut interval = tokio::time::interval(job.interval);
    loop {
        tokio::select! {
            _ = interval.tick() => job.task.run().await,
            _ = token.cancelled() => break,
        }
    }
}

#[async_trait]
impl Scheduler for TaskScheduler {
    fn is_running(&self) -> bool {
        self.lock_inner().runner.is_some()
    }

    fn register(&self, jobs: Vec<JobSpec>) {
        let mut inner = self.lock_inner();
        for job in jobs {
            let name = job.name.clone();
            if inner.jobs.insert(name.clone(), job).is_some() {
                debug!(job = %name, "job was already registered, definition replaced");
            }
        }
    }

    async fn start(&self) {
        let mut inner = self.lock_inner();
        if inner.runner.is_some() {
            info!("scheduler is already running");
            return;
        }

        let token = CancellationToken::new();
        let handles = inner
            .jobs
            .values()
            .cloned()
            .map(|job| {
                debug!(job = %job.name, interval_secs = job.interval.as_secs_f64(), "starting job runner");
                tokio::spawn(run_job(job, token.clone()))
            })
            .collect();

        inner.runner = Some(Runner { token, handles });
        info!(jobs = inner.jobs.len(), "scheduler started");
    }

    async fn stop(&self) {
        let runner = self.lock_inner().runner.take();
        match runner {
            None => info!("scheduler was not running"),
            Some(runner) => {
                runner.token.cancel();
                // A job mid-run finishes its current pass before the runner exits.
                for handle in runner.handles {
                    if let Err(err) = handle.await {
                        warn!(error = %err, "job runner ended abnormally");
                    }
                }
                info!("scheduler stopped");
            }
        }
    }
}
