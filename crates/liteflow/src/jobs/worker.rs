use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::jobs::executor;
use crate::jobs::repo::JobsRepo;
use crate::jobs::runner::JobRunner;
use crate::jobs::settings::SettingsRepo;

/// Launches and supervises a set of concurrent worker loops.
///
/// Workers coordinate only through the store's atomic pick-and-lock; there
/// are no in-process locks, so additional engine processes sharing the same
/// store file behave like additional workers.
pub struct WorkerPool {
    jobs: JobsRepo,
    settings: SettingsRepo,
    stop: Arc<AtomicBool>,
    idle_poll: Duration,
    job_pause: Duration,
}

impl WorkerPool {
    pub fn new(
        jobs: JobsRepo,
        settings: SettingsRepo,
        stop: Arc<AtomicBool>,
        idle_poll: Duration,
        job_pause: Duration,
    ) -> Self {
        Self {
            jobs,
            settings,
            stop,
            idle_poll,
            job_pause,
        }
    }

    /// Run `count` workers until each observes a stop signal. A worker that
    /// hits a store failure terminates alone; its siblings keep running.
    pub async fn run(&self, count: usize) {
        let mut handles = Vec::with_capacity(count);

        for ordinal in 0..count {
            let worker = Worker {
                id: format!("{}-{}", std::process::id(), ordinal),
                jobs: self.jobs.clone(),
                settings: self.settings.clone(),
                runner: JobRunner::new(self.jobs.clone(), self.settings.clone()),
                stop: Arc::clone(&self.stop),
                idle_poll: self.idle_poll,
                job_pause: self.job_pause,
            };
            handles.push(tokio::spawn(worker.run()));
        }

        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "worker terminated on store failure"),
                Err(e) => tracing::error!(error = %e, "worker task panicked"),
            }
        }
    }
}

struct Worker {
    id: String,
    jobs: JobsRepo,
    settings: SettingsRepo,
    runner: JobRunner,
    stop: Arc<AtomicBool>,
    idle_poll: Duration,
    job_pause: Duration,
}

impl Worker {
    async fn run(self) -> anyhow::Result<()> {
        tracing::info!(worker = %self.id, "worker started");

        loop {
            if self.stop.load(Ordering::SeqCst) {
                tracing::info!(worker = %self.id, "shutdown requested, worker exiting");
                break;
            }
            if self.settings.stop_requested().await? {
                tracing::info!(worker = %self.id, "stop_workers flag set, worker exiting");
                break;
            }

            let Some(job) = self.jobs.pick_and_lock().await? else {
                tokio::time::sleep(self.idle_poll).await;
                continue;
            };

            tracing::info!(
                worker = %self.id,
                job = %job.id,
                attempts = job.attempts,
                priority = job.priority,
                "picked job"
            );

            // The claimed job is always finalized, even on failure: the
            // result is absorbed by the state machine, never surfaced.
            let result = executor::execute(&job.command, job.timeout_sec).await;
            self.jobs.write_trace(&job.id, &result).await?;
            self.runner.apply_outcome(&job, &result).await?;

            tokio::time::sleep(self.job_pause).await;
        }

        Ok(())
    }
}
