use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::db;
use crate::error::EngineError;
use crate::jobs::executor;
use crate::jobs::model::{Job, JobState, NewJob};
use crate::jobs::repo::JobsRepo;
use crate::jobs::settings::{self, SettingsRepo};
use crate::jobs::worker::WorkerPool;

/// Outcome of a replay request.
#[derive(Debug)]
pub enum Replay {
    /// Dry run: the command that would be executed.
    DryRun(String),
    /// The replayed child has finished with this exit code.
    Executed { exit_code: Option<i32> },
}

/// Engine-scoped state: the store handle and the in-process stop flag.
/// Owned here and passed explicitly to workers; the only process-wide
/// registration is the OS signal handler.
pub struct Engine {
    config: Config,
    jobs: JobsRepo,
    settings: SettingsRepo,
    stop: Arc<AtomicBool>,
}

impl Engine {
    pub async fn open(config: Config) -> anyhow::Result<Self> {
        let pool = db::make_pool(&config.db_path).await?;
        db::init_schema(&pool).await?;

        Ok(Self {
            config,
            jobs: JobsRepo::new(pool.clone()),
            settings: SettingsRepo::new(pool),
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn jobs(&self) -> &JobsRepo {
        &self.jobs
    }

    pub fn settings(&self) -> &SettingsRepo {
        &self.settings
    }

    pub async fn enqueue(&self, job: NewJob) -> anyhow::Result<String> {
        self.jobs.enqueue(job).await
    }

    /// Run `count` workers in the foreground until they observe a stop
    /// signal (SIGINT/SIGTERM or the persisted `stop_workers` flag).
    ///
    /// Clears the persisted stop flag, runs the recovery sweep, then starts
    /// the pool. Returns once every worker has exited.
    pub async fn start_workers(&self, count: usize) -> anyhow::Result<()> {
        self.settings.set(settings::STOP_WORKERS, "0").await?;
        self.stop.store(false, Ordering::SeqCst);

        self.recovery_sweep().await?;

        let stop = Arc::clone(&self.stop);
        tokio::spawn(async move {
            shutdown_signal().await;
            tracing::info!("shutdown signal received, workers will finish their current job");
            stop.store(true, Ordering::SeqCst);
        });

        let pool = WorkerPool::new(
            self.jobs.clone(),
            self.settings.clone(),
            Arc::clone(&self.stop),
            Duration::from_millis(self.config.idle_poll_ms),
            Duration::from_millis(self.config.job_pause_ms),
        );
        pool.run(count).await;

        Ok(())
    }

    /// Ask all live workers (this process or any other sharing the store) to
    /// exit after their current job.
    pub async fn stop_workers(&self) -> anyhow::Result<()> {
        self.settings.set(settings::STOP_WORKERS, "1").await
    }

    /// Reclaim jobs stuck in `processing` past the configured lock timeout.
    /// Runs once per process start, before any worker picks.
    async fn recovery_sweep(&self) -> anyhow::Result<()> {
        let lock_timeout = self.settings.lock_timeout().await?;
        let reclaimed = self.jobs.reclaim_stale(lock_timeout).await?;
        if reclaimed > 0 {
            tracing::info!(
                reclaimed,
                lock_timeout,
                "recovery sweep returned stale processing jobs to pending"
            );
        }
        Ok(())
    }

    /// Resurrect a dead job. Errors when the id is unknown or the job is not
    /// in the dead letter queue; no mutation happens in either case.
    pub async fn dlq_retry(&self, id: &str) -> anyhow::Result<()> {
        let job = self
            .jobs
            .get_job(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;

        if job.state != JobState::Dead {
            return Err(EngineError::IllegalTransition {
                id: id.to_string(),
                state: job.state,
                expected: JobState::Dead,
            }
            .into());
        }

        self.jobs.retry_from_dlq(id).await?;
        tracing::info!(job = %id, "dead job returned to pending");
        Ok(())
    }

    /// Re-run a job's original command. The dry run only reports the
    /// command; a confirmed replay spawns a fresh child with inherited
    /// stdio, outside the queue, and mutates no job state.
    pub async fn replay(&self, id: &str, confirm: bool) -> anyhow::Result<Replay> {
        let job = self
            .jobs
            .get_job(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;

        if !confirm {
            return Ok(Replay::DryRun(job.replayable_cmd));
        }

        let status = executor::run_inherited(&job.replayable_cmd).await?;
        Ok(Replay::Executed {
            exit_code: status.code(),
        })
    }

    pub async fn show(&self, id: &str) -> anyhow::Result<Job> {
        let job = self
            .jobs
            .get_job(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        Ok(job)
    }

    /// Deterministic bulk enqueue for smoke-testing the pipeline: every
    /// `k`-th job fails, the rest succeed.
    pub async fn seed_test_jobs(&self, count: i64, fail_rate: f64) -> anyhow::Result<Vec<String>> {
        let stride = failure_stride(fail_rate);
        let mut ids = Vec::with_capacity(count.max(0) as usize);

        for i in 0..count.max(0) {
            let command = if i % stride == 0 {
                "exit 1".to_string()
            } else {
                format!("echo job-{i}")
            };
            let id = self
                .jobs
                .enqueue(NewJob {
                    command,
                    max_retries: 3,
                    delay_sec: 0,
                    timeout_sec: 5,
                    priority: 0,
                })
                .await?;
            ids.push(id);
        }

        Ok(ids)
    }
}

/// `k = max(1, round(1 / max(0.01, fail_rate)))`
pub fn failure_stride(fail_rate: f64) -> i64 {
    let rate = fail_rate.max(0.01);
    ((1.0 / rate).round() as i64).max(1)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
