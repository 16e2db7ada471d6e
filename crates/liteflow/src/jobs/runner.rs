use crate::jobs::executor::ExecResult;
use crate::jobs::model::{now_epoch, Job};
use crate::jobs::repo::JobsRepo;
use crate::jobs::retry::backoff_delay_secs;
use crate::jobs::settings::SettingsRepo;

/// Applies the post-execution state transition for one finished attempt.
#[derive(Clone)]
pub struct JobRunner {
    jobs: JobsRepo,
    settings: SettingsRepo,
}

impl JobRunner {
    pub fn new(jobs: JobsRepo, settings: SettingsRepo) -> Self {
        Self { jobs, settings }
    }

    /// Success completes the job. A failure either reschedules it with
    /// exponential backoff or, once `attempts + 1` reaches `max_retries`,
    /// promotes it to the dead letter queue.
    pub async fn apply_outcome(&self, job: &Job, result: &ExecResult) -> anyhow::Result<()> {
        if result.success {
            self.jobs.mark_completed(&job.id).await?;
            tracing::info!(job = %job.id, runtime_sec = result.runtime_sec, "job completed");
            return Ok(());
        }

        let last_error = last_error_for(job, result);
        let next = job.attempts + 1;

        if next >= job.max_retries {
            self.jobs.mark_dead(&job.id, &last_error).await?;
            tracing::warn!(
                job = %job.id,
                attempts = next,
                error = %last_error,
                "retries exhausted, job moved to dead letter queue"
            );
        } else {
            // Read fresh so operators can tune the base while workers run.
            let base = self.settings.backoff_base().await?;
            let delay = backoff_delay_secs(base, next);
            let run_after = now_epoch().saturating_add(delay);

            self.jobs
                .reschedule_for_retry(&job.id, next, run_after, &last_error)
                .await?;
            tracing::info!(
                job = %job.id,
                attempt = next,
                delay_sec = delay,
                error = %last_error,
                "job rescheduled for retry"
            );
        }

        Ok(())
    }
}

/// Human-readable reason for a failed attempt: the timeout, else the child's
/// stderr, else its exit code.
pub fn last_error_for(job: &Job, result: &ExecResult) -> String {
    if result.killed_by_timeout {
        return format!("Timeout after {}s", job.timeout_sec);
    }
    let stderr = result.stderr.trim();
    if !stderr.is_empty() {
        stderr.to_string()
    } else {
        format!("exit {}", result.exit_code.unwrap_or(-1))
    }
}
