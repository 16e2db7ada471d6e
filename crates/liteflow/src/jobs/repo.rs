use sqlx::SqlitePool;
use uuid::Uuid;

use crate::jobs::executor::ExecResult;
use crate::jobs::model::{now_epoch, Job, JobState, NewJob};

#[derive(Clone)]
pub struct JobsRepo {
    pool: SqlitePool,
}

impl JobsRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ----------------------------
    // Enqueue
    // ----------------------------

    /// Insert a new `pending` job and return its id. `replayable_cmd` is a
    /// verbatim copy of the command, never mutated afterwards.
    pub async fn enqueue(&self, job: NewJob) -> anyhow::Result<String> {
        let id = Uuid::new_v4().to_string();
        let now = now_epoch();
        let run_after = now.saturating_add(job.delay_sec.max(0));

        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, command, state, attempts, max_retries, run_after,
                timeout_sec, priority, created_at, updated_at, replayable_cmd
            )
            VALUES (?1, ?2, ?3, 0, ?4, ?5, ?6, ?7, ?8, ?8, ?2)
            "#,
        )
        .bind(&id)
        .bind(&job.command)
        .bind(JobState::Pending)
        .bind(job.max_retries)
        .bind(run_after)
        .bind(job.timeout_sec)
        .bind(job.priority)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    // ----------------------------
    // Pick-and-lock
    // ----------------------------

    /// Atomically claim one eligible `pending` job for a worker.
    ///
    /// Highest priority wins; within a priority the oldest enqueue wins
    /// (`rowid` breaks epoch-second ties). SQLite serializes writers, so of
    /// two concurrent callers one claims the row and the other observes
    /// `None` and retries on its next tick.
    pub async fn pick_and_lock(&self) -> anyhow::Result<Option<Job>> {
        let now = now_epoch();

        let job = sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs
            SET state = ?1, updated_at = ?2
            WHERE id = (
                SELECT id FROM jobs
                WHERE state = ?3 AND run_after <= ?2
                ORDER BY priority DESC, created_at ASC, rowid ASC
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(JobState::Processing)
        .bind(now)
        .bind(JobState::Pending)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    // ----------------------------
    // Trace persistence
    // ----------------------------

    /// Overwrite the trace fields with the most recent execution. Runs before
    /// the state transition is finalized.
    pub async fn write_trace(&self, id: &str, result: &ExecResult) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET stdout = ?2,
                stderr = ?3,
                exit_code = ?4,
                runtime_sec = ?5,
                trace_created_at = ?6
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(&result.stdout)
        .bind(&result.stderr)
        .bind(result.exit_code)
        .bind(result.runtime_sec)
        .bind(now_epoch())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ----------------------------
    // State transitions
    // ----------------------------

    pub async fn mark_completed(&self, id: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE jobs SET state = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(JobState::Completed)
            .bind(now_epoch())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn reschedule_for_retry(
        &self,
        id: &str,
        attempts: i64,
        run_after: i64,
        last_error: &str,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET state = ?2,
                attempts = ?3,
                run_after = ?4,
                last_error = ?5,
                updated_at = ?6
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(JobState::Pending)
        .bind(attempts)
        .bind(run_after)
        .bind(last_error)
        .bind(now_epoch())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_dead(&self, id: &str, last_error: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET state = ?2,
                last_error = ?3,
                updated_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(JobState::Dead)
        .bind(last_error)
        .bind(now_epoch())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Resurrect a dead job: back to `pending`, attempts reset, error
    /// cleared, eligible immediately. The trace of the fatal attempt is kept
    /// until the next execution overwrites it. Returns the number of rows
    /// changed (0 when the job is not in `dead`).
    pub async fn retry_from_dlq(&self, id: &str) -> anyhow::Result<u64> {
        let now = now_epoch();
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = ?2,
                attempts = 0,
                run_after = ?3,
                last_error = NULL,
                updated_at = ?3
            WHERE id = ?1 AND state = ?4
            "#,
        )
        .bind(id)
        .bind(JobState::Pending)
        .bind(now)
        .bind(JobState::Dead)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    // ----------------------------
    // Reads
    // ----------------------------

    pub async fn get_job(&self, id: &str) -> anyhow::Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    /// Newest first, optionally filtered by state.
    pub async fn list_jobs(&self, state: Option<JobState>) -> anyhow::Result<Vec<Job>> {
        let rows = match state {
            Some(state) => {
                sqlx::query_as::<_, Job>(
                    r#"
                    SELECT * FROM jobs
                    WHERE state = ?1
                    ORDER BY created_at DESC, rowid DESC
                    "#,
                )
                .bind(state)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Job>("SELECT * FROM jobs ORDER BY created_at DESC, rowid DESC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        Ok(rows)
    }

    pub async fn count_by_state(&self) -> anyhow::Result<Vec<(JobState, i64)>> {
        let counts = sqlx::query_as::<_, (JobState, i64)>(
            "SELECT state, COUNT(*) FROM jobs GROUP BY state",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(counts)
    }

    // ----------------------------
    // Crash recovery
    // ----------------------------

    /// Return jobs abandoned in `processing` past `lock_timeout` seconds of
    /// inactivity back to `pending`, eligible immediately. Returns the count.
    pub async fn reclaim_stale(&self, lock_timeout: i64) -> anyhow::Result<u64> {
        let now = now_epoch();
        let cutoff = now.saturating_sub(lock_timeout);

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = ?1, run_after = ?2, updated_at = ?2
            WHERE state = ?3 AND updated_at <= ?4
            "#,
        )
        .bind(JobState::Pending)
        .bind(now)
        .bind(JobState::Processing)
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
