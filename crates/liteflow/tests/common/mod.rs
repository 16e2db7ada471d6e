use std::path::PathBuf;
use std::time::Duration;

use sqlx::SqlitePool;
use tempfile::TempDir;

use liteflow::jobs::executor::ExecResult;
use liteflow::jobs::model::{Job, JobState, NewJob};
use liteflow::jobs::{JobsRepo, SettingsRepo};
use liteflow::{Config, Engine};

/// A private store per test: no shared state, no serialization needed.
pub struct TestStore {
    pub pool: SqlitePool,
    pub jobs: JobsRepo,
    pub settings: SettingsRepo,
    pub config: Config,
    pub dir: TempDir,
}

pub async fn setup_store() -> TestStore {
    let dir = TempDir::new().expect("tempdir");
    let config = test_config(dir.path().join("liteflow.db"));

    let pool = liteflow::db::make_pool(&config.db_path).await.expect("pool");
    liteflow::db::init_schema(&pool).await.expect("schema");

    TestStore {
        jobs: JobsRepo::new(pool.clone()),
        settings: SettingsRepo::new(pool.clone()),
        pool,
        config,
        dir,
    }
}

/// Fast polling so end-to-end tests settle quickly.
pub fn test_config(db_path: PathBuf) -> Config {
    Config {
        db_path,
        idle_poll_ms: 25,
        job_pause_ms: 5,
    }
}

/// A second engine handle over the same store file, for tests that move one
/// into a worker task while asserting through the other.
#[allow(dead_code)]
pub async fn open_engine(store: &TestStore) -> Engine {
    Engine::open(store.config.clone()).await.expect("engine")
}

#[allow(dead_code)]
pub async fn enqueue_cmd(
    jobs: &JobsRepo,
    command: &str,
    max_retries: i64,
    delay_sec: i64,
    timeout_sec: i64,
    priority: i64,
) -> String {
    jobs.enqueue(NewJob {
        command: command.to_string(),
        max_retries,
        delay_sec,
        timeout_sec,
        priority,
    })
    .await
    .expect("enqueue")
}

#[allow(dead_code)]
pub async fn get(jobs: &JobsRepo, id: &str) -> Job {
    jobs.get_job(id).await.expect("get").expect("job exists")
}

/// Force a pending job to be eligible right now.
#[allow(dead_code)]
pub async fn make_eligible(pool: &SqlitePool, id: &str) {
    sqlx::query("UPDATE jobs SET run_after = 0 WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await
        .expect("make eligible");
}

/// Age a processing job as if its worker died `secs` seconds ago.
#[allow(dead_code)]
pub async fn age_processing(pool: &SqlitePool, id: &str, secs: i64) {
    sqlx::query("UPDATE jobs SET updated_at = updated_at - ?2 WHERE id = ?1")
        .bind(id)
        .bind(secs)
        .execute(pool)
        .await
        .expect("age job");
}

#[allow(dead_code)]
pub async fn wait_for_state(jobs: &JobsRepo, id: &str, state: JobState, deadline: Duration) -> Job {
    let start = std::time::Instant::now();
    loop {
        let job = get(jobs, id).await;
        if job.state == state {
            return job;
        }
        if start.elapsed() > deadline {
            panic!("job {id} stuck in {} (wanted {state})", job.state);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[allow(dead_code)]
pub fn fake_success() -> ExecResult {
    ExecResult {
        success: true,
        exit_code: Some(0),
        stdout: "ok\n".to_string(),
        stderr: String::new(),
        runtime_sec: 0,
        killed_by_timeout: false,
    }
}

#[allow(dead_code)]
pub fn fake_failure(exit_code: i64, stderr: &str) -> ExecResult {
    ExecResult {
        success: false,
        exit_code: Some(exit_code),
        stdout: String::new(),
        stderr: stderr.to_string(),
        runtime_sec: 0,
        killed_by_timeout: false,
    }
}

#[allow(dead_code)]
pub fn fake_timeout(runtime_sec: i64) -> ExecResult {
    ExecResult {
        success: false,
        exit_code: None,
        stdout: String::new(),
        stderr: String::new(),
        runtime_sec,
        killed_by_timeout: true,
    }
}
