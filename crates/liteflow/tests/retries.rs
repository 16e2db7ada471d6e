mod common;

use common::{enqueue_cmd, fake_failure, fake_success, fake_timeout, get, make_eligible, setup_store};
use liteflow::jobs::model::{now_epoch, JobState};
use liteflow::jobs::settings::BACKOFF_BASE;
use liteflow::jobs::JobRunner;

#[tokio::test]
async fn failure_reschedules_with_exponential_backoff() {
    let store = setup_store().await;
    let runner = JobRunner::new(store.jobs.clone(), store.settings.clone());

    let id = enqueue_cmd(&store.jobs, "exit 1", 5, 0, 0, 0).await;
    let job = store.jobs.pick_and_lock().await.unwrap().expect("claimed");

    let before = now_epoch();
    runner.apply_outcome(&job, &fake_failure(1, "")).await.unwrap();

    let job = get(&store.jobs, &id).await;
    assert_eq!(job.state, JobState::Pending);
    assert_eq!(job.attempts, 1);
    assert_eq!(job.last_error.as_deref(), Some("exit 1"));
    // delay = floor(2^1) = 2
    assert!(job.run_after - before >= 1, "run_after too early: {}", job.run_after - before);
}

#[tokio::test]
async fn backoff_base_is_read_fresh_on_every_retry() {
    let store = setup_store().await;
    let runner = JobRunner::new(store.jobs.clone(), store.settings.clone());

    let id = enqueue_cmd(&store.jobs, "exit 1", 5, 0, 0, 0).await;

    let job = store.jobs.pick_and_lock().await.unwrap().expect("claimed");
    runner.apply_outcome(&job, &fake_failure(1, "")).await.unwrap();

    // Tune the base while the job is waiting; the next retry must honor it.
    store.settings.set(BACKOFF_BASE, "3").await.unwrap();
    make_eligible(&store.pool, &id).await;

    let job = store.jobs.pick_and_lock().await.unwrap().expect("claimed");
    let before = now_epoch();
    runner.apply_outcome(&job, &fake_failure(1, "")).await.unwrap();

    let job = get(&store.jobs, &id).await;
    assert_eq!(job.attempts, 2);
    // delay = floor(3^2) = 9
    assert!(job.run_after - before >= 8, "expected fresh base: {}", job.run_after - before);
}

#[tokio::test]
async fn exhausted_retries_promote_to_dead() {
    let store = setup_store().await;
    let runner = JobRunner::new(store.jobs.clone(), store.settings.clone());

    let id = enqueue_cmd(&store.jobs, "exit 1", 2, 0, 0, 0).await;

    let job = store.jobs.pick_and_lock().await.unwrap().expect("claimed");
    runner.apply_outcome(&job, &fake_failure(1, "")).await.unwrap();
    assert_eq!(get(&store.jobs, &id).await.state, JobState::Pending);

    make_eligible(&store.pool, &id).await;
    let job = store.jobs.pick_and_lock().await.unwrap().expect("claimed");
    runner.apply_outcome(&job, &fake_failure(1, "")).await.unwrap();

    let job = get(&store.jobs, &id).await;
    assert_eq!(job.state, JobState::Dead);
    assert_eq!(job.last_error.as_deref(), Some("exit 1"));
    // The fatal attempt is not counted; the cap is what exhausted it.
    assert_eq!(job.attempts, 1);
    assert!(job.attempts + 1 >= job.max_retries);
}

#[tokio::test]
async fn max_retries_one_dies_on_first_failure() {
    let store = setup_store().await;
    let runner = JobRunner::new(store.jobs.clone(), store.settings.clone());

    let id = enqueue_cmd(&store.jobs, "exit 1", 1, 0, 0, 0).await;
    let job = store.jobs.pick_and_lock().await.unwrap().expect("claimed");
    runner.apply_outcome(&job, &fake_failure(1, "")).await.unwrap();

    let job = get(&store.jobs, &id).await;
    assert_eq!(job.state, JobState::Dead);
    assert_eq!(job.attempts, 0);
}

#[tokio::test]
async fn max_retries_zero_dies_on_first_failure() {
    let store = setup_store().await;
    let runner = JobRunner::new(store.jobs.clone(), store.settings.clone());

    let id = enqueue_cmd(&store.jobs, "exit 1", 0, 0, 0, 0).await;
    let job = store.jobs.pick_and_lock().await.unwrap().expect("claimed");
    runner.apply_outcome(&job, &fake_failure(1, "")).await.unwrap();

    assert_eq!(get(&store.jobs, &id).await.state, JobState::Dead);
}

#[tokio::test]
async fn timeout_failure_records_timeout_error_and_null_exit_code() {
    let store = setup_store().await;
    let runner = JobRunner::new(store.jobs.clone(), store.settings.clone());

    let id = enqueue_cmd(&store.jobs, "sleep 60", 1, 0, 2, 0).await;
    let job = store.jobs.pick_and_lock().await.unwrap().expect("claimed");

    let result = fake_timeout(2);
    store.jobs.write_trace(&id, &result).await.unwrap();
    runner.apply_outcome(&job, &result).await.unwrap();

    let job = get(&store.jobs, &id).await;
    assert_eq!(job.state, JobState::Dead);
    assert_eq!(job.last_error.as_deref(), Some("Timeout after 2s"));
    assert_eq!(job.exit_code, None);
    assert_eq!(job.runtime_sec, Some(2));
    assert!(job.trace_created_at.is_some());
}

#[tokio::test]
async fn stderr_is_preferred_over_exit_code_in_last_error() {
    let store = setup_store().await;
    let runner = JobRunner::new(store.jobs.clone(), store.settings.clone());

    let id = enqueue_cmd(&store.jobs, "exit 1", 1, 0, 0, 0).await;
    let job = store.jobs.pick_and_lock().await.unwrap().expect("claimed");
    runner
        .apply_outcome(&job, &fake_failure(1, "disk full\n"))
        .await
        .unwrap();

    assert_eq!(
        get(&store.jobs, &id).await.last_error.as_deref(),
        Some("disk full")
    );
}

#[tokio::test]
async fn success_completes_and_leaves_attempts_untouched() {
    let store = setup_store().await;
    let runner = JobRunner::new(store.jobs.clone(), store.settings.clone());

    let id = enqueue_cmd(&store.jobs, "echo ok", 3, 0, 0, 0).await;

    // One failure first, then a success on the retry.
    let job = store.jobs.pick_and_lock().await.unwrap().expect("claimed");
    runner.apply_outcome(&job, &fake_failure(1, "")).await.unwrap();
    make_eligible(&store.pool, &id).await;

    let job = store.jobs.pick_and_lock().await.unwrap().expect("claimed");
    runner.apply_outcome(&job, &fake_success()).await.unwrap();

    let job = get(&store.jobs, &id).await;
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.attempts, 1);
}

#[tokio::test]
async fn trace_reflects_only_the_most_recent_attempt() {
    let store = setup_store().await;

    let id = enqueue_cmd(&store.jobs, "echo ok", 3, 0, 0, 0).await;

    store
        .jobs
        .write_trace(&id, &fake_failure(1, "first failure"))
        .await
        .unwrap();
    store.jobs.write_trace(&id, &fake_success()).await.unwrap();

    let job = get(&store.jobs, &id).await;
    assert_eq!(job.exit_code, Some(0));
    assert_eq!(job.stderr.as_deref(), Some(""));
    assert_eq!(job.stdout.as_deref(), Some("ok\n"));
}
