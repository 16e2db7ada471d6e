use std::path::PathBuf;

/// Runtime configuration, loaded from environment variables with defaults.
#[derive(Clone, Debug)]
pub struct Config {
    /// Path to the SQLite store file.
    pub db_path: PathBuf,
    /// Worker sleep when no job is eligible.
    pub idle_poll_ms: u64,
    /// Worker pause between two consecutive jobs.
    pub job_pause_ms: u64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let db_path = env_nonempty("LITEFLOW_DB")
            .map(PathBuf::from)
            .unwrap_or_else(default_db_path);

        let idle_poll_ms = env_nonempty("LITEFLOW_IDLE_POLL_MS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1_000)
            .clamp(10, 60_000);

        let job_pause_ms = env_nonempty("LITEFLOW_JOB_PAUSE_MS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(200)
            .clamp(0, 10_000);

        Self {
            db_path,
            idle_poll_ms,
            job_pause_ms,
        }
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

/// The store lives next to the engine binary unless overridden.
fn default_db_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("liteflow.db")))
        .unwrap_or_else(|| PathBuf::from("liteflow.db"))
}
