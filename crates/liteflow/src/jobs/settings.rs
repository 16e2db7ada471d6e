use sqlx::SqlitePool;

use crate::jobs::retry;

pub const BACKOFF_BASE: &str = "backoff_base";
pub const LOCK_TIMEOUT: &str = "lock_timeout";
pub const STOP_WORKERS: &str = "stop_workers";

pub const DEFAULT_LOCK_TIMEOUT_SEC: i64 = 3_600;

/// Thin wrapper over the `meta` key/value table.
///
/// Malformed values never error; the typed accessors fall back to the
/// documented defaults. Store failures still propagate.
#[derive(Clone)]
pub struct SettingsRepo {
    pool: SqlitePool,
}

impl SettingsRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM meta WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    pub async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO meta (key, value)
            VALUES (?1, ?2)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Base of the exponential backoff, re-read on every retry so operators
    /// can tune it live.
    pub async fn backoff_base(&self) -> anyhow::Result<f64> {
        let raw = self.get(BACKOFF_BASE).await?;
        Ok(retry::parse_backoff_base(raw.as_deref()))
    }

    /// Seconds of inactivity after which a `processing` job counts as crashed.
    pub async fn lock_timeout(&self) -> anyhow::Result<i64> {
        let raw = self.get(LOCK_TIMEOUT).await?;
        let parsed = raw
            .as_deref()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .filter(|v| *v > 0);
        Ok(parsed.unwrap_or(DEFAULT_LOCK_TIMEOUT_SEC))
    }

    pub async fn stop_requested(&self) -> anyhow::Result<bool> {
        Ok(self.get(STOP_WORKERS).await?.as_deref() == Some("1"))
    }
}
