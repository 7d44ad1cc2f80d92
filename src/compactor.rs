use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::{Engine, EngineError};

const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Background task that rewrites the WAL once enough appends pile up.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        match compact_if_needed(&engine, threshold).await {
            Ok(true) => {
                metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL, "status" => "ok")
                    .increment(1);
            }
            Ok(false) => {}
            Err(e) => {
                metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL, "status" => "error")
                    .increment(1);
                tracing::error!("WAL compaction failed: {e}");
            }
        }
    }
}

/// Compact when at least `threshold` events were appended since the last
/// compaction. Returns whether a compaction ran.
pub async fn compact_if_needed(engine: &Engine, threshold: u64) -> Result<bool, EngineError> {
    let appends = engine.wal_appends_since_compact().await;
    if threshold == 0 || appends < threshold {
        return Ok(false);
    }
    engine.compact_wal().await?;
    info!("compacted WAL after {appends} appends");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::model::*;
    use std::path::PathBuf;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("hallbook_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn compacts_only_past_threshold() {
        let now = parse_datetime("2024-03-01T09:00").unwrap();
        let engine = Engine::new(test_wal_path("threshold.wal"), Arc::new(FixedClock(now))).unwrap();

        engine.create_hall(ResourceId::new("A-205"), None).await.unwrap();
        engine.create_hall(ResourceId::new("B-101"), None).await.unwrap();
        assert!(!compact_if_needed(&engine, 3).await.unwrap());

        engine.delete_hall(&ResourceId::new("B-101")).await.unwrap();
        assert!(compact_if_needed(&engine, 3).await.unwrap());
        assert_eq!(engine.wal_appends_since_compact().await, 0);
        assert_eq!(engine.list_halls().await.len(), 1);
    }

    #[test]
    fn zero_threshold_disables() {
        tokio_test::block_on(async {
            let now = parse_datetime("2024-03-01T09:00").unwrap();
            let engine =
                Engine::new(test_wal_path("disabled.wal"), Arc::new(FixedClock(now))).unwrap();
            engine.create_hall(ResourceId::new("A-205"), None).await.unwrap();
            assert!(!compact_if_needed(&engine, 0).await.unwrap());
        });
    }
}
