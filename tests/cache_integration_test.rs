//! End-to-end cache behavior across the memory/file backend chain.

mod common;

use common::memory_file_manager;
use marketsync_core::cache::{cache_key, CacheManager, FileBackend, TtlPolicy};
use marketsync_core::config::CacheConfig;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

fn sample_payload() -> serde_json::Value {
    json!({
        "symbol": "600519",
        "bars": [
            {"date": "2026-03-02", "open": 1690.0, "close": 1702.5},
            {"date": "2026-03-03", "open": 1702.5, "close": 1688.0}
        ]
    })
}

#[tokio::test]
async fn save_then_find_then_load_round_trips() {
    let dir = TempDir::new().unwrap();
    let manager = memory_file_manager(&dir, 3600);

    let key = manager
        .save_data(
            "600519",
            sample_payload(),
            "2026-03-02",
            "2026-03-03",
            "tushare",
            "stock_data",
        )
        .await
        .unwrap();
    assert_eq!(
        key,
        cache_key("600519", "2026-03-02", "2026-03-03", "tushare", "stock_data")
    );

    let found = manager
        .find_cached("600519", "2026-03-02", "2026-03-03", "tushare", "stock_data")
        .await;
    assert_eq!(found.as_deref(), Some(key.as_str()));

    let payload = manager.load_data(&key).await.unwrap().unwrap();
    assert_eq!(payload, sample_payload());
}

#[tokio::test]
async fn never_saved_slot_is_a_miss() {
    let dir = TempDir::new().unwrap();
    let manager = memory_file_manager(&dir, 3600);

    assert!(manager
        .find_cached("000001", "2026-01-01", "2026-01-31", "akshare", "stock_data")
        .await
        .is_none());
}

#[tokio::test]
async fn expired_entries_are_absent() {
    let dir = TempDir::new().unwrap();
    // Zero TTL: every entry is expired the moment it is written.
    let manager = memory_file_manager(&dir, 0);

    let key = manager
        .save_data(
            "AAPL",
            sample_payload(),
            "2026-03-02",
            "2026-03-03",
            "yfinance",
            "stock_data",
        )
        .await
        .unwrap();

    assert!(manager.load_data(&key).await.unwrap().is_none());
    assert!(manager
        .find_cached("AAPL", "2026-03-02", "2026-03-03", "yfinance", "stock_data")
        .await
        .is_none());
}

#[tokio::test]
async fn clear_everything_zeroes_stats() {
    let dir = TempDir::new().unwrap();
    let manager = memory_file_manager(&dir, 3600);

    for symbol in ["600519", "000001", "MSFT"] {
        manager
            .save_data(
                symbol,
                sample_payload(),
                "2026-03-02",
                "2026-03-03",
                "tushare",
                "stock_data",
            )
            .await
            .unwrap();
    }

    let stats = manager.get_cache_stats().await;
    assert!(stats.total_entries >= 3);

    manager.clear(0).await;

    let stats = manager.get_cache_stats().await;
    assert_eq!(stats.total_entries, 0);
    assert!(stats.per_category.is_empty());
}

#[tokio::test]
async fn file_fallback_serves_reads_when_memory_is_cold() {
    let dir = TempDir::new().unwrap();

    // Seed the file tier directly, then read through a manager whose memory
    // primary has never seen the key.
    let file = FileBackend::new(dir.path()).unwrap();
    let file_manager = CacheManager::with_backends(
        Arc::new(file),
        Vec::new(),
        TtlPolicy::new(HashMap::new()).with_default(3600),
        true,
    );
    let key = file_manager
        .save_data(
            "600519",
            sample_payload(),
            "2026-03-02",
            "2026-03-03",
            "tushare",
            "stock_data",
        )
        .await
        .unwrap();

    let reader = memory_file_manager(&dir, 3600);
    let payload = reader.load_data(&key).await.unwrap().unwrap();
    assert_eq!(payload, sample_payload());
}

#[tokio::test]
async fn config_built_manager_uses_configured_directory() {
    let dir = TempDir::new().unwrap();
    let config = CacheConfig {
        primary_backend: "file".to_string(),
        cache_dir: dir.path().to_string_lossy().into_owned(),
        ..CacheConfig::default()
    };
    let manager = CacheManager::from_config(&config).unwrap();

    manager
        .save_data(
            "000001",
            sample_payload(),
            "2026-03-02",
            "2026-03-03",
            "baostock",
            "stock_data",
        )
        .await
        .unwrap();

    let files: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .collect();
    assert_eq!(files.len(), 1);
    assert!(files[0].file_name().to_string_lossy().ends_with(".json"));
}
