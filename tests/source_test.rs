//! 配置源端到端测试
//!
//! 使用内存存储验证加载、版本过滤、快照发布与后台轮询

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vault_config::source::{
    ConfigProvider, KeyFormat, ReloadOutcome, SchedulerState, SourceOptions, VaultConfigProvider,
    VaultConfigSource,
};
use vault_config::store::{MemoryStore, SecretDocument, SecretStore, StoreResult};
use vault_config::VaultConfigError;

const POLL: Duration = Duration::from_millis(20);
const WAIT: Duration = Duration::from_secs(2);

async fn app_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.put("app/db", json!({"host": "x", "port": 5432})).await;
    store.put("app/flags", json!(["a", "b"])).await;
    store
}

async fn build(store: &Arc<MemoryStore>, options: SourceOptions) -> VaultConfigProvider {
    VaultConfigSource::new(options, Arc::clone(store) as Arc<dyn SecretStore>)
        .build()
        .await
        .unwrap()
}

/// 列举目录前可以人为延迟的存储
struct SlowStore {
    inner: MemoryStore,
    slow: AtomicBool,
}

#[async_trait]
impl SecretStore for SlowStore {
    async fn list(&self, folder: &str) -> StoreResult<Vec<String>> {
        if self.slow.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(60)).await;
        }
        self.inner.list(folder).await
    }

    async fn read(&self, path: &str) -> StoreResult<SecretDocument> {
        self.inner.read(path).await
    }
}

/// 轮询条件直到满足或超时
async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("等待条件超时");
}

#[tokio::test]
async fn test_nested_tree_is_flattened() {
    let store = app_store().await;
    let provider = build(&store, SourceOptions::new("app", "app")).await;

    let snapshot = provider.current_snapshot();
    let keys: Vec<&str> = snapshot.iter().map(|(key, _)| key).collect();
    assert_eq!(keys, vec!["db:host", "db:port", "flags:0", "flags:1"]);
    assert_eq!(snapshot.get("db:port"), Some("5432"));
    assert_eq!(snapshot.get("flags:1"), Some("b"));
}

#[tokio::test]
async fn test_prefix_and_path_characters() {
    let store = Arc::new(MemoryStore::new());
    store.put("app/my.service", json!({"k": 1})).await;

    let options = SourceOptions::new("app", "app").with_key_format(KeyFormat {
        normalize_chars: vec!['.'],
        key_prefix: Some("vault".to_string()),
        ..KeyFormat::default()
    });
    let provider = build(&store, options).await;

    assert_eq!(provider.get("vault:my:service:k").as_deref(), Some("1"));
}

#[tokio::test]
async fn test_omit_secret_path() {
    let store = Arc::new(MemoryStore::new());
    store.put("app/db", json!({"host": "x"})).await;

    let options = SourceOptions::new("app", "app").with_key_format(KeyFormat {
        omit_secret_path: true,
        ..KeyFormat::default()
    });
    let provider = build(&store, options).await;

    assert_eq!(provider.get("host").as_deref(), Some("x"));
    assert!(provider.get("db:host").is_none());
}

#[tokio::test]
async fn test_omit_secret_path_drops_prefix() {
    let store = Arc::new(MemoryStore::new());
    store.put("app/db", json!({"host": "x"})).await;

    let options = SourceOptions::new("app", "app").with_key_format(KeyFormat {
        key_prefix: Some("vault".to_string()),
        omit_secret_path: true,
        ..KeyFormat::default()
    });
    let provider = build(&store, options).await;

    let snapshot = provider.current_snapshot();
    let keys: Vec<&str> = snapshot.iter().map(|(key, _)| key).collect();
    assert_eq!(keys, vec!["host"]);
}

#[tokio::test]
async fn test_same_version_twice_is_noop() {
    let store = app_store().await;
    let provider = build(&store, SourceOptions::new("app", "app")).await;
    let before = provider.current_snapshot();
    let signal = provider.watch_for_change();

    assert_eq!(
        provider.trigger_reload().await.unwrap(),
        ReloadOutcome::Unchanged
    );
    assert!(Arc::ptr_eq(&before, &provider.current_snapshot()));
    assert!(!signal.has_fired());
}

#[tokio::test]
async fn test_first_load_failure_is_fatal() {
    let store = app_store().await;
    store.set_unavailable(true);

    let result = VaultConfigSource::new(SourceOptions::new("app", "app"), store)
        .build()
        .await;

    match result {
        Err(VaultConfigError::FatalStartup { source_name, .. }) => assert_eq!(source_name, "app"),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("首次加载失败时不应创建提供者"),
    }
}

#[tokio::test]
async fn test_scheduled_update_fires_listener_once() {
    let store = app_store().await;
    let provider = build(
        &store,
        SourceOptions::new("app", "app").with_reload_interval(POLL),
    )
    .await;

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    let signal = provider.watch_for_change();
    let _handle = signal.register(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    store
        .put_versioned("app/db", json!({"host": "y", "port": 5432}), 2)
        .await;

    tokio::time::timeout(WAIT, signal.changed())
        .await
        .expect("变更信号未触发");
    assert_eq!(provider.get("db:host").as_deref(), Some("y"));

    // 之后的轮询周期没有新版本，不再触发
    tokio::time::sleep(POLL * 5).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(!provider.watch_for_change().has_fired());

    provider.shutdown().await;
}

#[tokio::test]
async fn test_scheduled_failure_keeps_snapshot() {
    let store = app_store().await;
    let provider = build(
        &store,
        SourceOptions::new("app", "app").with_reload_interval(POLL),
    )
    .await;
    let before = provider.current_snapshot();
    let signal = provider.watch_for_change();

    store.set_unavailable(true);

    let mut failed = 0;
    tokio::time::timeout(WAIT, async {
        while failed == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            if let Some(status) = provider.scheduler_status().await {
                failed = status.cycles_failed;
            }
        }
    })
    .await
    .expect("调度器没有记录失败");

    assert_eq!(*provider.current_snapshot(), *before);
    assert!(!signal.has_fired());

    let status = provider.scheduler_status().await.unwrap();
    assert!(status.last_error.is_some());
    assert_ne!(status.state, SchedulerState::Stopped);

    provider.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_stops_publishing() {
    let store = app_store().await;
    let provider = build(
        &store,
        SourceOptions::new("app", "app").with_reload_interval(POLL),
    )
    .await;
    assert!(provider.scheduler_status().await.is_some());

    provider.shutdown().await;
    assert!(provider.scheduler_status().await.is_none());

    let signal = provider.watch_for_change();
    store.put("app/db", json!({"host": "z"})).await;
    tokio::time::sleep(POLL * 5).await;

    assert_eq!(provider.get("db:host").as_deref(), Some("x"));
    assert!(!signal.has_fired());
}

#[tokio::test]
async fn test_concurrent_reloads_are_serialized() {
    let store = app_store().await;
    let provider = Arc::new(build(&store, SourceOptions::new("app", "app")).await);
    store.put("app/flags", json!(["c"])).await;

    let reloads: Vec<_> = (0..8)
        .map(|_| {
            let provider = Arc::clone(&provider);
            tokio::spawn(async move { provider.trigger_reload().await.unwrap() })
        })
        .collect();

    let mut changed = 0;
    for reload in reloads {
        if matches!(reload.await.unwrap(), ReloadOutcome::Changed { .. }) {
            changed += 1;
        }
    }
    assert_eq!(changed, 1);
    assert_eq!(provider.current_snapshot().generation(), 2);
}

#[tokio::test]
async fn test_readers_never_see_partial_snapshot() {
    let store = Arc::new(MemoryStore::new());
    store.put_versioned("app/pair", json!({"a": 0, "b": 0}), 1).await;
    let provider = Arc::new(build(&store, SourceOptions::new("app", "app")).await);

    let reader = {
        let provider = Arc::clone(&provider);
        tokio::spawn(async move {
            for _ in 0..500 {
                let snapshot = provider.current_snapshot();
                assert_eq!(snapshot.get("pair:a"), snapshot.get("pair:b"));
                tokio::task::yield_now().await;
            }
        })
    };

    for version in 2..20u64 {
        store
            .put_versioned("app/pair", json!({"a": version, "b": version}), version)
            .await;
        provider.trigger_reload().await.unwrap();
    }

    reader.await.unwrap();
    assert_eq!(provider.get("pair:a").as_deref(), Some("19"));
}

#[tokio::test]
async fn test_started_polling_is_idempotent() {
    let store = app_store().await;
    let provider = build(&store, SourceOptions::new("app", "app")).await;
    assert!(provider.scheduler_status().await.is_none());

    provider.start_polling(POLL).await;
    provider.start_polling(Duration::from_secs(60)).await;

    let status = provider.scheduler_status().await.unwrap();
    assert_eq!(status.interval_seconds, 0);

    wait_until(|| store.read_count() > 2).await;
    provider.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_during_cycle_discards_result() {
    let store = Arc::new(SlowStore {
        inner: MemoryStore::new(),
        slow: AtomicBool::new(false),
    });
    store.inner.put("app/db", json!({"host": "x"})).await;
    store.inner.put("app/cache", json!({"ttl": 60})).await;

    let provider = VaultConfigSource::new(
        SourceOptions::new("app", "app").with_reload_interval(POLL),
        Arc::clone(&store) as Arc<dyn SecretStore>,
    )
    .build()
    .await
    .unwrap();
    let signal = provider.watch_for_change();

    store.slow.store(true, Ordering::SeqCst);
    store
        .inner
        .put_versioned("app/db", json!({"host": "y"}), 2)
        .await;

    // 等到后台周期开始后再关闭
    tokio::time::timeout(WAIT, async {
        loop {
            if let Some(status) = provider.scheduler_status().await {
                if status.state == SchedulerState::Loading {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("加载周期未开始");

    provider.shutdown().await;

    assert_eq!(provider.get("db:host").as_deref(), Some("x"));
    assert!(!signal.has_fired());
    assert_eq!(provider.current_snapshot().generation(), 1);
}
