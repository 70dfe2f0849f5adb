//! 内存密钥存储
//!
//! 进程内的版本化密钥树，适用于测试与嵌入场景

use crate::error::StoreError;
use crate::source::value::StructuredValue;
use crate::store::{leaf_path, SecretDocument, SecretStore, StoreResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// 内存密钥存储
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// 路径 -> 文档
    secrets: RwLock<BTreeMap<String, SecretDocument>>,
    /// 是否模拟后端不可用
    unavailable: AtomicBool,
    /// 读取次数统计
    reads: AtomicUsize,
}

impl MemoryStore {
    /// 创建空存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入密钥，版本号自动递增（首次写入为 1）
    ///
    /// # 返回
    /// * `u64` - 新版本号
    pub async fn put(&self, path: &str, value: impl Into<StructuredValue>) -> u64 {
        let path = normalize(path);
        let mut secrets = self.secrets.write().await;
        let version = secrets.get(&path).map(|doc| doc.version + 1).unwrap_or(1);
        secrets.insert(
            path,
            SecretDocument {
                value: value.into(),
                version,
            },
        );
        version
    }

    /// 以指定版本号写入密钥
    pub async fn put_versioned(&self, path: &str, value: impl Into<StructuredValue>, version: u64) {
        self.secrets.write().await.insert(
            normalize(path),
            SecretDocument {
                value: value.into(),
                version,
            },
        );
    }

    /// 删除密钥
    pub async fn delete(&self, path: &str) -> bool {
        self.secrets.write().await.remove(&normalize(path)).is_some()
    }

    /// 设置是否模拟后端不可用
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// 累计读取次数
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("内存存储已设置为不可用".to_string()))
        } else {
            Ok(())
        }
    }
}

fn normalize(path: &str) -> String {
    path.trim_matches('/').to_string()
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn list(&self, folder: &str) -> StoreResult<Vec<String>> {
        self.check_available()?;

        let prefix = normalize(folder);
        let prefix = if prefix.is_empty() {
            prefix
        } else {
            format!("{prefix}/")
        };

        let secrets = self.secrets.read().await;
        let mut children = BTreeSet::new();
        for path in secrets.keys() {
            let Some(rest) = path.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((folder, _)) => children.insert(format!("{folder}/")),
                None => children.insert(rest.to_string()),
            };
        }

        if children.is_empty() {
            return Err(StoreError::NotFound {
                path: folder.to_string(),
            });
        }
        Ok(children.into_iter().collect())
    }

    async fn read(&self, path: &str) -> StoreResult<SecretDocument> {
        self.check_available()?;
        self.reads.fetch_add(1, Ordering::SeqCst);

        self.secrets
            .read()
            .await
            .get(leaf_path(path).trim_start_matches('/'))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                path: path.to_string(),
            })
    }
}
