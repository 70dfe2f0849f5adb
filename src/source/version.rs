//! 密钥版本追踪
//!
//! 记录每个路径最后一次应用的版本号，用于判断密钥是否有更新

use std::collections::HashMap;
use tracing::debug;

/// 版本追踪器
#[derive(Debug, Clone, Default)]
pub struct VersionTracker {
    /// 路径 -> 最后应用的版本号
    versions: HashMap<String, u64>,
}

impl VersionTracker {
    /// 创建空的版本追踪器
    pub fn new() -> Self {
        Self::default()
    }

    /// 判断观察到的版本是否需要应用
    ///
    /// 路径未记录过，或版本号大于已记录的版本时返回 `true`。
    /// 版本号回退（例如密钥被删除后重建）不会被应用。
    pub fn should_apply(&self, path: &str, version: u64) -> bool {
        match self.versions.get(path) {
            None => true,
            Some(&current) if version > current => {
                debug!("密钥 `{}` 有新版本: {} -> {}", path, current, version);
                true
            }
            Some(&current) => {
                if version < current {
                    debug!("密钥 `{}` 版本回退被忽略: {} < {}", path, version, current);
                } else {
                    debug!("密钥 `{}` 未变化，版本 {}", path, version);
                }
                false
            }
        }
    }

    /// 记录已应用的版本
    ///
    /// 只能在该密钥已成功展开并合并进新快照后调用。
    pub fn record(&mut self, path: &str, version: u64) {
        let entry = self.versions.entry(path.to_string()).or_insert(version);
        if version > *entry {
            *entry = version;
        }
    }

    /// 获取路径最后应用的版本号
    pub fn version_of(&self, path: &str) -> Option<u64> {
        self.versions.get(path).copied()
    }

    /// 已追踪的路径数量
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// 是否未追踪任何路径
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}
