//! 配置快照
//!
//! 对外可见的扁平配置状态，发布后不可变

use crate::source::flatten::FlatEntry;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// 已发布的配置快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    /// 配置键 -> 配置值（`None` 表示显式空值）
    entries: BTreeMap<String, Option<String>>,
    /// 快照代数，每次发布递增
    generation: u64,
    /// 快照生成时间
    created_at: DateTime<Utc>,
}

impl Snapshot {
    /// 创建空快照
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
            generation: 0,
            created_at: Utc::now(),
        }
    }

    /// 获取配置值，键不存在或值为空时返回 `None`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(|v| v.as_deref())
    }

    /// 获取原始条目，可区分"键不存在"与"值为空"
    pub fn entry(&self, key: &str) -> Option<Option<&str>> {
        self.entries.get(key).map(|v| v.as_deref())
    }

    /// 是否包含配置键
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// 按键顺序遍历所有配置项
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    /// 配置项数量
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 快照代数
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// 快照生成时间
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// 以当前快照为基础开始构建下一代快照
    pub fn to_builder(&self) -> SnapshotBuilder {
        SnapshotBuilder {
            entries: self.entries.clone(),
            generation: self.generation + 1,
            applied: 0,
        }
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}

/// 快照构建器，仅在一次加载周期内使用
#[derive(Debug)]
pub struct SnapshotBuilder {
    entries: BTreeMap<String, Option<String>>,
    generation: u64,
    applied: usize,
}

impl SnapshotBuilder {
    /// 合并一份密钥展开后的配置项
    pub fn merge(&mut self, entries: Vec<FlatEntry>) {
        for entry in entries {
            self.entries.insert(entry.key, entry.value);
        }
        self.applied += 1;
    }

    /// 本轮已合并的密钥数量
    pub fn applied(&self) -> usize {
        self.applied
    }

    /// 完成构建
    pub fn build(self) -> Snapshot {
        Snapshot {
            entries: self.entries,
            generation: self.generation,
            created_at: Utc::now(),
        }
    }
}
