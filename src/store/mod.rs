//! 密钥存储模块
//!
//! 定义后端存储接口，并提供 Vault KV v2 与内存两种实现

pub mod memory;
pub mod vault;

use crate::error::StoreError;
use crate::source::value::StructuredValue;
use async_trait::async_trait;

// 重新导出主要类型
pub use memory::MemoryStore;
pub use vault::{VaultAuth, VaultStore, VaultStoreSettings};

/// 存储操作结果类型
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// 一份可读取的密钥文档
#[derive(Debug, Clone, PartialEq)]
pub struct SecretDocument {
    /// 文档内容
    pub value: StructuredValue,
    /// 文档版本号
    pub version: u64,
}

/// 密钥存储trait，定义目录列举与叶子读取接口
///
/// 存储不预先区分目录与叶子，两种操作都可能返回 `StoreError::NotFound`。
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// 列举目录的直接子项
    ///
    /// # 参数
    /// * `folder` - 目录路径（以 `/` 结尾，根目录为空字符串）
    ///
    /// # 返回
    /// * `StoreResult<Vec<String>>` - 子项名称，子目录可能以 `/` 结尾
    async fn list(&self, folder: &str) -> StoreResult<Vec<String>>;

    /// 读取叶子路径上的密钥文档
    ///
    /// # 参数
    /// * `path` - 叶子路径（不以 `/` 结尾）
    ///
    /// # 返回
    /// * `StoreResult<SecretDocument>` - 文档与版本号
    async fn read(&self, path: &str) -> StoreResult<SecretDocument>;
}

/// 目录形式的路径：确保以 `/` 结尾，根目录保持为空
pub fn folder_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

/// 叶子形式的路径：去掉结尾的 `/`
pub fn leaf_path(path: &str) -> &str {
    path.trim_end_matches('/')
}
