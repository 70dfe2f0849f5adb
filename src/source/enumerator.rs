//! 密钥树枚举
//!
//! 基于显式工作栈的深度优先遍历。存储不预先区分目录与叶子，
//! 每个路径都会先尝试列举、再尝试读取，两者都成功时两者都产出。

use crate::error::{Result, StoreError, VaultConfigError};
use crate::source::value::SecretNode;
use crate::store::{folder_path, leaf_path, SecretStore};
use futures::stream::{self, Stream};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, trace};

/// 工作栈中的待处理项
#[derive(Debug)]
enum Visit {
    /// 尝试作为目录列举，之后安排读取
    Probe { path: String, readable: bool },
    /// 尝试作为叶子读取
    Read(String),
}

/// 密钥树枚举器
pub struct PathEnumerator {
    /// 后端存储
    store: Arc<dyn SecretStore>,
    /// 根路径是否只能作为目录
    root_is_folder: bool,
    /// 取消信号
    cancel: Option<watch::Receiver<bool>>,
}

impl PathEnumerator {
    /// 创建新的枚举器
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self {
            store,
            root_is_folder: false,
            cancel: None,
        }
    }

    /// 根路径只作为目录处理，不尝试读取
    pub fn root_is_folder(mut self, root_is_folder: bool) -> Self {
        self.root_is_folder = root_is_folder;
        self
    }

    /// 设置取消信号，在每次弹出工作项前检查
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// 枚举根路径下的所有密钥
    ///
    /// 流在遇到除 `NotFound` 与单条文档格式错误以外的任何错误后结束。
    ///
    /// # 参数
    /// * `root` - 根路径
    ///
    /// # 返回
    /// * `impl Stream<Item = Result<SecretNode>>` - 惰性产出的密钥
    pub fn enumerate(self, root: &str) -> impl Stream<Item = Result<SecretNode>> + Send + 'static {
        let state = WalkState {
            store: self.store,
            cancel: self.cancel,
            stack: vec![Visit::Probe {
                path: root.to_string(),
                readable: !self.root_is_folder,
            }],
            done: false,
        };

        stream::unfold(state, |mut state| async move {
            let item = state.advance().await?;
            Some((item, state))
        })
    }
}

struct WalkState {
    store: Arc<dyn SecretStore>,
    cancel: Option<watch::Receiver<bool>>,
    stack: Vec<Visit>,
    done: bool,
}

impl WalkState {
    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    fn fail(&mut self, err: VaultConfigError) -> Option<Result<SecretNode>> {
        self.done = true;
        self.stack.clear();
        Some(Err(err))
    }

    async fn advance(&mut self) -> Option<Result<SecretNode>> {
        loop {
            if self.done {
                return None;
            }
            if self.is_cancelled() {
                debug!("密钥树枚举已取消");
                return self.fail(VaultConfigError::Cancelled);
            }

            let Some(visit) = self.stack.pop() else {
                self.done = true;
                return None;
            };

            match visit {
                Visit::Probe { path, readable } => {
                    let folder = folder_path(&path);
                    trace!("尝试列举目录: `{}`", folder);

                    let children = match self.store.list(&folder).await {
                        Ok(children) => children,
                        Err(StoreError::NotFound { .. }) => Vec::new(),
                        Err(e) => return self.fail(e.into()),
                    };

                    // 目录自身的读取排在所有子项之后
                    let leaf = leaf_path(&path);
                    if readable && !leaf.is_empty() {
                        self.stack.push(Visit::Read(leaf.to_string()));
                    }

                    let mut seen = HashSet::new();
                    let children: Vec<String> = children
                        .iter()
                        .map(|child| child.trim_matches('/'))
                        .filter(|child| !child.is_empty() && seen.insert(child.to_string()))
                        .map(|child| format!("{folder}{child}"))
                        .collect();
                    if !children.is_empty() {
                        debug!("目录 `{}` 包含 {} 个子项", folder, children.len());
                    }

                    for child in children.into_iter().rev() {
                        self.stack.push(Visit::Probe {
                            path: child,
                            readable: true,
                        });
                    }
                }
                Visit::Read(path) => match self.store.read(&path).await {
                    Ok(doc) => {
                        trace!("读取到密钥 `{}`，版本 {}", path, doc.version);
                        return Some(Ok(SecretNode {
                            path,
                            value: doc.value,
                            version: doc.version,
                        }));
                    }
                    Err(StoreError::NotFound { .. }) => continue,
                    Err(e @ StoreError::Malformed { .. }) => return Some(Err(e.into())),
                    Err(e) => return self.fail(e.into()),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::value::StructuredValue;
    use crate::store::{MemoryStore, SecretDocument, StoreResult};
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::collections::HashMap;

    async fn collect(store: Arc<dyn SecretStore>, root: &str) -> Vec<Result<SecretNode>> {
        PathEnumerator::new(store).enumerate(root).collect().await
    }

    fn paths(items: &[Result<SecretNode>]) -> Vec<String> {
        items
            .iter()
            .map(|item| item.as_ref().unwrap().path.clone())
            .collect()
    }

    #[tokio::test]
    async fn test_depth_first_left_to_right() {
        let store = MemoryStore::new();
        store.put("app/a/x", "1").await;
        store.put("app/a/y", "2").await;
        store.put("app/b", "3").await;
        store.put("app/c/z", "4").await;

        let items = collect(Arc::new(store), "app").await;
        assert_eq!(paths(&items), vec!["app/a/x", "app/a/y", "app/b", "app/c/z"]);
    }

    #[tokio::test]
    async fn test_folder_and_leaf_at_same_path() {
        let store = MemoryStore::new();
        store.put("app/db", "leaf").await;
        store.put("app/db/replica", "child").await;

        let items = collect(Arc::new(store), "app").await;
        // 子项先于目录自身产出，且同名目录只访问一次
        assert_eq!(paths(&items), vec!["app/db/replica", "app/db"]);
    }

    #[tokio::test]
    async fn test_three_way_classification() {
        let store = MemoryStore::new();
        store.put("folder/child", "c").await;
        store.put("leaf", "l").await;
        let store: Arc<dyn SecretStore> = Arc::new(store);

        // 只能列举：不产出自身
        assert_eq!(paths(&collect(Arc::clone(&store), "folder").await), vec!["folder/child"]);
        // 只能读取：产出一条
        assert_eq!(paths(&collect(Arc::clone(&store), "leaf").await), vec!["leaf"]);
        // 都不行：不产出，也不是错误
        assert!(collect(store, "missing").await.is_empty());
    }

    #[tokio::test]
    async fn test_root_as_folder_skips_read() {
        let store = MemoryStore::new();
        store.put("app", "root-value").await;
        store.put("app/db", "x").await;

        let items: Vec<_> = PathEnumerator::new(Arc::new(store))
            .root_is_folder(true)
            .enumerate("app")
            .collect()
            .await;
        assert_eq!(paths(&items), vec!["app/db"]);
    }

    #[tokio::test]
    async fn test_empty_root_walks_whole_mount() {
        let store = MemoryStore::new();
        store.put("a/b", "1").await;
        store.put("c", "2").await;

        let items = collect(Arc::new(store), "").await;
        assert_eq!(paths(&items), vec!["a/b", "c"]);
    }

    /// 指定路径返回特定错误的存储
    struct FaultyStore {
        inner: MemoryStore,
        faults: HashMap<String, fn(&str) -> StoreError>,
    }

    #[async_trait]
    impl SecretStore for FaultyStore {
        async fn list(&self, folder: &str) -> StoreResult<Vec<String>> {
            if let Some(fault) = self.faults.get(folder) {
                return Err(fault(folder));
            }
            self.inner.list(folder).await
        }

        async fn read(&self, path: &str) -> StoreResult<SecretDocument> {
            if let Some(fault) = self.faults.get(path) {
                return Err(fault(path));
            }
            self.inner.read(path).await
        }
    }

    #[tokio::test]
    async fn test_backend_error_aborts_enumeration() {
        let inner = MemoryStore::new();
        inner.put("app/a", "1").await;
        inner.put("app/b/x", "2").await;
        inner.put("app/c", "3").await;

        let mut faults: HashMap<String, fn(&str) -> StoreError> = HashMap::new();
        faults.insert("app/b/".to_string(), |path| StoreError::Backend {
            path: path.to_string(),
            status: 500,
            message: "boom".to_string(),
        });

        let items = collect(Arc::new(FaultyStore { inner, faults }), "app").await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap().path, "app/a");
        assert!(matches!(
            items[1],
            Err(VaultConfigError::Store(StoreError::Backend { .. }))
        ));
    }

    #[tokio::test]
    async fn test_malformed_document_does_not_abort() {
        let inner = MemoryStore::new();
        inner.put("app/a", "1").await;
        inner.put("app/b", "2").await;
        inner.put("app/c", "3").await;

        let mut faults: HashMap<String, fn(&str) -> StoreError> = HashMap::new();
        faults.insert("app/b".to_string(), |path| StoreError::Malformed {
            path: path.to_string(),
            reason: "bad".to_string(),
        });

        let items = collect(Arc::new(FaultyStore { inner, faults }), "app").await;
        assert_eq!(items.len(), 3);
        assert!(items[1].as_ref().unwrap_err().is_malformed());
        assert_eq!(items[2].as_ref().unwrap().path, "app/c");
    }

    #[tokio::test]
    async fn test_cancelled_before_walk() {
        let store = MemoryStore::new();
        store.put("app/a", "1").await;

        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let items: Vec<_> = PathEnumerator::new(Arc::new(store))
            .with_cancel(rx)
            .enumerate("app")
            .collect()
            .await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(VaultConfigError::Cancelled)));
    }

    #[tokio::test]
    async fn test_deep_tree_does_not_recurse() {
        let store = MemoryStore::new();
        let deep: Vec<String> = (0..200).map(|i| format!("n{i}")).collect();
        let path = format!("app/{}", deep.join("/"));
        store.put(&path, StructuredValue::Null).await;

        let items = collect(Arc::new(store), "app").await;
        assert_eq!(paths(&items), vec![path]);
    }
}
