//! 一次性变更信号
//!
//! 快照被替换后触发；触发后永久保持已触发状态，
//! 之后的变更需要重新获取新的信号才能观察到。

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::Notify;

/// 变更监听回调
pub type ChangeListener = Box<dyn FnOnce() + Send + 'static>;

struct SignalInner {
    fired: AtomicBool,
    next_id: AtomicU64,
    listeners: Mutex<Vec<(u64, ChangeListener)>>,
    notify: Notify,
}

/// 变更信号（可廉价克隆，克隆共享同一状态）
#[derive(Clone)]
pub struct ChangeSignal {
    inner: Arc<SignalInner>,
}

impl ChangeSignal {
    /// 创建未触发的信号
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SignalInner {
                fired: AtomicBool::new(false),
                next_id: AtomicU64::new(1),
                listeners: Mutex::new(Vec::new()),
                notify: Notify::new(),
            }),
        }
    }

    /// 信号是否已触发
    pub fn has_fired(&self) -> bool {
        self.inner.fired.load(Ordering::Acquire)
    }

    /// 注册变更监听
    ///
    /// 信号已触发时监听会被立即调用。
    ///
    /// # 参数
    /// * `listener` - 触发时调用一次的回调
    ///
    /// # 返回
    /// * `ListenerHandle` - 注册句柄，丢弃时注销尚未调用的监听
    pub fn register<F>(&self, listener: F) -> ListenerHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut listeners = self
                .inner
                .listeners
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            // 在锁内检查，避免与 fire 竞争导致监听丢失
            if !self.has_fired() {
                listeners.push((id, Box::new(listener)));
                return ListenerHandle {
                    id,
                    signal: Arc::downgrade(&self.inner),
                };
            }
        }

        listener();
        ListenerHandle {
            id,
            signal: Weak::new(),
        }
    }

    /// 等待信号触发
    pub async fn changed(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if self.has_fired() {
            return;
        }
        notified.await;
    }

    /// 触发信号，重复触发不产生任何效果
    ///
    /// # 返回
    /// * `bool` - 本次调用是否完成了触发
    pub(crate) fn fire(&self) -> bool {
        let listeners = {
            let mut listeners = self
                .inner
                .listeners
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if self.inner.fired.swap(true, Ordering::AcqRel) {
                return false;
            }
            std::mem::take(&mut *listeners)
        };

        self.inner.notify.notify_waiters();
        for (_, listener) in listeners {
            listener();
        }
        true
    }

    /// 当前等待调用的监听数量
    pub fn listener_count(&self) -> usize {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

impl Default for ChangeSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ChangeSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeSignal")
            .field("fired", &self.has_fired())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// 监听注册句柄
#[derive(Debug)]
pub struct ListenerHandle {
    id: u64,
    signal: Weak<SignalInner>,
}

impl ListenerHandle {
    /// 注销监听；已调用过的监听不受影响
    pub fn unregister(self) {
        drop(self);
    }

    /// 保留监听直到信号触发，不再随句柄丢弃而注销
    pub fn detach(mut self) {
        self.signal = Weak::new();
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(inner) = self.signal.upgrade() {
            let mut listeners = inner.listeners.lock().unwrap_or_else(|e| e.into_inner());
            listeners.retain(|(id, _)| *id != self.id);
        }
    }
}
