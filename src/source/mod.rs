//! 配置源模块
//!
//! 把 Vault 密钥树转换为扁平配置并在后台保持更新

pub mod enumerator;
pub mod flatten;
pub mod provider;
pub mod scheduler;
pub mod signal;
pub mod snapshot;
pub mod value;
pub mod version;

pub use enumerator::PathEnumerator;
pub use flatten::{flatten, FlatEntry, KeyFormat, DEFAULT_SEPARATOR};
pub use provider::{
    ConfigProvider, CycleReport, ReloadOutcome, SourceOptions, VaultConfigProvider,
    VaultConfigSource,
};
pub use scheduler::{ReloadScheduler, SchedulerState, SchedulerStatus};
pub use signal::{ChangeListener, ChangeSignal, ListenerHandle};
pub use snapshot::{Snapshot, SnapshotBuilder};
pub use value::{SecretNode, StructuredValue};
pub use version::VersionTracker;
