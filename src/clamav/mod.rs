// ClamAV FFI 模块
//
// 此模块提供 libclamav 的 Rust 绑定，包括：
// - 回调上下文注册表（key <-> 上下文）
// - 引擎句柄、引用计数和扫描调用
// - 病毒库目录变更检测
// - 引擎生命周期管理

pub mod backend;
pub mod callbacks;
pub mod context;
pub mod engine;
pub mod error;
pub mod ffi;
pub mod manager;
pub mod stat;
pub mod types;

#[cfg(feature = "libclamav")]
pub mod native;

#[cfg(test)]
pub(crate) mod mock;

pub use backend::{EngineBackend, RawScan, StatBackend};
pub use callbacks::ScanContext;
pub use context::{ContextGuard, ContextRegistry, ExternalKey, SharedContext};
pub use engine::Engine;
pub use error::{ClamAVError, ContractViolation, Result};
pub use manager::{EngineManager, EngineState};
pub use stat::DatabaseStat;
pub use types::*;

#[cfg(feature = "libclamav")]
pub use native::{LibClamav, LibClamavStat};
