// 外部引擎调用接口
//
// 引擎本身是黑盒，这里只定义 Engine 需要的稳定调用面。
// 生产实现是 `native::LibClamav`，测试使用内存中的模拟实现。

use std::ffi::CStr;
use std::os::fd::RawFd;

use super::context::ExternalKey;
use super::types::{DbOptions, EngineField, ErrorCode, ScanOptions};

/// 一次扫描调用的原始输出
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawScan {
    pub code: ErrorCode,
    pub virus_name: Option<String>,
    /// 单位为 COUNT_PRECISION
    pub scanned: u64,
}

impl RawScan {
    pub fn clean(scanned: u64) -> Self {
        Self {
            code: ErrorCode::CLEAN,
            virus_name: None,
            scanned,
        }
    }

    pub fn virus(name: impl Into<String>, scanned: u64) -> Self {
        Self {
            code: ErrorCode::VIRUS,
            virus_name: Some(name.into()),
            scanned,
        }
    }

    pub fn error(code: ErrorCode) -> Self {
        Self {
            code,
            virus_name: None,
            scanned: 0,
        }
    }
}

/// 引用计数的引擎句柄
///
/// 每个实例持有一份引用；`addref` 产生一份新的引用，`release` 归还自己的引用，
/// 计数归零时由外部引擎释放。
pub trait EngineBackend: Send + Sync + Sized {
    /// 引擎设置副本，drop 时释放
    type Settings: Send;

    fn addref(&self) -> Result<Self, ErrorCode>;
    fn release(&mut self) -> ErrorCode;

    fn set_num(&self, field: EngineField, num: i64) -> ErrorCode;
    fn get_num(&self, field: EngineField) -> Result<i64, ErrorCode>;
    fn set_str(&self, field: EngineField, value: &CStr) -> ErrorCode;
    fn get_str(&self, field: EngineField) -> Result<Option<String>, ErrorCode>;

    fn settings_copy(&self) -> Option<Self::Settings>;
    fn settings_apply(&self, settings: &Self::Settings) -> ErrorCode;

    fn load(&self, path: &CStr, options: DbOptions) -> Result<u32, ErrorCode>;
    fn compile(&self) -> ErrorCode;

    fn scan_file(&self, path: &CStr, options: &ScanOptions, context: Option<ExternalKey>) -> RawScan;

    fn scan_descriptor(
        &self,
        fd: RawFd,
        filename: &CStr,
        options: &ScanOptions,
        context: Option<ExternalKey>,
    ) -> RawScan;

    /// 扫描内存数据；临时映射在返回前必须关闭
    fn scan_memory(
        &self,
        data: &[u8],
        filename: &CStr,
        options: &ScanOptions,
        context: ExternalKey,
    ) -> RawScan;
}

/// 病毒库目录状态快照
pub trait StatBackend {
    type Snapshot;

    fn init(&self, dir: &CStr) -> Result<Self::Snapshot, ErrorCode>;
    fn changed(&self, snapshot: &Self::Snapshot) -> bool;
    fn free(&self, snapshot: &mut Self::Snapshot) -> ErrorCode;
}
