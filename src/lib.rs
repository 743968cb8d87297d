// clamav-binding/src/lib.rs
//
// 模块声明，导出所有子模块

pub mod clamav;
pub mod config;
pub mod scan;

// 重新导出常用类型
pub use clamav::{ClamAVError, Engine, ScanContext, ScanOptions, ScanReport, ScanVerdict};
pub use config::ClamAVConfig;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
