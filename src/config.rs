// 引擎配置
//
// 加载顺序：默认值 -> JSON 配置文件（可选）-> 环境变量

use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::clamav::{ClamAVError, DbOptions, ScanOptions};

/// ClamAV 引擎配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClamAVConfig {
    /// 病毒库目录
    pub database_dir: String,
    /// 证书目录
    pub certs_dir: Option<String>,
    /// 临时文件目录
    pub tmp_dir: Option<String>,
    /// 病毒库加载选项
    pub db_options: DbOptions,
    pub limits: ScanLimits,
    /// 是否启用启发式扫描
    pub heuristic_scan: bool,
    pub scan_archives: bool,
    /// 打开 libclamav 调试输出
    pub debug: bool,
    /// 并发扫描线程数
    pub concurrency: usize,
}

impl Default for ClamAVConfig {
    fn default() -> Self {
        Self {
            database_dir: "/var/lib/clamav".to_string(),
            certs_dir: None,
            tmp_dir: None,
            db_options: DbOptions::STDOPT,
            limits: ScanLimits::default(),
            heuristic_scan: true,
            scan_archives: true,
            debug: false,
            concurrency: 4,
        }
    }
}

/// 扫描限制，未设置的项使用引擎默认值
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanLimits {
    pub max_scan_size: Option<u64>,
    pub max_file_size: Option<u64>,
    pub max_recursion: Option<u64>,
    pub max_files: Option<u64>,
    /// 单个文件最长扫描时间（毫秒）
    pub max_scan_time: Option<u64>,
}

impl ClamAVConfig {
    /// 从 JSON 文件加载，然后应用环境变量
    pub fn load(path: Option<&Path>) -> Result<Self, ClamAVError> {
        let config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)?;
                serde_json::from_str(&content).map_err(|e| {
                    ClamAVError::Config(format!("{}: {}", path.display(), e))
                })?
            }
            None => Self::default(),
        };
        config.with_env_overrides()
    }

    pub fn with_env_overrides(mut self) -> Result<Self, ClamAVError> {
        if let Ok(dir) = env::var("CLAMAV_DB_DIR") {
            self.database_dir = dir;
        }
        if let Ok(dir) = env::var("CLAMAV_CERTS_DIR") {
            self.certs_dir = Some(dir);
        }
        if let Ok(dir) = env::var("CLAMAV_TMP_DIR") {
            self.tmp_dir = Some(dir);
        }
        if let Ok(value) = env::var("CLAMAV_CONCURRENCY") {
            self.concurrency = value.parse().map_err(|_| {
                ClamAVError::Config(format!("CLAMAV_CONCURRENCY is not a number: {}", value))
            })?;
        }
        if let Ok(value) = env::var("CLAMAV_DEBUG") {
            self.debug = matches!(value.as_str(), "1" | "true" | "yes");
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ClamAVError> {
        if self.database_dir.is_empty() {
            return Err(ClamAVError::Config("database_dir must not be empty".to_string()));
        }
        if self.concurrency == 0 {
            return Err(ClamAVError::Config("concurrency must be at least 1".to_string()));
        }
        Ok(())
    }

    /// 根据配置生成扫描选项
    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions::default()
            .with_heuristics(self.heuristic_scan)
            .with_archives(self.scan_archives)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ClamAVConfig::default();
        assert_eq!(config.database_dir, "/var/lib/clamav");
        assert_eq!(config.db_options, DbOptions::STDOPT);
        assert!(config.validate().is_ok());

        let opts = config.scan_options();
        assert!(opts.heuristics_enabled());
        assert!(opts.archives_enabled());
    }

    #[test]
    fn test_load_partial_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"database_dir": "/opt/clamav/db", "scan_archives": false, "limits": {{"max_files": 50}}}}"#
        )
        .unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        let config: ClamAVConfig = serde_json::from_str(&content).unwrap();
        assert_eq!(config.database_dir, "/opt/clamav/db");
        assert!(!config.scan_archives);
        assert_eq!(config.limits.max_files, Some(50));
        assert_eq!(config.limits.max_scan_size, None);
        assert_eq!(config.concurrency, 4);
        assert!(!config.scan_options().archives_enabled());
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        let err = ClamAVConfig::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ClamAVError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let config = ClamAVConfig {
            concurrency: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
