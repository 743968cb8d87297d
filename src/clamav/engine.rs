// ClamAV 扫描引擎句柄
//
// 此模块实现引擎句柄的安全封装：
// - 引用计数（try_clone = addref，drop = free）
// - 字段读写、设置副本、病毒库加载和编译
// - 文件 / 文件描述符 / 内存扫描
// - 带上下文的扫描：注册 key -> 调用引擎 -> 回调解析 key -> 返回后注销 key

use std::ffi::CString;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::path::Path;
use std::sync::Arc;

use super::backend::{EngineBackend, RawScan};
use super::callbacks::ScanContext;
use super::context::{self, ExternalKey};
use super::error::{ClamAVError, Result};
use super::types::{DbOptions, EngineField, ErrorCode, FieldKind, ScanOptions, ScanReport, ScanVerdict};
use crate::config::ClamAVConfig;

fn c_string(value: &str) -> Result<CString> {
    CString::new(value).map_err(|_| ClamAVError::InvalidString(value.to_string()))
}

fn c_path(path: &Path) -> Result<CString> {
    use std::os::unix::ffi::OsStrExt;
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| ClamAVError::InvalidString(path.display().to_string()))
}

fn check(op: &'static str, code: ErrorCode) -> Result<()> {
    if code.is_success() {
        Ok(())
    } else {
        tracing::error!("{} failed: {}", op, code);
        Err(ClamAVError::Engine { op, code })
    }
}

/// 把引擎状态码分类为干净 / 感染 / 错误
fn classify(op: &'static str, target: &str, raw: RawScan) -> Result<ScanReport> {
    match raw.code {
        ErrorCode::CLEAN => {
            tracing::debug!("File clean: {}", target);
            Ok(ScanReport {
                verdict: ScanVerdict::Clean,
                scanned: raw.scanned,
            })
        }
        ErrorCode::VIRUS => {
            let name = raw.virus_name.unwrap_or_else(|| "Unknown".to_string());
            tracing::warn!("VIRUS FOUND in {}: {}", target, name);
            Ok(ScanReport {
                verdict: ScanVerdict::Infected(name),
                scanned: raw.scanned,
            })
        }
        code => {
            tracing::error!("{} failed for {}: {}", op, target, code);
            Err(ClamAVError::Engine { op, code })
        }
    }
}

/// 引擎句柄
///
/// 每个实例持有外部引擎的一份引用。需要在其他线程独立扫描时，
/// 先调用 [`Engine::try_clone`] 增加引用计数；最后一个实例 drop 时引擎被释放。
pub struct Engine<B: EngineBackend> {
    backend: B,
}

#[cfg(feature = "libclamav")]
impl Engine<super::native::LibClamav> {
    /// 创建 libclamav 引擎
    pub fn create() -> Result<Self> {
        Ok(Self::new(super::native::LibClamav::create()?))
    }
}

impl<B: EngineBackend> Engine<B> {
    /// 接管一个新建的引擎句柄（引用计数为 1）
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// 增加引用计数，返回共享同一引擎的新句柄
    pub fn try_clone(&self) -> Result<Self> {
        let backend = self
            .backend
            .addref()
            .map_err(|code| ClamAVError::Engine {
                op: "cl_engine_addref",
                code,
            })?;
        Ok(Self { backend })
    }

    pub fn set_num(&self, field: EngineField, num: u64) -> Result<()> {
        expect_kind(field, FieldKind::Num)?;
        check("cl_engine_set_num", self.backend.set_num(field, num as i64))
    }

    pub fn get_num(&self, field: EngineField) -> Result<u64> {
        expect_kind(field, FieldKind::Num)?;
        self.backend
            .get_num(field)
            .map(|num| num as u64)
            .map_err(|code| ClamAVError::Engine {
                op: "cl_engine_get_num",
                code,
            })
    }

    pub fn set_string(&self, field: EngineField, value: &str) -> Result<()> {
        expect_kind(field, FieldKind::Str)?;
        let value = c_string(value)?;
        check("cl_engine_set_str", self.backend.set_str(field, &value))
    }

    /// 读取字符串字段，未设置时返回空字符串
    pub fn get_string(&self, field: EngineField) -> Result<String> {
        expect_kind(field, FieldKind::Str)?;
        self.backend
            .get_str(field)
            .map(Option::unwrap_or_default)
            .map_err(|code| ClamAVError::Engine {
                op: "cl_engine_get_str",
                code,
            })
    }

    /// 复制当前引擎设置
    pub fn copy_settings(&self) -> Result<B::Settings> {
        self.backend
            .settings_copy()
            .ok_or(ClamAVError::NullHandle("cl_engine_settings_copy"))
    }

    pub fn apply_settings(&self, settings: &B::Settings) -> Result<()> {
        check("cl_engine_settings_apply", self.backend.settings_apply(settings))
    }

    /// 加载病毒库文件或目录，返回加载的签名数
    pub fn load<P: AsRef<Path>>(&self, path: P, options: DbOptions) -> Result<u32> {
        let path = path.as_ref();
        tracing::info!("Loading virus database from: {}", path.display());
        let signo = self
            .backend
            .load(&c_path(path)?, options)
            .map_err(|code| {
                tracing::error!("cl_load failed for {}: {}", path.display(), code);
                ClamAVError::Engine { op: "cl_load", code }
            })?;
        tracing::info!("Loaded {} signatures from database", signo);
        Ok(signo)
    }

    /// 编译引擎，编译后才能扫描
    pub fn compile(&self) -> Result<()> {
        tracing::info!("Compiling ClamAV engine...");
        check("cl_engine_compile", self.backend.compile())?;
        tracing::info!("ClamAV engine compiled successfully");
        Ok(())
    }

    /// 把配置中的目录和限制写入引擎
    pub fn configure(&self, config: &ClamAVConfig) -> Result<()> {
        if let Some(certs) = config.certs_dir.as_deref() {
            tracing::info!("Setting ClamAV certificates directory: {}", certs);
            if !Path::new(certs).exists() {
                tracing::warn!("Certificate directory does not exist: {}, continuing anyway", certs);
            }
            self.set_string(EngineField::CvdCertsDir, certs)?;
        }
        if let Some(tmp) = config.tmp_dir.as_deref() {
            self.set_string(EngineField::TmpDir, tmp)?;
        }

        let limits = [
            (EngineField::MaxScanSize, config.limits.max_scan_size),
            (EngineField::MaxFileSize, config.limits.max_file_size),
            (EngineField::MaxRecursion, config.limits.max_recursion),
            (EngineField::MaxFiles, config.limits.max_files),
            (EngineField::MaxScanTime, config.limits.max_scan_time),
        ];
        for (field, value) in limits {
            if let Some(value) = value {
                tracing::debug!("Setting {:?} = {}", field, value);
                self.set_num(field, value)?;
            }
        }
        Ok(())
    }

    /// 配置、加载病毒库并编译
    pub fn prepare(&self, config: &ClamAVConfig) -> Result<u32> {
        self.configure(config)?;
        let signo = self.load(&config.database_dir, config.db_options)?;
        self.compile()?;
        Ok(signo)
    }

    /// 扫描单个文件
    pub fn scan_file<P: AsRef<Path>>(&self, path: P, options: &ScanOptions) -> Result<ScanReport> {
        let path = path.as_ref();
        let c_path = c_path(path)?;
        tracing::debug!("Scanning file: {}", path.display());
        let raw = self.backend.scan_file(&c_path, options, None);
        classify("cl_scanfile", &path.display().to_string(), raw)
    }

    /// 扫描已打开的文件描述符，filename 只用于报告
    pub fn scan_descriptor(
        &self,
        fd: BorrowedFd<'_>,
        filename: &str,
        options: &ScanOptions,
    ) -> Result<ScanReport> {
        let c_name = c_string(filename)?;
        let raw = self
            .backend
            .scan_descriptor(fd.as_raw_fd(), &c_name, options, None);
        classify("cl_scandesc_callback", filename, raw)
    }

    /// 扫描单个文件，扫描期间的回调分发到 context
    pub fn scan_file_with_context<P: AsRef<Path>>(
        &self,
        path: P,
        options: &ScanOptions,
        context: Arc<dyn ScanContext>,
    ) -> Result<ScanReport> {
        let path = path.as_ref();
        let c_path = c_path(path)?;
        let raw = with_context(context, |key| {
            tracing::debug!("Scanning file {} with context {:#x}", path.display(), key.id());
            self.backend.scan_file(&c_path, options, Some(key))
        });
        classify("cl_scanfile_callback", &path.display().to_string(), raw)
    }

    pub fn scan_descriptor_with_context(
        &self,
        fd: BorrowedFd<'_>,
        filename: &str,
        options: &ScanOptions,
        context: Arc<dyn ScanContext>,
    ) -> Result<ScanReport> {
        let c_name = c_string(filename)?;
        let raw = with_context(context, |key| {
            self.backend
                .scan_descriptor(fd.as_raw_fd(), &c_name, options, Some(key))
        });
        classify("cl_scandesc_callback", filename, raw)
    }

    /// 扫描内存数据
    pub fn scan_memory_with_context(
        &self,
        data: &[u8],
        filename: &str,
        options: &ScanOptions,
        context: Arc<dyn ScanContext>,
    ) -> Result<ScanReport> {
        let c_name = c_string(filename)?;
        let raw = with_context(context, |key| {
            tracing::debug!("Scanning {} bytes ({}) with context {:#x}", data.len(), filename, key.id());
            self.backend.scan_memory(data, &c_name, options, key)
        });
        classify("cl_scanmap_callback", filename, raw)
    }
}

// 每次扫描都发放新的 key；guard 在扫描调用返回之后才注销
fn with_context<R>(context: Arc<dyn ScanContext>, scan: impl FnOnce(ExternalKey) -> R) -> R {
    let guard = context::global().enter(context);
    scan(guard.key())
}

fn expect_kind(field: EngineField, kind: FieldKind) -> Result<()> {
    if field.kind() == kind {
        return Ok(());
    }
    Err(ClamAVError::FieldKind {
        field,
        expected: match kind {
            FieldKind::Num => "numeric",
            FieldKind::Str => "string",
        },
    })
}

impl<B: EngineBackend> Drop for Engine<B> {
    fn drop(&mut self) {
        let code = self.backend.release();
        if !code.is_success() {
            tracing::warn!("cl_engine_free failed: {}", code);
        }
    }
}
