// libclamav 实现
//
// 所有 unsafe 调用集中在这里。指针只在本模块内使用，
// 上层通过 EngineBackend / StatBackend 访问。

use std::ffi::{CStr, CString};
use std::os::fd::RawFd;
use std::os::raw::{c_char, c_int, c_uint, c_ulong, c_void};
use std::ptr::{self, NonNull};
use std::sync::OnceLock;

use super::backend::{EngineBackend, RawScan, StatBackend};
use super::callbacks::trampolines;
use super::context::ExternalKey;
use super::error::{ClamAVError, Result};
use super::ffi;
use super::types::{DbOptions, EngineField, ErrorCode, ScanOptions};

unsafe fn owned_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
    }
}

fn context_ptr(context: Option<ExternalKey>) -> *mut c_void {
    context.map_or(ptr::null_mut(), ExternalKey::as_ptr)
}

/// libclamav 引擎句柄
pub struct LibClamav {
    engine: NonNull<ffi::cl_engine>,
    released: bool,
}

// 引擎内部自带锁和引用计数，句柄本身只是一个指针
unsafe impl Send for LibClamav {}
unsafe impl Sync for LibClamav {}

impl LibClamav {
    /// 创建新引擎（引用计数为 1）并安装回调
    pub fn create() -> Result<Self> {
        let engine = unsafe { ffi::cl_engine_new() };
        let engine = NonNull::new(engine).ok_or(ClamAVError::NullHandle("cl_engine_new"))?;

        unsafe {
            ffi::cl_engine_set_clcb_pre_cache(engine.as_ptr(), trampolines::pre_cache);
            ffi::cl_engine_set_clcb_pre_scan(engine.as_ptr(), trampolines::pre_scan);
            ffi::cl_engine_set_clcb_post_scan(engine.as_ptr(), trampolines::post_scan);
            ffi::cl_engine_set_clcb_virus_found(engine.as_ptr(), trampolines::virus_found);
        }

        tracing::debug!("Created ClamAV engine at {:p}", engine.as_ptr());
        Ok(Self {
            engine,
            released: false,
        })
    }

    fn raw(&self) -> *mut ffi::cl_engine {
        self.engine.as_ptr()
    }

    fn finish_scan(code: ffi::cl_error_t, virname: *const c_char, scanned: c_ulong) -> RawScan {
        RawScan {
            code: ErrorCode(code),
            virus_name: unsafe { owned_string(virname) },
            scanned: scanned as u64,
        }
    }
}

impl EngineBackend for LibClamav {
    type Settings = Settings;

    fn addref(&self) -> std::result::Result<Self, ErrorCode> {
        let code = ErrorCode(unsafe { ffi::cl_engine_addref(self.raw()) });
        if !code.is_success() {
            return Err(code);
        }
        Ok(Self {
            engine: self.engine,
            released: false,
        })
    }

    fn release(&mut self) -> ErrorCode {
        if self.released {
            return ErrorCode::SUCCESS;
        }
        self.released = true;
        ErrorCode(unsafe { ffi::cl_engine_free(self.raw()) })
    }

    fn set_num(&self, field: EngineField, num: i64) -> ErrorCode {
        ErrorCode(unsafe { ffi::cl_engine_set_num(self.raw(), field.as_raw(), num) })
    }

    fn get_num(&self, field: EngineField) -> std::result::Result<i64, ErrorCode> {
        let mut err: c_int = 0;
        let num = unsafe { ffi::cl_engine_get_num(self.raw(), field.as_raw(), &mut err) };
        match ErrorCode(err) {
            code if code.is_success() => Ok(num),
            code => Err(code),
        }
    }

    fn set_str(&self, field: EngineField, value: &CStr) -> ErrorCode {
        ErrorCode(unsafe { ffi::cl_engine_set_str(self.raw(), field.as_raw(), value.as_ptr()) })
    }

    fn get_str(&self, field: EngineField) -> std::result::Result<Option<String>, ErrorCode> {
        let mut err: c_int = 0;
        let value = unsafe { ffi::cl_engine_get_str(self.raw(), field.as_raw(), &mut err) };
        match ErrorCode(err) {
            code if code.is_success() => Ok(unsafe { owned_string(value) }),
            code => Err(code),
        }
    }

    fn settings_copy(&self) -> Option<Settings> {
        let settings = unsafe { ffi::cl_engine_settings_copy(self.raw()) };
        NonNull::new(settings).map(|ptr| Settings { ptr })
    }

    fn settings_apply(&self, settings: &Settings) -> ErrorCode {
        ErrorCode(unsafe { ffi::cl_engine_settings_apply(self.raw(), settings.ptr.as_ptr()) })
    }

    fn load(&self, path: &CStr, options: DbOptions) -> std::result::Result<u32, ErrorCode> {
        let mut signo: c_uint = 0;
        let code = ErrorCode(unsafe {
            ffi::cl_load(path.as_ptr(), self.raw(), &mut signo, options.0 as c_uint)
        });
        if code.is_success() {
            Ok(signo)
        } else {
            Err(code)
        }
    }

    fn compile(&self) -> ErrorCode {
        ErrorCode(unsafe { ffi::cl_engine_compile(self.raw()) })
    }

    fn scan_file(&self, path: &CStr, options: &ScanOptions, context: Option<ExternalKey>) -> RawScan {
        let mut virname: *const c_char = ptr::null();
        let mut scanned: c_ulong = 0;
        let mut opts = options.to_raw();

        let code = unsafe {
            match context {
                Some(key) => ffi::cl_scanfile_callback(
                    path.as_ptr(),
                    &mut virname,
                    &mut scanned,
                    self.raw(),
                    &mut opts,
                    key.as_ptr(),
                ),
                None => ffi::cl_scanfile(
                    path.as_ptr(),
                    &mut virname,
                    &mut scanned,
                    self.raw(),
                    &mut opts,
                ),
            }
        };
        Self::finish_scan(code, virname, scanned)
    }

    fn scan_descriptor(
        &self,
        fd: RawFd,
        filename: &CStr,
        options: &ScanOptions,
        context: Option<ExternalKey>,
    ) -> RawScan {
        let mut virname: *const c_char = ptr::null();
        let mut scanned: c_ulong = 0;
        let mut opts = options.to_raw();

        let code = unsafe {
            ffi::cl_scandesc_callback(
                fd,
                filename.as_ptr(),
                &mut virname,
                &mut scanned,
                self.raw(),
                &mut opts,
                context_ptr(context),
            )
        };
        Self::finish_scan(code, virname, scanned)
    }

    fn scan_memory(
        &self,
        data: &[u8],
        filename: &CStr,
        options: &ScanOptions,
        context: ExternalKey,
    ) -> RawScan {
        let Some(map) = MemoryMap::open(data) else {
            return RawScan::error(ErrorCode::EMAP);
        };

        let mut virname: *const c_char = ptr::null();
        let mut scanned: c_ulong = 0;
        let mut opts = options.to_raw();

        let code = unsafe {
            ffi::cl_scanmap_callback(
                map.ptr.as_ptr(),
                filename.as_ptr(),
                &mut virname,
                &mut scanned,
                self.raw(),
                &mut opts,
                context.as_ptr(),
            )
        };
        // 病毒名指向引擎内部的签名表，与 map 无关
        let scan = Self::finish_scan(code, virname, scanned);
        drop(map);
        scan
    }
}

impl Drop for LibClamav {
    fn drop(&mut self) {
        let code = self.release();
        if !code.is_success() {
            tracing::warn!("cl_engine_free failed: {}", code);
        }
    }
}

/// 引擎设置副本
pub struct Settings {
    ptr: NonNull<ffi::cl_settings>,
}

unsafe impl Send for Settings {}

impl Drop for Settings {
    fn drop(&mut self) {
        let code = ErrorCode(unsafe { ffi::cl_engine_settings_free(self.ptr.as_ptr()) });
        if !code.is_success() {
            tracing::warn!("cl_engine_settings_free failed: {}", code);
        }
    }
}

/// 覆盖调用方缓冲区的临时映射，drop 时关闭
struct MemoryMap<'a> {
    ptr: NonNull<ffi::cl_fmap_t>,
    _data: std::marker::PhantomData<&'a [u8]>,
}

impl<'a> MemoryMap<'a> {
    fn open(data: &'a [u8]) -> Option<Self> {
        let ptr = unsafe { ffi::cl_fmap_open_memory(data.as_ptr() as *const c_void, data.len()) };
        NonNull::new(ptr).map(|ptr| Self {
            ptr,
            _data: std::marker::PhantomData,
        })
    }
}

impl Drop for MemoryMap<'_> {
    fn drop(&mut self) {
        unsafe { ffi::cl_fmap_close(self.ptr.as_ptr()) }
    }
}

/// cl_stat 快照
pub struct LibClamavStat;

impl StatBackend for LibClamavStat {
    type Snapshot = Box<ffi::cl_stat>;

    fn init(&self, dir: &CStr) -> std::result::Result<Self::Snapshot, ErrorCode> {
        let mut stat = Box::new(ffi::cl_stat::default());
        let code = ErrorCode(unsafe { ffi::cl_statinidir(dir.as_ptr(), &mut *stat) });
        if code.is_success() {
            Ok(stat)
        } else {
            Err(code)
        }
    }

    fn changed(&self, snapshot: &Self::Snapshot) -> bool {
        unsafe { ffi::cl_statchkdir(&**snapshot) == 1 }
    }

    fn free(&self, snapshot: &mut Self::Snapshot) -> ErrorCode {
        ErrorCode(unsafe { ffi::cl_statfree(&mut **snapshot) })
    }
}

// ============ 进程级调用 ============

static INIT: OnceLock<std::result::Result<(), ErrorCode>> = OnceLock::new();

/// 初始化 libclamav，每个进程只执行一次，之后返回第一次的结果
pub fn init(flags: u32) -> Result<()> {
    let outcome = INIT.get_or_init(|| {
        let code = ErrorCode(unsafe { ffi::cl_init(flags as c_uint) });
        if !code.is_success() {
            tracing::error!("cl_init failed: {}", code);
            return Err(code);
        }
        init_crypto();
        tracing::info!("libclamav {} initialized", version());
        Ok(())
    });
    (*outcome).map_err(ClamAVError::Init)
}

pub fn init_crypto() {
    unsafe {
        ffi::cl_initialize_crypto();
    }
}

/// 进程退出前清理加密子系统
pub fn cleanup_crypto() {
    unsafe { ffi::cl_cleanup_crypto() }
}

/// 默认病毒库目录
pub fn db_dir() -> String {
    unsafe { owned_string(ffi::cl_retdbdir()) }.unwrap_or_default()
}

/// 统计目录中可加载的签名数量
pub fn count_sigs(path: &str, options: u32) -> Result<u32> {
    let path = CString::new(path).map_err(|_| ClamAVError::InvalidString(path.to_string()))?;
    let mut count: c_uint = 0;
    let code = ErrorCode(unsafe { ffi::cl_countsigs(path.as_ptr(), options as c_uint, &mut count) });
    if !code.is_success() {
        return Err(ClamAVError::Engine {
            op: "cl_countsigs",
            code,
        });
    }
    Ok(count)
}

pub fn enable_debug() {
    unsafe { ffi::cl_debug() }
}

/// 引擎支持的病毒库功能级别
pub fn functionality_level() -> u32 {
    unsafe { ffi::cl_retflevel() }
}

pub fn version() -> String {
    unsafe { owned_string(ffi::cl_retver()) }.unwrap_or_default()
}

/// 由 libclamav 给出的错误描述
pub fn strerror(code: ErrorCode) -> String {
    unsafe { owned_string(ffi::cl_strerror(code.0)) }.unwrap_or_else(|| code.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    // 需要系统已安装 libclamav
    #[test]
    #[ignore]
    fn test_with_real_libclamav() {
        init(ffi::CL_INIT_DEFAULT).unwrap();
        assert!(!version().is_empty());
        assert_eq!(strerror(ErrorCode::VIRUS), "Virus(es) detected");

        let engine = LibClamav::create().unwrap();
        let clone = engine.addref().unwrap();
        drop(engine);
        assert!(clone.get_num(EngineField::MaxScanSize).is_ok());
    }
}
