// ClamAV FFI 绑定层
//
// 只包含 C API 的原始声明，不做任何封装。
// 结构体和回调类型始终编译；extern 函数仅在启用 `libclamav` feature 时链接。

#![allow(non_camel_case_types)]

use std::os::raw::{c_char, c_int, c_uint, c_ulong, c_void};

/// ClamAV 错误码类型
pub type cl_error_t = c_int;

/// ClamAV 引擎结构体 (opaque pointer)
#[repr(C)]
pub struct cl_engine {
    _private: [u8; 0],
}

/// 引擎设置副本 (opaque pointer)
#[repr(C)]
pub struct cl_settings {
    _private: [u8; 0],
}

/// 内存映射对象 (opaque pointer)
#[repr(C)]
pub struct cl_fmap_t {
    _private: [u8; 0],
}

/// 扫描选项结构体
#[repr(C)]
#[derive(Debug, Copy, Clone, Default)]
pub struct cl_scan_options {
    pub general: u32,
    pub parse: u32,
    pub heuristic: u32,
    pub mail: u32,
    pub dev: u32,
}

/// 病毒库目录状态快照
///
/// `stattab` 指向平台相关的 `struct stat` 数组，只由 libclamav 读写。
#[repr(C)]
#[derive(Debug)]
pub struct cl_stat {
    pub dir: *mut c_char,
    pub stattab: *mut c_void,
    pub statdname: *mut *mut c_char,
    pub entries: c_uint,
}

impl Default for cl_stat {
    fn default() -> Self {
        Self {
            dir: std::ptr::null_mut(),
            stattab: std::ptr::null_mut(),
            statdname: std::ptr::null_mut(),
            entries: 0,
        }
    }
}

pub const CL_INIT_DEFAULT: c_uint = 0x0;

// ============ 回调类型 ============

pub type clcb_pre_cache =
    unsafe extern "C" fn(fd: c_int, file_type: *const c_char, context: *mut c_void) -> cl_error_t;

pub type clcb_pre_scan =
    unsafe extern "C" fn(fd: c_int, file_type: *const c_char, context: *mut c_void) -> cl_error_t;

pub type clcb_post_scan = unsafe extern "C" fn(
    fd: c_int,
    result: c_int,
    virname: *const c_char,
    context: *mut c_void,
) -> cl_error_t;

pub type clcb_virus_found =
    unsafe extern "C" fn(fd: c_int, virname: *const c_char, context: *mut c_void);

// ============ FFI 函数声明 ============

#[cfg(feature = "libclamav")]
extern "C" {
    pub fn cl_init(initoptions: c_uint) -> cl_error_t;
    pub fn cl_initialize_crypto() -> c_int;
    pub fn cl_cleanup_crypto();

    pub fn cl_engine_new() -> *mut cl_engine;
    pub fn cl_engine_addref(engine: *mut cl_engine) -> cl_error_t;
    pub fn cl_engine_free(engine: *mut cl_engine) -> cl_error_t;
    pub fn cl_engine_compile(engine: *mut cl_engine) -> cl_error_t;

    pub fn cl_engine_set_num(engine: *mut cl_engine, field: c_int, num: i64) -> cl_error_t;
    pub fn cl_engine_get_num(engine: *const cl_engine, field: c_int, err: *mut c_int) -> i64;
    pub fn cl_engine_set_str(
        engine: *mut cl_engine,
        field: c_int,
        str: *const c_char,
    ) -> cl_error_t;
    pub fn cl_engine_get_str(
        engine: *const cl_engine,
        field: c_int,
        err: *mut c_int,
    ) -> *const c_char;

    pub fn cl_engine_settings_copy(engine: *const cl_engine) -> *mut cl_settings;
    pub fn cl_engine_settings_apply(
        engine: *mut cl_engine,
        settings: *const cl_settings,
    ) -> cl_error_t;
    pub fn cl_engine_settings_free(settings: *mut cl_settings) -> cl_error_t;

    pub fn cl_engine_set_clcb_pre_cache(engine: *mut cl_engine, callback: clcb_pre_cache);
    pub fn cl_engine_set_clcb_pre_scan(engine: *mut cl_engine, callback: clcb_pre_scan);
    pub fn cl_engine_set_clcb_post_scan(engine: *mut cl_engine, callback: clcb_post_scan);
    pub fn cl_engine_set_clcb_virus_found(engine: *mut cl_engine, callback: clcb_virus_found);

    pub fn cl_load(
        path: *const c_char,
        engine: *mut cl_engine,
        signo: *mut c_uint,
        dboptions: c_uint,
    ) -> cl_error_t;

    pub fn cl_scanfile(
        filename: *const c_char,
        virname: *mut *const c_char,
        scanned: *mut c_ulong,
        engine: *const cl_engine,
        scanoptions: *mut cl_scan_options,
    ) -> cl_error_t;

    pub fn cl_scanfile_callback(
        filename: *const c_char,
        virname: *mut *const c_char,
        scanned: *mut c_ulong,
        engine: *const cl_engine,
        scanoptions: *mut cl_scan_options,
        context: *mut c_void,
    ) -> cl_error_t;

    pub fn cl_scandesc_callback(
        desc: c_int,
        filename: *const c_char,
        virname: *mut *const c_char,
        scanned: *mut c_ulong,
        engine: *const cl_engine,
        scanoptions: *mut cl_scan_options,
        context: *mut c_void,
    ) -> cl_error_t;

    pub fn cl_fmap_open_memory(start: *const c_void, len: libc::size_t) -> *mut cl_fmap_t;
    pub fn cl_fmap_close(map: *mut cl_fmap_t);

    pub fn cl_scanmap_callback(
        map: *mut cl_fmap_t,
        filename: *const c_char,
        virname: *mut *const c_char,
        scanned: *mut c_ulong,
        engine: *const cl_engine,
        scanoptions: *mut cl_scan_options,
        context: *mut c_void,
    ) -> cl_error_t;

    pub fn cl_retdbdir() -> *const c_char;
    pub fn cl_statinidir(dirname: *const c_char, dbstat: *mut cl_stat) -> cl_error_t;
    pub fn cl_statchkdir(dbstat: *const cl_stat) -> c_int;
    pub fn cl_statfree(dbstat: *mut cl_stat) -> cl_error_t;
    pub fn cl_countsigs(path: *const c_char, countoptions: c_uint, sigs: *mut c_uint) -> cl_error_t;

    pub fn cl_debug();
    pub fn cl_retflevel() -> c_uint;
    pub fn cl_retver() -> *const c_char;
    pub fn cl_strerror(clerror: cl_error_t) -> *const c_char;
}
