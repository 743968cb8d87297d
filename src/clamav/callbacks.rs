// 扫描回调
//
// 引擎在扫描期间（可能在它自己创建的线程里）调用这些回调，
// 并原样传回扫描开始时拿到的 key。这里把 key 解析回 ScanContext 再分发。

use std::os::raw::c_int;

use super::context::{self, ExternalKey};
use super::types::{CallbackVerdict, ErrorCode};

/// 扫描上下文
///
/// 所有方法都有默认实现，只需覆盖关心的回调。
/// 实现必须是线程安全的：引擎可能从多个线程同时回调。
pub trait ScanContext: Send + Sync + 'static {
    /// 缓存检查之前调用
    fn pre_cache(&self, _fd: c_int, _file_type: &str) -> CallbackVerdict {
        CallbackVerdict::Continue
    }

    /// 每个对象（包括归档内的文件）扫描之前调用
    fn pre_scan(&self, _fd: c_int, _file_type: &str) -> CallbackVerdict {
        CallbackVerdict::Continue
    }

    /// 每个对象扫描完成后调用
    fn post_scan(&self, _fd: c_int, _result: ErrorCode, _virus_name: Option<&str>) -> CallbackVerdict {
        CallbackVerdict::Continue
    }

    /// 发现病毒时调用
    fn virus_found(&self, _fd: c_int, _virus_name: &str) {}
}

pub fn pre_cache(key: ExternalKey, fd: c_int, file_type: &str) -> CallbackVerdict {
    context::global().resolve(key).pre_cache(fd, file_type)
}

pub fn pre_scan(key: ExternalKey, fd: c_int, file_type: &str) -> CallbackVerdict {
    context::global().resolve(key).pre_scan(fd, file_type)
}

pub fn post_scan(
    key: ExternalKey,
    fd: c_int,
    result: ErrorCode,
    virus_name: Option<&str>,
) -> CallbackVerdict {
    context::global()
        .resolve(key)
        .post_scan(fd, result, virus_name)
}

pub fn virus_found(key: ExternalKey, fd: c_int, virus_name: &str) {
    tracing::debug!("virus_found callback for context {:#x}: {}", key.id(), virus_name);
    context::global().resolve(key).virus_found(fd, virus_name)
}

/// C 回调入口
///
/// 非回调版本的扫描 (cl_scanfile) 也会触发已安装的回调，此时 context 为空，直接放行。
#[cfg(feature = "libclamav")]
pub(crate) mod trampolines {
    use std::borrow::Cow;
    use std::ffi::CStr;
    use std::os::raw::{c_char, c_int, c_void};

    use super::super::context::ExternalKey;
    use super::super::ffi::cl_error_t;
    use super::super::types::{CallbackVerdict, ErrorCode};

    unsafe fn lossy<'a>(ptr: *const c_char) -> Option<Cow<'a, str>> {
        if ptr.is_null() {
            None
        } else {
            Some(CStr::from_ptr(ptr).to_string_lossy())
        }
    }

    pub unsafe extern "C" fn pre_cache(
        fd: c_int,
        file_type: *const c_char,
        context: *mut c_void,
    ) -> cl_error_t {
        let Some(key) = ExternalKey::from_ptr(context) else {
            return ErrorCode::CLEAN.0;
        };
        let file_type = lossy(file_type).unwrap_or_default();
        super::pre_cache(key, fd, &file_type).code().0
    }

    pub unsafe extern "C" fn pre_scan(
        fd: c_int,
        file_type: *const c_char,
        context: *mut c_void,
    ) -> cl_error_t {
        let Some(key) = ExternalKey::from_ptr(context) else {
            return ErrorCode::CLEAN.0;
        };
        let file_type = lossy(file_type).unwrap_or_default();
        super::pre_scan(key, fd, &file_type).code().0
    }

    pub unsafe extern "C" fn post_scan(
        fd: c_int,
        result: c_int,
        virname: *const c_char,
        context: *mut c_void,
    ) -> cl_error_t {
        let Some(key) = ExternalKey::from_ptr(context) else {
            return ErrorCode::CLEAN.0;
        };
        let virname = lossy(virname);
        let verdict: CallbackVerdict =
            super::post_scan(key, fd, ErrorCode(result), virname.as_deref());
        verdict.code().0
    }

    pub unsafe extern "C" fn virus_found(fd: c_int, virname: *const c_char, context: *mut c_void) {
        let Some(key) = ExternalKey::from_ptr(context) else {
            return;
        };
        let virname = lossy(virname).unwrap_or(Cow::Borrowed("Unknown"));
        super::virus_found(key, fd, &virname)
    }
}
