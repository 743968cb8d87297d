// Build script for ClamAV FFI linking
//
// 仅在启用 `libclamav` feature 时链接原生库。
// 可通过 CLAMAV_LIB_DIR 指定 libclamav.so 所在目录。

use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-env-changed=CLAMAV_LIB_DIR");

    if env::var_os("CARGO_FEATURE_LIBCLAMAV").is_none() {
        return;
    }

    if let Some(dir) = env::var_os("CLAMAV_LIB_DIR") {
        let lib_path = PathBuf::from(dir);
        let lib_path = lib_path.canonicalize().unwrap_or(lib_path);

        println!("cargo:rustc-link-search={}", lib_path.display());
        println!("cargo:rustc-link-arg=-Wl,-rpath,{}", lib_path.display());
    }

    // 尝试系统路径
    println!("cargo:rustc-link-lib=clamav");
}
