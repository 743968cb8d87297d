// ClamAV 错误类型
//
// 两类错误严格区分：
// - ClamAVError: 可恢复错误，通过 Result 返回给调用方
// - ContractViolation: 调用协议被破坏（程序 bug），不返回，直接 panic

use super::types::{EngineField, ErrorCode};

/// ClamAV 可恢复错误
#[derive(Debug, thiserror::Error)]
pub enum ClamAVError {
    #[error("Initialization failed: {0}")]
    Init(ErrorCode),

    /// 引擎返回的状态码，原样透传
    #[error("{op} failed: {code}")]
    Engine { op: &'static str, code: ErrorCode },

    #[error("Engine handle is null: {0}")]
    NullHandle(&'static str),

    #[error("String contains an interior NUL byte: {0:?}")]
    InvalidString(String),

    #[error("Field {field:?} is not a {expected} field")]
    FieldKind {
        field: EngineField,
        expected: &'static str,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClamAVError {
    /// 引擎返回的状态码（如果有）
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            ClamAVError::Init(code) => Some(*code),
            ClamAVError::Engine { code, .. } => Some(*code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClamAVError>;

/// 协议违规：表示程序 bug，而不是运行时条件
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ContractViolation {
    /// 回调传回了未注册的 key
    #[error("no context for callback key {0:#x}")]
    UnknownKeyOnResolve(usize),
    /// 注销了未注册的 key
    #[error("no context to delete for key {0:#x}")]
    UnknownKeyOnUnregister(usize),
    /// 无法再生成新的 key
    #[error("context key space exhausted")]
    KeySpaceExhausted,
}

/// 报告协议违规并终止当前线程
///
/// 在 `extern "C"` 回调中调用时 panic 无法穿越 C 栈，进程会直接 abort。
#[cold]
#[track_caller]
pub fn fatal(violation: ContractViolation) -> ! {
    tracing::error!("contract violation: {}", violation);
    panic!("contract violation: {}", violation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClamAVError::Engine {
            op: "cl_load",
            code: ErrorCode::EMALFDB,
        };
        assert_eq!(format!("{}", err), "cl_load failed: Malformed database");
        assert_eq!(err.code(), Some(ErrorCode::EMALFDB));
    }

    #[test]
    fn test_io_error_has_no_code() {
        let err = ClamAVError::from(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert!(err.code().is_none());
    }

    #[test]
    fn test_violation_display() {
        assert_eq!(
            ContractViolation::UnknownKeyOnResolve(0x10).to_string(),
            "no context for callback key 0x10"
        );
        assert_eq!(
            ContractViolation::UnknownKeyOnUnregister(0x2a).to_string(),
            "no context to delete for key 0x2a"
        );
        let err: &dyn std::error::Error = &ContractViolation::KeySpaceExhausted;
        assert_eq!(err.to_string(), "context key space exhausted");
    }

    #[test]
    #[should_panic(expected = "contract violation: context key space exhausted")]
    fn test_fatal_panics() {
        fatal(ContractViolation::KeySpaceExhausted);
    }
}
