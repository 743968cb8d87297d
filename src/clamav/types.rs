// ClamAV 相关类型定义
//
// 此文件定义了引擎状态码、引擎字段、扫描选项和扫描结果

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ffi;

/// 引擎报告的扫描计数单位（字节）
pub const COUNT_PRECISION: u64 = 4096;

/// 引擎状态码 (cl_error_t)
///
/// 未知的状态码也会原样保留，不做重新解释。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(pub i32);

impl ErrorCode {
    pub const CLEAN: ErrorCode = ErrorCode(0);
    pub const SUCCESS: ErrorCode = ErrorCode(0);
    pub const VIRUS: ErrorCode = ErrorCode(1);
    pub const ENULLARG: ErrorCode = ErrorCode(2);
    pub const EARG: ErrorCode = ErrorCode(3);
    pub const EMALFDB: ErrorCode = ErrorCode(4);
    pub const ECVD: ErrorCode = ErrorCode(5);
    pub const EVERIFY: ErrorCode = ErrorCode(6);
    pub const EUNPACK: ErrorCode = ErrorCode(7);
    pub const EOPEN: ErrorCode = ErrorCode(8);
    pub const ECREAT: ErrorCode = ErrorCode(9);
    pub const EUNLINK: ErrorCode = ErrorCode(10);
    pub const ESTAT: ErrorCode = ErrorCode(11);
    pub const EREAD: ErrorCode = ErrorCode(12);
    pub const ESEEK: ErrorCode = ErrorCode(13);
    pub const EWRITE: ErrorCode = ErrorCode(14);
    pub const EDUP: ErrorCode = ErrorCode(15);
    pub const EACCES: ErrorCode = ErrorCode(16);
    pub const ETMPFILE: ErrorCode = ErrorCode(17);
    pub const ETMPDIR: ErrorCode = ErrorCode(18);
    pub const EMAP: ErrorCode = ErrorCode(19);
    pub const EMEM: ErrorCode = ErrorCode(20);
    pub const ETIMEOUT: ErrorCode = ErrorCode(21);
    pub const BREAK: ErrorCode = ErrorCode(22);
    pub const EMAXREC: ErrorCode = ErrorCode(23);
    pub const EMAXSIZE: ErrorCode = ErrorCode(24);
    pub const EMAXFILES: ErrorCode = ErrorCode(25);
    pub const EFORMAT: ErrorCode = ErrorCode(26);
    pub const EPARSE: ErrorCode = ErrorCode(27);
    pub const EBYTECODE: ErrorCode = ErrorCode(28);
    pub const EBYTECODE_TESTFAIL: ErrorCode = ErrorCode(29);
    pub const ELOCK: ErrorCode = ErrorCode(30);
    pub const EBUSY: ErrorCode = ErrorCode(31);
    pub const ESTATE: ErrorCode = ErrorCode(32);
    pub const VERIFIED: ErrorCode = ErrorCode(33);
    pub const ERROR: ErrorCode = ErrorCode(34);

    pub fn is_success(self) -> bool {
        self == ErrorCode::SUCCESS
    }

    /// 与 cl_strerror 对齐的描述
    pub fn description(self) -> &'static str {
        match self.0 {
            0 => "No viruses detected",
            1 => "Virus(es) detected",
            2 => "Null argument passed to function",
            3 => "Invalid argument passed to function",
            4 => "Malformed database",
            5 => "Broken or not a CVD file",
            6 => "Can't verify database integrity",
            7 => "Can't unpack some data",
            8 => "Can't open file or directory",
            9 => "Can't create new file",
            10 => "Can't unlink file",
            11 => "Can't get file status",
            12 => "Can't read file",
            13 => "Can't set file offset",
            14 => "Can't write to file",
            15 => "Can't duplicate file descriptor",
            16 => "Can't access file",
            17 => "Can't create temporary file",
            18 => "Can't create temporary directory",
            19 => "Can't map file into memory",
            20 => "Can't allocate memory",
            21 => "Time limit reached",
            22 => "Process aborted",
            23 => "Exceeded max recursion depth",
            24 => "Exceeded max scan size",
            25 => "Exceeded max scan files",
            26 => "Bad format or broken data",
            27 => "Parse error",
            28 => "Error during bytecode execution",
            29 => "Failure in bytecode testmode",
            30 => "Mutex lock failed",
            31 => "Scanner still active",
            32 => "Bad state (engine not initialized, or already initialized)",
            33 => "The scanned object was verified and deemed trusted",
            34 => "Unspecified error",
            _ => "Unknown error code",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// 引擎字段值类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Num,
    Str,
}

/// 引擎配置字段 (enum cl_engine_field)
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineField {
    MaxScanSize = 0,
    MaxFileSize,
    MaxRecursion,
    MaxFiles,
    MinCcCount,
    MinSsnCount,
    PuaCategories,
    DbOptions,
    DbVersion,
    DbTime,
    AcOnly,
    AcMinDepth,
    AcMaxDepth,
    TmpDir,
    KeepTmp,
    BytecodeSecurity,
    BytecodeTimeout,
    BytecodeMode,
    MaxEmbeddedPe,
    MaxHtmlNormalize,
    MaxHtmlNoTags,
    MaxScriptNormalize,
    MaxZipTypeRcg,
    ForceToDisk,
    CacheSize,
    DisableCache,
    DisablePeStats,
    StatsTimeout,
    MaxPartitions,
    MaxIconsPe,
    MaxRecHwp3,
    MaxScanTime,
    PcreMatchLimit,
    PcreRecMatchLimit,
    PcreMaxFileSize,
    DisablePeCerts,
    PeDumpCerts,
    CvdCertsDir,
}

impl EngineField {
    pub fn kind(self) -> FieldKind {
        match self {
            EngineField::PuaCategories | EngineField::TmpDir | EngineField::CvdCertsDir => {
                FieldKind::Str
            }
            _ => FieldKind::Num,
        }
    }

    pub fn as_raw(self) -> i32 {
        self as i32
    }
}

// 扫描选项常量 - general 字段
pub const SCAN_GENERAL_ALLMATCHES: u32 = 0x1;
pub const SCAN_GENERAL_COLLECT_METADATA: u32 = 0x2;
pub const SCAN_GENERAL_HEURISTICS: u32 = 0x4;
pub const SCAN_GENERAL_HEURISTIC_PRECEDENCE: u32 = 0x8;
pub const SCAN_GENERAL_UNPRIVILEGED: u32 = 0x10;

// 扫描选项常量 - parse 字段
pub const SCAN_PARSE_ARCHIVE: u32 = 0x1;
pub const SCAN_PARSE_ELF: u32 = 0x2;
pub const SCAN_PARSE_PDF: u32 = 0x4;
pub const SCAN_PARSE_SWF: u32 = 0x8;
pub const SCAN_PARSE_HWP3: u32 = 0x10;
pub const SCAN_PARSE_XMLDOCS: u32 = 0x20;
pub const SCAN_PARSE_MAIL: u32 = 0x40;
pub const SCAN_PARSE_OLE2: u32 = 0x80;
pub const SCAN_PARSE_HTML: u32 = 0x100;
pub const SCAN_PARSE_PE: u32 = 0x200;

pub const SCAN_PARSE_ALL: u32 = SCAN_PARSE_ARCHIVE
    | SCAN_PARSE_ELF
    | SCAN_PARSE_PDF
    | SCAN_PARSE_SWF
    | SCAN_PARSE_HWP3
    | SCAN_PARSE_XMLDOCS
    | SCAN_PARSE_MAIL
    | SCAN_PARSE_OLE2
    | SCAN_PARSE_HTML
    | SCAN_PARSE_PE;

// 扫描选项常量 - heuristic 字段
pub const SCAN_HEURISTIC_BROKEN: u32 = 0x2;
pub const SCAN_HEURISTIC_EXCEEDS_MAX: u32 = 0x4;
pub const SCAN_HEURISTIC_PHISHING_SSL_MISMATCH: u32 = 0x8;
pub const SCAN_HEURISTIC_PHISHING_CLOAK: u32 = 0x10;
pub const SCAN_HEURISTIC_MACROS: u32 = 0x20;
pub const SCAN_HEURISTIC_ENCRYPTED_ARCHIVE: u32 = 0x40;
pub const SCAN_HEURISTIC_ENCRYPTED_DOC: u32 = 0x80;
pub const SCAN_HEURISTIC_PARTITION_INTXN: u32 = 0x100;
pub const SCAN_HEURISTIC_STRUCTURED: u32 = 0x200;

// 扫描选项常量 - mail / dev 字段
pub const SCAN_MAIL_PARTIAL_MESSAGE: u32 = 0x1;
pub const SCAN_DEV_COLLECT_SHA: u32 = 0x1;
pub const SCAN_DEV_COLLECT_PERFORMANCE_INFO: u32 = 0x2;

/// 扫描选项
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOptions {
    pub general: u32,
    pub parse: u32,
    pub heuristic: u32,
    pub mail: u32,
    pub dev: u32,
}

impl Default for ScanOptions {
    /// 启用所有解析器，与 clamscan 默认行为一致
    fn default() -> Self {
        Self {
            general: 0,
            parse: SCAN_PARSE_ALL,
            heuristic: 0,
            mail: 0,
            dev: 0,
        }
    }
}

impl ScanOptions {
    /// 不启用任何解析器
    pub fn raw() -> Self {
        Self {
            general: 0,
            parse: 0,
            heuristic: 0,
            mail: 0,
            dev: 0,
        }
    }

    pub fn with_heuristics(mut self, enabled: bool) -> Self {
        self.set(Field::General, SCAN_GENERAL_HEURISTICS, enabled);
        self
    }

    pub fn with_all_matches(mut self, enabled: bool) -> Self {
        self.set(Field::General, SCAN_GENERAL_ALLMATCHES, enabled);
        self
    }

    pub fn with_archives(mut self, enabled: bool) -> Self {
        self.set(Field::Parse, SCAN_PARSE_ARCHIVE, enabled);
        self
    }

    pub fn with_parse(mut self, flags: u32) -> Self {
        self.parse |= flags;
        self
    }

    pub fn with_heuristic(mut self, flags: u32) -> Self {
        self.heuristic |= flags;
        self
    }

    pub fn heuristics_enabled(&self) -> bool {
        self.general & SCAN_GENERAL_HEURISTICS != 0
    }

    pub fn archives_enabled(&self) -> bool {
        self.parse & SCAN_PARSE_ARCHIVE != 0
    }

    fn set(&mut self, field: Field, flag: u32, enabled: bool) {
        let bits = match field {
            Field::General => &mut self.general,
            Field::Parse => &mut self.parse,
        };
        if enabled {
            *bits |= flag;
        } else {
            *bits &= !flag;
        }
    }

    /// 转换为 C 结构体
    pub fn to_raw(&self) -> ffi::cl_scan_options {
        ffi::cl_scan_options {
            general: self.general,
            parse: self.parse,
            heuristic: self.heuristic,
            mail: self.mail,
            dev: self.dev,
        }
    }
}

enum Field {
    General,
    Parse,
}

/// 病毒库加载选项
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DbOptions(pub u32);

impl DbOptions {
    pub const PHISHING: DbOptions = DbOptions(0x2);
    pub const PHISHING_URLS: DbOptions = DbOptions(0x8);
    pub const PUA: DbOptions = DbOptions(0x10);
    pub const CVDNOTMP: DbOptions = DbOptions(0x20);
    pub const OFFICIAL: DbOptions = DbOptions(0x40);
    pub const PUA_MODE: DbOptions = DbOptions(0x80);
    pub const PUA_INCLUDE: DbOptions = DbOptions(0x100);
    pub const PUA_EXCLUDE: DbOptions = DbOptions(0x200);
    pub const COMPILED: DbOptions = DbOptions(0x400);
    pub const DIRECTORY: DbOptions = DbOptions(0x800);
    pub const OFFICIAL_ONLY: DbOptions = DbOptions(0x1000);
    pub const BYTECODE: DbOptions = DbOptions(0x2000);
    pub const SIGNED: DbOptions = DbOptions(0x4000);
    pub const BYTECODE_UNSIGNED: DbOptions = DbOptions(0x8000);
    pub const UNSIGNED: DbOptions = DbOptions(0x10000);
    pub const BYTECODE_STATS: DbOptions = DbOptions(0x20000);
    pub const ENHANCED: DbOptions = DbOptions(0x40000);
    pub const PCRE_STATS: DbOptions = DbOptions(0x80000);
    pub const YARA_EXCLUDE: DbOptions = DbOptions(0x100000);
    pub const YARA_ONLY: DbOptions = DbOptions(0x200000);

    pub const STDOPT: DbOptions =
        DbOptions(Self::PHISHING.0 | Self::PHISHING_URLS.0 | Self::BYTECODE.0);

    pub fn contains(self, other: DbOptions) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for DbOptions {
    fn default() -> Self {
        Self::STDOPT
    }
}

impl std::ops::BitOr for DbOptions {
    type Output = DbOptions;

    fn bitor(self, rhs: DbOptions) -> DbOptions {
        DbOptions(self.0 | rhs.0)
    }
}

/// 单次扫描的判定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "virus", rename_all = "lowercase")]
pub enum ScanVerdict {
    Clean,
    Infected(String),
}

/// 单次扫描结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub verdict: ScanVerdict,
    /// 已扫描数据量，单位为 COUNT_PRECISION
    pub scanned: u64,
}

impl ScanReport {
    pub fn is_infected(&self) -> bool {
        matches!(self.verdict, ScanVerdict::Infected(_))
    }

    pub fn virus_name(&self) -> Option<&str> {
        match &self.verdict {
            ScanVerdict::Infected(name) => Some(name),
            ScanVerdict::Clean => None,
        }
    }

    pub fn bytes_scanned(&self) -> u64 {
        self.scanned.saturating_mul(COUNT_PRECISION)
    }
}

/// 回调对引擎的答复
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackVerdict {
    /// 继续扫描 (CL_CLEAN)
    Continue,
    /// 停止扫描该对象并视为干净 (CL_BREAK)
    Trust,
    /// 将该对象标记为感染 (CL_VIRUS)
    Block,
}

impl CallbackVerdict {
    pub fn code(self) -> ErrorCode {
        match self {
            CallbackVerdict::Continue => ErrorCode::CLEAN,
            CallbackVerdict::Trust => ErrorCode::BREAK,
            CallbackVerdict::Block => ErrorCode::VIRUS,
        }
    }
}

impl Default for CallbackVerdict {
    fn default() -> Self {
        Self::Continue
    }
}
