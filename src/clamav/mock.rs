// 测试用的引擎模拟实现
//
// 行为与 libclamav 的调用约定一致：带上下文的扫描会在“引擎线程”中
// 并发触发回调，全部回调结束后扫描调用才返回。

use std::collections::HashMap;
use std::ffi::CStr;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use super::backend::{EngineBackend, RawScan, StatBackend};
use super::callbacks;
use super::context::ExternalKey;
use super::types::{CallbackVerdict, DbOptions, EngineField, ErrorCode, ScanOptions};

/// 扫描期间引擎触发的回调
#[derive(Debug, Clone)]
pub enum MockEvent {
    PreCache(String),
    PreScan(String),
    PostScan(ErrorCode, Option<String>),
    VirusFound(String),
}

#[derive(Default)]
struct MockState {
    refcount: AtomicUsize,
    freed: AtomicBool,
    compiled: AtomicBool,
    signatures: AtomicU32,
    load_error: Mutex<Option<ErrorCode>>,
    loaded: Mutex<Vec<String>>,
    nums: Mutex<HashMap<EngineField, i64>>,
    strs: Mutex<HashMap<EngineField, String>>,
    scripts: Mutex<HashMap<String, (RawScan, Vec<MockEvent>)>>,
    seen_keys: Mutex<Vec<ExternalKey>>,
    open_maps: AtomicUsize,
    maps_opened: AtomicUsize,
}

/// 模拟引擎句柄，clone 出来的句柄共享状态但不持有引用计数
#[derive(Clone)]
pub struct MockBackend {
    state: Arc<MockState>,
    released: bool,
}

#[derive(Debug, Clone)]
pub struct MockSettings {
    nums: HashMap<EngineField, i64>,
    strs: HashMap<EngineField, String>,
}

impl MockBackend {
    pub fn new() -> Self {
        let state = MockState::default();
        state.refcount.store(1, Ordering::SeqCst);
        Self {
            state: Arc::new(state),
            released: false,
        }
    }

    /// 设定某个路径（或文件名）的扫描结果和扫描期间的回调
    pub fn script(&self, target: &str, result: RawScan, events: Vec<MockEvent>) {
        self.state
            .scripts
            .lock()
            .unwrap()
            .insert(target.to_string(), (result, events));
    }

    pub fn set_signatures(&self, count: u32) {
        self.state.signatures.store(count, Ordering::SeqCst);
    }

    pub fn fail_load(&self, code: ErrorCode) {
        *self.state.load_error.lock().unwrap() = Some(code);
    }

    pub fn refcount(&self) -> usize {
        self.state.refcount.load(Ordering::SeqCst)
    }

    pub fn is_freed(&self) -> bool {
        self.state.freed.load(Ordering::SeqCst)
    }

    pub fn is_compiled(&self) -> bool {
        self.state.compiled.load(Ordering::SeqCst)
    }

    pub fn loaded_paths(&self) -> Vec<String> {
        self.state.loaded.lock().unwrap().clone()
    }

    pub fn seen_keys(&self) -> Vec<ExternalKey> {
        self.state.seen_keys.lock().unwrap().clone()
    }

    pub fn open_maps(&self) -> usize {
        self.state.open_maps.load(Ordering::SeqCst)
    }

    pub fn maps_opened(&self) -> usize {
        self.state.maps_opened.load(Ordering::SeqCst)
    }

    fn run(&self, target: &CStr, context: Option<ExternalKey>) -> RawScan {
        let target = target.to_string_lossy().into_owned();
        let script = self.state.scripts.lock().unwrap().get(&target).cloned();
        let Some((result, events)) = script else {
            return RawScan::error(ErrorCode::EOPEN);
        };

        let Some(key) = context else {
            return result;
        };
        self.state.seen_keys.lock().unwrap().push(key);

        let verdicts: Vec<CallbackVerdict> = thread::scope(|scope| {
            let workers: Vec<_> = events
                .into_iter()
                .map(|event| scope.spawn(move || fire(key, event)))
                .collect();
            workers
                .into_iter()
                .map(|worker| worker.join().unwrap())
                .collect()
        });

        if verdicts.contains(&CallbackVerdict::Block) {
            RawScan::virus("Callback.Blocked", result.scanned)
        } else if verdicts.contains(&CallbackVerdict::Trust) {
            RawScan::clean(result.scanned)
        } else {
            result
        }
    }
}

fn fire(key: ExternalKey, event: MockEvent) -> CallbackVerdict {
    const FD: i32 = 3;
    match event {
        MockEvent::PreCache(file_type) => callbacks::pre_cache(key, FD, &file_type),
        MockEvent::PreScan(file_type) => callbacks::pre_scan(key, FD, &file_type),
        MockEvent::PostScan(code, name) => callbacks::post_scan(key, FD, code, name.as_deref()),
        MockEvent::VirusFound(name) => {
            callbacks::virus_found(key, FD, &name);
            CallbackVerdict::Continue
        }
    }
}

impl EngineBackend for MockBackend {
    type Settings = MockSettings;

    fn addref(&self) -> Result<Self, ErrorCode> {
        if self.is_freed() {
            return Err(ErrorCode::ENULLARG);
        }
        self.state.refcount.fetch_add(1, Ordering::SeqCst);
        Ok(Self {
            state: self.state.clone(),
            released: false,
        })
    }

    fn release(&mut self) -> ErrorCode {
        if self.released {
            return ErrorCode::SUCCESS;
        }
        self.released = true;
        if self.state.refcount.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.state.freed.store(true, Ordering::SeqCst);
        }
        ErrorCode::SUCCESS
    }

    fn set_num(&self, field: EngineField, num: i64) -> ErrorCode {
        self.state.nums.lock().unwrap().insert(field, num);
        ErrorCode::SUCCESS
    }

    fn get_num(&self, field: EngineField) -> Result<i64, ErrorCode> {
        Ok(self.state.nums.lock().unwrap().get(&field).copied().unwrap_or(0))
    }

    fn set_str(&self, field: EngineField, value: &CStr) -> ErrorCode {
        self.state
            .strs
            .lock()
            .unwrap()
            .insert(field, value.to_string_lossy().into_owned());
        ErrorCode::SUCCESS
    }

    fn get_str(&self, field: EngineField) -> Result<Option<String>, ErrorCode> {
        Ok(self.state.strs.lock().unwrap().get(&field).cloned())
    }

    fn settings_copy(&self) -> Option<MockSettings> {
        Some(MockSettings {
            nums: self.state.nums.lock().unwrap().clone(),
            strs: self.state.strs.lock().unwrap().clone(),
        })
    }

    fn settings_apply(&self, settings: &MockSettings) -> ErrorCode {
        *self.state.nums.lock().unwrap() = settings.nums.clone();
        *self.state.strs.lock().unwrap() = settings.strs.clone();
        ErrorCode::SUCCESS
    }

    fn load(&self, path: &CStr, _options: DbOptions) -> Result<u32, ErrorCode> {
        if let Some(code) = *self.state.load_error.lock().unwrap() {
            return Err(code);
        }
        self.state
            .loaded
            .lock()
            .unwrap()
            .push(path.to_string_lossy().into_owned());
        Ok(self.state.signatures.load(Ordering::SeqCst))
    }

    fn compile(&self) -> ErrorCode {
        self.state.compiled.store(true, Ordering::SeqCst);
        ErrorCode::SUCCESS
    }

    fn scan_file(&self, path: &CStr, _options: &ScanOptions, context: Option<ExternalKey>) -> RawScan {
        self.run(path, context)
    }

    fn scan_descriptor(
        &self,
        _fd: RawFd,
        filename: &CStr,
        _options: &ScanOptions,
        context: Option<ExternalKey>,
    ) -> RawScan {
        self.run(filename, context)
    }

    fn scan_memory(
        &self,
        _data: &[u8],
        filename: &CStr,
        _options: &ScanOptions,
        context: ExternalKey,
    ) -> RawScan {
        struct OpenMap<'a>(&'a AtomicUsize);
        impl Drop for OpenMap<'_> {
            fn drop(&mut self) {
                self.0.fetch_sub(1, Ordering::SeqCst);
            }
        }

        self.state.maps_opened.fetch_add(1, Ordering::SeqCst);
        self.state.open_maps.fetch_add(1, Ordering::SeqCst);
        let _map = OpenMap(&self.state.open_maps);
        self.run(filename, Some(context))
    }
}

/// 模拟病毒库目录：每次 `touch` 都视为目录内容发生变化
#[derive(Clone, Default)]
pub struct MockStat {
    generation: Arc<AtomicU64>,
    inits: Arc<AtomicUsize>,
    frees: Arc<AtomicUsize>,
}

#[derive(Debug)]
pub struct MockSnapshot {
    pub dir: String,
    pub generation: u64,
    pub freed: bool,
}

impl MockStat {
    pub fn touch(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn inits(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }

    pub fn frees(&self) -> usize {
        self.frees.load(Ordering::SeqCst)
    }
}

impl StatBackend for MockStat {
    type Snapshot = MockSnapshot;

    fn init(&self, dir: &CStr) -> Result<MockSnapshot, ErrorCode> {
        let dir = dir.to_string_lossy().into_owned();
        if dir.is_empty() {
            return Err(ErrorCode::EOPEN);
        }
        self.inits.fetch_add(1, Ordering::SeqCst);
        Ok(MockSnapshot {
            dir,
            generation: self.generation.load(Ordering::SeqCst),
            freed: false,
        })
    }

    fn changed(&self, snapshot: &MockSnapshot) -> bool {
        assert!(!snapshot.freed, "checked a freed snapshot");
        snapshot.generation != self.generation.load(Ordering::SeqCst)
    }

    fn free(&self, snapshot: &mut MockSnapshot) -> ErrorCode {
        assert!(!snapshot.freed, "double free of stat snapshot");
        snapshot.freed = true;
        self.frees.fetch_add(1, Ordering::SeqCst);
        ErrorCode::SUCCESS
    }
}
