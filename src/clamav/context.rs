// 回调上下文注册表
//
// libclamav 的回调只接受一个 void* 上下文。我们不把 Rust 对象的地址交给 C，
// 而是发放一个不透明的 key，回调时再通过 key 在注册表中找回原始对象。
//
// 每个 key 的生命周期: 未注册 -> 已注册 -> 已注销（终态，不会再次发放）

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::os::raw::c_void;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use super::callbacks::ScanContext;
use super::error::{fatal, ContractViolation};

/// 交给外部引擎的不透明上下文标识
///
/// 只用作身份标识，永远不会被解引用。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExternalKey(NonZeroUsize);

impl ExternalKey {
    /// 从引擎回传的指针恢复 key，空指针表示“没有上下文”
    pub fn from_ptr(ptr: *mut c_void) -> Option<Self> {
        NonZeroUsize::new(ptr as usize).map(ExternalKey)
    }

    /// 作为 C 回调的 context 参数传递
    pub fn as_ptr(self) -> *mut c_void {
        self.0.get() as *mut c_void
    }

    pub fn id(self) -> usize {
        self.0.get()
    }
}

struct Entries<T> {
    next_id: usize,
    map: HashMap<ExternalKey, T>,
}

/// 上下文注册表
///
/// 所有操作都持有同一把互斥锁，临界区内只有一次 map 操作。
/// key 由单调递增的计数器生成，注销后的 key 不会再被发放，
/// 因此过期的 key 永远不会解析到新的条目。
pub struct ContextRegistry<T> {
    entries: Mutex<Entries<T>>,
}

impl<T> ContextRegistry<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Entries {
                next_id: 1,
                map: HashMap::new(),
            }),
        }
    }

    // 每个临界区都让 map 保持一致，所以中毒的锁可以直接继续使用
    fn lock(&self) -> MutexGuard<'_, Entries<T>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 注册上下文并返回新的 key
    pub fn register(&self, value: T) -> ExternalKey {
        let key = {
            let mut entries = self.lock();
            let minted = NonZeroUsize::new(entries.next_id).and_then(|id| {
                entries.next_id = id.get().checked_add(1)?;
                Some(ExternalKey(id))
            });
            match minted {
                Some(key) => {
                    entries.map.insert(key, value);
                    Some(key)
                }
                None => None,
            }
        };

        match key {
            Some(key) => {
                tracing::trace!("Registered callback context {:#x}", key.id());
                key
            }
            None => fatal(ContractViolation::KeySpaceExhausted),
        }
    }

    /// 注销 key 并返回对应的上下文
    pub fn unregister(&self, key: ExternalKey) -> T {
        let removed = self.lock().map.remove(&key);
        match removed {
            Some(value) => {
                tracing::trace!("Unregistered callback context {:#x}", key.id());
                value
            }
            None => fatal(ContractViolation::UnknownKeyOnUnregister(key.id())),
        }
    }

    pub fn contains(&self, key: ExternalKey) -> bool {
        self.lock().map.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 注册上下文，返回的 guard 在 drop 时注销
    pub fn enter(&self, value: T) -> ContextGuard<'_, T> {
        let key = self.register(value);
        ContextGuard {
            registry: self,
            key,
        }
    }
}

impl<T: Clone> ContextRegistry<T> {
    /// 通过 key 找回上下文
    pub fn resolve(&self, key: ExternalKey) -> T {
        let found = self.lock().map.get(&key).cloned();
        match found {
            Some(value) => value,
            None => fatal(ContractViolation::UnknownKeyOnResolve(key.id())),
        }
    }
}

impl<T> Default for ContextRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// 已注册上下文的作用域守卫
///
/// 扫描调用返回后无论结果如何（干净、感染、错误、panic）都会注销 key。
pub struct ContextGuard<'a, T> {
    registry: &'a ContextRegistry<T>,
    key: ExternalKey,
}

impl<T> ContextGuard<'_, T> {
    pub fn key(&self) -> ExternalKey {
        self.key
    }
}

impl<T> Drop for ContextGuard<'_, T> {
    fn drop(&mut self) {
        let _ = self.registry.unregister(self.key);
    }
}

/// 进程级共享上下文类型
pub type SharedContext = Arc<dyn ScanContext>;

static GLOBAL: OnceLock<ContextRegistry<SharedContext>> = OnceLock::new();

/// 进程级注册表，首次使用时创建，直到进程退出
pub fn global() -> &'static ContextRegistry<SharedContext> {
    GLOBAL.get_or_init(ContextRegistry::new)
}
