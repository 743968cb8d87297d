// ClamAV 引擎生命周期管理
//
// 设计要点:
// - 管理器持有当前引擎，扫描线程通过 engine() 拿到增加过引用计数的句柄
// - 病毒库热重载：新建引擎并替换，旧引擎在最后一个句柄 drop 后释放
// - 初始化失败时进入 Error 状态，可再次 initialize
//
// 引擎状态:
// - Uninitialized: 未初始化
// - Initializing: 正在初始化
// - Ready: 已就绪，可以执行扫描
// - Error: 引擎错误状态

use std::sync::{Mutex, MutexGuard, PoisonError};

use super::backend::{EngineBackend, StatBackend};
use super::engine::Engine;
use super::error::{ClamAVError, Result};
use super::stat::DatabaseStat;
use crate::config::ClamAVConfig;

/// 引擎状态
#[derive(Debug, Clone, PartialEq)]
pub enum EngineState {
    Uninitialized,
    Initializing,
    Ready,
    Error(String),
}

impl EngineState {
    pub fn is_ready(&self) -> bool {
        matches!(self, EngineState::Ready)
    }
}

type Factory<B> = Box<dyn Fn() -> Result<B> + Send + Sync>;

/// ClamAV 引擎管理器
pub struct EngineManager<B: EngineBackend> {
    factory: Factory<B>,
    engine: Mutex<Option<Engine<B>>>,
    state: Mutex<EngineState>,
    config: ClamAVConfig,
}

#[cfg(feature = "libclamav")]
impl EngineManager<super::native::LibClamav> {
    pub fn with_libclamav(config: ClamAVConfig) -> Self {
        Self::new(config, super::native::LibClamav::create)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<B: EngineBackend> EngineManager<B> {
    /// 创建新的引擎管理器，factory 每次调用都创建一个全新的引擎
    pub fn new<F>(config: ClamAVConfig, factory: F) -> Self
    where
        F: Fn() -> Result<B> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            engine: Mutex::new(None),
            state: Mutex::new(EngineState::Uninitialized),
            config,
        }
    }

    pub fn config(&self) -> &ClamAVConfig {
        &self.config
    }

    fn build(&self) -> Result<Engine<B>> {
        let engine = Engine::new((self.factory)()?);
        engine.prepare(&self.config)?;
        Ok(engine)
    }

    /// 初始化引擎，已就绪时直接返回
    pub fn initialize(&self) -> Result<()> {
        {
            let mut state = lock(&self.state);
            if state.is_ready() {
                tracing::info!("Engine already initialized");
                return Ok(());
            }
            *state = EngineState::Initializing;
        }

        tracing::info!(
            "Initializing ClamAV engine with db_dir={}, certs_dir={:?}",
            self.config.database_dir,
            self.config.certs_dir
        );

        match self.build() {
            Ok(engine) => {
                *lock(&self.engine) = Some(engine);
                *lock(&self.state) = EngineState::Ready;
                tracing::info!("Engine state: Ready");
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to initialize ClamAV engine: {}", e);
                *lock(&self.state) = EngineState::Error(e.to_string());
                Err(e)
            }
        }
    }

    /// 获取引擎句柄（已增加引用计数，可在其他线程独立使用）
    pub fn engine(&self) -> Result<Engine<B>> {
        let state = self.state();
        if !state.is_ready() {
            return Err(ClamAVError::Config(format!("Engine not operational: {:?}", state)));
        }
        match lock(&self.engine).as_ref() {
            Some(engine) => engine.try_clone(),
            None => Err(ClamAVError::NullHandle("engine manager")),
        }
    }

    /// 重新构建引擎并替换当前引擎
    ///
    /// 构建失败时保留旧引擎。
    pub fn reload(&self) -> Result<()> {
        tracing::info!("Reloading ClamAV engine with new database");
        let engine = self.build()?;
        let old = lock(&self.engine).replace(engine);
        *lock(&self.state) = EngineState::Ready;
        drop(old);
        tracing::info!("Engine reloaded successfully");
        Ok(())
    }

    /// 病毒库有变化时重新加载
    ///
    /// 引擎重建成功后才刷新快照；失败时变化保留，下次轮询会再次尝试。
    pub fn reload_if_changed<S: StatBackend>(&self, stat: &mut DatabaseStat<S>) -> Result<bool> {
        if !stat.has_changed() {
            return Ok(false);
        }
        self.reload()?;
        stat.reload_if_changed()?;
        Ok(true)
    }

    /// 释放管理器持有的引擎引用
    pub fn shutdown(&self) {
        tracing::info!("Shutting down ClamAV engine");
        let engine = lock(&self.engine).take();
        drop(engine);
        *lock(&self.state) = EngineState::Uninitialized;
        tracing::info!("Engine shutdown complete");
    }

    /// 获取当前引擎状态
    pub fn state(&self) -> EngineState {
        lock(&self.state).clone()
    }

    pub fn health_check(&self) -> bool {
        self.state().is_ready()
    }
}
