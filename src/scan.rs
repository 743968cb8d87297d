// 批量扫描服务
//
// 两个阶段：
// - 发现：遍历给定路径，收集所有普通文件
// - 扫描：每个文件在阻塞线程池中扫描，每个任务持有自己的引擎引用和上下文

use std::os::raw::c_int;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::clamav::{CallbackVerdict, Engine, EngineBackend, ScanContext, ScanOptions, ScanVerdict};

/// 记录单个文件扫描期间的回调事件
#[derive(Debug, Default)]
pub struct ScanRecorder {
    objects: AtomicU32,
    file_types: Mutex<Vec<String>>,
    alerts: Mutex<Vec<String>>,
}

impl ScanRecorder {
    pub fn objects_scanned(&self) -> u32 {
        self.objects.load(Ordering::Relaxed)
    }

    pub fn file_types(&self) -> Vec<String> {
        let mut types = self.file_types.lock().unwrap_or_else(|e| e.into_inner()).clone();
        types.sort();
        types.dedup();
        types
    }

    pub fn alerts(&self) -> Vec<String> {
        self.alerts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl ScanContext for ScanRecorder {
    fn pre_scan(&self, _fd: c_int, file_type: &str) -> CallbackVerdict {
        self.objects.fetch_add(1, Ordering::Relaxed);
        self.file_types
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(file_type.to_string());
        CallbackVerdict::Continue
    }

    fn virus_found(&self, _fd: c_int, virus_name: &str) {
        self.alerts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(virus_name.to_string());
    }
}

/// 单个文件的扫描报告
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<ScanVerdict>,
    pub bytes_scanned: u64,
    pub objects_scanned: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub file_types: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub alerts: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileReport {
    pub fn is_infected(&self) -> bool {
        matches!(self.verdict, Some(ScanVerdict::Infected(_)))
    }
}

/// 一次批量扫描的汇总
#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total_files: usize,
    pub infected_files: usize,
    pub errors: usize,
    pub files: Vec<FileReport>,
}

impl ScanSummary {
    /// (文件, 病毒名)
    pub fn threats(&self) -> Vec<(&Path, &str)> {
        self.files
            .iter()
            .filter_map(|file| match &file.verdict {
                Some(ScanVerdict::Infected(name)) => Some((file.path.as_path(), name.as_str())),
                _ => None,
            })
            .collect()
    }
}

/// 遍历路径，返回所有普通文件（按路径排序）
pub fn discover(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut dir_queue = Vec::new();

    for path in paths {
        if path.is_dir() {
            dir_queue.push(path.clone());
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            tracing::warn!("Path does not exist: {}", path.display());
        }
    }

    let mut dirs_scanned: u32 = 0;
    while let Some(dir) = dir_queue.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!("Failed to read directory {}: {}", dir.display(), e);
                continue;
            }
        };
        dirs_scanned += 1;

        for entry in entries.flatten() {
            let entry_path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            // 不跟随符号链接
            if file_type.is_dir() {
                dir_queue.push(entry_path);
            } else if file_type.is_file() {
                files.push(entry_path);
            }
        }
    }

    files.sort();
    tracing::info!("Discovery complete: {} files in {} dirs", files.len(), dirs_scanned);
    files
}

/// 并发扫描给定路径下的所有文件
pub async fn scan_paths<B>(
    engine: &Engine<B>,
    paths: Vec<PathBuf>,
    options: ScanOptions,
    concurrency: usize,
) -> Result<ScanSummary>
where
    B: EngineBackend + 'static,
{
    let id = Uuid::new_v4();
    let started_at = Utc::now();
    tracing::info!("Starting scan {} over {} paths", id, paths.len());

    let files = tokio::task::spawn_blocking(move || discover(&paths))
        .await
        .context("file discovery task failed")?;

    let permits = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for path in files {
        let permit = permits
            .clone()
            .acquire_owned()
            .await
            .context("scan semaphore closed")?;
        // 每个扫描线程持有独立的引擎引用
        let engine = engine.try_clone()?;

        tasks.spawn_blocking(move || {
            let _permit = permit;
            scan_one(&engine, path, &options)
        });
    }

    let mut reports = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        reports.push(joined.context("scan task panicked")?);
    }
    reports.sort_by(|a, b| a.path.cmp(&b.path));

    let infected_files = reports.iter().filter(|r| r.is_infected()).count();
    let errors = reports.iter().filter(|r| r.error.is_some()).count();
    let summary = ScanSummary {
        id,
        started_at,
        finished_at: Utc::now(),
        total_files: reports.len(),
        infected_files,
        errors,
        files: reports,
    };

    tracing::info!(
        "Scan {} complete: {} files, {} infected, {} errors",
        summary.id,
        summary.total_files,
        summary.infected_files,
        summary.errors
    );
    Ok(summary)
}

fn scan_one<B: EngineBackend>(engine: &Engine<B>, path: PathBuf, options: &ScanOptions) -> FileReport {
    let recorder = Arc::new(ScanRecorder::default());
    let result = engine.scan_file_with_context(&path, options, recorder.clone());

    let (verdict, bytes_scanned, error) = match result {
        Ok(report) => {
            let bytes = report.bytes_scanned();
            (Some(report.verdict), bytes, None)
        }
        Err(e) => (None, 0, Some(e.to_string())),
    };

    FileReport {
        path,
        verdict,
        bytes_scanned,
        objects_scanned: recorder.objects_scanned(),
        file_types: recorder.file_types(),
        alerts: recorder.alerts(),
        error,
    }
}
