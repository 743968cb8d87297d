// 病毒库目录变更检测
//
// 快照始终由 DatabaseStat 自己持有；重新加载时在原地释放并重建，
// 调用方手里的对象永远指向当前有效的快照。

use std::ffi::CString;
use std::path::{Path, PathBuf};

use super::backend::StatBackend;
use super::error::{ClamAVError, Result};

pub struct DatabaseStat<S: StatBackend> {
    backend: S,
    dir: PathBuf,
    c_dir: CString,
    snapshot: Option<S::Snapshot>,
}

#[cfg(feature = "libclamav")]
impl DatabaseStat<super::native::LibClamavStat> {
    pub fn open_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        Self::open(super::native::LibClamavStat, dir)
    }
}

impl<S: StatBackend> DatabaseStat<S> {
    /// 记录目录当前状态
    pub fn open<P: AsRef<Path>>(backend: S, dir: P) -> Result<Self> {
        use std::os::unix::ffi::OsStrExt;

        let dir = dir.as_ref().to_path_buf();
        let c_dir = CString::new(dir.as_os_str().as_bytes())
            .map_err(|_| ClamAVError::InvalidString(dir.display().to_string()))?;
        let snapshot = backend.init(&c_dir).map_err(|code| ClamAVError::Engine {
            op: "cl_statinidir",
            code,
        })?;

        Ok(Self {
            backend,
            dir,
            c_dir,
            snapshot: Some(snapshot),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn snapshot(&self) -> Option<&S::Snapshot> {
        self.snapshot.as_ref()
    }

    /// 目录自上次快照以来是否有变化
    ///
    /// 快照丢失（上次重建失败）时视为有变化。
    pub fn has_changed(&self) -> bool {
        match &self.snapshot {
            Some(snapshot) => self.backend.changed(snapshot),
            None => true,
        }
    }

    /// 有变化时重建快照，返回是否发生了变化
    pub fn reload_if_changed(&mut self) -> Result<bool> {
        if !self.has_changed() {
            return Ok(false);
        }

        tracing::info!("Virus database changed: {}", self.dir.display());
        self.release();
        let snapshot = self
            .backend
            .init(&self.c_dir)
            .map_err(|code| ClamAVError::Engine {
                op: "cl_statinidir",
                code,
            })?;
        self.snapshot = Some(snapshot);
        Ok(true)
    }

    fn release(&mut self) {
        if let Some(mut snapshot) = self.snapshot.take() {
            let code = self.backend.free(&mut snapshot);
            if !code.is_success() {
                tracing::warn!("cl_statfree failed for {}: {}", self.dir.display(), code);
            }
        }
    }
}

impl<S: StatBackend> Drop for DatabaseStat<S> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clamav::mock::MockStat;

    #[test]
    fn test_unchanged_directory() {
        let backend = MockStat::default();
        let mut stat = DatabaseStat::open(backend.clone(), "/var/lib/clamav").unwrap();

        assert!(!stat.has_changed());
        assert!(!stat.reload_if_changed().unwrap());
        assert_eq!(backend.inits(), 1);
        assert_eq!(stat.dir(), Path::new("/var/lib/clamav"));
    }

    #[test]
    fn test_reload_replaces_snapshot_in_place() {
        let backend = MockStat::default();
        let mut stat = DatabaseStat::open(backend.clone(), "/var/lib/clamav").unwrap();
        assert_eq!(stat.snapshot().unwrap().generation, 0);

        backend.touch();
        assert!(stat.has_changed());
        assert!(stat.reload_if_changed().unwrap());

        let snapshot = stat.snapshot().unwrap();
        assert_eq!(snapshot.generation, 1);
        assert_eq!(snapshot.dir, "/var/lib/clamav");
        assert!(!snapshot.freed);
        assert!(!stat.has_changed());
        assert_eq!(backend.inits(), 2);
        assert_eq!(backend.frees(), 1);
    }

    #[test]
    fn test_drop_frees_snapshot_once() {
        let backend = MockStat::default();
        {
            let mut stat = DatabaseStat::open(backend.clone(), "/db").unwrap();
            backend.touch();
            stat.reload_if_changed().unwrap();
        }
        assert_eq!(backend.inits(), 2);
        assert_eq!(backend.frees(), 2);
    }

    #[test]
    fn test_open_failure() {
        let err = DatabaseStat::open(MockStat::default(), "").err().unwrap();
        assert!(matches!(err, ClamAVError::Engine { op: "cl_statinidir", .. }));
    }
}
