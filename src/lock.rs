use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Condvar, LazyLock, Mutex, PoisonError};

/// Working directories with a mutating git command in flight.
static BUSY: LazyLock<(Mutex<HashSet<PathBuf>>, Condvar)> =
    LazyLock::new(|| (Mutex::new(HashSet::new()), Condvar::new()));

/// Exclusive claim on a working directory within this process.
///
/// git serialises index writers with `index.lock` and fails the loser instead
/// of waiting. Holding this guard around every index-mutating command makes
/// concurrent callers in the same process queue up instead.
#[derive(Debug)]
pub struct WorkdirLock {
    path: PathBuf,
}

impl WorkdirLock {
    /// Block until `workdir` is free, then claim it.
    pub fn acquire(workdir: &Path) -> Self {
        let path = normalize(workdir);
        let (busy, released) = &*BUSY;
        let mut busy = busy.lock().unwrap_or_else(PoisonError::into_inner);
        while busy.contains(&path) {
            log::debug!("[WorkdirLock] waiting for {}", path.display());
            busy = released
                .wait(busy)
                .unwrap_or_else(PoisonError::into_inner);
        }
        busy.insert(path.clone());
        Self { path }
    }

    /// Claim `workdir` if nobody holds it.
    pub fn try_acquire(workdir: &Path) -> Option<Self> {
        let path = normalize(workdir);
        let mut busy = BUSY.0.lock().unwrap_or_else(PoisonError::into_inner);
        busy.insert(path.clone()).then(|| Self { path })
    }
}

impl Drop for WorkdirLock {
    fn drop(&mut self) {
        let (busy, released) = &*BUSY;
        busy.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.path);
        released.notify_all();
    }
}

/// Same directory, same key: `repo` and `./repo/` must collide.
fn normalize(workdir: &Path) -> PathBuf {
    fs::canonicalize(workdir).unwrap_or_else(|_| workdir.to_path_buf())
}
