use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const SCRATCH_PREFIX: &str = "qcrun-";

/// A working directory scoped to one computation.
///
/// The directory is handed to adapters explicitly; the process working directory is
/// never changed. When `delete_on_drop` is set the tree is removed as the value goes
/// out of scope, on success and on every error path alike.
#[derive(Debug)]
pub struct ScratchSpace {
    path: PathBuf,
    created: bool,
    delete_on_drop: bool,
}

impl ScratchSpace {
    /// Uses `explicit` (creating it and any parents if needed) or a fresh unique
    /// directory under the system temp root.
    pub fn acquire(explicit: Option<&Path>, delete_on_drop: bool) -> io::Result<Self> {
        let (path, created) = match explicit {
            Some(path) => {
                let existed = path.is_dir();
                fs::create_dir_all(path)?;
                (path.to_path_buf(), !existed)
            }
            None => {
                let dir = tempfile::Builder::new().prefix(SCRATCH_PREFIX).tempdir()?;
                (dir.keep(), true)
            }
        };
        debug!(path = %path.display(), created, delete_on_drop, "Acquired scratch directory");
        Ok(Self {
            path,
            created,
            delete_on_drop,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn was_created(&self) -> bool {
        self.created
    }

    pub fn deletes_on_drop(&self) -> bool {
        self.delete_on_drop
    }

    /// Keeps the directory on disk after this value is dropped.
    pub fn keep(&mut self) {
        self.delete_on_drop = false;
    }
}

impl Drop for ScratchSpace {
    fn drop(&mut self) {
        if !self.delete_on_drop {
            return;
        }
        match fs::remove_dir_all(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed scratch directory"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove scratch directory"
            ),
        }
    }
}
