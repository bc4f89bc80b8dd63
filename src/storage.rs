//! Storage backends for key files.

use anyhow::{Context, Result, anyhow};
use getrandom::fill;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Read/write access to files, keyed by path.
///
/// The key-file manager only talks to this trait, so a host can plug in its
/// own file layer (or [`MemoryStorage`] in tests).
pub trait Storage {
    /// Returns `true` if something is stored at `path`.
    fn exists(&self, path: &Path) -> bool;

    /// Loads the entire content stored at `path`.
    fn load(&self, path: &Path) -> Result<Vec<u8>>;

    /// Stores `data` at `path`, replacing any previous content.
    fn save(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Removes whatever is stored at `path`.
    fn remove(&self, path: &Path) -> Result<()>;
}

/// Filesystem storage with crash-safe writes.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileStorage;

impl FileStorage {
    pub fn new() -> Self {
        Self
    }

    /// Generates a unique temporary file path in the same directory.
    ///
    /// Uses cryptographically secure random bytes to avoid name collisions.
    /// Format: `filename.tmp.<randomhex>`
    fn random_tmp_path(path: &Path) -> Result<PathBuf> {
        let mut buf = [0u8; 8]; // 64 bit entropy
        fill(&mut buf).map_err(|e| anyhow!("OS random generator unavailable: {e}"))?;

        let file_name = path
            .file_name()
            .with_context(|| format!("{} has no file name", path.display()))?
            .to_string_lossy();

        let tmp_name = format!("{}.tmp.{}", file_name, hex::encode(buf));

        Ok(path.with_file_name(tmp_name))
    }

    /// Atomically replaces the target file with the temporary file.
    ///
    /// Uses Windows `ReplaceFileW` API with `REPLACEFILE_WRITE_THROUGH` flag
    /// to ensure the operation is truly atomic and persisted to disk.
    #[cfg(target_os = "windows")]
    fn atomic_replace(path: &Path, tmp_path: &Path) -> Result<()> {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;
        use windows_sys::Win32::Storage::FileSystem::{REPLACEFILE_WRITE_THROUGH, ReplaceFileW};

        if !path.exists() {
            fs::rename(tmp_path, path)?;
            return Ok(());
        }

        fn to_wide(s: &OsStr) -> Vec<u16> {
            s.encode_wide().chain(std::iter::once(0)).collect()
        }

        let target_w = to_wide(path.as_os_str());
        let tmp_w = to_wide(tmp_path.as_os_str());

        // SAFETY:
        // - Strings are valid UTF-16 and null-terminated
        // - Pointers remain valid during the call
        // - Windows does not retain the pointers after return
        let result = unsafe {
            ReplaceFileW(
                target_w.as_ptr(),
                tmp_w.as_ptr(),
                std::ptr::null(),
                REPLACEFILE_WRITE_THROUGH,
                std::ptr::null(),
                std::ptr::null(),
            )
        };

        if result == 0 {
            let err = std::io::Error::last_os_error();
            return Err(err).context("atomic replace failed");
        }

        Ok(())
    }

    /// Atomically replaces the target file with the temporary file.
    ///
    /// On Unix, `rename()` is atomic when both paths are on the same filesystem.
    #[cfg(not(target_os = "windows"))]
    fn atomic_replace(path: &Path, tmp_path: &Path) -> Result<()> {
        fs::rename(tmp_path, path)?;
        Ok(())
    }
}

impl Storage for FileStorage {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn load(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).with_context(|| format!("failed to read {}", path.display()))
    }

    /// Writes to a temporary file, fsyncs it, renames it over the target and
    /// fsyncs the parent directory. A crash leaves either the old or the new
    /// file, never a partial one. Missing parent directories are created.
    fn save(&self, path: &Path, data: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = Self::random_tmp_path(path)?;
        debug!(path = %path.display(), tmp = %tmp_path.display(), "writing file");

        // securely create temp file (fail if exists)
        let mut tmp_file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
            .context("failed to create temporary file")?;

        tmp_file.write_all(data)?;
        tmp_file.sync_all()?;
        drop(tmp_file);

        if let Err(e) = Self::atomic_replace(path, &tmp_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        // fsync directory
        #[cfg(not(target_os = "windows"))]
        if let Some(parent) = path.parent() {
            let dir = File::open(parent)?;
            dir.sync_all()?;
        }

        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<()> {
        debug!(path = %path.display(), "removing file");
        fs::remove_file(path).with_context(|| format!("failed to remove {}", path.display()))
    }
}

/// In-memory storage, for hosts that keep key files elsewhere and for tests.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn files(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Vec<u8>>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Storage for MemoryStorage {
    fn exists(&self, path: &Path) -> bool {
        self.files().contains_key(path)
    }

    fn load(&self, path: &Path) -> Result<Vec<u8>> {
        self.files()
            .get(path)
            .cloned()
            .with_context(|| format!("{} does not exist", path.display()))
    }

    fn save(&self, path: &Path, data: &[u8]) -> Result<()> {
        self.files().insert(path.to_path_buf(), data.to_vec());
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<()> {
        self.files()
            .remove(path)
            .map(|_| ())
            .with_context(|| format!("{} does not exist", path.display()))
    }
}

impl<S: Storage + ?Sized> Storage for &S {
    fn exists(&self, path: &Path) -> bool {
        (**self).exists(path)
    }

    fn load(&self, path: &Path) -> Result<Vec<u8>> {
        (**self).load(path)
    }

    fn save(&self, path: &Path, data: &[u8]) -> Result<()> {
        (**self).save(path, data)
    }

    fn remove(&self, path: &Path) -> Result<()> {
        (**self).remove(path)
    }
}
