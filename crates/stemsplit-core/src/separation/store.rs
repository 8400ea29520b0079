//! Persistent key → bytes store for model files

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::error::{Result, SeparationError};

/// Persistent byte cache keyed by `"{variant}_{stem}"`
///
/// Every error is reported as `CacheFailure`; callers decide whether it is
/// fatal (the model manager never treats it as such).
pub trait ModelStore: Send {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;
    fn contains(&self, key: &str) -> bool;
    fn remove(&self, key: &str) -> Result<()>;
    /// Total bytes currently stored
    fn size_bytes(&self) -> u64;
}

/// Model store backed by one file per key in a cache directory
pub struct DiskModelStore {
    dir: PathBuf,
}

impl DiskModelStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Local file holding `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.onnx", key))
    }

    fn cache_err(action: &str, path: &Path, e: std::io::Error) -> SeparationError {
        SeparationError::CacheFailure(format!("{} {:?}: {}", action, path, e))
    }
}

impl ModelStore for DiskModelStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::cache_err("Failed to read", &path, e)),
        }
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| Self::cache_err("Failed to create", &self.dir, e))?;

        let path = self.path_for(key);
        let temp_path = path.with_extension("tmp");

        let mut file =
            fs::File::create(&temp_path).map_err(|e| Self::cache_err("Failed to create", &temp_path, e))?;
        file.write_all(bytes)
            .and_then(|_| file.flush())
            .map_err(|e| Self::cache_err("Failed to write", &temp_path, e))?;
        drop(file);

        fs::rename(&temp_path, &path).map_err(|e| {
            fs::remove_file(&temp_path).ok();
            Self::cache_err("Failed to finalize", &path, e)
        })?;

        log::info!("Cached {} ({} bytes) at {:?}", key, bytes.len(), path);
        Ok(())
    }

    fn contains(&self, key: &str) -> bool {
        self.path_for(key).is_file()
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        if path.exists() {
            fs::remove_file(&path).map_err(|e| Self::cache_err("Failed to delete", &path, e))?;
            log::info!("Deleted cached model: {:?}", path);
        }
        Ok(())
    }

    fn size_bytes(&self) -> u64 {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return 0;
        };
        entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "onnx"))
            .filter_map(|entry| entry.metadata().ok())
            .map(|meta| meta.len())
            .sum()
    }
}
