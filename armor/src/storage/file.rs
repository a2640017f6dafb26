use crate::storage::backend::{Entry, StorageBackend};
use crate::ArmorError;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Local filesystem rooted at `base`.
#[derive(Debug, Clone)]
pub struct FileBackend {
    base: PathBuf,
}

impl FileBackend {
    pub fn new(base: impl Into<PathBuf>) -> Result<Self, ArmorError> {
        let base = base.into();
        fs::create_dir_all(&base).map_err(|e| ArmorError::backend(base.display().to_string(), e))?;
        Ok(Self { base })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn resolve(&self, path: &str) -> PathBuf {
        path.split('/').filter(|s| !s.is_empty()).fold(self.base.clone(), |acc, segment| acc.join(segment))
    }

    fn write_synced(target: &Path, bytes: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(target)?;
        file.write_all(bytes)?;
        file.sync_all()
    }
}

impl StorageBackend for FileBackend {
    fn name(&self) -> &str {
        "file"
    }

    fn list(&self, path: &str) -> Result<Option<Vec<Entry>>, ArmorError> {
        let dir = self.resolve(path);
        let read_dir = match fs::read_dir(&dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ArmorError::backend(path, e)),
        };
        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| ArmorError::backend(path, e))?;
            let file_type = entry.file_type().map_err(|e| ArmorError::backend(path, e))?;
            let name = entry.file_name().to_string_lossy().to_string();
            // in-flight pointer swaps
            if !file_type.is_dir() && name.ends_with(".tmp") {
                continue;
            }
            entries.push(Entry { name, is_dir: file_type.is_dir() });
        }
        entries.sort();
        Ok(Some(entries))
    }

    fn read(&self, path: &str) -> Result<Option<Vec<u8>>, ArmorError> {
        match fs::read(self.resolve(path)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ArmorError::backend(path, e)),
        }
    }

    fn write(&self, path: &str, bytes: &[u8]) -> Result<(), ArmorError> {
        Self::write_synced(&self.resolve(path), bytes).map_err(|e| ArmorError::backend(path, e))
    }

    fn replace(&self, path: &str, bytes: &[u8]) -> Result<(), ArmorError> {
        let target = self.resolve(path);
        let file_name = target.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        let tmp = target.with_file_name(format!("{}.{}.tmp", file_name, uuid::Uuid::new_v4()));
        Self::write_synced(&tmp, bytes).map_err(|e| ArmorError::backend(path, e))?;
        fs::rename(&tmp, &target).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            ArmorError::backend(path, e)
        })
    }

    fn exists(&self, path: &str) -> Result<bool, ArmorError> {
        self.resolve(path).try_exists().map_err(|e| ArmorError::backend(path, e))
    }
}
