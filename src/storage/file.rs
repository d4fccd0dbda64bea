use super::SlotBackend;
use crate::core::{PersistError, Result};
use log::debug;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// One file per slot in a directory. Writes go to a temp file that is renamed into place.
#[derive(Debug, Clone)]
pub struct FileSlotBackend {
    directory: PathBuf,
    extension: String,
    sync_writes: bool,
}

impl FileSlotBackend {
    pub fn new(directory: impl AsRef<Path>, extension: &str, sync_writes: bool) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory).map_err(|e| {
            PersistError::Io(format!("Failed to create save directory {}: {}", directory.display(), e))
        })?;
        Ok(Self {
            directory,
            extension: extension.trim_start_matches('.').to_string(),
            sync_writes,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn slot_path(&self, slot_name: &str) -> PathBuf {
        self.directory.join(format!("{}.{}", slot_name, self.extension))
    }
}

impl SlotBackend for FileSlotBackend {
    fn write_slot(&self, slot_name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.slot_path(slot_name);
        let mut temp = NamedTempFile::new_in(&self.directory)
            .map_err(|e| PersistError::Io(format!("Failed to create temp file: {}", e)))?;
        temp.write_all(bytes)
            .map_err(|e| PersistError::Io(format!("Failed to write slot {}: {}", slot_name, e)))?;
        temp.flush()
            .map_err(|e| PersistError::Io(format!("Failed to flush slot {}: {}", slot_name, e)))?;
        if self.sync_writes {
            temp.as_file()
                .sync_all()
                .map_err(|e| PersistError::Io(format!("Failed to sync slot {}: {}", slot_name, e)))?;
        }
        temp.persist(&path)
            .map_err(|e| PersistError::Io(format!("Failed to move slot into {}: {}", path.display(), e)))?;
        debug!("Wrote {}", path.display());
        Ok(())
    }

    fn read_slot(&self, slot_name: &str) -> Result<Option<Vec<u8>>> {
        let path = self.slot_path(slot_name);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PersistError::Io(format!("Failed to read {}: {}", path.display(), e))),
        }
    }

    fn delete_slot(&self, slot_name: &str) -> Result<bool> {
        let path = self.slot_path(slot_name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(PersistError::Io(format!("Failed to delete {}: {}", path.display(), e))),
        }
    }

    fn slot_names(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.directory).map_err(|e| {
            PersistError::Io(format!("Failed to list {}: {}", self.directory.display(), e))
        })?;
        let mut names = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(self.extension.as_str()) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn slot_exists(&self, slot_name: &str) -> bool {
        self.slot_path(slot_name).is_file()
    }
}
