//! Slot storage: where finished slot images live between sessions.

pub mod file;
pub mod memory;

pub use file::FileSlotBackend;
pub use memory::InMemorySlotBackend;

use crate::config::{DurabilityMode, PersistConfig};
use crate::core::{PersistError, Result};
use crate::slot::{SlotData, SlotHeader};
use log::{debug, info, warn};
use std::sync::Arc;

/// Storage backend trait - allows pluggable slot stores
pub trait SlotBackend: Send + Sync {
    /// Replace the slot atomically
    fn write_slot(&self, slot_name: &str, bytes: &[u8]) -> Result<()>;

    /// `None` when the slot does not exist
    fn read_slot(&self, slot_name: &str) -> Result<Option<Vec<u8>>>;

    /// Returns whether a slot was removed
    fn delete_slot(&self, slot_name: &str) -> Result<bool>;

    fn slot_names(&self) -> Result<Vec<String>>;

    fn slot_exists(&self, slot_name: &str) -> bool;
}

/// Listing entry for one slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotInfo {
    pub name: String,
    /// `None` when the file exists but its header never got patched
    pub header: Option<SlotHeader>,
}

/// Slot operations over a backend, with async variants that keep disk work off the caller
#[derive(Clone)]
pub struct SlotStorage {
    backend: Arc<dyn SlotBackend>,
    force_sync_io: bool,
}

impl std::fmt::Debug for SlotStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotStorage")
            .field("force_sync_io", &self.force_sync_io)
            .finish_non_exhaustive()
    }
}

impl SlotStorage {
    pub fn new(backend: Arc<dyn SlotBackend>, force_sync_io: bool) -> Self {
        Self { backend, force_sync_io }
    }

    /// File backend in the configured directory, or memory only for [`DurabilityMode::None`]
    pub fn from_config(config: &PersistConfig) -> Result<Self> {
        let backend: Arc<dyn SlotBackend> = match config.durability {
            DurabilityMode::None => Arc::new(InMemorySlotBackend::new()),
            mode => Arc::new(FileSlotBackend::new(
                &config.save_directory,
                &config.slot_extension,
                mode == DurabilityMode::Sync,
            )?),
        };
        Ok(Self::new(backend, config.force_sync_io))
    }

    pub fn backend(&self) -> &Arc<dyn SlotBackend> {
        &self.backend
    }

    // ------------------------------------------------------------------
    // sync API
    // ------------------------------------------------------------------

    pub fn save_slot(&self, slot_name: &str, bytes: Vec<u8>) -> Result<()> {
        validate_slot_name(slot_name)?;
        self.backend.write_slot(slot_name, &bytes)?;
        debug!("Saved slot {} ({} bytes)", slot_name, bytes.len());
        Ok(())
    }

    pub fn load_slot(&self, slot_name: &str) -> Result<Option<Vec<u8>>> {
        validate_slot_name(slot_name)?;
        self.backend.read_slot(slot_name)
    }

    /// Parsed slot; a slot with an unpatched header is an error, never a partial load
    pub fn load_slot_data(&self, slot_name: &str) -> Result<Option<SlotData>> {
        match self.load_slot(slot_name)? {
            Some(bytes) => SlotData::from_bytes(&bytes).map(Some),
            None => Ok(None),
        }
    }

    pub fn delete_slot(&self, slot_name: &str) -> Result<bool> {
        validate_slot_name(slot_name)?;
        let deleted = self.backend.delete_slot(slot_name)?;
        if deleted {
            info!("Deleted slot {}", slot_name);
        }
        Ok(deleted)
    }

    /// Write an empty, valid slot unless one exists already
    pub fn create_slot(&self, slot_name: &str) -> Result<SlotData> {
        validate_slot_name(slot_name)?;
        if let Some(existing) = self.load_slot_data(slot_name)? {
            return Ok(existing);
        }
        let slot = SlotData::new(slot_name);
        self.save_slot(slot_name, slot.to_bytes()?)?;
        info!("Created slot {}", slot_name);
        Ok(slot)
    }

    pub fn list_slots(&self) -> Result<Vec<SlotInfo>> {
        let mut slots = Vec::new();
        for name in self.backend.slot_names()? {
            let header = match self.backend.read_slot(&name)? {
                Some(bytes) => SlotData::read_header(&bytes).ok().filter(SlotHeader::is_valid),
                None => continue,
            };
            if header.is_none() {
                warn!("Slot {} has an invalid header", name);
            }
            slots.push(SlotInfo { name, header });
        }
        Ok(slots)
    }

    // ------------------------------------------------------------------
    // async API
    // ------------------------------------------------------------------

    /// Takes ownership of the bytes; nothing else touches them during the write
    pub async fn save_slot_async(&self, slot_name: &str, bytes: Vec<u8>) -> Result<()> {
        let name = slot_name.to_string();
        self.run_io(move |storage| storage.save_slot(&name, bytes)).await
    }

    pub async fn load_slot_async(&self, slot_name: &str) -> Result<Option<Vec<u8>>> {
        let name = slot_name.to_string();
        self.run_io(move |storage| storage.load_slot(&name)).await
    }

    pub async fn delete_slot_async(&self, slot_name: &str) -> Result<bool> {
        let name = slot_name.to_string();
        self.run_io(move |storage| storage.delete_slot(&name)).await
    }

    pub async fn list_slots_async(&self) -> Result<Vec<SlotInfo>> {
        self.run_io(|storage| storage.list_slots()).await
    }

    async fn run_io<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&SlotStorage) -> Result<T> + Send + 'static,
    {
        if self.force_sync_io {
            return op(self);
        }
        let storage = self.clone();
        tokio::task::spawn_blocking(move || op(&storage))
            .await
            .map_err(|e| PersistError::Io(format!("Slot I/O task failed: {}", e)))?
    }
}

/// Slot names become file names
fn validate_slot_name(slot_name: &str) -> Result<()> {
    let invalid = slot_name.is_empty()
        || slot_name == "."
        || slot_name == ".."
        || slot_name.chars().any(|c| matches!(c, '/' | '\\' | ':' | '\0'));
    if invalid {
        return Err(PersistError::Config(format!("invalid slot name '{}'", slot_name)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_name_validation() {
        assert!(validate_slot_name("autosave_01").is_ok());
        assert!(validate_slot_name("").is_err());
        assert!(validate_slot_name("../escape").is_err());
        assert!(validate_slot_name("a\\b").is_err());
    }

    #[tokio::test]
    async fn test_memory_backend_round_trip() {
        let storage = SlotStorage::new(Arc::new(InMemorySlotBackend::new()), false);
        storage.save_slot_async("quick", vec![1, 2, 3]).await.unwrap();

        assert_eq!(storage.load_slot_async("quick").await.unwrap(), Some(vec![1, 2, 3]));
        assert!(storage.delete_slot_async("quick").await.unwrap());
        assert_eq!(storage.load_slot_async("quick").await.unwrap(), None);
    }

    #[test]
    fn test_listing_flags_invalid_slots() {
        let storage = SlotStorage::new(Arc::new(InMemorySlotBackend::new()), true);
        storage.create_slot("good").unwrap();
        storage.save_slot("torn", vec![0; 8]).unwrap();

        let slots = storage.list_slots().unwrap();
        let good = slots.iter().find(|s| s.name == "good").unwrap();
        let torn = slots.iter().find(|s| s.name == "torn").unwrap();
        assert!(good.header.is_some());
        assert!(torn.header.is_none());
    }
}
