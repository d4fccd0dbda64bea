use super::SlotBackend;
use crate::core::Result;
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Slots kept in process memory; nothing reaches the disk
#[derive(Debug, Default)]
pub struct InMemorySlotBackend {
    slots: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemorySlotBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.slots.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.slots.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SlotBackend for InMemorySlotBackend {
    fn write_slot(&self, slot_name: &str, bytes: &[u8]) -> Result<()> {
        self.write().insert(slot_name.to_string(), bytes.to_vec());
        Ok(())
    }

    fn read_slot(&self, slot_name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.read().get(slot_name).cloned())
    }

    fn delete_slot(&self, slot_name: &str) -> Result<bool> {
        Ok(self.write().remove(slot_name).is_some())
    }

    fn slot_names(&self) -> Result<Vec<String>> {
        Ok(self.read().keys().cloned().collect())
    }

    fn slot_exists(&self, slot_name: &str) -> bool {
        self.read().contains_key(slot_name)
    }
}
