//! Slot container: one game-scope state blob plus any number of world blobs keyed by world name.
//!
//! The header goes first with an invalid tag and is rewritten with [`SLOT_HEADER_TAG`] once
//! every section is in place, so an interrupted write never looks like a valid slot.

use crate::archive::{ArchiveReader, ArchiveWriter};
use crate::core::{PersistError, Result};
use crate::world::INVALID_HEADER_TAG;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Seek, Write};

pub const SLOT_HEADER_TAG: u32 = 0x53A4_1B6D;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotHeader {
    pub tag: u32,
    pub slot_name: String,
    pub title: String,
    pub timestamp: DateTime<Utc>,
    pub last_saved_world: String,
    pub game_header_start: u32,
    pub world_header_start: u32,
    pub world_header_count: u32,
}

impl SlotHeader {
    pub fn new(slot_name: &str) -> Self {
        Self {
            tag: INVALID_HEADER_TAG,
            slot_name: slot_name.to_string(),
            title: String::new(),
            timestamp: Utc::now(),
            last_saved_world: String::new(),
            game_header_start: 0,
            world_header_start: 0,
            world_header_count: 0,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.tag == SLOT_HEADER_TAG
    }

    fn write<W: Write + Seek>(&self, writer: &mut ArchiveWriter<W>) -> Result<()> {
        writer.write_u32(self.tag)?;
        writer.write_string(&self.slot_name)?;
        writer.write_string(&self.title)?;
        writer.write_i64(self.timestamp.timestamp_millis())?;
        writer.write_string(&self.last_saved_world)?;
        writer.write_u32(self.game_header_start)?;
        writer.write_u32(self.world_header_start)?;
        writer.write_u32(self.world_header_count)
    }

    fn read<R: Read + Seek>(reader: &mut ArchiveReader<R>) -> Result<Self> {
        let tag = reader.read_u32()?;
        let slot_name = reader.read_string()?;
        let title = reader.read_string()?;
        let millis = reader.read_i64()?;
        let timestamp = DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| PersistError::Decode(format!("slot timestamp {} out of range", millis)))?;
        Ok(Self {
            tag,
            slot_name,
            title,
            timestamp,
            last_saved_world: reader.read_string()?,
            game_header_start: reader.read_u32()?,
            world_header_start: reader.read_u32()?,
            world_header_count: reader.read_u32()?,
        })
    }
}

/// Free-form slot metadata shown by save/load menus
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotDescriptor {
    pub player_name: String,
    pub play_time_seconds: u64,
    pub metadata: BTreeMap<String, String>,
}

impl SlotDescriptor {
    fn to_bytes(&self) -> Result<Vec<u8>> {
        rmp_serde::to_vec(self)
            .map_err(|e| PersistError::Serialization(format!("Failed to serialize slot descriptor: {}", e)))
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        rmp_serde::from_slice(bytes)
            .map_err(|e| PersistError::Decode(format!("Failed to deserialize slot descriptor: {}", e)))
    }
}

/// In-memory image of one slot file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotData {
    pub header: SlotHeader,
    pub descriptor: SlotDescriptor,
    pub game_state: Option<Vec<u8>>,
    /// Newest first
    worlds: Vec<(String, Vec<u8>)>,
}

impl SlotData {
    pub fn new(slot_name: &str) -> Self {
        Self {
            header: SlotHeader::new(slot_name),
            descriptor: SlotDescriptor::default(),
            game_state: None,
            worlds: Vec::new(),
        }
    }

    pub fn slot_name(&self) -> &str {
        &self.header.slot_name
    }

    pub fn world(&self, name: &str) -> Option<&[u8]> {
        self.worlds
            .iter()
            .find(|(world, _)| world == name)
            .map(|(_, bytes)| bytes.as_slice())
    }

    pub fn world_names(&self) -> impl Iterator<Item = &str> {
        self.worlds.iter().map(|(name, _)| name.as_str())
    }

    /// Replace the named world and move it to the front; other worlds are kept
    pub fn set_world(&mut self, name: &str, bytes: Vec<u8>) {
        self.worlds.retain(|(world, _)| world != name);
        self.worlds.insert(0, (name.to_string(), bytes));
        self.header.last_saved_world = name.to_string();
    }

    pub fn remove_world(&mut self, name: &str) -> bool {
        let before = self.worlds.len();
        self.worlds.retain(|(world, _)| world != name);
        self.worlds.len() != before
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = ArchiveWriter::in_memory();
        let mut header = self.header.clone();
        header.tag = INVALID_HEADER_TAG;
        header.world_header_count = u32::try_from(self.worlds.len())
            .map_err(|_| PersistError::Serialization("too many worlds in slot".to_string()))?;
        header.write(&mut writer)?;

        writer.write_bytes(&self.descriptor.to_bytes()?)?;

        header.game_header_start = writer.tell_u32()?;
        match &self.game_state {
            Some(bytes) => {
                writer.write_bool(true)?;
                writer.write_bytes(bytes)?;
            }
            None => writer.write_bool(false)?,
        }

        header.world_header_start = writer.tell_u32()?;
        for (name, bytes) in &self.worlds {
            writer.write_string(name)?;
            writer.write_bytes(bytes)?;
        }

        // same strings, so the rewritten header has the same length
        header.tag = SLOT_HEADER_TAG;
        let end = writer.tell()?;
        writer.seek(0)?;
        header.write(&mut writer)?;
        writer.seek(end)?;
        Ok(writer.into_bytes())
    }

    /// Header only, for slot listings
    pub fn read_header(bytes: &[u8]) -> Result<SlotHeader> {
        SlotHeader::read(&mut ArchiveReader::from_slice(bytes))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = ArchiveReader::from_slice(bytes);
        let header = SlotHeader::read(&mut reader)?;
        if !header.is_valid() {
            return Err(PersistError::Decode(format!(
                "slot {} has header tag {:#010x}, the write did not complete",
                header.slot_name, header.tag
            )));
        }
        let descriptor = SlotDescriptor::from_bytes(&reader.read_bytes()?)?;

        reader.seek(header.game_header_start as u64)?;
        let game_state = if reader.read_bool()? {
            Some(reader.read_bytes()?)
        } else {
            None
        };

        reader.seek(header.world_header_start as u64)?;
        let mut worlds = Vec::with_capacity(header.world_header_count as usize);
        for _ in 0..header.world_header_count {
            let name = reader.read_string()?;
            let bytes = reader.read_bytes()?;
            worlds.push((name, bytes));
        }

        Ok(Self {
            header,
            descriptor,
            game_state,
            worlds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_round_trip_keeps_newest_world_first() {
        let mut slot = SlotData::new("autosave");
        slot.descriptor.player_name = "Ada".to_string();
        slot.game_state = Some(vec![1, 2, 3]);
        slot.set_world("Town", vec![10]);
        slot.set_world("Caves", vec![20, 21]);
        slot.set_world("Town", vec![11]);

        let loaded = SlotData::from_bytes(&slot.to_bytes().unwrap()).unwrap();

        assert!(loaded.header.is_valid());
        assert_eq!(loaded.header.last_saved_world, "Town");
        assert_eq!(loaded.world_names().collect::<Vec<_>>(), vec!["Town", "Caves"]);
        assert_eq!(loaded.world("Town"), Some(&[11u8][..]));
        assert_eq!(loaded.world("Caves"), Some(&[20u8, 21][..]));
        assert_eq!(loaded.game_state, Some(vec![1, 2, 3]));
        assert_eq!(loaded.descriptor.player_name, "Ada");
        assert_eq!(
            loaded.header.timestamp.timestamp_millis(),
            slot.header.timestamp.timestamp_millis()
        );
    }

    #[test]
    fn test_unpatched_header_is_rejected() {
        let mut slot = SlotData::new("broken");
        slot.set_world("Town", vec![1]);
        let mut bytes = slot.to_bytes().unwrap();
        bytes[..4].copy_from_slice(&INVALID_HEADER_TAG.to_le_bytes());

        assert!(!SlotData::read_header(&bytes).unwrap().is_valid());
        assert!(matches!(SlotData::from_bytes(&bytes), Err(PersistError::Decode(_))));
    }

    #[test]
    fn test_empty_slot_has_no_state() {
        let loaded = SlotData::from_bytes(&SlotData::new("fresh").to_bytes().unwrap()).unwrap();
        assert!(loaded.game_state.is_none());
        assert_eq!(loaded.world_names().count(), 0);
    }
}
