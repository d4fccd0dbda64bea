//! Object identity: GUID-based ids that survive destruction and recreation of live nodes.
//!
//! Static ids are derived from a stable path through the graph and are recomputed on every
//! run. Dynamic ids are random and only survive by being written into a save.

pub mod registry;
pub mod stable_path;

use crate::archive::raw::{ArchiveReader, ArchiveWriter};
use crate::core::{PersistError, Result};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::{Read, Seek, Write};
use uuid::Uuid;

pub use registry::IdentityRegistry;
pub use stable_path::{PathRemapper, stable_path};

const FLAG_VALID: u8 = 1 << 0;
const FLAG_DYNAMIC: u8 = 1 << 1;
const FLAG_DEBUG_NAME: u8 = 1 << 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum IdKind {
    #[default]
    Unset,
    Static,
    Dynamic,
}

/// Identity of a graph node.
///
/// Equality, ordering and hashing consider the GUID and kind only; the debug name is
/// diagnostic payload.
#[derive(Debug, Clone, Default)]
pub struct ObjectId {
    guid: Uuid,
    kind: IdKind,
    debug_name: Option<String>,
}

impl ObjectId {
    pub const INVALID: ObjectId = ObjectId {
        guid: Uuid::nil(),
        kind: IdKind::Unset,
        debug_name: None,
    };

    /// Deterministic id for a stable path under `seed`
    pub fn new_static(seed: &Uuid, stable_path: &str) -> Self {
        Self {
            guid: Uuid::new_v5(seed, stable_path.as_bytes()),
            kind: IdKind::Static,
            debug_name: Some(stable_path.to_string()),
        }
    }

    pub fn new_dynamic(debug_name: Option<&str>) -> Self {
        Self {
            guid: Uuid::new_v4(),
            kind: IdKind::Dynamic,
            debug_name: debug_name.map(str::to_string),
        }
    }

    pub fn from_parts(guid: Uuid, kind: IdKind) -> Self {
        if guid.is_nil() || kind == IdKind::Unset {
            return Self::INVALID;
        }
        Self {
            guid,
            kind,
            debug_name: None,
        }
    }

    pub fn with_debug_name(mut self, name: impl Into<String>) -> Self {
        self.debug_name = Some(name.into());
        self
    }

    pub fn guid(&self) -> Uuid {
        self.guid
    }

    pub fn kind(&self) -> IdKind {
        self.kind
    }

    pub fn debug_name(&self) -> Option<&str> {
        self.debug_name.as_deref()
    }

    pub fn is_valid(&self) -> bool {
        self.kind != IdKind::Unset && !self.guid.is_nil()
    }

    pub fn is_static(&self) -> bool {
        self.is_valid() && self.kind == IdKind::Static
    }

    pub fn is_dynamic(&self) -> bool {
        self.is_valid() && self.kind == IdKind::Dynamic
    }

    /// GUID plus debug name, for logs
    pub fn describe(&self) -> String {
        match &self.debug_name {
            Some(name) => format!("{} ({})", name, self.guid.simple()),
            None => self.guid.simple().to_string(),
        }
    }

    /// Wire form: flags byte, then GUID and optional debug name when valid
    pub fn write<W: Write + Seek>(&self, writer: &mut ArchiveWriter<W>, with_debug_name: bool) -> Result<()> {
        if !self.is_valid() {
            return writer.write_u8(0);
        }
        let mut flags = FLAG_VALID;
        if self.kind == IdKind::Dynamic {
            flags |= FLAG_DYNAMIC;
        }
        let name = self.debug_name.as_deref().filter(|_| with_debug_name);
        if name.is_some() {
            flags |= FLAG_DEBUG_NAME;
        }
        writer.write_u8(flags)?;
        writer.write_uuid(&self.guid)?;
        if let Some(name) = name {
            writer.write_string(name)?;
        }
        Ok(())
    }

    pub fn read<R: Read + Seek>(reader: &mut ArchiveReader<R>) -> Result<Self> {
        let flags = reader.read_u8()?;
        if flags & !(FLAG_VALID | FLAG_DYNAMIC | FLAG_DEBUG_NAME) != 0 {
            return Err(PersistError::Decode(format!("unknown object id flags {:#04x}", flags)));
        }
        if flags & FLAG_VALID == 0 {
            return Ok(Self::INVALID);
        }
        let guid = reader.read_uuid()?;
        let kind = if flags & FLAG_DYNAMIC != 0 {
            IdKind::Dynamic
        } else {
            IdKind::Static
        };
        let debug_name = if flags & FLAG_DEBUG_NAME != 0 {
            Some(reader.read_string()?)
        } else {
            None
        };
        Ok(Self {
            guid,
            kind,
            debug_name,
        })
    }
}

impl PartialEq for ObjectId {
    fn eq(&self, other: &Self) -> bool {
        self.guid == other.guid && self.kind == other.kind
    }
}

impl Eq for ObjectId {}

impl Hash for ObjectId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.guid.hash(state);
    }
}

impl PartialOrd for ObjectId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ObjectId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.guid.cmp(&other.guid).then(self.kind.cmp(&other.kind))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.guid.simple())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_GUID_SEED;

    #[test]
    fn test_static_ids_are_deterministic() {
        let a = ObjectId::new_static(&DEFAULT_GUID_SEED, "/Game/Maps/Town.Town:PersistentLevel.Door_1");
        let b = ObjectId::new_static(&DEFAULT_GUID_SEED, "/Game/Maps/Town.Town:PersistentLevel.Door_1");
        let c = ObjectId::new_static(&DEFAULT_GUID_SEED, "/Game/Maps/Town.Town:PersistentLevel.Door_2");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.is_static());
    }

    #[test]
    fn test_seed_changes_guid() {
        let other = Uuid::from_u128(42);
        assert_ne!(
            ObjectId::new_static(&DEFAULT_GUID_SEED, "path").guid(),
            ObjectId::new_static(&other, "path").guid()
        );
    }

    #[test]
    fn test_dynamic_ids_are_unique() {
        let a = ObjectId::new_dynamic(Some("Crate_3"));
        let b = ObjectId::new_dynamic(Some("Crate_3"));
        assert!(a.is_dynamic());
        assert_ne!(a, b);
    }

    #[test]
    fn test_equality_ignores_debug_name() {
        let guid = Uuid::new_v4();
        let plain = ObjectId::from_parts(guid, IdKind::Dynamic);
        let named = ObjectId::from_parts(guid, IdKind::Dynamic).with_debug_name("Crate");
        assert_eq!(plain, named);
        assert_ne!(plain, ObjectId::from_parts(guid, IdKind::Static));
    }

    #[test]
    fn test_invalid_ids() {
        assert!(!ObjectId::INVALID.is_valid());
        assert!(!ObjectId::default().is_valid());
        assert!(!ObjectId::from_parts(Uuid::nil(), IdKind::Static).is_valid());
        assert!(!ObjectId::from_parts(Uuid::new_v4(), IdKind::Unset).is_valid());
    }

    #[test]
    fn test_wire_form() {
        let id = ObjectId::new_dynamic(Some("Crate_3"));
        let mut writer = ArchiveWriter::in_memory();
        id.write(&mut writer, true).unwrap();
        ObjectId::INVALID.write(&mut writer, true).unwrap();
        id.write(&mut writer, false).unwrap();
        let bytes = writer.into_bytes();
        // flags + guid + name, a lone flags byte, flags + guid
        assert_eq!(bytes.len(), (1 + 16 + 1 + 7) + 1 + (1 + 16));

        let mut reader = ArchiveReader::from_slice(&bytes);
        let named = ObjectId::read(&mut reader).unwrap();
        assert_eq!(named, id);
        assert_eq!(named.debug_name(), Some("Crate_3"));
        assert!(!ObjectId::read(&mut reader).unwrap().is_valid());
        let bare = ObjectId::read(&mut reader).unwrap();
        assert_eq!(bare, id);
        assert_eq!(bare.debug_name(), None);
    }

    #[test]
    fn test_display_is_simple_guid() {
        let id = ObjectId::from_parts(Uuid::from_u128(0xABCD), IdKind::Static);
        assert_eq!(id.to_string(), "0000000000000000000000000000abcd");
    }
}
