use super::raw::{ArchiveReader, ArchiveWriter};
use super::strings::{StringInterner, StringTable};
use crate::core::{AssetPath, PersistError, Result};
use crate::identity::ObjectId;
use std::collections::HashMap;
use std::io::{Cursor, Read, Seek, Write};

// ============================================================================
// Reference Tracker
// ============================================================================

/// Ordered set of asset paths with 1-based indices.
///
/// Serves as the per-save reference table and as a level's hard dependency list.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReferenceTracker {
    indices: HashMap<AssetPath, u32>,
    paths: Vec<AssetPath>,
}

impl ReferenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_paths(paths: impl IntoIterator<Item = AssetPath>) -> Self {
        let mut tracker = Self::new();
        for path in paths {
            tracker.track(&path);
        }
        tracker
    }

    /// Index of `path`, adding it on first use. Empty paths are never tracked.
    pub fn track(&mut self, path: &AssetPath) -> u32 {
        if path.is_empty() {
            return 0;
        }
        if let Some(index) = self.indices.get(path) {
            return *index;
        }
        self.paths.push(path.clone());
        let index = self.paths.len() as u32;
        self.indices.insert(path.clone(), index);
        index
    }

    pub fn get(&self, index: u64) -> Result<&AssetPath> {
        index
            .checked_sub(1)
            .and_then(|i| self.paths.get(i as usize))
            .ok_or_else(|| PersistError::Decode(format!("reference index {} out of range", index)))
    }

    pub fn contains(&self, path: &AssetPath) -> bool {
        self.indices.contains_key(path)
    }

    pub fn paths(&self) -> &[AssetPath] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn clear(&mut self) {
        self.indices.clear();
        self.paths.clear();
    }
}

/// A hard reference as stored in a save
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ObjectRef {
    #[default]
    None,
    /// Top-level asset, resolvable without this save
    Asset(AssetPath),
    /// Node that must be linked when the reference is resolved
    Node(ObjectId),
}

impl ObjectRef {
    pub fn node(id: ObjectId) -> Self {
        if id.is_valid() { ObjectRef::Node(id) } else { ObjectRef::None }
    }

    pub fn as_node(&self) -> Option<&ObjectId> {
        match self {
            ObjectRef::Node(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ObjectRef::None)
    }
}

// ============================================================================
// State Writer
// ============================================================================

/// Raw archive wrapped in a reference interner and a string interner.
pub struct StateWriter<W = Cursor<Vec<u8>>> {
    raw: ArchiveWriter<W>,
    names: StringInterner,
    references: ReferenceTracker,
    debug_names: bool,
}

impl StateWriter<Cursor<Vec<u8>>> {
    pub fn in_memory() -> Self {
        Self::new(ArchiveWriter::in_memory())
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.raw.into_bytes()
    }
}

impl<W: Write + Seek> StateWriter<W> {
    pub fn new(raw: ArchiveWriter<W>) -> Self {
        Self {
            raw,
            names: StringInterner::new(),
            references: ReferenceTracker::new(),
            debug_names: false,
        }
    }

    /// Write object id debug names; diagnostic builds only
    pub fn with_debug_names(mut self, enabled: bool) -> Self {
        self.debug_names = enabled;
        self
    }

    pub fn raw(&mut self) -> &mut ArchiveWriter<W> {
        &mut self.raw
    }

    pub fn names(&self) -> &StringInterner {
        &self.names
    }

    pub fn references(&self) -> &ReferenceTracker {
        &self.references
    }

    pub fn write_name(&mut self, name: &str) -> Result<()> {
        let index = self.names.intern(name);
        self.raw.write_varint(index as u64)
    }

    pub fn write_object_id(&mut self, id: &ObjectId) -> Result<()> {
        id.write(&mut self.raw, self.debug_names)
    }

    /// Asset references go through the reference table; anything else is an inline id
    pub fn write_ref(&mut self, reference: &ObjectRef) -> Result<()> {
        match reference {
            ObjectRef::Asset(path) if !path.is_empty() => {
                let index = self.references.track(path);
                self.raw.write_varint(index as u64)
            }
            ObjectRef::Node(id) => {
                self.raw.write_varint(0)?;
                self.write_object_id(id)
            }
            _ => {
                self.raw.write_varint(0)?;
                self.write_object_id(&ObjectId::INVALID)
            }
        }
    }

    /// Index into the reference table, 0 for none
    pub fn write_soft_ref(&mut self, path: Option<&AssetPath>) -> Result<()> {
        let index = path.map(|p| self.references.track(p)).unwrap_or(0);
        self.raw.write_varint(index as u64)
    }

    /// Write the reference table at the current position and return that position.
    /// Entries are name indices, so this must precede the string table.
    pub fn write_reference_table(&mut self) -> Result<u32> {
        let pos = self.raw.tell_u32()?;
        let paths: Vec<AssetPath> = self.references.paths().to_vec();
        self.raw.write_u32(paths.len() as u32)?;
        for path in &paths {
            self.write_name(path.as_str())?;
        }
        Ok(pos)
    }

    pub fn write_string_table(&mut self) -> Result<u32> {
        let pos = self.raw.tell_u32()?;
        self.names.write_table(&mut self.raw)?;
        Ok(pos)
    }

    pub fn into_raw(self) -> ArchiveWriter<W> {
        self.raw
    }
}

// ============================================================================
// State Reader
// ============================================================================

pub struct StateReader<R> {
    raw: ArchiveReader<R>,
    names: StringTable,
    references: ReferenceTracker,
}

impl<'a> StateReader<Cursor<&'a [u8]>> {
    pub fn from_slice(bytes: &'a [u8]) -> Self {
        Self::new(ArchiveReader::from_slice(bytes))
    }
}

impl<R: Read + Seek> StateReader<R> {
    pub fn new(raw: ArchiveReader<R>) -> Self {
        Self {
            raw,
            names: StringTable::default(),
            references: ReferenceTracker::new(),
        }
    }

    pub fn raw(&mut self) -> &mut ArchiveReader<R> {
        &mut self.raw
    }

    pub fn references(&self) -> &ReferenceTracker {
        &self.references
    }

    /// Load the string table stored at `pos`; the read position is restored afterwards
    pub fn load_string_table(&mut self, pos: u32) -> Result<()> {
        let resume = self.raw.tell()?;
        self.raw.seek(pos as u64)?;
        self.names = StringTable::read_from(&mut self.raw)?;
        self.raw.seek(resume)
    }

    /// Load the reference table stored at `pos`. Requires the string table.
    pub fn load_reference_table(&mut self, pos: u32) -> Result<()> {
        let resume = self.raw.tell()?;
        self.raw.seek(pos as u64)?;
        let count = self.raw.read_u32()?;
        if count as u64 > self.raw.remaining()? {
            return Err(PersistError::Decode(format!(
                "reference table claims {} entries beyond end of archive",
                count
            )));
        }
        let mut references = ReferenceTracker::new();
        for _ in 0..count {
            let path = AssetPath::new(self.read_name()?);
            references.track(&path);
        }
        self.references = references;
        self.raw.seek(resume)
    }

    pub fn read_name(&mut self) -> Result<String> {
        let index = self.raw.read_varint()?;
        self.names.get(index).map(str::to_string)
    }

    pub fn read_object_id(&mut self) -> Result<ObjectId> {
        ObjectId::read(&mut self.raw)
    }

    pub fn read_ref(&mut self) -> Result<ObjectRef> {
        let index = self.raw.read_varint()?;
        if index > 0 {
            return Ok(ObjectRef::Asset(self.references.get(index)?.clone()));
        }
        Ok(ObjectRef::node(self.read_object_id()?))
    }

    pub fn read_soft_ref(&mut self) -> Result<Option<AssetPath>> {
        match self.raw.read_varint()? {
            0 => Ok(None),
            index => Ok(Some(self.references.get(index)?.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finish(mut writer: StateWriter) -> (Vec<u8>, u32, u32) {
        let refs = writer.write_reference_table().unwrap();
        let strings = writer.write_string_table().unwrap();
        (writer.into_bytes(), refs, strings)
    }

    fn open(bytes: &[u8], refs: u32, strings: u32) -> StateReader<Cursor<&[u8]>> {
        let mut reader = StateReader::from_slice(bytes);
        reader.load_string_table(strings).unwrap();
        reader.load_reference_table(refs).unwrap();
        reader
    }

    #[test]
    fn test_repeated_names_intern_once() {
        let mut writer = StateWriter::in_memory();
        for _ in 0..5 {
            writer.write_name("/Game/Props/Crate.Crate_C").unwrap();
        }
        assert_eq!(writer.names().len(), 1);
        let (bytes, refs, strings) = finish(writer);

        let mut reader = open(&bytes, refs, strings);
        for _ in 0..5 {
            assert_eq!(reader.read_name().unwrap(), "/Game/Props/Crate.Crate_C");
        }
    }

    #[test]
    fn test_hard_and_soft_refs() {
        let crate_class = AssetPath::new("/Game/Props/Crate.Crate_C");
        let node = ObjectId::new_dynamic(Some("Crate_1"));

        let mut writer = StateWriter::in_memory();
        writer.write_ref(&ObjectRef::Asset(crate_class.clone())).unwrap();
        writer.write_ref(&ObjectRef::Node(node.clone())).unwrap();
        writer.write_ref(&ObjectRef::None).unwrap();
        writer.write_soft_ref(Some(&crate_class)).unwrap();
        writer.write_soft_ref(None).unwrap();
        assert_eq!(writer.references().len(), 1);
        let (bytes, refs, strings) = finish(writer);

        let mut reader = open(&bytes, refs, strings);
        assert_eq!(reader.read_ref().unwrap(), ObjectRef::Asset(crate_class.clone()));
        assert_eq!(reader.read_ref().unwrap(), ObjectRef::Node(node));
        assert!(reader.read_ref().unwrap().is_none());
        assert_eq!(reader.read_soft_ref().unwrap(), Some(crate_class));
        assert_eq!(reader.read_soft_ref().unwrap(), None);
    }

    #[test]
    fn test_out_of_range_reference_index() {
        let mut writer = StateWriter::in_memory();
        writer.raw().write_varint(9).unwrap();
        let (bytes, refs, strings) = finish(writer);
        let mut reader = open(&bytes, refs, strings);
        assert!(matches!(reader.read_ref(), Err(PersistError::Decode(_))));
    }
}
