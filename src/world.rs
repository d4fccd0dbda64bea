//! State blobs: one chunk per manager under a header that records the shared tables.
//!
//! ```text
//! WorldHeader    { tag, chunk_count, object_table_pos, string_table_pos, data_start, data_size }  (u32 each)
//! Chunk*         { type_tag: name, byte_len: u32, body }
//! ReferenceTable { count: u32, entry*: name }
//! StringTable    { count: u32, entry*: string }
//! ```
//!
//! The header is written as a placeholder and patched once the tables are in place.

use crate::archive::{ArchiveReader, ArchiveWriter, StateReader, StateWriter};
use crate::core::{PersistError, Result};
use crate::manager::StateManager;
use std::io::{Read, Seek, Write};
use tracing::{Level, event, info_span};

pub const INVALID_HEADER_TAG: u32 = 0;
pub const WORLD_HEADER_TAG: u32 = 0x3AEF_241C;
pub const GAME_HEADER_TAG: u32 = 0x8D45_25F3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorldHeader {
    pub tag: u32,
    pub chunk_count: u32,
    pub object_table_pos: u32,
    pub string_table_pos: u32,
    pub data_start: u32,
    pub data_size: u32,
}

impl WorldHeader {
    pub const SIZE: u64 = 24;

    pub fn write<W: Write + Seek>(&self, writer: &mut ArchiveWriter<W>) -> Result<()> {
        for value in [
            self.tag,
            self.chunk_count,
            self.object_table_pos,
            self.string_table_pos,
            self.data_start,
            self.data_size,
        ] {
            writer.write_u32(value)?;
        }
        Ok(())
    }

    pub fn read<R: Read + Seek>(reader: &mut ArchiveReader<R>) -> Result<Self> {
        Ok(Self {
            tag: reader.read_u32()?,
            chunk_count: reader.read_u32()?,
            object_table_pos: reader.read_u32()?,
            string_table_pos: reader.read_u32()?,
            data_start: reader.read_u32()?,
            data_size: reader.read_u32()?,
        })
    }

    /// Every recorded position must lie inside a blob of `len` bytes
    fn validate(&self, len: u64) -> Result<()> {
        let data_end = self.data_start as u64 + self.data_size as u64;
        if (self.data_start as u64) < Self::SIZE
            || data_end > len
            || self.object_table_pos as u64 > len
            || self.string_table_pos as u64 > len
        {
            return Err(PersistError::MalformedChunk(format!(
                "header positions outside of {} byte blob: {:?}",
                len, self
            )));
        }
        Ok(())
    }
}

/// Chunks dispatched and skipped while loading one blob
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    pub skipped: Vec<String>,
}

/// Serialize the records of `managers` into one blob tagged with `tag`.
///
/// Managers must have captured their state already; this only writes.
pub fn save_world<'m, M>(managers: impl IntoIterator<Item = &'m M>, tag: u32) -> Result<Vec<u8>>
where
    M: StateManager + ?Sized + 'm,
{
    let tag_hex = format!("{:#010x}", tag);
    let span = info_span!("persist.world.save", tag = %tag_hex);
    let _enter = span.enter();

    let mut writer = StateWriter::in_memory();
    let header_pos = writer.raw().tell()?;
    WorldHeader::default().write(writer.raw())?;

    let data_start = writer.raw().tell_u32()?;
    let mut chunk_count = 0u32;
    for manager in managers {
        writer.write_name(manager.type_tag())?;
        let length_pos = writer.raw().write_u32_placeholder()?;
        let body_start = writer.raw().tell()?;
        manager.write_chunk(&mut writer)?;
        let body_len = writer.raw().tell()? - body_start;
        let body_len = u32::try_from(body_len)
            .map_err(|_| PersistError::Serialization(format!("chunk {} exceeds 4 GiB", manager.type_tag())))?;
        writer.raw().patch_u32(length_pos, body_len)?;
        chunk_count += 1;
    }
    let data_end = writer.raw().tell_u32()?;

    let object_table_pos = writer.write_reference_table()?;
    let string_table_pos = writer.write_string_table()?;

    let header = WorldHeader {
        tag,
        chunk_count,
        object_table_pos,
        string_table_pos,
        data_start,
        data_size: data_end - data_start,
    };
    let end = writer.raw().tell()?;
    writer.raw().seek(header_pos)?;
    header.write(writer.raw())?;
    writer.raw().seek(end)?;

    event!(
        Level::DEBUG,
        chunks = chunk_count,
        bytes = end,
        names = writer.names().len(),
        references = writer.references().len(),
        "State blob written"
    );
    Ok(writer.into_bytes())
}

/// Read a blob written by [`save_world`] and hand each chunk to the manager with the same tag.
///
/// Chunks with no matching manager are skipped using their recorded length.
pub fn load_world(bytes: &[u8], tag: u32, managers: &mut [Box<dyn StateManager>]) -> Result<LoadReport> {
    let tag_hex = format!("{:#010x}", tag);
    let span = info_span!("persist.world.load", tag = %tag_hex, bytes = bytes.len());
    let _enter = span.enter();

    let mut reader = StateReader::from_slice(bytes);
    let header = WorldHeader::read(reader.raw())
        .map_err(|e| PersistError::MalformedChunk(format!("Failed to read world header: {}", e)))?;
    if header.tag != tag {
        return Err(PersistError::MalformedChunk(format!(
            "expected header tag {:#010x}, found {:#010x}",
            tag, header.tag
        )));
    }
    header.validate(bytes.len() as u64)?;

    reader.load_string_table(header.string_table_pos)?;
    reader.load_reference_table(header.object_table_pos)?;
    reader.raw().seek(header.data_start as u64)?;
    let data_end = header.data_start as u64 + header.data_size as u64;

    let mut report = LoadReport::default();
    for index in 0..header.chunk_count {
        let (chunk_tag, body_len) = read_chunk_header(&mut reader)
            .map_err(|e| PersistError::MalformedChunk(format!("chunk {}: {}", index, e)))?;
        let body_start = reader.raw().tell()?;
        let body_end = body_start + body_len as u64;
        if body_end > data_end {
            return Err(PersistError::MalformedChunk(format!(
                "chunk {} ({}) runs past the data section",
                index, chunk_tag
            )));
        }

        match managers.iter_mut().find(|m| m.type_tag() == chunk_tag) {
            Some(manager) => {
                manager.read_chunk(&mut reader)?;
                let consumed = reader.raw().tell()? - body_start;
                if consumed != body_len as u64 {
                    return Err(PersistError::MalformedChunk(format!(
                        "chunk {} consumed {} of {} bytes",
                        chunk_tag, consumed, body_len
                    )));
                }
                report.loaded.push(chunk_tag);
            }
            None => {
                event!(Level::WARN, chunk = %chunk_tag, bytes = body_len, "No manager for chunk, skipping");
                reader.raw().seek(body_end)?;
                report.skipped.push(chunk_tag);
            }
        }
    }
    Ok(report)
}

fn read_chunk_header<R: Read + Seek>(reader: &mut StateReader<R>) -> Result<(String, u32)> {
    let tag = reader.read_name()?;
    if tag.is_empty() {
        return Err(PersistError::Decode("empty chunk tag".to_string()));
    }
    let len = reader.raw().read_u32()?;
    Ok((tag, len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManagerScope;
    use crate::state::PersistContext;
    use async_trait::async_trait;
    use std::any::Any;
    use std::io::Cursor;

    /// Chunk holding a list of names
    struct NamesManager {
        tag: &'static str,
        names: Vec<String>,
    }

    #[async_trait(?Send)]
    impl StateManager for NamesManager {
        fn type_tag(&self) -> &str {
            self.tag
        }

        fn scope(&self) -> ManagerScope {
            ManagerScope::World
        }

        fn save_state(&mut self, _ctx: &mut PersistContext<'_>) -> Result<()> {
            Ok(())
        }

        fn write_chunk(&self, writer: &mut StateWriter) -> Result<()> {
            writer.raw().write_varint(self.names.len() as u64)?;
            for name in &self.names {
                writer.write_name(name)?;
            }
            Ok(())
        }

        fn read_chunk(&mut self, reader: &mut StateReader<Cursor<&[u8]>>) -> Result<()> {
            let count = reader.raw().read_varint()?;
            self.names = (0..count).map(|_| reader.read_name()).collect::<Result<_>>()?;
            Ok(())
        }

        async fn load_state(&mut self, _ctx: &mut PersistContext<'_>) -> Result<()> {
            Ok(())
        }

        fn reset(&mut self) {
            self.names.clear();
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn names(tag: &'static str, names: &[&str]) -> Box<dyn StateManager> {
        Box::new(NamesManager {
            tag,
            names: names.iter().map(|n| n.to_string()).collect(),
        })
    }

    fn names_of(manager: &dyn StateManager) -> Vec<String> {
        manager
            .as_any()
            .downcast_ref::<NamesManager>()
            .map(|m| m.names.clone())
            .unwrap_or_default()
    }

    #[test]
    fn test_chunks_dispatch_by_tag_not_position() {
        let saved = [names("Alpha", &["door", "lamp"]), names("Beta", &["lamp", "crate"])];
        let bytes = save_world(saved.iter().map(|m| m.as_ref()), WORLD_HEADER_TAG).unwrap();

        let mut loaded = vec![names("Beta", &[]), names("Alpha", &[])];
        let report = load_world(&bytes, WORLD_HEADER_TAG, &mut loaded).unwrap();

        assert_eq!(report.loaded, vec!["Alpha".to_string(), "Beta".to_string()]);
        assert_eq!(names_of(loaded[1].as_ref()), vec!["door", "lamp"]);
        assert_eq!(names_of(loaded[0].as_ref()), vec!["lamp", "crate"]);
    }

    #[test]
    fn test_header_records_tables() {
        let saved = [names("Alpha", &["door", "door", "door"])];
        let bytes = save_world(saved.iter().map(|m| m.as_ref()), GAME_HEADER_TAG).unwrap();
        let header = WorldHeader::read(&mut ArchiveReader::from_slice(&bytes)).unwrap();

        assert_eq!(header.tag, GAME_HEADER_TAG);
        assert_eq!(header.chunk_count, 1);
        assert_eq!(header.data_start as u64, WorldHeader::SIZE);
        assert!(header.object_table_pos < header.string_table_pos);
        assert_eq!(header.object_table_pos, header.data_start + header.data_size);
    }

    #[test]
    fn test_unknown_chunk_is_skipped() {
        let saved = [names("Retired", &["old"]), names("Alpha", &["kept"])];
        let bytes = save_world(saved.iter().map(|m| m.as_ref()), WORLD_HEADER_TAG).unwrap();

        let mut loaded = vec![names("Alpha", &[])];
        let report = load_world(&bytes, WORLD_HEADER_TAG, &mut loaded).unwrap();

        assert_eq!(report.skipped, vec!["Retired".to_string()]);
        assert_eq!(names_of(loaded[0].as_ref()), vec!["kept"]);
    }

    #[test]
    fn test_wrong_header_tag_is_malformed() {
        let bytes = save_world(std::iter::empty::<&dyn StateManager>(), WORLD_HEADER_TAG).unwrap();
        let err = load_world(&bytes, GAME_HEADER_TAG, &mut []).unwrap_err();
        assert!(matches!(err, PersistError::MalformedChunk(_)));
    }

    #[test]
    fn test_truncated_blob_is_malformed() {
        let saved = [names("Alpha", &["door"])];
        let bytes = save_world(saved.iter().map(|m| m.as_ref()), WORLD_HEADER_TAG).unwrap();
        let err = load_world(&bytes[..bytes.len() - 4], WORLD_HEADER_TAG, &mut []).unwrap_err();
        assert!(err.is_fatal() || matches!(err, PersistError::Decode(_) | PersistError::Io(_)));
    }
}
