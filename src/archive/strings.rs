use super::raw::{ArchiveReader, ArchiveWriter};
use crate::core::{PersistError, Result};
use std::collections::HashMap;
use std::io::{Read, Seek, Write};

/// Write-side name table. Index 0 is the empty name; real entries start at 1.
#[derive(Debug, Default)]
pub struct StringInterner {
    indices: HashMap<String, u32>,
    strings: Vec<String>,
}

impl StringInterner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, value: &str) -> u32 {
        if value.is_empty() {
            return 0;
        }
        if let Some(index) = self.indices.get(value) {
            return *index;
        }
        self.strings.push(value.to_string());
        let index = self.strings.len() as u32;
        self.indices.insert(value.to_string(), index);
        index
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// `count: u32` followed by every entry in index order
    pub fn write_table<W: Write + Seek>(&self, writer: &mut ArchiveWriter<W>) -> Result<()> {
        writer.write_u32(self.strings.len() as u32)?;
        for value in &self.strings {
            writer.write_string(value)?;
        }
        Ok(())
    }
}

/// Read-side name table
#[derive(Debug, Default, Clone)]
pub struct StringTable {
    strings: Vec<String>,
}

impl StringTable {
    pub fn read_from<R: Read + Seek>(reader: &mut ArchiveReader<R>) -> Result<Self> {
        let count = reader.read_u32()?;
        // Every entry takes at least its length byte
        if count as u64 > reader.remaining()? {
            return Err(PersistError::Decode(format!(
                "string table claims {} entries beyond end of archive",
                count
            )));
        }
        let mut strings = Vec::with_capacity(count as usize);
        for _ in 0..count {
            strings.push(reader.read_string()?);
        }
        Ok(Self { strings })
    }

    pub fn get(&self, index: u64) -> Result<&str> {
        if index == 0 {
            return Ok("");
        }
        self.strings
            .get((index - 1) as usize)
            .map(String::as_str)
            .ok_or_else(|| PersistError::Decode(format!("string index {} out of range", index)))
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_value_gets_one_entry() {
        let mut interner = StringInterner::new();
        let first = interner.intern("Door_C");
        assert_eq!(first, 1);
        for _ in 0..10 {
            assert_eq!(interner.intern("Door_C"), first);
        }
        assert_eq!(interner.intern("Lamp_C"), 2);
        assert_eq!(interner.intern(""), 0);
        assert_eq!(interner.len(), 2);
    }

    #[test]
    fn test_table_round_trip() {
        let mut interner = StringInterner::new();
        interner.intern("alpha");
        interner.intern("beta");

        let mut writer = ArchiveWriter::in_memory();
        interner.write_table(&mut writer).unwrap();
        let bytes = writer.into_bytes();

        let table = StringTable::read_from(&mut ArchiveReader::from_slice(&bytes)).unwrap();
        assert_eq!(table.get(0).unwrap(), "");
        assert_eq!(table.get(1).unwrap(), "alpha");
        assert_eq!(table.get(2).unwrap(), "beta");
        assert!(table.get(3).is_err());
    }
}
