use super::varint;
use crate::core::{PersistError, Result};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use uuid::Uuid;

// ============================================================================
// Writer
// ============================================================================

/// Little-endian byte sink with random-access seek, used for placeholder patching.
pub struct ArchiveWriter<W = Cursor<Vec<u8>>> {
    inner: W,
}

impl ArchiveWriter<Cursor<Vec<u8>>> {
    pub fn in_memory() -> Self {
        Self {
            inner: Cursor::new(Vec::new()),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.inner.into_inner()
    }
}

impl<W: Write + Seek> ArchiveWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn tell(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }

    pub fn seek(&mut self, pos: u64) -> Result<()> {
        self.inner.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    pub fn seek_end(&mut self) -> Result<u64> {
        Ok(self.inner.seek(SeekFrom::End(0))?)
    }

    /// Current position as a 32-bit table offset
    pub fn tell_u32(&mut self) -> Result<u32> {
        let pos = self.tell()?;
        u32::try_from(pos)
            .map_err(|_| PersistError::Serialization(format!("archive offset {} exceeds 4 GiB", pos)))
    }

    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes)?;
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_raw(&[value])
    }

    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.write_u8(value as u8)
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_raw(&value.to_le_bytes())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.write_raw(&value.to_le_bytes())
    }

    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        self.write_raw(&value.to_le_bytes())
    }

    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        self.write_raw(&value.to_le_bytes())
    }

    pub fn write_varint(&mut self, value: u64) -> Result<()> {
        let mut buf = Vec::with_capacity(varint::MAX_VARINT_LEN);
        varint::encode_u64(value, &mut buf);
        self.write_raw(&buf)
    }

    /// Length-prefixed byte blob
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_varint(bytes.len() as u64)?;
        self.write_raw(bytes)
    }

    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_bytes(value.as_bytes())
    }

    pub fn write_uuid(&mut self, value: &Uuid) -> Result<()> {
        self.write_raw(value.as_bytes())
    }

    /// Reserve a u32 slot to patch later with [`ArchiveWriter::patch_u32`]
    pub fn write_u32_placeholder(&mut self) -> Result<u64> {
        let pos = self.tell()?;
        self.write_u32(0)?;
        Ok(pos)
    }

    /// Overwrite a reserved u32 and return to the end of the stream
    pub fn patch_u32(&mut self, placeholder: u64, value: u32) -> Result<()> {
        let resume = self.tell()?;
        self.seek(placeholder)?;
        self.write_u32(value)?;
        self.seek(resume)
    }
}

// ============================================================================
// Reader
// ============================================================================

pub struct ArchiveReader<R> {
    inner: R,
    len: u64,
}

impl<'a> ArchiveReader<Cursor<&'a [u8]>> {
    pub fn from_slice(bytes: &'a [u8]) -> Self {
        Self {
            len: bytes.len() as u64,
            inner: Cursor::new(bytes),
        }
    }
}

fn truncated(what: &str, err: std::io::Error) -> PersistError {
    PersistError::Decode(format!("Failed to read {}: {}", what, err))
}

impl<R: Read + Seek> ArchiveReader<R> {
    pub fn new(mut inner: R) -> Result<Self> {
        let start = inner.stream_position()?;
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(start))?;
        Ok(Self { inner, len })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn tell(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }

    pub fn remaining(&mut self) -> Result<u64> {
        Ok(self.len.saturating_sub(self.tell()?))
    }

    pub fn seek(&mut self, pos: u64) -> Result<()> {
        if pos > self.len {
            return Err(PersistError::Decode(format!(
                "seek to {} past end of archive ({} bytes)",
                pos, self.len
            )));
        }
        self.inner.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    pub fn skip(&mut self, count: u64) -> Result<()> {
        let pos = self.tell()?;
        self.seek(pos.saturating_add(count))
    }

    pub fn read_raw(&mut self, count: usize) -> Result<Vec<u8>> {
        if count as u64 > self.remaining()? {
            return Err(PersistError::Decode(format!(
                "blob of {} bytes exceeds remaining archive",
                count
            )));
        }
        let mut buf = vec![0u8; count];
        self.inner
            .read_exact(&mut buf)
            .map_err(|e| truncated("blob", e))?;
        Ok(buf)
    }

    fn read_array<const N: usize>(&mut self, what: &str) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.inner
            .read_exact(&mut buf)
            .map_err(|e| truncated(what, e))?;
        Ok(buf)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>("u8")?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(PersistError::Decode(format!("invalid bool byte {}", other))),
        }
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array("u32")?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array("u64")?))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.read_array("i64")?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.read_array("f64")?))
    }

    pub fn read_varint(&mut self) -> Result<u64> {
        varint::read_u64(&mut self.inner)
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_varint()?;
        let len = usize::try_from(len)
            .map_err(|_| PersistError::Decode(format!("blob length {} too large", len)))?;
        self.read_raw(len)
    }

    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|e| PersistError::Decode(format!("invalid UTF-8 string: {}", e)))
    }

    pub fn read_uuid(&mut self) -> Result<Uuid> {
        Ok(Uuid::from_bytes(self.read_array("uuid")?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_sequence() {
        let mut writer = ArchiveWriter::in_memory();
        writer.write_u8(7).unwrap();
        writer.write_bool(true).unwrap();
        writer.write_u32(0xDEAD_BEEF).unwrap();
        writer.write_f64(-1.5).unwrap();
        writer.write_string("crate").unwrap();
        let bytes = writer.into_bytes();

        let mut reader = ArchiveReader::from_slice(&bytes);
        assert_eq!(reader.read_u8().unwrap(), 7);
        assert!(reader.read_bool().unwrap());
        assert_eq!(reader.read_u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(reader.read_f64().unwrap(), -1.5);
        assert_eq!(reader.read_string().unwrap(), "crate");
        assert_eq!(reader.remaining().unwrap(), 0);
    }

    #[test]
    fn test_placeholder_patch_resumes_at_end() {
        let mut writer = ArchiveWriter::in_memory();
        let slot = writer.write_u32_placeholder().unwrap();
        writer.write_raw(b"body").unwrap();
        writer.patch_u32(slot, 4).unwrap();
        writer.write_u8(0xAA).unwrap();
        let bytes = writer.into_bytes();

        assert_eq!(&bytes[..4], &4u32.to_le_bytes());
        assert_eq!(&bytes[4..8], b"body");
        assert_eq!(bytes[8], 0xAA);
    }

    #[test]
    fn test_truncated_reads_fail() {
        let mut reader = ArchiveReader::from_slice(&[1, 2]);
        assert!(matches!(reader.read_u32(), Err(PersistError::Decode(_))));

        // Length prefix claims more than is present
        let mut reader = ArchiveReader::from_slice(&[200, 1, b'a']);
        assert!(reader.read_string().is_err());
    }

    #[test]
    fn test_seek_bounds() {
        let mut reader = ArchiveReader::from_slice(&[0u8; 8]);
        assert!(reader.seek(8).is_ok());
        assert!(reader.seek(9).is_err());
    }
}
