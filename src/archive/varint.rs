//! Unsigned LEB128 varints used for interned indices and string lengths.

use crate::core::{PersistError, Result};
use std::io::Read;

/// Longest encoding of a u64
pub const MAX_VARINT_LEN: usize = 10;

pub fn encode_u64(mut v: u64, out: &mut Vec<u8>) {
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
}

/// Decode straight from a byte stream
pub fn read_u64<R: Read>(reader: &mut R) -> Result<u64> {
    let mut result = 0u64;
    let mut shift = 0u32;
    let mut byte = [0u8; 1];
    for i in 0..MAX_VARINT_LEN {
        reader
            .read_exact(&mut byte)
            .map_err(|e| PersistError::Decode(format!("varint truncated at byte {}: {}", i, e)))?;
        let payload = (byte[0] & 0x7f) as u64;
        if i == MAX_VARINT_LEN - 1 && payload > 1 {
            return Err(PersistError::Decode("varint overflows 64 bits".to_string()));
        }
        result |= payload << shift;
        if byte[0] & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }
    Err(PersistError::Decode("varint longer than 10 bytes".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_small_values_take_one_byte() {
        let mut out = Vec::new();
        encode_u64(0, &mut out);
        encode_u64(127, &mut out);
        assert_eq!(out, vec![0x00, 0x7f]);
    }

    #[test]
    fn test_boundaries() {
        for value in [128u64, 300, u32::MAX as u64, u64::MAX] {
            let mut out = Vec::new();
            encode_u64(value, &mut out);
            let mut cursor = Cursor::new(&out);
            assert_eq!(read_u64(&mut cursor).unwrap(), value);
            assert_eq!(cursor.position() as usize, out.len());
        }
    }

    #[test]
    fn test_truncated_input() {
        assert!(read_u64(&mut Cursor::new(vec![0x80, 0x80])).is_err());
        assert!(read_u64(&mut Cursor::new(vec![0xff])).is_err());
    }

    #[test]
    fn test_overflow_rejected() {
        let bytes = [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x02];
        assert!(read_u64(&mut Cursor::new(bytes)).is_err());
    }
}
