//! Endian-aware readers and writers over byte buffers.

use crate::error::{GpkgError, Result};

/// Byte order of multi-byte integers and floats.
///
/// The discriminants match the WKB byte-order marker.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    #[default]
    BigEndian = 0,
    LittleEndian = 1,
}

impl ByteOrder {
    /// Interpret a WKB byte-order marker.
    pub fn from_wkb_marker(marker: u8) -> Option<Self> {
        match marker {
            0 => Some(Self::BigEndian),
            1 => Some(Self::LittleEndian),
            _ => None,
        }
    }

    pub fn wkb_marker(self) -> u8 {
        self as u8
    }
}

macro_rules! read_number {
    ($name:ident, $ty:ty) => {
        pub fn $name(&mut self) -> Result<$ty> {
            const SIZE: usize = std::mem::size_of::<$ty>();
            let bytes: [u8; SIZE] = self.take_array::<SIZE>()?;
            Ok(match self.byte_order {
                ByteOrder::BigEndian => <$ty>::from_be_bytes(bytes),
                ByteOrder::LittleEndian => <$ty>::from_le_bytes(bytes),
            })
        }
    };
}

macro_rules! write_number {
    ($name:ident, $ty:ty) => {
        pub fn $name(&mut self, value: $ty) {
            match self.byte_order {
                ByteOrder::BigEndian => self.buf.extend_from_slice(&value.to_be_bytes()),
                ByteOrder::LittleEndian => self.buf.extend_from_slice(&value.to_le_bytes()),
            }
        }
    };
}

/// Cursor over a borrowed byte slice. Every read advances the position.
#[derive(Debug)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
    byte_order: ByteOrder,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            byte_order: ByteOrder::default(),
        }
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn set_byte_order(&mut self, byte_order: ByteOrder) {
        self.byte_order = byte_order;
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Borrow the next `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(GpkgError::UnexpectedEnd {
                offset: self.pos,
                needed: len,
                remaining: self.remaining(),
            });
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Borrow everything that has not been read yet.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos..];
        self.pos = self.buf.len();
        rest
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.read_bytes(N)?);
        Ok(array)
    }

    read_number!(read_u8, u8);
    read_number!(read_u16, u16);
    read_number!(read_u32, u32);
    read_number!(read_u64, u64);
    read_number!(read_i8, i8);
    read_number!(read_i16, i16);
    read_number!(read_i32, i32);
    read_number!(read_i64, i64);
    read_number!(read_f32, f32);
    read_number!(read_f64, f64);
}

/// Growable output buffer. `finish` hands out the accumulated bytes.
#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
    byte_order: ByteOrder,
}

impl ByteWriter {
    pub fn new(byte_order: ByteOrder) -> Self {
        Self {
            buf: Vec::new(),
            byte_order,
        }
    }

    pub fn with_capacity(byte_order: ByteOrder, capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            byte_order,
        }
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn set_byte_order(&mut self, byte_order: ByteOrder) {
        self.byte_order = byte_order;
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    write_number!(write_u8, u8);
    write_number!(write_u16, u16);
    write_number!(write_u32, u32);
    write_number!(write_u64, u64);
    write_number!(write_i8, i8);
    write_number!(write_i16, i16);
    write_number!(write_i32, i32);
    write_number!(write_i64, i64);
    write_number!(write_f32, f32);
    write_number!(write_f64, f64);
}

#[cfg(test)]
mod tests {
    use super::{ByteOrder, ByteReader, ByteWriter};
    use crate::error::GpkgError;

    #[test]
    fn reads_both_byte_orders() -> crate::Result<()> {
        let bytes = [0x00, 0x00, 0x10, 0xE6, 0xE6, 0x10, 0x00, 0x00];
        let mut reader = ByteReader::new(&bytes);
        reader.set_byte_order(ByteOrder::BigEndian);
        assert_eq!(reader.read_u32()?, 4326);
        reader.set_byte_order(ByteOrder::LittleEndian);
        assert_eq!(reader.read_i32()?, 4326);
        assert_eq!(reader.remaining(), 0);
        Ok(())
    }

    #[test]
    fn writer_matches_reader() -> crate::Result<()> {
        let mut writer = ByteWriter::new(ByteOrder::LittleEndian);
        writer.write_u8(7);
        writer.write_i16(-2);
        writer.write_u64(u64::MAX - 1);
        writer.set_byte_order(ByteOrder::BigEndian);
        writer.write_f32(1.5);
        writer.write_f64(-30.25);
        let bytes = writer.finish();
        assert_eq!(bytes.len(), 1 + 2 + 8 + 4 + 8);

        let mut reader = ByteReader::new(&bytes);
        reader.set_byte_order(ByteOrder::LittleEndian);
        assert_eq!(reader.read_u8()?, 7);
        assert_eq!(reader.read_i16()?, -2);
        assert_eq!(reader.read_u64()?, u64::MAX - 1);
        reader.set_byte_order(ByteOrder::BigEndian);
        assert_eq!(reader.read_f32()?, 1.5);
        assert_eq!(reader.read_f64()?, -30.25);
        Ok(())
    }

    #[test]
    fn overrun_fails_without_advancing() {
        let bytes = [0x01, 0x02, 0x03];
        let mut reader = ByteReader::new(&bytes);
        let err = reader.read_u32().expect_err("three bytes cannot hold a u32");
        assert!(matches!(
            err,
            GpkgError::UnexpectedEnd {
                offset: 0,
                needed: 4,
                remaining: 3
            }
        ));
        assert_eq!(reader.position(), 0);
    }

    #[test]
    fn default_is_big_endian() {
        assert_eq!(ByteReader::new(&[]).byte_order(), ByteOrder::BigEndian);
        assert_eq!(ByteOrder::from_wkb_marker(1), Some(ByteOrder::LittleEndian));
        assert_eq!(ByteOrder::from_wkb_marker(2), None);
    }
}
