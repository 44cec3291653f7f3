//! Bounds-checked primitive reader shared by the binary decoders
//!
//! Both the DataForge database and CryXML documents are flat byte buffers
//! addressed by offsets. `BinaryCursor` reads primitives in a chosen byte
//! order and reports truncation as [`Error::UnexpectedEof`] instead of
//! panicking on a short slice.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::dataforge::Guid;
use crate::error::{Error, Result};

/// Byte order of the data being read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// A cursor over a borrowed byte buffer
#[derive(Debug, Clone)]
pub struct BinaryCursor<'a> {
    data: &'a [u8],
    pos: usize,
    endian: Endian,
}

macro_rules! read_primitive {
    ($name:ident, $ty:ty, $size:expr, $read:ident) => {
        pub fn $name(&mut self) -> Result<$ty> {
            let bytes = self.take($size)?;
            Ok(match self.endian {
                Endian::Little => LittleEndian::$read(bytes),
                Endian::Big => BigEndian::$read(bytes),
            })
        }
    };
}

impl<'a> BinaryCursor<'a> {
    /// Little-endian cursor at offset 0
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_endian(data, Endian::Little)
    }

    pub fn with_endian(data: &'a [u8], endian: Endian) -> Self {
        Self {
            data,
            pos: 0,
            endian,
        }
    }

    pub fn at(data: &'a [u8], pos: usize) -> Result<Self> {
        let mut cursor = Self::new(data);
        cursor.seek(pos)?;
        Ok(cursor)
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn set_endian(&mut self, endian: Endian) {
        self.endian = endian;
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Move to an absolute offset. Seeking to the very end is allowed.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(self.eof_at(pos, 0));
        }
        self.pos = pos;
        Ok(())
    }

    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.take(count).map(|_| ())
    }

    /// Borrow the next `count` bytes and advance past them
    pub fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(count)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| self.eof_at(self.pos, count))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn i8(&mut self) -> Result<i8> {
        Ok(self.u8()? as i8)
    }

    pub fn bool(&mut self) -> Result<bool> {
        Ok(self.u8()? != 0)
    }

    read_primitive!(u16, u16, 2, read_u16);
    read_primitive!(i16, i16, 2, read_i16);
    read_primitive!(u32, u32, 4, read_u32);
    read_primitive!(i32, i32, 4, read_i32);
    read_primitive!(u64, u64, 8, read_u64);
    read_primitive!(i64, i64, 8, read_i64);
    read_primitive!(f32, f32, 4, read_f32);
    read_primitive!(f64, f64, 8, read_f64);

    /// CryEngine GUID in its on-disk field order
    pub fn guid(&mut self) -> Result<Guid> {
        let bytes = self.take(16)?;
        let mut wire = [0u8; 16];
        wire.copy_from_slice(bytes);
        Ok(Guid::from_wire(wire))
    }

    /// NUL-terminated string at the cursor. A missing terminator ends the
    /// string at the end of the buffer.
    pub fn cstring(&mut self) -> Result<String> {
        let (text, consumed) = Self::scan_cstring(self.data, self.pos)?;
        self.pos += consumed;
        Ok(text)
    }

    /// NUL-terminated string at an absolute offset, cursor unchanged
    pub fn cstring_at(&self, offset: usize) -> Result<String> {
        Self::scan_cstring(self.data, offset).map(|(text, _)| text)
    }

    /// String prefixed with a u32 byte length
    pub fn lp_string(&mut self) -> Result<String> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    fn scan_cstring(data: &[u8], offset: usize) -> Result<(String, usize)> {
        if offset > data.len() {
            return Err(Error::UnexpectedEof {
                offset,
                wanted: 1,
                available: 0,
            });
        }
        let tail = &data[offset..];
        let (end, consumed) = match tail.iter().position(|&b| b == 0) {
            Some(nul) => (nul, nul + 1),
            None => (tail.len(), tail.len()),
        };
        Ok((String::from_utf8_lossy(&tail[..end]).into_owned(), consumed))
    }

    fn eof_at(&self, offset: usize, wanted: usize) -> Error {
        Error::UnexpectedEof {
            offset,
            wanted,
            available: self.data.len().saturating_sub(offset),
        }
    }
}
