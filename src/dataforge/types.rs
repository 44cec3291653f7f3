//! Data types and enumerations for DataForge format

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Data type enumeration for property values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    String,
    Single,
    Double,
    Locale,
    Guid,
    Enum,
    Class,
    StrongPointer,
    WeakPointer,
    Reference,
    Unknown(u16),
}

impl From<u16> for DataType {
    fn from(value: u16) -> Self {
        match value {
            0x0001 => DataType::Boolean,
            0x0002 => DataType::Int8,
            0x0003 => DataType::Int16,
            0x0004 => DataType::Int32,
            0x0005 => DataType::Int64,
            0x0006 => DataType::UInt8,
            0x0007 => DataType::UInt16,
            0x0008 => DataType::UInt32,
            0x0009 => DataType::UInt64,
            0x000A => DataType::String,
            0x000B => DataType::Single,
            0x000C => DataType::Double,
            0x000D => DataType::Locale,
            0x000E => DataType::Guid,
            0x000F => DataType::Enum,
            0x0010 => DataType::Class,
            0x0110 => DataType::StrongPointer,
            0x0210 => DataType::WeakPointer,
            0x0310 => DataType::Reference,
            v => DataType::Unknown(v),
        }
    }
}

impl DataType {
    pub fn to_u16(self) -> u16 {
        match self {
            DataType::Boolean => 0x0001,
            DataType::Int8 => 0x0002,
            DataType::Int16 => 0x0003,
            DataType::Int32 => 0x0004,
            DataType::Int64 => 0x0005,
            DataType::UInt8 => 0x0006,
            DataType::UInt16 => 0x0007,
            DataType::UInt32 => 0x0008,
            DataType::UInt64 => 0x0009,
            DataType::String => 0x000A,
            DataType::Single => 0x000B,
            DataType::Double => 0x000C,
            DataType::Locale => 0x000D,
            DataType::Guid => 0x000E,
            DataType::Enum => 0x000F,
            DataType::Class => 0x0010,
            DataType::StrongPointer => 0x0110,
            DataType::WeakPointer => 0x0210,
            DataType::Reference => 0x0310,
            DataType::Unknown(v) => v,
        }
    }

    /// Width of one inline attribute value. `Class` depends on the nested
    /// struct and unknown tags have no known width.
    pub fn inline_size(self) -> Option<u32> {
        match self {
            DataType::Boolean | DataType::Int8 | DataType::UInt8 => Some(1),
            DataType::Int16 | DataType::UInt16 => Some(2),
            DataType::Int32
            | DataType::UInt32
            | DataType::Single
            | DataType::String
            | DataType::Locale
            | DataType::Enum => Some(4),
            DataType::Int64
            | DataType::UInt64
            | DataType::Double
            | DataType::StrongPointer
            | DataType::WeakPointer => Some(8),
            DataType::Guid => Some(16),
            DataType::Reference => Some(20),
            DataType::Class | DataType::Unknown(_) => None,
        }
    }
}

/// How a property is stored: inline, or as a (count, first index) pair into a value pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionType {
    Attribute,
    ComplexArray,
    SimpleArray,
    ClassArray,
    Unknown(u16),
}

impl From<u16> for ConversionType {
    fn from(value: u16) -> Self {
        match value & 0xFF {
            0x00 => ConversionType::Attribute,
            0x01 => ConversionType::ComplexArray,
            0x02 => ConversionType::SimpleArray,
            0x03 => ConversionType::ClassArray,
            v => ConversionType::Unknown(v),
        }
    }
}

impl ConversionType {
    pub fn is_array(self) -> bool {
        !matches!(self, ConversionType::Attribute)
    }
}

/// Width of the (count, first index) pair an array property occupies inline
pub const ARRAY_SLOT_SIZE: u32 = 8;

/// A record identifier.
///
/// Bytes are kept in display order (`a` little-endian, then `b`, `c`, then the
/// eight trailing bytes); the file stores the fields in a CryEngine-specific
/// order that [`Guid::from_wire`] undoes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Guid {
    pub bytes: [u8; 16],
}

impl Guid {
    pub const EMPTY: Guid = Guid { bytes: [0; 16] };

    pub fn is_empty(&self) -> bool {
        self.bytes == [0; 16]
    }

    /// Decode the on-disk layout: c(2) b(2) a(4) then k j i h g f e d
    pub fn from_wire(wire: [u8; 16]) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..4].copy_from_slice(&wire[4..8]);
        bytes[4..6].copy_from_slice(&wire[2..4]);
        bytes[6..8].copy_from_slice(&wire[0..2]);
        for i in 0..8 {
            bytes[8 + i] = wire[15 - i];
        }
        Guid { bytes }
    }

    /// Inverse of [`Guid::from_wire`]
    pub fn to_wire(&self) -> [u8; 16] {
        let mut wire = [0u8; 16];
        wire[4..8].copy_from_slice(&self.bytes[0..4]);
        wire[2..4].copy_from_slice(&self.bytes[4..6]);
        wire[0..2].copy_from_slice(&self.bytes[6..8]);
        for i in 0..8 {
            wire[15 - i] = self.bytes[8 + i];
        }
        wire
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.bytes;
        let a = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
        let mid = u16::from_le_bytes([b[4], b[5]]);
        let hi = u16::from_le_bytes([b[6], b[7]]);
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            a, mid, hi, b[8], b[9], b[10], b[11], b[12], b[13], b[14], b[15]
        )
    }
}

impl FromStr for Guid {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex: String = s.chars().filter(|c| *c != '-').collect();
        if hex.len() != 32 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!("not a GUID: {}", s));
        }
        let parse = |range: std::ops::Range<usize>| {
            u64::from_str_radix(&hex[range], 16).map_err(|e| e.to_string())
        };

        let mut bytes = [0u8; 16];
        bytes[0..4].copy_from_slice(&(parse(0..8)? as u32).to_le_bytes());
        bytes[4..6].copy_from_slice(&(parse(8..12)? as u16).to_le_bytes());
        bytes[6..8].copy_from_slice(&(parse(12..16)? as u16).to_le_bytes());
        for i in 0..8 {
            bytes[8 + i] = parse(16 + i * 2..18 + i * 2)? as u8;
        }
        Ok(Guid { bytes })
    }
}

impl Serialize for Guid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Guid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Address of one struct instance in the data section
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceRef {
    pub struct_index: u32,
    pub instance_index: u32,
}

impl InstanceRef {
    pub const NULL_STRUCT: u32 = 0xFFFF_FFFF;

    /// Build from the on-disk (struct index, variant index) pair. `None` for the null pointer.
    pub fn from_pointer(struct_index: u32, instance_index: u16) -> Option<Self> {
        if struct_index == Self::NULL_STRUCT || instance_index == 0xFFFF {
            None
        } else {
            Some(InstanceRef {
                struct_index,
                instance_index: instance_index as u32,
            })
        }
    }
}
