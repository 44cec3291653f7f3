//! Definition table structures for DataForge format

use crate::binary::BinaryCursor;
use crate::dataforge::types::{ConversionType, DataType, Guid};
use crate::error::Result;

/// Struct definition entry
#[derive(Debug, Clone)]
pub struct StructDefinition {
    /// Offset into blob string table for struct name
    pub name_offset: u32,
    /// Index of parent struct or 0xFFFFFFFF if none
    pub parent_type_index: u32,
    pub property_count: u16,
    pub first_property_index: u16,
    /// Size of one instance in the data section, parent fields included
    pub record_size: u32,
}

impl StructDefinition {
    pub const RECORD_SIZE: usize = 16;

    pub fn read(cursor: &mut BinaryCursor<'_>) -> Result<Self> {
        Ok(StructDefinition {
            name_offset: cursor.u32()?,
            parent_type_index: cursor.u32()?,
            property_count: cursor.u16()?,
            first_property_index: cursor.u16()?,
            record_size: cursor.u32()?,
        })
    }

    pub fn parent(&self) -> Option<usize> {
        (self.parent_type_index != 0xFFFF_FFFF).then_some(self.parent_type_index as usize)
    }
}

/// Property definition entry
#[derive(Debug, Clone)]
pub struct PropertyDefinition {
    pub name_offset: u32,
    /// Struct index for class and pointer types, enum index for enums
    pub index: u16,
    pub data_type: DataType,
    pub conversion_type: ConversionType,
    pub variant_index: u16,
}

impl PropertyDefinition {
    pub const RECORD_SIZE: usize = 12;

    pub fn read(cursor: &mut BinaryCursor<'_>) -> Result<Self> {
        Ok(PropertyDefinition {
            name_offset: cursor.u32()?,
            index: cursor.u16()?,
            data_type: DataType::from(cursor.u16()?),
            conversion_type: ConversionType::from(cursor.u16()?),
            variant_index: cursor.u16()?,
        })
    }
}

/// Enum definition entry
#[derive(Debug, Clone)]
pub struct EnumDefinition {
    pub name_offset: u32,
    pub value_count: u16,
    /// Index of first value in enum option table
    pub first_value_index: u16,
}

impl EnumDefinition {
    pub const RECORD_SIZE: usize = 8;

    pub fn read(cursor: &mut BinaryCursor<'_>) -> Result<Self> {
        Ok(EnumDefinition {
            name_offset: cursor.u32()?,
            value_count: cursor.u16()?,
            first_value_index: cursor.u16()?,
        })
    }
}

/// Data mapping entry - how many instances of a struct the data section holds
#[derive(Debug, Clone)]
pub struct DataMapping {
    pub struct_count: u32,
    pub struct_index: u32,
}

impl DataMapping {
    pub const RECORD_SIZE_LEGACY: usize = 4;
    pub const RECORD_SIZE_V6: usize = 8;

    pub fn read(cursor: &mut BinaryCursor<'_>, wide: bool) -> Result<Self> {
        let (struct_count, struct_index) = if wide {
            (cursor.u32()?, cursor.u32()?)
        } else {
            (cursor.u16()? as u32, cursor.u16()? as u32)
        };
        Ok(DataMapping {
            struct_count,
            struct_index,
        })
    }
}

/// Record definition entry - top-level data records
#[derive(Debug, Clone)]
pub struct RecordDefinition {
    /// Offset for record name in blob table
    pub name_offset: u32,
    /// Offset for file path in text table (absent in legacy)
    pub file_name_offset: u32,
    pub struct_index: u32,
    pub id: Guid,
    /// Instance index within the struct's block of the data section
    pub variant_index: u16,
    pub other_index: u16,
}

impl RecordDefinition {
    pub const RECORD_SIZE: usize = 32;
    pub const RECORD_SIZE_LEGACY: usize = 28;

    pub fn read(cursor: &mut BinaryCursor<'_>, legacy: bool) -> Result<Self> {
        let name_offset = cursor.u32()?;
        let file_name_offset = if legacy { 0 } else { cursor.u32()? };
        Ok(RecordDefinition {
            name_offset,
            file_name_offset,
            struct_index: cursor.u32()?,
            id: cursor.guid()?,
            variant_index: cursor.u16()?,
            other_index: cursor.u16()?,
        })
    }
}
