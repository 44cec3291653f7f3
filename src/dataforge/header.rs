//! DataForge file header parsing

use crate::binary::BinaryCursor;
use crate::error::{Error, Result};

/// Size of the v6 header
pub const HEADER_SIZE: usize = 0x78;
/// Size of the header in files written before version 6
pub const LEGACY_HEADER_SIZE: usize = 0x74;

/// Counts of every value pool, in the order the header lists them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueCounts {
    pub boolean: u32,
    pub int8: u32,
    pub int16: u32,
    pub int32: u32,
    pub int64: u32,
    pub uint8: u32,
    pub uint16: u32,
    pub uint32: u32,
    pub uint64: u32,
    pub single: u32,
    pub double: u32,
    pub guid: u32,
    pub string: u32,
    pub locale: u32,
    pub enums: u32,
    pub strong: u32,
    pub weak: u32,
    pub reference: u32,
    pub enum_option: u32,
}

/// DataForge file header containing counts and metadata
#[derive(Debug, Clone)]
pub struct DataForgeHeader {
    /// File format version
    pub file_version: i32,
    /// Whether this is a legacy format file
    pub is_legacy: bool,

    pub struct_definition_count: u32,
    pub property_definition_count: u32,
    pub enum_definition_count: u32,
    pub data_mapping_count: u32,
    pub record_definition_count: u32,

    pub values: ValueCounts,

    pub text_length: u32,
    pub blob_length: u32,
}

impl DataForgeHeader {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < LEGACY_HEADER_SIZE {
            return Err(Error::InvalidDataForge(format!(
                "file too small for header: {} bytes",
                data.len()
            )));
        }

        let mut cursor = BinaryCursor::new(data);
        let _temp00 = cursor.u16()?;
        let _unknown = cursor.u16()?;
        let file_version = cursor.i32()?;

        // Legacy files are smaller and have version < 6
        let is_legacy = data.len() < 0x0e2e00 && file_version < 6;
        if !is_legacy {
            cursor.skip(8)?;
        }

        let struct_definition_count = cursor.u32()?;
        let property_definition_count = cursor.u32()?;
        let enum_definition_count = cursor.u32()?;
        let data_mapping_count = cursor.u32()?;
        let record_definition_count = cursor.u32()?;

        let values = ValueCounts {
            boolean: cursor.u32()?,
            int8: cursor.u32()?,
            int16: cursor.u32()?,
            int32: cursor.u32()?,
            int64: cursor.u32()?,
            uint8: cursor.u32()?,
            uint16: cursor.u32()?,
            uint32: cursor.u32()?,
            uint64: cursor.u32()?,
            single: cursor.u32()?,
            double: cursor.u32()?,
            guid: cursor.u32()?,
            string: cursor.u32()?,
            locale: cursor.u32()?,
            enums: cursor.u32()?,
            strong: cursor.u32()?,
            weak: cursor.u32()?,
            reference: cursor.u32()?,
            enum_option: cursor.u32()?,
        };

        let text_length = cursor.u32()?;
        let blob_length = if is_legacy { 0 } else { cursor.u32()? };

        Ok(DataForgeHeader {
            file_version,
            is_legacy,
            struct_definition_count,
            property_definition_count,
            enum_definition_count,
            data_mapping_count,
            record_definition_count,
            values,
            text_length,
            blob_length,
        })
    }

    pub fn header_size(&self) -> usize {
        if self.is_legacy {
            LEGACY_HEADER_SIZE
        } else {
            HEADER_SIZE
        }
    }
}
