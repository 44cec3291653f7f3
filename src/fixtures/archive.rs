//! In-memory P4K writer

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::crypto::encrypt_aes_cbc;
use crate::p4k::CompressionMethod;

struct WrittenEntry {
    name: String,
    method: CompressionMethod,
    encrypted: bool,
    crc32: u32,
    compressed_size: u64,
    uncompressed_size: u64,
    header_offset: u64,
}

/// Builds a small archive with the same header layout the game packer emits
pub(crate) struct ArchiveBuilder {
    out: Vec<u8>,
    entries: Vec<WrittenEntry>,
}

impl ArchiveBuilder {
    pub(crate) fn new() -> Self {
        Self {
            out: Vec::new(),
            entries: Vec::new(),
        }
    }

    pub(crate) fn add(&mut self, name: &str, data: &[u8], method: CompressionMethod, encrypt: bool) {
        let compressed = match method {
            CompressionMethod::Store => data.to_vec(),
            CompressionMethod::Deflate => {
                let mut encoder =
                    flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
                encoder.write_all(data).unwrap();
                encoder.finish().unwrap()
            }
            CompressionMethod::Zstd => zstd::encode_all(data, 3).unwrap(),
            CompressionMethod::Unknown(_) => data.to_vec(),
        };
        let payload = if encrypt {
            encrypt_aes_cbc(&compressed).unwrap()
        } else {
            compressed
        };

        let entry = WrittenEntry {
            name: name.to_string(),
            method,
            encrypted: encrypt,
            crc32: crc32fast::hash(data),
            compressed_size: payload.len() as u64,
            uncompressed_size: data.len() as u64,
            header_offset: self.out.len() as u64,
        };

        let extra = encryption_extra(encrypt);
        let sig: &[u8] = if encrypt { b"PK\x03\x14" } else { b"PK\x03\x04" };
        let out = &mut self.out;
        out.write_all(sig).unwrap();
        out.write_u16::<LittleEndian>(20).unwrap();
        out.write_u16::<LittleEndian>(encrypt as u16).unwrap();
        out.write_u16::<LittleEndian>(method.to_u16()).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u32::<LittleEndian>(entry.crc32).unwrap();
        out.write_u32::<LittleEndian>(entry.compressed_size as u32).unwrap();
        out.write_u32::<LittleEndian>(entry.uncompressed_size as u32).unwrap();
        out.write_u16::<LittleEndian>(name.len() as u16).unwrap();
        out.write_u16::<LittleEndian>(extra.len() as u16).unwrap();
        out.write_all(name.as_bytes()).unwrap();
        out.write_all(&extra).unwrap();
        out.write_all(&payload).unwrap();

        self.entries.push(entry);
    }

    /// Write the central directory and end record
    pub(crate) fn finish(mut self) -> Vec<u8> {
        let cd_offset = self.out.len() as u64;
        for entry in &self.entries {
            let extra = encryption_extra(entry.encrypted);
            let out = &mut self.out;
            out.write_all(b"PK\x01\x02").unwrap();
            out.write_u16::<LittleEndian>(0x0300 | 45).unwrap();
            out.write_u16::<LittleEndian>(20).unwrap();
            out.write_u16::<LittleEndian>(entry.encrypted as u16).unwrap();
            out.write_u16::<LittleEndian>(entry.method.to_u16()).unwrap();
            out.write_u16::<LittleEndian>(0).unwrap();
            out.write_u16::<LittleEndian>(0).unwrap();
            out.write_u32::<LittleEndian>(entry.crc32).unwrap();
            out.write_u32::<LittleEndian>(entry.compressed_size as u32).unwrap();
            out.write_u32::<LittleEndian>(entry.uncompressed_size as u32).unwrap();
            out.write_u16::<LittleEndian>(entry.name.len() as u16).unwrap();
            out.write_u16::<LittleEndian>(extra.len() as u16).unwrap();
            out.write_u16::<LittleEndian>(0).unwrap();
            out.write_u16::<LittleEndian>(0).unwrap();
            out.write_u16::<LittleEndian>(0).unwrap();
            out.write_u32::<LittleEndian>(0).unwrap();
            out.write_u32::<LittleEndian>(entry.header_offset as u32).unwrap();
            out.write_all(entry.name.as_bytes()).unwrap();
            out.write_all(&extra).unwrap();
        }
        let cd_size = self.out.len() as u64 - cd_offset;

        let out = &mut self.out;
        out.write_all(b"PK\x05\x06").unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u16::<LittleEndian>(self.entries.len() as u16).unwrap();
        out.write_u16::<LittleEndian>(self.entries.len() as u16).unwrap();
        out.write_u32::<LittleEndian>(cd_size as u32).unwrap();
        out.write_u32::<LittleEndian>(cd_offset as u32).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        self.out
    }
}

/// Extra field with the encryption marker at byte 168; empty when plain
fn encryption_extra(encrypted: bool) -> Vec<u8> {
    if !encrypted {
        return Vec::new();
    }
    // One opaque block so the reader's extra-field walk skips it cleanly
    let mut extra = vec![0u8; 169];
    extra[0..2].copy_from_slice(&0x5343u16.to_le_bytes());
    extra[2..4].copy_from_slice(&165u16.to_le_bytes());
    extra[168] = 0x01;
    extra
}
