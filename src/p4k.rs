//! P4K archive reading
//!
//! P4K files are ZIP archives with custom encryption and compression support.
//!
//! ## Format Details
//!
//! - Compression methods: Store (0), Deflate (8), ZStd (100)
//! - Encryption: AES-128-CBC with the CryEngine public key
//! - Local header signature for encrypted entries: `PK\x03\x14` (vs `PK\x03\x04`)
//! - A non-zero byte at offset 168 of the extra field marks encrypted content
//!
//! Opening is the only fatal step of an extraction run: a missing, truncated or
//! directory-less container fails with [`Error::ContainerUnavailable`]. Reading
//! an individual entry fails with [`Error::CorruptEntry`] and leaves the handle
//! usable for the next entry.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use tracing::debug;

use crate::crypto::{decrypt_aes_cbc, is_zstd_stream};
use crate::error::{Error, Result};

/// Standard local file header signature: PK\x03\x04
const LOCAL_HEADER_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// Encrypted local file header signature: PK\x03\x14
const ENCRYPTED_HEADER_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x03, 0x14];

/// Central directory header signature: PK\x01\x02
const CENTRAL_HEADER_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x01, 0x02];

const EOCD_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x05, 0x06];
const ZIP64_LOCATOR_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x06, 0x07];
const ZIP64_EOCD_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x06, 0x06];

/// Fixed size of a local file header before its name and extra field
const LOCAL_HEADER_LEN: u64 = 30;

/// Offset of the CryEngine encryption marker in the extra field
const ENCRYPTION_MARKER_OFFSET: usize = 168;

/// Upper bound on buffer space reserved from a declared size before decoding
const MAX_PREALLOC: u64 = 64 * 1024 * 1024;

/// Compression methods used in P4K files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    /// No compression (stored as-is)
    Store,
    /// Standard DEFLATE compression
    Deflate,
    /// ZStandard compression, the container's own method id
    Zstd,
    Unknown(u16),
}

impl From<u16> for CompressionMethod {
    fn from(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Store,
            8 => CompressionMethod::Deflate,
            100 => CompressionMethod::Zstd,
            other => CompressionMethod::Unknown(other),
        }
    }
}

impl CompressionMethod {
    pub fn to_u16(self) -> u16 {
        match self {
            CompressionMethod::Store => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Zstd => 100,
            CompressionMethod::Unknown(m) => m,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CompressionMethod::Store => "Store",
            CompressionMethod::Deflate => "Deflate",
            CompressionMethod::Zstd => "Zstd",
            CompressionMethod::Unknown(_) => "Unknown",
        }
    }
}

/// Represents a single entry in a P4K archive
#[derive(Debug, Clone)]
pub struct P4kEntry {
    /// File name/path within the archive
    pub name: String,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub compression_method: CompressionMethod,
    pub is_encrypted: bool,
    pub crc32: u32,
    /// Offset to local file header in the archive
    pub(crate) header_offset: u64,
}

/// Options for reading entries
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ArchiveOptions {
    /// Check the CRC-32 of every decoded entry
    pub verify_crc: bool,
}

/// A P4K archive reader
pub struct P4kFile<R = BufReader<File>> {
    reader: R,
    entries: Vec<P4kEntry>,
    index: HashMap<String, usize>,
    options: ArchiveOptions,
}

impl P4kFile<BufReader<File>> {
    /// Open a P4K file for reading
    ///
    /// # Example
    /// ```no_run
    /// use scfleet::P4kFile;
    /// let p4k = P4kFile::open("Data.p4k")?;
    /// # Ok::<(), scfleet::Error>(())
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, ArchiveOptions::default())
    }

    pub fn open_with_options<P: AsRef<Path>>(path: P, options: ArchiveOptions) -> Result<Self> {
        let path = path.as_ref();
        let unavailable = |reason: String| Error::ContainerUnavailable {
            path: path.display().to_string(),
            reason,
        };

        let file = File::open(path).map_err(|e| unavailable(e.to_string()))?;
        Self::from_reader(BufReader::new(file), options).map_err(|e| match e {
            Error::ContainerUnavailable { reason, .. } => unavailable(reason),
            other => other,
        })
    }
}

impl<R: Read + Seek> P4kFile<R> {
    /// Read the central directory from any seekable source
    pub fn from_reader(mut reader: R, options: ArchiveOptions) -> Result<Self> {
        let entries = read_central_directory(&mut reader).map_err(|e| match e {
            e @ Error::ContainerUnavailable { .. } => e,
            other => Error::ContainerUnavailable {
                path: "<reader>".to_string(),
                reason: other.to_string(),
            },
        })?;

        let index = entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (normalize_entry_name(&entry.name), i))
            .collect();

        debug!(entries = entries.len(), "read archive directory");

        Ok(P4kFile {
            reader,
            entries,
            index,
            options,
        })
    }

    /// All entries in central-directory order
    pub fn list(&self) -> &[P4kEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find an entry by path. Case and separator style are ignored.
    pub fn get_entry(&self, name: &str) -> Option<&P4kEntry> {
        self.index
            .get(&normalize_entry_name(name))
            .map(|&i| &self.entries[i])
    }

    /// Extract a file by name and return its contents
    pub fn extract(&mut self, name: &str) -> Result<Vec<u8>> {
        let entry = self
            .get_entry(name)
            .ok_or_else(|| Error::EntryNotFound(name.to_string()))?
            .clone();

        self.read(&entry)
    }

    /// Decrypt, decompress and validate one entry
    pub fn read(&mut self, entry: &P4kEntry) -> Result<Vec<u8>> {
        let data_offset = self.local_data_offset(entry).map_err(|e| match e {
            e @ Error::CorruptEntry { .. } => e,
            other => Error::corrupt(&entry.name, other.to_string()),
        })?;

        let stream_len = self
            .reader
            .seek(SeekFrom::End(0))
            .map_err(|e| Error::corrupt(&entry.name, e.to_string()))?;
        if data_offset.saturating_add(entry.compressed_size) > stream_len {
            return Err(Error::corrupt(
                &entry.name,
                format!(
                    "{} bytes at offset {} run past the end of the archive ({} bytes)",
                    entry.compressed_size, data_offset, stream_len
                ),
            ));
        }
        self.reader
            .seek(SeekFrom::Start(data_offset))
            .map_err(|e| Error::corrupt(&entry.name, e.to_string()))?;

        let mut payload = vec![0u8; entry.compressed_size as usize];
        self.reader
            .read_exact(&mut payload)
            .map_err(|e| Error::corrupt(&entry.name, format!("payload truncated: {}", e)))?;

        let payload = if entry.is_encrypted {
            decrypt_aes_cbc(&payload).map_err(|e| Error::corrupt(&entry.name, e.to_string()))?
        } else {
            payload
        };

        let data = decompress(payload, entry)?;

        if data.len() as u64 != entry.uncompressed_size {
            return Err(Error::corrupt(
                &entry.name,
                format!(
                    "decoded {} bytes, directory declares {}",
                    data.len(),
                    entry.uncompressed_size
                ),
            ));
        }

        if self.options.verify_crc {
            let crc = crc32fast::hash(&data);
            if crc != entry.crc32 {
                return Err(Error::corrupt(
                    &entry.name,
                    format!("CRC mismatch: {:08X} != {:08X}", crc, entry.crc32),
                ));
            }
        }

        Ok(data)
    }

    /// Locate the payload through the local header; its extra field may differ
    /// in length from the central directory copy.
    fn local_data_offset(&mut self, entry: &P4kEntry) -> Result<u64> {
        self.reader.seek(SeekFrom::Start(entry.header_offset))?;

        let mut sig = [0u8; 4];
        self.reader.read_exact(&mut sig)?;

        if sig != LOCAL_HEADER_SIGNATURE && sig != ENCRYPTED_HEADER_SIGNATURE {
            return Err(Error::corrupt(
                &entry.name,
                format!("bad local header signature {:02X?}", sig),
            ));
        }

        // version, flags, method, time, date, crc, sizes
        self.reader.seek(SeekFrom::Current(22))?;
        let name_len = self.reader.read_u16::<LittleEndian>()?;
        let extra_len = self.reader.read_u16::<LittleEndian>()?;

        Ok(entry.header_offset + LOCAL_HEADER_LEN + name_len as u64 + extra_len as u64)
    }
}

fn decompress(payload: Vec<u8>, entry: &P4kEntry) -> Result<Vec<u8>> {
    match entry.compression_method {
        CompressionMethod::Store => {
            let mut data = payload;
            // Encrypted stored entries carry block padding past the real size.
            if entry.is_encrypted && data.len() as u64 > entry.uncompressed_size {
                data.truncate(entry.uncompressed_size as usize);
            }
            Ok(data)
        }

        CompressionMethod::Deflate => {
            use flate2::read::DeflateDecoder;
            let mut decoder = DeflateDecoder::new(payload.as_slice());
            let mut data = Vec::with_capacity(entry.uncompressed_size.min(MAX_PREALLOC) as usize);
            decoder
                .read_to_end(&mut data)
                .map_err(|e| Error::corrupt(&entry.name, format!("deflate: {}", e)))?;
            Ok(data)
        }

        CompressionMethod::Zstd => {
            if !is_zstd_stream(&payload) {
                return Err(Error::corrupt(&entry.name, "missing ZStd frame header"));
            }
            // One frame per entry; anything after it is cipher padding.
            let mut decoder = zstd::stream::read::Decoder::new(payload.as_slice())
                .map_err(|e| Error::corrupt(&entry.name, format!("zstd: {}", e)))?
                .single_frame();
            let mut data = Vec::with_capacity(entry.uncompressed_size.min(MAX_PREALLOC) as usize);
            decoder
                .read_to_end(&mut data)
                .map_err(|e| Error::corrupt(&entry.name, format!("zstd: {}", e)))?;
            Ok(data)
        }

        CompressionMethod::Unknown(method) => Err(Error::UnsupportedCompression(method)),
    }
}

/// Lookup key for entry names: lower-case with forward slashes
fn normalize_entry_name(name: &str) -> String {
    name.replace('\\', "/").trim_start_matches('/').to_lowercase()
}

fn read_central_directory<R: Read + Seek>(reader: &mut R) -> Result<Vec<P4kEntry>> {
    let file_len = reader.seek(SeekFrom::End(0))?;

    // EOCD is at least 22 bytes, search backwards for signature
    let search_start = file_len.saturating_sub(65557);

    reader.seek(SeekFrom::Start(search_start))?;
    let mut buffer = vec![0u8; (file_len - search_start) as usize];
    reader.read_exact(&mut buffer)?;

    let eocd_offset = buffer
        .windows(4)
        .rposition(|w| w == EOCD_SIGNATURE)
        .ok_or_else(|| Error::ContainerUnavailable {
            path: String::new(),
            reason: "cannot find end of central directory".to_string(),
        })?;

    let eocd_pos = search_start + eocd_offset as u64;

    let (cd_offset, cd_size, total_entries) = match read_zip64_eocd(reader, eocd_pos)? {
        Some(zip64) => zip64,
        None => read_standard_eocd(reader, eocd_pos)?,
    };

    if cd_offset.saturating_add(cd_size) > file_len {
        return Err(Error::ContainerUnavailable {
            path: String::new(),
            reason: format!(
                "central directory at {} (+{}) lies past end of file ({})",
                cd_offset, cd_size, file_len
            ),
        });
    }

    let mut entries = Vec::with_capacity(total_entries.min(1 << 20) as usize);
    reader.seek(SeekFrom::Start(cd_offset))?;

    let mut pos = 0u64;
    while pos < cd_size {
        match read_central_directory_entry(reader)? {
            Some(entry) => entries.push(entry),
            None => break,
        }
        pos = reader.stream_position()? - cd_offset;
    }

    Ok(entries)
}

fn read_zip64_eocd<R: Read + Seek>(reader: &mut R, eocd_pos: u64) -> Result<Option<(u64, u64, u64)>> {
    if eocd_pos < 20 {
        return Ok(None);
    }

    reader.seek(SeekFrom::Start(eocd_pos - 20))?;
    let mut locator_sig = [0u8; 4];
    reader.read_exact(&mut locator_sig)?;
    if locator_sig != ZIP64_LOCATOR_SIGNATURE {
        return Ok(None);
    }

    let _disk_number = reader.read_u32::<LittleEndian>()?;
    let zip64_eocd_offset = reader.read_u64::<LittleEndian>()?;

    reader.seek(SeekFrom::Start(zip64_eocd_offset))?;
    let mut sig = [0u8; 4];
    reader.read_exact(&mut sig)?;
    if sig != ZIP64_EOCD_SIGNATURE {
        return Err(Error::ContainerUnavailable {
            path: String::new(),
            reason: "invalid ZIP64 end of central directory".to_string(),
        });
    }

    let _eocd_size = reader.read_u64::<LittleEndian>()?;
    let _version_made = reader.read_u16::<LittleEndian>()?;
    let _version_needed = reader.read_u16::<LittleEndian>()?;
    let _disk_number = reader.read_u32::<LittleEndian>()?;
    let _disk_cd = reader.read_u32::<LittleEndian>()?;
    let _entries_on_disk = reader.read_u64::<LittleEndian>()?;
    let total_entries = reader.read_u64::<LittleEndian>()?;
    let cd_size = reader.read_u64::<LittleEndian>()?;
    let cd_offset = reader.read_u64::<LittleEndian>()?;

    Ok(Some((cd_offset, cd_size, total_entries)))
}

fn read_standard_eocd<R: Read + Seek>(reader: &mut R, eocd_pos: u64) -> Result<(u64, u64, u64)> {
    reader.seek(SeekFrom::Start(eocd_pos + 4))?;

    let _disk_number = reader.read_u16::<LittleEndian>()?;
    let _disk_cd = reader.read_u16::<LittleEndian>()?;
    let _entries_on_disk = reader.read_u16::<LittleEndian>()?;
    let total_entries = reader.read_u16::<LittleEndian>()? as u64;
    let cd_size = reader.read_u32::<LittleEndian>()? as u64;
    let cd_offset = reader.read_u32::<LittleEndian>()? as u64;

    Ok((cd_offset, cd_size, total_entries))
}

fn read_central_directory_entry<R: Read + Seek>(reader: &mut R) -> Result<Option<P4kEntry>> {
    let mut sig = [0u8; 4];
    if reader.read_exact(&mut sig).is_err() || sig != CENTRAL_HEADER_SIGNATURE {
        return Ok(None);
    }

    let _version_made = reader.read_u16::<LittleEndian>()?;
    let _version_needed = reader.read_u16::<LittleEndian>()?;
    let flags = reader.read_u16::<LittleEndian>()?;
    let compression = reader.read_u16::<LittleEndian>()?;
    let _mod_time = reader.read_u16::<LittleEndian>()?;
    let _mod_date = reader.read_u16::<LittleEndian>()?;
    let crc32 = reader.read_u32::<LittleEndian>()?;
    let mut compressed_size = reader.read_u32::<LittleEndian>()? as u64;
    let mut uncompressed_size = reader.read_u32::<LittleEndian>()? as u64;
    let name_len = reader.read_u16::<LittleEndian>()?;
    let extra_len = reader.read_u16::<LittleEndian>()?;
    let comment_len = reader.read_u16::<LittleEndian>()?;
    let _disk_start = reader.read_u16::<LittleEndian>()?;
    let _internal_attrs = reader.read_u16::<LittleEndian>()?;
    let _external_attrs = reader.read_u32::<LittleEndian>()?;
    let mut header_offset = reader.read_u32::<LittleEndian>()? as u64;

    let mut name_bytes = vec![0u8; name_len as usize];
    reader.read_exact(&mut name_bytes)?;
    let name = String::from_utf8_lossy(&name_bytes).into_owned();

    let mut extra = vec![0u8; extra_len as usize];
    reader.read_exact(&mut extra)?;

    let mut extra_cursor = Cursor::new(&extra);
    while extra_cursor.position() + 4 <= extra.len() as u64 {
        let header_id = extra_cursor.read_u16::<LittleEndian>()?;
        let data_size = extra_cursor.read_u16::<LittleEndian>()?;

        if header_id == 0x0001 {
            if uncompressed_size == 0xFFFFFFFF {
                uncompressed_size = extra_cursor.read_u64::<LittleEndian>()?;
            }
            if compressed_size == 0xFFFFFFFF {
                compressed_size = extra_cursor.read_u64::<LittleEndian>()?;
            }
            if header_offset == 0xFFFFFFFF {
                header_offset = extra_cursor.read_u64::<LittleEndian>()?;
            }
            break;
        }
        extra_cursor.seek(SeekFrom::Current(data_size as i64))?;
    }

    reader.seek(SeekFrom::Current(comment_len as i64))?;

    // Standard (bit 0) and strong (bit 6) encryption flags, plus the CryEngine marker
    let is_encrypted = (flags & 0x0001) != 0
        || (flags & 0x0040) != 0
        || extra.get(ENCRYPTION_MARKER_OFFSET).is_some_and(|&b| b > 0);

    Ok(Some(P4kEntry {
        name,
        compressed_size,
        uncompressed_size,
        compression_method: CompressionMethod::from(compression),
        is_encrypted,
        crc32,
        header_offset,
    }))
}
