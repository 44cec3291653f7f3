//! Error types for scfleet

use thiserror::Error;

/// Main error type for scfleet operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The container cannot be opened at all. The only fatal condition of an extraction run.
    #[error("Container unavailable: {path}: {reason}")]
    ContainerUnavailable { path: String, reason: String },

    /// A single archive entry failed to decrypt, decompress or validate.
    #[error("Corrupt entry {entry}: {reason}")]
    CorruptEntry { entry: String, reason: String },

    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    /// An entry declares a compression method the reader has no decoder for.
    /// Entry-scoped like `CorruptEntry`: the entry is skipped, the archive stays usable.
    #[error("Unsupported compression method: {0}")]
    UnsupportedCompression(u16),

    #[error("Decryption error: {0}")]
    Decryption(String),

    #[error("Invalid DataForge data: {0}")]
    InvalidDataForge(String),

    #[error("Invalid CryXML format: {0}")]
    InvalidCryXml(String),

    #[error("Unexpected end of data at offset {offset}: wanted {wanted} bytes, {available} available")]
    UnexpectedEof {
        offset: usize,
        wanted: usize,
        available: usize,
    },

    #[error("Unknown field type 0x{tag:04X} for {struct_name}.{field}")]
    UnknownStructField {
        struct_name: String,
        field: String,
        tag: u16,
    },

    #[error("Unknown item type '{item_type}' on {record}")]
    UnknownItemType { record: String, item_type: String },

    #[error("Resolution depth exceeded at {from} -> {target}")]
    DepthExceeded { from: String, target: String },

    #[error("Ship not found: {0}")]
    ShipNotFound(String),

    #[error("Component not found: {0}")]
    ComponentNotFound(String),
}

impl Error {
    pub(crate) fn corrupt(entry: &str, reason: impl Into<String>) -> Self {
        Error::CorruptEntry {
            entry: entry.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error is a lookup miss that callers surface as "not found"
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::EntryNotFound(_) | Error::ShipNotFound(_) | Error::ComponentNotFound(_)
        )
    }
}

/// Result type alias for scfleet operations
pub type Result<T> = std::result::Result<T, Error>;
