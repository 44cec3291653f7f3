//! # scfleet
//!
//! Ship and component catalogs reconstructed from Star Citizen game data.
//!
//! ## Overview
//!
//! The game ships its content inside a `.p4k` container: an encrypted ZIP
//! variant with ZSTD support. Inside it, `Data/Game2.dcb` holds the DataForge
//! object database every ship and item is defined in. This library provides:
//!
//! - Reading and extracting entries from `.p4k` archives
//! - CryXML binary to XML conversion
//! - Decoding DataForge databases into typed instances
//! - Bounded, cycle-safe navigation of the record graph
//! - Reconstruction of ships, components and their default loadouts
//! - Cross-referencing ships against the public ship matrix
//! - Loadout statistics with hypothetical component swaps
//!
//! ## Example - Extraction
//!
//! ```rust,no_run
//! use scfleet::catalog::MemoryCatalog;
//! use scfleet::extract::{extract, ExtractOptions};
//!
//! let catalog = MemoryCatalog::new();
//! let summary = extract("Data.p4k", &ExtractOptions::default(), &catalog)?;
//! println!("{} ships, {} components", summary.ships, summary.components);
//! catalog.save_dir("catalog")?;
//! # Ok::<(), scfleet::Error>(())
//! ```
//!
//! ## Example - Reading
//!
//! ```rust,no_run
//! use scfleet::P4kFile;
//!
//! let mut p4k = P4kFile::open("Data.p4k")?;
//! for entry in p4k.list() {
//!     println!("{}", entry.name);
//! }
//! let data = p4k.extract("Data/Game2.dcb")?;
//! # Ok::<(), scfleet::Error>(())
//! ```

pub mod binary;
pub mod catalog;
pub mod crypto;
pub mod cryxml;
pub mod dataforge;
pub mod error;
pub mod extract;
pub mod p4k;

#[cfg(test)]
pub(crate) mod fixtures;

pub use catalog::{CatalogSink, Component, MemoryCatalog, Ship};
pub use cryxml::{CryXmlReader, XmlElement};
pub use dataforge::DataForge;
pub use error::{Error, Result};
pub use extract::{extract, ExtractOptions, ExtractionSummary};
pub use p4k::{ArchiveOptions, CompressionMethod, P4kEntry, P4kFile};
