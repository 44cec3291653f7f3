//! The reconstructed catalog and what runs over it
//!
//! - [`model`]: ship, component, port and matrix rows
//! - [`store`]: the sink extraction writes to, and an in-memory catalog
//! - [`crossref`]: linking ship-matrix entries to ships
//! - [`loadout`]: loadout statistics with hypothetical swaps

pub mod crossref;
pub mod loadout;
pub mod model;
pub mod store;

pub use crossref::{cross_reference, normalize_name};
pub use loadout::{aggregate, apply_swaps, LoadoutEntry, LoadoutStats, Swap};
pub use model::*;
pub use store::{CatalogSink, MemoryCatalog};
