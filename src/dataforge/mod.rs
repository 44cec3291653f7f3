//! DataForge/DCB binary format parser
//!
//! DataForge is the binary object database Star Citizen ships as
//! `Data/Game2.dcb`. It holds every struct schema and every record the
//! game's entities are built from.
//!
//! ## Format Overview
//!
//! A DataForge file consists of:
//! - File header with version and counts
//! - Definition tables (structs, properties, enums, data mappings, records)
//! - Value pools for array elements (integers, floats, strings, GUIDs, pointers, ...)
//! - String tables (text for values, blob for names)
//! - The data section: fixed-size instances of each struct, block after block
//!
//! ## Example
//!
//! ```rust,no_run
//! use scfleet::dataforge::{DataForge, Resolver, ResolverOptions};
//!
//! let data = std::fs::read("Game2.dcb")?;
//! let df = DataForge::parse(&data)?;
//! let resolver = Resolver::new(&df, ResolverOptions::default());
//!
//! if let Some(record) = df.record_by_path("libs/foundry/records/entities/spaceships/aegs_gladius.xml") {
//!     let node = resolver.resolve_record(record).unwrap();
//!     println!("{}", node.materialize());
//! }
//! # Ok::<(), scfleet::Error>(())
//! ```

mod definitions;
mod header;
mod instance;
mod reader;
mod resolver;
mod types;

pub use header::{DataForgeHeader, ValueCounts, HEADER_SIZE};
pub use instance::{Field, Instance, Value};
pub use reader::{DataForge, EnumSchema, FieldSchema, Record, StructSchema};
pub use resolver::{ResolveDiagnostic, ResolvedNode, Resolver, ResolverOptions};
pub use types::*;
