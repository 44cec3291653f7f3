//! Reconstruction of the catalog from a game install
//!
//! - [`context`]: the per-run archive, database and localization handles
//! - [`component`]: items and their stat blocks
//! - [`vehicle`]: ships and their port trees
//! - [`ports`]: port category rules
//! - [`pipeline`]: the batch run tying them together

pub mod component;
pub mod context;
pub mod pipeline;
pub mod ports;
pub mod schema;
pub mod vehicle;

pub use component::{derive_weapon_dps, reconstruct_component, ItemKind};
pub use context::{ExtractOptions, ExtractionContext, Localization};
pub use pipeline::{extract, run, ExtractionSummary};
pub use ports::{category_for_item_type, classify_port};
pub use vehicle::{flatten_ports, is_non_playable, rebuild_tree, reconstruct_vehicle, PortNode, Vehicle};
