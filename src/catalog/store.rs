//! Catalog storage
//!
//! Extraction writes through the [`CatalogSink`] trait. [`MemoryCatalog`]
//! is the in-process implementation; it can persist itself as a directory
//! of JSON files and be loaded back for cross-referencing and loadout work.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::catalog::model::{Component, CrossReferenceLink, LoadoutPort, MatrixShip, Ship};
use crate::dataforge::Guid;
use crate::error::{Error, Result};

const SHIPS_FILE: &str = "ships.json";
const COMPONENTS_FILE: &str = "components.json";
const PORTS_FILE: &str = "ports.json";
const LINKS_FILE: &str = "links.json";
const MATRIX_FILE: &str = "matrix.json";

/// Destination for reconstructed rows. Writes are upserts keyed by id.
pub trait CatalogSink: Send + Sync {
    fn upsert_ships(&self, ships: Vec<Ship>) -> Result<()>;

    fn upsert_components(&self, components: Vec<Component>) -> Result<()>;

    /// Replace every port of one ship in a single write
    fn replace_ports(&self, ship_id: Guid, ports: Vec<LoadoutPort>) -> Result<()>;

    /// Run milestone notification
    fn progress(&self, _milestone: &str) {}
}

#[derive(Default)]
struct CatalogData {
    ships: BTreeMap<Guid, Ship>,
    components: BTreeMap<Guid, Component>,
    ports: BTreeMap<Guid, Vec<LoadoutPort>>,
    links: Vec<CrossReferenceLink>,
    matrix: Vec<MatrixShip>,
}

/// In-memory catalog
#[derive(Default)]
pub struct MemoryCatalog {
    data: RwLock<CatalogData>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ships ordered by id
    pub fn ships(&self) -> Vec<Ship> {
        self.data.read().ships.values().cloned().collect()
    }

    pub fn ship(&self, id: &Guid) -> Result<Ship> {
        self.data
            .read()
            .ships
            .get(id)
            .cloned()
            .ok_or_else(|| Error::ShipNotFound(id.to_string()))
    }

    /// Find a ship by id, class name or display name
    pub fn find_ship(&self, key: &str) -> Result<Ship> {
        if let Ok(id) = key.parse::<Guid>() {
            return self.ship(&id);
        }
        let data = self.data.read();
        data.ships
            .values()
            .find(|s| s.class_name.eq_ignore_ascii_case(key))
            .or_else(|| {
                data.ships
                    .values()
                    .find(|s| s.display_name.eq_ignore_ascii_case(key))
            })
            .cloned()
            .ok_or_else(|| Error::ShipNotFound(key.to_string()))
    }

    pub fn components(&self) -> Vec<Component> {
        self.data.read().components.values().cloned().collect()
    }

    pub fn component(&self, id: &Guid) -> Result<Component> {
        self.data
            .read()
            .components
            .get(id)
            .cloned()
            .ok_or_else(|| Error::ComponentNotFound(id.to_string()))
    }

    /// Find a component by id or class name
    pub fn find_component(&self, key: &str) -> Result<Component> {
        if let Ok(id) = key.parse::<Guid>() {
            return self.component(&id);
        }
        self.data
            .read()
            .components
            .values()
            .find(|c| c.class_name.eq_ignore_ascii_case(key))
            .cloned()
            .ok_or_else(|| Error::ComponentNotFound(key.to_string()))
    }

    /// Ports of one ship in pre-order
    pub fn ports(&self, ship_id: &Guid) -> Vec<LoadoutPort> {
        self.data
            .read()
            .ports
            .get(ship_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn port_count(&self) -> usize {
        self.data.read().ports.values().map(Vec::len).sum()
    }

    pub fn links(&self) -> Vec<CrossReferenceLink> {
        self.data.read().links.clone()
    }

    /// Drop every existing link, then apply `links` to the ships they name
    pub fn replace_links(&self, links: Vec<CrossReferenceLink>) {
        let mut data = self.data.write();
        for ship in data.ships.values_mut() {
            ship.matrix_id = None;
        }
        for link in &links {
            if let Some(ship) = data.ships.get_mut(&link.ship_id) {
                ship.matrix_id = Some(link.matrix_id.clone());
            }
        }
        data.links = links;
    }

    pub fn matrix(&self) -> Vec<MatrixShip> {
        self.data.read().matrix.clone()
    }

    pub fn set_matrix(&self, matrix: Vec<MatrixShip>) {
        self.data.write().matrix = matrix;
    }

    /// Write the catalog as JSON files under `dir`
    pub fn save_dir<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let data = self.data.read();

        let ports: Vec<&LoadoutPort> = data.ports.values().flatten().collect();
        write_json(&dir.join(SHIPS_FILE), &data.ships.values().collect::<Vec<_>>())?;
        write_json(
            &dir.join(COMPONENTS_FILE),
            &data.components.values().collect::<Vec<_>>(),
        )?;
        write_json(&dir.join(PORTS_FILE), &ports)?;
        write_json(&dir.join(LINKS_FILE), &data.links)?;
        if !data.matrix.is_empty() {
            write_json(&dir.join(MATRIX_FILE), &data.matrix)?;
        }

        info!(
            dir = %dir.display(),
            ships = data.ships.len(),
            components = data.components.len(),
            ports = ports.len(),
            "saved catalog"
        );
        Ok(())
    }

    /// Load a catalog written by [`save_dir`](Self::save_dir)
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let ships: Vec<Ship> = read_json(&dir.join(SHIPS_FILE))?;
        let components: Vec<Component> = read_json(&dir.join(COMPONENTS_FILE))?;
        let ports: Vec<LoadoutPort> = read_json(&dir.join(PORTS_FILE))?;
        let links: Vec<CrossReferenceLink> = read_optional_json(&dir.join(LINKS_FILE))?;
        let matrix: Vec<MatrixShip> = read_optional_json(&dir.join(MATRIX_FILE))?;

        let mut data = CatalogData {
            ships: ships.into_iter().map(|s| (s.id, s)).collect(),
            components: components.into_iter().map(|c| (c.id, c)).collect(),
            links,
            matrix,
            ..Default::default()
        };
        for port in ports {
            data.ports.entry(port.ship_id).or_default().push(port);
        }
        for list in data.ports.values_mut() {
            list.sort_by_key(|p| p.id);
        }

        debug!(dir = %dir.display(), ships = data.ships.len(), "loaded catalog");
        Ok(Self {
            data: RwLock::new(data),
        })
    }
}

impl CatalogSink for MemoryCatalog {
    fn upsert_ships(&self, ships: Vec<Ship>) -> Result<()> {
        let mut data = self.data.write();
        for ship in ships {
            data.ships.insert(ship.id, ship);
        }
        Ok(())
    }

    fn upsert_components(&self, components: Vec<Component>) -> Result<()> {
        let mut data = self.data.write();
        for component in components {
            data.components.insert(component.id, component);
        }
        Ok(())
    }

    fn replace_ports(&self, ship_id: Guid, ports: Vec<LoadoutPort>) -> Result<()> {
        self.data.write().ports.insert(ship_id, ports);
        Ok(())
    }

    fn progress(&self, milestone: &str) {
        debug!(milestone, "catalog progress");
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

fn read_optional_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if path.exists() {
        read_json(path)
    } else {
        Ok(T::default())
    }
}
