//! Catalog rows for tests

use crate::catalog::{Component, ComponentStats, Ship};
use crate::dataforge::Guid;

pub(crate) fn guid(n: u8) -> Guid {
    let mut bytes = [0u8; 16];
    bytes[15] = n;
    Guid { bytes }
}

pub(crate) fn ship(n: u8, class_name: &str, display_name: &str) -> Ship {
    Ship {
        id: guid(n),
        class_name: class_name.to_string(),
        display_name: display_name.to_string(),
        manufacturer: None,
        career: None,
        role: None,
        crew_size: Some(1),
        dimensions: None,
        mass: None,
        hull_hp: Some(1000.0),
        shield_hp: None,
        flight: Default::default(),
        fuel: Default::default(),
        armor: Default::default(),
        insurance: None,
        matrix_id: None,
        extended: Default::default(),
    }
}

pub(crate) fn component(n: u8, class_name: &str, item_type: &str, stats: ComponentStats) -> Component {
    Component {
        id: guid(n),
        class_name: class_name.to_string(),
        display_name: class_name.to_string(),
        item_type: item_type.to_string(),
        sub_type: None,
        size: Some(1),
        grade: None,
        manufacturer: None,
        power_draw: None,
        heat_generation: None,
        stats,
    }
}
