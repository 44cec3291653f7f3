//! Port classification
//!
//! A port's category comes from the item types it accepts when the port
//! definition lists any, then from naming conventions on the port, then on
//! whatever is mounted in it.

use std::sync::OnceLock;

use regex::Regex;

use crate::catalog::PortCategory;

static NAME_RULES: OnceLock<Vec<(Regex, PortCategory)>> = OnceLock::new();

/// Ordered name patterns; the first match wins
fn name_rules() -> &'static [(Regex, PortCategory)] {
    NAME_RULES.get_or_init(|| {
        [
            (r"mining|salvage|tractor|repair|utility", PortCategory::Utility),
            (r"turret", PortCategory::Turret),
            (r"missile|torpedo|bomb", PortCategory::MissileRack),
            (r"quantum_?interdiction|(^|_)qed(_|$)|(^|_)qig(_|$)", PortCategory::QuantumInterdiction),
            (r"(^|_)emp(_|$)", PortCategory::Emp),
            (r"quantum_?fuel|fuel_?tank", PortCategory::FuelTank),
            (r"fuel_?intake", PortCategory::FuelIntake),
            (r"quantum_?drive|(^|_)qdrv(_|$)", PortCategory::QuantumDrive),
            (r"shield", PortCategory::Shield),
            (r"power_?plant|(^|_)powr(_|$)", PortCategory::PowerPlant),
            (r"cooler", PortCategory::Cooler),
            (r"radar", PortCategory::Radar),
            (r"countermeasure|decoy|noise|flare|chaff", PortCategory::Countermeasure),
            (r"thruster|engine", PortCategory::Thruster),
            (r"armou?r", PortCategory::Armor),
            (r"seat|cockpit", PortCategory::Seat),
            (r"weapon|gun|gimbal|hardpoint_class", PortCategory::Weapon),
        ]
        .into_iter()
        .map(|(pattern, category)| {
            let re = Regex::new(&format!("(?i){}", pattern)).expect("Invalid port rule pattern");
            (re, category)
        })
        .collect()
    })
}

/// Category for an item type tag, when the tag alone decides it
pub fn category_for_item_type(item_type: &str) -> Option<PortCategory> {
    let category = match item_type {
        "WeaponGun" | "Weapon" => PortCategory::Weapon,
        "WeaponMining" | "TractorBeam" | "SalvageHead" | "ToolArm" => PortCategory::Utility,
        "Turret" | "TurretBase" => PortCategory::Turret,
        "MissileLauncher" | "Missile" | "BombLauncher" => PortCategory::MissileRack,
        "Shield" => PortCategory::Shield,
        "PowerPlant" => PortCategory::PowerPlant,
        "Cooler" => PortCategory::Cooler,
        "QuantumDrive" => PortCategory::QuantumDrive,
        "QuantumInterdictionGenerator" => PortCategory::QuantumInterdiction,
        "EMP" => PortCategory::Emp,
        "FuelTank" | "QuantumFuelTank" => PortCategory::FuelTank,
        "FuelIntake" => PortCategory::FuelIntake,
        "MainThruster" | "ManneuverThruster" => PortCategory::Thruster,
        "Radar" => PortCategory::Radar,
        "WeaponDefensive" => PortCategory::Countermeasure,
        "Armor" => PortCategory::Armor,
        "Seat" => PortCategory::Seat,
        _ => return None,
    };
    Some(category)
}

fn category_for_name(name: &str) -> Option<PortCategory> {
    name_rules()
        .iter()
        .find(|(re, _)| re.is_match(name))
        .map(|(_, category)| *category)
}

/// Classify a port from its accepted item types, its name and the name of
/// the component mounted in it
pub fn classify_port(port_name: &str, component_name: Option<&str>, item_types: &[String]) -> PortCategory {
    item_types
        .iter()
        .find_map(|t| category_for_item_type(t))
        .or_else(|| category_for_name(port_name))
        .or_else(|| component_name.and_then(category_for_name))
        .unwrap_or(PortCategory::Other)
}
