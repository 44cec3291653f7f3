//! Catalog rows
//!
//! Everything extraction produces and the catalog persists. Rows are plain
//! serde structs; the only field changed after creation is
//! [`Ship::matrix_id`], written by the cross-reference matcher.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::dataforge::Guid;

/// A flyable vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ship {
    pub id: Guid,
    pub class_name: String,
    pub display_name: String,
    pub manufacturer: Option<Manufacturer>,
    pub career: Option<String>,
    pub role: Option<String>,
    pub crew_size: Option<u32>,
    pub dimensions: Option<Dimensions>,
    pub mass: Option<f64>,
    pub hull_hp: Option<f64>,
    /// Sum of the default shield generators' pools
    pub shield_hp: Option<f64>,
    #[serde(default)]
    pub flight: FlightEnvelope,
    #[serde(default)]
    pub fuel: FuelCapacity,
    #[serde(default)]
    pub armor: ArmorProfile,
    pub insurance: Option<Insurance>,
    /// Linked ship-matrix entry, set by the matcher
    pub matrix_id: Option<String>,
    /// Loosely typed extras for presentation
    #[serde(default)]
    pub extended: BTreeMap<String, serde_json::Value>,
}

impl Ship {
    /// Bounding box extents as the cross-section fallback triple
    pub fn cross_section(&self) -> Option<[f64; 3]> {
        self.dimensions.map(|d| [d.length, d.beam, d.height])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manufacturer {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub length: f64,
    pub beam: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FlightEnvelope {
    pub scm_speed: Option<f64>,
    pub max_speed: Option<f64>,
    pub pitch: Option<f64>,
    pub yaw: Option<f64>,
    pub roll: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FuelCapacity {
    pub hydrogen: Option<f64>,
    pub quantum: Option<f64>,
}

/// Incoming damage multipliers and signature multipliers of the hull armor
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ArmorProfile {
    pub physical: Option<f64>,
    pub energy: Option<f64>,
    pub distortion: Option<f64>,
    pub thermal: Option<f64>,
    pub biochemical: Option<f64>,
    pub stun: Option<f64>,
    pub infrared: Option<f64>,
    pub electromagnetic: Option<f64>,
    pub cross_section: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Insurance {
    /// Minutes
    pub claim_time: f64,
    pub expedite_time: f64,
    pub expedite_cost: f64,
}

/// Damage split by type
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DamageBreakdown {
    pub physical: f64,
    pub energy: f64,
    pub distortion: f64,
    pub thermal: f64,
    pub biochemical: f64,
    pub stun: f64,
}

impl DamageBreakdown {
    pub fn total(&self) -> f64 {
        self.physical + self.energy + self.distortion + self.thermal + self.biochemical + self.stun
    }
}

/// An equippable item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub id: Guid,
    pub class_name: String,
    pub display_name: String,
    /// Raw item type tag, e.g. `WeaponGun`
    pub item_type: String,
    pub sub_type: Option<String>,
    pub size: Option<u32>,
    pub grade: Option<u32>,
    pub manufacturer: Option<String>,
    pub power_draw: Option<f64>,
    pub heat_generation: Option<f64>,
    pub stats: ComponentStats,
}

/// Type-specific statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComponentStats {
    Weapon(WeaponStats),
    Shield(ShieldStats),
    PowerPlant(PowerPlantStats),
    Cooler(CoolerStats),
    QuantumDrive(QuantumDriveStats),
    Missile(MissileStats),
    Thruster(ThrusterStats),
    Radar(RadarStats),
    Countermeasure(CountermeasureStats),
    Emp(EmpStats),
    QuantumInterdiction(QuantumInterdictionStats),
    FuelTank(FuelTankStats),
    /// An item type the reconstructor has no stat block for
    Unknown,
}

impl ComponentStats {
    pub fn kind(&self) -> &'static str {
        match self {
            ComponentStats::Weapon(_) => "weapon",
            ComponentStats::Shield(_) => "shield",
            ComponentStats::PowerPlant(_) => "power_plant",
            ComponentStats::Cooler(_) => "cooler",
            ComponentStats::QuantumDrive(_) => "quantum_drive",
            ComponentStats::Missile(_) => "missile",
            ComponentStats::Thruster(_) => "thruster",
            ComponentStats::Radar(_) => "radar",
            ComponentStats::Countermeasure(_) => "countermeasure",
            ComponentStats::Emp(_) => "emp",
            ComponentStats::QuantumInterdiction(_) => "quantum_interdiction",
            ComponentStats::FuelTank(_) => "fuel_tank",
            ComponentStats::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeaponStats {
    /// Rounds per minute
    pub fire_rate: f64,
    pub pellets_per_shot: u32,
    /// Damage of one pellet
    pub alpha: f64,
    pub damage: DamageBreakdown,
    /// `None` for weapons that never run dry
    pub ammo_count: Option<u32>,
    /// Shots per trigger pull for burst-fire actions
    pub burst_size: Option<u32>,
    pub heat_per_shot: Option<f64>,
    pub overheat_temperature: Option<f64>,
    pub cooling_per_second: Option<f64>,
    pub overheat_fix_time: Option<f64>,
    pub dps: f64,
    pub burst_dps: f64,
    pub sustained_dps: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShieldStats {
    pub max_hp: f64,
    /// HP per second
    pub regen_rate: f64,
    pub damaged_regen_delay: Option<f64>,
    pub downed_regen_delay: Option<f64>,
    pub hardening_factor: Option<f64>,
    pub face_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerPlantStats {
    pub power_output: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoolerStats {
    pub cooling_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantumDriveStats {
    /// Metres per second
    pub drive_speed: f64,
    pub spool_time: Option<f64>,
    pub cooldown_time: Option<f64>,
    /// Fuel per megametre
    pub fuel_rate: Option<f64>,
    pub jump_range: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissileStats {
    pub damage: DamageBreakdown,
    pub tracking_signal: Option<String>,
    pub lock_time: Option<f64>,
    pub lock_range: Option<f64>,
    pub speed: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrusterStats {
    pub thrust_capacity: f64,
    pub fuel_burn_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadarStats {
    pub detection_range: Option<f64>,
    pub cross_section_sensitivity: Option<f64>,
    pub infrared_sensitivity: Option<f64>,
    pub electromagnetic_sensitivity: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountermeasureKind {
    Flare,
    Chaff,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountermeasureStats {
    pub kind: CountermeasureKind,
    pub ammo_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmpStats {
    pub charge_time: Option<f64>,
    pub distortion_damage: Option<f64>,
    pub emp_radius: Option<f64>,
    pub cooldown_time: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantumInterdictionStats {
    pub jammer_range: Option<f64>,
    pub interdiction_range: Option<f64>,
    pub charge_time: Option<f64>,
    pub cooldown_time: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FuelKind {
    Hydrogen,
    Quantum,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuelTankStats {
    pub kind: FuelKind,
    pub capacity: f64,
}

/// What a port is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortCategory {
    Weapon,
    Turret,
    MissileRack,
    Shield,
    PowerPlant,
    Cooler,
    QuantumDrive,
    QuantumInterdiction,
    Emp,
    FuelTank,
    FuelIntake,
    Thruster,
    Radar,
    Countermeasure,
    Armor,
    Utility,
    Seat,
    Other,
}

impl fmt::Display for PortCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        f.write_str(&text)
    }
}

/// One slot of a ship's default loadout. Ports are stored flattened in
/// pre-order; `parent_id` restores the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadoutPort {
    pub ship_id: Guid,
    /// Sequential pre-order index, unique within the ship
    pub id: u32,
    pub parent_id: Option<u32>,
    pub name: String,
    pub category: PortCategory,
    pub min_size: Option<u32>,
    pub max_size: Option<u32>,
    /// Equipped component, when it is in the catalog
    pub component_id: Option<Guid>,
    /// Class name of whatever the port holds, catalogued or not
    pub component_class: Option<String>,
}

/// One entry of the public ship-matrix feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixShip {
    #[serde(deserialize_with = "lenient_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub manufacturer: Option<MatrixManufacturer>,
    #[serde(default)]
    pub focus: Option<String>,
    #[serde(default)]
    pub production_status: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub length: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub beam: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub height: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub mass: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub cargocapacity: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub min_crew: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub max_crew: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub scm_speed: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub afterburner_speed: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixManufacturer {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Which matcher pass produced a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPass {
    Exact,
    Alias,
    Structural,
    Fuzzy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossReferenceLink {
    pub matrix_id: String,
    pub ship_id: Guid,
    pub pass: MatchPass,
    /// 1.0 for the deterministic passes, the token overlap for fuzzy ones
    pub score: f64,
}

/// Accepts a number, a numeric string, an empty string or null
fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Loose {
        Number(f64),
        Text(String),
    }
    Ok(match Option::<Loose>::deserialize(deserializer)? {
        Some(Loose::Number(n)) => Some(n),
        Some(Loose::Text(s)) => s.trim().replace(',', "").parse().ok(),
        None => None,
    })
}

fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Loose {
        Int(i64),
        Text(String),
    }
    Ok(match Loose::deserialize(deserializer)? {
        Loose::Int(n) => n.to_string(),
        Loose::Text(s) => s,
    })
}

/// Parse a matrix feed: a bare array or the `{"data": [...]}` envelope
pub fn parse_matrix(json: &str) -> crate::Result<Vec<MatrixShip>> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Feed {
        Bare(Vec<MatrixShip>),
        Envelope { data: Vec<MatrixShip> },
    }
    Ok(match serde_json::from_str(json)? {
        Feed::Bare(ships) => ships,
        Feed::Envelope { data } => data,
    })
}
