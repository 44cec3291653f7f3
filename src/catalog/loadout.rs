//! Loadout statistics
//!
//! Totals a ship's equipped components into firepower, defence, power,
//! thermal and utility figures. Hypothetical swaps are applied to a borrowed
//! overlay of the port list; the catalog rows are never touched.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::catalog::model::{
    Component, ComponentStats, CountermeasureKind, EmpStats, FuelKind, LoadoutPort,
    QuantumInterdictionStats, Ship,
};

/// Weapons whose names match are tools, not guns
static UTILITY_PATTERN: OnceLock<Regex> = OnceLock::new();

fn utility_regex() -> &'static Regex {
    UTILITY_PATTERN
        .get_or_init(|| Regex::new(r"(?i)mining|salvage|tractor|repair").expect("Invalid utility regex pattern"))
}

/// A port paired with the component it holds
#[derive(Debug, Clone, Copy)]
pub struct LoadoutEntry<'a> {
    pub port: &'a LoadoutPort,
    pub component: Option<&'a Component>,
}

/// Put `component` (or nothing) into every port named `port_name`
#[derive(Debug, Clone)]
pub struct Swap<'a> {
    pub port_name: String,
    pub component: Option<&'a Component>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WeaponSummary {
    pub count: usize,
    /// Damage of one volley of every gun
    pub alpha: f64,
    pub dps: f64,
    pub burst_dps: f64,
    pub sustained_dps: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ShieldSummary {
    pub count: usize,
    pub hp: f64,
    pub regen: f64,
    /// Seconds from empty to full; 0 when the pool never regenerates
    pub time_to_recharge: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MissileSummary {
    pub count: usize,
    pub total_damage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Balance {
    pub supply: f64,
    pub demand: f64,
    /// Supply minus demand
    pub balance: f64,
}

impl Balance {
    fn new(supply: f64, demand: f64) -> Self {
        Self {
            supply,
            demand,
            balance: supply - demand,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QuantumSummary {
    pub drive: String,
    pub speed: f64,
    pub spool_time: Option<f64>,
    pub cooldown_time: Option<f64>,
    /// Fuel per megametre
    pub fuel_rate: Option<f64>,
    /// Megametres on a full quantum tank
    pub range: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CountermeasureSummary {
    pub flares: u32,
    pub chaff: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SignatureSummary {
    pub infrared_multiplier: Option<f64>,
    pub electromagnetic_multiplier: Option<f64>,
    /// Bounding box scaled by the armor's cross-section multiplier
    pub cross_section: Option<[f64; 3]>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadoutStats {
    pub weapons: WeaponSummary,
    /// Names of mining, salvage, tractor and repair tools
    pub utility: Vec<String>,
    pub missiles: MissileSummary,
    pub shields: ShieldSummary,
    pub hull_hp: f64,
    pub effective_hp: f64,
    pub power: Balance,
    pub thermal: Balance,
    pub quantum: Option<QuantumSummary>,
    pub hydrogen_fuel: f64,
    pub quantum_fuel: f64,
    pub countermeasures: CountermeasureSummary,
    pub emps: Vec<EmpStats>,
    pub interdiction: Vec<QuantumInterdictionStats>,
    pub signatures: SignatureSummary,
}

/// Pair each port with its component from `lookup`
pub fn entries<'a, F>(ports: &'a [LoadoutPort], lookup: F) -> Vec<LoadoutEntry<'a>>
where
    F: Fn(&LoadoutPort) -> Option<&'a Component>,
{
    ports
        .iter()
        .map(|port| LoadoutEntry {
            port,
            component: lookup(port),
        })
        .collect()
}

/// Apply swaps in order over a copy of `entries`. A port named twice keeps the last swap.
pub fn apply_swaps<'a>(entries: &[LoadoutEntry<'a>], swaps: &[Swap<'a>]) -> Vec<LoadoutEntry<'a>> {
    let mut overlay = entries.to_vec();
    for swap in swaps {
        for entry in overlay
            .iter_mut()
            .filter(|e| e.port.name.eq_ignore_ascii_case(&swap.port_name))
        {
            entry.component = swap.component;
        }
    }
    overlay
}

fn is_utility(component: &Component) -> bool {
    let re = utility_regex();
    re.is_match(&component.class_name)
        || re.is_match(&component.display_name)
        || component
            .sub_type
            .as_deref()
            .is_some_and(|s| re.is_match(s))
}

/// Total the loadout of `ship` with `swaps` applied
pub fn aggregate(ship: &Ship, entries: &[LoadoutEntry<'_>], swaps: &[Swap<'_>]) -> LoadoutStats {
    let overlay = apply_swaps(entries, swaps);
    let mut stats = LoadoutStats::default();
    let mut power_output = 0.0;
    let mut power_draw = 0.0;
    let mut cooling = 0.0;
    let mut heat = 0.0;
    let mut hydrogen = None::<f64>;
    let mut quantum_fuel = None::<f64>;
    let mut drive = None;

    for component in overlay.iter().filter_map(|e| e.component) {
        power_draw += component.power_draw.unwrap_or(0.0);
        heat += component.heat_generation.unwrap_or(0.0);

        match &component.stats {
            ComponentStats::Weapon(_) if is_utility(component) => {
                stats.utility.push(component.display_name.clone());
            }
            ComponentStats::Weapon(w) => {
                stats.weapons.count += 1;
                stats.weapons.alpha += w.alpha * w.pellets_per_shot as f64;
                stats.weapons.dps += w.dps;
                stats.weapons.burst_dps += w.burst_dps;
                stats.weapons.sustained_dps += w.sustained_dps;
            }
            ComponentStats::Missile(m) => {
                stats.missiles.count += 1;
                stats.missiles.total_damage += m.damage.total();
            }
            ComponentStats::Shield(s) => {
                stats.shields.count += 1;
                stats.shields.hp += s.max_hp;
                stats.shields.regen += s.regen_rate;
            }
            ComponentStats::PowerPlant(p) => power_output += p.power_output,
            ComponentStats::Cooler(c) => cooling += c.cooling_rate,
            ComponentStats::QuantumDrive(q) => {
                if drive.is_none() {
                    drive = Some((component.display_name.clone(), q.clone()));
                }
            }
            ComponentStats::Countermeasure(c) => match c.kind {
                CountermeasureKind::Flare => stats.countermeasures.flares += c.ammo_count,
                CountermeasureKind::Chaff => stats.countermeasures.chaff += c.ammo_count,
                CountermeasureKind::Other => {}
            },
            ComponentStats::Emp(e) => stats.emps.push(e.clone()),
            ComponentStats::QuantumInterdiction(q) => stats.interdiction.push(q.clone()),
            ComponentStats::FuelTank(t) => {
                let slot = match t.kind {
                    FuelKind::Hydrogen => &mut hydrogen,
                    FuelKind::Quantum => &mut quantum_fuel,
                };
                *slot = Some(slot.unwrap_or(0.0) + t.capacity);
            }
            ComponentStats::Thruster(_) | ComponentStats::Radar(_) | ComponentStats::Unknown => {}
        }
    }

    stats.shields.time_to_recharge = if stats.shields.regen > 0.0 {
        stats.shields.hp / stats.shields.regen
    } else {
        0.0
    };

    stats.hull_hp = ship.hull_hp.unwrap_or(0.0);
    stats.effective_hp = effective_hp(ship, stats.shields.hp, stats.hull_hp);

    stats.power = Balance::new(power_output, power_draw);
    stats.thermal = Balance::new(cooling, heat);

    stats.hydrogen_fuel = hydrogen.or(ship.fuel.hydrogen).unwrap_or(0.0);
    stats.quantum_fuel = quantum_fuel.or(ship.fuel.quantum).unwrap_or(0.0);

    stats.quantum = drive.map(|(name, q)| QuantumSummary {
        drive: name,
        speed: q.drive_speed,
        spool_time: q.spool_time,
        cooldown_time: q.cooldown_time,
        fuel_rate: q.fuel_rate,
        range: match q.fuel_rate {
            Some(rate) if rate > 0.0 && stats.quantum_fuel > 0.0 => Some(stats.quantum_fuel / rate),
            _ => q.jump_range,
        },
    });

    let armor = &ship.armor;
    stats.signatures = SignatureSummary {
        infrared_multiplier: armor.infrared,
        electromagnetic_multiplier: armor.electromagnetic,
        cross_section: ship.cross_section().map(|triple| {
            let scale = armor.cross_section.unwrap_or(1.0);
            triple.map(|extent| extent * scale)
        }),
    };

    stats
}

/// Shield plus hull scaled by the mean physical/energy damage multiplier.
/// Without a usable multiplier the hull counts at face value.
fn effective_hp(ship: &Ship, shield_hp: f64, hull_hp: f64) -> f64 {
    let multipliers: Vec<f64> = [ship.armor.physical, ship.armor.energy]
        .into_iter()
        .flatten()
        .collect();
    let average = if multipliers.is_empty() {
        0.0
    } else {
        multipliers.iter().sum::<f64>() / multipliers.len() as f64
    };
    if average > 0.0 {
        shield_hp + hull_hp / average
    } else {
        shield_hp + hull_hp
    }
}
