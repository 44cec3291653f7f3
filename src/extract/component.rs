//! Component reconstruction
//!
//! Every entity record with an attachable definition is an item. Its common
//! header (type, size, grade, manufacturer, name) is always read; the type tag
//! then selects exactly one stat block. Items of types without a stat block,
//! or whose parameter block is missing, keep the header with
//! [`ComponentStats::Unknown`].

use tracing::debug;

use crate::catalog::{
    Component, ComponentStats, CoolerStats, CountermeasureKind, CountermeasureStats,
    DamageBreakdown, EmpStats, FuelKind, FuelTankStats, MissileStats, PowerPlantStats,
    QuantumDriveStats, QuantumInterdictionStats, RadarStats, ShieldStats, ThrusterStats,
    WeaponStats,
};
use crate::dataforge::{Record, ResolvedNode};
use crate::error::Error;
use crate::extract::context::ExtractionContext;
use crate::extract::schema::{self, COMPONENTS, DAMAGE_FIELDS};

/// Engagement window the magazine is spread over for burst DPS, in seconds
pub const BURST_WINDOW_SECS: f64 = 10.0;

/// Item types that carry a stat block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Weapon,
    Shield,
    PowerPlant,
    Cooler,
    QuantumDrive,
    Missile,
    Thruster,
    Radar,
    Countermeasure,
    Emp,
    QuantumInterdiction,
    FuelTank(FuelKind),
}

impl ItemKind {
    pub fn from_type(item_type: &str) -> Option<Self> {
        let kind = match item_type {
            "WeaponGun" | "WeaponMining" => ItemKind::Weapon,
            "Shield" => ItemKind::Shield,
            "PowerPlant" => ItemKind::PowerPlant,
            "Cooler" => ItemKind::Cooler,
            "QuantumDrive" => ItemKind::QuantumDrive,
            "Missile" => ItemKind::Missile,
            "MainThruster" | "ManneuverThruster" => ItemKind::Thruster,
            "Radar" => ItemKind::Radar,
            "WeaponDefensive" => ItemKind::Countermeasure,
            "EMP" => ItemKind::Emp,
            "QuantumInterdictionGenerator" => ItemKind::QuantumInterdiction,
            "FuelTank" => ItemKind::FuelTank(FuelKind::Hydrogen),
            "QuantumFuelTank" => ItemKind::FuelTank(FuelKind::Quantum),
            _ => return None,
        };
        Some(kind)
    }
}

fn num(node: Option<&ResolvedNode<'_>>, path: &str) -> Option<f64> {
    node.and_then(|n| n.f64(path))
}

fn count(node: Option<&ResolvedNode<'_>>, path: &str) -> Option<u32> {
    num(node, path).filter(|v| *v > 0.0).map(|v| v as u32)
}

/// Read a `DamageInfo` block
fn damage_breakdown(node: &ResolvedNode<'_>) -> DamageBreakdown {
    let [physical, energy, distortion, thermal, biochemical, stun] =
        DAMAGE_FIELDS.map(|field| node.f64(field).unwrap_or(0.0));
    DamageBreakdown {
        physical,
        energy,
        distortion,
        thermal,
        biochemical,
        stun,
    }
}

/// Fill in the derived damage figures of a weapon
pub fn derive_weapon_dps(stats: &mut WeaponStats) {
    let volley = stats.alpha * stats.pellets_per_shot as f64;
    let dps = volley * stats.fire_rate / 60.0;
    stats.dps = dps;
    stats.burst_dps = match stats.ammo_count {
        Some(rounds) => dps.min(rounds as f64 * volley / BURST_WINDOW_SECS),
        None => dps,
    };
    stats.sustained_dps = dps * duty_cycle(stats);
}

/// Share of time a weapon can fire when heat builds faster than it sheds.
/// Weapons without heat data fire continuously.
fn duty_cycle(stats: &WeaponStats) -> f64 {
    let (Some(heat_per_shot), Some(limit)) = (stats.heat_per_shot, stats.overheat_temperature) else {
        return 1.0;
    };
    let cooling = stats.cooling_per_second.unwrap_or(0.0);
    let heating = heat_per_shot * stats.fire_rate / 60.0;
    if heating <= cooling || limit <= 0.0 {
        return 1.0;
    }

    let firing = limit / (heating - cooling);
    let recovering = match stats.overheat_fix_time {
        Some(t) if t > 0.0 => t,
        _ if cooling > 0.0 => limit / cooling,
        _ => 0.0,
    };
    firing / (firing + recovering)
}

/// Rebuild a component from its entity record. `None` when the record is not an item.
pub fn reconstruct_component<R>(
    ctx: &ExtractionContext<R>,
    record: &Record,
    root: &ResolvedNode<'_>,
) -> Option<Component> {
    let attach = root.find_child(COMPONENTS, schema::ATTACHABLE)?;
    let def = attach.child("AttachDef")?;

    let class_name = record.short_name().to_string();
    let item_type = def.string("Type").unwrap_or_else(|| "Unknown".to_string());
    let display_name = ctx.display_name(def.string("Localization.Name").as_deref(), &class_name);
    let manufacturer = def
        .child("Manufacturer")
        .and_then(|m| m.string("Code"))
        .filter(|code| !code.is_empty());

    let sub_type = def.string("SubType").filter(|s| !s.is_empty());
    let power = root.find_child(COMPONENTS, schema::POWER_CONNECTION);
    let heat = root.find_child(COMPONENTS, schema::HEAT_CONNECTION);

    let stats = match ItemKind::from_type(&item_type) {
        Some(kind) => {
            read_stats(kind, root, &class_name, sub_type.as_deref()).unwrap_or_else(|| {
                debug!(record = %record.name, item_type = %item_type, "item has no parameter block");
                ComponentStats::Unknown
            })
        }
        None => {
            let unknown = Error::UnknownItemType {
                record: record.name.clone(),
                item_type: item_type.clone(),
            };
            debug!("{}", unknown);
            ComponentStats::Unknown
        }
    };

    Some(Component {
        id: record.id,
        class_name,
        display_name,
        sub_type,
        size: count(Some(&def), "Size"),
        grade: count(Some(&def), "Grade"),
        manufacturer,
        power_draw: num(power.as_ref(), "PowerDraw"),
        heat_generation: num(heat.as_ref(), "ThermalEnergyDraw"),
        item_type,
        stats,
    })
}

fn read_stats(
    kind: ItemKind,
    root: &ResolvedNode<'_>,
    class_name: &str,
    sub_type: Option<&str>,
) -> Option<ComponentStats> {
    let params = |name: &str| root.find_child(COMPONENTS, name);

    let stats = match kind {
        ItemKind::Weapon => ComponentStats::Weapon(weapon_stats(root)?),
        ItemKind::Shield => {
            let p = params(schema::SHIELD)?;
            ComponentStats::Shield(ShieldStats {
                max_hp: p.f64("MaxShieldHealth").unwrap_or(0.0),
                regen_rate: p.f64("MaxShieldRegen").unwrap_or(0.0),
                damaged_regen_delay: p.f64("DamagedRegenDelay"),
                downed_regen_delay: p.f64("DownedRegenDelay"),
                hardening_factor: p.f64("ShieldHardening.Factor"),
                face_count: p.string("FaceType").and_then(|face| match face.as_str() {
                    "Bubble" => Some(1),
                    "FrontBack" => Some(2),
                    "Quadrant" => Some(4),
                    _ => None,
                }),
            })
        }
        ItemKind::PowerPlant => {
            let output = params(schema::POWER_PLANT)
                .and_then(|p| p.f64("PowerOutput"))
                .or_else(|| num(params(schema::POWER_CONNECTION).as_ref(), "PowerDraw"))?;
            ComponentStats::PowerPlant(PowerPlantStats { power_output: output })
        }
        ItemKind::Cooler => ComponentStats::Cooler(CoolerStats {
            cooling_rate: params(schema::COOLER)?.f64("CoolingRate").unwrap_or(0.0),
        }),
        ItemKind::QuantumDrive => {
            let p = params(schema::QUANTUM_DRIVE)?;
            ComponentStats::QuantumDrive(QuantumDriveStats {
                drive_speed: p.f64("params.driveSpeed").unwrap_or(0.0),
                spool_time: p.f64("params.spoolUpTime"),
                cooldown_time: p.f64("params.cooldownTime"),
                fuel_rate: p.f64("quantumFuelRequirement"),
                jump_range: p.f64("jumpRange"),
            })
        }
        ItemKind::Missile => {
            let p = params(schema::MISSILE)?;
            ComponentStats::Missile(MissileStats {
                damage: p
                    .path("explosionParams.damage")
                    .map(|d| damage_breakdown(&d))
                    .unwrap_or_default(),
                tracking_signal: p.string("targetingParams.trackingSignalType"),
                lock_time: p.f64("targetingParams.lockTime"),
                lock_range: p.f64("targetingParams.lockRangeMax"),
                speed: p.f64("GCSParams.linearSpeed"),
            })
        }
        ItemKind::Thruster => {
            let p = params(schema::THRUSTER)?;
            ComponentStats::Thruster(ThrusterStats {
                thrust_capacity: p.f64("thrustCapacity").unwrap_or(0.0),
                fuel_burn_rate: p.f64("fuelBurnRatePer10KNewton"),
            })
        }
        ItemKind::Radar => {
            let p = params(schema::RADAR)?;
            let detection = p.children("signatureDetection");
            let sensitivity = |i: usize| detection.get(i).and_then(|d| d.f64("sensitivity"));
            ComponentStats::Radar(RadarStats {
                detection_range: p.f64("aimAssist.distanceMax"),
                electromagnetic_sensitivity: sensitivity(0),
                infrared_sensitivity: sensitivity(1),
                cross_section_sensitivity: sensitivity(2),
            })
        }
        ItemKind::Countermeasure => {
            let ammo = params(schema::AMMO_CONTAINER);
            ComponentStats::Countermeasure(CountermeasureStats {
                kind: countermeasure_kind(class_name, sub_type),
                ammo_count: count(ammo.as_ref(), "maxAmmoCount").unwrap_or(0),
            })
        }
        ItemKind::Emp => {
            let p = params(schema::EMP)?;
            ComponentStats::Emp(EmpStats {
                charge_time: p.f64("chargeTime"),
                distortion_damage: p.f64("distortionDamage"),
                emp_radius: p.f64("empRadius"),
                cooldown_time: p.f64("cooldownTime"),
            })
        }
        ItemKind::QuantumInterdiction => {
            let p = params(schema::QUANTUM_INTERDICTION)?;
            ComponentStats::QuantumInterdiction(QuantumInterdictionStats {
                jammer_range: p.f64("jammerSettings.jammerRange"),
                interdiction_range: p.f64("quantumInterdictionPulseSettings.radiusMeters"),
                charge_time: p.f64("quantumInterdictionPulseSettings.chargeTimeSecs"),
                cooldown_time: p.f64("quantumInterdictionPulseSettings.cooldownTimeSecs"),
            })
        }
        ItemKind::FuelTank(kind) => ComponentStats::FuelTank(FuelTankStats {
            kind,
            capacity: params(schema::FUEL_TANK)?.f64("capacity").unwrap_or(0.0),
        }),
    };
    Some(stats)
}

fn countermeasure_kind(class_name: &str, sub_type: Option<&str>) -> CountermeasureKind {
    let names = [Some(class_name), sub_type];
    let has = |needle: &str| {
        names
            .iter()
            .flatten()
            .any(|n| n.to_ascii_lowercase().contains(needle))
    };
    if has("flare") {
        CountermeasureKind::Flare
    } else if has("chaff") || has("noise") {
        CountermeasureKind::Chaff
    } else {
        CountermeasureKind::Other
    }
}

fn weapon_stats(root: &ResolvedNode<'_>) -> Option<WeaponStats> {
    let params = root.find_child(COMPONENTS, schema::WEAPON)?;
    let action = params.children("fireActions").into_iter().next();
    let heat = params.path("connectionParams.simplifiedHeatParams");

    let ammo = root.find_child(COMPONENTS, schema::AMMO_CONTAINER);
    let damage = ammo
        .as_ref()
        .and_then(|a| a.path("ammoParamsRecord.projectileParams.damage"))
        .map(|d| damage_breakdown(&d))
        .unwrap_or_default();

    let mut stats = WeaponStats {
        fire_rate: num(action.as_ref(), "fireRate").unwrap_or(0.0),
        pellets_per_shot: count(action.as_ref(), "launchParams.pelletCount").unwrap_or(1),
        alpha: damage.total(),
        damage,
        ammo_count: count(ammo.as_ref(), "maxAmmoCount"),
        burst_size: count(action.as_ref(), "shotCount"),
        heat_per_shot: num(action.as_ref(), "heatPerShot"),
        overheat_temperature: num(heat.as_ref(), "overheatTemperature"),
        cooling_per_second: num(heat.as_ref(), "coolingPerSecond"),
        overheat_fix_time: num(heat.as_ref(), "overheatFixTime"),
        dps: 0.0,
        burst_dps: 0.0,
        sustained_dps: 0.0,
    };
    derive_weapon_dps(&mut stats);
    Some(stats)
}
