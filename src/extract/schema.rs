//! Struct and field names reconstruction reads from the database

pub const ENTITY_CLASS: &str = "EntityClassDefinition";
pub const COMPONENTS: &str = "Components";
pub const STATIC_DATA: &str = "StaticEntityClassData";

// Components every item or vehicle may carry
pub const ATTACHABLE: &str = "SAttachableComponentParams";
pub const VEHICLE: &str = "VehicleComponentParams";
pub const PORT_CONTAINER: &str = "SItemPortContainerComponentParams";
pub const DEFAULT_LOADOUT: &str = "SEntityComponentDefaultLoadoutParams";
pub const HEALTH: &str = "SHealthComponentParams";
pub const PHYSICS: &str = "SEntityRigidPhysicsControllerParams";
pub const IFCS: &str = "IFCSParams";
pub const POWER_CONNECTION: &str = "EntityComponentPowerConnection";
pub const HEAT_CONNECTION: &str = "EntityComponentHeatConnection";
pub const INSURANCE: &str = "SEntityInsuranceProperties";

// Type-specific parameter blocks
pub const WEAPON: &str = "SCItemWeaponComponentParams";
pub const AMMO_CONTAINER: &str = "SAmmoContainerComponentParams";
pub const SHIELD: &str = "SCItemShieldGeneratorParams";
pub const POWER_PLANT: &str = "SCItemPowerPlantParams";
pub const COOLER: &str = "SCItemCoolerParams";
pub const QUANTUM_DRIVE: &str = "SCItemQuantumDriveParams";
pub const MISSILE: &str = "SCItemMissileParams";
pub const THRUSTER: &str = "SCItemThrusterParams";
pub const RADAR: &str = "SCItemRadarComponentParams";
pub const EMP: &str = "SCItemEMPParams";
pub const QUANTUM_INTERDICTION: &str = "SCItemQuantumInterdictionGeneratorParams";
pub const FUEL_TANK: &str = "SCItemFuelTankParams";
pub const ARMOR: &str = "SCItemVehicleArmorParams";

/// Damage fields of a `DamageInfo` block in breakdown order
pub const DAMAGE_FIELDS: [&str; 6] = [
    "DamagePhysical",
    "DamageEnergy",
    "DamageDistortion",
    "DamageThermal",
    "DamageBiochemical",
    "DamageStunSingle",
];
