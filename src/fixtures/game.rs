//! A miniature game install: one fighter with a mounted turret, its items,
//! an AI variant, the localization table and an implementation file

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};

use crate::binary::Endian;
use crate::catalog::Component;
use crate::cryxml::XmlElement;
use crate::dataforge::{DataType, Guid, InstanceRef};
use crate::extract::component::reconstruct_component;
use crate::extract::{ExtractOptions, ExtractionContext};
use crate::fixtures::cryxml::CryXmlBuilder;
use crate::fixtures::dcb::{DcbBuilder, FieldKind, FixtureValue as V};
use crate::fixtures::ArchiveBuilder;
use crate::p4k::{CompressionMethod, P4kFile};

const fn id(n: u8) -> Guid {
    let mut bytes = [0u8; 16];
    bytes[0] = 0x5c;
    bytes[15] = n;
    Guid { bytes }
}

pub(crate) const SHIP_ID: Guid = id(1);
pub(crate) const AI_SHIP_ID: Guid = id(2);
pub(crate) const WEAPON_ID: Guid = id(10);
pub(crate) const SHIELD_ID: Guid = id(11);
pub(crate) const TURRET_ID: Guid = id(12);
pub(crate) const ARMOR_ID: Guid = id(13);
pub(crate) const AMMO_ID: Guid = id(20);
pub(crate) const AEGIS_ID: Guid = id(30);
pub(crate) const KLAUS_ID: Guid = id(31);

pub(crate) const IMPLEMENTATION: &str = "Scripts/Entities/Vehicles/Implementations/Xml/AEGS_Gladius.xml";

const GLOBAL_INI: &str = "\u{feff}vehicle_NameAEGS_Gladius=Gladius
vehicle_focus_combat=Combat
vehicle_class_lightfighter=Light Fighter
manufacturer_NameAEGS=Aegis Dynamics
manufacturer_NameKLWE=Klaus & Werner
item_NameKLWE_LaserRepeater_S3=CF-337 Panther Repeater
item_NameAEGS_Gladius_Turret=Gladius Turret
";

pub(crate) struct GameFixture {
    pub(crate) archive: Vec<u8>,
}

impl GameFixture {
    pub(crate) fn context(&self, options: ExtractOptions) -> ExtractionContext<Cursor<Vec<u8>>> {
        let archive = P4kFile::from_reader(Cursor::new(self.archive.clone()), options.archive.clone())
            .expect("fixture archive opens");
        ExtractionContext::from_archive(archive, options).expect("fixture database loads")
    }
}

/// Every item of the fixture reconstructed, keyed by record id
pub(crate) fn components<R: Read + Seek>(ctx: &ExtractionContext<R>) -> HashMap<Guid, Component> {
    let resolver = ctx.resolver();
    ctx.entity_records()
        .into_iter()
        .filter_map(|record| {
            let root = resolver.resolve_record(record)?;
            reconstruct_component(ctx, record, &root)
        })
        .map(|c| (c.id, c))
        .collect()
}

fn ptr(struct_index: u32, instance_index: u32) -> V {
    V::Pointer(Some(InstanceRef {
        struct_index,
        instance_index,
    }))
}

fn f(value: f64) -> V {
    V::Float(value)
}

fn s(value: &str) -> V {
    V::Str(value.to_string())
}

fn part(name: &str, damage_max: f64, mass: f64, children: Vec<XmlElement>) -> XmlElement {
    let nested = if children.is_empty() {
        Vec::new()
    } else {
        vec![XmlElement {
            children,
            ..XmlElement::new("Parts")
        }]
    };
    XmlElement {
        attributes: vec![
            ("name".to_string(), name.to_string()),
            ("damageMax".to_string(), damage_max.to_string()),
            ("mass".to_string(), mass.to_string()),
        ],
        children: nested,
        ..XmlElement::new("Part")
    }
}

fn implementation() -> Vec<u8> {
    let body = part(
        "Body",
        3000.0,
        40000.0,
        vec![
            part("Wing_Left", 750.0, 4000.0, Vec::new()),
            part("Wing_Right", 750.0, 4000.0, Vec::new()),
        ],
    );
    let root = XmlElement {
        attributes: vec![("name".to_string(), "AEGS_Gladius".to_string())],
        children: vec![XmlElement {
            children: vec![body],
            ..XmlElement::new("Parts")
        }],
        ..XmlElement::new("Vehicle")
    };
    CryXmlBuilder::new(Endian::Little).build(&root)
}

fn database() -> Vec<u8> {
    use DataType::{Enum, Int32, Locale, Reference, Single, String as Text, StrongPointer};
    use FieldKind::{Array, Attr, Class, ClassArray};

    let mut b = DcbBuilder::new();
    b.add_enum("EItemType", &["WeaponGun", "Shield", "Turret", "Armor", "Radar"]);

    let damage = b.add_struct(
        "DamageInfo",
        None,
        vec![
            ("DamagePhysical", Attr(Single)),
            ("DamageEnergy", Attr(Single)),
            ("DamageDistortion", Attr(Single)),
            ("DamageThermal", Attr(Single)),
            ("DamageBiochemical", Attr(Single)),
            ("DamageStunSingle", Attr(Single)),
        ],
    );
    let localization = b.add_struct("SCItemLocalization", None, vec![("Name", Attr(Locale))]);
    let manufacturer = b.add_struct(
        "SCItemManufacturer",
        None,
        vec![("Code", Attr(Text)), ("Localization", Class(localization))],
    );
    let item_def = b.add_struct(
        "SItemDefinition",
        None,
        vec![
            ("Type", Attr(Enum)),
            ("SubType", Attr(Enum)),
            ("Size", Attr(Int32)),
            ("Grade", Attr(Int32)),
            ("Manufacturer", Attr(Reference)),
            ("Localization", Class(localization)),
        ],
    );
    let attachable = b.add_struct(
        "SAttachableComponentParams",
        None,
        vec![("AttachDef", Class(item_def))],
    );
    let power = b.add_struct(
        "EntityComponentPowerConnection",
        None,
        vec![("PowerDraw", Attr(Single))],
    );
    let heat = b.add_struct(
        "EntityComponentHeatConnection",
        None,
        vec![("ThermalEnergyDraw", Attr(Single))],
    );
    let launcher = b.add_struct("SProjectileLauncher", None, vec![("pelletCount", Attr(Int32))]);
    let fire_action = b.add_struct(
        "SWeaponActionFireRapidParams",
        None,
        vec![
            ("fireRate", Attr(Single)),
            ("heatPerShot", Attr(Single)),
            ("launchParams", Attr(StrongPointer)),
        ],
    );
    let heat_params = b.add_struct(
        "SWeaponSimplifiedHeatParams",
        None,
        vec![
            ("overheatTemperature", Attr(Single)),
            ("coolingPerSecond", Attr(Single)),
            ("overheatFixTime", Attr(Single)),
        ],
    );
    let connection = b.add_struct(
        "SWeaponConnectionParams",
        None,
        vec![("simplifiedHeatParams", Class(heat_params))],
    );
    let weapon = b.add_struct(
        "SCItemWeaponComponentParams",
        None,
        vec![
            ("fireActions", Array(StrongPointer)),
            ("connectionParams", Class(connection)),
        ],
    );
    let projectile = b.add_struct(
        "BulletProjectileParams",
        None,
        vec![("damage", Attr(StrongPointer))],
    );
    let ammo = b.add_struct(
        "AmmoParams",
        None,
        vec![("speed", Attr(Single)), ("projectileParams", Attr(StrongPointer))],
    );
    let ammo_container = b.add_struct(
        "SAmmoContainerComponentParams",
        None,
        vec![("maxAmmoCount", Attr(Int32)), ("ammoParamsRecord", Attr(Reference))],
    );
    let shield = b.add_struct(
        "SCItemShieldGeneratorParams",
        None,
        vec![
            ("MaxShieldHealth", Attr(Single)),
            ("MaxShieldRegen", Attr(Single)),
            ("DamagedRegenDelay", Attr(Single)),
            ("DownedRegenDelay", Attr(Single)),
        ],
    );
    let vec3 = b.add_struct(
        "Vec3",
        None,
        vec![("x", Attr(Single)), ("y", Attr(Single)), ("z", Attr(Single))],
    );
    let vehicle = b.add_struct(
        "VehicleComponentParams",
        None,
        vec![
            ("vehicleDefinition", Attr(Text)),
            ("vehicleName", Attr(Locale)),
            ("vehicleCareer", Attr(Locale)),
            ("vehicleRole", Attr(Locale)),
            ("crewSize", Attr(Int32)),
            ("manufacturer", Attr(Reference)),
            ("maxBoundingBoxSize", Class(vec3)),
        ],
    );
    let ifcs = b.add_struct(
        "IFCSParams",
        None,
        vec![
            ("scmSpeed", Attr(Single)),
            ("maxSpeed", Attr(Single)),
            ("maxAngularVelocity", Class(vec3)),
        ],
    );
    let health = b.add_struct("SHealthComponentParams", None, vec![("Health", Attr(Single))]);
    let port_type = b.add_struct("SItemPortDefTypes", None, vec![("Type", Attr(Enum))]);
    let port_def = b.add_struct(
        "SItemPortDef",
        None,
        vec![
            ("Name", Attr(Text)),
            ("MinSize", Attr(Int32)),
            ("MaxSize", Attr(Int32)),
            ("Types", ClassArray(port_type)),
        ],
    );
    let container = b.add_struct(
        "SItemPortContainerComponentParams",
        None,
        vec![("Ports", ClassArray(port_def))],
    );
    let entry = b.add_struct(
        "SItemPortLoadoutEntryParams",
        None,
        vec![
            ("itemPortName", Attr(Text)),
            ("entityClassName", Attr(Text)),
            ("entityClassReference", Attr(Reference)),
            ("loadout", Attr(StrongPointer)),
        ],
    );
    let manual = b.add_struct(
        "SItemPortLoadoutManualParams",
        None,
        vec![("entries", ClassArray(entry))],
    );
    let default_loadout = b.add_struct(
        "SEntityComponentDefaultLoadoutParams",
        None,
        vec![("loadout", Attr(StrongPointer))],
    );
    let insurance_params = b.add_struct(
        "SShipInsuranceParams",
        None,
        vec![
            ("baseWaitTimeMinutes", Attr(Single)),
            ("mandatoryWaitTimeMinutes", Attr(Single)),
            ("baseExpeditingFee", Attr(Single)),
        ],
    );
    let insurance = b.add_struct(
        "SEntityInsuranceProperties",
        None,
        vec![("shipInsuranceParams", Class(insurance_params))],
    );
    let armor = b.add_struct(
        "SCItemVehicleArmorParams",
        None,
        vec![
            ("damageMultiplier", Attr(StrongPointer)),
            ("signalInfrared", Attr(Single)),
            ("signalElectromagnetic", Attr(Single)),
            ("signalCrossSection", Attr(Single)),
        ],
    );
    let entity = b.add_struct(
        "EntityClassDefinition",
        None,
        vec![
            ("Components", Array(StrongPointer)),
            ("StaticEntityClassData", Array(StrongPointer)),
        ],
    );

    let item_header = |ty: &str, sub: &str, size: i64, grade: i64, maker: Option<Guid>, name: &str| {
        vec![V::Inline(vec![
            s(ty),
            s(sub),
            V::Int(size),
            V::Int(grade),
            V::Reference(maker),
            V::Inline(vec![s(name)]),
        ])]
    };

    // Manufacturers
    let aegis = b.add_instance(
        manufacturer,
        vec![s("AEGS"), V::Inline(vec![s("@manufacturer_NameAEGS")])],
    );
    let klaus = b.add_instance(
        manufacturer,
        vec![s("KLWE"), V::Inline(vec![s("@manufacturer_NameKLWE")])],
    );
    b.add_record("SCItemManufacturer.AEGS", "libs/scitem/manufacturers/aegs.xml", manufacturer, aegis, AEGIS_ID);
    b.add_record("SCItemManufacturer.KLWE", "libs/scitem/manufacturers/klwe.xml", manufacturer, klaus, KLAUS_ID);

    // Laser repeater and its ammunition
    let bolt = b.add_instance(damage, vec![f(0.0), f(20.0), f(0.0), f(0.0), f(0.0), f(0.0)]);
    let bullet = b.add_instance(projectile, vec![ptr(damage, bolt)]);
    let ammo_params = b.add_instance(ammo, vec![f(1800.0), ptr(projectile, bullet)]);
    b.add_record(
        "AmmoParams.KLWE_LaserRepeater_S3_Ammo",
        "libs/ammoparams/vehicle/klwe_laserrepeater_s3_ammo.xml",
        ammo,
        ammo_params,
        AMMO_ID,
    );
    let gun_attach = b.add_instance(
        attachable,
        item_header("WeaponGun", "Gun", 3, 1, Some(KLAUS_ID), "@item_NameKLWE_LaserRepeater_S3"),
    );
    let gun_power = b.add_instance(power, vec![f(15.0)]);
    let gun_heat = b.add_instance(heat, vec![f(2.0)]);
    let gun_launcher = b.add_instance(launcher, vec![V::Int(1)]);
    let gun_action = b.add_instance(fire_action, vec![f(1200.0), f(0.0), ptr(launcher, gun_launcher)]);
    let gun_params = b.add_instance(
        weapon,
        vec![
            V::List(vec![ptr(fire_action, gun_action)]),
            V::Inline(vec![V::Inline(vec![f(0.0), f(0.0), f(0.0)])]),
        ],
    );
    let gun_ammo = b.add_instance(ammo_container, vec![V::Int(0), V::Reference(Some(AMMO_ID))]);
    let gun = b.add_instance(
        entity,
        vec![
            V::List(vec![
                ptr(attachable, gun_attach),
                ptr(power, gun_power),
                ptr(heat, gun_heat),
                ptr(weapon, gun_params),
                ptr(ammo_container, gun_ammo),
            ]),
            V::List(Vec::new()),
        ],
    );
    b.add_record(
        "EntityClassDefinition.KLWE_LaserRepeater_S3",
        "libs/entities/scitem/ships/weapons/klwe_laserrepeater_s3.xml",
        entity,
        gun,
        WEAPON_ID,
    );

    // Shield generator without a localized name
    let shield_attach = b.add_instance(
        attachable,
        item_header("Shield", "UNDEFINED", 1, 3, None, "@LOC_EMPTY"),
    );
    let shield_params = b.add_instance(shield, vec![f(5500.0), f(55.0), f(1.5), f(5.0)]);
    let shield_item = b.add_instance(
        entity,
        vec![
            V::List(vec![ptr(attachable, shield_attach), ptr(shield, shield_params)]),
            V::List(Vec::new()),
        ],
    );
    b.add_record(
        "EntityClassDefinition.SHLD_GODI_S1_AllStop",
        "libs/entities/scitem/ships/shieldgenerator/shld_godi_s1_allstop.xml",
        entity,
        shield_item,
        SHIELD_ID,
    );

    // Port definitions: the turret's single mount, then the ship's five
    let weapon_type = b.add_instance(port_type, vec![s("WeaponGun")]);
    let turret_mount = b.add_instance(
        port_def,
        vec![s("hardpoint_class_2"), V::Int(1), V::Int(3), V::Instances(vec![weapon_type])],
    );
    let ship_types: Vec<u32> = ["WeaponGun", "Turret", "Shield", "Armor", "Radar"]
        .into_iter()
        .map(|t| b.add_instance(port_type, vec![s(t)]))
        .collect();
    let ship_ports: Vec<u32> = [
        ("hardpoint_weapon_left", 1, 3),
        ("hardpoint_turret", 2, 2),
        ("hardpoint_shield_generator", 1, 1),
        ("hardpoint_armor", 1, 1),
        ("hardpoint_radar", 1, 1),
    ]
    .into_iter()
    .zip(&ship_types)
    .map(|((name, min, max), ty)| {
        b.add_instance(
            port_def,
            vec![s(name), V::Int(min), V::Int(max), V::Instances(vec![*ty])],
        )
    })
    .collect();

    // Turret, mounting nothing by default
    let turret_attach = b.add_instance(
        attachable,
        item_header("Turret", "GunTurret", 2, 1, Some(AEGIS_ID), "@item_NameAEGS_Gladius_Turret"),
    );
    let turret_ports = b.add_instance(container, vec![V::Instances(vec![turret_mount])]);
    let turret = b.add_instance(
        entity,
        vec![
            V::List(vec![ptr(attachable, turret_attach), ptr(container, turret_ports)]),
            V::List(Vec::new()),
        ],
    );
    b.add_record(
        "EntityClassDefinition.AEGS_Gladius_Turret",
        "libs/entities/scitem/ships/turret/aegs_gladius_turret.xml",
        entity,
        turret,
        TURRET_ID,
    );

    // Armor
    let hull_multipliers = b.add_instance(damage, vec![f(0.75), f(0.5), f(1.0), f(1.0), f(1.0), f(1.0)]);
    let armor_attach = b.add_instance(
        attachable,
        item_header("Armor", "Medium", 1, 1, Some(AEGIS_ID), "@LOC_EMPTY"),
    );
    let armor_params = b.add_instance(
        armor,
        vec![ptr(damage, hull_multipliers), f(1.0), f(1.0), f(1.25)],
    );
    let armor_item = b.add_instance(
        entity,
        vec![
            V::List(vec![ptr(attachable, armor_attach), ptr(armor, armor_params)]),
            V::List(Vec::new()),
        ],
    );
    b.add_record(
        "EntityClassDefinition.AEGS_Gladius_Armor",
        "libs/entities/scitem/ships/armor/aegs_gladius_armor.xml",
        entity,
        armor_item,
        ARMOR_ID,
    );

    // Default loadout: the turret's nested entry first so each list is contiguous
    let slot = |b: &mut DcbBuilder, port: &str, class: &str, reference: Option<Guid>, nested: V| {
        b.add_instance(entry, vec![s(port), s(class), V::Reference(reference), nested])
    };
    let turret_gun = slot(&mut b, "hardpoint_class_2", "KLWE_LaserRepeater_S3", None, V::Pointer(None));
    let turret_loadout = b.add_instance(manual, vec![V::Instances(vec![turret_gun])]);
    let ship_slots = vec![
        slot(&mut b, "hardpoint_weapon_left", "", Some(WEAPON_ID), V::Pointer(None)),
        slot(
            &mut b,
            "hardpoint_turret",
            "AEGS_Gladius_Turret",
            None,
            ptr(manual, turret_loadout),
        ),
        slot(
            &mut b,
            "hardpoint_shield_generator",
            "SHLD_GODI_S1_AllStop",
            Some(SHIELD_ID),
            V::Pointer(None),
        ),
        slot(&mut b, "hardpoint_armor", "AEGS_Gladius_Armor", None, V::Pointer(None)),
        slot(&mut b, "hardpoint_cargo", "MISSING_Item", None, V::Pointer(None)),
    ];
    let ship_loadout = b.add_instance(manual, vec![V::Instances(ship_slots)]);
    let ship_default = b.add_instance(default_loadout, vec![ptr(manual, ship_loadout)]);

    // Gladius
    let ship_params = b.add_instance(
        vehicle,
        vec![
            s(IMPLEMENTATION),
            s("@vehicle_NameAEGS_Gladius"),
            s("@vehicle_focus_combat"),
            s("@vehicle_class_lightfighter"),
            V::Int(1),
            V::Reference(Some(AEGIS_ID)),
            V::Inline(vec![f(17.0), f(20.0), f(5.5)]),
        ],
    );
    let ship_ifcs = b.add_instance(
        ifcs,
        vec![f(220.0), f(1150.0), V::Inline(vec![f(80.0), f(120.0), f(70.0)])],
    );
    let ship_health = b.add_instance(health, vec![f(3000.0)]);
    let ship_container = b.add_instance(container, vec![V::Instances(ship_ports)]);
    let ship_insurance = b.add_instance(insurance, vec![V::Inline(vec![f(8.0), f(2.0), f(3000.0)])]);
    let ship = b.add_instance(
        entity,
        vec![
            V::List(vec![
                ptr(vehicle, ship_params),
                ptr(ifcs, ship_ifcs),
                ptr(health, ship_health),
                ptr(container, ship_container),
                ptr(default_loadout, ship_default),
            ]),
            V::List(vec![ptr(insurance, ship_insurance)]),
        ],
    );
    b.add_record(
        "EntityClassDefinition.AEGS_Gladius",
        "libs/entities/spaceships/aegs_gladius.xml",
        entity,
        ship,
        SHIP_ID,
    );

    // AI variant: no implementation file, no ports
    let ai_params = b.add_instance(
        vehicle,
        vec![
            s(""),
            s("@LOC_EMPTY"),
            s(""),
            s(""),
            V::Int(0),
            V::Reference(Some(AEGIS_ID)),
            V::Inline(vec![f(17.0), f(20.0), f(5.5)]),
        ],
    );
    let ai_health = b.add_instance(health, vec![f(9999.0)]);
    let ai_ship = b.add_instance(
        entity,
        vec![
            V::List(vec![ptr(vehicle, ai_params), ptr(health, ai_health)]),
            V::List(Vec::new()),
        ],
    );
    b.add_record(
        "EntityClassDefinition.AEGS_Gladius_PU_AI_CRIM",
        "libs/entities/spaceships/ai/aegs_gladius_pu_ai_crim.xml",
        entity,
        ai_ship,
        AI_SHIP_ID,
    );

    b.build()
}

pub(crate) fn build() -> GameFixture {
    let mut archive = ArchiveBuilder::new();
    archive.add("Data/Game2.dcb", &database(), CompressionMethod::Zstd, true);
    archive.add(
        "Data/Localization/english/global.ini",
        GLOBAL_INI.as_bytes(),
        CompressionMethod::Deflate,
        false,
    );
    archive.add(
        &format!("Data/{}", IMPLEMENTATION),
        &implementation(),
        CompressionMethod::Store,
        false,
    );
    GameFixture {
        archive: archive.finish(),
    }
}
