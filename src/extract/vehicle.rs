//! Vehicle reconstruction
//!
//! A vehicle is an entity record carrying vehicle parameters. Its ship row is
//! assembled from a fixed set of parameter blocks plus the vehicle's
//! implementation file; its port tree comes from walking the declared ports
//! against the default loadout, descending into every mounted item's own
//! ports. The tree is stored flattened in pre-order.

use std::collections::HashMap;
use std::io::{Read, Seek};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::catalog::{
    ArmorProfile, Component, ComponentStats, Dimensions, FlightEnvelope, FuelCapacity, FuelKind,
    Insurance, LoadoutPort, Manufacturer, PortCategory, Ship,
};
use crate::dataforge::{Guid, Record, ResolvedNode, Resolver};
use crate::extract::context::ExtractionContext;
use crate::extract::ports::classify_port;
use crate::extract::schema::{self, COMPONENTS, DAMAGE_FIELDS};

static NON_PLAYABLE: OnceLock<Regex> = OnceLock::new();

fn non_playable_regex() -> &'static Regex {
    NON_PLAYABLE.get_or_init(|| {
        Regex::new(
            r"(?i)(^|_)(test|debug|template|ai|tutorial|unmanned|nointerior|indestructible|fake|dummy|derelict|wreck|s42|swarm|gamemaster|hijacked|boarded|npc|cinematic|placeholder)(_|$)",
        )
        .expect("Invalid non-playable regex pattern")
    })
}

/// Test, debug, AI-only and template variants that never reach the catalog
pub fn is_non_playable(class_name: &str) -> bool {
    non_playable_regex().is_match(class_name)
}

/// One port with its nested ports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortNode {
    pub name: String,
    pub category: PortCategory,
    pub min_size: Option<u32>,
    pub max_size: Option<u32>,
    pub component_id: Option<Guid>,
    pub component_class: Option<String>,
    pub children: Vec<PortNode>,
}

/// Number ports in pre-order: each node takes the next id before its
/// children, and every child records its parent's id
pub fn flatten_ports(ship_id: Guid, roots: &[PortNode]) -> Vec<LoadoutPort> {
    let mut out = Vec::new();
    flatten_into(ship_id, roots, None, &mut out);
    out
}

fn flatten_into(ship_id: Guid, nodes: &[PortNode], parent: Option<u32>, out: &mut Vec<LoadoutPort>) {
    for node in nodes {
        let id = out.len() as u32;
        out.push(LoadoutPort {
            ship_id,
            id,
            parent_id: parent,
            name: node.name.clone(),
            category: node.category,
            min_size: node.min_size,
            max_size: node.max_size,
            component_id: node.component_id,
            component_class: node.component_class.clone(),
        });
        flatten_into(ship_id, &node.children, Some(id), out);
    }
}

/// Rebuild the nesting from `parent_id` links. Ports unreachable from a
/// root are dropped.
pub fn rebuild_tree(ports: &[LoadoutPort]) -> Vec<PortNode> {
    let mut children: HashMap<Option<u32>, Vec<&LoadoutPort>> = HashMap::new();
    for port in ports {
        children.entry(port.parent_id).or_default().push(port);
    }
    build_level(&children, None)
}

fn build_level(children: &HashMap<Option<u32>, Vec<&LoadoutPort>>, parent: Option<u32>) -> Vec<PortNode> {
    children
        .get(&parent)
        .map(|ports| {
            ports
                .iter()
                .filter(|p| Some(p.id) != parent)
                .map(|p| PortNode {
                    name: p.name.clone(),
                    category: p.category,
                    min_size: p.min_size,
                    max_size: p.max_size,
                    component_id: p.component_id,
                    component_class: p.component_class.clone(),
                    children: build_level(children, Some(p.id)),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// A reconstructed vehicle and its flattened ports
#[derive(Debug, Clone)]
pub struct Vehicle {
    pub ship: Ship,
    pub ports: Vec<LoadoutPort>,
}

struct PortDef {
    name: String,
    min_size: Option<u32>,
    max_size: Option<u32>,
    types: Vec<String>,
}

struct LoadoutSlot<'r> {
    port_name: String,
    class_name: Option<String>,
    reference: Option<Guid>,
    nested: Option<ResolvedNode<'r>>,
}

fn size(node: &ResolvedNode<'_>, field: &str) -> Option<u32> {
    node.f64(field).filter(|v| *v >= 0.0).map(|v| v as u32)
}

fn port_defs(holder: &ResolvedNode<'_>) -> Vec<PortDef> {
    let Some(container) = holder.find_child(COMPONENTS, schema::PORT_CONTAINER) else {
        return Vec::new();
    };
    container
        .children("Ports")
        .iter()
        .filter_map(|port| {
            Some(PortDef {
                name: port.string("Name").filter(|n| !n.is_empty())?,
                min_size: size(port, "MinSize"),
                max_size: size(port, "MaxSize"),
                types: port
                    .children("Types")
                    .iter()
                    .filter_map(|t| t.string("Type"))
                    .filter(|t| !t.is_empty())
                    .collect(),
            })
        })
        .collect()
}

fn loadout_slots<'r>(manual: Option<&ResolvedNode<'r>>) -> Vec<LoadoutSlot<'r>> {
    let Some(manual) = manual else {
        return Vec::new();
    };
    manual
        .children("entries")
        .iter()
        .filter_map(|entry| {
            Some(LoadoutSlot {
                port_name: entry.string("itemPortName").filter(|n| !n.is_empty())?,
                class_name: entry.string("entityClassName").filter(|c| !c.is_empty()),
                reference: entry
                    .reference("entityClassReference")
                    .filter(|id| !id.is_empty()),
                nested: entry.child("loadout"),
            })
        })
        .collect()
}

struct PortWalker<'c, 'r, R> {
    ctx: &'c ExtractionContext<R>,
    resolver: &'r Resolver<'r>,
    components: &'c HashMap<Guid, Component>,
    max_depth: u32,
}

impl<'c, 'r, R> PortWalker<'c, 'r, R> {
    /// Declared ports first, in declaration order, then loadout entries
    /// naming ports the holder does not declare
    fn walk(
        &self,
        holder: &ResolvedNode<'r>,
        manual: Option<&ResolvedNode<'r>>,
        path: &mut Vec<Guid>,
        depth: u32,
    ) -> Vec<PortNode> {
        let mut slots = loadout_slots(manual);
        let mut nodes = Vec::new();

        for def in port_defs(holder) {
            let slot = slots
                .iter()
                .position(|s| s.port_name.eq_ignore_ascii_case(&def.name))
                .map(|i| slots.remove(i));
            nodes.push(self.node(def.name, def.min_size, def.max_size, def.types, slot, path, depth));
        }
        for slot in slots {
            let name = slot.port_name.clone();
            nodes.push(self.node(name, None, None, Vec::new(), Some(slot), path, depth));
        }
        nodes
    }

    #[allow(clippy::too_many_arguments)]
    fn node(
        &self,
        name: String,
        min_size: Option<u32>,
        max_size: Option<u32>,
        mut types: Vec<String>,
        slot: Option<LoadoutSlot<'r>>,
        path: &mut Vec<Guid>,
        depth: u32,
    ) -> PortNode {
        let database = self.ctx.database();
        let item_id = slot.as_ref().and_then(|s| {
            s.reference
                .filter(|id| database.record(id).is_some())
                .or_else(|| s.class_name.as_deref().and_then(|c| self.ctx.entity_by_class(c)))
        });
        let component_class = slot
            .as_ref()
            .and_then(|s| s.class_name.clone())
            .or_else(|| item_id.and_then(|id| database.record(&id)).map(|r| r.short_name().to_string()));
        let component = item_id.and_then(|id| self.components.get(&id));

        if types.is_empty() {
            types.extend(component.map(|c| c.item_type.clone()));
        }
        let category = classify_port(&name, component_class.as_deref(), &types);

        let children = match item_id {
            Some(id) if path.contains(&id) => {
                debug!(port = %name, item = %id, "item mounts itself, not descending");
                Vec::new()
            }
            Some(_) if depth >= self.max_depth => {
                debug!(port = %name, depth, "port nesting too deep, not descending");
                Vec::new()
            }
            Some(id) => match self.resolver.resolve(&id) {
                Some(item) => {
                    path.push(id);
                    let nested = slot.as_ref().and_then(|s| s.nested.as_ref());
                    let children = self.walk(&item, nested, path, depth + 1);
                    path.pop();
                    children
                }
                None => Vec::new(),
            },
            None => Vec::new(),
        };

        PortNode {
            name,
            category,
            min_size,
            max_size,
            component_id: component.map(|c| c.id),
            component_class,
            children,
        }
    }
}

/// Hull HP and mass summed over the parts of an implementation file
fn implementation_totals<R: Read + Seek>(ctx: &ExtractionContext<R>, path: &str) -> (Option<f64>, Option<f64>) {
    let xml = match ctx.read_xml(path) {
        Ok(xml) => xml,
        Err(e) if e.is_not_found() => {
            debug!(path, "no implementation file");
            return (None, None);
        }
        Err(e) => {
            warn!(path, error = %e, "unreadable implementation file");
            return (None, None);
        }
    };
    let parts = xml.descendants("Part");
    let sum = |attr: &str| {
        let total: f64 = parts.iter().filter_map(|p| p.attr_f64(attr)).sum();
        Some(total).filter(|t| *t > 0.0)
    };
    (sum("damageMax"), sum("mass"))
}

fn armor_profile(resolver: &Resolver<'_>, armor_id: Option<Guid>) -> ArmorProfile {
    let Some(params) = armor_id
        .and_then(|id| resolver.resolve(&id))
        .and_then(|item| item.find_child(COMPONENTS, schema::ARMOR))
    else {
        return ArmorProfile::default();
    };
    let multiplier = params.child("damageMultiplier");
    let [physical, energy, distortion, thermal, biochemical, stun] =
        DAMAGE_FIELDS.map(|field| multiplier.as_ref().and_then(|m| m.f64(field)));
    ArmorProfile {
        physical,
        energy,
        distortion,
        thermal,
        biochemical,
        stun,
        infrared: params.f64("signalInfrared"),
        electromagnetic: params.f64("signalElectromagnetic"),
        cross_section: params.f64("signalCrossSection"),
    }
}

/// Rebuild a vehicle from its entity record. `None` when the record is not a vehicle.
pub fn reconstruct_vehicle<'r, R: Read + Seek>(
    ctx: &ExtractionContext<R>,
    resolver: &'r Resolver<'r>,
    record: &Record,
    root: &ResolvedNode<'r>,
    components: &HashMap<Guid, Component>,
) -> Option<Vehicle> {
    let vehicle = root.find_child(COMPONENTS, schema::VEHICLE)?;
    let class_name = record.short_name().to_string();

    let manufacturer = vehicle.child("manufacturer").and_then(|m| {
        let code = m.string("Code").filter(|c| !c.is_empty())?;
        let name = ctx.display_name(m.string("Localization.Name").as_deref(), &code);
        Some(Manufacturer { code, name })
    });

    let dimensions = vehicle.path("maxBoundingBoxSize").and_then(|b| {
        let (x, y, z) = (b.f64("x")?, b.f64("y")?, b.f64("z")?);
        (x > 0.0 || y > 0.0 || z > 0.0).then_some(Dimensions {
            length: y,
            beam: x,
            height: z,
        })
    });

    let flight = root
        .find_child(COMPONENTS, schema::IFCS)
        .map(|ifcs| FlightEnvelope {
            scm_speed: ifcs.f64("scmSpeed"),
            max_speed: ifcs.f64("maxSpeed"),
            pitch: ifcs.f64("maxAngularVelocity.x"),
            yaw: ifcs.f64("maxAngularVelocity.z"),
            roll: ifcs.f64("maxAngularVelocity.y"),
        })
        .unwrap_or_default();

    let definition = vehicle.string("vehicleDefinition").filter(|d| !d.is_empty());
    let (xml_hull, xml_mass) = match &definition {
        Some(path) => implementation_totals(ctx, path),
        None => (None, None),
    };
    let hull_hp = xml_hull.or_else(|| {
        root.find_child(COMPONENTS, schema::HEALTH)
            .and_then(|h| h.f64("Health"))
    });
    let mass = xml_mass.or_else(|| {
        root.find_child(COMPONENTS, schema::PHYSICS)
            .and_then(|p| p.f64("Mass"))
    });

    let insurance = root
        .find_child(schema::STATIC_DATA, schema::INSURANCE)
        .and_then(|i| {
            Some(Insurance {
                claim_time: i.f64("shipInsuranceParams.baseWaitTimeMinutes")?,
                expedite_time: i
                    .f64("shipInsuranceParams.mandatoryWaitTimeMinutes")
                    .unwrap_or(0.0),
                expedite_cost: i.f64("shipInsuranceParams.baseExpeditingFee").unwrap_or(0.0),
            })
        });

    let walker = PortWalker {
        ctx,
        resolver,
        components,
        max_depth: ctx.options().resolver.max_depth,
    };
    let manual = root
        .find_child(COMPONENTS, schema::DEFAULT_LOADOUT)
        .and_then(|d| d.child("loadout"));
    let tree = walker.walk(root, manual.as_ref(), &mut vec![record.id], 0);
    let ports = flatten_ports(record.id, &tree);

    let equipped: Vec<&Component> = ports
        .iter()
        .filter_map(|p| p.component_id.as_ref())
        .filter_map(|id| components.get(id))
        .collect();

    let shield_hp = equipped
        .iter()
        .filter_map(|c| match &c.stats {
            ComponentStats::Shield(s) => Some(s.max_hp),
            _ => None,
        })
        .reduce(|a, b| a + b);

    let tank_total = |kind: FuelKind| {
        equipped
            .iter()
            .filter_map(|c| match &c.stats {
                ComponentStats::FuelTank(t) if t.kind == kind => Some(t.capacity),
                _ => None,
            })
            .reduce(|a, b| a + b)
    };
    let fuel = FuelCapacity {
        hydrogen: tank_total(FuelKind::Hydrogen),
        quantum: tank_total(FuelKind::Quantum),
    };

    let armor_id = ports
        .iter()
        .find(|p| p.category == PortCategory::Armor)
        .and_then(|p| p.component_id);
    let armor = armor_profile(resolver, armor_id);

    let mut extended = std::collections::BTreeMap::new();
    if let Some(path) = &definition {
        extended.insert("vehicle_definition".to_string(), serde_json::json!(path));
    }
    let unresolved = ports
        .iter()
        .filter(|p| p.component_class.is_some() && p.component_id.is_none())
        .count();
    extended.insert("unresolved_ports".to_string(), serde_json::json!(unresolved));

    let ship = Ship {
        id: record.id,
        display_name: ctx.display_name(vehicle.string("vehicleName").as_deref(), &class_name),
        class_name,
        manufacturer,
        career: vehicle.string("vehicleCareer").and_then(|k| ctx.localize(&k)),
        role: vehicle.string("vehicleRole").and_then(|k| ctx.localize(&k)),
        crew_size: vehicle.f64("crewSize").filter(|c| *c > 0.0).map(|c| c as u32),
        dimensions,
        mass,
        hull_hp,
        shield_hp,
        flight,
        fuel,
        armor,
        insurance,
        matrix_id: None,
        extended,
    };

    Some(Vehicle { ship, ports })
}
