//! The batch extraction run
//!
//! Two passes over the entity records. The first reconstructs every item and
//! notes which records are vehicles; the second rebuilds the vehicles against
//! the finished component table. Records are independent of each other, so
//! both passes fan out over rayon when the run is parallel.

use std::collections::HashMap;
use std::io::{Read, Seek};
use std::path::Path;
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogSink, Component, LoadoutPort, Ship};
use crate::dataforge::{Guid, Record, Resolver};
use crate::error::Result;
use crate::extract::component::{reconstruct_component, ItemKind};
use crate::extract::context::{ExtractOptions, ExtractionContext};
use crate::extract::schema::{self, COMPONENTS};
use crate::extract::vehicle::{is_non_playable, reconstruct_vehicle, Vehicle};
use crate::p4k::P4kFile;

/// Counts and errors of one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionSummary {
    pub ships: usize,
    pub components: usize,
    pub ports: usize,
    /// Vehicles left out as test, AI or template variants
    pub non_playable: usize,
    /// Items kept with an unknown stat block because their type is unrecognized
    pub unknown_item_types: usize,
    /// Struct fields of an unknown type the decoder skipped
    pub unparsed_fields: usize,
    /// Pointer or reference chains cut by the depth budget
    pub depth_exceeded: usize,
    /// Records or stages that were skipped, one line each
    pub errors: Vec<String>,
}

/// Extract every ship, component and loadout port from the container at `path` into `sink`.
///
/// Only an unreadable container is an error. Anything less is skipped,
/// logged and counted in the summary.
pub fn extract<P: AsRef<Path>>(
    path: P,
    options: &ExtractOptions,
    sink: &dyn CatalogSink,
) -> Result<ExtractionSummary> {
    let path = path.as_ref();
    milestone(sink, &format!("Opening {}", path.display()));
    let archive = P4kFile::open_with_options(path, options.archive.clone())?;

    let ctx = match ExtractionContext::from_archive(archive, options.clone()) {
        Ok(ctx) => ctx,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "no usable game database, nothing extracted");
            return Ok(ExtractionSummary {
                errors: vec![format!("game database: {}", e)],
                ..Default::default()
            });
        }
    };
    run(&ctx, sink)
}

enum Scan<'a> {
    Vehicle(&'a Record),
    Item(Component),
    NotCatalogued,
    Failed(String),
}

/// Run both passes over an opened context
pub fn run<R: Read + Seek + Send>(
    ctx: &ExtractionContext<R>,
    sink: &dyn CatalogSink,
) -> Result<ExtractionSummary> {
    let started = Instant::now();
    let parallel = ctx.options().parallel;
    let mut summary = ExtractionSummary {
        unparsed_fields: ctx.database().unknown_fields().len(),
        ..Default::default()
    };

    let records = ctx.entity_records();
    milestone(sink, &format!("Scanning {} entity records", records.len()));
    let scanned = map_records(parallel, &records, |record| {
        let resolver = ctx.resolver();
        let scan = scan_record(ctx, &resolver, record);
        (scan, depth_cuts(&resolver))
    });

    let mut vehicles = Vec::new();
    let mut components = HashMap::new();
    for (scan, cuts) in scanned {
        summary.depth_exceeded += cuts;
        match scan {
            Scan::Vehicle(record) => vehicles.push(record),
            Scan::Item(component) => {
                components.insert(component.id, component);
            }
            Scan::NotCatalogued => {}
            Scan::Failed(reason) => summary.errors.push(reason),
        }
    }
    summary.unknown_item_types = components
        .values()
        .filter(|c| ItemKind::from_type(&c.item_type).is_none())
        .count();
    milestone(
        sink,
        &format!("Reconstructed {} components, {} vehicles found", components.len(), vehicles.len()),
    );

    let include_all = ctx.options().include_non_playable;
    let (playable, skipped): (Vec<&Record>, Vec<&Record>) = vehicles
        .into_iter()
        .partition(|r| include_all || !is_non_playable(r.short_name()));
    for record in &skipped {
        debug!(record = %record.name, "non-playable vehicle skipped");
    }
    summary.non_playable = skipped.len();

    let built = map_records(parallel, &playable, |record| {
        let resolver = ctx.resolver();
        let vehicle = build_vehicle(ctx, &resolver, record, &components);
        (vehicle, depth_cuts(&resolver))
    });

    let mut ships: Vec<Ship> = Vec::new();
    let mut port_sets: Vec<(Guid, Vec<LoadoutPort>)> = Vec::new();
    for (vehicle, cuts) in built {
        summary.depth_exceeded += cuts;
        match vehicle {
            Ok(Vehicle { ship, ports }) => {
                port_sets.push((ship.id, ports));
                ships.push(ship);
            }
            Err(reason) => summary.errors.push(reason),
        }
    }
    ships.sort_by_key(|s| s.id);
    port_sets.sort_by_key(|(id, _)| *id);
    let mut components: Vec<Component> = components.into_values().collect();
    components.sort_by_key(|c| c.id);

    summary.ships = ships.len();
    summary.components = components.len();
    summary.ports = port_sets.iter().map(|(_, ports)| ports.len()).sum();

    milestone(
        sink,
        &format!(
            "Writing {} ships, {} components, {} ports",
            summary.ships, summary.components, summary.ports
        ),
    );
    sink.upsert_components(components)?;
    sink.upsert_ships(ships)?;
    for (ship_id, ports) in port_sets {
        sink.replace_ports(ship_id, ports)?;
    }

    info!(
        ships = summary.ships,
        components = summary.components,
        ports = summary.ports,
        non_playable = summary.non_playable,
        unknown_item_types = summary.unknown_item_types,
        depth_exceeded = summary.depth_exceeded,
        errors = summary.errors.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "extraction finished"
    );
    sink.progress("Extraction finished");
    Ok(summary)
}

fn milestone(sink: &dyn CatalogSink, message: &str) {
    info!("{}", message);
    sink.progress(message);
}

fn map_records<'a, T, F>(parallel: bool, records: &[&'a Record], f: F) -> Vec<T>
where
    T: Send,
    F: Fn(&'a Record) -> T + Sync + Send,
{
    if parallel {
        records.par_iter().map(|r| f(r)).collect()
    } else {
        records.iter().map(|r| f(r)).collect()
    }
}

fn scan_record<'a, R>(ctx: &ExtractionContext<R>, resolver: &Resolver<'_>, record: &'a Record) -> Scan<'a> {
    let Some(root) = resolver.resolve_record(record) else {
        warn!(record = %record.name, "record could not be decoded, skipped");
        return Scan::Failed(format!("{}: record could not be decoded", record.name));
    };
    if root.find_child(COMPONENTS, schema::VEHICLE).is_some() {
        return Scan::Vehicle(record);
    }
    reconstruct_component(ctx, record, &root).map_or(Scan::NotCatalogued, Scan::Item)
}

fn build_vehicle<R: Read + Seek>(
    ctx: &ExtractionContext<R>,
    resolver: &Resolver<'_>,
    record: &Record,
    components: &HashMap<Guid, Component>,
) -> std::result::Result<Vehicle, String> {
    let root = resolver
        .resolve_record(record)
        .ok_or_else(|| format!("{}: record could not be decoded", record.name))?;
    reconstruct_vehicle(ctx, resolver, record, &root, components)
        .ok_or_else(|| format!("{}: vehicle parameters unreadable", record.name))
}

/// Drain a resolver's diagnostics, returning how many were depth cuts
fn depth_cuts(resolver: &Resolver<'_>) -> usize {
    resolver
        .take_diagnostics()
        .iter()
        .filter(|d| d.is_depth_exceeded())
        .filter_map(|d| d.to_error())
        .inspect(|e| debug!("{}", e))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ComponentStats, MemoryCatalog, PortCategory};
    use crate::error::Error;
    use crate::fixtures::game;
    use crate::fixtures::ArchiveBuilder;
    use crate::p4k::CompressionMethod;

    fn write_archive(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, bytes).unwrap();
        file
    }

    #[test]
    fn test_extract_fixture_install() {
        let fixture = game::build();
        let file = write_archive(&fixture.archive);
        let catalog = MemoryCatalog::new();

        let summary = extract(file.path(), &ExtractOptions::default(), &catalog).unwrap();
        assert_eq!(summary.ships, 1);
        assert_eq!(summary.components, 4);
        assert_eq!(summary.ports, 7);
        assert_eq!(summary.non_playable, 1);
        // turret and armor have no stat block
        assert_eq!(summary.unknown_item_types, 2);
        assert!(summary.errors.is_empty(), "{:?}", summary.errors);

        let ship = catalog.find_ship("gladius").unwrap();
        assert_eq!(ship.id, game::SHIP_ID);
        assert_eq!(ship.shield_hp, Some(5500.0));
        let ports = catalog.ports(&game::SHIP_ID);
        assert_eq!(ports[2].parent_id, Some(1));
        assert_eq!(ports[2].category, PortCategory::Weapon);

        let gun = catalog.component(&game::WEAPON_ID).unwrap();
        assert!(matches!(gun.stats, ComponentStats::Weapon(_)));
    }

    #[test]
    fn test_non_playable_toggle() {
        let fixture = game::build();
        let file = write_archive(&fixture.archive);
        let catalog = MemoryCatalog::new();
        let options = ExtractOptions {
            include_non_playable: true,
            ..Default::default()
        };

        let summary = extract(file.path(), &options, &catalog).unwrap();
        assert_eq!(summary.ships, 2);
        assert_eq!(summary.non_playable, 0);
        assert_eq!(catalog.ship(&game::AI_SHIP_ID).unwrap().hull_hp, Some(9999.0));
    }

    #[test]
    fn test_sequential_and_parallel_agree() {
        let fixture = game::build();
        let sequential = MemoryCatalog::new();
        let parallel = MemoryCatalog::new();

        let ctx = fixture.context(ExtractOptions {
            parallel: false,
            ..Default::default()
        });
        let a = run(&ctx, &sequential).unwrap();
        let ctx = fixture.context(ExtractOptions::default());
        let b = run(&ctx, &parallel).unwrap();

        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&sequential.ships()).unwrap(),
            serde_json::to_string(&parallel.ships()).unwrap()
        );
        assert_eq!(sequential.ports(&game::SHIP_ID), parallel.ports(&game::SHIP_ID));
    }

    #[test]
    fn test_missing_container_is_fatal() {
        let catalog = MemoryCatalog::new();
        let err = extract("/nonexistent/Data.p4k", &ExtractOptions::default(), &catalog).unwrap_err();
        assert!(matches!(err, Error::ContainerUnavailable { .. }));
    }

    #[test]
    fn test_missing_database_is_reported() {
        let mut archive = ArchiveBuilder::new();
        archive.add("Data/readme.txt", b"hello", CompressionMethod::Store, false);
        let file = write_archive(&archive.finish());
        let catalog = MemoryCatalog::new();

        let summary = extract(file.path(), &ExtractOptions::default(), &catalog).unwrap();
        assert_eq!(summary.ships, 0);
        assert_eq!(summary.errors.len(), 1);
        assert!(catalog.ships().is_empty());
    }
}
