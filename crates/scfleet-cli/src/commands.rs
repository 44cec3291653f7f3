//! One function per subcommand

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use scfleet::catalog::{
    aggregate, cross_reference, loadout, parse_matrix, CatalogSink, Component,
    LoadoutPort, MatchPass, MemoryCatalog, Ship, Swap,
};
use scfleet::dataforge::{DataForge, Guid, Resolver, ResolverOptions};
use scfleet::{ArchiveOptions, CompressionMethod, CryXmlReader, ExtractOptions, P4kFile};

use crate::util::{format_size, glob_matcher, matches_filter, parse_swap};

fn open_archive(p4k_path: &Path, options: ArchiveOptions) -> Result<P4kFile> {
    P4kFile::open_with_options(p4k_path, options)
        .with_context(|| format!("Failed to open {}", p4k_path.display()))
}

/// List archive entries with an optional glob filter
pub fn list(p4k_path: &Path, filter: Option<&str>) -> Result<()> {
    let p4k = open_archive(p4k_path, ArchiveOptions::default())?;
    let matcher = filter.map(glob_matcher).transpose()?;

    let mut count = 0u64;
    let mut total_size = 0u64;
    let mut compressed_size = 0u64;

    for entry in p4k.list() {
        if !matches_filter(&entry.name, matcher.as_ref()) {
            continue;
        }
        let method = match entry.compression_method {
            CompressionMethod::Store => "Store".to_string(),
            CompressionMethod::Deflate => "Deflate".to_string(),
            CompressionMethod::Zstd => "Zstd".to_string(),
            CompressionMethod::Unknown(m) => format!("?{}", m),
        };
        let encrypted = if entry.is_encrypted { "Encrypted" } else { "Plain" };

        println!(
            "{:>10} {:>10} {:>8} {:>9} {}",
            format_size(entry.uncompressed_size),
            format_size(entry.compressed_size),
            method,
            encrypted,
            entry.name
        );

        count += 1;
        total_size += entry.uncompressed_size;
        compressed_size += entry.compressed_size;
    }

    println!();
    println!(
        "Total: {} files, {} ({} compressed)",
        count,
        format_size(total_size),
        format_size(compressed_size)
    );
    Ok(())
}

/// Print a binary or text XML entry as text XML
pub fn xml(p4k_path: &Path, entry: &str) -> Result<()> {
    let mut p4k = open_archive(p4k_path, ArchiveOptions::default())?;
    let bytes = p4k
        .extract(entry)
        .with_context(|| format!("Failed to read {}", entry))?;
    let text = CryXmlReader::to_xml_string(&bytes).with_context(|| format!("{} is not XML", entry))?;
    println!("{}", text);
    Ok(())
}

fn load_database(p4k: &mut P4kFile, options: &ExtractOptions) -> Result<DataForge> {
    for entry in &options.database_entries {
        match p4k.extract(entry) {
            Ok(bytes) => {
                info!(entry = %entry, "parsing game database");
                return DataForge::parse(&bytes).with_context(|| format!("Failed to parse {}", entry));
            }
            Err(e) if e.is_not_found() => continue,
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", entry)),
        }
    }
    bail!("No game database in archive (tried {})", options.database_entries.join(", "))
}

/// Print one record, resolved to `depth`, as JSON
pub fn dump(p4k_path: &Path, key: &str, depth: u32) -> Result<()> {
    let options = ExtractOptions::default();
    let mut p4k = open_archive(p4k_path, options.archive.clone())?;
    let database = load_database(&mut p4k, &options)?;

    let record = key
        .parse::<Guid>()
        .ok()
        .and_then(|id| database.record(&id))
        .or_else(|| database.record_by_path(key))
        .or_else(|| {
            database
                .records()
                .iter()
                .find(|r| r.name.eq_ignore_ascii_case(key) || r.short_name().eq_ignore_ascii_case(key))
        })
        .with_context(|| format!("No record matches '{}'", key))?;

    let resolver = Resolver::new(&database, ResolverOptions { max_depth: depth });
    let node = resolver
        .resolve_record(record)
        .with_context(|| format!("Record {} could not be decoded", record.name))?;
    println!("{}", serde_json::to_string_pretty(&node.materialize())?);

    let cuts = resolver.diagnostic_count();
    if cuts > 0 {
        info!(cuts, "some references were not followed");
    }
    Ok(())
}

/// Forwards to the catalog and shows milestones on a spinner
struct SpinnerSink<'a> {
    catalog: &'a MemoryCatalog,
    spinner: ProgressBar,
}

impl CatalogSink for SpinnerSink<'_> {
    fn upsert_ships(&self, ships: Vec<Ship>) -> scfleet::Result<()> {
        self.catalog.upsert_ships(ships)
    }

    fn upsert_components(&self, components: Vec<Component>) -> scfleet::Result<()> {
        self.catalog.upsert_components(components)
    }

    fn replace_ports(&self, ship_id: Guid, ports: Vec<LoadoutPort>) -> scfleet::Result<()> {
        self.catalog.replace_ports(ship_id, ports)
    }

    fn progress(&self, milestone: &str) {
        self.spinner.set_message(milestone.to_string());
    }
}

/// Run a full extraction into a catalog directory
pub fn extract(p4k_path: &Path, output: &Path, options: ExtractOptions) -> Result<()> {
    let catalog = MemoryCatalog::new();
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(120));

    let sink = SpinnerSink {
        catalog: &catalog,
        spinner: spinner.clone(),
    };
    let summary = scfleet::extract(p4k_path, &options, &sink)
        .with_context(|| format!("Failed to extract {}", p4k_path.display()))?;
    spinner.finish_and_clear();

    fs::create_dir_all(output).with_context(|| format!("Failed to create {}", output.display()))?;
    catalog
        .save_dir(output)
        .with_context(|| format!("Failed to write catalog to {}", output.display()))?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Rerun the matcher against a ship-matrix file and rewrite the links
pub fn crossref(dir: &Path, matrix_path: &Path) -> Result<()> {
    let catalog = MemoryCatalog::load_dir(dir).with_context(|| format!("Failed to load catalog {}", dir.display()))?;
    let text = fs::read_to_string(matrix_path)
        .with_context(|| format!("Failed to read {}", matrix_path.display()))?;
    let matrix = parse_matrix(&text).with_context(|| format!("Failed to parse {}", matrix_path.display()))?;

    let links = cross_reference(&catalog.ships(), &matrix);
    let mut by_pass: HashMap<MatchPass, usize> = HashMap::new();
    for link in &links {
        *by_pass.entry(link.pass).or_default() += 1;
    }

    println!("Matrix entries: {}", matrix.len());
    println!("Linked:         {}", links.len());
    for pass in [MatchPass::Exact, MatchPass::Alias, MatchPass::Structural, MatchPass::Fuzzy] {
        println!("  {:<12} {}", format!("{:?}", pass), by_pass.get(&pass).copied().unwrap_or(0));
    }

    catalog.set_matrix(matrix);
    catalog.replace_links(links);
    catalog
        .save_dir(dir)
        .with_context(|| format!("Failed to write catalog to {}", dir.display()))?;
    Ok(())
}

/// Print the loadout stats of one ship, with optional swaps
pub fn loadout_stats(dir: &Path, ship_key: &str, swap_args: &[String]) -> Result<()> {
    let catalog = MemoryCatalog::load_dir(dir).with_context(|| format!("Failed to load catalog {}", dir.display()))?;
    let ship = catalog.find_ship(ship_key)?;
    let ports = catalog.ports(&ship.id);
    let components: HashMap<Guid, Component> = catalog
        .components()
        .into_iter()
        .map(|c| (c.id, c))
        .collect();

    let mut requested = Vec::new();
    for arg in swap_args {
        let (port_name, component) = parse_swap(arg)?;
        if !ports.iter().any(|p| p.name.eq_ignore_ascii_case(&port_name)) {
            bail!("{} has no port named '{}'", ship.display_name, port_name);
        }
        let component_id = component
            .map(|key| catalog.find_component(&key).map(|c| c.id))
            .transpose()?;
        requested.push((port_name, component_id));
    }
    let swaps: Vec<Swap> = requested
        .into_iter()
        .map(|(port_name, id)| Swap {
            port_name,
            component: id.and_then(|id| components.get(&id)),
        })
        .collect();

    let entries = loadout::entries(&ports, |p| p.component_id.and_then(|id| components.get(&id)));
    let stats = aggregate(&ship, &entries, &swaps);
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
