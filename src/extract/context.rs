//! Per-run extraction state
//!
//! An [`ExtractionContext`] is built once per run and passed by reference to
//! every reconstructor. It owns the open archive, the decoded database and
//! the localization table; nothing else is shared between records.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cryxml::{CryXmlReader, XmlElement};
use crate::dataforge::{DataForge, Guid, Record, Resolver, ResolverOptions};
use crate::error::{Error, Result};
use crate::extract::schema;
use crate::p4k::{ArchiveOptions, P4kFile};

/// Options for one extraction run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractOptions {
    /// Database entries to try, in order
    pub database_entries: Vec<String>,
    pub localization_entry: String,
    pub resolver: ResolverOptions,
    /// Keep test, AI and template vehicles
    pub include_non_playable: bool,
    /// Reconstruct records on the rayon pool
    pub parallel: bool,
    pub archive: ArchiveOptions,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            database_entries: vec!["Data/Game2.dcb".to_string(), "Data/Game.dcb".to_string()],
            localization_entry: "Data/Localization/english/global.ini".to_string(),
            resolver: ResolverOptions::default(),
            include_non_playable: false,
            parallel: true,
            archive: ArchiveOptions::default(),
        }
    }
}

/// `global.ini` key/value table
#[derive(Debug, Clone, Default)]
pub struct Localization {
    entries: HashMap<String, String>,
}

impl Localization {
    /// Parse `key=value` lines. Keys are case-insensitive and may carry a `,P` suffix.
    pub fn parse(text: &str) -> Self {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let entries = text
            .lines()
            .filter_map(|line| line.split_once('='))
            .map(|(key, value)| {
                let key = key.trim();
                let key = key.split_once(',').map_or(key, |(k, _)| k);
                (key.to_ascii_lowercase(), value.trim_end_matches('\r').to_string())
            })
            .collect();
        Self { entries }
    }

    /// Look up a locale key, with or without its leading `@`
    pub fn get(&self, key: &str) -> Option<&str> {
        let key = key.strip_prefix('@').unwrap_or(key);
        self.entries
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Shared, read-only state of one run
pub struct ExtractionContext<R = BufReader<File>> {
    archive: Mutex<P4kFile<R>>,
    database: DataForge,
    localization: Localization,
    entity_by_class: HashMap<String, Guid>,
    options: ExtractOptions,
}

impl ExtractionContext<BufReader<File>> {
    /// Open the container at `path`. Failing to open it is the only fatal error of a run.
    pub fn open<P: AsRef<Path>>(path: P, options: ExtractOptions) -> Result<Self> {
        let archive = P4kFile::open_with_options(path, options.archive.clone())?;
        Self::from_archive(archive, options)
    }
}

impl<R: Read + Seek> ExtractionContext<R> {
    /// Load the database and localization table out of an open archive
    pub fn from_archive(mut archive: P4kFile<R>, options: ExtractOptions) -> Result<Self> {
        let database = load_database(&mut archive, &options.database_entries)?;

        let localization = match archive.extract(&options.localization_entry) {
            Ok(bytes) => Localization::parse(&String::from_utf8_lossy(&bytes)),
            Err(e) => {
                warn!(entry = %options.localization_entry, error = %e, "no localization table, using class names");
                Localization::default()
            }
        };

        let entity_by_class = entity_index(&database);
        info!(
            records = database.record_count(),
            entities = entity_by_class.len(),
            strings = localization.len(),
            "loaded game database"
        );

        Ok(Self {
            archive: Mutex::new(archive),
            database,
            localization,
            entity_by_class,
            options,
        })
    }

    /// Read and decode one archive entry
    pub fn read_entry(&self, name: &str) -> Result<Vec<u8>> {
        self.archive.lock().extract(name)
    }

    /// Read a binary or text XML entry. Paths from the database are tried
    /// as given and under `Data/`.
    pub fn read_xml(&self, path: &str) -> Result<XmlElement> {
        let bytes = match self.read_entry(path) {
            Err(e) if e.is_not_found() => self.read_entry(&format!("Data/{}", path))?,
            other => other?,
        };
        CryXmlReader::parse(&bytes)
    }
}

impl<R> ExtractionContext<R> {
    pub fn database(&self) -> &DataForge {
        &self.database
    }

    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    pub fn localization(&self) -> &Localization {
        &self.localization
    }

    /// A fresh resolver with the run's depth budget
    pub fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&self.database, self.options.resolver)
    }

    /// Display string for a locale key, if the key is real and translated
    pub fn localize(&self, key: &str) -> Option<String> {
        if key.is_empty() || key.eq_ignore_ascii_case("@LOC_EMPTY") {
            return None;
        }
        self.localization.get(key).map(str::to_string)
    }

    /// Display string for a locale key, falling back to `fallback`
    pub fn display_name(&self, key: Option<&str>, fallback: &str) -> String {
        key.and_then(|k| self.localize(k))
            .unwrap_or_else(|| fallback.to_string())
    }

    /// Entity record id by class name, case-insensitive
    pub fn entity_by_class(&self, class_name: &str) -> Option<Guid> {
        self.entity_by_class
            .get(&class_name.to_ascii_lowercase())
            .copied()
    }

    /// Every entity-class record, in id order
    pub fn entity_records(&self) -> Vec<&Record> {
        let Some(index) = self.database.struct_index(schema::ENTITY_CLASS) else {
            return Vec::new();
        };
        self.database
            .records()
            .iter()
            .filter(|r| r.struct_index == index)
            .collect()
    }
}

fn load_database<R: Read + Seek>(archive: &mut P4kFile<R>, candidates: &[String]) -> Result<DataForge> {
    for entry in candidates {
        match archive.extract(entry) {
            Ok(bytes) => {
                debug!(entry, bytes = bytes.len(), "parsing database");
                return DataForge::parse(&bytes);
            }
            Err(e) if e.is_not_found() => continue,
            Err(e) => return Err(e),
        }
    }
    Err(Error::EntryNotFound(candidates.join(", ")))
}

fn entity_index(database: &DataForge) -> HashMap<String, Guid> {
    let Some(index) = database.struct_index(schema::ENTITY_CLASS) else {
        return HashMap::new();
    };
    database
        .records()
        .iter()
        .filter(|r| r.struct_index == index)
        .map(|r| (r.short_name().to_ascii_lowercase(), r.id))
        .collect()
}
