//! Ship-matrix cross-referencing
//!
//! Links entries of the public ship matrix to extracted ships in three
//! greedy passes over normalized names:
//!
//! 1. exact display-name match
//! 2. curated aliases, then names with the manufacturer stripped
//! 3. fuzzy token overlap
//!
//! Every pass walks the matrix in input order and commits a link as soon as
//! it finds one, so a ship or matrix entry claimed by an earlier pass is
//! never reconsidered. The result is a partial bijection.

use std::collections::HashSet;

use tracing::debug;

use crate::catalog::model::{CrossReferenceLink, MatchPass, MatrixShip, Ship};

/// Minimum shared tokens for a fuzzy match
const FUZZY_MIN_SHARED: usize = 2;
/// Minimum share of the matrix name's tokens found in the ship's
const FUZZY_MIN_SCORE: f64 = 0.6;

/// Matrix marketing names that differ from the in-game display name
const ALIASES: &[(&str, &str)] = &[
    ("mercury", "mercury star runner"),
    ("san tok yai", "santok yai"),
    ("ares inferno", "ares star fighter inferno"),
    ("ares ion", "ares star fighter ion"),
    ("c8x pisces expedition", "c8x pisces"),
    ("hercules starlifter c2", "c2 hercules"),
    ("hercules starlifter m2", "m2 hercules"),
    ("hercules starlifter a2", "a2 hercules"),
    ("mpuv passenger", "mpuv 1p"),
    ("mpuv cargo", "mpuv 1c"),
    ("p 52 merlin", "p52 merlin"),
    ("p 72 archimedes", "p72 archimedes"),
    ("85x", "85x limited"),
    ("constellation phoenix emerald", "constellation phoenix"),
    ("valkyrie liberator edition", "valkyrie"),
    ("dragonfly black", "dragonfly"),
    ("dragonfly yellowjacket", "dragonfly yellow"),
    ("nova", "nova tank"),
    ("khartu al", "khartu al scout"),
    ("f7c m super hornet heartseeker mk i", "f7c m heartseeker"),
    ("f7c m super hornet mk i", "f7c m super hornet"),
];

/// Manufacturer names and codes, normalized, longest first within a family
const MANUFACTURERS: &[&str] = &[
    "aegis dynamics",
    "aegis",
    "aegs",
    "anvil aerospace",
    "anvil",
    "anvl",
    "roberts space industries",
    "rsi",
    "drake interplanetary",
    "drake",
    "drak",
    "musashi industrial and starflight concern",
    "misc",
    "origin jumpworks",
    "origin",
    "orig",
    "crusader industries",
    "crusader",
    "crus",
    "consolidated outland",
    "cnou",
    "argo astronautics",
    "argo",
    "kruger intergalactic",
    "kruger",
    "krig",
    "gatac manufacture",
    "gatac",
    "greycat industrial",
    "greycat",
    "grin",
    "tumbril land systems",
    "tumbril",
    "tmbl",
    "esperia",
    "espr",
    "aopoa",
    "xian",
    "xnaa",
    "banu",
    "mirai",
    "mrai",
    "vanduul",
    "vncl",
];

/// Lowercase, fold accents, turn punctuation into spaces, collapse whitespace
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars().flat_map(char::to_lowercase) {
        let c = fold_accent(c);
        if c.is_alphanumeric() {
            out.push(c);
        } else {
            out.push(' ');
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn fold_accent(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' => 'a',
        'ç' | 'č' => 'c',
        'è' | 'é' | 'ê' | 'ë' | 'ē' => 'e',
        'ì' | 'í' | 'î' | 'ï' | 'ī' => 'i',
        'ñ' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ō' | 'ø' => 'o',
        'ù' | 'ú' | 'û' | 'ü' | 'ū' => 'u',
        'ý' | 'ÿ' => 'y',
        'š' => 's',
        'ž' => 'z',
        other => other,
    }
}

/// Remove a leading manufacturer name or code
fn strip_manufacturer(name: &str, extra: &[String]) -> String {
    let known = extra
        .iter()
        .map(String::as_str)
        .chain(MANUFACTURERS.iter().copied());
    let mut best: Option<&str> = None;
    for prefix in known {
        if prefix.is_empty() {
            continue;
        }
        let at_boundary = name
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with(' '));
        if at_boundary && best.map_or(true, |b| prefix.len() > b.len()) {
            best = Some(prefix);
        }
    }
    match best {
        Some(prefix) => name[prefix.len()..].trim_start().to_string(),
        None => name.to_string(),
    }
}

/// Class name without its manufacturer code segment, as words
fn structural_name(class_name: &str) -> String {
    let mut segments = class_name.split('_').peekable();
    if let Some(first) = segments.peek() {
        let is_code = first.len() <= 4
            && first.len() >= 3
            && first.chars().all(|c| c.is_ascii_uppercase());
        if is_code {
            segments.next();
        }
    }
    normalize_name(&segments.collect::<Vec<_>>().join(" "))
}

fn tokens(name: &str) -> HashSet<&str> {
    name.split(' ').filter(|t| t.chars().count() > 1).collect()
}

struct ShipKeys {
    display: String,
    stripped: String,
    structural: String,
}

struct Matcher<'a> {
    ships: &'a [Ship],
    matrix: &'a [MatrixShip],
    keys: Vec<ShipKeys>,
    linked_ships: HashSet<usize>,
    linked_entries: HashSet<usize>,
    links: Vec<CrossReferenceLink>,
}

impl<'a> Matcher<'a> {
    fn new(ships: &'a [Ship], matrix: &'a [MatrixShip]) -> Self {
        let keys = ships
            .iter()
            .map(|ship| {
                let display = normalize_name(&ship.display_name);
                let own: Vec<String> = ship
                    .manufacturer
                    .iter()
                    .flat_map(|m| [normalize_name(&m.name), normalize_name(&m.code)])
                    .collect();
                ShipKeys {
                    stripped: strip_manufacturer(&display, &own),
                    structural: structural_name(&ship.class_name),
                    display,
                }
            })
            .collect();
        Self {
            ships,
            matrix,
            keys,
            linked_ships: HashSet::new(),
            linked_entries: HashSet::new(),
            links: Vec::new(),
        }
    }

    fn entry_key(entry: &MatrixShip) -> (String, String) {
        let name = normalize_name(&entry.name);
        let own: Vec<String> = entry
            .manufacturer
            .iter()
            .flat_map(|m| [m.name.as_deref(), m.code.as_deref()])
            .flatten()
            .map(normalize_name)
            .collect();
        let stripped = strip_manufacturer(&name, &own);
        (name, stripped)
    }

    /// One greedy pass: `find` picks a free ship for a free entry and names
    /// the rule that matched
    fn pass<F>(&mut self, label: &str, mut find: F)
    where
        F: FnMut(&Self, &MatrixShip) -> Option<(usize, f64, MatchPass)>,
    {
        let before = self.links.len();
        let matrix = self.matrix;
        for (i, entry) in matrix.iter().enumerate() {
            if self.linked_entries.contains(&i) {
                continue;
            }
            if let Some((ship, score, pass)) = find(self, entry) {
                self.linked_entries.insert(i);
                self.linked_ships.insert(ship);
                self.links.push(CrossReferenceLink {
                    matrix_id: entry.id.clone(),
                    ship_id: self.ships[ship].id,
                    pass,
                    score,
                });
            }
        }
        debug!(pass = label, linked = self.links.len() - before, "matcher pass");
    }

    fn first_free(&self, predicate: impl Fn(&ShipKeys) -> bool) -> Option<usize> {
        self.keys
            .iter()
            .enumerate()
            .find(|(j, keys)| !self.linked_ships.contains(j) && predicate(keys))
            .map(|(j, _)| j)
    }

    fn exact(&self, entry: &MatrixShip) -> Option<(usize, f64, MatchPass)> {
        let (name, _) = Self::entry_key(entry);
        self.first_free(|k| k.display == name)
            .map(|j| (j, 1.0, MatchPass::Exact))
    }

    /// The alias table first, then the manufacturer-stripped name, per entry
    fn alias_or_structural(&self, entry: &MatrixShip) -> Option<(usize, f64, MatchPass)> {
        self.alias(entry)
            .map(|j| (j, 1.0, MatchPass::Alias))
            .or_else(|| self.structural(entry).map(|j| (j, 1.0, MatchPass::Structural)))
    }

    fn alias(&self, entry: &MatrixShip) -> Option<usize> {
        let (name, _) = Self::entry_key(entry);
        let (_, target) = ALIASES.iter().find(|(from, _)| *from == name)?;
        self.first_free(|k| k.display == *target || k.stripped == *target || k.structural == *target)
    }

    fn structural(&self, entry: &MatrixShip) -> Option<usize> {
        let (_, stripped) = Self::entry_key(entry);
        if stripped.is_empty() {
            return None;
        }
        self.first_free(|k| k.stripped == stripped || k.structural == stripped)
    }

    /// Token overlap between the full matrix name and the full display name
    fn fuzzy(&self, entry: &MatrixShip) -> Option<(usize, f64, MatchPass)> {
        let (name, _) = Self::entry_key(entry);
        let query = tokens(&name);
        if query.len() < FUZZY_MIN_SHARED {
            return None;
        }
        let mut best: Option<(usize, f64)> = None;
        for (j, keys) in self.keys.iter().enumerate() {
            if self.linked_ships.contains(&j) {
                continue;
            }
            let candidate = tokens(&keys.display);
            let shared = query.intersection(&candidate).count();
            let score = shared as f64 / query.len() as f64;
            if shared >= FUZZY_MIN_SHARED
                && score >= FUZZY_MIN_SCORE
                && best.map_or(true, |(_, s)| score > s)
            {
                best = Some((j, score));
            }
        }
        best.map(|(j, score)| (j, score, MatchPass::Fuzzy))
    }
}

/// Link matrix entries to ships. Existing links on the ships are ignored, so
/// running again over the same input yields the same links.
pub fn cross_reference(ships: &[Ship], matrix: &[MatrixShip]) -> Vec<CrossReferenceLink> {
    let mut matcher = Matcher::new(ships, matrix);
    matcher.pass("exact", Matcher::exact);
    matcher.pass("alias/structural", Matcher::alias_or_structural);
    matcher.pass("fuzzy", Matcher::fuzzy);
    matcher.links
}
