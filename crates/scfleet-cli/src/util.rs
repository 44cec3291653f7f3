//! Small helpers shared by the commands

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobMatcher};

/// Human-readable size (B, KB, MB, GB)
pub fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    match size {
        s if s >= GB => format!("{:.2} GB", s as f64 / GB as f64),
        s if s >= MB => format!("{:.2} MB", s as f64 / MB as f64),
        s if s >= KB => format!("{:.2} KB", s as f64 / KB as f64),
        s => format!("{} B", s),
    }
}

/// Compile an entry filter.
///
/// `*.ext` matches in any directory and a pattern without wildcards is a
/// substring search. Matching ignores case, since archive paths do.
pub fn glob_matcher(pattern: &str) -> Result<GlobMatcher> {
    let pattern = if pattern.starts_with("*.") {
        format!("**/{}", pattern)
    } else if !pattern.contains(['*', '?']) {
        format!("**/*{}*", pattern)
    } else {
        pattern.to_string()
    };

    let glob = GlobBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .with_context(|| format!("Invalid pattern: {}", pattern))?;
    Ok(glob.compile_matcher())
}

pub fn matches_filter(name: &str, matcher: Option<&GlobMatcher>) -> bool {
    matcher.map_or(true, |m| m.is_match(name.replace('\\', "/")))
}

/// Split a `port=component` swap argument. An empty component empties the port.
pub fn parse_swap(arg: &str) -> Result<(String, Option<String>)> {
    let (port, component) = arg
        .split_once('=')
        .with_context(|| format!("Swap must look like port=component, got '{}'", arg))?;
    let port = port.trim();
    anyhow::ensure!(!port.is_empty(), "Swap '{}' names no port", arg);
    let component = component.trim();
    Ok((
        port.to_string(),
        (!component.is_empty()).then(|| component.to_string()),
    ))
}
