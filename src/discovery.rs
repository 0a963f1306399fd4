use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::DebpullError;

static HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)href\s*=\s*["']?([^"'\s>]+)"#).expect("href pattern")
});

const SKIPPED: &[&str] = &["..", ".", "by-hash"];

/// Extracts directory names from an autoindex page: hyperlink targets ending
/// in `/`, minus the parent link and the hash-sharded metadata directory.
pub fn parse_listing(html: &str) -> Vec<String> {
    let names: BTreeSet<String> = HREF
        .captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .filter_map(|target| directory_name(target.as_str()))
        .collect();
    names.into_iter().collect()
}

fn directory_name(target: &str) -> Option<String> {
    let target = target.split(['?', '#']).next()?;
    let stripped = target.strip_suffix('/')?;
    // absolute links and links into other directories are not children
    if stripped.is_empty() || stripped.contains('/') || stripped.contains(':') {
        return None;
    }
    if SKIPPED.contains(&stripped) {
        return None;
    }
    Some(stripped.to_string())
}

/// Picks the only distribution in `candidates`, or explains why it cannot.
pub fn resolve_distribution(candidates: Vec<String>) -> Result<String, DebpullError> {
    let mut candidates = candidates;
    match candidates.len() {
        0 => Err(DebpullError::DiscoveryFailed(
            "no distributions listed under dists/".to_string(),
        )),
        1 => Ok(candidates.remove(0)),
        _ => Err(DebpullError::AmbiguousDistribution { candidates }),
    }
}
