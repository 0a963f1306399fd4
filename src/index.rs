use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::DebpullError;
use crate::version;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexEntry {
    pub package: String,
    pub version: String,
    pub artifact_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedTarget {
    pub package: String,
    pub version: String,
    pub artifact_path: String,
}

impl ResolvedTarget {
    /// Final path segment of the artifact path.
    pub fn file_name(&self) -> Result<&str, DebpullError> {
        let name = self
            .artifact_path
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .trim();
        if name.is_empty() || name == "." || name == ".." || name.contains('\\') {
            return Err(DebpullError::InvalidIndexEntry(format!(
                "no usable file name in {}",
                self.artifact_path
            )));
        }
        Ok(name)
    }
}

impl From<&IndexEntry> for ResolvedTarget {
    fn from(entry: &IndexEntry) -> Self {
        Self {
            package: entry.package.clone(),
            version: entry.version.clone(),
            artifact_path: entry.artifact_path.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum VersionRequest {
    #[default]
    Latest,
    Exact(String),
}

impl FromStr for VersionRequest {
    type Err = DebpullError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("latest") {
            Ok(VersionRequest::Latest)
        } else {
            Ok(VersionRequest::Exact(trimmed.to_string()))
        }
    }
}

impl fmt::Display for VersionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionRequest::Latest => write!(f, "latest"),
            VersionRequest::Exact(version) => write!(f, "{version}"),
        }
    }
}

/// Entries of one `Packages` file, in file order.
#[derive(Debug, Clone, Default)]
pub struct PackageIndex {
    entries: Vec<IndexEntry>,
}

#[derive(Default)]
struct Stanza {
    package: Option<String>,
    version: Option<String>,
    filename: Option<String>,
}

impl Stanza {
    fn take_entry(&mut self) -> Option<IndexEntry> {
        let stanza = std::mem::take(self);
        Some(IndexEntry {
            package: stanza.package?,
            version: stanza.version?,
            artifact_path: stanza.filename?,
        })
    }
}

impl PackageIndex {
    pub fn parse(text: &str) -> Self {
        let mut entries = Vec::new();
        let mut stanza = Stanza::default();

        for line in text.lines() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                entries.extend(stanza.take_entry());
                continue;
            }
            if line.starts_with([' ', '\t']) {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            let key = key.trim();
            if key.eq_ignore_ascii_case("Package") {
                stanza.package = Some(value.to_string());
            } else if key.eq_ignore_ascii_case("Version") {
                stanza.version = Some(value.to_string());
            } else if key.eq_ignore_ascii_case("Filename") {
                stanza.filename = Some(value.to_string());
            }
        }
        entries.extend(stanza.take_entry());

        Self { entries }
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Distinct package names, sorted.
    pub fn package_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|entry| entry.package.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Versions of `package` in file order.
    pub fn versions_of(&self, package: &str) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| entry.package == package)
            .map(|entry| entry.version.clone())
            .collect()
    }

    pub fn select_package(&self, requested: Option<&str>) -> Result<String, DebpullError> {
        let names = self.package_names();
        match requested {
            Some(name) => {
                if names.iter().any(|candidate| candidate == name) {
                    Ok(name.to_string())
                } else {
                    Err(DebpullError::PackageNotFound {
                        package: name.to_string(),
                        available: names,
                    })
                }
            }
            None if names.len() == 1 => Ok(names.into_iter().next().unwrap_or_default()),
            None => Err(DebpullError::PackageNotSpecified { available: names }),
        }
    }

    pub fn resolve(
        &self,
        package: Option<&str>,
        version: &VersionRequest,
    ) -> Result<ResolvedTarget, DebpullError> {
        self.resolve_with(package, version, version::compare_versions)
    }

    /// Resolves a package and version, ordering versions with `compare`.
    /// Among equal versions the entry appearing later in the file wins.
    pub fn resolve_with<F>(
        &self,
        package: Option<&str>,
        version: &VersionRequest,
        compare: F,
    ) -> Result<ResolvedTarget, DebpullError>
    where
        F: Fn(&str, &str) -> Ordering,
    {
        let package = self.select_package(package)?;
        let mut candidates = self.entries.iter().filter(|entry| entry.package == package);

        match version {
            VersionRequest::Exact(wanted) => candidates
                .find(|entry| &entry.version == wanted)
                .map(ResolvedTarget::from)
                .ok_or_else(|| DebpullError::VersionNotFound {
                    package: package.clone(),
                    version: wanted.clone(),
                    available: self.versions_of(&package),
                }),
            VersionRequest::Latest => {
                let mut best: Option<&IndexEntry> = None;
                for entry in candidates {
                    let replace = match best {
                        None => true,
                        Some(current) => compare(&entry.version, &current.version).is_ge(),
                    };
                    if replace {
                        best = Some(entry);
                    }
                }
                best.map(ResolvedTarget::from)
                    .ok_or_else(|| DebpullError::PackageNotFound {
                        package,
                        available: self.package_names(),
                    })
            }
        }
    }
}
