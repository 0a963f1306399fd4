use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::DebpullError;

pub const DEFAULT_COMPONENT: &str = "main";

static ECHO_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:sudo\s+)?echo(?:\s+-[A-Za-z]+)*\s+").expect("echo prefix pattern")
});
static TEE_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s*\|\s*(?:sudo\s+(?:-\S+\s+)*)?tee\b.*$").expect("tee suffix pattern")
});
static REPO_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^deb(?:-src)?\s+(.*)$").expect("repository line pattern"));

/// A repository as the user described it, normalized to a base URL plus an
/// optional distribution and a component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryDescriptor {
    raw: String,
    base_url: String,
    distribution: Option<String>,
    component: String,
    architectures: Vec<String>,
}

impl RepositoryDescriptor {
    pub fn parse(input: &str) -> Result<Self, DebpullError> {
        let cleaned = clean(input);
        if cleaned.is_empty() {
            return Err(DebpullError::InvalidDescriptor("empty input".to_string()));
        }

        if let Some(captures) = REPO_LINE.captures(&cleaned) {
            let rest = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
            return Self::from_repo_line(&cleaned, rest);
        }

        if is_http_url(&cleaned) {
            return Ok(Self {
                raw: cleaned.clone(),
                base_url: strip_trailing_slash(&cleaned),
                distribution: None,
                component: DEFAULT_COMPONENT.to_string(),
                architectures: Vec::new(),
            });
        }

        Err(DebpullError::InvalidDescriptor(input.trim().to_string()))
    }

    fn from_repo_line(cleaned: &str, rest: &str) -> Result<Self, DebpullError> {
        let mut rest = rest.trim_start();
        let mut architectures = Vec::new();

        if let Some(options) = rest.strip_prefix('[') {
            let (options, tail) = options.split_once(']').ok_or_else(|| {
                DebpullError::InvalidDescriptor(format!("unterminated options in `{cleaned}`"))
            })?;
            architectures = parse_arch_option(options);
            rest = tail;
        }

        let mut tokens = rest.split_whitespace();
        let url = tokens.next().ok_or_else(|| {
            DebpullError::InvalidDescriptor(format!("missing URL in `{cleaned}`"))
        })?;
        if !is_http_url(url) {
            return Err(DebpullError::InvalidDescriptor(format!(
                "unsupported URL scheme: {url}"
            )));
        }
        let distribution = tokens.next().map(|value| value.to_string());
        let component = tokens
            .next()
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_COMPONENT)
            .to_string();

        Ok(Self {
            raw: cleaned.to_string(),
            base_url: strip_trailing_slash(url),
            distribution,
            component,
            architectures,
        })
    }

    /// The cleaned input this descriptor was parsed from.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn distribution(&self) -> Option<&str> {
        self.distribution.as_deref()
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    /// True when parsed from a `deb`/`deb-src` line rather than a bare URL.
    pub fn is_repo_line(&self) -> bool {
        !is_http_url(&self.raw)
    }

    /// Architectures named by an `arch=` option of a repository line.
    pub fn architectures(&self) -> &[String] {
        &self.architectures
    }

    pub fn with_distribution(mut self, distribution: Option<String>) -> Self {
        if let Some(value) = distribution.filter(|value| !value.trim().is_empty()) {
            self.distribution = Some(value.trim().to_string());
        }
        self
    }

    pub fn with_component(mut self, component: Option<String>) -> Self {
        if let Some(value) = component.filter(|value| !value.trim().is_empty()) {
            self.component = value.trim().to_string();
        }
        self
    }

    pub fn dists_url(&self) -> String {
        format!("{}/dists/", self.base_url)
    }

    pub fn artifact_url(&self, artifact_path: &str) -> String {
        format!("{}/{}", self.base_url, artifact_path.trim_start_matches('/'))
    }
}

impl FromStr for RepositoryDescriptor {
    type Err = DebpullError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl fmt::Display for RepositoryDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.distribution {
            Some(dist) => write!(f, "deb {} {} {}", self.base_url, dist, self.component),
            None => write!(f, "{}", self.base_url),
        }
    }
}

/// Strips shell wrapping (`echo`, `| sudo tee ...`, quotes and trailing
/// continuation characters) until the string stops changing.
fn clean(input: &str) -> String {
    let mut current = input.trim().to_string();
    loop {
        let next = clean_once(&current);
        if next == current {
            return next;
        }
        current = next;
    }
}

fn clean_once(value: &str) -> String {
    let value = strip_quotes(value.trim());
    let value = ECHO_PREFIX.replace(value, "");
    let value = TEE_SUFFIX.replace(&value, "");
    let value = value.trim_end_matches(|ch: char| ch == '\\' || ch == '|' || ch.is_whitespace());
    strip_quotes(value.trim()).to_string()
}

fn strip_quotes(value: &str) -> &str {
    value.trim_matches(|ch| ch == '"' || ch == '\'').trim()
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn strip_trailing_slash(value: &str) -> String {
    value.strip_suffix('/').unwrap_or(value).to_string()
}

fn parse_arch_option(options: &str) -> Vec<String> {
    options
        .split_whitespace()
        .filter_map(|option| option.split_once('='))
        .filter(|(key, _)| key.trim_end_matches(['+', '-']) == "arch")
        .flat_map(|(_, value)| value.split(','))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}
