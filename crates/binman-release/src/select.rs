//! Platform-aware selection of a release asset.
//!
//! # Design
//! - Names are lowercased and stripped of the version before matching, so version
//!   digits never pass for an architecture.
//! - OS and architecture aliases must appear as whole tokens: `arm` does not match
//!   `arm64` and `win` does not match `windows`.
//! - Ties are broken by a configurable rule; provider order decides the rest.

use binman_config::{PatternConfig, SelectionConfig, TieBreak};
use regex::Regex;
use tracing::debug;

use crate::error::ReleaseResult;
use crate::filetype::compile;
use crate::model::Asset;

const OS_ALIASES: &[&[&str]] = &[
    &["darwin", "macos", "apple", "osx", "mac"],
    &["windows", "win", "win64", "win32"],
    &["linux"],
    &["freebsd"],
];

const ARCH_ALIASES: &[&[&str]] = &[
    &["amd64", "x86_64", "x86-64", "x64", "64bit"],
    &["arm64", "aarch64", "armv8"],
    &["386", "i386", "i686", "32bit"],
    &["arm", "armv6", "armv7", "armhf", "armv6l", "armv7l"],
];

/// Names of multi-architecture macOS builds.
const UNIVERSAL: &[&str] = &["universal", "all"];

/// Picks the asset matching a target platform.
#[derive(Debug, Clone)]
pub struct AssetSelector {
    ignore: Option<Regex>,
    tie_break: TieBreak,
}

impl Default for AssetSelector {
    fn default() -> Self {
        Self {
            ignore: None,
            tie_break: TieBreak::First,
        }
    }
}

impl AssetSelector {
    /// Build a selector from the configured ignore pattern and tie-break rule.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ReleaseError::InvalidPattern`] when the ignore pattern does not compile.
    pub fn new(patterns: &PatternConfig, selection: SelectionConfig) -> ReleaseResult<Self> {
        let ignore = if patterns.ignore.is_empty() {
            None
        } else {
            Some(compile("patterns.ignore", &patterns.ignore)?)
        };
        Ok(Self {
            ignore,
            tie_break: selection.tie_break,
        })
    }

    /// Replace the tie-break rule.
    #[must_use]
    pub const fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    /// Choose the asset built for `os`/`arch`, or `None` when nothing matches.
    #[must_use]
    pub fn select(
        &self,
        arch: &str,
        os: &str,
        version: &str,
        project: &str,
        assets: &[Asset],
    ) -> Option<Asset> {
        let os_aliases = aliases(OS_ALIASES, os);
        let mut arch_aliases = aliases(ARCH_ALIASES, arch);
        if os_aliases.iter().any(|alias| alias == "darwin") {
            arch_aliases.extend(UNIVERSAL.iter().map(|alias| (*alias).to_string()));
        }

        let candidates: Vec<&Asset> = assets
            .iter()
            .filter(|asset| !self.is_ignored(&asset.name))
            .filter(|asset| {
                let name = normalize(&asset.name, version);
                contains_any(&name, &os_aliases) && contains_any(&name, &arch_aliases)
            })
            .collect();

        let project = project.to_ascii_lowercase();
        let preferred: Vec<&Asset> = candidates
            .iter()
            .copied()
            .filter(|asset| asset.name.to_ascii_lowercase().contains(&project))
            .collect();
        let pool = if preferred.is_empty() {
            candidates
        } else {
            preferred
        };

        let chosen = match self.tie_break {
            TieBreak::First => pool.first().copied(),
            TieBreak::Shortest => pool.iter().copied().min_by_key(|asset| asset.name.len()),
        };
        debug!(
            os,
            arch,
            candidates = pool.len(),
            chosen = chosen.map(|asset| asset.name.as_str()),
            "asset selection finished"
        );
        chosen.cloned()
    }

    fn is_ignored(&self, name: &str) -> bool {
        self.ignore.as_ref().is_some_and(|ignore| ignore.is_match(name))
    }
}

fn aliases(table: &[&[&str]], value: &str) -> Vec<String> {
    let value = value.to_ascii_lowercase();
    table
        .iter()
        .find(|group| group.contains(&value.as_str()))
        .map_or_else(
            || vec![value.clone()],
            |group| group.iter().map(|alias| (*alias).to_string()).collect(),
        )
}

fn normalize(name: &str, version: &str) -> String {
    let mut name = name.to_ascii_lowercase();
    let version = version.to_ascii_lowercase();
    for candidate in [version.as_str(), version.trim_start_matches('v')] {
        name = strip_token(&name, candidate);
    }
    name
}

/// Remove every whole-token occurrence of `token`, leaving embedded ones alone.
fn strip_token(haystack: &str, token: &str) -> String {
    if token.is_empty() {
        return haystack.to_string();
    }
    let mut stripped = String::with_capacity(haystack.len());
    let mut cursor = 0;
    for start in token_starts(haystack, token) {
        if start < cursor {
            continue;
        }
        stripped.push_str(&haystack[cursor..start]);
        cursor = start + token.len();
    }
    stripped.push_str(&haystack[cursor..]);
    stripped
}

fn contains_any(name: &str, aliases: &[String]) -> bool {
    aliases.iter().any(|alias| contains_token(name, alias))
}

fn contains_token(haystack: &str, token: &str) -> bool {
    !token.is_empty() && token_starts(haystack, token).next().is_some()
}

fn token_starts<'a>(haystack: &'a str, token: &'a str) -> impl Iterator<Item = usize> + 'a {
    haystack
        .match_indices(token)
        .map(|(start, _)| start)
        .filter(move |&start| {
            let before = haystack[..start].chars().next_back();
            let after = haystack[start + token.len()..].chars().next();
            !before.is_some_and(|c| c.is_ascii_alphanumeric())
                && !after.is_some_and(|c| c.is_ascii_alphanumeric())
        })
}
