//! Structural validation of a normalised configuration.

use std::collections::BTreeSet;

use regex::Regex;

use crate::error::{ConfigError, ConfigResult};
use crate::model::{BinmanConfig, QueryType, split_repo};

/// Validate a normalised configuration document.
///
/// # Errors
///
/// Returns the first violation found: an empty release path, a malformed
/// repository, an unknown source, a tag query without a version, a duplicate
/// repository, or a filename pattern that does not compile.
pub fn validate(config: &BinmanConfig) -> ConfigResult<()> {
    let global = &config.config;
    if global.release_path.trim().is_empty() {
        return Err(ConfigError::invalid(
            "config",
            "releasepath",
            None,
            "must not be empty",
        ));
    }
    if global.bin_path.as_deref().is_some_and(|path| path.trim().is_empty()) {
        return Err(ConfigError::invalid(
            "config",
            "binpath",
            None,
            "must not be empty when set",
        ));
    }

    let mut source_names = BTreeSet::new();
    for source in &global.sources {
        if source.name.trim().is_empty() {
            return Err(ConfigError::invalid("sources", "name", None, "must not be empty"));
        }
        if !source_names.insert(source.name.as_str()) {
            return Err(ConfigError::invalid(
                "sources",
                "name",
                Some(source.name.clone()),
                "duplicate source name",
            ));
        }
        if source.url.trim().is_empty() {
            return Err(ConfigError::invalid(
                format!("sources.{}", source.name),
                "url",
                None,
                "must not be empty",
            ));
        }
    }

    compile("patterns.tar", &global.patterns.tar)?;
    compile("patterns.zip", &global.patterns.zip)?;
    compile("patterns.ignore", &global.patterns.ignore)?;

    let mut seen = BTreeSet::new();
    for release in &config.releases {
        validate_repo(&release.repo)?;
        if !source_names.contains(release.source.as_str()) {
            return Err(ConfigError::UnknownSource {
                repo: release.repo.clone(),
                source_name: release.source.clone(),
            });
        }
        if release.query_type == QueryType::ByTag && release.version.is_none() {
            return Err(ConfigError::invalid(
                release.repo.clone(),
                "version",
                None,
                "required when querytype is releasebytag",
            ));
        }
        if release
            .link_name
            .as_deref()
            .is_some_and(|name| name.is_empty() || (name.contains('/') && name != release.repo))
        {
            return Err(ConfigError::invalid(
                release.repo.clone(),
                "linkname",
                release.link_name.clone(),
                "must be a bare file name or the repository itself",
            ));
        }
        if release.download_only && release.post_only {
            return Err(ConfigError::invalid(
                release.repo.clone(),
                "postonly",
                Some("true".to_string()),
                "cannot be combined with downloadonly",
            ));
        }
        for command in &release.post_commands {
            if command.command.trim().is_empty() {
                return Err(ConfigError::invalid(
                    release.repo.clone(),
                    "postcommands.command",
                    None,
                    "must not be empty",
                ));
            }
        }
        if !seen.insert(release.repo.as_str()) {
            return Err(ConfigError::DuplicateRelease {
                repo: release.repo.clone(),
            });
        }
    }
    Ok(())
}

fn validate_repo(repo: &str) -> ConfigResult<()> {
    if split_repo(repo).is_some() {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            "releases",
            "repo",
            Some(repo.to_string()),
            "expected org/project",
        ))
    }
}

fn compile(field: &'static str, pattern: &str) -> ConfigResult<()> {
    Regex::new(pattern)
        .map(drop)
        .map_err(|source| ConfigError::InvalidPattern {
            field,
            pattern: pattern.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::parse;

    #[test]
    fn repo_without_separator_is_rejected() {
        let err = parse("releases:\n  - repo: syft\n").err();
        assert!(matches!(
            err,
            Some(ConfigError::InvalidField { field: "repo", .. })
        ));
    }

    #[test]
    fn nested_gitlab_groups_are_accepted() -> ConfigResult<()> {
        let config = parse("releases:\n  - repo: group/sub/project\n    source: gitlab.com\n")?;
        assert_eq!(config.releases.len(), 1);
        Ok(())
    }

    #[test]
    fn trailing_separator_is_rejected() {
        let err = parse("releases:\n  - repo: group/sub/\n    source: gitlab.com\n").err();
        assert!(matches!(
            err,
            Some(ConfigError::InvalidField { field: "repo", .. })
        ));
    }

    #[test]
    fn download_only_and_post_only_are_exclusive() {
        let err = parse("releases:\n  - repo: a/b\n    downloadonly: true\n    postonly: true\n").err();
        assert!(matches!(
            err,
            Some(ConfigError::InvalidField {
                field: "postonly",
                ..
            })
        ));
    }

    #[test]
    fn unknown_source_is_rejected() {
        let err = parse("releases:\n  - repo: a/b\n    source: example.org\n").err();
        assert!(matches!(err, Some(ConfigError::UnknownSource { .. })));
    }

    #[test]
    fn tag_query_requires_version() {
        let err = parse("releases:\n  - repo: a/b\n    querytype: releasebytag\n").err();
        assert!(matches!(
            err,
            Some(ConfigError::InvalidField {
                field: "version",
                ..
            })
        ));
    }

    #[test]
    fn duplicate_repo_is_rejected() {
        let err = parse("releases:\n  - repo: a/b\n  - repo: a/b\n    version: v1\n").err();
        assert!(matches!(err, Some(ConfigError::DuplicateRelease { .. })));
    }

    #[test]
    fn bad_pattern_is_rejected() {
        let err = parse("config:\n  patterns:\n    zip: \"(\"\n").err();
        assert!(matches!(
            err,
            Some(ConfigError::InvalidPattern {
                field: "patterns.zip",
                ..
            })
        ));
    }

    #[test]
    fn link_name_with_separator_is_rejected() {
        let err = parse("releases:\n  - repo: a/b\n    linkname: x/y\n").err();
        assert!(matches!(
            err,
            Some(ConfigError::InvalidField {
                field: "linkname",
                ..
            })
        ));
    }
}
