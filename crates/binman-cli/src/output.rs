//! Output renderers and formatting helpers for CLI commands.

use std::error::Error as StdError;

use anyhow::anyhow;
use binman_config::{BinmanConfig, ConfigError};
use binman_release::ReleaseError;
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::client::{CliError, CliResult};

/// Result of syncing one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct RepoReport {
    pub(crate) repo: String,
    pub(crate) version: Option<String>,
    pub(crate) status: SyncStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum SyncStatus {
    Updated,
    UpToDate,
    Failed,
}

impl SyncStatus {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Updated => "updated",
            Self::UpToDate => "up_to_date",
            Self::Failed => "failed",
        }
    }
}

pub(crate) fn render_reports(reports: &[RepoReport], format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => println!("{}", to_json(reports)?),
        OutputFormat::Text => print!("{}", reports_table(reports)),
    }
    Ok(())
}

fn reports_table(reports: &[RepoReport]) -> String {
    let width = reports
        .iter()
        .map(|report| report.repo.len())
        .max()
        .unwrap_or(0)
        .max("REPO".len());
    let mut table = format!("{:<width$}  {:<16} {:<11} DETAIL\n", "REPO", "VERSION", "STATUS");
    for report in reports {
        table.push_str(&format!(
            "{:<width$}  {:<16} {:<11} {}\n",
            report.repo,
            report.version.as_deref().unwrap_or("-"),
            report.status.as_str(),
            report.detail.as_deref().unwrap_or("")
        ));
    }
    table
}

pub(crate) fn render_config(config: &BinmanConfig, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => println!("{}", to_json(config)?),
        OutputFormat::Text => {
            let text = binman_config::loader::to_yaml(config)
                .map_err(|err| CliError::failure(anyhow!(describe_config_error(&err))))?;
            print!("{text}");
        }
    }
    Ok(())
}

pub(crate) fn render_metrics(text: &str) {
    print!("{text}");
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> CliResult<String> {
    serde_json::to_string_pretty(value)
        .map_err(|err| CliError::failure(anyhow!("failed to format JSON: {err}")))
}

/// One-line description of a configuration error, including its context fields.
pub(crate) fn describe_config_error(error: &ConfigError) -> String {
    let head = match error {
        ConfigError::Io {
            operation, path, ..
        } => format!("{error} ({operation} {})", path.display()),
        ConfigError::Parse {
            path: Some(path), ..
        } => format!("{error} ({})", path.display()),
        ConfigError::InvalidField {
            section,
            field,
            value,
            reason,
        } => match value {
            Some(value) => format!("{error}: {section}.{field}={value:?} {reason}"),
            None => format!("{error}: {section}.{field} {reason}"),
        },
        ConfigError::UnknownSource { repo, source_name } => {
            format!("{error}: {repo} uses {source_name:?}")
        }
        ConfigError::DuplicateRelease { repo } => format!("{error}: {repo}"),
        ConfigError::InvalidPattern { field, pattern, .. } => {
            format!("{error}: {field}={pattern:?}")
        }
        ConfigError::Parse { path: None, .. }
        | ConfigError::Serialize { .. }
        | ConfigError::HomeDirUnavailable => error.to_string(),
    };
    with_sources(head, error)
}

/// One-line description of a release error, including its context fields.
pub(crate) fn describe_release_error(error: &ReleaseError) -> String {
    let head = match error {
        ReleaseError::InvalidRepo { repo } => format!("{error}: {repo:?}"),
        ReleaseError::AssetNotFound { repo } => format!("{error} for {repo}"),
        ReleaseError::MissingState { repo, field } => format!("{error}: {repo} has no {field}"),
        ReleaseError::InvalidPattern { field, .. } => format!("{error}: {field}"),
        ReleaseError::Config { source } => return describe_config_error(source),
        ReleaseError::Io {
            operation, path, ..
        } => format!("{error} ({operation} {})", path.display()),
        ReleaseError::Walk { path, .. } | ReleaseError::LinkOccupied { path } => {
            format!("{error}: {}", path.display())
        }
        ReleaseError::CommandFailed { command, code } => match code {
            Some(code) => format!("{error}: {command} exited with {code}"),
            None => format!("{error}: {command} terminated by signal"),
        },
        ReleaseError::Collaborator { operation, .. } => format!("{error} ({operation})"),
    };
    with_sources(head, error)
}

fn with_sources(mut message: String, error: &dyn StdError) -> String {
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
