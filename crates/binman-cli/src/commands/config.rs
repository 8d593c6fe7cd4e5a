use std::fs;
use std::path::Path;

use anyhow::anyhow;
use binman_config::defaults::DEFAULT_SOURCE;
use binman_config::{BinmanConfig, ConfigError, QueryType, ReleaseSpec, split_repo};
use tokio::process::Command;
use tracing::info;

use crate::cli::{AppContext, ConfigAction, ConfigAddArgs, ConfigArgs};
use crate::client::{CliError, CliResult};
use crate::output::{describe_config_error, render_config};
use crate::providers::ProviderClient;

const EDITOR_VAR: &str = "EDITOR";

pub(crate) async fn handle_config(ctx: &AppContext, args: ConfigArgs) -> CliResult<()> {
    match args.action.unwrap_or(ConfigAction::Show) {
        ConfigAction::Show => {
            let config = load_required(&ctx.config_path()?)?;
            render_config(&config, ctx.output)
        }
        ConfigAction::Add(args) => add_release(ctx, &args).await,
        ConfigAction::Edit => {
            let editor = std::env::var(EDITOR_VAR).unwrap_or_default();
            edit_config(&ctx.config_path()?, &editor).await
        }
    }
}

/// Track `repo` after confirming its source publishes a release for it.
async fn add_release(ctx: &AppContext, args: &ConfigAddArgs) -> CliResult<()> {
    if split_repo(&args.repo).is_none() {
        return Err(CliError::validation(format!(
            "repository {:?} must look like org/project",
            args.repo
        )));
    }
    let path = ctx.config_path()?;
    let mut config = load_or_default(&path)?;
    if config.release(&args.repo).is_some() {
        return Err(config_failure(ConfigError::DuplicateRelease {
            repo: args.repo.clone(),
        }));
    }

    let source_name = args.source.as_deref().unwrap_or(DEFAULT_SOURCE);
    let source = config
        .source(source_name)
        .ok_or_else(|| CliError::validation(format!("unknown source {source_name:?}")))?;
    let latest = ProviderClient::from_env(ctx.client.clone(), source)
        .fetch(&args.repo, QueryType::Latest, None)
        .await?;

    config.releases.push(ReleaseSpec {
        source: source_name.to_string(),
        ..ReleaseSpec::new(args.repo.clone())
    });
    write_config(&path, &config)?;
    info!(
        repo = %args.repo,
        version = latest.tag_name(),
        path = %path.display(),
        "release added"
    );
    println!(
        "added {} (latest {}) to {}",
        args.repo,
        latest.tag_name(),
        path.display()
    );
    Ok(())
}

/// Open the configuration in `editor`, creating it from defaults first when absent.
///
/// The edited file is loaded again so mistakes are reported straight away.
async fn edit_config(path: &Path, editor: &str) -> CliResult<()> {
    let mut words = editor.split_whitespace();
    let Some(program) = words.next() else {
        return Err(CliError::validation(format!(
            "set ${EDITOR_VAR} to edit {}",
            path.display()
        )));
    };
    if !path.exists() {
        write_config(path, &load_or_default(path)?)?;
    }

    info!(editor = program, path = %path.display(), "opening configuration");
    let status = Command::new(program)
        .args(words)
        .arg(path)
        .status()
        .await
        .map_err(|err| CliError::failure(anyhow!("failed to start {program}: {err}")))?;
    if !status.success() {
        return Err(CliError::failure(anyhow!("{program} exited with {status}")));
    }
    load_required(path).map(drop)
}

/// Validate `config` as it will be read back, then write it to `path`.
fn write_config(path: &Path, config: &BinmanConfig) -> CliResult<()> {
    let text = binman_config::loader::to_yaml(config).map_err(config_failure)?;
    binman_config::parse(&text).map_err(config_failure)?;
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| {
            CliError::failure(anyhow!("failed to create {}: {err}", parent.display()))
        })?;
    }
    fs::write(path, text)
        .map_err(|err| CliError::failure(anyhow!("failed to write {}: {err}", path.display())))
}

/// Load a configuration that must exist on disk.
pub(crate) fn load_required(path: &Path) -> CliResult<BinmanConfig> {
    if !path.exists() {
        return Err(CliError::validation(format!(
            "configuration file {} not found (pass --config or set BINMAN_CONFIG)",
            path.display()
        )));
    }
    binman_config::load(path).map_err(config_failure)
}

/// Load the configuration when present, otherwise fall back to built-in defaults.
pub(crate) fn load_or_default(path: &Path) -> CliResult<BinmanConfig> {
    if path.exists() {
        binman_config::load(path).map_err(config_failure)
    } else {
        binman_config::parse("{}").map_err(config_failure)
    }
}

/// Invalid configuration is a user error; everything else is operational.
pub(crate) fn config_failure(error: ConfigError) -> CliError {
    let message = describe_config_error(&error);
    match error {
        ConfigError::InvalidField { .. }
        | ConfigError::UnknownSource { .. }
        | ConfigError::DuplicateRelease { .. }
        | ConfigError::InvalidPattern { .. }
        | ConfigError::Parse { .. } => CliError::validation(message),
        ConfigError::Io { .. } | ConfigError::Serialize { .. } | ConfigError::HomeDirUnavailable => {
            CliError::failure(anyhow!(message))
        }
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::cli::OutputFormat;

    fn context(path: &Path) -> AppContext {
        AppContext {
            client: reqwest::Client::new(),
            config_path: Some(path.to_path_buf()),
            output: OutputFormat::Text,
        }
    }

    fn add(repo: &str) -> ConfigAddArgs {
        ConfigAddArgs {
            repo: repo.into(),
            source: None,
        }
    }

    #[tokio::test]
    #[allow(deprecated)]
    async fn add_appends_a_checked_repository_once() -> anyhow::Result<()> {
        let server = MockServer::start_async().await;
        let latest = server
            .mock_async(|when, then| {
                when.method(GET).path("/repos/acme/tool/releases/latest");
                then.status(200).json_body(json!({"tag_name": "v0.3.0", "assets": []}));
            })
            .await;
        let temp = TempDir::new()?;
        let path = temp.path().join("binman/config.yaml");
        fs::create_dir_all(temp.path().join("binman"))?;
        fs::write(
            &path,
            format!(
                "config:\n  sources:\n    - name: github.com\n      url: {}\n      apitype: github\nreleases:\n  - repo: anchore/syft\n",
                server.base_url()
            ),
        )?;
        let ctx = context(&path);

        add_release(&ctx, &add("acme/tool"))
            .await
            .map_err(|err| anyhow!(err.display_message()))?;
        let config = load_required(&path).map_err(|err| anyhow!(err.display_message()))?;
        let repos: Vec<&str> = config
            .releases
            .iter()
            .map(|release| release.repo.as_str())
            .collect();
        assert_eq!(repos, vec!["anchore/syft", "acme/tool"]);
        assert_eq!(
            config.source("github.com").map(|source| source.url.clone()),
            Some(server.base_url())
        );

        let again = add_release(&ctx, &add("acme/tool")).await;
        assert!(again.is_err_and(|err| {
            err.exit_code() == 2 && err.display_message().contains("duplicate release entry")
        }));
        latest.assert_hits_async(1).await;
        Ok(())
    }

    #[tokio::test]
    async fn add_leaves_the_file_alone_when_the_repository_is_unknown() -> anyhow::Result<()> {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/repos/acme/ghost/releases/latest");
                then.status(404);
            })
            .await;
        let temp = TempDir::new()?;
        let path = temp.path().join("config.yaml");
        let original = format!(
            "config:\n  sources:\n    - name: github.com\n      url: {}\n      apitype: github\n",
            server.base_url()
        );
        fs::write(&path, &original)?;

        let result = add_release(&context(&path), &add("acme/ghost")).await;
        assert!(result.is_err_and(|err| err.display_message().contains("release not found")));
        assert_eq!(fs::read_to_string(&path)?, original);

        let malformed = add_release(&context(&path), &add("ghost")).await;
        assert!(malformed.is_err_and(|err| err.exit_code() == 2));
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn edit_creates_missing_file_and_checks_the_result() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("nested/config.yaml");

        edit_config(&path, "true")
            .await
            .map_err(|err| anyhow!(err.display_message()))?;
        let config = load_required(&path).map_err(|err| anyhow!(err.display_message()))?;
        assert!(config.releases.is_empty());

        let failed = edit_config(&path, "false").await;
        assert!(failed.is_err_and(|err| err.exit_code() == 3));

        fs::write(&path, "releases:\n  - repo: broken\n")?;
        let invalid = edit_config(&path, "true").await;
        assert!(invalid.is_err_and(|err| err.exit_code() == 2));
        Ok(())
    }

    #[tokio::test]
    async fn edit_requires_an_editor() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("config.yaml");
        let result = edit_config(&path, "  ").await;
        assert!(result.is_err_and(|err| err.exit_code() == 2));
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn missing_file_is_a_validation_error() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let result = load_required(&temp.path().join("absent.yaml"));
        assert!(result.is_err_and(|err| err.exit_code() == 2));
        Ok(())
    }

    #[test]
    fn invalid_release_is_a_validation_error() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("config.yaml");
        fs::write(&path, "releases:\n  - repo: not-a-repo\n")?;
        let result = load_required(&path);
        assert!(result.is_err_and(|err| err.exit_code() == 2));
        Ok(())
    }

    #[test]
    fn absent_file_falls_back_to_defaults() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let config = load_or_default(&temp.path().join("absent.yaml"))
            .map_err(|err| anyhow!(err.display_message()))?;
        assert!(config.releases.is_empty());
        assert!(config.source("github.com").is_some());
        Ok(())
    }
}
