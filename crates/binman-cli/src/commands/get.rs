use std::sync::Arc;

use binman_config::defaults::{DEFAULT_SOURCE, host_arch, host_os};
use binman_config::{BinmanConfig, QueryType, ReleaseSpec, split_repo};

use crate::cli::{AppContext, GetArgs};
use crate::client::{CliError, CliResult};
use crate::commands::config::load_or_default;
use crate::commands::sync::{finish, new_metrics, plan_jobs, release_context, sync_release};

pub(crate) async fn handle_get(ctx: &AppContext, args: GetArgs) -> CliResult<()> {
    let mut config = load_or_default(&ctx.config_path()?)?;
    let spec = build_spec(&config, &args)?;
    if let Some(path) = &args.path {
        config.config.release_path = path.display().to_string();
    }
    let metrics = new_metrics(args.metrics)?;
    let context = Arc::new(release_context(&config, metrics.clone())?.without_bin_path());

    let mut jobs = plan_jobs(&ctx.client, &config, &context, vec![spec])?;
    let Some(job) = jobs.pop() else {
        return Ok(());
    };
    let report = sync_release(job).await;
    finish(&[report], ctx, metrics.as_ref())
}

/// Start from the tracked entry when there is one, then apply command line overrides.
fn build_spec(config: &BinmanConfig, args: &GetArgs) -> CliResult<ReleaseSpec> {
    if split_repo(&args.repo).is_none() {
        return Err(CliError::validation(format!(
            "repository {:?} must look like org/project",
            args.repo
        )));
    }

    let mut spec = config.release(&args.repo).cloned().unwrap_or_else(|| ReleaseSpec {
        source: DEFAULT_SOURCE.to_string(),
        os: host_os().to_string(),
        arch: host_arch().to_string(),
        ..ReleaseSpec::new(args.repo.clone())
    });
    if let Some(version) = args.version.as_deref().filter(|version| !version.is_empty()) {
        spec.version = Some(version.to_string());
        spec.query_type = QueryType::ByTag;
    }
    if let Some(source) = &args.source {
        spec.source.clone_from(source);
    }
    if let Some(os) = &args.os {
        spec.os.clone_from(os);
    }
    if let Some(arch) = &args.arch {
        spec.arch.clone_from(arch);
    }
    if config.source(&spec.source).is_none() {
        return Err(CliError::validation(format!(
            "unknown source {:?} (configured: {})",
            spec.source,
            config
                .config
                .sources
                .iter()
                .map(|source| source.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )));
    }
    Ok(spec)
}
