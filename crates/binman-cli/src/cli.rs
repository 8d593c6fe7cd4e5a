//! Argument parsing and command dispatch for the `binman` binary.

use std::path::PathBuf;

use binman_telemetry::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, init_logging};
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::client::{CliError, CliResult, http_client};
use crate::commands::{handle_config, handle_get, handle_sync};

const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_JOBS: usize = 4;
const CONFIG_FILE: &str = "binman/config.yaml";

/// Parses CLI arguments, executes the requested command and returns the
/// process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    let logging = LoggingConfig {
        level: &cli.log_level,
        format: LogFormat::from_name(cli.log_format.map(LogFormatArg::as_str)),
        build_version: env!("CARGO_PKG_VERSION"),
    };
    if let Err(err) = init_logging(&logging) {
        eprintln!("error: failed to initialise logging: {err}");
        return 3;
    }

    match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            err.exit_code()
        }
    }
}

async fn dispatch(cli: Cli) -> CliResult<()> {
    let ctx = AppContext {
        client: http_client(cli.timeout)?,
        config_path: cli.config,
        output: cli.output,
    };
    match cli.command {
        Command::Sync(args) => handle_sync(&ctx, args).await,
        Command::Get(args) => handle_get(&ctx, args).await,
        Command::Config(args) => handle_config(&ctx, args).await,
    }
}

/// Values shared by every command handler.
#[derive(Debug, Clone)]
pub(crate) struct AppContext {
    pub(crate) client: reqwest::Client,
    pub(crate) config_path: Option<PathBuf>,
    pub(crate) output: OutputFormat,
}

impl AppContext {
    /// Configuration file in effect: `--config`, else the user config directory.
    pub(crate) fn config_path(&self) -> CliResult<PathBuf> {
        self.config_path
            .clone()
            .or_else(|| dirs::config_dir().map(|dir| dir.join(CONFIG_FILE)))
            .ok_or_else(|| {
                CliError::validation(
                    "no configuration directory found (pass --config or set BINMAN_CONFIG)",
                )
            })
    }
}

#[derive(Parser)]
#[command(
    name = "binman",
    version,
    about = "Track GitHub and GitLab releases and keep their binaries linked locally"
)]
struct Cli {
    #[arg(long, short = 'c', global = true, env = "BINMAN_CONFIG")]
    config: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        env = "BINMAN_LOG_LEVEL",
        default_value = DEFAULT_LOG_LEVEL
    )]
    log_level: String,
    #[arg(long, global = true, env = "BINMAN_LOG_FORMAT", value_enum)]
    log_format: Option<LogFormatArg>,
    #[arg(
        long,
        global = true,
        env = "BINMAN_HTTP_TIMEOUT_SECS",
        default_value_t = DEFAULT_TIMEOUT_SECS
    )]
    timeout: u64,
    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Select output format for summaries and configuration dumps"
    )]
    output: OutputFormat,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Bring every configured release up to date.
    Sync(SyncArgs),
    /// Fetch a single repository's release.
    Get(GetArgs),
    /// Show, extend or edit the configuration file.
    Config(ConfigArgs),
}

#[derive(Args, Debug, Clone)]
pub(crate) struct SyncArgs {
    /// Maximum number of repositories processed at once.
    #[arg(long, short = 'j', default_value_t = DEFAULT_JOBS)]
    pub(crate) jobs: usize,
    /// Only sync the listed repositories.
    #[arg(long = "repo", value_name = "ORG/PROJECT")]
    pub(crate) repos: Vec<String>,
    /// Print Prometheus metrics after the run.
    #[arg(long)]
    pub(crate) metrics: bool,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct GetArgs {
    /// Repository to fetch, as `org/project`.
    pub(crate) repo: String,
    /// Pin a release tag instead of using the latest release.
    #[arg(long)]
    pub(crate) version: Option<String>,
    /// Directory receiving the release instead of the configured release path.
    #[arg(long)]
    pub(crate) path: Option<PathBuf>,
    /// Source name serving the repository.
    #[arg(long)]
    pub(crate) source: Option<String>,
    /// Target operating system.
    #[arg(long)]
    pub(crate) os: Option<String>,
    /// Target CPU architecture.
    #[arg(long)]
    pub(crate) arch: Option<String>,
    /// Print Prometheus metrics after the run.
    #[arg(long)]
    pub(crate) metrics: bool,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct ConfigArgs {
    #[command(subcommand)]
    pub(crate) action: Option<ConfigAction>,
}

#[derive(Subcommand, Debug, Clone)]
pub(crate) enum ConfigAction {
    /// Print the effective configuration (the default).
    Show,
    /// Track a repository after checking that it publishes releases.
    Add(ConfigAddArgs),
    /// Open the configuration file in `$EDITOR`.
    Edit,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct ConfigAddArgs {
    /// Repository to track, as `org/project`.
    pub(crate) repo: String,
    /// Source name serving the repository.
    #[arg(long)]
    pub(crate) source: Option<String>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum LogFormatArg {
    Pretty,
    Json,
}

impl LogFormatArg {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}
