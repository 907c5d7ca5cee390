//! Operator tool for inspecting and repairing authorization state.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use atelier_authz::config::{validate_config, ConfigLoader};
use atelier_authz::{AuthzConfig, AuthzEngine, CacheKey, PermissionToken};
use atelier_common_core::{UserId, WorkspaceId};
use atelier_common_log::{LogConfig, LogFormat, LogLevel};
use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};
use serde_json::json;
use tracing::{error, info};

/// Workspace authorization diagnostics
#[derive(Debug, Parser)]
#[command(name = "atelier-authz", version, about, arg_required_else_help = true)]
struct Cli {
    /// Increase verbosity level (-v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "ATELIER_CONFIG_PATH",
        value_hint = ValueHint::FilePath
    )]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct Target {
    /// User id (`usr_` prefix optional)
    #[arg(long, value_parser = UserId::parse)]
    user: UserId,

    /// Workspace id (`wsp_` prefix optional)
    #[arg(long, value_parser = WorkspaceId::parse)]
    workspace: WorkspaceId,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Decide a single permission token
    Check {
        #[command(flatten)]
        target: Target,

        /// Permission token, e.g. canvas:create
        #[arg(long, value_parser = PermissionToken::parse)]
        token: PermissionToken,
    },

    /// Show the user's role in the workspace
    Role {
        #[command(flatten)]
        target: Target,
    },

    /// List every token the user holds in the workspace
    Permissions {
        #[command(flatten)]
        target: Target,
    },

    /// Evict both cache key families for the user in the workspace
    Evict {
        #[command(flatten)]
        target: Target,
    },
}

#[repr(u8)]
enum Exit {
    Success = 0,
    GeneralError = 1,
    ConfigError = 2,
    Denied = 3,
}

impl From<Exit> for ExitCode {
    fn from(exit: Exit) -> Self {
        ExitCode::from(exit as u8)
    }
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e:#}");
            return Exit::ConfigError.into();
        }
    };

    if let Err(e) = init_logging(&cli, &config) {
        eprintln!("{e:#}");
        return Exit::ConfigError.into();
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to create Tokio runtime: {e}");
            return Exit::GeneralError.into();
        }
    };

    match runtime.block_on(run(cli, config)) {
        Ok(exit) => exit.into(),
        Err(e) => {
            error!("{e:#}");
            Exit::GeneralError.into()
        }
    }
}

fn load_config(cli: &Cli) -> Result<AuthzConfig> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_config_path(path.to_string_lossy());
    }
    let config = loader.load()?;

    if let Err(errors) = validate_config(&config) {
        let details: Vec<String> = errors.iter().map(ToString::to_string).collect();
        anyhow::bail!("Invalid configuration:\n  {}", details.join("\n  "));
    }
    Ok(config)
}

fn init_logging(cli: &Cli, config: &AuthzConfig) -> Result<()> {
    let mut log = LogConfig::default()
        .with_settings(&config.logging.level, &config.logging.format)
        .with_env();
    log.level = match cli.verbose {
        0 => log.level,
        1 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };
    if cli.json {
        // Keep stdout parseable; logs go to stderr as JSON.
        log.format = LogFormat::Json;
    }
    atelier_common_log::init(log).context("Failed to initialize logging")
}

async fn run(cli: Cli, config: AuthzConfig) -> Result<Exit> {
    let engine = AuthzEngine::connect(&config).await?;
    let resolver = &engine.resolver;

    match cli.command {
        Command::Check { target, token } => {
            let allowed = resolver
                .has_permission_in_workspace(target.user, target.workspace, &token)
                .await?;
            if cli.json {
                println!("{}", json!({ "token": token, "allowed": allowed }));
            } else {
                println!("{}", if allowed { "allow" } else { "deny" });
            }
            Ok(if allowed { Exit::Success } else { Exit::Denied })
        }
        Command::Role { target } => {
            let role = resolver
                .get_user_workspace_role(target.user, target.workspace)
                .await?;
            if cli.json {
                println!("{}", json!({ "role": role }));
            } else {
                println!("{}", role.map_or("none", |r| r.as_str()));
            }
            Ok(Exit::Success)
        }
        Command::Permissions { target } => {
            let mut permissions: Vec<_> = resolver
                .get_user_permissions_in_workspace(target.user, target.workspace)
                .await?
                .into_iter()
                .collect();
            permissions.sort();
            if cli.json {
                println!("{}", json!({ "permissions": permissions }));
            } else {
                for token in &permissions {
                    println!("{token}");
                }
            }
            Ok(Exit::Success)
        }
        Command::Evict { target } => {
            let keys = CacheKey::for_member(target.user, target.workspace);
            engine.cache().evict(&keys).await?;
            info!(user = %target.user, workspace = %target.workspace, "Evicted cache entries");
            if cli.json {
                let evicted: Vec<&str> = keys.iter().map(CacheKey::as_str).collect();
                println!("{}", json!({ "evicted": evicted }));
            } else {
                for key in &keys {
                    println!("evicted {key}");
                }
            }
            Ok(Exit::Success)
        }
    }
}
