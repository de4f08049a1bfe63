//! Usage: Command-line surface (`show`, `login`, `rotate`) over the usage workflows.

use crate::app::logging;
use crate::domain::account_rotation::RotationTarget;
use crate::infra::credential_store::{CredentialStore, FileCredentialStore};
use crate::infra::settings::{self, UsageSettings};
use crate::oauth::device_flow::DeviceFlow;
use crate::oauth::refresh::HttpCodexRefresher;
use crate::oauth::TokenEndpoint;
use crate::shared::error::AppResult;
use crate::usage::login::{login_with_device_flow, COPILOT_LOGIN_LABEL};
use crate::usage::rotation::rotate_codex_account;
use crate::usage::{resolve_provider_filter, CollectOptions, UsageCollector};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// AIO Usage: rate-limit and quota usage across coding assistant providers
#[derive(Parser, Debug)]
#[command(name = "aio-usage")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Settings file (defaults to usage-config.json in the config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory for rolling log files
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print usage snapshots as JSON
    Show {
        /// Provider name or alias (e.g. codex, gh, claude, zai); unknown names show everything
        filter: Option<String>,
        /// Report every stored Codex account, not only the current one
        #[arg(long)]
        all_accounts: bool,
    },

    /// Authorize GitHub Copilot through the device flow
    Login,

    /// Switch the current Codex account
    Rotate {
        /// 1-based account number; omit to move to the next account
        order: Option<usize>,
    },
}

impl Command {
    fn effective(command: Option<Command>) -> Command {
        command.unwrap_or(Command::Show {
            filter: None,
            all_accounts: false,
        })
    }
}

pub fn rotation_target(order: Option<usize>) -> RotationTarget {
    order.map_or(RotationTarget::Next, RotationTarget::Order)
}

pub async fn run(cli: Cli) -> ExitCode {
    let store = match FileCredentialStore::discover() {
        Ok(store) => store,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    let settings_path = cli
        .config
        .clone()
        .unwrap_or_else(|| store.paths().settings_file.clone());
    let settings = match settings::read_from(&settings_path) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let log_dir = cli
        .log_dir
        .clone()
        .unwrap_or_else(|| store.paths().app_data_dir.join("logs"));
    let _guard = logging::init(&settings.log_level, Some(&log_dir));
    logging::install_panic_hook();

    let store: Arc<dyn CredentialStore> = Arc::new(store);
    let command = Command::effective(cli.command);
    tracing::debug!(?command, settings = %settings_path.display(), "aio-usage starting");

    match execute(command, store, settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("command failed: {}", err);
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn execute(
    command: Command,
    store: Arc<dyn CredentialStore>,
    settings: UsageSettings,
) -> AppResult<()> {
    let client = reqwest::Client::new();
    match command {
        Command::Show {
            filter,
            all_accounts,
        } => {
            let options = CollectOptions {
                filter: filter.as_deref().and_then(resolve_provider_filter),
                include_all_accounts: all_accounts,
            };
            let snapshots = UsageCollector::new(client)
                .collect_snapshots(store, &settings, &options)
                .await?;
            let out = serde_json::to_string_pretty(&snapshots)
                .map_err(|e| format!("SYSTEM_ERROR: failed to encode snapshots: {e}"))?;
            println!("{out}");
        }
        Command::Login => {
            let flow = DeviceFlow::github_copilot(client);
            login_with_device_flow(&flow, store, |session| {
                println!(
                    "Open {} and enter code {}",
                    session.verification_uri, session.user_code
                );
            })
            .await?;
            println!("GitHub Copilot authorized; saved as '{COPILOT_LOGIN_LABEL}'.");
        }
        Command::Rotate { order } => {
            let refresher = HttpCodexRefresher::new(client, TokenEndpoint::codex());
            let selection =
                rotate_codex_account(store, &refresher, rotation_target(order)).await?;
            let summary = serde_json::json!({
                "selected": selection.selected.label,
                "selectedOrder": selection.selected_order,
                "previous": selection.previous_label,
                "previousOrder": selection.previous_order,
                "total": selection.total,
            });
            println!("{summary:#}");
        }
    }
    Ok(())
}
