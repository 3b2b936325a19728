//! Modloader host bridge: entry point.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use modloader::watch::DEBOUNCE;
use modloader::{LogDialogs, StyleWatcher};
use modloader_host::config::HostPaths;
use modloader_host::outbound::Outbound;
use modloader_host::protocol::ProtocolHandler;
use modloader_host::session::HostSession;
use modloader_host::transport::StdioTransport;
use modloader_host::types::InitializeResult;

#[derive(Parser)]
#[command(
    name = "modloader-host",
    about = "Keeps mod assets in sync and serves them to the host application over stdio",
    version
)]
struct Cli {
    /// Path to the JSON config file.
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Asset directory.
    #[arg(long, global = true)]
    assets: Option<String>,

    /// Directory of patch declaration files (*.json).
    #[arg(long, global = true)]
    patches: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the host bridge over stdio (default).
    Serve {
        /// Do not watch the asset directory for stylesheet edits.
        #[arg(long)]
        no_watch: bool,
    },

    /// Garbage-collect and update every declared asset, then print the report.
    Sync,

    /// Print which file holds each script role.
    Classify,

    /// Rewrite a mod bundle so it uses the shared patch list.
    Hijack {
        /// Bundle file to rewrite.
        file: PathBuf,

        /// Write the result here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print server info as JSON.
    Info,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   modloader-host completions bash > ~/.bash_completion.d/modloader-host
    ///   modloader-host completions zsh > ~/.zfunc/_modloader-host
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let paths = HostPaths::resolve(
        cli.config.as_deref(),
        cli.assets.as_deref(),
        cli.patches.as_deref(),
    );

    match cli.command.unwrap_or(Commands::Serve { no_watch: false }) {
        Commands::Serve { no_watch } => {
            let (outbound, notifications) = Outbound::channel();
            let mut session = HostSession::open(&paths, Arc::new(outbound.clone()))?;
            session.start().await?;

            let cancel = CancellationToken::new();
            let watcher = if no_watch {
                None
            } else {
                let (style_tx, style_rx) = mpsc::unbounded_channel();
                tokio::spawn(outbound.forward_styles(style_rx));
                match StyleWatcher::start(session.asset_dir(), DEBOUNCE, cancel.clone(), style_tx) {
                    Ok(watcher) => Some(watcher),
                    Err(e) => {
                        tracing::error!("Stylesheet hot reload disabled: {e}");
                        None
                    }
                }
            };

            let handler = ProtocolHandler::new(Arc::new(Mutex::new(session)));
            let transport = StdioTransport::new(handler).with_notifications(notifications);
            transport.run().await?;

            cancel.cancel();
            if let Some(watcher) = watcher {
                watcher.join().await;
            }
        }

        Commands::Sync => {
            let mut session = HostSession::open(&paths, Arc::new(LogDialogs))?;
            let report = session.resync().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_clean() {
                std::process::exit(1);
            }
        }

        Commands::Classify => {
            let mut session = HostSession::open(&paths, Arc::new(LogDialogs))?;
            let classification = session.classify().await?;
            let scripts = &classification.assets.scripts;
            let name = |slot: &Option<modloader::AssetTuple>| {
                slot.as_ref().map(|a| a.filename().to_string())
            };
            let names = |list: &[modloader::AssetTuple]| {
                list.iter().map(|a| a.filename().to_string()).collect::<Vec<_>>()
            };
            let summary = serde_json::json!({
                "pre": name(&scripts.pre),
                "modBundle": name(&scripts.mod_bundle),
                "post": name(&scripts.post),
                "others": names(&scripts.others),
                "styles": names(&classification.assets.styles),
                "bundleClaimants": classification.bundle_claimants,
                "missing": classification.missing,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        Commands::Hijack { file, output } => {
            let text = std::fs::read_to_string(&file)?;
            match modloader::hijack(&text) {
                Ok(rewritten) => match output {
                    Some(out) => std::fs::write(out, rewritten)?,
                    None => print!("{rewritten}"),
                },
                Err(e) => {
                    eprintln!("Cannot hook {}: {e}", file.display());
                    std::process::exit(1);
                }
            }
        }

        Commands::Info => {
            let init = InitializeResult::default_result();
            let info = serde_json::json!({
                "server": init.server_info,
                "methods": init.methods,
                "notifications": init.notifications,
                "config": paths.config,
                "assets": paths.assets,
                "patches": paths.patches,
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "modloader-host", &mut std::io::stdout());
        }
    }

    Ok(())
}
