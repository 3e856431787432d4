mod config_commands;
mod fetch_commands;
mod serve_commands;

use std::{path::PathBuf, sync::Arc};

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    linkfetch_config::LinkfetchConfig,
    linkfetch_media::{ExecutionBridge, Orchestrator, YtDlp},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "linkfetch", about = "linkfetch: send a link, get the file")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery of linkfetch.{toml,yaml,json}).
    #[arg(long, global = true, env = "LINKFETCH_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the Telegram bot (default when no subcommand is provided).
    Serve,
    /// Retrieve one URL locally, without Telegram.
    Fetch {
        url: String,
        /// Keep the retrieved file instead of deleting it.
        #[arg(long)]
        keep: bool,
    },
    /// Validate the configuration and report errors/warnings.
    CheckConfig {
        /// Show informational diagnostics in addition to errors and warnings.
        #[arg(long)]
        verbose: bool,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Wire the retrieval pipeline and make sure the downloads directory exists.
async fn build_orchestrator(config: &LinkfetchConfig) -> anyhow::Result<Arc<Orchestrator>> {
    let bridge = ExecutionBridge::new(config.downloads.workers);
    let extractor = Arc::new(YtDlp::new(config.extractor.binary.clone()));
    let orchestrator = Orchestrator::from_config(config, bridge, extractor)?;
    orchestrator
        .janitor()
        .store()
        .ensure_dir()
        .await
        .with_context(|| {
            format!(
                "creating downloads directory {}",
                config.downloads.dir.display()
            )
        })?;
    Ok(Arc::new(orchestrator))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "linkfetch starting");

    let config = linkfetch_config::discover_and_load(cli.config.as_deref())?;

    match cli.command {
        None | Some(Commands::Serve) => {
            let orchestrator = build_orchestrator(&config).await?;
            serve_commands::serve(&config, orchestrator).await
        },
        Some(Commands::Fetch { url, keep }) => {
            let orchestrator = build_orchestrator(&config).await?;
            fetch_commands::fetch(&config, &orchestrator, &url, keep).await
        },
        Some(Commands::CheckConfig { verbose }) => {
            config_commands::check(&config, cli.config.as_deref(), verbose)
        },
    }
}
