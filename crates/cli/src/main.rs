mod config_commands;
mod db_commands;

use std::{path::PathBuf, sync::Arc};

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    relaydesk_channels::OperatorSet,
    relaydesk_common::OperatorId,
    relaydesk_config::RelayConfig,
    relaydesk_relay::{CleanupScheduler, RelayEngine, RelaySettings},
    relaydesk_sessions::SqliteHistory,
    relaydesk_telegram::TelegramOutbound,
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "relaydesk", about = "Relaydesk: support relay bot", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery in ./ and the user config dir).
    #[arg(long, global = true, env = "RELAYDESK_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay bot (default when no subcommand is provided).
    Run,
    /// Validate the configuration and report errors/warnings.
    CheckConfig {
        /// Show informational diagnostics in addition to errors and warnings.
        #[arg(long)]
        verbose: bool,
    },
    /// Print row counts from the history database.
    Stats,
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

fn operator_set(config: &RelayConfig) -> OperatorSet {
    OperatorSet::new(
        config.operators.owner_id.map(OperatorId),
        config.operators.all_ids().into_iter().map(OperatorId),
    )
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let (config, result) = config_commands::validate(cli.config.as_deref())?;
    config_commands::print_diagnostics(&result, false);
    if result.has_errors() {
        anyhow::bail!("configuration is invalid; run `relaydesk check-config` for details");
    }
    let (Some(token), Some(settings)) = (
        config.telegram.token.as_ref(),
        RelaySettings::from_config(&config),
    ) else {
        anyhow::bail!("telegram token and shared chat are required");
    };

    let history = SqliteHistory::connect(&config.storage.database_url)
        .await
        .with_context(|| {
            format!(
                "failed to open history database {}",
                config.storage.database_url
            )
        })?;

    let operators = operator_set(&config);
    info!(
        operators = operators.len(),
        shared_chat = %settings.shared_chat,
        "relay configured"
    );

    let bot = relaydesk_telegram::build_bot(token)?;
    let sink = Arc::new(TelegramOutbound::new(bot.clone()));
    let engine = Arc::new(RelayEngine::new(
        sink,
        operators,
        Arc::new(history),
        settings,
    ));

    let scheduler = CleanupScheduler::new(Arc::clone(&engine), config.cleanup.interval());
    scheduler.start();

    let polling = match relaydesk_telegram::start_polling(bot, Arc::clone(&engine)).await {
        Ok(polling) => polling,
        Err(e) => {
            scheduler.stop().await;
            return Err(e).context("failed to start telegram polling");
        },
    };
    let stopped = polling.cancel_token();

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "failed to listen for shutdown signal");
            }
            info!("shutdown requested");
        },
        () = stopped.cancelled() => {
            warn!("telegram polling stopped on its own; shutting down");
        },
    }

    polling.shutdown().await;
    scheduler.stop().await;
    info!("relaydesk stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    match cli.command {
        None | Some(Commands::Run) => {
            info!(version = env!("CARGO_PKG_VERSION"), "relaydesk starting");
            run(&cli).await
        },
        Some(Commands::CheckConfig { verbose }) => {
            config_commands::check(cli.config.as_deref(), verbose)
        },
        Some(Commands::Stats) => {
            let (config, _) = config_commands::load(cli.config.as_deref())?;
            db_commands::stats(&config).await
        },
    }
}
