//! RelayBot - Discord channel relay bot
//!
//! Connects to the Discord gateway and serves the `relay` command, which
//! mirrors a source channel into a target channel through a webhook.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use relaybot::{
    config::ConfigManager,
    discord::{DiscordClient, GatewayClient},
    metrics::{Metrics, MetricsServer},
    shutdown::ShutdownAwareTask,
    CommandDispatcher, RelayController, ShutdownCoordinator,
};

/// CLI arguments for RelayBot
#[derive(Parser, Debug)]
#[command(name = "relaybot")]
#[command(about = "RelayBot - Discord channel relay bot")]
#[command(version)]
#[command(long_about = "
RelayBot - Discord channel relay bot

Mirrors messages from one channel into another through a webhook.
Administrators start a relay with `?relay <source-channel-id> <target-channel-id>`
and stop it from the target channel with `?relay stop`.

Configuration priority (highest to lowest):
1. Command-line arguments
2. Environment variables
3. Configuration file
4. Built-in defaults

Environment variables:
  RELAYBOT_TOKEN         - Discord bot token
  RELAYBOT_PREFIX        - Command prefix (default: ?)
  RELAYBOT_COOLDOWN      - Per-user command cooldown (e.g. 3s)
  RELAYBOT_WEBHOOK_NAME  - Name of webhooks the bot creates
  RELAYBOT_METRICS_ADDR  - Enable the metrics endpoint on this address
")]
pub struct CliArgs {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "relaybot.toml",
        help = "Path to configuration file"
    )]
    pub config: PathBuf,

    /// Bot token (overrides config file and environment)
    #[arg(long, help = "Discord bot token")]
    pub token: Option<String>,

    /// Command prefix (overrides config file and environment)
    #[arg(long, help = "Command prefix")]
    pub prefix: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", help = "Log level")]
    pub log_level: String,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration and exit")]
    pub validate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    init_tracing(&args)?;

    info!("Starting RelayBot v{}", env!("CARGO_PKG_VERSION"));

    let mut config = ConfigManager::load_from_file(&args.config)?;

    config.merge_with_cli_args(args.token.as_deref(), args.prefix.as_deref());

    config
        .validate()
        .context("Final configuration validation failed")?;

    if args.validate_config {
        info!("Configuration is valid");
        info!("  API base: {}", config.discord.api_base);
        info!("  Command prefix: {}", config.bot.command_prefix);
        info!("  Command cooldown: {:?}", config.bot.command_cooldown);
        info!("  Webhook name: {}", config.bot.webhook_name);
        info!(
            "  Metrics: {}",
            if config.monitoring.enabled {
                config.monitoring.metrics_addr.to_string()
            } else {
                "disabled".to_string()
            }
        );
        return Ok(());
    }

    let shutdown_coordinator = ShutdownCoordinator::new(config.bot.shutdown_timeout);
    let metrics = Arc::new(Metrics::new());

    let client = Arc::new(
        DiscordClient::new(&config.discord).context("Failed to build Discord client")?,
    );

    let controller = Arc::new(RelayController::new(
        client.clone(),
        config.bot.webhook_name.clone(),
        metrics.clone(),
    ));

    let dispatcher = Arc::new(CommandDispatcher::new(
        client.clone(),
        controller.clone(),
        metrics.clone(),
        config.bot.command_prefix.clone(),
        config.bot.command_cooldown,
    ));

    let metrics_task = if config.monitoring.enabled {
        let server = MetricsServer::new(metrics.clone(), config.monitoring.metrics_addr);
        Some(ShutdownAwareTask::spawn(
            &shutdown_coordinator,
            "metrics_server",
            |mut shutdown_rx| async move {
                tokio::select! {
                    result = server.start() => {
                        if let Err(e) = result {
                            error!("Metrics server error: {}", e);
                        }
                    }
                    _ = shutdown_rx.recv() => {}
                }
            },
        ))
    } else {
        info!("Metrics endpoint disabled");
        None
    };

    let (events_tx, mut events_rx) = tokio::sync::mpsc::channel(256);

    let gateway = GatewayClient::new(
        client.clone(),
        config.discord.gateway_intents,
        config.discord.reconnect_delay,
    );
    let gateway_shutdown = shutdown_coordinator.subscribe();
    let gateway_handle = tokio::spawn(async move {
        if let Err(e) = gateway.run(events_tx, gateway_shutdown).await {
            error!("Gateway error: {}", e);
        }
    });

    let dispatch_handle = tokio::spawn(async move {
        while let Some(message) = events_rx.recv().await {
            if !dispatcher.is_command(&message) {
                continue;
            }
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                dispatcher.handle(&message).await;
            });
        }
    });

    info!("RelayBot started; press Ctrl+C or send SIGTERM/SIGINT to shut down");

    if let Err(e) = shutdown_coordinator.listen_for_signals().await {
        error!("Error setting up signal handlers: {}", e);
        shutdown_coordinator.trigger();
    }

    info!("Initiating graceful shutdown...");

    if let Err(e) = gateway_handle.await {
        if !e.is_cancelled() {
            error!("Gateway task failed: {}", e);
        }
    }

    if let Err(e) = dispatch_handle.await {
        warn!("Dispatch task ended abnormally: {}", e);
    }

    shutdown_coordinator.shutdown_relays(&controller).await?;

    if let Some(task) = metrics_task {
        task.wait_for_completion_or_shutdown().await?;
        info!("Metrics server shutdown");
    }

    info!("RelayBot shutdown complete");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(args: &CliArgs) -> Result<()> {
    let log_level = if args.verbose {
        "debug"
    } else {
        &args.log_level
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true),
        )
        .with(env_filter)
        .init();

    Ok(())
}
