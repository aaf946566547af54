mod commands;
mod config;
mod error;
mod platform;
mod relay;
mod url;
mod ytdlp;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use log::{debug, error, info};
use serenity::{
    async_trait,
    client::{Client, Context, EventHandler},
    model::application::interaction::Interaction,
    model::gateway::Ready,
    prelude::GatewayIntents,
};
use tokio::signal;

use crate::commands::download::{
    handle_download, is_download_command, register_commands, target_message_content,
};
use crate::config::{load_config, BotConfig};
use crate::platform::{DiscordResponder, FollowupUploader};

/// Discord bot that turns links into attachments using yt-dlp.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// JSON config file with DISCORD_BOT_TOKEN and YTDLP_PATH.
    /// When omitted, the same names are read from the environment.
    config: Option<PathBuf>,
}

// Event handler implementation
struct Handler {
    config: Arc<BotConfig>,
    uploader: FollowupUploader,
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("✅ Bot connected as {}!", ready.user.name);

        if let Err(e) = register_commands(&ctx.http).await {
            error!("❌ Error while registering commands: {}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Interaction::ApplicationCommand(command) = interaction else {
            return;
        };
        if !is_download_command(&command.data.name) {
            return;
        }

        info!(
            "🎬 '{}' invoked by {} ({})",
            command.data.name, command.user.name, command.user.id
        );

        let content = target_message_content(&command);
        let config = Arc::clone(&self.config);
        let responder = DiscordResponder::new(ctx.http.clone(), self.uploader.clone(), command);

        // Each invocation gets its own task so a slow download never holds up the gateway.
        tokio::spawn(async move {
            let outcome = handle_download(&config, &responder, &content).await;
            debug!("Interaction finished: {:?}", outcome);
        });
    }
}

// Resolves on Ctrl-C, or SIGTERM on unix.
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("❌ Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("❌ Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("📡 Received Ctrl-C"),
        _ = terminate => info!("📡 Received SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logger - must be done before any logging calls
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!("❌ Failed to load configuration: {}", e);
            error!("Pass a JSON config file or set DISCORD_BOT_TOKEN and YTDLP_PATH");
            return ExitCode::FAILURE;
        }
    };
    info!("🔧 Using media tool at {}", config.ytdlp_path.display());

    let handler = Handler {
        config: Arc::clone(&config),
        uploader: FollowupUploader::new(reqwest::Client::new()),
    };

    // Interactions arrive regardless of intents; nothing privileged is needed.
    let intents = GatewayIntents::non_privileged();

    let mut client = match Client::builder(&config.token, intents)
        .event_handler(handler)
        .await
    {
        Ok(client) => client,
        Err(e) => {
            error!("❌ Error while building Discord client: {:?}", e);
            return ExitCode::FAILURE;
        }
    };

    let shard_manager = client.shard_manager.clone();

    info!("🚀 Discord bot is running. Press Ctrl-C to exit.");
    tokio::select! {
        _ = wait_for_shutdown() => {
            info!("⏹️ Stopping bot gracefully...");
            shard_manager.lock().await.shutdown_all().await;
        }
        result = client.start() => {
            if let Err(why) = result {
                error!("❌ Client error: {:?}", why);
                return ExitCode::FAILURE;
            }
        }
    }

    info!("✅ Bot stopped");
    ExitCode::SUCCESS
}
