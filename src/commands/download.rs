// download.rs - "Download media" Message Command
// Right-click a message → Apps → Download media. The bot finds the first link in that
// message, asks yt-dlp what it points at, and streams the file back as an attachment.
//
// Flow for one interaction:
//   Received → Validated → Deferred → Resolving → Downloading → Relaying → Done
// Any failure after validation ends the interaction with exactly one error follow-up.
//
// Used by: main.rs (command registration and interaction dispatch)

use std::fmt;

use log::{error, info, warn};
use serde_json::{json, Value};
use serenity::http::Http;
use serenity::model::application::interaction::application_command::{
    ApplicationCommandInteraction, ResolvedTarget,
};

use crate::config::BotConfig;
use crate::error::{BotError, BotResult};
use crate::platform::Responder;
use crate::relay::relay;
use crate::url::find_media_url;
use crate::ytdlp::{resolve_media_info, start_download};

pub const DOWNLOAD_MEDIA_COMMAND: &str = "Download media";

pub const NO_MEDIA_FOUND: &str = "No media found";
const MEDIA_INFO_ERROR: &str = "Error while reading media info";
const DOWNLOAD_ERROR: &str = "Error while downloading media";

// Discord rejects message content above this many characters.
const MAX_MESSAGE_CHARS: usize = 2000;

// Discord API enum values for message commands available everywhere.
const COMMAND_TYPE_MESSAGE: u8 = 3;
const CONTEXT_GUILD: u8 = 0;
const CONTEXT_BOT_DM: u8 = 1;
const CONTEXT_PRIVATE_CHANNEL: u8 = 2;
const INSTALL_GUILD: u8 = 0;
const INSTALL_USER: u8 = 1;

// ============================================================================
// REGISTRATION
// ============================================================================

fn command_definitions() -> Value {
    json!([{
        "name": DOWNLOAD_MEDIA_COMMAND,
        "type": COMMAND_TYPE_MESSAGE,
        "contexts": [CONTEXT_GUILD, CONTEXT_BOT_DM, CONTEXT_PRIVATE_CHANNEL],
        "integration_types": [INSTALL_GUILD, INSTALL_USER],
    }])
}

/// Overwrite the bot's global commands with the single "Download media" command.
pub async fn register_commands(http: &Http) -> BotResult<()> {
    let commands = http.create_global_application_commands(&command_definitions()).await?;
    info!("✅ Registered {} application command(s) with Discord", commands.len());
    Ok(())
}

// ============================================================================
// DISPATCH
// ============================================================================

pub fn is_download_command(name: &str) -> bool {
    name == DOWNLOAD_MEDIA_COMMAND
}

/// Text of the message the command was invoked on.
pub fn target_message_content(command: &ApplicationCommandInteraction) -> String {
    match command.data.target() {
        Some(ResolvedTarget::Message(message)) => message.content,
        _ => String::new(),
    }
}

/// Where an invocation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Deferred,
    Resolving,
    Downloading,
    Relaying,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Deferred => "defer",
            Stage::Resolving => "resolve",
            Stage::Downloading => "download",
            Stage::Relaying => "relay",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// No URL in the message; the user got an ephemeral notice.
    NoMedia,
    /// The file was uploaded under this name.
    Delivered(String),
    Failed(Stage),
}

/// Run the whole pipeline for one interaction whose target message reads `content`.
pub async fn handle_download(
    config: &BotConfig,
    responder: &dyn Responder,
    content: &str,
) -> Outcome {
    let url = match find_media_url(content) {
        Some(url) => url,
        None => {
            info!("🔎 No media URL in target message");
            if let Err(e) = responder.reply_ephemeral(NO_MEDIA_FOUND).await {
                warn!("⚠️ Failed to send '{}' reply: {}", NO_MEDIA_FOUND, e);
            }
            return Outcome::NoMedia;
        }
    };

    info!("📥 Download requested for {}", url);

    // yt-dlp easily takes longer than the initial response window.
    if let Err(e) = responder.defer().await {
        error!("❌ Failed to defer interaction: {}", e);
        return Outcome::Failed(Stage::Deferred);
    }

    let info = match resolve_media_info(config, url).await {
        Ok(info) => info,
        Err(e) => return report_failure(responder, Stage::Resolving, MEDIA_INFO_ERROR, &e).await,
    };

    let process = match start_download(config, url) {
        Ok(process) => process,
        Err(e) => return report_failure(responder, Stage::Downloading, DOWNLOAD_ERROR, &e).await,
    };

    // Dropping the relay future on timeout drops the stream, which kills the process.
    let relayed = relay(responder, &info, process.into_stream());
    match tokio::time::timeout(config.download_timeout, relayed).await {
        Ok(Ok(filename)) => Outcome::Delivered(filename),
        Ok(Err(e)) => report_failure(responder, Stage::Relaying, DOWNLOAD_ERROR, &e).await,
        Err(_) => {
            let e = BotError::Timeout(config.download_timeout);
            report_failure(responder, Stage::Relaying, DOWNLOAD_ERROR, &e).await
        }
    }
}

async fn report_failure(
    responder: &dyn Responder,
    stage: Stage,
    heading: &str,
    cause: &BotError,
) -> Outcome {
    warn!("❌ Media {} failed: {}", stage, cause);

    let message = truncate_message(&format!("{}\n{}", heading, cause));
    if let Err(e) = responder.follow_up(&message).await {
        // Usually the interaction token expired while the tool was running.
        error!("❌ Could not report {} failure to user: {}", stage, e);
    }
    Outcome::Failed(stage)
}

fn truncate_message(text: &str) -> String {
    if text.chars().count() <= MAX_MESSAGE_CHARS {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(MAX_MESSAGE_CHARS - 1).collect();
    truncated.push('…');
    truncated
}
