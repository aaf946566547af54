// error.rs - Error Types
// Every failure the bot can hit, from startup configuration to a rejected upload.
// The dispatcher turns these into the text shown to users.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BotError {
    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0} is not set")]
    MissingSetting(&'static str),

    #[error("invalid value for {key}: '{value}'")]
    InvalidSetting { key: &'static str, value: String },

    /// The media tool could not be started at all (missing binary, permissions).
    #[error("failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: io::Error,
    },

    /// The media tool ran but exited unsuccessfully. Carries its output.
    #[error("{0}")]
    ToolFailed(String),

    #[error("could not parse media info: {0}")]
    InvalidMediaInfo(#[source] serde_json::Error),

    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("the download produced no data")]
    EmptyDownload,

    #[error("{0}")]
    Download(#[source] io::Error),

    #[error("Discord error: {0}")]
    Discord(#[from] serenity::Error),

    /// Transport failure while posting an attachment. Built from errors with the URL stripped,
    /// since the webhook path carries the interaction token.
    #[error("upload failed: {0}")]
    Upload(#[from] reqwest::Error),

    #[error("Discord rejected the upload ({0})")]
    UploadRejected(reqwest::StatusCode),
}

pub type BotResult<T> = Result<T, BotError>;
