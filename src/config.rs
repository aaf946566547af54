// config.rs - Bot Configuration
// Loads the bot token and media tool settings once at startup, either from a JSON
// file given on the command line or from environment variables.
//
// Recognised keys (file keys and environment variable names are the same):
// - DISCORD_BOT_TOKEN       (required)
// - YTDLP_PATH              (required)
// - FORMAT_SORT             (optional, default "res:720,filesize~20M")
// - PROBE_TIMEOUT_SECS      (optional, default 60)
// - DOWNLOAD_TIMEOUT_SECS   (optional, default 600)

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info};
use serde::Deserialize;

use crate::error::{BotError, BotResult};

pub const TOKEN_KEY: &str = "DISCORD_BOT_TOKEN";
pub const YTDLP_PATH_KEY: &str = "YTDLP_PATH";
pub const FORMAT_SORT_KEY: &str = "FORMAT_SORT";
pub const PROBE_TIMEOUT_KEY: &str = "PROBE_TIMEOUT_SECS";
pub const DOWNLOAD_TIMEOUT_KEY: &str = "DOWNLOAD_TIMEOUT_SECS";

/// Prefer at most 720p and a file size close to 20MB.
pub const DEFAULT_FORMAT_SORT: &str = "res:720,filesize~20M";
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

const TOKEN_PLACEHOLDER: &str = "YOUR_BOT_TOKEN_HERE";

/// Process-wide settings. Built once in `main` and shared read-only.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub token: String,
    pub ytdlp_path: PathBuf,
    pub format_sort: String,
    pub probe_timeout: Duration,
    pub download_timeout: Duration,
}

impl BotConfig {
    /// Settings for a tool path with every optional value at its default.
    pub fn new(token: impl Into<String>, ytdlp_path: impl Into<PathBuf>) -> Self {
        Self {
            token: token.into(),
            ytdlp_path: ytdlp_path.into(),
            format_sort: DEFAULT_FORMAT_SORT.to_string(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
        }
    }
}

// On-disk shape. Everything is optional here so validation can name the missing key.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(rename = "DISCORD_BOT_TOKEN")]
    token: Option<String>,
    #[serde(rename = "YTDLP_PATH")]
    ytdlp_path: Option<String>,
    #[serde(rename = "FORMAT_SORT")]
    format_sort: Option<String>,
    #[serde(rename = "PROBE_TIMEOUT_SECS")]
    probe_timeout_secs: Option<u64>,
    #[serde(rename = "DOWNLOAD_TIMEOUT_SECS")]
    download_timeout_secs: Option<u64>,
}

impl RawConfig {
    fn into_config(self) -> BotResult<BotConfig> {
        let token = non_empty(self.token).ok_or(BotError::MissingSetting(TOKEN_KEY))?;
        if token == TOKEN_PLACEHOLDER {
            return Err(BotError::InvalidSetting {
                key: TOKEN_KEY,
                value: token,
            });
        }

        let ytdlp_path =
            non_empty(self.ytdlp_path).ok_or(BotError::MissingSetting(YTDLP_PATH_KEY))?;
        let format_sort =
            non_empty(self.format_sort).unwrap_or_else(|| DEFAULT_FORMAT_SORT.to_string());

        Ok(BotConfig {
            token,
            ytdlp_path: PathBuf::from(ytdlp_path),
            format_sort,
            probe_timeout: seconds(
                PROBE_TIMEOUT_KEY,
                self.probe_timeout_secs,
                DEFAULT_PROBE_TIMEOUT,
            )?,
            download_timeout: seconds(
                DOWNLOAD_TIMEOUT_KEY,
                self.download_timeout_secs,
                DEFAULT_DOWNLOAD_TIMEOUT,
            )?,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn seconds(key: &'static str, value: Option<u64>, default: Duration) -> BotResult<Duration> {
    match value {
        None => Ok(default),
        Some(0) => Err(BotError::InvalidSetting {
            key,
            value: "0".to_string(),
        }),
        Some(secs) => Ok(Duration::from_secs(secs)),
    }
}

/// Load configuration from `path` when given, otherwise from the environment.
pub fn load_config(path: Option<&Path>) -> BotResult<BotConfig> {
    match path {
        Some(path) => {
            let config = load_config_file(path)?;
            info!("✅ Configuration loaded from {}", path.display());
            Ok(config)
        }
        None => {
            let config = config_from_lookup(|key| env::var(key).ok())?;
            info!("✅ Configuration loaded from environment");
            Ok(config)
        }
    }
}

fn load_config_file(path: &Path) -> BotResult<BotConfig> {
    let content = fs::read_to_string(path).map_err(|source| BotError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;

    // Remove BOM if present
    let content = content.strip_prefix('\u{feff}').unwrap_or(&content);

    let raw: RawConfig = serde_json::from_str(content).map_err(|source| BotError::ConfigParse {
        path: path.to_path_buf(),
        source,
    })?;
    raw.into_config()
}

/// Build the configuration from a key lookup, normally `std::env::var`.
fn config_from_lookup<F>(lookup: F) -> BotResult<BotConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let parse_secs = |key: &'static str| -> BotResult<Option<u64>> {
        match non_empty(lookup(key)) {
            None => Ok(None),
            Some(value) => value
                .parse::<u64>()
                .map(Some)
                .map_err(|_| BotError::InvalidSetting { key, value }),
        }
    };

    let raw = RawConfig {
        token: lookup(TOKEN_KEY),
        ytdlp_path: lookup(YTDLP_PATH_KEY),
        format_sort: lookup(FORMAT_SORT_KEY),
        probe_timeout_secs: parse_secs(PROBE_TIMEOUT_KEY)?,
        download_timeout_secs: parse_secs(DOWNLOAD_TIMEOUT_KEY)?,
    };
    debug!("🔧 Read configuration keys from environment");
    raw.into_config()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_file_config_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"DISCORD_BOT_TOKEN": "abc", "YTDLP_PATH": "/usr/bin/yt-dlp"}}"#).unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.token, "abc");
        assert_eq!(config.ytdlp_path, PathBuf::from("/usr/bin/yt-dlp"));
        assert_eq!(config.format_sort, DEFAULT_FORMAT_SORT);
        assert_eq!(config.probe_timeout, DEFAULT_PROBE_TIMEOUT);
        assert_eq!(config.download_timeout, DEFAULT_DOWNLOAD_TIMEOUT);
    }

    #[test]
    fn test_file_config_with_bom_and_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let json = r#"{
            "DISCORD_BOT_TOKEN": "abc",
            "YTDLP_PATH": "yt-dlp",
            "FORMAT_SORT": "res:480",
            "PROBE_TIMEOUT_SECS": 5,
            "DOWNLOAD_TIMEOUT_SECS": 30
        }"#;
        write!(file, "\u{feff}{}", json).unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.format_sort, "res:480");
        assert_eq!(config.probe_timeout, Duration::from_secs(5));
        assert_eq!(config.download_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_file_config_missing_file() {
        let err = load_config(Some(Path::new("/definitely/not/here.json"))).unwrap_err();
        assert!(matches!(err, BotError::ConfigRead { .. }));
    }

    #[test]
    fn test_file_config_invalid_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "DISCORD_BOT_TOKEN=abc").unwrap();

        let err = load_config(Some(file.path())).unwrap_err();
        assert!(matches!(err, BotError::ConfigParse { .. }));
    }

    #[test]
    fn test_env_config() {
        let config = config_from_lookup(lookup_from(&[
            (TOKEN_KEY, "token"),
            (YTDLP_PATH_KEY, "/opt/yt-dlp"),
            (DOWNLOAD_TIMEOUT_KEY, "120"),
        ]))
        .unwrap();
        assert_eq!(config.token, "token");
        assert_eq!(config.ytdlp_path, PathBuf::from("/opt/yt-dlp"));
        assert_eq!(config.download_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_env_config_missing_token() {
        let err = config_from_lookup(lookup_from(&[(YTDLP_PATH_KEY, "yt-dlp")])).unwrap_err();
        assert!(matches!(err, BotError::MissingSetting(TOKEN_KEY)));
    }

    #[test]
    fn test_env_config_missing_tool_path() {
        let lookup = lookup_from(&[(TOKEN_KEY, "token"), (YTDLP_PATH_KEY, "  ")]);
        let err = config_from_lookup(lookup).unwrap_err();
        assert!(matches!(err, BotError::MissingSetting(YTDLP_PATH_KEY)));
    }

    #[test]
    fn test_placeholder_token_rejected() {
        let lookup = lookup_from(&[(TOKEN_KEY, TOKEN_PLACEHOLDER), (YTDLP_PATH_KEY, "yt-dlp")]);
        let err = config_from_lookup(lookup).unwrap_err();
        assert!(matches!(err, BotError::InvalidSetting { key: TOKEN_KEY, .. }));
    }

    #[test]
    fn test_bad_timeouts_rejected() {
        let err = config_from_lookup(lookup_from(&[
            (TOKEN_KEY, "token"),
            (YTDLP_PATH_KEY, "yt-dlp"),
            (PROBE_TIMEOUT_KEY, "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, BotError::InvalidSetting { key: PROBE_TIMEOUT_KEY, .. }));

        let err = config_from_lookup(lookup_from(&[
            (TOKEN_KEY, "token"),
            (YTDLP_PATH_KEY, "yt-dlp"),
            (PROBE_TIMEOUT_KEY, "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, BotError::InvalidSetting { key: PROBE_TIMEOUT_KEY, .. }));
    }
}
