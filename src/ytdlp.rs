// ytdlp.rs - External Media Tool
// Runs the configured yt-dlp binary in two modes:
// - probe: `-J` prints a JSON description of the media, buffered and parsed into MediaInfo
// - fetch: `-o -` writes the media itself to stdout, exposed here as a live byte stream
//
// Both invocations share the same format sort so the probe describes the file the fetch delivers.

use std::collections::VecDeque;
use std::io;
use std::process::{ExitStatus, Stdio};

use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};
use log::{debug, error, warn};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::LinesStream;
use tokio_util::io::ReaderStream;

use crate::config::BotConfig;
use crate::error::{BotError, BotResult};

/// Live media bytes. Ends when the tool exits; a failed exit shows up as a final error.
pub type MediaStream = BoxStream<'static, io::Result<Bytes>>;

const STREAM_CHUNK_SIZE: usize = 64 * 1024;
const STDERR_TAIL_LINES: usize = 20;

// ============================================================================
// MEDIA INFO
// ============================================================================

/// What the probe tells us about the media. Missing fields are left empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaInfo {
    pub display_id: String,
    pub ext: String,
}

// yt-dlp writes `null` for fields an extractor could not fill in.
#[derive(Deserialize)]
struct RawMediaInfo {
    #[serde(default)]
    display_id: Option<String>,
    #[serde(default)]
    ext: Option<String>,
}

impl MediaInfo {
    pub fn new(display_id: impl Into<String>, ext: impl Into<String>) -> Self {
        Self {
            display_id: display_id.into(),
            ext: normalize_extension(&ext.into()),
        }
    }

    /// Parse the probe output. The extension comes back already normalized.
    pub fn from_json(data: &[u8]) -> BotResult<Self> {
        let raw: RawMediaInfo =
            serde_json::from_slice(data).map_err(BotError::InvalidMediaInfo)?;
        Ok(Self::new(
            raw.display_id.unwrap_or_default(),
            raw.ext.unwrap_or_default(),
        ))
    }
}

/// Discord clients decide how to play a file from its suffix, and they know `ogg`, not `opus`.
pub fn normalize_extension(ext: &str) -> String {
    match ext {
        "opus" => "ogg".to_string(),
        other => other.to_string(),
    }
}

// ============================================================================
// PROBE
// ============================================================================

fn probe_args<'a>(config: &'a BotConfig, url: &'a str) -> Vec<&'a str> {
    vec!["-J", "--no-playlist", "-S", config.format_sort.as_str(), url]
}

fn fetch_args<'a>(config: &'a BotConfig, url: &'a str) -> Vec<&'a str> {
    vec!["-o", "-", "--no-playlist", "-S", config.format_sort.as_str(), url]
}

fn tool_name(config: &BotConfig) -> String {
    config.ytdlp_path.display().to_string()
}

/// Ask the tool for the media's metadata and wait for it to finish.
pub async fn resolve_media_info(config: &BotConfig, url: &str) -> BotResult<MediaInfo> {
    debug!("🔍 Probing media info for {}", url);

    let mut command = Command::new(&config.ytdlp_path);
    command
        .args(probe_args(config, url))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(config.probe_timeout, command.output()).await {
        Ok(result) => result.map_err(|source| {
            error!("❌ Could not start {}: {}", tool_name(config), source);
            BotError::Spawn {
                tool: tool_name(config),
                source,
            }
        })?,
        Err(_) => {
            warn!("⏱️ Media probe for {} timed out after {:?}", url, config.probe_timeout);
            return Err(BotError::Timeout(config.probe_timeout));
        }
    };

    if !output.status.success() {
        let combined = combined_output(&output.stderr, &output.stdout);
        warn!("❌ Media probe for {} failed ({}): {}", url, output.status, combined);
        return Err(BotError::ToolFailed(if combined.is_empty() {
            format!("{} exited with {}", tool_name(config), output.status)
        } else {
            combined
        }));
    }

    MediaInfo::from_json(&output.stdout).map_err(|e| {
        debug!("Unparseable probe output: {}", String::from_utf8_lossy(&output.stdout));
        e
    })
}

fn combined_output(stderr: &[u8], stdout: &[u8]) -> String {
    let stderr = String::from_utf8_lossy(stderr);
    let stdout = String::from_utf8_lossy(stdout);
    [stderr.trim(), stdout.trim()]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// FETCH
// ============================================================================

/// A running fetch. Owns the child and both of its output pipes.
pub struct DownloadProcess {
    child: Child,
    stdout: ChildStdout,
    stderr_tail: JoinHandle<String>,
}

/// Start the tool in fetch mode. Returns as soon as the process is running.
pub fn start_download(config: &BotConfig, url: &str) -> BotResult<DownloadProcess> {
    debug!("⬇️ Starting download of {}", url);

    let spawn_error = |source| BotError::Spawn {
        tool: tool_name(config),
        source,
    };

    let mut child = Command::new(&config.ytdlp_path)
        .args(fetch_args(config, url))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| {
            error!("❌ Could not start {}: {}", tool_name(config), source);
            spawn_error(source)
        })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| {
            spawn_error(io::Error::new(io::ErrorKind::BrokenPipe, "stdout was not captured"))
        })?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| {
            spawn_error(io::Error::new(io::ErrorKind::BrokenPipe, "stderr was not captured"))
        })?;

    Ok(DownloadProcess {
        child,
        stdout,
        stderr_tail: tokio::spawn(drain_stderr(stderr)),
    })
}

// Must keep reading, or the tool blocks once the pipe buffer fills.
async fn drain_stderr(stderr: ChildStderr) -> String {
    let mut lines = LinesStream::new(BufReader::new(stderr).lines());
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);

    while let Some(line) = lines.next().await {
        match line {
            Ok(line) => {
                debug!("yt-dlp stderr: {}", line);
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Err(e) => {
                warn!("⚠️ Stopped reading yt-dlp stderr: {}", e);
                break;
            }
        }
    }

    tail.into_iter().collect::<Vec<_>>().join("\n")
}

struct StreamState {
    reader: ReaderStream<ChildStdout>,
    child: Child,
    stderr_tail: JoinHandle<String>,
}

impl StreamState {
    // Reap the process once stdout is exhausted.
    async fn finish(mut self) -> io::Result<()> {
        let status = self.child.wait().await?;
        let diagnostics = self.stderr_tail.await.unwrap_or_default();
        check_exit(status, &diagnostics)
    }
}

fn check_exit(status: ExitStatus, diagnostics: &str) -> io::Result<()> {
    if status.success() {
        debug!("✅ Download process finished");
        return Ok(());
    }

    warn!("❌ Download process exited with {}", status);
    let message = if diagnostics.trim().is_empty() {
        format!("yt-dlp exited with {}", status)
    } else {
        format!("yt-dlp exited with {}\n{}", status, diagnostics.trim())
    };
    Err(io::Error::new(io::ErrorKind::Other, message))
}

impl DownloadProcess {
    /// Turn the process into its stdout stream.
    ///
    /// Dropping the stream early kills the process.
    pub fn into_stream(self) -> MediaStream {
        let state = StreamState {
            reader: ReaderStream::with_capacity(self.stdout, STREAM_CHUNK_SIZE),
            child: self.child,
            stderr_tail: self.stderr_tail,
        };

        stream::unfold(Some(state), |state| async move {
            let mut state = state?;
            match state.reader.next().await {
                Some(Ok(chunk)) => Some((Ok(chunk), Some(state))),
                Some(Err(e)) => Some((Err(e), None)),
                None => match state.finish().await {
                    Ok(()) => None,
                    Err(e) => Some((Err(e), None)),
                },
            }
        })
        .boxed()
    }
}
