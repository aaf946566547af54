// relay.rs - Attachment Relay
// Hands the live download stream to Discord as a named attachment.

use futures_util::stream::{self, StreamExt};
use log::info;

use crate::error::{BotError, BotResult};
use crate::platform::Responder;
use crate::ytdlp::{MediaInfo, MediaStream};

const FALLBACK_STEM: &str = "media";

/// `<display_id>.<ext>`, safe to use as an upload filename.
pub fn attachment_name(info: &MediaInfo) -> String {
    let stem: String = info
        .display_id
        .trim()
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();
    let stem = if stem.is_empty() { FALLBACK_STEM } else { stem.as_str() };

    match info.ext.trim() {
        "" => stem.to_string(),
        ext => format!("{}.{}", stem, ext),
    }
}

pub fn content_type(info: &MediaInfo) -> String {
    mime_guess::from_ext(&info.ext).first_or_octet_stream().to_string()
}

/// Upload `media` as a follow-up attachment. Returns the filename used.
///
/// The first chunk is read before anything is posted, so a tool that fails
/// without writing a single byte is reported as an error instead of an empty file.
pub async fn relay(
    responder: &dyn Responder,
    info: &MediaInfo,
    mut media: MediaStream,
) -> BotResult<String> {
    let first = match media.next().await {
        None => return Err(BotError::EmptyDownload),
        Some(Err(e)) => return Err(BotError::Download(e)),
        Some(Ok(chunk)) => chunk,
    };

    let filename = attachment_name(info);
    let body = stream::once(async move { Ok(first) }).chain(media).boxed();

    responder.follow_up_file(&filename, &content_type(info), body).await?;
    info!("📤 Uploaded {}", filename);
    Ok(filename)
}
