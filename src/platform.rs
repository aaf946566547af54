// platform.rs - Discord Response Capability
// The download pipeline only ever talks to Discord through the Responder trait:
// an ephemeral reply, a deferred acknowledgement, and follow-ups (text or file).
//
// DiscordResponder implements it for a real interaction. Interaction responses and
// text follow-ups go through serenity; file follow-ups are posted with reqwest so the
// attachment body can be streamed instead of loaded into memory first.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::Stream;
use log::{debug, warn};
use reqwest::multipart::{Form, Part};
use reqwest::Body;
use serde_json::json;
use serenity::http::Http;
use serenity::model::application::interaction::application_command::ApplicationCommandInteraction;
use serenity::model::application::interaction::InteractionResponseType;

use crate::error::{BotError, BotResult};
use crate::ytdlp::MediaStream;

const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

#[async_trait]
pub trait Responder: Send + Sync {
    /// Immediate reply visible only to the invoking user.
    async fn reply_ephemeral(&self, content: &str) -> BotResult<()>;

    /// Acknowledge now, answer later with a follow-up.
    async fn defer(&self) -> BotResult<()>;

    async fn follow_up(&self, content: &str) -> BotResult<()>;

    /// Follow-up carrying a single attachment whose body is read from `body` as it uploads.
    async fn follow_up_file(
        &self,
        filename: &str,
        content_type: &str,
        body: MediaStream,
    ) -> BotResult<()>;
}

// ============================================================================
// ATTACHMENT UPLOADS
// ============================================================================

/// Posts streamed attachments to interaction webhooks.
///
/// Errors never carry the request URL: the webhook path contains the interaction token,
/// and upload errors end up in logs and in the follow-up shown to the user.
#[derive(Clone)]
pub struct FollowupUploader {
    client: reqwest::Client,
    api_base: String,
}

impl FollowupUploader {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_api_base(client, DISCORD_API_BASE)
    }

    pub fn with_api_base(client: reqwest::Client, api_base: impl Into<String>) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    // Interaction webhooks are authorised by the token in the path.
    fn webhook_url(&self, application_id: &str, token: &str) -> String {
        format!("{}/webhooks/{}/{}", self.api_base, application_id, token)
    }

    pub async fn upload(
        &self,
        application_id: &str,
        token: &str,
        filename: &str,
        content_type: &str,
        body: MediaStream,
    ) -> BotResult<()> {
        let payload = json!({
            "attachments": [{ "id": 0, "filename": filename }]
        });

        // No length: reqwest sends the part with chunked encoding as the stream yields.
        let file = Part::stream(Body::wrap_stream(SyncBody(Mutex::new(body))))
            .file_name(filename.to_string())
            .mime_str(content_type)
            .map_err(reqwest::Error::without_url)?;

        let form = Form::new()
            .text("payload_json", payload.to_string())
            .part("files[0]", file);

        let response = self
            .client
            .post(self.webhook_url(application_id, token))
            .multipart(form)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;

        let status = response.status();
        if !status.is_success() {
            // Discord explains the rejection in a JSON body; only the status reaches the user.
            let detail = response.text().await.unwrap_or_default();
            warn!("⚠️ Upload of {} rejected with {}: {}", filename, status, detail);
            return Err(BotError::UploadRejected(status));
        }
        Ok(())
    }
}

// reqwest wants a Sync body. The stream is only polled through `&mut`, so the lock is never
// contended.
struct SyncBody(Mutex<MediaStream>);

impl Stream for SyncBody {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let stream = self.get_mut().0.get_mut().unwrap_or_else(PoisonError::into_inner);
        stream.as_mut().poll_next(cx)
    }
}

// ============================================================================
// LIVE INTERACTIONS
// ============================================================================

/// A live Discord interaction.
pub struct DiscordResponder {
    http: Arc<Http>,
    uploader: FollowupUploader,
    interaction: ApplicationCommandInteraction,
}

impl DiscordResponder {
    pub fn new(
        http: Arc<Http>,
        uploader: FollowupUploader,
        interaction: ApplicationCommandInteraction,
    ) -> Self {
        Self {
            http,
            uploader,
            interaction,
        }
    }
}

#[async_trait]
impl Responder for DiscordResponder {
    async fn reply_ephemeral(&self, content: &str) -> BotResult<()> {
        self.interaction
            .create_interaction_response(&self.http, |response| {
                response
                    .kind(InteractionResponseType::ChannelMessageWithSource)
                    .interaction_response_data(|message| message.content(content).ephemeral(true))
            })
            .await?;
        Ok(())
    }

    async fn defer(&self) -> BotResult<()> {
        self.interaction
            .create_interaction_response(&self.http, |response| {
                response.kind(InteractionResponseType::DeferredChannelMessageWithSource)
            })
            .await?;
        Ok(())
    }

    async fn follow_up(&self, content: &str) -> BotResult<()> {
        self.interaction
            .create_followup_message(&self.http, |followup| followup.content(content))
            .await?;
        Ok(())
    }

    async fn follow_up_file(
        &self,
        filename: &str,
        content_type: &str,
        body: MediaStream,
    ) -> BotResult<()> {
        debug!("📤 Uploading {} to interaction {}", filename, self.interaction.id);
        self.uploader
            .upload(
                &self.interaction.application_id.to_string(),
                &self.interaction.token,
                filename,
                content_type,
                body,
            )
            .await
    }
}
