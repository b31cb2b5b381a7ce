use anyhow::Result;
use async_trait::async_trait;
use serenity::{
    all::{ActivityData, Context},
    builder::CreateMessage,
    model::id::{ChannelId, GuildId},
};
use tracing::{debug, warn};

use super::{embeds, NowPlaying, Notifier, PlaybackStatus};

/// Notificaciones a través del gateway de Discord
pub struct DiscordNotifier {
    ctx: Context,
}

impl DiscordNotifier {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn now_playing(&self, guild_id: GuildId, notice: &NowPlaying) -> Result<()> {
        // Las entradas de autoplay no tienen canal de texto de origen
        let Some(channel_id) = notice.channel_id else {
            debug!("🎵 [{}] Reproduciendo: {}", guild_id, notice.title);
            return Ok(());
        };

        channel_id
            .send_message(
                &self.ctx.http,
                CreateMessage::new().embed(embeds::create_now_playing_embed(notice)),
            )
            .await?;
        Ok(())
    }

    async fn playback_status(&self, guild_id: GuildId, status: &PlaybackStatus) -> Result<()> {
        match status {
            PlaybackStatus::Playing(title) => {
                self.ctx.set_activity(Some(ActivityData::listening(title.as_str())));
            }
            PlaybackStatus::Paused(title) => {
                self.ctx
                    .set_activity(Some(ActivityData::custom(format!("⏸️ {}", title))));
            }
            PlaybackStatus::Idle => self.ctx.set_activity(None),
            PlaybackStatus::FallbackDisabled => {
                warn!("📭 Autoplay sin contenido en guild {}", guild_id);
                self.ctx.set_activity(None);
            }
        }
        Ok(())
    }

    async fn report_error(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        message: &str,
    ) -> Result<()> {
        debug!("Reportando error de guild {} en canal {}", guild_id, channel_id);
        channel_id
            .send_message(
                &self.ctx.http,
                CreateMessage::new().embed(embeds::create_error_embed(
                    "Error de reproducción",
                    &format!("```\n{}\n```", message),
                )),
            )
            .await?;
        Ok(())
    }
}
