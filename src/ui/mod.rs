//! # UI Module
//!
//! Presentation surface for playback notices: embeds, bot activity and
//! error messages. The router only produces structured notices; everything
//! about formatting lives here.

pub mod embeds;
pub mod notifier;

use anyhow::Result;
use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::time::Duration;

use crate::{audio::queue::QueueItem, autoplay::Category};

pub use notifier::DiscordNotifier;

/// Aviso estructurado de "reproduciendo ahora"
#[derive(Debug, Clone, PartialEq)]
pub struct NowPlaying {
    /// `None` para entradas pedidas por un usuario
    pub category: Option<Category>,
    pub locator: String,
    pub title: String,
    pub requester: Option<UserId>,
    pub channel_id: Option<ChannelId>,
    pub duration: Option<Duration>,
    pub is_live: bool,
}

impl From<&QueueItem> for NowPlaying {
    fn from(item: &QueueItem) -> Self {
        Self {
            category: item.category(),
            locator: item.locator.clone(),
            title: item.title.clone(),
            requester: item.requested_by,
            channel_id: item.channel_id,
            duration: item.duration,
            is_live: item.is_live,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackStatus {
    Playing(String),
    Paused(String),
    Idle,
    /// El autoplay no tiene nada reproducible
    FallbackDisabled,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn now_playing(&self, guild_id: GuildId, notice: &NowPlaying) -> Result<()>;

    async fn playback_status(&self, guild_id: GuildId, status: &PlaybackStatus) -> Result<()>;

    async fn report_error(&self, guild_id: GuildId, channel_id: ChannelId, message: &str)
        -> Result<()>;
}
