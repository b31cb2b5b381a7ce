//! # Bot Module
//!
//! Discord front end for the autoplay orchestrator.
//!
//! This module contains:
//! - Slash command registration and dispatch
//! - Voice session lifecycle (join, leave, resume after restart)
//! - Gateway event handling (ready, interactions, voice state updates)
//!
//! ## Architecture
//!
//! [`AutoplayBot`] implements Serenity's [`EventHandler`]. It owns one
//! [`GuildAutoplay`] per guild, loaded lazily and shared by every playback
//! session of that guild, and one [`GuildSession`] per active voice
//! connection. A session wires a [`SongbirdPlayer`] to a
//! [`QueueEventRouter`] task through a [`PlayerEmitter`] channel.

use anyhow::Result;
use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod events;
pub mod handlers;

use crate::{
    audio::{
        events::PlayerEmitter,
        player::{PlaybackEngine, SongbirdPlayer},
    },
    autoplay::{
        AutoplaySettings, GuildAutoplay, QueueEventRouter, RouterSettings, SeedLists, SkipState,
    },
    config::Config,
    sources::{Extractor, YtDlpExtractor},
    storage::{JsonStorage, PersistenceGateway},
    ui::DiscordNotifier,
};

/// Conexión de voz activa de un guild
pub struct GuildSession {
    pub player: Arc<SongbirdPlayer>,
    pub autoplay: Arc<GuildAutoplay>,
    pub skip_state: Arc<Mutex<SkipState>>,
    pub auto_paused: Arc<AtomicBool>,
    router: JoinHandle<()>,
}

/// Main Discord event handler.
///
/// ## Fields
///
/// - `config`: bot configuration (tokens, limits, autoplay defaults)
/// - `storage`: JSON persistence for lists, mode and queue snapshots
/// - `extractor`: yt-dlp metadata resolution
/// - `seeds`: global seed lists for guilds without their own
/// - `autoplay`: per-guild autoplay state, outlives voice sessions
/// - `sessions`: per-guild voice sessions
pub struct AutoplayBot {
    config: Arc<Config>,
    storage: Arc<JsonStorage>,
    extractor: Arc<YtDlpExtractor>,
    seeds: Arc<SeedLists>,
    http: reqwest::Client,
    autoplay: DashMap<GuildId, Arc<GuildAutoplay>>,
    sessions: DashMap<GuildId, Arc<GuildSession>>,
}

impl AutoplayBot {
    pub fn new(
        config: Config,
        storage: Arc<JsonStorage>,
        extractor: Arc<YtDlpExtractor>,
        seeds: SeedLists,
    ) -> Self {
        Self {
            config: Arc::new(config),
            storage,
            extractor,
            seeds: Arc::new(seeds),
            http: reqwest::Client::new(),
            autoplay: DashMap::new(),
            sessions: DashMap::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn extractor(&self) -> &YtDlpExtractor {
        &self.extractor
    }

    /// Estado de autoplay del guild, cargándolo la primera vez
    pub async fn guild_autoplay(&self, guild_id: GuildId) -> Result<Arc<GuildAutoplay>> {
        if let Some(autoplay) = self.autoplay.get(&guild_id) {
            return Ok(autoplay.clone());
        }

        let loaded = GuildAutoplay::load(
            guild_id,
            AutoplaySettings::from(self.config.as_ref()),
            self.storage.clone(),
            &self.seeds,
        )
        .await?;

        // Otro comando pudo cargarlo mientras tanto
        Ok(self
            .autoplay
            .entry(guild_id)
            .or_insert_with(|| Arc::new(loaded))
            .clone())
    }

    pub fn session(&self, guild_id: GuildId) -> Option<Arc<GuildSession>> {
        self.sessions.get(&guild_id).map(|s| s.clone())
    }

    /// Registers slash commands globally or for the development guild.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos de guild: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                    })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }

    /// Connects to a voice channel and starts a playback session.
    ///
    /// If the guild already has a session the bot only moves to the new
    /// channel. A fresh session re-enqueues the persisted queue snapshot
    /// (current entry first) and starts playing it.
    ///
    /// # Required Permissions
    ///
    /// - `Connect` - To join the voice channel
    /// - `Speak` - To play audio in the channel
    pub async fn join(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<GuildSession>> {
        let manager = songbird::get(ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;

        let call = manager.join(guild_id, channel_id).await.map_err(|e| {
            error!("Error al obtener handler de voz: {:?}", e);
            anyhow::anyhow!("Error al conectar al canal de voz")
        })?;
        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);

        if let Some(session) = self.session(guild_id) {
            return Ok(session);
        }

        events::register_voice_events(&mut *call.lock().await, guild_id);

        let autoplay = self.guild_autoplay(guild_id).await?;
        let (emitter, rx) = PlayerEmitter::channel();
        let player = Arc::new(SongbirdPlayer::new(
            guild_id,
            call,
            ctx.cache.clone(),
            self.http.clone(),
            emitter,
            self.config.max_queue_size,
            self.config.default_volume,
        ));

        let router = QueueEventRouter::new(
            autoplay.clone(),
            player.clone(),
            self.extractor.clone() as Arc<dyn Extractor>,
            self.storage.clone() as Arc<dyn PersistenceGateway>,
            Arc::new(DiscordNotifier::new(ctx.clone())),
            RouterSettings::from(self.config.as_ref()),
        );
        let skip_state = router.skip_state();
        let auto_paused = router.auto_paused();

        let session = Arc::new(GuildSession {
            player: player.clone(),
            autoplay,
            skip_state,
            auto_paused,
            router: router.spawn(rx),
        });
        self.sessions.insert(guild_id, session.clone());

        self.restore_queue(guild_id, player.as_ref()).await;

        Ok(session)
    }

    /// Re-encola la cola guardada antes del último reinicio
    async fn restore_queue(&self, guild_id: GuildId, player: &SongbirdPlayer) {
        let snapshot = match self.storage.read_queue_snapshot(guild_id).await {
            Ok(Some(snapshot)) if !snapshot.is_empty() => snapshot,
            Ok(_) => return,
            Err(e) => {
                warn!("⚠️ No se pudo leer la cola guardada de guild {}: {}", guild_id, e);
                return;
            }
        };

        let mut restored = 0;
        for item in snapshot.into_entries() {
            match player.enqueue(item).await {
                Ok(()) => restored += 1,
                Err(e) => {
                    warn!("⚠️ Cola restaurada truncada: {}", e);
                    break;
                }
            }
        }

        info!("♻️ {} entradas restauradas en guild {}", restored, guild_id);
        if let Err(e) = player.play().await {
            error!("Error al reanudar la cola restaurada: {:?}", e);
        }
    }

    /// Disconnects from voice and tears the session down.
    ///
    /// Cancels any in-flight refill, kills the player and stops the router.
    /// Autoplay state stays loaded for the next session.
    pub async fn leave(&self, ctx: &Context, guild_id: GuildId) -> Result<()> {
        self.end_session(guild_id).await;

        let manager = songbird::get(ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;
        if manager.get(guild_id).is_some() {
            manager.remove(guild_id).await?;
        }

        info!("👋 Desconectado del canal de voz en guild {}", guild_id);
        Ok(())
    }

    async fn end_session(&self, guild_id: GuildId) {
        let Some((_, session)) = self.sessions.remove(&guild_id) else {
            return;
        };

        session.autoplay.cancel_refill();
        if let Err(e) = session.player.kill().await {
            error!("Error al detener reproducción: {:?}", e);
        }
        session.router.abort();
        debug!("🧹 Sesión cerrada para guild {}", guild_id);
    }
}

#[async_trait]
impl EventHandler for AutoplayBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Cleans up when the bot is disconnected and resumes an autopaused
    /// player when someone joins its channel.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };

        let current_user_id = ctx.cache.current_user().id;
        if new.user_id == current_user_id {
            if old.is_some() && new.channel_id.is_none() {
                info!("🔌 Bot desconectado en guild {}", guild_id);
                self.end_session(guild_id).await;
            }
            return;
        }

        let Some(session) = self.session(guild_id) else {
            return;
        };
        if new.channel_id.is_none() || !session.auto_paused.load(Ordering::SeqCst) {
            return;
        }

        if !session.player.channel_is_empty().await {
            session.auto_paused.store(false, Ordering::SeqCst);
            info!("▶️ Oyente detectado, reanudando autoplay en guild {}", guild_id);
            if let Err(e) = session.player.play().await {
                error!("Error al reanudar tras autopausa: {:?}", e);
            }
        }
    }
}
