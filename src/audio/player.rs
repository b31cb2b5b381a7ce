use anyhow::Result;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serenity::{
    cache::Cache,
    model::id::{ChannelId, GuildId},
};
use songbird::{
    input::{File, Input, YoutubeDl},
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, TrackEvent,
};
use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tracing::{debug, error, info};

use super::{
    events::{PlayerEmitter, PlayerEvent},
    queue::{MusicQueue, QueueItem, QueueSnapshot},
};

/// Superficie del motor de reproducción que usa el router
#[async_trait]
pub trait PlaybackEngine: Send + Sync {
    async fn enqueue(&self, item: QueueItem) -> Result<()>;

    /// Reanuda si está en pausa, o inicia el siguiente track si no hay ninguno sonando.
    /// Con la cola vacía emite `FinishedPlaying`.
    async fn play(&self) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    async fn skip(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    fn is_stopped(&self) -> bool;

    fn is_dead(&self) -> bool;

    /// Cola principal y track actual vacíos
    fn is_idle(&self) -> bool;

    fn current(&self) -> Option<QueueItem>;

    fn snapshot(&self) -> QueueSnapshot;

    /// Nadie más que el bot en el canal de voz
    async fn channel_is_empty(&self) -> bool;
}

/// Estado compartido con los handlers de eventos de songbird
struct TrackShared {
    queue: RwLock<MusicQueue>,
    current: Mutex<Option<TrackHandle>>,
    emitter: PlayerEmitter,
}

impl TrackShared {
    /// Cierra el track una sola vez aunque lleguen `Error` y `End`
    fn finish(&self, handle: &TrackHandle) {
        {
            let mut current = self.current.lock();
            if !current.as_ref().is_some_and(|h| h.uuid() == handle.uuid()) {
                return;
            }
            *current = None;
        }

        if let Some(item) = self.queue.write().finish_current() {
            debug!("🏁 Terminado: {}", item.title);
        }
        self.emitter.emit(PlayerEvent::FinishedPlaying);
    }
}

pub struct SongbirdPlayer {
    guild_id: GuildId,
    call: Arc<tokio::sync::Mutex<Call>>,
    cache: Arc<Cache>,
    http: reqwest::Client,
    shared: Arc<TrackShared>,
    volume: f32,
    paused: AtomicBool,
    stopped: AtomicBool,
    dead: AtomicBool,
}

impl SongbirdPlayer {
    pub fn new(
        guild_id: GuildId,
        call: Arc<tokio::sync::Mutex<Call>>,
        cache: Arc<Cache>,
        http: reqwest::Client,
        emitter: PlayerEmitter,
        max_queue_size: usize,
        volume: f32,
    ) -> Self {
        Self {
            guild_id,
            call,
            cache,
            http,
            shared: Arc::new(TrackShared {
                queue: RwLock::new(MusicQueue::new(max_queue_size)),
                current: Mutex::new(None),
                emitter,
            }),
            volume,
            paused: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            dead: AtomicBool::new(false),
        }
    }

    /// Detiene todo y marca el player como muerto (sesión terminada)
    pub async fn kill(&self) -> Result<()> {
        self.dead.store(true, Ordering::SeqCst);
        self.stop().await
    }

    pub fn queue_len(&self) -> usize {
        self.shared.queue.read().len()
    }

    fn build_input(&self, item: &QueueItem) -> Input {
        if Path::new(&item.locator).is_file() {
            Input::from(File::new(item.locator.clone()))
        } else {
            Input::from(YoutubeDl::new(self.http.clone(), item.locator.clone()))
        }
    }

    /// Reproduce el siguiente track de la cola
    async fn play_next(&self) -> Result<()> {
        let Some(item) = self.shared.queue.write().next_track() else {
            // Sin nada que tocar, el router decide si entra el autoplay
            debug!("Cola vacía para guild {}", self.guild_id);
            self.shared.emitter.emit(PlayerEvent::FinishedPlaying);
            return Ok(());
        };

        info!("🎵 Reproduciendo: {}", item.title);
        let input = self.build_input(&item);
        let track_handle = {
            let mut call = self.call.lock().await;
            call.play_input(input)
        };

        // Configurar volumen por defecto
        let _ = track_handle.set_volume(self.volume);

        track_handle
            .add_event(
                Event::Track(TrackEvent::End),
                TrackEndHandler {
                    shared: self.shared.clone(),
                    handle: track_handle.clone(),
                },
            )
            .map_err(|e| anyhow::anyhow!("Error al agregar event handler: {}", e))?;
        track_handle
            .add_event(
                Event::Track(TrackEvent::Error),
                TrackErrorHandler {
                    shared: self.shared.clone(),
                    handle: track_handle.clone(),
                },
            )
            .map_err(|e| anyhow::anyhow!("Error al agregar event handler: {}", e))?;

        *self.shared.current.lock() = Some(track_handle);
        self.stopped.store(false, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);

        self.shared.emitter.emit(PlayerEvent::Play { entry: item });
        Ok(())
    }

    fn current_handle(&self) -> Option<TrackHandle> {
        self.shared.current.lock().clone()
    }
}

#[async_trait]
impl PlaybackEngine for SongbirdPlayer {
    async fn enqueue(&self, item: QueueItem) -> Result<()> {
        self.shared.queue.write().add_track(item.clone())?;
        self.shared.emitter.emit(PlayerEvent::EntryAdded { entry: item });
        Ok(())
    }

    async fn play(&self) -> Result<()> {
        if self.is_dead() {
            anyhow::bail!("El player de guild {} ya no está activo", self.guild_id);
        }

        if let Some(track) = self.current_handle() {
            if self.paused.swap(false, Ordering::SeqCst) {
                let _ = track.play();
                info!("▶️ Reproducción reanudada");
                if let Some(entry) = self.current() {
                    self.shared.emitter.emit(PlayerEvent::Resume { entry });
                }
            }
            return Ok(());
        }

        self.stopped.store(false, Ordering::SeqCst);
        self.play_next().await
    }

    async fn pause(&self) -> Result<()> {
        if let Some(track) = self.current_handle() {
            let _ = track.pause();
            self.paused.store(true, Ordering::SeqCst);
            info!("⏸️ Reproducción pausada");
            if let Some(entry) = self.current() {
                self.shared.emitter.emit(PlayerEvent::Pause { entry });
            }
        }
        Ok(())
    }

    async fn skip(&self) -> Result<()> {
        // El evento End del track dispara el siguiente
        if let Some(track) = self.current_handle() {
            let _ = track.stop();
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.stopped.store(true, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
        self.shared.queue.write().clear();

        if let Some(track) = self.current_handle() {
            let _ = track.stop();
        }

        info!("⏹️ Reproducción detenida");
        self.shared.emitter.emit(PlayerEvent::Stop);
        Ok(())
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn is_dead(&self) -> bool {
        self.dead.load(Ordering::SeqCst)
    }

    fn is_idle(&self) -> bool {
        self.shared.queue.read().is_idle()
    }

    fn current(&self) -> Option<QueueItem> {
        self.shared.queue.read().current().cloned()
    }

    fn snapshot(&self) -> QueueSnapshot {
        self.shared.queue.read().snapshot()
    }

    async fn channel_is_empty(&self) -> bool {
        let channel = {
            let call = self.call.lock().await;
            call.current_channel()
        };
        let Some(channel) = channel else {
            return true;
        };
        let channel_id = ChannelId::from(channel.0);
        let bot_id = self.cache.current_user().id;

        let Some(guild) = self.cache.guild(self.guild_id) else {
            return false;
        };
        !guild
            .voice_states
            .values()
            .any(|state| state.channel_id == Some(channel_id) && state.user_id != bot_id)
    }
}

/// Handler para cuando termina una canción
struct TrackEndHandler {
    shared: Arc<TrackShared>,
    handle: TrackHandle,
}

#[async_trait]
impl VoiceEventHandler for TrackEndHandler {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        debug!("Track terminado");
        self.shared.finish(&self.handle);
        None
    }
}

/// Handler para errores de reproducción
struct TrackErrorHandler {
    shared: Arc<TrackShared>,
    handle: TrackHandle,
}

#[async_trait]
impl VoiceEventHandler for TrackErrorHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let message = match ctx {
            EventContext::Track(tracks) => tracks
                .iter()
                .find_map(|(state, _)| match &state.playing {
                    PlayMode::Errored(e) => Some(e.to_string()),
                    _ => None,
                }),
            _ => None,
        }
        .unwrap_or_else(|| "error de reproducción desconocido".to_string());

        error!("❌ Error reproduciendo track: {}", message);
        let entry = self.shared.queue.read().current().cloned();
        self.shared
            .emitter
            .emit(PlayerEvent::Error { entry, message });
        self.shared.finish(&self.handle);
        None
    }
}
