use anyhow::Result;
use parking_lot::Mutex;
use serenity::model::id::{GuildId, UserId};
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info, warn};

use super::{guild::GuildAutoplay, selector::Selection};
use crate::{
    audio::{
        events::PlayerEvent,
        player::PlaybackEngine,
        queue::QueueItem,
    },
    config::Config,
    sources::Extractor,
    storage::PersistenceGateway,
    ui::{NowPlaying, Notifier, PlaybackStatus},
};

/// Votos de salto para la entrada actual
#[derive(Debug, Default)]
pub struct SkipState {
    voters: HashSet<UserId>,
}

impl SkipState {
    /// Registra un voto y devuelve el total
    pub fn add_vote(&mut self, user_id: UserId) -> usize {
        self.voters.insert(user_id);
        self.voters.len()
    }

    pub fn votes(&self) -> usize {
        self.voters.len()
    }

    pub fn reset(&mut self) {
        self.voters.clear();
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RouterSettings {
    pub auto_pause: bool,
    pub write_current_song: bool,
}

impl From<&Config> for RouterSettings {
    fn from(config: &Config) -> Self {
        Self {
            auto_pause: config.auto_pause,
            write_current_song: config.write_current_song,
        }
    }
}

/// Consume los eventos del player de una sesión, en orden de emisión
pub struct QueueEventRouter {
    guild_id: GuildId,
    autoplay: Arc<GuildAutoplay>,
    engine: Arc<dyn PlaybackEngine>,
    extractor: Arc<dyn Extractor>,
    gateway: Arc<dyn PersistenceGateway>,
    notifier: Arc<dyn Notifier>,
    settings: RouterSettings,
    skip_state: Arc<Mutex<SkipState>>,
    auto_paused: Arc<AtomicBool>,
    autopause_armed: bool,
}

impl QueueEventRouter {
    pub fn new(
        autoplay: Arc<GuildAutoplay>,
        engine: Arc<dyn PlaybackEngine>,
        extractor: Arc<dyn Extractor>,
        gateway: Arc<dyn PersistenceGateway>,
        notifier: Arc<dyn Notifier>,
        settings: RouterSettings,
    ) -> Self {
        Self {
            guild_id: autoplay.guild_id(),
            autoplay,
            engine,
            extractor,
            gateway,
            notifier,
            settings,
            skip_state: Arc::new(Mutex::new(SkipState::default())),
            auto_paused: Arc::new(AtomicBool::new(false)),
            autopause_armed: false,
        }
    }

    pub fn skip_state(&self) -> Arc<Mutex<SkipState>> {
        self.skip_state.clone()
    }

    /// Marcado mientras el player está pausado por canal vacío
    pub fn auto_paused(&self) -> Arc<AtomicBool> {
        self.auto_paused.clone()
    }

    pub fn spawn(self, events: mpsc::UnboundedReceiver<PlayerEvent>) -> JoinHandle<()> {
        tokio::spawn(self.run(events))
    }

    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<PlayerEvent>) {
        debug!("📨 Router iniciado para guild {}", self.guild_id);
        while let Some(event) = events.recv().await {
            self.dispatch(event).await;
        }
        debug!("📪 Router terminado para guild {}", self.guild_id);
    }

    /// Procesa un evento; los errores se registran y nunca detienen el router
    pub async fn dispatch(&mut self, event: PlayerEvent) {
        let kind = event.kind();
        let result = match event {
            PlayerEvent::Play { entry } => self.on_play(entry).await,
            PlayerEvent::Resume { entry } => self.on_resume(entry).await,
            PlayerEvent::Pause { entry } => self.on_pause(entry).await,
            PlayerEvent::Stop => self.on_stop().await,
            PlayerEvent::FinishedPlaying => self.on_finished_playing().await,
            PlayerEvent::EntryAdded { entry } => self.on_entry_added(entry).await,
            PlayerEvent::Error { entry, message } => self.on_error(entry, message).await,
        };

        if let Err(e) = result {
            error!(
                "❌ Error procesando {:?} en guild {}: {:?}",
                kind, self.guild_id, e
            );
        }
    }

    async fn on_play(&mut self, entry: QueueItem) -> Result<()> {
        self.skip_state.lock().reset();
        self.status(PlaybackStatus::Playing(entry.title.clone())).await;
        self.persist_queue().await;

        if self.settings.write_current_song {
            if let Err(e) = self.gateway.write_now_playing(self.guild_id, &entry.title).await {
                warn!("No se pudo escribir la canción actual: {}", e);
            }
        }

        if let Err(e) = self
            .notifier
            .now_playing(self.guild_id, &NowPlaying::from(&entry))
            .await
        {
            warn!("No se pudo enviar el aviso de reproducción: {:?}", e);
        }

        if std::mem::take(&mut self.autopause_armed)
            && self.settings.auto_pause
            && self.engine.channel_is_empty().await
        {
            info!(
                "⏸️ Canal vacío en guild {}, pausando {}",
                self.guild_id, entry.title
            );
            self.engine.pause().await?;
            self.auto_paused.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn on_resume(&mut self, entry: QueueItem) -> Result<()> {
        self.auto_paused.store(false, Ordering::SeqCst);
        self.status(PlaybackStatus::Playing(entry.title)).await;
        Ok(())
    }

    async fn on_pause(&mut self, entry: QueueItem) -> Result<()> {
        self.status(PlaybackStatus::Paused(entry.title)).await;
        Ok(())
    }

    async fn on_stop(&mut self) -> Result<()> {
        self.autopause_armed = false;
        self.autoplay.cancel_refill();
        self.status(PlaybackStatus::Idle).await;
        Ok(())
    }

    async fn on_finished_playing(&mut self) -> Result<()> {
        if self.engine.is_stopped() || self.engine.is_dead() {
            self.persist_queue().await;
            return Ok(());
        }

        if !self.engine.is_idle() {
            self.persist_queue().await;
        } else if self.autoplay.fallback_enabled().await {
            let engine = self.engine.clone();
            let halted = move || engine.is_stopped() || engine.is_dead();

            match self
                .autoplay
                .next_fallback(self.extractor.as_ref(), &halted)
                .await?
            {
                Selection::Resolved(resolved) => {
                    info!(
                        "🤖 Autoplay en guild {}: {} ({})",
                        self.guild_id, resolved.metadata.title, resolved.reference.category
                    );
                    self.autopause_armed = self.settings.auto_pause;
                    self.engine.enqueue(QueueItem::fallback(resolved)).await?;
                }
                Selection::Disabled => {
                    self.status(PlaybackStatus::FallbackDisabled).await;
                    return Ok(());
                }
                Selection::Exhausted => {
                    warn!(
                        "📭 Autoplay agotado en guild {}, el player queda inactivo",
                        self.guild_id
                    );
                    return Ok(());
                }
                Selection::Cancelled => return Ok(()),
            }
        } else {
            self.status(PlaybackStatus::Idle).await;
            return Ok(());
        }

        if !self.engine.is_stopped() && !self.engine.is_dead() {
            self.engine.play().await?;
        }
        Ok(())
    }

    async fn on_entry_added(&mut self, entry: QueueItem) -> Result<()> {
        if entry.is_user_attributable() {
            self.persist_queue().await;
        }
        Ok(())
    }

    async fn on_error(&mut self, entry: Option<QueueItem>, message: String) -> Result<()> {
        match entry.as_ref().and_then(|e| e.channel_id) {
            Some(channel_id) => {
                self.notifier
                    .report_error(self.guild_id, channel_id, &message)
                    .await?
            }
            None => error!(
                "❌ Error de reproducción sin canal de origen en guild {}: {}",
                self.guild_id, message
            ),
        }
        Ok(())
    }

    async fn persist_queue(&self) {
        let snapshot = self.engine.snapshot();
        if let Err(e) = self
            .gateway
            .write_queue_snapshot(self.guild_id, &snapshot)
            .await
        {
            warn!(
                "💾 No se pudo guardar la cola de guild {}: {}",
                self.guild_id, e
            );
        }
    }

    async fn status(&self, status: PlaybackStatus) {
        if let Err(e) = self.notifier.playback_status(self.guild_id, &status).await {
            debug!("No se pudo actualizar el estado: {:?}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::queue::{MusicQueue, QueueSnapshot},
        autoplay::{
            guild::{AutoplaySettings, SeedLists},
            AutoMode, Category, CategoryFlags,
        },
        sources::{MockExtractor, TrackMetadata},
        storage::JsonStorage,
        ui::MockNotifier,
    };
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serenity::model::id::ChannelId;
    use std::sync::atomic::AtomicUsize;

    /// Motor en memoria: registra llamadas sin audio real
    #[derive(Default)]
    struct FakeEngine {
        queue: Mutex<Option<MusicQueue>>,
        stopped: AtomicBool,
        empty_channel: AtomicBool,
        plays: AtomicUsize,
        pauses: AtomicUsize,
    }

    impl FakeEngine {
        fn with_queue(&self, f: impl FnOnce(&mut MusicQueue)) {
            let mut guard = self.queue.lock();
            f(guard.get_or_insert_with(|| MusicQueue::new(10)))
        }

        fn pending(&self) -> Vec<QueueItem> {
            let mut items = Vec::new();
            self.with_queue(|q| items = q.snapshot().entries);
            items
        }
    }

    #[async_trait]
    impl PlaybackEngine for FakeEngine {
        async fn enqueue(&self, item: QueueItem) -> Result<()> {
            let mut result = Ok(());
            self.with_queue(|q| result = q.add_track(item));
            result
        }

        async fn play(&self) -> Result<()> {
            self.plays.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn pause(&self) -> Result<()> {
            self.pauses.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn skip(&self) -> Result<()> {
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            self.stopped.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn is_stopped(&self) -> bool {
            self.stopped.load(Ordering::SeqCst)
        }

        fn is_dead(&self) -> bool {
            false
        }

        fn is_idle(&self) -> bool {
            let mut idle = true;
            self.with_queue(|q| idle = q.is_idle());
            idle
        }

        fn current(&self) -> Option<QueueItem> {
            let mut current = None;
            self.with_queue(|q| current = q.current().cloned());
            current
        }

        fn snapshot(&self) -> QueueSnapshot {
            let mut snapshot = QueueSnapshot::default();
            self.with_queue(|q| snapshot = q.snapshot());
            snapshot
        }

        async fn channel_is_empty(&self) -> bool {
            self.empty_channel.load(Ordering::SeqCst)
        }
    }

    fn guild() -> GuildId {
        GuildId::new(77)
    }

    fn quiet_notifier() -> MockNotifier {
        let mut notifier = MockNotifier::new();
        notifier.expect_now_playing().returning(|_, _| Ok(()));
        notifier.expect_playback_status().returning(|_, _| Ok(()));
        notifier.expect_report_error().returning(|_, _, _| Ok(()));
        notifier
    }

    fn user_entry(locator: &str) -> QueueItem {
        QueueItem::requested(
            locator,
            TrackMetadata::new(locator),
            UserId::new(5),
            ChannelId::new(6),
        )
    }

    struct Harness {
        dir: tempfile::TempDir,
        storage: Arc<JsonStorage>,
        engine: Arc<FakeEngine>,
        router: QueueEventRouter,
    }

    async fn harness(
        default: &[&str],
        extractor: MockExtractor,
        notifier: MockNotifier,
    ) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(JsonStorage::new(dir.path().to_path_buf()).await.unwrap());
        let seeds = SeedLists {
            default: default.iter().map(|s| s.to_string()).collect(),
            stream: Vec::new(),
        };
        let autoplay = GuildAutoplay::load(
            guild(),
            AutoplaySettings {
                default_mode: AutoMode::Merge,
                enabled: CategoryFlags::new(true, true),
                randomize: false,
            },
            storage.clone(),
            &seeds,
        )
        .await
        .unwrap();

        let engine = Arc::new(FakeEngine::default());
        let router = QueueEventRouter::new(
            Arc::new(autoplay),
            engine.clone(),
            Arc::new(extractor),
            storage.clone(),
            Arc::new(notifier),
            RouterSettings {
                auto_pause: true,
                write_current_song: true,
            },
        );

        Harness {
            dir,
            storage,
            engine,
            router,
        }
    }

    #[tokio::test]
    async fn test_finished_with_empty_queue_enqueues_one_fallback() {
        let mut extractor = MockExtractor::new();
        extractor
            .expect_resolve()
            .times(1)
            .returning(|r| Ok(TrackMetadata::new(format!("título {}", r.locator))));
        let mut h = harness(&["a", "b"], extractor, quiet_notifier()).await;

        h.router.dispatch(PlayerEvent::FinishedPlaying).await;

        let pending = h.engine.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].locator, "a");
        assert_eq!(pending[0].category(), Some(Category::Default));
        assert_eq!(h.engine.plays.load(Ordering::SeqCst), 1);
        assert!(h.router.autopause_armed);
    }

    #[tokio::test]
    async fn test_finished_with_disabled_fallback_leaves_player_idle() {
        let mut extractor = MockExtractor::new();
        extractor.expect_resolve().never();
        let mut notifier = MockNotifier::new();
        notifier
            .expect_playback_status()
            .withf(|_, status| *status == PlaybackStatus::FallbackDisabled)
            .times(1)
            .returning(|_, _| Ok(()));
        let mut h = harness(&[], extractor, notifier).await;

        h.router.dispatch(PlayerEvent::FinishedPlaying).await;

        assert!(h.engine.pending().is_empty());
        assert_eq!(h.engine.plays.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_finished_with_pending_entries_resumes_without_fallback() {
        let mut extractor = MockExtractor::new();
        extractor.expect_resolve().never();
        let mut h = harness(&["a"], extractor, quiet_notifier()).await;
        h.engine.enqueue(user_entry("mine")).await.unwrap();

        h.router.dispatch(PlayerEvent::FinishedPlaying).await;

        assert_eq!(h.engine.plays.load(Ordering::SeqCst), 1);
        let stored = h.storage.read_queue_snapshot(guild()).await.unwrap().unwrap();
        assert_eq!(stored.entries[0].locator, "mine");
    }

    #[tokio::test]
    async fn test_finished_after_stop_only_persists() {
        let mut extractor = MockExtractor::new();
        extractor.expect_resolve().never();
        let mut h = harness(&["a"], extractor, quiet_notifier()).await;
        h.engine.stop().await.unwrap();

        h.router.dispatch(PlayerEvent::FinishedPlaying).await;

        assert_eq!(h.engine.plays.load(Ordering::SeqCst), 0);
        assert!(h.storage.read_queue_snapshot(guild()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_entry_added_persists_only_user_entries() {
        let mut h = harness(&["a"], MockExtractor::new(), quiet_notifier()).await;

        let fallback = QueueItem::fallback(crate::autoplay::ResolvedEntry {
            reference: crate::autoplay::MediaReference::new("a", Category::Default),
            metadata: TrackMetadata::new("A"),
        });
        h.router
            .dispatch(PlayerEvent::EntryAdded { entry: fallback })
            .await;
        assert_eq!(h.storage.read_queue_snapshot(guild()).await.unwrap(), None);

        h.engine.enqueue(user_entry("mine")).await.unwrap();
        h.router
            .dispatch(PlayerEvent::EntryAdded {
                entry: user_entry("mine"),
            })
            .await;
        assert!(h.storage.read_queue_snapshot(guild()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_play_resets_votes_and_autopauses_empty_channel() {
        let mut h = harness(&["a"], MockExtractor::new(), quiet_notifier()).await;
        h.engine.empty_channel.store(true, Ordering::SeqCst);
        h.router.skip_state().lock().add_vote(UserId::new(9));
        h.router.autopause_armed = true;

        h.router
            .dispatch(PlayerEvent::Play {
                entry: user_entry("a"),
            })
            .await;

        assert_eq!(h.router.skip_state().lock().votes(), 0);
        assert_eq!(h.engine.pauses.load(Ordering::SeqCst), 1);
        assert!(h.router.auto_paused().load(Ordering::SeqCst));
        assert!(!h.router.autopause_armed);

        let current = dir_file(&h, "current.txt");
        assert_eq!(std::fs::read_to_string(current).unwrap(), "a");

        // sin autopausa armada no se pausa
        h.router
            .dispatch(PlayerEvent::Play {
                entry: user_entry("b"),
            })
            .await;
        assert_eq!(h.engine.pauses.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_errors_are_reported_to_origin_channel_only() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_report_error()
            .withf(|_, channel, message| *channel == ChannelId::new(6) && message == "boom")
            .times(1)
            .returning(|_, _, _| Ok(()));
        let mut h = harness(&[], MockExtractor::new(), notifier).await;

        h.router
            .dispatch(PlayerEvent::Error {
                entry: Some(user_entry("a")),
                message: "boom".into(),
            })
            .await;
        h.router
            .dispatch(PlayerEvent::Error {
                entry: None,
                message: "sin origen".into(),
            })
            .await;
    }

    fn dir_file(h: &Harness, name: &str) -> std::path::PathBuf {
        h.dir
            .path()
            .join("guilds")
            .join(guild().get().to_string())
            .join(name)
    }
}
