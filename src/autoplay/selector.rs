use rand::seq::SliceRandom;
use serenity::model::id::GuildId;
use std::collections::{HashSet, VecDeque};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    mode::{AutoMode, ModeState, ToggleOutcome},
    source_list::{RemovalReason, SourceLists},
    Category, CategoryFlags, MediaReference,
};
use crate::{
    error::Result,
    sources::{ExtractionError, Extractor, TrackMetadata},
    storage::PersistenceGateway,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectorState {
    #[default]
    Idle,
    Refilling,
    Exhausted,
    Disabled,
}

/// Candidato resuelto listo para encolar
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEntry {
    pub reference: MediaReference,
    pub metadata: TrackMetadata,
}

/// Resultado de un disparo de "cola vacía"
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Resolved(ResolvedEntry),
    Exhausted,
    Disabled,
    Cancelled,
}

/// Colaboradores y parámetros de un ciclo de relleno
pub struct SelectorEnv<'a> {
    pub guild_id: GuildId,
    pub randomize: bool,
    pub extractor: &'a dyn Extractor,
    pub gateway: &'a dyn PersistenceGateway,
    pub cancel: &'a CancellationToken,
    /// Consultado entre candidatos; `true` abandona el ciclo (player detenido o muerto)
    pub halted: &'a (dyn Fn() -> bool + Send + Sync),
}

impl SelectorEnv<'_> {
    fn should_abandon(&self) -> bool {
        self.cancel.is_cancelled() || (self.halted)()
    }
}

/// Máquina de estados que convierte una cola vacía en una entrada reproducible.
///
/// La `FallbackQueue` vive aquí: candidatos aún no intentados. Tras una
/// resolución exitosa el resto se conserva para el siguiente disparo.
#[derive(Debug, Default)]
pub struct FallbackSelector {
    state: SelectorState,
    queue: VecDeque<MediaReference>,
}

impl FallbackSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SelectorState {
        self.state
    }

    /// Candidatos pendientes del ciclo actual
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Vacía la cola de respaldo; un selector deshabilitado sigue deshabilitado
    pub fn reset(&mut self) {
        self.queue.clear();
        if self.state != SelectorState::Disabled {
            self.state = SelectorState::Idle;
        }
    }

    /// Señal externa de categoría rehabilitada
    pub fn reenable(&mut self) {
        if self.state == SelectorState::Disabled {
            info!("🔁 Autoplay rehabilitado: hay contenido disponible de nuevo");
            self.state = SelectorState::Idle;
        }
    }

    /// Quita un locator de la cola pendiente
    pub fn forget(&mut self, locator: &str) {
        self.queue.retain(|c| c.locator != locator);
    }

    /// Atiende un disparo de "cola vacía" y devuelve como mucho una entrada
    pub async fn next_entry(
        &mut self,
        lists: &mut SourceLists,
        mode: &mut ModeState,
        env: &SelectorEnv<'_>,
    ) -> Result<Selection> {
        if self.state == SelectorState::Disabled {
            debug!("Autoplay deshabilitado en guild {}, nada que hacer", env.guild_id);
            return Ok(Selection::Disabled);
        }
        if !mode.is_enabled() {
            return Ok(Selection::Disabled);
        }

        let result = self.run_cycle(lists, mode, env).await;
        if result.is_err() {
            self.state = SelectorState::Idle;
        }
        result
    }

    async fn run_cycle(
        &mut self,
        lists: &mut SourceLists,
        mode: &mut ModeState,
        env: &SelectorEnv<'_>,
    ) -> Result<Selection> {
        let mut rederived = false;

        loop {
            if self.queue.is_empty() {
                let availability = lists.availability();
                if !availability.any() || !reconcile_mode(mode, availability, env).await? {
                    return Ok(self.disable(env.guild_id));
                }
                self.queue = build_pool(lists, mode, availability, env.randomize);
                debug!(
                    "🎲 Nuevo ciclo de respaldo en guild {}: {} candidatos ({:?})",
                    env.guild_id,
                    self.queue.len(),
                    mode.selected(availability)
                );
            }

            self.state = SelectorState::Refilling;

            while let Some(candidate) = self.queue.pop_front() {
                if env.should_abandon() {
                    self.queue.push_front(candidate);
                    self.state = SelectorState::Idle;
                    info!("⏹️ Ciclo de respaldo cancelado en guild {}", env.guild_id);
                    return Ok(Selection::Cancelled);
                }

                let list = lists.get(candidate.category);
                if !list.is_enabled()
                    || !list.contains(&candidate.locator)
                    || !mode.includes(candidate.category)
                {
                    debug!("Candidato obsoleto descartado: {}", candidate.locator);
                    continue;
                }

                match env.extractor.resolve(&candidate).await {
                    Ok(metadata) => {
                        self.state = SelectorState::Idle;
                        debug!(
                            "✅ Respaldo resuelto en guild {}: {} ({})",
                            env.guild_id, candidate.locator, candidate.category
                        );
                        return Ok(Selection::Resolved(ResolvedEntry {
                            reference: candidate,
                            metadata,
                        }));
                    }
                    Err(ExtractionError::InvalidSource(reason)) => {
                        self.evict(lists, &candidate, reason, env).await;
                    }
                    Err(ExtractionError::NotAStream(reason))
                        if candidate.category == Category::Stream =>
                    {
                        self.evict(lists, &candidate, reason, env).await;
                    }
                    Err(e) => {
                        warn!("⏭️ Saltando {} en este ciclo: {}", candidate.locator, e);
                    }
                }
            }

            self.state = SelectorState::Exhausted;
            let availability = lists.availability();
            if !availability.any() || !reconcile_mode(mode, availability, env).await? {
                return Ok(self.disable(env.guild_id));
            }

            if rederived {
                warn!(
                    "⚠️ Ciclo de respaldo agotado en guild {} sin entradas reproducibles",
                    env.guild_id
                );
                return Ok(Selection::Exhausted);
            }
            rederived = true;
        }
    }

    /// Expulsa el candidato de su lista. Si no se puede persistir, el
    /// candidato solo se salta en este ciclo.
    async fn evict(
        &mut self,
        lists: &mut SourceLists,
        candidate: &MediaReference,
        reason: String,
        env: &SelectorEnv<'_>,
    ) {
        if let Err(e) = lists
            .get_mut(candidate.category)
            .remove(&candidate.locator, RemovalReason::Evicted(reason), env.gateway)
            .await
        {
            warn!(
                "💾 No se pudo expulsar {} en guild {}, se salta en este ciclo: {}",
                candidate.locator, env.guild_id, e
            );
        }
        self.forget(&candidate.locator);
    }

    /// Deshabilita el autoplay hasta una señal de categoría rehabilitada
    pub fn disable(&mut self, guild_id: GuildId) -> Selection {
        self.queue.clear();
        self.state = SelectorState::Disabled;
        warn!(
            "⚠️ Sin contenido en autoplaylist ni autostream para guild {}, autoplay deshabilitado",
            guild_id
        );
        Selection::Disabled
    }
}

/// Ajusta la categoría activa en modo toggle a lo que sigue disponible.
/// Devuelve `false` si no queda ninguna categoría que seleccionar.
async fn reconcile_mode(
    mode: &mut ModeState,
    availability: CategoryFlags,
    env: &SelectorEnv<'_>,
) -> Result<bool> {
    if mode.mode != AutoMode::Toggle {
        return Ok(!mode.selected(availability).is_empty());
    }
    if mode.active.is_some_and(|c| availability.get(c)) {
        return Ok(true);
    }

    let previous = mode.clone();
    match mode.toggle_next(availability)? {
        ToggleOutcome::Switched(category) => {
            mode.commit(previous, env.guild_id, env.gateway).await?;
            info!(
                "🔀 Categoría agotada en guild {}, cambiando a {}",
                env.guild_id, category
            );
            Ok(true)
        }
        ToggleOutcome::NoOtherCategory => Ok(false),
    }
}

fn build_pool(
    lists: &SourceLists,
    mode: &ModeState,
    availability: CategoryFlags,
    randomize: bool,
) -> VecDeque<MediaReference> {
    let mut seen = HashSet::new();
    let mut pool: Vec<MediaReference> = mode
        .selected(availability)
        .into_iter()
        .flat_map(|category| {
            lists
                .get(category)
                .snapshot()
                .iter()
                .map(move |locator| MediaReference::new(locator.clone(), category))
        })
        .filter(|reference| seen.insert(reference.locator.clone()))
        .collect();

    if randomize {
        pool.shuffle(&mut rand::thread_rng());
    }
    pool.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        autoplay::SourceList,
        sources::MockExtractor,
        storage::{JsonStorage, MockPersistenceGateway},
    };
    use mockall::predicate::function;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};

    fn guild() -> GuildId {
        GuildId::new(1)
    }

    fn lists(default: &[&str], stream: &[&str]) -> SourceLists {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        SourceLists {
            default: SourceList::new(guild(), Category::Default, true, owned(default)),
            stream: SourceList::new(guild(), Category::Stream, true, owned(stream)),
        }
    }

    fn never_halted() -> bool {
        false
    }

    /// Extractor que registra cada locator intentado
    fn recording_extractor(
        calls: Arc<Mutex<Vec<String>>>,
        fail: fn(&str) -> Option<ExtractionError>,
    ) -> MockExtractor {
        let mut extractor = MockExtractor::new();
        extractor.expect_resolve().returning(move |reference| {
            calls.lock().unwrap().push(reference.locator.clone());
            match fail(&reference.locator) {
                Some(err) => Err(err),
                None => Ok(TrackMetadata::new(reference.locator.clone())),
            }
        });
        extractor
    }

    #[tokio::test]
    async fn test_merge_pool_is_deduplicated_union() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path().to_path_buf()).await.unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let extractor = recording_extractor(calls.clone(), |_| {
            Some(ExtractionError::Transient("red caída".into()))
        });
        let cancel = CancellationToken::new();
        let env = SelectorEnv {
            guild_id: guild(),
            randomize: false,
            extractor: &extractor,
            gateway: &storage,
            cancel: &cancel,
            halted: &never_halted,
        };

        let mut lists = lists(&["a", "b"], &["s", "a"]);
        let mut mode = ModeState::initialize(AutoMode::Merge, lists.availability());
        let mut selector = FallbackSelector::new();

        let result = selector.next_entry(&mut lists, &mut mode, &env).await.unwrap();

        assert_eq!(result, Selection::Exhausted);
        assert_eq!(selector.state(), SelectorState::Exhausted);
        // un ciclo completo más una re-derivación
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["a", "b", "s", "a", "b", "s"]
        );
        assert_eq!(lists.default.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_source_is_evicted_and_next_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path().to_path_buf()).await.unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let extractor = recording_extractor(calls.clone(), |locator| {
            (locator == "a").then(|| ExtractionError::InvalidSource("404".into()))
        });
        let cancel = CancellationToken::new();
        let env = SelectorEnv {
            guild_id: guild(),
            randomize: false,
            extractor: &extractor,
            gateway: &storage,
            cancel: &cancel,
            halted: &never_halted,
        };

        let mut lists = lists(&["a", "b"], &[]);
        let mut mode = ModeState::initialize(AutoMode::Merge, lists.availability());
        let mut selector = FallbackSelector::new();

        let result = selector.next_entry(&mut lists, &mut mode, &env).await.unwrap();

        let Selection::Resolved(entry) = result else {
            panic!("se esperaba una entrada resuelta, se obtuvo {:?}", result);
        };
        assert_eq!(entry.reference, MediaReference::new("b", Category::Default));
        assert_eq!(lists.default.snapshot(), &["b".to_string()]);
        assert_eq!(selector.state(), SelectorState::Idle);

        let stored = storage
            .read_source_list(guild(), Category::Default)
            .await
            .unwrap();
        assert_eq!(stored, Some(vec!["b".to_string()]));
        let log = storage
            .read_removal_log(guild(), Category::Default)
            .await
            .unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].reason, RemovalReason::Evicted("404".into()));
    }

    #[tokio::test]
    async fn test_failed_eviction_skips_candidate_and_keeps_cycle() {
        let mut gateway = MockPersistenceGateway::new();
        gateway
            .expect_write_source_list()
            .times(1)
            .returning(|_, _, _| Err(crate::error::AutoplayError::Persistence("disco lleno".into())));
        gateway.expect_append_removal_log().never();

        let calls = Arc::new(Mutex::new(Vec::new()));
        let extractor = recording_extractor(calls.clone(), |locator| {
            (locator == "a").then(|| ExtractionError::InvalidSource("404".into()))
        });
        let cancel = CancellationToken::new();
        let env = SelectorEnv {
            guild_id: guild(),
            randomize: false,
            extractor: &extractor,
            gateway: &gateway,
            cancel: &cancel,
            halted: &never_halted,
        };

        let mut lists = lists(&["a", "b"], &[]);
        let mut mode = ModeState::initialize(AutoMode::Merge, lists.availability());
        let mut selector = FallbackSelector::new();

        let result = selector.next_entry(&mut lists, &mut mode, &env).await.unwrap();

        assert_eq!(
            result,
            Selection::Resolved(ResolvedEntry {
                reference: MediaReference::new("b", Category::Default),
                metadata: TrackMetadata::new("b"),
            })
        );
        assert_eq!(*calls.lock().unwrap(), vec!["a", "b"]);
        // La expulsión no llegó a disco, así que la lista no cambia
        assert_eq!(lists.default.snapshot(), &["a".to_string(), "b".to_string()]);
        assert_eq!(selector.pending(), 0);
    }

    #[tokio::test]
    async fn test_not_a_stream_evicts_only_stream_entries() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path().to_path_buf()).await.unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let extractor = recording_extractor(calls.clone(), |locator| {
            (locator != "ok").then(|| ExtractionError::NotAStream("vod".into()))
        });
        let cancel = CancellationToken::new();
        let env = SelectorEnv {
            guild_id: guild(),
            randomize: false,
            extractor: &extractor,
            gateway: &storage,
            cancel: &cancel,
            halted: &never_halted,
        };

        let mut lists = lists(&["d"], &["s", "ok"]);
        let mut mode = ModeState::initialize(AutoMode::Merge, lists.availability());
        let mut selector = FallbackSelector::new();

        let result = selector.next_entry(&mut lists, &mut mode, &env).await.unwrap();

        assert!(matches!(result, Selection::Resolved(ref e) if e.reference.locator == "ok"));
        assert_eq!(lists.default.snapshot(), &["d".to_string()]);
        assert_eq!(lists.stream.snapshot(), &["ok".to_string()]);
    }

    #[tokio::test]
    async fn test_transient_errors_never_evict() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let extractor = recording_extractor(calls.clone(), |_| {
            Some(ExtractionError::Transient("timeout".into()))
        });
        let mut gateway = MockPersistenceGateway::new();
        gateway.expect_write_source_list().never();
        gateway.expect_append_removal_log().never();
        let cancel = CancellationToken::new();
        let env = SelectorEnv {
            guild_id: guild(),
            randomize: true,
            extractor: &extractor,
            gateway: &gateway,
            cancel: &cancel,
            halted: &never_halted,
        };

        let mut lists = lists(&["a", "b", "c"], &[]);
        let mut mode = ModeState::initialize(AutoMode::Merge, lists.availability());
        let mut selector = FallbackSelector::new();

        let result = selector.next_entry(&mut lists, &mut mode, &env).await.unwrap();

        assert_eq!(result, Selection::Exhausted);
        assert_eq!(lists.default.len(), 3);
        assert_eq!(calls.lock().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_no_available_category_disables_without_extraction() {
        let mut extractor = MockExtractor::new();
        extractor.expect_resolve().times(0);
        let gateway = MockPersistenceGateway::new();
        let cancel = CancellationToken::new();
        let env = SelectorEnv {
            guild_id: guild(),
            randomize: false,
            extractor: &extractor,
            gateway: &gateway,
            cancel: &cancel,
            halted: &never_halted,
        };

        let mut lists = lists(&[], &[]);
        let mut mode = ModeState::initialize(AutoMode::Merge, lists.availability());
        let mut selector = FallbackSelector::new();

        assert_eq!(
            selector.next_entry(&mut lists, &mut mode, &env).await.unwrap(),
            Selection::Disabled
        );
        assert_eq!(selector.state(), SelectorState::Disabled);

        // sigue deshabilitado hasta una señal externa
        assert_eq!(
            selector.next_entry(&mut lists, &mut mode, &env).await.unwrap(),
            Selection::Disabled
        );
    }

    #[tokio::test]
    async fn test_toggle_exhaustion_moves_to_stream() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path().to_path_buf()).await.unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let extractor = recording_extractor(calls.clone(), |locator| {
            (locator == "a").then(|| ExtractionError::InvalidSource("gone".into()))
        });
        let cancel = CancellationToken::new();
        let env = SelectorEnv {
            guild_id: guild(),
            randomize: false,
            extractor: &extractor,
            gateway: &storage,
            cancel: &cancel,
            halted: &never_halted,
        };

        let mut lists = lists(&["a"], &["s"]);
        let mut mode = ModeState::initialize(AutoMode::Toggle, lists.availability());
        assert_eq!(mode.active, Some(Category::Default));
        let mut selector = FallbackSelector::new();

        let result = selector.next_entry(&mut lists, &mut mode, &env).await.unwrap();

        assert!(matches!(result, Selection::Resolved(ref e) if e.reference.category == Category::Stream));
        assert_eq!(mode.active, Some(Category::Stream));
        assert_eq!(
            storage.read_mode_state(guild()).await.unwrap(),
            Some(mode.clone())
        );
        assert_eq!(*calls.lock().unwrap(), vec!["a", "s"]);
    }

    #[tokio::test]
    async fn test_toggle_exhaustion_without_other_category_disables() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path().to_path_buf()).await.unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let extractor = recording_extractor(calls.clone(), |_| {
            Some(ExtractionError::InvalidSource("gone".into()))
        });
        let cancel = CancellationToken::new();
        let env = SelectorEnv {
            guild_id: guild(),
            randomize: false,
            extractor: &extractor,
            gateway: &storage,
            cancel: &cancel,
            halted: &never_halted,
        };

        let mut lists = lists(&["a"], &[]);
        let mut mode = ModeState::initialize(AutoMode::Toggle, lists.availability());
        let mut selector = FallbackSelector::new();

        assert_eq!(
            selector.next_entry(&mut lists, &mut mode, &env).await.unwrap(),
            Selection::Disabled
        );
        assert_eq!(selector.state(), SelectorState::Disabled);
        assert!(lists.default.is_empty());

        selector.reenable();
        assert_eq!(selector.state(), SelectorState::Idle);
    }

    #[tokio::test]
    async fn test_cancelled_cycle_makes_no_extraction_calls() {
        let mut extractor = MockExtractor::new();
        extractor.expect_resolve().never();
        let gateway = MockPersistenceGateway::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let env = SelectorEnv {
            guild_id: guild(),
            randomize: false,
            extractor: &extractor,
            gateway: &gateway,
            cancel: &cancel,
            halted: &never_halted,
        };

        let mut lists = lists(&["a", "b"], &[]);
        let mut mode = ModeState::initialize(AutoMode::Merge, lists.availability());
        let mut selector = FallbackSelector::new();

        assert_eq!(
            selector.next_entry(&mut lists, &mut mode, &env).await.unwrap(),
            Selection::Cancelled
        );
        assert_eq!(selector.state(), SelectorState::Idle);
        assert_eq!(selector.pending(), 2);
    }

    #[tokio::test]
    async fn test_rotation_keeps_untried_candidates() {
        let mut extractor = MockExtractor::new();
        extractor
            .expect_resolve()
            .with(function(|r: &MediaReference| r.locator == "a"))
            .times(1)
            .returning(|_| Ok(TrackMetadata::new("A")));
        extractor
            .expect_resolve()
            .with(function(|r: &MediaReference| r.locator == "b"))
            .times(1)
            .returning(|_| Ok(TrackMetadata::new("B")));
        let gateway = MockPersistenceGateway::new();
        let cancel = CancellationToken::new();
        let env = SelectorEnv {
            guild_id: guild(),
            randomize: false,
            extractor: &extractor,
            gateway: &gateway,
            cancel: &cancel,
            halted: &never_halted,
        };

        let mut lists = lists(&["a", "b"], &[]);
        let mut mode = ModeState::initialize(AutoMode::Merge, lists.availability());
        let mut selector = FallbackSelector::new();

        let first = selector.next_entry(&mut lists, &mut mode, &env).await.unwrap();
        assert!(matches!(first, Selection::Resolved(ref e) if e.metadata.title == "A"));
        assert_eq!(selector.pending(), 1);

        let second = selector.next_entry(&mut lists, &mut mode, &env).await.unwrap();
        assert!(matches!(second, Selection::Resolved(ref e) if e.metadata.title == "B"));

        selector.reset();
        assert_eq!(selector.pending(), 0);
    }

    #[tokio::test]
    async fn test_removed_candidates_are_dropped_without_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path().to_path_buf()).await.unwrap();
        let mut extractor = MockExtractor::new();
        extractor
            .expect_resolve()
            .with(function(|r: &MediaReference| r.locator != "b"))
            .returning(|r| Ok(TrackMetadata::new(r.locator.clone())));
        let cancel = CancellationToken::new();
        let env = SelectorEnv {
            guild_id: guild(),
            randomize: false,
            extractor: &extractor,
            gateway: &storage,
            cancel: &cancel,
            halted: &never_halted,
        };

        let mut lists = lists(&["a", "b", "c"], &[]);
        let mut mode = ModeState::initialize(AutoMode::Merge, lists.availability());
        let mut selector = FallbackSelector::new();

        selector.next_entry(&mut lists, &mut mode, &env).await.unwrap();
        lists
            .default
            .remove("b", RemovalReason::RemovedByUser, &storage)
            .await
            .unwrap();

        let next = selector.next_entry(&mut lists, &mut mode, &env).await.unwrap();
        assert!(matches!(next, Selection::Resolved(ref e) if e.reference.locator == "c"));
    }
}
