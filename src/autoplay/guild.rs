use parking_lot::{Mutex, RwLock};
use serenity::model::id::GuildId;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{
    mode::{AutoMode, ModeState, ToggleOutcome},
    selector::{FallbackSelector, Selection, SelectorEnv, SelectorState},
    source_list::{AddOutcome, RemovalReason, RemoveOutcome, SourceList, SourceLists},
    Category, CategoryFlags,
};
use crate::{
    config::Config,
    error::Result,
    sources::Extractor,
    storage::PersistenceGateway,
};

/// Parámetros globales de autoplay tomados de la configuración
#[derive(Debug, Clone)]
pub struct AutoplaySettings {
    pub default_mode: AutoMode,
    pub enabled: CategoryFlags,
    pub randomize: bool,
}

impl From<&Config> for AutoplaySettings {
    fn from(config: &Config) -> Self {
        Self {
            default_mode: config.auto_mode,
            enabled: CategoryFlags::new(config.auto_playlist, config.auto_stream),
            randomize: config.auto_playlist_random,
        }
    }
}

/// Listas semilla leídas al arrancar, usadas para guilds sin listas propias
#[derive(Debug, Clone, Default)]
pub struct SeedLists {
    pub default: Vec<String>,
    pub stream: Vec<String>,
}

impl SeedLists {
    fn get(&self, category: Category) -> &[String] {
        match category {
            Category::Default => &self.default,
            Category::Stream => &self.stream,
        }
    }
}

/// Copia para mostrar sin tomar el lock del guild
#[derive(Debug, Clone, PartialEq)]
pub struct AutoplaySnapshot {
    pub mode: ModeState,
    pub playlist: Vec<String>,
    pub stream: Vec<String>,
    pub availability: CategoryFlags,
    pub selector: SelectorState,
    pub pending: usize,
}

struct AutoplayState {
    lists: SourceLists,
    mode: ModeState,
    selector: FallbackSelector,
}

impl AutoplayState {
    fn snapshot(&self) -> AutoplaySnapshot {
        AutoplaySnapshot {
            mode: self.mode.clone(),
            playlist: self.lists.default.snapshot().to_vec(),
            stream: self.lists.stream.snapshot().to_vec(),
            availability: self.lists.availability(),
            selector: self.selector.state(),
            pending: self.selector.pending(),
        }
    }
}

/// Estado de autoplay de un guild.
///
/// Toda mutación de listas, modo y cola de respaldo pasa por `state`, un
/// único mutex async por guild. `display` guarda la última copia publicada.
pub struct GuildAutoplay {
    guild_id: GuildId,
    settings: AutoplaySettings,
    gateway: Arc<dyn PersistenceGateway>,
    state: tokio::sync::Mutex<AutoplayState>,
    cancel: Mutex<CancellationToken>,
    display: RwLock<AutoplaySnapshot>,
}

impl GuildAutoplay {
    /// Carga listas y modo persistidos, sembrando lo que falte
    pub async fn load(
        guild_id: GuildId,
        settings: AutoplaySettings,
        gateway: Arc<dyn PersistenceGateway>,
        seeds: &SeedLists,
    ) -> Result<Self> {
        let default = load_list(guild_id, Category::Default, &settings, gateway.as_ref(), seeds).await?;
        let stream = load_list(guild_id, Category::Stream, &settings, gateway.as_ref(), seeds).await?;
        let lists = SourceLists { default, stream };

        let mode = match gateway.read_mode_state(guild_id).await? {
            Some(mode) => mode,
            None => {
                let mode = ModeState::initialize(settings.default_mode, lists.availability());
                gateway.write_mode_state(guild_id, &mode).await?;
                mode
            }
        };

        info!(
            "🎛️ Autoplay cargado para guild {}: modo {}, {} en playlist, {} en stream",
            guild_id,
            mode.mode,
            lists.default.len(),
            lists.stream.len()
        );

        let state = AutoplayState {
            lists,
            mode,
            selector: FallbackSelector::new(),
        };
        let display = RwLock::new(state.snapshot());

        Ok(Self {
            guild_id,
            settings,
            gateway,
            state: tokio::sync::Mutex::new(state),
            cancel: Mutex::new(CancellationToken::new()),
            display,
        })
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Última copia publicada; no espera al lock del guild
    pub fn snapshot(&self) -> AutoplaySnapshot {
        self.display.read().clone()
    }

    fn publish(&self, state: &AutoplayState) {
        *self.display.write() = state.snapshot();
    }

    /// Agrega un locator; rehabilita el autoplay si estaba deshabilitado
    pub async fn add_source(&self, category: Category, locator: &str) -> Result<AddOutcome> {
        let mut state = self.state.lock().await;
        let outcome = state
            .lists
            .get_mut(category)
            .add(locator, self.gateway.as_ref())
            .await?;

        if outcome == AddOutcome::Added {
            self.content_available(&mut state).await?;
        }
        self.publish(&state);
        Ok(outcome)
    }

    pub async fn remove_source(&self, category: Category, locator: &str) -> Result<RemoveOutcome> {
        let mut state = self.state.lock().await;
        let outcome = state
            .lists
            .get_mut(category)
            .remove(locator, RemovalReason::RemovedByUser, self.gateway.as_ref())
            .await?;

        if outcome == RemoveOutcome::Removed {
            state.selector.forget(locator.trim());
            self.content_removed(&mut state).await?;
        }
        self.publish(&state);
        Ok(outcome)
    }

    /// Avanza la categoría activa (modo toggle) y vacía la cola de respaldo
    pub async fn toggle(&self) -> Result<ToggleOutcome> {
        let mut state = self.state.lock().await;
        let previous = state.mode.clone();
        let availability = state.lists.availability();

        let outcome = state.mode.toggle_next(availability)?;
        match outcome {
            ToggleOutcome::Switched(category) => {
                state
                    .mode
                    .commit(previous, self.guild_id, self.gateway.as_ref())
                    .await?;
                state.selector.reset();
                info!("🔀 Guild {} ahora usa {}", self.guild_id, category);
            }
            ToggleOutcome::NoOtherCategory if !availability.any() => {
                state.selector.disable(self.guild_id);
            }
            ToggleOutcome::NoOtherCategory => {}
        }
        self.publish(&state);
        Ok(outcome)
    }

    /// Vacía la cola de respaldo para que el próximo ciclo relea las listas
    pub async fn reset(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.selector.reset();
        if state.lists.availability().any() {
            self.content_available(&mut state).await?;
        }
        self.publish(&state);
        Ok(())
    }

    /// Habilita o deshabilita una categoría en tiempo de ejecución
    pub async fn set_category_enabled(&self, category: Category, enabled: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        state.lists.get_mut(category).set_enabled(enabled);
        if enabled && state.lists.availability().get(category) {
            self.content_available(&mut state).await?;
        } else if !enabled {
            self.content_removed(&mut state).await?;
        }
        self.publish(&state);
        Ok(())
    }

    async fn content_available(&self, state: &mut AutoplayState) -> Result<()> {
        state.selector.reenable();

        let previous = state.mode.clone();
        if state.mode.activate_first_available(state.lists.availability()) {
            state
                .mode
                .commit(previous, self.guild_id, self.gateway.as_ref())
                .await?;
        }
        Ok(())
    }

    /// Mueve la categoría activa fuera de una lista que quedó sin contenido;
    /// sin ninguna lista disponible el autoplay queda deshabilitado
    async fn content_removed(&self, state: &mut AutoplayState) -> Result<()> {
        let availability = state.lists.availability();
        if !availability.any() {
            if state.selector.state() != SelectorState::Disabled {
                state.selector.disable(self.guild_id);
            }
            return Ok(());
        }

        let previous = state.mode.clone();
        if state.mode.activate_first_available(availability) {
            state.selector.reset();
            state
                .mode
                .commit(previous, self.guild_id, self.gateway.as_ref())
                .await?;
        }
        Ok(())
    }

    /// Indica si el modo y la configuración permiten autoplay
    pub async fn fallback_enabled(&self) -> bool {
        let state = self.state.lock().await;
        state.mode.is_enabled()
            && (state.lists.default.is_enabled() || state.lists.stream.is_enabled())
    }

    /// Ejecuta un disparo de "cola vacía" bajo el lock del guild
    pub async fn next_fallback(
        &self,
        extractor: &dyn Extractor,
        halted: &(dyn Fn() -> bool + Send + Sync),
    ) -> Result<Selection> {
        let cancel = self.cancel.lock().clone();
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let env = SelectorEnv {
            guild_id: self.guild_id,
            randomize: self.settings.randomize,
            extractor,
            gateway: self.gateway.as_ref(),
            cancel: &cancel,
            halted,
        };
        let result = state
            .selector
            .next_entry(&mut state.lists, &mut state.mode, &env)
            .await;

        self.publish(state);
        result
    }

    /// Cancela cualquier ciclo en curso; los siguientes usan un token nuevo
    pub fn cancel_refill(&self) {
        let previous = std::mem::replace(&mut *self.cancel.lock(), CancellationToken::new());
        previous.cancel();
        debug!("⏹️ Relleno cancelado para guild {}", self.guild_id);
    }
}

async fn load_list(
    guild_id: GuildId,
    category: Category,
    settings: &AutoplaySettings,
    gateway: &dyn PersistenceGateway,
    seeds: &SeedLists,
) -> Result<SourceList> {
    let enabled = settings.enabled.get(category);
    if let Some(locators) = gateway.read_source_list(guild_id, category).await? {
        return Ok(SourceList::new(guild_id, category, enabled, locators));
    }

    let list = SourceList::new(guild_id, category, enabled, seeds.get(category).to_vec());
    gateway
        .write_source_list(guild_id, category, list.snapshot())
        .await?;
    debug!(
        "🌱 {} sembrada para guild {} con {} entradas",
        category.file_stem(),
        guild_id,
        list.len()
    );
    Ok(list)
}
