use serde::{Deserialize, Deserializer, Serialize};
use serenity::model::id::GuildId;
use std::{fmt, str::FromStr};
use tracing::{debug, warn};

use super::{Category, CategoryFlags};
use crate::{
    error::{AutoplayError, Result},
    storage::PersistenceGateway,
};

/// Política de combinación de las fuentes de respaldo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoMode {
    Off,
    Merge,
    Toggle,
}

impl FromStr for AutoMode {
    type Err = AutoplayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "off" | "none" => Ok(AutoMode::Off),
            "merge" => Ok(AutoMode::Merge),
            "toggle" => Ok(AutoMode::Toggle),
            other => Err(AutoplayError::Configuration(format!(
                "Modo de autoplay desconocido: '{}' (usa off, merge o toggle)",
                other
            ))),
        }
    }
}

impl fmt::Display for AutoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AutoMode::Off => write!(f, "off"),
            AutoMode::Merge => write!(f, "merge"),
            AutoMode::Toggle => write!(f, "toggle"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Switched(Category),
    NoOtherCategory,
}

/// Modo de respaldo persistido por guild.
///
/// `active` solo tiene valor en modo `toggle`. Un valor persistido que ya no
/// corresponde a ninguna categoría se lee como `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeState {
    pub mode: AutoMode,
    #[serde(default, deserialize_with = "lenient_category")]
    pub active: Option<Category>,
}

impl ModeState {
    /// Estado inicial para un guild a partir del modo por defecto
    pub fn initialize(default_mode: AutoMode, availability: CategoryFlags) -> Self {
        let active = match default_mode {
            AutoMode::Toggle => availability.first(),
            _ => None,
        };
        Self {
            mode: default_mode,
            active,
        }
    }

    /// Corrige combinaciones imposibles leídas de disco
    pub fn normalized(mut self) -> Self {
        if self.mode != AutoMode::Toggle {
            self.active = None;
        }
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.mode != AutoMode::Off
    }

    /// Indica si el modo actual toma candidatos de la categoría
    pub fn includes(&self, category: Category) -> bool {
        match self.mode {
            AutoMode::Off => false,
            AutoMode::Merge => true,
            AutoMode::Toggle => self.active == Some(category),
        }
    }

    /// Categorías de las que se rellena la cola de respaldo, en orden cíclico
    pub fn selected(&self, availability: CategoryFlags) -> Vec<Category> {
        Category::CYCLE
            .into_iter()
            .filter(|c| self.includes(*c) && availability.get(*c))
            .collect()
    }

    /// Avanza a la siguiente categoría disponible en orden cíclico
    pub fn toggle_next(&mut self, availability: CategoryFlags) -> Result<ToggleOutcome> {
        if self.mode != AutoMode::Toggle {
            return Err(AutoplayError::Configuration(format!(
                "El modo de autoplay no es 'toggle' (actual: {})",
                self.mode
            )));
        }

        let position = self
            .active
            .and_then(|current| Category::CYCLE.iter().position(|c| *c == current));

        let next = match position {
            Some(pos) => (1..=Category::CYCLE.len())
                .map(|step| Category::CYCLE[(pos + step) % Category::CYCLE.len()])
                .find(|c| availability.get(*c)),
            None => availability.first(),
        };

        match next {
            Some(category) if Some(category) != self.active => {
                debug!("🔀 Categoría activa: {:?} -> {:?}", self.active, category);
                self.active = Some(category);
                Ok(ToggleOutcome::Switched(category))
            }
            _ => Ok(ToggleOutcome::NoOtherCategory),
        }
    }

    /// Persiste el estado actual; si la escritura falla restaura `previous`
    pub async fn commit(
        &mut self,
        previous: ModeState,
        guild_id: GuildId,
        gateway: &dyn PersistenceGateway,
    ) -> Result<()> {
        if let Err(e) = gateway.write_mode_state(guild_id, self).await {
            warn!(
                "↩️ No se pudo guardar el modo de guild {}, revirtiendo: {}",
                guild_id, e
            );
            *self = previous;
            return Err(e);
        }
        Ok(())
    }

    /// En modo toggle, activa la primera categoría disponible si la actual no lo está.
    /// Devuelve `true` si hubo cambio.
    pub fn activate_first_available(&mut self, availability: CategoryFlags) -> bool {
        if self.mode != AutoMode::Toggle {
            return false;
        }
        if self.active.is_some_and(|c| availability.get(c)) {
            return false;
        }
        match availability.first() {
            Some(category) => {
                self.active = Some(category);
                true
            }
            None => false,
        }
    }
}

fn lenient_category<'de, D>(deserializer: D) -> std::result::Result<Option<Category>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|value| match value.as_str() {
        "default" | "playlist" => Some(Category::Default),
        "stream" => Some(Category::Stream),
        _ => None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const BOTH: CategoryFlags = CategoryFlags {
        default: true,
        stream: true,
    };

    #[test]
    fn test_initialize_toggle_picks_first_available() {
        let state = ModeState::initialize(AutoMode::Toggle, CategoryFlags::new(false, true));
        assert_eq!(state.active, Some(Category::Stream));

        let state = ModeState::initialize(AutoMode::Toggle, CategoryFlags::default());
        assert_eq!(state.active, None);

        let state = ModeState::initialize(AutoMode::Merge, BOTH);
        assert_eq!(state.active, None);
    }

    #[test]
    fn test_toggle_is_cyclic() {
        let mut state = ModeState::initialize(AutoMode::Toggle, BOTH);
        assert_eq!(state.active, Some(Category::Default));

        assert_eq!(
            state.toggle_next(BOTH).unwrap(),
            ToggleOutcome::Switched(Category::Stream)
        );
        assert_eq!(
            state.toggle_next(BOTH).unwrap(),
            ToggleOutcome::Switched(Category::Default)
        );
    }

    #[test]
    fn test_toggle_with_single_category_is_noop() {
        let only_default = CategoryFlags::new(true, false);
        let mut state = ModeState::initialize(AutoMode::Toggle, only_default);

        assert_eq!(
            state.toggle_next(only_default).unwrap(),
            ToggleOutcome::NoOtherCategory
        );
        assert_eq!(state.active, Some(Category::Default));
    }

    #[test]
    fn test_toggle_skips_exhausted_active_category() {
        let mut state = ModeState {
            mode: AutoMode::Toggle,
            active: Some(Category::Default),
        };
        assert_eq!(
            state.toggle_next(CategoryFlags::new(false, true)).unwrap(),
            ToggleOutcome::Switched(Category::Stream)
        );
        assert_eq!(
            state.toggle_next(CategoryFlags::default()).unwrap(),
            ToggleOutcome::NoOtherCategory
        );
    }

    #[test]
    fn test_toggle_requires_toggle_mode() {
        let mut state = ModeState::initialize(AutoMode::Merge, BOTH);
        assert!(matches!(
            state.toggle_next(BOTH),
            Err(AutoplayError::Configuration(_))
        ));
        assert_eq!(state, ModeState::initialize(AutoMode::Merge, BOTH));
    }

    #[test]
    fn test_stale_active_category_restarts_at_first_available() {
        let state: ModeState =
            serde_json::from_str(r#"{"mode":"toggle","active":"radio"}"#).unwrap();
        assert_eq!(state.active, None);

        let mut state = state;
        assert_eq!(
            state.toggle_next(BOTH).unwrap(),
            ToggleOutcome::Switched(Category::Default)
        );

        let legacy: ModeState =
            serde_json::from_str(r#"{"mode":"toggle","active":"playlist"}"#).unwrap();
        assert_eq!(legacy.active, Some(Category::Default));
    }

    #[test]
    fn test_selected_categories_follow_mode() {
        let merge = ModeState::initialize(AutoMode::Merge, BOTH);
        assert_eq!(merge.selected(BOTH), vec![Category::Default, Category::Stream]);
        assert_eq!(
            merge.selected(CategoryFlags::new(false, true)),
            vec![Category::Stream]
        );

        let toggle = ModeState {
            mode: AutoMode::Toggle,
            active: Some(Category::Stream),
        };
        assert_eq!(toggle.selected(BOTH), vec![Category::Stream]);

        let off = ModeState::initialize(AutoMode::Off, BOTH);
        assert!(off.selected(BOTH).is_empty());
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!("Merge".parse::<AutoMode>().unwrap(), AutoMode::Merge);
        assert_eq!("toggle".parse::<AutoMode>().unwrap(), AutoMode::Toggle);
        assert!("shuffle".parse::<AutoMode>().is_err());
    }
}
