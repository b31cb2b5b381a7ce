//! # Autoplay Module
//!
//! Fallback playback for guilds whose primary queue runs dry.
//!
//! Every guild owns two [`SourceList`]s (the on-demand autoplaylist and the
//! live autostream), a persisted [`ModeState`] deciding how those lists are
//! combined, and a [`FallbackSelector`] that turns an empty queue into exactly
//! one playable entry. The [`QueueEventRouter`] listens to the player and
//! drives the selector at the right moments.
//!
//! ## Components
//!
//! ### [`source_list`] - Candidate lists
//! - Ordered, deduplicated locators per category
//! - Append-only removal log (audit + known-bad tracking)
//!
//! ### [`mode`] - Fallback policy
//! - `off` / `merge` / `toggle`
//! - Cyclic toggling over `[Default, Stream]`
//!
//! ### [`selector`] - Refill state machine
//! - `Idle` → `Refilling` → `Idle` | `Exhausted` | `Disabled`
//! - Evict-or-skip handling of extraction failures
//!
//! ### [`guild`] - Per-guild lock scope
//! - Every mutation of lists, mode and fallback queue happens here
//!
//! ### [`router`] - Player event pipeline
//! - Persists snapshots, arms autopause, refills on `finished-playing`

pub mod guild;
pub mod mode;
pub mod router;
pub mod selector;
pub mod source_list;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use guild::{AutoplaySettings, AutoplaySnapshot, GuildAutoplay, SeedLists};
pub use mode::{AutoMode, ModeState, ToggleOutcome};
pub use router::{QueueEventRouter, RouterSettings, SkipState};
pub use selector::{FallbackSelector, ResolvedEntry, Selection, SelectorState};
pub use source_list::{AddOutcome, RemovalReason, RemovalRecord, RemoveOutcome, SourceList};

/// Tipo de fuente de respaldo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Catálogo bajo demanda (autoplaylist)
    Default,
    /// Fuentes en vivo o continuas (autostream)
    Stream,
}

impl Category {
    /// Orden cíclico fijo usado por el modo `toggle`
    pub const CYCLE: [Category; 2] = [Category::Default, Category::Stream];

    /// Nombre de archivo base para la persistencia
    pub fn file_stem(self) -> &'static str {
        match self {
            Category::Default => "autoplaylist",
            Category::Stream => "autostream",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Default => write!(f, "playlist"),
            Category::Stream => write!(f, "stream"),
        }
    }
}

/// Referencia a un medio candidato. La identidad es el locator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaReference {
    pub locator: String,
    pub category: Category,
}

impl MediaReference {
    pub fn new(locator: impl Into<String>, category: Category) -> Self {
        Self {
            locator: locator.into(),
            category,
        }
    }
}

/// Flags por categoría (habilitación en config o disponibilidad derivada)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CategoryFlags {
    pub default: bool,
    pub stream: bool,
}

impl CategoryFlags {
    pub fn new(default: bool, stream: bool) -> Self {
        Self { default, stream }
    }

    pub fn get(&self, category: Category) -> bool {
        match category {
            Category::Default => self.default,
            Category::Stream => self.stream,
        }
    }

    pub fn set(&mut self, category: Category, value: bool) {
        match category {
            Category::Default => self.default = value,
            Category::Stream => self.stream = value,
        }
    }

    pub fn any(&self) -> bool {
        self.default || self.stream
    }

    /// Primera categoría marcada en orden cíclico
    pub fn first(&self) -> Option<Category> {
        Category::CYCLE.into_iter().find(|c| self.get(*c))
    }
}
