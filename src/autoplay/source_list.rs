use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serenity::model::id::GuildId;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use super::{Category, CategoryFlags};
use crate::{
    error::{AutoplayError, Result},
    storage::PersistenceGateway,
};

/// Motivo de una eliminación registrada en el log de auditoría
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RemovalReason {
    /// Expulsada por el selector tras un error permanente de extracción
    Evicted(String),
    /// Eliminada con un comando
    RemovedByUser,
}

impl std::fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemovalReason::Evicted(detail) => write!(f, "{}", detail),
            RemovalReason::RemovedByUser => write!(f, "removed by user"),
        }
    }
}

/// Entrada del log de eliminaciones (append-only)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalRecord {
    pub locator: String,
    pub reason: RemovalReason,
    pub removed_at: DateTime<Utc>,
}

impl RemovalRecord {
    pub fn now(locator: impl Into<String>, reason: RemovalReason) -> Self {
        Self {
            locator: locator.into(),
            reason,
            removed_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    AlreadyExists,
    /// Expulsada en esta sesión por ser inválida; no se vuelve a agregar
    KnownBad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    NotFound,
}

/// Lista ordenada y sin duplicados de locators para una categoría
#[derive(Debug, Clone)]
pub struct SourceList {
    guild_id: GuildId,
    category: Category,
    enabled: bool,
    entries: Vec<String>,
    removed: Vec<RemovalRecord>,
}

impl SourceList {
    /// Crea la lista eliminando duplicados y entradas vacías, preservando el orden
    pub fn new(guild_id: GuildId, category: Category, enabled: bool, locators: Vec<String>) -> Self {
        let mut seen = HashSet::new();
        let entries = locators
            .into_iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty() && seen.insert(l.clone()))
            .collect();

        Self {
            guild_id,
            category,
            enabled,
            entries,
            removed: Vec::new(),
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, locator: &str) -> bool {
        self.entries.iter().any(|e| e == locator)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Disponible = habilitada en config y con al menos una entrada
    pub fn availability(&self) -> bool {
        self.enabled && !self.entries.is_empty()
    }

    /// Vista de solo lectura en orden de inserción
    pub fn snapshot(&self) -> &[String] {
        &self.entries
    }

    pub fn removal_log(&self) -> &[RemovalRecord] {
        &self.removed
    }

    /// Indica si el locator fue expulsado por el selector en esta sesión
    pub fn is_known_bad(&self, locator: &str) -> bool {
        self.removed
            .iter()
            .any(|r| r.locator == locator && matches!(r.reason, RemovalReason::Evicted(_)))
    }

    /// Agrega un locator al final de la lista y persiste la lista completa
    pub async fn add(
        &mut self,
        locator: &str,
        gateway: &dyn PersistenceGateway,
    ) -> Result<AddOutcome> {
        let locator = locator.trim();
        if locator.is_empty() {
            return Err(AutoplayError::Configuration(
                "El locator no puede estar vacío".to_string(),
            ));
        }

        if self.contains(locator) {
            return Ok(AddOutcome::AlreadyExists);
        }

        if self.is_known_bad(locator) {
            debug!("🚫 {} fue expulsado en esta sesión, no se agrega", locator);
            return Ok(AddOutcome::KnownBad);
        }

        let mut updated = self.entries.clone();
        updated.push(locator.to_string());
        gateway
            .write_source_list(self.guild_id, self.category, &updated)
            .await?;
        self.entries = updated;

        info!("➕ Agregado a {}: {}", self.category.file_stem(), locator);
        Ok(AddOutcome::Added)
    }

    /// Elimina un locator, persiste la lista y registra la eliminación.
    ///
    /// Si la escritura de la lista falla, la lista en memoria queda intacta.
    /// Si falla solo el log, la lista ya coincide con disco y el registro se
    /// conserva en memoria antes de devolver el error.
    pub async fn remove(
        &mut self,
        locator: &str,
        reason: RemovalReason,
        gateway: &dyn PersistenceGateway,
    ) -> Result<RemoveOutcome> {
        let locator = locator.trim();
        let Some(index) = self.entries.iter().position(|e| e == locator) else {
            return Ok(RemoveOutcome::NotFound);
        };

        let mut updated = self.entries.clone();
        updated.remove(index);
        gateway
            .write_source_list(self.guild_id, self.category, &updated)
            .await?;
        self.entries = updated;

        let record = RemovalRecord::now(locator, reason);
        match &record.reason {
            RemovalReason::Evicted(detail) => warn!(
                "🗑️ Expulsado de {} en guild {}: {} ({}) a las {}",
                self.category.file_stem(),
                self.guild_id,
                locator,
                detail,
                record.removed_at.to_rfc3339()
            ),
            RemovalReason::RemovedByUser => info!(
                "🗑️ Eliminado de {} en guild {}: {}",
                self.category.file_stem(),
                self.guild_id,
                locator
            ),
        }

        let logged = gateway
            .append_removal_log(self.guild_id, self.category, &record)
            .await;
        self.removed.push(record);
        logged?;

        Ok(RemoveOutcome::Removed)
    }
}

/// Las dos listas de un guild
#[derive(Debug, Clone)]
pub struct SourceLists {
    pub default: SourceList,
    pub stream: SourceList,
}

impl SourceLists {
    pub fn get(&self, category: Category) -> &SourceList {
        match category {
            Category::Default => &self.default,
            Category::Stream => &self.stream,
        }
    }

    pub fn get_mut(&mut self, category: Category) -> &mut SourceList {
        match category {
            Category::Default => &mut self.default,
            Category::Stream => &mut self.stream,
        }
    }

    pub fn availability(&self) -> CategoryFlags {
        CategoryFlags::new(self.default.availability(), self.stream.availability())
    }
}
