use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serenity::model::id::{ChannelId, UserId};
use std::{collections::VecDeque, time::Duration};
use tracing::{debug, info};

use crate::{
    autoplay::{Category, ResolvedEntry},
    sources::TrackMetadata,
};

/// Procedencia de una entrada de la cola principal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "category", rename_all = "snake_case")]
pub enum EntryOrigin {
    User,
    Fallback(Category),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub locator: String,
    pub title: String,
    pub duration: Option<Duration>,
    pub is_live: bool,
    pub origin: EntryOrigin,
    pub requested_by: Option<UserId>,
    /// Canal de texto donde se pidió; destino de avisos y errores
    pub channel_id: Option<ChannelId>,
    pub added_at: DateTime<Utc>,
}

impl QueueItem {
    /// Entrada pedida por un usuario
    pub fn requested(
        locator: impl Into<String>,
        metadata: TrackMetadata,
        requested_by: UserId,
        channel_id: ChannelId,
    ) -> Self {
        Self {
            locator: locator.into(),
            title: metadata.title,
            duration: metadata.duration,
            is_live: metadata.is_live,
            origin: EntryOrigin::User,
            requested_by: Some(requested_by),
            channel_id: Some(channel_id),
            added_at: Utc::now(),
        }
    }

    /// Entrada inyectada por el autoplay
    pub fn fallback(resolved: ResolvedEntry) -> Self {
        Self {
            origin: EntryOrigin::Fallback(resolved.reference.category),
            locator: resolved.reference.locator,
            title: resolved.metadata.title,
            duration: resolved.metadata.duration,
            is_live: resolved.metadata.is_live,
            requested_by: None,
            channel_id: None,
            added_at: Utc::now(),
        }
    }

    pub fn category(&self) -> Option<Category> {
        match self.origin {
            EntryOrigin::Fallback(category) => Some(category),
            EntryOrigin::User => None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.origin, EntryOrigin::Fallback(_))
    }

    /// Tiene autor y canal de origen
    pub fn is_user_attributable(&self) -> bool {
        self.requested_by.is_some() && self.channel_id.is_some()
    }
}

/// Estado serializable de la cola principal
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub current: Option<QueueItem>,
    pub entries: Vec<QueueItem>,
}

impl QueueSnapshot {
    /// Entradas en orden de reanudación: la actual primero
    pub fn into_entries(self) -> Vec<QueueItem> {
        self.current.into_iter().chain(self.entries).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none() && self.entries.is_empty()
    }
}

#[derive(Debug)]
pub struct MusicQueue {
    items: VecDeque<QueueItem>,
    current: Option<QueueItem>,
    max_size: usize,
}

impl MusicQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            current: None,
            max_size,
        }
    }

    /// Agrega un track a la cola
    pub fn add_track(&mut self, item: QueueItem) -> Result<()> {
        if self.items.len() >= self.max_size {
            anyhow::bail!("La cola está llena (máximo {} canciones)", self.max_size);
        }

        info!("➕ Agregado a la cola: {}", item.title);
        self.items.push_back(item);

        Ok(())
    }

    /// Obtiene el siguiente track (FIFO) y lo marca como actual
    pub fn next_track(&mut self) -> Option<QueueItem> {
        let next = self.items.pop_front();
        match &next {
            Some(item) => debug!("➡️ Siguiente en cola: {}", item.title),
            None => debug!("📭 Cola vacía, no hay siguiente track"),
        }
        self.current = next.clone();
        next
    }

    /// Marca el track actual como terminado
    pub fn finish_current(&mut self) -> Option<QueueItem> {
        self.current.take()
    }

    /// Limpia la cola
    pub fn clear(&mut self) {
        self.items.clear();
        info!("🗑️ Cola limpiada");
    }

    pub fn current(&self) -> Option<&QueueItem> {
        self.current.as_ref()
    }

    /// Sin entradas pendientes ni track actual
    pub fn is_idle(&self) -> bool {
        self.items.is_empty() && self.current.is_none()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            current: self.current.clone(),
            entries: self.items.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autoplay::MediaReference;
    use pretty_assertions::assert_eq;

    fn user_item(locator: &str) -> QueueItem {
        QueueItem::requested(
            locator,
            TrackMetadata::new(locator),
            UserId::new(1),
            ChannelId::new(2),
        )
    }

    #[test]
    fn test_fifo_order_and_idle() {
        let mut queue = MusicQueue::new(10);
        assert!(queue.is_idle());

        queue.add_track(user_item("a")).unwrap();
        queue.add_track(user_item("b")).unwrap();

        assert_eq!(queue.next_track().unwrap().locator, "a");
        assert!(!queue.is_idle());
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.next_track().unwrap().locator, "b");
        assert_eq!(queue.finish_current().unwrap().locator, "b");
        assert!(queue.is_idle());
    }

    #[test]
    fn test_max_size() {
        let mut queue = MusicQueue::new(1);
        queue.add_track(user_item("a")).unwrap();
        assert!(queue.add_track(user_item("b")).is_err());
    }

    #[test]
    fn test_fallback_items_are_not_attributable() {
        let item = QueueItem::fallback(ResolvedEntry {
            reference: MediaReference::new("radio", Category::Stream),
            metadata: TrackMetadata::new("Radio"),
        });
        assert!(item.is_fallback());
        assert_eq!(item.category(), Some(Category::Stream));
        assert!(!item.is_user_attributable());
        assert!(user_item("a").is_user_attributable());
    }

    #[test]
    fn test_snapshot_resumes_current_first() {
        let mut queue = MusicQueue::new(10);
        for locator in ["a", "b", "c"] {
            queue.add_track(user_item(locator)).unwrap();
        }
        queue.next_track();

        let snapshot = queue.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let restored: QueueSnapshot = serde_json::from_str(&json).unwrap();

        let order: Vec<_> = restored
            .into_entries()
            .into_iter()
            .map(|item| item.locator)
            .collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }
}
