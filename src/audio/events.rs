use tokio::sync::mpsc;
use tracing::debug;

use super::queue::QueueItem;

/// Eventos del ciclo de vida del player, en orden de emisión
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    Play { entry: QueueItem },
    Resume { entry: QueueItem },
    Pause { entry: QueueItem },
    Stop,
    FinishedPlaying,
    EntryAdded { entry: QueueItem },
    Error { entry: Option<QueueItem>, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerEventKind {
    Play,
    Resume,
    Pause,
    Stop,
    FinishedPlaying,
    EntryAdded,
    Error,
}

impl PlayerEvent {
    pub fn kind(&self) -> PlayerEventKind {
        match self {
            PlayerEvent::Play { .. } => PlayerEventKind::Play,
            PlayerEvent::Resume { .. } => PlayerEventKind::Resume,
            PlayerEvent::Pause { .. } => PlayerEventKind::Pause,
            PlayerEvent::Stop => PlayerEventKind::Stop,
            PlayerEvent::FinishedPlaying => PlayerEventKind::FinishedPlaying,
            PlayerEvent::EntryAdded { .. } => PlayerEventKind::EntryAdded,
            PlayerEvent::Error { .. } => PlayerEventKind::Error,
        }
    }
}

/// Extremo emisor del canal de eventos de una sesión
#[derive(Debug, Clone)]
pub struct PlayerEmitter {
    tx: mpsc::UnboundedSender<PlayerEvent>,
}

impl PlayerEmitter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PlayerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: PlayerEvent) {
        let kind = event.kind();
        if self.tx.send(event).is_err() {
            debug!("Router cerrado, evento {:?} descartado", kind);
        }
    }
}
