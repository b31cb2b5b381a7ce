use serenity::{async_trait, model::id::GuildId};
use songbird::{
    events::CoreEvent, Call, Event as VoiceEvent, EventContext, EventHandler as VoiceEventHandler,
};
use tracing::{info, warn};

/// Handler para desconexiones del driver de voz
pub struct DriverDisconnectHandler {
    pub guild_id: GuildId,
}

#[async_trait]
impl VoiceEventHandler for DriverDisconnectHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        if let EventContext::DriverDisconnect(data) = ctx {
            warn!(
                "🔌 Driver de voz desconectado en guild {}: {:?}",
                self.guild_id, data.reason
            );
        }

        None
    }
}

/// Handler para reconexiones automáticas
pub struct ReconnectHandler {
    pub guild_id: GuildId,
}

#[async_trait]
impl VoiceEventHandler for ReconnectHandler {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        info!("🔄 Reconectado al canal de voz en guild {}", self.guild_id);
        None
    }
}

/// Registra los handlers globales de la llamada de un guild
pub fn register_voice_events(call: &mut Call, guild_id: GuildId) {
    call.add_global_event(
        VoiceEvent::Core(CoreEvent::DriverDisconnect),
        DriverDisconnectHandler { guild_id },
    );

    call.add_global_event(
        VoiceEvent::Core(CoreEvent::DriverReconnect),
        ReconnectHandler { guild_id },
    );
}
