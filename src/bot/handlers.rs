use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::sync::Arc;
use tracing::{info, warn};

use super::{AutoplayBot, GuildSession};
use crate::{
    audio::{player::PlaybackEngine, queue::QueueItem},
    autoplay::{
        AddOutcome, Category, MediaReference, RemoveOutcome, SkipState, ToggleOutcome,
    },
    error::AutoplayError,
    sources::Extractor,
    ui::embeds,
};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &AutoplayBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "join" => handle_join(ctx, &command, bot, guild_id).await?,
        "leave" => handle_leave(ctx, &command, bot, guild_id).await?,
        "play" => handle_play(ctx, &command, bot, guild_id).await?,
        "pause" => handle_pause(ctx, &command, bot, guild_id).await?,
        "resume" => handle_resume(ctx, &command, bot, guild_id).await?,
        "skip" => handle_skip(ctx, &command, bot, guild_id).await?,
        "stop" => handle_stop(ctx, &command, bot, guild_id).await?,
        "save" => handle_save(ctx, &command, bot, guild_id).await?,
        "autostream" => handle_list_edit(ctx, &command, bot, guild_id, Category::Stream).await?,
        "autoplaylist" => {
            handle_list_edit(ctx, &command, bot, guild_id, Category::Default).await?
        }
        "toggleplaylist" => handle_toggle(ctx, &command, bot, guild_id).await?,
        "resetplaylist" => handle_reset(ctx, &command, bot, guild_id).await?,
        "autostatus" => handle_status(ctx, &command, bot, guild_id).await?,
        "autocategory" => handle_category(ctx, &command, bot, guild_id).await?,
        _ => {
            respond_ephemeral(
                ctx,
                &command,
                embeds::create_error_embed("Comando no reconocido", &command.data.name),
            )
            .await?;
        }
    }

    Ok(())
}

// Conexión

async fn handle_join(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &AutoplayBot,
    guild_id: GuildId,
) -> Result<()> {
    let voice_channel_id = get_user_voice_channel(ctx, guild_id, command.user.id)?;
    let session = bot.join(ctx, guild_id, voice_channel_id).await?;

    // Un canal recién conectado sin cola arranca directamente con autoplay
    session.player.play().await?;

    respond(
        ctx,
        command,
        embeds::create_success_embed("Conectado", &format!("🔊 <#{}>", voice_channel_id)),
    )
    .await
}

async fn handle_leave(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &AutoplayBot,
    guild_id: GuildId,
) -> Result<()> {
    bot.leave(ctx, guild_id).await?;

    respond(
        ctx,
        command,
        embeds::create_info_embed("Desconectado", "👋 Hasta la próxima"),
    )
    .await
}

// Reproducción

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &AutoplayBot,
    guild_id: GuildId,
) -> Result<()> {
    let url = string_option(command, "url")
        .ok_or_else(|| anyhow::anyhow!("URL no proporcionada"))?
        .to_string();

    // La extracción puede tardar más que el plazo de respuesta
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let session = match bot.session(guild_id) {
        Some(session) => session,
        None => {
            let channel_id = get_user_voice_channel(ctx, guild_id, command.user.id)?;
            bot.join(ctx, guild_id, channel_id).await?
        }
    };

    let reference = MediaReference::new(url.clone(), Category::Default);
    let metadata = match bot.extractor().resolve(&reference).await {
        Ok(metadata) => metadata,
        Err(e) => {
            warn!("No se pudo resolver {}: {}", url, e);
            return edit(
                ctx,
                command,
                embeds::create_error_embed("No se pudo reproducir", &e.to_string()),
            )
            .await;
        }
    };

    let item = QueueItem::requested(url, metadata, command.user.id, command.channel_id);
    let embed = embeds::create_track_added_embed(&item, session.player.queue_len() + 1);
    session.player.enqueue(item).await?;
    session.player.play().await?;

    edit(ctx, command, embed).await
}

async fn handle_pause(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &AutoplayBot,
    guild_id: GuildId,
) -> Result<()> {
    let session = require_session(bot, guild_id)?;
    session.player.pause().await?;

    respond(
        ctx,
        command,
        embeds::create_info_embed("Pausado", "⏸️ Reproducción pausada"),
    )
    .await
}

async fn handle_resume(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &AutoplayBot,
    guild_id: GuildId,
) -> Result<()> {
    let session = require_session(bot, guild_id)?;
    session.player.play().await?;

    respond(
        ctx,
        command,
        embeds::create_info_embed("Reanudado", "▶️ Reproducción reanudada"),
    )
    .await
}

/// Resultado de un voto de salto
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkipVote {
    /// Quien pidió la canción la salta sin votación
    Immediate,
    Passed,
    Pending { votes: usize, required: usize },
}

fn register_skip_vote(
    state: &mut SkipState,
    current: &QueueItem,
    user_id: UserId,
    required: usize,
) -> SkipVote {
    if current.requested_by == Some(user_id) {
        return SkipVote::Immediate;
    }

    let votes = state.add_vote(user_id);
    if votes >= required {
        SkipVote::Passed
    } else {
        SkipVote::Pending { votes, required }
    }
}

async fn handle_skip(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &AutoplayBot,
    guild_id: GuildId,
) -> Result<()> {
    let session = require_session(bot, guild_id)?;
    let Some(current) = session.player.current() else {
        return respond_ephemeral(
            ctx,
            command,
            embeds::create_error_embed("Nada que saltar", "No hay ninguna canción sonando"),
        )
        .await;
    };

    let vote = register_skip_vote(
        &mut session.skip_state.lock(),
        &current,
        command.user.id,
        bot.config().skips_required,
    );

    let embed = match vote {
        SkipVote::Immediate | SkipVote::Passed => {
            session.player.skip().await?;
            embeds::create_success_embed("Saltada", &format!("⏭️ **{}**", current.title))
        }
        SkipVote::Pending { votes, required } => embeds::create_info_embed(
            "Voto registrado",
            &format!("🗳️ {}/{} votos para saltar **{}**", votes, required, current.title),
        ),
    };

    respond(ctx, command, embed).await
}

async fn handle_stop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &AutoplayBot,
    guild_id: GuildId,
) -> Result<()> {
    let session = require_session(bot, guild_id)?;
    session.autoplay.cancel_refill();
    session.player.stop().await?;

    respond(
        ctx,
        command,
        embeds::create_info_embed("Detenido", "⏹️ Reproducción detenida y cola limpiada"),
    )
    .await
}

// Autoplay

async fn handle_save(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &AutoplayBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(locator) = option_or_current(command, bot, guild_id) else {
        return respond_ephemeral(
            ctx,
            command,
            embeds::create_error_embed("Nada que guardar", "No hay ninguna canción sonando"),
        )
        .await;
    };

    let autoplay = bot.guild_autoplay(guild_id).await?;
    let outcome = autoplay.add_source(Category::Default, &locator).await?;
    respond(ctx, command, add_outcome_embed(outcome, Category::Default, &locator)).await
}

async fn handle_list_edit(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &AutoplayBot,
    guild_id: GuildId,
    category: Category,
) -> Result<()> {
    let action = string_option(command, "action").unwrap_or("add");
    let Some(locator) = option_or_current(command, bot, guild_id) else {
        return respond_ephemeral(
            ctx,
            command,
            embeds::create_error_embed("URL requerida", "No hay ninguna canción sonando"),
        )
        .await;
    };

    let autoplay = bot.guild_autoplay(guild_id).await?;
    let embed = match action {
        "remove" => {
            let outcome = autoplay.remove_source(category, &locator).await?;
            remove_outcome_embed(outcome, category, &locator)
        }
        _ => {
            let outcome = autoplay.add_source(category, &locator).await?;
            add_outcome_embed(outcome, category, &locator)
        }
    };

    respond(ctx, command, embed).await
}

async fn handle_toggle(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &AutoplayBot,
    guild_id: GuildId,
) -> Result<()> {
    let autoplay = bot.guild_autoplay(guild_id).await?;

    let embed = match autoplay.toggle().await {
        Ok(ToggleOutcome::Switched(category)) => {
            // La entrada de respaldo en curso pertenece a la categoría anterior
            if let Some(session) = bot.session(guild_id) {
                let playing_fallback = session
                    .player
                    .current()
                    .is_some_and(|entry| entry.is_fallback());
                if playing_fallback && !session.player.is_stopped() {
                    session.player.skip().await?;
                }
            }
            embeds::create_success_embed(
                "Autoplay alternado",
                &format!("🔀 Ahora usando {}", embeds::category_label(category)),
            )
        }
        Ok(ToggleOutcome::NoOtherCategory) => embeds::create_info_embed(
            "Sin alternativas",
            "No hay otra lista con contenido a la que cambiar",
        ),
        Err(AutoplayError::Configuration(message)) => {
            embeds::create_error_embed("Modo incorrecto", &message)
        }
        Err(e) => return Err(e.into()),
    };

    respond(ctx, command, embed).await
}

async fn handle_reset(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &AutoplayBot,
    guild_id: GuildId,
) -> Result<()> {
    bot.guild_autoplay(guild_id).await?.reset().await?;

    respond(
        ctx,
        command,
        embeds::create_success_embed("Autoplay reiniciado", "🔄 La cola de respaldo se vació"),
    )
    .await
}

async fn handle_status(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &AutoplayBot,
    guild_id: GuildId,
) -> Result<()> {
    let snapshot = bot.guild_autoplay(guild_id).await?.snapshot();

    respond_ephemeral(ctx, command, embeds::create_autoplay_status_embed(&snapshot)).await
}

async fn handle_category(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &AutoplayBot,
    guild_id: GuildId,
) -> Result<()> {
    let category = match string_option(command, "list") {
        Some("stream") => Category::Stream,
        _ => Category::Default,
    };
    let enabled = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "enabled")
        .and_then(|opt| opt.value.as_bool())
        .unwrap_or(true);

    bot.guild_autoplay(guild_id)
        .await?
        .set_category_enabled(category, enabled)
        .await?;

    let state = if enabled { "habilitada" } else { "deshabilitada" };
    respond(
        ctx,
        command,
        embeds::create_success_embed(
            "Lista actualizada",
            &format!("{} {}", embeds::category_label(category), state),
        ),
    )
    .await
}

fn add_outcome_embed(outcome: AddOutcome, category: Category, locator: &str) -> CreateEmbed {
    let label = embeds::category_label(category);
    match outcome {
        AddOutcome::Added => {
            embeds::create_success_embed("Agregada", &format!("`{}` → {}", locator, label))
        }
        AddOutcome::AlreadyExists => {
            embeds::create_info_embed("Ya existe", &format!("`{}` ya está en {}", locator, label))
        }
        AddOutcome::KnownBad => embeds::create_error_embed(
            "Fuente inválida",
            &format!("`{}` fue expulsada por no funcionar", locator),
        ),
    }
}

fn remove_outcome_embed(outcome: RemoveOutcome, category: Category, locator: &str) -> CreateEmbed {
    let label = embeds::category_label(category);
    match outcome {
        RemoveOutcome::Removed => {
            embeds::create_success_embed("Eliminada", &format!("`{}` quitada de {}", locator, label))
        }
        RemoveOutcome::NotFound => {
            embeds::create_info_embed("No encontrada", &format!("`{}` no está en {}", locator, label))
        }
    }
}

// Funciones auxiliares

fn string_option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

/// Locator explícito o, si falta, el de la entrada en reproducción
fn option_or_current(
    command: &CommandInteraction,
    bot: &AutoplayBot,
    guild_id: GuildId,
) -> Option<String> {
    string_option(command, "url")
        .map(str::to_string)
        .or_else(|| {
            bot.session(guild_id)
                .and_then(|s| s.player.current())
                .map(|entry| entry.locator)
        })
}

fn require_session(bot: &AutoplayBot, guild_id: GuildId) -> Result<Arc<GuildSession>> {
    bot.session(guild_id)
        .ok_or_else(|| anyhow::anyhow!("El bot no está conectado a un canal de voz"))
}

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Result<ChannelId> {
    let guild = guild_id
        .to_guild_cached(&ctx.cache)
        .ok_or_else(|| anyhow::anyhow!("Guild no encontrada en caché"))?;

    let channel_id = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
        .ok_or_else(|| anyhow::anyhow!("Debes estar en un canal de voz"))?;

    Ok(channel_id)
}

async fn respond(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().embed(embed),
            ),
        )
        .await?;
    Ok(())
}

async fn respond_ephemeral(
    ctx: &Context,
    command: &CommandInteraction,
    embed: CreateEmbed,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

async fn edit(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::TrackMetadata;
    use pretty_assertions::assert_eq;

    fn entry(requester: u64) -> QueueItem {
        QueueItem::requested(
            "https://example.com/a",
            TrackMetadata::new("A"),
            UserId::new(requester),
            ChannelId::new(1),
        )
    }

    #[test]
    fn test_requester_skips_immediately() {
        let mut state = SkipState::default();
        let vote = register_skip_vote(&mut state, &entry(10), UserId::new(10), 3);
        assert_eq!(vote, SkipVote::Immediate);
        assert_eq!(state.votes(), 0);
    }

    #[test]
    fn test_skip_needs_distinct_votes() {
        let mut state = SkipState::default();
        let current = entry(10);

        assert_eq!(
            register_skip_vote(&mut state, &current, UserId::new(1), 2),
            SkipVote::Pending {
                votes: 1,
                required: 2
            }
        );
        // Votar dos veces no cuenta doble
        assert_eq!(
            register_skip_vote(&mut state, &current, UserId::new(1), 2),
            SkipVote::Pending {
                votes: 1,
                required: 2
            }
        );
        assert_eq!(
            register_skip_vote(&mut state, &current, UserId::new(2), 2),
            SkipVote::Passed
        );
    }
}
