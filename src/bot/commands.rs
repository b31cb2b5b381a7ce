use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

fn all_commands() -> Vec<CreateCommand> {
    vec![
        join_command(),
        leave_command(),
        play_command(),
        pause_command(),
        resume_command(),
        skip_command(),
        stop_command(),
        save_command(),
        autostream_command(),
        autoplaylist_command(),
        toggleplaylist_command(),
        resetplaylist_command(),
        autostatus_command(),
        autocategory_command(),
    ]
}

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

// Comandos de conexión

fn join_command() -> CreateCommand {
    CreateCommand::new("join").description("Conecta el bot a tu canal de voz")
}

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Desconecta el bot del canal de voz")
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce una URL o archivo")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "url", "URL del medio")
                .required(true),
        )
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pausa la reproducción actual")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Reanuda la reproducción pausada")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Vota para saltar la canción actual")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Detiene la reproducción y limpia la cola")
}

// Comandos de autoplay

fn save_command() -> CreateCommand {
    CreateCommand::new("save")
        .description("Guarda la canción actual (o una URL) en la autoplaylist")
        .add_option(CreateCommandOption::new(
            CommandOptionType::String,
            "url",
            "URL a guardar en lugar de la canción actual",
        ))
}

fn list_action_option() -> CreateCommandOption {
    CreateCommandOption::new(CommandOptionType::String, "action", "Acción sobre la lista")
        .required(true)
        .add_string_choice("Agregar", "add")
        .add_string_choice("Quitar", "remove")
}

fn autostream_command() -> CreateCommand {
    CreateCommand::new("autostream")
        .description("Agrega o quita una transmisión de la lista de autoplay")
        .add_option(list_action_option())
        .add_option(CreateCommandOption::new(
            CommandOptionType::String,
            "url",
            "URL de la transmisión (por defecto, la actual)",
        ))
}

fn autoplaylist_command() -> CreateCommand {
    CreateCommand::new("autoplaylist")
        .description("Agrega o quita una canción de la autoplaylist")
        .add_option(list_action_option())
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "url", "URL de la canción")
                .required(true),
        )
}

fn toggleplaylist_command() -> CreateCommand {
    CreateCommand::new("toggleplaylist")
        .description("Alterna entre autoplaylist y autostream (modo toggle)")
}

fn resetplaylist_command() -> CreateCommand {
    CreateCommand::new("resetplaylist").description("Vacía la cola de autoplay pendiente")
}

fn autostatus_command() -> CreateCommand {
    CreateCommand::new("autostatus").description("Muestra el estado del autoplay")
}

fn autocategory_command() -> CreateCommand {
    CreateCommand::new("autocategory")
        .description("Habilita o deshabilita una lista de autoplay")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "list", "Lista a cambiar")
                .required(true)
                .add_string_choice("Autoplaylist", "playlist")
                .add_string_choice("Autostream", "stream"),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::Boolean, "enabled", "Habilitada")
                .required(true),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_names_are_unique() {
        let names: Vec<String> = all_commands()
            .iter()
            .map(|c| {
                serde_json::to_value(c).unwrap()["name"]
                    .as_str()
                    .unwrap()
                    .to_string()
            })
            .collect();
        let unique: std::collections::HashSet<_> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
        assert!(names.iter().any(|n| n == "toggleplaylist"));
    }
}
