use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use super::NowPlaying;
use crate::{
    audio::queue::QueueItem,
    autoplay::{AutoMode, AutoplaySnapshot, Category, SelectorState},
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Guild Autoplay";

/// Cuántos locators se muestran por lista en `/autostatus`
const PREVIEW_LEN: usize = 5;

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(notice: &NowPlaying) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", notice.title))
        .color(if notice.category.is_some() {
            colors::MUSIC_PURPLE
        } else {
            colors::SUCCESS_GREEN
        });

    embed = match notice.duration {
        Some(duration) if !notice.is_live => {
            embed.field("⏱️ Duración", format_duration(duration), true)
        }
        _ => embed.field("⏱️ Duración", "🔴 En vivo", true),
    };

    embed = match (notice.requester, notice.category) {
        (Some(user), _) => embed.field("👤 Solicitado por", format!("<@{}>", user), true),
        (None, Some(category)) => embed.field("🤖 Autoplay", category_label(category), true),
        (None, None) => embed,
    };

    if notice.locator.starts_with("http") {
        embed = embed.url(&notice.locator);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar que se agregó una canción
pub fn create_track_added_embed(track: &QueueItem, position: usize) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("✅ Canción Agregada Exitosamente")
        .description(format!(
            "**{}** se ha agregado a la cola de reproducción",
            track.title
        ))
        .color(colors::SUCCESS_GREEN)
        .field("📍 Posición", position.to_string(), true);

    if let Some(duration) = track.duration {
        embed = embed.field("⏱️ Duración", format_duration(duration), true);
    } else if track.is_live {
        embed = embed.field("⏱️ Duración", "🔴 En vivo", true);
    }

    if let Some(user) = track.requested_by {
        embed = embed.field("👤 Solicitado por", format!("<@{}>", user), true);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(
            "🎵 Se reproducirá automáticamente si no hay música sonando",
        ))
}

/// Estado del autoplay de un guild
pub fn create_autoplay_status_embed(snapshot: &AutoplaySnapshot) -> CreateEmbed {
    let mode = match (snapshot.mode.mode, snapshot.mode.active) {
        (AutoMode::Toggle, Some(active)) => format!("toggle ({})", category_label(active)),
        (mode, _) => mode.to_string(),
    };
    let selector = match snapshot.selector {
        SelectorState::Idle => "💤 En espera",
        SelectorState::Refilling => "🔄 Buscando",
        SelectorState::Exhausted => "⚠️ Agotado",
        SelectorState::Disabled => "⛔ Deshabilitado",
    };
    let color = if snapshot.selector == SelectorState::Disabled {
        colors::WARNING_ORANGE
    } else {
        colors::MUSIC_PURPLE
    };

    CreateEmbed::default()
        .title("🤖 Estado del Autoplay")
        .color(color)
        .field("🎛️ Modo", mode, true)
        .field("📡 Selector", selector, true)
        .field("⏳ Pendientes", snapshot.pending.to_string(), true)
        .field(
            format!(
                "{} ({})",
                category_label(Category::Default),
                snapshot.playlist.len()
            ),
            preview(&snapshot.playlist, snapshot.availability.default),
            false,
        )
        .field(
            format!(
                "{} ({})",
                category_label(Category::Stream),
                snapshot.stream.len()
            ),
            preview(&snapshot.stream, snapshot.availability.stream),
            false,
        )
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de éxito
pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de información
pub fn create_info_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("ℹ️ {}", title))
        .description(description)
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn category_label(category: Category) -> &'static str {
    match category {
        Category::Default => "📜 Autoplaylist",
        Category::Stream => "📻 Autostream",
    }
}

fn preview(locators: &[String], available: bool) -> String {
    if locators.is_empty() {
        return "*vacía*".to_string();
    }

    let mut lines: Vec<String> = locators
        .iter()
        .take(PREVIEW_LEN)
        .map(|l| format!("• {}", l))
        .collect();
    if locators.len() > PREVIEW_LEN {
        lines.push(format!("… y {} más", locators.len() - PREVIEW_LEN));
    }
    if !available {
        lines.push("*(deshabilitada)*".to_string());
    }
    lines.join("\n")
}

/// Formatea una duración como `m:ss` o `h:mm:ss`
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(59)), "0:59");
        assert_eq!(format_duration(Duration::from_secs(183)), "3:03");
        assert_eq!(format_duration(Duration::from_secs(3723)), "1:02:03");
    }

    #[test]
    fn test_preview_truncates_long_lists() {
        let locators: Vec<String> = (0..8).map(|i| format!("url{}", i)).collect();
        let text = preview(&locators, true);
        assert_eq!(text.lines().count(), PREVIEW_LEN + 1);
        assert!(text.ends_with("… y 3 más"));

        assert_eq!(preview(&[], true), "*vacía*");
        assert!(preview(&locators[..1], false).contains("deshabilitada"));
    }
}
