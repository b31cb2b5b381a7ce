use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::SerenityInit;
use std::sync::Arc;
use tracing::{error, info, warn};

mod audio;
mod autoplay;
mod bot;
mod config;
mod error;
mod sources;
mod storage;
mod ui;

use crate::autoplay::SeedLists;
use crate::bot::AutoplayBot;
use crate::config::Config;
use crate::sources::YtDlpExtractor;
use crate::storage::{read_locator_file, JsonStorage};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("guild_autoplay=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Guild Autoplay v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    // Inicializar almacenamiento JSON
    let storage = Arc::new(JsonStorage::new(config.data_dir.clone()).await?);

    let extractor = Arc::new(YtDlpExtractor::new(config.extraction_timeout));
    if let Err(e) = extractor.verify().await {
        warn!("⚠️ yt-dlp no disponible, el autoplay no podrá resolver fuentes: {}", e);
    }

    // Listas semilla para guilds sin listas propias
    let seeds = SeedLists {
        default: read_locator_file(&config.auto_playlist_file).await?,
        stream: read_locator_file(&config.auto_stream_file).await?,
    };
    info!(
        "📜 Semillas: {} en autoplaylist, {} en autostream",
        seeds.default.len(),
        seeds.stream.len()
    );

    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let handler = AutoplayBot::new(config.clone(), storage, extractor, seeds);

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird()
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check() -> Result<()> {
    // Verificar dependencias críticas
    let yt_dlp = async_process::Command::new("yt-dlp")
        .arg("--version")
        .output()
        .await?;

    let ffmpeg = async_process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await?;

    if yt_dlp.status.success() && ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}
