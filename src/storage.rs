use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serenity::model::id::GuildId;
use std::path::{Path, PathBuf};
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::{
    audio::queue::QueueSnapshot,
    autoplay::{Category, ModeState, RemovalRecord},
    error::Result,
};

/// Persistencia del estado de autoplay por guild
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn write_mode_state(&self, guild_id: GuildId, state: &ModeState) -> Result<()>;

    async fn read_mode_state(&self, guild_id: GuildId) -> Result<Option<ModeState>>;

    async fn write_source_list(
        &self,
        guild_id: GuildId,
        category: Category,
        locators: &[String],
    ) -> Result<()>;

    async fn read_source_list(
        &self,
        guild_id: GuildId,
        category: Category,
    ) -> Result<Option<Vec<String>>>;

    async fn append_removal_log(
        &self,
        guild_id: GuildId,
        category: Category,
        record: &RemovalRecord,
    ) -> Result<()>;

    async fn write_queue_snapshot(&self, guild_id: GuildId, snapshot: &QueueSnapshot) -> Result<()>;

    async fn read_queue_snapshot(&self, guild_id: GuildId) -> Result<Option<QueueSnapshot>>;

    /// Escribe el título en reproducción para superficies externas (OBS, etc.)
    async fn write_now_playing(&self, guild_id: GuildId, title: &str) -> Result<()>;
}

/// Almacenamiento basado en archivos JSON bajo `data_dir/guilds/<id>/`
pub struct JsonStorage {
    data_dir: PathBuf,
}

impl JsonStorage {
    pub async fn new(data_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(data_dir.join("guilds")).await?;

        info!("📁 Storage inicializado en: {}", data_dir.display());

        Ok(Self { data_dir })
    }

    /// Lee el log de eliminaciones de una categoría
    pub async fn read_removal_log(
        &self,
        guild_id: GuildId,
        category: Category,
    ) -> Result<Vec<RemovalRecord>> {
        let path = self.removal_log_path(guild_id, category);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str(line) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Línea inválida en {}: {}", path.display(), e),
            }
        }
        Ok(records)
    }

    // Métodos privados

    fn guild_dir(&self, guild_id: GuildId) -> PathBuf {
        self.data_dir.join("guilds").join(guild_id.get().to_string())
    }

    fn source_list_path(&self, guild_id: GuildId, category: Category) -> PathBuf {
        self.guild_dir(guild_id)
            .join(format!("{}.json", category.file_stem()))
    }

    fn removal_log_path(&self, guild_id: GuildId, category: Category) -> PathBuf {
        self.guild_dir(guild_id)
            .join(format!("{}_removed.jsonl", category.file_stem()))
    }

    async fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        match fs::read_to_string(path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<()> {
        let content = serde_json::to_vec_pretty(value)?;
        write_atomic(path, &content).await
    }
}

#[async_trait]
impl PersistenceGateway for JsonStorage {
    async fn write_mode_state(&self, guild_id: GuildId, state: &ModeState) -> Result<()> {
        self.write_json(&self.guild_dir(guild_id).join("mode.json"), state)
            .await?;
        debug!("💾 Modo guardado para guild {}: {:?}", guild_id, state);
        Ok(())
    }

    async fn read_mode_state(&self, guild_id: GuildId) -> Result<Option<ModeState>> {
        let state: Option<ModeState> = self
            .read_json(&self.guild_dir(guild_id).join("mode.json"))
            .await?;
        Ok(state.map(ModeState::normalized))
    }

    async fn write_source_list(
        &self,
        guild_id: GuildId,
        category: Category,
        locators: &[String],
    ) -> Result<()> {
        self.write_json(&self.source_list_path(guild_id, category), locators)
            .await
    }

    async fn read_source_list(
        &self,
        guild_id: GuildId,
        category: Category,
    ) -> Result<Option<Vec<String>>> {
        self.read_json(&self.source_list_path(guild_id, category))
            .await
    }

    async fn append_removal_log(
        &self,
        guild_id: GuildId,
        category: Category,
        record: &RemovalRecord,
    ) -> Result<()> {
        let path = self.removal_log_path(guild_id, category);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(&line).await?;
        file.sync_data().await?;
        Ok(())
    }

    async fn write_queue_snapshot(&self, guild_id: GuildId, snapshot: &QueueSnapshot) -> Result<()> {
        self.write_json(&self.guild_dir(guild_id).join("queue.json"), snapshot)
            .await
    }

    async fn read_queue_snapshot(&self, guild_id: GuildId) -> Result<Option<QueueSnapshot>> {
        self.read_json(&self.guild_dir(guild_id).join("queue.json"))
            .await
    }

    async fn write_now_playing(&self, guild_id: GuildId, title: &str) -> Result<()> {
        write_atomic(
            &self.guild_dir(guild_id).join("current.txt"),
            title.as_bytes(),
        )
        .await
    }
}

/// Escribe en un archivo temporal hermano y lo renombra al destino
async fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let tmp = path.with_extension("tmp");
    let mut file = fs::File::create(&tmp).await?;
    file.write_all(content).await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(&tmp, path).await?;
    Ok(())
}

/// Lee una lista semilla: un locator por línea, ignorando vacías y comentarios `#`
pub async fn read_locator_file(path: &Path) -> Result<Vec<String>> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("📄 Lista semilla no encontrada: {}", path.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}
