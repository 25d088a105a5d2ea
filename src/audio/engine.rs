use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{
    notify::Notifier,
    player::PlaybackController,
    queue::{QueueSnapshot, QueueStore},
    voice::{VoiceGateway, VoiceSessionManager},
};
use crate::{
    config::Config,
    error::{MusicError, MusicResult},
    sources::{SongResolver, StreamAcquirer},
};

/// De dónde viene una orden: guild, canal de texto donde responder y, si el
/// autor está en uno, su canal de voz.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandOrigin {
    pub guild_id: GuildId,
    pub text_channel: ChannelId,
    pub voice_channel: Option<ChannelId>,
}

/// Contrato público del reproductor. Cada operación termina en un aviso al
/// canal de origen; los errores nunca salen de aquí.
#[derive(Clone)]
pub struct MusicEngine {
    resolver: Arc<dyn SongResolver>,
    controller: PlaybackController,
    notifier: Arc<dyn Notifier>,
}

impl MusicEngine {
    pub fn new(
        config: &Config,
        resolver: Arc<dyn SongResolver>,
        acquirer: Arc<dyn StreamAcquirer>,
        gateway: Arc<dyn VoiceGateway>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let sessions = VoiceSessionManager::new(gateway, config.recovery_window(), config.join_timeout());
        let controller = PlaybackController::new(
            QueueStore::new(config.default_volume),
            sessions,
            acquirer,
            notifier.clone(),
            config.max_queue_size,
        );

        Self {
            resolver,
            controller,
            notifier,
        }
    }

    pub async fn play(&self, origin: &CommandOrigin, query: &str) {
        let result = self.try_play(origin, query).await;
        match result {
            Ok(Some(text)) => self.reply(origin, text).await,
            Ok(None) => {}
            Err(e) => self.reject(origin, e).await,
        }
    }

    async fn try_play(&self, origin: &CommandOrigin, query: &str) -> MusicResult<Option<String>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(MusicError::InvalidArgument(
                "Please provide a song name or YouTube URL.".to_string(),
            ));
        }

        let voice_channel = origin.voice_channel.ok_or_else(|| {
            MusicError::InvalidArgument("You need to be in a voice channel to play music!".to_string())
        })?;

        // Se resuelve fuera del lock del guild
        let song = self.resolver.resolve(query).await?;

        self.controller
            .enqueue(origin.guild_id, origin.text_channel, voice_channel, song)
            .await
    }

    pub async fn skip(&self, origin: &CommandOrigin) {
        let result = self.controller.skip(origin.guild_id).await;
        self.respond(origin, result).await;
    }

    pub async fn pause(&self, origin: &CommandOrigin) {
        let result = self.controller.pause(origin.guild_id).await;
        self.respond(origin, result).await;
    }

    pub async fn resume(&self, origin: &CommandOrigin) {
        let result = self.controller.resume(origin.guild_id).await;
        self.respond(origin, result).await;
    }

    pub async fn stop(&self, origin: &CommandOrigin) {
        let result = self.controller.stop(origin.guild_id).await;
        self.respond(origin, result).await;
    }

    /// `raw` es el argumento tal como lo escribió el usuario.
    pub async fn set_volume(&self, origin: &CommandOrigin, raw: &str) {
        let result = match raw.trim().parse::<i64>() {
            Ok(percent) => self.controller.set_volume(origin.guild_id, percent).await,
            Err(_) => Err(MusicError::InvalidArgument(
                "Please provide a volume between 0 and 100.".to_string(),
            )),
        };
        self.respond(origin, result).await;
    }

    pub async fn leave(&self, origin: &CommandOrigin) {
        let result = self.controller.leave(origin.guild_id).await;
        self.respond(origin, result).await;
    }

    /// Envía la cola al canal de origen y devuelve la misma vista.
    pub async fn describe_queue(&self, origin: &CommandOrigin) -> QueueSnapshot {
        let snapshot = self.snapshot(origin.guild_id).await;
        debug!(
            "📋 Cola de guild {}: {} canciones, {:?}, volumen {:.2}, conectado={} reproductor={}",
            origin.guild_id,
            snapshot.songs.len(),
            snapshot.state,
            snapshot.volume,
            snapshot.connected,
            snapshot.has_player
        );
        self.reply(origin, snapshot.render()).await;
        snapshot
    }

    pub async fn snapshot(&self, guild_id: GuildId) -> QueueSnapshot {
        self.controller.snapshot(guild_id).await
    }

    /// El bot fue sacado de su canal de voz.
    pub async fn evict(&self, guild_id: GuildId) {
        self.controller.evict(guild_id).await;
    }

    pub fn active_guilds(&self) -> usize {
        self.controller.store().len()
    }

    async fn respond(&self, origin: &CommandOrigin, result: MusicResult<String>) {
        match result {
            Ok(text) => self.reply(origin, text).await,
            Err(e) => self.reject(origin, e).await,
        }
    }

    async fn reject(&self, origin: &CommandOrigin, error: MusicError) {
        warn!("⚠️ Orden rechazada en guild {}: {}", origin.guild_id, error);
        let text = match error {
            MusicError::Resolution { .. } => "No results found for that query.".to_string(),
            other => other.to_string(),
        };
        self.reply(origin, text).await;
    }

    async fn reply(&self, origin: &CommandOrigin, text: String) {
        info!("💬 [{}] {}", origin.guild_id, text.lines().next().unwrap_or_default());
        self.notifier.notify(origin.text_channel, text).await;
    }
}
