use serenity::model::id::{ChannelId, GuildId};
use std::{fmt, sync::Arc};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use super::{
    notify::Notifier,
    queue::{GuildQueue, PlaybackState, QueueSnapshot, QueueStore},
    voice::{VoiceLink, VoiceSessionManager},
};
use crate::{
    error::{MusicError, MusicResult},
    sources::{ByteStream, Song, StreamAcquirer},
};

/// Cómo terminó una pista.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackOutcome {
    /// El stream se agotó o la pista fue detenida.
    Finished,
    /// El driver reportó un error (incluye cortes del extractor a mitad).
    Failed(String),
}

/// Controles de la pista cargada en el driver de voz.
pub trait TrackControl: Send + Sync {
    fn pause(&self) -> MusicResult<()>;
    fn resume(&self) -> MusicResult<()>;
    fn stop(&self) -> MusicResult<()>;
    fn set_volume(&self, volume: f32) -> MusicResult<()>;
}

/// Pista recién entregada al driver: sus controles y el evento de fin.
pub struct LoadedTrack {
    pub control: Box<dyn TrackControl>,
    pub outcome: oneshot::Receiver<TrackOutcome>,
}

/// Reproductor de un guild. Se crea una vez por sesión de voz y se reusa
/// entre pistas.
pub struct Player {
    link: Arc<dyn VoiceLink>,
    current: Option<Box<dyn TrackControl>>,
}

impl Player {
    pub fn new(link: Arc<dyn VoiceLink>) -> Self {
        Self { link, current: None }
    }

    /// Reemplaza la pista actual por una nueva y devuelve su evento de fin.
    pub async fn load(
        &mut self,
        stream: ByteStream,
        volume: f32,
    ) -> MusicResult<oneshot::Receiver<TrackOutcome>> {
        self.halt();
        let LoadedTrack { control, outcome } = self.link.play(stream, volume).await?;
        self.current = Some(control);
        Ok(outcome)
    }

    pub fn has_track(&self) -> bool {
        self.current.is_some()
    }

    pub fn pause(&self) -> MusicResult<()> {
        self.track()?.pause()
    }

    pub fn resume(&self) -> MusicResult<()> {
        self.track()?.resume()
    }

    /// Detiene la pista sin soltarla: su evento de fin sigue su curso.
    pub fn stop(&self) -> MusicResult<()> {
        self.track()?.stop()
    }

    pub fn set_volume(&self, volume: f32) -> MusicResult<()> {
        self.track()?.set_volume(volume)
    }

    /// Detiene y suelta la pista actual, liberando su stream.
    pub fn release(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        if let Some(track) = self.current.take() {
            // Ya puede estar terminada
            if let Err(e) = track.stop() {
                debug!("Pista anterior ya detenida: {}", e);
            }
        }
    }

    fn track(&self) -> MusicResult<&dyn TrackControl> {
        self.current
            .as_deref()
            .ok_or_else(|| MusicError::PlayerFault("no track loaded".to_string()))
    }
}

impl fmt::Debug for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Player")
            .field("has_track", &self.has_track())
            .finish()
    }
}

/// Máquina de estados de reproducción de todos los guilds.
///
/// Cada operación toma el mutex de la cola del guild y lo mantiene hasta
/// terminar, incluidas las esperas de join y de adquisición del stream. Los
/// eventos de pista y de conexión llegan por tareas vigía que vuelven a
/// entrar por ese mismo mutex y se descartan si su generación o su sesión
/// ya no son las vigentes.
#[derive(Clone)]
pub struct PlaybackController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    store: QueueStore,
    sessions: VoiceSessionManager,
    acquirer: Arc<dyn StreamAcquirer>,
    notifier: Arc<dyn Notifier>,
    max_queue_size: usize,
}

impl PlaybackController {
    pub fn new(
        store: QueueStore,
        sessions: VoiceSessionManager,
        acquirer: Arc<dyn StreamAcquirer>,
        notifier: Arc<dyn Notifier>,
        max_queue_size: usize,
    ) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                store,
                sessions,
                acquirer,
                notifier,
                max_queue_size,
            }),
        }
    }

    pub fn store(&self) -> &QueueStore {
        &self.inner.store
    }

    /// Agrega una canción. Si la cola estaba inactiva arranca la
    /// reproducción (el aviso "Now playing" lo emite `advance`); si no,
    /// devuelve el aviso de canción encolada.
    pub async fn enqueue(
        &self,
        guild_id: GuildId,
        text_channel: ChannelId,
        voice_channel: ChannelId,
        song: Song,
    ) -> MusicResult<Option<String>> {
        let shared = self.inner.store.get_or_create(guild_id);
        let mut queue = shared.lock().await;

        if queue.pending() >= self.inner.max_queue_size {
            warn!("📦 Cola llena en guild {}", guild_id);
            return Err(MusicError::QueueFull(self.inner.max_queue_size));
        }

        queue.set_targets(text_channel, voice_channel);
        let title = song.title().to_string();
        queue.push(song);

        if queue.state() == PlaybackState::Idle {
            self.advance(&mut queue).await;
            Ok(None)
        } else {
            Ok(Some(format!("Added to queue: **{}**", title)))
        }
    }

    pub async fn skip(&self, guild_id: GuildId) -> MusicResult<String> {
        let shared = self.inner.store.get_or_create(guild_id);
        let mut queue = shared.lock().await;

        if queue.state() == PlaybackState::Idle {
            return Ok("No song is currently playing.".to_string());
        }

        // El fin de la pista detenida dispara `advance` desde su vigía
        let stopped = match queue.player_mut() {
            Some(player) => player.stop(),
            None => Err(MusicError::PlayerFault("no player".to_string())),
        };
        if let Err(e) = stopped {
            warn!("⏭️ No se pudo detener la pista en guild {}: {}", guild_id, e);
            self.advance(&mut queue).await;
        }

        info!("⏭️ Canción saltada en guild {}", guild_id);
        Ok("Skipped the current song.".to_string())
    }

    pub async fn pause(&self, guild_id: GuildId) -> MusicResult<String> {
        let shared = self.inner.store.get_or_create(guild_id);
        let mut queue = shared.lock().await;

        if queue.state() != PlaybackState::Playing {
            return Ok("No song is currently playing or already paused.".to_string());
        }

        if let Some(player) = queue.player_mut() {
            player.pause()?;
        }
        queue.set_state(PlaybackState::Paused);
        info!("⏸️ Reproducción pausada en guild {}", guild_id);
        Ok("Paused the music.".to_string())
    }

    pub async fn resume(&self, guild_id: GuildId) -> MusicResult<String> {
        let shared = self.inner.store.get_or_create(guild_id);
        let mut queue = shared.lock().await;

        if queue.state() != PlaybackState::Paused {
            return Ok("The music is not paused.".to_string());
        }

        if let Some(player) = queue.player_mut() {
            player.resume()?;
        }
        queue.set_state(PlaybackState::Playing);
        info!("▶️ Reproducción reanudada en guild {}", guild_id);
        Ok("Resumed the music.".to_string())
    }

    /// Vacía la cola y cierra reproductor y sesión. Idempotente.
    pub async fn stop(&self, guild_id: GuildId) -> MusicResult<String> {
        let shared = self.inner.store.get_or_create(guild_id);
        let mut queue = shared.lock().await;

        queue.clear();
        self.release(&mut queue).await;
        queue.set_state(PlaybackState::Idle);

        info!("⏹️ Reproducción detenida en guild {}", guild_id);
        Ok("Stopped the music and cleared the queue.".to_string())
    }

    /// `percent` en unidades de usuario, `0..=100`.
    pub async fn set_volume(&self, guild_id: GuildId, percent: i64) -> MusicResult<String> {
        if !(0..=100).contains(&percent) {
            return Err(MusicError::InvalidArgument(
                "Please provide a volume between 0 and 100.".to_string(),
            ));
        }

        let shared = self.inner.store.get_or_create(guild_id);
        let mut queue = shared.lock().await;

        let volume = percent as f32 / 100.0;
        queue.set_volume(volume);
        if let Some(player) = queue.player_mut().filter(|p| p.has_track()) {
            if let Err(e) = player.set_volume(volume) {
                warn!("🔊 No se pudo aplicar el volumen en guild {}: {}", guild_id, e);
            }
        }

        info!("🔊 Volumen ajustado a {}% en guild {}", percent, guild_id);
        Ok(format!("Volume set to {}%.", percent))
    }

    /// Sale del canal sin tocar las canciones.
    pub async fn leave(&self, guild_id: GuildId) -> MusicResult<String> {
        let shared = self.inner.store.get_or_create(guild_id);
        let mut queue = shared.lock().await;

        self.release(&mut queue).await;
        queue.set_state(PlaybackState::Idle);
        queue.clear_targets();

        Ok("Left the voice channel.".to_string())
    }

    /// El bot fue sacado del canal desde fuera. El aviso de la plataforma
    /// se refiere a sesiones ya abiertas cuando llega: si al tomar el lock
    /// no hay sesión, o la que hay se abrió después (un `play` que esperaba
    /// su join), es el eco de un `stop`/`leave` propio y se ignora.
    pub async fn evict(&self, guild_id: GuildId) {
        let newest = self.inner.sessions.last_issued();
        let shared = self.inner.store.get_or_create(guild_id);
        let mut queue = shared.lock().await;

        match queue.session_id() {
            Some(id) if id <= newest => {}
            Some(id) => {
                debug!("Eco de desconexión anterior a la sesión {} en guild {}", id, guild_id);
                return;
            }
            None => return,
        }

        warn!("🚪 Desconectado del canal de voz por terceros en guild {}", guild_id);
        self.notify(&queue, "Disconnected from the voice channel.".to_string())
            .await;
        self.release(&mut queue).await;
        queue.set_state(PlaybackState::Idle);
        queue.clear_targets();
    }

    pub async fn snapshot(&self, guild_id: GuildId) -> QueueSnapshot {
        let shared = self.inner.store.get_or_create(guild_id);
        let queue = shared.lock().await;
        queue.snapshot()
    }

    /// Fin o error de la pista de generación `generation`.
    pub async fn on_track_outcome(&self, guild_id: GuildId, generation: u64, outcome: TrackOutcome) {
        let shared = self.inner.store.get_or_create(guild_id);
        let mut queue = shared.lock().await;

        if queue.generation() != generation {
            debug!(
                "Evento de pista obsoleto en guild {} (gen {} != {})",
                guild_id,
                generation,
                queue.generation()
            );
            return;
        }

        if let TrackOutcome::Failed(reason) = outcome {
            let title = queue
                .current()
                .map(|song| song.title().to_string())
                .unwrap_or_default();
            error!("❌ Error reproduciendo {} en guild {}: {}", title, guild_id, reason);
            self.notify(
                &queue,
                format!("An error occurred while playing **{}**: {}", title, reason),
            )
            .await;
        }

        self.advance(&mut queue).await;
    }

    /// La sesión `session_id` se perdió sin recuperarse.
    pub async fn on_connection_lost(&self, guild_id: GuildId, session_id: u64) {
        let shared = self.inner.store.get_or_create(guild_id);
        let mut queue = shared.lock().await;

        if queue.session_id() != Some(session_id) {
            debug!("Pérdida de una sesión ya cerrada en guild {}", guild_id);
            return;
        }

        warn!("🔌 {} en guild {}", MusicError::ConnectionLost, guild_id);
        self.release(&mut queue).await;
        queue.set_state(PlaybackState::Idle);
        self.notify(
            &queue,
            "Lost the connection to the voice channel. Use play to continue.".to_string(),
        )
        .await;
    }

    /// Pasa a la siguiente canción reproducible. Itera en vez de recursar:
    /// cada vuelta consume un índice, así que termina aunque ninguna
    /// canción restante sea reproducible.
    async fn advance(&self, queue: &mut GuildQueue) {
        queue.bump_generation();

        loop {
            let Some(index) = queue.step() else {
                self.finish(queue).await;
                return;
            };

            let song = queue.songs()[index].clone();
            if !song.has_valid_id() {
                warn!("⚠️ Saltando canción con id inválido: {:?}", song.id());
                continue;
            }

            match self.start(queue, &song).await {
                Ok(()) => {
                    info!(
                        "🎵 Reproduciendo: {} de {} en guild {}",
                        song.title(),
                        song.author(),
                        queue.guild_id()
                    );
                    if let Some(thumbnail) = song.thumbnail() {
                        debug!("🖼️ Miniatura: {}", thumbnail);
                    }
                    self.notify(queue, format!("Now playing: **{}**", song.title()))
                        .await;
                    return;
                }
                Err(e @ MusicError::Join(_)) => {
                    error!("❌ Join fallido en guild {}: {}", queue.guild_id(), e);
                    queue.rewind();
                    self.release(queue).await;
                    queue.set_state(PlaybackState::Idle);
                    self.notify(queue, e.to_string()).await;
                    return;
                }
                Err(e) => {
                    error!("❌ Error reproduciendo {}: {}", song.title(), e);
                    self.notify(queue, format!("Failed to play the song: {}", e))
                        .await;
                }
            }
        }
    }

    /// Conecta si hace falta, abre el stream y lo entrega al reproductor.
    async fn start(&self, queue: &mut GuildQueue, song: &Song) -> MusicResult<()> {
        let guild_id = queue.guild_id();
        let channel_id = queue
            .voice_target()
            .ok_or_else(|| MusicError::Join("no voice channel to join".to_string()))?;

        if queue.session_id().is_none() {
            queue.set_state(PlaybackState::Connecting);
        }

        let session = self
            .inner
            .sessions
            .connect(queue.session_slot(), guild_id, channel_id)
            .await?;
        let session_id = session.id();
        let link = session.link();
        if let Some(lost) = session.take_lost_signal() {
            self.watch_session(guild_id, session_id, lost);
        }

        if queue.player_mut().is_none() {
            queue.install_player(Player::new(link));
        }

        let stream = self.inner.acquirer.open_stream(song).await?;
        let volume = queue.volume();
        let outcome = match queue.player_mut() {
            Some(player) => player.load(stream, volume).await?,
            None => return Err(MusicError::PlayerFault("player missing".to_string())),
        };

        let generation = queue.bump_generation();
        self.watch_track(guild_id, generation, outcome);
        queue.set_state(PlaybackState::Playing);
        Ok(())
    }

    /// Fin de la cola: se descartan las canciones ya reproducidas y se
    /// libera la conexión. Los destinos se conservan para el próximo `play`.
    async fn finish(&self, queue: &mut GuildQueue) {
        queue.clear();
        self.release(queue).await;
        queue.set_state(PlaybackState::Idle);
        self.notify(queue, "The queue has finished.".to_string()).await;
    }

    /// Suelta reproductor y sesión e invalida sus eventos pendientes.
    async fn release(&self, queue: &mut GuildQueue) {
        queue.bump_generation();
        if let Some(player) = queue.take_player() {
            player.release();
        }
        if let Some(session) = queue.take_session() {
            self.inner.sessions.destroy(session).await;
        }
    }

    fn watch_track(&self, guild_id: GuildId, generation: u64, outcome: oneshot::Receiver<TrackOutcome>) {
        let controller = self.clone();
        tokio::spawn(async move {
            // Un emisor soltado sin avisar cuenta como fin normal
            let outcome = outcome.await.unwrap_or(TrackOutcome::Finished);
            controller.on_track_outcome(guild_id, generation, outcome).await;
        });
    }

    fn watch_session(&self, guild_id: GuildId, session_id: u64, lost: oneshot::Receiver<()>) {
        let controller = self.clone();
        tokio::spawn(async move {
            if lost.await.is_ok() {
                controller.on_connection_lost(guild_id, session_id).await;
            }
        });
    }

    async fn notify(&self, queue: &GuildQueue, text: String) {
        match queue.notify_target() {
            Some(target) => self.inner.notifier.notify(target, text).await,
            None => debug!("Sin canal de avisos en guild {}: {}", queue.guild_id(), text),
        }
    }
}
