use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use std::{sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{player::Player, voice::VoiceSession};
use crate::sources::Song;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Connecting,
    Playing,
    Paused,
}

/// Cola de un guild: única fuente de verdad de su reproducción.
///
/// Sólo se modifica a través del mutex de [`QueueStore`], de modo que las
/// operaciones sobre un mismo guild quedan serializadas.
#[derive(Debug)]
pub struct GuildQueue {
    guild_id: GuildId,
    songs: Vec<Song>,
    current_index: Option<usize>,
    state: PlaybackState,
    volume: f32,
    session: Option<VoiceSession>,
    player: Option<Player>,
    notify_target: Option<ChannelId>,
    voice_target: Option<ChannelId>,
    generation: u64,
}

impl GuildQueue {
    pub fn new(guild_id: GuildId, volume: f32) -> Self {
        Self {
            guild_id,
            songs: Vec::new(),
            current_index: None,
            state: PlaybackState::Idle,
            volume: volume.clamp(0.0, 1.0),
            session: None,
            player: None,
            notify_target: None,
            voice_target: None,
            generation: 0,
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn songs(&self) -> &[Song] {
        &self.songs
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    /// Canciones que aún no terminaron, contando la actual. Las ya
    /// reproducidas siguen en `songs` hasta el fin de la cola.
    pub fn pending(&self) -> usize {
        self.songs.len().saturating_sub(self.current_index.unwrap_or(0))
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn current(&self) -> Option<&Song> {
        self.current_index.and_then(|i| self.songs.get(i))
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn set_state(&mut self, state: PlaybackState) {
        if self.state != state {
            debug!("🎚️ Guild {}: {:?} -> {:?}", self.guild_id, self.state, state);
        }
        self.state = state;
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    /// Agrega una canción al final de la cola
    pub fn push(&mut self, song: Song) {
        info!("➕ Agregado a la cola: {}", song.title());
        self.songs.push(song);
    }

    /// Avanza el índice actual. Si se sale del final, vuelve a `None`.
    pub fn step(&mut self) -> Option<usize> {
        let next = self.current_index.map_or(0, |i| i + 1);
        self.current_index = (next < self.songs.len()).then_some(next);
        if self.current_index.is_none() {
            info!("📭 Cola terminada en guild {}", self.guild_id);
        }
        self.current_index
    }

    /// Deshace el último `step`, dejando la canción actual como pendiente.
    pub fn rewind(&mut self) {
        self.current_index = match self.current_index {
            Some(0) | None => None,
            Some(i) => Some(i - 1),
        };
    }

    /// Limpia la cola
    pub fn clear(&mut self) {
        let cleared = self.songs.len();
        self.songs.clear();
        self.current_index = None;
        info!("🗑️ Cola limpiada: {} canciones removidas", cleared);
    }

    pub fn session_slot(&mut self) -> &mut Option<VoiceSession> {
        &mut self.session
    }

    pub fn session_id(&self) -> Option<u64> {
        self.session.as_ref().map(VoiceSession::id)
    }

    pub fn take_session(&mut self) -> Option<VoiceSession> {
        self.session.take()
    }

    pub fn player_mut(&mut self) -> Option<&mut Player> {
        self.player.as_mut()
    }

    pub fn install_player(&mut self, player: Player) -> &mut Player {
        self.player.insert(player)
    }

    pub fn take_player(&mut self) -> Option<Player> {
        self.player.take()
    }

    pub fn notify_target(&self) -> Option<ChannelId> {
        self.notify_target
    }

    pub fn voice_target(&self) -> Option<ChannelId> {
        self.voice_target
    }

    /// Fija los destinos de texto y voz. Mientras haya una sesión activa se
    /// conservan los existentes.
    pub fn set_targets(&mut self, text: ChannelId, voice: ChannelId) {
        if self.session.is_none() || self.notify_target.is_none() {
            self.notify_target = Some(text);
            self.voice_target = Some(voice);
        }
    }

    pub fn clear_targets(&mut self) {
        self.notify_target = None;
        self.voice_target = None;
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Invalida los eventos pendientes de pistas o sesiones anteriores.
    pub fn bump_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            songs: self.songs.clone(),
            current_index: self.current_index,
            state: self.state,
            volume: self.volume,
            connected: self.session.is_some(),
            has_player: self.player.is_some(),
        }
    }
}

/// Vista de sólo lectura de una cola.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueSnapshot {
    pub songs: Vec<Song>,
    pub current_index: Option<usize>,
    pub state: PlaybackState,
    pub volume: f32,
    pub connected: bool,
    pub has_player: bool,
}

impl QueueSnapshot {
    pub fn current(&self) -> Option<&Song> {
        self.current_index.and_then(|i| self.songs.get(i))
    }

    pub fn total_duration(&self) -> Duration {
        self.songs.iter().map(Song::duration).sum()
    }

    /// Texto de la cola tal como se envía al canal.
    pub fn render(&self) -> String {
        if self.songs.is_empty() {
            return "The queue is empty.".to_string();
        }

        let mut text = String::from("Current Queue:\n");
        for (index, song) in self.songs.iter().enumerate() {
            let status = if Some(index) == self.current_index {
                " (Now Playing)"
            } else {
                ""
            };
            text.push_str(&format!(
                "{}. {} ({}){}\n",
                index + 1,
                song.title(),
                clock(song.duration()),
                status
            ));
        }
        let total = Duration::from_secs(self.total_duration().as_secs());
        text.push_str(&format!("Total: {}", humantime::format_duration(total)));
        text
    }
}

/// `m:ss`, o `live` para streams sin duración conocida.
fn clock(duration: Duration) -> String {
    if duration.is_zero() {
        return "live".to_string();
    }
    let secs = duration.as_secs();
    format!("{}:{:02}", secs / 60, secs % 60)
}

pub type SharedQueue = Arc<Mutex<GuildQueue>>;

/// Colas por guild. Cada una tiene su propio mutex: guilds distintos nunca
/// comparten lock.
#[derive(Debug, Clone)]
pub struct QueueStore {
    queues: Arc<DashMap<GuildId, SharedQueue>>,
    default_volume: f32,
}

impl QueueStore {
    pub fn new(default_volume: f32) -> Self {
        Self {
            queues: Arc::new(DashMap::new()),
            default_volume,
        }
    }

    /// Devuelve la cola del guild, creándola si todavía no existe.
    pub fn get_or_create(&self, guild_id: GuildId) -> SharedQueue {
        self.queues
            .entry(guild_id)
            .or_insert_with(|| Arc::new(Mutex::new(GuildQueue::new(guild_id, self.default_volume))))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }
}
