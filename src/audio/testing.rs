//! Fakes en memoria de las capacidades externas del motor.

use async_trait::async_trait;
use parking_lot::{Mutex, MutexGuard};
use serenity::model::id::{ChannelId, GuildId};
use std::{
    collections::{HashMap, HashSet},
    io::Cursor,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::{oneshot, watch};

use super::{
    notify::Notifier,
    player::{LoadedTrack, TrackControl, TrackOutcome},
    voice::{ConnectionStatus, VoiceGateway, VoiceLink},
};
use crate::{
    error::{MusicError, MusicResult},
    sources::{ByteStream, Song, SongResolver, StreamAcquirer},
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FakeTrackState {
    pub volume: f32,
    pub paused: bool,
    pub stopped: bool,
}

/// Pista falsa: `stop` emite el fin como lo haría el driver.
#[derive(Clone)]
pub struct FakeTrack {
    state: Arc<Mutex<FakeTrackState>>,
    outcome: Arc<Mutex<Option<oneshot::Sender<TrackOutcome>>>>,
}

impl FakeTrack {
    fn new(volume: f32) -> (Self, oneshot::Receiver<TrackOutcome>) {
        let (tx, rx) = oneshot::channel();
        let track = Self {
            state: Arc::new(Mutex::new(FakeTrackState {
                volume,
                ..FakeTrackState::default()
            })),
            outcome: Arc::new(Mutex::new(Some(tx))),
        };
        (track, rx)
    }

    pub fn lock(&self) -> MutexGuard<'_, FakeTrackState> {
        self.state.lock()
    }

    pub fn finish(&self) {
        self.emit(TrackOutcome::Finished);
    }

    pub fn fail(&self, reason: &str) {
        self.emit(TrackOutcome::Failed(reason.to_string()));
    }

    fn emit(&self, outcome: TrackOutcome) {
        if let Some(tx) = self.outcome.lock().take() {
            let _ = tx.send(outcome);
        }
    }
}

impl TrackControl for FakeTrack {
    fn pause(&self) -> MusicResult<()> {
        self.state.lock().paused = true;
        Ok(())
    }

    fn resume(&self) -> MusicResult<()> {
        self.state.lock().paused = false;
        Ok(())
    }

    fn stop(&self) -> MusicResult<()> {
        self.state.lock().stopped = true;
        self.finish();
        Ok(())
    }

    fn set_volume(&self, volume: f32) -> MusicResult<()> {
        self.state.lock().volume = volume;
        Ok(())
    }
}

pub struct FakeLink {
    status: watch::Sender<ConnectionStatus>,
    disconnected: AtomicBool,
    tracks: Mutex<Vec<FakeTrack>>,
    volumes: Mutex<Vec<f32>>,
}

impl Default for FakeLink {
    fn default() -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Connected);
        Self {
            status,
            disconnected: AtomicBool::new(false),
            tracks: Mutex::new(Vec::new()),
            volumes: Mutex::new(Vec::new()),
        }
    }
}

impl FakeLink {
    pub fn set_status(&self, status: ConnectionStatus) {
        self.status.send_replace(status);
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    pub fn tracks(&self) -> Vec<FakeTrack> {
        self.tracks.lock().clone()
    }

    pub fn last_track(&self) -> Option<FakeTrack> {
        self.tracks.lock().last().cloned()
    }

    pub fn played_volumes(&self) -> Vec<f32> {
        self.volumes.lock().clone()
    }
}

#[async_trait]
impl VoiceLink for FakeLink {
    async fn play(&self, _stream: ByteStream, volume: f32) -> MusicResult<LoadedTrack> {
        let (track, outcome) = FakeTrack::new(volume);
        self.volumes.lock().push(volume);
        self.tracks.lock().push(track.clone());
        Ok(LoadedTrack {
            control: Box::new(track),
            outcome,
        })
    }

    async fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }

    fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }
}

#[derive(Default)]
pub struct FakeGateway {
    joins: AtomicUsize,
    fail: AtomicBool,
    delay: Mutex<Option<Duration>>,
    links: Mutex<Vec<Arc<FakeLink>>>,
}

impl FakeGateway {
    pub fn joins(&self) -> usize {
        self.joins.load(Ordering::SeqCst)
    }

    pub fn fail_joins(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn delay_joins(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn last_link(&self) -> Option<Arc<FakeLink>> {
        self.links.lock().last().cloned()
    }
}

#[async_trait]
impl VoiceGateway for FakeGateway {
    async fn join(&self, _guild_id: GuildId, _channel_id: ChannelId) -> MusicResult<Arc<dyn VoiceLink>> {
        self.joins.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail.load(Ordering::SeqCst) {
            return Err(MusicError::Join("gateway refused".to_string()));
        }

        let link = Arc::new(FakeLink::default());
        self.links.lock().push(link.clone());
        Ok(link)
    }
}

#[derive(Default)]
pub struct FakeAcquirer {
    failing: Mutex<HashSet<String>>,
    opened: Mutex<Vec<String>>,
}

impl FakeAcquirer {
    pub fn fail_for(&self, id: &str) {
        self.failing.lock().insert(id.to_string());
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }
}

#[async_trait]
impl StreamAcquirer for FakeAcquirer {
    async fn open_stream(&self, song: &Song) -> MusicResult<ByteStream> {
        if self.failing.lock().contains(song.id()) {
            return Err(MusicError::acquisition(song.title(), "extractor unavailable"));
        }
        self.opened.lock().push(song.id().to_string());
        Ok(ByteStream::new(song.title(), Cursor::new(vec![0u8; 16])))
    }
}

/// Resolver de consultas fijas; cualquier otra no tiene resultados.
pub struct StaticResolver {
    songs: HashMap<String, Song>,
}

impl StaticResolver {
    pub fn new(entries: &[(&str, Song)]) -> Self {
        Self {
            songs: entries
                .iter()
                .map(|(query, song)| (query.to_string(), song.clone()))
                .collect(),
        }
    }
}

#[async_trait]
impl SongResolver for StaticResolver {
    async fn resolve(&self, query: &str) -> MusicResult<Song> {
        self.songs
            .get(query)
            .cloned()
            .ok_or_else(|| MusicError::resolution(query, "no results"))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(ChannelId, String)>>,
}

impl RecordingNotifier {
    pub fn texts(&self) -> Vec<String> {
        self.sent.lock().iter().map(|(_, text)| text.clone()).collect()
    }

    pub fn sent_to(&self, target: ChannelId) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter(|(channel, _)| *channel == target)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.sent.lock().iter().any(|(_, text)| text.contains(needle))
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, target: ChannelId, text: String) {
        self.sent.lock().push((target, text));
    }
}
