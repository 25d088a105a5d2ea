use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    events::CoreEvent,
    input::{AudioStream, Input, LiveInput},
    tracks::{ControlError, Track, TrackHandle},
    Call, Event, Songbird, TrackEvent,
};
use std::sync::Arc;
use symphonia::core::io::{MediaSource, ReadOnlySource};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use super::events::{ConnectionHandler, TrackEndHandler, TrackErrorHandler};
use crate::{
    audio::{ConnectionStatus, LoadedTrack, TrackControl, VoiceGateway, VoiceLink},
    error::{MusicError, MusicResult},
    sources::ByteStream,
};

/// Capacidad de unirse a canales de voz a través de songbird.
pub struct SongbirdGateway {
    manager: Arc<Songbird>,
}

impl SongbirdGateway {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl VoiceGateway for SongbirdGateway {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> MusicResult<Arc<dyn VoiceLink>> {
        let call = match self.manager.join(guild_id, channel_id).await {
            Ok(call) => call,
            Err(e) => {
                // Un join fallido puede dejar un Call a medio crear
                let _ = self.manager.remove(guild_id).await;
                return Err(MusicError::Join(e.to_string()));
            }
        };

        let (status, _) = watch::channel(ConnectionStatus::Connected);
        let status = Arc::new(status);
        {
            let mut handler = call.lock().await;
            handler.remove_all_global_events();
            for event in [
                CoreEvent::DriverConnect,
                CoreEvent::DriverReconnect,
                CoreEvent::DriverDisconnect,
            ] {
                handler.add_global_event(
                    Event::Core(event),
                    ConnectionHandler {
                        guild_id,
                        status: status.clone(),
                    },
                );
            }
        }

        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);
        Ok(Arc::new(SongbirdLink {
            guild_id,
            manager: self.manager.clone(),
            call,
            status,
        }))
    }
}

/// Conexión de voz activa de un guild.
pub struct SongbirdLink {
    guild_id: GuildId,
    manager: Arc<Songbird>,
    call: Arc<tokio::sync::Mutex<Call>>,
    status: Arc<watch::Sender<ConnectionStatus>>,
}

#[async_trait]
impl VoiceLink for SongbirdLink {
    async fn play(&self, stream: ByteStream, volume: f32) -> MusicResult<LoadedTrack> {
        debug!("▶️ Entregando stream '{}' al driver", stream.label());

        // El contenedor (webm/m4a) se detecta al sondear el stream
        let source: Box<dyn MediaSource> = Box::new(ReadOnlySource::new(stream));
        let input = Input::Live(LiveInput::Raw(AudioStream { input: source, hint: None }), None);

        let handle = {
            let mut call = self.call.lock().await;
            call.play(Track::from(input).volume(volume))
        };

        let (tx, rx) = oneshot::channel();
        let outcome = Arc::new(Mutex::new(Some(tx)));

        handle
            .add_event(
                Event::Track(TrackEvent::End),
                TrackEndHandler {
                    guild_id: self.guild_id,
                    outcome: outcome.clone(),
                },
            )
            .map_err(control_fault)?;
        handle
            .add_event(
                Event::Track(TrackEvent::Error),
                TrackErrorHandler {
                    guild_id: self.guild_id,
                    outcome,
                },
            )
            .map_err(control_fault)?;

        Ok(LoadedTrack {
            control: Box::new(SongbirdTrack(handle)),
            outcome: rx,
        })
    }

    async fn disconnect(&self) {
        // `remove` falla si el Call ya no existe; eso ya es un teardown hecho
        match self.manager.remove(self.guild_id).await {
            Ok(()) => info!("👋 Desconectado del canal de voz en guild {}", self.guild_id),
            Err(e) => debug!("Call ya cerrado en guild {}: {}", self.guild_id, e),
        }
    }

    fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }
}

struct SongbirdTrack(TrackHandle);

fn control_fault(e: ControlError) -> MusicError {
    MusicError::PlayerFault(e.to_string())
}

impl TrackControl for SongbirdTrack {
    fn pause(&self) -> MusicResult<()> {
        self.0.pause().map_err(control_fault)
    }

    fn resume(&self) -> MusicResult<()> {
        self.0.play().map_err(control_fault)
    }

    fn stop(&self) -> MusicResult<()> {
        self.0.stop().map_err(control_fault)
    }

    fn set_volume(&self, volume: f32) -> MusicResult<()> {
        self.0.set_volume(volume).map_err(|e| {
            warn!("🔊 Volumen no aplicado: {}", e);
            control_fault(e)
        })
    }
}
