use parking_lot::Mutex;
use serenity::{async_trait, model::id::GuildId};
use songbird::{Event as VoiceEvent, EventContext, EventHandler as VoiceEventHandler};
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::audio::{ConnectionStatus, TrackOutcome};

/// Emisor compartido entre los handlers de fin y de error de una pista:
/// el primero que dispare se lo queda.
pub type OutcomeSender = Arc<Mutex<Option<oneshot::Sender<TrackOutcome>>>>;

/// Handler para cuando un track termina o es detenido
pub struct TrackEndHandler {
    pub guild_id: GuildId,
    pub outcome: OutcomeSender,
}

#[async_trait]
impl VoiceEventHandler for TrackEndHandler {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        debug!("🎵 Track terminó en guild {}", self.guild_id);

        if let Some(tx) = self.outcome.lock().take() {
            let _ = tx.send(TrackOutcome::Finished);
        }

        None
    }
}

/// Handler para errores de tracks
pub struct TrackErrorHandler {
    pub guild_id: GuildId,
    pub outcome: OutcomeSender,
}

#[async_trait]
impl VoiceEventHandler for TrackErrorHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        let reason = match ctx {
            EventContext::Track(track_list) => track_list
                .first()
                .map(|(state, _handle)| format!("{:?}", state.playing))
                .unwrap_or_else(|| "unknown track error".to_string()),
            _ => "unknown track error".to_string(),
        };

        error!("❌ Error en track para guild {}: {}", self.guild_id, reason);

        if let Some(tx) = self.outcome.lock().take() {
            let _ = tx.send(TrackOutcome::Failed(reason));
        }

        None
    }
}

/// Traduce los eventos del driver de voz al estado de conexión observable.
pub struct ConnectionHandler {
    pub guild_id: GuildId,
    pub status: Arc<watch::Sender<ConnectionStatus>>,
}

#[async_trait]
impl VoiceEventHandler for ConnectionHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        match ctx {
            EventContext::DriverConnect(_) => {
                info!("🔊 Driver de voz conectado en guild {}", self.guild_id);
                self.status.send_replace(ConnectionStatus::Connected);
            }
            EventContext::DriverReconnect(_) => {
                info!("🔄 Reconectado al canal de voz en guild {}", self.guild_id);
                self.status.send_replace(ConnectionStatus::Connected);
            }
            EventContext::DriverDisconnect(data) => {
                warn!(
                    "🔌 Driver de voz desconectado en guild {}: {:?} ({:?})",
                    self.guild_id, data.kind, data.reason
                );
                self.status.send_replace(ConnectionStatus::Disconnected);
            }
            _ => {}
        }

        None
    }
}
