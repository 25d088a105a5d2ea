//! Ciclo de vida de la conexión de voz de cada guild.
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> (Signalling | Reconnecting) -> Connected
//!                                        \-> Disconnected (sin recuperación: teardown)
//! ```

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::{oneshot, watch},
    time::timeout,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::player::LoadedTrack;
use crate::{
    error::{MusicError, MusicResult},
    sources::ByteStream,
};

/// Estado observable del transporte de voz.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Signalling,
    Reconnecting,
    Disconnected,
}

impl ConnectionStatus {
    /// Estados que cuentan como recuperación tras una desconexión.
    pub fn is_recovering(&self) -> bool {
        matches!(
            self,
            ConnectionStatus::Signalling | ConnectionStatus::Reconnecting | ConnectionStatus::Connected
        )
    }
}

/// Capacidad de la plataforma para unirse a un canal de voz.
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> MusicResult<Arc<dyn VoiceLink>>;
}

/// Transporte de voz activo de un guild.
#[async_trait]
pub trait VoiceLink: Send + Sync {
    /// Empieza a reproducir un stream con el volumen indicado.
    async fn play(&self, stream: ByteStream, volume: f32) -> MusicResult<LoadedTrack>;

    /// Sale del canal. Llamarlo más de una vez es seguro.
    async fn disconnect(&self);

    fn status(&self) -> watch::Receiver<ConnectionStatus>;
}

/// Handle de la sesión de voz, propiedad exclusiva de la cola del guild.
pub struct VoiceSession {
    id: u64,
    guild_id: GuildId,
    channel_id: ChannelId,
    link: Arc<dyn VoiceLink>,
    shutdown: CancellationToken,
    lost: Option<oneshot::Receiver<()>>,
}

impl VoiceSession {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    pub fn link(&self) -> Arc<dyn VoiceLink> {
        self.link.clone()
    }

    /// Evento terminal de la sesión: se resuelve si la conexión se perdió
    /// sin recuperarse. Sólo se entrega una vez, a quien lo pida primero.
    pub fn take_lost_signal(&mut self) -> Option<oneshot::Receiver<()>> {
        self.lost.take()
    }
}

impl std::fmt::Debug for VoiceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceSession")
            .field("id", &self.id)
            .field("guild_id", &self.guild_id)
            .field("channel_id", &self.channel_id)
            .finish()
    }
}

pub struct VoiceSessionManager {
    gateway: Arc<dyn VoiceGateway>,
    recovery_window: Duration,
    join_timeout: Duration,
    next_id: AtomicU64,
}

impl VoiceSessionManager {
    pub fn new(gateway: Arc<dyn VoiceGateway>, recovery_window: Duration, join_timeout: Duration) -> Self {
        Self {
            gateway,
            recovery_window,
            join_timeout,
            next_id: AtomicU64::new(1),
        }
    }

    /// Conecta la sesión del guild si no existe. Si ya hay una, la devuelve
    /// tal cual sin volver a unirse.
    pub async fn connect<'a>(
        &self,
        slot: &'a mut Option<VoiceSession>,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> MusicResult<&'a mut VoiceSession> {
        if slot.is_none() {
            *slot = Some(self.open(guild_id, channel_id).await?);
        }
        slot.as_mut()
            .ok_or_else(|| MusicError::Join("session slot empty after join".to_string()))
    }

    async fn open(&self, guild_id: GuildId, channel_id: ChannelId) -> MusicResult<VoiceSession> {
        info!("🔊 Conectando al canal de voz {} en guild {}", channel_id, guild_id);

        let link = timeout(self.join_timeout, self.gateway.join(guild_id, channel_id))
            .await
            .map_err(|_| MusicError::Join(format!("timed out after {:?}", self.join_timeout)))??;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let shutdown = CancellationToken::new();
        let (lost_tx, lost_rx) = oneshot::channel();

        tokio::spawn(supervise(
            guild_id,
            link.clone(),
            self.recovery_window,
            shutdown.clone(),
            lost_tx,
        ));

        info!("✅ Sesión de voz {} lista en guild {}", id, guild_id);
        Ok(VoiceSession {
            id,
            guild_id,
            channel_id,
            link,
            shutdown,
            lost: Some(lost_rx),
        })
    }

    /// Id de la última sesión abierta (0 si aún no hubo ninguna). Los ids
    /// se asignan al completar el join, así que una sesión cuyo join sigue
    /// en curso todavía no cuenta.
    pub fn last_issued(&self) -> u64 {
        self.next_id.load(Ordering::Relaxed).saturating_sub(1)
    }

    /// Cierra la sesión. Seguro sobre sesiones ya caídas.
    pub async fn destroy(&self, session: VoiceSession) {
        session.shutdown.cancel();
        session.link.disconnect().await;
        info!(
            "👋 Sesión de voz {} cerrada en guild {} (canal {})",
            session.id,
            session.guild_id,
            session.channel_id()
        );
    }
}

/// Vigila el estado del transporte. Ante una desconexión espera, dentro de
/// la ventana de recuperación, a que entre en señalización o reconexión; si
/// no ocurre, cierra el transporte y dispara el evento terminal.
async fn supervise(
    guild_id: GuildId,
    link: Arc<dyn VoiceLink>,
    recovery_window: Duration,
    shutdown: CancellationToken,
    lost: oneshot::Sender<()>,
) {
    let mut status = link.status();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            changed = status.changed() => {
                if changed.is_err() {
                    warn!("🔌 Transporte de voz sin estado en guild {}", guild_id);
                    break;
                }
            }
        }

        let current = *status.borrow_and_update();
        debug!("🔈 Estado de voz en guild {}: {:?}", guild_id, current);
        if current != ConnectionStatus::Disconnected {
            continue;
        }

        warn!(
            "🔌 Desconectado en guild {}, esperando recuperación ({:?})",
            guild_id, recovery_window
        );

        let recovery = async {
            status
                .wait_for(ConnectionStatus::is_recovering)
                .await
                .is_ok()
        };

        let recovered = tokio::select! {
            _ = shutdown.cancelled() => return,
            result = timeout(recovery_window, recovery) => result.unwrap_or(false),
        };

        if recovered {
            info!("🔄 Conexión de voz recuperada en guild {}", guild_id);
            continue;
        }

        break;
    }

    warn!("❌ Conexión de voz perdida en guild {}", guild_id);
    link.disconnect().await;
    let _ = lost.send(());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::FakeGateway;

    fn guild() -> GuildId {
        GuildId::new(1)
    }

    fn channel() -> ChannelId {
        ChannelId::new(10)
    }

    fn manager(gateway: Arc<FakeGateway>) -> VoiceSessionManager {
        VoiceSessionManager::new(gateway, Duration::from_secs(5), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn connect_is_idempotent() {
        let gateway = Arc::new(FakeGateway::default());
        let manager = manager(gateway.clone());
        let mut slot = None;

        let first = manager.connect(&mut slot, guild(), channel()).await.unwrap().id();
        let second = manager.connect(&mut slot, guild(), channel()).await.unwrap().id();

        assert_eq!(first, second);
        assert_eq!(gateway.joins(), 1);
    }

    #[tokio::test]
    async fn join_failures_leave_the_slot_empty() {
        let gateway = Arc::new(FakeGateway::default());
        gateway.fail_joins(true);
        let manager = manager(gateway.clone());
        let mut slot = None;

        let err = manager.connect(&mut slot, guild(), channel()).await.unwrap_err();
        assert!(matches!(err, MusicError::Join(_)));
        assert!(slot.is_none());
    }

    #[tokio::test]
    async fn destroy_is_safe_twice_on_the_same_link() {
        let gateway = Arc::new(FakeGateway::default());
        let manager = manager(gateway.clone());
        let mut slot = None;
        manager.connect(&mut slot, guild(), channel()).await.unwrap();

        let link = gateway.last_link().unwrap();
        link.disconnect().await;
        manager.destroy(slot.take().unwrap()).await;

        assert!(link.is_disconnected());
    }

    #[tokio::test(start_paused = true)]
    async fn unrecovered_disconnect_tears_down_and_signals_loss() {
        let gateway = Arc::new(FakeGateway::default());
        let manager = manager(gateway.clone());
        let mut slot = None;
        let session = manager.connect(&mut slot, guild(), channel()).await.unwrap();
        let lost = session.take_lost_signal().unwrap();

        let link = gateway.last_link().unwrap();
        link.set_status(ConnectionStatus::Disconnected);

        timeout(Duration::from_secs(10), lost).await.unwrap().unwrap();
        assert!(link.is_disconnected());
    }

    #[tokio::test(start_paused = true)]
    async fn reconnecting_within_the_window_keeps_the_session() {
        let gateway = Arc::new(FakeGateway::default());
        let manager = manager(gateway.clone());
        let mut slot = None;
        let session = manager.connect(&mut slot, guild(), channel()).await.unwrap();
        let mut lost = session.take_lost_signal().unwrap();

        let link = gateway.last_link().unwrap();
        link.set_status(ConnectionStatus::Disconnected);
        tokio::time::sleep(Duration::from_secs(2)).await;
        link.set_status(ConnectionStatus::Reconnecting);
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert!(lost.try_recv().is_err());
        assert!(!link.is_disconnected());
    }

    #[tokio::test(start_paused = true)]
    async fn destroyed_sessions_never_signal_loss() {
        let gateway = Arc::new(FakeGateway::default());
        let manager = manager(gateway.clone());
        let mut slot = None;
        let session = manager.connect(&mut slot, guild(), channel()).await.unwrap();
        let lost = session.take_lost_signal().unwrap();

        manager.destroy(slot.take().unwrap()).await;

        // El supervisor sale sin enviar: el receptor ve el canal cerrado
        assert!(timeout(Duration::from_secs(10), lost).await.unwrap().is_err());
    }
}
