use async_trait::async_trait;
use serenity::model::id::ChannelId;

/// Envío de avisos de texto. Best-effort: las implementaciones registran sus
/// fallos y nunca los propagan.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, target: ChannelId, text: String);
}
