use async_trait::async_trait;
use serenity::{http::Http, model::id::ChannelId};
use std::sync::Arc;
use tracing::warn;

use crate::audio::Notifier;

/// Límite de caracteres de un mensaje de Discord.
const MESSAGE_LIMIT: usize = 2000;

/// Avisos de texto a canales de Discord. Los errores de envío sólo se
/// registran.
pub struct DiscordNotifier {
    http: Arc<Http>,
}

impl DiscordNotifier {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn notify(&self, target: ChannelId, text: String) {
        if let Err(e) = target.say(&self.http, fit_message(text)).await {
            warn!("💬 No se pudo enviar mensaje a {}: {}", target, e);
        }
    }
}

/// Recorta el texto al límite de Discord sin partir caracteres.
fn fit_message(text: String) -> String {
    if text.chars().count() <= MESSAGE_LIMIT {
        return text;
    }
    let mut fitted: String = text.chars().take(MESSAGE_LIMIT - 1).collect();
    fitted.push('…');
    fitted
}
