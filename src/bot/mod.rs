//! # Bot Module
//!
//! Discord glue for tuberq: the text command handler plus the songbird and
//! serenity implementations of the capabilities the audio engine consumes.
//!
//! - [`TuberBot`] implements Serenity's [`EventHandler`]: it parses prefixed
//!   messages and forwards them to the [`MusicEngine`]
//! - [`voice::SongbirdGateway`] joins voice channels and plays streams
//! - [`notifier::DiscordNotifier`] sends the engine's notices

use serenity::{
    all::{Context, EventHandler, GuildId, Message, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub mod commands;
pub mod events;
pub mod notifier;
pub mod voice;

use crate::{
    audio::{CommandOrigin, MusicEngine},
    config::Config,
};
use commands::Command;

/// Handler de eventos de Discord.
pub struct TuberBot {
    config: Arc<Config>,
    engine: MusicEngine,
}

impl TuberBot {
    pub fn new(config: Arc<Config>, engine: MusicEngine) -> Self {
        Self { config, engine }
    }

    async fn dispatch(&self, ctx: &Context, origin: CommandOrigin, command: Command) {
        match command {
            Command::Play(query) => self.engine.play(&origin, &query).await,
            Command::Skip => self.engine.skip(&origin).await,
            Command::Pause => self.engine.pause(&origin).await,
            Command::Resume => self.engine.resume(&origin).await,
            Command::Stop => self.engine.stop(&origin).await,
            Command::Volume(raw) => self.engine.set_volume(&origin, &raw).await,
            Command::Leave => self.engine.leave(&origin).await,
            Command::Queue => {
                self.engine.describe_queue(&origin).await;
            }
            Command::Ping => self.say(ctx, &origin, "Pong!".to_string()).await,
            Command::Help => {
                let help = commands::help_text(&self.config.command_prefix);
                self.say(ctx, &origin, help).await;
            }
        }
    }

    async fn say(&self, ctx: &Context, origin: &CommandOrigin, text: String) {
        if let Err(e) = origin.text_channel.say(&ctx.http, text).await {
            warn!("💬 No se pudo responder en {}: {}", origin.text_channel, e);
        }
    }
}

#[async_trait]
impl EventHandler for TuberBot {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(guild_id) = msg.guild_id else {
            return;
        };
        let Some(command) = commands::parse(&self.config.command_prefix, &msg.content) else {
            return;
        };

        debug!("📥 {:?} de {} en guild {}", command, msg.author.name, guild_id);

        let origin = CommandOrigin {
            guild_id,
            text_channel: msg.channel_id,
            voice_channel: author_voice_channel(&ctx, guild_id, &msg),
        };

        self.dispatch(&ctx, origin, command).await;
    }

    /// Si el bot es sacado del canal de voz desde fuera, la cola del guild
    /// recibe la misma limpieza que un `leave`.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        if let Some(guild_id) = new.guild_id {
            info!("🔌 Bot desconectado en guild {}", guild_id);
            self.engine.evict(guild_id).await;
        }
    }
}

/// Canal de voz en el que está el autor del mensaje, según la caché.
fn author_voice_channel(ctx: &Context, guild_id: GuildId, msg: &Message) -> Option<serenity::all::ChannelId> {
    let guild = ctx.cache.guild(guild_id)?;
    guild
        .voice_states
        .get(&msg.author.id)
        .and_then(|state| state.channel_id)
}
