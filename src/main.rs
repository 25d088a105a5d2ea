use anyhow::{Context, Result};
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::{sync::Arc, time::Duration};
use tracing::{error, info, warn};

mod audio;
mod bot;
mod cache;
mod config;
mod error;
mod sources;

use crate::audio::MusicEngine;
use crate::bot::{notifier::DiscordNotifier, voice::SongbirdGateway, TuberBot};
use crate::cache::SongCache;
use crate::config::Config;
use crate::sources::{YouTubeResolver, YtDlpAcquirer};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tuberq=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando tuberq v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    info!("{}", config.summary());

    // Directorios de caché que haya dejado una ejecución anterior
    let acquirer = Arc::new(YtDlpAcquirer::new(
        config.ytdlp_path.clone(),
        config.socket_timeout,
        config.cache_dir.clone(),
    ));
    if let Err(e) = acquirer.purge_cache() {
        warn!("⚠️ No se pudo limpiar {}: {}", config.cache_dir.display(), e);
    }

    let resolver = Arc::new(YouTubeResolver::new(
        config.ytdlp_path.clone(),
        config.socket_timeout,
        SongCache::new(config.resolve_cache_size, config.resolve_cache_ttl()),
    ));

    let songbird = Songbird::serenity();
    let http = Arc::new(Http::new(&config.discord_token));
    let engine = MusicEngine::new(
        &config,
        resolver.clone(),
        acquirer,
        Arc::new(SongbirdGateway::new(songbird.clone())),
        Arc::new(DiscordNotifier::new(http)),
    );

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let config = Arc::new(config);
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(TuberBot::new(config.clone(), engine.clone()))
        .register_songbird_with(songbird)
        .await
        .context("no se pudo construir el cliente de Discord")?;

    tokio::spawn(maintenance_tasks(resolver, engine));

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("⚠️ Señal de shutdown recibida, cerrando...");
                shard_manager.shutdown_all().await;
            }
            Err(e) => error!("Error al registrar Ctrl+C: {}", e),
        }
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
        return Err(why.into());
    }

    Ok(())
}

/// Limpieza periódica del caché de búsquedas.
async fn maintenance_tasks(resolver: Arc<YouTubeResolver>, engine: MusicEngine) {
    let mut interval = tokio::time::interval(Duration::from_secs(3600)); // Cada hora
    interval.tick().await;

    loop {
        interval.tick().await;

        resolver.cache().cleanup_old_entries();

        info!(
            "🧹 Tareas de mantenimiento completadas ({} guilds con cola)",
            engine.active_guilds()
        );
    }
}

async fn health_check(config: &Config) -> Result<()> {
    // El extractor es la única dependencia externa
    let yt_dlp = async_process::Command::new(&config.ytdlp_path)
        .arg("--version")
        .output()
        .await
        .with_context(|| format!("no se pudo ejecutar {}", config.ytdlp_path.display()))?;

    if yt_dlp.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("yt-dlp no responde: {}", yt_dlp.status);
    }
}
