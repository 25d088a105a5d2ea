use anyhow::{Context, Result};
use std::{fmt, path::PathBuf, time::Duration};

#[derive(Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,

    // Audio
    pub default_volume: f32,
    pub max_queue_size: usize,

    // yt-dlp
    pub ytdlp_path: PathBuf,
    pub socket_timeout: u64, // En segundos
    pub cache_dir: PathBuf,

    // Voz
    pub recovery_window_ms: u64,
    pub join_timeout: u64, // En segundos

    // Caché del resolver
    pub resolve_cache_ttl: u64, // En segundos
    pub resolve_cache_size: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Construye la configuración a partir de una función de búsqueda de
    /// variables. `load` la alimenta con el entorno del proceso; los tests
    /// con un mapa.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str, default: String| lookup(key).filter(|v| !v.trim().is_empty()).unwrap_or(default);

        let config = Self {
            discord_token: lookup("DISCORD_TOKEN").context("DISCORD_TOKEN no está definido")?,
            command_prefix: var("COMMAND_PREFIX", defaults.command_prefix.clone()),

            default_volume: var("DEFAULT_VOLUME", defaults.default_volume.to_string())
                .parse()
                .context("DEFAULT_VOLUME inválido")?,
            max_queue_size: var("MAX_QUEUE_SIZE", defaults.max_queue_size.to_string())
                .parse()
                .context("MAX_QUEUE_SIZE inválido")?,

            ytdlp_path: var("YTDLP_PATH", "yt-dlp".to_string()).into(),
            socket_timeout: var("SOCKET_TIMEOUT", defaults.socket_timeout.to_string())
                .parse()
                .context("SOCKET_TIMEOUT inválido")?,
            cache_dir: lookup("CACHE_DIR")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),

            recovery_window_ms: var("RECOVERY_WINDOW_MS", defaults.recovery_window_ms.to_string())
                .parse()
                .context("RECOVERY_WINDOW_MS inválido")?,
            join_timeout: var("JOIN_TIMEOUT", defaults.join_timeout.to_string())
                .parse()
                .context("JOIN_TIMEOUT inválido")?,

            resolve_cache_ttl: var("RESOLVE_CACHE_TTL", defaults.resolve_cache_ttl.to_string())
                .parse()
                .context("RESOLVE_CACHE_TTL inválido")?,
            resolve_cache_size: var("RESOLVE_CACHE_SIZE", defaults.resolve_cache_size.to_string())
                .parse()
                .context("RESOLVE_CACHE_SIZE inválido")?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Token and command prefix must not be empty
    /// - Default volume must be between 0.0 and 1.0
    /// - Queue size, timeouts and cache size must be greater than 0
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("Discord token must not be empty");
        }

        if self.command_prefix.is_empty() {
            anyhow::bail!("Command prefix must not be empty");
        }

        if !(0.0..=1.0).contains(&self.default_volume) {
            anyhow::bail!("Default volume must be between 0.0 and 1.0, got: {}", self.default_volume);
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.socket_timeout == 0 {
            anyhow::bail!("Socket timeout must be greater than 0");
        }

        if self.recovery_window_ms == 0 || self.join_timeout == 0 {
            anyhow::bail!("Voice timeouts must be greater than 0");
        }

        if self.resolve_cache_size == 0 {
            anyhow::bail!("Resolve cache size must be greater than 0");
        }

        Ok(())
    }

    pub fn recovery_window(&self) -> Duration {
        Duration::from_millis(self.recovery_window_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout)
    }

    pub fn resolve_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.resolve_cache_ttl)
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Never includes the Discord token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Commands: prefix `{}`\n  \
            Audio: {}% vol, {} max queue\n  \
            yt-dlp: {} ({}s socket timeout, scratch in {})\n  \
            Voice: {} recovery window, {} join timeout\n  \
            Resolver cache: {} entries, {} TTL",
            self.command_prefix,
            (self.default_volume * 100.0).round() as u32,
            self.max_queue_size,
            self.ytdlp_path.display(),
            self.socket_timeout,
            self.cache_dir.display(),
            humantime::format_duration(self.recovery_window()),
            humantime::format_duration(self.join_timeout()),
            self.resolve_cache_size,
            humantime::format_duration(self.resolve_cache_ttl()),
        )
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"<redacted>")
            .field("command_prefix", &self.command_prefix)
            .field("default_volume", &self.default_volume)
            .field("max_queue_size", &self.max_queue_size)
            .field("ytdlp_path", &self.ytdlp_path)
            .field("socket_timeout", &self.socket_timeout)
            .field("cache_dir", &self.cache_dir)
            .field("recovery_window_ms", &self.recovery_window_ms)
            .field("join_timeout", &self.join_timeout)
            .field("resolve_cache_ttl", &self.resolve_cache_ttl)
            .field("resolve_cache_size", &self.resolve_cache_size)
            .finish()
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            command_prefix: "!".to_string(),

            default_volume: 0.5,
            max_queue_size: 500,

            ytdlp_path: "yt-dlp".into(),
            socket_timeout: 30,
            cache_dir: std::env::temp_dir().join("tuberq-cache"),

            recovery_window_ms: 5000,
            join_timeout: 15,

            resolve_cache_ttl: 3600,
            resolve_cache_size: 256,
        }
    }
}
