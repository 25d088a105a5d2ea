use async_process::Command;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::{path::PathBuf, sync::LazyLock, time::Duration};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{canonical_url, is_valid_video_id, Song, SongResolver};
use crate::{
    cache::SongCache,
    error::{MusicError, MusicResult},
};

/// Enlaces directos: watch, embed, v/, shorts-like paths y youtu.be.
static YOUTUBE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?:https?://)?(?:www\.|m\.|music\.)?(?:youtube\.com/(?:[^/]+/.+/|(?:v|e(?:mbed)?)/|.*[?&]v=)|youtu\.be/)([^"&?/\s]{11})"#,
    )
    .expect("regex de URL de YouTube válida")
});

/// Extrae el identificador de un enlace directo, si la consulta lo es.
///
/// El identificador devuelto todavía no está validado: el patrón acepta
/// cualquier secuencia de 11 caracteres.
pub fn extract_video_id(query: &str) -> Option<&str> {
    YOUTUBE_URL
        .captures(query)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Enlaces http(s) que no son de YouTube: no se buscan como texto.
fn is_foreign_link(query: &str) -> bool {
    url::Url::parse(query)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Información extraída de yt-dlp (`--dump-json`)
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    uploader: Option<String>,
    channel: Option<String>,
    thumbnail: Option<String>,
    #[serde(default)]
    thumbnails: Vec<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

impl YtDlpInfo {
    /// Convierte la respuesta en una canción, rechazando ids malformados.
    fn into_song(self, query: &str) -> MusicResult<Song> {
        let id = self.id.unwrap_or_default();
        if !is_valid_video_id(&id) {
            warn!("⚠️ yt-dlp devolvió un id inválido para '{}': {:?}", query, id);
            return Err(MusicError::resolution(query, format!("invalid video id `{}`", id)));
        }

        let mut song = Song::new(id, self.title.unwrap_or_else(|| "Unknown Title".to_string()))
            .with_duration(Duration::from_secs(self.duration.unwrap_or(0.0).max(0.0) as u64))
            .with_author(
                self.uploader
                    .or(self.channel)
                    .unwrap_or_else(|| "Unknown".to_string()),
            );

        if let Some(thumbnail) = self.thumbnail.or_else(|| self.thumbnails.into_iter().next().map(|t| t.url)) {
            song = song.with_thumbnail(thumbnail);
        }

        Ok(song)
    }
}

/// Primera entrada parseable de una salida JSON-por-línea.
fn first_entry(stdout: &str) -> Option<YtDlpInfo> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .find_map(|line| serde_json::from_str::<YtDlpInfo>(line).ok())
}

/// Resolver de canciones sobre YouTube, usando yt-dlp para la metadata.
pub struct YouTubeResolver {
    ytdlp: PathBuf,
    socket_timeout: u64,
    // Limitar requests concurrentes para evitar rate limiting
    rate_limiter: Semaphore,
    cache: SongCache,
}

impl YouTubeResolver {
    pub fn new(ytdlp: impl Into<PathBuf>, socket_timeout: u64, cache: SongCache) -> Self {
        Self {
            ytdlp: ytdlp.into(),
            socket_timeout,
            rate_limiter: Semaphore::new(3),
            cache,
        }
    }

    pub fn cache(&self) -> &SongCache {
        &self.cache
    }

    /// Obtiene la metadata de un video concreto.
    async fn fetch_video(&self, query: &str, video_id: &str) -> MusicResult<Song> {
        let url = canonical_url(video_id);
        debug!("📊 Obteniendo info de: {}", url);

        let stdout = self
            .run(query, &["--no-playlist", "--skip-download", "--dump-json", &url])
            .await?;

        first_entry(&stdout)
            .ok_or_else(|| MusicError::resolution(query, "could not parse video metadata"))?
            .into_song(query)
    }

    /// Busca por texto y toma el primer resultado.
    async fn search_first(&self, query: &str) -> MusicResult<Song> {
        info!("🔍 Buscando en YouTube: {}", query);

        let search_query = format!("ytsearch1:{}", query);
        let stdout = self
            .run(query, &["--flat-playlist", "--skip-download", "--dump-json", &search_query])
            .await?;

        first_entry(&stdout)
            .ok_or_else(|| MusicError::resolution(query, "no results"))?
            .into_song(query)
    }

    async fn run(&self, query: &str, args: &[&str]) -> MusicResult<String> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| MusicError::resolution(query, e))?;

        let timeout = self.socket_timeout.to_string();
        let output = Command::new(&self.ytdlp)
            .args(["--no-warnings", "--socket-timeout", timeout.as_str()])
            .args(args)
            .output()
            .await
            .map_err(|e| MusicError::resolution(query, format!("could not run yt-dlp: {}", e)))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            warn!("❌ yt-dlp falló para '{}': {}", query, error.trim());
            return Err(MusicError::resolution(query, format!("yt-dlp error: {}", error.trim())));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl SongResolver for YouTubeResolver {
    async fn resolve(&self, query: &str) -> MusicResult<Song> {
        let query = query.trim();
        if query.is_empty() {
            return Err(MusicError::resolution(query, "empty query"));
        }

        if let Some(song) = self.cache.get(query) {
            return Ok(song);
        }

        let song = match extract_video_id(query) {
            Some(video_id) => {
                debug!("🔗 Video ID extraído de la URL: {}", video_id);
                if !is_valid_video_id(video_id) {
                    return Err(MusicError::resolution(
                        query,
                        format!("malformed video id `{}`", video_id),
                    ));
                }
                self.fetch_video(query, video_id).await?
            }
            None if is_foreign_link(query) => {
                return Err(MusicError::resolution(query, "unsupported link"));
            }
            None => self.search_first(query).await?,
        };

        info!("🎵 Canción encontrada: {} ({})", song.title(), song.id());
        self.cache.put(query, song.clone());
        Ok(song)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver_without_ytdlp() -> YouTubeResolver {
        YouTubeResolver::new(
            "/nonexistent/yt-dlp",
            30,
            SongCache::new(8, Duration::from_secs(60)),
        )
    }

    #[test]
    fn test_youtube_url_detection() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(extract_video_id("https://youtu.be/dQw4w9WgXcQ"), Some("dQw4w9WgXcQ"));
        assert_eq!(
            extract_video_id("youtube.com/embed/dQw4w9WgXcQ?start=10"),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            extract_video_id("https://music.youtube.com/watch?list=x&v=dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(extract_video_id("never gonna give you up"), None);
        assert_eq!(extract_video_id("https://example.com/video"), None);
    }

    #[test]
    fn parses_full_video_metadata() {
        let line = r#"{"id":"dQw4w9WgXcQ","title":"Never Gonna Give You Up","duration":212.0,"uploader":"Rick Astley","thumbnail":"https://i.ytimg.com/vi/dQw4w9WgXcQ/hq.jpg"}"#;
        let song = first_entry(line).unwrap().into_song("rick").unwrap();

        assert_eq!(song.id(), "dQw4w9WgXcQ");
        assert_eq!(song.title(), "Never Gonna Give You Up");
        assert_eq!(song.duration(), Duration::from_secs(212));
        assert_eq!(song.author(), "Rick Astley");
        assert_eq!(song.url(), "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        assert_eq!(song.thumbnail(), Some("https://i.ytimg.com/vi/dQw4w9WgXcQ/hq.jpg"));
    }

    #[test]
    fn flat_search_entries_fall_back_to_channel_and_thumbnails() {
        let stdout = concat!(
            "\n",
            r#"{"id":"AAAAAAAAAAA","title":"A","channel":"Someone","thumbnails":[{"url":"https://t/1.jpg"}]}"#,
            "\n",
            r#"{"id":"BBBBBBBBBBB","title":"B"}"#,
        );
        let song = first_entry(stdout).unwrap().into_song("a").unwrap();

        assert_eq!(song.id(), "AAAAAAAAAAA");
        assert_eq!(song.author(), "Someone");
        assert_eq!(song.thumbnail(), Some("https://t/1.jpg"));
        assert_eq!(song.duration(), Duration::ZERO);
    }

    #[test]
    fn malformed_ids_from_search_are_rejected() {
        let line = r#"{"id":"UCxyz","title":"A channel, not a video"}"#;
        let err = first_entry(line).unwrap().into_song("abc").unwrap_err();
        assert!(matches!(err, MusicError::Resolution { .. }));
    }

    #[test]
    fn empty_search_output_has_no_entry() {
        assert!(first_entry("").is_none());
        assert!(first_entry("not json\n").is_none());
    }

    #[tokio::test]
    async fn malformed_direct_reference_fails_before_fetching() {
        let err = resolver_without_ytdlp()
            .resolve("https://youtu.be/abc.def.ghi")
            .await
            .unwrap_err();

        match err {
            MusicError::Resolution { reason, .. } => assert!(reason.contains("malformed")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn foreign_links_are_not_searched() {
        let err = resolver_without_ytdlp()
            .resolve("https://example.com/video")
            .await
            .unwrap_err();

        assert_eq!(err, MusicError::resolution("https://example.com/video", "unsupported link"));
        assert!(!is_foreign_link("lofi hip hop"));
    }

    #[tokio::test]
    async fn missing_extractor_is_a_resolution_failure() {
        let err = resolver_without_ytdlp().resolve("some song").await.unwrap_err();
        assert!(matches!(err, MusicError::Resolution { .. }));
    }

    #[tokio::test]
    async fn cached_queries_skip_the_extractor() {
        let resolver = resolver_without_ytdlp();
        resolver.cache().put("some song", Song::new("AAAAAAAAAAA", "A"));

        let song = resolver.resolve("Some Song").await.unwrap();
        assert_eq!(song.title(), "A");
    }
}
