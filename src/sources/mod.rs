pub mod youtube;
pub mod ytdlp;

use async_trait::async_trait;
use regex::Regex;
use std::{
    fmt,
    io::{self, Read},
    sync::LazyLock,
    time::Duration,
};

use crate::error::MusicResult;

pub use youtube::YouTubeResolver;
pub use ytdlp::YtDlpAcquirer;

/// Forma de los identificadores de YouTube: 11 caracteres base64url.
static VIDEO_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("regex de video id válida"));

/// Verifica que un identificador tenga la forma esperada.
pub fn is_valid_video_id(id: &str) -> bool {
    VIDEO_ID.is_match(id)
}

/// URL canónica de reproducción para un identificador.
pub fn canonical_url(id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", id)
}

/// Descriptor reproducible, inmutable una vez creado. Dos canciones con el
/// mismo `id` son la misma pista.
#[derive(Debug, Clone)]
pub struct Song {
    id: String,
    title: String,
    url: String,
    duration: Duration,
    author: String,
    thumbnail: Option<String>,
}

impl Song {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            url: canonical_url(&id),
            id,
            title: title.into(),
            duration: Duration::ZERO,
            author: "Unknown".to_string(),
            thumbnail: None,
        }
    }

    // Getters
    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn url(&self) -> &str {
        &self.url
    }
    pub fn duration(&self) -> Duration {
        self.duration
    }
    pub fn author(&self) -> &str {
        &self.author
    }
    pub fn thumbnail(&self) -> Option<&str> {
        self.thumbnail.as_deref()
    }

    // Setters
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }

    /// Una canción con id malformado se salta durante `advance`.
    pub fn has_valid_id(&self) -> bool {
        is_valid_video_id(&self.id)
    }
}

impl PartialEq for Song {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Song {}

/// Stream de bytes de audio producido por el extractor.
///
/// Se lee de forma síncrona porque el driver de voz decodifica en su propio
/// hilo. Soltar el stream libera el proceso que lo alimenta.
pub struct ByteStream {
    label: String,
    reader: Box<dyn Read + Send + Sync>,
}

impl ByteStream {
    pub fn new(label: impl Into<String>, reader: impl Read + Send + Sync + 'static) -> Self {
        Self {
            label: label.into(),
            reader: Box::new(reader),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Read for ByteStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteStream").field("label", &self.label).finish()
    }
}

/// Convierte texto libre o un enlace directo en una canción.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SongResolver: Send + Sync {
    async fn resolve(&self, query: &str) -> MusicResult<Song>;
}

/// Abre el stream de audio de una canción ya resuelta.
#[async_trait]
pub trait StreamAcquirer: Send + Sync {
    async fn open_stream(&self, song: &Song) -> MusicResult<ByteStream>;
}
