use thiserror::Error;

/// Errores del núcleo de reproducción.
///
/// Ninguno es fatal para el proceso: cada variante se convierte en un aviso
/// al canal de texto y, cuando aplica, en una transición que repara el
/// estado de la cola afectada.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MusicError {
    /// La búsqueda o el enlace directo no produjo una canción reproducible.
    #[error("no playable match for `{query}`: {reason}")]
    Resolution { query: String, reason: String },

    /// No se pudo abrir (o se cortó) el stream de audio de una canción.
    #[error("could not stream **{title}**: {reason}")]
    Acquisition { title: String, reason: String },

    /// El transporte de voz cayó y no se recuperó dentro de la ventana.
    #[error("voice connection lost")]
    ConnectionLost,

    #[error("could not join the voice channel: {0}")]
    Join(String),

    /// El reproductor reportó un error interno.
    #[error("audio player fault: {0}")]
    PlayerFault(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("the queue is full (max {0} songs)")]
    QueueFull(usize),
}

impl MusicError {
    pub fn resolution(query: impl Into<String>, reason: impl ToString) -> Self {
        Self::Resolution {
            query: query.into(),
            reason: reason.to_string(),
        }
    }

    pub fn acquisition(title: impl Into<String>, reason: impl ToString) -> Self {
        Self::Acquisition {
            title: title.into(),
            reason: reason.to_string(),
        }
    }
}

pub type MusicResult<T> = std::result::Result<T, MusicError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquisition_notice_names_the_track() {
        let err = MusicError::acquisition("Song A", "yt-dlp not found");
        assert_eq!(err.to_string(), "could not stream **Song A**: yt-dlp not found");
    }
}
