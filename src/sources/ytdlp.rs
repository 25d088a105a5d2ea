use async_trait::async_trait;
use std::{
    ffi::OsString,
    fs,
    io::{self, BufRead, BufReader, Read},
    path::{Path, PathBuf},
    process::{Child, ChildStderr, ChildStdout, Command, Stdio},
};
use tempfile::TempDir;
use tracing::{debug, error, info, warn};

use super::{ByteStream, Song, StreamAcquirer};
use crate::error::{MusicError, MusicResult};

/// Extrae el audio de una canción lanzando yt-dlp como subproceso y
/// devolviendo su stdout como stream, sin esperar a que termine.
#[derive(Debug, Clone)]
pub struct YtDlpAcquirer {
    binary: PathBuf,
    socket_timeout: u64,
    cache_base: PathBuf,
}

impl YtDlpAcquirer {
    pub fn new(binary: impl Into<PathBuf>, socket_timeout: u64, cache_base: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            socket_timeout,
            cache_base: cache_base.into(),
        }
    }

    /// Argumentos de extracción: mejor audio a stdout, sin archivos .part y
    /// con caché en un directorio propio de la invocación.
    pub fn arguments(&self, url: &str, cache_dir: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            url,
            "-f",
            "ba",
            "-o",
            "-",
            "--quiet",
            "--no-warnings",
            "--no-check-certificate",
            "--socket-timeout",
            &self.socket_timeout.to_string(),
            "--no-part",
            "--progress-template",
            "noop",
            "--cache-dir",
        ]
        .iter()
        .map(OsString::from)
        .collect();
        args.push(cache_dir.as_os_str().to_owned());
        args
    }

    /// Elimina directorios de caché que haya dejado una ejecución anterior.
    pub fn purge_cache(&self) -> io::Result<usize> {
        let entries = match fs::read_dir(&self.cache_base) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let result = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            match result {
                Ok(()) => removed += 1,
                Err(e) => warn!("✗ No se pudo eliminar {}: {}", path.display(), e),
            }
        }

        if removed > 0 {
            info!("🧹 Caché de yt-dlp limpiado: {} entradas en {}", removed, self.cache_base.display());
        }
        Ok(removed)
    }

    fn spawn(&self, song: &Song) -> io::Result<ByteStream> {
        fs::create_dir_all(&self.cache_base)?;
        let scratch = tempfile::Builder::new()
            .prefix(&format!("{}-", song.id()))
            .tempdir_in(&self.cache_base)?;

        let mut child = Command::new(&self.binary)
            .args(self.arguments(song.url(), scratch.path()))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "yt-dlp stdout unavailable"));
        };

        if let Some(stderr) = child.stderr.take() {
            forward_diagnostics(song.title().to_string(), stderr);
        }

        Ok(ByteStream::new(
            song.title(),
            ExtractorOutput {
                label: song.title().to_string(),
                child,
                stdout,
                _scratch: scratch,
            },
        ))
    }
}

#[async_trait]
impl StreamAcquirer for YtDlpAcquirer {
    async fn open_stream(&self, song: &Song) -> MusicResult<ByteStream> {
        if !song.has_valid_id() {
            return Err(MusicError::acquisition(
                song.title(),
                format!("invalid video id `{}`", song.id()),
            ));
        }

        info!("🎵 Streaming audio desde: {}", song.url());

        let acquirer = self.clone();
        let song_owned = song.clone();
        let stream = tokio::task::spawn_blocking(move || acquirer.spawn(&song_owned))
            .await
            .map_err(|e| MusicError::acquisition(song.title(), e))?
            .map_err(|e| {
                error!("❌ No se pudo iniciar yt-dlp para {}: {}", song.title(), e);
                MusicError::acquisition(song.title(), e)
            })?;

        debug!("✅ yt-dlp streaming iniciado para {}", song.title());
        Ok(stream)
    }
}

/// Salida de diagnóstico de yt-dlp: sólo al log, nunca al stream de audio.
fn forward_diagnostics(label: String, stderr: ChildStderr) {
    tokio::task::spawn_blocking(move || {
        for line in BufReader::new(stderr).lines().map_while(Result::ok) {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line.contains("decipher") {
                debug!("yt-dlp [{}]: {}", label, line);
            } else {
                warn!("yt-dlp [{}]: {}", label, line);
            }
        }
    });
}

/// Stdout del proceso extractor. Al agotarse, un código de salida distinto
/// de cero se reporta como error de lectura en vez de fin de stream.
struct ExtractorOutput {
    label: String,
    child: Child,
    stdout: ChildStdout,
    _scratch: TempDir,
}

impl Read for ExtractorOutput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.stdout.read(buf)?;
        if read == 0 && !buf.is_empty() {
            let status = self.child.wait()?;
            if !status.success() {
                warn!("⚠️ yt-dlp terminó prematuramente para {}: {}", self.label, status);
                return Err(io::Error::other(format!("yt-dlp exited with {}", status)));
            }
        }
        Ok(read)
    }
}

impl Drop for ExtractorOutput {
    fn drop(&mut self) {
        // Puede haber terminado ya; kill falla en ese caso y no importa
        let _ = self.child.kill();
        let _ = self.child.wait();
        debug!("🗑️ Proceso yt-dlp liberado para {}", self.label);
    }
}
