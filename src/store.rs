//! Flat directory of generated WAV files.
//!
//! The directory listing is the only index: a file exists exactly when it is
//! on disk, and the sweep removes whatever has not been modified within the
//! retention window.

use std::fs::OpenOptions;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use hound::{SampleFormat, WavSpec, WavWriter};
use lazy_static::lazy_static;
use regex::Regex;
use tokio::task::JoinHandle;

use crate::error::AppError;

/// Files untouched for longer than this are removed by the sweep.
pub const AUDIO_RETENTION: Duration = Duration::from_secs(3600);

lazy_static! {
    static ref FILENAME_REGEX: Regex = Regex::new(r"^[A-Za-z0-9_-][A-Za-z0-9._-]*$").unwrap();
}

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open the store at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, AppError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| {
            AppError::Storage(format!("cannot create {}: {}", root.display(), e))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `tts_<YYYYmmdd_HHMMSS>_<8 hex chars>.wav`
    pub fn generate_filename() -> String {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let id = uuid::Uuid::new_v4().simple().to_string();
        format!("tts_{}_{}.wav", timestamp, &id[..8])
    }

    /// Server-side location of `filename`. Rejects anything that is not a
    /// single plain path component.
    pub fn path_for(&self, filename: &str) -> Result<PathBuf, AppError> {
        if !FILENAME_REGEX.is_match(filename) {
            return Err(AppError::Validation(format!(
                "invalid audio filename '{}'",
                filename
            )));
        }
        Ok(self.root.join(filename))
    }

    /// Like `path_for`, but a name that cannot be in the store is simply not
    /// found.
    fn existing_path(&self, filename: &str) -> Result<PathBuf, AppError> {
        self.path_for(filename)
            .map_err(|_| AppError::NotFound(filename.to_string()))
    }

    /// Write `samples` as a mono 32-bit float WAV. Never overwrites.
    pub fn save(
        &self,
        filename: &str,
        samples: &[f32],
        sample_rate: u32,
    ) -> Result<PathBuf, AppError> {
        let path = self.path_for(filename)?;
        write_wav(&path, samples, sample_rate)
            .map_err(|e| AppError::Storage(format!("failed to write {}: {}", filename, e)))?;
        Ok(path)
    }

    pub async fn read(&self, filename: &str) -> Result<tokio::fs::File, AppError> {
        let path = self.existing_path(filename)?;
        match tokio::fs::File::open(&path).await {
            Ok(file) => {
                let is_file = file
                    .metadata()
                    .await
                    .map(|m| m.is_file())
                    .unwrap_or(false);
                if is_file {
                    Ok(file)
                } else {
                    Err(AppError::NotFound(filename.to_string()))
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(AppError::NotFound(filename.to_string()))
            }
            Err(e) => Err(AppError::Storage(format!("failed to open {}: {}", filename, e))),
        }
    }

    pub async fn delete(&self, filename: &str) -> Result<(), AppError> {
        let path = self.existing_path(filename)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!("Deleted audio file: {}", filename);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(AppError::NotFound(filename.to_string()))
            }
            Err(e) => Err(AppError::Storage(format!("failed to delete {}: {}", filename, e))),
        }
    }

    /// Remove every file last modified more than `max_age` ago. Returns the
    /// number removed; failures are logged per file and never abort the sweep.
    pub fn sweep(&self, max_age: Duration) -> usize {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!("Error during cleanup of {}: {}", self.root.display(), e);
                return 0;
            }
        };

        let now = SystemTime::now();
        let mut removed = 0;

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable directory entry: {}", e);
                    continue;
                }
            };
            let path = entry.path();

            let modified = match entry.metadata().and_then(|m| {
                if m.is_file() {
                    m.modified().map(Some)
                } else {
                    Ok(None)
                }
            }) {
                Ok(Some(modified)) => modified,
                Ok(None) => continue,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => {
                    tracing::warn!("Cannot stat {}: {}", path.display(), e);
                    continue;
                }
            };

            // Modification times in the future count as fresh.
            let expired = now
                .duration_since(modified)
                .map(|age| age > max_age)
                .unwrap_or(false);
            if !expired {
                continue;
            }

            match std::fs::remove_file(&path) {
                Ok(()) => {
                    removed += 1;
                    tracing::info!("Cleaned up old file: {}", entry.file_name().to_string_lossy());
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    tracing::debug!("{} already removed", path.display());
                }
                Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
            }
        }

        removed
    }
}

fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let file = OpenOptions::new().write(true).create_new(true).open(path)?;
    let mut writer = WavWriter::new(BufWriter::new(file), spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()
}

/// Sweep `store` once now and then every `interval` until the runtime stops.
pub fn spawn_sweeper(store: FileStore, interval: Duration, max_age: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let store = store.clone();
            match tokio::task::spawn_blocking(move || store.sweep(max_age)).await {
                Ok(0) => {}
                Ok(removed) => tracing::info!("Sweep removed {} stale audio file(s)", removed),
                Err(e) => tracing::error!("Sweep task failed: {}", e),
            }
        }
    })
}
