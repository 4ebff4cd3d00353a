use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::AppError;

#[derive(Debug, Clone, Deserialize)]
pub struct VoiceConfig {
    pub audio: AudioConfig,
    pub espeak: Option<EspeakConfig>,
    #[serde(default)]
    pub phoneme_id_map: HashMap<String, Vec<i64>>,
    #[serde(default)]
    pub inference: Option<InferenceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EspeakConfig {
    pub voice: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InferenceConfig {
    #[serde(default = "default_noise_scale")]
    pub noise_scale: f32,
    #[serde(default = "default_length_scale")]
    pub length_scale: f32,
    #[serde(default = "default_noise_w")]
    pub noise_w: f32,
}

fn default_noise_scale() -> f32 {
    0.667
}

fn default_length_scale() -> f32 {
    1.0
}

fn default_noise_w() -> f32 {
    0.8
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            noise_scale: default_noise_scale(),
            length_scale: default_length_scale(),
            noise_w: default_noise_w(),
        }
    }
}

/// A Piper-format voice on disk: `<id>.onnx` plus `<id>.onnx.json`.
#[derive(Debug)]
pub struct Voice {
    pub id: String,
    pub config: VoiceConfig,
    pub model_path: PathBuf,
}

impl Voice {
    pub fn load(dir: &Path, voice_id: &str) -> Result<Self, AppError> {
        let model_path = dir.join(format!("{}.onnx", voice_id));
        let config_path = dir.join(format!("{}.onnx.json", voice_id));

        if !model_path.exists() {
            return Err(AppError::ModelLoad(format!(
                "voice model {} does not exist",
                model_path.display()
            )));
        }

        let file = File::open(&config_path).map_err(|e| {
            AppError::ModelLoad(format!(
                "cannot open voice config {}: {}",
                config_path.display(),
                e
            ))
        })?;
        let config: VoiceConfig = serde_json::from_reader(file).map_err(|e| {
            AppError::ModelLoad(format!(
                "invalid voice config {}: {}",
                config_path.display(),
                e
            ))
        })?;

        Ok(Self {
            id: voice_id.to_string(),
            config,
            model_path,
        })
    }

    /// Every loadable voice in `dir`, sorted by id. Voices whose config is
    /// missing or malformed are skipped with a warning.
    pub fn discover(dir: &Path) -> Result<Vec<Voice>, AppError> {
        let entries = std::fs::read_dir(dir).map_err(|e| {
            AppError::ModelLoad(format!("cannot read voices in {}: {}", dir.display(), e))
        })?;

        let mut ids = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map(|e| e == "onnx").unwrap_or(false) {
                if let Some(stem) = path.file_stem() {
                    ids.push(stem.to_string_lossy().to_string());
                }
            }
        }
        ids.sort();

        let mut voices = Vec::new();
        for id in ids {
            match Voice::load(dir, &id) {
                Ok(voice) => voices.push(voice),
                Err(e) => tracing::warn!("Skipping voice {}: {}", id, e),
            }
        }

        Ok(voices)
    }

    pub fn language(&self) -> String {
        language_of(&self.id)
    }

    pub fn espeak_voice(&self) -> &str {
        self.config
            .espeak
            .as_ref()
            .map(|e| e.voice.as_str())
            .unwrap_or("en")
    }
}

/// Language id encoded in a voice id, e.g. `fr_FR-siwis-medium` -> `fr`.
pub fn language_of(voice_id: &str) -> String {
    voice_id
        .split(['_', '-'])
        .next()
        .unwrap_or(voice_id)
        .to_lowercase()
}
