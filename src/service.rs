use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::store::FileStore;
use crate::tts::{ModelRegistry, ENGLISH};

pub const MAX_TEXT_CHARS: usize = 10_000;

#[derive(Debug, Clone, Deserialize)]
pub struct SynthesisRequest {
    pub text: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub voice_prompt_url: Option<String>,
    #[serde(default)]
    pub scene_number: Option<i64>,
}

fn default_language() -> String {
    ENGLISH.to_string()
}

impl SynthesisRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.text.trim().is_empty() {
            return Err(AppError::Validation("Text cannot be empty".into()));
        }

        if self.text.chars().count() > MAX_TEXT_CHARS {
            return Err(AppError::Validation(format!(
                "Text too long (max {} chars)",
                MAX_TEXT_CHARS
            )));
        }

        if self.language.trim().is_empty() {
            return Err(AppError::Validation("Language cannot be empty".into()));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SynthesisResult {
    pub success: bool,
    pub audio_url: String,
    pub file_path: String,
    pub duration_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Outcome of one batch item, correlated by scene number.
#[derive(Debug, Serialize)]
pub struct BatchOutcome {
    pub success: bool,
    pub scene_number: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<SynthesisResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Turns requests into stored audio files.
pub struct SpeechService {
    registry: ModelRegistry,
    store: FileStore,
}

impl SpeechService {
    pub fn new(registry: ModelRegistry, store: FileStore) -> Self {
        Self { registry, store }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    pub async fn generate(&self, request: &SynthesisRequest) -> Result<SynthesisResult, AppError> {
        request.validate()?;

        tracing::info!(
            "Generating TTS for text: {}... (language: {})",
            preview(&request.text, 50),
            request.language
        );

        if let Some(prompt) = &request.voice_prompt_url {
            if !self.registry.supports_voice_prompts() {
                tracing::warn!(
                    "Voice prompt '{}' requested but the loaded backend cannot use prompts",
                    prompt
                );
            }
        }

        let engine = self.registry.get(&request.language).await?;

        let filename = FileStore::generate_filename();
        let store = self.store.clone();
        let text = request.text.clone();
        let language_id = (request.language != ENGLISH).then(|| request.language.clone());
        let voice_prompt = request.voice_prompt_url.clone();
        let target = filename.clone();

        let (path, duration) = tokio::task::spawn_blocking(move || {
            let audio = engine.generate(&text, language_id.as_deref(), voice_prompt.as_deref())?;
            let path = store.save(&target, &audio.samples, audio.sample_rate)?;
            Ok::<_, AppError>((path, audio.duration_seconds()))
        })
        .await
        .map_err(|e| AppError::Synthesis(format!("synthesis task failed: {}", e)))?
        .map_err(|e| match e {
            AppError::Storage(msg) => AppError::Synthesis(msg),
            other => other,
        })?;

        tracing::info!("Audio saved to: {}", path.display());

        let duration_seconds = (duration * 100.0).round() / 100.0;
        let message = request
            .scene_number
            .map(|scene| format!("Generated {:.2}s audio for scene {}", duration, scene));

        Ok(SynthesisResult {
            success: true,
            audio_url: format!("/audio/{}", filename),
            file_path: path.to_string_lossy().to_string(),
            duration_seconds,
            message,
        })
    }

    /// Process `requests` one after another in order. Never fails as a whole.
    pub async fn generate_batch(&self, requests: &[SynthesisRequest]) -> Vec<BatchOutcome> {
        let mut results = Vec::with_capacity(requests.len());

        for request in requests {
            let outcome = match self.generate(request).await {
                Ok(result) => BatchOutcome {
                    success: true,
                    scene_number: request.scene_number,
                    data: Some(result),
                    error: None,
                },
                Err(e) => {
                    tracing::error!(
                        "Batch generation error for scene {:?}: {}",
                        request.scene_number,
                        e
                    );
                    BatchOutcome {
                        success: false,
                        scene_number: request.scene_number,
                        data: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            results.push(outcome);
        }

        results
    }
}

fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
