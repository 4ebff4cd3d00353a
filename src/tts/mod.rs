pub mod onnx;
pub mod registry;
pub mod voice;

use std::fmt;
use std::sync::Arc;

use crate::error::AppError;

pub use onnx::OnnxLoader;
pub use registry::ModelRegistry;

/// Language code served by the dedicated English engine.
pub const ENGLISH: &str = "en";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    English,
    Multilingual,
}

impl EngineKind {
    pub fn for_language(language: &str) -> Self {
        if language == ENGLISH {
            EngineKind::English
        } else {
            EngineKind::Multilingual
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::English => f.write_str("English"),
            EngineKind::Multilingual => f.write_str("Multilingual"),
        }
    }
}

/// Raw mono audio produced by an engine.
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Synthesis {
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// A loaded text-to-speech model. Calls block until audio is ready.
pub trait SpeechEngine: Send + Sync {
    /// `language_id` is `None` for the English engine. `audio_prompt` is
    /// omitted entirely when the caller supplied no voice prompt.
    fn generate(
        &self,
        text: &str,
        language_id: Option<&str>,
        audio_prompt: Option<&str>,
    ) -> Result<Synthesis, AppError>;
}

/// Constructs engines from pretrained weights. Construction blocks.
pub trait EngineLoader: Send + Sync {
    fn load(&self, kind: EngineKind) -> Result<Arc<dyn SpeechEngine>, AppError>;

    /// Compute device the engines run on, as reported by the status endpoints.
    fn device(&self) -> &str;

    /// Whether loaded engines can condition synthesis on a voice prompt.
    fn supports_voice_prompts(&self) -> bool;
}
