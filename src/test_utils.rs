//! In-process engines used by unit and router tests in place of ONNX voices.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::AppError;
use crate::tts::{EngineKind, EngineLoader, SpeechEngine, Synthesis};

pub const FAKE_SAMPLE_RATE: u32 = 16_000;
pub const FAKE_LANGUAGES: &[&str] = &["de", "es", "fr", "it"];

/// One recorded `generate` call.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub kind: EngineKind,
    pub text: String,
    pub language_id: Option<String>,
    pub audio_prompt: Option<String>,
}

/// Produces 10 ms of silence per input character.
pub struct FakeEngine {
    kind: EngineKind,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl SpeechEngine for FakeEngine {
    fn generate(
        &self,
        text: &str,
        language_id: Option<&str>,
        audio_prompt: Option<&str>,
    ) -> Result<Synthesis, AppError> {
        self.calls.lock().unwrap().push(Call {
            kind: self.kind,
            text: text.to_string(),
            language_id: language_id.map(str::to_string),
            audio_prompt: audio_prompt.map(str::to_string),
        });

        if self.kind == EngineKind::Multilingual {
            let language = language_id
                .ok_or_else(|| AppError::Synthesis("language_id is required".into()))?;
            if !FAKE_LANGUAGES.contains(&language) {
                return Err(AppError::Synthesis(format!(
                    "Unsupported language '{}'",
                    language
                )));
            }
        }

        let samples = (0..text.chars().count() * 160)
            .map(|i| ((i % 32) as f32 / 32.0) - 0.5)
            .collect();
        Ok(Synthesis {
            samples,
            sample_rate: FAKE_SAMPLE_RATE,
        })
    }
}

pub struct FakeLoader {
    loads: Mutex<HashMap<EngineKind, usize>>,
    failures: Mutex<HashMap<EngineKind, usize>>,
    load_delay: Option<Duration>,
    voice_prompts: bool,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl FakeLoader {
    pub fn new() -> Self {
        Self {
            loads: Mutex::default(),
            failures: Mutex::default(),
            load_delay: None,
            voice_prompts: true,
            calls: Arc::default(),
        }
    }

    pub fn without_voice_prompts(mut self) -> Self {
        self.voice_prompts = false;
        self
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = Some(delay);
        self
    }

    /// Fail the first `count` loads of `kind`.
    pub fn failing_first(self, kind: EngineKind, count: usize) -> Self {
        self.failures.lock().unwrap().insert(kind, count);
        self
    }

    pub fn loads(&self, kind: EngineKind) -> usize {
        self.loads.lock().unwrap().get(&kind).copied().unwrap_or(0)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

impl EngineLoader for FakeLoader {
    fn load(&self, kind: EngineKind) -> Result<Arc<dyn SpeechEngine>, AppError> {
        *self.loads.lock().unwrap().entry(kind).or_default() += 1;
        if let Some(delay) = self.load_delay {
            std::thread::sleep(delay);
        }

        let should_fail = {
            let mut failures = self.failures.lock().unwrap();
            match failures.get_mut(&kind) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            }
        };

        if should_fail {
            return Err(AppError::ModelLoad(format!("{} weights unavailable", kind)));
        }

        Ok(Arc::new(FakeEngine {
            kind,
            calls: Arc::clone(&self.calls),
        }))
    }

    fn device(&self) -> &str {
        "cpu"
    }

    fn supports_voice_prompts(&self) -> bool {
        self.voice_prompts
    }
}
