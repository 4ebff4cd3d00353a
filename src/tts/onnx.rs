use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::process::Command;
use std::sync::{Arc, Mutex};

use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;

use super::voice::Voice;
use super::{EngineKind, EngineLoader, SpeechEngine, Synthesis};
use crate::error::AppError;

/// Loads Piper-format ONNX voices from `<models_dir>/english` and
/// `<models_dir>/multilingual`.
pub struct OnnxLoader {
    models_dir: PathBuf,
    threads: usize,
}

impl OnnxLoader {
    pub fn new(models_dir: PathBuf, threads: usize) -> Self {
        Self {
            models_dir,
            threads,
        }
    }

    fn voices_dir(&self, kind: EngineKind) -> PathBuf {
        match kind {
            EngineKind::English => self.models_dir.join("english"),
            EngineKind::Multilingual => self.models_dir.join("multilingual"),
        }
    }
}

impl EngineLoader for OnnxLoader {
    fn load(&self, kind: EngineKind) -> Result<Arc<dyn SpeechEngine>, AppError> {
        let dir = self.voices_dir(kind);
        let voices = Voice::discover(&dir)?;
        if voices.is_empty() {
            return Err(AppError::ModelLoad(format!(
                "no voices found in {}",
                dir.display()
            )));
        }

        let mut sessions = BTreeMap::new();
        for voice in &voices {
            let language = match kind {
                EngineKind::English => super::ENGLISH.to_string(),
                EngineKind::Multilingual => voice.language(),
            };
            if sessions.contains_key(&language) {
                tracing::debug!("Ignoring voice {}: '{}' already has a voice", voice.id, language);
                continue;
            }
            tracing::info!("Loading voice {} for '{}'", voice.id, language);
            sessions.insert(language, VoiceSession::new(voice, self.threads)?);
        }

        Ok(Arc::new(OnnxEngine { kind, sessions }))
    }

    fn device(&self) -> &str {
        "cpu"
    }

    fn supports_voice_prompts(&self) -> bool {
        false
    }
}

/// An engine backed by one ONNX voice per supported language.
pub struct OnnxEngine {
    kind: EngineKind,
    sessions: BTreeMap<String, VoiceSession>,
}

impl OnnxEngine {
    pub fn languages(&self) -> Vec<&str> {
        self.sessions.keys().map(String::as_str).collect()
    }

    fn session_for(&self, language_id: Option<&str>) -> Result<&VoiceSession, AppError> {
        match (self.kind, language_id) {
            (EngineKind::English, _) => self
                .sessions
                .values()
                .next()
                .ok_or_else(|| AppError::Synthesis("English engine has no voice".into())),
            (EngineKind::Multilingual, None) => Err(AppError::Synthesis(
                "the multilingual model requires a language id".into(),
            )),
            (EngineKind::Multilingual, Some(language)) => {
                self.sessions.get(language).ok_or_else(|| {
                    AppError::Synthesis(format!(
                        "Unsupported language '{}'. Supported languages: {}",
                        language,
                        self.languages().join(", ")
                    ))
                })
            }
        }
    }
}

impl SpeechEngine for OnnxEngine {
    fn generate(
        &self,
        text: &str,
        language_id: Option<&str>,
        audio_prompt: Option<&str>,
    ) -> Result<Synthesis, AppError> {
        if let Some(prompt) = audio_prompt {
            tracing::warn!(
                "Rejecting voice prompt '{}': ONNX voices cannot be conditioned",
                prompt
            );
            return Err(AppError::Synthesis(format!(
                "voice prompts are not supported by ONNX voices (got '{}')",
                prompt
            )));
        }

        let session = self.session_for(language_id)?;
        let phonemes = phonemize(text, &session.espeak_voice)?;
        let ids = phonemes_to_ids(&phonemes, &session.phoneme_id_map);
        let samples = session.synthesize(&ids)?;

        Ok(Synthesis {
            samples,
            sample_rate: session.sample_rate,
        })
    }
}

struct VoiceSession {
    session: Mutex<Session>,
    espeak_voice: String,
    phoneme_id_map: HashMap<String, Vec<i64>>,
    sample_rate: u32,
    noise_scale: f32,
    length_scale: f32,
    noise_w: f32,
}

impl VoiceSession {
    fn new(voice: &Voice, threads: usize) -> Result<Self, AppError> {
        let session = Session::builder()
            .map_err(|e| AppError::ModelLoad(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| AppError::ModelLoad(format!("Failed to set optimization level: {}", e)))?
            .with_intra_threads(threads)
            .map_err(|e| AppError::ModelLoad(format!("Failed to set threads: {}", e)))?
            .commit_from_file(&voice.model_path)
            .map_err(|e| {
                AppError::ModelLoad(format!(
                    "Failed to load model {}: {}",
                    voice.model_path.display(),
                    e
                ))
            })?;

        let inference = voice.config.inference.clone().unwrap_or_default();

        Ok(Self {
            session: Mutex::new(session),
            espeak_voice: voice.espeak_voice().to_string(),
            phoneme_id_map: voice.config.phoneme_id_map.clone(),
            sample_rate: voice.config.audio.sample_rate,
            noise_scale: inference.noise_scale,
            length_scale: inference.length_scale,
            noise_w: inference.noise_w,
        })
    }

    fn synthesize(&self, phoneme_ids: &[i64]) -> Result<Vec<f32>, AppError> {
        if phoneme_ids.is_empty() {
            return Ok(Vec::new());
        }

        let input_len = phoneme_ids.len();

        // input: [batch, sequence] = [1, phoneme_count]
        let input_value = Value::from_array((vec![1, input_len], phoneme_ids.to_vec()))
            .map_err(|e| AppError::Synthesis(format!("Failed to create input tensor: {}", e)))?;

        let lengths_value = Value::from_array((vec![1], vec![input_len as i64]))
            .map_err(|e| AppError::Synthesis(format!("Failed to create lengths tensor: {}", e)))?;

        let scales_value = Value::from_array((
            vec![3],
            vec![self.noise_scale, self.length_scale, self.noise_w],
        ))
        .map_err(|e| AppError::Synthesis(format!("Failed to create scales tensor: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| AppError::Synthesis("voice session lock poisoned".into()))?;
        let outputs = session
            .run(ort::inputs![input_value, lengths_value, scales_value])
            .map_err(|e| AppError::Synthesis(format!("Inference failed: {}", e)))?;

        let output = outputs
            .get("output")
            .or_else(|| outputs.get("audio"))
            .ok_or_else(|| AppError::Synthesis("Missing output tensor".to_string()))?;

        let (_, audio) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| AppError::Synthesis(format!("Failed to extract output tensor: {}", e)))?;

        Ok(audio.to_vec())
    }
}

/// Convert text to IPA phonemes using espeak-ng
pub fn phonemize(text: &str, voice: &str) -> Result<String, AppError> {
    if text.is_empty() {
        return Ok(String::new());
    }

    let output = Command::new("espeak-ng")
        .args(espeak_args(text, voice))
        .output()
        .map_err(|e| {
            AppError::Synthesis(format!("Failed to run espeak-ng (is it installed?): {}", e))
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AppError::Synthesis(format!("espeak-ng failed: {}", stderr)));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// `--` ends option parsing so text starting with `-` is never read as a flag.
fn espeak_args<'a>(text: &'a str, voice: &'a str) -> [&'a str; 6] {
    ["--ipa", "-q", "-v", voice, "--", text]
}

/// Map phonemes to model ids, framed by BOS `^` and EOS `$` with `_` padding.
pub fn phonemes_to_ids(phonemes: &str, id_map: &HashMap<String, Vec<i64>>) -> Vec<i64> {
    let mut ids = Vec::new();

    match id_map.get("^") {
        Some(bos) => ids.extend(bos),
        None => ids.push(0),
    }

    let pad = id_map.get("_");
    for ch in phonemes.chars() {
        if let Some(mapped) = id_map.get(ch.to_string().as_str()) {
            ids.extend(mapped);
        }
        if let Some(pad) = pad {
            ids.extend(pad);
        }
    }

    match id_map.get("$") {
        Some(eos) => ids.extend(eos),
        None => ids.push(0),
    }

    ids
}
