use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::Mutex;

use super::{EngineKind, EngineLoader, SpeechEngine};
use crate::error::AppError;

/// Owns the English and Multilingual engines, loading each on first use.
pub struct ModelRegistry {
    loader: Arc<dyn EngineLoader>,
    engines: Arc<RwLock<HashMap<EngineKind, Arc<dyn SpeechEngine>>>>,
    english_load: Arc<Mutex<()>>,
    multilingual_load: Arc<Mutex<()>>,
}

impl ModelRegistry {
    pub fn new(loader: Arc<dyn EngineLoader>) -> Self {
        Self {
            loader,
            engines: Arc::new(RwLock::new(HashMap::new())),
            english_load: Arc::new(Mutex::new(())),
            multilingual_load: Arc::new(Mutex::new(())),
        }
    }

    pub fn device(&self) -> &str {
        self.loader.device()
    }

    pub fn is_loaded(&self, kind: EngineKind) -> bool {
        self.cached(kind).is_some()
    }

    pub fn supports_voice_prompts(&self) -> bool {
        self.loader.supports_voice_prompts()
    }

    /// Engine for `language`: English for `"en"`, Multilingual otherwise.
    pub async fn get(&self, language: &str) -> Result<Arc<dyn SpeechEngine>, AppError> {
        self.engine(EngineKind::for_language(language)).await
    }

    pub async fn engine(&self, kind: EngineKind) -> Result<Arc<dyn SpeechEngine>, AppError> {
        if let Some(engine) = self.cached(kind) {
            return Ok(engine);
        }

        let guard = Arc::clone(self.load_lock(kind)).lock_owned().await;

        // Another caller may have finished loading while we waited.
        if let Some(engine) = self.cached(kind) {
            return Ok(engine);
        }

        // Load and publish on a detached task that owns the guard, so a
        // dropped caller cannot release the lock before the engine is stored.
        let loader = Arc::clone(&self.loader);
        let engines = Arc::clone(&self.engines);
        let load = tokio::spawn(async move {
            let _guard = guard;

            tracing::info!("Loading {} TTS model...", kind);
            let loaded = tokio::task::spawn_blocking(move || loader.load(kind))
                .await
                .map_err(|e| {
                    AppError::ModelLoad(format!("{} model loader panicked: {}", kind, e))
                })?;

            let engine = match loaded {
                Ok(engine) => engine,
                Err(e) => {
                    tracing::error!("Failed to load {} model: {}", kind, e);
                    return Err(e);
                }
            };

            engines
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(kind, Arc::clone(&engine));
            tracing::info!("{} model loaded successfully", kind);

            Ok(engine)
        });

        load.await
            .map_err(|e| AppError::ModelLoad(format!("{} model load task failed: {}", kind, e)))?
    }

    fn cached(&self, kind: EngineKind) -> Option<Arc<dyn SpeechEngine>> {
        self.engines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
    }

    fn load_lock(&self, kind: EngineKind) -> &Arc<Mutex<()>> {
        match kind {
            EngineKind::English => &self.english_load,
            EngineKind::Multilingual => &self.multilingual_load,
        }
    }
}
