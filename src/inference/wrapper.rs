use std::mem;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::backend::ModelBackend;
use super::types::{InferenceError, ModelState};
use crate::config::ModelConfig;

/// Sequences requested per generate call.
const NUM_SEQUENCES: usize = 1;

/// Resources held while the wrapper is loaded.
struct LoadedModel<B: ModelBackend> {
    pipeline: B::Pipeline,
    model: Arc<B::Model>,
    tokenizer: Arc<B::Tokenizer>,
    loaded_at: DateTime<Utc>,
}

enum LoadState<B: ModelBackend> {
    Unloaded,
    Loaded(LoadedModel<B>),
}

/// Lazily loads a model through a [`ModelBackend`] and generates text with it.
///
/// The wrapper starts unloaded. The first [`generate`](Self::generate) (or an
/// explicit [`load`](Self::load)) resolves the model, tokenizer and pipeline
/// named by the configuration. [`clear_memory`](Self::clear_memory) releases
/// them again, and so does dropping the wrapper or a failed generation.
///
/// Calls block until the backend returns. The wrapper is not meant to be
/// shared between threads; put it behind a `Mutex` or keep one per worker.
pub struct InferenceWrapper<B: ModelBackend> {
    config: Arc<ModelConfig>,
    backend: B,
    state: LoadState<B>,
}

impl<B: ModelBackend> InferenceWrapper<B> {
    pub fn new(config: Arc<ModelConfig>, backend: B) -> Self {
        Self {
            config,
            backend,
            state: LoadState::Unloaded,
        }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn state(&self) -> ModelState {
        match self.state {
            LoadState::Unloaded => ModelState::Unloaded,
            LoadState::Loaded(_) => ModelState::Loaded,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.state() == ModelState::Loaded
    }

    /// When the current model was loaded, if it is.
    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            LoadState::Loaded(loaded) => Some(loaded.loaded_at),
            LoadState::Unloaded => None,
        }
    }

    /// Loads the model, tokenizer and pipeline. Does nothing when already loaded.
    ///
    /// If any step fails the pieces built so far are dropped and the wrapper
    /// stays unloaded.
    pub fn load(&mut self) -> Result<(), InferenceError> {
        if self.is_loaded() {
            return Ok(());
        }

        let name = self.config.name.as_str();
        let load_error = |source| InferenceError::ModelLoad {
            model: name.to_string(),
            source,
        };

        info!(model = name, device = %self.config.device, "Loading model");
        let started = Instant::now();

        let model = Arc::new(self.backend.resolve_model(name).map_err(load_error)?);
        debug!(model = name, "Model resolved");

        let tokenizer = Arc::new(self.backend.resolve_tokenizer(name).map_err(load_error)?);
        debug!(model = name, "Tokenizer resolved");

        let pipeline = self
            .backend
            .build_pipeline(Arc::clone(&model), Arc::clone(&tokenizer), self.config.max_length)
            .map_err(load_error)?;

        self.state = LoadState::Loaded(LoadedModel {
            pipeline,
            model,
            tokenizer,
            loaded_at: Utc::now(),
        });
        info!(
            model = name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Model loaded"
        );
        Ok(())
    }

    /// Generates a continuation of `prompt`.
    ///
    /// `max_length` bounds the total token count; `None` or `Some(0)` use the
    /// configured value. The prompt echoed by the pipeline is removed from the
    /// result. On failure every held resource is released before the error is
    /// returned, so the next call starts from a fresh load.
    pub fn generate(&mut self, prompt: &str, max_length: Option<usize>) -> Result<String, InferenceError> {
        match self.try_generate(prompt, max_length) {
            Ok(text) => Ok(text),
            Err(e) => {
                warn!(model = %self.config.name, error = %e, "Generation failed, releasing model");
                self.clear_memory();
                Err(e)
            }
        }
    }

    fn try_generate(&mut self, prompt: &str, max_length: Option<usize>) -> Result<String, InferenceError> {
        self.load()?;

        let LoadState::Loaded(loaded) = &self.state else {
            return Err(InferenceError::Generation("model is not loaded".into()));
        };

        let max_length = max_length
            .filter(|&n| n > 0)
            .unwrap_or(self.config.max_length);
        debug!(prompt_chars = prompt.len(), max_length, "Running pipeline");

        let started = Instant::now();
        let sequences = self
            .backend
            .run(&loaded.pipeline, prompt, max_length, NUM_SEQUENCES)
            .map_err(InferenceError::Generation)?;

        let first = sequences
            .into_iter()
            .next()
            .ok_or_else(|| InferenceError::Generation("pipeline returned no sequences".into()))?;

        let text = strip_prompt(prompt, first.generated_text);
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            output_chars = text.len(),
            "Generation finished"
        );
        Ok(text)
    }

    /// Releases the pipeline, model and tokenizer. Safe to call in any state.
    ///
    /// On a GPU device the backend is also asked to return cached device memory.
    pub fn clear_memory(&mut self) {
        let LoadState::Loaded(loaded) = mem::replace(&mut self.state, LoadState::Unloaded) else {
            return;
        };

        let LoadedModel {
            pipeline,
            model,
            tokenizer,
            ..
        } = loaded;
        drop(pipeline);
        drop(model);
        drop(tokenizer);

        if self.config.uses_gpu() {
            self.backend.release_device_memory();
        }
        info!(model = %self.config.name, "Model memory released");
    }
}

impl<B: ModelBackend> Drop for InferenceWrapper<B> {
    fn drop(&mut self) {
        self.clear_memory();
    }
}

/// Removes the echoed prompt from pipeline output.
///
/// Only when the output starts with the exact prompt is the prefix cut and the
/// rest trimmed; any other output is returned as is.
pub fn strip_prompt(prompt: &str, generated: String) -> String {
    match generated.strip_prefix(prompt) {
        Some(rest) => rest.trim().to_string(),
        None => generated,
    }
}
