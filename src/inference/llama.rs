use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use llama_cpp::standard_sampler::StandardSampler;
use llama_cpp::{LlamaModel, LlamaParams, SessionParams};
use tracing::{debug, info};

use super::backend::ModelBackend;
use super::types::{BackendError, GeneratedSequence};
use crate::config::{ModelConfig, QuantizationOptions};
use crate::hub;

/// Default prompt batch size for llama sessions
const SESSION_BATCH: u32 = 512;

/// Vocabulary-only view of a GGUF file, used to count prompt tokens.
pub struct LlamaTokenizer {
    vocab: LlamaModel,
    path: PathBuf,
}

impl LlamaTokenizer {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Counts tokens the way a session tokenizes the context it is fed.
    pub fn count_tokens(&self, text: &str) -> Result<usize, BackendError> {
        let tokens = self
            .vocab
            .tokenize_bytes(text, false, true)
            .map_err(|e| format!("Failed to tokenize prompt: {}", e))?;
        Ok(tokens.len())
    }
}

/// Fully loaded GGUF weights.
pub struct LlamaWeights {
    model: LlamaModel,
    path: PathBuf,
}

impl LlamaWeights {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub struct LlamaPipeline {
    weights: Arc<LlamaWeights>,
    tokenizer: Arc<LlamaTokenizer>,
    max_length: usize,
}

impl LlamaPipeline {
    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

/// [`ModelBackend`] over GGUF weights run by llama.cpp.
///
/// Model names resolve to a local file, a local directory, or the hub cache
/// directory the `download` command fills.
pub struct LlamaCppBackend {
    models_dir: PathBuf,
    n_gpu_layers: u32,
    options: QuantizationOptions,
}

impl LlamaCppBackend {
    pub fn new(config: &ModelConfig, models_dir: impl Into<PathBuf>) -> Self {
        let n_gpu_layers = if config.uses_gpu() { u32::MAX } else { 0 };
        Self {
            models_dir: models_dir.into(),
            n_gpu_layers,
            options: config.quantization_options(),
        }
    }

    /// Finds the GGUF file backing `name`.
    pub fn resolve_weights_path(&self, name: &str) -> Result<PathBuf, BackendError> {
        let direct = Path::new(name);
        if direct.is_file() {
            return Ok(direct.to_path_buf());
        }

        let search_dir = if direct.is_dir() {
            direct.to_path_buf()
        } else {
            hub::model_cache_dir(&self.models_dir, name)
        };

        if !search_dir.is_dir() {
            return Err(format!(
                "Model '{}' not found locally (looked in {}). Run the download command first.",
                name,
                search_dir.display()
            )
            .into());
        }

        let candidates: Vec<String> = fs::read_dir(&search_dir)?
            .filter_map(Result::ok)
            .filter(|entry| entry.path().is_file())
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .collect();

        let chosen = hub::pick_weights_file(&candidates, self.options.variant.as_deref()).ok_or_else(|| {
            format!(
                "No GGUF weights for '{}' in {}",
                name,
                search_dir.display()
            )
        })?;

        Ok(search_dir.join(chosen))
    }

    fn params(&self, vocab_only: bool) -> LlamaParams {
        LlamaParams {
            n_gpu_layers: if vocab_only { 0 } else { self.n_gpu_layers },
            use_mmap: self.options.use_mmap,
            use_mlock: self.options.use_mlock && !vocab_only,
            vocab_only,
            ..Default::default()
        }
    }
}

impl ModelBackend for LlamaCppBackend {
    type Tokenizer = LlamaTokenizer;
    type Model = LlamaWeights;
    type Pipeline = LlamaPipeline;

    fn resolve_tokenizer(&self, name: &str) -> Result<Self::Tokenizer, BackendError> {
        let path = self.resolve_weights_path(name)?;
        debug!(path = %path.display(), "Loading vocabulary");
        let vocab = LlamaModel::load_from_file(&path, self.params(true))
            .map_err(|e| format!("Failed to load tokenizer from {}: {}", path.display(), e))?;
        Ok(LlamaTokenizer { vocab, path })
    }

    fn resolve_model(&self, name: &str) -> Result<Self::Model, BackendError> {
        let path = self.resolve_weights_path(name)?;
        let params = self.params(false);
        info!(
            path = %path.display(),
            n_gpu_layers = params.n_gpu_layers,
            use_mmap = params.use_mmap,
            use_mlock = params.use_mlock,
            "Loading model via llama_cpp"
        );
        let model = LlamaModel::load_from_file(&path, params)
            .map_err(|e| format!("Failed to load model with llama_cpp: {}", e))?;
        Ok(LlamaWeights { model, path })
    }

    fn build_pipeline(
        &self,
        model: Arc<Self::Model>,
        tokenizer: Arc<Self::Tokenizer>,
        max_length: usize,
    ) -> Result<Self::Pipeline, BackendError> {
        if max_length == 0 {
            return Err("max_length must be greater than 0".into());
        }
        Ok(LlamaPipeline {
            weights: model,
            tokenizer,
            max_length,
        })
    }

    fn run(
        &self,
        pipeline: &Self::Pipeline,
        prompt: &str,
        max_length: usize,
        num_sequences: usize,
    ) -> Result<Vec<GeneratedSequence>, BackendError> {
        let prompt_tokens = pipeline.tokenizer.count_tokens(prompt)?;
        let budget = max_length.saturating_sub(prompt_tokens).max(1);
        let n_ctx = context_size(prompt_tokens, budget, pipeline.max_length)?;
        debug!(prompt_tokens, budget, n_ctx, "Starting completion");

        let model = &pipeline.weights.model;
        let mut sequences = Vec::with_capacity(num_sequences);
        for _ in 0..num_sequences {
            let session_params = SessionParams {
                n_ctx,
                n_batch: SESSION_BATCH,
                ..Default::default()
            };
            let mut session = model
                .create_session(session_params)
                .map_err(|e| format!("Failed to create LlamaSession: {}", e))?;

            session
                .advance_context(prompt)
                .map_err(|e| format!("Failed to advance context: {}", e))?;

            let completions = session
                .start_completing_with(StandardSampler::default(), budget)
                .map_err(|e| format!("Failed to start completion: {}", e))?;

            // Decoded as a whole so codepoints split across tokens survive
            let mut text = String::from(prompt);
            text.push_str(&completions.into_string());
            sequences.push(GeneratedSequence::new(text));
        }

        Ok(sequences)
    }

    fn release_device_memory(&self) {
        // llama.cpp frees device buffers together with the model and its sessions
        debug!(n_gpu_layers = self.n_gpu_layers, "Device buffers released with model");
    }
}

fn context_size(prompt_tokens: usize, budget: usize, max_length: usize) -> Result<u32, BackendError> {
    let needed = prompt_tokens.saturating_add(budget).max(max_length);
    u32::try_from(needed)
        .map_err(|_| format!("Context of {} tokens exceeds what llama.cpp supports", needed).into())
}
