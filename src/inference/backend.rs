use std::sync::Arc;

use super::types::{BackendError, GeneratedSequence};

/// The model-serving library the wrapper delegates to.
///
/// Tokenization, the decoding loop, quantized weights and device memory all
/// live behind this trait. The wrapper only sequences the calls and owns
/// what they return.
pub trait ModelBackend {
    type Tokenizer;
    type Model;
    /// A runnable (model, tokenizer, decoding loop) bundle
    type Pipeline;

    /// Resolves the tokenizer that belongs to the model `name`.
    fn resolve_tokenizer(&self, name: &str) -> Result<Self::Tokenizer, BackendError>;

    /// Resolves and loads the model weights for `name`.
    fn resolve_model(&self, name: &str) -> Result<Self::Model, BackendError>;

    /// Binds a model and tokenizer into a pipeline whose default length bound is `max_length`.
    fn build_pipeline(
        &self,
        model: Arc<Self::Model>,
        tokenizer: Arc<Self::Tokenizer>,
        max_length: usize,
    ) -> Result<Self::Pipeline, BackendError>;

    /// Runs the pipeline on `prompt`.
    ///
    /// Each returned sequence holds the full text, so it starts with the
    /// prompt when the backend echoes it.
    fn run(
        &self,
        pipeline: &Self::Pipeline,
        prompt: &str,
        max_length: usize,
        num_sequences: usize,
    ) -> Result<Vec<GeneratedSequence>, BackendError>;

    /// Asks the runtime to hand cached device memory back after a model was dropped.
    fn release_device_memory(&self) {}
}
