//! # Inference Module
//!
//! Wraps a text-generation backend behind a small, configuration-driven API:
//! build an [`InferenceWrapper`] from a [`ModelConfig`](crate::config::ModelConfig),
//! call [`generate`](InferenceWrapper::generate), and release the model with
//! [`clear_memory`](InferenceWrapper::clear_memory) or by dropping the wrapper.
//!
//! ## Key Components
//!
//! - `ModelBackend`: the external model-serving capability (tokenizer, model,
//!   pipeline, device memory) as a trait
//! - `InferenceWrapper`: owns at most one loaded (tokenizer, model, pipeline)
//!   triple and moves between the `Unloaded` and `Loaded` states
//! - `LlamaCppBackend`: a backend running GGUF weights through llama.cpp
//! - `InferenceError`: load and generation failures

mod backend;
mod llama;
mod types;
mod wrapper;

pub use backend::ModelBackend;
pub use llama::{LlamaCppBackend, LlamaPipeline, LlamaTokenizer, LlamaWeights};
pub use types::{BackendError, GeneratedSequence, InferenceError, ModelState};
pub use wrapper::{strip_prompt, InferenceWrapper};
