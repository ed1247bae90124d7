use std::error::Error;
use std::fmt;

/// Error type produced by a [`ModelBackend`](super::ModelBackend).
pub type BackendError = Box<dyn Error + Send + Sync>;

/// One sequence returned by a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedSequence {
    /// Full text produced by the pipeline, prompt echo included
    pub generated_text: String,
}

impl GeneratedSequence {
    pub fn new(generated_text: impl Into<String>) -> Self {
        Self {
            generated_text: generated_text.into(),
        }
    }
}

/// Load state of an [`InferenceWrapper`](super::InferenceWrapper).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    Unloaded,
    Loaded,
}

impl fmt::Display for ModelState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ModelState::Unloaded => write!(f, "unloaded"),
            ModelState::Loaded => write!(f, "loaded"),
        }
    }
}

/// Errors raised by the inference wrapper
#[derive(Debug)]
pub enum InferenceError {
    /// The backend could not produce a tokenizer, model, or pipeline for a name
    ModelLoad {
        model: String,
        source: BackendError,
    },
    /// The pipeline failed while generating
    Generation(BackendError),
}

impl fmt::Display for InferenceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            InferenceError::ModelLoad { model, source } => {
                write!(f, "Failed to load model '{}': {}", model, source)
            }
            InferenceError::Generation(source) => write!(f, "Generation failed: {}", source),
        }
    }
}

impl Error for InferenceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            InferenceError::ModelLoad { source, .. } => Some(source.as_ref()),
            InferenceError::Generation(source) => Some(source.as_ref()),
        }
    }
}
