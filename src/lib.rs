//! Configuration-driven text generation on top of a pluggable model backend.
//!
//! Load a [`config::ModelConfig`] from YAML, wrap it in an
//! [`inference::InferenceWrapper`] together with a [`inference::ModelBackend`],
//! and call `generate`. The `hub` module fetches model files into the local
//! cache the bundled llama.cpp backend reads from.

pub mod chat;
pub mod config;
pub mod hub;
pub mod inference;
