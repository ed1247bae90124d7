//! Model hub helpers: the local cache layout, weight selection and the downloader.

mod download;

pub use download::{download_model, DownloadReport, HubClient, DEFAULT_HUB_URL};

use std::path::{Path, PathBuf};

/// Tokenizer artefacts fetched alongside the weights when a repository has them.
pub const TOKENIZER_FILES: [&str; 4] = [
    "tokenizer.json",
    "tokenizer_config.json",
    "tokenizer.model",
    "special_tokens_map.json",
];

/// Directory under `models_dir` that holds the files for hub model `name`.
///
/// `org/repo` becomes `org--repo`.
pub fn model_cache_dir(models_dir: &Path, name: &str) -> PathBuf {
    let dir_name = name.trim_matches('/').replace('/', "--");
    models_dir.join(dir_name)
}

pub fn is_gguf(filename: &str) -> bool {
    filename.to_lowercase().ends_with(".gguf")
}

/// Picks the GGUF file to use out of `candidates`.
///
/// A file whose name contains `variant` (case-insensitive) wins; otherwise the
/// first GGUF file in sorted order. Split weights (`-00002-of-00003`) are only
/// considered from their first part.
pub fn pick_weights_file<'a>(candidates: &'a [String], variant: Option<&str>) -> Option<&'a String> {
    let mut ggufs: Vec<&String> = candidates
        .iter()
        .filter(|name| is_gguf(name))
        .filter(|name| !is_later_split_part(name))
        .collect();
    ggufs.sort();

    if let Some(variant) = variant {
        let wanted = variant.to_lowercase();
        if let Some(found) = ggufs.iter().find(|name| name.to_lowercase().contains(&wanted)) {
            return Some(*found);
        }
    }

    ggufs.into_iter().next()
}

fn is_later_split_part(filename: &str) -> bool {
    let lower = filename.to_lowercase();
    lower.contains("-of-") && !lower.contains("-00001-of-")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_model_cache_dir_flattens_repo_id() {
        let dir = model_cache_dir(Path::new("models"), "TheBloke/TinyLlama-1.1B-Chat-v1.0-GGUF");
        assert_eq!(dir, PathBuf::from("models/TheBloke--TinyLlama-1.1B-Chat-v1.0-GGUF"));
    }

    #[test]
    fn test_pick_weights_prefers_variant() {
        let files = names(&["README.md", "tiny.Q2_K.gguf", "tiny.Q4_K_M.gguf", "tiny.Q8_0.gguf"]);
        assert_eq!(pick_weights_file(&files, Some("q4_k_m")).unwrap(), "tiny.Q4_K_M.gguf");
    }

    #[test]
    fn test_pick_weights_falls_back_to_first_sorted() {
        let files = names(&["tiny.Q8_0.gguf", "config.json", "tiny.Q2_K.gguf"]);
        assert_eq!(pick_weights_file(&files, Some("Q5_K_S")).unwrap(), "tiny.Q2_K.gguf");
        assert_eq!(pick_weights_file(&files, None).unwrap(), "tiny.Q2_K.gguf");
    }

    #[test]
    fn test_pick_weights_skips_later_split_parts() {
        let files = names(&["big-00002-of-00002.gguf", "big-00001-of-00002.gguf"]);
        assert_eq!(pick_weights_file(&files, None).unwrap(), "big-00001-of-00002.gguf");
    }

    #[test]
    fn test_pick_weights_none_without_gguf() {
        let files = names(&["model.safetensors", "tokenizer.json"]);
        assert!(pick_weights_file(&files, None).is_none());
    }
}
