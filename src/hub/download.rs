use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use super::{model_cache_dir, pick_weights_file, TOKENIZER_FILES};
use crate::config::QuantizationOptions;

pub const DEFAULT_HUB_URL: &str = "https://huggingface.co";

#[derive(Debug, Deserialize)]
struct RepoInfo {
    #[serde(default)]
    siblings: Vec<RepoFile>,
}

#[derive(Debug, Deserialize)]
struct RepoFile {
    rfilename: String,
}

/// Outcome of [`download_model`].
#[derive(Debug, Clone, Default)]
pub struct DownloadReport {
    /// Directory the model files live in
    pub model_dir: PathBuf,
    /// Files fetched during this run
    pub downloaded: Vec<String>,
    /// Files that were already present
    pub skipped: Vec<String>,
    /// GGUF file selected as the model weights
    pub weights: String,
}

/// Minimal client for the model hub's HTTP API.
pub struct HubClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HubClient {
    /// Client for the public hub; picks up `HF_TOKEN` for gated repositories.
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_HUB_URL).with_token(std::env::var("HF_TOKEN").ok())
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn repo_api_url(&self, name: &str) -> String {
        format!("{}/api/models/{}", self.base_url, name)
    }

    pub fn file_url(&self, name: &str, filename: &str) -> String {
        format!("{}/{}/resolve/main/{}", self.base_url, name, filename)
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Lists the files of a hub repository.
    pub async fn list_files(&self, name: &str) -> Result<Vec<String>> {
        let url = self.repo_api_url(name);
        let response = self
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to reach model hub for '{}'", name))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Failed to list files of '{}': HTTP {}",
                name,
                response.status()
            ));
        }

        let info: RepoInfo = response
            .json()
            .await
            .with_context(|| format!("Unexpected repository listing for '{}'", name))?;
        Ok(info.siblings.into_iter().map(|f| f.rfilename).collect())
    }

    /// Downloads one repository file into `dest_dir`. Returns `false` when the
    /// file already exists locally.
    pub async fn download_file(&self, name: &str, filename: &str, dest_dir: &Path) -> Result<bool> {
        let local_name = Path::new(filename)
            .file_name()
            .ok_or_else(|| anyhow!("Invalid file name in repository: {}", filename))?;
        let local_path = dest_dir.join(local_name);

        if local_path.exists() {
            println!("✓ {} already exists, skipping download", filename);
            return Ok(false);
        }

        let response = self
            .get(&self.file_url(name, filename))
            .send()
            .await
            .with_context(|| format!("Failed to request {}", filename))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Failed to download {}: HTTP {}",
                filename,
                response.status()
            ));
        }

        let pb = ProgressBar::new(response.content_length().unwrap_or(0));
        pb.set_style(
            ProgressStyle::with_template(
                "{msg:30!} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
            )?
            .progress_chars("=> "),
        );
        pb.set_message(filename.to_string());

        let part_path = dest_dir.join(format!("{}.part", local_name.to_string_lossy()));
        let mut file = tokio::fs::File::create(&part_path)
            .await
            .with_context(|| format!("Failed to create {}", part_path.display()))?;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.with_context(|| format!("Download of {} interrupted", filename))?;
            file.write_all(&chunk).await?;
            pb.inc(chunk.len() as u64);
        }
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&part_path, &local_path).await?;
        pb.finish_with_message(format!("✓ {}", filename));
        info!(file = filename, path = %local_path.display(), "Downloaded");
        Ok(true)
    }
}

impl Default for HubClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Fetches the tokenizer artefacts and the selected GGUF weights for `name`
/// into `<models_dir>/<org>--<repo>/`.
pub async fn download_model(
    client: &HubClient,
    name: &str,
    options: &QuantizationOptions,
    models_dir: &Path,
) -> Result<DownloadReport> {
    let model_dir = model_cache_dir(models_dir, name);
    tokio::fs::create_dir_all(&model_dir)
        .await
        .with_context(|| format!("Failed to create {}", model_dir.display()))?;

    info!(model = name, dir = %model_dir.display(), "Listing repository files");
    let files = client.list_files(name).await?;

    let weights = pick_weights_file(&files, options.variant.as_deref())
        .cloned()
        .ok_or_else(|| anyhow!("Repository '{}' has no GGUF weights", name))?;
    if let Some(variant) = &options.variant {
        if !weights.to_lowercase().contains(&variant.to_lowercase()) {
            warn!(variant = %variant, weights = %weights, "Requested variant not found, using first GGUF file");
        }
    }

    let mut report = DownloadReport {
        model_dir: model_dir.clone(),
        weights: weights.clone(),
        ..Default::default()
    };

    println!("\nDownloading tokenizer...");
    for tokenizer_file in TOKENIZER_FILES {
        if files.iter().any(|f| f == tokenizer_file) {
            record(&mut report, tokenizer_file, client.download_file(name, tokenizer_file, &model_dir).await?);
        }
    }

    println!("\nDownloading model...");
    record(&mut report, &weights, client.download_file(name, &weights, &model_dir).await?);

    Ok(report)
}

fn record(report: &mut DownloadReport, filename: &str, downloaded: bool) {
    if downloaded {
        report.downloaded.push(filename.to_string());
    } else {
        report.skipped.push(filename.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let client = HubClient::with_base_url("http://localhost:9000/");
        assert_eq!(
            client.repo_api_url("org/repo"),
            "http://localhost:9000/api/models/org/repo"
        );
        assert_eq!(
            client.file_url("org/repo", "model.Q4_K_M.gguf"),
            "http://localhost:9000/org/repo/resolve/main/model.Q4_K_M.gguf"
        );
    }

    #[test]
    fn test_empty_token_is_dropped() {
        let client = HubClient::with_base_url(DEFAULT_HUB_URL).with_token(Some(String::new()));
        assert!(client.token.is_none());
    }

    #[test]
    fn test_repo_listing_parses() {
        let info: RepoInfo = serde_json::from_str(
            r#"{"id":"org/repo","siblings":[{"rfilename":"a.gguf"},{"rfilename":"README.md"}]}"#,
        )
        .unwrap();
        let names: Vec<_> = info.siblings.into_iter().map(|f| f.rfilename).collect();
        assert_eq!(names, vec!["a.gguf", "README.md"]);
    }

    #[tokio::test]
    async fn test_existing_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tokenizer.json"), b"{}").unwrap();

        // Unroutable base URL: any network access would fail the test
        let client = HubClient::with_base_url("http://127.0.0.1:9");
        let downloaded = client
            .download_file("org/repo", "tokenizer.json", dir.path())
            .await
            .unwrap();
        assert!(!downloaded);
    }
}
