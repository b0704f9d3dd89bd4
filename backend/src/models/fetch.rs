use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use super::embedder::{MODEL_FILE, TOKENIZER_FILE};

const MANIFEST_FILE: &str = "checksums.json";

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Download error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid checksum manifest: {0}")]
    Manifest(#[from] serde_json::Error),
    #[error("Hash mismatch for {file}: expected {expected}, got {actual}")]
    HashMismatch {
        file: String,
        expected: String,
        actual: String,
    },
}

/// Pulls ONNX exports of sentence-transformer repos from a Hugging Face
/// compatible hub into a local cache.
///
/// Layout: `<cache_dir>/<org>--<name>/{model.onnx,tokenizer.json,checksums.json}`.
/// The manifest records the SHA-256 of each file as written; a cached copy that
/// no longer matches it is fetched again.
pub struct HubFetcher {
    endpoint: String,
    cache_dir: PathBuf,
}

impl HubFetcher {
    pub fn new(endpoint: impl Into<String>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            cache_dir: cache_dir.into(),
        }
    }

    pub fn model_dir(&self, repo: &str) -> PathBuf {
        self.cache_dir.join(repo.replace('/', "--"))
    }

    pub fn file_url(&self, repo: &str, file: &str) -> String {
        let remote = if file == MODEL_FILE { "onnx/model.onnx" } else { file };
        format!("{}/{}/resolve/main/{}", self.endpoint, repo, remote)
    }

    pub fn is_downloaded(&self, repo: &str) -> bool {
        let dir = self.model_dir(repo);
        [MODEL_FILE, TOKENIZER_FILE, MANIFEST_FILE]
            .iter()
            .all(|f| dir.join(f).exists())
    }

    /// Returns the local directory holding a verified copy of `repo`,
    /// downloading it first when needed.
    pub fn ensure_downloaded(&self, repo: &str) -> Result<PathBuf, FetchError> {
        let dir = self.model_dir(repo);
        if self.is_downloaded(repo) {
            match self.verify(repo) {
                Ok(true) => {
                    log::info!("Using cached embedder at {:?}", dir);
                    return Ok(dir);
                }
                Ok(false) => log::warn!("Cached embedder at {:?} failed verification, re-downloading", dir),
                Err(e) => log::warn!("Could not verify cached embedder at {:?}: {}, re-downloading", dir, e),
            }
            self.remove_download(repo)?;
        }

        if let Err(e) = self.download(repo) {
            log::error!("Failed to download {}: {}", repo, e);
            let _ = self.remove_download(repo);
            return Err(e);
        }
        Ok(dir)
    }

    pub fn download(&self, repo: &str) -> Result<(), FetchError> {
        let dir = self.model_dir(repo);
        log::info!("Downloading {} into {:?}", repo, dir);
        fs::create_dir_all(&dir)?;

        let client = reqwest::blocking::Client::new();
        let mut manifest = BTreeMap::new();
        for file in [MODEL_FILE, TOKENIZER_FILE] {
            let url = self.file_url(repo, file);
            log::info!("Fetching {}", url);
            let bytes = client.get(&url).send()?.error_for_status()?.bytes()?;
            log::info!("Downloaded {} bytes for {}", bytes.len(), file);

            fs::write(dir.join(file), &bytes)?;
            manifest.insert(file.to_string(), sha256_hex(&bytes));
        }

        fs::write(dir.join(MANIFEST_FILE), serde_json::to_vec_pretty(&manifest)?)?;
        Ok(())
    }

    /// Checks every file named in the manifest against its recorded hash.
    pub fn verify(&self, repo: &str) -> Result<bool, FetchError> {
        let dir = self.model_dir(repo);
        let manifest: BTreeMap<String, String> =
            serde_json::from_slice(&fs::read(dir.join(MANIFEST_FILE))?)?;

        for file in [MODEL_FILE, TOKENIZER_FILE] {
            let Some(expected) = manifest.get(file) else {
                return Ok(false);
            };
            let actual = sha256_hex(&fs::read(dir.join(file))?);
            if &actual != expected {
                log::warn!(
                    "{}",
                    FetchError::HashMismatch {
                        file: file.to_string(),
                        expected: expected.clone(),
                        actual,
                    }
                );
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn remove_download(&self, repo: &str) -> Result<(), FetchError> {
        let dir = self.model_dir(repo);
        for file in [MODEL_FILE, TOKENIZER_FILE, MANIFEST_FILE] {
            let path = dir.join(file);
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(fetcher: &HubFetcher, repo: &str) -> PathBuf {
        let dir = fetcher.model_dir(repo);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(MODEL_FILE), b"onnx-bytes").unwrap();
        fs::write(dir.join(TOKENIZER_FILE), b"{}").unwrap();
        let manifest: BTreeMap<_, _> = [
            (MODEL_FILE.to_string(), sha256_hex(b"onnx-bytes")),
            (TOKENIZER_FILE.to_string(), sha256_hex(b"{}")),
        ]
        .into_iter()
        .collect();
        fs::write(dir.join(MANIFEST_FILE), serde_json::to_vec(&manifest).unwrap()).unwrap();
        dir
    }

    #[test]
    fn test_model_dir_and_urls() {
        let fetcher = HubFetcher::new("https://hub.example/", "/tmp/cache");
        let repo = "sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2";
        assert_eq!(
            fetcher.model_dir(repo),
            PathBuf::from("/tmp/cache/sentence-transformers--paraphrase-multilingual-MiniLM-L12-v2")
        );
        assert_eq!(
            fetcher.file_url(repo, MODEL_FILE),
            format!("https://hub.example/{}/resolve/main/onnx/model.onnx", repo)
        );
        assert_eq!(
            fetcher.file_url(repo, TOKENIZER_FILE),
            format!("https://hub.example/{}/resolve/main/tokenizer.json", repo)
        );
    }

    #[test]
    fn test_verified_cache_is_reused_without_network() {
        let cache = tempfile::tempdir().unwrap();
        // Unroutable endpoint: any download attempt would fail.
        let fetcher = HubFetcher::new("http://127.0.0.1:9", cache.path());
        let dir = seed(&fetcher, "org/model");

        assert!(fetcher.is_downloaded("org/model"));
        assert!(fetcher.verify("org/model").unwrap());
        assert_eq!(fetcher.ensure_downloaded("org/model").unwrap(), dir);
    }

    #[test]
    fn test_tampered_file_fails_verification() {
        let cache = tempfile::tempdir().unwrap();
        let fetcher = HubFetcher::new("http://127.0.0.1:9", cache.path());
        let dir = seed(&fetcher, "org/model");
        fs::write(dir.join(MODEL_FILE), b"corrupted").unwrap();

        assert!(!fetcher.verify("org/model").unwrap());
    }

    #[test]
    fn test_failed_download_leaves_no_partial_copy() {
        let cache = tempfile::tempdir().unwrap();
        let fetcher = HubFetcher::new("http://127.0.0.1:9", cache.path());

        assert!(fetcher.ensure_downloaded("org/model").is_err());
        assert!(!fetcher.is_downloaded("org/model"));
        assert!(!fetcher.model_dir("org/model").join(MODEL_FILE).exists());
    }
}
