use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

pub const DEFAULT_CATEGORIES: [&str; 4] = ["potholes", "garbage", "fallen_trees", "electric_poles"];
pub const DEFAULT_EMBEDDER_MODEL: &str = "sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2";
const DEFAULT_CONFIG_PATH: &str = "config/ml_service.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// File-level settings. Every field is optional so a partial YAML file only
/// overrides what it names.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSettings {
    pub api_host: Option<String>,
    pub api_port: Option<u16>,
    pub workers: Option<usize>,
    pub models_dir: Option<PathBuf>,
    pub text_model_path: Option<PathBuf>,
    pub label_encoder_path: Option<PathBuf>,
    pub embedder_dir: Option<PathBuf>,
    pub image_model_path: Option<PathBuf>,
    pub mbert_model: Option<String>,
    pub hf_endpoint: Option<String>,
    pub embedder_cache_dir: Option<PathBuf>,
    pub embedder_max_tokens: Option<usize>,
    pub onnx_threads: Option<usize>,
    pub image_size: Option<Vec<u32>>,
    pub max_text_length: Option<usize>,
    pub categories: Option<Vec<String>>,
    pub allowed_origins: Option<Vec<String>>,
    pub log_level: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_host: String,
    pub api_port: u16,
    pub workers: Option<usize>,
    pub models_dir: PathBuf,
    pub text_model_path: PathBuf,
    pub label_encoder_path: PathBuf,
    pub embedder_dir: PathBuf,
    pub image_model_path: PathBuf,
    pub mbert_model: String,
    pub hf_endpoint: String,
    pub embedder_cache_dir: PathBuf,
    pub embedder_max_tokens: usize,
    pub onnx_threads: usize,
    pub image_size: (u32, u32),
    pub max_text_length: usize,
    pub categories: Vec<String>,
    pub allowed_origins: Vec<String>,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        let models_dir = PathBuf::from("models");
        Self {
            api_host: "0.0.0.0".to_string(),
            api_port: 8000,
            workers: None,
            text_model_path: models_dir.join("text_classifier.onnx"),
            label_encoder_path: models_dir.join("label_encoder.json"),
            embedder_dir: models_dir.join("multilingual_embedder"),
            image_model_path: models_dir.join("image_classifier.onnx"),
            models_dir,
            mbert_model: DEFAULT_EMBEDDER_MODEL.to_string(),
            hf_endpoint: "https://huggingface.co".to_string(),
            embedder_cache_dir: default_cache_dir(),
            embedder_max_tokens: 128,
            onnx_threads: 0,
            image_size: (224, 224),
            max_text_length: 512,
            categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
            ],
            log_level: "info".to_string(),
        }
    }
}

/// Platform cache directory for downloaded embedders.
pub fn default_cache_dir() -> PathBuf {
    if let Ok(path) = env::var("ML_SERVICE_CACHE") {
        return PathBuf::from(path).join("models");
    }
    if let Some(cache_dir) = dirs::cache_dir() {
        return cache_dir.join("civic-ml").join("models");
    }
    if let Some(home_dir) = dirs::home_dir() {
        return home_dir.join(".cache").join("civic-ml").join("models");
    }
    env::temp_dir().join("civic-ml").join("models")
}

impl Settings {
    /// `.env`, then the optional YAML file, then process environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let file = match env::var("ML_SERVICE_CONFIG") {
            Ok(path) => Some(FileSettings::from_path(Path::new(&path))?),
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Some(FileSettings::from_path(Path::new(DEFAULT_CONFIG_PATH))?)
            }
            Err(_) => None,
        };

        Self::resolve(file.unwrap_or_default(), |key| env::var(key).ok())
    }

    /// Layers `file` and then `lookup` over the defaults. Model paths that are not
    /// set explicitly follow `models_dir`.
    pub fn resolve<F>(file: FileSettings, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut s = Settings::default();

        if let Some(v) = file.api_host {
            s.api_host = v;
        }
        if let Some(v) = file.api_port {
            s.api_port = v;
        }
        s.workers = file.workers;
        if let Some(v) = file.mbert_model {
            s.mbert_model = v;
        }
        if let Some(v) = file.hf_endpoint {
            s.hf_endpoint = v;
        }
        if let Some(v) = file.embedder_cache_dir {
            s.embedder_cache_dir = v;
        }
        if let Some(v) = file.embedder_max_tokens {
            s.embedder_max_tokens = v;
        }
        if let Some(v) = file.onnx_threads {
            s.onnx_threads = v;
        }
        if let Some(v) = file.image_size {
            s.image_size = image_size_from_slice(&v, &format!("{:?}", v))?;
        }
        if let Some(v) = file.max_text_length {
            s.max_text_length = v;
        }
        if let Some(v) = file.categories {
            s.categories = v;
        }
        if let Some(v) = file.allowed_origins {
            s.allowed_origins = v;
        }
        if let Some(v) = file.log_level {
            s.log_level = v;
        }

        if let Some(v) = lookup("API_HOST") {
            s.api_host = v;
        }
        if let Some(v) = lookup("API_PORT") {
            s.api_port = parse_value("API_PORT", &v)?;
        }
        if let Some(v) = lookup("WORKERS") {
            s.workers = Some(parse_value("WORKERS", &v)?);
        }
        if let Some(v) = lookup("MBERT_MODEL") {
            s.mbert_model = v;
        }
        if let Some(v) = lookup("HF_ENDPOINT") {
            s.hf_endpoint = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = lookup("EMBEDDER_CACHE_DIR") {
            s.embedder_cache_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("EMBEDDER_MAX_TOKENS") {
            s.embedder_max_tokens = parse_value("EMBEDDER_MAX_TOKENS", &v)?;
        }
        if let Some(v) = lookup("ONNX_THREADS") {
            s.onnx_threads = parse_value("ONNX_THREADS", &v)?;
        }
        if let Some(v) = lookup("IMAGE_SIZE") {
            let parts = v
                .split(|c| c == ',' || c == 'x')
                .map(|p| parse_value::<u32>("IMAGE_SIZE", p.trim()))
                .collect::<Result<Vec<_>, _>>()?;
            s.image_size = image_size_from_slice(&parts, &v)?;
        }
        if let Some(v) = lookup("MAX_TEXT_LENGTH") {
            s.max_text_length = parse_value("MAX_TEXT_LENGTH", &v)?;
        }
        if let Some(v) = lookup("CATEGORIES") {
            s.categories = split_list(&v);
        }
        if let Some(v) = lookup("ALLOWED_ORIGINS") {
            s.allowed_origins = split_list(&v);
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            s.log_level = v;
        }

        let models_dir = lookup("MODELS_DIR")
            .map(PathBuf::from)
            .or(file.models_dir)
            .unwrap_or_else(|| s.models_dir.clone());
        s.text_model_path = lookup("TEXT_MODEL_PATH")
            .map(PathBuf::from)
            .or(file.text_model_path)
            .unwrap_or_else(|| models_dir.join("text_classifier.onnx"));
        s.label_encoder_path = lookup("LABEL_ENCODER_PATH")
            .map(PathBuf::from)
            .or(file.label_encoder_path)
            .unwrap_or_else(|| models_dir.join("label_encoder.json"));
        s.embedder_dir = lookup("EMBEDDER_DIR")
            .map(PathBuf::from)
            .or(file.embedder_dir)
            .unwrap_or_else(|| models_dir.join("multilingual_embedder"));
        s.image_model_path = lookup("IMAGE_MODEL_PATH")
            .map(PathBuf::from)
            .or(file.image_model_path)
            .unwrap_or_else(|| models_dir.join("image_classifier.onnx"));
        s.models_dir = models_dir;

        if s.categories.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "CATEGORIES".to_string(),
                value: String::new(),
            });
        }
        if s.max_text_length == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MAX_TEXT_LENGTH".to_string(),
                value: "0".to_string(),
            });
        }

        Ok(s)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }

    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }
}

impl FileSettings {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_yaml::from_str(&raw)?)
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn image_size_from_slice(parts: &[u32], raw: &str) -> Result<(u32, u32), ConfigError> {
    match parts {
        [w, h] if *w > 0 && *h > 0 => Ok((*w, *h)),
        _ => Err(ConfigError::InvalidValue {
            key: "IMAGE_SIZE".to_string(),
            value: raw.to_string(),
        }),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
