use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context};
use serde::Deserialize;

use crate::backend::OpenAiBackend;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub prompts: PromptsSection,
    #[serde(default)]
    pub backends: HashMap<String, BackendSection>,
    #[serde(default)]
    pub storage: Option<StorageSection>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PipelineSection {
    /// Rewrite strategy: "unitwise" (per text unit) or "chunked"
    /// (whole document in bounded chunks).
    #[serde(default)]
    pub strategy: Option<String>,

    /// Backend name from `[backends]` used for rewriting.
    #[serde(default)]
    pub rewrite_backend: Option<String>,

    #[serde(default)]
    pub max_attempts: Option<usize>,
    #[serde(default)]
    pub chunk_chars: Option<usize>,
    #[serde(default)]
    pub prompt_token_budget: Option<usize>,

    #[serde(default)]
    pub trace_dir: Option<String>,
    #[serde(default)]
    pub trace_prompts: Option<bool>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PromptsSection {
    #[serde(default)]
    pub unit_rewrite: Option<String>,
    #[serde(default)]
    pub chunk_rewrite: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct BackendSection {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the API key (default: OPENAI_API_KEY).
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct StorageSection {
    pub base_url: String,
    /// Environment variable holding the storage token (default: STORAGE_TOKEN).
    #[serde(default)]
    pub token_env: Option<String>,
}

pub const DEFAULT_CONFIG_FILENAME: &str = "mailtailor.toml";
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const DEFAULT_STORAGE_TOKEN_ENV: &str = "STORAGE_TOKEN";

pub fn find_default_config(workdir: &Path, filename: &str) -> Option<PathBuf> {
    if let Ok(cwd) = std::env::current_dir() {
        if let Some(p) = find_file_upwards(&cwd, filename, 8) {
            return Some(p);
        }
    }
    if let Some(p) = find_file_upwards(workdir, filename, 8) {
        return Some(p);
    }
    None
}

pub fn find_file_upwards(start: &Path, filename: &str, max_depth: usize) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    for _ in 0..max_depth {
        let cand = dir.join(filename);
        if cand.is_file() {
            return Some(cand);
        }
        if !dir.pop() {
            break;
        }
    }
    None
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let cfg: AppConfig = toml::from_str(&text).context("parse config toml")?;
    Ok(cfg)
}

/// Builds the HTTP rewrite backend named in the config. A name with no
/// `[backends.<name>]` table still works with the built-in defaults so a
/// bare config can run against the stock endpoint.
pub fn resolve_backend(cfg: &AppConfig, name: &str) -> anyhow::Result<OpenAiBackend> {
    let section = cfg.backends.get(name).cloned().unwrap_or_default();
    build_backend(name, &section)
}

pub fn build_backend(name: &str, section: &BackendSection) -> anyhow::Result<OpenAiBackend> {
    let section = section.clone();
    let key_env = section
        .api_key_env
        .as_deref()
        .unwrap_or(DEFAULT_API_KEY_ENV);
    let api_key = std::env::var(key_env)
        .map_err(|_| anyhow!("backend {name}: environment variable {key_env} not set"))?;

    let mut backend = OpenAiBackend::new(name, api_key)
        .with_temperature(section.temperature.unwrap_or(0.3))
        .with_max_tokens(section.max_tokens.or(Some(1024)));
    if let Some(model) = section.model {
        backend = backend.with_model(model);
    }
    if let Some(url) = section.base_url {
        backend = backend.with_base_url(url);
    }
    if let Some(secs) = section.timeout_secs {
        backend = backend.with_timeout(Duration::from_secs(secs));
    }
    Ok(backend)
}
