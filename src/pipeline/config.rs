use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};

use crate::config::{
    find_default_config, load_config, AppConfig, BackendSection, StorageSection,
    DEFAULT_CONFIG_FILENAME,
};
use crate::html::chunk::DEFAULT_CHUNK_CHARS;
use crate::pipeline::prompts::{default_prompt_files, PromptCatalog, DEFAULT_PROMPTS_DIR};

pub const DEFAULT_MAX_ATTEMPTS: usize = 3;
pub const DEFAULT_PROMPT_TOKEN_BUDGET: usize = 4096;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrategyKind {
    /// Rewrite each text unit independently with retry/fallback.
    Unitwise,
    /// Rewrite the whole serialized document in bounded chunks.
    Chunked,
}

impl StrategyKind {
    pub fn parse(s: Option<&str>) -> anyhow::Result<Self> {
        match s.unwrap_or("unitwise").trim().to_ascii_lowercase().as_str() {
            "unitwise" => Ok(Self::Unitwise),
            "chunked" => Ok(Self::Chunked),
            other => Err(anyhow!("unknown strategy: {other} (use unitwise or chunked)")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub config_path: PathBuf,

    pub strategy: StrategyKind,
    pub rewrite_backend: String,
    /// `[backends.<rewrite_backend>]` section (defaults when absent), kept
    /// so the host can build the HTTP client without re-reading the file.
    pub backend_section: BackendSection,
    pub max_attempts: usize,
    pub chunk_chars: usize,
    pub prompt_token_budget: usize,

    pub trace_dir: PathBuf,
    pub trace_prompts: bool,

    pub prompts: PromptCatalog,
    pub storage: Option<StorageSection>,
}

impl PipelineConfig {
    /// Resolves the effective configuration from the discovered (or given)
    /// config file plus CLI overrides. Works without any config file at
    /// all: every knob has a built-in default.
    pub fn from_paths_and_args(
        input: &Path,
        config_path: Option<PathBuf>,
        strategy: Option<String>,
        rewrite_backend: Option<String>,
        max_attempts: Option<usize>,
        chunk_chars: Option<usize>,
    ) -> anyhow::Result<Self> {
        let workdir = input
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let cfg_file = config_path
            .or_else(|| std::env::var("MAILTAILOR_CONFIG").ok().map(PathBuf::from))
            .or_else(|| find_default_config(&workdir, DEFAULT_CONFIG_FILENAME));

        let mut file_cfg = AppConfig::default();
        if let Some(p) = cfg_file.as_ref() {
            if p.exists() {
                file_cfg = load_config(p)?;
            }
        }
        let cfg_path = cfg_file.unwrap_or_else(|| workdir.join(DEFAULT_CONFIG_FILENAME));

        let strategy = StrategyKind::parse(
            strategy
                .as_deref()
                .or(file_cfg.pipeline.strategy.as_deref()),
        )?;
        let rewrite_backend = rewrite_backend
            .or_else(|| file_cfg.pipeline.rewrite_backend.clone())
            .unwrap_or_else(|| "gpt-4".to_string());
        let backend_section = file_cfg
            .backends
            .get(&rewrite_backend)
            .cloned()
            .unwrap_or_default();

        let max_attempts = max_attempts
            .or(file_cfg.pipeline.max_attempts)
            .unwrap_or(DEFAULT_MAX_ATTEMPTS)
            .max(1);
        let chunk_chars = chunk_chars
            .or(file_cfg.pipeline.chunk_chars)
            .unwrap_or(DEFAULT_CHUNK_CHARS)
            .max(1);
        let prompt_token_budget = file_cfg
            .pipeline
            .prompt_token_budget
            .unwrap_or(DEFAULT_PROMPT_TOKEN_BUDGET)
            .max(1);

        let trace_dir = file_cfg
            .pipeline
            .trace_dir
            .clone()
            .unwrap_or_else(|| "_trace".to_string());
        let trace_dir = if Path::new(&trace_dir).is_absolute() {
            PathBuf::from(trace_dir)
        } else {
            workdir.join(trace_dir)
        };
        let trace_prompts = file_cfg.pipeline.trace_prompts.unwrap_or(false);

        let prompts = PromptCatalog::load(&cfg_path, &file_cfg)?;

        Ok(Self {
            config_path: cfg_path,
            strategy,
            rewrite_backend,
            backend_section,
            max_attempts,
            chunk_chars,
            prompt_token_budget,
            trace_dir,
            trace_prompts,
            prompts,
            storage: file_cfg.storage,
        })
    }
}

/// Writes a default config file plus the default prompt files, refusing to
/// clobber existing ones unless `force` is set.
pub fn init_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("create dir: {}", dir.display()))?;

    let cfg_path = dir.join(DEFAULT_CONFIG_FILENAME);
    if cfg_path.exists() && !force {
        return Err(anyhow!(
            "config already exists: {} (use --force to overwrite)",
            cfg_path.display()
        ));
    }
    std::fs::write(&cfg_path, DEFAULT_CONFIG_TEXT)
        .with_context(|| format!("write config: {}", cfg_path.display()))?;

    let prompts_dir = dir.join(DEFAULT_PROMPTS_DIR);
    std::fs::create_dir_all(&prompts_dir)
        .with_context(|| format!("create prompts dir: {}", prompts_dir.display()))?;
    for (name, text) in default_prompt_files() {
        let path = prompts_dir.join(name);
        if path.exists() && !force {
            continue;
        }
        std::fs::write(&path, text).with_context(|| format!("write prompt: {}", path.display()))?;
    }

    Ok(cfg_path)
}

const DEFAULT_CONFIG_TEXT: &str = r#"[pipeline]
# "unitwise" rewrites each paragraph/span independently with validation and
# retry; "chunked" rewrites the whole document in tag-aligned chunks.
strategy = "unitwise"
rewrite_backend = "gpt-4"
max_attempts = 3
chunk_chars = 6000
prompt_token_budget = 4096
# trace_dir = "_trace"
# trace_prompts = true

[backends.gpt-4]
model = "gpt-4"
# base_url = "https://api.openai.com/v1"
# api_key_env = "OPENAI_API_KEY"
temperature = 0.3
max_tokens = 1024
timeout_secs = 120

[prompts]
# unit_rewrite = "prompts/unit_rewrite.txt"
# chunk_rewrite = "prompts/chunk_rewrite.txt"

# [storage]
# base_url = "https://storage.example.com/v2/storage"
# token_env = "STORAGE_TOKEN"
"#;
