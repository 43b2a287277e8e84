use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use clap::{CommandFactory, Parser};

use mailtailor::config::{build_backend, DEFAULT_STORAGE_TOKEN_ENV};
use mailtailor::pipeline::{init_default_config, PersonalizerPipeline, PipelineConfig, RunContext};
use mailtailor::progress::ConsoleProgress;
use mailtailor::storage::{DirStore, HttpFileStore, NewsletterStore};

#[derive(Parser, Debug)]
#[command(name = "mailtailor")]
#[command(about = "Personalize an HTML newsletter per customer segment (LLM rewrite with validation + fallback)", long_about = None)]
struct Args {
    /// Generate default config + prompt files, then exit
    #[arg(long)]
    init_config: bool,

    /// Directory to write config/prompt files (default: current directory)
    #[arg(long, value_name = "DIR")]
    init_config_dir: Option<PathBuf>,

    /// Overwrite existing config/prompt files when used with --init-config
    #[arg(long)]
    force: bool,

    /// Input newsletter (HTML)
    #[arg(value_name = "HTML")]
    input: Option<PathBuf>,

    /// Customer segment description (repeat for several segments)
    #[arg(short = 's', long = "segment", value_name = "TEXT")]
    segments: Vec<String>,

    /// Emailing platform name, mentioned in the chunked prompt only
    #[arg(long)]
    platform: Option<String>,

    /// Rewrite strategy: unitwise or chunked
    #[arg(long)]
    strategy: Option<String>,

    /// Rewrite backend name from config
    #[arg(long)]
    rewrite_backend: Option<String>,

    /// Config file path (default: search for mailtailor.toml upwards)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Rewrite attempts per unit before reverting to the original
    #[arg(long)]
    max_attempts: Option<usize>,

    /// Chunk length bound for the chunked strategy
    #[arg(long)]
    chunk_chars: Option<usize>,

    /// Output directory for personalized newsletters (default: next to input)
    #[arg(short, long, value_name = "DIR")]
    out_dir: Option<PathBuf>,

    /// Upload results to the configured remote store instead of writing locally
    #[arg(long)]
    upload: bool,

    /// Regenerate only the segment at this 1-based position
    #[arg(long, value_name = "N")]
    only_segment: Option<usize>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.init_config {
        let dir = args
            .init_config_dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let cfg_path = init_default_config(&dir, args.force).context("init default config")?;
        eprintln!("Wrote config: {}", cfg_path.display());
        return Ok(());
    }

    let input = match args.input {
        Some(p) => p,
        None => {
            let mut cmd = Args::command();
            cmd.print_help().context("print help")?;
            eprintln!(
                "\n\nUSAGE:\n  mailtailor newsletter.html -s \"frugal shoppers\" -s \"new parents\"\n\nTIPS:\n  - Run `mailtailor --init-config` once to create mailtailor.toml and the prompt files.\n  - Set OPENAI_API_KEY (or the api_key_env configured for the backend).\n"
            );
            return Ok(());
        }
    };

    if args.segments.iter().all(|s| s.trim().is_empty()) {
        return Err(anyhow!("no customer segments given (use -s/--segment)"));
    }

    let html = read_html(&input)?;

    let cfg = PipelineConfig::from_paths_and_args(
        &input,
        args.config,
        args.strategy,
        args.rewrite_backend,
        args.max_attempts,
        args.chunk_chars,
    )
    .context("build config")?;

    let backend = build_backend(&cfg.rewrite_backend, &cfg.backend_section)?;

    let out_dir = args
        .out_dir
        .clone()
        .or_else(|| input.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."));
    let store: Box<dyn NewsletterStore> = if args.upload {
        let storage = cfg
            .storage
            .clone()
            .ok_or_else(|| anyhow!("--upload needs a [storage] section in the config"))?;
        let token_env = storage
            .token_env
            .as_deref()
            .unwrap_or(DEFAULT_STORAGE_TOKEN_ENV);
        let token = std::env::var(token_env)
            .map_err(|_| anyhow!("storage: environment variable {token_env} not set"))?;
        Box::new(HttpFileStore::new(storage.base_url.clone(), token))
    } else {
        Box::new(DirStore::new(out_dir))
    };

    let progress = ConsoleProgress::new(true);
    progress.info(format!("Read newsletter: {}", input.display()));

    let pipeline = PersonalizerPipeline::new(cfg, Box::new(backend), progress);

    let platform = args.platform.as_deref().unwrap_or("");
    let mut ctx = if let Some(n) = args.only_segment {
        if n == 0 {
            return Err(anyhow!("--only-segment positions are 1-based"));
        }
        let description = args
            .segments
            .get(n - 1)
            .filter(|s| !s.trim().is_empty())
            .with_context(|| format!("--only-segment {n} is out of range"))?
            .clone();
        let mut ctx = RunContext::default();
        pipeline.regenerate_segment(&mut ctx, &html, n, &description, platform);
        ctx
    } else {
        pipeline.personalize_newsletter(&html, &args.segments, platform)
    };

    pipeline.store_results(&mut ctx, store.as_ref());

    if !ctx.stored_links.is_empty() {
        println!("Done:");
        for (key, url) in &ctx.stored_links {
            println!("  {key}: {url}");
        }
    }
    if !ctx.failures.is_empty() {
        for (key, err) in &ctx.failures {
            eprintln!("FAILED {key}: {err}");
        }
        if ctx.results.is_empty() {
            return Err(anyhow!("no segment finished successfully"));
        }
    }
    Ok(())
}

/// Reads the newsletter as UTF-8, stripping a BOM and replacing invalid
/// sequences rather than failing the run.
fn read_html(path: &Path) -> anyhow::Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("read input: {}", path.display()))?;
    let (text, _, _) = encoding_rs::UTF_8.decode(&bytes);
    Ok(text.into_owned())
}
