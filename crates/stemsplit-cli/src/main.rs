//! Stemsplit command-line front end
//!
//! Usage:
//!   stemsplit separate song.wav --model 4stems --out stems/
//!   stemsplit check --model 2stems
//!   stemsplit cache size | clear
//!   stemsplit config path | init

mod wav;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use stemsplit_core::config::{default_config_path, load_separation_config, save_config};
use stemsplit_core::separation::{
    ModelManager, ModelVariant, SeparationConfig, SeparationProgress, SeparationService,
    SeparationStage,
};

#[derive(Parser)]
#[command(name = "stemsplit", version, about = "Split a mix into stems")]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Separate a WAV file into stems
    Separate {
        /// Input WAV file
        input: PathBuf,
        /// Model variant: 2stems, 4stems or 5stems
        #[arg(short, long, default_value = "4stems", value_parser = parse_variant)]
        model: ModelVariant,
        /// Output directory (defaults to the input's directory)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Check whether a model variant can be sourced
    Check {
        #[arg(short, long, default_value = "4stems", value_parser = parse_variant)]
        model: ModelVariant,
    },
    /// Manage downloaded models
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Inspect or create the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Print the total size of cached models
    Size,
    /// Delete cached models (all variants unless --model is given)
    Clear {
        #[arg(short, long, value_parser = parse_variant)]
        model: Option<ModelVariant>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the config file location
    Path,
    /// Write the default config (keeps an existing file unless --force)
    Init {
        #[arg(short, long)]
        force: bool,
    },
}

fn parse_variant(name: &str) -> std::result::Result<ModelVariant, String> {
    ModelVariant::parse(name).ok_or_else(|| {
        let names: Vec<&str> = ModelVariant::all().iter().map(|v| v.as_str()).collect();
        format!("unknown model '{}', expected one of {}", name, names.join(", "))
    })
}

fn main() -> Result<()> {
    // Set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.clone().or_else(default_config_path);

    match cli.command {
        Commands::Separate { input, model, out } => {
            let config = load_separation_config(config_path.as_deref());
            separate(config, &input, model, out)
        }
        Commands::Check { model } => {
            let config = load_separation_config(config_path.as_deref());
            check(&config, model)
        }
        Commands::Cache { action } => {
            let config = load_separation_config(config_path.as_deref());
            cache(&config, action)
        }
        Commands::Config { action } => config_command(config_path.as_deref(), action),
    }
}

fn separate(
    config: SeparationConfig,
    input: &Path,
    variant: ModelVariant,
    out: Option<PathBuf>,
) -> Result<()> {
    let buffer = wav::read_stereo(input)?;
    let out_dir = out
        .or_else(|| input.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));
    let base_name = input
        .file_stem()
        .and_then(|s| s.to_str())
        .context("Input path has no file name")?
        .to_string();

    let service = SeparationService::spawn(config).context("Failed to start separation")?;

    let start = Instant::now();
    let mut reporter = ProgressReporter::default();
    let stems = service
        .separate_blocking(variant, buffer, |p| reporter.report(&p))
        .with_context(|| format!("Separation of {:?} failed", input))?;

    log::info!(
        "Separated {:.1}s of audio in {:.1}s",
        stems.duration_secs(),
        start.elapsed().as_secs_f64()
    );

    for path in wav::write_stems(&stems, &out_dir, &base_name)? {
        println!("{}", path.display());
    }
    Ok(())
}

fn check(config: &SeparationConfig, variant: ModelVariant) -> Result<()> {
    let manager = ModelManager::new(config)?;
    let cached = manager.is_cached(variant);
    match manager.check_availability(variant) {
        Ok(()) => {
            println!(
                "{}: available{}",
                variant.display_name(),
                if cached { " (cached)" } else { "" }
            );
            Ok(())
        }
        Err(e) => bail!("{}: {}", variant.display_name(), e),
    }
}

fn cache(config: &SeparationConfig, action: CacheAction) -> Result<()> {
    let manager = ModelManager::new(config)?;
    match action {
        CacheAction::Size => {
            let bytes = manager.cache_size();
            println!(
                "{:.1} MB in {}",
                bytes as f64 / 1_048_576.0,
                config.resolved_cache_dir()?.display()
            );
            for variant in ModelVariant::all() {
                if manager.is_cached(*variant) {
                    println!("  {} cached", variant);
                }
            }
        }
        CacheAction::Clear { model: Some(variant) } => {
            manager.delete_variant(variant)?;
            println!("Cleared {}", variant);
        }
        CacheAction::Clear { model: None } => {
            manager.clear_cache()?;
            println!("Cleared all cached models");
        }
    }
    Ok(())
}

fn config_command(path: Option<&Path>, action: ConfigAction) -> Result<()> {
    let path = path.context("Could not determine config directory; pass --config")?;
    match action {
        ConfigAction::Path => println!("{}", path.display()),
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                bail!("{:?} already exists (use --force to overwrite)", path);
            }
            save_config(&SeparationConfig::default(), path)?;
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}

/// Logs progress once per whole percent or stage change
#[derive(Default)]
struct ProgressReporter {
    last: Option<(SeparationStage, u32)>,
}

impl ProgressReporter {
    fn report(&mut self, progress: &SeparationProgress) {
        let key = (progress.stage, progress.percent as u32);
        if self.last == Some(key) {
            return;
        }
        self.last = Some(key);
        log::info!(
            "[{:>3.0}%] {}: {}",
            progress.percent,
            progress.stage.name(),
            progress.message
        );
    }
}
