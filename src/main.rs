use anyhow::{anyhow, Result};
use autoclip_pipeline::llm::{all_models, create_provider, models_for, CallOrchestrator, ProviderKind, SettingsFileSource};
use autoclip_pipeline::{Config, Pipeline};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "autoclip")]
#[command(version, about = "Outline and timeline extraction for long subtitle tracks")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to autoclip.toml, config/autoclip.toml, then environment)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for intermediate and final artifacts
    #[arg(long, global = true)]
    metadata_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run outline and timeline extraction end to end
    Run {
        /// Subtitle file in SRT format
        #[arg(long)]
        srt: PathBuf,
    },
    /// Extract the topic outline only
    Outline {
        /// Subtitle file in SRT format
        #[arg(long)]
        srt: PathBuf,
    },
    /// Anchor a previously extracted outline to time ranges
    Timeline,
    /// List known models
    Models {
        /// Only list models of this provider
        #[arg(long)]
        provider: Option<String>,
    },
    /// Check that the configured provider answers
    TestConnection,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(dir) = &cli.metadata_dir {
        config.output.metadata_dir = dir.clone();
    }

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.output.log_level))
        .unwrap_or_else(|_| EnvFilter::new("autoclip_pipeline=info,warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Models { provider } => {
            let catalogue = match provider {
                Some(name) => {
                    let kind: ProviderKind = name.parse()?;
                    vec![(kind, models_for(kind))]
                }
                None => all_models(),
            };

            for (kind, models) in catalogue {
                println!("{}:", kind);
                for model in models {
                    let free = if model.is_free { " (free)" } else { "" };
                    println!("  {:<48} {}{}", model.name, model.display_name, free);
                }
            }
        }

        Commands::TestConnection => {
            config.validate()?;
            let provider = create_provider(&config.llm.provider_config()?)?;
            info!("🔌 Testing connection to {}", provider.kind());

            if provider.test_connection().await {
                info!("✅ {} is reachable", provider.kind());
            } else {
                error!("❌ {} did not answer", provider.kind());
                return Err(anyhow!("Connection test failed"));
            }
        }

        Commands::Run { srt } => {
            let pipeline = build_pipeline(&cli.config, config)?;
            let summary = pipeline.run(&srt).await?;

            let elapsed = summary.finished_at - summary.started_at;
            info!("⏱️ Finished in {}s", elapsed.num_seconds());
            if !summary.outline_failed_chunks.is_empty() || !summary.timeline_failed_chunks.is_empty() {
                info!(
                    "⚠️ Skipped chunks: outline {:?}, timeline {:?}",
                    summary.outline_failed_chunks, summary.timeline_failed_chunks
                );
            }
        }

        Commands::Outline { srt } => {
            let pipeline = build_pipeline(&cli.config, config)?;
            let result = pipeline.run_outline(&srt).await?;
            info!(
                "📝 {} topics from {} chunks ({} failed)",
                result.outlines.len(),
                result.chunks.len(),
                result.failed_chunks.len()
            );
        }

        Commands::Timeline => {
            let pipeline = build_pipeline(&cli.config, config)?;
            let result = pipeline.run_timeline().await?;
            info!(
                "🕒 {} timeline entries ({} chunks failed)",
                result.timeline.len(),
                result.failed_chunks.len()
            );
        }
    }

    Ok(())
}

fn build_pipeline(config_path: &Option<PathBuf>, config: Config) -> Result<Pipeline> {
    config.validate()?;
    info!("{}", config.summary());

    // Provider settings are re-read before every call
    let source = Arc::new(SettingsFileSource::new(config_path.clone()));
    Ok(Pipeline::new(config, CallOrchestrator::new(source)))
}
