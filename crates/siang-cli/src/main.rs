//! Siang CLI - pronunciation scoring from the command line

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod backend;

use backend::CommandModelLoader;
use siang_core::{
    AzureSpeechScorer, MemoryProbe, ProcessMemoryProbe, RemoteConfig, RemoteScorer, ScoreRequest,
    ScoringConfig, ScoringService,
};

/// Score a pronunciation recording against a reference.
///
/// Examples:
///   siang score user.wav --reference-text "sawatdee" --reference-audio ref.wav
///   siang status
#[derive(Parser)]
#[command(
    name = "siang",
    about = "Bounded-resource pronunciation scoring",
    version = env!("CARGO_PKG_VERSION"),
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a recording against a reference
    Score {
        /// The user's recording (WAV)
        audio: PathBuf,

        /// Reference text for the remote assessment
        #[arg(long)]
        reference_text: String,

        /// Reference recording for the local acoustic comparison
        #[arg(long)]
        reference_audio: Option<PathBuf>,

        /// BCP-47 language tag
        #[arg(long, default_value = "th-TH")]
        language: String,

        /// External similarity backend executable (prints a 0-1 ratio)
        #[arg(long, env = "SIANG_LOCAL_BACKEND")]
        local_backend: Option<PathBuf>,

        /// Remote deadline override in seconds
        #[arg(long)]
        remote_deadline: Option<u64>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show memory usage against the configured thresholds
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "siang_core=info,siang=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Score {
            audio,
            reference_text,
            reference_audio,
            language,
            local_backend,
            remote_deadline,
            json,
        } => {
            score(
                audio,
                reference_text,
                reference_audio,
                language,
                local_backend,
                remote_deadline,
                json,
            )
            .await
        }
        Commands::Status => status(),
    }
}

#[allow(clippy::too_many_arguments)]
async fn score(
    audio: PathBuf,
    reference_text: String,
    reference_audio: Option<PathBuf>,
    language: String,
    local_backend: Option<PathBuf>,
    remote_deadline: Option<u64>,
    json: bool,
) -> anyhow::Result<()> {
    let remote_config = RemoteConfig::from_env().with_language(language.clone());
    let remote: Option<Arc<dyn RemoteScorer>> = if remote_config.subscription_key.is_empty() {
        warn!("AZURE_SPEECH_KEY not set; skipping the remote strategy");
        None
    } else {
        Some(Arc::new(AzureSpeechScorer::new(remote_config)?))
    };

    let service = ScoringService::new(
        ScoringConfig::default(),
        Arc::new(CommandModelLoader::new(local_backend)),
        Arc::new(ProcessMemoryProbe::new()),
        remote,
    );
    service.start();

    let mut request = ScoreRequest::new(audio, reference_text).with_language(language);
    if let Some(path) = reference_audio {
        request = request.with_reference_audio(path);
    }
    if let Some(secs) = remote_deadline {
        request = request.with_remote_deadline(Duration::from_secs(secs));
    }

    let result = service.score(&request).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("score: {:.1}/100 ({})", result.value, result.source);
        if result.is_synthetic() {
            println!("note: estimated fallback value; no backend produced a real score");
        }
    }

    service.shutdown().await;
    Ok(())
}

fn status() -> anyhow::Result<()> {
    let config = ScoringConfig::default();
    let probe = ProcessMemoryProbe::new();
    let resident_mb = probe.resident_bytes()? / (1024 * 1024);

    println!("resident memory:  {} MB", resident_mb);
    println!("memory threshold: {} MB", config.memory_threshold_mb);
    println!("usage limit:      {} inferences", config.max_usage_count);
    println!("idle limit:       {}s", config.max_idle_secs);
    println!("local deadline:   {}s", config.local_deadline_secs);
    println!("remote deadline:  {}s", config.remote_deadline_secs);

    Ok(())
}
