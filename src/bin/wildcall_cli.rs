use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use wildcall::analysis::features::FeatureExtractor;
use wildcall::analysis::{RealtimeFeedback, SimilarityScore};
use wildcall::config::EngineConfig;
use wildcall::engine::AnalysisEngine;
use wildcall::master;

#[derive(Parser, Debug)]
#[command(
    name = "wildcall_cli",
    about = "Offline scoring harness for the wildcall analysis engine"
)]
struct Cli {
    /// Optional JSON config file (defaults are used when absent)
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Score a recording against a master call, streaming it in chunks
    Score {
        /// Master call file (.mfc feature file or .wav recording)
        #[arg(long)]
        master: PathBuf,
        /// WAV recording to score
        #[arg(long)]
        input: PathBuf,
        /// Chunk size in samples, to mirror live streaming
        #[arg(long, default_value_t = 1024)]
        chunk_size: usize,
        /// Number of history entries to include in the report
        #[arg(long, default_value_t = 5)]
        history: usize,
        /// Write the JSON report here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Extract features from a WAV recording into a .mfc master call file
    Features {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    /// Print the header of a .mfc master call file
    Inspect {
        #[arg(long)]
        master: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = cli
        .config
        .as_ref()
        .map(EngineConfig::load_from_file)
        .unwrap_or_default();

    match cli.command {
        Commands::Score {
            master,
            input,
            chunk_size,
            history,
            output,
        } => run_score(config, &master, &input, chunk_size, history, output),
        Commands::Features { input, output } => run_features(config, &input, &output),
        Commands::Inspect { master } => run_inspect(&master),
    }
}

fn run_score(
    mut config: EngineConfig,
    master: &PathBuf,
    input: &PathBuf,
    chunk_size: usize,
    history: usize,
    output: Option<PathBuf>,
) -> Result<ExitCode> {
    anyhow::ensure!(chunk_size > 0, "chunk size must be greater than 0");

    let (samples, sample_rate) = master::read_wav_mono(input)
        .with_context(|| format!("reading {}", input.display()))?;

    if let Some(dir) = master.parent() {
        config.audio.master_calls_dir = dir.to_path_buf();
    }
    let engine = AnalysisEngine::with_config(config).context("building engine")?;
    let session = engine.create_session(sample_rate).context("creating session")?;

    let master_name = master
        .file_name()
        .and_then(|n| n.to_str())
        .context("master path has no file name")?;
    engine
        .load_master_call(session, master_name)
        .with_context(|| format!("loading master call {}", master.display()))?;

    for chunk in samples.chunks(chunk_size) {
        engine
            .process_audio_chunk(session, chunk, 1)
            .context("processing chunk")?;
    }

    let similarity = engine.get_similarity_score(session).context("no score")?;
    let feedback = engine.get_realtime_feedback(session).context("no feedback")?;
    let scores = engine.get_scoring_history(session, history)?;

    let report = ScoreReportPayload {
        input: input.display().to_string(),
        master: master_name,
        sample_rate,
        samples_analyzed: engine.session_samples_processed(session)?,
        peak_amplitude: engine.session_peak_amplitude(session)?,
        similarity,
        feedback,
        recent_scores: scores,
    };
    emit_report(&report, output)?;

    engine.destroy_session(session)?;
    Ok(ExitCode::from(0))
}

fn run_features(config: EngineConfig, input: &PathBuf, output: &PathBuf) -> Result<ExitCode> {
    let (samples, sample_rate) = master::read_wav_mono(input)
        .with_context(|| format!("reading {}", input.display()))?;

    let mut extractor = FeatureExtractor::new(sample_rate, &config.features);
    let frames = extractor
        .process(&samples, 1)
        .with_context(|| format!("extracting features from {}", input.display()))?;
    anyhow::ensure!(
        !frames.is_empty(),
        "{} is shorter than one analysis window",
        input.display()
    );

    master::write_feature_file(output, &frames)
        .with_context(|| format!("writing {}", output.display()))?;

    println!(
        "{} -> {} ({} frames x {} coefficients at {} Hz)",
        input.display(),
        output.display(),
        frames.len(),
        frames[0].width(),
        sample_rate
    );
    Ok(ExitCode::from(0))
}

fn run_inspect(path: &PathBuf) -> Result<ExitCode> {
    let frames = master::load_feature_file(path)
        .with_context(|| format!("loading {}", path.display()))?;
    println!(
        "{}: {} frames x {} coefficients",
        path.display(),
        frames.len(),
        frames[0].width()
    );
    Ok(ExitCode::from(0))
}

fn emit_report(report: &ScoreReportPayload<'_>, output: Option<PathBuf>) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    if let Some(path) = output {
        std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    } else {
        println!("{json}");
    }
    Ok(())
}

#[derive(Serialize)]
struct ScoreReportPayload<'a> {
    input: String,
    master: &'a str,
    sample_rate: u32,
    samples_analyzed: u64,
    peak_amplitude: f32,
    similarity: f32,
    feedback: RealtimeFeedback,
    recent_scores: Vec<SimilarityScore>,
}
