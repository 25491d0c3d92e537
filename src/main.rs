use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use markerflow::config::Config;
use markerflow::logging;
use markerflow::normalize::{Nomenclature, SynonymTable};
use markerflow::pipeline::{concatenate, load_alignment_dir, ArtifactLayout, PipelineController, RunSummary};
use markerflow::types::{DataType, InputFormat};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "markerflow")]
#[command(about = "Build a phylogeny-ready supermatrix from GenBank or FASTA marker records")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract, split, align, trim and concatenate markers (optionally infer a tree)
    Run(RunArgs),
    /// Concatenate already aligned per-marker FASTA files into a NEXUS supermatrix
    Concat {
        /// Directory of aligned FASTA files, one per marker
        #[arg(short, long)]
        input: PathBuf,
        /// Output NEXUS file
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Directory of GenBank or FASTA files
    #[arg(short, long)]
    input: Option<PathBuf>,
    /// Output directory
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Organelle panel for gene names
    #[arg(long, value_enum)]
    data_type: Option<DataType>,
    /// Input format; auto decides per file by extension
    #[arg(long, value_enum)]
    format: Option<InputFormat>,
    /// Align each marker
    #[arg(long)]
    align: bool,
    /// Trim each marker alignment
    #[arg(long)]
    trim: bool,
    /// Infer a tree from the supermatrix (requires --trim)
    #[arg(long)]
    tree: bool,
    /// Total thread budget
    #[arg(short, long)]
    threads: Option<usize>,
    /// Threads given to each external tool run
    #[arg(long)]
    threads_per_job: Option<usize>,
    /// Synonym table replacing the built-in one
    #[arg(long)]
    synonyms: Option<PathBuf>,
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Record per-step timings to benchmark.tsv
    #[arg(long)]
    benchmark: bool,
}

impl RunArgs {
    fn into_config(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        config.apply_env_overrides();

        if let Some(input) = self.input {
            config.input_dir = input;
        }
        if let Some(output) = self.output {
            config.output_dir = output;
        }
        if let Some(data_type) = self.data_type {
            config.data_type = data_type;
        }
        if let Some(format) = self.format {
            config.format = format;
        }
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        if let Some(threads_per_job) = self.threads_per_job {
            config.threads_per_job = threads_per_job;
        }
        if self.synonyms.is_some() {
            config.synonyms = self.synonyms;
        }
        config.stages.align |= self.align;
        config.stages.trim |= self.trim;
        config.stages.tree |= self.tree;
        config.benchmark |= self.benchmark;
        Ok(config)
    }
}

fn load_nomenclature(config: &Config) -> Result<Arc<dyn Nomenclature>> {
    let table = match &config.synonyms {
        Some(path) => SynonymTable::load(path)
            .with_context(|| format!("loading synonyms from {}", path.display()))?,
        None => SynonymTable::builtin().context("loading built-in synonym table")?,
    };
    Ok(Arc::new(table))
}

fn print_summary(summary: &RunSummary) {
    println!("\n📊 Pipeline Results:");
    println!("   Files scanned: {}", summary.files_scanned);
    println!("   Files failed: {}", summary.files_failed);
    println!("   Records: {}", summary.records);
    println!("   Markers: {}", summary.markers);
    println!("   Included markers: {}", summary.included_markers.len());
    println!("   Taxa x sites: {} x {}", summary.taxa, summary.sites);
    if let Some(path) = &summary.supermatrix {
        println!("   Supermatrix: {}", path.display());
    }
    if let Some(path) = &summary.tree_file {
        println!("   Tree: {}", path.display());
    }
    println!("   Output directory: {}", summary.output_dir.display());

    let excluded = summary.excluded_markers();
    if !excluded.is_empty() {
        warn!("{} markers excluded from the supermatrix", excluded.len());
        println!("\n⚠️  Excluded markers:");
        for (marker, reason) in excluded {
            println!("   - {}: {}", marker, reason);
        }
    }
    if !summary.diagnostics.failed_files.is_empty() {
        println!("\n⚠️  Files that yielded no records:");
        for (file, reason) in &summary.diagnostics.failed_files {
            println!("   - {}: {}", file, reason);
        }
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let config = args.into_config()?;
    let nomenclature = load_nomenclature(&config)?;
    let controller = PipelineController::new(config, nomenclature)?;

    let log_dir = ArtifactLayout::new(&controller.config().output_dir).logs_dir();
    let _guard = logging::init_logging(Some(log_dir.as_path()));

    println!("🚀 Running marker pipeline...");
    let summary = controller.run().await.context("pipeline run failed")?;
    print_summary(&summary);
    println!("\n✅ Pipeline completed");
    Ok(())
}

fn concat(input: PathBuf, output: PathBuf) -> Result<()> {
    let _guard = logging::init_logging(None);
    let sets = load_alignment_dir(&input)?;
    info!("Loaded {} marker alignments from {}", sets.len(), input.display());

    let concatenation = concatenate(sets);
    for excluded in &concatenation.excluded {
        println!("⚠️  Skipping {}", excluded);
    }
    let matrix = concatenation
        .matrix
        .with_context(|| format!("no usable alignments in {}", input.display()))?;
    matrix
        .write_nexus_file(&output)
        .with_context(|| format!("writing {}", output.display()))?;
    println!(
        "✅ Supermatrix written to {} ({} taxa, {} sites, {} markers)",
        output.display(),
        matrix.n_taxa(),
        matrix.n_chars(),
        matrix.markers.len()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Concat { input, output } => concat(input, output),
    }
}
