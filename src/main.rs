use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use fm_count::io::{self, ReferenceFormat};
use fm_count::{BuildConfig, BuildContext, FmIndex, IndexMeta};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(
    name = "fm-count",
    author,
    version,
    about = "Count substring occurrences with an FM index",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build an FM index of the reference and write PREFIX.fmc
    Index {
        /// Reference file
        reference: String,
        #[command(flatten)]
        source: SourceArgs,
        /// Output prefix for the index file
        #[arg(short, long, default_value = "ref")]
        output: String,
        #[command(flatten)]
        build: BuildArgs,
    },
    /// Count occurrences of each query
    Count {
        /// Path to an index written by `index` (.fmc)
        #[arg(short = 'i', long = "index", conflicts_with = "reference", required_unless_present = "reference")]
        index: Option<String>,
        /// Build the index in memory from this reference instead
        #[arg(long)]
        reference: Option<String>,
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        build: BuildArgs,
        /// Query strings
        #[arg(required = true)]
        queries: Vec<String>,
    },
}

#[derive(Args, Debug)]
struct SourceArgs {
    /// Reference file format
    #[arg(long, value_enum, default_value_t = ReferenceFormat::Fasta)]
    format: ReferenceFormat,
    /// FASTA record to index (first record if omitted)
    #[arg(long)]
    sequence: Option<String>,
}

#[derive(Args, Debug)]
struct BuildArgs {
    /// Rotations collected per start sequence before it is extended
    #[arg(long = "rotation-buffer")]
    rotation_buffer: Option<usize>,
    /// Minimum single-symbol run length recorded for comparison skipping
    #[arg(long = "long-run-threshold")]
    long_run_threshold: Option<usize>,
    /// Initial start-sequence length (derived from the alphabet size if omitted)
    #[arg(long = "start-sequence-len")]
    start_sequence_len: Option<usize>,
}

impl BuildArgs {
    fn to_config(&self) -> BuildConfig {
        let mut config = BuildConfig::new();
        if let Some(n) = self.rotation_buffer {
            config.rotation_buffer_capacity(n);
        }
        if let Some(n) = self.long_run_threshold {
            config.long_run_threshold(n);
        }
        if let Some(n) = self.start_sequence_len {
            config.initial_start_sequence_len(n);
        }
        config
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Index { reference, source, output, build } => run_index(&reference, &source, &output, &build),
        Commands::Count { index, reference, source, build, queries } => {
            let fm = match (index, reference) {
                (Some(path), _) => {
                    let started = Instant::now();
                    let fm = FmIndex::load_from_file(&path)?;
                    info!(path = %path, elapsed_ms = started.elapsed().as_millis() as u64, "index loaded");
                    fm
                }
                (None, Some(reference)) => build_from_reference(&reference, &source, &build)?,
                (None, None) => anyhow::bail!("either --index or --reference is required"),
            };
            run_count(&fm, &queries)
        }
    }
}

fn build_from_reference(reference: &str, source: &SourceArgs, build: &BuildArgs) -> Result<FmIndex> {
    let started = Instant::now();
    let refseq = io::read_reference(reference, source.format, source.sequence.as_deref())?;
    info!(elapsed_ms = started.elapsed().as_millis() as u64, "reference read");

    let config = build.to_config();
    let mut last_percent = 0;
    let mut ctx = BuildContext::new().with_progress(|p| {
        let percent = p.done * 100 / p.total.max(1);
        if percent >= last_percent + 10 {
            last_percent = percent;
            info!(done = p.done, total = p.total, "{}% of start sequences processed", percent);
        }
    });

    let started = Instant::now();
    let mut fm = FmIndex::build(&refseq.codes, refseq.alphabet, &config, &mut ctx)
        .with_context(|| format!("cannot build index of '{}'", reference))?;
    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        peak_build_bytes = ctx.memory().peak(),
        index_bytes = fm.size_in_bytes(),
        "index built"
    );

    fm.set_meta(IndexMeta {
        reference_file: Some(reference.to_string()),
        build_args: Some(std::env::args().collect::<Vec<_>>().join(" ")),
        build_timestamp: Some(chrono::Utc::now().to_rfc3339()),
    });
    Ok(fm)
}

fn run_index(reference: &str, source: &SourceArgs, output: &str, build: &BuildArgs) -> Result<()> {
    let fm = build_from_reference(reference, source, build)?;

    println!("reference: {}", reference);
    println!("length: {}", fm.reference_len());
    println!("alphabet_size: {}", fm.alphabet_size());

    let out_path = format!("{}.fmc", output);
    fm.save_to_file(&out_path)?;
    println!("FM index saved: {}", out_path);
    Ok(())
}

fn run_count(fm: &FmIndex, queries: &[String]) -> Result<()> {
    for query in queries {
        let started = Instant::now();
        let normalized = io::normalize_query(query.as_bytes());
        let count = fm.count(&normalized).with_context(|| format!("query '{}'", query))?;
        info!(query = %query, elapsed_us = started.elapsed().as_micros() as u64, "query answered");
        println!("{}\t{}", query, count);
    }
    Ok(())
}
