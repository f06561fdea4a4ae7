//! aeromosaic CLI — placement correction for photo-mosaic manifests.
//!
//! A manifest is an ordered JSON array of placed photographs (path + center +
//! footprint size + orientation). `align` corrects the placements and writes
//! them back as JSON; the pixel compositing of the final mosaic is a separate
//! concern and not done here.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use aeromosaic::{
    AlignConfig, Aligner, CandidateDistribution, Comparator, MapElement, PassReport, Point2D,
    RotatedRect, Strategy,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "aeromosaic")]
#[command(about = "Correct placement drift in an ordered aerial photo sequence")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a correction pass over a manifest and write corrected placements.
    Align(CliAlignArgs),

    /// Validate a manifest and print a summary without loading pixels.
    Inspect {
        /// Path to the manifest (JSON).
        #[arg(long)]
        manifest: PathBuf,
    },
}

#[derive(Debug, Clone, Args)]
struct CliAlignArgs {
    /// Path to the manifest (JSON), ordered by capture sequence.
    #[arg(long)]
    manifest: PathBuf,

    /// Path to write corrected placements (JSON).
    #[arg(long)]
    out: PathBuf,

    /// Optional path to write the per-pair pass report (JSON).
    #[arg(long)]
    report: Option<PathBuf>,

    /// Correction strategy.
    #[arg(long, value_enum, default_value_t = CliStrategy::Transformer)]
    strategy: CliStrategy,

    /// Working-resolution scale for overlap extraction.
    #[arg(long, default_value = "1.0")]
    scale: f64,

    /// Iteration cap for the affine registrar.
    #[arg(long, default_value = "50")]
    max_iterations: u32,

    /// Correlation-improvement convergence threshold.
    #[arg(long, default_value = "1e-4")]
    epsilon: f64,

    /// Full width of the randomized candidate search region (pixels).
    #[arg(long, default_value = "20.0")]
    spreading_range: f64,

    /// Number of perturbed candidates per pair.
    #[arg(long, default_value = "32")]
    quantity: u32,

    /// Candidate-center distribution.
    #[arg(long, value_enum, default_value_t = CliDistribution::Uniform)]
    distribution: CliDistribution,

    /// Similarity comparator for the randomized refiner.
    #[arg(long, value_enum, default_value_t = CliComparator::ManhattanNorm)]
    comparator: CliComparator,

    /// Seed for reproducible randomized refinement.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliStrategy {
    Transformer,
    Randomizer,
    TransformerThenRandomizer,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliDistribution {
    Uniform,
    Normal,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliComparator {
    ManhattanNorm,
    ZeroNorm,
    Histogram,
    Ssim,
}

impl CliAlignArgs {
    fn to_config(&self) -> AlignConfig {
        AlignConfig {
            strategy: match self.strategy {
                CliStrategy::Transformer => Strategy::Transformer,
                CliStrategy::Randomizer => Strategy::Randomizer,
                CliStrategy::TransformerThenRandomizer => Strategy::TransformerThenRandomizer,
            },
            scale: self.scale,
            max_iterations: self.max_iterations,
            epsilon: self.epsilon,
            spreading_range: self.spreading_range,
            quantity: self.quantity,
            distribution: match self.distribution {
                CliDistribution::Uniform => CandidateDistribution::Uniform,
                CliDistribution::Normal => CandidateDistribution::Normal,
            },
            comparator: match self.comparator {
                CliComparator::ManhattanNorm => Comparator::ManhattanNorm,
                CliComparator::ZeroNorm => Comparator::ZeroNorm,
                CliComparator::Histogram => Comparator::Histogram,
                CliComparator::Ssim => Comparator::Ssim,
            },
            seed: self.seed,
        }
    }
}

// ── Manifest format ────────────────────────────────────────────────────────

/// One placed photograph of the sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestEntry {
    /// Image path, relative to the manifest file.
    image: PathBuf,
    /// Placement center in mosaic coordinates.
    center: [f64; 2],
    /// Footprint size (width, height) in mosaic pixels.
    size: [f64; 2],
    /// Orientation in degrees.
    #[serde(default)]
    angle_deg: f64,
}

/// Corrected placement written back per element.
#[derive(Debug, Clone, Serialize)]
struct CorrectedPlacement {
    center: [f64; 2],
    angle_deg: f64,
}

fn read_manifest(path: &Path) -> CliResult<Vec<ManifestEntry>> {
    let file = File::open(path)
        .map_err(|e| format!("cannot open manifest {}: {}", path.display(), e))?;
    let entries: Vec<ManifestEntry> = serde_json::from_reader(file)?;
    Ok(entries)
}

fn load_elements(manifest_path: &Path, entries: &[ManifestEntry]) -> CliResult<Vec<MapElement>> {
    let base = manifest_path.parent().unwrap_or_else(|| Path::new("."));
    let mut elements = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let image_path = base.join(&entry.image);
        let image = image::open(&image_path)
            .map_err(|e| format!("cannot load {}: {}", image_path.display(), e))?
            .to_rgba8();
        let rect = RotatedRect::new(
            Point2D::new(entry.center[0], entry.center[1]),
            (entry.size[0], entry.size[1]),
            entry.angle_deg,
        );
        let element = MapElement::new(image, rect, i)
            .map_err(|e| format!("manifest entry {}: {}", i, e))?;
        elements.push(element);
    }
    Ok(elements)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> CliResult<()> {
    let file = File::create(path)
        .map_err(|e| format!("cannot create {}: {}", path.display(), e))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)?;
    Ok(())
}

// ── Commands ───────────────────────────────────────────────────────────────

fn run_align(args: &CliAlignArgs) -> CliResult<()> {
    let entries = read_manifest(&args.manifest)?;
    let elements = load_elements(&args.manifest, &entries)?;
    let mut aligner = Aligner::new(elements, args.to_config())?;

    let report: PassReport = aligner.run();
    let corrected: Vec<CorrectedPlacement> = aligner
        .elements()
        .iter()
        .map(|el| CorrectedPlacement {
            center: [el.placement().center().x, el.placement().center().y],
            angle_deg: el.placement().angle_deg(),
        })
        .collect();

    write_json(&args.out, &corrected)?;
    if let Some(report_path) = &args.report {
        write_json(report_path, &report)?;
    }

    let skipped = report
        .records
        .iter()
        .filter(|r| matches!(r.outcome, aeromosaic::PairOutcome::Skipped { .. }))
        .count();
    tracing::info!(
        elements = corrected.len(),
        pairs = report.records.len(),
        skipped,
        cancelled = report.cancelled,
        "alignment finished"
    );
    Ok(())
}

fn run_inspect(manifest: &Path) -> CliResult<()> {
    let entries = read_manifest(manifest)?;
    println!("{} elements", entries.len());
    for (i, entry) in entries.iter().enumerate() {
        println!(
            "  [{}] {} center=({:.1}, {:.1}) size={}x{} angle={:.2}",
            i,
            entry.image.display(),
            entry.center[0],
            entry.center[1],
            entry.size[0],
            entry.size[1],
            entry.angle_deg,
        );
    }
    Ok(())
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match &cli.command {
        Commands::Align(args) => run_align(args),
        Commands::Inspect { manifest } => run_inspect(manifest),
    }
}
