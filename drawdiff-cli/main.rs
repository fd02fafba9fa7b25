use std::path::{Path, PathBuf};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use drawdiff_cli::{DirectoryRenderer, compare_pages, write_page_artifacts};
use drawdiff_core::{CompareOptions, DetectorMethod, OptionsError, init_thread_pool};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Compare two engineering drawing revisions page by page"
)]
struct Cli {
    /// Reference document: a page raster or a directory of page rasters.
    reference: PathBuf,
    /// Target document to compare against the reference.
    target: PathBuf,
    /// Zero-based page index.
    #[arg(long, default_value_t = 0)]
    page: usize,
    /// Render resolution in dots per inch (72-600).
    #[arg(long)]
    dpi: Option<u32>,
    /// Minimum intensity difference for the missing/added masks (1-100).
    #[arg(long)]
    intensity_threshold: Option<u8>,
    /// Structural similarity cutoff for the modified mask, in (0, 1).
    #[arg(long)]
    structural_threshold: Option<f64>,
    /// Use the fast binary descriptors instead of the scale-invariant ones.
    #[arg(long)]
    binary_features: bool,
    /// Fix the estimator seed for reproducible runs.
    #[arg(long)]
    seed: Option<u64>,
    /// Load options from a JSON or TOML file before applying flags.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Output directory for comparison artifacts.
    #[arg(long, default_value = "drawdiff-out")]
    out: PathBuf,
    /// Also write deep-zoom tile trees for the base image and overlay.
    #[arg(long)]
    tiles: bool,
}

fn load_options(path: &Path) -> Result<CompareOptions, OptionsError> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => CompareOptions::load_toml(path),
        _ => CompareOptions::load_json(path),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_target(false)
        .init();

    let mut options = match &cli.config {
        Some(path) => load_options(path)?,
        None => CompareOptions::default(),
    };
    if let Some(dpi) = cli.dpi {
        options.dpi = dpi;
    }
    if let Some(threshold) = cli.intensity_threshold {
        options.intensity_threshold = threshold;
    }
    if let Some(threshold) = cli.structural_threshold {
        options.structural_threshold = threshold;
    }
    if cli.binary_features {
        options.detector = DetectorMethod::Binary;
    }
    if let Some(seed) = cli.seed {
        options.ransac_seed = Some(seed);
    }
    options.validate()?;

    init_thread_pool(options.n_threads)?;

    let comparison = compare_pages(
        &DirectoryRenderer,
        &cli.reference,
        &cli.target,
        cli.page,
        &options,
    )?;
    let artifacts = write_page_artifacts(&comparison, &cli.out, &options, cli.tiles)?;

    println!("{}", serde_json::to_string_pretty(&comparison.stats)?);
    eprintln!("artifacts written to {}", artifacts.page_dir.display());
    Ok(())
}
