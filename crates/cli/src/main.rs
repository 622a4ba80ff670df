use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::thread;

use clap::{Args, Parser, Subcommand, ValueEnum};

use reid_core::detection::infrastructure::onnx_embedding_extractor::OnnxEmbeddingExtractor;
use reid_core::detection::infrastructure::onnx_person_tracker::OnnxPersonTracker;
use reid_core::gallery::domain::diversity_selector::DiversitySelector;
use reid_core::gallery::domain::gallery_store::GalleryStore;
use reid_core::gallery::domain::identity::HumanIdentity;
use reid_core::gallery::infrastructure::exhaustive_diversity_selector::ExhaustiveDiversitySelector;
use reid_core::gallery::infrastructure::file_crop_storage::FileCropStorage;
use reid_core::gallery::infrastructure::greedy_diversity_selector::GreedyDiversitySelector;
use reid_core::gallery::infrastructure::in_memory_gallery_store::InMemoryGalleryStore;
use reid_core::pipeline::best_crop_use_case::BestCropSelector;
use reid_core::pipeline::scan_logger::StdoutScanLogger;
use reid_core::pipeline::scan_video_use_case::{ScanConfig, ScanReport, ScanVideoUseCase};
use reid_core::resolution::identity_resolver::IdentityResolver;
use reid_core::shared::config::ReidConfig;
use reid_core::shared::constants::{APP_DIR_NAME, GALLERY_SNAPSHOT_FILE};
use reid_core::shared::model_resolver;
use reid_core::video::infrastructure::ffmpeg_reader::FfmpegReader;

const PROGRESS_THROTTLE_FRAMES: usize = 100;

/// Resolve people in surveillance video to persistent identities.
#[derive(Parser)]
#[command(name = "reid")]
struct Cli {
    /// Gallery directory holding the snapshot and crops.
    #[arg(long, global = true)]
    gallery: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan videos and print the identities seen in each.
    Scan(ScanArgs),
    /// Print the path of the largest stored crop of an identity.
    BestCrop {
        identity: String,
    },
    /// List known identities with their gallery sizes.
    List,
}

#[derive(Args)]
struct ScanArgs {
    /// Video files; each is scanned on its own thread.
    #[arg(required = true)]
    videos: Vec<PathBuf>,

    /// JSON config file; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Person detector ONNX model (path or http(s) URL).
    #[arg(long)]
    detector_model: String,

    /// Re-identification ONNX model (path or http(s) URL).
    #[arg(long)]
    embedding_model: String,

    /// Cosine distance below which a person matches a known identity (0.0-2.0).
    #[arg(long)]
    threshold: Option<f64>,

    /// Maximum gallery entries kept per identity.
    #[arg(long)]
    cap: Option<usize>,

    /// Refresh galleries every Nth frame.
    #[arg(long)]
    refresh_interval: Option<usize>,

    /// Person detection confidence threshold (0.0-1.0).
    #[arg(long)]
    confidence: Option<f64>,

    /// Gallery eviction strategy.
    #[arg(long, value_enum, default_value = "exhaustive")]
    selector: SelectorKind,
}

#[derive(Clone, Copy, ValueEnum)]
enum SelectorKind {
    /// Optimal; only practical for small caps.
    Exhaustive,
    /// Approximate; scales to large caps.
    Greedy,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let gallery_dir = match cli.gallery {
        Some(dir) => dir,
        None => default_gallery_dir()?,
    };

    match cli.command {
        Command::Scan(args) => run_scan(&gallery_dir, args),
        Command::BestCrop { identity } => run_best_crop(&gallery_dir, &identity),
        Command::List => run_list(&gallery_dir),
    }
}

fn run_scan(gallery_dir: &Path, args: ScanArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&args)?;
    for video in &args.videos {
        if !video.exists() {
            return Err(format!("Input file not found: {}", video.display()).into());
        }
    }

    log::info!("Resolving models");
    let detector_model = model_resolver::resolve(
        &args.detector_model,
        Some(Box::new(|d, t| download_progress("person detector", d, t))),
    )?;
    let embedding_model = model_resolver::resolve(
        &args.embedding_model,
        Some(Box::new(|d, t| download_progress("re-id", d, t))),
    )?;

    let (crops, store) = open_gallery(gallery_dir)?;
    let selector: Box<dyn DiversitySelector> = match args.selector {
        SelectorKind::Exhaustive => Box::new(ExhaustiveDiversitySelector::new()),
        SelectorKind::Greedy => Box::new(GreedyDiversitySelector),
    };
    let resolver = Arc::new(IdentityResolver::new(
        store.clone(),
        selector,
        config.match_threshold,
        config.gallery_cap,
    )?);
    log::info!(
        "Gallery {} ({} entries), selector {}",
        crops.root().display(),
        store.len(),
        resolver.selector_name()
    );

    let (tx, rx) = crossbeam_channel::unbounded();
    let handles: Vec<_> = args
        .videos
        .iter()
        .cloned()
        .map(|video| {
            let tx = tx.clone();
            let resolver = resolver.clone();
            let config = config.clone();
            let detector_model = detector_model.clone();
            let embedding_model = embedding_model.clone();
            thread::spawn(move || {
                let result =
                    scan_video(&video, &detector_model, &embedding_model, resolver, &config)
                        .map_err(|e| e.to_string());
                let _ = tx.send((video, result));
            })
        })
        .collect();
    drop(tx);

    let mut failures = 0;
    for (video, result) in rx {
        match result {
            Ok(report) => print_report(&video, &report),
            Err(e) => {
                eprintln!("Error: scan of {} failed: {e}", video.display());
                failures += 1;
            }
        }
    }
    for handle in handles {
        if handle.join().is_err() {
            failures += 1;
        }
    }

    let snapshot = gallery_dir.join(GALLERY_SNAPSHOT_FILE);
    store.save(&snapshot)?;
    log::info!("Gallery saved to {}", snapshot.display());

    if failures > 0 {
        return Err(format!("{failures} of {} scans failed", args.videos.len()).into());
    }
    Ok(())
}

fn scan_video(
    video: &Path,
    detector_model: &Path,
    embedding_model: &Path,
    resolver: Arc<IdentityResolver>,
    config: &ReidConfig,
) -> Result<ScanReport, Box<dyn std::error::Error>> {
    let tracker = OnnxPersonTracker::new(detector_model, config.tracker_max_lost)?;
    let extractor = OnnxEmbeddingExtractor::new(embedding_model)?;
    let label = video
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| video.display().to_string());

    let mut use_case = ScanVideoUseCase::new(
        Box::new(FfmpegReader::new()),
        Box::new(tracker),
        Box::new(extractor),
        resolver,
        ScanConfig::from(config),
        Box::new(StdoutScanLogger::new(label, PROGRESS_THROTTLE_FRAMES)),
        None,
    );
    Ok(use_case.execute(video)?)
}

fn print_report(video: &Path, report: &ScanReport) {
    println!("{}:", video.display());
    for (identity, tracks) in &report.tracks_per_identity {
        println!("  {identity}\t{tracks} track(s)");
    }
    if report.degraded {
        eprintln!(
            "Warning: gallery store failed {} times while scanning {}; \
             some people may have been given new identities",
            report.store_failures,
            video.display()
        );
    }
}

fn run_best_crop(gallery_dir: &Path, identity: &str) -> Result<(), Box<dyn std::error::Error>> {
    let (crops, store) = open_gallery(gallery_dir)?;
    let selector = BestCropSelector::new(store, crops.clone());
    let entry = selector
        .select(&HumanIdentity::from(identity))?
        .ok_or_else(|| format!("No readable crop for identity {identity}"))?;
    println!("{}", crops.resolve(&entry.crop_ref).display());
    Ok(())
}

fn run_list(gallery_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let (_crops, store) = open_gallery(gallery_dir)?;
    for (identity, entries) in store.identities()? {
        println!("{identity}\t{entries}");
    }
    Ok(())
}

fn load_config(args: &ScanArgs) -> Result<ReidConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => ReidConfig::load(path)?,
        None => ReidConfig::default(),
    };
    if let Some(threshold) = args.threshold {
        config.match_threshold = threshold;
    }
    if let Some(cap) = args.cap {
        config.gallery_cap = cap;
    }
    if let Some(interval) = args.refresh_interval {
        config.refresh_interval = interval;
    }
    if let Some(confidence) = args.confidence {
        config.detection_confidence = confidence;
    }
    config.validate()?;
    Ok(config)
}

fn open_gallery(
    dir: &Path,
) -> Result<(Arc<FileCropStorage>, Arc<InMemoryGalleryStore>), Box<dyn std::error::Error>> {
    let crops = Arc::new(FileCropStorage::new(dir));
    let store = InMemoryGalleryStore::open(&dir.join(GALLERY_SNAPSHOT_FILE), crops.clone())?;
    Ok((crops, Arc::new(store)))
}

fn default_gallery_dir() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let data_dir = dirs::data_dir().ok_or("Could not determine data directory")?;
    Ok(data_dir.join(APP_DIR_NAME).join("gallery"))
}

fn download_progress(what: &str, downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading {what} model... {pct}%");
    } else {
        eprint!("\rDownloading {what} model... {downloaded} bytes");
    }
    if total > 0 && downloaded >= total {
        eprintln!();
    }
}
