use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use cardsort::{CardSorter, Config, Services};

#[derive(Parser)]
#[command(name = "cardsort")]
#[command(about = "Split photographed grids of trading cards into labeled per-card bundles")]
struct Cli {
    /// Directory containing fronts.* and backs.* scans
    #[arg(long, value_name = "DIR")]
    input_dir: Option<PathBuf>,

    /// Directory receiving one folder per card
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Reference corpus root with metadata.json
    #[arg(long, value_name = "DIR")]
    reference_dir: Option<PathBuf>,

    /// Directory with the ocrs detection and recognition models
    #[arg(long, value_name = "DIR")]
    models: Option<PathBuf>,

    /// Enable detector-based collector-number strategies
    #[arg(long)]
    detector: bool,

    /// Enable debug logging and keep warped crops
    #[arg(short, long)]
    verbose: bool,

    /// Keep the perspective-corrected crop in each bundle
    #[arg(long)]
    save_warped: bool,

    /// Card catalog endpoint
    #[arg(long, value_name = "URL")]
    api_url: Option<String>,

    /// Skip remote catalog lookups
    #[arg(long)]
    offline: bool,

    /// Save segmentation step images to directory (must be empty)
    #[arg(long, value_name = "DIR")]
    debug_out: Option<PathBuf>,

    /// Leave the source scans in place
    #[arg(long)]
    no_archive: bool,
}

impl Cli {
    fn apply(self, mut config: Config) -> (Config, Option<PathBuf>) {
        if let Some(dir) = self.input_dir {
            config.input_dir = dir;
        }
        if let Some(dir) = self.output_dir {
            config.output_dir = dir;
        }
        if let Some(dir) = self.reference_dir {
            config.reference_dir = dir;
        }
        if let Some(dir) = self.models {
            config.ocr_model_dir = Some(dir);
        }
        if let Some(url) = self.api_url {
            config.api_url = url;
        }
        config.use_detector |= self.detector;
        config.debug |= self.verbose;
        config.save_warped |= self.save_warped;
        config.offline |= self.offline;
        config.archive_scans &= !self.no_archive;
        (config, self.debug_out)
    }
}

fn init_tracing(debug: bool) {
    let default = if debug { "cardsort=debug" } else { "cardsort=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    let (config, debug_out) = args.apply(Config::from_env());
    init_tracing(config.debug);

    let services = Services::from_config(&config);
    let mut sorter = CardSorter::new(config, services);
    if let Some(dir) = debug_out {
        sorter = sorter.with_debug_out(dir);
    }

    let summary = sorter.run()?;

    println!("\n=== Card Sorting Results ===");
    println!("Card folders created: {}", summary.fronts.len());
    for front in &summary.fronts {
        let m = &front.bundle.manifest;
        println!(
            "  {} - confidence: {:.2}{}",
            front.bundle.folder,
            m.confidence,
            if m.auto_accept { "" } else { " (uncertain)" }
        );
    }
    println!(
        "Backs detected: {}, attached: {}",
        summary.backs_detected, summary.backs_attached
    );
    if let Some(dir) = &summary.archive_dir {
        println!("Scans archived to {}", dir.display());
    }

    Ok(())
}
