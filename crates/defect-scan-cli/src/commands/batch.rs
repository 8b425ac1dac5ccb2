use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Args;
use defect_scan::{InspectionConfig, InspectionSession, validate};

#[derive(Args)]
pub struct BatchArgs {
    /// Directory of images to inspect
    pub dir: PathBuf,

    /// Trained model artifact; rule-based classification when absent
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// Report output directory (per-image JSON plus a CSV summary)
    #[arg(short, long, default_value = "reports")]
    pub output: PathBuf,

    /// Name of the CSV summary file
    #[arg(long, default_value = "batch")]
    pub name: String,
}

pub fn run(args: BatchArgs) -> anyhow::Result<()> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(&args.dir)
        .with_context(|| format!("reading {}", args.dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && validate::valid_image_extension(path))
        .collect();
    paths.sort();

    if paths.is_empty() {
        bail!("no supported images under {}", args.dir.display());
    }

    let mut config = InspectionConfig::builder().report_dir(&args.output);
    if let Some(model) = args.model {
        config = config.model_path(model);
    }
    let session = InspectionSession::new(config.build());

    let results = session.inspect_batch(&paths);

    let mut reports = Vec::new();
    let mut failures = 0usize;
    for (path, result) in paths.iter().zip(results) {
        match result {
            Ok(report) => {
                println!(
                    "{:<40} {:<8} {:>5.1}%",
                    path.display(),
                    report.classification.tier,
                    report.classification.confidence * 100.0
                );
                reports.push(report);
            }
            Err(err) => {
                failures += 1;
                eprintln!("{}: {err}", path.display());
            }
        }
    }

    for report in &reports {
        session.write_report(report)?;
    }
    let summary = session.write_csv_summary(&reports, &args.name)?;

    println!();
    println!(
        "{} inspected, {} failed; summary written to {}",
        reports.len(),
        failures,
        summary.display()
    );
    Ok(())
}
