use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Args;
use defect_scan::alert::{AlertPolicy, AlertSink, DEFAULT_ALERT_THRESHOLD, JsonlAlertLog, LogSink};
use defect_scan::inspect::product_id_from_path;
use defect_scan::storage::{DefectRecord, DefectStore, JsonlStore};
use defect_scan::{InspectionConfig, InspectionSession, validate};

#[derive(Args)]
pub struct InspectArgs {
    /// Image file to inspect
    pub image: PathBuf,

    /// Product identifier (defaults to the file stem)
    #[arg(short, long)]
    pub product_id: Option<String>,

    /// Trained model artifact; rule-based classification when absent
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// Use the extended feature layout (adds color consistency)
    #[arg(long)]
    pub extended: bool,

    /// Append the result to this JSONL defect store
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Confidence above which a MAJOR finding raises an alert
    #[arg(long, default_value_t = DEFAULT_ALERT_THRESHOLD)]
    pub alert_threshold: f64,

    /// Append raised alerts to this JSONL audit log
    #[arg(long)]
    pub alert_log: Option<PathBuf>,
}

pub fn run(args: InspectArgs) -> anyhow::Result<()> {
    if !validate::valid_image_extension(&args.image) {
        bail!(
            "unsupported image type: {} (expected one of {:?})",
            args.image.display(),
            validate::SUPPORTED_EXTENSIONS
        );
    }

    let product_id = args
        .product_id
        .unwrap_or_else(|| product_id_from_path(&args.image));
    if !validate::valid_product_id(&product_id) {
        bail!("invalid product id: {product_id}");
    }

    let mut config = InspectionConfig::builder();
    if let Some(model) = args.model {
        config = config.model_path(model);
    }
    let session = InspectionSession::new(config.build());

    let report = if args.extended {
        session.inspect_file_extended(&product_id, &args.image)?
    } else {
        session.inspect_file(&product_id, &args.image)?
    };

    println!("Product:        {}", report.product_id);
    println!(
        "Severity:       {} ({})",
        report.classification.tier,
        report.classification.tier.description()
    );
    println!(
        "Confidence:     {:.1}%",
        report.classification.confidence * 100.0
    );
    println!("Edge density:   {:.4}", report.edge_density);
    println!("Texture:        {}", report.texture_verdict);
    println!(
        "Defect prob.:   {:.4}",
        report.texture.defect_probability
    );
    if let Some(color) = &report.color {
        println!("Color var.:     {:.4}", color.variation);
    }
    println!(
        "Decision path:  {}",
        if report.model_backed { "trained model" } else { "rule-based" }
    );

    let mut record = DefectRecord::new(
        &report.product_id,
        report.classification,
        report.edge_density,
        report.features.values().to_vec(),
        Some(args.image.clone()),
    );

    if let Some(path) = args.store {
        let mut store = JsonlStore::new(path);
        record = store.record(record).context("recording defect")?;
        println!(
            "Recorded as #{} in {}",
            record.id.unwrap_or_default(),
            store.path().display()
        );
    }

    let policy = AlertPolicy {
        threshold: args.alert_threshold,
    };
    if policy.should_alert(&record) {
        LogSink.notify(&record)?;
        if let Some(path) = args.alert_log {
            let mut log = JsonlAlertLog::new(path);
            log.notify(&record).context("appending alert log")?;
        }
        println!();
        println!("{}", defect_scan::alert::format_alert(&record));
    }

    Ok(())
}
