use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use defect_scan::classify::{DefectTier, SeverityClassifier};
use defect_scan::features::{FeatureVector, TextureFeatures};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Args)]
pub struct TrainArgs {
    /// Output artifact path
    #[arg(short, long, default_value = "models/severity.json")]
    pub output: PathBuf,

    /// Samples generated per severity class
    #[arg(long, default_value_t = 250)]
    pub samples: usize,

    /// Seed for the synthetic data generator
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

/// Per-class value ranges over the core layout:
/// `[edge_density, contrast, correlation, energy, homogeneity,
/// defect_probability]`. Intact parts sit at low edge density and orderly
/// texture; each tier up shifts toward busier, less ordered statistics.
const CLASS_RANGES: [(DefectTier, [(f64, f64); 6]); 4] = [
    (
        DefectTier::Good,
        [
            (0.0, 0.2),
            (0.0, 0.3),
            (0.7, 1.0),
            (0.8, 1.0),
            (0.8, 1.0),
            (0.0, 0.3),
        ],
    ),
    (
        DefectTier::Minor,
        [
            (0.2, 0.4),
            (0.3, 0.6),
            (0.4, 0.7),
            (0.6, 0.8),
            (0.6, 0.8),
            (0.3, 0.6),
        ],
    ),
    (
        DefectTier::Major,
        [
            (0.4, 0.7),
            (0.6, 0.9),
            (0.2, 0.5),
            (0.3, 0.6),
            (0.3, 0.6),
            (0.6, 0.8),
        ],
    ),
    (
        DefectTier::Critical,
        [
            (0.7, 1.0),
            (0.8, 1.0),
            (0.0, 0.3),
            (0.0, 0.3),
            (0.0, 0.3),
            (0.8, 1.0),
        ],
    ),
];

pub fn run(args: TrainArgs) -> anyhow::Result<()> {
    println!("Training severity classification model...");

    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut features = Vec::with_capacity(CLASS_RANGES.len() * args.samples);
    let mut labels = Vec::with_capacity(CLASS_RANGES.len() * args.samples);

    for (tier, ranges) in CLASS_RANGES {
        for _ in 0..args.samples {
            let draw = |rng: &mut StdRng, (lo, hi): (f64, f64)| rng.gen_range(lo..hi);
            let edge_density = draw(&mut rng, ranges[0]);
            let texture = TextureFeatures {
                contrast: draw(&mut rng, ranges[1]),
                correlation: draw(&mut rng, ranges[2]),
                energy: draw(&mut rng, ranges[3]),
                homogeneity: draw(&mut rng, ranges[4]),
                defect_probability: draw(&mut rng, ranges[5]),
            };
            features.push(FeatureVector::core(edge_density, &texture));
            labels.push(tier);
        }
    }

    let mut classifier = SeverityClassifier::new();
    classifier
        .train(&features, &labels)
        .context("fitting severity model")?;
    classifier
        .save(&args.output)
        .context("saving model artifact")?;

    println!("Model training completed!");
    println!("Model saved to: {}", args.output.display());
    println!("Training samples: {}", features.len());
    println!(
        "Classes: {:?}",
        CLASS_RANGES.map(|(tier, _)| tier.as_str())
    );
    Ok(())
}
