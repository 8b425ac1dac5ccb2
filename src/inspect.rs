//! Inspection session: the image-to-classification pipeline.
//!
//! One session owns the stage instances and the classifier handle. All of
//! them are read-only after construction, so a shared session can serve
//! concurrent inspections without locking; swapping in a retrained model
//! means building a fresh session.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use image::RgbImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classify::{Classification, SeverityClassifier};
use crate::error::{Error, Result};
use crate::features::{
    ColorAnalyzer, ColorConsistency, EdgeDetector, FeatureVector, TextureAnalyzer,
    TextureFeatures, TextureVerdict,
};
use crate::preprocess::Preprocessor;

/// Configuration for an inspection session.
#[derive(Debug, Clone)]
pub struct InspectionConfig {
    /// Canonical width images are resampled to.
    pub target_width: u32,

    /// Canonical height images are resampled to.
    pub target_height: u32,

    /// Lower Canny hysteresis threshold.
    pub canny_low: f32,

    /// Upper Canny hysteresis threshold.
    pub canny_high: f32,

    /// Model artifact loaded at session start, if any.
    pub model_path: Option<PathBuf>,

    /// Directory for report output (JSON, CSV).
    pub report_dir: Option<PathBuf>,
}

impl Default for InspectionConfig {
    fn default() -> Self {
        let preprocessor = Preprocessor::default();
        let edges = EdgeDetector::default();
        Self {
            target_width: preprocessor.target_width,
            target_height: preprocessor.target_height,
            canny_low: edges.low_threshold,
            canny_high: edges.high_threshold,
            model_path: None,
            report_dir: None,
        }
    }
}

impl InspectionConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> InspectionConfigBuilder {
        InspectionConfigBuilder::default()
    }
}

/// Builder for [`InspectionConfig`].
#[derive(Debug, Default)]
pub struct InspectionConfigBuilder {
    target_size: Option<(u32, u32)>,
    canny: Option<(f32, f32)>,
    model_path: Option<PathBuf>,
    report_dir: Option<PathBuf>,
}

impl InspectionConfigBuilder {
    /// Set the canonical resampling size.
    #[must_use]
    pub fn target_size(mut self, width: u32, height: u32) -> Self {
        self.target_size = Some((width, height));
        self
    }

    /// Set the Canny hysteresis thresholds.
    #[must_use]
    pub fn canny_thresholds(mut self, low: f32, high: f32) -> Self {
        self.canny = Some((low, high));
        self
    }

    /// Set the model artifact path.
    #[must_use]
    pub fn model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = Some(path.into());
        self
    }

    /// Set the report output directory.
    #[must_use]
    pub fn report_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_dir = Some(path.into());
        self
    }

    /// Build the configuration, applying defaults for unset fields.
    #[must_use]
    pub fn build(self) -> InspectionConfig {
        let defaults = InspectionConfig::default();
        let (width, height) = self
            .target_size
            .unwrap_or((defaults.target_width, defaults.target_height));
        let (low, high) = self.canny.unwrap_or((defaults.canny_low, defaults.canny_high));
        InspectionConfig {
            target_width: width,
            target_height: height,
            canny_low: low,
            canny_high: high,
            model_path: self.model_path,
            report_dir: self.report_dir,
        }
    }
}

/// Outcome of inspecting a single image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectionReport {
    /// Inspected product.
    pub product_id: String,

    /// Edge density of the canonicalized image.
    pub edge_density: f64,

    /// Verdict of the texture analyzer.
    pub texture_verdict: TextureVerdict,

    /// Texture feature block.
    pub texture: TextureFeatures,

    /// Color-consistency block; present on the extended path only.
    pub color: Option<ColorConsistency>,

    /// The assembled feature vector behind the decision.
    pub features: FeatureVector,

    /// Severity decision.
    pub classification: Classification,

    /// Whether a trained model was available for this session.
    pub model_backed: bool,

    /// Source image, when inspected from a file.
    pub image_path: Option<PathBuf>,

    /// When this report was generated.
    pub timestamp: DateTime<Utc>,
}

/// Inspection session wiring the pipeline stages together.
///
/// # Example
///
/// ```rust,ignore
/// use defect_scan::{InspectionConfig, InspectionSession};
///
/// let config = InspectionConfig::builder()
///     .model_path("models/severity.json")
///     .report_dir("./reports")
///     .build();
///
/// let session = InspectionSession::new(config);
/// let report = session.inspect_file("PART-001", "captures/part-001.png".as_ref())?;
/// println!("{}: {:.0}%", report.classification.tier, report.classification.confidence * 100.0);
/// ```
pub struct InspectionSession {
    config: InspectionConfig,
    preprocessor: Preprocessor,
    edges: EdgeDetector,
    texture: TextureAnalyzer,
    color: ColorAnalyzer,
    classifier: SeverityClassifier,
}

impl InspectionSession {
    /// Build a session from a configuration, loading the model artifact if
    /// one is configured. A missing or corrupt artifact degrades to the
    /// rule-based path without failing session construction.
    #[must_use]
    pub fn new(config: InspectionConfig) -> Self {
        let preprocessor = Preprocessor {
            target_width: config.target_width,
            target_height: config.target_height,
            ..Preprocessor::default()
        };
        let edges = EdgeDetector {
            low_threshold: config.canny_low,
            high_threshold: config.canny_high,
            ..EdgeDetector::default()
        };
        let classifier = match &config.model_path {
            Some(path) => SeverityClassifier::from_artifact(path),
            None => SeverityClassifier::new(),
        };

        Self {
            config,
            preprocessor,
            edges,
            texture: TextureAnalyzer::default(),
            color: ColorAnalyzer::default(),
            classifier,
        }
    }

    /// The session's classifier handle.
    #[must_use]
    pub fn classifier(&self) -> &SeverityClassifier {
        &self.classifier
    }

    /// Replace the classifier, e.g. after an in-process training run.
    #[must_use]
    pub fn with_classifier(mut self, classifier: SeverityClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Inspect one image with the core feature layout (the live path).
    #[must_use]
    pub fn inspect(&self, product_id: &str, image: &RgbImage) -> InspectionReport {
        let processed = self.preprocessor.preprocess(image);

        let mask = self.edges.detect(&processed);
        let edge_density = self.edges.edge_density(&mask);
        let (texture_verdict, texture) = self.texture.analyze(&processed);
        debug!(product_id, edge_density, %texture_verdict, "features extracted");

        let features = FeatureVector::core(edge_density, &texture);
        let classification = self.classifier.classify(&features);

        InspectionReport {
            product_id: product_id.to_string(),
            edge_density,
            texture_verdict,
            texture,
            color: None,
            features,
            classification,
            model_backed: self.classifier.is_trained(),
            image_path: None,
            timestamp: Utc::now(),
        }
    }

    /// Inspect one image with the extended feature layout, which appends
    /// the color-consistency block. Use with classifiers trained on the
    /// extended schema.
    #[must_use]
    pub fn inspect_extended(&self, product_id: &str, image: &RgbImage) -> InspectionReport {
        let processed = self.preprocessor.preprocess(image);

        let mask = self.edges.detect(&processed);
        let edge_density = self.edges.edge_density(&mask);
        let (texture_verdict, texture) = self.texture.analyze(&processed);
        // Consistency is measured on the resized original: the flattening
        // stage would erase exactly the chroma signal this block measures.
        let consistency = self.color.consistency(&self.preprocessor.resize(image));

        let features = FeatureVector::extended(edge_density, &texture, &consistency);
        let classification = self.classifier.classify(&features);

        InspectionReport {
            product_id: product_id.to_string(),
            edge_density,
            texture_verdict,
            texture,
            color: Some(consistency),
            features,
            classification,
            model_backed: self.classifier.is_trained(),
            image_path: None,
            timestamp: Utc::now(),
        }
    }

    /// Load an image from disk and inspect it.
    pub fn inspect_file(&self, product_id: &str, path: &Path) -> Result<InspectionReport> {
        let image = image::open(path)
            .map_err(|e| Error::ImageLoad {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
            .to_rgb8();
        let mut report = self.inspect(product_id, &image);
        report.image_path = Some(path.to_path_buf());
        Ok(report)
    }

    /// Load an image from disk and inspect it with the extended layout.
    pub fn inspect_file_extended(
        &self,
        product_id: &str,
        path: &Path,
    ) -> Result<InspectionReport> {
        let image = image::open(path)
            .map_err(|e| Error::ImageLoad {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
            .to_rgb8();
        let mut report = self.inspect_extended(product_id, &image);
        report.image_path = Some(path.to_path_buf());
        Ok(report)
    }

    /// Inspect many files concurrently.
    ///
    /// Product ids are derived from the file stems. Results are returned in
    /// input order; per-file failures do not abort the batch.
    pub fn inspect_batch(&self, paths: &[PathBuf]) -> Vec<Result<InspectionReport>> {
        paths
            .par_iter()
            .map(|path| self.inspect_file(&product_id_from_path(path), path))
            .collect()
    }

    /// Write one report as pretty JSON into the configured report
    /// directory.
    pub fn write_report(&self, report: &InspectionReport) -> Result<PathBuf> {
        let dir = self.report_dir()?;
        std::fs::create_dir_all(dir)?;

        let path = dir.join(format!("{}.json", report.product_id));
        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }

    /// Write a CSV summary of a batch into the configured report
    /// directory.
    pub fn write_csv_summary(&self, reports: &[InspectionReport], name: &str) -> Result<PathBuf> {
        let dir = self.report_dir()?;
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{name}.csv"));

        let mut wtr = csv::Writer::from_path(&path)?;
        wtr.write_record([
            "product_id",
            "tier",
            "confidence",
            "edge_density",
            "texture_defect_probability",
            "texture_verdict",
            "timestamp",
        ])?;
        for report in reports {
            wtr.write_record([
                report.product_id.clone(),
                report.classification.tier.to_string(),
                format!("{:.4}", report.classification.confidence),
                format!("{:.6}", report.edge_density),
                format!("{:.4}", report.texture.defect_probability),
                report.texture_verdict.to_string(),
                report.timestamp.to_rfc3339(),
            ])?;
        }
        wtr.flush()?;
        Ok(path)
    }

    fn report_dir(&self) -> Result<&Path> {
        self.config
            .report_dir
            .as_deref()
            .ok_or_else(|| Error::InvalidInput("no report directory configured".into()))
    }
}

/// Derive a product id from a file name: uppercase stem with unsupported
/// characters mapped to dashes.
#[must_use]
pub fn product_id_from_path(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("UNKNOWN");
    let id: String = stem
        .chars()
        .map(|c| {
            let c = c.to_ascii_uppercase();
            if c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .take(50)
        .collect();
    if id.is_empty() { "UNKNOWN".into() } else { id }
}
