//! Defect severity classification.
//!
//! Two decision paths share one contract: a learned model (when a trained
//! artifact is present) and a deterministic rule-based fallback. The
//! classifier never hard-fails an inspection; the worst outcome for a
//! malformed vector is an `Unknown` low-confidence result.

pub mod model;

pub use model::{ARTIFACT_VERSION, GaussianNb, StandardScaler, TrainedModel};

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::features::{FeatureLayout, FeatureVector};

/// Ordinal severity tier of a detected defect.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum DefectTier {
    /// No defects detected.
    Good,
    /// Minor defects, acceptable.
    Minor,
    /// Major defects, requires attention.
    Major,
    /// Critical defects, immediate action required.
    Critical,
    /// Unable to determine defect status.
    Unknown,
}

impl DefectTier {
    /// All tiers, in severity order.
    pub const ALL: [Self; 5] = [
        Self::Good,
        Self::Minor,
        Self::Major,
        Self::Critical,
        Self::Unknown,
    ];

    /// Canonical uppercase code.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Good => "GOOD",
            Self::Minor => "MINOR",
            Self::Major => "MAJOR",
            Self::Critical => "CRITICAL",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Human description for reports and notifications.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Good => "No defects detected",
            Self::Minor => "Minor defects - acceptable",
            Self::Major => "Major defects - requires attention",
            Self::Critical => "Critical defects - immediate action required",
            Self::Unknown => "Unable to determine defect status",
        }
    }

    /// Dashboard color code.
    #[must_use]
    pub fn color_code(self) -> &'static str {
        match self {
            Self::Good => "#28a745",
            Self::Minor => "#ffc107",
            Self::Major => "#fd7e14",
            Self::Critical => "#dc3545",
            Self::Unknown => "#6c757d",
        }
    }

    /// Whether this tier is severe enough to warrant follow-up.
    #[must_use]
    pub fn is_actionable(self) -> bool {
        matches!(self, Self::Major | Self::Critical)
    }
}

impl std::fmt::Display for DefectTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DefectTier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "GOOD" => Ok(Self::Good),
            "MINOR" => Ok(Self::Minor),
            "MAJOR" => Ok(Self::Major),
            "CRITICAL" => Ok(Self::Critical),
            "UNKNOWN" => Ok(Self::Unknown),
            other => Err(Error::InvalidInput(format!("unknown defect tier: {other}"))),
        }
    }
}

/// A severity decision with its confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Decided severity tier.
    pub tier: DefectTier,
    /// Decision confidence, always clamped to `[0, 1]`.
    pub confidence: f64,
}

impl Classification {
    /// Build a classification, clamping the confidence into `[0, 1]`.
    #[must_use]
    pub fn new(tier: DefectTier, confidence: f64) -> Self {
        Self {
            tier,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// Deterministic rule-based severity decision.
///
/// Combines edge density (`v[0]`) and texture defect probability (`v[4]`)
/// into `combined = (v[0] + v[4]) / 2` and maps it onto the tier ladder.
/// Band upper bounds are strict, so a combined score exactly at 0.3, 0.6 or
/// 0.8 belongs to the higher tier. Vectors shorter than five values yield
/// `Unknown` with confidence 0.5.
#[must_use]
pub fn rule_based(values: &[f64]) -> Classification {
    if values.len() < 5 {
        return Classification::new(DefectTier::Unknown, 0.5);
    }

    let edge_density = values[0];
    let texture_probability = values[4];
    let combined = (edge_density + texture_probability) / 2.0;

    if combined < 0.3 {
        Classification::new(DefectTier::Good, 1.0 - combined)
    } else if combined < 0.6 {
        Classification::new(DefectTier::Minor, combined)
    } else if combined < 0.8 {
        Classification::new(DefectTier::Major, combined)
    } else {
        Classification::new(DefectTier::Critical, combined)
    }
}

/// Severity classifier with a learned model and a rule-based fallback.
///
/// State machine: `Untrained -> Trained` happens only through an explicit
/// [`SeverityClassifier::train`] or a successful artifact load; the only
/// way back is constructing a fresh instance. The model is immutable once
/// loaded, so concurrent `classify` calls need no locking.
#[derive(Debug, Default)]
pub struct SeverityClassifier {
    model: Option<TrainedModel>,
}

impl SeverityClassifier {
    /// Create an untrained classifier; every decision uses the rule path.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an already-fitted model.
    #[must_use]
    pub fn with_model(model: TrainedModel) -> Self {
        Self { model: Some(model) }
    }

    /// Load a model artifact, degrading to the rule path on any failure.
    ///
    /// This is the service-startup entry point: a missing or corrupt
    /// artifact is logged and the classifier stays untrained.
    #[must_use]
    pub fn from_artifact(path: &Path) -> Self {
        let mut classifier = Self::new();
        match classifier.load_artifact(path) {
            Ok(()) => info!(path = %path.display(), "severity model loaded"),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "severity model unavailable, using rule-based classification");
            }
        }
        classifier
    }

    /// Explicitly load a model artifact.
    ///
    /// On error the classifier is left untrained; a bundle is never
    /// partially applied.
    pub fn load_artifact(&mut self, path: &Path) -> Result<()> {
        let model = TrainedModel::load(path)?;
        self.model = Some(model);
        Ok(())
    }

    /// Whether a trained model is present.
    #[must_use]
    pub fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    /// The loaded model, if any.
    #[must_use]
    pub fn model(&self) -> Option<&TrainedModel> {
        self.model.as_ref()
    }

    /// Classify an assembled feature vector.
    #[must_use]
    pub fn classify(&self, features: &FeatureVector) -> Classification {
        self.classify_values(features.values())
    }

    /// Classify a raw value slice (the live-endpoint shape).
    ///
    /// Model inference is an explicit fallible operation; an arity mismatch
    /// or any other inference failure is logged and recovered through the
    /// rule-based path rather than propagated.
    #[must_use]
    pub fn classify_values(&self, values: &[f64]) -> Classification {
        if let Some(model) = &self.model {
            match model.infer(values) {
                Ok(classification) => return classification,
                Err(err) => {
                    warn!(error = %err, "model inference failed, falling back to rule-based classification");
                }
            }
        }
        rule_based(values)
    }

    /// Fit the model on labeled feature vectors and flip to `Trained`.
    ///
    /// One scaler is fitted over the whole feature set, then the
    /// probability-capable model over the scaled features. All vectors must
    /// share one layout; that layout is recorded in the model and enforced
    /// at inference time.
    pub fn train(&mut self, features: &[FeatureVector], labels: &[DefectTier]) -> Result<()> {
        let layout = shared_layout(features)?;
        let rows: Vec<Vec<f64>> = features.iter().map(|f| f.values().to_vec()).collect();
        let model = TrainedModel::fit(&rows, labels, layout)?;
        info!(%layout, samples = rows.len(), "severity model trained");
        self.model = Some(model);
        Ok(())
    }

    /// Exploratory unsupervised grouping of unlabeled feature vectors.
    ///
    /// Fits a local scaler and runs k-means on the scaled features. Not on
    /// the severity-decision path and does not change classifier state.
    pub fn cluster(&self, features: &[FeatureVector], clusters: usize) -> Result<Vec<usize>> {
        shared_layout(features)?;
        let rows: Vec<Vec<f64>> = features.iter().map(|f| f.values().to_vec()).collect();
        let scaler = StandardScaler::fit(&rows)?;
        let scaled = rows
            .iter()
            .map(|row| scaler.transform(row))
            .collect::<Result<Vec<_>>>()?;
        model::kmeans(&scaled, clusters, 100)
    }

    /// Persist the trained model bundle to one artifact file.
    pub fn save(&self, path: &Path) -> Result<()> {
        match &self.model {
            Some(model) => model.save(path),
            None => Err(Error::ModelUnavailable {
                path: path.to_path_buf(),
                reason: "classifier is untrained, nothing to save".into(),
            }),
        }
    }
}

/// The single layout shared by every vector in a training set.
fn shared_layout(features: &[FeatureVector]) -> Result<FeatureLayout> {
    let first = features
        .first()
        .ok_or_else(|| Error::Training("empty feature set".into()))?
        .layout();
    for f in features {
        if f.layout() != first {
            return Err(Error::Training(format!(
                "mixed feature layouts in training set: {first} and {}",
                f.layout()
            )));
        }
    }
    Ok(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::TextureFeatures;

    fn core_vector(edge: f64, probability: f64) -> FeatureVector {
        FeatureVector::core(
            edge,
            &TextureFeatures {
                contrast: 10.0,
                correlation: 0.5,
                energy: 0.3,
                homogeneity: 0.6,
                defect_probability: probability,
            },
        )
    }

    #[test]
    fn rule_based_matches_contract_examples() {
        let cases = [
            (vec![0.1, 0.0, 0.0, 0.0, 0.1], DefectTier::Good, 0.9),
            (vec![0.5, 0.0, 0.0, 0.0, 0.5], DefectTier::Minor, 0.5),
            (vec![0.5, 0.0, 0.0, 0.0, 0.9], DefectTier::Major, 0.7),
            (vec![0.9, 0.0, 0.0, 0.0, 0.9], DefectTier::Critical, 0.9),
        ];
        for (values, tier, confidence) in cases {
            let c = rule_based(&values);
            assert_eq!(c.tier, tier);
            assert!((c.confidence - confidence).abs() < 1e-12);
        }
    }

    #[test]
    fn rule_based_short_vector_is_unknown() {
        let c = rule_based(&[0.2, 0.4, 0.9]);
        assert_eq!(c.tier, DefectTier::Unknown);
        assert_eq!(c.confidence, 0.5);
        assert_eq!(rule_based(&[]).tier, DefectTier::Unknown);
    }

    #[test]
    fn rule_based_band_boundaries_round_up() {
        // A combined score exactly on a boundary belongs to the higher tier.
        assert_eq!(rule_based(&[0.3, 0.0, 0.0, 0.0, 0.3]).tier, DefectTier::Minor);
        assert_eq!(rule_based(&[0.6, 0.0, 0.0, 0.0, 0.6]).tier, DefectTier::Major);
        assert_eq!(
            rule_based(&[0.8, 0.0, 0.0, 0.0, 0.8]).tier,
            DefectTier::Critical
        );
    }

    #[test]
    fn rule_based_is_deterministic() {
        let values = [0.42, 1.0, 2.0, 3.0, 0.58];
        assert_eq!(rule_based(&values), rule_based(&values));
    }

    #[test]
    fn confidence_is_clamped_on_every_path() {
        assert_eq!(Classification::new(DefectTier::Good, 1.7).confidence, 1.0);
        assert_eq!(Classification::new(DefectTier::Good, -0.2).confidence, 0.0);
        // Out-of-range inputs still produce an in-range confidence.
        let c = rule_based(&[-1.0, 0.0, 0.0, 0.0, -1.0]);
        assert_eq!(c.tier, DefectTier::Good);
        assert_eq!(c.confidence, 1.0);
    }

    #[test]
    fn untrained_classifier_equals_rule_based() {
        let classifier = SeverityClassifier::new();
        assert!(!classifier.is_trained());
        for values in [
            vec![0.1, 0.0, 0.0, 0.0, 0.1],
            vec![0.5, 0.0, 0.0, 0.0, 0.9],
            vec![0.9, 9.0, 9.0, 9.0, 0.9],
            vec![0.1, 0.2],
        ] {
            assert_eq!(classifier.classify_values(&values), rule_based(&values));
        }
    }

    #[test]
    fn training_flips_state_and_keeps_confidence_bounded() {
        let mut classifier = SeverityClassifier::new();
        let (features, labels) = synthetic_set();
        classifier.train(&features, &labels).unwrap();
        assert!(classifier.is_trained());

        let c = classifier.classify(&core_vector(0.05, 0.05));
        assert!((0.0..=1.0).contains(&c.confidence));
    }

    #[test]
    fn schema_mismatch_falls_back_to_rules() {
        let mut classifier = SeverityClassifier::new();
        let (features, labels) = synthetic_set();
        classifier.train(&features, &labels).unwrap();

        // Five values against a six-value model: the learned path fails
        // closed into the rule path.
        let short = [0.9, 0.0, 0.0, 0.0, 0.9];
        assert_eq!(classifier.classify_values(&short), rule_based(&short));
    }

    #[test]
    fn mixed_layout_training_set_is_rejected() {
        let mut classifier = SeverityClassifier::new();
        let texture = TextureFeatures::default();
        let color = crate::features::ColorConsistency::default();
        let features = vec![
            FeatureVector::core(0.1, &texture),
            FeatureVector::extended(0.1, &texture, &color),
        ];
        let labels = vec![DefectTier::Good, DefectTier::Good];
        assert!(matches!(
            classifier.train(&features, &labels),
            Err(Error::Training(_))
        ));
        assert!(!classifier.is_trained());
    }

    #[test]
    fn from_artifact_with_missing_file_stays_untrained() {
        let classifier = SeverityClassifier::from_artifact(Path::new("/nonexistent/model.json"));
        assert!(!classifier.is_trained());
    }

    #[test]
    fn saving_untrained_classifier_is_an_error() {
        let classifier = SeverityClassifier::new();
        assert!(matches!(
            classifier.save(Path::new("/tmp/never-written.json")),
            Err(Error::ModelUnavailable { .. })
        ));
    }

    #[test]
    fn tier_codes_round_trip() {
        for tier in DefectTier::ALL {
            assert_eq!(tier.as_str().parse::<DefectTier>().unwrap(), tier);
        }
        assert!("SEVERE".parse::<DefectTier>().is_err());
    }

    #[test]
    fn actionable_tiers() {
        assert!(!DefectTier::Good.is_actionable());
        assert!(!DefectTier::Minor.is_actionable());
        assert!(DefectTier::Major.is_actionable());
        assert!(DefectTier::Critical.is_actionable());
        assert!(!DefectTier::Unknown.is_actionable());
    }

    /// Clearly separated two-class set on the core layout.
    fn synthetic_set() -> (Vec<FeatureVector>, Vec<DefectTier>) {
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for i in 0..20 {
            let jitter = f64::from(i) * 0.002;
            features.push(core_vector(0.05 + jitter, 0.1 + jitter));
            labels.push(DefectTier::Good);
            features.push(core_vector(0.85 + jitter, 0.9 - jitter));
            labels.push(DefectTier::Critical);
        }
        (features, labels)
    }
}
