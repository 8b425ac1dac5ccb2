//! Learned severity model: feature scaling, the probability-capable
//! classifier, exploratory clustering and artifact persistence.
//!
//! The fitted model and the scaler that produced its training distribution
//! are one unit. They are persisted together in a single versioned artifact
//! and loaded together or not at all; a model without its paired scaler is
//! meaningless.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::classify::{Classification, DefectTier};
use crate::error::{Error, Result};
use crate::features::FeatureLayout;

/// On-disk artifact format version.
pub const ARTIFACT_VERSION: u32 = 1;

/// Variance floor relative to the largest per-feature variance, so
/// zero-variance features stay numerically harmless.
const VARIANCE_SMOOTHING: f64 = 1e-9;

/// Per-feature standardization fitted on a training set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    std: Vec<f64>,
}

impl StandardScaler {
    /// Fit mean and standard deviation per feature column.
    ///
    /// Zero-variance columns get a unit deviation so transformation maps
    /// them to zero instead of infinity.
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self> {
        let arity = check_rectangular(rows)?;
        let n = rows.len() as f64;

        let mut mean = vec![0.0; arity];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        for m in &mut mean {
            *m /= n;
        }

        let mut std = vec![0.0; arity];
        for row in rows {
            for ((s, v), m) in std.iter_mut().zip(row).zip(&mean) {
                *s += (v - m).powi(2);
            }
        }
        for s in &mut std {
            *s = (*s / n).sqrt();
            if *s < f64::EPSILON {
                *s = 1.0;
            }
        }

        Ok(Self { mean, std })
    }

    /// Standardize one row with the fitted parameters.
    pub fn transform(&self, row: &[f64]) -> Result<Vec<f64>> {
        if row.len() != self.mean.len() {
            return Err(Error::SchemaMismatch {
                expected: self.mean.len(),
                actual: row.len(),
            });
        }
        Ok(row
            .iter()
            .zip(&self.mean)
            .zip(&self.std)
            .map(|((v, m), s)| (v - m) / s)
            .collect())
    }

    /// Number of feature columns the scaler was fitted on.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.mean.len()
    }
}

/// Gaussian naive-Bayes classifier over standardized features.
///
/// Probability-capable by construction: inference produces a full
/// class-probability distribution and the decision confidence is its
/// maximum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaussianNb {
    classes: Vec<DefectTier>,
    priors: Vec<f64>,
    means: Vec<Vec<f64>>,
    variances: Vec<Vec<f64>>,
}

impl GaussianNb {
    /// Fit per-class feature means, variances and priors.
    pub fn fit(rows: &[Vec<f64>], labels: &[DefectTier]) -> Result<Self> {
        let arity = check_rectangular(rows)?;
        if rows.len() != labels.len() {
            return Err(Error::Training(format!(
                "{} feature rows but {} labels",
                rows.len(),
                labels.len()
            )));
        }

        let mut classes: Vec<DefectTier> = labels.to_vec();
        classes.sort_unstable();
        classes.dedup();

        let mut priors = Vec::with_capacity(classes.len());
        let mut means = Vec::with_capacity(classes.len());
        let mut variances = Vec::with_capacity(classes.len());
        let mut max_variance = 0.0f64;

        for &class in &classes {
            let members: Vec<&Vec<f64>> = rows
                .iter()
                .zip(labels)
                .filter(|&(_, &label)| label == class)
                .map(|(row, _)| row)
                .collect();
            let count = members.len() as f64;

            let mut mean = vec![0.0; arity];
            for row in &members {
                for (m, v) in mean.iter_mut().zip(row.iter()) {
                    *m += v;
                }
            }
            for m in &mut mean {
                *m /= count;
            }

            let mut variance = vec![0.0; arity];
            for row in &members {
                for ((var, v), m) in variance.iter_mut().zip(row.iter()).zip(&mean) {
                    *var += (v - m).powi(2);
                }
            }
            for var in &mut variance {
                *var /= count;
                max_variance = max_variance.max(*var);
            }

            priors.push(count / rows.len() as f64);
            means.push(mean);
            variances.push(variance);
        }

        let smoothing = (max_variance * VARIANCE_SMOOTHING).max(VARIANCE_SMOOTHING);
        for variance in &mut variances {
            for var in variance {
                *var += smoothing;
            }
        }

        Ok(Self {
            classes,
            priors,
            means,
            variances,
        })
    }

    /// Class labels in their internal order.
    #[must_use]
    pub fn classes(&self) -> &[DefectTier] {
        &self.classes
    }

    /// Posterior probability per class for one standardized row.
    pub fn predict_proba(&self, row: &[f64]) -> Result<Vec<f64>> {
        let arity = self.means.first().map_or(0, Vec::len);
        if row.len() != arity {
            return Err(Error::SchemaMismatch {
                expected: arity,
                actual: row.len(),
            });
        }

        let mut log_joint = Vec::with_capacity(self.classes.len());
        for ((prior, mean), variance) in
            self.priors.iter().zip(&self.means).zip(&self.variances)
        {
            let mut log_likelihood = prior.ln();
            for ((v, m), var) in row.iter().zip(mean).zip(variance) {
                log_likelihood -=
                    0.5 * (2.0 * std::f64::consts::PI * var).ln() + (v - m).powi(2) / (2.0 * var);
            }
            log_joint.push(log_likelihood);
        }

        // Normalize in log space so tiny likelihoods survive.
        let max = log_joint.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mut probabilities: Vec<f64> =
            log_joint.iter().map(|l| (l - max).exp()).collect();
        let total: f64 = probabilities.iter().sum();
        if total <= 0.0 || !total.is_finite() {
            return Err(Error::ModelInference(
                "class probabilities did not normalize".into(),
            ));
        }
        for p in &mut probabilities {
            *p /= total;
        }
        Ok(probabilities)
    }

    /// Most probable class and its probability.
    pub fn predict(&self, row: &[f64]) -> Result<(DefectTier, f64)> {
        let probabilities = self.predict_proba(row)?;
        let (index, &probability) = probabilities
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .ok_or_else(|| Error::ModelInference("model has no classes".into()))?;
        Ok((self.classes[index], probability))
    }
}

/// A fitted model, its paired scaler and the layout both were fitted on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    scaler: StandardScaler,
    model: GaussianNb,
    layout: FeatureLayout,
}

impl TrainedModel {
    /// Fit the scaler over the whole feature set, then the classifier over
    /// the scaled features.
    pub fn fit(rows: &[Vec<f64>], labels: &[DefectTier], layout: FeatureLayout) -> Result<Self> {
        let arity = check_rectangular(rows)?;
        if arity != layout.arity() {
            return Err(Error::Training(format!(
                "{layout} layout carries {} values but rows have {arity}",
                layout.arity()
            )));
        }

        let scaler = StandardScaler::fit(rows)?;
        let scaled = rows
            .iter()
            .map(|row| scaler.transform(row))
            .collect::<Result<Vec<_>>>()?;
        let model = GaussianNb::fit(&scaled, labels)?;

        Ok(Self {
            scaler,
            model,
            layout,
        })
    }

    /// The layout this model was fitted on.
    #[must_use]
    pub fn layout(&self) -> FeatureLayout {
        self.layout
    }

    /// Run inference on a raw (unscaled) value slice.
    ///
    /// Explicitly fallible: the caller decides what to do on failure. An
    /// arity mismatch against the fitted layout surfaces as
    /// [`Error::SchemaMismatch`] before any arithmetic happens.
    pub fn infer(&self, values: &[f64]) -> Result<Classification> {
        if values.len() != self.layout.arity() {
            return Err(Error::SchemaMismatch {
                expected: self.layout.arity(),
                actual: values.len(),
            });
        }
        let scaled = self.scaler.transform(values)?;
        let (tier, probability) = self.model.predict(&scaled)?;
        Ok(Classification::new(tier, probability))
    }

    /// Persist the bundle as one versioned JSON artifact.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let artifact = ModelArtifact {
            format_version: ARTIFACT_VERSION,
            layout: self.layout,
            scaler: self.scaler.clone(),
            model: self.model.clone(),
        };
        let json = serde_json::to_string_pretty(&artifact)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load a bundle, rejecting anything missing, unreadable or
    /// structurally incomplete.
    pub fn load(path: &Path) -> Result<Self> {
        let unavailable = |reason: String| Error::ModelUnavailable {
            path: path.to_path_buf(),
            reason,
        };

        let raw = fs::read_to_string(path).map_err(|e| unavailable(e.to_string()))?;
        let artifact: ModelArtifact =
            serde_json::from_str(&raw).map_err(|e| unavailable(e.to_string()))?;

        if artifact.format_version != ARTIFACT_VERSION {
            return Err(unavailable(format!(
                "unsupported artifact version {}, expected {ARTIFACT_VERSION}",
                artifact.format_version
            )));
        }

        let model = Self {
            scaler: artifact.scaler,
            model: artifact.model,
            layout: artifact.layout,
        };
        model.validate().map_err(unavailable)?;
        Ok(model)
    }

    /// Structural consistency of a deserialized bundle.
    fn validate(&self) -> std::result::Result<(), String> {
        let arity = self.layout.arity();
        if self.scaler.arity() != arity {
            return Err(format!(
                "scaler arity {} does not match {} layout arity {arity}",
                self.scaler.arity(),
                self.layout
            ));
        }
        let nb = &self.model;
        if nb.classes.is_empty() {
            return Err("model has no classes".into());
        }
        if nb.classes.len() != nb.priors.len()
            || nb.classes.len() != nb.means.len()
            || nb.classes.len() != nb.variances.len()
        {
            return Err("model class tables have inconsistent lengths".into());
        }
        for (mean, variance) in nb.means.iter().zip(&nb.variances) {
            if mean.len() != arity || variance.len() != arity {
                return Err("model parameter rows do not match the layout arity".into());
            }
        }
        Ok(())
    }
}

/// On-disk bundle: version stamp plus the model/scaler pair.
#[derive(Debug, Serialize, Deserialize)]
struct ModelArtifact {
    format_version: u32,
    layout: FeatureLayout,
    scaler: StandardScaler,
    model: GaussianNb,
}

/// Lloyd's k-means over pre-scaled rows with deterministic spread-out
/// initialization. Returns the cluster index per row.
pub fn kmeans(rows: &[Vec<f64>], clusters: usize, max_iterations: usize) -> Result<Vec<usize>> {
    check_rectangular(rows)?;
    if clusters == 0 || clusters > rows.len() {
        return Err(Error::Training(format!(
            "cannot form {clusters} clusters from {} rows",
            rows.len()
        )));
    }

    let mut centroids: Vec<Vec<f64>> = (0..clusters)
        .map(|i| rows[i * rows.len() / clusters].clone())
        .collect();
    let mut assignment = vec![0usize; rows.len()];

    for _ in 0..max_iterations {
        let mut changed = false;
        for (row, slot) in rows.iter().zip(assignment.iter_mut()) {
            let nearest = centroids
                .iter()
                .enumerate()
                .map(|(i, c)| (i, squared_distance(row, c)))
                .min_by(|(_, a), (_, b)| a.total_cmp(b))
                .map(|(i, _)| i)
                .unwrap_or(0);
            if nearest != *slot {
                *slot = nearest;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        for (index, centroid) in centroids.iter_mut().enumerate() {
            let members: Vec<&Vec<f64>> = rows
                .iter()
                .zip(&assignment)
                .filter(|&(_, &a)| a == index)
                .map(|(row, _)| row)
                .collect();
            if members.is_empty() {
                continue;
            }
            let count = members.len() as f64;
            for (d, slot) in centroid.iter_mut().enumerate() {
                *slot = members.iter().map(|row| row[d]).sum::<f64>() / count;
            }
        }
    }

    Ok(assignment)
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Common arity of a non-empty, rectangular row set.
fn check_rectangular(rows: &[Vec<f64>]) -> Result<usize> {
    let arity = rows
        .first()
        .ok_or_else(|| Error::Training("empty feature set".into()))?
        .len();
    if arity == 0 {
        return Err(Error::Training("zero-width feature rows".into()));
    }
    if rows.iter().any(|row| row.len() != arity) {
        return Err(Error::Training("ragged feature rows".into()));
    }
    Ok(arity)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_blob_rows() -> (Vec<Vec<f64>>, Vec<DefectTier>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..25 {
            let jitter = f64::from(i) * 0.01;
            rows.push(vec![0.1 + jitter, 0.2, 0.9 - jitter]);
            labels.push(DefectTier::Good);
            rows.push(vec![0.9 - jitter, 0.8, 0.1 + jitter]);
            labels.push(DefectTier::Critical);
        }
        (rows, labels)
    }

    #[test]
    fn scaler_standardizes_columns() {
        let rows = vec![
            vec![1.0, 10.0],
            vec![2.0, 10.0],
            vec![3.0, 10.0],
            vec![4.0, 10.0],
        ];
        let scaler = StandardScaler::fit(&rows).unwrap();

        let transformed: Vec<Vec<f64>> = rows
            .iter()
            .map(|row| scaler.transform(row).unwrap())
            .collect();

        let mean0: f64 = transformed.iter().map(|r| r[0]).sum::<f64>() / 4.0;
        assert!(mean0.abs() < 1e-12);
        // Constant column: unit fallback deviation maps everything to zero.
        assert!(transformed.iter().all(|r| r[1] == 0.0));
    }

    #[test]
    fn scaler_rejects_wrong_arity() {
        let scaler = StandardScaler::fit(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert!(matches!(
            scaler.transform(&[1.0]),
            Err(Error::SchemaMismatch {
                expected: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn gaussian_nb_separates_blobs() {
        let (rows, labels) = two_blob_rows();
        let nb = GaussianNb::fit(&rows, &labels).unwrap();

        let (tier, probability) = nb.predict(&[0.12, 0.2, 0.88]).unwrap();
        assert_eq!(tier, DefectTier::Good);
        assert!(probability > 0.9);

        let (tier, _) = nb.predict(&[0.88, 0.8, 0.12]).unwrap();
        assert_eq!(tier, DefectTier::Critical);
    }

    #[test]
    fn gaussian_nb_probabilities_sum_to_one() {
        let (rows, labels) = two_blob_rows();
        let nb = GaussianNb::fit(&rows, &labels).unwrap();
        let probabilities = nb.predict_proba(&[0.5, 0.5, 0.5]).unwrap();
        assert_eq!(probabilities.len(), 2);
        let total: f64 = probabilities.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(probabilities.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn fit_rejects_label_count_mismatch() {
        let result = GaussianNb::fit(&[vec![1.0], vec![2.0]], &[DefectTier::Good]);
        assert!(matches!(result, Err(Error::Training(_))));
    }

    #[test]
    fn trained_model_round_trips_through_artifact() {
        let (rows, labels) = two_blob_rows();
        // Pad rows out to the core layout arity.
        let rows: Vec<Vec<f64>> = rows
            .into_iter()
            .map(|mut row| {
                row.extend([0.0, 0.0, 0.0]);
                row
            })
            .collect();
        let model = TrainedModel::fit(&rows, &labels, FeatureLayout::Core).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("severity-model.json");
        model.save(&path).unwrap();

        let reloaded = TrainedModel::load(&path).unwrap();
        assert_eq!(reloaded, model);

        let probes = [
            vec![0.12, 0.2, 0.88, 0.0, 0.0, 0.0],
            vec![0.88, 0.8, 0.12, 0.0, 0.0, 0.0],
            vec![0.5, 0.5, 0.5, 0.0, 0.0, 0.0],
        ];
        for probe in &probes {
            assert_eq!(
                reloaded.infer(probe).unwrap(),
                model.infer(probe).unwrap()
            );
        }
    }

    #[test]
    fn load_missing_artifact_is_unavailable() {
        let result = TrainedModel::load(Path::new("/nonexistent/model.json"));
        assert!(matches!(result, Err(Error::ModelUnavailable { .. })));
    }

    #[test]
    fn load_truncated_artifact_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("truncated.json");
        std::fs::write(&path, "{\"format_version\":1,\"layout\":\"Core\"").unwrap();
        assert!(matches!(
            TrainedModel::load(&path),
            Err(Error::ModelUnavailable { .. })
        ));
    }

    #[test]
    fn load_wrong_version_is_unavailable() {
        let (rows, labels) = two_blob_rows();
        let rows: Vec<Vec<f64>> = rows
            .into_iter()
            .map(|mut row| {
                row.extend([0.0, 0.0, 0.0]);
                row
            })
            .collect();
        let model = TrainedModel::fit(&rows, &labels, FeatureLayout::Core).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("versioned.json");
        model.save(&path).unwrap();

        let bumped = std::fs::read_to_string(&path)
            .unwrap()
            .replace("\"format_version\": 1", "\"format_version\": 99");
        std::fs::write(&path, bumped).unwrap();

        assert!(matches!(
            TrainedModel::load(&path),
            Err(Error::ModelUnavailable { .. })
        ));
    }

    #[test]
    fn infer_validates_arity_before_scaling() {
        let (rows, labels) = two_blob_rows();
        let rows: Vec<Vec<f64>> = rows
            .into_iter()
            .map(|mut row| {
                row.extend([0.0, 0.0, 0.0]);
                row
            })
            .collect();
        let model = TrainedModel::fit(&rows, &labels, FeatureLayout::Core).unwrap();
        assert!(matches!(
            model.infer(&[0.1, 0.2]),
            Err(Error::SchemaMismatch {
                expected: 6,
                actual: 2
            })
        ));
    }

    #[test]
    fn kmeans_groups_two_blobs() {
        let rows: Vec<Vec<f64>> = (0..10)
            .map(|i| {
                if i < 5 {
                    vec![0.0 + f64::from(i) * 0.01, 0.0]
                } else {
                    vec![5.0 + f64::from(i) * 0.01, 5.0]
                }
            })
            .collect();
        let assignment = kmeans(&rows, 2, 100).unwrap();
        assert!(assignment[..5].iter().all(|&a| a == assignment[0]));
        assert!(assignment[5..].iter().all(|&a| a == assignment[5]));
        assert_ne!(assignment[0], assignment[5]);
    }

    #[test]
    fn kmeans_rejects_impossible_cluster_counts() {
        let rows = vec![vec![1.0], vec![2.0]];
        assert!(kmeans(&rows, 0, 10).is_err());
        assert!(kmeans(&rows, 3, 10).is_err());
    }
}
