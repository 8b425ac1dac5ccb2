//! Statistical texture descriptors and the texture defect-probability
//! score.
//!
//! Defects are not guaranteed to align with any single scan direction, so
//! the co-occurrence statistics are computed at the four standard unit
//! offsets and averaged into orientation-invariant descriptors.

use image::{GrayImage, RgbImage, imageops};
use serde::{Deserialize, Serialize};

/// Gray levels used for the co-occurrence matrix.
const GLCM_LEVELS: usize = 256;

/// Unit pixel offsets for 0, 45, 90 and 135 degrees.
const GLCM_OFFSETS: [(i32, i32); 4] = [(1, 0), (1, -1), (0, -1), (-1, -1)];

/// Epsilon added to the histogram denominator so degenerate (uniform)
/// patches normalize without dividing by zero.
const LBP_EPSILON: f64 = 1e-7;

/// Orientation-averaged co-occurrence descriptors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HaralickFeatures {
    /// Local intensity variation; high for busy or damaged surfaces.
    pub contrast: f64,
    /// Linear dependency of neighboring gray levels.
    pub correlation: f64,
    /// Angular second moment; high for orderly textures.
    pub energy: f64,
    /// Inverse difference moment; high for locally smooth textures.
    pub homogeneity: f64,
}

impl HaralickFeatures {
    /// Descriptors in their fixed order.
    #[must_use]
    pub fn to_array(&self) -> [f64; 4] {
        [self.contrast, self.correlation, self.energy, self.homogeneity]
    }
}

/// Binary texture verdict for one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextureVerdict {
    /// Texture statistics look like an intact surface.
    Good,
    /// Texture statistics cross the defect-probability threshold.
    Defect,
}

impl std::fmt::Display for TextureVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Good => write!(f, "GOOD"),
            Self::Defect => write!(f, "DEFECT"),
        }
    }
}

/// Texture portion of the feature vector, order fixed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TextureFeatures {
    /// Co-occurrence contrast.
    pub contrast: f64,
    /// Co-occurrence correlation.
    pub correlation: f64,
    /// Co-occurrence energy.
    pub energy: f64,
    /// Co-occurrence homogeneity.
    pub homogeneity: f64,
    /// Weighted defect-probability score, in `[0, 1]`.
    pub defect_probability: f64,
}

impl TextureFeatures {
    /// `[contrast, correlation, energy, homogeneity, defect_probability]`.
    #[must_use]
    pub fn to_array(&self) -> [f64; 5] {
        [
            self.contrast,
            self.correlation,
            self.energy,
            self.homogeneity,
            self.defect_probability,
        ]
    }
}

/// Computes co-occurrence descriptors, the defect-probability score and
/// local micro-pattern histograms.
#[derive(Debug, Clone)]
pub struct TextureAnalyzer {
    /// Sampling radius for the micro-pattern histogram.
    pub lbp_radius: f32,
    /// Number of circular sample points for the micro-pattern histogram.
    pub lbp_points: usize,
}

impl Default for TextureAnalyzer {
    fn default() -> Self {
        Self {
            lbp_radius: 3.0,
            lbp_points: 24,
        }
    }
}

impl TextureAnalyzer {
    /// Compute orientation-averaged co-occurrence descriptors.
    #[must_use]
    pub fn haralick(&self, gray: &GrayImage) -> HaralickFeatures {
        let mut sum = HaralickFeatures::default();
        for &(dx, dy) in &GLCM_OFFSETS {
            let d = glcm_descriptors(gray, dx, dy);
            sum.contrast += d.contrast;
            sum.correlation += d.correlation;
            sum.energy += d.energy;
            sum.homogeneity += d.homogeneity;
        }
        let dirs = GLCM_OFFSETS.len() as f64;
        HaralickFeatures {
            contrast: sum.contrast / dirs,
            correlation: sum.correlation / dirs,
            energy: sum.energy / dirs,
            homogeneity: sum.homogeneity / dirs,
        }
    }

    /// Analyze one image: verdict plus the texture feature block.
    #[must_use]
    pub fn analyze(&self, image: &RgbImage) -> (TextureVerdict, TextureFeatures) {
        let gray = imageops::grayscale(image);
        let h = self.haralick(&gray);
        let defect_probability = self.defect_probability(&h);

        let verdict = if defect_probability > 0.5 {
            TextureVerdict::Defect
        } else {
            TextureVerdict::Good
        };

        (
            verdict,
            TextureFeatures {
                contrast: h.contrast,
                correlation: h.correlation,
                energy: h.energy,
                homogeneity: h.homogeneity,
                defect_probability,
            },
        )
    }

    /// Weighted defect-probability score, in `[0, 1]`.
    ///
    /// High contrast, low energy and low homogeneity all push toward
    /// defect. The weights and clamps are part of the decision contract and
    /// must not drift.
    #[must_use]
    pub fn defect_probability(&self, features: &HaralickFeatures) -> f64 {
        let contrast_score = (features.contrast / 1000.0).min(1.0);
        let energy_score = 1.0 - (features.energy * 100.0).min(1.0);
        let homogeneity_score = 1.0 - (features.homogeneity * 2.0).min(1.0);

        0.5 * contrast_score + 0.3 * energy_score + 0.2 * homogeneity_score
    }

    /// Normalized micro-pattern histogram (`lbp_points + 2` bins).
    ///
    /// Rotation-invariant uniform coding: a circular pattern with at most
    /// two 0/1 transitions maps to its popcount, everything else to the
    /// final bin. The histogram sums to ~1 for any non-degenerate input.
    #[must_use]
    pub fn lbp_histogram(&self, gray: &GrayImage) -> Vec<f64> {
        let points = self.lbp_points;
        let bins = points + 2;
        let mut hist = vec![0.0f64; bins];

        let margin = self.lbp_radius.ceil() as u32;
        let (w, h) = gray.dimensions();
        if w <= 2 * margin || h <= 2 * margin {
            return hist;
        }

        let offsets: Vec<(f32, f32)> = (0..points)
            .map(|k| {
                let angle = 2.0 * std::f32::consts::PI * k as f32 / points as f32;
                (self.lbp_radius * angle.cos(), -self.lbp_radius * angle.sin())
            })
            .collect();

        for y in margin..h - margin {
            for x in margin..w - margin {
                let center = f64::from(gray.get_pixel(x, y)[0]);

                let mut bits = vec![false; points];
                for (k, &(ox, oy)) in offsets.iter().enumerate() {
                    let sample = sample_bilinear(gray, x as f32 + ox, y as f32 + oy);
                    // Tolerance absorbs interpolation rounding on flat patches.
                    bits[k] = sample >= center - 1e-9;
                }

                let ones = bits.iter().filter(|&&b| b).count();
                let transitions = (0..points)
                    .filter(|&k| bits[k] != bits[(k + 1) % points])
                    .count();

                let code = if transitions <= 2 { ones } else { points + 1 };
                hist[code] += 1.0;
            }
        }

        let total: f64 = hist.iter().sum();
        for bin in &mut hist {
            *bin /= total + LBP_EPSILON;
        }
        hist
    }

    /// Coefficient of variation over the concatenated descriptors and
    /// micro-pattern histogram. Diagnostic only; not part of the primary
    /// defect-probability computation.
    #[must_use]
    pub fn anomaly_score(&self, image: &RgbImage) -> (f64, Vec<f64>) {
        let gray = imageops::grayscale(image);
        let mut combined = self.haralick(&gray).to_array().to_vec();
        combined.extend(self.lbp_histogram(&gray));

        let n = combined.len() as f64;
        let mean = combined.iter().sum::<f64>() / n;
        if mean.abs() < f64::EPSILON {
            return (0.0, combined);
        }
        let variance = combined.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        (variance.sqrt() / mean, combined)
    }
}

/// Descriptors of the symmetric normalized co-occurrence matrix for one
/// offset direction.
fn glcm_descriptors(gray: &GrayImage, dx: i32, dy: i32) -> HaralickFeatures {
    let (w, h) = (gray.width() as i32, gray.height() as i32);
    let mut counts = vec![0u32; GLCM_LEVELS * GLCM_LEVELS];
    let mut total = 0u64;

    for y in 0..h {
        for x in 0..w {
            let nx = x + dx;
            let ny = y + dy;
            if nx < 0 || ny < 0 || nx >= w || ny >= h {
                continue;
            }
            let a = gray.get_pixel(x as u32, y as u32)[0] as usize;
            let b = gray.get_pixel(nx as u32, ny as u32)[0] as usize;
            counts[a * GLCM_LEVELS + b] += 1;
            counts[b * GLCM_LEVELS + a] += 1;
            total += 2;
        }
    }

    if total == 0 {
        return HaralickFeatures::default();
    }
    let norm = 1.0 / total as f64;

    // Marginal mean and variance; the matrix is symmetric so row and
    // column marginals coincide.
    let mut mean = 0.0;
    let mut contrast = 0.0;
    let mut energy = 0.0;
    let mut homogeneity = 0.0;
    let mut cross = 0.0;
    let mut second_moment = 0.0;

    for i in 0..GLCM_LEVELS {
        for j in 0..GLCM_LEVELS {
            let count = counts[i * GLCM_LEVELS + j];
            if count == 0 {
                continue;
            }
            let p = f64::from(count) * norm;
            let (fi, fj) = (i as f64, j as f64);
            let diff = fi - fj;

            mean += fi * p;
            second_moment += fi * fi * p;
            cross += fi * fj * p;
            contrast += diff * diff * p;
            energy += p * p;
            homogeneity += p / (1.0 + diff * diff);
        }
    }

    let variance = second_moment - mean * mean;
    let correlation = if variance <= f64::EPSILON {
        // Degenerate distribution: every pair is identical.
        1.0
    } else {
        (cross - mean * mean) / variance
    };

    HaralickFeatures {
        contrast,
        correlation,
        energy,
        homogeneity,
    }
}

/// Bilinear sample with border clamping.
fn sample_bilinear(gray: &GrayImage, x: f32, y: f32) -> f64 {
    let (w, h) = (gray.width() as i32, gray.height() as i32);
    let clamp_get = |cx: i32, cy: i32| -> f64 {
        let cx = cx.clamp(0, w - 1) as u32;
        let cy = cy.clamp(0, h - 1) as u32;
        f64::from(gray.get_pixel(cx, cy)[0])
    };

    let x0 = x.floor();
    let y0 = y.floor();
    let fx = f64::from(x - x0);
    let fy = f64::from(y - y0);
    let (x0, y0) = (x0 as i32, y0 as i32);

    let top = clamp_get(x0, y0) * (1.0 - fx) + clamp_get(x0 + 1, y0) * fx;
    let bottom = clamp_get(x0, y0 + 1) * (1.0 - fx) + clamp_get(x0 + 1, y0 + 1) * fx;
    top * (1.0 - fy) + bottom * fy
}
