//! Color-space consistency and color-band defect localization.
//!
//! Color variation is a secondary defect signal, independent of the
//! structural (edge) and statistical (texture) channels: stains and
//! discoloration change chrominance statistics long before they change
//! edge density.

use image::{GrayImage, RgbImage};
use palette::{Hsv, IntoColor, Lab, Srgb};
use serde::{Deserialize, Serialize};

/// Per-channel spread of the image in CIE Lab.
///
/// Channel standard deviations are computed over unit-normalized channels
/// (`L/100`, `(a+128)/255`, `(b+128)/255`), which bounds each std by 0.5
/// and `variation` by 1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ColorConsistency {
    /// Mean of the three channel standard deviations, in `[0, 1]`.
    pub variation: f64,
    /// Standard deviation of the L channel.
    pub std_l: f64,
    /// Standard deviation of the a channel.
    pub std_a: f64,
    /// Standard deviation of the b channel.
    pub std_b: f64,
}

impl ColorConsistency {
    /// `[variation, std_l, std_a, std_b]`, the extended-layout order.
    #[must_use]
    pub fn to_array(&self) -> [f64; 4] {
        [self.variation, self.std_l, self.std_a, self.std_b]
    }
}

/// A named HSV range associated with a known defect appearance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColorBand {
    /// Band name, e.g. `rust`.
    pub name: String,
    /// Hue range in degrees, `0..=360`.
    pub hue: (f32, f32),
    /// Saturation range, `0..=1`.
    pub saturation: (f32, f32),
    /// Value range, `0..=1`.
    pub value: (f32, f32),
}

impl ColorBand {
    fn contains(&self, hue: f32, saturation: f32, value: f32) -> bool {
        (self.hue.0..=self.hue.1).contains(&hue)
            && (self.saturation.0..=self.saturation.1).contains(&saturation)
            && (self.value.0..=self.value.1).contains(&value)
    }
}

/// Mask and coverage of one color band over one image.
#[derive(Debug, Clone)]
pub struct BandMatch {
    /// Band name.
    pub name: String,
    /// Binary mask of matching pixels.
    pub mask: GrayImage,
    /// Number of matching pixels.
    pub pixel_count: u64,
    /// Matching pixels as a fraction of the image area.
    pub fraction: f64,
}

/// Measures color consistency and localizes colored defect regions.
#[derive(Debug, Clone)]
pub struct ColorAnalyzer {
    /// Defect color bands checked by [`ColorAnalyzer::detect_color_defects`].
    pub bands: Vec<ColorBand>,
}

impl Default for ColorAnalyzer {
    fn default() -> Self {
        Self {
            bands: vec![
                // Oxidation: warm hues, saturated enough to not be gray.
                ColorBand {
                    name: "rust".into(),
                    hue: (0.0, 40.0),
                    saturation: (0.2, 1.0),
                    value: (0.2, 1.0),
                },
                // Dark desaturated patches.
                ColorBand {
                    name: "discoloration".into(),
                    hue: (0.0, 360.0),
                    saturation: (0.0, 0.2),
                    value: (0.0, 0.59),
                },
                // Light desaturated patches.
                ColorBand {
                    name: "stain".into(),
                    hue: (0.0, 360.0),
                    saturation: (0.0, 0.2),
                    value: (0.39, 0.78),
                },
            ],
        }
    }
}

impl ColorAnalyzer {
    /// Per-channel Lab standard deviations and their mean.
    ///
    /// High variation signals non-uniform coloring across the part.
    #[must_use]
    pub fn consistency(&self, image: &RgbImage) -> ColorConsistency {
        let n = (image.width() * image.height()) as f64;
        if n == 0.0 {
            return ColorConsistency::default();
        }

        let mut channels = [Vec::new(), Vec::new(), Vec::new()];
        for px in image.pixels() {
            let lab: Lab = Srgb::new(
                f32::from(px[0]) / 255.0,
                f32::from(px[1]) / 255.0,
                f32::from(px[2]) / 255.0,
            )
            .into_color();
            channels[0].push(f64::from(lab.l) / 100.0);
            channels[1].push((f64::from(lab.a) + 128.0) / 255.0);
            channels[2].push((f64::from(lab.b) + 128.0) / 255.0);
        }

        let std_l = std_dev(&channels[0]);
        let std_a = std_dev(&channels[1]);
        let std_b = std_dev(&channels[2]);

        ColorConsistency {
            variation: (std_l + std_a + std_b) / 3.0,
            std_l,
            std_a,
            std_b,
        }
    }

    /// Mask every configured defect band and report coverage.
    ///
    /// The total fraction sums band coverage and can exceed the area
    /// fraction of any single band when bands overlap.
    #[must_use]
    pub fn detect_color_defects(&self, image: &RgbImage) -> (Vec<BandMatch>, f64) {
        let (width, height) = image.dimensions();
        let total_pixels = u64::from(width) * u64::from(height);
        if total_pixels == 0 {
            return (Vec::new(), 0.0);
        }

        let hsv: Vec<(f32, f32, f32)> = image
            .pixels()
            .map(|px| {
                let hsv: Hsv = Srgb::new(
                    f32::from(px[0]) / 255.0,
                    f32::from(px[1]) / 255.0,
                    f32::from(px[2]) / 255.0,
                )
                .into_color();
                (
                    hsv.hue.into_positive_degrees(),
                    hsv.saturation,
                    hsv.value,
                )
            })
            .collect();

        let mut matches = Vec::with_capacity(self.bands.len());
        let mut defect_pixels = 0u64;

        for band in &self.bands {
            let mut mask = GrayImage::new(width, height);
            let mut count = 0u64;
            for (px, &(h, s, v)) in mask.pixels_mut().zip(&hsv) {
                if band.contains(h, s, v) {
                    px[0] = 255;
                    count += 1;
                }
            }
            defect_pixels += count;
            matches.push(BandMatch {
                name: band.name.clone(),
                mask,
                pixel_count: count,
                fraction: count as f64 / total_pixels as f64,
            });
        }

        (matches, defect_pixels as f64 / total_pixels as f64)
    }

    /// Mask pixels whose color deviates from a reference.
    ///
    /// The reference defaults to the image mean. Per-pixel Euclidean
    /// distance in RGB is max-normalized and thresholded at 0.3; a
    /// perfectly uniform image yields an empty mask.
    #[must_use]
    pub fn detect_discoloration(
        &self,
        image: &RgbImage,
        reference: Option<[f64; 3]>,
    ) -> (GrayImage, f64) {
        let (width, height) = image.dimensions();
        let total = u64::from(width) * u64::from(height);
        if total == 0 {
            return (GrayImage::new(0, 0), 0.0);
        }

        let reference = reference.unwrap_or_else(|| {
            let mut sum = [0.0f64; 3];
            for px in image.pixels() {
                sum[0] += f64::from(px[0]);
                sum[1] += f64::from(px[1]);
                sum[2] += f64::from(px[2]);
            }
            [
                sum[0] / total as f64,
                sum[1] / total as f64,
                sum[2] / total as f64,
            ]
        });

        let distances: Vec<f64> = image
            .pixels()
            .map(|px| {
                let dr = f64::from(px[0]) - reference[0];
                let dg = f64::from(px[1]) - reference[1];
                let db = f64::from(px[2]) - reference[2];
                (dr * dr + dg * dg + db * db).sqrt()
            })
            .collect();

        let max = distances.iter().copied().fold(0.0f64, f64::max);
        let mut mask = GrayImage::new(width, height);
        let mut count = 0u64;
        if max > 0.0 {
            for (px, &d) in mask.pixels_mut().zip(&distances) {
                if d / max > 0.3 {
                    px[0] = 255;
                    count += 1;
                }
            }
        }

        (mask, count as f64 / total as f64)
    }
}

/// Population standard deviation.
fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn uniform_image_has_no_variation() {
        let analyzer = ColorAnalyzer::default();
        let img = RgbImage::from_pixel(40, 40, Rgb([90, 140, 200]));
        let c = analyzer.consistency(&img);
        assert!(c.variation < 1e-6);
        assert!(c.std_l < 1e-6);
    }

    #[test]
    fn two_tone_image_variation_is_bounded() {
        let analyzer = ColorAnalyzer::default();
        let img = RgbImage::from_fn(40, 40, |x, _| {
            if x < 20 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        });
        let c = analyzer.consistency(&img);
        assert!(c.variation > 0.05);
        assert!(c.variation <= 1.0);
        assert!(c.std_l <= 0.5);
    }

    #[test]
    fn rust_band_catches_oxide_tones() {
        let analyzer = ColorAnalyzer::default();
        let img = RgbImage::from_pixel(20, 20, Rgb([180, 70, 20]));
        let (matches, _) = analyzer.detect_color_defects(&img);
        let rust = matches.iter().find(|m| m.name == "rust").unwrap();
        assert!((rust.fraction - 1.0).abs() < 1e-9);
        assert_eq!(rust.pixel_count, 400);
    }

    #[test]
    fn dark_gray_lands_in_discoloration_band() {
        let analyzer = ColorAnalyzer::default();
        let img = RgbImage::from_pixel(10, 10, Rgb([40, 40, 40]));
        let (matches, total) = analyzer.detect_color_defects(&img);
        let dark = matches.iter().find(|m| m.name == "discoloration").unwrap();
        assert!((dark.fraction - 1.0).abs() < 1e-9);
        assert!(total >= 1.0);
    }

    #[test]
    fn clean_saturated_surface_matches_no_band() {
        let analyzer = ColorAnalyzer::default();
        // Saturated mid-green: hue ~120, well outside every default band.
        let img = RgbImage::from_pixel(10, 10, Rgb([30, 200, 40]));
        let (_, total) = analyzer.detect_color_defects(&img);
        assert_eq!(total, 0.0);
    }

    #[test]
    fn discoloration_flags_outlier_half() {
        let analyzer = ColorAnalyzer::default();
        let img = RgbImage::from_fn(40, 40, |x, _| {
            if x < 20 {
                Rgb([250, 40, 40])
            } else {
                Rgb([40, 40, 250])
            }
        });
        let (mask, fraction) = analyzer.detect_discoloration(&img, None);
        assert_eq!(mask.dimensions(), (40, 40));
        assert!(fraction > 0.9);
    }

    #[test]
    fn discoloration_of_uniform_image_is_empty() {
        let analyzer = ColorAnalyzer::default();
        let img = RgbImage::from_pixel(16, 16, Rgb([120, 120, 120]));
        let (_, fraction) = analyzer.detect_discoloration(&img, None);
        assert_eq!(fraction, 0.0);
    }

    #[test]
    fn explicit_reference_is_honored() {
        let analyzer = ColorAnalyzer::default();
        let img = RgbImage::from_pixel(16, 16, Rgb([200, 50, 50]));
        // Far-away reference: every pixel is an outlier.
        let (_, fraction) = analyzer.detect_discoloration(&img, Some([0.0, 0.0, 255.0]));
        assert!((fraction - 1.0).abs() < 1e-9);
    }
}
