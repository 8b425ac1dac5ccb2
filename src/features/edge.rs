//! Edge-based defect detection: cracks, scratches and other structural
//! discontinuities.
//!
//! The primary signal is a cleaned binary edge mask reduced to a single
//! `edge_density` scalar. Raw Canny output is fragmented along thin cracks,
//! so the mask is dilated and morphologically closed to bridge small gaps
//! into continuous defect regions without full contour fitting.

use image::{GrayImage, Rgb, RgbImage, imageops};
use imageproc::contours::find_contours;
use imageproc::distance_transform::Norm;
use imageproc::drawing::draw_line_segment_mut;
use imageproc::edges::canny;
use imageproc::hough::{LineDetectionOptions, detect_lines};
use imageproc::morphology::{close, dilate};

/// Default lower Canny hysteresis threshold.
pub const DEFAULT_LOW_THRESHOLD: f32 = 50.0;

/// Default upper Canny hysteresis threshold.
pub const DEFAULT_HIGH_THRESHOLD: f32 = 150.0;

/// Overlay color for diagnostic renderings.
const HIGHLIGHT: Rgb<u8> = Rgb([255, 0, 0]);

/// A detected linear defect in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSegment {
    /// Segment start.
    pub start: (f32, f32),
    /// Segment end.
    pub end: (f32, f32),
}

impl LineSegment {
    /// Euclidean length of the segment.
    #[must_use]
    pub fn length(&self) -> f32 {
        let dx = self.end.0 - self.start.0;
        let dy = self.end.1 - self.start.1;
        dx.hypot(dy)
    }
}

/// Parameters for the diagnostic line-segment detector.
#[derive(Debug, Clone, Copy)]
pub struct HoughParams {
    /// Minimum accumulator votes for a candidate line.
    pub vote_threshold: u32,
    /// Non-maximum suppression radius in accumulator space.
    pub suppression_radius: u32,
    /// Minimum segment length in pixels.
    pub min_length: f32,
    /// Maximum gap bridged within one segment, in pixels.
    pub max_gap: f32,
}

impl Default for HoughParams {
    fn default() -> Self {
        Self {
            vote_threshold: 50,
            suppression_radius: 8,
            min_length: 50.0,
            max_gap: 10.0,
        }
    }
}

/// Detects crack-like structural discontinuities.
#[derive(Debug, Clone)]
pub struct EdgeDetector {
    /// Lower Canny hysteresis threshold.
    pub low_threshold: f32,
    /// Upper Canny hysteresis threshold.
    pub high_threshold: f32,
    /// Line-segment detector parameters.
    pub hough: HoughParams,
}

impl Default for EdgeDetector {
    fn default() -> Self {
        Self {
            low_threshold: DEFAULT_LOW_THRESHOLD,
            high_threshold: DEFAULT_HIGH_THRESHOLD,
            hough: HoughParams::default(),
        }
    }
}

impl EdgeDetector {
    /// Produce a binary crack mask with the same dimensions as the input.
    ///
    /// Grayscale reduction, Canny with the configured hysteresis
    /// thresholds, then a 3x3 dilation and a 3x3 morphological close to
    /// merge fragmented edge responses along thin cracks.
    #[must_use]
    pub fn detect(&self, image: &RgbImage) -> GrayImage {
        if image.width() == 0 || image.height() == 0 {
            return GrayImage::new(0, 0);
        }

        let gray = imageops::grayscale(image);
        let edges = canny(&gray, self.low_threshold, self.high_threshold);
        let dilated = dilate(&edges, Norm::LInf, 1);
        close(&dilated, Norm::LInf, 1)
    }

    /// Fraction of mask pixels flagged as edges, always in `[0, 1]`.
    #[must_use]
    pub fn edge_density(&self, mask: &GrayImage) -> f64 {
        let total = u64::from(mask.width()) * u64::from(mask.height());
        if total == 0 {
            return 0.0;
        }
        let set = mask.pixels().filter(|p| p[0] != 0).count() as f64;
        set / total as f64
    }

    /// Laplacian-based crack response over the blurred luminance.
    ///
    /// Marks pixels with a strictly positive Laplacian response; a coarser
    /// alternative to [`EdgeDetector::detect`] that favors blob-like
    /// intensity discontinuities over thin gradients.
    #[must_use]
    pub fn detect_log(&self, image: &RgbImage) -> GrayImage {
        if image.width() == 0 || image.height() == 0 {
            return GrayImage::new(0, 0);
        }

        let gray = imageops::grayscale(image);
        let blurred = imageproc::filter::gaussian_blur_f32(&gray, 1.1);
        let laplacian = imageproc::filter::laplacian_filter(&blurred);

        let mut mask = GrayImage::new(gray.width(), gray.height());
        for (src, dst) in laplacian.pixels().zip(mask.pixels_mut()) {
            dst[0] = if src[0] > 0 { 255 } else { 0 };
        }
        mask
    }

    /// Detect linear defects as finite segments.
    ///
    /// Candidate directions come from a polar Hough transform over the
    /// crack mask; each candidate line is then walked across the mask and
    /// split into runs, bridging gaps up to `max_gap` and keeping runs of
    /// at least `min_length`.
    #[must_use]
    pub fn detect_line_segments(&self, image: &RgbImage) -> Vec<LineSegment> {
        let mask = self.detect(image);
        if mask.width() == 0 || mask.height() == 0 {
            return Vec::new();
        }

        let options = LineDetectionOptions {
            vote_threshold: self.hough.vote_threshold,
            suppression_radius: self.hough.suppression_radius,
        };

        let mut segments = Vec::new();
        for line in detect_lines(&mask, options) {
            let theta = (line.angle_in_degrees as f32).to_radians();
            let (sin, cos) = theta.sin_cos();
            // Closest point to the origin; the line direction is its normal
            // rotated by 90 degrees.
            let origin = (line.r * cos, line.r * sin);
            let dir = (-sin, cos);
            self.walk_line(&mask, origin, dir, &mut segments);
        }
        segments
    }

    /// Split one infinite line into mask-supported segments.
    fn walk_line(
        &self,
        mask: &GrayImage,
        origin: (f32, f32),
        dir: (f32, f32),
        out: &mut Vec<LineSegment>,
    ) {
        let (w, h) = (mask.width() as f32, mask.height() as f32);
        let reach = w.hypot(h).ceil() as i32;

        let mut run_start: Option<(f32, f32)> = None;
        let mut run_end = (0.0, 0.0);
        let mut gap = 0.0f32;

        for t in -reach..=reach {
            let x = origin.0 + t as f32 * dir.0;
            let y = origin.1 + t as f32 * dir.1;
            let on = x >= 0.0
                && y >= 0.0
                && x < w
                && y < h
                && mask.get_pixel(x as u32, y as u32)[0] != 0;

            if on {
                if run_start.is_none() {
                    run_start = Some((x, y));
                }
                run_end = (x, y);
                gap = 0.0;
            } else if let Some(start) = run_start {
                gap += 1.0;
                if gap > self.hough.max_gap {
                    let segment = LineSegment { start, end: run_end };
                    if segment.length() >= self.hough.min_length {
                        out.push(segment);
                    }
                    run_start = None;
                }
            }
        }

        if let Some(start) = run_start {
            let segment = LineSegment { start, end: run_end };
            if segment.length() >= self.hough.min_length {
                out.push(segment);
            }
        }
    }

    /// Render detected line segments over the original image.
    #[must_use]
    pub fn draw_line_segments(&self, image: &RgbImage, segments: &[LineSegment]) -> RgbImage {
        let mut canvas = image.clone();
        for segment in segments {
            draw_line_segment_mut(&mut canvas, segment.start, segment.end, HIGHLIGHT);
            // Second pass one pixel down keeps thin diagonals visible.
            draw_line_segment_mut(
                &mut canvas,
                (segment.start.0, segment.start.1 + 1.0),
                (segment.end.0, segment.end.1 + 1.0),
                HIGHLIGHT,
            );
        }
        canvas
    }

    /// Outline connected defect regions of a crack mask on the original.
    #[must_use]
    pub fn highlight_regions(&self, image: &RgbImage, mask: &GrayImage) -> RgbImage {
        let mut canvas = image.clone();
        if mask.width() == 0 || mask.height() == 0 {
            return canvas;
        }

        for contour in find_contours::<i32>(mask) {
            let points = &contour.points;
            if points.len() < 2 {
                continue;
            }
            for pair in points.windows(2) {
                draw_line_segment_mut(
                    &mut canvas,
                    (pair[0].x as f32, pair[0].y as f32),
                    (pair[1].x as f32, pair[1].y as f32),
                    HIGHLIGHT,
                );
            }
            let first = points[0];
            let last = points[points.len() - 1];
            draw_line_segment_mut(
                &mut canvas,
                (last.x as f32, last.y as f32),
                (first.x as f32, first.y as f32),
                HIGHLIGHT,
            );
        }
        canvas
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// White field with a dark vertical bar, a crack stand-in.
    fn cracked_image(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, _| {
            if (width / 2..width / 2 + 2).contains(&x) {
                Rgb([10, 10, 10])
            } else {
                Rgb([240, 240, 240])
            }
        })
    }

    #[test]
    fn detect_preserves_dimensions_and_is_binary() {
        let detector = EdgeDetector::default();
        let mask = detector.detect(&cracked_image(120, 100));
        assert_eq!(mask.dimensions(), (120, 100));
        assert!(mask.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }

    #[test]
    fn edge_density_is_bounded() {
        let detector = EdgeDetector::default();

        let blank = GrayImage::new(50, 50);
        assert_eq!(detector.edge_density(&blank), 0.0);

        let full = GrayImage::from_pixel(50, 50, image::Luma([255]));
        assert_eq!(detector.edge_density(&full), 1.0);

        let mask = detector.detect(&cracked_image(120, 100));
        let density = detector.edge_density(&mask);
        assert!(density > 0.0);
        assert!(density <= 1.0);
    }

    #[test]
    fn uniform_image_has_no_edges() {
        let detector = EdgeDetector::default();
        let mask = detector.detect(&RgbImage::from_pixel(80, 80, Rgb([128, 128, 128])));
        assert_eq!(detector.edge_density(&mask), 0.0);
    }

    #[test]
    fn vertical_crack_yields_long_segments() {
        let detector = EdgeDetector::default();
        let segments = detector.detect_line_segments(&cracked_image(160, 160));
        assert!(!segments.is_empty());
        for segment in &segments {
            assert!(segment.length() >= detector.hough.min_length);
        }
    }

    #[test]
    fn empty_input_short_circuits() {
        let detector = EdgeDetector::default();
        let mask = detector.detect(&RgbImage::new(0, 0));
        assert_eq!(mask.dimensions(), (0, 0));
        assert!(detector.detect_line_segments(&RgbImage::new(0, 0)).is_empty());
    }

    #[test]
    fn highlight_regions_keeps_canvas_size() {
        let detector = EdgeDetector::default();
        let img = cracked_image(90, 70);
        let mask = detector.detect(&img);
        let overlay = detector.highlight_regions(&img, &mask);
        assert_eq!(overlay.dimensions(), img.dimensions());
    }
}
