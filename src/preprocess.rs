//! Image canonicalization ahead of feature extraction.
//!
//! Every inspected capture is reduced to the same canonical form so that the
//! downstream extractors see a consistent pixel grid: fixed resolution,
//! luminance-only content, denoised, locally contrast-enhanced. Each stage
//! takes a reference and returns a new owned buffer; no stage mutates its
//! input, so stages compose and test in isolation.

use image::{GrayImage, Rgb, RgbImage, imageops};
use palette::{Clamp, IntoColor, Lab, Srgb};

/// Canonical width every inspected image is resampled to.
pub const CANONICAL_WIDTH: u32 = 800;

/// Canonical height every inspected image is resampled to.
pub const CANONICAL_HEIGHT: u32 = 600;

/// Normalizes a raw capture into the canonical form the extractors expect.
///
/// The stage order is fixed: resize, luminance flattening, Gaussian denoise,
/// CLAHE contrast enhancement. Denoising must precede enhancement because
/// the enhancement step amplifies whatever noise survives it.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    /// Width after resampling.
    pub target_width: u32,
    /// Height after resampling.
    pub target_height: u32,
    /// Gaussian sigma for the denoise stage. 1.1 is the 5x5-kernel
    /// equivalent.
    pub blur_sigma: f32,
    /// CLAHE clip limit, relative to a uniform histogram.
    pub clip_limit: f32,
    /// CLAHE tile grid size (tiles per axis).
    pub tile_grid: u32,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self {
            target_width: CANONICAL_WIDTH,
            target_height: CANONICAL_HEIGHT,
            blur_sigma: 1.1,
            clip_limit: 2.0,
            tile_grid: 8,
        }
    }
}

impl Preprocessor {
    /// Run the full canonicalization pipeline.
    ///
    /// A zero-dimension input short-circuits to an empty image; there is no
    /// other failure path, every stage is a pure function over a fixed-size
    /// buffer.
    #[must_use]
    pub fn preprocess(&self, image: &RgbImage) -> RgbImage {
        if image.width() == 0 || image.height() == 0 {
            return RgbImage::new(0, 0);
        }

        let resized = self.resize(image);
        let flattened = self.flatten_luminance(&resized);
        let denoised = self.denoise(&flattened);
        self.enhance_contrast(&denoised)
    }

    /// Resample to the canonical grid, ignoring the original aspect ratio.
    ///
    /// Downstream features are pixel-density based and need the same grid
    /// size across all inspected parts.
    #[must_use]
    pub fn resize(&self, image: &RgbImage) -> RgbImage {
        imageops::resize(
            image,
            self.target_width,
            self.target_height,
            imageops::FilterType::Triangle,
        )
    }

    /// Reduce to luminance and re-expand to three identical channels.
    ///
    /// The structural detectors key on luminance, not raw color; keeping
    /// three channels preserves the buffer shape the rest of the pipeline
    /// expects.
    #[must_use]
    pub fn flatten_luminance(&self, image: &RgbImage) -> RgbImage {
        let gray = imageops::grayscale(image);
        gray_to_rgb(&gray)
    }

    /// Suppress sensor noise with a Gaussian blur.
    #[must_use]
    pub fn denoise(&self, image: &RgbImage) -> RgbImage {
        imageproc::filter::gaussian_blur_f32(image, self.blur_sigma)
    }

    /// Locally-adaptive contrast enhancement (CLAHE) on the L channel of
    /// CIE Lab, recomposed with untouched chrominance.
    #[must_use]
    pub fn enhance_contrast(&self, image: &RgbImage) -> RgbImage {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return image.clone();
        }

        let n = (width * height) as usize;
        let mut l_plane = vec![0u8; n];
        let mut chroma = vec![(0.0f32, 0.0f32); n];

        for (i, px) in image.pixels().enumerate() {
            let srgb = Srgb::new(
                f32::from(px[0]) / 255.0,
                f32::from(px[1]) / 255.0,
                f32::from(px[2]) / 255.0,
            );
            let lab: Lab = srgb.into_color();
            l_plane[i] = (lab.l / 100.0 * 255.0).round().clamp(0.0, 255.0) as u8;
            chroma[i] = (lab.a, lab.b);
        }

        let enhanced = clahe_plane(&l_plane, width, height, self.tile_grid, self.clip_limit);

        let mut out = RgbImage::new(width, height);
        for (i, px) in out.pixels_mut().enumerate() {
            let l = f32::from(enhanced[i]) / 255.0 * 100.0;
            let (a, b) = chroma[i];
            let srgb: Srgb = Lab::new(l, a, b).into_color();
            let srgb = srgb.clamp();
            *px = Rgb([
                (srgb.red * 255.0).round() as u8,
                (srgb.green * 255.0).round() as u8,
                (srgb.blue * 255.0).round() as u8,
            ]);
        }
        out
    }

    /// Flatten uneven illumination by dividing luminance through a
    /// heavily-blurred illumination model and rescaling to full range.
    #[must_use]
    pub fn normalize_illumination(&self, image: &RgbImage) -> RgbImage {
        let gray = imageops::grayscale(image);
        if gray.width() == 0 || gray.height() == 0 {
            return RgbImage::new(0, 0);
        }

        // 101x101-kernel equivalent; anything structural is gone at this
        // scale, only the lighting gradient remains.
        let model = imageproc::filter::gaussian_blur_f32(&gray, 15.5);

        let ratios: Vec<f32> = gray
            .pixels()
            .zip(model.pixels())
            .map(|(g, m)| f32::from(g[0]) / f32::from(m[0]).max(1.0))
            .collect();
        let max = ratios.iter().copied().fold(f32::MIN, f32::max).max(f32::EPSILON);

        let mut out = GrayImage::new(gray.width(), gray.height());
        for (dst, ratio) in out.pixels_mut().zip(&ratios) {
            dst[0] = (255.0 * ratio / max).round().clamp(0.0, 255.0) as u8;
        }
        gray_to_rgb(&out)
    }
}

/// Expand a single-channel image to three identical channels.
fn gray_to_rgb(gray: &GrayImage) -> RgbImage {
    let mut out = RgbImage::new(gray.width(), gray.height());
    for (src, dst) in gray.pixels().zip(out.pixels_mut()) {
        let v = src[0];
        *dst = Rgb([v, v, v]);
    }
    out
}

/// Contrast-limited adaptive histogram equalization over a single u8 plane.
///
/// Per-tile histograms are clipped at `clip_limit` times the uniform bin
/// height, the excess redistributed evenly, and each pixel is remapped by
/// bilinear interpolation between the four nearest tile mappings.
fn clahe_plane(plane: &[u8], width: u32, height: u32, grid: u32, clip_limit: f32) -> Vec<u8> {
    let grid = grid.max(1) as usize;
    let w = width as usize;
    let h = height as usize;
    let tile_w = w.div_ceil(grid).max(1);
    let tile_h = h.div_ceil(grid).max(1);
    let tiles_x = w.div_ceil(tile_w);
    let tiles_y = h.div_ceil(tile_h);

    // One 256-entry remap table per tile.
    let mut luts = vec![[0u8; 256]; tiles_x * tiles_y];
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(w);
            let y1 = (y0 + tile_h).min(h);
            let area = (x1 - x0) * (y1 - y0);

            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[plane[y * w + x] as usize] += 1;
                }
            }

            let clip = ((clip_limit * area as f32 / 256.0) as u32).max(1);
            let mut excess = 0u32;
            for bin in &mut hist {
                if *bin > clip {
                    excess += *bin - clip;
                    *bin = clip;
                }
            }
            // Redistribute the clipped mass, remainder included, so the
            // CDF still sums to the tile area.
            let bonus = excess / 256;
            for bin in &mut hist {
                *bin += bonus;
            }
            for bin in hist.iter_mut().take((excess % 256) as usize) {
                *bin += 1;
            }

            let lut = &mut luts[ty * tiles_x + tx];
            let scale = 255.0 / area as f32;
            let mut cdf = 0u32;
            for (v, bin) in hist.iter().enumerate() {
                cdf += bin;
                lut[v] = (cdf as f32 * scale).round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    // Tile-center coordinate plus blend weight, clamped at the borders so
    // edge pixels interpolate within their own tile only.
    let split = |pos: usize, tile: usize, tiles: usize| -> (usize, usize, f32) {
        let f = (pos as f32 + 0.5) / tile as f32 - 0.5;
        let i = f.floor();
        if i < 0.0 {
            (0, 0, 0.0)
        } else {
            let i0 = (i as usize).min(tiles - 1);
            let i1 = (i0 + 1).min(tiles - 1);
            (i0, i1, f - i)
        }
    };

    let mut out = vec![0u8; plane.len()];
    for y in 0..h {
        let (ty0, ty1, wy) = split(y, tile_h, tiles_y);

        for x in 0..w {
            let (tx0, tx1, wx) = split(x, tile_w, tiles_x);

            let v = plane[y * w + x] as usize;
            let tl = f32::from(luts[ty0 * tiles_x + tx0][v]);
            let tr = f32::from(luts[ty0 * tiles_x + tx1][v]);
            let bl = f32::from(luts[ty1 * tiles_x + tx0][v]);
            let br = f32::from(luts[ty1 * tiles_x + tx1][v]);

            let top = tl + (tr - tl) * wx;
            let bottom = bl + (br - bl) * wx;
            out[y * w + x] = (top + (bottom - top) * wy).round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_image(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            let v = ((x + y) % 256) as u8;
            Rgb([v, v.wrapping_add(30), v.wrapping_add(60)])
        })
    }

    #[test]
    fn preprocess_resamples_to_canonical_grid() {
        let pre = Preprocessor::default();
        let out = pre.preprocess(&gradient_image(320, 240));
        assert_eq!(out.dimensions(), (CANONICAL_WIDTH, CANONICAL_HEIGHT));
    }

    #[test]
    fn preprocess_is_idempotent_on_dimensions() {
        let pre = Preprocessor::default();
        let once = pre.preprocess(&gradient_image(1024, 768));
        let twice = pre.preprocess(&once);
        assert_eq!(once.dimensions(), twice.dimensions());
    }

    #[test]
    fn preprocess_empty_input_yields_empty_image() {
        let pre = Preprocessor::default();
        let out = pre.preprocess(&RgbImage::new(0, 0));
        assert_eq!(out.dimensions(), (0, 0));
    }

    #[test]
    fn flatten_luminance_equalizes_channels() {
        let pre = Preprocessor::default();
        let out = pre.flatten_luminance(&gradient_image(64, 48));
        for px in out.pixels() {
            assert_eq!(px[0], px[1]);
            assert_eq!(px[1], px[2]);
        }
    }

    #[test]
    fn enhance_contrast_preserves_dimensions() {
        let pre = Preprocessor::default();
        let img = gradient_image(160, 120);
        let out = pre.enhance_contrast(&img);
        assert_eq!(out.dimensions(), img.dimensions());
    }

    #[test]
    fn enhance_contrast_uniform_image_stays_near_uniform() {
        let pre = Preprocessor::default();
        let img = RgbImage::from_pixel(128, 96, Rgb([120, 120, 120]));
        let out = pre.enhance_contrast(&img);
        let first = out.get_pixel(0, 0)[0];
        for px in out.pixels() {
            assert!(i16::from(px[0]).abs_diff(i16::from(first)) <= 2);
        }
    }

    #[test]
    fn normalize_illumination_spans_full_range() {
        let pre = Preprocessor::default();
        let out = pre.normalize_illumination(&gradient_image(120, 90));
        let max = out.pixels().map(|p| p[0]).max().unwrap();
        assert_eq!(max, 255);
    }

    #[test]
    fn clahe_output_stays_in_range() {
        let plane: Vec<u8> = (0..(64 * 64)).map(|i| (i % 251) as u8).collect();
        let out = clahe_plane(&plane, 64, 64, 8, 2.0);
        assert_eq!(out.len(), plane.len());
    }
}
