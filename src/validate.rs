//! Input validation ahead of the inspection pipeline.

use std::path::Path;

/// File extensions accepted as inspection input.
pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Minimum image width for a meaningful inspection.
pub const MIN_IMAGE_WIDTH: u32 = 100;

/// Minimum image height for a meaningful inspection.
pub const MIN_IMAGE_HEIGHT: u32 = 100;

/// Whether a file name carries a supported image extension.
#[must_use]
pub fn valid_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

/// Whether a product id is well-formed: 1 to 50 characters, uppercase
/// alphanumeric plus underscore and dash.
#[must_use]
pub fn valid_product_id(product_id: &str) -> bool {
    !product_id.is_empty()
        && product_id.len() <= 50
        && product_id
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

/// Whether a confidence score sits in the unit interval.
#[must_use]
pub fn valid_confidence(confidence: f64) -> bool {
    (0.0..=1.0).contains(&confidence)
}

/// Whether an image is large enough to inspect.
#[must_use]
pub fn valid_dimensions(width: u32, height: u32) -> bool {
    width >= MIN_IMAGE_WIDTH && height >= MIN_IMAGE_HEIGHT
}
