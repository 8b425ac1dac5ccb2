//! Feature extraction stages and the assembled feature vector.
//!
//! The extractors are independent and order-insensitive; what is NOT
//! order-insensitive is the assembled vector itself. Training-time and
//! inference-time vectors must use the same layout, so every vector is
//! tagged with the named [`FeatureLayout`] it was assembled under and the
//! classifier validates the layout arity at its boundary instead of
//! silently mispredicting.

pub mod color;
pub mod edge;
pub mod texture;

pub use color::{BandMatch, ColorAnalyzer, ColorBand, ColorConsistency};
pub use edge::{EdgeDetector, HoughParams, LineSegment};
pub use texture::{HaralickFeatures, TextureAnalyzer, TextureFeatures, TextureVerdict};

use serde::{Deserialize, Serialize};

/// Field names of the core layout.
const CORE_NAMES: [&str; 6] = [
    "edge_density",
    "texture_contrast",
    "texture_correlation",
    "texture_energy",
    "texture_homogeneity",
    "texture_defect_probability",
];

/// Field names of the extended layout.
const EXTENDED_NAMES: [&str; 10] = [
    "edge_density",
    "texture_contrast",
    "texture_correlation",
    "texture_energy",
    "texture_homogeneity",
    "texture_defect_probability",
    "color_variation",
    "color_std_l",
    "color_std_a",
    "color_std_b",
];

/// Named, fixed-order schema of an assembled feature vector.
///
/// `Core` is the layout of the live inspection path; `Extended` appends the
/// color-consistency block. A classifier records the layout it was trained
/// on and rejects vectors of any other arity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureLayout {
    /// `[edge_density, contrast, correlation, energy, homogeneity,
    /// defect_probability]`.
    Core,
    /// Core plus `[color_variation, color_std_l, color_std_a,
    /// color_std_b]`.
    Extended,
}

impl FeatureLayout {
    /// Field names, in vector order.
    #[must_use]
    pub fn names(self) -> &'static [&'static str] {
        match self {
            Self::Core => &CORE_NAMES,
            Self::Extended => &EXTENDED_NAMES,
        }
    }

    /// Number of values a vector of this layout carries.
    #[must_use]
    pub fn arity(self) -> usize {
        self.names().len()
    }
}

impl std::fmt::Display for FeatureLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Core => write!(f, "core"),
            Self::Extended => write!(f, "extended"),
        }
    }
}

/// An assembled, ordered feature vector tagged with its layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    layout: FeatureLayout,
    values: Vec<f64>,
}

impl FeatureVector {
    /// Assemble the core layout: edge density plus the texture block.
    #[must_use]
    pub fn core(edge_density: f64, texture: &TextureFeatures) -> Self {
        let mut values = Vec::with_capacity(FeatureLayout::Core.arity());
        values.push(edge_density);
        values.extend(texture.to_array());
        Self {
            layout: FeatureLayout::Core,
            values,
        }
    }

    /// Assemble the extended layout: core plus the color-consistency block.
    #[must_use]
    pub fn extended(
        edge_density: f64,
        texture: &TextureFeatures,
        color: &ColorConsistency,
    ) -> Self {
        let mut values = Vec::with_capacity(FeatureLayout::Extended.arity());
        values.push(edge_density);
        values.extend(texture.to_array());
        values.extend(color.to_array());
        Self {
            layout: FeatureLayout::Extended,
            values,
        }
    }

    /// The layout this vector was assembled under.
    #[must_use]
    pub fn layout(&self) -> FeatureLayout {
        self.layout
    }

    /// The ordered values.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Consume the vector, returning the ordered values.
    #[must_use]
    pub fn into_values(self) -> Vec<f64> {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texture_block() -> TextureFeatures {
        TextureFeatures {
            contrast: 120.0,
            correlation: 0.8,
            energy: 0.02,
            homogeneity: 0.4,
            defect_probability: 0.31,
        }
    }

    #[test]
    fn core_vector_matches_layout_arity_and_order() {
        let v = FeatureVector::core(0.12, &texture_block());
        assert_eq!(v.layout(), FeatureLayout::Core);
        assert_eq!(v.values().len(), FeatureLayout::Core.arity());
        assert_eq!(v.values()[0], 0.12);
        assert_eq!(v.values()[1], 120.0);
        assert_eq!(v.values()[5], 0.31);
    }

    #[test]
    fn extended_vector_appends_color_block() {
        let color = ColorConsistency {
            variation: 0.2,
            std_l: 0.1,
            std_a: 0.25,
            std_b: 0.25,
        };
        let v = FeatureVector::extended(0.5, &texture_block(), &color);
        assert_eq!(v.layout(), FeatureLayout::Extended);
        assert_eq!(v.values().len(), FeatureLayout::Extended.arity());
        assert_eq!(v.values()[6], 0.2);
        assert_eq!(v.values()[9], 0.25);
    }

    #[test]
    fn layout_names_align_with_arity() {
        assert_eq!(FeatureLayout::Core.names().len(), FeatureLayout::Core.arity());
        assert_eq!(
            FeatureLayout::Extended.names().len(),
            FeatureLayout::Extended.arity()
        );
        // The extended layout is a strict prefix extension of the core one.
        assert_eq!(
            &FeatureLayout::Extended.names()[..FeatureLayout::Core.arity()],
            FeatureLayout::Core.names()
        );
    }
}
