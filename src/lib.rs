//! # defect-scan
//!
//! Surface defect inspection and severity classification library.
//!
//! An image of a manufactured part goes through a fixed pipeline: the
//! [`preprocess::Preprocessor`] canonicalizes it, the edge, texture and
//! color extractors reduce it to named scalar signals, the feature
//! assembler packs those into an ordered vector, and the
//! [`classify::SeverityClassifier`] turns the vector into a
//! `(tier, confidence)` decision - through a trained statistical model when
//! one is loaded, through a deterministic rule-based fallback otherwise.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use defect_scan::{InspectionConfig, InspectionSession};
//!
//! let config = InspectionConfig::builder()
//!     .model_path("models/severity.json")
//!     .report_dir("./reports")
//!     .build();
//!
//! let session = InspectionSession::new(config);
//! let report = session.inspect_file("PART-001", "captures/part-001.png".as_ref())?;
//!
//! println!(
//!     "{}: {} ({:.0}%)",
//!     report.product_id,
//!     report.classification.tier,
//!     report.classification.confidence * 100.0
//! );
//! ```
//!
//! ## Modules
//!
//! - [`error`]: Error types for the library
//! - [`preprocess`]: Image canonicalization (resize, denoise, CLAHE)
//! - [`features`]: Edge, texture and color extractors plus the feature
//!   vector schemas
//! - [`classify`]: Severity tiers, rule-based fallback, trained model and
//!   artifact persistence
//! - [`inspect`]: Inspection session orchestrating the full pipeline
//! - [`storage`]: Defect record store contract and JSONL implementation
//! - [`alert`]: Alert policy and notification sinks
//! - [`validate`]: Input validation helpers

pub mod alert;
pub mod classify;
pub mod error;
pub mod features;
pub mod inspect;
pub mod preprocess;
pub mod storage;
pub mod validate;

// Re-export commonly used types
pub use alert::{AlertPolicy, AlertSink, JsonlAlertLog, LogSink};
pub use classify::{
    Classification, DefectTier, SeverityClassifier, TrainedModel, rule_based,
};
pub use error::{Error, Result};
pub use features::{
    ColorAnalyzer, ColorConsistency, EdgeDetector, FeatureLayout, FeatureVector, LineSegment,
    TextureAnalyzer, TextureFeatures, TextureVerdict,
};
pub use inspect::{InspectionConfig, InspectionReport, InspectionSession};
pub use preprocess::{CANONICAL_HEIGHT, CANONICAL_WIDTH, Preprocessor};
pub use storage::{DefectRecord, DefectStats, DefectStore, JsonlStore};
