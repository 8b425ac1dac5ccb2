//! Alert policy and notification sinks for severe findings.
//!
//! The policy decides; sinks deliver. The inspection core never invokes a
//! sink itself - the caller does, at most once per classification result.
//! Mail transport is out of scope; the sinks here log or append to a local
//! audit file, and anything heavier plugs in behind [`AlertSink`].

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::classify::DefectTier;
use crate::error::Result;
use crate::storage::DefectRecord;

/// Default confidence threshold above which a Major finding alerts.
pub const DEFAULT_ALERT_THRESHOLD: f64 = 0.7;

/// Decides which findings warrant a notification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AlertPolicy {
    /// Confidence above which a Major defect alerts. Critical defects
    /// always alert.
    pub threshold: f64,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_ALERT_THRESHOLD,
        }
    }
}

impl AlertPolicy {
    /// Whether this record crosses the alert bar.
    #[must_use]
    pub fn should_alert(&self, record: &DefectRecord) -> bool {
        match record.tier {
            DefectTier::Critical => true,
            DefectTier::Major => record.confidence > self.threshold,
            _ => false,
        }
    }
}

/// Render the notification body for a severe finding.
#[must_use]
pub fn format_alert(record: &DefectRecord) -> String {
    format!(
        "DEFECT ALERT: {tier} defect detected\n\
         \n\
         Product:      {product}\n\
         Confidence:   {confidence:.1}%\n\
         Edge density: {edge_density:.4}\n\
         Detected at:  {timestamp}\n\
         \n\
         {description}.\n\
         Please inspect the product and take the necessary quality control measures.",
        tier = record.tier,
        product = record.product_id,
        confidence = record.confidence * 100.0,
        edge_density = record.edge_density,
        timestamp = record.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        description = record.tier.description(),
    )
}

/// Delivery seam for alert notifications.
pub trait AlertSink {
    /// Deliver one notification for a severe finding.
    fn notify(&mut self, record: &DefectRecord) -> Result<()>;
}

/// Sink that emits alerts into the tracing log.
#[derive(Debug, Default)]
pub struct LogSink;

impl AlertSink for LogSink {
    fn notify(&mut self, record: &DefectRecord) -> Result<()> {
        warn!(
            product_id = %record.product_id,
            tier = %record.tier,
            confidence = record.confidence,
            "defect alert raised"
        );
        Ok(())
    }
}

/// Append-only audit log of raised alerts, one JSON object per line.
#[derive(Debug, Clone)]
pub struct JsonlAlertLog {
    path: PathBuf,
}

#[derive(Debug, Serialize)]
struct AlertEntry {
    timestamp: chrono::DateTime<Utc>,
    product_id: String,
    tier: DefectTier,
    confidence: f64,
    action: &'static str,
}

impl JsonlAlertLog {
    /// Open (or lazily create) the audit log at the given path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AlertSink for JsonlAlertLog {
    fn notify(&mut self, record: &DefectRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let entry = AlertEntry {
            timestamp: Utc::now(),
            product_id: record.product_id.clone(),
            tier: record.tier,
            confidence: record.confidence,
            action: "ALERT_SENT",
        };
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", serde_json::to_string(&entry)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classification;

    fn record(tier: DefectTier, confidence: f64) -> DefectRecord {
        DefectRecord::new(
            "PART-7",
            Classification::new(tier, confidence),
            0.3,
            vec![0.3, 0.0, 0.0, 0.0, 0.4],
            None,
        )
    }

    #[test]
    fn critical_always_alerts() {
        let policy = AlertPolicy::default();
        assert!(policy.should_alert(&record(DefectTier::Critical, 0.1)));
    }

    #[test]
    fn major_alerts_only_above_threshold() {
        let policy = AlertPolicy::default();
        assert!(policy.should_alert(&record(DefectTier::Major, 0.71)));
        assert!(!policy.should_alert(&record(DefectTier::Major, 0.7)));
        assert!(!policy.should_alert(&record(DefectTier::Major, 0.5)));
    }

    #[test]
    fn lesser_tiers_never_alert() {
        let policy = AlertPolicy::default();
        for tier in [DefectTier::Good, DefectTier::Minor, DefectTier::Unknown] {
            assert!(!policy.should_alert(&record(tier, 1.0)));
        }
    }

    #[test]
    fn alert_body_names_the_product_and_tier() {
        let body = format_alert(&record(DefectTier::Critical, 0.93));
        assert!(body.contains("CRITICAL"));
        assert!(body.contains("PART-7"));
        assert!(body.contains("93.0%"));
    }

    #[test]
    fn jsonl_log_appends_entries() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = JsonlAlertLog::new(dir.path().join("alerts.jsonl"));
        sink.notify(&record(DefectTier::Critical, 0.9)).unwrap();
        sink.notify(&record(DefectTier::Major, 0.8)).unwrap();

        let contents = fs::read_to_string(sink.path()).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.contains("ALERT_SENT"));
    }
}
