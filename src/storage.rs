//! Durable defect records behind a narrow storage contract.
//!
//! The core never depends on a storage engine's schema beyond this
//! write/read shape: a record goes in, gets a store-assigned identity and
//! timestamp, and comes back out by recency, time range or severity.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::{Classification, DefectTier};
use crate::error::{Error, Result};

/// One persisted inspection outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefectRecord {
    /// Store-assigned identity; `None` until recorded.
    pub id: Option<u64>,
    /// Inspected product.
    pub product_id: String,
    /// Decided severity tier.
    pub tier: DefectTier,
    /// Decision confidence.
    pub confidence: f64,
    /// Edge density of the inspected image.
    pub edge_density: f64,
    /// The assembled feature vector behind the decision.
    pub features: Vec<f64>,
    /// Where the inspected image lives, if it was kept.
    pub image_path: Option<PathBuf>,
    /// Store-assigned at record time.
    pub timestamp: DateTime<Utc>,
}

impl DefectRecord {
    /// Build an unrecorded entry from a classification outcome.
    #[must_use]
    pub fn new(
        product_id: &str,
        classification: Classification,
        edge_density: f64,
        features: Vec<f64>,
        image_path: Option<PathBuf>,
    ) -> Self {
        Self {
            id: None,
            product_id: product_id.to_string(),
            tier: classification.tier,
            confidence: classification.confidence,
            edge_density,
            features,
            image_path,
            timestamp: Utc::now(),
        }
    }
}

/// Write/read contract the inspection core records through.
pub trait DefectStore {
    /// Durably record one entry, assigning identity and timestamp.
    /// Returns the stored copy.
    fn record(&mut self, record: DefectRecord) -> Result<DefectRecord>;

    /// Latest records, newest first.
    fn recent(&self, limit: usize) -> Result<Vec<DefectRecord>>;

    /// Records within a closed time range, newest first.
    fn in_range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<DefectRecord>>;

    /// Major/Critical records since a cutoff, newest first.
    fn severe_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<DefectRecord>>;
}

/// Append-only store with one JSON object per line.
#[derive(Debug, Clone)]
pub struct JsonlStore {
    path: PathBuf,
}

impl JsonlStore {
    /// Open (or lazily create) a store at the given path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every record in append order.
    pub fn load_all(&self) -> Result<Vec<DefectRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.path)?;
        raw.lines()
            .filter(|line| !line.trim().is_empty())
            .enumerate()
            .map(|(index, line)| {
                serde_json::from_str(line).map_err(|e| {
                    Error::Store(format!(
                        "{}: line {}: {e}",
                        self.path.display(),
                        index + 1
                    ))
                })
            })
            .collect()
    }
}

impl DefectStore for JsonlStore {
    fn record(&mut self, mut record: DefectRecord) -> Result<DefectRecord> {
        let existing = self.load_all()?;
        record.id = Some(existing.len() as u64);
        record.timestamp = Utc::now();

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(&record)?;
        writeln!(file, "{line}")?;
        Ok(record)
    }

    fn recent(&self, limit: usize) -> Result<Vec<DefectRecord>> {
        let mut records = self.load_all()?;
        records.reverse();
        records.truncate(limit);
        Ok(records)
    }

    fn in_range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<DefectRecord>> {
        let mut records: Vec<DefectRecord> = self
            .load_all()?
            .into_iter()
            .filter(|r| r.timestamp >= from && r.timestamp <= to)
            .collect();
        records.reverse();
        Ok(records)
    }

    fn severe_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<DefectRecord>> {
        let mut records: Vec<DefectRecord> = self
            .load_all()?
            .into_iter()
            .filter(|r| r.tier.is_actionable() && r.timestamp >= cutoff)
            .collect();
        records.reverse();
        Ok(records)
    }
}

/// Aggregate view over a set of records, for dashboards and the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefectStats {
    /// Number of records aggregated.
    pub total: usize,
    /// Record count per severity tier.
    pub breakdown: BTreeMap<DefectTier, usize>,
    /// Record count per calendar day, oldest first.
    pub daily_trend: Vec<(NaiveDate, usize)>,
}

impl DefectStats {
    /// Aggregate a record set.
    ///
    /// Returns `None` if the set is empty.
    #[must_use]
    pub fn compute(records: &[DefectRecord]) -> Option<Self> {
        if records.is_empty() {
            return None;
        }

        let mut breakdown = BTreeMap::new();
        let mut by_day = BTreeMap::new();
        for record in records {
            *breakdown.entry(record.tier).or_insert(0) += 1;
            *by_day.entry(record.timestamp.date_naive()).or_insert(0) += 1;
        }

        Some(Self {
            total: records.len(),
            breakdown,
            daily_trend: by_day.into_iter().collect(),
        })
    }
}

/// Export records as a CSV table.
pub fn export_csv(records: &[DefectRecord], path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record([
        "id",
        "product_id",
        "tier",
        "confidence",
        "edge_density",
        "image_path",
        "timestamp",
    ])?;
    for record in records {
        wtr.write_record([
            &record.id.map_or(String::new(), |id| id.to_string()),
            &record.product_id,
            &record.tier.to_string(),
            &format!("{:.4}", record.confidence),
            &format!("{:.6}", record.edge_density),
            &record
                .image_path
                .as_ref()
                .map_or(String::new(), |p| p.display().to_string()),
            &record.timestamp.to_rfc3339(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classification;

    fn sample(product: &str, tier: DefectTier) -> DefectRecord {
        DefectRecord::new(
            product,
            Classification::new(tier, 0.8),
            0.12,
            vec![0.12, 1.0, 0.5, 0.1, 0.2, 0.3],
            None,
        )
    }

    #[test]
    fn record_assigns_sequential_ids() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonlStore::new(dir.path().join("defects.jsonl"));

        let first = store.record(sample("PART-1", DefectTier::Good)).unwrap();
        let second = store.record(sample("PART-2", DefectTier::Major)).unwrap();
        assert_eq!(first.id, Some(0));
        assert_eq!(second.id, Some(1));

        let all = store.load_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].product_id, "PART-1");
        assert_eq!(all[1].tier, DefectTier::Major);
    }

    #[test]
    fn recent_returns_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonlStore::new(dir.path().join("defects.jsonl"));
        for i in 0..5 {
            store
                .record(sample(&format!("PART-{i}"), DefectTier::Minor))
                .unwrap();
        }

        let recent = store.recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].product_id, "PART-4");
        assert_eq!(recent[1].product_id, "PART-3");
    }

    #[test]
    fn severe_since_filters_actionable_tiers() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonlStore::new(dir.path().join("defects.jsonl"));
        store.record(sample("A", DefectTier::Good)).unwrap();
        store.record(sample("B", DefectTier::Critical)).unwrap();
        store.record(sample("C", DefectTier::Minor)).unwrap();
        store.record(sample("D", DefectTier::Major)).unwrap();

        let cutoff = Utc::now() - chrono::Duration::hours(24);
        let severe = store.severe_since(cutoff).unwrap();
        assert_eq!(severe.len(), 2);
        assert_eq!(severe[0].product_id, "D");
        assert_eq!(severe[1].product_id, "B");
    }

    #[test]
    fn empty_store_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::new(dir.path().join("missing.jsonl"));
        assert!(store.load_all().unwrap().is_empty());
        assert!(store.recent(10).unwrap().is_empty());
    }

    #[test]
    fn corrupt_line_is_a_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("defects.jsonl");
        fs::write(&path, "not json\n").unwrap();
        let store = JsonlStore::new(&path);
        assert!(matches!(store.load_all(), Err(Error::Store(_))));
    }

    #[test]
    fn stats_break_down_by_tier() {
        let records = vec![
            sample("A", DefectTier::Good),
            sample("B", DefectTier::Good),
            sample("C", DefectTier::Critical),
        ];
        let stats = DefectStats::compute(&records).unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.breakdown[&DefectTier::Good], 2);
        assert_eq!(stats.breakdown[&DefectTier::Critical], 1);
        assert_eq!(stats.daily_trend.len(), 1);

        assert!(DefectStats::compute(&[]).is_none());
    }

    #[test]
    fn csv_export_writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.csv");
        let records = vec![sample("A", DefectTier::Minor)];
        export_csv(&records, &path).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert!(lines.next().unwrap().starts_with("id,product_id,tier"));
        assert!(lines.next().unwrap().contains("MINOR"));
    }
}
