// 🚨 Anomaly Detector - registered holdings reporting zero animals
//
// A content-integrity signal, not an error: the record passed schema
// resolution and the geospatial rule, but every resolved bucket is zero.
// Either the holding is genuinely empty or the survey is incomplete.
// The detector reports; it never corrects.

use crate::holding::HoldingRecord;
use serde::{Deserialize, Serialize};

// ============================================================================
// ANOMALY RECORD
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnomalyReason {
    #[serde(rename = "zero-count-with-registration")]
    ZeroCountWithRegistration,
}

impl AnomalyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyReason::ZeroCountWithRegistration => "zero-count-with-registration",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyRecord {
    pub record: HoldingRecord,
    pub reason: AnomalyReason,
}

// ============================================================================
// ANOMALY REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyReport {
    pub anomalies: Vec<AnomalyRecord>,
    pub count: usize,
}

impl AnomalyReport {
    pub fn summary(&self) -> String {
        format!(
            "{} holdings registered with 0 animals",
            self.count
        )
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Lines of the flagged holdings, in input order
    pub fn lines(&self) -> Vec<u64> {
        self.anomalies.iter().map(|a| a.record.line()).collect()
    }
}

// ============================================================================
// ANOMALY DETECTOR
// ============================================================================

#[derive(Debug, Default)]
pub struct AnomalyDetector;

impl AnomalyDetector {
    pub fn new() -> Self {
        AnomalyDetector
    }

    pub fn is_anomalous(&self, record: &HoldingRecord) -> bool {
        record.total_population() == 0
    }

    pub fn detect(&self, records: &[HoldingRecord]) -> AnomalyReport {
        let anomalies: Vec<AnomalyRecord> = records
            .iter()
            .filter(|r| self.is_anomalous(r))
            .map(|r| AnomalyRecord {
                record: r.clone(),
                reason: AnomalyReason::ZeroCountWithRegistration,
            })
            .collect();

        let count = anomalies.len();
        if count > 0 {
            tracing::info!(count, checked = records.len(), "zero-count holdings flagged");
        }

        AnomalyReport { anomalies, count }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AgeBracket, Bucket, Sex};
    use crate::holding::{HoldingIdentity, Population};

    fn holding(line: u64, count: u64) -> HoldingRecord {
        let population = Population::zeroed().with(Bucket::new(Sex::Male, AgeBracket::Months9To12), count);
        HoldingRecord::new(line, HoldingIdentity::default(), 2.4, -76.6, population)
    }

    #[test]
    fn test_detects_only_zero_totals() {
        let records = vec![holding(2, 10), holding(3, 0), holding(4, 1), holding(5, 0)];
        let report = AnomalyDetector::new().detect(&records);

        assert_eq!(report.count, 2);
        assert_eq!(report.lines(), vec![3, 5]);
        assert!(report
            .anomalies
            .iter()
            .all(|a| a.record.total_population() == 0));

        // Complement is strictly positive
        let flagged = report.lines();
        assert!(records
            .iter()
            .filter(|r| !flagged.contains(&r.line()))
            .all(|r| r.total_population() > 0));
    }

    #[test]
    fn test_reason_serialization() {
        let report = AnomalyDetector::new().detect(&[holding(2, 0)]);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["anomalies"][0]["reason"], "zero-count-with-registration");
        assert_eq!(value["count"], 1);
        println!("{}", report.summary());
    }

    #[test]
    fn test_no_anomalies() {
        let report = AnomalyDetector::new().detect(&[holding(2, 3)]);
        assert!(report.is_empty());
    }
}
