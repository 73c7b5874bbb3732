// 🖨️ Report - presentation boundary
//
// The only place where chart conventions enter: pyramid magnitudes get their
// diverging sign here, anomaly holdings are reduced to the table columns the
// dashboard shows, and the text report is rendered for the CLI.

use crate::aggregate::{MunicipalityAggregate, PyramidTable, Summary};
use crate::anomaly::AnomalyReport;
use crate::catalog::{AgeBracket, Sex};
use crate::pipeline::{AnalyticsView, CleanedExtract};
use serde::Serialize;
use std::fmt::Write;

// ============================================================================
// DIVERGING PYRAMID
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PyramidRow {
    pub age: AgeBracket,
    pub age_label: &'static str,
    pub sex: Sex,
    pub signed_population: i64,
}

/// Pyramid rows in canonical order; `negative_sex` is drawn to the left
pub fn diverging_rows(table: &PyramidTable, negative_sex: Sex) -> Vec<PyramidRow> {
    table
        .entries
        .iter()
        .map(|entry| {
            let magnitude = i64::try_from(entry.population).unwrap_or(i64::MAX);
            let signed_population = if entry.bucket.sex == negative_sex {
                -magnitude
            } else {
                magnitude
            };
            PyramidRow {
                age: entry.bucket.age,
                age_label: entry.bucket.age.label(),
                sex: entry.bucket.sex,
                signed_population,
            }
        })
        .collect()
}

// ============================================================================
// ANOMALY TABLE
// ============================================================================

/// Columns of the anomaly table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyRow {
    pub line: u64,
    pub municipality: String,
    pub vereda: String,
    pub owner: String,
    pub holding_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub reason: &'static str,
}

pub fn anomaly_table(report: &AnomalyReport) -> Vec<AnomalyRow> {
    report
        .anomalies
        .iter()
        .map(|a| AnomalyRow {
            line: a.record.line(),
            municipality: a.record.identity().municipality.clone(),
            vereda: a.record.identity().vereda.clone(),
            owner: a.record.identity().owner.clone(),
            holding_name: a.record.identity().holding_name.clone(),
            latitude: a.record.latitude(),
            longitude: a.record.longitude(),
            reason: a.reason.as_str(),
        })
        .collect()
}

// ============================================================================
// DASHBOARD REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct DashboardReport {
    pub source: String,
    pub release_id: String,
    pub selection: Vec<String>,
    pub summary: Summary,
    pub ranking: Vec<MunicipalityAggregate>,
    pub pyramid: Vec<PyramidRow>,
    pub anomalies: Vec<AnomalyRow>,
    pub anomaly_count: usize,
    pub dropped_count: usize,
    pub ignored_columns: Vec<String>,
}

impl DashboardReport {
    pub fn build(extract: &CleanedExtract, view: &AnalyticsView) -> Self {
        DashboardReport {
            source: extract.source_name.clone(),
            release_id: extract.release_id.clone(),
            selection: view.selection.clone(),
            summary: view.summary.clone(),
            ranking: view.ranking.clone(),
            pyramid: diverging_rows(&view.pyramid, Sex::Male),
            anomalies: anomaly_table(&view.anomalies),
            anomaly_count: view.anomalies.count,
            dropped_count: view.dropped_count,
            ignored_columns: extract.warnings.iter().map(|w| w.column.clone()).collect(),
        }
    }

    /// Plain-text rendering for the terminal
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let rule = "━".repeat(60);

        let _ = writeln!(out, "🐄 Herd census report: {}", self.source);
        let _ = writeln!(out, "   release {}", self.release_id);
        if self.selection.is_empty() {
            let _ = writeln!(out, "   municipalities: all");
        } else {
            let _ = writeln!(out, "   municipalities: {}", self.selection.join(", "));
        }
        let _ = writeln!(out, "{}", rule);

        let _ = writeln!(out, "Holdings:            {}", self.summary.holdings);
        let _ = writeln!(out, "Population:          {}", self.summary.total_population);
        match self.summary.mean_population {
            Some(mean) => {
                let _ = writeln!(out, "Mean per holding:    {:.1}", mean);
            }
            None => {
                let _ = writeln!(out, "Mean per holding:    n/a");
            }
        }
        let _ = writeln!(out, "Dropped (bad coords): {}", self.dropped_count);

        let _ = writeln!(out, "\n📊 Top municipalities");
        for (i, m) in self.ranking.iter().enumerate() {
            let _ = writeln!(
                out,
                "{:>3}. {:<30} {:>10}  ({} holdings)",
                i + 1,
                m.municipality,
                m.total_population,
                m.holdings
            );
        }

        let _ = writeln!(out, "\n👥 Age/sex pyramid (male negative)");
        for row in &self.pyramid {
            let _ = writeln!(
                out,
                "   {:<14} {:<6} {:>10}",
                row.age_label,
                row.sex.as_str(),
                row.signed_population
            );
        }

        let _ = writeln!(out, "\n🚨 Holdings registered with 0 animals: {}", self.anomaly_count);
        for a in &self.anomalies {
            let _ = writeln!(
                out,
                "   line {:<6} {} / {} / {} / {}",
                a.line, a.municipality, a.vereda, a.owner, a.holding_name
            );
        }

        if !self.ignored_columns.is_empty() {
            let _ = writeln!(out, "\nIgnored columns: {}", self.ignored_columns.len());
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::PyramidEntry;
    use crate::catalog::Bucket;

    fn table() -> PyramidTable {
        PyramidTable {
            entries: Bucket::all()
                .map(|bucket| PyramidEntry {
                    bucket,
                    population: if bucket.sex == Sex::Male { 4 } else { 10 },
                })
                .collect(),
        }
    }

    #[test]
    fn test_sign_applied_only_to_negative_sex() {
        let source = table();
        let rows = diverging_rows(&source, Sex::Male);

        assert_eq!(rows.len(), Bucket::COUNT);
        assert!(rows
            .iter()
            .filter(|r| r.sex == Sex::Male)
            .all(|r| r.signed_population == -4));
        assert!(rows
            .iter()
            .filter(|r| r.sex == Sex::Female)
            .all(|r| r.signed_population == 10));

        // The aggregate itself stays sign-free
        assert!(source.entries.iter().all(|e| e.population > 0));
    }

    #[test]
    fn test_rows_follow_canonical_age_order() {
        let rows = diverging_rows(&table(), Sex::Male);
        let ranks: Vec<usize> = rows.iter().map(|r| r.age.rank()).collect();
        let mut sorted = ranks.clone();
        sorted.sort();
        assert_eq!(ranks, sorted);
        assert_eq!(rows[0].age_label, "0-3 months");
    }
}
