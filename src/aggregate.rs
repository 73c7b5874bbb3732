// 📊 Aggregator - totals, municipality ranking, age/sex pyramid
//
// Pure functions over a record slice. Nothing is maintained incrementally:
// every view recomputes from whatever record set is active after filtering.

use crate::catalog::Bucket;
use crate::holding::HoldingRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// How many municipalities the ranking shows unless told otherwise
pub const DEFAULT_TOP_N: usize = 15;

// ============================================================================
// MUNICIPALITY TOTALS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MunicipalityAggregate {
    pub municipality: String,
    pub total_population: u64,
    pub holdings: usize,
}

/// Group by municipality, in order of first appearance
pub fn municipality_totals(records: &[HoldingRecord]) -> Vec<MunicipalityAggregate> {
    let mut position: HashMap<&str, usize> = HashMap::new();
    let mut totals: Vec<MunicipalityAggregate> = Vec::new();

    for record in records {
        let name = record.municipality();
        let index = *position.entry(name).or_insert_with(|| {
            totals.push(MunicipalityAggregate {
                municipality: name.to_string(),
                total_population: 0,
                holdings: 0,
            });
            totals.len() - 1
        });

        let entry = &mut totals[index];
        entry.total_population = entry
            .total_population
            .saturating_add(record.total_population());
        entry.holdings += 1;
    }

    totals
}

/// Top `n` by total, descending; ties by municipality name ascending
pub fn rank_municipalities(records: &[HoldingRecord], n: usize) -> Vec<MunicipalityAggregate> {
    let mut ranking = municipality_totals(records);
    ranking.sort_by(|a, b| {
        b.total_population
            .cmp(&a.total_population)
            .then_with(|| a.municipality.cmp(&b.municipality))
    });
    ranking.truncate(n);
    ranking
}

/// Distinct municipality names in order of first appearance (filter options)
pub fn municipality_names(records: &[HoldingRecord]) -> Vec<String> {
    municipality_totals(records)
        .into_iter()
        .map(|m| m.municipality)
        .collect()
}

// ============================================================================
// PYRAMID TABLE
// ============================================================================

/// Non-negative magnitude for one bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PyramidEntry {
    pub bucket: Bucket,
    pub population: u64,
}

/// Per-bucket sums over a record set, in canonical order (age, then sex).
/// Sign conventions for charts are applied by `report::diverging_rows`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PyramidTable {
    pub entries: Vec<PyramidEntry>,
}

impl PyramidTable {
    pub fn get(&self, bucket: Bucket) -> u64 {
        self.entries
            .iter()
            .find(|e| e.bucket == bucket)
            .map(|e| e.population)
            .unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.entries.iter().map(|e| e.population).sum()
    }
}

pub fn pyramid(records: &[HoldingRecord]) -> PyramidTable {
    let mut sums: BTreeMap<Bucket, u64> = Bucket::all().map(|b| (b, 0)).collect();

    for record in records {
        for (bucket, count) in record.population().iter() {
            let entry = sums.entry(bucket).or_insert(0);
            *entry = entry.saturating_add(count);
        }
    }

    PyramidTable {
        entries: sums
            .into_iter()
            .map(|(bucket, population)| PyramidEntry { bucket, population })
            .collect(),
    }
}

// ============================================================================
// SUMMARY SCALARS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub holdings: usize,
    pub total_population: u64,
    /// `None` when there are no holdings
    pub mean_population: Option<f64>,
}

impl Summary {
    pub fn summary(&self) -> String {
        match self.mean_population {
            Some(mean) => format!(
                "{} holdings, {} animals, {:.1} animals/holding",
                self.holdings, self.total_population, mean
            ),
            None => "0 holdings".to_string(),
        }
    }
}

pub fn summarize(records: &[HoldingRecord]) -> Summary {
    let holdings = records.len();
    let total_population = records
        .iter()
        .fold(0u64, |acc, r| acc.saturating_add(r.total_population()));
    let mean_population = if holdings == 0 {
        None
    } else {
        Some(total_population as f64 / holdings as f64)
    };

    Summary {
        holdings,
        total_population,
        mean_population,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AgeBracket, Sex};
    use crate::holding::{HoldingIdentity, Population};

    fn holding(municipality: &str, bucket: Bucket, count: u64) -> HoldingRecord {
        let identity = HoldingIdentity {
            municipality: municipality.to_string(),
            ..HoldingIdentity::default()
        };
        HoldingRecord::new(
            0,
            identity,
            2.4,
            -76.6,
            Population::zeroed().with(bucket, count),
        )
    }

    fn calves() -> Bucket {
        Bucket::new(Sex::Female, AgeBracket::Months0To3)
    }

    #[test]
    fn test_municipality_totals_keep_first_appearance_order() {
        let records = vec![
            holding("Timbío", calves(), 5),
            holding("Popayán", calves(), 5),
            holding("Timbío", calves(), 0),
        ];

        let totals = municipality_totals(&records);
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[0].municipality, "Timbío");
        assert_eq!(totals[0].holdings, 2);
        // Tie with Popayán is left in input order
        assert_eq!(totals[1].municipality, "Popayán");
        assert_eq!(totals[0].total_population, totals[1].total_population);
    }

    #[test]
    fn test_ranking_ties_break_by_name() {
        let records = vec![
            holding("Timbío", calves(), 5),
            holding("Cajibío", calves(), 9),
            holding("Piendamó", calves(), 5),
        ];

        let ranking = rank_municipalities(&records, 10);
        let names: Vec<&str> = ranking.iter().map(|m| m.municipality.as_str()).collect();
        assert_eq!(names, vec!["Cajibío", "Piendamó", "Timbío"]);

        let top1 = rank_municipalities(&records, 1);
        assert_eq!(top1.len(), 1);
        assert_eq!(top1[0].municipality, "Cajibío");
    }

    #[test]
    fn test_pyramid_in_canonical_order_with_zeros() {
        let records = vec![
            holding("A", Bucket::new(Sex::Male, AgeBracket::Over36Months), 3),
            holding("A", calves(), 10),
            holding("B", Bucket::new(Sex::Male, AgeBracket::Months13To24), 2),
        ];

        let table = pyramid(&records);
        assert_eq!(table.entries.len(), Bucket::COUNT);

        let order: Vec<Bucket> = table.entries.iter().map(|e| e.bucket).collect();
        let canonical: Vec<Bucket> = Bucket::all().collect();
        assert_eq!(order, canonical);

        assert_eq!(table.get(calves()), 10);
        assert_eq!(table.get(Bucket::new(Sex::Male, AgeBracket::Months4To8)), 0);
        assert_eq!(table.total(), 15);
    }

    #[test]
    fn test_summary_scalars() {
        let records = vec![holding("A", calves(), 10), holding("A", calves(), 0)];
        let summary = summarize(&records);

        assert_eq!(summary.holdings, 2);
        assert_eq!(summary.total_population, 10);
        assert_eq!(summary.mean_population, Some(5.0));

        let empty = summarize(&[]);
        assert_eq!(empty.mean_population, None);
        assert_eq!(empty.summary(), "0 holdings");
    }

    #[test]
    fn test_recomputation_is_deterministic() {
        let records = vec![
            holding("Timbío", calves(), 5),
            holding("Popayán", calves(), 7),
        ];
        assert_eq!(pyramid(&records), pyramid(&records));
        assert_eq!(rank_municipalities(&records, 15), rank_municipalities(&records, 15));
    }
}
