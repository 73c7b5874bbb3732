// 🏡 Holding Record - the pipeline's canonical entity
//
// One record per land holding. Created once after normalization and schema
// resolution, immutable afterwards. The population map always carries every
// canonical bucket (unreported buckets hold 0) and the total is computed once
// at construction.

use crate::catalog::{AgeBracket, Bucket, Sex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// POPULATION
// ============================================================================

/// Serialized form of one population entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketCount {
    pub sex: Sex,
    pub age: AgeBracket,
    pub count: u64,
}

/// Count per canonical bucket, iterated in canonical order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<BucketCount>", try_from = "Vec<BucketCount>")]
pub struct Population {
    counts: BTreeMap<Bucket, u64>,
}

impl Population {
    /// Every canonical bucket at zero
    pub fn zeroed() -> Self {
        Population {
            counts: Bucket::all().map(|b| (b, 0)).collect(),
        }
    }

    /// Add to a bucket (synonym columns accumulate here)
    pub fn add(&mut self, bucket: Bucket, count: u64) {
        let entry = self.counts.entry(bucket).or_insert(0);
        *entry = entry.saturating_add(count);
    }

    /// Builder: add and return self
    pub fn with(mut self, bucket: Bucket, count: u64) -> Self {
        self.add(bucket, count);
        self
    }

    pub fn get(&self, bucket: Bucket) -> u64 {
        self.counts.get(&bucket).copied().unwrap_or(0)
    }

    /// (bucket, count) in canonical order
    pub fn iter(&self) -> impl Iterator<Item = (Bucket, u64)> + '_ {
        self.counts.iter().map(|(b, c)| (*b, *c))
    }

    pub fn total(&self) -> u64 {
        self.counts.values().fold(0u64, |acc, c| acc.saturating_add(*c))
    }
}

impl Default for Population {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl From<Population> for Vec<BucketCount> {
    fn from(population: Population) -> Self {
        population
            .iter()
            .map(|(bucket, count)| BucketCount {
                sex: bucket.sex,
                age: bucket.age,
                count,
            })
            .collect()
    }
}

impl TryFrom<Vec<BucketCount>> for Population {
    type Error = String;

    fn try_from(entries: Vec<BucketCount>) -> Result<Self, Self::Error> {
        let mut population = Population::zeroed();
        let mut seen = std::collections::HashSet::new();
        for entry in entries {
            let bucket = Bucket::new(entry.sex, entry.age);
            if !seen.insert(bucket) {
                return Err(format!("bucket '{}' listed twice", bucket));
            }
            population.add(bucket, entry.count);
        }
        Ok(population)
    }
}

// ============================================================================
// HOLDING RECORD
// ============================================================================

/// Who and where: descriptive attributes, not required to be unique
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HoldingIdentity {
    pub municipality: String,
    pub vereda: String,
    pub owner: String,
    pub holding_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoldingRecord {
    /// Line in the source extract (provenance)
    line: u64,

    #[serde(flatten)]
    identity: HoldingIdentity,

    latitude: f64,
    longitude: f64,

    population: Population,
    total_population: u64,
}

impl HoldingRecord {
    pub fn new(
        line: u64,
        identity: HoldingIdentity,
        latitude: f64,
        longitude: f64,
        population: Population,
    ) -> Self {
        let total_population = population.total();
        HoldingRecord {
            line,
            identity,
            latitude,
            longitude,
            population,
            total_population,
        }
    }

    pub fn line(&self) -> u64 {
        self.line
    }

    pub fn identity(&self) -> &HoldingIdentity {
        &self.identity
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn municipality(&self) -> &str {
        &self.identity.municipality
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    pub fn total_population(&self) -> u64 {
        self.total_population
    }

    pub fn count(&self, bucket: Bucket) -> u64 {
        self.population.get(bucket)
    }
}
