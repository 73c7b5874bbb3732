// 📐 Schema Resolver - raw header → canonical bucket map
//
// Resolution happens once per extract, on the header:
//   1. pick the release (explicit id or best header match)
//   2. locate identity columns
//   3. map every header column declared by the release to its bucket
//   4. warn about (and ignore) everything else
// Per row, `assemble` sums the normalized counts into the bucket model.

use crate::catalog::{Bucket, IdentityColumns, ReleaseCatalog, ReleaseSchema};
use crate::error::{PipelineError, Result};
use crate::holding::{HoldingIdentity, HoldingRecord, Population};
use crate::normalizer::NormalizedRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

// ============================================================================
// RESOLUTION OUTPUT
// ============================================================================

/// Why a header column was ignored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnresolvedReason {
    /// Not an identity column nor a bucket alias of the release
    NotInCatalog,
    /// Same header name appeared earlier; only the first is used
    DuplicateColumn,
}

/// Non-fatal: a raw column matched no catalog entry and is ignored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedBucketWarning {
    pub column: String,
    pub position: usize,
    pub reason: UnresolvedReason,
}

/// Header positions of the identity columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnPositions {
    pub municipality: usize,
    pub vereda: Option<usize>,
    pub owner: Option<usize>,
    pub holding: Option<usize>,
    pub latitude: usize,
    pub longitude: usize,
}

/// A header column feeding a canonical bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketColumn {
    pub name: String,
    pub position: usize,
    pub bucket: Bucket,
}

#[derive(Debug, Clone)]
pub struct ResolvedSchema {
    pub release_id: String,
    pub identity: IdentityColumns,
    pub columns: ColumnPositions,
    /// In header order
    pub bucket_columns: Vec<BucketColumn>,
    /// Canonical buckets with no column in this extract (zero for every row)
    pub missing_buckets: Vec<Bucket>,
    pub warnings: Vec<UnresolvedBucketWarning>,
}

impl ResolvedSchema {
    /// Raw column name → canonical bucket
    pub fn bucket_map(&self) -> BTreeMap<&str, Bucket> {
        self.bucket_columns
            .iter()
            .map(|c| (c.name.as_str(), c.bucket))
            .collect()
    }

    /// Buckets fed by more than one column in this extract
    pub fn synonym_buckets(&self) -> Vec<Bucket> {
        let mut per_bucket: BTreeMap<Bucket, usize> = BTreeMap::new();
        for column in &self.bucket_columns {
            *per_bucket.entry(column.bucket).or_insert(0) += 1;
        }
        per_bucket
            .into_iter()
            .filter(|(_, n)| *n > 1)
            .map(|(b, _)| b)
            .collect()
    }

    /// Build the canonical record from a normalized row
    pub fn assemble(&self, normalized: NormalizedRecord) -> HoldingRecord {
        let mut population = Population::zeroed();
        for count in &normalized.counts {
            population.add(count.bucket, count.value);
        }

        let identity = HoldingIdentity {
            municipality: normalized.municipality,
            vereda: normalized.vereda,
            owner: normalized.owner,
            holding_name: normalized.holding_name,
        };

        HoldingRecord::new(
            normalized.line,
            identity,
            normalized.latitude,
            normalized.longitude,
            population,
        )
    }
}

// ============================================================================
// SCHEMA RESOLVER
// ============================================================================

pub struct SchemaResolver<'a> {
    catalog: &'a ReleaseCatalog,
}

impl<'a> SchemaResolver<'a> {
    pub fn new(catalog: &'a ReleaseCatalog) -> Self {
        SchemaResolver { catalog }
    }

    /// Choose the release for this header
    pub fn select_release(
        &self,
        headers: &[String],
        release_id: Option<&str>,
    ) -> Result<&'a ReleaseSchema> {
        match release_id {
            Some(id) => self
                .catalog
                .get(id)
                .ok_or_else(|| PipelineError::UnknownRelease(id.to_string())),
            None => self.catalog.detect(headers),
        }
    }

    /// Resolve a header against the catalog
    pub fn resolve(&self, headers: &[String], release_id: Option<&str>) -> Result<ResolvedSchema> {
        let release = self.select_release(headers, release_id)?;
        let resolved = resolve_against(release, headers)?;

        for warning in &resolved.warnings {
            tracing::warn!(
                column = %warning.column,
                position = warning.position,
                reason = ?warning.reason,
                release = %resolved.release_id,
                "unresolved column ignored"
            );
        }
        if !resolved.missing_buckets.is_empty() {
            tracing::info!(
                release = %resolved.release_id,
                missing = resolved.missing_buckets.len(),
                "canonical buckets without a column are treated as zero"
            );
        }
        tracing::info!(
            release = %resolved.release_id,
            bucket_columns = resolved.bucket_columns.len(),
            ignored = resolved.warnings.len(),
            "schema resolved"
        );

        Ok(resolved)
    }
}

fn resolve_against(release: &ReleaseSchema, headers: &[String]) -> Result<ResolvedSchema> {
    let aliases = release.alias_index();
    let identity_names: HashSet<&str> = release.identity.names().into_iter().collect();

    let mut seen: HashSet<&str> = HashSet::new();
    let mut bucket_columns = Vec::new();
    let mut warnings = Vec::new();

    for (position, name) in headers.iter().enumerate() {
        if !seen.insert(name.as_str()) {
            warnings.push(UnresolvedBucketWarning {
                column: name.clone(),
                position,
                reason: UnresolvedReason::DuplicateColumn,
            });
            continue;
        }

        if let Some(bucket) = aliases.get(name.as_str()) {
            bucket_columns.push(BucketColumn {
                name: name.clone(),
                position,
                bucket: *bucket,
            });
        } else if !identity_names.contains(name.as_str()) {
            warnings.push(UnresolvedBucketWarning {
                column: name.clone(),
                position,
                reason: UnresolvedReason::NotInCatalog,
            });
        }
    }

    let find = |name: &str| headers.iter().position(|h| h == name);
    let require = |name: &str, role: &str| {
        find(name).ok_or_else(|| PipelineError::MissingColumn {
            role: format!("{} ('{}')", role, name),
            release: release.id.clone(),
        })
    };

    let identity = &release.identity;
    let columns = ColumnPositions {
        municipality: require(&identity.municipality, "municipality")?,
        vereda: find(&identity.vereda),
        owner: find(&identity.owner),
        holding: find(&identity.holding),
        latitude: require(&identity.latitude, "latitude")?,
        longitude: require(&identity.longitude, "longitude")?,
    };

    let present: HashSet<Bucket> = bucket_columns.iter().map(|c| c.bucket).collect();
    let missing_buckets: Vec<Bucket> = Bucket::all().filter(|b| !present.contains(b)).collect();

    Ok(ResolvedSchema {
        release_id: release.id.clone(),
        identity: identity.clone(),
        columns,
        bucket_columns,
        missing_buckets,
        warnings,
    })
}

// ============================================================================
// TESTS
// ============================================================================
