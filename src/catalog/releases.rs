// 📚 Release Catalog - versioned raw-name → canonical-bucket associations
//
// Each published release of the census extract names its columns
// differently. A release is pure data: identity column names plus, for each
// canonical bucket, the raw aliases that feed it. Adding a release means
// adding an entry (in code or in a TOML catalog file), never new control flow.

use super::buckets::{AgeBracket, Bucket, Sex};
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::Path;

// ============================================================================
// IDENTITY COLUMNS
// ============================================================================

/// Raw names of the non-count columns for one release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityColumns {
    pub municipality: String,
    pub vereda: String,
    pub owner: String,
    pub holding: String,
    pub latitude: String,
    pub longitude: String,
}

impl IdentityColumns {
    pub fn new(
        municipality: &str,
        vereda: &str,
        owner: &str,
        holding: &str,
        latitude: &str,
        longitude: &str,
    ) -> Self {
        IdentityColumns {
            municipality: municipality.to_string(),
            vereda: vereda.to_string(),
            owner: owner.to_string(),
            holding: holding.to_string(),
            latitude: latitude.to_string(),
            longitude: longitude.to_string(),
        }
    }

    pub fn names(&self) -> [&str; 6] {
        [
            &self.municipality,
            &self.vereda,
            &self.owner,
            &self.holding,
            &self.latitude,
            &self.longitude,
        ]
    }
}

// ============================================================================
// RELEASE SCHEMA
// ============================================================================

/// Raw aliases feeding one canonical bucket.
///
/// More than one alias is a declared synonym group: the release splits the
/// bucket into several columns and resolution sums them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketAliases {
    #[serde(flatten)]
    pub bucket: Bucket,
    pub aliases: Vec<String>,
}

impl BucketAliases {
    pub fn is_synonym_group(&self) -> bool {
        self.aliases.len() > 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseSchema {
    /// Stable id (e.g., "ica-2022-c1")
    pub id: String,

    /// Monotonic version; newer releases win detection ties
    pub version: u32,

    #[serde(default)]
    pub description: String,

    pub identity: IdentityColumns,

    #[serde(default)]
    pub buckets: Vec<BucketAliases>,
}

impl ReleaseSchema {
    pub fn new(id: impl Into<String>, version: u32, identity: IdentityColumns) -> Self {
        ReleaseSchema {
            id: id.into(),
            version,
            description: String::new(),
            identity,
            buckets: Vec::new(),
        }
    }

    /// Builder: add description
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Builder: declare the aliases of one bucket
    pub fn with_bucket(mut self, sex: Sex, age: AgeBracket, aliases: &[&str]) -> Self {
        self.buckets.push(BucketAliases {
            bucket: Bucket::new(sex, age),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        });
        self
    }

    /// Raw column name → bucket, for every declared alias
    pub fn alias_index(&self) -> HashMap<&str, Bucket> {
        self.buckets
            .iter()
            .flat_map(|b| b.aliases.iter().map(move |a| (a.as_str(), b.bucket)))
            .collect()
    }

    /// Is this raw name declared anywhere in the release (identity or bucket)?
    pub fn declares(&self, raw: &str) -> bool {
        self.identity.names().contains(&raw)
            || self.buckets.iter().any(|b| b.aliases.iter().any(|a| a == raw))
    }

    /// Check internal consistency: one bucket per alias, one entry per bucket
    pub fn check(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(PipelineError::Catalog("release id is empty".to_string()));
        }

        let mut seen_names: HashSet<&str> = HashSet::new();
        for name in self.identity.names() {
            if !seen_names.insert(name) {
                return Err(PipelineError::Catalog(format!(
                    "release {}: identity column '{}' declared twice",
                    self.id, name
                )));
            }
        }

        let mut seen_buckets: HashSet<Bucket> = HashSet::new();
        for entry in &self.buckets {
            if !seen_buckets.insert(entry.bucket) {
                return Err(PipelineError::Catalog(format!(
                    "release {}: bucket '{}' declared twice",
                    self.id, entry.bucket
                )));
            }
            if entry.aliases.is_empty() {
                return Err(PipelineError::Catalog(format!(
                    "release {}: bucket '{}' has no aliases",
                    self.id, entry.bucket
                )));
            }
            for alias in &entry.aliases {
                if !seen_names.insert(alias.as_str()) {
                    return Err(PipelineError::Catalog(format!(
                        "release {}: raw column '{}' maps to more than one field",
                        self.id, alias
                    )));
                }
            }
        }

        Ok(())
    }
}

// ============================================================================
// CATALOG FILE (TOML)
// ============================================================================

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    release: Vec<ReleaseSchema>,
}

// ============================================================================
// RELEASE CATALOG
// ============================================================================

/// Registry of all known releases, in registration order
#[derive(Debug, Clone)]
pub struct ReleaseCatalog {
    releases: Vec<ReleaseSchema>,
}

impl ReleaseCatalog {
    /// Create a catalog with the built-in releases
    pub fn new() -> Self {
        let mut catalog = ReleaseCatalog::empty();
        catalog.register_builtin_releases();
        catalog
    }

    /// Create a catalog with no releases (tests, fully external catalogs)
    pub fn empty() -> Self {
        ReleaseCatalog {
            releases: Vec::new(),
        }
    }

    fn register_builtin_releases(&mut self) {
        self.register_static(builtin_releases());
    }

    /// Register releases defined in code; a rejection is a programming error
    fn register_static(&mut self, releases: Vec<ReleaseSchema>) {
        for release in releases {
            let id = release.id.clone();
            if let Err(e) = self.register(release) {
                tracing::error!(release = %id, error = %e, "built-in release rejected");
                if cfg!(debug_assertions) {
                    panic!("built-in release {} rejected: {}", id, e);
                }
            }
        }
    }

    /// Register a release after checking it
    pub fn register(&mut self, release: ReleaseSchema) -> Result<()> {
        release.check()?;
        if self.get(&release.id).is_some() {
            return Err(PipelineError::Catalog(format!(
                "release {} already registered",
                release.id
            )));
        }
        tracing::debug!(release = %release.id, version = release.version, "release registered");
        self.releases.push(release);
        Ok(())
    }

    /// Parse releases from a TOML catalog document
    pub fn parse_toml(content: &str) -> Result<Vec<ReleaseSchema>> {
        let file: CatalogFile = toml::from_str(content)?;
        Ok(file.release)
    }

    /// Register every release declared in a TOML catalog file
    pub fn extend_from_file(&mut self, path: &Path) -> Result<usize> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!(
                "Failed to read catalog file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let releases = Self::parse_toml(&content)?;
        let count = releases.len();
        for release in releases {
            self.register(release)?;
        }
        tracing::info!(path = %path.display(), count, "catalog extended from file");
        Ok(count)
    }

    pub fn get(&self, id: &str) -> Option<&ReleaseSchema> {
        self.releases.iter().find(|r| r.id == id)
    }

    pub fn list_all(&self) -> &[ReleaseSchema] {
        &self.releases
    }

    pub fn count(&self) -> usize {
        self.releases.len()
    }

    /// SHA-256 over every definition that affects resolution, in registration order
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for release in &self.releases {
            hasher.update(release.id.as_bytes());
            hasher.update([0u8]);
            hasher.update(release.version.to_le_bytes());
            for name in release.identity.names() {
                hasher.update(name.as_bytes());
                hasher.update([0u8]);
            }
            for entry in &release.buckets {
                hasher.update(entry.bucket.sex.as_str().as_bytes());
                hasher.update([entry.bucket.age.rank() as u8]);
                for alias in &entry.aliases {
                    hasher.update(alias.as_bytes());
                    hasher.update([0u8]);
                }
                hasher.update([1u8]);
            }
            hasher.update([2u8]);
        }
        format!("{:x}", hasher.finalize())
    }

    /// Pick the release whose declared names best cover the header.
    ///
    /// Score = number of header names the release declares. Ties go to the
    /// highest version. A best score of zero means nothing matched.
    pub fn detect(&self, headers: &[String]) -> Result<&ReleaseSchema> {
        let mut best: Option<(&ReleaseSchema, usize)> = None;

        for release in &self.releases {
            let score = headers.iter().filter(|h| release.declares(h)).count();
            best = match best {
                Some((current, current_score))
                    if current_score > score
                        || (current_score == score && current.version >= release.version) =>
                {
                    Some((current, current_score))
                }
                _ => Some((release, score)),
            };
        }

        match best {
            Some((release, score)) if score > 0 => {
                tracing::debug!(release = %release.id, score, "release detected");
                Ok(release)
            }
            _ => Err(PipelineError::UnknownRelease(
                "no catalog release matches the extract header".to_string(),
            )),
        }
    }
}

impl Default for ReleaseCatalog {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// BUILT-IN RELEASES
// ============================================================================

/// Suffixes used by the long-form ICA column names, youngest → oldest
const ICA_AGE_SUFFIXES: [(AgeBracket, &str); 6] = [
    (AgeBracket::Months0To3, "0_3_MESES"),
    (AgeBracket::Months4To8, "4_8_MESES"),
    (AgeBracket::Months9To12, "9_12_MESES"),
    (AgeBracket::Months13To24, "13_24_MESES"),
    (AgeBracket::Months25To36, "25_36_MESES"),
    (AgeBracket::Over36Months, "MAYORES_36_MESES"),
];

const LEGACY_AGE_SUFFIXES: [(AgeBracket, &str); 6] = [
    (AgeBracket::Months0To3, "0_3M"),
    (AgeBracket::Months4To8, "4_8M"),
    (AgeBracket::Months9To12, "9_12M"),
    (AgeBracket::Months13To24, "13_24M"),
    (AgeBracket::Months25To36, "25_36M"),
    (AgeBracket::Over36Months, "MAS_36M"),
];

fn ica_sex_word(sex: Sex) -> &'static str {
    match sex {
        Sex::Female => "HEMBRAS",
        Sex::Male => "MACHOS",
    }
}

fn builtin_releases() -> Vec<ReleaseSchema> {
    // Cycle I 2022 flat file. The "_AÑO" year totals repeat the month
    // columns and are deliberately not aliases.
    let mut ica_2022 = ReleaseSchema::new(
        "ica-2022-c1",
        3,
        IdentityColumns::new("MUNICIPIO", "VEREDA", "GANADERO", "NOMBRE_PREDIO", "LATITUD", "LONGITUD"),
    )
    .with_description("ICA foot-and-mouth vaccination, cycle I 2022 (long column names)");

    // Cycle II 2021 uses abbreviated names and different owner/holding headers
    let mut ica_2021 = ReleaseSchema::new(
        "ica-2021-c2",
        2,
        IdentityColumns::new("MUNICIPIO", "VEREDA", "PROPIETARIO", "PREDIO", "LATITUD", "LONGITUD"),
    )
    .with_description("ICA foot-and-mouth vaccination, cycle II 2021 (abbreviated column names)");

    // Cycle I 2020 splits the oldest bracket in two
    let mut ica_2020 = ReleaseSchema::new(
        "ica-2020-c1",
        1,
        IdentityColumns::new("MUNICIPIO", "VEREDA", "GANADERO", "NOMBRE_PREDIO", "LAT", "LON"),
    )
    .with_description("ICA foot-and-mouth vaccination, cycle I 2020 (oldest bracket split at 60 months)");

    for sex in Sex::ALL {
        let word = ica_sex_word(sex);
        let letter = &word[..1];

        for (age, suffix) in ICA_AGE_SUFFIXES {
            let alias = format!("AFTOSA_BOVINOS_{}_{}", word, suffix);
            ica_2022 = ica_2022.with_bucket(sex, age, &[alias.as_str()]);

            if age == AgeBracket::Over36Months {
                let older = format!("AFTOSA_BOVINOS_{}_37_60_MESES", word);
                let oldest = format!("AFTOSA_BOVINOS_{}_MAYORES_60_MESES", word);
                ica_2020 = ica_2020.with_bucket(sex, age, &[older.as_str(), oldest.as_str()]);
            } else {
                ica_2020 = ica_2020.with_bucket(sex, age, &[alias.as_str()]);
            }
        }

        for (age, suffix) in LEGACY_AGE_SUFFIXES {
            let alias = format!("BOV_{}_{}", letter, suffix);
            ica_2021 = ica_2021.with_bucket(sex, age, &[alias.as_str()]);
        }
    }

    vec![ica_2022, ica_2021, ica_2020]
}

// ============================================================================
// TESTS
// ============================================================================
