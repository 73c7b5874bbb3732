// 🔄 Pipeline - load → normalize → resolve → validate, then analyze
//
// `Pipeline::run*` builds the expensive, immutable `CleanedExtract` once per
// extract. `analyze` derives every view (summary, ranking, pyramid,
// anomalies) from it for a given municipality selection; views are cheap and
// recomputed on every call.

use crate::aggregate::{self, MunicipalityAggregate, PyramidTable, Summary};
use crate::anomaly::{AnomalyDetector, AnomalyReport};
use crate::cache::fingerprint;
use crate::catalog::{Bucket, ReleaseCatalog};
use crate::error::Result;
use crate::geo::{DroppedRecord, GeoPredicate, GeoValidator};
use crate::holding::HoldingRecord;
use crate::loader::{ExtractSource, LoadOptions};
use crate::normalizer::normalize_record;
use crate::schema::{SchemaResolver, UnresolvedBucketWarning};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;

// ============================================================================
// CLEANED EXTRACT
// ============================================================================

/// Validated snapshot of one extract. Immutable; share it behind an `Arc`.
#[derive(Debug, Clone, Serialize)]
pub struct CleanedExtract {
    pub source_name: String,
    /// SHA-256 of the extract bytes + load/pipeline settings
    pub fingerprint: String,
    pub release_id: String,
    /// Data rows read from the extract
    pub rows_read: usize,
    /// Holdings that passed the geospatial rule, in input order
    pub records: Vec<HoldingRecord>,
    pub dropped: Vec<DroppedRecord>,
    pub warnings: Vec<UnresolvedBucketWarning>,
    pub missing_buckets: Vec<Bucket>,
}

impl CleanedExtract {
    pub fn dropped_count(&self) -> usize {
        self.dropped.len()
    }

    /// Records matching a municipality selection, in input order
    pub fn select(&self, selection: &MunicipalitySelection) -> Vec<HoldingRecord> {
        self.records
            .iter()
            .filter(|r| selection.matches(r.municipality()))
            .cloned()
            .collect()
    }

    /// Distinct municipalities in order of first appearance
    pub fn municipalities(&self) -> Vec<String> {
        aggregate::municipality_names(&self.records)
    }
}

// ============================================================================
// MUNICIPALITY SELECTION
// ============================================================================

/// The external filter. Empty means every municipality.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MunicipalitySelection {
    names: BTreeSet<String>,
}

impl MunicipalitySelection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn of<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        MunicipalitySelection {
            names: names
                .into_iter()
                .map(|n| {
                    let n: String = n.into();
                    n.trim().to_string()
                })
                .filter(|n| !n.is_empty())
                .collect(),
        }
    }

    /// Parse a comma-separated list ("Popayán,Timbío")
    pub fn parse_list(list: &str) -> Self {
        Self::of(list.split(','))
    }

    pub fn is_all(&self) -> bool {
        self.names.is_empty()
    }

    pub fn matches(&self, municipality: &str) -> bool {
        self.is_all() || self.names.contains(municipality)
    }

    pub fn names(&self) -> Vec<String> {
        self.names.iter().cloned().collect()
    }
}

// ============================================================================
// ANALYTICS VIEW
// ============================================================================

/// Everything the presentation layer consumes for one selection
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsView {
    pub selection: Vec<String>,
    pub records: Vec<HoldingRecord>,
    pub summary: Summary,
    pub ranking: Vec<MunicipalityAggregate>,
    pub pyramid: PyramidTable,
    pub anomalies: AnomalyReport,
    pub dropped_count: usize,
}

/// Restrict to the selection, then run every aggregation over the result
pub fn analyze(
    extract: &CleanedExtract,
    selection: &MunicipalitySelection,
    top_n: usize,
) -> AnalyticsView {
    let records = extract.select(selection);

    let summary = aggregate::summarize(&records);
    let ranking = aggregate::rank_municipalities(&records, top_n);
    let pyramid = aggregate::pyramid(&records);
    let anomalies = AnomalyDetector::new().detect(&records);

    tracing::debug!(
        selected = records.len(),
        anomalies = anomalies.count,
        "analytics view computed"
    );

    AnalyticsView {
        selection: selection.names(),
        records,
        summary,
        ranking,
        pyramid,
        anomalies,
        dropped_count: extract.dropped_count(),
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct Pipeline {
    catalog: ReleaseCatalog,
    catalog_fingerprint: String,
    release: Option<String>,
    validator: GeoValidator,
}

impl Pipeline {
    pub fn new(catalog: ReleaseCatalog, release: Option<String>, predicate: GeoPredicate) -> Self {
        Pipeline {
            catalog_fingerprint: catalog.fingerprint(),
            catalog,
            release,
            validator: GeoValidator::new(predicate),
        }
    }

    pub fn catalog(&self) -> &ReleaseCatalog {
        &self.catalog
    }

    /// Settings that change the output for identical bytes (part of the cache key)
    pub fn settings_key(&self) -> String {
        format!(
            "release={};geo={};catalog={}",
            self.release.as_deref().unwrap_or("auto"),
            self.validator.predicate().describe(),
            self.catalog_fingerprint
        )
    }

    /// Run every cleaning stage over a decoded extract
    pub fn run(&self, source: &ExtractSource, fingerprint: String) -> Result<CleanedExtract> {
        let headers = source.headers()?;
        let schema = SchemaResolver::new(&self.catalog).resolve(&headers, self.release.as_deref())?;

        let mut holdings = Vec::new();
        for raw in source.records()? {
            let raw = raw?;
            let normalized = normalize_record(&raw, &schema)?;
            holdings.push(schema.assemble(normalized));
        }
        let rows_read = holdings.len();

        let outcome = self.validator.validate(holdings);

        tracing::info!(
            source = %source.name(),
            release = %schema.release_id,
            rows = rows_read,
            valid = outcome.valid.len(),
            dropped = outcome.dropped.len(),
            "extract cleaned"
        );

        Ok(CleanedExtract {
            source_name: source.name().to_string(),
            fingerprint,
            release_id: schema.release_id,
            rows_read,
            records: outcome.valid,
            dropped: outcome.dropped,
            warnings: schema.warnings,
            missing_buckets: schema.missing_buckets,
        })
    }

    /// Decode and clean in-memory bytes
    pub fn run_bytes(&self, name: &str, bytes: &[u8], options: LoadOptions) -> Result<CleanedExtract> {
        let fp = fingerprint(bytes, options, &self.settings_key());
        let source = ExtractSource::from_bytes(name, bytes, options)?;
        self.run(&source, fp)
    }

    /// Read, decode and clean an extract on disk
    pub fn run_file(&self, path: &Path, options: LoadOptions) -> Result<CleanedExtract> {
        let bytes = std::fs::read(path).map_err(|e| crate::error::PipelineError::SourceUnreadable {
            source_name: path.display().to_string(),
            reason: e.to_string(),
        })?;
        self.run_bytes(&path.display().to_string(), &bytes, options)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Pipeline::new(ReleaseCatalog::new(), None, GeoPredicate::default())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AgeBracket, IdentityColumns, ReleaseSchema, Sex};
    use crate::error::PipelineError;
    use crate::loader::TextEncoding;

    const HEADER: &str = "MUNICIPIO;VEREDA;GANADERO;NOMBRE_PREDIO;LATITUD;LONGITUD;AFTOSA_BOVINOS_HEMBRAS_0_3_MESES;AFTOSA_BOVINOS_MACHOS_0_3_MESES";

    fn options() -> LoadOptions {
        LoadOptions::new(b';', TextEncoding::Utf8)
    }

    fn extract(rows: &[&str]) -> String {
        let mut text = HEADER.to_string();
        for row in rows {
            text.push('\n');
            text.push_str(row);
        }
        text.push('\n');
        text
    }

    #[test]
    fn test_popayan_scenario() {
        let data = extract(&[
            "Popayán;La Rejoya;Ana;El Recreo;2,45;-76,6;10,0;",
            "Popayán;Julumito;Luis;La Loma;2,50;-76,5;;",
        ]);

        let cleaned = Pipeline::default()
            .run_bytes("popayan.csv", data.as_bytes(), options())
            .unwrap();
        assert_eq!(cleaned.records.len(), 2);
        assert_eq!(cleaned.dropped_count(), 0);

        let view = analyze(&cleaned, &MunicipalitySelection::all(), 15);
        assert_eq!(view.ranking[0].municipality, "Popayán");
        assert_eq!(view.ranking[0].total_population, 10);
        assert_eq!(view.anomalies.count, 1);
        assert_eq!(view.anomalies.anomalies[0].record.identity().holding_name, "La Loma");
        assert_eq!(
            view.pyramid.get(Bucket::new(Sex::Female, AgeBracket::Months0To3)),
            10
        );
    }

    #[test]
    fn test_south_of_equator_row_dropped() {
        let data = extract(&[
            "Popayán;;;;2,45;-76,6;3;1",
            "Popayán;;;;-1,0;-76,6;3;1",
        ]);

        let cleaned = Pipeline::default()
            .run_bytes("t.csv", data.as_bytes(), options())
            .unwrap();
        assert_eq!(cleaned.rows_read, 2);
        assert_eq!(cleaned.records.len(), 1);
        assert_eq!(cleaned.dropped_count(), 1);
        assert_eq!(cleaned.dropped[0].line, 3);
    }

    #[test]
    fn test_garbled_count_aborts_run() {
        let data = extract(&["Popayán;;;;2,45;-76,6;diez;1"]);
        let err = Pipeline::default()
            .run_bytes("t.csv", data.as_bytes(), options())
            .unwrap_err();
        assert!(matches!(err, PipelineError::NumericParse { line: 2, .. }));
    }

    #[test]
    fn test_selection_restricts_views() {
        let data = extract(&[
            "Popayán;;;;2,45;-76,6;3;1",
            "Timbío;;;;2,35;-76,7;0;0",
            "Cajibío;;;;2,60;-76,6;8;0",
        ]);
        let cleaned = Pipeline::default()
            .run_bytes("t.csv", data.as_bytes(), options())
            .unwrap();

        let selection = MunicipalitySelection::parse_list("Timbío, Cajibío");
        let view = analyze(&cleaned, &selection, 15);

        assert_eq!(view.summary.holdings, 2);
        assert_eq!(view.summary.total_population, 8);
        assert_eq!(view.anomalies.count, 1);
        assert_eq!(view.ranking.len(), 2);
        assert_eq!(cleaned.municipalities(), vec!["Popayán", "Timbío", "Cajibío"]);

        let nobody = analyze(&cleaned, &MunicipalitySelection::of(["Nowhere"]), 15);
        assert_eq!(nobody.summary.holdings, 0);
        assert_eq!(nobody.summary.mean_population, None);
    }

    #[test]
    fn test_settings_change_fingerprint() {
        let data = extract(&["Popayán;;;;2,45;-76,6;3;1"]);
        let auto = Pipeline::default()
            .run_bytes("t.csv", data.as_bytes(), options())
            .unwrap();
        let pinned = Pipeline::new(ReleaseCatalog::new(), Some("ica-2022-c1".to_string()), GeoPredicate::default())
            .run_bytes("t.csv", data.as_bytes(), options())
            .unwrap();

        assert_ne!(auto.fingerprint, pinned.fingerprint);
        assert_eq!(auto.records, pinned.records);
    }

    #[test]
    fn test_catalog_change_moves_fingerprint() {
        let data = extract(&["Popayán;;;;2,45;-76,6;10;0"]);

        let mut remapped = ReleaseCatalog::empty();
        remapped
            .register(
                ReleaseSchema::new(
                    "ica-2022-c1",
                    3,
                    IdentityColumns::new("MUNICIPIO", "VEREDA", "GANADERO", "NOMBRE_PREDIO", "LATITUD", "LONGITUD"),
                )
                .with_bucket(Sex::Male, AgeBracket::Months0To3, &["AFTOSA_BOVINOS_HEMBRAS_0_3_MESES"]),
            )
            .unwrap();

        let builtin = Pipeline::default()
            .run_bytes("t.csv", data.as_bytes(), options())
            .unwrap();
        let custom = Pipeline::new(remapped, None, GeoPredicate::default())
            .run_bytes("t.csv", data.as_bytes(), options())
            .unwrap();

        let calves_f = Bucket::new(Sex::Female, AgeBracket::Months0To3);
        assert_eq!(builtin.records[0].count(calves_f), 10);
        assert_eq!(custom.records[0].count(calves_f), 0);
        assert_ne!(builtin.fingerprint, custom.fingerprint);
    }
}
