// 🔢 Field Normalizer - raw text → typed values
//
// Census extracts use a decimal comma ("2,45", "10,0"). Empty count cells
// mean "none reported" and become 0. Anything that still fails to parse after
// separator substitution is garbled and surfaces as NumericParse.

use crate::error::{PipelineError, Result};
use crate::loader::RawRecord;
use crate::schema::ResolvedSchema;
use crate::catalog::Bucket;

/// Largest count an f64 still represents exactly (2^53)
pub const MAX_EXACT_COUNT: f64 = 9_007_199_254_740_992.0;

// ============================================================================
// SCALAR PARSERS
// ============================================================================

/// Parse decimal-comma (or decimal-point) text. `None` if not a number.
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().replace(',', ".");
    cleaned.parse::<f64>().ok()
}

/// Coordinate field: empty is missing (NaN, rejected later by the
/// geospatial predicate), garbled or non-finite text is an error.
pub fn normalize_coordinate(raw: &str, line: u64, field: &str) -> Result<f64> {
    if raw.trim().is_empty() {
        return Ok(f64::NAN);
    }

    match parse_decimal(raw) {
        Some(value) if value.is_finite() => Ok(value),
        _ => Err(numeric_error(raw, line, field)),
    }
}

/// Count field: empty → 0; otherwise a finite, non-negative whole number
/// no larger than `MAX_EXACT_COUNT`.
pub fn normalize_count(raw: &str, line: u64, field: &str) -> Result<u64> {
    if raw.trim().is_empty() {
        return Ok(0);
    }

    match parse_decimal(raw) {
        Some(value)
            if value.is_finite()
                && value >= 0.0
                && value <= MAX_EXACT_COUNT
                && value.fract() == 0.0 =>
        {
            Ok(value as u64)
        }
        _ => Err(numeric_error(raw, line, field)),
    }
}

fn numeric_error(raw: &str, line: u64, field: &str) -> PipelineError {
    PipelineError::NumericParse {
        line,
        field: field.to_string(),
        value: raw.to_string(),
    }
}

// ============================================================================
// NORMALIZED RECORD
// ============================================================================

/// One parsed count cell, still keyed by its raw column
#[derive(Debug, Clone, PartialEq)]
pub struct RawCount {
    pub column: String,
    pub bucket: Bucket,
    pub value: u64,
}

/// A raw record with every field the pipeline uses converted to its type
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub line: u64,
    pub municipality: String,
    pub vereda: String,
    pub owner: String,
    pub holding_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub counts: Vec<RawCount>,
}

/// Convert the identity, coordinate and bucket-count fields of one row
pub fn normalize_record(raw: &RawRecord, schema: &ResolvedSchema) -> Result<NormalizedRecord> {
    let line = raw.line();
    let text = |position: Option<usize>| -> String {
        position
            .and_then(|p| raw.value_at(p))
            .map(|v| v.trim().to_string())
            .unwrap_or_default()
    };

    let columns = &schema.columns;
    let latitude = normalize_coordinate(
        raw.value_at(columns.latitude).unwrap_or(""),
        line,
        &schema.identity.latitude,
    )?;
    let longitude = normalize_coordinate(
        raw.value_at(columns.longitude).unwrap_or(""),
        line,
        &schema.identity.longitude,
    )?;

    let mut counts = Vec::with_capacity(schema.bucket_columns.len());
    for column in &schema.bucket_columns {
        let value = normalize_count(
            raw.value_at(column.position).unwrap_or(""),
            line,
            &column.name,
        )?;
        counts.push(RawCount {
            column: column.name.clone(),
            bucket: column.bucket,
            value,
        });
    }

    Ok(NormalizedRecord {
        line,
        municipality: text(Some(columns.municipality)),
        vereda: text(columns.vereda),
        owner: text(columns.owner),
        holding_name: text(columns.holding),
        latitude,
        longitude,
        counts,
    })
}

// ============================================================================
// TESTS
// ============================================================================
