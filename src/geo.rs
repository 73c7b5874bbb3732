// 🌎 Geospatial Validator - keep holdings with plausible coordinates
//
// Default rule: north of the equator and west of the prime meridian
// (latitude > 0, longitude < 0). It is a loose heuristic; a bounding box can
// replace it when the deployment region is known. Records are dropped and
// counted, never repaired or clamped.

use crate::holding::HoldingRecord;
use serde::{Deserialize, Serialize};

// ============================================================================
// PREDICATE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum GeoPredicate {
    /// latitude > 0 and longitude < 0
    NorthWestHemisphere,

    /// Inclusive rectangle
    BoundingBox {
        min_lat: f64,
        max_lat: f64,
        min_lon: f64,
        max_lon: f64,
    },
}

impl GeoPredicate {
    /// NaN coordinates fail every comparison and are therefore invalid
    pub fn accepts(&self, latitude: f64, longitude: f64) -> bool {
        match *self {
            GeoPredicate::NorthWestHemisphere => latitude > 0.0 && longitude < 0.0,
            GeoPredicate::BoundingBox {
                min_lat,
                max_lat,
                min_lon,
                max_lon,
            } => {
                latitude >= min_lat
                    && latitude <= max_lat
                    && longitude >= min_lon
                    && longitude <= max_lon
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            GeoPredicate::NorthWestHemisphere => "latitude > 0 and longitude < 0".to_string(),
            GeoPredicate::BoundingBox {
                min_lat,
                max_lat,
                min_lon,
                max_lon,
            } => format!(
                "{} <= latitude <= {} and {} <= longitude <= {}",
                min_lat, max_lat, min_lon, max_lon
            ),
        }
    }
}

impl Default for GeoPredicate {
    fn default() -> Self {
        GeoPredicate::NorthWestHemisphere
    }
}

// ============================================================================
// VALIDATION OUTCOME
// ============================================================================

/// A holding rejected by the predicate (kept only as provenance)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedRecord {
    pub line: u64,
    pub municipality: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone)]
pub struct GeoOutcome {
    pub valid: Vec<HoldingRecord>,
    pub dropped: Vec<DroppedRecord>,
}

impl GeoOutcome {
    pub fn dropped_count(&self) -> usize {
        self.dropped.len()
    }
}

// ============================================================================
// VALIDATOR
// ============================================================================

pub struct GeoValidator {
    predicate: GeoPredicate,
}

impl GeoValidator {
    pub fn new(predicate: GeoPredicate) -> Self {
        GeoValidator { predicate }
    }

    pub fn predicate(&self) -> GeoPredicate {
        self.predicate
    }

    pub fn is_valid(&self, record: &HoldingRecord) -> bool {
        self.predicate.accepts(record.latitude(), record.longitude())
    }

    /// Split records into valid and dropped, preserving input order
    pub fn validate(&self, records: Vec<HoldingRecord>) -> GeoOutcome {
        let mut valid = Vec::with_capacity(records.len());
        let mut dropped = Vec::new();

        for record in records {
            if self.is_valid(&record) {
                valid.push(record);
            } else {
                tracing::debug!(
                    line = record.line(),
                    latitude = record.latitude(),
                    longitude = record.longitude(),
                    "holding dropped by geospatial rule"
                );
                dropped.push(DroppedRecord {
                    line: record.line(),
                    municipality: record.identity().municipality.clone(),
                    latitude: record.latitude(),
                    longitude: record.longitude(),
                });
            }
        }

        if !dropped.is_empty() {
            tracing::warn!(
                dropped = dropped.len(),
                kept = valid.len(),
                rule = %self.predicate.describe(),
                "holdings with invalid coordinates dropped"
            );
        }

        GeoOutcome { valid, dropped }
    }
}

impl Default for GeoValidator {
    fn default() -> Self {
        Self::new(GeoPredicate::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::holding::{HoldingIdentity, Population};

    fn record(line: u64, lat: f64, lon: f64) -> HoldingRecord {
        HoldingRecord::new(line, HoldingIdentity::default(), lat, lon, Population::zeroed())
    }

    #[test]
    fn test_hemisphere_predicate() {
        let p = GeoPredicate::NorthWestHemisphere;
        assert!(p.accepts(2.45, -76.6));
        assert!(!p.accepts(-1.0, -76.6));
        assert!(!p.accepts(2.45, 76.6));
        assert!(!p.accepts(0.0, -76.6));
        assert!(!p.accepts(f64::NAN, -76.6));
    }

    #[test]
    fn test_south_of_equator_dropped_once() {
        let validator = GeoValidator::default();
        let outcome = validator.validate(vec![
            record(2, 2.45, -76.6),
            record(3, -1.0, -76.6),
            record(4, 2.50, -76.5),
        ]);

        assert_eq!(outcome.valid.len(), 2);
        assert_eq!(outcome.dropped_count(), 1);
        assert_eq!(outcome.dropped[0].line, 3);
        assert!(outcome
            .valid
            .iter()
            .all(|r| r.latitude() > 0.0 && r.longitude() < 0.0));
        assert_eq!(outcome.valid[0].line(), 2);
        assert_eq!(outcome.valid[1].line(), 4);
    }

    #[test]
    fn test_bounding_box() {
        // Rough box around Cauca
        let validator = GeoValidator::new(GeoPredicate::BoundingBox {
            min_lat: 0.9,
            max_lat: 3.4,
            min_lon: -78.2,
            max_lon: -75.7,
        });

        let outcome = validator.validate(vec![
            record(2, 2.45, -76.6),
            // Valid for the hemisphere rule, outside the box (Bogotá)
            record(3, 4.7, -74.1),
        ]);

        assert_eq!(outcome.valid.len(), 1);
        assert_eq!(outcome.dropped[0].line, 3);
    }

    #[test]
    fn test_predicate_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            geo: GeoPredicate,
        }

        let w: Wrapper = toml::from_str(
            r#"
            [geo]
            kind = "bounding-box"
            min_lat = 0.9
            max_lat = 3.4
            min_lon = -78.2
            max_lon = -75.7
            "#,
        )
        .unwrap();
        assert!(matches!(w.geo, GeoPredicate::BoundingBox { .. }));
    }
}
