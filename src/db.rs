// 🗄️ Storage - cleaned extracts in SQLite (WAL) with an audit trail
//
// An extract is stored once per fingerprint: importing the same bytes with
// the same settings twice writes nothing the second time.

use crate::error::Result;
use crate::holding::{HoldingIdentity, HoldingRecord, Population};
use crate::pipeline::CleanedExtract;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

/// Event for audit trail
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub fingerprint: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(event_type: &str, fingerprint: &str, data: serde_json::Value, actor: &str) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            fingerprint: fingerprint.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

/// One row of the `extracts` table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractRow {
    pub fingerprint: String,
    pub source_name: String,
    pub release_id: String,
    pub rows_read: usize,
    pub record_count: usize,
    pub dropped_count: usize,
    pub imported_at: DateTime<Utc>,
}

/// A stored extract with its holdings, in input order
#[derive(Debug, Clone)]
pub struct StoredExtract {
    pub extract: ExtractRow,
    pub records: Vec<HoldingRecord>,
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Extracts Table (one row per fingerprint)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS extracts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            fingerprint TEXT UNIQUE NOT NULL,
            source_name TEXT NOT NULL,
            release_id TEXT NOT NULL,
            rows_read INTEGER NOT NULL,
            record_count INTEGER NOT NULL,
            dropped_count INTEGER NOT NULL,
            imported_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Holdings Table (validated records only)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS holdings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            fingerprint TEXT NOT NULL REFERENCES extracts(fingerprint),
            line INTEGER NOT NULL,
            municipality TEXT NOT NULL,
            vereda TEXT NOT NULL,
            owner TEXT NOT NULL,
            holding_name TEXT NOT NULL,
            latitude REAL,
            longitude REAL,
            population TEXT NOT NULL,
            total_population INTEGER NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_holdings_fingerprint ON holdings(fingerprint)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_holdings_municipality ON holdings(municipality)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_fingerprint ON events(fingerprint)",
        [],
    )?;

    Ok(())
}

/// Store a cleaned extract. Returns false when the fingerprint is already stored.
pub fn insert_extract(conn: &Connection, extract: &CleanedExtract) -> Result<bool> {
    let tx = conn.unchecked_transaction()?;

    let result = tx.execute(
        "INSERT INTO extracts (
            fingerprint, source_name, release_id, rows_read, record_count, dropped_count, imported_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            extract.fingerprint,
            extract.source_name,
            extract.release_id,
            extract.rows_read as i64,
            extract.records.len() as i64,
            extract.dropped_count() as i64,
            Utc::now().to_rfc3339(),
        ],
    );

    match result {
        Ok(_) => {}
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            tracing::info!(fingerprint = %extract.fingerprint, "extract already stored, skipping");
            return Ok(false);
        }
        Err(e) => return Err(e.into()),
    }

    {
        let mut stmt = tx.prepare(
            "INSERT INTO holdings (
                fingerprint, line, municipality, vereda, owner, holding_name,
                latitude, longitude, population, total_population
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )?;

        for record in &extract.records {
            let population_json = serde_json::to_string(record.population())?;
            stmt.execute(params![
                extract.fingerprint,
                record.line() as i64,
                record.identity().municipality,
                record.identity().vereda,
                record.identity().owner,
                record.identity().holding_name,
                record.latitude(),
                record.longitude(),
                population_json,
                record.total_population() as i64,
            ])?;
        }
    }

    let event = Event::new(
        "extract_imported",
        &extract.fingerprint,
        serde_json::json!({
            "source": extract.source_name,
            "release": extract.release_id,
            "records": extract.records.len(),
            "dropped": extract.dropped_count(),
        }),
        "census_importer",
    );
    insert_event(&tx, &event)?;

    tx.commit()?;

    tracing::info!(
        fingerprint = %extract.fingerprint,
        records = extract.records.len(),
        "extract stored"
    );
    Ok(true)
}

fn parse_timestamp(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn extract_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ExtractRow> {
    let imported_at: String = row.get(6)?;
    Ok(ExtractRow {
        fingerprint: row.get(0)?,
        source_name: row.get(1)?,
        release_id: row.get(2)?,
        rows_read: row.get::<_, i64>(3)? as usize,
        record_count: row.get::<_, i64>(4)? as usize,
        dropped_count: row.get::<_, i64>(5)? as usize,
        imported_at: parse_timestamp(&imported_at)?,
    })
}

/// Every stored extract, newest first
pub fn list_extracts(conn: &Connection) -> Result<Vec<ExtractRow>> {
    let mut stmt = conn.prepare(
        "SELECT fingerprint, source_name, release_id, rows_read, record_count, dropped_count, imported_at
         FROM extracts
         ORDER BY id DESC",
    )?;

    let rows = stmt
        .query_map([], extract_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Load a stored extract and its holdings
pub fn load_extract(conn: &Connection, fingerprint: &str) -> Result<Option<StoredExtract>> {
    let extract = conn
        .query_row(
            "SELECT fingerprint, source_name, release_id, rows_read, record_count, dropped_count, imported_at
             FROM extracts
             WHERE fingerprint = ?1",
            params![fingerprint],
            extract_from_row,
        )
        .optional()?;

    let extract = match extract {
        Some(extract) => extract,
        None => return Ok(None),
    };

    let mut stmt = conn.prepare(
        "SELECT line, municipality, vereda, owner, holding_name, latitude, longitude, population
         FROM holdings
         WHERE fingerprint = ?1
         ORDER BY id",
    )?;

    let records = stmt
        .query_map(params![fingerprint], |row| {
            let population_json: String = row.get(7)?;
            let population: Population = serde_json::from_str(&population_json).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
            })?;

            // SQLite stores NaN as NULL
            let latitude: Option<f64> = row.get(5)?;
            let longitude: Option<f64> = row.get(6)?;

            Ok(HoldingRecord::new(
                row.get::<_, i64>(0)? as u64,
                HoldingIdentity {
                    municipality: row.get(1)?,
                    vereda: row.get(2)?,
                    owner: row.get(3)?,
                    holding_name: row.get(4)?,
                },
                latitude.unwrap_or(f64::NAN),
                longitude.unwrap_or(f64::NAN),
                population,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(Some(StoredExtract { extract, records }))
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, fingerprint, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.fingerprint,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific extract, newest first
pub fn get_events_for_extract(conn: &Connection, fingerprint: &str) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, fingerprint, data, actor
         FROM events
         WHERE fingerprint = ?1
         ORDER BY timestamp DESC",
    )?;

    let events = stmt
        .query_map(params![fingerprint], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(4)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: parse_timestamp(&timestamp_str)?,
                event_type: row.get(2)?,
                fingerprint: row.get(3)?,
                data: serde_json::from_str(&data_json).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
                })?,
                actor: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AgeBracket, Bucket, IdentityColumns, ReleaseCatalog, ReleaseSchema, Sex};
    use crate::geo::GeoPredicate;
    use crate::loader::{LoadOptions, TextEncoding};
    use crate::pipeline::Pipeline;

    const DATA: &str = "MUNICIPIO;VEREDA;GANADERO;NOMBRE_PREDIO;LATITUD;LONGITUD;AFTOSA_BOVINOS_HEMBRAS_0_3_MESES;AFTOSA_BOVINOS_MACHOS_MAYORES_36_MESES
Popayán;La Rejoya;Ana;El Recreo;2,45;-76,6;10;2
Timbío;Las Piedras;Luis;La Loma;2,35;-76,7;0;0
Popayán;;;;-1,0;-76,6;1;1
";

    fn cleaned() -> CleanedExtract {
        Pipeline::default()
            .run_bytes("test.csv", DATA.as_bytes(), LoadOptions::new(b';', TextEncoding::Utf8))
            .unwrap()
    }

    #[test]
    fn test_idempotency_import_twice() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        let extract = cleaned();

        let first = insert_extract(&conn, &extract).unwrap();
        let second = insert_extract(&conn, &extract).unwrap();
        println!("First import: {}, second import: {}", first, second);

        assert!(first, "First import should write the extract");
        assert!(!second, "Second import should be skipped");

        let extracts = list_extracts(&conn).unwrap();
        assert_eq!(extracts.len(), 1);
        assert_eq!(extracts[0].record_count, 2);
        assert_eq!(extracts[0].dropped_count, 1);
        assert_eq!(extracts[0].rows_read, 3);

        let holdings: i64 = conn
            .query_row("SELECT COUNT(*) FROM holdings", [], |row| row.get(0))
            .unwrap();
        assert_eq!(holdings, 2);
    }

    #[test]
    fn test_same_bytes_with_changed_catalog_are_stored_again() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

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
        let custom = Pipeline::new(remapped, None, GeoPredicate::default())
            .run_bytes("test.csv", DATA.as_bytes(), LoadOptions::new(b';', TextEncoding::Utf8))
            .unwrap();

        assert!(insert_extract(&conn, &cleaned()).unwrap());
        assert!(insert_extract(&conn, &custom).unwrap(), "remapped extract must not be skipped");
        assert_eq!(list_extracts(&conn).unwrap().len(), 2);

        let stored = load_extract(&conn, &custom.fingerprint).unwrap().unwrap();
        let calves_m = Bucket::new(Sex::Male, AgeBracket::Months0To3);
        assert_eq!(stored.records[0].count(calves_m), 10);
    }

    #[test]
    fn test_load_extract_round_trip() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        let extract = cleaned();
        insert_extract(&conn, &extract).unwrap();

        let stored = load_extract(&conn, &extract.fingerprint).unwrap().unwrap();
        assert_eq!(stored.extract.release_id, "ica-2022-c1");
        assert_eq!(stored.records, extract.records);
        assert_eq!(stored.records[0].total_population(), 12);

        assert!(load_extract(&conn, "missing").unwrap().is_none());
    }

    #[test]
    fn test_event_log() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        let extract = cleaned();
        insert_extract(&conn, &extract).unwrap();

        let manual = Event::new(
            "report_viewed",
            &extract.fingerprint,
            serde_json::json!({"municipios": ["Popayán"]}),
            "test_actor",
        );
        insert_event(&conn, &manual).unwrap();

        let events = get_events_for_extract(&conn, &extract.fingerprint).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().any(|e| e.event_type == "extract_imported"));
        assert!(events.iter().any(|e| e.actor == "test_actor"));

        println!("✅ Event log test PASSED");
    }
}
