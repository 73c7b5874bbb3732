// 📂 Raw Record Loader - delimited text → named raw fields
//
// Decodes the whole extract once under the stated encoding, then hands out
// lazy row iterators over the decoded text. `records()` can be called any
// number of times and always yields the same rows.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

// ============================================================================
// LOAD OPTIONS
// ============================================================================

/// Text encodings the census extracts are published in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextEncoding {
    #[serde(rename = "utf-8", alias = "utf8")]
    Utf8,
    #[serde(rename = "latin1", alias = "latin-1", alias = "iso-8859-1")]
    Latin1,
}

impl TextEncoding {
    pub fn name(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Latin1 => "latin1",
        }
    }

    /// Decode bytes into text; `Err` carries a human-readable reason
    pub fn decode(&self, bytes: &[u8]) -> std::result::Result<String, String> {
        match self {
            TextEncoding::Utf8 => String::from_utf8(bytes.to_vec()).map_err(|e| {
                format!(
                    "invalid utf-8 at byte offset {}",
                    e.utf8_error().valid_up_to()
                )
            }),
            // ISO-8859-1 maps every byte to the code point of the same value
            TextEncoding::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TextEncoding {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(TextEncoding::Utf8),
            "latin1" | "latin-1" | "iso-8859-1" => Ok(TextEncoding::Latin1),
            other => Err(PipelineError::Config(format!(
                "unsupported encoding '{}' (expected utf-8 or latin1)",
                other
            ))),
        }
    }
}

/// The two parameters every extract must be read with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoadOptions {
    pub delimiter: u8,
    pub encoding: TextEncoding,
}

impl LoadOptions {
    pub fn new(delimiter: u8, encoding: TextEncoding) -> Self {
        LoadOptions {
            delimiter,
            encoding,
        }
    }
}

impl Default for LoadOptions {
    /// Settings of the published ICA flat files
    fn default() -> Self {
        LoadOptions::new(b';', TextEncoding::Latin1)
    }
}

// ============================================================================
// RAW HEADER + RAW RECORD
// ============================================================================

/// Header row of an extract, shared by every record
#[derive(Debug)]
pub struct RawHeader {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl RawHeader {
    fn new(names: Vec<String>) -> Self {
        let mut index = HashMap::new();
        for (i, name) in names.iter().enumerate() {
            // First occurrence wins for repeated header names
            index.entry(name.clone()).or_insert(i);
        }
        RawHeader { names, index }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// One row of the extract: raw column name → raw text
#[derive(Debug, Clone)]
pub struct RawRecord {
    header: Arc<RawHeader>,
    values: csv::StringRecord,
    line: u64,
}

impl RawRecord {
    /// Value of a named column, if the header has it
    pub fn get(&self, name: &str) -> Option<&str> {
        self.header.position(name).and_then(|i| self.values.get(i))
    }

    pub fn value_at(&self, index: usize) -> Option<&str> {
        self.values.get(index)
    }

    /// 1-based line number in the source extract
    pub fn line(&self) -> u64 {
        self.line
    }

    pub fn header(&self) -> &RawHeader {
        &self.header
    }

    /// (column name, value) pairs in header order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.header
            .names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

// ============================================================================
// EXTRACT SOURCE
// ============================================================================

/// A decoded extract, ready to be read (and re-read) row by row
#[derive(Debug, Clone)]
pub struct ExtractSource {
    name: String,
    text: String,
    options: LoadOptions,
}

impl ExtractSource {
    /// Decode an in-memory extract
    pub fn from_bytes(name: impl Into<String>, bytes: &[u8], options: LoadOptions) -> Result<Self> {
        let name = name.into();
        let mut text = options
            .encoding
            .decode(bytes)
            .map_err(|reason| PipelineError::SourceUnreadable {
                source_name: name.clone(),
                reason: format!("cannot decode as {}: {}", options.encoding, reason),
            })?;

        if text.starts_with('\u{feff}') {
            text.remove(0);
        }

        Ok(ExtractSource {
            name,
            text,
            options,
        })
    }

    /// Read and decode an extract from disk
    pub fn open(path: &Path, options: LoadOptions) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| PipelineError::SourceUnreadable {
            source_name: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_bytes(path.display().to_string(), &bytes, options)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> LoadOptions {
        self.options
    }

    fn reader(&self) -> csv::Reader<&[u8]> {
        csv::ReaderBuilder::new()
            .delimiter(self.options.delimiter)
            .has_headers(true)
            // Field counts are checked per row to report MalformedRow with context
            .flexible(true)
            .from_reader(self.text.as_bytes())
    }

    fn read_header(&self, reader: &mut csv::Reader<&[u8]>) -> Result<Arc<RawHeader>> {
        let record = reader
            .headers()
            .map_err(|e| PipelineError::SourceUnreadable {
                source_name: self.name.clone(),
                reason: format!("cannot read header row: {}", e),
            })?;

        let names: Vec<String> = record.iter().map(|h| h.trim().to_string()).collect();
        if names.iter().all(|n| n.is_empty()) {
            return Err(PipelineError::SourceUnreadable {
                source_name: self.name.clone(),
                reason: "extract has no header row".to_string(),
            });
        }

        Ok(Arc::new(RawHeader::new(names)))
    }

    /// Header column names, trimmed
    pub fn headers(&self) -> Result<Vec<String>> {
        let mut reader = self.reader();
        Ok(self.read_header(&mut reader)?.names().to_vec())
    }

    /// Lazy sequence of rows; restartable by calling again
    pub fn records(&self) -> Result<RawRecords<'_>> {
        let mut reader = self.reader();
        let header = self.read_header(&mut reader)?;
        Ok(RawRecords {
            source_name: &self.name,
            header,
            inner: reader.into_records(),
        })
    }
}

/// Iterator over the rows of an `ExtractSource`
pub struct RawRecords<'a> {
    source_name: &'a str,
    header: Arc<RawHeader>,
    inner: csv::StringRecordsIntoIter<&'a [u8]>,
}

impl<'a> RawRecords<'a> {
    pub fn header(&self) -> &RawHeader {
        &self.header
    }
}

impl<'a> Iterator for RawRecords<'a> {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let result = self.inner.next()?;

        let record = match result {
            Ok(record) => record,
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or(0);
                return Some(Err(PipelineError::SourceUnreadable {
                    source_name: self.source_name.to_string(),
                    reason: format!("line {}: {}", line, e),
                }));
            }
        };

        let line = record.position().map(|p| p.line()).unwrap_or(0);

        if record.len() != self.header.len() {
            return Some(Err(PipelineError::MalformedRow {
                line,
                expected: self.header.len(),
                found: record.len(),
            }));
        }

        Some(Ok(RawRecord {
            header: Arc::clone(&self.header),
            values: record,
            line,
        }))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn utf8_semicolon() -> LoadOptions {
        LoadOptions::new(b';', TextEncoding::Utf8)
    }

    #[test]
    fn test_reads_named_fields() {
        let data = "MUNICIPIO;LATITUD\nPopayán;2,45\nTimbío;2,35\n";
        let source = ExtractSource::from_bytes("test.csv", data.as_bytes(), utf8_semicolon()).unwrap();

        let records: Vec<RawRecord> = source.records().unwrap().collect::<Result<_>>().unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("MUNICIPIO"), Some("Popayán"));
        assert_eq!(records[0].get("LATITUD"), Some("2,45"));
        assert_eq!(records[0].line(), 2);
        assert_eq!(records[1].line(), 3);
        assert_eq!(records[1].get("NOPE"), None);
    }

    #[test]
    fn test_records_are_restartable() {
        let data = "A;B\n1;2\n3;4\n";
        let source = ExtractSource::from_bytes("t.csv", data.as_bytes(), utf8_semicolon()).unwrap();

        let first: Vec<Vec<String>> = source
            .records()
            .unwrap()
            .map(|r| r.unwrap().iter().map(|(_, v)| v.to_string()).collect())
            .collect();
        let second: Vec<Vec<String>> = source
            .records()
            .unwrap()
            .map(|r| r.unwrap().iter().map(|(_, v)| v.to_string()).collect())
            .collect();

        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_latin1_decoding() {
        // "Popayán" with á as the single byte 0xE1
        let mut bytes = b"MUNICIPIO\nPopay".to_vec();
        bytes.push(0xE1);
        bytes.extend_from_slice(b"n\n");

        let source = ExtractSource::from_bytes(
            "latin.csv",
            &bytes,
            LoadOptions::new(b';', TextEncoding::Latin1),
        )
        .unwrap();
        let record = source.records().unwrap().next().unwrap().unwrap();
        assert_eq!(record.get("MUNICIPIO"), Some("Popayán"));
    }

    #[test]
    fn test_invalid_utf8_is_unreadable() {
        let bytes = vec![b'A', b'\n', 0xE1, b'\n'];
        let err = ExtractSource::from_bytes("bad.csv", &bytes, utf8_semicolon()).unwrap_err();
        assert!(matches!(err, PipelineError::SourceUnreadable { .. }));
    }

    #[test]
    fn test_missing_file_is_unreadable() {
        let err = ExtractSource::open(Path::new("/definitely/not/here.csv"), LoadOptions::default())
            .unwrap_err();
        assert!(matches!(err, PipelineError::SourceUnreadable { .. }));
    }

    #[test]
    fn test_malformed_row_reports_line() {
        let data = "A;B;C\n1;2;3\n4;5\n";
        let source = ExtractSource::from_bytes("t.csv", data.as_bytes(), utf8_semicolon()).unwrap();

        let results: Vec<Result<RawRecord>> = source.records().unwrap().collect();
        assert!(results[0].is_ok());
        match &results[1] {
            Err(PipelineError::MalformedRow {
                line,
                expected,
                found,
            }) => {
                assert_eq!(*line, 3);
                assert_eq!(*expected, 3);
                assert_eq!(*found, 2);
            }
            other => panic!("expected MalformedRow, got {:?}", other),
        }
    }

    #[test]
    fn test_bom_and_header_whitespace_stripped() {
        let data = "\u{feff} MUNICIPIO ;LATITUD\nX;1\n";
        let source = ExtractSource::from_bytes("t.csv", data.as_bytes(), utf8_semicolon()).unwrap();
        assert_eq!(source.headers().unwrap(), vec!["MUNICIPIO", "LATITUD"]);
    }

    #[test]
    fn test_encoding_from_str() {
        assert_eq!("UTF-8".parse::<TextEncoding>().unwrap(), TextEncoding::Utf8);
        assert_eq!("iso-8859-1".parse::<TextEncoding>().unwrap(), TextEncoding::Latin1);
        assert!("ebcdic".parse::<TextEncoding>().is_err());
    }
}
