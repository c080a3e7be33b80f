// ==============================================================================
// reference_index.rs - Resident Reference Corpus Index
// ==============================================================================
// Description: Loads the SNP annotation corpus once and serves O(1) lookups
// Author: Matt Barham
// Created: 2025-11-12
// Modified: 2026-10-18
// Version: 2.0.0
// ==============================================================================
// Supported corpus formats:
//   - SQLite database (*.db, *.sqlite): table snps(rsid TEXT, content TEXT)
//     holding SNPedia wiki markup, one page per row
//   - JSON Lines (*.jsonl, *.jsonl.gz): one serialized VariantRecord per line
// The index is immutable after construction and shared as Arc<ReferenceIndex>.
// ==============================================================================

use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use crate::genotype::{normalize_genotype, normalize_rsid};
use crate::models::VariantRecord;
use crate::parsers::{SnpediaParser, GZIP_MAGIC};

/// Reference corpus load errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CorpusError {
    #[error("Reference corpus unavailable at {location}: {reason}")]
    CorpusUnavailable { location: String, reason: String },

    #[error("Reference corpus corrupt at {location}: {reason}")]
    CorpusCorrupt { location: String, reason: String },
}

/// Corpus composition (mirrors the SNPedia rs/i split)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub total_records: usize,
    pub rs_records: usize,
    pub i_records: usize,
    pub other_records: usize,
    pub skipped_records: u64,
}

/// Read-only identifier -> VariantRecord map
#[derive(Debug, Default)]
pub struct ReferenceIndex {
    records: HashMap<String, VariantRecord>,
    skipped: u64,
    source: String,
}

impl ReferenceIndex {
    /// Open and fully load a corpus (the `open_index` operation)
    ///
    /// # Returns
    /// * `Ok(ReferenceIndex)` - Loaded index; corrupt rows skipped with a warning
    /// * `Err(CorpusError::CorpusUnavailable)` - Backing data cannot be opened or read
    /// * `Err(CorpusError::CorpusCorrupt)` - Wrong schema, or rows present but none parse
    pub fn open<P: AsRef<Path>>(location: P) -> Result<Self, CorpusError> {
        let path = location.as_ref();
        let source = path.display().to_string();

        if !path.is_file() {
            return Err(CorpusError::CorpusUnavailable {
                location: source,
                reason: "file not found".to_string(),
            });
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        let index = if file_name.ends_with(".jsonl") || file_name.ends_with(".jsonl.gz") {
            Self::open_jsonl(path, source)?
        } else {
            Self::open_sqlite(path, source)?
        };

        let stats = index.stats();
        info!(
            "Reference index loaded from {}: {} records ({} rs, {} i, {} other, {} skipped)",
            index.source,
            stats.total_records,
            stats.rs_records,
            stats.i_records,
            stats.other_records,
            stats.skipped_records
        );

        Ok(index)
    }

    /// Build an index from already-parsed records
    ///
    /// Identifiers and genotype keys are normalized; the first record wins on duplicates.
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = VariantRecord>,
    {
        Self::build("<memory>".to_string(), records.into_iter().map(Ok))
    }

    fn open_sqlite(path: &Path, source: String) -> Result<Self, CorpusError> {
        let unavailable = |e: rusqlite::Error| CorpusError::CorpusUnavailable {
            location: source.clone(),
            reason: e.to_string(),
        };

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(unavailable)?;

        let mut stmt = conn
            .prepare("SELECT rsid, content FROM snps")
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(ref err, _)
                    if err.code == rusqlite::ErrorCode::NotADatabase =>
                {
                    CorpusError::CorpusUnavailable {
                        location: source.clone(),
                        reason: e.to_string(),
                    }
                }
                _ => CorpusError::CorpusCorrupt {
                    location: source.clone(),
                    reason: format!("snps table unreadable: {}", e),
                },
            })?;

        let parser = SnpediaParser::new();
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, Option<String>>(0)?,
                    row.get::<_, Option<String>>(1)?,
                ))
            })
            .map_err(unavailable)?;

        let records = rows.map(|row| match row {
            Ok((rsid, content)) => parser
                .parse_record(
                    rsid.as_deref().unwrap_or_default(),
                    content.as_deref().unwrap_or_default(),
                )
                .map_err(|e| e.to_string()),
            Err(e) => Err(format!("row unreadable: {}", e)),
        });

        Self::build_checked(source.clone(), records)
    }

    fn open_jsonl(path: &Path, source: String) -> Result<Self, CorpusError> {
        let file = File::open(path).map_err(|e| CorpusError::CorpusUnavailable {
            location: source.clone(),
            reason: e.to_string(),
        })?;

        let mut buffered = BufReader::new(file);
        let is_gzipped = buffered
            .fill_buf()
            .map(|head| head.starts_with(&GZIP_MAGIC))
            .unwrap_or(false);
        let stream: Box<dyn Read> = if is_gzipped {
            Box::new(flate2::read::MultiGzDecoder::new(buffered))
        } else {
            Box::new(buffered)
        };

        let mut lines = Vec::new();
        for line in BufReader::new(stream).lines() {
            let line = line.map_err(|e| CorpusError::CorpusUnavailable {
                location: source.clone(),
                reason: e.to_string(),
            })?;
            if !line.trim().is_empty() {
                lines.push(line);
            }
        }

        let records = lines.iter().map(|line| {
            serde_json::from_str::<VariantRecord>(line).map_err(|e| e.to_string())
        });

        Self::build_checked(source.clone(), records)
    }

    fn build_checked<I>(source: String, rows: I) -> Result<Self, CorpusError>
    where
        I: Iterator<Item = Result<VariantRecord, String>>,
    {
        let index = Self::build(source, rows);
        if index.records.is_empty() && index.skipped > 0 {
            return Err(CorpusError::CorpusCorrupt {
                location: index.source,
                reason: format!("none of {} records could be parsed", index.skipped),
            });
        }
        Ok(index)
    }

    fn build<I>(source: String, rows: I) -> Self
    where
        I: Iterator<Item = Result<VariantRecord, String>>,
    {
        let mut records = HashMap::new();
        let mut skipped = 0u64;

        for row in rows {
            match row {
                Ok(record) => {
                    let record = normalize_record(record);
                    if record.rsid.is_empty() {
                        warn!("Skipping corpus record with empty identifier");
                        skipped += 1;
                        continue;
                    }
                    if records.contains_key(&record.rsid) {
                        warn!("Duplicate corpus record {}, keeping first", record.rsid);
                        continue;
                    }
                    records.insert(record.rsid.clone(), record);
                }
                Err(reason) => {
                    warn!("Skipping corrupt corpus record: {}", reason);
                    skipped += 1;
                }
            }
        }

        Self {
            records,
            skipped,
            source,
        }
    }

    /// Exact-match lookup, case-insensitive on the identifier
    pub fn get(&self, rsid: &str) -> Option<&VariantRecord> {
        self.records
            .get(rsid)
            .or_else(|| self.records.get(&normalize_rsid(rsid)))
    }

    pub fn contains(&self, rsid: &str) -> bool {
        self.get(rsid).is_some()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Where the corpus was loaded from
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn stats(&self) -> IndexStats {
        let mut stats = IndexStats {
            total_records: self.records.len(),
            skipped_records: self.skipped,
            ..IndexStats::default()
        };
        for key in self.records.keys() {
            if key.starts_with("rs") {
                stats.rs_records += 1;
            } else if key.starts_with('i') {
                stats.i_records += 1;
            } else {
                stats.other_records += 1;
            }
        }
        stats
    }
}

fn normalize_record(mut record: VariantRecord) -> VariantRecord {
    record.rsid = normalize_rsid(&record.rsid);
    if record.genotypes.keys().any(|k| normalize_genotype(k) != *k) {
        record.genotypes = std::mem::take(&mut record.genotypes)
            .into_iter()
            .map(|(k, v)| (normalize_genotype(&k), v))
            .collect();
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Repute;
    use std::io::Write;
    use tempfile::tempdir;

    fn create_sqlite_corpus(rows: &[(&str, &str)]) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("corpus.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute("CREATE TABLE snps (rsid TEXT, content TEXT)", [])
            .unwrap();
        for (rsid, content) in rows {
            conn.execute(
                "INSERT INTO snps (rsid, content) VALUES (?1, ?2)",
                rusqlite::params![rsid, content],
            )
            .unwrap();
        }
        (dir, path)
    }

    #[test]
    fn test_open_sqlite_corpus() {
        let (_dir, path) = create_sqlite_corpus(&[
            ("Rs53576", "magnitude = 2.5\nrepute = Good\nsummary = empathy"),
            ("rs1801133", "magnitude = 3\nrepute = Bad\n{{Rsnum|rs1801133|A|A|reduced MTHFR}}"),
            ("i3003137", "summary = internal id"),
        ]);

        let index = ReferenceIndex::open(&path).unwrap();

        assert_eq!(index.len(), 3);
        let oxtr = index.get("RS53576").unwrap();
        assert_eq!(oxtr.magnitude, Some(2.5));
        assert_eq!(oxtr.repute, Repute::Good);
        assert_eq!(index.get("rs1801133").unwrap().genotypes["AA"], "reduced MTHFR");
        assert!(index.get("rs999").is_none());

        let stats = index.stats();
        assert_eq!(stats.rs_records, 2);
        assert_eq!(stats.i_records, 1);
        assert_eq!(stats.skipped_records, 0);
    }

    #[test]
    fn test_corrupt_record_is_skipped() {
        let (_dir, path) = create_sqlite_corpus(&[
            ("rs1", "magnitude = 1.5"),
            ("rs2", "magnitude = not-a-number"),
            ("rs3", ""),
        ]);

        let index = ReferenceIndex::open(&path).unwrap();

        assert_eq!(index.len(), 1);
        assert!(index.contains("rs1"));
        assert_eq!(index.stats().skipped_records, 2);
    }

    #[test]
    fn test_all_records_corrupt() {
        let (_dir, path) = create_sqlite_corpus(&[("rs2", "magnitude = ???")]);

        let result = ReferenceIndex::open(&path);
        assert!(matches!(result, Err(CorpusError::CorpusCorrupt { .. })));
    }

    #[test]
    fn test_wrong_schema_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("other.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute("CREATE TABLE metadata (key TEXT, value TEXT)", [])
            .unwrap();
        drop(conn);

        let result = ReferenceIndex::open(&path);
        assert!(matches!(result, Err(CorpusError::CorpusCorrupt { .. })));
    }

    #[test]
    fn test_missing_corpus_is_unavailable() {
        let result = ReferenceIndex::open("/nonexistent/SNPedia.db");
        assert!(matches!(result, Err(CorpusError::CorpusUnavailable { .. })));
    }

    #[test]
    fn test_open_jsonl_corpus() {
        let mut file = tempfile::Builder::new()
            .suffix(".jsonl")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            r#"{{"rsid":"RS7412","summary":"APOE","magnitude":3.0,"repute":"Bad","genotypes":{{"(C;T)":"e2 carrier"}}}}"#
        )
        .unwrap();
        writeln!(file, "{{ not json").unwrap();
        writeln!(file).unwrap();
        file.flush().unwrap();

        let index = ReferenceIndex::open(file.path()).unwrap();

        assert_eq!(index.len(), 1);
        let apoe = index.get("rs7412").unwrap();
        assert_eq!(apoe.genotypes["CT"], "e2 carrier");
        assert_eq!(index.stats().skipped_records, 1);
    }

    #[test]
    fn test_from_records_keeps_first_duplicate() {
        let first = VariantRecord {
            rsid: "RS1".to_string(),
            summary: Some("first".to_string()),
            magnitude: Some(1.0),
            repute: Repute::Good,
            genotypes: Default::default(),
            references: vec![],
        };
        let mut second = first.clone();
        second.summary = Some("second".to_string());

        let index = ReferenceIndex::from_records(vec![first, second]);
        assert_eq!(index.len(), 1);
        assert_eq!(index.get("rs1").unwrap().summary.as_deref(), Some("first"));
    }

    #[test]
    fn test_index_is_shareable_across_threads() {
        fn assert_sync<T: Send + Sync>() {}
        assert_sync::<ReferenceIndex>();
    }
}
