//! CSV-backed prediction history
//!
//! Rows are addressed by ordinal: the zero-based position at read time. Any
//! deletion renumbers every later row, so callers list again afterwards.
//! Every mutation rewrites the whole file.

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::record::PredictionRecord;
use crate::error::{PredictorError, Result};

/// A record with the ordinal it had when listed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEntry {
    pub record_id: usize,
    pub record: PredictionRecord,
}

struct RawTable {
    header: StringRecord,
    rows: Vec<StringRecord>,
}

pub struct HistoryLedger {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl HistoryLedger {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the history file exists, regardless of content
    pub async fn exists(&self) -> bool {
        fs::try_exists(&self.path).await.unwrap_or(false)
    }

    /// Read the file; `None` when it is missing or has no content at all
    async fn read_raw(&self) -> Result<Option<RawTable>> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(PredictorError::StoreReadError(e.to_string())),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            debug!(path = %self.path.display(), "History file is empty");
            return Ok(None);
        }

        let mut reader = ReaderBuilder::new().has_headers(true).from_reader(bytes.as_slice());
        let header = reader
            .headers()
            .map_err(|e| PredictorError::StoreReadError(e.to_string()))?
            .clone();
        let rows = reader
            .records()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| PredictorError::StoreReadError(e.to_string()))?;

        Ok(Some(RawTable { header, rows }))
    }

    async fn write_raw(&self, header: &StringRecord, rows: &[StringRecord]) -> Result<()> {
        let mut writer = WriterBuilder::new().from_writer(Vec::new());
        writer.write_record(header)?;
        for row in rows {
            writer.write_record(row)?;
        }
        let buf = writer
            .into_inner()
            .map_err(|e| PredictorError::Internal(format!("Failed to flush CSV buffer: {e}")))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        fs::write(&self.path, buf).await?;
        Ok(())
    }

    fn expected_header() -> StringRecord {
        StringRecord::from(PredictionRecord::HEADER.to_vec())
    }

    /// Add one row at the end, creating the file (with header) if needed
    pub async fn append(&self, record: &PredictionRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let expected = Self::expected_header();

        let mut rows = match self.read_raw().await? {
            Some(table) => {
                if !table.header.iter().eq(expected.iter()) {
                    return Err(PredictorError::StoreReadError(format!(
                        "unexpected header in {}: {:?}",
                        self.path.display(),
                        table.header.iter().collect::<Vec<_>>()
                    )));
                }
                table.rows
            }
            None => Vec::new(),
        };

        rows.push(StringRecord::from(
            record.fields().into_iter().map(|(_, v)| v).collect::<Vec<_>>(),
        ));
        self.write_raw(&expected, &rows).await?;

        info!(
            path = %self.path.display(),
            username = %record.username,
            rows = rows.len(),
            "Appended prediction"
        );
        Ok(())
    }

    /// All rows in storage order with their current ordinals
    ///
    /// A missing or empty file is `StoreEmpty`; a header with no rows is an
    /// empty list.
    pub async fn list(&self) -> Result<Vec<LedgerEntry>> {
        let table = self.read_raw().await?.ok_or(PredictorError::StoreEmpty)?;

        table
            .rows
            .iter()
            .enumerate()
            .map(|(record_id, row)| {
                row.deserialize::<PredictionRecord>(Some(&table.header))
                    .map(|record| LedgerEntry { record_id, record })
                    .map_err(|e| {
                        PredictorError::StoreReadError(format!("row {record_id}: {e}"))
                    })
            })
            .collect()
    }

    /// Remove the rows at the given ordinals; returns how many were removed
    ///
    /// Out-of-range ordinals are ignored. An empty set leaves the file alone.
    pub async fn delete(&self, ids: &BTreeSet<usize>) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let _guard = self.write_lock.lock().await;
        let Some(table) = self.read_raw().await? else {
            return Ok(0);
        };

        let before = table.rows.len();
        let kept: Vec<StringRecord> = table
            .rows
            .into_iter()
            .enumerate()
            .filter(|(i, _)| !ids.contains(i))
            .map(|(_, row)| row)
            .collect();
        let removed = before - kept.len();

        self.write_raw(&table.header, &kept).await?;

        info!(
            path = %self.path.display(),
            removed,
            remaining = kept.len(),
            "Deleted prediction records"
        );
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::record::tests::sample_record;
    use tempfile::TempDir;

    fn ledger(dir: &TempDir) -> HistoryLedger {
        HistoryLedger::new(dir.path().join("predictions_history.csv"))
    }

    #[tokio::test]
    async fn test_missing_file_is_store_empty() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);
        assert!(matches!(ledger.list().await, Err(PredictorError::StoreEmpty)));
    }

    #[tokio::test]
    async fn test_append_then_list() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);

        let first = sample_record("First", 1);
        ledger.append(&first).await.unwrap();
        let before = ledger.list().await.unwrap().len();

        let second = sample_record("Second", 2);
        ledger.append(&second).await.unwrap();
        let entries = ledger.list().await.unwrap();

        assert_eq!(entries.len(), before + 1);
        let last = entries.last().unwrap();
        assert_eq!(last.record, second);
        assert_eq!(last.record_id, 1);
    }

    #[tokio::test]
    async fn test_file_layout() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);
        ledger.append(&sample_record("Asha Verma", 5)).await.unwrap();

        let content = std::fs::read_to_string(ledger.path()).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next().unwrap(), PredictionRecord::HEADER.join(","));
        assert_eq!(
            lines.next().unwrap(),
            "Asha Verma,asha,30,Male,22.0,0,No,Southeast,No,Yes,Medium,3,7,High Protein,4321.5,2024-05-17 10:30:05"
        );
        assert!(lines.next().is_none());
    }

    #[tokio::test]
    async fn test_zero_byte_file_treated_as_absent() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);
        assert!(!ledger.exists().await);
        std::fs::write(ledger.path(), b"").unwrap();

        assert!(matches!(ledger.list().await, Err(PredictorError::StoreEmpty)));
        assert!(ledger.exists().await);

        ledger.append(&sample_record("Only", 1)).await.unwrap();
        let entries = ledger.list().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].record.full_name, "Only");
    }

    #[tokio::test]
    async fn test_header_only_is_empty_list() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);
        std::fs::write(ledger.path(), format!("{}\n", PredictionRecord::HEADER.join(","))).unwrap();

        assert!(ledger.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_renumbers() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);
        let rows: Vec<_> = (0..3).map(|i| sample_record(&format!("Row {i}"), i)).collect();
        for row in &rows {
            ledger.append(row).await.unwrap();
        }

        let removed = ledger.delete(&BTreeSet::from([0, 2])).await.unwrap();
        assert_eq!(removed, 2);

        let entries = ledger.list().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].record, rows[1]);
        assert_eq!(entries[0].record_id, 0);
    }

    #[tokio::test]
    async fn test_delete_empty_set_is_noop() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);
        ledger.append(&sample_record("Keep", 1)).await.unwrap();
        let before = std::fs::read(ledger.path()).unwrap();

        assert_eq!(ledger.delete(&BTreeSet::new()).await.unwrap(), 0);
        assert_eq!(std::fs::read(ledger.path()).unwrap(), before);
    }

    #[tokio::test]
    async fn test_delete_ignores_out_of_range() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);
        ledger.append(&sample_record("Keep", 1)).await.unwrap();

        assert_eq!(ledger.delete(&BTreeSet::from([7])).await.unwrap(), 0);
        assert_eq!(ledger.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_foreign_header_rejected() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);
        std::fs::write(ledger.path(), "name,cost\nx,1.0\n").unwrap();

        let err = ledger.append(&sample_record("New", 1)).await.unwrap_err();
        assert!(matches!(err, PredictorError::StoreReadError(_)));
        assert!(matches!(ledger.list().await, Err(PredictorError::StoreReadError(_))));
    }

    #[tokio::test]
    async fn test_ragged_rows_are_read_errors() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);
        std::fs::write(
            ledger.path(),
            format!("{}\nonly,three,fields\n", PredictionRecord::HEADER.join(",")),
        )
        .unwrap();

        assert!(matches!(ledger.list().await, Err(PredictorError::StoreReadError(_))));
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_serialised() {
        let dir = TempDir::new().unwrap();
        let ledger = std::sync::Arc::new(ledger(&dir));

        let mut handles = Vec::new();
        for i in 0..8 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.append(&sample_record(&format!("Writer {i}"), i)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(ledger.list().await.unwrap().len(), 8);
    }
}
