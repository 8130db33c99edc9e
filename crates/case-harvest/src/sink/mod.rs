//! Record sink: idempotent persistence of case records.
//!
//! Records are written keyed by the case identifier. A second write for the
//! same identifier is a no-op (first write wins) and is reported as
//! [`UpsertOutcome::Duplicate`], never as an error. Field names are
//! translated to a fixed column schema before the write; fields without a
//! column are dropped from the persisted row but kept in the CSV export.

pub mod export;

use crate::error::{HarvestError, Result};
use crate::types::{CaseRecord, IDENTIFIER_FIELD};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

/// What happened to a record handed to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    /// A row with this identifier already existed; nothing was written.
    Duplicate,
    /// The record had no identifier and was not written.
    Skipped,
}

/// One record field → one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub field: String,
    pub column: String,
}

/// Fixed column schema of the persisted table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistSchema {
    pub table: String,
    /// Primary-key column; must also appear in `columns`.
    pub key_column: String,
    pub columns: Vec<ColumnMapping>,
}

fn mapping(pairs: &[(&str, &str)]) -> Vec<ColumnMapping> {
    pairs
        .iter()
        .map(|(field, column)| ColumnMapping {
            field: field.to_string(),
            column: column.to_string(),
        })
        .collect()
}

impl PersistSchema {
    /// Schema shared by the eCourts district and high court portals.
    pub fn ecourts(table: &str) -> Self {
        Self {
            table: table.to_string(),
            key_column: "cnr_number".to_string(),
            columns: mapping(&[
                ("CNR Number", "cnr_number"),
                ("Filing Number", "filing_number"),
                ("Registration Number", "registration_number"),
                ("Status_First Hearing Date", "status_first_hearing_date"),
                ("Status_Next Hearing Date", "status_next_hearing_date"),
                ("Status_Case Stage", "status_case_stage"),
                ("Status_Court Number and Judge", "status_court_number_and_judge"),
            ]),
        }
    }

    pub fn supreme_court() -> Self {
        Self {
            table: "ecourts_supreme_courts".to_string(),
            key_column: "cnr_number".to_string(),
            columns: mapping(&[
                ("CNR Number", "cnr_number"),
                ("Title", "title"),
                ("Diary Number", "diary_number"),
                ("Case Number", "case_number"),
                ("Present/Last Listed On", "present_last_listed_on"),
                ("Status/Stage", "status_stage"),
                ("Admitted", "admitted"),
                ("Category", "category"),
                ("Petitioner(s)", "petitioner"),
                ("Respondent(s)", "respondent"),
                ("Petitioner Advocate(s)", "petitioner_advocate"),
                ("Respondent Advocate(s)", "respondent_advocate"),
            ]),
        }
    }

    fn validate(&self) -> Result<()> {
        let ident = |s: &str| {
            !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        };
        if !ident(&self.table) {
            return Err(HarvestError::Config(format!("invalid table name '{}'", self.table)));
        }
        if let Some(bad) = self.columns.iter().find(|m| !ident(&m.column)) {
            return Err(HarvestError::Config(format!("invalid column name '{}'", bad.column)));
        }
        if !self.columns.iter().any(|m| m.column == self.key_column) {
            return Err(HarvestError::Config(format!(
                "key column '{}' is not mapped",
                self.key_column
            )));
        }
        Ok(())
    }

    /// Translate a record into `(column, value)` pairs; missing fields become empty.
    pub fn translate(&self, record: &CaseRecord) -> Vec<(String, String)> {
        self.columns
            .iter()
            .map(|m| {
                let value = if m.field == IDENTIFIER_FIELD {
                    record.identifier().unwrap_or_default()
                } else {
                    record.get(&m.field).unwrap_or_default()
                };
                (m.column.clone(), value.to_string())
            })
            .collect()
    }
}

/// Persistence target for normalised records.
pub trait RecordSink: Send + Sync {
    fn upsert(&self, record: &CaseRecord) -> Result<UpsertOutcome>;
}

/// SQLite table with a uniqueness constraint on the case identifier.
pub struct SqliteSink {
    db: Mutex<Connection>,
    schema: PersistSchema,
}

impl SqliteSink {
    /// Open or create the database and the schema's table.
    pub fn open(path: &Path, schema: PersistSchema) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Connection::open(path)?;
        Self::with_connection(db, schema)
    }

    /// Open the default database at ~/.case-harvest/cases.db.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".case-harvest")
            .join("cases.db")
    }

    fn with_connection(db: Connection, schema: PersistSchema) -> Result<Self> {
        schema.validate()?;
        let columns: Vec<String> = schema
            .columns
            .iter()
            .map(|m| {
                if m.column == schema.key_column {
                    format!("\"{}\" TEXT PRIMARY KEY", m.column)
                } else {
                    format!("\"{}\" TEXT", m.column)
                }
            })
            .collect();
        db.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" ({});",
            schema.table,
            columns.join(", ")
        ))?;
        debug!(table = %schema.table, "record table ready");
        Ok(Self {
            db: Mutex::new(db),
            schema,
        })
    }

    pub fn schema(&self) -> &PersistSchema {
        &self.schema
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| HarvestError::Config("record database lock poisoned".into()))
    }

    /// Stored row for an identifier, as `(column, value)` pairs.
    pub fn fetch(&self, identifier: &str) -> Result<Option<Vec<(String, String)>>> {
        let db = self.lock()?;
        let columns: Vec<String> = self
            .schema
            .columns
            .iter()
            .map(|m| format!("\"{}\"", m.column))
            .collect();
        let sql = format!(
            "SELECT {} FROM \"{}\" WHERE \"{}\" = ?1",
            columns.join(", "),
            self.schema.table,
            self.schema.key_column
        );
        let mut stmt = db.prepare(&sql)?;
        let result = stmt.query_row(rusqlite::params![identifier], |row| {
            let mut out = Vec::with_capacity(self.schema.columns.len());
            for (i, m) in self.schema.columns.iter().enumerate() {
                let value: Option<String> = row.get(i)?;
                out.push((m.column.clone(), value.unwrap_or_default()));
            }
            Ok(out)
        });

        match result {
            Ok(row) => Ok(Some(row)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Number of stored rows.
    pub fn count(&self) -> Result<u64> {
        let db = self.lock()?;
        let n: i64 = db.query_row(
            &format!("SELECT COUNT(*) FROM \"{}\"", self.schema.table),
            [],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }
}

impl RecordSink for SqliteSink {
    fn upsert(&self, record: &CaseRecord) -> Result<UpsertOutcome> {
        let Some(identifier) = record.identifier() else {
            return Ok(UpsertOutcome::Skipped);
        };
        let row = self.schema.translate(record);
        let columns: Vec<String> = row.iter().map(|(c, _)| format!("\"{c}\"")).collect();
        let placeholders: Vec<String> = (1..=row.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO \"{}\" ({}) VALUES ({}) ON CONFLICT(\"{}\") DO NOTHING",
            self.schema.table,
            columns.join(", "),
            placeholders.join(", "),
            self.schema.key_column
        );

        let db = self.lock()?;
        let written = db.execute(&sql, rusqlite::params_from_iter(row.iter().map(|(_, v)| v)))?;
        let outcome = if written == 0 {
            UpsertOutcome::Duplicate
        } else {
            UpsertOutcome::Inserted
        };
        info!(cnr = identifier, table = %self.schema.table, ?outcome, "record persisted");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(cnr: &str, stage: &str) -> CaseRecord {
        [
            ("Filing Number", "FN123"),
            (IDENTIFIER_FIELD, cnr),
            ("Status_Case Stage", stage),
            ("Petitioner_Advocate_1", "A"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_translate_drops_unmapped_fields() {
        let schema = PersistSchema::ecourts("t");
        let row = schema.translate(&record("CNR1", "Evidence"));
        assert_eq!(row.len(), 7);
        assert!(row.iter().all(|(c, _)| c != "Petitioner_Advocate_1"));
        assert!(row.contains(&("status_case_stage".to_string(), "Evidence".to_string())));
        assert!(row.contains(&("registration_number".to_string(), String::new())));
    }

    #[test]
    fn test_invalid_column_name_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut schema = PersistSchema::ecourts("cases");
        schema.columns[1].column = "x; DROP TABLE".to_string();
        assert!(SqliteSink::open(&dir.path().join("c.db"), schema).is_err());
    }

    #[test]
    fn test_first_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let sink = SqliteSink::open(&dir.path().join("c.db"), PersistSchema::ecourts("cases")).unwrap();

        assert_eq!(sink.upsert(&record("CNR1", "Evidence")).unwrap(), UpsertOutcome::Inserted);
        assert_eq!(sink.upsert(&record("CNR1", "Arguments")).unwrap(), UpsertOutcome::Duplicate);

        assert_eq!(sink.count().unwrap(), 1);
        let row = sink.fetch("CNR1").unwrap().unwrap();
        assert!(row.contains(&("status_case_stage".to_string(), "Evidence".to_string())));
    }

    #[test]
    fn test_missing_identifier_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let sink = SqliteSink::open(&dir.path().join("c.db"), PersistSchema::ecourts("cases")).unwrap();
        let rec: CaseRecord = [("Filing Number", "FN1")].into_iter().collect();
        assert_eq!(sink.upsert(&rec).unwrap(), UpsertOutcome::Skipped);
        assert_eq!(sink.count().unwrap(), 0);
    }

    #[test]
    fn test_reopen_keeps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.db");
        {
            let sink = SqliteSink::open(&path, PersistSchema::supreme_court()).unwrap();
            let rec: CaseRecord = [(IDENTIFIER_FIELD, "SCIN01"), ("Title", "A vs B")]
                .into_iter()
                .collect();
            sink.upsert(&rec).unwrap();
        }
        let sink = SqliteSink::open(&path, PersistSchema::supreme_court()).unwrap();
        assert!(sink.fetch("SCIN01").unwrap().is_some());
        assert!(sink.fetch("SCIN02").unwrap().is_none());
    }
}
