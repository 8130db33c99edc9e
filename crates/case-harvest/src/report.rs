//! Non-fatal outcomes of a run and the `run_report.json` they end up in.

use crate::error::Result;
use crate::modal::ModalOutcome;
use crate::profile::PortalKind;
use crate::sink::UpsertOutcome;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

/// Why a section contributed nothing (or less than expected).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GapKind {
    /// The table or trigger is not on the page.
    Missing,
    /// It is on the page but could not be read.
    Unreadable { reason: String },
    /// The overlay never became visible.
    ModalTimeout { waited_ms: u64 },
}

/// A section that did not make it into the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionGap {
    pub section: String,
    #[serde(flatten)]
    pub kind: GapKind,
}

impl ExtractionGap {
    pub fn new(section: &str, kind: GapKind) -> Self {
        Self {
            section: section.to_string(),
            kind,
        }
    }
}

/// A document that could not be retrieved. No file is left behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadFailure {
    pub url: String,
    pub file_name: String,
    pub reason: String,
}

/// A document written to storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedDocument {
    pub url: String,
    pub file_name: String,
    pub bytes: u64,
}

/// Machine-readable summary of one case lookup.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub cnr: String,
    pub portal: PortalKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub fields: usize,
    pub gaps: Vec<ExtractionGap>,
    pub modals: Vec<ModalOutcome>,
    pub documents: Vec<SavedDocument>,
    pub download_failures: Vec<DownloadFailure>,
    pub persistence: Option<UpsertOutcome>,
    /// Set when the sink rejected the record for a reason other than a
    /// duplicate key.
    pub persistence_error: Option<String>,
    pub history_file: Option<String>,
    /// Set when the run was aborted.
    pub error: Option<String>,
}

impl RunReport {
    pub fn new(cnr: &str, portal: PortalKind) -> Self {
        Self {
            cnr: cnr.to_string(),
            portal,
            started_at: Utc::now(),
            finished_at: None,
            fields: 0,
            gaps: Vec::new(),
            modals: Vec::new(),
            documents: Vec::new(),
            download_failures: Vec::new(),
            persistence: None,
            persistence_error: None,
            history_file: None,
            error: None,
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Write the report as pretty JSON.
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
