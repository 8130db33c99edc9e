//! Run configuration.

use crate::retriever::transfer::MAX_CONCURRENCY;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Tunables for one harvest. Every field has a default, so a partial JSON
/// object deserialises.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Root under which one directory per case is created.
    pub output_root: PathBuf,
    /// SQLite database for persisted records. `None` disables persistence.
    pub database: Option<PathBuf>,
    /// Parallel document transfers (clamped to 1..=8).
    pub concurrency: usize,
    pub locate_timeout_secs: u64,
    pub modal_timeout_secs: u64,
    pub navigation_timeout_secs: u64,
    pub transfer_timeout_secs: u64,
    /// Pause after clicks that trigger page work.
    pub settle_ms: u64,
    pub solver_attempts: u32,
    /// Overall deadline for a run.
    pub deadline_secs: Option<u64>,
    pub headless: bool,
    /// Skip the business-history note.
    pub skip_history: bool,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("cases"),
            database: None,
            concurrency: 4,
            locate_timeout_secs: 20,
            modal_timeout_secs: 10,
            navigation_timeout_secs: 30,
            transfer_timeout_secs: 60,
            settle_ms: 2_000,
            solver_attempts: crate::solver::DEFAULT_ATTEMPTS,
            deadline_secs: None,
            headless: true,
            skip_history: false,
        }
    }
}

impl HarvestConfig {
    pub fn concurrency(&self) -> usize {
        self.concurrency.clamp(1, MAX_CONCURRENCY)
    }

    pub fn locate_timeout(&self) -> Duration {
        Duration::from_secs(self.locate_timeout_secs)
    }

    pub fn modal_timeout(&self) -> Duration {
        Duration::from_secs(self.modal_timeout_secs)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}
