//! case-harvest: resilient extraction and retrieval engine for court case portals.
//!
//! The engine drives a rendered portal page through a [`renderer::PageDriver`],
//! resolves unstable UI elements with ordered locator chains, normalises result
//! tables into a flat [`CaseRecord`], downloads linked documents over an
//! independent HTTP channel carrying the browser session's cookies, and
//! persists the record idempotently.

pub mod config;
pub mod error;
pub mod extract;
pub mod history;
pub mod locator;
pub mod modal;
pub mod pipeline;
pub mod profile;
pub mod renderer;
pub mod report;
pub mod retriever;
pub mod session;
pub mod sink;
pub mod solver;
pub mod storage;
pub mod types;
pub mod wait;

pub use config::HarvestConfig;
pub use error::{DriverError, HarvestError, Result};
pub use pipeline::{CaseRun, Harvester};
pub use profile::{PortalKind, PortalProfile};
pub use report::RunReport;
pub use types::*;
