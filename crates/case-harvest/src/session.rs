//! The browser session behind one case lookup.
//!
//! A session owns the single page driver for a run and enforces the
//! caller's deadline: every bounded wait asks the session for a budget, which
//! is the requested timeout clipped to the time left.

use crate::error::{HarvestError, Result};
use crate::renderer::PageDriver;
use crate::types::SessionCookies;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

pub struct Session {
    /// Identifier used in logs (normally the requested CNR).
    pub id: String,
    driver: Arc<dyn PageDriver>,
    created_at: Instant,
    deadline: Option<Instant>,
}

impl Session {
    /// Wrap a driver. `deadline` is measured from now.
    pub fn new(
        id: impl Into<String>,
        driver: Arc<dyn PageDriver>,
        deadline: Option<Duration>,
    ) -> Self {
        let now = Instant::now();
        Self {
            id: id.into(),
            driver,
            created_at: now,
            deadline: deadline.map(|d| now + d),
        }
    }

    /// The page driver. Only one interaction is in flight at a time.
    pub fn driver(&self) -> &dyn PageDriver {
        self.driver.as_ref()
    }

    /// How long the session has been alive.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Time left before the deadline, `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Fail with `DeadlineExceeded` once the deadline has passed.
    pub fn check_deadline(&self) -> Result<()> {
        match self.remaining() {
            Some(left) if left.is_zero() => Err(HarvestError::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// `min(requested, time left)`, or `DeadlineExceeded`.
    pub fn budget(&self, requested: Duration) -> Result<Duration> {
        self.check_deadline()?;
        Ok(match self.remaining() {
            Some(left) => requested.min(left),
            None => requested,
        })
    }

    /// Owned copy of the live session's cookies.
    ///
    /// Later changes in the browser are not reflected in the snapshot.
    pub async fn snapshot_cookies(&self) -> Result<SessionCookies> {
        let cookies = self.driver.cookies().await?;
        debug!(session = %self.id, count = cookies.len(), "cookie snapshot taken");
        Ok(cookies)
    }
}
