//! Locator chains: ordered alternative strategies for one UI target.
//!
//! Portal markup differs between deployments, so every interactive target
//! is described by several specs ranked from most to least specific (exact
//! id or name first, semantic attributes next, free text last). `resolve`
//! walks the chain once and returns the first element found.

use crate::error::{HarvestError, Result};
use crate::renderer::{ElementHandle, PageDriver};
use crate::types::LocatorSpec;
use std::time::Duration;
use tracing::debug;

/// Try each spec exactly once, in order, and return the first hit.
///
/// "Not found" and script failures move on to the next spec; a broken
/// session (protocol error) is returned as is. The whole pass is bounded
/// by `timeout`.
pub async fn resolve(
    driver: &dyn PageDriver,
    specs: &[LocatorSpec],
    timeout: Duration,
) -> Result<ElementHandle> {
    match tokio::time::timeout(timeout, try_chain(driver, specs)).await {
        Ok(result) => result,
        Err(_) => Err(HarvestError::Timeout {
            what: format!("locator chain of {} specs", specs.len()),
            after: timeout,
        }),
    }
}

async fn try_chain(driver: &dyn PageDriver, specs: &[LocatorSpec]) -> Result<ElementHandle> {
    let mut last_error = None;
    for (rank, spec) in specs.iter().enumerate() {
        match driver.find_element(spec).await {
            Ok(handle) => {
                debug!(%spec, rank, "locator matched");
                return Ok(handle);
            }
            Err(e) if e.is_not_found() || matches!(e, crate::DriverError::Script(_)) => {
                debug!(%spec, rank, error = %e, "locator missed");
                last_error = Some(e.to_string());
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(HarvestError::ElementNotFound {
        attempted: specs.to_vec(),
        last_error,
    })
}

/// Resolve the chain and click the element.
pub async fn click(
    driver: &dyn PageDriver,
    specs: &[LocatorSpec],
    timeout: Duration,
) -> Result<ElementHandle> {
    let handle = resolve(driver, specs, timeout).await?;
    driver.click(handle).await?;
    Ok(handle)
}

/// Resolve the chain and type `text` into the element.
pub async fn fill(
    driver: &dyn PageDriver,
    specs: &[LocatorSpec],
    text: &str,
    timeout: Duration,
) -> Result<ElementHandle> {
    let handle = resolve(driver, specs, timeout).await?;
    driver.type_text(handle, text).await?;
    Ok(handle)
}
