//! Bounded polling helpers.

use crate::error::{HarvestError, Result};
use crate::locator;
use crate::renderer::{ElementHandle, PageDriver};
use crate::types::LocatorSpec;
use std::future::Future;
use std::time::{Duration, Instant};

/// Default interval between polls.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Floor for one locator pass once the wait's own time is nearly spent.
const MIN_PASS: Duration = Duration::from_millis(50);

fn pass_budget(until: Instant) -> Duration {
    until.saturating_duration_since(Instant::now()).max(MIN_PASS)
}

/// Poll `probe` until it yields `Some`, or fail with `Timeout` after `timeout`.
///
/// The probe runs at least once even with a zero timeout. Errors from the
/// probe abort the wait.
pub async fn poll_until<T, F, Fut>(
    what: &str,
    timeout: Duration,
    interval: Duration,
    mut probe: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let start = Instant::now();
    loop {
        if let Some(value) = probe().await? {
            return Ok(value);
        }
        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Err(HarvestError::Timeout {
                what: what.to_string(),
                after: timeout,
            });
        }
        tokio::time::sleep(interval.min(timeout - elapsed)).await;
    }
}

/// Re-run the locator chain until one of its specs resolves.
pub async fn wait_for(
    driver: &dyn PageDriver,
    specs: &[LocatorSpec],
    timeout: Duration,
) -> Result<ElementHandle> {
    let until = Instant::now() + timeout;
    let found = poll_until("element", timeout, POLL_INTERVAL, move || async move {
        match locator::resolve(driver, specs, pass_budget(until)).await {
            Ok(handle) => Ok(Some(handle)),
            Err(HarvestError::ElementNotFound { .. }) | Err(HarvestError::Timeout { .. }) => {
                Ok(None)
            }
            Err(other) => Err(other),
        }
    })
    .await;

    match found {
        Err(HarvestError::Timeout { after, .. }) => Err(HarvestError::ElementNotFound {
            attempted: specs.to_vec(),
            last_error: Some(format!("nothing matched within {}ms", after.as_millis())),
        }),
        other => other,
    }
}

/// Wait until some spec of the chain resolves to a visible element.
pub async fn wait_visible(
    driver: &dyn PageDriver,
    specs: &[LocatorSpec],
    timeout: Duration,
) -> Result<ElementHandle> {
    let until = Instant::now() + timeout;
    poll_until("visible element", timeout, POLL_INTERVAL, move || async move {
        match locator::resolve(driver, specs, pass_budget(until)).await {
            Ok(handle) => match driver.is_visible(handle).await {
                Ok(true) => Ok(Some(handle)),
                Ok(false) => Ok(None),
                Err(e) if e.is_not_found() => Ok(None),
                Err(e) => Err(e.into()),
            },
            Err(HarvestError::ElementNotFound { .. }) | Err(HarvestError::Timeout { .. }) => {
                Ok(None)
            }
            Err(other) => Err(other),
        }
    })
    .await
}

/// Whether no spec of the chain resolves to a visible element right now.
pub async fn is_absent(driver: &dyn PageDriver, specs: &[LocatorSpec]) -> Result<bool> {
    match locator::resolve(driver, specs, Duration::from_secs(1)).await {
        Ok(handle) => match driver.is_visible(handle).await {
            Ok(visible) => Ok(!visible),
            Err(e) if e.is_not_found() => Ok(true),
            Err(e) => Err(e.into()),
        },
        Err(HarvestError::ElementNotFound { .. }) => Ok(true),
        Err(other) => Err(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::fake::{FakeDriver, FakeElement};
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_poll_until_succeeds_after_retries() {
        let calls = AtomicU32::new(0);
        let value = poll_until("counter", Duration::from_secs(2), Duration::from_millis(5), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(if n >= 2 { Some(n) } else { None }) }
        })
        .await
        .unwrap();
        assert_eq!(value, 2);
    }

    #[tokio::test]
    async fn test_poll_until_times_out() {
        let err = poll_until::<(), _, _>(
            "never",
            Duration::from_millis(30),
            Duration::from_millis(5),
            || async { Ok(None) },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, HarvestError::Timeout { ref what, .. } if what == "never"));
    }

    #[tokio::test]
    async fn test_wait_for_reports_element_not_found() {
        let driver = FakeDriver::new("about:blank");
        let specs = [LocatorSpec::id("missing")];
        let err = wait_for(&driver, &specs, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, HarvestError::ElementNotFound { ref attempted, .. } if attempted.len() == 1));
    }

    #[tokio::test]
    async fn test_wait_for_stays_near_its_bound_with_slow_lookups() {
        let driver = FakeDriver::new("about:blank").with_lookup_delay(Duration::from_millis(400));
        let specs = [LocatorSpec::id("missing")];
        let start = Instant::now();
        let err = wait_for(&driver, &specs, Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(matches!(err, HarvestError::ElementNotFound { .. }));
        assert!(start.elapsed() < Duration::from_millis(750), "{:?}", start.elapsed());
    }

    #[tokio::test]
    async fn test_wait_visible_stays_near_its_bound_with_slow_lookups() {
        let driver = FakeDriver::new("about:blank")
            .with("overlay", FakeElement::new(LocatorSpec::id("modal")).hidden())
            .with_lookup_delay(Duration::from_millis(400));
        let start = Instant::now();
        let err = wait_visible(&driver, &[LocatorSpec::id("modal")], Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(matches!(err, HarvestError::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_millis(750), "{:?}", start.elapsed());
    }

    #[tokio::test]
    async fn test_is_absent_for_hidden_element() {
        let driver = FakeDriver::new("about:blank")
            .with("overlay", FakeElement::new(LocatorSpec::id("modal")).hidden());
        assert!(is_absent(&driver, &[LocatorSpec::id("modal")]).await.unwrap());
        let driver = FakeDriver::new("about:blank")
            .with("overlay", FakeElement::new(LocatorSpec::id("modal")));
        assert!(!is_absent(&driver, &[LocatorSpec::id("modal")]).await.unwrap());
    }
}
