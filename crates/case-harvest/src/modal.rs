//! Overlay protocol: open, wait, read, close.
//!
//! ```text
//! Closed -> Triggered -> WaitingVisible -> Extracting -> Closing -> Closed
//!                              |                            ^
//!                              +------ visibility timeout --+
//! ```
//!
//! Closing always runs once the trigger has been activated, and always
//! ends in `Closed`: the four teardown methods are tried in order and the
//! first one that leaves the overlay absent is accepted. If none does, the
//! run goes on anyway.

use crate::error::{HarvestError, Result};
use crate::locator;
use crate::profile::CloseSpec;
use crate::renderer::{ElementHandle, PageDriver};
use crate::report::{ExtractionGap, GapKind};
use crate::types::{CaseRecord, LocatorSpec};
use crate::wait;
use serde::Serialize;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModalState {
    Closed,
    Triggered,
    WaitingVisible,
    Extracting,
    Closing,
}

/// Teardown methods, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseMethod {
    /// Native click on the labelled close control.
    CloseControl,
    /// Script click on the same kind of control.
    ScriptedClick,
    /// Script hide of overlay and backdrop, restoring page scroll.
    ForcedHide,
    /// Escape key.
    Escape,
}

impl CloseMethod {
    pub const ORDER: [CloseMethod; 4] = [
        CloseMethod::CloseControl,
        CloseMethod::ScriptedClick,
        CloseMethod::ForcedHide,
        CloseMethod::Escape,
    ];
}

/// How the overlay is opened.
pub enum Trigger<'a> {
    /// Resolve a locator chain and click the result.
    Locate(&'a [LocatorSpec]),
    /// Click an element the caller already holds.
    Handle(ElementHandle),
}

/// Everything one pass through the protocol produced.
#[derive(Debug, Clone, Serialize)]
pub struct ModalOutcome {
    pub name: String,
    #[serde(skip)]
    pub fragment: CaseRecord,
    pub gap: Option<ExtractionGap>,
    pub transitions: Vec<ModalState>,
    /// Method that made the overlay go away, if any did.
    pub close_method: Option<CloseMethod>,
    pub close_attempts: usize,
}

impl ModalOutcome {
    pub fn final_state(&self) -> ModalState {
        self.transitions.last().copied().unwrap_or(ModalState::Closed)
    }
}

/// Timing knobs for one overlay.
#[derive(Debug, Clone, Copy)]
pub struct ModalTimings {
    pub locate: Duration,
    pub visible: Duration,
    /// How long to watch for the overlay to disappear after each close method.
    pub close_wait: Duration,
}

impl Default for ModalTimings {
    fn default() -> Self {
        Self {
            locate: Duration::from_secs(5),
            visible: Duration::from_secs(10),
            close_wait: Duration::from_secs(1),
        }
    }
}

fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

fn scripted_click(close: &CloseSpec) -> String {
    format!(
        "var closeButtons = document.querySelectorAll({}); \
         if (closeButtons.length > 0) closeButtons[0].click();",
        js_string(&close.control_css)
    )
}

fn forced_hide(close: &CloseSpec) -> String {
    format!(
        "document.querySelectorAll({}).forEach(function(m) {{ \
            m.style.display = 'none'; m.classList.remove('show'); }}); \
         document.querySelectorAll({}).forEach(function(b) {{ b.remove(); }}); \
         document.body.classList.remove('modal-open'); \
         document.body.style.overflow = ''; \
         document.body.style.paddingRight = '';",
        js_string(&close.overlay_css),
        js_string(&close.backdrop_css)
    )
}

/// Run the protocol for one overlay.
///
/// `read` receives the visible content container and returns the fragment.
/// Only a broken session or an expired deadline is returned as an error;
/// a missing trigger, a timeout or a failed read become the outcome's gap.
pub async fn run<F, Fut>(
    driver: &dyn PageDriver,
    name: &str,
    trigger: Trigger<'_>,
    container: &[LocatorSpec],
    close: &CloseSpec,
    timings: ModalTimings,
    read: F,
) -> Result<ModalOutcome>
where
    F: FnOnce(ElementHandle) -> Fut,
    Fut: Future<Output = Result<CaseRecord>>,
{
    let mut outcome = ModalOutcome {
        name: name.to_string(),
        fragment: CaseRecord::new(),
        gap: None,
        transitions: vec![ModalState::Closed],
        close_method: None,
        close_attempts: 0,
    };

    // Closed -> Triggered
    let activated = match trigger {
        Trigger::Locate(specs) => locator::click(driver, specs, timings.locate).await.map(|_| ()),
        Trigger::Handle(handle) => driver.click(handle).await.map_err(HarvestError::from),
    };
    match activated {
        Ok(()) => outcome.transitions.push(ModalState::Triggered),
        Err(HarvestError::ElementNotFound { .. }) => {
            info!(modal = name, "overlay trigger not present");
            outcome.gap = Some(ExtractionGap::new(name, GapKind::Missing));
            return Ok(outcome);
        }
        Err(HarvestError::Driver(e)) if e.is_not_found() => {
            outcome.gap = Some(ExtractionGap::new(name, GapKind::Missing));
            return Ok(outcome);
        }
        Err(e) => return Err(e),
    }

    // Triggered -> WaitingVisible -> Extracting | Closing
    outcome.transitions.push(ModalState::WaitingVisible);
    let started = Instant::now();
    match wait::wait_visible(driver, container, timings.visible).await {
        Ok(handle) => {
            outcome.transitions.push(ModalState::Extracting);
            match read(handle).await {
                Ok(fragment) => {
                    debug!(modal = name, fields = fragment.len(), "overlay read");
                    outcome.fragment = fragment;
                }
                Err(HarvestError::DeadlineExceeded) => return Err(HarvestError::DeadlineExceeded),
                Err(e) => {
                    warn!(modal = name, error = %e, "overlay content unreadable");
                    outcome.gap = Some(ExtractionGap::new(name, GapKind::Unreadable {
                        reason: e.to_string(),
                    }));
                }
            }
        }
        Err(HarvestError::Timeout { .. }) => {
            let waited_ms = started.elapsed().as_millis() as u64;
            warn!(modal = name, waited_ms, "overlay never became visible");
            outcome.gap = Some(ExtractionGap::new(name, GapKind::ModalTimeout { waited_ms }));
        }
        Err(e) => return Err(e),
    }

    // -> Closing -> Closed
    outcome.transitions.push(ModalState::Closing);
    let (method, attempts) = teardown(driver, name, container, close, timings).await;
    outcome.close_method = method;
    outcome.close_attempts = attempts;
    outcome.transitions.push(ModalState::Closed);
    Ok(outcome)
}

/// Try each close method until the overlay is gone. Never fails.
pub async fn teardown(
    driver: &dyn PageDriver,
    name: &str,
    container: &[LocatorSpec],
    close: &CloseSpec,
    timings: ModalTimings,
) -> (Option<CloseMethod>, usize) {
    let mut attempts = 0;
    for method in CloseMethod::ORDER {
        attempts += 1;
        let applied = match method {
            CloseMethod::CloseControl => locator::click(driver, &close.control, timings.locate)
                .await
                .map(|_| ()),
            CloseMethod::ScriptedClick => driver
                .execute_script(&scripted_click(close))
                .await
                .map(|_| ())
                .map_err(HarvestError::from),
            CloseMethod::ForcedHide => driver
                .execute_script(&forced_hide(close))
                .await
                .map(|_| ())
                .map_err(HarvestError::from),
            CloseMethod::Escape => driver.press_escape().await.map_err(HarvestError::from),
        };
        if let Err(e) = applied {
            debug!(modal = name, ?method, error = %e, "close method failed");
            continue;
        }
        if gone(driver, container, timings.close_wait).await {
            debug!(modal = name, ?method, "overlay closed");
            return (Some(method), attempts);
        }
        debug!(modal = name, ?method, "overlay still present after close method");
    }
    warn!(modal = name, "overlay still present after every close method");
    (None, attempts)
}

async fn gone(driver: &dyn PageDriver, container: &[LocatorSpec], within: Duration) -> bool {
    wait::poll_until("overlay teardown", within, wait::POLL_INTERVAL.min(within), || async {
        Ok(wait::is_absent(driver, container).await?.then_some(()))
    })
    .await
    .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract;
    use crate::renderer::fake::{Effect, FakeDriver, FakeElement};
    use crate::types::TableSchema;

    const ACK: &str = "<div id=\"modal_ack_body\"><table>\
        <tr><td>Filing Date</td><td>:</td><td>01-02-2023</td></tr>\
        <tr><td>Court</td><td>:</td><td>Pune</td></tr></table></div>";

    fn timings() -> ModalTimings {
        ModalTimings {
            locate: Duration::from_millis(100),
            visible: Duration::from_millis(300),
            close_wait: Duration::from_millis(20),
        }
    }

    fn container() -> Vec<LocatorSpec> {
        vec![LocatorSpec::id("modal_ack_body")]
    }

    fn trigger() -> Vec<LocatorSpec> {
        vec![LocatorSpec::xpath("//a[contains(@onclick, 'display_case_acknowledgement')]")]
    }

    fn page() -> FakeDriver {
        FakeDriver::new("https://portal.test/")
            .with(
                "trigger",
                FakeElement::new(trigger()[0].clone()).on_click(Effect::Show("body".into())),
            )
            .with(
                "body",
                FakeElement::new(LocatorSpec::id("modal_ack_body")).html(ACK).hidden(),
            )
    }

    async fn run_ack(driver: &FakeDriver) -> ModalOutcome {
        let specs = trigger();
        run(
            driver,
            "acknowledgement",
            Trigger::Locate(&specs),
            &container(),
            &CloseSpec::default(),
            timings(),
            |h| extract::extract(driver, h, TableSchema::Triple, ""),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_closes_with_control_first() {
        let driver = page().with(
            "close",
            FakeElement::new(LocatorSpec::css(".modal-header .close"))
                .on_click(Effect::Hide("body".into())),
        );
        let outcome = run_ack(&driver).await;
        assert_eq!(outcome.fragment.get("Court"), Some("Pune"));
        assert_eq!(outcome.close_method, Some(CloseMethod::CloseControl));
        assert_eq!(
            outcome.transitions,
            vec![
                ModalState::Closed,
                ModalState::Triggered,
                ModalState::WaitingVisible,
                ModalState::Extracting,
                ModalState::Closing,
                ModalState::Closed,
            ]
        );
    }

    #[tokio::test]
    async fn test_escape_after_three_failed_methods() {
        let driver = page().on_escape(vec![Effect::Hide("body".into())]);
        let outcome = run_ack(&driver).await;
        assert_eq!(outcome.close_method, Some(CloseMethod::Escape));
        assert_eq!(outcome.close_attempts, 4);
        assert_eq!(outcome.final_state(), ModalState::Closed);
        assert!(outcome.gap.is_none());
        let log = driver.log();
        assert!(log.iter().any(|l| l.contains("modal-backdrop")));
    }

    #[tokio::test]
    async fn test_reaches_closed_when_nothing_works() {
        let driver = page();
        let outcome = run_ack(&driver).await;
        assert_eq!(outcome.close_method, None);
        assert_eq!(outcome.close_attempts, 4);
        assert_eq!(outcome.final_state(), ModalState::Closed);
        assert!(driver.visible("body"));
    }

    #[tokio::test]
    async fn test_forced_hide_is_accepted() {
        let driver = page().on_script(".modal.show", vec![Effect::Remove("body".into())]);
        let outcome = run_ack(&driver).await;
        assert_eq!(outcome.close_method, Some(CloseMethod::ForcedHide));
    }

    #[tokio::test]
    async fn test_visibility_timeout_skips_extraction() {
        let driver = FakeDriver::new("https://portal.test/")
            .with("trigger", FakeElement::new(trigger()[0].clone()))
            .with("body", FakeElement::new(LocatorSpec::id("modal_ack_body")).hidden());
        let outcome = run_ack(&driver).await;
        assert!(matches!(
            outcome.gap.as_ref().map(|g| &g.kind),
            Some(GapKind::ModalTimeout { .. })
        ));
        assert!(!outcome.transitions.contains(&ModalState::Extracting));
        assert_eq!(outcome.final_state(), ModalState::Closed);
        assert!(outcome.fragment.is_empty());
    }

    #[tokio::test]
    async fn test_missing_trigger_is_a_gap() {
        let driver = FakeDriver::new("https://portal.test/");
        let outcome = run_ack(&driver).await;
        assert_eq!(outcome.transitions, vec![ModalState::Closed]);
        assert!(matches!(outcome.gap.as_ref().map(|g| &g.kind), Some(GapKind::Missing)));
        assert_eq!(outcome.close_attempts, 0);
    }
}
