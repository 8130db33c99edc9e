//! Business-history note for the most recent hearing.
//!
//! The last history trigger on the page opens an overlay with the day's
//! business. Its header, centred court lines and `label : value` rows are
//! written as plain text to `history/business_details_{date}.txt`, then the
//! overlay is torn down like any other modal.

use crate::error::{HarvestError, Result};
use crate::extract::{cell_text, collapse_ws, table_rows};
use crate::modal::{self, ModalOutcome, ModalTimings, Trigger};
use crate::profile::HistorySpec;
use crate::renderer::PageDriver;
use crate::storage::CaseStorage;
use crate::types::CaseRecord;
use scraper::{Html, Selector};
use std::path::PathBuf;
use tracing::{info, warn};

/// Date used when the trigger's arguments do not carry one.
pub const UNKNOWN_DATE: &str = "unknown_date";

/// Result of a history capture.
#[derive(Debug)]
pub struct HistoryNote {
    pub date: String,
    /// Written file, if the overlay had anything to say.
    pub path: Option<PathBuf>,
    pub modal: ModalOutcome,
}

/// Positional argument `index` of the first call in an inline handler.
///
/// `viewBusiness('a','b',...)` is split on commas after quotes are removed.
/// The position is fixed by the portal; a handler with fewer arguments
/// yields `None`.
pub fn handler_argument(handler: &str, index: usize) -> Option<String> {
    let start = handler.find('(')? + 1;
    let end = start + handler[start..].find(')')?;
    handler[start..end]
        .replace(['\'', '"'], "")
        .split(',')
        .nth(index)
        .map(|arg| arg.trim().to_string())
        .filter(|arg| !arg.is_empty())
}

/// Plain-text rendering of the history overlay.
pub fn history_text(html: &str, spec: &HistorySpec) -> Result<String> {
    let doc = Html::parse_fragment(html);
    let span = Selector::parse("span").expect("valid selector");
    let center = Selector::parse("center").expect("valid selector");
    let table = Selector::parse(&spec.table_css)
        .map_err(|e| HarvestError::Config(format!("invalid selector '{}': {e}", spec.table_css)))?;

    let mut lines = Vec::new();
    if doc
        .select(&span)
        .any(|s| s.text().collect::<String>().contains(spec.header_text.as_str()))
    {
        lines.push(spec.header_text.clone());
        lines.push("-".repeat(50));
    }
    for c in doc.select(&center) {
        let text = cell_text(c);
        if !text.is_empty() {
            lines.push(text);
        }
    }
    if let Some(t) = doc.select(&table).next() {
        for row in table_rows(t) {
            if row.cells.len() < 3 {
                continue;
            }
            let label = collapse_ws(&cell_text(row.cells[0]));
            let value = cell_text(row.cells[2]);
            if !label.is_empty() && !value.is_empty() {
                lines.push(format!("{label}: {value}"));
            }
        }
    }
    Ok(lines.join("\n"))
}

/// Open the last history trigger, save its note and close the overlay.
///
/// Returns `None` when the page has no history trigger.
pub async fn capture(
    driver: &dyn PageDriver,
    spec: &HistorySpec,
    storage: &CaseStorage,
    timings: ModalTimings,
) -> Result<Option<HistoryNote>> {
    let triggers = match driver.find_all(&spec.trigger).await {
        Ok(found) => found,
        Err(e) if e.is_not_found() => Vec::new(),
        Err(e) => return Err(e.into()),
    };
    let Some(&last) = triggers.last() else {
        info!("no business history on the page");
        return Ok(None);
    };

    let handler = driver.read_attribute(last, "onclick").await?.unwrap_or_default();
    let date = if handler.contains(spec.marker.as_str()) {
        handler_argument(&handler, spec.date_arg_index)
    } else {
        None
    };
    let date = date.unwrap_or_else(|| {
        warn!(handler = %handler, index = spec.date_arg_index, "history date not found in handler");
        UNKNOWN_DATE.to_string()
    });

    let mut content: Option<String> = None;
    let slot = &mut content;
    let outcome = modal::run(
        driver,
        "history",
        Trigger::Handle(last),
        &spec.container,
        &spec.close,
        timings,
        move |handle| async move {
            let html = driver.read_html(handle).await?;
            *slot = Some(history_text(&html, spec)?);
            Ok::<_, HarvestError>(CaseRecord::new())
        },
    )
    .await?;

    let path = match content.filter(|c| !c.is_empty()) {
        Some(text) => {
            let path = storage.history_path(&date);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, text).await?;
            info!(date = %date, path = %path.display(), "business history saved");
            Some(path)
        }
        None => None,
    };

    Ok(Some(HistoryNote {
        date,
        path,
        modal: outcome,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modal::{CloseMethod, ModalState};
    use crate::profile::{PortalKind, PortalProfile};
    use crate::renderer::fake::{Effect, FakeDriver, FakeElement};
    use crate::types::LocatorSpec;
    use std::time::Duration;

    const BUSINESS: &str = r#"<div id="caseBusinessDiv_cnr">
        <span class="h2">Daily Status</span>
        <center>In the court of : Civil Judge</center>
        <center>CNR Number : MHAU010012342023</center>
        <table width="87%">
          <tr><td>Business</td><td>:</td><td>Evidence part heard</td></tr>
          <tr><td>Next Purpose</td><td>:</td><td>Arguments</td></tr>
          <tr><td>Blank</td><td>:</td><td></td></tr>
        </table></div>"#;

    fn spec() -> HistorySpec {
        PortalProfile::builtin(PortalKind::District)
            .history
            .unwrap()
    }

    fn timings() -> ModalTimings {
        ModalTimings {
            locate: Duration::from_millis(100),
            visible: Duration::from_millis(300),
            close_wait: Duration::from_millis(20),
        }
    }

    #[test]
    fn test_handler_argument_position() {
        let h = "viewBusiness('x','1','2','3','4','5','12-01-2024','7')";
        assert_eq!(handler_argument(h, 6).as_deref(), Some("12-01-2024"));
        assert_eq!(handler_argument(h, 9), None);
        assert_eq!(handler_argument("viewBusiness", 0), None);
    }

    #[test]
    fn test_history_text() {
        let text = history_text(BUSINESS, &spec()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Daily Status");
        assert_eq!(lines[1], "-".repeat(50));
        assert_eq!(lines[2], "In the court of : Civil Judge");
        assert_eq!(lines[4], "Business: Evidence part heard");
        assert_eq!(lines[5], "Next Purpose: Arguments");
        assert_eq!(lines.len(), 6);
    }

    #[tokio::test]
    async fn test_capture_uses_last_trigger_and_closes() {
        let root = tempfile::tempdir().unwrap();
        let storage = CaseStorage::new(root.path(), "MHAU010012342023");
        let trigger = LocatorSpec::css("a[onclick*='viewBusiness']");
        let driver = FakeDriver::new("https://portal.test/")
            .with(
                "older",
                FakeElement::new(trigger.clone())
                    .attr("onclick", "viewBusiness('a','b','c','d','e','f','01-12-2023')"),
            )
            .with(
                "latest",
                FakeElement::new(trigger)
                    .attr("onclick", "viewBusiness('a','b','c','d','e','f','12-01-2024')")
                    .on_click(Effect::Show("business".into())),
            )
            .with(
                "business",
                FakeElement::new(LocatorSpec::id("caseBusinessDiv_cnr"))
                    .html(BUSINESS)
                    .hidden(),
            )
            .on_escape(vec![Effect::Hide("business".into())]);

        let note = capture(&driver, &spec(), &storage, timings())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(note.date, "12-01-2024");
        assert_eq!(driver.clicks("latest"), 1);
        assert_eq!(driver.clicks("older"), 0);
        assert_eq!(note.modal.final_state(), ModalState::Closed);
        assert_eq!(note.modal.close_method, Some(CloseMethod::Escape));

        let path = note.path.unwrap();
        assert!(path.ends_with("history/business_details_12-01-2024.txt"));
        let written = std::fs::read_to_string(path).unwrap();
        assert!(written.starts_with("Daily Status\n"));
    }

    #[tokio::test]
    async fn test_capture_without_trigger() {
        let root = tempfile::tempdir().unwrap();
        let storage = CaseStorage::new(root.path(), "X");
        let driver = FakeDriver::new("https://portal.test/");
        assert!(capture(&driver, &spec(), &storage, timings())
            .await
            .unwrap()
            .is_none());
    }
}
