//! Folding a profile's sections into one record.
//!
//! Each section is located and normalised on its own. A missing or broken
//! section becomes an [`ExtractionGap`] and the pass moves on, so one bad
//! table never costs the rest of the record.

use super::{cell_text, collapse_ws, extract, table_rows};
use crate::error::{HarvestError, Result};
use crate::locator;
use crate::profile::{DocumentSpec, SectionSpec, TitleSpec};
use crate::renderer::PageDriver;
use crate::report::{ExtractionGap, GapKind};
use crate::types::{CaseRecord, DocumentLink, LinkTarget};
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, warn};

/// Field that holds the result heading.
pub const TITLE_FIELD: &str = "Title";

fn gap_for(section: &str, err: HarvestError) -> Result<ExtractionGap> {
    match err {
        HarvestError::DeadlineExceeded => Err(HarvestError::DeadlineExceeded),
        HarvestError::ElementNotFound { .. } => {
            warn!(section, "section not present");
            Ok(ExtractionGap::new(section, GapKind::Missing))
        }
        other => {
            warn!(section, error = %other, "section unreadable");
            Ok(ExtractionGap::new(
                section,
                GapKind::Unreadable {
                    reason: other.to_string(),
                },
            ))
        }
    }
}

/// Locate and normalise every section, merging fragments into `record`.
pub async fn read_sections(
    driver: &dyn PageDriver,
    sections: &[SectionSpec],
    locate: Duration,
    record: &mut CaseRecord,
) -> Result<Vec<ExtractionGap>> {
    let mut gaps = Vec::new();
    for section in sections {
        let read = async {
            let table = locator::resolve(driver, &section.locator, locate).await?;
            extract(driver, table, section.schema, &section.group).await
        };
        match read.await {
            Ok(fragment) => {
                debug!(section = %section.name, fields = fragment.len(), "section read");
                record.merge(fragment, section.prefix.as_deref());
            }
            Err(e) => gaps.push(gap_for(&section.name, e)?),
        }
    }
    Ok(gaps)
}

/// Heading lines of the result container, joined with newlines.
pub fn title_from_html(html: &str, headings: &[String]) -> String {
    let doc = Html::parse_fragment(html);
    headings
        .iter()
        .filter_map(|tag| Selector::parse(tag).ok())
        .filter_map(|sel| doc.select(&sel).next().map(|h| collapse_ws(&h.text().collect::<String>())))
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Read the title into `record` under [`TITLE_FIELD`].
pub async fn read_title(
    driver: &dyn PageDriver,
    spec: &TitleSpec,
    locate: Duration,
    record: &mut CaseRecord,
) -> Result<Option<ExtractionGap>> {
    let read = async {
        let container = locator::resolve(driver, &spec.container, locate).await?;
        Ok::<_, HarvestError>(driver.read_html(container).await?)
    };
    match read.await {
        Ok(html) => {
            let title = title_from_html(&html, &spec.headings);
            if title.is_empty() {
                return Ok(Some(ExtractionGap::new("title", GapKind::Missing)));
            }
            record.insert(TITLE_FIELD, title);
            Ok(None)
        }
        Err(e) => gap_for("title", e).map(Some),
    }
}

fn parse_css(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| HarvestError::Config(format!("invalid selector '{css}': {e}")))
}

/// Collect document links from the page's HTML, in page order.
///
/// Direct links are anchors whose `href` contains one of the profile's
/// patterns. Order-table rows contribute script-encoded links named by
/// their date cell. Duplicate targets are kept once.
pub fn collect_document_links(page_html: &str, spec: &DocumentSpec) -> Result<Vec<DocumentLink>> {
    let doc = Html::parse_document(page_html);
    let mut links: Vec<DocumentLink> = Vec::new();
    let mut push = |link: DocumentLink| {
        if !links.iter().any(|l| l.target == link.target) {
            links.push(link);
        }
    };

    let anchors = parse_css(&spec.anchor_css)?;
    let mut n = 0;
    for a in doc.select(&anchors) {
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        if spec.href_patterns.iter().any(|p| href.contains(p.as_str())) {
            push(DocumentLink {
                target: LinkTarget::Href(href.trim().to_string()),
                hint: None,
                row: n,
            });
            n += 1;
        }
    }

    if let Some(order) = &spec.order_table {
        let table_sel = parse_css(&order.table_css)?;
        let a_sel = parse_css("a")?;
        if let Some(table) = doc.select(&table_sel).next() {
            for (row_index, row) in table_rows(table).into_iter().enumerate() {
                let needed = order.link_cell.max(order.date_cell) + 1;
                if row.cells.len() < needed.max(3) {
                    continue;
                }
                let Some(anchor) = row.cells[order.link_cell].select(&a_sel).next() else {
                    continue;
                };
                let Some(onclick) = anchor.value().attr("onclick") else {
                    continue;
                };
                if !onclick.contains(order.script_marker.as_str()) {
                    continue;
                }
                let date = cell_text(row.cells[order.date_cell]).replace('/', "-");
                push(DocumentLink {
                    target: LinkTarget::Script(onclick.to_string()),
                    hint: (!date.is_empty()).then(|| format!("order_{date}")),
                    row: row_index,
                });
            }
        }
    }

    debug!(count = links.len(), "document links collected");
    Ok(links)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{OrderTableSpec, PortalKind, PortalProfile};
    use crate::renderer::fake::{FakeDriver, FakeElement};
    use crate::types::LocatorSpec;

    fn district_docs() -> DocumentSpec {
        PortalProfile::builtin(PortalKind::District).documents
    }

    #[test]
    fn test_links_from_hrefs_and_order_table() {
        let html = r##"<html><body>
            <a href="/files/a.pdf">A</a>
            <a href="/home">Home</a>
            <a href="display_pdf.php?id=7">B</a>
            <a href="/files/a.pdf">A again</a>
            <table class="order_table table">
              <tr><th>No</th><th>Date</th><th>Order</th></tr>
              <tr><td>1</td><td>12/01/2024</td>
                  <td><a onclick="displayPdf('home/display_pdf&amp;filename=x1')">Copy</a></td></tr>
              <tr><td>2</td><td>03/02/2024</td><td><a href="#">none</a></td></tr>
            </table></body></html>"##;
        let links = collect_document_links(html, &district_docs()).unwrap();
        assert_eq!(links.len(), 3);
        assert_eq!(links[0].target, LinkTarget::Href("/files/a.pdf".into()));
        assert_eq!(links[1].target, LinkTarget::Href("display_pdf.php?id=7".into()));
        assert_eq!(
            links[2].target,
            LinkTarget::Script("displayPdf('home/display_pdf&filename=x1')".into())
        );
        assert_eq!(links[2].hint.as_deref(), Some("order_12-01-2024"));
        assert_eq!(links[2].row, 1);
    }

    #[test]
    fn test_invalid_anchor_selector_is_config_error() {
        let spec = DocumentSpec {
            anchor_css: "a[".into(),
            href_patterns: vec![".pdf".into()],
            order_table: None::<OrderTableSpec>,
            reveal: Vec::new(),
        };
        assert!(matches!(
            collect_document_links("<a href='x.pdf'></a>", &spec),
            Err(HarvestError::Config(_))
        ));
    }

    #[test]
    fn test_title_joins_headings() {
        let html = "<div id='cnrResultsDetails'><h3> Diary No. 1234 - 2024 </h3><h4>A\u{a0}vs B</h4></div>";
        let title = title_from_html(html, &["h3".to_string(), "h4".to_string()]);
        assert_eq!(title, "Diary No. 1234 - 2024\nA vs B");
    }

    #[tokio::test]
    async fn test_missing_section_is_a_gap_not_an_error() {
        let details = "<table class='case_details_table'><tr><td>CNR Number</td><td>MHAU01</td></tr></table>";
        let status = "<table class='case_status_table'><tr><td><label>Case Stage</label></td><td>Evidence</td></tr></table>";
        let driver = FakeDriver::new("https://portal.test/")
            .with(
                "details",
                FakeElement::new(LocatorSpec::css("table.case_details_table")).html(details),
            )
            .with(
                "status",
                FakeElement::new(LocatorSpec::css("table.case_status_table")).html(status),
            );
        let sections = PortalProfile::builtin(PortalKind::District).sections;
        let mut record = CaseRecord::new();
        let gaps = read_sections(&driver, &sections, Duration::from_millis(100), &mut record)
            .await
            .unwrap();

        assert_eq!(record.get("CNR Number"), Some("MHAU01"));
        assert_eq!(record.get("Status_Case Stage"), Some("Evidence"));
        let missing: Vec<_> = gaps.iter().map(|g| g.section.as_str()).collect();
        assert_eq!(missing, vec!["petitioner_advocate", "respondent_advocate", "acts"]);
        assert!(gaps.iter().all(|g| g.kind == GapKind::Missing));
    }
}
