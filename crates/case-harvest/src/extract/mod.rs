//! Field extractor: turns one result table into a record fragment.
//!
//! Tables are read as HTML through the driver and normalised with `scraper`,
//! so the same rules apply to a live page and to saved markup. Four table
//! shapes are understood, see [`TableSchema`].

pub mod sections;

use crate::error::Result;
use crate::renderer::{ElementHandle, PageDriver};
use crate::types::{CaseRecord, TableSchema};
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use std::sync::OnceLock;

fn br_split() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<br\s*/?>").expect("valid regex"))
}

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("valid selector")
}

/// Collapse runs of whitespace (including non-breaking spaces) and trim.
pub fn collapse_ws(s: &str) -> String {
    s.split(|c: char| c.is_whitespace() || c == '\u{a0}')
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Read an element's text with `<br>` as a line break.
///
/// Each line is whitespace-collapsed and empty lines are dropped, which
/// approximates the rendered text of a table cell.
pub fn cell_text(el: ElementRef<'_>) -> String {
    let mut raw = String::new();
    for node in el.descendants() {
        match node.value() {
            Node::Text(t) => raw.push_str(t),
            Node::Element(e) if e.name() == "br" => raw.push('\n'),
            _ => {}
        }
    }
    raw.lines()
        .map(collapse_ws)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Label of a pair-table row.
///
/// Priority: first non-empty text node directly under the cell (nested
/// controls are ignored), then the cell's full text, then the text of a
/// nested `<label>`.
pub fn label_text(cell: ElementRef<'_>) -> String {
    let direct = cell.children().find_map(|child| match child.value() {
        Node::Text(t) if !t.trim().is_empty() => Some(t.to_string()),
        _ => None,
    });
    if let Some(text) = direct {
        return collapse_ws(&text);
    }
    let full = collapse_ws(&cell.text().collect::<String>());
    if !full.is_empty() {
        return full;
    }
    cell.select(&selector("label"))
        .next()
        .map(|l| collapse_ws(&l.text().collect::<String>()))
        .unwrap_or_default()
}

/// Strip markup from an HTML fragment and collapse its whitespace.
fn fragment_text(html: &str) -> String {
    let doc = Html::parse_fragment(html);
    collapse_ws(&doc.root_element().text().collect::<String>())
}

/// Bare row groups do not survive HTML fragment parsing outside a table.
fn wrap_table(html: &str) -> String {
    let head = html.trim_start().to_ascii_lowercase();
    if head.starts_with("<tbody") || head.starts_with("<thead") || head.starts_with("<tr") {
        format!("<table>{html}</table>")
    } else {
        html.to_string()
    }
}

pub(crate) struct Row<'a> {
    pub(crate) cells: Vec<ElementRef<'a>>,
    pub(crate) has_header: bool,
}

/// Rows of the first table in `doc`.
fn rows(doc: &Html) -> Vec<Row<'_>> {
    match doc.select(&selector("table")).next() {
        Some(table) => table_rows(table),
        None => Vec::new(),
    }
}

/// Rows of `table`, ignoring rows of nested tables.
pub(crate) fn table_rows(table: ElementRef<'_>) -> Vec<Row<'_>> {
    let table_id = table.id();
    table
        .select(&selector("tr"))
        .filter(|tr| {
            tr.ancestors()
                .filter_map(ElementRef::wrap)
                .find(|a| a.value().name() == "table")
                .map(|a| a.id() == table_id)
                .unwrap_or(false)
        })
        .map(|tr| {
            let children: Vec<ElementRef<'_>> = tr
                .children()
                .filter_map(ElementRef::wrap)
                .filter(|c| matches!(c.value().name(), "td" | "th"))
                .collect();
            let has_header = children.iter().any(|c| c.value().name() == "th");
            let cells = children
                .into_iter()
                .filter(|c| c.value().name() == "td")
                .collect();
            Row { cells, has_header }
        })
        .collect()
}

/// Normalise one table's HTML according to `schema`.
///
/// `group` names the key family for the grouped and paired schemas
/// (`Petitioner_Advocate`, `Acts`); it is ignored by the other two.
/// Rows without a usable key are skipped.
pub fn normalize_table(html: &str, schema: TableSchema, group: &str) -> CaseRecord {
    let doc = Html::parse_fragment(&wrap_table(html));
    let mut out = CaseRecord::new();

    match schema {
        TableSchema::Pair => {
            for row in rows(&doc) {
                if row.cells.len() < 2 {
                    continue;
                }
                let key = label_text(row.cells[0]);
                if !key.is_empty() {
                    out.insert(key, cell_text(row.cells[1]));
                }
            }
        }
        TableSchema::Triple => {
            for row in rows(&doc) {
                if row.cells.len() < 3 {
                    continue;
                }
                let key = collapse_ws(&cell_text(row.cells[0]));
                if !key.is_empty() {
                    out.insert(key, cell_text(row.cells[2]));
                }
            }
        }
        TableSchema::MultiLineGrouped => {
            let mut n = 0;
            for row in rows(&doc) {
                let Some(cell) = row.cells.first() else {
                    continue;
                };
                for entry in br_split().split(&cell.inner_html()) {
                    let text = fragment_text(entry);
                    if !text.is_empty() {
                        n += 1;
                        out.insert(format!("{group}_{n}"), text);
                    }
                }
            }
        }
        TableSchema::HeaderSkipPaired => {
            let mut n = 0;
            for row in rows(&doc) {
                if row.has_header || row.cells.len() < 2 {
                    continue;
                }
                let act = cell_text(row.cells[0]);
                let section = cell_text(row.cells[1]);
                if act.is_empty() && section.is_empty() {
                    continue;
                }
                n += 1;
                out.insert(format!("{group}_Act_{n}"), act);
                out.insert(format!("{group}_Section_{n}"), section);
            }
        }
    }
    out
}

/// Read a located table through the driver and normalise it.
pub async fn extract(
    driver: &dyn PageDriver,
    table: ElementHandle,
    schema: TableSchema,
    group: &str,
) -> Result<CaseRecord> {
    let html = driver.read_html(table).await?;
    Ok(normalize_table(&html, schema, group))
}
