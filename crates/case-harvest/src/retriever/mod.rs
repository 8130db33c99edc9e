//! Document retriever.
//!
//! Links collected from the results page are turned into [`DocumentRef`]s
//! here (URL derivation and file naming), then handed to
//! [`transfer::Fetcher`], which downloads them over its own HTTP client
//! carrying a snapshot of the browser session's cookies.

pub mod transfer;

use crate::error::{HarvestError, Result};
use crate::profile::DocumentSpec;
use crate::report::DownloadFailure;
use crate::types::{DocumentLink, DocumentRef, LinkTarget};
use tracing::warn;
use url::Url;

pub use transfer::Fetcher;

/// Literal argument of an inline handler such as `displayPdf('a/b?c=d')`.
pub fn script_argument(handler: &str) -> Option<&str> {
    for (open, close) in [("('", "')"), ("(\"", "\")")] {
        if let Some(start) = handler.find(open).map(|i| i + open.len()) {
            if let Some(len) = handler[start..].find(close) {
                let arg = handler[start..start + len].trim();
                if !arg.is_empty() {
                    return Some(arg);
                }
            }
        }
    }
    None
}

/// Absolute URL of a document link.
///
/// Hrefs are resolved against the page URL. Script handlers have their
/// literal argument appended to `script_base`; an argument that is already
/// absolute is used as is.
pub fn derive_url(link: &DocumentLink, page_url: &Url, script_base: Option<&str>) -> Result<Url> {
    match &link.target {
        LinkTarget::Href(href) => Ok(page_url.join(href)?),
        LinkTarget::Script(handler) => {
            let arg = script_argument(handler).ok_or_else(|| {
                HarvestError::Config(format!("no literal argument in handler '{handler}'"))
            })?;
            if arg.starts_with("http://") || arg.starts_with("https://") {
                return Ok(Url::parse(arg)?);
            }
            let base = script_base.ok_or_else(|| {
                HarvestError::Config("script document link without a base URL".to_string())
            })?;
            Ok(Url::parse(&format!("{base}{}", arg.trim_start_matches('/')))?)
        }
    }
}

/// Replace characters that are unsafe in file names.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    cleaned.trim_matches('.').to_string()
}

/// File name for a document: content hint, then the URL's last segment
/// when it names a PDF, then `document_{n}.pdf`.
pub fn file_name(hint: Option<&str>, url: &Url, n: usize) -> String {
    if let Some(hint) = hint.map(sanitize_file_name).filter(|h| !h.is_empty()) {
        return if hint.to_ascii_lowercase().ends_with(".pdf") {
            hint
        } else {
            format!("{hint}.pdf")
        };
    }
    let last = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .map(sanitize_file_name)
        .unwrap_or_default();
    if last.to_ascii_lowercase().ends_with(".pdf") && last.len() > 4 {
        return last;
    }
    format!("document_{n}.pdf")
}

/// Turn collected links into transfer requests.
///
/// A link whose URL cannot be derived becomes a [`DownloadFailure`] and the
/// rest are still planned.
pub fn plan(
    links: &[DocumentLink],
    page_url: &Url,
    spec: &DocumentSpec,
) -> (Vec<DocumentRef>, Vec<DownloadFailure>) {
    let script_base = spec.order_table.as_ref().map(|o| o.base_url.as_str());
    let mut refs = Vec::new();
    let mut failures = Vec::new();
    for (i, link) in links.iter().enumerate() {
        let n = i + 1;
        match derive_url(link, page_url, script_base) {
            Ok(url) => refs.push(DocumentRef {
                file_name: file_name(link.hint.as_deref(), &url, n),
                url,
                row: link.row,
            }),
            Err(e) => {
                let raw = match &link.target {
                    LinkTarget::Href(s) | LinkTarget::Script(s) => s.clone(),
                };
                warn!(link = %raw, error = %e, "document URL could not be derived");
                failures.push(DownloadFailure {
                    url: raw,
                    file_name: format!("document_{n}.pdf"),
                    reason: e.to_string(),
                });
            }
        }
    }
    (refs, failures)
}
