//! Cookie-carrying HTTP transfers, independent of the browser.

use crate::error::Result;
use crate::report::{DownloadFailure, SavedDocument};
use crate::types::{DocumentRef, SessionCookies};
use futures::stream::{self, StreamExt};
use reqwest::header::{COOKIE, REFERER};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) \
                          AppleWebKit/537.36 (KHTML, like Gecko) \
                          Chrome/131.0.0.0 Safari/537.36";

/// Upper bound on parallel transfers for one case.
pub const MAX_CONCURRENCY: usize = 8;

const PART_SUFFIX: &str = "part";

static NEXT_PART: AtomicU64 = AtomicU64::new(0);

/// Downloads documents into a directory.
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    concurrency: usize,
    timeout: Duration,
}

impl Fetcher {
    /// `timeout` bounds each transfer on its own; `concurrency` is clamped
    /// to `1..=MAX_CONCURRENCY`.
    pub fn new(timeout: Duration, concurrency: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            concurrency: concurrency.clamp(1, MAX_CONCURRENCY),
            timeout,
        })
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Download one document into `dir`.
    ///
    /// Bytes go to a private `{file_name}.{n}.part` file and are renamed into
    /// place only after the body is complete, so a failed transfer leaves no
    /// file behind. Transfers sharing a file name never share a partial file;
    /// the last one to finish owns the name.
    pub async fn fetch(
        &self,
        doc: &DocumentRef,
        cookies: &SessionCookies,
        referer: Option<&str>,
        dir: &Path,
    ) -> std::result::Result<SavedDocument, DownloadFailure> {
        let target = dir.join(&doc.file_name);
        let partial = part_path(&target, NEXT_PART.fetch_add(1, Ordering::Relaxed));
        let outcome = tokio::time::timeout(
            self.timeout,
            self.stream_to(doc, cookies, referer, &partial),
        )
        .await
        .unwrap_or_else(|_| Err(format!("timed out after {}s", self.timeout.as_secs())));

        let fail = |reason: String| DownloadFailure {
            url: doc.url.to_string(),
            file_name: doc.file_name.clone(),
            reason,
        };
        match outcome {
            Ok(bytes) => {
                if let Err(e) = tokio::fs::rename(&partial, &target).await {
                    let _ = tokio::fs::remove_file(&partial).await;
                    warn!(url = %doc.url, error = %e, "could not move document into place");
                    return Err(fail(e.to_string()));
                }
                info!(url = %doc.url, file = %doc.file_name, bytes, "document saved");
                Ok(SavedDocument {
                    url: doc.url.to_string(),
                    file_name: doc.file_name.clone(),
                    bytes,
                })
            }
            Err(reason) => {
                let _ = tokio::fs::remove_file(&partial).await;
                warn!(url = %doc.url, reason = %reason, "document download failed");
                Err(fail(reason))
            }
        }
    }

    async fn stream_to(
        &self,
        doc: &DocumentRef,
        cookies: &SessionCookies,
        referer: Option<&str>,
        partial: &Path,
    ) -> std::result::Result<u64, String> {
        let mut request = self.client.get(doc.url.clone());
        if let Some(header) = cookies.header_value() {
            request = request.header(COOKIE, header);
        }
        if let Some(referer) = referer {
            request = request.header(REFERER, referer);
        }
        let resp = request.send().await.map_err(|e| e.to_string())?;
        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            return Err(format!("HTTP {}", status.as_u16()));
        }

        let mut file = tokio::fs::File::create(partial)
            .await
            .map_err(|e| e.to_string())?;
        let mut body = resp.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| e.to_string())?;
            file.write_all(&chunk).await.map_err(|e| e.to_string())?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| e.to_string())?;
        debug!(url = %doc.url, written, "transfer complete");
        Ok(written)
    }

    /// Download every document, at most `concurrency` at a time.
    ///
    /// Results keep the order of `docs`. A failure never stops the others.
    pub async fn fetch_all(
        &self,
        docs: &[DocumentRef],
        cookies: &SessionCookies,
        referer: Option<&str>,
        dir: &Path,
    ) -> (Vec<SavedDocument>, Vec<DownloadFailure>) {
        let results: Vec<_> = stream::iter(docs)
            .map(|doc| self.fetch(doc, cookies, referer, dir))
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut saved = Vec::new();
        let mut failed = Vec::new();
        for result in results {
            match result {
                Ok(doc) => saved.push(doc),
                Err(failure) => failed.push(failure),
            }
        }
        (saved, failed)
    }
}

fn part_path(target: &Path, n: u64) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{n}.{PART_SUFFIX}"));
    target.with_file_name(name)
}

/// Delete partial files left in `dir` by transfers that were cancelled.
///
/// Returns how many were removed.
pub async fn remove_partials(dir: &Path) -> Result<usize> {
    let mut removed = 0;
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == PART_SUFFIX) {
            tokio::fs::remove_file(&path).await?;
            debug!(path = %path.display(), "removed partial download");
            removed += 1;
        }
    }
    Ok(removed)
}
