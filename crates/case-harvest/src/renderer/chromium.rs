//! Chromium-based page driver using chromiumoxide.

use super::{DriverResult, ElementHandle, NavigationResult, PageDriver};
use crate::error::DriverError;
use crate::types::{LocatorSpec, SessionCookies, Strategy};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

const VISIBILITY_FN: &str = "function() { \
    const s = window.getComputedStyle(this); \
    const r = this.getBoundingClientRect(); \
    return s.display !== 'none' && s.visibility !== 'hidden' && (r.width > 0 || r.height > 0); }";

const CLEAR_FN: &str = "function() { if ('value' in this) { this.value = ''; } }";

/// Find the Chromium binary: `CASE_HARVEST_CHROMIUM_PATH`, then `PATH`.
pub fn find_chromium() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os("CASE_HARVEST_CHROMIUM_PATH").map(PathBuf::from) {
        if path.exists() {
            return Some(path);
        }
    }
    ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"]
        .into_iter()
        .find_map(|name| which::which(name).ok())
}

/// Quote a string for use inside an XPath expression.
fn xpath_literal(s: &str) -> String {
    if !s.contains('\'') {
        format!("'{s}'")
    } else if !s.contains('"') {
        format!("\"{s}\"")
    } else {
        let parts: Vec<String> = s.split('\'').map(|p| format!("'{p}'")).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

/// How a strategy is expressed in the browser's own query languages.
#[derive(Debug, PartialEq, Eq)]
enum Query {
    Css(String),
    XPath(String),
}

fn to_query(spec: &LocatorSpec) -> Query {
    let sel = &spec.selector;
    match spec.strategy {
        Strategy::Id => Query::Css(format!("[id=\"{}\"]", sel.replace('"', "\\\""))),
        Strategy::Name => Query::Css(format!("[name=\"{}\"]", sel.replace('"', "\\\""))),
        Strategy::Css => Query::Css(sel.clone()),
        Strategy::XPath => Query::XPath(sel.clone()),
        Strategy::LinkText => Query::XPath(format!("//a[normalize-space(.)={}]", xpath_literal(sel))),
        Strategy::PartialLinkText => {
            Query::XPath(format!("//a[contains(., {})]", xpath_literal(sel)))
        }
    }
}

fn protocol(e: impl std::fmt::Display) -> DriverError {
    DriverError::Protocol(e.to_string())
}

/// Classify a failed element query.
///
/// Only "no such node" means the element is missing. A selector the page
/// rejects is a script error; anything else is a broken session.
fn lookup_error(spec: &LocatorSpec, e: CdpError) -> DriverError {
    match e {
        CdpError::NotFound => DriverError::NotFound(spec.to_string()),
        other => classify_lookup(spec, &other.to_string()),
    }
}

fn classify_lookup(spec: &LocatorSpec, message: &str) -> DriverError {
    if message.contains("Could not find node") || message.contains("No node with given id") {
        DriverError::NotFound(spec.to_string())
    } else if message.contains("DOM Error while querying") || message.contains("is not a valid") {
        DriverError::Script(format!("{spec}: {message}"))
    } else {
        DriverError::Protocol(format!("{spec}: {message}"))
    }
}

/// A headless Chromium tab driven through the DevTools protocol.
pub struct ChromiumDriver {
    _browser: Browser,
    page: Page,
    elements: Mutex<HashMap<u64, Arc<Element>>>,
    next_id: AtomicU64,
}

impl ChromiumDriver {
    /// Launch a Chromium instance and open one blank tab.
    pub async fn launch(headless: bool) -> DriverResult<Self> {
        let chrome_path = find_chromium().ok_or_else(|| {
            DriverError::Protocol(
                "Chromium not found. Set CASE_HARVEST_CHROMIUM_PATH or install Chrome.".into(),
            )
        })?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .window_size(1366, 900)
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions");
        if headless {
            builder = builder.arg("--headless=new");
        } else {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| DriverError::Protocol(format!("failed to build browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| DriverError::Protocol(format!("failed to launch Chromium: {e}")))?;

        // Spawn the handler task
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let page = browser.new_page("about:blank").await.map_err(protocol)?;

        Ok(Self {
            _browser: browser,
            page,
            elements: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    async fn register(&self, element: Element) -> ElementHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.elements.lock().await.insert(id, Arc::new(element));
        ElementHandle(id)
    }

    async fn element(&self, handle: ElementHandle) -> DriverResult<Arc<Element>> {
        self.elements
            .lock()
            .await
            .get(&handle.0)
            .cloned()
            .ok_or_else(|| DriverError::NotFound(format!("stale element handle {}", handle.0)))
    }

    async fn call_on(&self, handle: ElementHandle, function: &str) -> DriverResult<serde_json::Value> {
        let element = self.element(handle).await?;
        let returns = element
            .call_js_fn(function, false)
            .await
            .map_err(|e| DriverError::Script(e.to_string()))?;
        Ok(returns.result.value.unwrap_or(serde_json::Value::Null))
    }
}

#[async_trait]
impl PageDriver for ChromiumDriver {
    async fn navigate(&self, url: &str, timeout: Duration) -> DriverResult<NavigationResult> {
        let start = Instant::now();
        let result = tokio::time::timeout(timeout, self.page.goto(url)).await;
        let load_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(_)) => {
                // Handles from the previous document are dead now.
                self.elements.lock().await.clear();
                let final_url = self
                    .page
                    .url()
                    .await
                    .ok()
                    .flatten()
                    .unwrap_or_else(|| url.to_string());
                Ok(NavigationResult {
                    final_url,
                    load_time_ms,
                })
            }
            Ok(Err(e)) => Err(DriverError::Protocol(format!("navigation failed: {e}"))),
            Err(_) => Err(DriverError::Protocol(format!(
                "navigation timed out after {}ms",
                timeout.as_millis()
            ))),
        }
    }

    async fn find_element(&self, spec: &LocatorSpec) -> DriverResult<ElementHandle> {
        let found = match to_query(spec) {
            Query::Css(css) => self.page.find_element(css).await,
            Query::XPath(xpath) => self.page.find_xpath(xpath).await,
        };
        match found {
            Ok(element) => Ok(self.register(element).await),
            Err(e) => {
                debug!(%spec, error = %e, "lookup failed");
                Err(lookup_error(spec, e))
            }
        }
    }

    async fn find_all(&self, spec: &LocatorSpec) -> DriverResult<Vec<ElementHandle>> {
        let found = match to_query(spec) {
            Query::Css(css) => self.page.find_elements(css).await,
            Query::XPath(xpath) => self.page.find_xpaths(xpath).await,
        };
        let elements = match found {
            Ok(elements) => elements,
            Err(e) => match lookup_error(spec, e) {
                DriverError::NotFound(_) => Vec::new(),
                other => return Err(other),
            },
        };
        let mut handles = Vec::with_capacity(elements.len());
        for element in elements {
            handles.push(self.register(element).await);
        }
        Ok(handles)
    }

    async fn click(&self, element: ElementHandle) -> DriverResult<()> {
        let element = self.element(element).await?;
        element.click().await.map_err(protocol)?;
        Ok(())
    }

    async fn type_text(&self, element: ElementHandle, text: &str) -> DriverResult<()> {
        self.call_on(element, CLEAR_FN).await?;
        let element = self.element(element).await?;
        element.click().await.map_err(protocol)?;
        element.type_str(text).await.map_err(protocol)?;
        Ok(())
    }

    async fn read_text(&self, element: ElementHandle) -> DriverResult<String> {
        let element = self.element(element).await?;
        let text = element.inner_text().await.map_err(protocol)?;
        Ok(text.unwrap_or_default())
    }

    async fn read_attribute(
        &self,
        element: ElementHandle,
        name: &str,
    ) -> DriverResult<Option<String>> {
        let element = self.element(element).await?;
        element.attribute(name).await.map_err(protocol)
    }

    async fn read_html(&self, element: ElementHandle) -> DriverResult<String> {
        let element = self.element(element).await?;
        let html = element.outer_html().await.map_err(protocol)?;
        Ok(html.unwrap_or_default())
    }

    async fn is_visible(&self, element: ElementHandle) -> DriverResult<bool> {
        let value = self.call_on(element, VISIBILITY_FN).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn execute_script(&self, source: &str) -> DriverResult<serde_json::Value> {
        let result = self
            .page
            .evaluate(source)
            .await
            .map_err(|e| DriverError::Script(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn screenshot(&self, element: Option<ElementHandle>) -> DriverResult<Vec<u8>> {
        match element {
            Some(handle) => {
                let element = self.element(handle).await?;
                element
                    .screenshot(CaptureScreenshotFormat::Png)
                    .await
                    .map_err(protocol)
            }
            None => self
                .page
                .screenshot(ScreenshotParams::builder().build())
                .await
                .map_err(protocol),
        }
    }

    async fn press_escape(&self) -> DriverResult<()> {
        let body = self.page.find_element("body").await.map_err(protocol)?;
        body.press_key("Escape").await.map_err(protocol)?;
        Ok(())
    }

    async fn cookies(&self) -> DriverResult<SessionCookies> {
        let cookies = self.page.get_cookies().await.map_err(protocol)?;
        Ok(cookies.into_iter().map(|c| (c.name, c.value)).collect())
    }

    async fn current_url(&self) -> DriverResult<String> {
        let url = self.page.url().await.map_err(protocol)?;
        Ok(url.unwrap_or_default())
    }

    async fn page_html(&self) -> DriverResult<String> {
        self.page.content().await.map_err(protocol)
    }
}
