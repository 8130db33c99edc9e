//! Rendering capability abstraction.
//!
//! Defines the `PageDriver` trait that abstracts over the browser engine
//! (currently Chromium via chromiumoxide). The engine only ever talks to a
//! page through this trait, one call at a time.

pub mod chromium;
#[cfg(test)]
pub(crate) mod fake;

use crate::error::DriverError;
use crate::types::{LocatorSpec, SessionCookies};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Result type for driver calls.
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// Opaque handle to an element that a driver has located.
///
/// Handles stay valid until the page navigates away; using a stale handle
/// yields `DriverError::NotFound`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub u64);

/// A live, single-tab page that the engine can drive.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate to a URL with a timeout.
    async fn navigate(&self, url: &str, timeout: Duration) -> DriverResult<NavigationResult>;
    /// Locate the first element matching one strategy.
    async fn find_element(&self, spec: &LocatorSpec) -> DriverResult<ElementHandle>;
    /// Locate every element matching one strategy, in document order.
    async fn find_all(&self, spec: &LocatorSpec) -> DriverResult<Vec<ElementHandle>>;
    async fn click(&self, element: ElementHandle) -> DriverResult<()>;
    /// Clear the element's current value and type `text` into it.
    async fn type_text(&self, element: ElementHandle, text: &str) -> DriverResult<()>;
    /// Rendered text of the element.
    async fn read_text(&self, element: ElementHandle) -> DriverResult<String>;
    async fn read_attribute(
        &self,
        element: ElementHandle,
        name: &str,
    ) -> DriverResult<Option<String>>;
    /// Outer HTML of the element.
    async fn read_html(&self, element: ElementHandle) -> DriverResult<String>;
    /// Whether the element is rendered and takes up space.
    async fn is_visible(&self, element: ElementHandle) -> DriverResult<bool>;
    /// Evaluate a script in the page and return its JSON result.
    async fn execute_script(&self, source: &str) -> DriverResult<serde_json::Value>;
    /// PNG screenshot of an element, or of the viewport when `None`.
    async fn screenshot(&self, element: Option<ElementHandle>) -> DriverResult<Vec<u8>>;
    /// Send an Escape key press to the page.
    async fn press_escape(&self) -> DriverResult<()>;
    /// Copy of the session's cookies at this moment.
    async fn cookies(&self) -> DriverResult<SessionCookies>;
    async fn current_url(&self) -> DriverResult<String>;
    /// Full serialized DOM of the page.
    async fn page_html(&self) -> DriverResult<String>;
}
