//! In-memory page driver for tests.
//!
//! Elements are registered up front with the locator specs they answer to.
//! Clicks, scripts and Escape presses can show, hide or remove other
//! elements, which is enough to script portal pages and overlays.

use super::{DriverResult, ElementHandle, NavigationResult, PageDriver};
use crate::error::DriverError;
use crate::types::{LocatorSpec, SessionCookies};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
pub(crate) enum Effect {
    Show(String),
    Hide(String),
    Remove(String),
    SetUrl(String),
    SetCookie(String, String),
}

#[derive(Debug, Clone, Default)]
pub(crate) struct FakeElement {
    specs: Vec<LocatorSpec>,
    html: String,
    attrs: HashMap<String, String>,
    present: bool,
    visible: bool,
    on_click: Vec<Effect>,
    typed: String,
    clicks: usize,
}

impl FakeElement {
    pub(crate) fn new(spec: LocatorSpec) -> Self {
        Self {
            specs: vec![spec],
            present: true,
            visible: true,
            ..Default::default()
        }
    }

    pub(crate) fn also(mut self, spec: LocatorSpec) -> Self {
        self.specs.push(spec);
        self
    }

    pub(crate) fn html(mut self, html: &str) -> Self {
        self.html = html.to_string();
        self
    }

    pub(crate) fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    pub(crate) fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub(crate) fn absent(mut self) -> Self {
        self.present = false;
        self.visible = false;
        self
    }

    pub(crate) fn on_click(mut self, effect: Effect) -> Self {
        self.on_click.push(effect);
        self
    }
}

#[derive(Default)]
struct FakeState {
    elements: Vec<(String, FakeElement)>,
    url: String,
    page_html: String,
    cookies: SessionCookies,
    script_effects: Vec<(String, Vec<Effect>)>,
    escape_effects: Vec<Effect>,
    lookup_delay: Duration,
    log: Vec<String>,
}

impl FakeState {
    fn index_of(&self, name: &str) -> Option<usize> {
        self.elements.iter().position(|(n, _)| n == name)
    }

    fn apply(&mut self, effects: &[Effect]) {
        for effect in effects {
            match effect {
                Effect::Show(name) => {
                    if let Some(i) = self.index_of(name) {
                        self.elements[i].1.present = true;
                        self.elements[i].1.visible = true;
                    }
                }
                Effect::Hide(name) => {
                    if let Some(i) = self.index_of(name) {
                        self.elements[i].1.visible = false;
                    }
                }
                Effect::Remove(name) => {
                    if let Some(i) = self.index_of(name) {
                        self.elements[i].1.present = false;
                        self.elements[i].1.visible = false;
                    }
                }
                Effect::SetUrl(url) => self.url = url.clone(),
                Effect::SetCookie(k, v) => self.cookies.insert(k.clone(), v.clone()),
            }
        }
    }

    fn live(&self, handle: ElementHandle) -> DriverResult<usize> {
        let i = handle.0 as usize;
        match self.elements.get(i) {
            Some((_, el)) if el.present => Ok(i),
            _ => Err(DriverError::NotFound(format!("handle {}", handle.0))),
        }
    }
}

/// Scriptable stand-in for a browser tab.
#[derive(Default)]
pub(crate) struct FakeDriver {
    state: Mutex<FakeState>,
}

impl FakeDriver {
    pub(crate) fn new(url: &str) -> Self {
        let driver = Self::default();
        driver.state.lock().unwrap().url = url.to_string();
        driver
    }

    pub(crate) fn with(self, name: &str, element: FakeElement) -> Self {
        self.state
            .lock()
            .unwrap()
            .elements
            .push((name.to_string(), element));
        self
    }

    pub(crate) fn with_page_html(self, html: &str) -> Self {
        self.state.lock().unwrap().page_html = html.to_string();
        self
    }

    pub(crate) fn with_cookie(self, name: &str, value: &str) -> Self {
        self.state.lock().unwrap().cookies.insert(name, value);
        self
    }

    /// Apply `effects` whenever an executed script contains `needle`.
    pub(crate) fn on_script(self, needle: &str, effects: Vec<Effect>) -> Self {
        self.state
            .lock()
            .unwrap()
            .script_effects
            .push((needle.to_string(), effects));
        self
    }

    /// Make every element lookup take `delay`, like a slow page.
    pub(crate) fn with_lookup_delay(self, delay: Duration) -> Self {
        self.state.lock().unwrap().lookup_delay = delay;
        self
    }

    pub(crate) fn on_escape(self, effects: Vec<Effect>) -> Self {
        self.state.lock().unwrap().escape_effects.extend(effects);
        self
    }

    pub(crate) fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    pub(crate) fn typed(&self, name: &str) -> String {
        let state = self.state.lock().unwrap();
        state
            .index_of(name)
            .map(|i| state.elements[i].1.typed.clone())
            .unwrap_or_default()
    }

    pub(crate) fn clicks(&self, name: &str) -> usize {
        let state = self.state.lock().unwrap();
        state
            .index_of(name)
            .map(|i| state.elements[i].1.clicks)
            .unwrap_or(0)
    }

    pub(crate) fn visible(&self, name: &str) -> bool {
        let state = self.state.lock().unwrap();
        state
            .index_of(name)
            .map(|i| state.elements[i].1.present && state.elements[i].1.visible)
            .unwrap_or(false)
    }

    pub(crate) fn apply(&self, effects: &[Effect]) {
        self.state.lock().unwrap().apply(effects);
    }

    async fn lookup_pause(&self) {
        let delay = self.state.lock().unwrap().lookup_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl PageDriver for FakeDriver {
    async fn navigate(&self, url: &str, _timeout: Duration) -> DriverResult<NavigationResult> {
        let mut state = self.state.lock().unwrap();
        state.log.push(format!("navigate:{url}"));
        state.url = url.to_string();
        Ok(NavigationResult {
            final_url: url.to_string(),
            load_time_ms: 0,
        })
    }

    async fn find_element(&self, spec: &LocatorSpec) -> DriverResult<ElementHandle> {
        self.lookup_pause().await;
        let mut state = self.state.lock().unwrap();
        state.log.push(format!("find:{spec}"));
        state
            .elements
            .iter()
            .position(|(_, el)| el.present && el.specs.contains(spec))
            .map(|i| ElementHandle(i as u64))
            .ok_or_else(|| DriverError::NotFound(spec.to_string()))
    }

    async fn find_all(&self, spec: &LocatorSpec) -> DriverResult<Vec<ElementHandle>> {
        self.lookup_pause().await;
        let state = self.state.lock().unwrap();
        Ok(state
            .elements
            .iter()
            .enumerate()
            .filter(|(_, (_, el))| el.present && el.specs.contains(spec))
            .map(|(i, _)| ElementHandle(i as u64))
            .collect())
    }

    async fn click(&self, element: ElementHandle) -> DriverResult<()> {
        let mut state = self.state.lock().unwrap();
        let i = state.live(element)?;
        let (name, el) = &mut state.elements[i];
        el.clicks += 1;
        let effects = el.on_click.clone();
        let entry = format!("click:{name}");
        state.log.push(entry);
        state.apply(&effects);
        Ok(())
    }

    async fn type_text(&self, element: ElementHandle, text: &str) -> DriverResult<()> {
        let mut state = self.state.lock().unwrap();
        let i = state.live(element)?;
        state.elements[i].1.typed = text.to_string();
        let entry = format!("type:{}={text}", state.elements[i].0);
        state.log.push(entry);
        Ok(())
    }

    async fn read_text(&self, element: ElementHandle) -> DriverResult<String> {
        let state = self.state.lock().unwrap();
        let i = state.live(element)?;
        let fragment = scraper::Html::parse_fragment(&state.elements[i].1.html);
        let text: String = fragment.root_element().text().collect();
        Ok(text.trim().to_string())
    }

    async fn read_attribute(
        &self,
        element: ElementHandle,
        name: &str,
    ) -> DriverResult<Option<String>> {
        let state = self.state.lock().unwrap();
        let i = state.live(element)?;
        Ok(state.elements[i].1.attrs.get(name).cloned())
    }

    async fn read_html(&self, element: ElementHandle) -> DriverResult<String> {
        let state = self.state.lock().unwrap();
        let i = state.live(element)?;
        Ok(state.elements[i].1.html.clone())
    }

    async fn is_visible(&self, element: ElementHandle) -> DriverResult<bool> {
        let state = self.state.lock().unwrap();
        let i = state.live(element)?;
        Ok(state.elements[i].1.visible)
    }

    async fn execute_script(&self, source: &str) -> DriverResult<serde_json::Value> {
        let mut state = self.state.lock().unwrap();
        state.log.push(format!("script:{source}"));
        let effects: Vec<Effect> = state
            .script_effects
            .iter()
            .filter(|(needle, _)| source.contains(needle.as_str()))
            .flat_map(|(_, e)| e.clone())
            .collect();
        state.apply(&effects);
        Ok(serde_json::Value::Null)
    }

    async fn screenshot(&self, element: Option<ElementHandle>) -> DriverResult<Vec<u8>> {
        if let Some(handle) = element {
            self.state.lock().unwrap().live(handle)?;
        }
        Ok(b"\x89PNG fake".to_vec())
    }

    async fn press_escape(&self) -> DriverResult<()> {
        let mut state = self.state.lock().unwrap();
        state.log.push("escape".to_string());
        let effects = state.escape_effects.clone();
        state.apply(&effects);
        Ok(())
    }

    async fn cookies(&self) -> DriverResult<SessionCookies> {
        Ok(self.state.lock().unwrap().cookies.clone())
    }

    async fn current_url(&self) -> DriverResult<String> {
        Ok(self.state.lock().unwrap().url.clone())
    }

    async fn page_html(&self) -> DriverResult<String> {
        Ok(self.state.lock().unwrap().page_html.clone())
    }
}
