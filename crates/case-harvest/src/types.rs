//! Core data types shared by every stage of a run.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Field that carries the case identifier (the CNR number) in a record.
pub const IDENTIFIER_FIELD: &str = "CNR Number";

/// Normalised case data: field name → text value, insertion order preserved.
///
/// Inserting an existing key replaces its value in place, so the original
/// column position survives. The same type is used for the fragments that
/// individual tables contribute before they are merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaseRecord {
    fields: Vec<(String, String)>,
}

impl CaseRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a field.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((key, value)),
        }
    }

    /// Look up a field value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.iter().any(|(k, _)| k == key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Field names in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    /// Merge a fragment into this record, prefixing each key when a prefix is given.
    pub fn merge(&mut self, fragment: CaseRecord, prefix: Option<&str>) {
        for (key, value) in fragment.fields {
            match prefix {
                Some(p) => self.insert(format!("{p}{key}"), value),
                None => self.insert(key, value),
            }
        }
    }

    /// The non-empty case identifier, if the record carries one.
    pub fn identifier(&self) -> Option<&str> {
        self.get(IDENTIFIER_FIELD)
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// Make sure the identifier field is present, using `requested` when the
    /// page did not provide a usable one.
    pub fn ensure_identifier(&mut self, requested: &str) {
        if self.identifier().is_none() {
            self.insert(IDENTIFIER_FIELD, requested.trim());
        }
    }
}

impl Serialize for CaseRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CaseRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = CaseRecord::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

/// How a locator finds an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Id,
    Name,
    Css,
    #[serde(rename = "xpath")]
    XPath,
    LinkText,
    PartialLinkText,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::Id => "id",
            Strategy::Name => "name",
            Strategy::Css => "css",
            Strategy::XPath => "xpath",
            Strategy::LinkText => "link_text",
            Strategy::PartialLinkText => "partial_link_text",
        };
        f.write_str(name)
    }
}

/// One (strategy, selector) pair. Chains of these are tried in order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocatorSpec {
    pub strategy: Strategy,
    pub selector: String,
}

impl LocatorSpec {
    pub fn new(strategy: Strategy, selector: impl Into<String>) -> Self {
        Self {
            strategy,
            selector: selector.into(),
        }
    }

    pub fn id(selector: impl Into<String>) -> Self {
        Self::new(Strategy::Id, selector)
    }

    pub fn name(selector: impl Into<String>) -> Self {
        Self::new(Strategy::Name, selector)
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Self::new(Strategy::Css, selector)
    }

    pub fn xpath(selector: impl Into<String>) -> Self {
        Self::new(Strategy::XPath, selector)
    }

    pub fn link_text(selector: impl Into<String>) -> Self {
        Self::new(Strategy::LinkText, selector)
    }

    pub fn partial_link_text(selector: impl Into<String>) -> Self {
        Self::new(Strategy::PartialLinkText, selector)
    }
}

impl fmt::Display for LocatorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.strategy, self.selector)
    }
}

/// Normalisation rule applied to a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableSchema {
    /// `label | value` rows.
    Pair,
    /// `label | separator | value` rows.
    Triple,
    /// One cell whose entries are separated by line breaks.
    MultiLineGrouped,
    /// Header row followed by `act | section` rows.
    HeaderSkipPaired,
}

/// Where a document link points before URL derivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum LinkTarget {
    /// An `href` that is already an absolute or site-relative URL.
    Href(String),
    /// An inline script handler whose literal arguments encode the URL.
    Script(String),
}

/// A document link found on the results page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentLink {
    pub target: LinkTarget,
    /// Content hint for naming (e.g. the order date column).
    pub hint: Option<String>,
    /// Row (or link) index the link came from.
    pub row: usize,
}

/// A document ready for transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentRef {
    pub url: url::Url,
    pub file_name: String,
    pub row: usize,
}

/// Point-in-time copy of the browser session's cookies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCookies(BTreeMap<String, String>);

impl SessionCookies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Render as a `Cookie` request header value.
    pub fn header_value(&self) -> Option<String> {
        if self.0.is_empty() {
            return None;
        }
        Some(
            self.0
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SessionCookies {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
