//! Portal profiles: everything that differs between portal variants.
//!
//! A profile is pure data. The pipeline reads locator chains, table
//! sections, overlays, document rules and the persisted schema from it, so a
//! markup change on a portal is a profile edit rather than a code change.
//! Three profiles are built in; a JSON file can replace any of them.

use crate::error::{HarvestError, Result};
use crate::sink::PersistSchema;
use crate::types::{LocatorSpec, TableSchema};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

const ECOURTS_HOME: &str = "https://ecourts.gov.in/ecourts_home/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortalKind {
    District,
    High,
    Supreme,
}

impl PortalKind {
    pub const ALL: [PortalKind; 3] = [PortalKind::District, PortalKind::High, PortalKind::Supreme];
}

impl fmt::Display for PortalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PortalKind::District => "district",
            PortalKind::High => "high",
            PortalKind::Supreme => "supreme",
        })
    }
}

impl FromStr for PortalKind {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "district" | "district-court" | "dc" => Ok(PortalKind::District),
            "high" | "high-court" | "hc" => Ok(PortalKind::High),
            "supreme" | "supreme-court" | "sc" => Ok(PortalKind::Supreme),
            other => Err(HarvestError::Config(format!(
                "unknown court '{other}' (expected district, high or supreme)"
            ))),
        }
    }
}

/// A result table and how to normalise it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionSpec {
    pub name: String,
    pub locator: Vec<LocatorSpec>,
    pub schema: TableSchema,
    /// Key family for grouped/paired schemas.
    #[serde(default)]
    pub group: String,
    /// Prefix applied when the fragment is merged into the record.
    #[serde(default)]
    pub prefix: Option<String>,
}

/// Heading lines that form the record's `Title` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TitleSpec {
    pub container: Vec<LocatorSpec>,
    /// Tag names read in order, e.g. `h3`, `h4`.
    pub headings: Vec<String>,
}

/// How an overlay is torn down.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseSpec {
    /// Labelled close control, clicked natively.
    pub control: Vec<LocatorSpec>,
    /// CSS selector for the same control, clicked by script.
    pub control_css: String,
    /// CSS selector of a shown overlay.
    pub overlay_css: String,
    pub backdrop_css: String,
}

impl Default for CloseSpec {
    fn default() -> Self {
        Self {
            control: vec![
                LocatorSpec::css("button.btn-close[data-bs-dismiss='modal']"),
                LocatorSpec::css(".modal-header .close"),
            ],
            control_css: "button.btn-close[data-bs-dismiss=\"modal\"], .modal-header .close"
                .to_string(),
            overlay_css: ".modal.show".to_string(),
            backdrop_css: ".modal-backdrop".to_string(),
        }
    }
}

/// Fields that only appear inside an overlay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModalSpec {
    pub name: String,
    pub trigger: Vec<LocatorSpec>,
    /// The overlay's content container; its first table is extracted.
    pub container: Vec<LocatorSpec>,
    pub schema: TableSchema,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub close: CloseSpec,
}

/// Order table whose rows carry script-encoded document links.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderTableSpec {
    pub table_css: String,
    /// Function name that marks a document handler, e.g. `displayPdf`.
    pub script_marker: String,
    /// Base the handler's literal argument is appended to.
    pub base_url: String,
    /// Cell holding the date used to name the file.
    pub date_cell: usize,
    /// Cell holding the anchor.
    pub link_cell: usize,
}

/// A control that must be clicked before links become visible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevealStep {
    pub name: String,
    pub control: Vec<LocatorSpec>,
    #[serde(default)]
    pub wait_for: Vec<LocatorSpec>,
}

/// Where documents are found on the results page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSpec {
    /// Anchors considered for direct links.
    pub anchor_css: String,
    /// Substrings of `href` that mark a document.
    pub href_patterns: Vec<String>,
    #[serde(default)]
    pub order_table: Option<OrderTableSpec>,
    #[serde(default)]
    pub reveal: Vec<RevealStep>,
}

/// Business-history overlay written to `history/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistorySpec {
    /// Triggers; the last match is used.
    pub trigger: LocatorSpec,
    /// Function name in the trigger's handler.
    pub marker: String,
    /// Position of the date among the handler's arguments.
    pub date_arg_index: usize,
    pub container: Vec<LocatorSpec>,
    pub header_text: String,
    pub table_css: String,
    #[serde(default)]
    pub close: CloseSpec,
}

/// Complete description of one portal variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalProfile {
    pub kind: PortalKind,
    pub name: String,
    pub home_url: String,
    /// Service link on the home page; empty when the home page is the form.
    #[serde(default)]
    pub entry_link: Vec<LocatorSpec>,
    pub cnr_input: Vec<LocatorSpec>,
    /// CAPTCHA image; empty means a viewport screenshot is sent instead.
    #[serde(default)]
    pub captcha_image: Vec<LocatorSpec>,
    pub captcha_input: Vec<LocatorSpec>,
    pub search_button: Vec<LocatorSpec>,
    /// Script run when no search-button strategy matches.
    #[serde(default)]
    pub search_script: Option<String>,
    /// Result link clicked after searching (e.g. "View").
    #[serde(default)]
    pub result_link: Vec<LocatorSpec>,
    /// Element whose presence means the results are loaded.
    #[serde(default)]
    pub results_ready: Vec<LocatorSpec>,
    #[serde(default)]
    pub title: Option<TitleSpec>,
    pub sections: Vec<SectionSpec>,
    #[serde(default)]
    pub modals: Vec<ModalSpec>,
    pub documents: DocumentSpec,
    #[serde(default)]
    pub history: Option<HistorySpec>,
    pub persist: PersistSchema,
}

fn entry_chain(host: &str, title: &str, partial: &str) -> Vec<LocatorSpec> {
    vec![
        LocatorSpec::css(format!("a[href=\"https://{host}/\"][title=\"{title}\"]")),
        LocatorSpec::css(format!("a[href=\"https://{host}/\"]")),
        LocatorSpec::css(format!("a[title=\"{title}\"]")),
        LocatorSpec::link_text(title),
        LocatorSpec::partial_link_text(partial),
        LocatorSpec::xpath(format!("//a[contains(text(), '{title}')]")),
        LocatorSpec::css("a.btn.btn-default[tabindex='0']"),
    ]
}

fn ecourts_cnr_input() -> Vec<LocatorSpec> {
    vec![
        LocatorSpec::id("cino"),
        LocatorSpec::name("cino"),
        LocatorSpec::css("input[placeholder='Enter 16 digit CNR number']"),
    ]
}

fn ecourts_captcha_input() -> Vec<LocatorSpec> {
    vec![
        LocatorSpec::id("fcaptcha_code"),
        LocatorSpec::name("fcaptcha_code"),
        LocatorSpec::css("input.form-control.w-125"),
        LocatorSpec::css("input[placeholder='Enter Captcha']"),
        LocatorSpec::xpath("//input[@type='text' and @maxlength='6']"),
    ]
}

fn ecourts_search_button() -> Vec<LocatorSpec> {
    vec![
        LocatorSpec::id("searchbtn"),
        LocatorSpec::css("button[type='button'][onclick='funViewCinoHistory();']"),
        LocatorSpec::xpath("//button[contains(text(), 'Search')]"),
        LocatorSpec::css("button.btn.btn-primary"),
    ]
}

fn pair_section(name: &str, css: &str, prefix: Option<&str>) -> SectionSpec {
    SectionSpec {
        name: name.to_string(),
        locator: vec![LocatorSpec::css(css)],
        schema: TableSchema::Pair,
        group: String::new(),
        prefix: prefix.map(str::to_string),
    }
}

fn pdf_anchors() -> DocumentSpec {
    DocumentSpec {
        anchor_css: "a[href]".to_string(),
        href_patterns: vec!["display_pdf".to_string(), ".pdf".to_string()],
        order_table: None,
        reveal: Vec::new(),
    }
}

impl PortalProfile {
    /// The built-in profile for a portal kind.
    pub fn builtin(kind: PortalKind) -> Self {
        match kind {
            PortalKind::District => Self::district(),
            PortalKind::High => Self::high(),
            PortalKind::Supreme => Self::supreme(),
        }
    }

    pub fn builtins() -> Vec<Self> {
        PortalKind::ALL.into_iter().map(Self::builtin).collect()
    }

    fn district() -> Self {
        let mut documents = pdf_anchors();
        documents.order_table = Some(OrderTableSpec {
            table_css: "table.order_table.table".to_string(),
            script_marker: "displayPdf".to_string(),
            base_url: "https://services.ecourts.gov.in/ecourtindia_v6/".to_string(),
            date_cell: 1,
            link_cell: 2,
        });

        Self {
            kind: PortalKind::District,
            name: "District Court Services".to_string(),
            home_url: ECOURTS_HOME.to_string(),
            entry_link: entry_chain(
                "services.ecourts.gov.in",
                "District Court Services",
                "District Court",
            ),
            cnr_input: ecourts_cnr_input(),
            captcha_image: vec![
                LocatorSpec::id("captcha_image"),
                LocatorSpec::css("img#captcha_image"),
            ],
            captcha_input: ecourts_captcha_input(),
            search_button: ecourts_search_button(),
            search_script: Some("funViewCinoHistory();".to_string()),
            result_link: Vec::new(),
            results_ready: vec![LocatorSpec::css("table.case_details_table")],
            title: None,
            sections: vec![
                pair_section("case_details", "table.case_details_table", None),
                pair_section("case_status", "table.case_status_table", Some("Status_")),
                SectionSpec {
                    name: "petitioner_advocate".to_string(),
                    locator: vec![LocatorSpec::css("table.Petitioner_Advocate_table")],
                    schema: TableSchema::MultiLineGrouped,
                    group: "Petitioner_Advocate".to_string(),
                    prefix: None,
                },
                SectionSpec {
                    name: "respondent_advocate".to_string(),
                    locator: vec![LocatorSpec::css("table.Respondent_Advocate_table")],
                    schema: TableSchema::MultiLineGrouped,
                    group: "Respondent_Advocate".to_string(),
                    prefix: None,
                },
                SectionSpec {
                    name: "acts".to_string(),
                    locator: vec![LocatorSpec::css("table.acts_table")],
                    schema: TableSchema::HeaderSkipPaired,
                    group: "Acts".to_string(),
                    prefix: None,
                },
            ],
            modals: vec![ModalSpec {
                name: "acknowledgement".to_string(),
                trigger: vec![
                    LocatorSpec::xpath("//a[contains(@onclick, 'display_case_acknowledgement')]"),
                    LocatorSpec::partial_link_text("View CNR Code"),
                ],
                container: vec![LocatorSpec::id("modal_ack_body")],
                schema: TableSchema::Triple,
                prefix: "Modal_".to_string(),
                close: CloseSpec::default(),
            }],
            documents,
            history: Some(HistorySpec {
                trigger: LocatorSpec::css("a[onclick*='viewBusiness']"),
                marker: "viewBusiness".to_string(),
                date_arg_index: 6,
                container: vec![LocatorSpec::id("caseBusinessDiv_cnr")],
                header_text: "Daily Status".to_string(),
                table_css: "table[width='87%']".to_string(),
                close: CloseSpec::default(),
            }),
            persist: PersistSchema::ecourts("ecourts_district_courts"),
        }
    }

    fn high() -> Self {
        Self {
            kind: PortalKind::High,
            name: "High Court Services".to_string(),
            home_url: ECOURTS_HOME.to_string(),
            entry_link: entry_chain("hcservices.ecourts.gov.in", "High courts Services", "High courts"),
            cnr_input: ecourts_cnr_input(),
            captcha_image: vec![LocatorSpec::id("captcha_image")],
            captcha_input: ecourts_captcha_input(),
            search_button: ecourts_search_button(),
            search_script: Some("funViewCinoHistory();".to_string()),
            result_link: Vec::new(),
            results_ready: vec![LocatorSpec::css("table.case_details_table")],
            title: None,
            sections: vec![
                pair_section("case_details", "table.case_details_table", None),
                pair_section("case_status", "table.case_status_table", Some("Status_")),
            ],
            modals: Vec::new(),
            documents: pdf_anchors(),
            history: None,
            persist: PersistSchema::ecourts("ecourts_high_courts"),
        }
    }

    fn supreme() -> Self {
        let orders_table = "//table[contains(@class, 'judgement_orders')]";
        Self {
            kind: PortalKind::Supreme,
            name: "Supreme Court of India".to_string(),
            home_url: "https://www.sci.gov.in/case-status-cnr-number/".to_string(),
            entry_link: Vec::new(),
            cnr_input: vec![LocatorSpec::id("cnr_no"), LocatorSpec::name("cnr_no")],
            captcha_image: vec![LocatorSpec::id("siwp_captcha_image_0")],
            captcha_input: vec![
                LocatorSpec::id("siwp_captcha_value_0"),
                LocatorSpec::name("siwp_captcha_value"),
            ],
            search_button: vec![
                LocatorSpec::xpath("//input[@type='submit' and @value='Search']"),
                LocatorSpec::css("input[type='submit']"),
            ],
            search_script: None,
            result_link: vec![LocatorSpec::link_text("View")],
            results_ready: vec![LocatorSpec::id("cnrResultsDetails")],
            title: Some(TitleSpec {
                container: vec![LocatorSpec::id("cnrResultsDetails")],
                headings: vec!["h3".to_string(), "h4".to_string()],
            }),
            sections: vec![pair_section(
                "case_details",
                "tbody[data-fetched='true']",
                None,
            )],
            modals: Vec::new(),
            documents: DocumentSpec {
                anchor_css: "table.judgement_orders tbody:not(.hide) a[href]".to_string(),
                href_patterns: vec![".pdf".to_string()],
                order_table: None,
                reveal: vec![RevealStep {
                    name: "judgement_orders".to_string(),
                    control: vec![LocatorSpec::xpath(format!(
                        "{orders_table}//button[contains(text(), 'Judgement/Orders')]"
                    ))],
                    wait_for: vec![LocatorSpec::xpath(format!(
                        "{orders_table}//tbody[not(contains(@class, 'hide'))]"
                    ))],
                }],
            },
            history: None,
            persist: PersistSchema::supreme_court(),
        }
    }

    /// Load profiles from a JSON file holding one profile or an array.
    pub fn load_file(path: &Path) -> Result<Vec<Self>> {
        let raw = std::fs::read_to_string(path)?;
        let value: serde_json::Value = serde_json::from_str(&raw)?;
        let profiles = if value.is_array() {
            serde_json::from_value(value)?
        } else {
            vec![serde_json::from_value(value)?]
        };
        Ok(profiles)
    }

    /// The profile for `kind`: an override when one is given, else the built-in.
    pub fn select(kind: PortalKind, overrides: &[PortalProfile]) -> Self {
        overrides
            .iter()
            .find(|p| p.kind == kind)
            .cloned()
            .unwrap_or_else(|| Self::builtin(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("High".parse::<PortalKind>().unwrap(), PortalKind::High);
        assert_eq!("sc".parse::<PortalKind>().unwrap(), PortalKind::Supreme);
        assert!("county".parse::<PortalKind>().is_err());
    }

    #[test]
    fn test_locator_chains_rank_exact_matches_first() {
        let p = PortalProfile::builtin(PortalKind::District);
        assert_eq!(p.cnr_input[0], LocatorSpec::id("cino"));
        assert_eq!(p.captcha_input.len(), 5);
        assert_eq!(p.entry_link.len(), 7);
        assert_eq!(p.search_button[0], LocatorSpec::id("searchbtn"));
    }

    #[test]
    fn test_builtins_round_trip_through_json() {
        let json = serde_json::to_string(&PortalProfile::builtins()).unwrap();
        let back: Vec<PortalProfile> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.len(), 3);
        assert_eq!(back[2].persist.table, "ecourts_supreme_courts");
    }

    #[test]
    fn test_override_file_replaces_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.json");
        let mut custom = PortalProfile::builtin(PortalKind::High);
        custom.home_url = "http://localhost:9999/".to_string();
        std::fs::write(&path, serde_json::to_string(&custom).unwrap()).unwrap();

        let overrides = PortalProfile::load_file(&path).unwrap();
        let high = PortalProfile::select(PortalKind::High, &overrides);
        assert_eq!(high.home_url, "http://localhost:9999/");
        let supreme = PortalProfile::select(PortalKind::Supreme, &overrides);
        assert!(supreme.home_url.contains("sci.gov.in"));
    }
}
