//! The closed set of browser actions an agent step can produce.

use perceiver_structural::ReducedPage;
use serde::{Deserialize, Serialize};

/// Scroll direction for scroll actions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl ScrollDirection {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

/// One browser action. Element-targeting variants carry the address of an
/// element in the [`ReducedPage`] the action was generated against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Click { address: String },
    Type { address: String, text: String },
    Select { address: String, value: String },
    Scroll { direction: ScrollDirection },
    Navigate { url: String },
    Wait { seconds: f64 },
    Done { summary: String },
    Fail { reason: String },
}

impl Action {
    /// Stable tag of the variant, matching the serialized `action` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Click { .. } => "click",
            Self::Type { .. } => "type",
            Self::Select { .. } => "select",
            Self::Scroll { .. } => "scroll",
            Self::Navigate { .. } => "navigate",
            Self::Wait { .. } => "wait",
            Self::Done { .. } => "done",
            Self::Fail { .. } => "fail",
        }
    }

    /// Address of the targeted element, if the variant targets one.
    pub fn address(&self) -> Option<&str> {
        match self {
            Self::Click { address } | Self::Type { address, .. } | Self::Select { address, .. } => {
                Some(address.as_str())
            }
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }

    /// XPath selector of the target element within `page`.
    pub fn selector(&self, page: &ReducedPage) -> Option<Selector> {
        self.address()
            .and_then(|address| page.get(address))
            .map(|element| Selector::xpath(element.xpath.clone()))
    }

    /// One-line summary used in step history.
    pub fn describe(&self, page: Option<&ReducedPage>) -> String {
        let target = |address: &str| {
            page.and_then(|p| p.get(address))
                .map(|el| format!("{} [{}]", el.label(), address))
                .unwrap_or_else(|| format!("[{address}]"))
        };
        match self {
            Self::Click { address } => format!("click {}", target(address)),
            Self::Type { address, text } => format!("type \"{}\" into {}", text, target(address)),
            Self::Select { address, value } => {
                format!("select \"{}\" in {}", value, target(address))
            }
            Self::Scroll { direction } => format!("scroll {}", direction.as_str()),
            Self::Navigate { url } => format!("navigate to {url}"),
            Self::Wait { seconds } => format!("wait {seconds}s"),
            Self::Done { summary } => format!("done: {summary}"),
            Self::Fail { reason } => format!("fail: {reason}"),
        }
    }
}

/// Executor-facing locator for an element-targeting action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selector {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

impl Selector {
    pub const XPATH: &'static str = "xpathSelector";

    pub fn xpath(value: impl Into<String>) -> Self {
        Self {
            kind: Self::XPATH.to_string(),
            value: value.into(),
        }
    }
}
