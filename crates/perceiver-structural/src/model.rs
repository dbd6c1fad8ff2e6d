use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One addressable node of a reduced page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementRef {
    /// Deterministic identifier, unique within the owning [`ReducedPage`].
    pub address: String,
    pub tag: String,
    /// Whitespace-normalised, truncated visible text.
    pub text: String,
    /// Explicit `role` attribute or the implicit role of the tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub interactive: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    /// Option labels of a `<select>`, in document order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    /// XPath locating the element in the source snapshot.
    pub xpath: String,
    /// Nesting depth among retained elements (top level is `0`).
    pub depth: u32,
}

impl ElementRef {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Short human label used in history summaries.
    pub fn label(&self) -> String {
        let hint = if !self.text.is_empty() {
            Some(self.text.as_str())
        } else {
            self.attr("aria-label")
                .or_else(|| self.attr("placeholder"))
                .or_else(|| self.attr("name"))
                .or_else(|| self.attr("id"))
        };
        match hint {
            Some(hint) => format!("<{}> \"{}\"", self.tag, hint),
            None => format!("<{}>", self.tag),
        }
    }
}

/// Bookkeeping about how a page was reduced.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReductionDiagnostics {
    /// No usable element survived filtering.
    pub degenerate: bool,
    /// Recoverable parse errors reported by the HTML parser.
    pub parse_errors: usize,
    /// Elements that qualified before the element cap was applied.
    pub candidates: usize,
    /// Elements removed by the element cap.
    pub dropped: usize,
    /// Cap in effect for this reduction.
    pub max_elements: usize,
}

/// Bounded, addressable view of one HTML snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReducedPage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub elements: Vec<ElementRef>,
    pub diagnostics: ReductionDiagnostics,
}

impl ReducedPage {
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn is_degenerate(&self) -> bool {
        self.diagnostics.degenerate
    }

    pub fn get(&self, address: &str) -> Option<&ElementRef> {
        self.elements.iter().find(|el| el.address == address)
    }

    pub fn contains(&self, address: &str) -> bool {
        self.get(address).is_some()
    }

    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.elements.iter().map(|el| el.address.as_str())
    }

    pub fn interactive_count(&self) -> usize {
        self.elements.iter().filter(|el| el.interactive).count()
    }

    /// Keep at most `max_elements` elements, using the same priority as the
    /// reducer's own cap.
    ///
    /// The result equals reducing the source snapshot again with the smaller
    /// cap, without re-parsing it or counting another reduction.
    pub fn capped(mut self, max_elements: usize) -> Self {
        let elements = std::mem::take(&mut self.elements);
        self.elements = crate::reducer::apply_element_cap(elements, max_elements);
        self.diagnostics.dropped = self.diagnostics.candidates - self.elements.len();
        self.diagnostics.max_elements = max_elements;
        self
    }

    /// Fill in the page URL when the document itself did not declare one.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        if self.url.is_none() && !url.trim().is_empty() {
            self.url = Some(url);
        }
        self
    }
}
