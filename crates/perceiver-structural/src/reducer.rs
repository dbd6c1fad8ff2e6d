//! HTML snapshot reduction.
//!
//! Turns a raw HTML document into a bounded list of addressable elements that
//! can be shown to a language model and later resolved back to the page.

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use scraper::{ElementRef as HtmlElement, Html, Node};
use tracing::debug;

use crate::address::{child_path, element_address, xpath_for};
use crate::metrics;
use crate::model::{ElementRef, ReducedPage, ReductionDiagnostics};
use crate::rules::{
    is_hidden, is_interactive, is_skipped, normalize_whitespace, role_of, truncate_text,
    KEY_ATTRIBUTES,
};

/// Reduces raw HTML into a [`ReducedPage`].
///
/// Reduction is a pure function of the input HTML, the element cap and the
/// builder settings: identical inputs yield identical pages and addresses.
#[derive(Debug, Clone)]
pub struct HtmlReducer {
    /// Maximum DOM depth to traverse.
    max_depth: u32,
    /// Maximum characters of text kept per element.
    max_text_length: u32,
    /// Whether key attributes are copied onto elements.
    include_attributes: bool,
}

impl Default for HtmlReducer {
    fn default() -> Self {
        Self {
            max_depth: 50,
            max_text_length: 100,
            include_attributes: true,
        }
    }
}

impl HtmlReducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum traversal depth.
    pub fn with_max_depth(mut self, depth: u32) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set maximum text length per element.
    pub fn with_max_text_length(mut self, len: u32) -> Self {
        self.max_text_length = len.max(4);
        self
    }

    /// Set whether to include attributes.
    pub fn with_attributes(mut self, include: bool) -> Self {
        self.include_attributes = include;
        self
    }

    /// Reduce `raw_html`, keeping at most `max_elements` elements.
    ///
    /// Never fails: input without usable elements produces an empty page with
    /// `diagnostics.degenerate` set.
    pub fn reduce(&self, raw_html: &str, max_elements: usize) -> ReducedPage {
        let started = Instant::now();
        let document = Html::parse_document(raw_html);
        let root = document.root_element();

        let mut walk = Walk {
            reducer: self,
            id_counts: count_ids(root),
            candidates: Vec::new(),
        };
        let mut scope = Scope::root();
        walk.visit(root, 0, "/html[1]".to_string(), &mut scope);

        let candidates = walk.candidates;
        let candidate_count = candidates.len();
        let elements = apply_element_cap(candidates, max_elements);
        let dropped = candidate_count - elements.len();

        let page = ReducedPage {
            title: find_title(root),
            url: find_declared_url(root),
            elements,
            diagnostics: ReductionDiagnostics {
                degenerate: candidate_count == 0,
                parse_errors: document.errors.len(),
                candidates: candidate_count,
                dropped,
                max_elements,
            },
        };

        let elapsed = started.elapsed();
        metrics::record_reduction(page.len(), dropped, page.is_degenerate(), elapsed);
        debug!(
            target: "perceiver",
            html_bytes = raw_html.len(),
            candidates = candidate_count,
            retained = page.len(),
            dropped,
            degenerate = page.is_degenerate(),
            elapsed_ms = elapsed.as_millis() as u64,
            "reduced html snapshot"
        );
        page
    }
}

/// Position in the retained tree while walking the DOM.
struct Scope {
    path: String,
    next_ordinal: usize,
    depth: u32,
    inside_interactive: bool,
}

impl Scope {
    fn root() -> Self {
        Self {
            path: String::new(),
            next_ordinal: 0,
            depth: 0,
            inside_interactive: false,
        }
    }
}

struct Walk<'r> {
    reducer: &'r HtmlReducer,
    id_counts: HashMap<String, usize>,
    candidates: Vec<ElementRef>,
}

impl<'r> Walk<'r> {
    fn visit(&mut self, element: HtmlElement<'_>, dom_depth: u32, xpath: String, scope: &mut Scope) {
        if dom_depth > self.reducer.max_depth {
            return;
        }
        let value = element.value();
        let tag = value.name();
        if is_skipped(tag) || is_hidden(value) || tag == "option" || tag == "optgroup" {
            return;
        }

        let interactive = is_interactive(value);
        let raw_text = if interactive {
            self.control_text(element)
        } else {
            direct_text(element)
        };
        let text = truncate_text(
            &normalize_whitespace(&raw_text),
            self.reducer.max_text_length as usize,
        );

        let retained = interactive || (!scope.inside_interactive && !text.is_empty());
        if !retained {
            self.visit_children(element, dom_depth, &xpath, scope);
            return;
        }

        let path = child_path(&scope.path, scope.next_ordinal);
        scope.next_ordinal += 1;

        let attributes = self.key_attributes(element);
        let options = if tag == "select" {
            self.select_options(element)
        } else {
            Vec::new()
        };
        let unique_id = value
            .id()
            .map(|id| self.id_counts.get(id).copied() == Some(1))
            .unwrap_or(false);

        self.candidates.push(ElementRef {
            address: element_address(&path, tag, &text, &attributes),
            tag: tag.to_string(),
            text,
            role: role_of(value),
            interactive,
            attributes,
            options,
            xpath: xpath_for(&xpath, value.id(), unique_id),
            depth: scope.depth,
        });

        if tag == "select" {
            return;
        }

        let mut inner = Scope {
            path,
            next_ordinal: 0,
            depth: scope.depth + 1,
            inside_interactive: scope.inside_interactive || interactive,
        };
        self.visit_children(element, dom_depth, &xpath, &mut inner);
    }

    fn visit_children(
        &mut self,
        element: HtmlElement<'_>,
        dom_depth: u32,
        xpath: &str,
        scope: &mut Scope,
    ) {
        let mut seen: HashMap<String, usize> = HashMap::new();
        for child in element.children() {
            if let Some(child) = HtmlElement::wrap(child) {
                let name = child.value().name();
                let position = seen.entry(name.to_string()).or_insert(0);
                *position += 1;
                let child_xpath = format!("{xpath}/{name}[{position}]");
                self.visit(child, dom_depth + 1, child_xpath, scope);
            }
        }
    }

    /// Visible text of a control, including its descendants.
    fn control_text(&self, element: HtmlElement<'_>) -> String {
        match element.value().name() {
            "input" => String::new(),
            "select" => selected_option(element).unwrap_or_default(),
            "img" => element.value().attr("alt").unwrap_or_default().to_string(),
            _ => {
                let mut out = String::new();
                self.collect_text(element, 0, &mut out);
                out
            }
        }
    }

    fn collect_text(&self, element: HtmlElement<'_>, depth: u32, out: &mut String) {
        if depth > self.reducer.max_depth {
            return;
        }
        for child in element.children() {
            match child.value() {
                Node::Text(text) => {
                    out.push(' ');
                    out.push_str(text);
                }
                Node::Element(inner) => {
                    if is_skipped(inner.name()) || is_hidden(inner) {
                        continue;
                    }
                    if let Some(inner) = HtmlElement::wrap(child) {
                        self.collect_text(inner, depth + 1, out);
                    }
                }
                _ => {}
            }
        }
    }

    fn key_attributes(&self, element: HtmlElement<'_>) -> BTreeMap<String, String> {
        let mut attributes = BTreeMap::new();
        if !self.reducer.include_attributes {
            return attributes;
        }
        let value = element.value();
        for key in KEY_ATTRIBUTES {
            if let Some(raw) = value.attr(key) {
                let cleaned = truncate_text(
                    &normalize_whitespace(raw),
                    self.reducer.max_text_length as usize,
                );
                if !cleaned.is_empty() {
                    attributes.insert((*key).to_string(), cleaned);
                }
            }
        }
        attributes
    }

    fn select_options(&self, element: HtmlElement<'_>) -> Vec<String> {
        element
            .descendants()
            .filter_map(HtmlElement::wrap)
            .filter(|el| el.value().name() == "option" && !is_hidden(el.value()))
            .map(|el| {
                let label = normalize_whitespace(&el.text().collect::<String>());
                truncate_text(&label, self.reducer.max_text_length as usize)
            })
            .filter(|label| !label.is_empty())
            .collect()
    }
}

/// Text nodes that are direct children of `element`.
fn direct_text(element: HtmlElement<'_>) -> String {
    if element.value().name() == "img" {
        return element.value().attr("alt").unwrap_or_default().to_string();
    }
    let mut out = String::new();
    for child in element.children() {
        if let Node::Text(text) = child.value() {
            out.push(' ');
            out.push_str(text);
        }
    }
    out
}

fn selected_option(select: HtmlElement<'_>) -> Option<String> {
    let options: Vec<_> = select
        .descendants()
        .filter_map(HtmlElement::wrap)
        .filter(|el| el.value().name() == "option")
        .collect();
    options
        .iter()
        .find(|el| el.value().attr("selected").is_some())
        .or_else(|| options.first())
        .map(|el| el.text().collect::<String>())
}

fn count_ids(root: HtmlElement<'_>) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for element in root.descendants().filter_map(HtmlElement::wrap) {
        if let Some(id) = element.value().id() {
            *counts.entry(id.to_string()).or_insert(0) += 1;
        }
    }
    counts
}

fn find_title(root: HtmlElement<'_>) -> Option<String> {
    root.descendants()
        .filter_map(HtmlElement::wrap)
        .find(|el| el.value().name() == "title")
        .map(|el| normalize_whitespace(&el.text().collect::<String>()))
        .filter(|title| !title.is_empty())
}

fn find_declared_url(root: HtmlElement<'_>) -> Option<String> {
    let mut base = None;
    let mut og_url = None;
    for element in root.descendants().filter_map(HtmlElement::wrap) {
        let value = element.value();
        match value.name() {
            "link" => {
                let canonical = value
                    .attr("rel")
                    .map(|rel| {
                        rel.split_whitespace()
                            .any(|r| r.eq_ignore_ascii_case("canonical"))
                    })
                    .unwrap_or(false);
                if canonical {
                    if let Some(href) = non_empty(value.attr("href")) {
                        return Some(href);
                    }
                }
            }
            "base" if base.is_none() => base = non_empty(value.attr("href")),
            "meta" if og_url.is_none() => {
                if value.attr("property") == Some("og:url") {
                    og_url = non_empty(value.attr("content"));
                }
            }
            _ => {}
        }
    }
    base.or(og_url)
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Keep interactive elements first, then text-bearing ones, ties broken by
/// document order. Output stays in document order.
pub(crate) fn apply_element_cap(candidates: Vec<ElementRef>, max_elements: usize) -> Vec<ElementRef> {
    if candidates.len() <= max_elements {
        return candidates;
    }
    let mut ranked: Vec<usize> = (0..candidates.len()).collect();
    ranked.sort_by_key(|&idx| (!candidates[idx].interactive, idx));
    let mut keep = vec![false; candidates.len()];
    for &idx in ranked.iter().take(max_elements) {
        keep[idx] = true;
    }
    candidates
        .into_iter()
        .zip(keep)
        .filter_map(|(element, keep)| keep.then_some(element))
        .collect()
}
