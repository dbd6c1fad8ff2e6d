//! Tag and attribute classification used while walking a document.

use scraper::node::Element;

/// Subtrees that never render visible content.
const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "head", "meta", "link", "svg", "canvas",
    "iframe", "object", "embed",
];

/// Elements that are interactive on their own.
const INTERACTIVE_TAGS: &[&str] = &[
    "a", "button", "input", "select", "textarea", "label", "summary", "details",
];

/// Tags that become interactive through handlers or styling hints.
const POTENTIALLY_INTERACTIVE_TAGS: &[&str] = &["div", "span", "li", "tr", "td", "th", "img"];

/// Attributes that make any element interactive.
const INTERACTIVE_ATTRIBUTES: &[&str] = &[
    "onclick",
    "onmousedown",
    "onmouseup",
    "ontouchstart",
    "tabindex",
    "contenteditable",
];

const INTERACTIVE_ROLES: &[&str] = &[
    "button",
    "link",
    "checkbox",
    "radio",
    "textbox",
    "combobox",
    "listbox",
    "option",
    "menuitem",
    "tab",
    "switch",
    "slider",
    "spinbutton",
    "searchbox",
    "gridcell",
    "treeitem",
];

/// Attributes copied onto retained elements.
pub(crate) const KEY_ATTRIBUTES: &[&str] = &[
    "id",
    "name",
    "type",
    "placeholder",
    "href",
    "aria-label",
    "title",
    "value",
    "alt",
];

pub(crate) fn is_skipped(tag: &str) -> bool {
    SKIPPED_TAGS.contains(&tag)
}

/// Hidden through markup alone; computed styles are out of reach for a static snapshot.
pub(crate) fn is_hidden(element: &Element) -> bool {
    if element.attr("hidden").is_some() {
        return true;
    }
    if element
        .attr("aria-hidden")
        .map(|v| v.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false)
    {
        return true;
    }
    if element.name() == "input"
        && element
            .attr("type")
            .map(|v| v.trim().eq_ignore_ascii_case("hidden"))
            .unwrap_or(false)
    {
        return true;
    }
    if let Some(style) = element.attr("style") {
        let compact: String = style
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        if compact.contains("display:none") || compact.contains("visibility:hidden") {
            return true;
        }
    }
    false
}

pub(crate) fn is_interactive(element: &Element) -> bool {
    let tag = element.name();
    // Anchors without a target are plain text containers unless handlers say otherwise.
    if INTERACTIVE_TAGS.contains(&tag) && (tag != "a" || element.attr("href").is_some()) {
        return true;
    }

    for attr in INTERACTIVE_ATTRIBUTES {
        if let Some(value) = element.attr(attr) {
            if *attr == "tabindex" && value.trim() == "-1" {
                continue;
            }
            if *attr == "contenteditable" && value.trim().eq_ignore_ascii_case("false") {
                continue;
            }
            return true;
        }
    }

    if let Some(role) = element.attr("role") {
        if INTERACTIVE_ROLES.contains(&role.trim().to_ascii_lowercase().as_str()) {
            return true;
        }
    }

    if POTENTIALLY_INTERACTIVE_TAGS.contains(&tag) {
        return element.attr("data-action").is_some()
            || element
                .attr("class")
                .map(|c| c.split_whitespace().any(|cls| cls == "btn" || cls.starts_with("btn-")))
                .unwrap_or(false);
    }

    false
}

/// Explicit role attribute, else the implicit ARIA role of common controls.
pub(crate) fn role_of(element: &Element) -> Option<String> {
    if let Some(role) = element.attr("role") {
        let role = role.trim();
        if !role.is_empty() {
            return Some(role.to_ascii_lowercase());
        }
    }
    let implicit = match element.name() {
        "a" if element.attr("href").is_some() => "link",
        "button" | "summary" => "button",
        "select" => "combobox",
        "textarea" => "textbox",
        "input" => match element
            .attr("type")
            .map(|t| t.trim().to_ascii_lowercase())
            .as_deref()
        {
            Some("checkbox") => "checkbox",
            Some("radio") => "radio",
            Some("submit") | Some("button") | Some("reset") | Some("image") => "button",
            Some("search") => "searchbox",
            Some("range") => "slider",
            Some("number") => "spinbutton",
            _ => "textbox",
        },
        "img" => "img",
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => "heading",
        _ => return None,
    };
    Some(implicit.to_string())
}

/// Collapse runs of whitespace into single spaces.
pub(crate) fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate to `max_chars` characters, marking the cut with `...`.
pub(crate) fn truncate_text(text: &str, max_chars: usize) -> String {
    let char_count = text.chars().count();
    if char_count <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}
