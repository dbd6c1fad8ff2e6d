//! Text rendering of reduced pages for prompts and the CLI.

use crate::model::{ElementRef, ReducedPage};

/// Render every element on its own line, indented by retained depth:
///
/// ```text
/// [0-1f2e3d]<h1 role="heading">Welcome</h1>
/// [1-9a8b7c]<form>
///   [1.0-4d5e6f]<input name="q" placeholder="Search" role="searchbox"></input>
/// ```
pub fn render_tree(page: &ReducedPage) -> String {
    if page.elements.is_empty() {
        return String::new();
    }
    let min_depth = page.elements.iter().map(|el| el.depth).min().unwrap_or(0);
    page.elements
        .iter()
        .map(|el| {
            let indent = "  ".repeat(el.depth.saturating_sub(min_depth) as usize);
            format!("{}[{}]{}", indent, el.address, render_element(el))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render one element as a compact pseudo-HTML tag.
pub fn render_element(element: &ElementRef) -> String {
    let mut parts = vec![format!("<{}", element.tag)];
    for (key, value) in &element.attributes {
        parts.push(format!(" {}=\"{}\"", key, escape_html(value)));
    }
    if let Some(role) = &element.role {
        if element.attr("role").is_none() && role != &element.tag {
            parts.push(format!(" role=\"{}\"", escape_html(role)));
        }
    }
    if !element.options.is_empty() {
        parts.push(format!(
            " options=\"{}\"",
            escape_html(&element.options.join(" | "))
        ));
    }
    parts.push(">".to_string());
    parts.push(escape_html(&element.text));
    parts.push(format!("</{}>", element.tag));
    parts.join("")
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HtmlReducer;

    #[test]
    fn renders_indented_tree() {
        let html = r#"<body><label>Email <input name="email" placeholder="you@x"></label>
            <button type="submit">Send &amp; go</button></body>"#;
        let page = HtmlReducer::new().reduce(html, 10);
        let tree = render_tree(&page);
        let lines: Vec<_> = tree.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].contains("<label>Email</label>"));
        assert!(lines[1].starts_with("  ["));
        assert!(lines[1].contains("name=\"email\""));
        assert!(lines[1].contains("role=\"textbox\""));
        assert!(lines[2].contains("Send &amp; go"));
    }

    #[test]
    fn renders_select_options() {
        let html = r#"<select><option>A</option><option>B</option></select>"#;
        let page = HtmlReducer::new().reduce(html, 10);
        assert!(render_tree(&page).contains("options=\"A | B\""));
    }

    #[test]
    fn empty_page_renders_nothing() {
        assert_eq!(render_tree(&ReducedPage::default()), "");
    }
}
