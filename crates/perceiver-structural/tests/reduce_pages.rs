//! End-to-end reductions over realistic storefront markup.

use perceiver_structural::{render_tree, HtmlReducer};

const STOREFRONT: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>Autozone | Brakes</title>
  <link rel="canonical" href="https://autozone.test/brakes">
  <style>.hidden { display: none }</style>
</head>
<body>
  <nav>
    <a href="/">Home</a>
    <a href="/cart" aria-label="Cart">🛒</a>
    <div class="menu" hidden><a href="/admin">Admin</a></div>
  </nav>
  <main>
    <h2>Brake pads</h2>
    <p>Free shipping on orders over   $35.</p>
    <ul>
      <li><span>Ceramic pads</span> <button data-sku="1">Add to cart</button></li>
      <li><span>Semi-metallic pads</span> <button data-sku="2">Add to cart</button></li>
    </ul>
    <select name="sort"><option>Price</option><option>Rating</option></select>
    <div onclick="openChat()">Chat with us</div>
  </main>
  <script>window.analytics = {};</script>
</body>
</html>"#;

#[test]
fn storefront_reduction_keeps_visible_structure() {
    let page = HtmlReducer::new().reduce(STOREFRONT, 100);

    assert_eq!(page.title.as_deref(), Some("Autozone | Brakes"));
    assert_eq!(page.url.as_deref(), Some("https://autozone.test/brakes"));
    assert!(!page.is_degenerate());

    let texts: Vec<_> = page.elements.iter().map(|el| el.text.as_str()).collect();
    assert!(texts.contains(&"Home"));
    assert!(texts.contains(&"Free shipping on orders over $35."));
    assert!(texts.contains(&"Chat with us"));
    assert!(!texts.contains(&"Admin"));
    assert!(!texts.iter().any(|t| t.contains("analytics")));

    let buttons = page.elements.iter().filter(|el| el.tag == "button").count();
    assert_eq!(buttons, 2);
    let addresses: std::collections::HashSet<_> = page.addresses().collect();
    assert_eq!(addresses.len(), page.len());
}

#[test]
fn small_caps_keep_controls_first() {
    let reducer = HtmlReducer::new();
    let full = reducer.reduce(STOREFRONT, 100);
    let interactive = full.interactive_count();
    let capped = reducer.reduce(STOREFRONT, interactive);

    assert_eq!(capped.len(), interactive);
    assert!(capped.elements.iter().all(|el| el.interactive));
    assert_eq!(capped.diagnostics.dropped, full.len() - interactive);

    // Output order is document order.
    let positions: Vec<_> = capped
        .elements
        .iter()
        .map(|el| full.elements.iter().position(|f| f == el).unwrap())
        .collect();
    let mut sorted = positions.clone();
    sorted.sort_unstable();
    assert_eq!(positions, sorted);
}

#[test]
fn rendering_is_deterministic() {
    let reducer = HtmlReducer::new();
    let first = render_tree(&reducer.reduce(STOREFRONT, 100));
    let second = render_tree(&reducer.reduce(STOREFRONT, 100));
    assert_eq!(first, second);
    assert!(first.contains("aria-label=\"Cart\""));
}

#[test]
fn reduced_page_serializes_to_json() {
    let page = HtmlReducer::new().reduce(STOREFRONT, 5);
    let value = serde_json::to_value(&page).unwrap();
    assert_eq!(value["elements"].as_array().unwrap().len(), 5);
    assert_eq!(value["diagnostics"]["max_elements"], 5);
}
