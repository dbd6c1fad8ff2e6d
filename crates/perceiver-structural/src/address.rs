use std::collections::BTreeMap;

use blake3::Hasher;

/// Hex characters of the content digest kept in an address.
const DIGEST_LEN: usize = 6;

/// Build the address of a retained element from its position in the retained
/// tree and a digest of its content.
pub(crate) fn element_address(
    path: &str,
    tag: &str,
    text: &str,
    attributes: &BTreeMap<String, String>,
) -> String {
    let mut hasher = Hasher::new();
    hasher.update(tag.as_bytes());
    hasher.update(&[0]);
    hasher.update(text.as_bytes());
    for (key, value) in attributes {
        hasher.update(&[0]);
        hasher.update(key.as_bytes());
        hasher.update(&[b'=']);
        hasher.update(value.as_bytes());
    }
    let digest = hasher.finalize().to_hex();
    format!("{}-{}", path, &digest.as_str()[..DIGEST_LEN])
}

/// Append the next ordinal to a retained-tree path.
pub(crate) fn child_path(parent: &str, ordinal: usize) -> String {
    if parent.is_empty() {
        ordinal.to_string()
    } else {
        format!("{parent}.{ordinal}")
    }
}

/// Prefer an id lookup when the id is unique and quotable, else a positional path.
pub(crate) fn xpath_for(positional: &str, id: Option<&str>, unique_id: bool) -> String {
    match id {
        Some(id) if unique_id && !id.is_empty() && !id.contains('\'') => {
            format!("//*[@id='{id}']")
        }
        _ => positional.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_is_stable_and_content_sensitive() {
        let mut attrs = BTreeMap::new();
        attrs.insert("id".to_string(), "login".to_string());
        let first = element_address("0.1", "button", "Log in", &attrs);
        let second = element_address("0.1", "button", "Log in", &attrs);
        assert_eq!(first, second);
        assert!(first.starts_with("0.1-"));
        assert_eq!(first.len(), "0.1-".len() + DIGEST_LEN);

        let other = element_address("0.1", "button", "Sign up", &attrs);
        assert_ne!(first, other);
    }

    #[test]
    fn paths_and_xpaths() {
        assert_eq!(child_path("", 3), "3");
        assert_eq!(child_path("0.2", 1), "0.2.1");
        assert_eq!(
            xpath_for("/html[1]/body[1]/form[1]", Some("f"), true),
            "//*[@id='f']"
        );
        assert_eq!(
            xpath_for("/html[1]/body[1]/form[1]", Some("f"), false),
            "/html[1]/body[1]/form[1]"
        );
        assert_eq!(
            xpath_for("/html[1]/body[1]/p[2]", Some("it's"), true),
            "/html[1]/body[1]/p[2]"
        );
    }
}
