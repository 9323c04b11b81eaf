//! Name normalization for best-effort deduplication.
//!
//! Models refer to the same entity in many ways ("The Mysterious Informant",
//! "mysterious informant", "Unnamed Informant"). These helpers reduce a name
//! to a comparison key; they never change the stored display name.

const ARTICLES: [&str; 3] = ["the ", "a ", "an "];

/// Comparison key for a character name.
///
/// Lowercases, trims, drops one leading article and a leading `unnamed `,
/// and collapses internal whitespace.
pub fn normalize_character_name(name: &str) -> String {
    let mut normalized = collapse(&name.to_lowercase());
    normalized = strip_article(&normalized).to_string();
    if let Some(rest) = normalized.strip_prefix("unnamed ") {
        normalized = rest.to_string();
    }
    collapse(&normalized)
}

/// Comparison key for a plot thread name.
///
/// Same as [`normalize_character_name`] without the `unnamed` rule.
pub fn normalize_thread_name(name: &str) -> String {
    let normalized = collapse(&name.to_lowercase());
    collapse(strip_article(&normalized))
}

/// Comparison key for a location name.
pub fn normalize_location_name(name: &str) -> String {
    normalize_thread_name(name)
}

fn strip_article(name: &str) -> &str {
    for article in ARTICLES {
        if let Some(rest) = name.strip_prefix(article) {
            return rest;
        }
    }
    name
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_character_names() {
        assert_eq!(normalize_character_name("The Mysterious Informant"), "mysterious informant");
        assert_eq!(normalize_character_name("Unnamed Guard Leader"), "guard leader");
        assert_eq!(normalize_character_name("  Zephyr "), "zephyr");
        assert_eq!(normalize_character_name("Sky   Captain"), "sky captain");
        assert_eq!(normalize_character_name("the unnamed stranger"), "stranger");
        assert_eq!(normalize_character_name(""), "");
    }

    #[test]
    fn test_article_must_be_a_word() {
        assert_eq!(normalize_character_name("Theo"), "theo");
        assert_eq!(normalize_character_name("Anya"), "anya");
    }

    #[test]
    fn test_thread_names() {
        assert_eq!(normalize_thread_name("The Wind Walker prophecy"), "wind walker prophecy");
        assert_eq!(normalize_thread_name("Wind Walker Prophecy"), "wind walker prophecy");
        assert_eq!(normalize_thread_name("Unnamed threat"), "unnamed threat");
    }
}
