use std::collections::HashSet;

use wikiharvest::storage::naming::{sanitize_filename, sanitize_title, unique_name};
use wikiharvest::UrlKind;

const FORBIDDEN: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

#[test]
fn sanitized_titles_are_always_safe() {
    let titles = [
        "Singapore",
        "AC/DC",
        "What? Where: When*",
        "C:\\Windows\\System32",
        "  .hidden name.  ",
        "con",
        "LPT7",
        "新加坡歷史",
        "Ĺơŉĝ title with diacritics and ☃ snowman",
        "a|b<c>d\"e",
        &"long ".repeat(100),
    ];
    for title in titles {
        let name = sanitize_title(title, UrlKind::Article, 200)
            .unwrap_or_else(|err| panic!("{title:?} should sanitize: {err}"));
        assert!(
            !name.contains(|c: char| FORBIDDEN.contains(&c) || (c as u32) < 32),
            "{name:?} contains forbidden characters"
        );
        assert!(name.chars().count() <= 200, "{name:?} exceeds 200 code points");
        assert!(name.ends_with(".json"), "{name:?} must end with .json");
        assert!(
            !name.starts_with('.') && !name.starts_with(' '),
            "{name:?} starts with dot or space"
        );
        let stem = name.rsplit_once('.').map(|(s, _)| s).unwrap_or(&name);
        assert!(
            !stem.ends_with('.') && !stem.ends_with(' '),
            "{name:?} stem ends with dot or space"
        );
    }
}

#[test]
fn reserved_device_names_are_defused() {
    for reserved in ["CON", "prn", "Aux", "NUL", "COM1", "lpt9"] {
        let name = sanitize_filename(reserved, 200).unwrap();
        let stem = name.rsplit_once('.').map(|(s, _)| s).unwrap_or(&name);
        assert!(
            !stem.eq_ignore_ascii_case(reserved),
            "{reserved} must not survive as a bare stem (got {name:?})"
        );
    }
}

#[test]
fn category_titles_get_the_category_prefix() {
    let name = sanitize_title("Category:Singapore history", UrlKind::Category, 200).unwrap();
    assert_eq!(name, "category_Singapore history.json");

    let article = sanitize_title("Singapore history", UrlKind::Article, 200).unwrap();
    assert_eq!(article, "Singapore history.json");
}

#[test]
fn empty_titles_are_rejected() {
    assert!(sanitize_title("   ", UrlKind::Article, 200).is_err());
    assert!(sanitize_filename("...", 200).is_err());
}

#[test]
fn unique_name_counts_up_and_eventually_fails() {
    let mut existing = HashSet::new();
    assert_eq!(unique_name("a.json", &existing).unwrap(), "a.json");

    existing.insert("a.json".to_string());
    assert_eq!(unique_name("a.json", &existing).unwrap(), "a_1.json");

    existing.insert("a_1.json".to_string());
    existing.insert("a_2.json".to_string());
    assert_eq!(unique_name("a.json", &existing).unwrap(), "a_3.json");

    // Saturate the counter space and make sure it fails loudly.
    let mut crowded: HashSet<String> = HashSet::new();
    crowded.insert("b.json".to_string());
    for counter in 1..=10_000 {
        crowded.insert(format!("b_{counter}.json"));
    }
    assert!(unique_name("b.json", &crowded).is_err());
}
