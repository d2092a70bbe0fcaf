//! Property tests for text cleanup and height estimation
//!
//! Inputs are assembled from chat markup fragments mixed with arbitrary text,
//! so that tokens get nested, split across lines and glued together.

use proptest::prelude::*;
use regex::Regex;

use overlay_notifier::notification::height::{estimate_height, HeightModel};
use overlay_notifier::sanitize;

fn fragment_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("<@123>".to_string()),
        Just("<@!42>".to_string()),
        Just("<@&7>".to_string()),
        Just("<#99>".to_string()),
        Just("<:wave:1234>".to_string()),
        Just("<a:dance:5>".to_string()),
        Just("**".to_string()),
        Just("*".to_string()),
        Just("`".to_string()),
        Just("```rust\n".to_string()),
        Just("[docs](https://example.com)".to_string()),
        Just("[".to_string()),
        Just("](x)".to_string()),
        Just("\r\n".to_string()),
        Just("\n\n\n".to_string()),
        Just("   ".to_string()),
        Just("\u{200B}".to_string()),
        Just("\u{FEFF}".to_string()),
        Just("<".to_string()),
        Just(">".to_string()),
        "[a-zA-Z0-9 ]{0,12}",
        "\\PC{0,6}",
        "[你好世界]{1,4}",
    ]
}

fn message_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(fragment_strategy(), 0..24).prop_map(|parts| parts.concat())
}

/// Links nested deeper than a handful of levels, optionally wrapped in other markup
fn nested_link_strategy() -> impl Strategy<Value = String> {
    (1usize..64, "[a-z]{1,6}", message_strategy()).prop_map(|(depth, text, tail)| {
        format!("{}{}{}{}", "[".repeat(depth), text, "](x)".repeat(depth), tail)
    })
}

fn leftover_markup() -> Vec<Regex> {
    [
        r"<a?:[A-Za-z0-9_~]+:\d+>",
        r"<@!?\d+>",
        r"<@&\d+>",
        r"<#\d+>",
        r"\[[^\]\n]*\]\([^)\n]*\)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
}

proptest! {
    #[test]
    fn prop_sanitize_is_idempotent(raw in message_strategy()) {
        let once = sanitize(&raw);
        prop_assert_eq!(sanitize(&once), once.clone());
    }

    #[test]
    fn prop_sanitized_text_has_no_markup(raw in message_strategy()) {
        let clean = sanitize(&raw);
        prop_assert!(!clean.contains('*'));
        prop_assert!(!clean.contains('`'));
        prop_assert!(!clean.contains('\r'));
        prop_assert!(!clean.contains('\u{200B}'), "zero-width space left in {:?}", clean);
        prop_assert!(!clean.contains('\u{FEFF}'), "BOM left in {:?}", clean);
        for re in leftover_markup() {
            prop_assert!(!re.is_match(&clean), "{} left in {:?}", re, clean);
        }
    }

    #[test]
    fn prop_nested_links_are_idempotent(raw in nested_link_strategy()) {
        let once = sanitize(&raw);
        prop_assert_eq!(sanitize(&once), once.clone());
        for re in leftover_markup() {
            prop_assert!(!re.is_match(&once), "{} left in {:?}", re, once);
        }
    }

    #[test]
    fn prop_sanitized_text_has_no_blank_lines(raw in message_strategy()) {
        let clean = sanitize(&raw);
        prop_assert!(!clean.contains("\n\n"));
        prop_assert_eq!(clean.trim(), clean.as_str());
        for line in clean.split('\n') {
            prop_assert_eq!(line.trim(), line);
        }
    }

    #[test]
    fn prop_height_within_bounds(raw in message_strategy()) {
        let model = HeightModel::default();
        let height = estimate_height(&sanitize(&raw), &model);
        prop_assert!((140..=520).contains(&height));
    }

    #[test]
    fn prop_height_monotone_in_length(text in "\\PC{0,400}", extra in "[a-z\n]") {
        let model = HeightModel::default();
        let longer = format!("{}{}", text, extra);
        prop_assert!(estimate_height(&longer, &model) >= estimate_height(&text, &model));
    }
}
