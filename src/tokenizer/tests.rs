use super::*;

#[test]
fn empty_string_has_no_tokens() {
    let counter = TokenCounter::new().expect("Failed to load encoding");
    assert_eq!(counter.count(""), 0);
}

#[test]
fn counts_are_deterministic() {
    let counter = TokenCounter::new().expect("Failed to load encoding");
    let text = "the quick brown fox jumps over the lazy dog";

    let first = counter.count(text);
    let second = counter.count(text);

    assert!(first > 0);
    assert_eq!(first, second);
}

#[test]
fn longer_text_has_more_tokens() {
    let counter = TokenCounter::new().expect("Failed to load encoding");

    let short = counter.count("hello world");
    let long = counter.count("hello world hello world hello world hello world");

    assert!(long > short);
}

#[test]
fn count_all_sums_individual_counts() {
    let counter = TokenCounter::new().expect("Failed to load encoding");
    let texts = ["first sentence here.", "and a second one."];

    let total = counter.count_all(texts);
    let expected: usize = texts.iter().map(|t| counter.count(t)).sum();

    assert_eq!(total, expected);
}

#[test]
fn clones_share_the_encoding() {
    let counter = TokenCounter::new().expect("Failed to load encoding");
    let clone = counter.clone();

    assert_eq!(counter.count("shared table"), clone.count("shared table"));
}
