//! `@name` mention parsing

use std::sync::OnceLock;

use regex::Regex;

fn mention_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"@([\w\-\x{4e00}-\x{9fff}]+)").expect("mention pattern is valid")
    })
}

/// Agent names mentioned in `message`, in first-appearance order.
///
/// Only names present in `known` are kept; repeats are dropped.
pub fn parse_mentions<S: AsRef<str>>(message: &str, known: &[S]) -> Vec<String> {
    let mut mentioned: Vec<String> = Vec::new();
    for cap in mention_regex().captures_iter(message) {
        let candidate = &cap[1];
        let is_known = known.iter().any(|k| k.as_ref() == candidate);
        if is_known && !mentioned.iter().any(|m| m == candidate) {
            mentioned.push(candidate.to_string());
        }
    }
    mentioned
}
