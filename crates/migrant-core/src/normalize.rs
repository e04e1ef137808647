use once_cell::sync::Lazy;
use regex::Regex;

/// Installer decorations that never change which package an app is.
const NAME_SUFFIXES: &[&str] = &[
    " (x64)",
    " (64-bit)",
    " (x86)",
    " (32-bit)",
    " (64 bit)",
    " (32 bit)",
    " (Remove only)",
    " for Windows",
    " Desktop",
    " Application",
];

const STOP_WORDS: &[&str] = &["the", "for", "and", "or", "software", "application", "app"];

const MIN_KEYWORD_CHARS: usize = 3;
const BASE_NAME_WORDS: usize = 3;

static TRAILING_VERSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s+v?\d+(\.\d+)*(\s+\w+)?$").expect("trailing version pattern is valid")
});

static WORD_SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\s\-_]+").expect("word separator pattern is valid"));

pub fn normalize_app_name(raw: &str) -> String {
    let mut normalized = raw.to_string();

    for suffix in NAME_SUFFIXES {
        if ends_with_ignore_ascii_case(&normalized, suffix) {
            normalized.truncate(normalized.len() - suffix.len());
        }
    }

    let stripped = TRAILING_VERSION.replace(&normalized, "");
    stripped.trim().to_string()
}

/// First one to three words of the normalized name, space separated.
pub fn base_app_name(raw: &str) -> String {
    let normalized = normalize_app_name(raw);
    let words = split_words(&normalized);
    if words.is_empty() {
        return normalized;
    }

    words
        .into_iter()
        .take(BASE_NAME_WORDS)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn app_keywords(raw: &str) -> Vec<String> {
    let normalized = normalize_app_name(raw);
    split_words(&normalized)
        .into_iter()
        .filter(|word| word.chars().count() >= MIN_KEYWORD_CHARS)
        .filter(|word| {
            let lower = word.to_lowercase();
            !STOP_WORDS.contains(&lower.as_str())
        })
        .map(str::to_string)
        .collect()
}

fn split_words(value: &str) -> Vec<&str> {
    WORD_SEPARATORS
        .split(value)
        .filter(|word| !word.is_empty())
        .collect()
}

fn ends_with_ignore_ascii_case(value: &str, suffix: &str) -> bool {
    if value.len() < suffix.len() {
        return false;
    }
    let start = value.len() - suffix.len();
    value.is_char_boundary(start) && value[start..].eq_ignore_ascii_case(suffix)
}
