//! Title normalisation and edit-distance similarity.

use chrono::Datelike;
use once_cell::sync::Lazy;
use regex_lite::Regex;

/// A release year in parentheses, anywhere in the title.
static PAREN_YEAR_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(\s*(?:19|20)\d{2}\s*\)").expect("valid year regex"));

/// A bare year ending a title that has something before it.
static TRAILING_YEAR_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*\S)\s+((?:19|20)\d{2})\s*$").expect("valid year regex"));

const ARTICLES: &[&str] = &["the", "a", "an"];

/// Normalise a title for comparison.
///
/// Lower-cases, removes a parenthesised year anywhere and a bare trailing year
/// no later than next year, keeps only letters, digits and whitespace, drops the
/// articles "the", "a" and "an", and collapses whitespace. Titles that are only
/// a number ("1917") or end in a future year ("Blade Runner 2049") keep it.
pub fn normalize_title(title: &str) -> String {
    let lower = title.to_lowercase();
    let without_parens = PAREN_YEAR_REGEX.replace_all(&lower, " ");

    let latest_year = chrono::Utc::now().year() + 1;
    let without_years = match TRAILING_YEAR_REGEX.captures(&without_parens) {
        Some(caps) if caps[2].parse::<i32>().is_ok_and(|y| y <= latest_year) => caps[1].to_string(),
        _ => without_parens.to_string(),
    };

    let cleaned: String = without_years
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();

    cleaned
        .split_whitespace()
        .filter(|word| !ARTICLES.contains(word))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Similarity in `[0, 1]`: `1 - distance / longer length`, measured in chars.
///
/// Equal strings are 1.0 (including two empty strings); one empty string is 0.0.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let max_len = a.chars().count().max(b.chars().count());
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

/// Levenshtein distance over chars, single-row dynamic programming.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let above = row[j + 1];
            let cost = usize::from(ca != cb);
            row[j + 1] = (above + 1).min(row[j] + 1).min(diagonal + cost);
            diagonal = above;
        }
    }
    row[b.len()]
}
