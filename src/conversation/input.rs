use lazy_static::lazy_static;
use regex::Regex;

/// Non-negative decimal; a comma is accepted as the decimal separator.
pub fn parse_number(text: &str) -> Option<f64> {
    lazy_static! {
        static ref NUMBER_RE: Regex = Regex::new(r"^\s*(\d{1,7}(?:[.,]\d+)?)\s*$").unwrap();
    }
    let caps = NUMBER_RE.captures(text)?;
    caps[1].replace(',', ".").parse().ok()
}

pub fn parse_whole(text: &str) -> Option<i32> {
    lazy_static! {
        static ref WHOLE_RE: Regex = Regex::new(r"^\s*(\d{1,7})\s*$").unwrap();
    }
    WHOLE_RE.captures(text)?[1].parse().ok()
}

pub fn is_skip(text: &str) -> bool {
    matches!(text.trim().to_lowercase().as_str(), "-" | "skip")
}
