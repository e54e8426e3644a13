//! Currency and magnitude-suffix number parsing.

use std::sync::OnceLock;

use regex::Regex;

const CURRENCY_SYMBOLS: &[char] = &['₹', '$', '€', '£'];

fn amount_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^(-?(?:\d+(?:\.\d*)?|\.\d+))(k|m|b|cr|crores?|l|lakhs?|lacs?)?$")
            .expect("valid amount regex")
    })
}

/// Multiplier for a magnitude suffix. `Cr`/`L` follow the Indian numbering system.
pub fn suffix_multiplier(suffix: &str) -> Option<f64> {
    match suffix.to_ascii_lowercase().as_str() {
        "" => Some(1.0),
        "k" => Some(1_000.0),
        "m" => Some(1_000_000.0),
        "b" => Some(1_000_000_000.0),
        "l" | "lakh" | "lakhs" | "lac" | "lacs" => Some(100_000.0),
        "cr" | "crore" | "crores" => Some(10_000_000.0),
        _ => None,
    }
}

/// Parses amounts such as `₹1.2Cr`, `$ 3.5K`, or `1,20,000`.
///
/// Returns `None` for anything that does not reduce to a single finite number.
pub fn parse_number(raw: &str) -> Option<f64> {
    let compact = raw
        .chars()
        .filter(|character| {
            !character.is_whitespace() && *character != ',' && !CURRENCY_SYMBOLS.contains(character)
        })
        .collect::<String>();
    if compact.is_empty() {
        return None;
    }

    let captures = amount_pattern().captures(&compact)?;
    let base = captures.get(1)?.as_str().parse::<f64>().ok()?;
    let multiplier = suffix_multiplier(captures.get(2).map_or("", |suffix| suffix.as_str()))?;
    let value = base * multiplier;
    value.is_finite().then_some(value)
}
