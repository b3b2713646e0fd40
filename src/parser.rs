// 🔢 Field Parsers - magnitude strings and numeric coercion
// Malformed fields degrade to zero and are counted, never raised

use serde::{Deserialize, Serialize};

// ============================================================================
// MAGNITUDE SUFFIXES
// ============================================================================

/// Recognised suffixes (case-insensitive) and their multipliers
pub const MAGNITUDE_SUFFIXES: [(char, f64); 3] = [
    ('K', 1_000.0),
    ('M', 1_000_000.0),
    ('B', 1_000_000_000.0),
];

/// Multiplier for a suffix character, if it is one
pub fn multiplier(suffix: char) -> Option<f64> {
    let upper = suffix.to_ascii_uppercase();
    MAGNITUDE_SUFFIXES
        .iter()
        .find(|(c, _)| *c == upper)
        .map(|(_, m)| *m)
}

// ============================================================================
// RAW INPUT
// ============================================================================

/// A raw loss field as it arrives from a source: text, an already numeric
/// cell, or nothing at all.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawMagnitude<'a> {
    Empty,
    Text(&'a str),
    Number(f64),
}

impl<'a> From<&'a str> for RawMagnitude<'a> {
    fn from(s: &'a str) -> Self {
        RawMagnitude::Text(s)
    }
}

impl<'a> From<Option<&'a str>> for RawMagnitude<'a> {
    fn from(s: Option<&'a str>) -> Self {
        s.map_or(RawMagnitude::Empty, RawMagnitude::Text)
    }
}

impl From<f64> for RawMagnitude<'_> {
    fn from(v: f64) -> Self {
        RawMagnitude::Number(v)
    }
}

/// Strict parse: `None` means malformed, empty and "0" are a real zero.
pub fn try_parse_magnitude<'a>(raw: impl Into<RawMagnitude<'a>>) -> Option<f64> {
    let text = match raw.into() {
        RawMagnitude::Empty => return Some(0.0),
        RawMagnitude::Number(v) if v.is_finite() => return Some(v),
        RawMagnitude::Number(_) => return None,
        RawMagnitude::Text(s) => s.trim(),
    };

    if text.is_empty() || text == "0" {
        return Some(0.0);
    }

    let last = text.chars().last()?;
    let value = match multiplier(last) {
        Some(m) => text[..text.len() - last.len_utf8()]
            .trim()
            .parse::<f64>()
            .ok()
            .map(|n| n * m),
        None => text.parse::<f64>().ok(),
    };

    value.filter(|v| v.is_finite())
}

/// Lenient parse: anything malformed becomes `0.0`.
///
/// ```
/// use disaster_panel::parser::parse_magnitude;
/// assert_eq!(parse_magnitude("2.5M"), 2_500_000.0);
/// assert_eq!(parse_magnitude("garbage"), 0.0);
/// ```
pub fn parse_magnitude<'a>(raw: impl Into<RawMagnitude<'a>>) -> f64 {
    try_parse_magnitude(raw).unwrap_or(0.0)
}

/// Strict non-negative integer count. Empty is zero; decimals with no
/// fractional part ("3.0") are accepted.
pub fn try_parse_count(raw: Option<&str>) -> Option<u32> {
    let text = match raw.map(str::trim) {
        None | Some("") => return Some(0),
        Some(t) => t,
    };
    if let Ok(n) = text.parse::<u32>() {
        return Some(n);
    }
    let f = text.parse::<f64>().ok()?;
    if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u32::MAX as f64 {
        Some(f as u32)
    } else {
        None
    }
}

// ============================================================================
// DIAGNOSTICS
// ============================================================================

/// How many fields of a batch parsed cleanly and how many fell back to a
/// default. Collected per batch and reported once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseStats {
    pub parsed: usize,
    pub defaulted: usize,
    /// First few offending raw values, for the run log
    pub samples: Vec<String>,
}

impl ParseStats {
    const MAX_SAMPLES: usize = 5;

    pub fn record_ok(&mut self) {
        self.parsed += 1;
    }

    pub fn record_default(&mut self, raw: &str) {
        self.defaulted += 1;
        if self.samples.len() < Self::MAX_SAMPLES {
            self.samples.push(raw.to_string());
        }
    }

    pub fn merge(&mut self, other: &ParseStats) {
        self.parsed += other.parsed;
        self.defaulted += other.defaulted;
        for s in &other.samples {
            if self.samples.len() >= Self::MAX_SAMPLES {
                break;
            }
            self.samples.push(s.clone());
        }
    }

    pub fn total(&self) -> usize {
        self.parsed + self.defaulted
    }

    pub fn summary(&self) -> String {
        format!(
            "{} fields parsed, {} defaulted{}",
            self.parsed,
            self.defaulted,
            if self.samples.is_empty() {
                String::new()
            } else {
                format!(" (e.g. {})", self.samples.join(", "))
            }
        )
    }
}

/// Batch field parser: lenient results plus the diagnostic count.
#[derive(Debug, Default)]
pub struct FieldParser {
    stats: ParseStats,
}

impl FieldParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loss amount such as "10K"; negative amounts count as malformed
    pub fn magnitude(&mut self, raw: Option<&str>) -> f64 {
        match try_parse_magnitude(raw).filter(|v| *v >= 0.0) {
            Some(v) => {
                self.stats.record_ok();
                v
            }
            None => {
                self.stats.record_default(raw.unwrap_or(""));
                0.0
            }
        }
    }

    pub fn count(&mut self, raw: Option<&str>) -> u32 {
        match try_parse_count(raw) {
            Some(n) => {
                self.stats.record_ok();
                n
            }
            None => {
                self.stats.record_default(raw.unwrap_or(""));
                0
            }
        }
    }

    pub fn into_stats(self) -> ParseStats {
        self.stats
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suffixed_values() {
        assert_eq!(parse_magnitude("10K"), 10_000.0);
        assert_eq!(parse_magnitude("2.5M"), 2_500_000.0);
        assert_eq!(parse_magnitude("1B"), 1_000_000_000.0);
        assert_eq!(parse_magnitude("0.25k"), 250.0);
        assert_eq!(parse_magnitude(" 3M "), 3_000_000.0);
    }

    #[test]
    fn test_every_suffix_scales_prefix() {
        for (suffix, m) in MAGNITUDE_SUFFIXES {
            for n in [0.5, 1.0, 12.0, 7.25] {
                let raw = format!("{}{}", n, suffix);
                assert_eq!(parse_magnitude(raw.as_str()), n * m, "raw = {}", raw);
            }
        }
    }

    #[test]
    fn test_plain_numbers() {
        assert_eq!(parse_magnitude("1500"), 1500.0);
        assert_eq!(parse_magnitude("12.75"), 12.75);
        assert_eq!(parse_magnitude(42.0), 42.0);
    }

    #[test]
    fn test_empty_zero_and_garbage_are_zero() {
        assert_eq!(parse_magnitude(""), 0.0);
        assert_eq!(parse_magnitude("0"), 0.0);
        assert_eq!(parse_magnitude(RawMagnitude::Empty), 0.0);
        assert_eq!(parse_magnitude(None::<&str>), 0.0);
        assert_eq!(parse_magnitude("abc"), 0.0);
        assert_eq!(parse_magnitude("xK"), 0.0);
        assert_eq!(parse_magnitude("K"), 0.0);
        assert_eq!(parse_magnitude("NaN"), 0.0);
        assert_eq!(parse_magnitude("inf"), 0.0);
        assert_eq!(parse_magnitude(f64::NAN), 0.0);
    }

    #[test]
    fn test_strict_parse_distinguishes_malformed() {
        assert_eq!(try_parse_magnitude("0"), Some(0.0));
        assert_eq!(try_parse_magnitude(""), Some(0.0));
        assert_eq!(try_parse_magnitude("1..2K"), None);
    }

    #[test]
    fn test_count_parse() {
        assert_eq!(try_parse_count(None), Some(0));
        assert_eq!(try_parse_count(Some("")), Some(0));
        assert_eq!(try_parse_count(Some("4")), Some(4));
        assert_eq!(try_parse_count(Some("3.0")), Some(3));
        assert_eq!(try_parse_count(Some("2.5")), None);
        assert_eq!(try_parse_count(Some("-1")), None);
        assert_eq!(try_parse_count(Some("n/a")), None);
    }

    #[test]
    fn test_field_parser_counts_defaults() {
        let mut parser = FieldParser::new();

        assert_eq!(parser.magnitude(Some("5K")), 5000.0);
        assert_eq!(parser.magnitude(Some("??")), 0.0);
        assert_eq!(parser.magnitude(Some("-3K")), 0.0);
        assert_eq!(parser.count(Some("2")), 2);
        assert_eq!(parser.count(Some("two")), 0);

        let stats = parser.into_stats();
        assert_eq!(stats.parsed, 2);
        assert_eq!(stats.defaulted, 3);
        assert_eq!(stats.samples, vec!["??", "-3K", "two"]);
    }

    #[test]
    fn test_stats_merge_caps_samples() {
        let mut a = ParseStats::default();
        let mut b = ParseStats::default();
        for i in 0..4 {
            a.record_default(&format!("a{}", i));
            b.record_default(&format!("b{}", i));
        }
        b.record_ok();

        a.merge(&b);

        assert_eq!(a.defaulted, 8);
        assert_eq!(a.parsed, 1);
        assert_eq!(a.samples.len(), 5);
        assert_eq!(a.total(), 9);
    }
}
