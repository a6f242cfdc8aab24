//! Cell-level parsers for exported payment sheets.

use std::sync::LazyLock;

use regex::Regex;

static RE_HOURS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*h").unwrap());
static RE_MINUTES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*m").unwrap());
static RE_SECONDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*s").unwrap());

/// Decimal hours from text like `1h 3m 34s`, `47m 46s`, `1.5h` or `2H`.
/// Units may appear in any order or be absent; `-` and empty are 0.
pub fn parse_duration(s: &str) -> f64 {
    let s = s.trim();
    if s.is_empty() || s == "-" {
        return 0.0;
    }
    let unit = |re: &Regex| -> f64 {
        re.captures(s)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .unwrap_or(0.0)
    };
    unit(&RE_HOURS) + unit(&RE_MINUTES) / 60.0 + unit(&RE_SECONDS) / 3600.0
}

/// Amount from text like `$1,234.50`, `€10.00` or `USD 10.00`. Currency
/// symbols, codes and thousands separators are dropped. Anything
/// unparseable is 0.
pub fn parse_payout(s: &str) -> f64 {
    let cleaned: String = s
        .trim()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if cleaned.is_empty() || cleaned == "-" {
        return 0.0;
    }
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Render an amount as `$1,234.50` (`-$3.20` when negative).
pub fn format_payout(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let frac = cents % 100;

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("{sign}${grouped}.{frac:02}")
}
