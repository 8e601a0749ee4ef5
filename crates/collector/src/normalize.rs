//! Text-to-value normalization for scraped fields.
//!
//! The source pages mix thousands separators, unit suffixes,
//! parenthesized negatives and relative time expressions. Everything
//! here degrades to `None` on unparseable input; nothing panics.

/// Parse free-form numeric text into a float.
///
/// Rules, in order: empty input is `None`; a value fully wrapped in
/// parentheses is a negative magnitude; commas and internal whitespace
/// are stripped; the first decimal-number substring wins; the
/// parenthesis sign overrides any embedded sign.
pub fn normalize_number(text: Option<&str>) -> Option<f64> {
    let s = text?.trim();
    if s.is_empty() {
        return None;
    }

    let (s, negated) = match s.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
        Some(inner) => (inner, true),
        None => (s, false),
    };

    let cleaned: String = s
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();

    let num = first_decimal(&cleaned)?;
    Some(if negated { -num.abs() } else { num })
}

/// Scan for the first `[-+]?digits[.digits]` substring and parse it.
fn first_decimal(s: &str) -> Option<f64> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let digit_here = bytes[i].is_ascii_digit();
        let signed_digit = (bytes[i] == b'+' || bytes[i] == b'-')
            && bytes.get(i + 1).is_some_and(u8::is_ascii_digit);
        let dot_digit = bytes[i] == b'.' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit);

        if !(digit_here || signed_digit || dot_digit) {
            i += 1;
            continue;
        }

        let start = i;
        if bytes[i] == b'+' || bytes[i] == b'-' {
            i += 1;
        }
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i < bytes.len() && bytes[i] == b'.' {
            let mut j = i + 1;
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }
            if j > i + 1 {
                i = j;
            }
        }
        return s[start..i].parse().ok();
    }
    None
}

/// Minutes per unit. The month multiplier is a 30-day approximation,
/// not calendar-accurate.
const UNIT_MINUTES: [(&str, i64); 5] = [
    ("minute", 1),
    ("hour", 60),
    ("day", 1440),
    ("week", 10080),
    ("month", 43200),
];

/// Parse a relative time expression ("3 weeks", "45 minutes ago") into
/// whole minutes. Seconds truncate toward zero. Unknown units are `None`.
pub fn normalize_duration(text: Option<&str>) -> Option<i64> {
    let s = text?;
    let tokens: Vec<&str> = s.split_whitespace().collect();

    for pair in tokens.windows(2) {
        let Ok(amount) = pair[0].parse::<i64>() else {
            continue;
        };
        if amount < 0 {
            continue;
        }
        let unit = pair[1].to_ascii_lowercase();
        if unit.starts_with("second") {
            return Some(amount / 60);
        }
        for (name, minutes) in UNIT_MINUTES {
            if unit.starts_with(name) {
                // An amount large enough to overflow is garbage input.
                return amount.checked_mul(minutes);
            }
        }
        // "3 apples" is not a duration; keep scanning.
    }
    None
}

/// First four-digit year embedded in text like "Started: Mar 12, 2021".
pub fn first_year(text: Option<&str>) -> Option<i64> {
    let bytes = text?.as_bytes();
    let mut run = 0usize;
    for (i, b) in bytes.iter().enumerate() {
        if b.is_ascii_digit() {
            run += 1;
            let next_is_digit = bytes.get(i + 1).is_some_and(u8::is_ascii_digit);
            if run == 4 && !next_is_digit {
                return std::str::from_utf8(&bytes[i - 3..=i]).ok()?.parse().ok();
            }
        } else {
            run = 0;
        }
    }
    None
}
