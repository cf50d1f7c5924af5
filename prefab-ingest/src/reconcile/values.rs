//! Scalar coercion helpers for machine-parsed cell values
//!
//! Parsed documents deliver numbers as strings ("12", "80 sqft", "1,250.5 lb")
//! and strings as numbers. These helpers read what a cell means without
//! failing on the noise around it.

use serde_json::Value;

/// Stringify a scalar cell; blank strings, null, arrays and objects are `None`
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Leading integer of a cell, the way a lenient integer parse reads it ("12 pcs" → 12)
pub fn parse_count(text: &str) -> Option<i64> {
    let cleaned: String = text.trim().chars().filter(|c| *c != ',').collect();
    let mut end = 0;
    for (i, c) in cleaned.char_indices() {
        if c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+')) {
            end = i + c.len_utf8();
        } else {
            break;
        }
    }
    cleaned[..end].parse().ok()
}

/// Leading decimal number of a cell ("80 sqft" → 80.0, "1,250.5 lb" → 1250.5)
pub fn parse_measure(text: &str) -> Option<f64> {
    let cleaned: String = text.trim().chars().filter(|c| *c != ',').collect();
    let mut end = 0;
    let mut seen_dot = false;
    for (i, c) in cleaned.char_indices() {
        let accepted = c.is_ascii_digit()
            || (i == 0 && (c == '-' || c == '+'))
            || (c == '.' && !seen_dot);
        if !accepted {
            break;
        }
        if c == '.' {
            seen_dot = true;
        }
        end = i + c.len_utf8();
    }
    cleaned[..end].trim_end_matches('.').parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_text() {
        assert_eq!(scalar_text(&json!("  2x6 ")), Some("2x6".to_string()));
        assert_eq!(scalar_text(&json!(4)), Some("4".to_string()));
        assert_eq!(scalar_text(&json!(2.5)), Some("2.5".to_string()));
        assert_eq!(scalar_text(&json!("   ")), None);
        assert_eq!(scalar_text(&json!(null)), None);
        assert_eq!(scalar_text(&json!([1])), None);
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count("12"), Some(12));
        assert_eq!(parse_count("12 pcs"), Some(12));
        assert_eq!(parse_count("1,200"), Some(1200));
        assert_eq!(parse_count("-3"), Some(-3));
        assert_eq!(parse_count("2.75"), Some(2));
        assert_eq!(parse_count("pcs"), None);
        assert_eq!(parse_count(""), None);
    }

    #[test]
    fn test_parse_measure() {
        assert_eq!(parse_measure("80 sqft"), Some(80.0));
        assert_eq!(parse_measure("1,250.5 lb"), Some(1250.5));
        assert_eq!(parse_measure("12."), Some(12.0));
        assert_eq!(parse_measure("1.2.3"), Some(1.2));
        assert_eq!(parse_measure("n/a"), None);
    }
}
