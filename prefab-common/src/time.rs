//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Short numeric fragment derived from the current time (last five digits of epoch millis)
pub fn millis_fragment() -> String {
    let millis = now().timestamp_millis().to_string();
    let start = millis.len().saturating_sub(5);
    millis[start..].to_string()
}
