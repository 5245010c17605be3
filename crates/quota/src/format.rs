//! Human-readable time and number formatting for table output.

use chrono::{DateTime, Utc};
use qt_quota::model::parse_timestamp;

/// Time left until `reset_time`: `45s`, `12m`, `2h 15m`, `3d 4h`, `expired`,
/// or `-` when absent or unparseable.
pub fn format_reset(reset_time: Option<&str>) -> String {
    format_reset_at(reset_time, Utc::now())
}

pub fn format_reset_at(reset_time: Option<&str>, now: DateTime<Utc>) -> String {
    let Some(at) = reset_time.and_then(parse_timestamp) else {
        return "-".to_string();
    };
    let secs = at.signed_duration_since(now).num_seconds();
    if secs < 0 {
        return "expired".to_string();
    }
    format_duration(secs as u64)
}

pub fn format_duration(secs: u64) -> String {
    match secs {
        0..=59 => format!("{}s", secs),
        60..=3599 => format!("{}m", secs / 60),
        3600..=86_399 => {
            let (hours, mins) = (secs / 3600, (secs % 3600) / 60);
            if mins > 0 {
                format!("{}h {}m", hours, mins)
            } else {
                format!("{}h", hours)
            }
        }
        _ => {
            let (days, hours) = (secs / 86_400, (secs % 86_400) / 3600);
            if hours > 0 {
                format!("{}d {}h", days, hours)
            } else {
                format!("{}d", days)
            }
        }
    }
}

/// `30s ago`, `2m ago`, `1h ago`, `1d ago`.
pub fn format_age(secs: u64) -> String {
    match secs {
        0..=59 => format!("{}s ago", secs),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86_399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86_400),
    }
}

/// Thousands separated with commas.
pub fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// `part / total` as a one-decimal percentage, `0.0` when total is zero.
pub fn format_rate(part: u64, total: u64) -> String {
    if total == 0 {
        return "0.0".to_string();
    }
    format!("{:.1}", part as f64 / total as f64 * 100.0)
}

pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
