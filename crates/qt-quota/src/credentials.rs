//! Pure helpers over a raw credential payload.
//!
//! Credential files have been written by several generations of tooling, so
//! every lookup probes both the snake_case and the camelCase spelling.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::model::{parse_timestamp, Credentials};

/// First non-empty string among `keys`.
pub fn first_str<'a>(payload: &'a Credentials, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| payload.get(*k).and_then(Value::as_str))
        .find(|s| !s.is_empty())
}

pub fn get_access_token(payload: &Credentials) -> Option<&str> {
    first_str(payload, &["access_token", "accessToken"])
}

pub fn get_refresh_token(payload: &Credentials) -> Option<&str> {
    first_str(payload, &["refresh_token", "refreshToken"])
}

/// The expiry instant recorded in the payload, if any field parses.
pub fn expiry_time(payload: &Credentials) -> Option<DateTime<Utc>> {
    iso_expiry(payload).or_else(|| epoch_ms_expiry(payload))
}

pub fn is_token_expired(payload: &Credentials) -> bool {
    is_token_expired_at(payload, Utc::now())
}

/// Expiry check against an explicit clock.
///
/// An explicit `expired: true` wins; then the ISO expiry; then the
/// millisecond epoch. With no usable expiry information the token is
/// assumed valid.
pub fn is_token_expired_at(payload: &Credentials, now: DateTime<Utc>) -> bool {
    if payload.get("expired").and_then(Value::as_bool) == Some(true) {
        return true;
    }
    if let Some(expires_at) = iso_expiry(payload) {
        return expires_at <= now;
    }
    if let Some(expires_at) = epoch_ms_expiry(payload) {
        return expires_at <= now;
    }
    false
}

fn iso_expiry(payload: &Credentials) -> Option<DateTime<Utc>> {
    first_str(payload, &["expires_at", "expiresAt"]).and_then(parse_timestamp)
}

fn epoch_ms_expiry(payload: &Credentials) -> Option<DateTime<Utc>> {
    let ms = match payload.get("expiry_date")? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    if ms == 0 {
        return None;
    }
    Utc.timestamp_millis_opt(ms).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;
    use serde_json::json;

    fn payload(v: Value) -> Credentials {
        match v {
            Value::Object(map) => map,
            _ => panic!("payload must be an object"),
        }
    }

    #[test]
    fn access_token_prefers_snake_case() {
        let p = payload(json!({"access_token": "a", "accessToken": "b"}));
        assert_eq!(get_access_token(&p), Some("a"));
    }

    #[test]
    fn access_token_falls_back_to_camel_case() {
        let p = payload(json!({"accessToken": "b"}));
        assert_eq!(get_access_token(&p), Some("b"));

        let p = payload(json!({"access_token": "", "accessToken": "b"}));
        assert_eq!(get_access_token(&p), Some("b"));
    }

    #[test]
    fn access_token_missing() {
        assert_eq!(get_access_token(&payload(json!({"token": "x"}))), None);
        assert_eq!(get_access_token(&payload(json!({"access_token": 12}))), None);
    }

    #[test]
    fn refresh_token_variants() {
        let p = payload(json!({"refreshToken": "r"}));
        assert_eq!(get_refresh_token(&p), Some("r"));
    }

    #[test]
    fn iso_expiry_past_and_future() {
        let now = Utc::now();
        let past = payload(json!({"expires_at": (now - Duration::seconds(5)).to_rfc3339()}));
        let future = payload(json!({"expiresAt": (now + Duration::hours(1)).to_rfc3339()}));
        assert!(is_token_expired_at(&past, now));
        assert!(!is_token_expired_at(&future, now));
    }

    #[test]
    fn epoch_ms_expiry_past_and_future() {
        let now = Utc::now();
        let past = payload(json!({"expiry_date": (now - Duration::minutes(1)).timestamp_millis()}));
        let future =
            payload(json!({"expiry_date": (now + Duration::minutes(1)).timestamp_millis()}));
        assert!(is_token_expired_at(&past, now));
        assert!(!is_token_expired_at(&future, now));
    }

    #[test]
    fn iso_expiry_takes_precedence_over_epoch() {
        let now = Utc::now();
        let p = payload(json!({
            "expires_at": (now + Duration::hours(1)).to_rfc3339(),
            "expiry_date": (now - Duration::hours(1)).timestamp_millis(),
        }));
        assert!(!is_token_expired_at(&p, now));
    }

    #[test]
    fn iso_expiry_without_offset() {
        let now = Utc::now();
        let p = payload(json!({"expires_at": "2020-01-01T00:00:00"}));
        assert!(is_token_expired_at(&p, now));
        assert_eq!(
            expiry_time(&p),
            Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).single()
        );

        let p = payload(json!({"expiresAt": "2099-01-01T00:00:00"}));
        assert!(!is_token_expired_at(&p, now));
    }

    #[test]
    fn unparsable_iso_falls_through_to_epoch() {
        let now = Utc::now();
        let p = payload(json!({
            "expires_at": "whenever",
            "expiry_date": (now - Duration::hours(1)).timestamp_millis(),
        }));
        assert!(is_token_expired_at(&p, now));

        let p = payload(json!({"expires_at": "whenever"}));
        assert!(!is_token_expired_at(&p, now));
    }

    #[test]
    fn no_expiry_information_is_not_expired() {
        assert!(!is_token_expired(&payload(json!({"access_token": "a"}))));
        assert!(!is_token_expired(&payload(json!({"expired": false}))));
        assert!(!is_token_expired(&Credentials::new()));
    }

    #[test]
    fn expiry_time_reports_parsed_instant() {
        let p = payload(json!({"expiry_date": 1_700_000_000_000i64}));
        assert_eq!(
            expiry_time(&p).unwrap(),
            Utc.timestamp_millis_opt(1_700_000_000_000).single().unwrap()
        );
        assert!(expiry_time(&Credentials::new()).is_none());
    }

    proptest! {
        #[test]
        fn explicit_expired_flag_always_wins(offset_secs in -1_000_000i64..1_000_000, use_iso in any::<bool>()) {
            let now = Utc::now();
            let at = now + Duration::seconds(offset_secs);
            let p = if use_iso {
                payload(json!({"expired": true, "expires_at": at.to_rfc3339()}))
            } else {
                payload(json!({"expired": true, "expiry_date": at.timestamp_millis()}))
            };
            prop_assert!(is_token_expired_at(&p, now));
        }

        #[test]
        fn strictly_past_expires_and_strictly_future_does_not(offset_secs in 1i64..10_000_000) {
            let now = Utc::now();
            let past = payload(json!({"expires_at": (now - Duration::seconds(offset_secs)).to_rfc3339()}));
            let future = payload(json!({"expires_at": (now + Duration::seconds(offset_secs)).to_rfc3339()}));
            prop_assert!(is_token_expired_at(&past, now));
            prop_assert!(!is_token_expired_at(&future, now));
        }
    }
}
