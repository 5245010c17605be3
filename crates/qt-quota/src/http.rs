use reqwest::{RequestBuilder, StatusCode};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::error::HttpError;

/// Status plus the decoded body. The body is only read for 2xx responses.
#[derive(Debug)]
pub struct JsonResponse {
    pub status: StatusCode,
    pub body: Option<Value>,
}

impl JsonResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// `"HTTP 503: Service Unavailable"`.
    pub fn status_line(&self) -> String {
        format!(
            "HTTP {}: {}",
            self.status.as_u16(),
            self.status.canonical_reason().unwrap_or("Unknown")
        )
    }
}

/// Send `request` and decode a JSON body, bounding the whole exchange
/// (connect, headers and body) by `timeout`.
pub async fn send_json(request: RequestBuilder, timeout: Duration) -> Result<JsonResponse, HttpError> {
    match tokio::time::timeout(timeout, exchange(request)).await {
        Ok(Ok((status, body))) => Ok(JsonResponse { status, body }),
        Ok(Err(e)) if e.is_timeout() => Err(HttpError::Timeout),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(HttpError::Timeout),
    }
}

async fn exchange(request: RequestBuilder) -> Result<(StatusCode, Option<Value>), HttpError> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Ok((status, None));
    }
    let bytes = response.bytes().await?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok((status, Some(Value::Null)));
    }
    let body = serde_json::from_slice(&bytes)?;
    Ok((status, Some(body)))
}

/// Scalar rendered as text; empty strings count as absent.
pub fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Number, or a string holding one.
pub fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|f| f.is_finite())
}

pub fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.round() as i64))
        }
        _ => None,
    }
}

/// First key among `keys` whose value renders as text.
pub fn text_field(value: &Value, keys: &[&str]) -> Option<String> {
    value.as_object().and_then(|map| text_in(map, keys))
}

pub fn text_in(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| map.get(*k).and_then(as_text))
}

pub fn f64_field(value: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| value.get(*k).and_then(as_f64))
}

pub fn i64_field(value: &Value, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|k| value.get(*k).and_then(as_i64))
}

/// Present and not `null`, `false`, `0` or `""`.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64() != Some(0.0),
        Some(_) => true,
    }
}
