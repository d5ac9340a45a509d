//! Cache key types for the domain and query layers
//!
//! Every key is derived deterministically from the request that produced the
//! cached value: logically identical requests map to the same key and
//! distinct requests to distinct keys.

#![allow(missing_docs)]

use serde::Serialize;
use serde_json::Value;
use std::fmt::{self, Write};

use crate::model::BirthData;
use crate::operation::Operation;

/// Common interface for all cache key types.
pub trait CacheKey: fmt::Debug + fmt::Display + Clone + PartialEq + Eq + Send + Sync {
    fn as_cache_key(&self) -> &str;
}

/// Serialize `value` with object keys sorted at every depth.
///
/// Two values that differ only in key insertion order produce the same
/// string.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::with_capacity(64);
    write_canonical(value, &mut out);
    out
}

/// Canonical JSON of any serializable value
pub fn canonical_json_of<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_value(value).map(|v| canonical_json(&v))
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (key, value)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Serializing a str cannot fail
                let _ = write!(out, "{}", Value::String(key.clone()));
                out.push(':');
                write_canonical(value, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => {
            let _ = write!(out, "{scalar}");
        }
    }
}

/// Replace every character outside `[A-Za-z0-9_]` with `_`
pub fn sanitize_key_component(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Replace a leading sign with a letter so `-1.5` and `1.5` stay distinct
/// after sanitizing.
fn encode_sign(raw: &str) -> String {
    if let Some(rest) = raw.strip_prefix('-') {
        format!("m{rest}")
    } else if let Some(rest) = raw.strip_prefix('+') {
        format!("p{rest}")
    } else {
        raw.to_string()
    }
}

/// Coordinate rounded to four decimals, with negative zero folded into zero
fn format_coordinate(degrees: f64) -> String {
    let rounded = (degrees * 10_000.0).round() / 10_000.0;
    let rounded = if rounded == 0.0 { 0.0 } else { rounded };
    encode_sign(&format!("{rounded:.4}"))
}

/// First 16 hex digits of the MD5 of `data`
pub fn content_hash(data: &str) -> String {
    let digest = md5::compute(data.as_bytes());
    hex::encode(&digest.0[..8])
}

/// Key for a computed chart, derived from the birth data
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChartKey {
    key: String,
}

/// Prefix of every chart key
pub const CHART_KEY_PREFIX: &str = "chart_";

impl ChartKey {
    pub fn new(birth: &BirthData) -> Self {
        let raw = format!(
            "{}_{}_{}_{}_{}",
            birth.date,
            birth.normalized_time(),
            format_coordinate(birth.lat),
            format_coordinate(birth.lon),
            encode_sign(&birth.timezone),
        );

        Self {
            key: format!("{CHART_KEY_PREFIX}{}", sanitize_key_component(&raw)),
        }
    }

    pub fn as_cache_key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for ChartKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Key for a user profile
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProfileKey {
    pub user_id: String,
    key: String,
}

impl ProfileKey {
    pub fn new(user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        let key = format!("user_profile_{user_id}");
        Self { user_id, key }
    }

    pub fn as_cache_key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for ProfileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Key for a raw backend response, derived from endpoint and parameters
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApiKey {
    pub endpoint: String,
    key: String,
}

impl ApiKey {
    pub fn new(endpoint: &str, params: &Value) -> Self {
        let hash = content_hash(&format!("{endpoint}{}", canonical_json(params)));
        let path = endpoint.trim_start_matches('/').replace('/', "_");

        Self {
            endpoint: endpoint.to_string(),
            key: format!("api_{}_{hash}", sanitize_key_component(&path)),
        }
    }

    pub fn as_cache_key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Key for the query layer: operation name plus canonical inputs
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub operation: Operation,
    key: String,
}

impl QueryKey {
    pub fn new(operation: Operation, inputs: &Value) -> Self {
        Self {
            operation,
            key: format!("{}:{}", operation.name(), canonical_json(inputs)),
        }
    }

    pub fn as_cache_key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl CacheKey for ChartKey {
    fn as_cache_key(&self) -> &str {
        Self::as_cache_key(self)
    }
}

impl CacheKey for ProfileKey {
    fn as_cache_key(&self) -> &str {
        Self::as_cache_key(self)
    }
}

impl CacheKey for ApiKey {
    fn as_cache_key(&self) -> &str {
        Self::as_cache_key(self)
    }
}

impl CacheKey for QueryKey {
    fn as_cache_key(&self) -> &str {
        Self::as_cache_key(self)
    }
}
