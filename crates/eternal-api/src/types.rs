//! Request payloads and response shapes of the astrology backend

use eternal_cache::{BirthData, ChartData, Insight, PlanetPosition};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::ApiError;

/// Owner recorded on charts whose response names nobody
pub const UNKNOWN_USER: &str = "unknown";

/// Body of a `/score-natal` request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NatalRequest<'a> {
    pub date: &'a str,
    pub time: &'a str,
    pub timezone: &'a str,
    pub lat: f64,
    pub lon: f64,
}

impl<'a> From<&'a BirthData> for NatalRequest<'a> {
    fn from(birth: &'a BirthData) -> Self {
        Self {
            date: &birth.date,
            time: &birth.time,
            timezone: &birth.timezone,
            lat: birth.lat,
            lon: birth.lon,
        }
    }
}

/// Body of a `/score-transit` request
#[derive(Debug, Clone, Serialize)]
pub struct TransitRequest<'a> {
    pub natal: &'a Value,
    pub transit: &'a Value,
}

/// Body of a `/compare-users` request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareRequest<'a> {
    pub user_a: &'a Value,
    pub user_b: &'a Value,
}

/// Natal scoring response; every field is optional on the wire
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NatalResponse {
    #[serde(default)]
    planets: Vec<PlanetPosition>,
    #[serde(default)]
    scores: BTreeMap<String, f64>,
    #[serde(default)]
    insights: Vec<Insight>,
    #[serde(default, alias = "user_id")]
    user_id: Option<String>,
}

/// Build a chart from a `/score-natal` response computed at `now_ms`
///
/// The owner is taken from the response, then `owner`, then
/// [`UNKNOWN_USER`].
pub fn chart_from_response(
    response: Value,
    now_ms: u64,
    owner: Option<&str>,
) -> Result<ChartData, ApiError> {
    let parsed: NatalResponse = serde_json::from_value(response)
        .map_err(|e| ApiError::Parse(format!("natal response: {e}")))?;

    let user_id = parsed
        .user_id
        .filter(|id| !id.trim().is_empty())
        .or_else(|| owner.map(str::to_string))
        .unwrap_or_else(|| UNKNOWN_USER.to_string());

    Ok(ChartData {
        planets: parsed.planets,
        scores: parsed.scores,
        insights: parsed.insights,
        calculated_at: now_ms,
        user_id,
    })
}
