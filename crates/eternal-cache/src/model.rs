//! Domain records held by the caches
//!
//! Field names follow the backend's JSON (camelCase) so records
//! round-trip through the API and the persistent store unchanged.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::error::FetchError;

/// A record failed shape validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    /// Offending field
    pub field: &'static str,
    /// What is wrong with it
    pub reason: String,
}

impl ValidationError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

impl From<ValidationError> for FetchError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

fn default_timezone() -> String {
    "+00:00".to_string()
}

/// Birth moment and place a chart is computed from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BirthData {
    /// Calendar date, `YYYY-MM-DD`
    pub date: String,
    /// Local time, `HH:MM` or `HH:MM:SS`
    pub time: String,
    /// Latitude in degrees, north positive
    #[serde(alias = "latitude")]
    pub lat: f64,
    /// Longitude in degrees, east positive
    #[serde(alias = "longitude")]
    pub lon: f64,
    /// UTC offset, `+HH:MM` or `-HH:MM`
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl BirthData {
    pub fn new(
        date: impl Into<String>,
        time: impl Into<String>,
        lat: f64,
        lon: f64,
        timezone: impl Into<String>,
    ) -> Self {
        Self {
            date: date.into(),
            time: time.into(),
            lat,
            lon,
            timezone: timezone.into(),
        }
    }

    /// Check every field before any cache or network I/O happens
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_date(&self.date)?;
        validate_time(&self.time)?;

        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(ValidationError::new(
                "lat",
                format!("{} is outside -90..=90", self.lat),
            ));
        }
        if !self.lon.is_finite() || !(-180.0..=180.0).contains(&self.lon) {
            return Err(ValidationError::new(
                "lon",
                format!("{} is outside -180..=180", self.lon),
            ));
        }

        validate_timezone(&self.timezone)
    }

    /// Time normalized to `HH:MM:SS`
    pub fn normalized_time(&self) -> String {
        if self.time.len() == 5 {
            format!("{}:00", self.time)
        } else {
            self.time.clone()
        }
    }
}

fn parse_digits(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn days_in_month(year: u32, month: u32) -> u32 {
    match month {
        4 | 6 | 9 | 11 => 30,
        2 if (year % 4 == 0 && year % 100 != 0) || year % 400 == 0 => 29,
        2 => 28,
        _ => 31,
    }
}

fn validate_date(date: &str) -> Result<(), ValidationError> {
    let invalid = || ValidationError::new("date", format!("'{date}' is not YYYY-MM-DD"));

    let mut parts = date.split('-');
    let (Some(y), Some(m), Some(d), None) = (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(invalid());
    };
    if y.len() != 4 || m.len() != 2 || d.len() != 2 {
        return Err(invalid());
    }

    let (Some(year), Some(month), Some(day)) = (parse_digits(y), parse_digits(m), parse_digits(d))
    else {
        return Err(invalid());
    };

    if !(1..=12).contains(&month) || day == 0 || day > days_in_month(year, month) {
        return Err(invalid());
    }

    Ok(())
}

fn validate_time(time: &str) -> Result<(), ValidationError> {
    let invalid = || ValidationError::new("time", format!("'{time}' is not HH:MM or HH:MM:SS"));

    let fields: Vec<&str> = time.split(':').collect();
    if !(2..=3).contains(&fields.len()) || fields.iter().any(|f| f.len() != 2) {
        return Err(invalid());
    }

    let limits = [24, 60, 60];
    for (field, limit) in fields.iter().zip(limits) {
        match parse_digits(field) {
            Some(value) if value < limit => {}
            _ => return Err(invalid()),
        }
    }

    Ok(())
}

fn validate_timezone(tz: &str) -> Result<(), ValidationError> {
    let invalid = || ValidationError::new("timezone", format!("'{tz}' is not +HH:MM or -HH:MM"));

    let Some(rest) = tz.strip_prefix('+').or_else(|| tz.strip_prefix('-')) else {
        return Err(invalid());
    };
    let Some((h, m)) = rest.split_once(':') else {
        return Err(invalid());
    };
    if h.len() != 2 || m.len() != 2 {
        return Err(invalid());
    }

    match (parse_digits(h), parse_digits(m)) {
        (Some(hours), Some(minutes)) if hours <= 14 && minutes < 60 => Ok(()),
        _ => Err(invalid()),
    }
}

/// Position of a single body in a chart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanetPosition {
    pub name: String,
    /// Ecliptic longitude in degrees
    #[serde(default)]
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub house: Option<u8>,
    #[serde(default)]
    pub retrograde: bool,
}

/// Interpretive text for one life area
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    #[serde(alias = "life_area", alias = "area")]
    pub life_area: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(alias = "insight")]
    pub text: String,
}

/// Computed natal chart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartData {
    #[serde(default)]
    pub planets: Vec<PlanetPosition>,
    /// Score per life area
    #[serde(default)]
    pub scores: BTreeMap<String, f64>,
    #[serde(default)]
    pub insights: Vec<Insight>,
    /// Milliseconds since epoch the chart was computed
    pub calculated_at: u64,
    /// Owner of the chart
    #[serde(default)]
    pub user_id: String,
}

impl ChartData {
    /// Reject charts that would break a consumer later
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.user_id.trim().is_empty() {
            return Err(ValidationError::new("userId", "chart has no owner"));
        }
        if self.planets.is_empty() && self.scores.is_empty() {
            return Err(ValidationError::new(
                "planets",
                "chart has neither planets nor scores",
            ));
        }
        if let Some(planet) = self.planets.iter().find(|p| p.name.is_empty()) {
            return Err(ValidationError::new(
                "planets",
                format!("planet at longitude {} has no name", planet.longitude),
            ));
        }
        if let Some((area, _)) = self.scores.iter().find(|(_, score)| !score.is_finite()) {
            return Err(ValidationError::new(
                "scores",
                format!("score for '{area}' is not finite"),
            ));
        }
        Ok(())
    }
}

/// Account level record for a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_data: Option<BirthData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_data: Option<ChartData>,
}

impl UserProfile {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            email: None,
            birth_data: None,
            chart_data: None,
        }
    }

    #[must_use]
    pub fn with_birth_data(mut self, birth_data: BirthData) -> Self {
        self.birth_data = Some(birth_data);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::new("id", "user id must not be empty"));
        }
        if let Some(birth) = &self.birth_data {
            birth.validate()?;
        }
        Ok(())
    }
}
