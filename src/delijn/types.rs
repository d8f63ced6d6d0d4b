//! De Lijn API response types
//!
//! Field names follow the API's Dutch camelCase JSON.

use chrono::{DateTime, NaiveDateTime, TimeZone};
use chrono_tz::{Europe::Brussels, Tz};
use serde::{Deserialize, Serialize};

/// Time format used by the API (local Brussels time, no offset)
pub const API_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A De Lijn stop (halte)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    #[serde(rename = "haltenummer")]
    pub number: u32,
    #[serde(rename = "omschrijving", default)]
    pub description: String,
    #[serde(rename = "omschrijvingGemeente", default)]
    pub municipality: String,
    #[serde(rename = "gemeentenummer", default)]
    pub municipality_code: u32,
    #[serde(rename = "entiteitnummer", default)]
    pub entity_number: u32,
    #[serde(rename = "geoCoordinaat", default, skip_serializing_if = "Option::is_none")]
    pub geo_coordinate: Option<GeoCoord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Link>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoCoord {
    pub latitude: f64,
    pub longitude: f64,
}

/// API hyperlink
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub rel: String,
    pub url: String,
}

/// A De Lijn line (lijn)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Line {
    #[serde(rename = "entiteitnummer")]
    pub entity_number: u32,
    #[serde(rename = "lijnnummer")]
    pub line_number: u32,
    #[serde(rename = "lijnnummerPubliek", default)]
    pub public_number: String,
    #[serde(rename = "omschrijving", default)]
    pub description: String,
    /// BUS, TRAM or METRO
    #[serde(rename = "vervoertype", default)]
    pub transport_type: String,
    #[serde(rename = "publiek", default)]
    pub is_public: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Link>,
}

/// A realtime departure at a stop
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Departure {
    #[serde(rename = "entiteitnummer")]
    pub entity_number: u32,
    #[serde(rename = "lijnnummer")]
    pub line_number: u32,
    #[serde(rename = "lijnnummerPubliek", default, skip_serializing_if = "String::is_empty")]
    pub line_public_number: String,
    /// HEEN or TERUG
    #[serde(rename = "richting", default)]
    pub direction: String,
    #[serde(rename = "bestemming", default)]
    pub destination: String,
    #[serde(rename = "dienstregelingTijdstip", default)]
    pub scheduled_time_raw: String,
    #[serde(rename = "real-timeTijdstip", default, skip_serializing_if = "String::is_empty")]
    pub realtime_raw: String,
    #[serde(rename = "predictionStatussen", default)]
    pub prediction_status: Vec<String>,
    #[serde(rename = "vervoertype", default, skip_serializing_if = "String::is_empty")]
    pub transport_type: String,
}

impl Departure {
    /// Whether this departure carries realtime data
    pub fn is_realtime(&self) -> bool {
        self.prediction_status.iter().any(|s| s == "REALTIME")
    }

    pub fn scheduled_time(&self) -> Option<DateTime<Tz>> {
        parse_api_time(&self.scheduled_time_raw).ok().flatten()
    }

    pub fn realtime(&self) -> Option<DateTime<Tz>> {
        parse_api_time(&self.realtime_raw).ok().flatten()
    }

    /// Delay in seconds (positive = late, negative = early, 0 without realtime data)
    pub fn delay_seconds(&self) -> i64 {
        match (self.scheduled_time(), self.realtime()) {
            (Some(scheduled), Some(actual)) => (actual - scheduled).num_seconds(),
            _ => 0,
        }
    }
}

/// Passages at a specific stop
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StopPassage {
    #[serde(rename = "haltenummer")]
    pub stop_number: u32,
    #[serde(rename = "doorkomsten", default)]
    pub departures: Vec<Departure>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RealtimeResponse {
    #[serde(rename = "halteDoorkomsten", default)]
    pub stop_passages: Vec<StopPassage>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StopsResponse {
    #[serde(rename = "haltes", default)]
    pub stops: Vec<Stop>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Link>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinesResponse {
    #[serde(rename = "lijnen", default)]
    pub lines: Vec<Line>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Link>,
}

/// Colour code with hex value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Colour {
    pub code: String,
    pub hex: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineColours {
    #[serde(rename = "voorgrond", default)]
    pub foreground: Colour,
    #[serde(rename = "achtergrond", default)]
    pub background: Colour,
    #[serde(rename = "voorgrondRand", default)]
    pub foreground_border: Colour,
    #[serde(rename = "achtergrondRand", default)]
    pub background_border: Colour,
}

/// Parse an API timestamp as Brussels local time
///
/// An empty string means "no time" and yields `Ok(None)`.
pub fn parse_api_time(s: &str) -> Result<Option<DateTime<Tz>>, chrono::ParseError> {
    if s.is_empty() {
        return Ok(None);
    }
    let naive = NaiveDateTime::parse_from_str(s, API_TIME_FORMAT)?;
    // earliest() picks the first occurrence on the DST fall-back hour
    Ok(Brussels.from_local_datetime(&naive).earliest())
}
