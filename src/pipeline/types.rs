use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Smallest travel window a query may ask for, in days.
pub const MIN_DAY_SPAN: i32 = 1;
/// Largest travel window a query may ask for, in days.
pub const MAX_DAY_SPAN: i32 = 60;

/// Weather metrics the backend collects and analyzes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    RainVolume,
    Temperature,
}

impl Metric {
    pub fn collector_path(&self) -> &'static str {
        match self {
            Metric::RainVolume => "/rainvolumecollector",
            Metric::Temperature => "/temperaturecollector",
        }
    }

    pub fn analyzer_path(&self) -> &'static str {
        match self {
            Metric::RainVolume => "/rainvolumeanalyzer",
            Metric::Temperature => "/temperatureanalyzer",
        }
    }

    /// Wire field holding the collected series
    pub fn series_field(&self) -> &'static str {
        match self {
            Metric::RainVolume => "rain_volume_lists",
            Metric::Temperature => "temperature_lists",
        }
    }

    pub fn probabilities_field(&self) -> &'static str {
        match self {
            Metric::RainVolume => "rain_volume_probabilities",
            Metric::Temperature => "temperature_probabilities",
        }
    }

    pub fn scores_field(&self) -> &'static str {
        match self {
            Metric::RainVolume => "rain_volume_scores",
            Metric::Temperature => "temperature_scores",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Metric::RainVolume => write!(f, "rain volume"),
            Metric::Temperature => write!(f, "temperature"),
        }
    }
}

/// A place picked from the lookup widget.
///
/// Coordinates are absent when the widget returned no geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub name: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    /// Display only, never sent to the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_address: Option<String>,
}

impl Place {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lat: None,
            lon: None,
            formatted_address: None,
        }
    }

    pub fn with_coordinates(mut self, lat: f64, lon: f64) -> Self {
        self.lat = Some(lat);
        self.lon = Some(lon);
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.formatted_address = Some(address.into());
        self
    }
}

/// One user query. Built once per run and never mutated mid-pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub place: Option<Place>,
    pub this_year: i32,
    pub past_span: u32,
    pub day_span: i32,
}

impl Query {
    pub fn new(place: Option<Place>, this_year: i32, past_span: u32, day_span: i32) -> Self {
        Self {
            place,
            this_year,
            past_span,
            day_span,
        }
    }

    /// Name of the selected place, if one was selected
    pub fn place_name(&self) -> Option<&str> {
        self.place
            .as_ref()
            .map(|p| p.name.trim())
            .filter(|name| !name.is_empty())
    }
}

pub fn is_valid_day_span(day_span: i32) -> bool {
    (MIN_DAY_SPAN..=MAX_DAY_SPAN).contains(&day_span)
}

/// Historical values for one metric across the look-back span.
///
/// The payload is opaque; only emptiness is ever inspected.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawSeries(pub Vec<Value>);

impl RawSeries {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Condition label mapped to a probability in [0, 1].
///
/// Values keep their wire form; keys are kept sorted so serialized output is byte-stable.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProbabilityProfile(pub BTreeMap<String, Value>);

impl ProbabilityProfile {
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        Self(pairs.into_iter().map(|(k, v)| (k.into(), Value::from(v))).collect())
    }

    pub fn get(&self, label: &str) -> Option<f64> {
        self.0.get(label).and_then(Value::as_f64)
    }

    /// Label of the first value that is not a number in [0, 1]
    pub fn out_of_range(&self) -> Option<&str> {
        self.0
            .iter()
            .find(|(_, p)| !matches!(p.as_f64(), Some(x) if (0.0..=1.0).contains(&x)))
            .map(|(label, _)| label.as_str())
    }
}

/// Opaque per-day summary passed straight through to the recommender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoreProfile(pub Value);

/// What an analyzer returns for one metric.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Analysis {
    pub probabilities: Vec<ProbabilityProfile>,
    pub scores: Vec<ScoreProfile>,
}

impl Analysis {
    /// Describes what is missing or malformed, if anything.
    pub fn incompleteness(&self) -> Option<String> {
        if self.probabilities.is_empty() {
            return Some("no probability profiles returned".to_string());
        }
        if self.scores.is_empty() {
            return Some("no score profiles returned".to_string());
        }
        self.probabilities
            .iter()
            .enumerate()
            .find_map(|(day, profile)| {
                profile
                    .out_of_range()
                    .map(|label| format!("probability for '{}' on day {} is outside [0, 1]", label, day))
            })
    }
}

/// A recommended `[start, end]` pair, endpoints kept exactly as the backend wrote them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatePeriod(pub String, pub String);

impl DatePeriod {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self(start.to_string(), end.to_string())
    }

    pub fn start(&self) -> &str {
        &self.0
    }

    pub fn end(&self) -> &str {
        &self.1
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        parse_day(&self.0)
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        parse_day(&self.1)
    }
}

/// Calendar day of a `YYYY-MM-DD`, naive ISO datetime or RFC 3339 timestamp
fn parse_day(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    raw.parse::<NaiveDate>()
        .ok()
        .or_else(|| raw.parse::<NaiveDateTime>().ok().map(|dt| dt.date()))
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

/// Echo of the query fields the backend answered for.
///
/// Absent fields stay absent on the way back out.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecommendationInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub this_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub past_span: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_span: Option<i32>,
    /// Fields the pipeline does not know about, kept verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Final answer: candidate periods and, at the same index, their probability breakdowns.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(default)]
    pub input: RecommendationInput,
    #[serde(default)]
    pub recommend_date: Vec<DatePeriod>,
    #[serde(default)]
    pub recommend_date_probability: Vec<Vec<ProbabilityProfile>>,
    /// Top-level fields beyond the three above, kept verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Recommendation {
    pub fn is_empty(&self) -> bool {
        self.recommend_date.is_empty()
    }

    /// Periods paired with their breakdowns, in order
    pub fn periods(&self) -> impl Iterator<Item = (&DatePeriod, &[ProbabilityProfile])> {
        self.recommend_date
            .iter()
            .zip(self.recommend_date_probability.iter().map(Vec::as_slice))
    }

    /// Checks that dates and breakdowns line up index for index.
    pub fn shape_error(&self) -> Option<String> {
        if self.recommend_date.len() != self.recommend_date_probability.len() {
            return Some(format!(
                "{} periods but {} probability breakdowns",
                self.recommend_date.len(),
                self.recommend_date_probability.len()
            ));
        }
        if let Some(first) = self.recommend_date_probability.first() {
            if let Some(i) = self
                .recommend_date_probability
                .iter()
                .position(|b| b.len() != first.len())
            {
                return Some(format!(
                    "breakdown {} has {} profiles, expected {}",
                    i,
                    self.recommend_date_probability[i].len(),
                    first.len()
                ));
            }
        }
        for (i, period) in self.recommend_date.iter().enumerate() {
            match (period.start_date(), period.end_date()) {
                (Some(start), Some(end)) if end < start => {
                    return Some(format!("period {} ends before it starts", i));
                }
                (Some(_), Some(_)) => {}
                _ => return Some(format!("period {} has an unreadable date", i)),
            }
        }
        None
    }
}
