use std::fmt;

use camino::Utf8PathBuf;
use chrono::NaiveDate;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::WpsError;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AverageFrequency {
    Year,
    Month,
    Day,
}

impl AverageFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            AverageFrequency::Year => "year",
            AverageFrequency::Month => "month",
            AverageFrequency::Day => "day",
        }
    }
}

impl fmt::Display for AverageFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Spatio-temporal window of a subset. Bounds are passed to the orchestrator
// exactly as given; min/max ordering is the caller's responsibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Window {
    pub start_date: String,
    pub end_date: String,
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl Window {
    pub fn time_range(&self) -> String {
        format!("{}/{}", self.start_date, self.end_date)
    }

    pub fn area(&self) -> String {
        format!(
            "{},{},{},{}",
            self.lon_min, self.lat_min, self.lon_max, self.lat_max
        )
    }
}

impl Default for Window {
    fn default() -> Self {
        Self {
            start_date: "1990-01-01".to_string(),
            end_date: "2000-01-01".to_string(),
            lat_min: 0.0,
            lat_max: 35.0,
            lon_min: 65.0,
            lon_max: 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Facets {
    pub experiment_id: Vec<String>,
    pub variable_id: Vec<String>,
    pub member_id: Vec<String>,
    pub table_id: Vec<String>,
    pub institution_id: Vec<String>,
}

impl Facets {
    pub fn entries(&self) -> [(&'static str, &[String]); 5] {
        [
            ("experiment_id", self.experiment_id.as_slice()),
            ("variable_id", self.variable_id.as_slice()),
            ("member_id", self.member_id.as_slice()),
            ("table_id", self.table_id.as_slice()),
            ("institution_id", self.institution_id.as_slice()),
        ]
    }
}

impl Default for Facets {
    fn default() -> Self {
        Self {
            experiment_id: vec!["historical".to_string()],
            variable_id: vec!["tas".to_string()],
            member_id: vec!["r1i1p1f1".to_string()],
            table_id: vec!["Amon".to_string()],
            institution_id: vec!["MIROC".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubsetRequest {
    pub node: String,
    #[serde(flatten)]
    pub window: Window,
    pub average_frequency: AverageFrequency,
    #[serde(flatten)]
    pub facets: Facets,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub odir: Option<Utf8PathBuf>,
}

impl Default for SubsetRequest {
    fn default() -> Self {
        Self {
            node: "DKRZ".to_string(),
            window: Window::default(),
            average_frequency: AverageFrequency::Year,
            facets: Facets::default(),
            odir: None,
        }
    }
}

impl SubsetRequest {
    pub fn validate(&self) -> Result<(), WpsError> {
        self.primary_variable()?;
        for (label, value) in [
            ("start_date", &self.window.start_date),
            ("end_date", &self.window.end_date),
        ] {
            NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| {
                WpsError::InvalidRequest(format!("{label} must be YYYY-MM-DD, got {value:?}"))
            })?;
        }
        Ok(())
    }

    pub fn check_sharing(&self) -> Result<(), WpsError> {
        match &self.odir {
            Some(odir) => Err(WpsError::InvalidRequest(format!(
                "odir {odir} cannot be combined with sharing mode"
            ))),
            None => Ok(()),
        }
    }

    // Only the first `variable_id` entry is used, even when the catalog
    // search was widened by several.
    pub fn primary_variable(&self) -> Result<&str, WpsError> {
        self.facets
            .variable_id
            .first()
            .map(String::as_str)
            .ok_or_else(|| WpsError::InvalidRequest("variable_id must not be empty".to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetIdentifierRecord {
    pub ids: Vec<String>,
}

impl DatasetIdentifierRecord {
    pub fn new(ids: Vec<String>) -> Self {
        Self { ids }
    }

    pub fn primary(&self) -> Option<&str> {
        self.ids.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizedId(String);

impl NormalizedId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormalizedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
