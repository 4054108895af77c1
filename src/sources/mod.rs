//! Recorded fix sources API

use serde::Deserialize;
use time::OffsetDateTime;

use crate::model::Fix;

/// A fix as it was recorded, with the observing state of the surveyor when
/// the log carries it
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedFix {
    pub fix: Fix,
    pub observing: Option<bool>,
}

/// Recorded fix source
pub trait FixSource {
    /// Fetch the fixes recorded during the period, oldest first
    fn fetch(
        &mut self,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<RecordedFix>, String>;
}

/// Column names of a fix log
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct FieldsConfiguration {
    #[serde(default = "default_time")]
    pub time: String,
    #[serde(default = "default_latitude")]
    pub latitude: String,
    #[serde(default = "default_longitude")]
    pub longitude: String,
    #[serde(default = "default_altitude")]
    pub altitude: String,
    #[serde(default = "default_course")]
    pub course: String,
    #[serde(default = "default_speed")]
    pub speed: String,
    #[serde(default = "default_horizontal_accuracy")]
    pub horizontal_accuracy: String,
    #[serde(default = "default_vertical_accuracy")]
    pub vertical_accuracy: String,
    #[serde(default = "default_observing")]
    pub observing: String,
}

fn default_time() -> String {
    "time".to_string()
}

fn default_latitude() -> String {
    "latitude".to_string()
}

fn default_longitude() -> String {
    "longitude".to_string()
}

fn default_altitude() -> String {
    "altitude".to_string()
}

fn default_course() -> String {
    "course".to_string()
}

fn default_speed() -> String {
    "speed".to_string()
}

fn default_horizontal_accuracy() -> String {
    "horizontal_accuracy".to_string()
}

fn default_vertical_accuracy() -> String {
    "vertical_accuracy".to_string()
}

fn default_observing() -> String {
    "observing".to_string()
}

impl Default for FieldsConfiguration {
    fn default() -> Self {
        Self {
            time: default_time(),
            latitude: default_latitude(),
            longitude: default_longitude(),
            altitude: default_altitude(),
            course: default_course(),
            speed: default_speed(),
            horizontal_accuracy: default_horizontal_accuracy(),
            vertical_accuracy: default_vertical_accuracy(),
            observing: default_observing(),
        }
    }
}

#[cfg(feature = "csv")]
mod csv_file;

#[cfg(feature = "csv")]
pub use csv_file::CsvFixSource;
