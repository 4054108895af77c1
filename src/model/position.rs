//! Location fix definition

use geo::geometry::Point;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A location fix as delivered by the device.
///
/// Coordinates are `(x = longitude, y = latitude)` in WGS84. Optional
/// fields are `None` when the device did not report a valid value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub coordinates: Point,
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
    pub altitude: Option<f64>,
    /// Direction of travel, degrees clockwise from north
    pub course: Option<f64>,
    pub speed: Option<f64>,
    /// Radius of uncertainty in meters, lower is better
    pub horizontal_accuracy: Option<f64>,
    pub vertical_accuracy: Option<f64>,
}

impl Fix {
    pub fn basic(coordinates: Point, time: OffsetDateTime) -> Self {
        Self {
            coordinates,
            time,
            altitude: None,
            course: None,
            speed: None,
            horizontal_accuracy: None,
            vertical_accuracy: None,
        }
    }

    pub fn accuracy(mut self, horizontal: f64) -> Self {
        self.horizontal_accuracy = Some(horizontal);

        self
    }

    pub fn course(mut self, course: f64) -> Self {
        self.course = Some(course);

        self
    }

    /// `true` when this fix is strictly more accurate than `other`
    pub fn is_more_accurate_than(&self, other: &Fix) -> bool {
        match (self.horizontal_accuracy, other.horizontal_accuracy) {
            (Some(mine), Some(theirs)) => mine >= 0.0 && (theirs < 0.0 || mine < theirs),
            (Some(mine), None) => mine >= 0.0,
            _ => false,
        }
    }

    /// Course usable as an observer heading; negative courses are invalid
    pub fn heading(&self) -> Option<f64> {
        self.course.filter(|c| *c >= 0.0)
    }
}

#[cfg(test)]
pub mod tests {
    use geo::Point;
    use time::macros::datetime;

    use super::Fix;

    #[test]
    fn accuracy_comparison() {
        let at = datetime!(2021-05-24 0:00 UTC);
        let p = Point::new(-149.9, 61.2);

        let good = Fix::basic(p, at).accuracy(5.0);
        let bad = Fix::basic(p, at).accuracy(12.0);
        let unknown = Fix::basic(p, at);
        let invalid = Fix::basic(p, at).accuracy(-1.0);

        assert!(good.is_more_accurate_than(&bad));
        assert!(!bad.is_more_accurate_than(&good));
        assert!(!good.is_more_accurate_than(&good.clone()));
        assert!(good.is_more_accurate_than(&unknown));
        assert!(good.is_more_accurate_than(&invalid));
        assert!(!unknown.is_more_accurate_than(&good));
        assert!(!invalid.is_more_accurate_than(&unknown));
    }
}
