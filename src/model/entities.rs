//! Survey entities

use std::collections::BTreeMap;

use geo::geometry::Point;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::position::Fix;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MissionId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GpsPointId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MissionPropertyId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObservationId(pub usize);

/// A reference to anything that can be anchored to a location
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityRef {
    MissionProperty(MissionPropertyId),
    Observation(ObservationId),
}

/// A typed attribute value
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl AttributeValue {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(v) => Some(*v),
            _ => None,
        }
    }
}

pub type Attributes = BTreeMap<String, AttributeValue>;

/// One continuous track logging session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    #[serde(with = "time::serde::rfc3339")]
    pub started: OffsetDateTime,
}

/// A fix accepted into a mission
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub mission: MissionId,
    pub fix: Fix,
}

impl GpsPoint {
    pub fn time(&self) -> OffsetDateTime {
        self.fix.time
    }

    pub fn coordinates(&self) -> Point {
        self.fix.coordinates
    }
}

/// A manually supplied location, usually a map touch
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdhocLocation {
    pub coordinates: Point,
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
    /// Name of the map the location was taken against
    pub map: Option<String>,
}

/// A feature sighted from the observer's position.
///
/// `angle` is the absolute bearing to the feature and `direction` the
/// observer's heading, both in degrees clockwise from north. `distance` is
/// always in meters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AngleDistanceLocation {
    pub angle: f64,
    pub distance: f64,
    pub direction: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Anchor {
    Gps(GpsPointId),
    Adhoc(AdhocLocation),
}

/// Where an observation was made
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ObservationLocation {
    Gps(GpsPointId),
    Adhoc(AdhocLocation),
    AngleDistance {
        observer: GpsPointId,
        location: AngleDistanceLocation,
    },
}

impl ObservationLocation {
    pub fn gps_point(&self) -> Option<GpsPointId> {
        match self {
            ObservationLocation::Gps(id) => Some(*id),
            ObservationLocation::AngleDistance { observer, .. } => Some(*observer),
            ObservationLocation::Adhoc(_) => None,
        }
    }
}

/// State of the mission at a point in time
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MissionProperty {
    pub mission: MissionId,
    pub anchor: Anchor,
    pub observing: bool,
    pub attributes: Attributes,
}

/// A sighted feature
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub mission: MissionId,
    pub feature: String,
    pub location: ObservationLocation,
    pub attributes: Attributes,
}
