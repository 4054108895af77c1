//! Angle/distance geometry
//!
//! Observers report a feature as an angle relative to "dead ahead" and a
//! distance in their preferred units. The database keeps the absolute
//! bearing (degrees clockwise from north) and meters, so the functions here
//! convert in both directions. User angles are reported in the half-open
//! range `[dead_ahead - 180, dead_ahead + 180)`.

use geo::geometry::Point;
use geo::HaversineDestination;

use crate::model::AngleDistanceLocation;
use crate::protocol::{Direction, LocationMethod, LocationUnits};

const METERS_PER_FOOT: f64 = 0.3048;
const METERS_PER_YARD: f64 = 0.9144;

/// Wrap an angle into `[0, 360)`
pub fn normalize(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Wrap an angle into `[-180, 180)`
fn signed(degrees: f64) -> f64 {
    let wrapped = normalize(degrees + 180.0) - 180.0;
    if (wrapped - 180.0).abs() < 1e-9 {
        -180.0
    } else {
        wrapped
    }
}

/// Absolute bearing for an angle entered by the user
pub fn database_angle(user_angle: f64, heading: f64, dead_ahead: f64, clockwise: bool) -> f64 {
    let offset = user_angle - dead_ahead;
    let offset = if clockwise { offset } else { -offset };
    normalize(heading + offset)
}

/// User angle for an absolute bearing; inverse of [`database_angle`]
pub fn user_angle(database_angle: f64, heading: f64, dead_ahead: f64, clockwise: bool) -> f64 {
    let relative = signed(database_angle - heading);
    let offset = if clockwise { relative } else { -relative };
    dead_ahead + signed(offset)
}

/// Convert a distance in `units` to meters
pub fn meters(distance: f64, units: LocationUnits) -> f64 {
    match units {
        LocationUnits::Feet => distance * METERS_PER_FOOT,
        LocationUnits::Meters => distance,
        LocationUnits::Yards => distance * METERS_PER_YARD,
    }
}

/// Convert meters to a distance in `units`
pub fn user_distance(meters: f64, units: LocationUnits) -> f64 {
    match units {
        LocationUnits::Feet => meters / METERS_PER_FOOT,
        LocationUnits::Meters => meters,
        LocationUnits::Yards => meters / METERS_PER_YARD,
    }
}

/// Location of the feature seen from `observer`
pub fn feature_location(observer: Point, location: &AngleDistanceLocation) -> Point {
    observer.haversine_destination(normalize(location.angle), location.distance)
}

/// Distance of the feature from the observer's line of travel, in meters
pub fn perpendicular_meters(location: &AngleDistanceLocation) -> f64 {
    let relative = (location.angle - location.direction).to_radians();
    (location.distance * relative.sin()).abs()
}

/// Conversions bound to one feature's angle/distance conventions
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AngleDistanceHelper {
    pub dead_ahead: f64,
    pub direction: Direction,
    pub units: LocationUnits,
}

impl Default for AngleDistanceHelper {
    fn default() -> Self {
        Self {
            dead_ahead: 0.0,
            direction: Direction::Cw,
            units: LocationUnits::Meters,
        }
    }
}

impl AngleDistanceHelper {
    pub fn new(method: &LocationMethod) -> Self {
        Self {
            dead_ahead: method.dead_ahead,
            direction: method.direction,
            units: method.units,
        }
    }

    fn clockwise(&self) -> bool {
        self.direction == Direction::Cw
    }

    /// Canonical location from what the user entered
    pub fn location(&self, user_angle: f64, user_distance: f64, heading: f64) -> AngleDistanceLocation {
        AngleDistanceLocation {
            angle: database_angle(user_angle, heading, self.dead_ahead, self.clockwise()),
            distance: meters(user_distance, self.units),
            direction: heading,
        }
    }

    pub fn user_angle(&self, location: &AngleDistanceLocation) -> f64 {
        user_angle(
            location.angle,
            location.direction,
            self.dead_ahead,
            self.clockwise(),
        )
    }

    pub fn user_distance(&self, location: &AngleDistanceLocation) -> f64 {
        user_distance(location.distance, self.units)
    }
}

#[cfg(test)]
pub mod tests {
    use geo::{HaversineDistance, Point};

    use super::*;

    #[test]
    fn user_angle_round_trip() {
        for dead_ahead in [0.0, 90.0, 180.0, -45.0] {
            for heading in [0.0, 37.5, 180.0, 359.0] {
                for clockwise in [true, false] {
                    let mut a = dead_ahead - 180.0;
                    while a < dead_ahead + 180.0 {
                        let db = database_angle(a, heading, dead_ahead, clockwise);
                        assert!((0.0..360.0).contains(&db));
                        let back = user_angle(db, heading, dead_ahead, clockwise);
                        assert!(
                            (back - a).abs() < 1e-6,
                            "a={} heading={} dead_ahead={} cw={} back={}",
                            a,
                            heading,
                            dead_ahead,
                            clockwise,
                            back
                        );
                        a += 7.25;
                    }
                }
            }
        }
    }

    #[test]
    fn upper_bound_wraps_to_lower_bound() {
        let db = database_angle(270.0, 0.0, 90.0, true);
        assert_eq!(180.0, db);
        assert_eq!(-90.0, user_angle(db, 0.0, 90.0, true));
    }

    #[test]
    fn angle_conventions() {
        // dead ahead is 0 and angles increase clockwise: 90 is to the right
        assert_eq!(90.0, database_angle(90.0, 0.0, 0.0, true));
        assert_eq!(180.0, database_angle(90.0, 90.0, 0.0, true));
        // counter clockwise: 90 is to the left
        assert_eq!(270.0, database_angle(90.0, 0.0, 0.0, false));
        // dead ahead at 180 means 180 points along the heading
        assert_eq!(45.0, database_angle(180.0, 45.0, 180.0, true));
        assert_eq!(45.0, database_angle(180.0, 45.0, 180.0, false));
    }

    #[test]
    fn unit_round_trip() {
        for units in [LocationUnits::Feet, LocationUnits::Meters, LocationUnits::Yards] {
            for m in [0.0, 1.0, 12.5, 999.9] {
                let back = meters(user_distance(m, units), units);
                assert!((back - m).abs() < 1e-9);
            }
        }
        assert!((meters(3.0, LocationUnits::Feet) - 0.9144).abs() < 1e-12);
        assert!((meters(1.0, LocationUnits::Yards) - 0.9144).abs() < 1e-12);
    }

    #[test]
    fn feature_location_from_observer() {
        let observer = Point::new(-149.9, 61.2);
        let location = AngleDistanceLocation {
            angle: 90.0,
            distance: 100.0,
            direction: 0.0,
        };

        let feature = feature_location(observer, &location);
        let distance = observer.haversine_distance(&feature);
        assert!((distance - 100.0).abs() < 0.01);
        assert!(feature.x() > observer.x());
        assert!((feature.y() - observer.y()).abs() < 1e-5);

        assert!((perpendicular_meters(&location) - 100.0).abs() < 1e-9);
        let ahead = AngleDistanceLocation {
            angle: 30.0,
            distance: 50.0,
            direction: 30.0,
        };
        assert!(perpendicular_meters(&ahead) < 1e-9);
    }

    #[test]
    fn helper_uses_feature_conventions() {
        let helper = AngleDistanceHelper {
            dead_ahead: 180.0,
            direction: Direction::Ccw,
            units: LocationUnits::Feet,
        };

        let location = helper.location(150.0, 100.0, 10.0);
        assert_eq!(40.0, location.angle);
        assert!((location.distance - 30.48).abs() < 1e-9);
        assert_eq!(10.0, location.direction);
        assert!((helper.user_angle(&location) - 150.0).abs() < 1e-9);
        assert!((helper.user_distance(&location) - 100.0).abs() < 1e-9);
    }
}
