//! Location event filter

use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::model::{Fix, GpsPoint};
use crate::settings::Settings;

/// What to do with an incoming fix
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FixDisposition {
    /// A fresh point for the current mission
    New,
    /// Same instant as the previous point (or older than it)
    Redundant(Redundancy),
    /// Too old to be trusted; must not touch any state
    Stale,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Redundancy {
    /// More accurate; overwrite the previous point in place
    Improved,
    /// Nothing to gain
    Discarded,
}

/// Decides the identity of each fix relative to the last accepted one
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocationFilter {
    stale_after: Duration,
    duplicate_tolerance: Duration,
}

impl Default for LocationFilter {
    fn default() -> Self {
        Self {
            stale_after: Duration::SECOND,
            duplicate_tolerance: Duration::ZERO,
        }
    }
}

impl LocationFilter {
    pub fn new(settings: &Settings) -> Self {
        Self {
            stale_after: settings.stale_after(),
            duplicate_tolerance: settings.duplicate_tolerance(),
        }
    }

    /// `true` when the fix is too old at `now`
    pub fn is_stale(&self, fix: &Fix, now: OffsetDateTime) -> bool {
        now - fix.time >= self.stale_after
    }

    pub fn accept(
        &self,
        fix: &Fix,
        previous: Option<&GpsPoint>,
        now: OffsetDateTime,
    ) -> FixDisposition {
        if self.is_stale(fix, now) {
            debug!(age = %(now - fix.time), "skipping stale location");
            return FixDisposition::Stale;
        }

        self.classify(fix, previous)
    }

    /// Redundancy check only, for fixes whose age was checked on arrival
    pub fn classify(&self, fix: &Fix, previous: Option<&GpsPoint>) -> FixDisposition {
        let previous = match previous {
            Some(p) => p,
            None => return FixDisposition::New,
        };

        let delta = fix.time - previous.time();
        if delta.abs() <= self.duplicate_tolerance {
            if fix.is_more_accurate_than(&previous.fix) {
                debug!(time = %fix.time, "redundant location is better");
                return FixDisposition::Redundant(Redundancy::Improved);
            }
            debug!(time = %fix.time, "redundant location discarded");
            return FixDisposition::Redundant(Redundancy::Discarded);
        }
        if delta.is_negative() {
            debug!(time = %fix.time, "out of order location discarded");
            return FixDisposition::Redundant(Redundancy::Discarded);
        }

        FixDisposition::New
    }
}

#[cfg(test)]
pub mod tests {
    use geo::Point;
    use time::macros::datetime;
    use time::Duration;

    use super::{FixDisposition, LocationFilter, Redundancy};
    use crate::model::{Fix, GpsPoint, MissionId};
    use crate::settings::Settings;

    fn stored(fix: Fix) -> GpsPoint {
        GpsPoint {
            mission: MissionId(0),
            fix,
        }
    }

    #[test]
    fn stale_fixes() {
        let filter = LocationFilter::default();
        let now = datetime!(2021-05-24 12:00 UTC);
        let p = Point::new(-149.9, 61.2);

        let old = Fix::basic(p, now - Duration::seconds(5));
        assert_eq!(FixDisposition::Stale, filter.accept(&old, None, now));
        let edge = Fix::basic(p, now - Duration::SECOND);
        assert_eq!(FixDisposition::Stale, filter.accept(&edge, None, now));
        let fresh = Fix::basic(p, now - Duration::milliseconds(400));
        assert_eq!(FixDisposition::New, filter.accept(&fresh, None, now));
    }

    #[test]
    fn redundant_fixes() {
        let filter = LocationFilter::default();
        let now = datetime!(2021-05-24 12:00 UTC);
        let p = Point::new(-149.9, 61.2);
        let previous = stored(Fix::basic(p, now).accuracy(10.0));

        let better = Fix::basic(p, now).accuracy(5.0);
        assert_eq!(
            FixDisposition::Redundant(Redundancy::Improved),
            filter.accept(&better, Some(&previous), now)
        );
        let worse = Fix::basic(p, now).accuracy(20.0);
        assert_eq!(
            FixDisposition::Redundant(Redundancy::Discarded),
            filter.accept(&worse, Some(&previous), now)
        );
        let same = Fix::basic(p, now).accuracy(10.0);
        assert_eq!(
            FixDisposition::Redundant(Redundancy::Discarded),
            filter.accept(&same, Some(&previous), now)
        );
        let earlier = Fix::basic(p, now - Duration::milliseconds(200)).accuracy(1.0);
        assert_eq!(
            FixDisposition::Redundant(Redundancy::Discarded),
            filter.accept(&earlier, Some(&previous), now)
        );
        let later = Fix::basic(p, now + Duration::SECOND).accuracy(50.0);
        assert_eq!(
            FixDisposition::New,
            filter.accept(&later, Some(&previous), now)
        );
    }

    #[test]
    fn duplicate_tolerance() {
        let settings = Settings {
            duplicate_tolerance_ms: 5,
            ..Settings::default()
        };
        let filter = LocationFilter::new(&settings);
        let now = datetime!(2021-05-24 12:00 UTC);
        let p = Point::new(-149.9, 61.2);
        let previous = stored(Fix::basic(p, now).accuracy(10.0));

        let close = Fix::basic(p, now + Duration::milliseconds(3)).accuracy(4.0);
        assert_eq!(
            FixDisposition::Redundant(Redundancy::Improved),
            filter.classify(&close, Some(&previous))
        );
        let apart = Fix::basic(p, now + Duration::milliseconds(30)).accuracy(40.0);
        assert_eq!(FixDisposition::New, filter.classify(&apart, Some(&previous)));
    }
}
