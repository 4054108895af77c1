//! Track logs: the GPS path of a mission split by observing state

use crate::model::{GpsPointId, MissionId};

pub mod builder;
pub mod gpx;


pub use builder::TrackLogBuilder;
pub use self::gpx::GpxGenerator;

/// Consecutive points logged under one observing state
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    pub observing: bool,
    /// Oldest first; the last point is shared with the next segment
    pub points: Vec<GpsPointId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackLog {
    pub mission: MissionId,
    pub segments: Vec<Segment>,
}
