//! GPX generator API

use gpx::{Gpx, GpxVersion, Track, TrackSegment, Waypoint};

use super::{Segment, TrackLog};
use crate::model::SurveyStore;

pub struct GpxGenerator {
    pub tracks: Vec<Track>,
}

impl GpxGenerator {
    pub fn empty() -> Self {
        Self { tracks: vec![] }
    }

    /// One track per segment, described by its observing state
    pub fn add_track_log<S: SurveyStore + ?Sized>(
        &mut self,
        survey: &str,
        log: &TrackLog,
        store: &S,
    ) -> &mut Self {
        for (i, segment) in log.segments.iter().enumerate() {
            let name = format!("{} - mission {} - segment {}", survey, log.mission.0 + 1, i + 1);
            self.tracks.push(segment_track(name, segment, store));
        }

        self
    }

    pub fn generate(self) -> Result<Gpx, String> {
        let mut gpx: Gpx = Default::default();
        gpx.version = GpxVersion::Gpx11;
        gpx.creator = Some("park-observer".to_string());
        gpx.tracks = self.tracks;

        Ok(gpx)
    }
}

fn segment_track<S: SurveyStore + ?Sized>(name: String, segment: &Segment, store: &S) -> Track {
    let mut track = Track::new();
    track.name = Some(name);
    track.description = Some(
        if segment.observing {
            "observing"
        } else {
            "not observing"
        }
        .to_string(),
    );

    let mut tseg = TrackSegment::new();
    for point in segment.points.iter().filter_map(|id| store.gps_point(*id)) {
        let mut wp = Waypoint::new(point.coordinates());

        wp.time = Some(point.time().into());
        wp.elevation = point.fix.altitude;
        wp.speed = point.fix.speed;

        tseg.points.push(wp);
    }
    track.segments.push(tseg);

    track
}
