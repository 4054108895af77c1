//! Track log builder API

use crate::model::{MissionId, SurveyStore};

use super::{Segment, TrackLog};

pub struct TrackLogBuilder {
    pub mission: MissionId,
    /// Segments with fewer points are left out
    pub min_points: usize,
}

impl TrackLogBuilder {
    pub fn new(mission: MissionId) -> Self {
        Self {
            mission,
            min_points: 1,
        }
    }

    pub fn min_points(&mut self, min: usize) -> &mut Self {
        self.min_points = if min < 1 { 1 } else { min };

        self
    }

    /// Join the points of the mission into segments.
    ///
    /// A new segment starts at the first point at or after each mission
    /// property and takes the property's observing state; points logged
    /// before any property are not observing.
    pub fn build<S: SurveyStore + ?Sized>(&self, store: &S) -> TrackLog {
        let mut properties = store
            .mission_properties_of(self.mission)
            .into_iter()
            .filter_map(|id| {
                let time = store.mission_property_time(id)?;
                Some((time, store.mission_property(id)?.observing))
            })
            .peekable();

        let mut segments = vec![];
        let mut current: Option<Segment> = None;
        let mut observing = false;

        for id in store.mission_gps_points(self.mission) {
            let time = match store.gps_point(id) {
                Some(p) => p.time(),
                None => continue,
            };

            let mut boundary = false;
            while let Some((_, state)) = properties.next_if(|(t, _)| *t <= time) {
                observing = state;
                boundary = true;
            }

            match current.as_mut() {
                Some(segment) if !boundary => segment.points.push(id),
                _ => {
                    if let Some(mut segment) = current.take() {
                        segment.points.push(id);
                        segments.push(segment);
                    }
                    current = Some(Segment {
                        observing,
                        points: vec![id],
                    });
                }
            }
        }
        if let Some(segment) = current {
            segments.push(segment);
        }

        segments.retain(|s| s.points.len() >= self.min_points);

        TrackLog {
            mission: self.mission,
            segments,
        }
    }
}
