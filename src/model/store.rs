//! Persistent store API

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;

use super::entities::*;
use crate::error::SurveyError;

/// Who owns a unique id counter: the mission properties or one feature
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IdOwner<'a> {
    MissionProperty,
    Feature(&'a str),
}

/// Storage of all the entities of one survey
pub trait SurveyStore {
    fn insert_mission(&mut self, mission: Mission) -> MissionId;
    fn missions(&self) -> Vec<MissionId>;

    fn insert_gps_point(&mut self, point: GpsPoint) -> GpsPointId;
    fn gps_point(&self, id: GpsPointId) -> Option<&GpsPoint>;
    fn gps_point_mut(&mut self, id: GpsPointId) -> Option<&mut GpsPoint>;
    fn gps_points(&self) -> Vec<GpsPointId>;

    fn insert_mission_property(&mut self, property: MissionProperty) -> MissionPropertyId;
    fn mission_property(&self, id: MissionPropertyId) -> Option<&MissionProperty>;
    fn mission_property_mut(&mut self, id: MissionPropertyId) -> Option<&mut MissionProperty>;
    fn mission_properties(&self) -> Vec<MissionPropertyId>;

    fn insert_observation(&mut self, observation: Observation) -> ObservationId;
    fn observation(&self, id: ObservationId) -> Option<&Observation>;
    fn observation_mut(&mut self, id: ObservationId) -> Option<&mut Observation>;
    fn observations(&self) -> Vec<ObservationId>;

    /// Persist all pending changes
    fn save(&mut self) -> Result<(), SurveyError>;

    /// Points of a mission, oldest first
    fn mission_gps_points(&self, mission: MissionId) -> Vec<GpsPointId> {
        let mut points: Vec<(OffsetDateTime, GpsPointId)> = self
            .gps_points()
            .into_iter()
            .filter_map(|id| self.gps_point(id).map(|p| (p, id)))
            .filter(|(p, _)| p.mission == mission)
            .map(|(p, id)| (p.time(), id))
            .collect();
        points.sort();
        points.into_iter().map(|(_, id)| id).collect()
    }

    /// Points with `start <= time <= end`, oldest first
    fn gps_points_between(&self, start: OffsetDateTime, end: OffsetDateTime) -> Vec<GpsPointId> {
        let mut points: Vec<(OffsetDateTime, GpsPointId)> = self
            .gps_points()
            .into_iter()
            .filter_map(|id| self.gps_point(id).map(|p| (p.time(), id)))
            .filter(|(t, _)| start <= *t && *t <= end)
            .collect();
        points.sort();
        points.into_iter().map(|(_, id)| id).collect()
    }

    fn mission_property_time(&self, id: MissionPropertyId) -> Option<OffsetDateTime> {
        match &self.mission_property(id)?.anchor {
            Anchor::Gps(point) => self.gps_point(*point).map(|p| p.time()),
            Anchor::Adhoc(adhoc) => Some(adhoc.time),
        }
    }

    /// Properties of a mission, oldest first
    fn mission_properties_of(&self, mission: MissionId) -> Vec<MissionPropertyId> {
        let mut props: Vec<(OffsetDateTime, MissionPropertyId)> = self
            .mission_properties()
            .into_iter()
            .filter(|id| {
                self.mission_property(*id)
                    .map(|p| p.mission == mission)
                    .unwrap_or(false)
            })
            .filter_map(|id| self.mission_property_time(id).map(|t| (t, id)))
            .collect();
        props.sort();
        props.into_iter().map(|(_, id)| id).collect()
    }

    /// Most recent property of the whole survey
    fn last_mission_property(&self) -> Option<MissionPropertyId> {
        self.mission_properties()
            .into_iter()
            .filter_map(|id| self.mission_property_time(id).map(|t| (t, id)))
            .max()
            .map(|(_, id)| id)
    }

    fn observations_of(&self, feature: &str) -> Vec<ObservationId> {
        self.observations()
            .into_iter()
            .filter(|id| {
                self.observation(*id)
                    .map(|o| o.feature == feature)
                    .unwrap_or(false)
            })
            .collect()
    }

    fn mission_observations(&self, mission: MissionId) -> Vec<ObservationId> {
        self.observations()
            .into_iter()
            .filter(|id| {
                self.observation(*id)
                    .map(|o| o.mission == mission)
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Everything that holds a reference to the point
    fn dependents_of(&self, point: GpsPointId) -> Vec<EntityRef> {
        let mut deps = vec![];
        for id in self.mission_properties() {
            if let Some(Anchor::Gps(p)) = self.mission_property(id).map(|mp| &mp.anchor) {
                if *p == point {
                    deps.push(EntityRef::MissionProperty(id));
                }
            }
        }
        for id in self.observations() {
            if let Some(p) = self.observation(id).and_then(|o| o.location.gps_point()) {
                if p == point {
                    deps.push(EntityRef::Observation(id));
                }
            }
        }
        deps
    }

    /// Highest integer value stored in `attribute`
    fn max_attribute(&self, owner: IdOwner, attribute: &str) -> Option<i64> {
        match owner {
            IdOwner::MissionProperty => self
                .mission_properties()
                .into_iter()
                .filter_map(|id| self.mission_property(id))
                .filter_map(|mp| mp.attributes.get(attribute).and_then(|v| v.as_integer()))
                .max(),
            IdOwner::Feature(feature) => self
                .observations_of(feature)
                .into_iter()
                .filter_map(|id| self.observation(id))
                .filter_map(|o| o.attributes.get(attribute).and_then(|v| v.as_integer()))
                .max(),
        }
    }
}

/// Arena backed store, optionally persisted as a YAML snapshot
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MemoryStore {
    missions: Vec<Mission>,
    gps_points: Vec<GpsPoint>,
    mission_properties: Vec<MissionProperty>,
    observations: Vec<Observation>,
    #[serde(skip)]
    path: Option<PathBuf>,
    #[serde(skip)]
    saves: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a snapshot file, starting empty when it does not exist yet
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SurveyError> {
        let path = path.as_ref();
        let mut store = if path.exists() {
            let text = fs::read_to_string(path).map_err(|e| {
                SurveyError::PersistenceFailure(format!("Failed on read {}: {}", path.display(), e))
            })?;
            serde_yaml::from_str::<MemoryStore>(&text)
                .map_err(|e| SurveyError::PersistenceFailure(e.to_string()))?
        } else {
            MemoryStore::default()
        };
        store.path = Some(path.to_path_buf());

        Ok(store)
    }

    /// Number of successful saves
    pub fn saves(&self) -> usize {
        self.saves
    }
}

impl SurveyStore for MemoryStore {
    fn insert_mission(&mut self, mission: Mission) -> MissionId {
        self.missions.push(mission);
        MissionId(self.missions.len() - 1)
    }

    fn missions(&self) -> Vec<MissionId> {
        (0..self.missions.len()).map(MissionId).collect()
    }

    fn insert_gps_point(&mut self, point: GpsPoint) -> GpsPointId {
        self.gps_points.push(point);
        GpsPointId(self.gps_points.len() - 1)
    }

    fn gps_point(&self, id: GpsPointId) -> Option<&GpsPoint> {
        self.gps_points.get(id.0)
    }

    fn gps_point_mut(&mut self, id: GpsPointId) -> Option<&mut GpsPoint> {
        self.gps_points.get_mut(id.0)
    }

    fn gps_points(&self) -> Vec<GpsPointId> {
        (0..self.gps_points.len()).map(GpsPointId).collect()
    }

    fn insert_mission_property(&mut self, property: MissionProperty) -> MissionPropertyId {
        self.mission_properties.push(property);
        MissionPropertyId(self.mission_properties.len() - 1)
    }

    fn mission_property(&self, id: MissionPropertyId) -> Option<&MissionProperty> {
        self.mission_properties.get(id.0)
    }

    fn mission_property_mut(&mut self, id: MissionPropertyId) -> Option<&mut MissionProperty> {
        self.mission_properties.get_mut(id.0)
    }

    fn mission_properties(&self) -> Vec<MissionPropertyId> {
        (0..self.mission_properties.len())
            .map(MissionPropertyId)
            .collect()
    }

    fn insert_observation(&mut self, observation: Observation) -> ObservationId {
        self.observations.push(observation);
        ObservationId(self.observations.len() - 1)
    }

    fn observation(&self, id: ObservationId) -> Option<&Observation> {
        self.observations.get(id.0)
    }

    fn observation_mut(&mut self, id: ObservationId) -> Option<&mut Observation> {
        self.observations.get_mut(id.0)
    }

    fn observations(&self) -> Vec<ObservationId> {
        (0..self.observations.len()).map(ObservationId).collect()
    }

    fn save(&mut self) -> Result<(), SurveyError> {
        if let Some(path) = &self.path {
            let yaml = serde_yaml::to_string(&*self)
                .map_err(|e| SurveyError::PersistenceFailure(e.to_string()))?;
            fs::write(path, yaml).map_err(|e| {
                SurveyError::PersistenceFailure(format!(
                    "Failed on write {}: {}",
                    path.display(),
                    e
                ))
            })?;
            debug!(path = %path.display(), "survey snapshot written");
        }
        self.saves += 1;

        Ok(())
    }
}
