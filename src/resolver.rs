//! Observation resolver
//!
//! Turns observation requests into entities once everything they wait for
//! (permission, a fresh fix, the user's choice of feature) has arrived.

use std::collections::HashMap;

use geo::geometry::Point;
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

use crate::error::SurveyError;
use crate::geometry::{self, AngleDistanceHelper};
use crate::location::Authorization;
use crate::mission::Pending;
use crate::model::*;
use crate::protocol::SurveyProtocol;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    MissionProperty,
    Gps,
    AngleDistance,
    MapTouch,
}

const KINDS: [TriggerKind; 4] = [
    TriggerKind::MissionProperty,
    TriggerKind::Gps,
    TriggerKind::AngleDistance,
    TriggerKind::MapTouch,
];

/// What started an observation
#[derive(Clone, Debug, PartialEq)]
pub enum Trigger {
    /// Record the mission state at the next fix
    MissionProperty,
    /// Observe a feature at the next fix
    Gps { feature: String },
    /// Observe a feature seen from the next fix; angle and distance are in
    /// the feature's user conventions
    AngleDistance {
        feature: String,
        angle: f64,
        distance: f64,
    },
    /// Place something where the map was touched
    MapTouch { coordinates: Point },
}

impl Trigger {
    pub fn kind(&self) -> TriggerKind {
        match self {
            Trigger::MissionProperty => TriggerKind::MissionProperty,
            Trigger::Gps { .. } => TriggerKind::Gps,
            Trigger::AngleDistance { .. } => TriggerKind::AngleDistance,
            Trigger::MapTouch { .. } => TriggerKind::MapTouch,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Ticket {
    pub id: u64,
    pub kind: TriggerKind,
}

/// Something a map touch can create
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Placement {
    Feature(String),
    MissionProperty,
}

/// What a request is still waiting for
#[derive(Clone, Debug, PartialEq)]
pub enum Need {
    Authorization,
    /// Location updates must be cycled to force a fresh fix
    Location,
    FeatureChoice(Vec<Placement>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Requested {
    pub ticket: Ticket,
    pub needs: Vec<Need>,
    pub ready: Option<Ready>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    pub ticket: Ticket,
    pub trigger: Trigger,
    /// When the request was made; a map touch takes the time of the fix
    /// that completes it
    pub time: OffsetDateTime,
    pub choices: Vec<Placement>,
    pub chosen: Option<Placement>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ResolvedLocation {
    Gps(GpsPointId),
    AngleDistance {
        observer: GpsPointId,
        angle: f64,
        distance: f64,
    },
    Adhoc {
        coordinates: Point,
        time: OffsetDateTime,
    },
}

/// A request with everything it needs
#[derive(Clone, Debug, PartialEq)]
pub struct Ready {
    pub ticket: Ticket,
    pub placement: Placement,
    pub location: ResolvedLocation,
}

/// Result of turning a [`Ready`] request into an entity
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Finalized {
    pub entity: EntityRef,
    /// `false` when an existing mission property at the same instant was
    /// updated instead
    pub created: bool,
    /// The observer had no usable course; north was taken as dead ahead
    pub heading_assumed: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum IdKey {
    MissionProperty,
    Feature(String),
}

/// Per entity unique id counters
#[derive(Clone, Debug, Default)]
pub struct UniqueIds {
    current: HashMap<IdKey, i64>,
}

impl UniqueIds {
    /// Start every counter at the largest stored value
    pub fn initialize<S: SurveyStore + ?Sized>(&mut self, protocol: &SurveyProtocol, store: &S) {
        self.current.clear();
        if let Some(attr) = protocol.mission.as_ref().and_then(|m| m.unique_id_attribute()) {
            let max = store.max_attribute(IdOwner::MissionProperty, &attr.name);
            self.current.insert(IdKey::MissionProperty, max.unwrap_or(0));
        }
        for feature in &protocol.features {
            if let Some(attr) = feature.unique_id_attribute() {
                let max = store.max_attribute(IdOwner::Feature(&feature.name), &attr.name);
                self.current
                    .insert(IdKey::Feature(feature.name.clone()), max.unwrap_or(0));
            }
        }
    }

    fn next(&mut self, key: IdKey) -> i64 {
        let id = self.current.entry(key).or_insert(0);
        *id += 1;
        *id
    }
}

#[derive(Debug, Default)]
pub struct ObservationResolver {
    slots: HashMap<TriggerKind, Pending<Request>>,
    last_ticket: u64,
    pub unique_ids: UniqueIds,
}

impl ObservationResolver {
    pub fn pending(&self, kind: TriggerKind) -> Option<&Pending<Request>> {
        self.slots.get(&kind).filter(|p| !p.is_none())
    }

    pub fn has_pending(&self) -> bool {
        self.slots.values().any(|p| !p.is_none())
    }

    pub fn request(
        &mut self,
        trigger: Trigger,
        authorization: Authorization,
        now: OffsetDateTime,
        protocol: &SurveyProtocol,
    ) -> Result<Requested, SurveyError> {
        let choices = validate(&trigger, authorization, protocol)?;
        self.last_ticket += 1;
        let ticket = Ticket {
            id: self.last_ticket,
            kind: trigger.kind(),
        };
        let chosen = if choices.len() == 1 {
            choices.first().cloned()
        } else {
            None
        };

        let request = Request {
            ticket,
            trigger,
            time: now,
            choices,
            chosen,
        };
        if let Some(previous) = self.slots.remove(&ticket.kind).and_then(|p| p.request().cloned()) {
            debug!(ticket = previous.ticket.id, "pending request superseded");
        }
        self.place(request, authorization)
    }

    fn place(
        &mut self,
        mut request: Request,
        authorization: Authorization,
    ) -> Result<Requested, SurveyError> {
        let ticket = request.ticket;

        if authorization == Authorization::Undetermined {
            self.slots
                .insert(ticket.kind, Pending::AwaitingAuthorization(request));
            return Ok(Requested {
                ticket,
                needs: vec![Need::Authorization],
                ready: None,
            });
        }

        if let Trigger::MapTouch { coordinates } = request.trigger {
            if authorization == Authorization::Denied {
                if !request.choices.contains(&Placement::MissionProperty) {
                    request.choices.push(Placement::MissionProperty);
                    request.chosen = None;
                }
                if let Some(placement) = request.chosen.clone() {
                    return Ok(Requested {
                        ticket,
                        needs: vec![],
                        ready: Some(Ready {
                            ticket,
                            placement,
                            location: ResolvedLocation::Adhoc {
                                coordinates,
                                time: request.time,
                            },
                        }),
                    });
                }
                let choices = request.choices.clone();
                self.slots
                    .insert(ticket.kind, Pending::AwaitingFeatureChoice(request));
                return Ok(Requested {
                    ticket,
                    needs: vec![Need::FeatureChoice(choices)],
                    ready: None,
                });
            }

            let mut needs = vec![Need::Location];
            if request.chosen.is_none() {
                needs.push(Need::FeatureChoice(request.choices.clone()));
            }
            self.slots
                .insert(ticket.kind, Pending::AwaitingLocation(request));
            return Ok(Requested {
                ticket,
                needs,
                ready: None,
            });
        }

        if authorization == Authorization::Denied {
            return Err(SurveyError::PermissionDenied);
        }
        self.slots
            .insert(ticket.kind, Pending::AwaitingLocation(request));
        Ok(Requested {
            ticket,
            needs: vec![Need::Location],
            ready: None,
        })
    }

    /// Replay requests that were waiting for permission
    pub fn authorization_changed(
        &mut self,
        authorization: Authorization,
    ) -> Vec<Result<Requested, SurveyError>> {
        if authorization == Authorization::Undetermined {
            return vec![];
        }

        let mut results = vec![];
        for kind in KINDS {
            let slot = self.slots.entry(kind).or_default();
            if let Pending::AwaitingAuthorization(_) = slot {
                if let Pending::AwaitingAuthorization(request) = slot.take() {
                    results.push(self.place(request, authorization));
                }
            }
        }
        results
    }

    /// Complete everything waiting for a location with this point
    pub fn location_arrived(&mut self, point: GpsPointId, time: OffsetDateTime) -> Vec<Ready> {
        let mut ready = vec![];
        for kind in KINDS {
            let slot = self.slots.entry(kind).or_default();
            if !matches!(slot, Pending::AwaitingLocation(_)) {
                continue;
            }
            let mut request = match slot.take() {
                Pending::AwaitingLocation(r) => r,
                _ => continue,
            };

            let location = match &request.trigger {
                Trigger::MissionProperty | Trigger::Gps { .. } => ResolvedLocation::Gps(point),
                Trigger::AngleDistance {
                    angle, distance, ..
                } => ResolvedLocation::AngleDistance {
                    observer: point,
                    angle: *angle,
                    distance: *distance,
                },
                Trigger::MapTouch { coordinates } => {
                    let coordinates = *coordinates;
                    request.time = time;
                    match request.chosen.clone() {
                        Some(_) => ResolvedLocation::Adhoc { coordinates, time },
                        None => {
                            self.slots
                                .insert(kind, Pending::AwaitingFeatureChoice(request));
                            continue;
                        }
                    }
                }
            };

            let placement = match &request.trigger {
                Trigger::Gps { feature } | Trigger::AngleDistance { feature, .. } => {
                    Placement::Feature(feature.clone())
                }
                Trigger::MissionProperty => Placement::MissionProperty,
                Trigger::MapTouch { .. } => match request.chosen {
                    Some(p) => p,
                    None => continue,
                },
            };
            ready.push(Ready {
                ticket: request.ticket,
                placement,
                location,
            });
        }
        ready
    }

    /// The user picked what to place at a map touch
    pub fn choose(
        &mut self,
        ticket: Ticket,
        placement: Placement,
    ) -> Result<Option<Ready>, SurveyError> {
        let slot = self.slots.entry(ticket.kind).or_default();
        let request = match slot.request_mut() {
            Some(r) if r.ticket == ticket => r,
            _ => return Ok(None),
        };
        if !request.choices.contains(&placement) {
            return Err(match placement {
                Placement::Feature(name) => SurveyError::UnknownFeature(name),
                Placement::MissionProperty => SurveyError::PermissionDenied,
            });
        }
        request.chosen = Some(placement.clone());

        if let Pending::AwaitingFeatureChoice(_) = slot {
            if let Pending::AwaitingFeatureChoice(request) = slot.take() {
                if let Trigger::MapTouch { coordinates } = request.trigger {
                    return Ok(Some(Ready {
                        ticket,
                        placement,
                        location: ResolvedLocation::Adhoc {
                            coordinates,
                            time: request.time,
                        },
                    }));
                }
            }
        }
        Ok(None)
    }

    pub fn cancel(&mut self, ticket: Ticket) -> bool {
        let slot = self.slots.entry(ticket.kind).or_default();
        let found = slot.request().map_or(false, |r| r.ticket == ticket);
        if found {
            slot.take();
        }
        found
    }

    /// Drop requests waiting for a location, returning their tickets
    pub fn abandon_awaiting_location(&mut self) -> Vec<Ticket> {
        let mut tickets = vec![];
        for slot in self.slots.values_mut() {
            match slot.take() {
                Pending::AwaitingLocation(r) => tickets.push(r.ticket),
                other => *slot = other,
            }
        }
        tickets
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Create the entity for a completed request
    pub fn finalize<S: SurveyStore + ?Sized>(
        &mut self,
        ready: Ready,
        protocol: &SurveyProtocol,
        store: &mut S,
        mission: MissionId,
        observing: bool,
        map: Option<&str>,
    ) -> Result<Finalized, SurveyError> {
        match ready.placement {
            Placement::MissionProperty => {
                let anchor = match ready.location {
                    ResolvedLocation::Gps(point) => Anchor::Gps(point),
                    ResolvedLocation::Adhoc { coordinates, time } => Anchor::Adhoc(AdhocLocation {
                        coordinates,
                        time,
                        map: map.map(str::to_string),
                    }),
                    ResolvedLocation::AngleDistance { observer, .. } => Anchor::Gps(observer),
                };
                self.finalize_mission_property(anchor, protocol, store, mission, observing)
            }
            Placement::Feature(name) => {
                let feature = protocol
                    .feature(&name)
                    .ok_or_else(|| SurveyError::UnknownFeature(name.clone()))?;

                let mut heading_assumed = false;
                let location = match ready.location {
                    ResolvedLocation::Gps(point) => ObservationLocation::Gps(point),
                    ResolvedLocation::Adhoc { coordinates, time } => {
                        ObservationLocation::Adhoc(AdhocLocation {
                            coordinates,
                            time,
                            map: map.map(str::to_string),
                        })
                    }
                    ResolvedLocation::AngleDistance {
                        observer,
                        angle,
                        distance,
                    } => {
                        let method = feature.angle_distance().ok_or_else(|| {
                            SurveyError::invalid(format!(
                                "feature `{}` does not allow angle/distance locations",
                                feature.name
                            ))
                        })?;
                        let heading = match store.gps_point(observer).and_then(|p| p.fix.heading()) {
                            Some(h) => h,
                            None => {
                                warn!("observer heading unknown, assuming north");
                                heading_assumed = true;
                                0.0
                            }
                        };
                        let helper = AngleDistanceHelper::new(method);
                        ObservationLocation::AngleDistance {
                            observer,
                            location: helper.location(angle, distance, heading),
                        }
                    }
                };

                let mut attributes = feature.defaults.clone();
                if let Some(attr) = feature.unique_id_attribute() {
                    let id = self.unique_ids.next(IdKey::Feature(feature.name.clone()));
                    attributes.insert(attr.name.clone(), AttributeValue::Integer(id));
                }

                let id = store.insert_observation(Observation {
                    mission,
                    feature: feature.name.clone(),
                    location,
                    attributes,
                });
                debug!(feature = %feature.name, id = id.0, "observation added");
                Ok(Finalized {
                    entity: EntityRef::Observation(id),
                    created: true,
                    heading_assumed,
                })
            }
        }
    }

    fn finalize_mission_property<S: SurveyStore + ?Sized>(
        &mut self,
        anchor: Anchor,
        protocol: &SurveyProtocol,
        store: &mut S,
        mission: MissionId,
        observing: bool,
    ) -> Result<Finalized, SurveyError> {
        if let Anchor::Gps(point) = &anchor {
            let existing = store.dependents_of(*point).into_iter().find_map(|d| match d {
                EntityRef::MissionProperty(id) => Some(id),
                EntityRef::Observation(_) => None,
            });
            if let Some(id) = existing {
                if let Some(mp) = store.mission_property_mut(id) {
                    mp.observing = observing;
                }
                debug!(id = id.0, "mission property at the same instant updated");
                return Ok(Finalized {
                    entity: EntityRef::MissionProperty(id),
                    created: false,
                    heading_assumed: false,
                });
            }
        }

        let definition = protocol.mission.as_ref();
        let mut attributes = match store
            .last_mission_property()
            .and_then(|id| store.mission_property(id))
        {
            Some(template) => template.attributes.clone(),
            None => definition.map(|d| d.defaults.clone()).unwrap_or_default(),
        };
        if let Some(attr) = definition.and_then(|d| d.unique_id_attribute()) {
            let id = self.unique_ids.next(IdKey::MissionProperty);
            attributes.insert(attr.name.clone(), AttributeValue::Integer(id));
        }

        let id = store.insert_mission_property(MissionProperty {
            mission,
            anchor,
            observing,
            attributes,
        });
        debug!(id = id.0, observing, "mission property added");
        Ok(Finalized {
            entity: EntityRef::MissionProperty(id),
            created: true,
            heading_assumed: false,
        })
    }
}

/// Check a trigger against the protocol, returning the map touch choices
fn validate(
    trigger: &Trigger,
    authorization: Authorization,
    protocol: &SurveyProtocol,
) -> Result<Vec<Placement>, SurveyError> {
    match trigger {
        Trigger::MissionProperty => Ok(vec![]),
        Trigger::Gps { feature } => {
            let f = protocol
                .feature(feature)
                .ok_or_else(|| SurveyError::UnknownFeature(feature.clone()))?;
            if !f.allows_gps() && f.angle_distance().is_none() {
                return Err(SurveyError::invalid(format!(
                    "feature `{}` cannot be located with GPS",
                    feature
                )));
            }
            Ok(vec![])
        }
        Trigger::AngleDistance { feature, .. } => {
            let f = protocol
                .feature(feature)
                .ok_or_else(|| SurveyError::UnknownFeature(feature.clone()))?;
            if f.angle_distance().is_none() {
                return Err(SurveyError::invalid(format!(
                    "feature `{}` does not allow angle/distance locations",
                    feature
                )));
            }
            Ok(vec![])
        }
        Trigger::MapTouch { .. } => {
            let mut choices: Vec<Placement> = protocol
                .locatable_with_map_touch()
                .into_iter()
                .map(|f| Placement::Feature(f.name.clone()))
                .collect();
            if authorization == Authorization::Denied {
                choices.push(Placement::MissionProperty);
            }
            if choices.is_empty() {
                return Err(SurveyError::invalid(
                    "no feature can be located by touching the map",
                ));
            }
            Ok(choices)
        }
    }
}

/// Where the observer was when an observation was made
#[derive(Clone, Debug, PartialEq)]
pub enum ObserverLocation {
    Unique(Point),
    /// Several points fall in the matching window; nothing is picked
    Ambiguous(Vec<GpsPointId>),
    Unknown,
}

/// Resolved coordinates of the observed feature
pub fn location_of_feature<S: SurveyStore + ?Sized>(
    store: &S,
    observation: &Observation,
) -> Option<Point> {
    match &observation.location {
        ObservationLocation::Gps(point) => store.gps_point(*point).map(|p| p.coordinates()),
        ObservationLocation::Adhoc(adhoc) => Some(adhoc.coordinates),
        ObservationLocation::AngleDistance { observer, location } => store
            .gps_point(*observer)
            .map(|p| geometry::feature_location(p.coordinates(), location)),
    }
}

/// Observer position; map touches are matched to the GPS point recorded at
/// the same instant, within `window`
pub fn location_of_observer<S: SurveyStore + ?Sized>(
    store: &S,
    observation: &Observation,
    window: Duration,
) -> ObserverLocation {
    let point = match &observation.location {
        ObservationLocation::Gps(point) => Some(*point),
        ObservationLocation::AngleDistance { observer, .. } => Some(*observer),
        ObservationLocation::Adhoc(adhoc) => {
            let candidates = store.gps_points_between(adhoc.time - window, adhoc.time + window);
            match candidates.len() {
                0 => None,
                1 => candidates.first().copied(),
                _ => {
                    warn!(count = candidates.len(), "ambiguous observer location");
                    return ObserverLocation::Ambiguous(candidates);
                }
            }
        }
    };

    match point.and_then(|p| store.gps_point(p)) {
        Some(p) => ObserverLocation::Unique(p.coordinates()),
        None => ObserverLocation::Unknown,
    }
}

/// Rewrite an angle/distance observation from values in user conventions
pub fn update_angle_distance<S: SurveyStore + ?Sized>(
    store: &mut S,
    protocol: &SurveyProtocol,
    id: ObservationId,
    user_angle: f64,
    user_distance: f64,
) -> Result<(), SurveyError> {
    let observation = store
        .observation_mut(id)
        .ok_or_else(|| SurveyError::UnknownFeature(format!("observation {}", id.0)))?;
    let method = protocol
        .feature(&observation.feature)
        .and_then(|f| f.angle_distance())
        .ok_or_else(|| SurveyError::UnknownFeature(observation.feature.clone()))?;

    match &mut observation.location {
        ObservationLocation::AngleDistance { location, .. } => {
            let helper = AngleDistanceHelper::new(method);
            *location = helper.location(user_angle, user_distance, location.direction);
            Ok(())
        }
        _ => Err(SurveyError::invalid(format!(
            "observation {} has no angle/distance location",
            id.0
        ))),
    }
}

/// Angle and distance of an observation in its feature's user conventions,
/// with the perpendicular distance to the observer's path in meters
pub fn angle_distance_of<S: SurveyStore + ?Sized>(
    store: &S,
    protocol: &SurveyProtocol,
    id: ObservationId,
) -> Option<(f64, f64, f64)> {
    let observation = store.observation(id)?;
    let method = protocol.feature(&observation.feature)?.angle_distance()?;
    match &observation.location {
        ObservationLocation::AngleDistance { location, .. } => {
            let helper = AngleDistanceHelper::new(method);
            Some((
                helper.user_angle(location),
                helper.user_distance(location),
                geometry::perpendicular_meters(location),
            ))
        }
        _ => None,
    }
}

#[cfg(test)]
pub mod tests {
    use geo::Point;
    use time::macros::datetime;
    use time::Duration;

    use super::*;
    use crate::model::MemoryStore;

    fn protocol() -> Result<SurveyProtocol, String> {
        let yaml = r#"
meta-name: NPS-Protocol-Specification
meta-version: 2
name: Test
mission:
  attributes: [{name: Id, type: 0}, {name: Observer, type: 700}]
  defaults: {Observer: RS}
features:
  - name: Birds
    attributes: [{name: Tag, type: 0}, {name: Kind, type: 700}]
    defaults: {Kind: raven}
    locations: [{type: gps}, {type: mapTouch}]
  - name: Cabins
    locations: [{type: mapTouch}]
  - name: Sheep
    locations: [{type: angleDistance, deadAhead: 0, direction: cw, units: yards}]
"#;
        SurveyProtocol::parse(yaml).map_err(|e| e.to_string())
    }

    fn at() -> OffsetDateTime {
        datetime!(2021-05-24 12:00 UTC)
    }

    #[test]
    fn gps_request_waits_for_location() -> Result<(), String> {
        let sp = protocol()?;
        let mut resolver = ObservationResolver::default();

        let trigger = Trigger::Gps {
            feature: "Birds".to_string(),
        };
        let requested = resolver
            .request(trigger, Authorization::ForegroundOnly, at(), &sp)
            .map_err(|e| e.to_string())?;
        assert_eq!(vec![Need::Location], requested.needs);

        let ready = resolver.location_arrived(GpsPointId(4), at());
        assert_eq!(1, ready.len());
        assert_eq!(Placement::Feature("Birds".to_string()), ready[0].placement);
        assert_eq!(ResolvedLocation::Gps(GpsPointId(4)), ready[0].location);
        assert!(!resolver.has_pending());

        Ok(())
    }

    #[test]
    fn requests_supersede_same_kind() -> Result<(), String> {
        let sp = protocol()?;
        let mut resolver = ObservationResolver::default();
        let first = resolver
            .request(
                Trigger::Gps {
                    feature: "Birds".to_string(),
                },
                Authorization::ForegroundOnly,
                at(),
                &sp,
            )
            .map_err(|e| e.to_string())?;
        let second = resolver
            .request(
                Trigger::Gps {
                    feature: "Birds".to_string(),
                },
                Authorization::ForegroundOnly,
                at(),
                &sp,
            )
            .map_err(|e| e.to_string())?;
        resolver
            .request(Trigger::MissionProperty, Authorization::ForegroundOnly, at(), &sp)
            .map_err(|e| e.to_string())?;

        assert!(!resolver.cancel(first.ticket));
        let ready = resolver.location_arrived(GpsPointId(0), at());
        assert_eq!(2, ready.len());
        assert_eq!(Placement::MissionProperty, ready[0].placement);
        assert_eq!(second.ticket, ready[1].ticket);

        Ok(())
    }

    #[test]
    fn permission_rules() -> Result<(), String> {
        let sp = protocol()?;
        let mut resolver = ObservationResolver::default();
        let trigger = Trigger::Gps {
            feature: "Birds".to_string(),
        };

        assert_eq!(
            Err(SurveyError::PermissionDenied),
            resolver.request(trigger.clone(), Authorization::Denied, at(), &sp)
        );
        assert_eq!(
            Err(SurveyError::UnknownFeature("Moose".to_string())),
            resolver.request(
                Trigger::Gps {
                    feature: "Moose".to_string()
                },
                Authorization::ForegroundOnly,
                at(),
                &sp
            )
        );

        let requested = resolver
            .request(trigger, Authorization::Undetermined, at(), &sp)
            .map_err(|e| e.to_string())?;
        assert_eq!(vec![Need::Authorization], requested.needs);
        assert!(resolver.location_arrived(GpsPointId(0), at()).is_empty());

        let replayed = resolver.authorization_changed(Authorization::ForegroundOnly);
        assert_eq!(1, replayed.len());
        let replayed = replayed[0].clone().map_err(|e| e.to_string())?;
        assert_eq!(requested.ticket, replayed.ticket);
        assert_eq!(vec![Need::Location], replayed.needs);
        assert_eq!(1, resolver.location_arrived(GpsPointId(0), at()).len());

        Ok(())
    }

    #[test]
    fn map_touch_needs_choice_and_fix() -> Result<(), String> {
        let sp = protocol()?;
        let mut resolver = ObservationResolver::default();
        let touched = Point::new(-149.0, 61.0);

        let requested = resolver
            .request(
                Trigger::MapTouch {
                    coordinates: touched,
                },
                Authorization::ForegroundOnly,
                at(),
                &sp,
            )
            .map_err(|e| e.to_string())?;
        assert_eq!(
            vec![
                Need::Location,
                Need::FeatureChoice(vec![
                    Placement::Feature("Birds".to_string()),
                    Placement::Feature("Cabins".to_string())
                ])
            ],
            requested.needs
        );

        let fix_time = at() + Duration::milliseconds(300);
        assert!(resolver.location_arrived(GpsPointId(1), fix_time).is_empty());
        assert!(matches!(
            resolver.pending(TriggerKind::MapTouch),
            Some(Pending::AwaitingFeatureChoice(_))
        ));

        assert_eq!(
            Err(SurveyError::UnknownFeature("Sheep".to_string())),
            resolver.choose(requested.ticket, Placement::Feature("Sheep".to_string()))
        );
        let ready = resolver
            .choose(requested.ticket, Placement::Feature("Cabins".to_string()))
            .map_err(|e| e.to_string())?
            .ok_or("not ready")?;
        assert_eq!(
            ResolvedLocation::Adhoc {
                coordinates: touched,
                time: fix_time
            },
            ready.location
        );

        Ok(())
    }

    #[test]
    fn map_touch_without_gps() -> Result<(), String> {
        let sp = protocol()?;
        let mut resolver = ObservationResolver::default();

        let requested = resolver
            .request(
                Trigger::MapTouch {
                    coordinates: Point::new(1.0, 1.0),
                },
                Authorization::Denied,
                at(),
                &sp,
            )
            .map_err(|e| e.to_string())?;
        match &requested.needs[..] {
            [Need::FeatureChoice(choices)] => {
                assert_eq!(3, choices.len());
                assert!(choices.contains(&Placement::MissionProperty));
            }
            other => return Err(format!("unexpected needs {:?}", other)),
        }

        // never chosen: stays pending until canceled
        assert!(resolver.location_arrived(GpsPointId(0), at()).is_empty());
        assert!(resolver.has_pending());
        assert!(resolver.cancel(requested.ticket));
        assert!(!resolver.has_pending());

        Ok(())
    }

    #[test]
    fn finalize_assigns_defaults_and_ids() -> Result<(), String> {
        let sp = protocol()?;
        let mut store = MemoryStore::new();
        let mission = store.insert_mission(Mission { started: at() });
        let point = store.insert_gps_point(GpsPoint {
            mission,
            fix: Fix::basic(Point::new(-149.9, 61.2), at()).course(90.0),
        });

        let mut previous = Attributes::new();
        previous.insert("Tag".to_string(), AttributeValue::Integer(41));
        store.insert_observation(Observation {
            mission,
            feature: "Birds".to_string(),
            location: ObservationLocation::Gps(point),
            attributes: previous,
        });

        let mut resolver = ObservationResolver::default();
        resolver.unique_ids.initialize(&sp, &store);

        let ready = Ready {
            ticket: Ticket {
                id: 1,
                kind: TriggerKind::Gps,
            },
            placement: Placement::Feature("Birds".to_string()),
            location: ResolvedLocation::Gps(point),
        };
        let done = resolver
            .finalize(ready, &sp, &mut store, mission, true, None)
            .map_err(|e| e.to_string())?;
        let id = match done.entity {
            EntityRef::Observation(id) => id,
            other => return Err(format!("unexpected {:?}", other)),
        };
        let obs = store.observation(id).ok_or("missing")?;
        assert_eq!(Some(&AttributeValue::Integer(42)), obs.attributes.get("Tag"));
        assert_eq!(
            Some(&AttributeValue::Text("raven".to_string())),
            obs.attributes.get("Kind")
        );

        let ready = Ready {
            ticket: Ticket {
                id: 2,
                kind: TriggerKind::AngleDistance,
            },
            placement: Placement::Feature("Sheep".to_string()),
            location: ResolvedLocation::AngleDistance {
                observer: point,
                angle: 90.0,
                distance: 100.0,
            },
        };
        let done = resolver
            .finalize(ready, &sp, &mut store, mission, true, None)
            .map_err(|e| e.to_string())?;
        let id = match done.entity {
            EntityRef::Observation(id) => id,
            other => return Err(format!("unexpected {:?}", other)),
        };
        assert!(!done.heading_assumed);
        let obs = store.observation(id).ok_or("missing")?;
        match &obs.location {
            ObservationLocation::AngleDistance { observer, location } => {
                assert_eq!(point, *observer);
                assert_eq!(180.0, location.angle);
                assert_eq!(90.0, location.direction);
                assert!((location.distance - 91.44).abs() < 1e-9);
            }
            other => return Err(format!("unexpected {:?}", other)),
        }
        let feature = location_of_feature(&store, obs).ok_or("no location")?;
        assert!(feature.y() < 61.2);

        let (angle, distance, perpendicular) =
            angle_distance_of(&store, &sp, id).ok_or("no angle/distance")?;
        assert!((angle - 90.0).abs() < 1e-9);
        assert!((distance - 100.0).abs() < 1e-9);
        assert!((perpendicular - 91.44).abs() < 1e-9);

        update_angle_distance(&mut store, &sp, id, 0.0, 50.0).map_err(|e| e.to_string())?;
        let (angle, distance, perpendicular) =
            angle_distance_of(&store, &sp, id).ok_or("no angle/distance")?;
        assert!(angle.abs() < 1e-9);
        assert!((distance - 50.0).abs() < 1e-9);
        assert!(perpendicular < 1e-6);

        Ok(())
    }

    #[test]
    fn mission_property_template_and_same_instant() -> Result<(), String> {
        let sp = protocol()?;
        let mut store = MemoryStore::new();
        let mission = store.insert_mission(Mission { started: at() });
        let point = store.insert_gps_point(GpsPoint {
            mission,
            fix: Fix::basic(Point::new(-149.9, 61.2), at()),
        });
        let mut resolver = ObservationResolver::default();
        resolver.unique_ids.initialize(&sp, &store);

        let ready = Ready {
            ticket: Ticket {
                id: 1,
                kind: TriggerKind::MissionProperty,
            },
            placement: Placement::MissionProperty,
            location: ResolvedLocation::Gps(point),
        };
        let first = resolver
            .finalize(ready.clone(), &sp, &mut store, mission, false, None)
            .map_err(|e| e.to_string())?;
        assert!(first.created);
        let again = resolver
            .finalize(ready, &sp, &mut store, mission, true, None)
            .map_err(|e| e.to_string())?;
        assert!(!again.created);
        assert_eq!(first.entity, again.entity);
        assert_eq!(1, store.mission_properties().len());

        let mp = store
            .mission_property(MissionPropertyId(0))
            .ok_or("missing")?;
        assert!(mp.observing);
        assert_eq!(Some(&AttributeValue::Integer(1)), mp.attributes.get("Id"));
        assert_eq!(
            Some(&AttributeValue::Text("RS".to_string())),
            mp.attributes.get("Observer")
        );

        Ok(())
    }

    #[test]
    fn observer_matching() -> Result<(), String> {
        let mut store = MemoryStore::new();
        let mission = store.insert_mission(Mission { started: at() });
        let here = Point::new(-149.9, 61.2);
        store.insert_gps_point(GpsPoint {
            mission,
            fix: Fix::basic(here, at()),
        });

        let touched = |time| Observation {
            mission,
            feature: "Cabins".to_string(),
            location: ObservationLocation::Adhoc(AdhocLocation {
                coordinates: Point::new(-149.0, 61.0),
                time,
                map: None,
            }),
            attributes: Attributes::new(),
        };
        let window = Duration::milliseconds(1);

        assert_eq!(
            ObserverLocation::Unique(here),
            location_of_observer(&store, &touched(at()), window)
        );
        assert_eq!(
            ObserverLocation::Unknown,
            location_of_observer(&store, &touched(at() + Duration::SECOND), window)
        );

        store.insert_gps_point(GpsPoint {
            mission,
            fix: Fix::basic(here, at() + Duration::microseconds(500)),
        });
        assert!(matches!(
            location_of_observer(&store, &touched(at()), window),
            ObserverLocation::Ambiguous(_)
        ));

        Ok(())
    }
}
