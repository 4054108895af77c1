//! Survey session: the single owner of all mutable survey state
//!
//! Provider callbacks, user actions and persistence all go through one
//! [`SurveySession`]. Inbound events arrive over [`crate::location::channel`];
//! whatever the display surface has to know about is queued as
//! [`Notification`]s.

use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::error::SurveyError;
use crate::location::{
    Authorization, Clock, Event, EventQueue, FixDisposition, LocationFilter, LocationProvider,
    Redundancy,
};
use crate::mission::{Effect, MissionStateMachine, Pending};
use crate::model::*;
use crate::protocol::SurveyProtocol;
use crate::resolver::{self, ObservationResolver, Placement, Ready, Requested, Ticket, Trigger};
use crate::resolver::{Need, ObserverLocation, TriggerKind};
use crate::settings::Settings;
use crate::totalizer::Totalizer;
use crate::tracklog::{TrackLog, TrackLogBuilder};


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Info,
    Warning,
    Error,
}

/// Things the display surface has to render or ask about
#[derive(Clone, Debug, PartialEq)]
pub enum Notification {
    GpsPointAdded(GpsPointId),
    TrackSegmentAdded {
        from: GpsPointId,
        to: GpsPointId,
        observing: bool,
    },
    /// A stored point got better data; everything anchored to it moved
    GpsPointImproved {
        point: GpsPointId,
        dependents: Vec<EntityRef>,
    },
    ObservationAdded {
        ticket: Ticket,
        observation: ObservationId,
    },
    MissionPropertyAdded(MissionPropertyId),
    MissionPropertyUpdated(MissionPropertyId),
    /// A map touch can place several things; answer with
    /// [`SurveySession::choose_feature`]
    FeatureChoiceRequired {
        ticket: Ticket,
        choices: Vec<Placement>,
    },
    Message {
        level: Level,
        text: String,
    },
}

/// A loaded survey
#[derive(Debug)]
pub struct Survey<S> {
    pub name: String,
    pub protocol: SurveyProtocol,
    pub store: S,
    mission: Option<MissionId>,
}

impl<S: SurveyStore> Survey<S> {
    pub fn new(name: String, protocol: SurveyProtocol, store: S) -> Self {
        Self {
            name,
            protocol,
            store,
            mission: None,
        }
    }

    /// The mission new points and observations belong to
    pub fn current_mission(&self) -> Option<MissionId> {
        self.mission
    }
}

pub struct SurveySession<P: LocationProvider, S: SurveyStore> {
    provider: P,
    clock: Box<dyn Clock>,
    settings: Settings,
    filter: LocationFilter,
    survey: Option<Survey<S>>,
    machine: MissionStateMachine,
    resolver: ObservationResolver,
    totalizer: Totalizer,
    /// Last accepted point, reference of the redundancy check
    previous_point: Option<GpsPointId>,
    updating: bool,
    map: Option<String>,
    outbox: Vec<Notification>,
}

impl<P: LocationProvider, S: SurveyStore> SurveySession<P, S> {
    pub fn new(provider: P, clock: Box<dyn Clock>, settings: Settings) -> Self {
        Self {
            provider,
            clock,
            filter: LocationFilter::new(&settings),
            settings,
            survey: None,
            machine: MissionStateMachine::default(),
            resolver: ObservationResolver::default(),
            totalizer: Totalizer::default(),
            previous_point: None,
            updating: false,
            map: None,
            outbox: vec![],
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn survey(&self) -> Option<&Survey<S>> {
        self.survey.as_ref()
    }

    pub fn machine(&self) -> &MissionStateMachine {
        &self.machine
    }

    pub fn totalizer(&self) -> &Totalizer {
        &self.totalizer
    }

    pub fn is_updating(&self) -> bool {
        self.updating
    }

    /// Map that ad-hoc locations are taken against from now on
    pub fn set_map(&mut self, map: Option<String>) {
        self.map = map;
    }

    /// Make a survey current, replacing any loaded one
    pub fn load_survey(&mut self, survey: Survey<S>) -> Result<(), SurveyError> {
        survey.protocol.validate()?;
        if self.survey.is_some() {
            self.unload();
        }

        info!(name = %survey.name, "survey loaded");
        self.resolver
            .unique_ids
            .initialize(&survey.protocol, &survey.store);
        self.survey = Some(survey);
        // observations can be added before any track log is started
        self.start_mission(self.clock.now());

        Ok(())
    }

    /// Close the current survey, handing it back
    pub fn unload(&mut self) -> Option<Survey<S>> {
        if self.updating {
            self.provider.stop_updates();
            self.updating = false;
        }
        self.resolver.clear();
        self.machine.reset();
        self.totalizer.clear();
        self.previous_point = None;

        let mut survey = self.survey.take()?;
        if let Err(e) = survey.store.save() {
            self.report(e);
        }
        info!(name = %survey.name, "survey unloaded");
        Some(survey)
    }

    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.outbox)
    }

    /// Handle everything queued so far, returning how many events there were
    pub fn run(&mut self, queue: &EventQueue) -> usize {
        let events = queue.drain();
        let count = events.len();
        for event in events {
            self.dispatch(event);
        }
        count
    }

    pub fn dispatch(&mut self, event: Event) {
        match event {
            Event::Locations(fixes) => {
                for fix in fixes {
                    if let Err(e) = self.location_received(fix) {
                        match e {
                            SurveyError::StaleFix { age_ms } => {
                                debug!(age_ms, "stale location dropped")
                            }
                            SurveyError::NoActiveSurvey => debug!("location without survey"),
                            e => self.report(e),
                        }
                    }
                }
            }
            Event::AuthorizationChanged(authorization) => {
                self.authorization_changed(authorization)
            }
            Event::LocationFailed(reason) => {
                warn!(%reason, "location failed");
                self.notify(Notification::Message {
                    level: Level::Warning,
                    text: format!("Location failed: {}", reason),
                });
            }
            Event::MapTouched { coordinates } => {
                if let Err(e) = self.request_observation(Trigger::MapTouch { coordinates }) {
                    self.report(e);
                }
            }
            Event::EnteredBackground => {
                let effects = self
                    .machine
                    .enter_background(self.settings.background_track_logging);
                self.execute(effects);
            }
            Event::EnteredForeground => {
                let effects = self.machine.enter_foreground();
                self.execute(effects);
            }
        }
    }

    pub fn start_track_logging(&mut self) -> Result<(), SurveyError> {
        let effects = self.machine.start_track_logging(self.survey.is_some())?;
        self.execute(effects);

        Ok(())
    }

    pub fn stop_track_logging(&mut self) {
        let effects = self.machine.stop_track_logging();
        self.execute(effects);
    }

    pub fn toggle_observing(&mut self) {
        let effects = self.machine.toggle_observing();
        self.execute(effects);
    }

    pub fn request_observation(&mut self, trigger: Trigger) -> Result<Ticket, SurveyError> {
        let survey = self.survey.as_ref().ok_or(SurveyError::NoActiveSurvey)?;
        let requested = self.resolver.request(
            trigger,
            self.machine.authorization(),
            self.clock.now(),
            &survey.protocol,
        )?;
        let ticket = requested.ticket;
        self.handle_requested(requested);

        Ok(ticket)
    }

    /// Answer a [`Notification::FeatureChoiceRequired`]
    pub fn choose_feature(&mut self, ticket: Ticket, placement: Placement) -> Result<(), SurveyError> {
        if let Some(ready) = self.resolver.choose(ticket, placement)? {
            self.finalize(ready)?;
        }

        Ok(())
    }

    pub fn cancel(&mut self, ticket: Ticket) -> bool {
        self.resolver.cancel(ticket)
    }

    /// Protocol message for the current observing state; `None` when idle
    pub fn status_message(&self) -> Option<&str> {
        let protocol = &self.survey.as_ref()?.protocol;
        if !self.machine.is_track_logging() {
            return None;
        }
        if self.machine.is_observing() {
            protocol.observing_message.as_deref()
        } else {
            protocol.not_observing_message.as_deref()
        }
    }

    /// Track logs of every mission with points, oldest mission first
    pub fn track_logs(&self) -> Vec<TrackLog> {
        let survey = match &self.survey {
            Some(s) => s,
            None => return vec![],
        };
        survey
            .store
            .missions()
            .into_iter()
            .map(|mission| TrackLogBuilder::new(mission).build(&survey.store))
            .filter(|log| !log.segments.is_empty())
            .collect()
    }

    pub fn location_of_observer(&self, observation: ObservationId) -> ObserverLocation {
        let survey = match &self.survey {
            Some(s) => s,
            None => return ObserverLocation::Unknown,
        };
        match survey.store.observation(observation) {
            Some(o) => resolver::location_of_observer(
                &survey.store,
                o,
                self.settings.observer_match_window(),
            ),
            None => ObserverLocation::Unknown,
        }
    }

    pub fn update_angle_distance(
        &mut self,
        observation: ObservationId,
        user_angle: f64,
        user_distance: f64,
    ) -> Result<(), SurveyError> {
        let survey = self.survey.as_mut().ok_or(SurveyError::NoActiveSurvey)?;
        resolver::update_angle_distance(
            &mut survey.store,
            &survey.protocol,
            observation,
            user_angle,
            user_distance,
        )
    }

    fn location_received(&mut self, fix: Fix) -> Result<(), SurveyError> {
        let now = self.clock.now();
        if self.filter.is_stale(&fix, now) {
            return Err(SurveyError::StaleFix {
                age_ms: (now - fix.time).whole_milliseconds() as i64,
            });
        }
        if self.survey.is_none() {
            return Err(SurveyError::NoActiveSurvey);
        }

        match self.machine.buffer(fix) {
            Some(fix) => self.apply_fix(fix),
            None => Ok(()),
        }
    }

    /// Runs a fix whose age was already checked through the pipeline
    fn apply_fix(&mut self, fix: Fix) -> Result<(), SurveyError> {
        let result = self.place_fix(fix);
        if !self.machine.is_track_logging() && self.updating && !self.awaiting_location() {
            debug!("one-shot location received, stopping updates");
            self.provider.stop_updates();
            self.updating = false;
        }
        result
    }

    fn place_fix(&mut self, fix: Fix) -> Result<(), SurveyError> {
        let survey = self.survey.as_mut().ok_or(SurveyError::NoActiveSurvey)?;
        let previous = self
            .previous_point
            .and_then(|id| survey.store.gps_point(id).map(|p| (id, p)));

        let point = match self.filter.classify(&fix, previous.map(|(_, p)| p)) {
            FixDisposition::Stale | FixDisposition::Redundant(Redundancy::Discarded) => {
                return Ok(())
            }
            FixDisposition::Redundant(Redundancy::Improved) => {
                let id = match previous {
                    Some((id, _)) => id,
                    None => return Ok(()),
                };
                if let Some(stored) = survey.store.gps_point_mut(id) {
                    stored.fix = fix.clone();
                }
                let dependents = survey.store.dependents_of(id);
                self.notify(Notification::GpsPointImproved {
                    point: id,
                    dependents,
                });
                id
            }
            FixDisposition::New => {
                self.totalizer.update_location(&fix);
                let mission = match survey.mission {
                    Some(m) => m,
                    None => {
                        for ticket in self.resolver.abandon_awaiting_location() {
                            debug!(ticket = ticket.id, "request dropped, no mission");
                        }
                        return Err(SurveyError::NoActiveMission("location".to_string()));
                    }
                };

                let same_mission = previous
                    .map(|(id, p)| (id, p.mission == mission))
                    .filter(|(_, same)| *same)
                    .map(|(id, _)| id);
                let id = survey.store.insert_gps_point(GpsPoint {
                    mission,
                    fix: fix.clone(),
                });
                self.previous_point = Some(id);
                self.notify(Notification::GpsPointAdded(id));
                if let (Some(from), true) = (same_mission, self.machine.is_track_logging()) {
                    self.notify(Notification::TrackSegmentAdded {
                        from,
                        to: id,
                        observing: self.machine.is_observing(),
                    });
                }
                id
            }
        };

        for ready in self.resolver.location_arrived(point, fix.time) {
            if let Err(e) = self.finalize(ready) {
                self.report(e);
            }
        }

        Ok(())
    }

    fn awaiting_location(&self) -> bool {
        [
            TriggerKind::MissionProperty,
            TriggerKind::Gps,
            TriggerKind::AngleDistance,
            TriggerKind::MapTouch,
        ]
        .into_iter()
        .any(|kind| {
            matches!(
                self.resolver.pending(kind),
                Some(Pending::AwaitingLocation(_))
            )
        })
    }

    fn finalize(&mut self, ready: Ready) -> Result<(), SurveyError> {
        let survey = self.survey.as_mut().ok_or(SurveyError::NoActiveSurvey)?;
        let mission = survey
            .mission
            .ok_or_else(|| SurveyError::NoActiveMission("observation".to_string()))?;
        let observing = self.machine.is_observing();
        let ticket = ready.ticket;

        let done = self.resolver.finalize(
            ready,
            &survey.protocol,
            &mut survey.store,
            mission,
            observing,
            self.map.as_deref(),
        )?;

        match done.entity {
            EntityRef::MissionProperty(id) => {
                if let Some(mp) = survey.store.mission_property(id) {
                    self.totalizer.update_properties(mp.observing, &mp.attributes);
                }
                self.notify(if done.created {
                    Notification::MissionPropertyAdded(id)
                } else {
                    Notification::MissionPropertyUpdated(id)
                });
            }
            EntityRef::Observation(observation) => {
                self.notify(Notification::ObservationAdded {
                    ticket,
                    observation,
                });
                if done.heading_assumed {
                    self.notify(Notification::Message {
                        level: Level::Warning,
                        text: "Heading unknown, angle measured from north. Check the observation location."
                            .to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    fn handle_requested(&mut self, requested: Requested) {
        let ticket = requested.ticket;
        for need in requested.needs {
            match need {
                Need::Authorization => self.provider.request_authorization(),
                Need::Location => self.cycle_updates(ticket.kind != TriggerKind::MissionProperty),
                Need::FeatureChoice(choices) => {
                    self.notify(Notification::FeatureChoiceRequired { ticket, choices })
                }
            }
        }
        if let Some(ready) = requested.ready {
            if let Err(e) = self.finalize(ready) {
                self.report(e);
            }
        }
    }

    /// Make sure updates are flowing, restarting them to force a fresh fix
    fn cycle_updates(&mut self, restart: bool) {
        if self.updating && !restart {
            return;
        }
        if self.updating {
            self.provider.stop_updates();
        }
        self.provider.start_updates();
        self.updating = true;
    }

    fn authorization_changed(&mut self, authorization: Authorization) {
        let effects = self
            .machine
            .authorization_changed(authorization, self.survey.is_some());
        self.execute(effects);

        for replayed in self.resolver.authorization_changed(authorization) {
            match replayed {
                Ok(requested) => self.handle_requested(requested),
                Err(e) => self.report(e),
            }
        }
    }

    fn execute(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::RequestAuthorization => self.provider.request_authorization(),
                Effect::StartUpdates => {
                    if !self.updating {
                        self.provider.start_updates();
                        self.updating = true;
                    }
                }
                Effect::StopUpdates => {
                    self.provider.stop_updates();
                    self.updating = false;
                }
                Effect::AllowBackgroundUpdates(allow) => {
                    self.provider.allow_background_updates(allow)
                }
                Effect::StartMission => self.start_mission(self.clock.now()),
                Effect::MissionPropertyAtNextFix => {
                    if let Err(e) = self.request_observation(Trigger::MissionProperty) {
                        self.report(e);
                    }
                }
                Effect::SetupTotalizer => {
                    match self.survey.as_ref().and_then(|s| s.protocol.totalizer()) {
                        Some(definition) => self.totalizer.setup(definition),
                        None => self.totalizer.clear(),
                    }
                }
                Effect::ClearTotalizer => self.totalizer.clear(),
                Effect::ClearPending => self.resolver.clear(),
                Effect::ReplayBuffered(fixes) => {
                    for fix in fixes {
                        if let Err(e) = self.apply_fix(fix) {
                            self.report(e);
                        }
                    }
                }
                Effect::Persist => {
                    if let Some(survey) = self.survey.as_mut() {
                        if let Err(e) = survey.store.save() {
                            self.report(e);
                        }
                    }
                }
                Effect::Report(e) => self.report(e),
            }
        }
    }

    fn start_mission(&mut self, now: OffsetDateTime) {
        self.previous_point = None;
        if let Some(survey) = self.survey.as_mut() {
            let id = survey.store.insert_mission(Mission { started: now });
            survey.mission = Some(id);
            info!(mission = id.0, "mission started");
        }
    }

    fn notify(&mut self, notification: Notification) {
        self.outbox.push(notification);
    }

    /// Surface a non-fatal error; in-memory state is left as is
    fn report(&mut self, error: SurveyError) {
        let level = match error {
            SurveyError::PersistenceFailure(_) | SurveyError::ConfigurationInvalid(_) => {
                Level::Error
            }
            _ => Level::Warning,
        };
        warn!(%error, "survey error");
        self.notify(Notification::Message {
            level,
            text: error.to_string(),
        });
    }
}
