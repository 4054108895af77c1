//! Mission state machine
//!
//! Transitions are pure: each returns the [`Effect`]s the session has to
//! carry out (talk to the location provider, create a mission, persist...),
//! in order.

use tracing::{debug, info};

use crate::error::SurveyError;
use crate::location::Authorization;
use crate::model::Fix;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MissionState {
    Idle,
    TrackLogging { observing: bool },
}

/// A request that could not be completed yet.
///
/// There is at most one per trigger category; storing a new one supersedes
/// whatever was waiting before.
#[derive(Clone, Debug, PartialEq)]
pub enum Pending<T> {
    None,
    AwaitingAuthorization(T),
    AwaitingLocation(T),
    AwaitingFeatureChoice(T),
}

impl<T> Default for Pending<T> {
    fn default() -> Self {
        Pending::None
    }
}

impl<T> Pending<T> {
    pub fn is_none(&self) -> bool {
        matches!(self, Pending::None)
    }

    pub fn take(&mut self) -> Pending<T> {
        std::mem::take(self)
    }

    pub fn request(&self) -> Option<&T> {
        match self {
            Pending::None => None,
            Pending::AwaitingAuthorization(r)
            | Pending::AwaitingLocation(r)
            | Pending::AwaitingFeatureChoice(r) => Some(r),
        }
    }

    pub fn request_mut(&mut self) -> Option<&mut T> {
        match self {
            Pending::None => None,
            Pending::AwaitingAuthorization(r)
            | Pending::AwaitingLocation(r)
            | Pending::AwaitingFeatureChoice(r) => Some(r),
        }
    }
}

/// Work requested by a transition
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    RequestAuthorization,
    StartUpdates,
    StopUpdates,
    AllowBackgroundUpdates(bool),
    /// Make a new, empty mission current
    StartMission,
    /// Record a mission property at the next accepted fix
    MissionPropertyAtNextFix,
    SetupTotalizer,
    ClearTotalizer,
    /// Drop every request waiting for a location or authorization
    ClearPending,
    /// Fixes received in the background, in arrival order
    ReplayBuffered(Vec<Fix>),
    Persist,
    /// A non-fatal error for the user
    Report(SurveyError),
}

#[derive(Debug)]
pub struct MissionStateMachine {
    state: MissionState,
    authorization: Authorization,
    start: Pending<()>,
    in_background: bool,
    buffered: Vec<Fix>,
}

impl Default for MissionStateMachine {
    fn default() -> Self {
        Self {
            state: MissionState::Idle,
            authorization: Authorization::Undetermined,
            start: Pending::None,
            in_background: false,
            buffered: vec![],
        }
    }
}

impl MissionStateMachine {
    pub fn state(&self) -> MissionState {
        self.state
    }

    pub fn authorization(&self) -> Authorization {
        self.authorization
    }

    pub fn is_track_logging(&self) -> bool {
        matches!(self.state, MissionState::TrackLogging { .. })
    }

    pub fn is_observing(&self) -> bool {
        matches!(self.state, MissionState::TrackLogging { observing: true })
    }

    pub fn is_in_background(&self) -> bool {
        self.in_background
    }

    pub fn is_awaiting_authorization(&self) -> bool {
        !self.start.is_none()
    }

    pub fn start_track_logging(&mut self, survey_loaded: bool) -> Result<Vec<Effect>, SurveyError> {
        if !survey_loaded {
            return Err(SurveyError::NoActiveSurvey);
        }
        if self.is_track_logging() {
            return Ok(vec![]);
        }

        match self.authorization {
            Authorization::Undetermined => {
                debug!("track logging waits for authorization");
                self.start = Pending::AwaitingAuthorization(());
                Ok(vec![Effect::RequestAuthorization])
            }
            Authorization::Denied => {
                self.start = Pending::None;
                Err(SurveyError::PermissionDenied)
            }
            Authorization::ForegroundOnly | Authorization::BackgroundAllowed => {
                info!("track logging started");
                self.start = Pending::None;
                self.state = MissionState::TrackLogging { observing: false };
                Ok(vec![
                    Effect::StartMission,
                    Effect::StartUpdates,
                    Effect::SetupTotalizer,
                    Effect::MissionPropertyAtNextFix,
                ])
            }
        }
    }

    pub fn stop_track_logging(&mut self) -> Vec<Effect> {
        if !self.is_track_logging() {
            if self.start.take().is_none() {
                return vec![];
            }
            return vec![Effect::ClearPending];
        }

        info!("track logging stopped");
        self.state = MissionState::Idle;
        self.start = Pending::None;
        vec![
            Effect::StopUpdates,
            Effect::ClearPending,
            Effect::ClearTotalizer,
            Effect::StartMission,
            Effect::Persist,
        ]
    }

    /// Observing only has a meaning while track logging
    pub fn toggle_observing(&mut self) -> Vec<Effect> {
        match self.state {
            MissionState::Idle => {
                debug!("observing ignored, not track logging");
                vec![]
            }
            MissionState::TrackLogging { observing } => {
                info!(observing = !observing, "observing toggled");
                self.state = MissionState::TrackLogging {
                    observing: !observing,
                };
                vec![Effect::MissionPropertyAtNextFix]
            }
        }
    }

    pub fn authorization_changed(
        &mut self,
        authorization: Authorization,
        survey_loaded: bool,
    ) -> Vec<Effect> {
        info!(?authorization, "location authorization changed");
        self.authorization = authorization;

        let replay = self.start.take();
        let mut effects = vec![];
        if authorization == Authorization::Denied {
            effects.push(Effect::AllowBackgroundUpdates(false));
            effects.extend(self.stop_track_logging());
        }
        if let Pending::AwaitingAuthorization(()) = replay {
            match self.start_track_logging(survey_loaded) {
                Ok(more) => effects.extend(more),
                Err(e) => effects.push(Effect::Report(e)),
            }
        }
        effects
    }

    pub fn enter_background(&mut self, background_enabled: bool) -> Vec<Effect> {
        self.in_background = true;
        let allow = self.is_track_logging()
            && background_enabled
            && self.authorization == Authorization::BackgroundAllowed;
        vec![Effect::Persist, Effect::AllowBackgroundUpdates(allow)]
    }

    /// Keep a fix for later when in the background
    pub fn buffer(&mut self, fix: Fix) -> Option<Fix> {
        if self.in_background {
            self.buffered.push(fix);
            return None;
        }
        Some(fix)
    }

    pub fn enter_foreground(&mut self) -> Vec<Effect> {
        self.in_background = false;
        if self.buffered.is_empty() {
            return vec![];
        }
        debug!(count = self.buffered.len(), "replaying background locations");
        vec![Effect::ReplayBuffered(std::mem::take(&mut self.buffered))]
    }

    /// Forget everything tied to the current survey
    pub fn reset(&mut self) {
        self.state = MissionState::Idle;
        self.start = Pending::None;
        self.buffered.clear();
    }
}
