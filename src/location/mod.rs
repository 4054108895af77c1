//! Location provider API and inbound events

use std::sync::mpsc::{self, Receiver, Sender};

use geo::geometry::Point;
use time::OffsetDateTime;

use crate::model::Fix;

mod filter;

pub use filter::{FixDisposition, LocationFilter, Redundancy};

/// Location permission granted by the platform
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Authorization {
    /// The user has not been asked yet
    #[default]
    Undetermined,
    ForegroundOnly,
    BackgroundAllowed,
    Denied,
}

impl Authorization {
    pub fn is_granted(&self) -> bool {
        matches!(
            self,
            Authorization::ForegroundOnly | Authorization::BackgroundAllowed
        )
    }
}

/// The device location service
pub trait LocationProvider {
    fn start_updates(&mut self);
    fn stop_updates(&mut self);
    /// Ask the user for permission; the answer comes back as
    /// [`Event::AuthorizationChanged`]
    fn request_authorization(&mut self);
    fn allow_background_updates(&mut self, allow: bool);
}

/// Source of the current time
pub trait Clock {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Everything the outside world can tell a survey session
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Locations(Vec<Fix>),
    AuthorizationChanged(Authorization),
    LocationFailed(String),
    MapTouched { coordinates: Point },
    EnteredBackground,
    EnteredForeground,
}

/// Sending half handed to providers, possibly on other threads
#[derive(Clone, Debug)]
pub struct EventSender(Sender<Event>);

impl EventSender {
    /// Returns `false` once the session is gone
    pub fn send(&self, event: Event) -> bool {
        self.0.send(event).is_ok()
    }
}

/// Receiving half, drained by the thread owning the session
#[derive(Debug)]
pub struct EventQueue(Receiver<Event>);

impl EventQueue {
    /// Events received so far, in arrival order
    pub fn drain(&self) -> Vec<Event> {
        self.0.try_iter().collect()
    }
}

pub fn channel() -> (EventSender, EventQueue) {
    let (tx, rx) = mpsc::channel();
    (EventSender(tx), EventQueue(rx))
}
