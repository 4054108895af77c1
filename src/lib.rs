//! park-observer - field survey engine: track logging, observations and
//! angle/distance sightings

pub mod error;
pub mod geometry;
pub mod loader;
pub mod location;
pub mod mission;
pub mod model;
pub mod protocol;
pub mod resolver;
pub mod session;
pub mod settings;
pub mod sources;
pub mod totalizer;
pub mod tracklog;

pub use error::SurveyError;
pub use geometry::AngleDistanceHelper;
pub use location::{Authorization, Clock, Event, LocationFilter, LocationProvider, SystemClock};
pub use mission::{MissionState, MissionStateMachine};
pub use model::{Fix, MemoryStore, SurveyStore};
pub use protocol::SurveyProtocol;
pub use resolver::{ObservationResolver, Placement, Ticket, Trigger};
pub use session::{Notification, Survey, SurveySession};
pub use settings::Settings;
pub use sources::{FieldsConfiguration, FixSource, RecordedFix};
pub use totalizer::Totalizer;
pub use tracklog::{GpxGenerator, TrackLog, TrackLogBuilder};
