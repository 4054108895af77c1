//! park-observer cli - replay recorded fixes through a survey session

use std::cell::Cell;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;
use std::rc::Rc;

use argopt::{cmd_group, subcmd};
use csv::Reader;
use serde::Deserialize;
use time::format_description::well_known;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use park_observer::loader;
use park_observer::session::Notification;
use park_observer::sources::CsvFixSource;
use park_observer::{
    Authorization, Clock, Event, FieldsConfiguration, FixSource, GpxGenerator, LocationProvider,
    Settings, SurveySession, SurveyStore, TrackLogBuilder,
};

/// CLI of park-observer - Replay a recorded survey and export its track logs
#[cmd_group(commands = [replay, check])]
fn main() -> Result<(), String> {}

/// Replay a CSV fix log through a survey and write the track logs as GPX
#[subcmd]
fn replay(
    /// Survey protocol, YAML or JSON
    protocol: String,
    /// CSV file with the recorded fixes
    fixes: String,
    /// Start time, RFC3339 format
    start: String,
    /// End time, RFC3339 format
    end: String,
    /// GPX path file destination
    destination: String,
    /// Session settings and CSV fields. Default: .parkobs.yaml, ~/.parkobs.yaml
    #[opt(long)]
    config: Option<String>,
) -> Result<(), String> {
    init_tracing();

    let start = OffsetDateTime::parse(&start, &well_known::Rfc3339)
        .map_err(|e| format!("Failed on parse the start time: {}", e))?;
    let end = OffsetDateTime::parse(&end, &well_known::Rfc3339)
        .map_err(|e| format!("Failed on parse the end time: {}", e))?;

    let survey = loader::load_survey(Path::new(&protocol), None).map_err(|e| e.to_string())?;

    let csv = File::open(fixes).map_err(|e| format!("Failed on open the CSV file: {}", e))?;
    let (settings, fields) = load_configs(config);
    let mut source = CsvFixSource::new(Reader::from_reader(csv), Some(fields));
    let recorded = source.fetch(start, end)?;
    info!(fixes = recorded.len(), "replaying");

    let destination = File::create(destination)
        .map_err(|e| format!("Failed on create the destination file: {}", e))?;

    let now = Rc::new(Cell::new(start));
    let mut session = SurveySession::new(
        ReplayProvider::default(),
        Box::new(ReplayClock(now.clone())),
        settings,
    );
    session.load_survey(survey).map_err(|e| e.to_string())?;
    session.dispatch(Event::AuthorizationChanged(Authorization::ForegroundOnly));
    session.start_track_logging().map_err(|e| e.to_string())?;

    for rec in recorded {
        now.set(rec.fix.time);
        if let Some(observing) = rec.observing {
            if observing != session.machine().is_observing() {
                session.toggle_observing();
            }
        }
        session.dispatch(Event::Locations(vec![rec.fix]));
        log_messages(session.drain_notifications());
    }
    session.stop_track_logging();
    log_messages(session.drain_notifications());

    let survey = session.unload().ok_or("Survey vanished during the replay")?;
    let mut gpx = GpxGenerator::empty();
    for mission in survey.store.missions() {
        let log = TrackLogBuilder::new(mission).min_points(2).build(&survey.store);
        gpx.add_track_log(&survey.name, &log, &survey.store);
    }
    info!(tracks = gpx.tracks.len(), "track logs built");

    let doc = gpx.generate()?;

    let mut writer = BufWriter::new(destination);
    gpx::write(&doc, &mut writer).map_err(|e| e.to_string())?;

    Ok(())
}

/// Validate a survey protocol
#[subcmd]
fn check(
    /// Survey protocol, YAML or JSON
    protocol: String,
) -> Result<(), String> {
    init_tracing();

    let survey = loader::load_survey(Path::new(&protocol), None).map_err(|e| e.to_string())?;
    let protocol = &survey.protocol;
    println!(
        "{} {}: {} features, {} locatable by map touch",
        protocol.name,
        protocol
            .version
            .map(|v| v.to_string())
            .unwrap_or_default(),
        protocol.features.len(),
        protocol.locatable_with_map_touch().len()
    );

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn log_messages(notifications: Vec<Notification>) {
    for n in notifications {
        if let Notification::Message { level, text } = n {
            warn!(?level, "{}", text);
        }
    }
}

/// Clock following the recorded fixes
struct ReplayClock(Rc<Cell<OffsetDateTime>>);

impl Clock for ReplayClock {
    fn now(&self) -> OffsetDateTime {
        self.0.get()
    }
}

/// Recorded fixes need no device
#[derive(Default)]
struct ReplayProvider;

impl LocationProvider for ReplayProvider {
    fn start_updates(&mut self) {
        debug!("start updates");
    }

    fn stop_updates(&mut self) {
        debug!("stop updates");
    }

    fn request_authorization(&mut self) {}

    fn allow_background_updates(&mut self, _allow: bool) {}
}

/// Load the current config
fn load_configs(provided: Option<String>) -> (Settings, FieldsConfiguration) {
    let mut options = vec![];

    if let Some(sprovided) = provided {
        options.push(sprovided);
    }

    options.push(".parkobs.yaml".to_string());

    if let Some(home) = dirs::home_dir() {
        if let Some(shome) = home.to_str() {
            options.push(format!("{}/.parkobs.yaml", shome));
        }
    }

    let mut yaml: Option<String> = None;
    for fi in options {
        if let Ok(s) = fs::read_to_string(fi) {
            yaml = Some(s);
            break;
        }
    }

    if let Some(s) = yaml {
        match serde_yaml::from_str::<Configs>(&s) {
            Ok(conf) => return (conf.settings, conf.fields),
            Err(e) => warn!("ignoring invalid configuration: {}", e),
        }
    }

    (Settings::default(), FieldsConfiguration::default())
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
struct Configs {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub fields: FieldsConfiguration,
}

#[test]
fn parse_configs() -> Result<(), String> {
    let yaml = "\nsettings:\nfields:";

    let conf: Configs = serde_yaml::from_str(&yaml).map_err(|e| e.to_string())?;

    assert_eq!(
        Configs {
            settings: Settings {
                stale_after_ms: 1000,
                duplicate_tolerance_ms: 0,
                observer_match_window_ms: 1,
                background_track_logging: false,
            },
            fields: FieldsConfiguration::default(),
        },
        conf
    );

    let yaml = "\nsettings:\n  stale_after_ms: 5000\nfields:\n  latitude: lat";

    let conf: Configs = serde_yaml::from_str(&yaml).map_err(|e| e.to_string())?;

    assert_eq!(5000, conf.settings.stale_after_ms);
    assert_eq!(1, conf.settings.observer_match_window_ms);
    assert_eq!("lat", conf.fields.latitude);
    assert_eq!("longitude", conf.fields.longitude);

    Ok(())
}
