//! Survey loading on a background thread
//!
//! The loaded survey is moved back to the owner thread through a channel;
//! the worker keeps nothing.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;

use tracing::{debug, info};

use crate::error::SurveyError;
use crate::model::MemoryStore;
use crate::protocol::SurveyProtocol;
use crate::session::Survey;

pub type LoadResult = Result<Survey<MemoryStore>, SurveyError>;

/// Read a protocol file and the survey snapshot next to it
pub fn load_survey(protocol: &Path, snapshot: Option<&Path>) -> LoadResult {
    let text = fs::read_to_string(protocol).map_err(|e| {
        SurveyError::PersistenceFailure(format!("Failed on read {}: {}", protocol.display(), e))
    })?;
    let protocol = SurveyProtocol::parse(&text)?;

    let store = match snapshot {
        Some(path) => MemoryStore::open(path)?,
        None => MemoryStore::new(),
    };
    info!(name = %protocol.name, "survey read");

    Ok(Survey::new(protocol.name.clone(), protocol, store))
}

/// Handle of a load running in the background
pub struct LoadHandle {
    receiver: mpsc::Receiver<LoadResult>,
}

impl LoadHandle {
    /// The result, if the load is done (non-blocking)
    pub fn try_recv(&self) -> Option<LoadResult> {
        self.receiver.try_recv().ok()
    }

    /// Wait for the load to finish
    pub fn recv(self) -> LoadResult {
        self.receiver
            .recv()
            .map_err(|e| SurveyError::PersistenceFailure(format!("Survey loader stopped: {}", e)))?
    }
}

pub fn spawn_load(protocol: PathBuf, snapshot: Option<PathBuf>) -> LoadHandle {
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        debug!(protocol = %protocol.display(), "loading survey");
        let result = load_survey(&protocol, snapshot.as_deref());
        if tx.send(result).is_err() {
            debug!("survey load abandoned");
        }
    });

    LoadHandle { receiver: rx }
}
