//! Survey error taxonomy

use thiserror::Error;

/// Everything that can go wrong while running a survey session.
///
/// None of these are fatal to the process. Permission and mission errors
/// are recovered by dropping (or deferring) the request that caused them,
/// persistence errors are reported while the in-memory state is kept, and
/// configuration errors block the survey from loading.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SurveyError {
    #[error("App is not authorized to obtain your location. Enable in settings.")]
    PermissionDenied,
    #[error("No survey selected, or survey is corrupt.")]
    NoActiveSurvey,
    #[error("No active tracklog (mission). Can't add {0}.")]
    NoActiveMission(String),
    #[error("Skipping stale location. Age: {age_ms} ms")]
    StaleFix { age_ms: i64 },
    #[error("Unable to save survey: {0}")]
    PersistenceFailure(String),
    #[error("Invalid survey protocol: {0}")]
    ConfigurationInvalid(String),
    #[error("Feature `{0}` is not defined in the survey protocol")]
    UnknownFeature(String),
}

impl SurveyError {
    pub(crate) fn invalid<S: Into<String>>(msg: S) -> Self {
        SurveyError::ConfigurationInvalid(msg.into())
    }
}
