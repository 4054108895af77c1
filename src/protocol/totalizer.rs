//! Totalizer section of a survey protocol

use std::collections::HashSet;

use serde::Deserialize;

use crate::error::SurveyError;

/// What the mission totalizer watches and how it reports
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct TotalizerDefinition {
    /// Attribute names that restart the counts when their value changes
    #[serde(default)]
    pub fields: Option<Vec<String>>,
    #[serde(default = "default_font_size", rename = "fontsize")]
    pub font_size: f64,
    #[serde(default = "default_include_on", rename = "includeon")]
    pub include_on: bool,
    #[serde(default, rename = "includeoff")]
    pub include_off: bool,
    #[serde(default, rename = "includetotal")]
    pub include_total: bool,
    #[serde(default)]
    pub units: TotalizerUnits,
}

fn default_font_size() -> f64 {
    14.0
}

fn default_include_on() -> bool {
    true
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TotalizerUnits {
    #[default]
    Kilometers,
    Miles,
    Minutes,
}

impl TotalizerDefinition {
    pub fn watched(&self) -> &[String] {
        self.fields.as_deref().unwrap_or(&[])
    }

    pub(crate) fn validate(&self) -> Result<(), SurveyError> {
        if let Some(fields) = &self.fields {
            if fields.is_empty() {
                return Err(SurveyError::invalid(
                    "totalizer fields must not be an empty list",
                ));
            }
            let unique: HashSet<String> = fields.iter().map(|f| f.to_lowercase()).collect();
            if unique.len() != fields.len() {
                return Err(SurveyError::invalid(format!(
                    "totalizer fields have duplicate values {:?}",
                    fields
                )));
            }
        }
        if self.font_size < 0.0 {
            return Err(SurveyError::invalid(format!(
                "totalizer fontsize must not be negative ({})",
                self.font_size
            )));
        }

        Ok(())
    }
}
