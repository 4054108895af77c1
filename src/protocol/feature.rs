//! Feature definitions of a survey protocol

use std::collections::{BTreeMap, HashSet};

use serde::Deserialize;

use crate::error::SurveyError;
use crate::model::AttributeValue;

/// A kind of thing that can be observed during a survey
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Feature {
    pub name: String,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    pub locations: Vec<LocationMethod>,
    /// Values assigned to a new observation before it is edited
    #[serde(default)]
    pub defaults: BTreeMap<String, AttributeValue>,
    #[serde(default)]
    pub allow_off_transect_observations: bool,
}

/// A column of a feature (or of the mission properties)
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Attribute {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AttributeType,
}

/// Attribute storage types, decoded from their legacy numeric codes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "u16")]
pub enum AttributeType {
    Id,
    Int16,
    Int32,
    Int64,
    Decimal,
    Double,
    Float,
    String,
    Bool,
    DateTime,
    Blob,
}

impl TryFrom<u16> for AttributeType {
    type Error = String;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(AttributeType::Id),
            100 => Ok(AttributeType::Int16),
            200 => Ok(AttributeType::Int32),
            300 => Ok(AttributeType::Int64),
            400 => Ok(AttributeType::Decimal),
            500 => Ok(AttributeType::Double),
            600 => Ok(AttributeType::Float),
            700 => Ok(AttributeType::String),
            800 => Ok(AttributeType::Bool),
            900 => Ok(AttributeType::DateTime),
            1000 => Ok(AttributeType::Blob),
            other => Err(format!("unknown attribute type code {}", other)),
        }
    }
}

/// How a feature may be located
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct LocationMethod {
    #[serde(rename = "type")]
    pub kind: LocationKind,
    #[serde(default = "default_allow")]
    pub allow: bool,
    #[serde(default, rename = "default")]
    pub default_method: bool,
    /// Angle that means "dead ahead" of the observer
    #[serde(default, rename = "deadAhead")]
    pub dead_ahead: f64,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub units: LocationUnits,
}

fn default_allow() -> bool {
    true
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum LocationKind {
    #[serde(rename = "angleDistance")]
    AngleDistance,
    #[serde(rename = "gps")]
    Gps,
    #[serde(rename = "mapTarget")]
    MapTarget,
    #[serde(rename = "mapTouch")]
    MapTouch,
}

/// Direction in which user angles increase
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Cw,
    Ccw,
}

/// Units of the distance to an angle/distance feature
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationUnits {
    Feet,
    #[default]
    Meters,
    Yards,
}

impl LocationUnits {
    pub fn label(&self) -> &'static str {
        match self {
            LocationUnits::Feet => "feet",
            LocationUnits::Meters => "meters",
            LocationUnits::Yards => "yards",
        }
    }
}

impl Feature {
    fn allows(&self, kind: LocationKind) -> bool {
        self.locations.iter().any(|l| l.kind == kind && l.allow)
    }

    pub fn allows_map_touch(&self) -> bool {
        self.allows(LocationKind::MapTouch) || self.allows(LocationKind::MapTarget)
    }

    pub fn allows_gps(&self) -> bool {
        self.allows(LocationKind::Gps)
    }

    /// The allowed angle/distance method with its conventions, if any
    pub fn angle_distance(&self) -> Option<&LocationMethod> {
        self.locations
            .iter()
            .find(|l| l.kind == LocationKind::AngleDistance && l.allow)
    }

    pub fn unique_id_attribute(&self) -> Option<&Attribute> {
        unique_id_attribute(&self.attributes)
    }

    pub(crate) fn validate(&self) -> Result<(), SurveyError> {
        if self.name.trim().is_empty() {
            return Err(SurveyError::invalid("feature names must not be empty"));
        }
        if !self.locations.iter().any(|l| l.allow) {
            return Err(SurveyError::invalid(format!(
                "feature `{}` has no allowed location method",
                self.name
            )));
        }
        validate_attributes(&self.name, &self.attributes)
    }
}

pub(crate) fn unique_id_attribute(attributes: &[Attribute]) -> Option<&Attribute> {
    attributes.iter().find(|a| a.kind == AttributeType::Id)
}

pub(crate) fn validate_attributes(owner: &str, attributes: &[Attribute]) -> Result<(), SurveyError> {
    let mut names = HashSet::new();
    for attr in attributes {
        if attr.name.trim().is_empty() || attr.name.contains(char::is_whitespace) {
            return Err(SurveyError::invalid(format!(
                "`{}` has an invalid attribute name `{}`",
                owner, attr.name
            )));
        }
        if !names.insert(attr.name.to_lowercase()) {
            return Err(SurveyError::invalid(format!(
                "`{}` has a duplicate attribute `{}`",
                owner, attr.name
            )));
        }
    }

    let ids = attributes
        .iter()
        .filter(|a| a.kind == AttributeType::Id)
        .count();
    if ids > 1 {
        return Err(SurveyError::invalid(format!(
            "`{}` has more than one unique id attribute",
            owner
        )));
    }

    Ok(())
}
