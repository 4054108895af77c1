//! Survey protocol: the read-only configuration of a survey

use std::collections::{BTreeMap, HashSet};

use serde::Deserialize;
use tracing::debug;

use crate::error::SurveyError;
use crate::model::AttributeValue;

mod feature;
mod totalizer;

pub use feature::{
    Attribute, AttributeType, Direction, Feature, LocationKind, LocationMethod, LocationUnits,
};
pub use totalizer::{TotalizerDefinition, TotalizerUnits};

pub const META_NAME: &str = "NPS-Protocol-Specification";

/// The protocol a survey was created with
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct SurveyProtocol {
    #[serde(rename = "meta-name")]
    pub meta_name: String,
    #[serde(rename = "meta-version")]
    pub meta_version: u8,
    pub name: String,
    #[serde(default)]
    pub version: Option<f64>,
    #[serde(default, rename = "observing")]
    pub observing_message: Option<String>,
    #[serde(default, rename = "notobserving")]
    pub not_observing_message: Option<String>,
    #[serde(default)]
    pub mission: Option<MissionDefinition>,
    pub features: Vec<Feature>,
}

/// Attributes recorded with every mission property
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct MissionDefinition {
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(default)]
    pub defaults: BTreeMap<String, AttributeValue>,
    #[serde(default)]
    pub totalizer: Option<TotalizerDefinition>,
}

impl MissionDefinition {
    pub fn unique_id_attribute(&self) -> Option<&Attribute> {
        feature::unique_id_attribute(&self.attributes)
    }
}

impl SurveyProtocol {
    /// Parse and validate a protocol document (YAML or JSON)
    pub fn parse(text: &str) -> Result<Self, SurveyError> {
        let protocol: SurveyProtocol =
            serde_yaml::from_str(text).map_err(|e| SurveyError::invalid(e.to_string()))?;
        protocol.validate()?;
        debug!(name = %protocol.name, features = protocol.features.len(), "protocol loaded");

        Ok(protocol)
    }

    pub fn validate(&self) -> Result<(), SurveyError> {
        if self.meta_name != META_NAME {
            return Err(SurveyError::invalid(format!(
                "meta-name must be `{}`, found `{}`",
                META_NAME, self.meta_name
            )));
        }
        if self.meta_version != 1 && self.meta_version != 2 {
            return Err(SurveyError::invalid(format!(
                "unsupported meta-version {}",
                self.meta_version
            )));
        }
        if self.features.is_empty() {
            return Err(SurveyError::invalid("a protocol needs at least one feature"));
        }

        let mut names = HashSet::new();
        for feature in &self.features {
            feature.validate()?;
            if !names.insert(feature.name.to_lowercase()) {
                return Err(SurveyError::invalid(format!(
                    "duplicate feature name `{}`",
                    feature.name
                )));
            }
        }

        if let Some(mission) = &self.mission {
            feature::validate_attributes("mission", &mission.attributes)?;
            if let Some(totalizer) = &mission.totalizer {
                totalizer.validate()?;
            }
        }

        Ok(())
    }

    pub fn feature(&self, name: &str) -> Option<&Feature> {
        self.features.iter().find(|f| f.name == name)
    }

    pub fn locatable_with_map_touch(&self) -> Vec<&Feature> {
        self.features.iter().filter(|f| f.allows_map_touch()).collect()
    }

    pub fn locatable_without_map_touch(&self) -> Vec<&Feature> {
        self.features
            .iter()
            .filter(|f| f.allows_gps() || f.angle_distance().is_some())
            .collect()
    }

    pub fn totalizer(&self) -> Option<&TotalizerDefinition> {
        self.mission.as_ref().and_then(|m| m.totalizer.as_ref())
    }

    pub fn major_version(&self) -> Option<u32> {
        self.version_parts().map(|(major, _)| major)
    }

    pub fn minor_version(&self) -> Option<u32> {
        self.version_parts().map(|(_, minor)| minor)
    }

    fn version_parts(&self) -> Option<(u32, u32)> {
        let text = self.version?.to_string();
        let mut parts = text.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = match parts.next() {
            Some(m) => m.parse().ok()?,
            None => 0,
        };
        Some((major, minor))
    }
}

#[cfg(test)]
pub mod tests {
    use super::{Direction, LocationKind, LocationUnits, SurveyProtocol};
    use crate::error::SurveyError;
    use crate::model::AttributeValue;

    #[test]
    fn minimal_protocol() -> Result<(), String> {
        let json = r#"
        {
          "meta-name": "NPS-Protocol-Specification",
          "meta-version": 1,
          "name": "Test Protocol",
          "version": 1.3,
          "features": [
            {"name": "Birds", "locations": [ {"type": "gps"} ] }
          ]
        }"#;

        let sp = SurveyProtocol::parse(json).map_err(|e| e.to_string())?;
        assert_eq!("Test Protocol", sp.name);
        assert_eq!(Some(1), sp.major_version());
        assert_eq!(Some(3), sp.minor_version());
        assert_eq!(None, sp.mission);
        assert_eq!(None, sp.observing_message);

        let birds = &sp.features[0];
        assert_eq!(LocationKind::Gps, birds.locations[0].kind);
        assert!(birds.locations[0].allow);
        assert!(!birds.locations[0].default_method);
        assert_eq!(LocationUnits::Meters, birds.locations[0].units);
        assert_eq!(Direction::Cw, birds.locations[0].direction);
        assert_eq!(0.0, birds.locations[0].dead_ahead);
        assert!(!birds.allow_off_transect_observations);
        assert_eq!(1, sp.locatable_without_map_touch().len());
        assert_eq!(0, sp.locatable_with_map_touch().len());

        Ok(())
    }

    #[test]
    fn full_protocol_in_yaml() -> Result<(), String> {
        let yaml = r#"
meta-name: NPS-Protocol-Specification
meta-version: 2
name: Sheep
version: 2
observing: On transect
notobserving: Off transect
mission:
  attributes:
    - {name: Observer, type: 700}
    - {name: MissionId, type: 0}
  defaults:
    Observer: RS
  totalizer:
    fields: [Observer]
    includeoff: true
features:
  - name: Ewes
    attributes:
      - {name: Count, type: 100}
      - {name: Tag, type: 0}
    defaults:
      Count: 1
    locations:
      - {type: angleDistance, deadAhead: 180, direction: ccw, units: feet}
      - {type: mapTouch}
"#;
        let sp = SurveyProtocol::parse(yaml).map_err(|e| e.to_string())?;
        assert_eq!(Some(2), sp.major_version());
        assert_eq!(Some(0), sp.minor_version());
        assert_eq!(Some("On transect".to_string()), sp.observing_message);

        let mission = sp.mission.as_ref().ok_or("mission")?;
        assert_eq!(Some("MissionId"), mission.unique_id_attribute().map(|a| a.name.as_str()));
        assert_eq!(
            Some(&AttributeValue::Text("RS".to_string())),
            mission.defaults.get("Observer")
        );
        assert_eq!(&["Observer".to_string()], sp.totalizer().ok_or("totalizer")?.watched());

        let ewes = sp.feature("Ewes").ok_or("feature")?;
        let ad = ewes.angle_distance().ok_or("angle distance")?;
        assert_eq!(180.0, ad.dead_ahead);
        assert_eq!(Direction::Ccw, ad.direction);
        assert_eq!(LocationUnits::Feet, ad.units);
        assert_eq!(Some("Tag"), ewes.unique_id_attribute().map(|a| a.name.as_str()));
        assert_eq!(Some(&AttributeValue::Integer(1)), ewes.defaults.get("Count"));
        assert_eq!(1, sp.locatable_with_map_touch().len());
        assert_eq!(1, sp.locatable_without_map_touch().len());

        Ok(())
    }

    #[test]
    fn invalid_protocols() -> Result<(), String> {
        let cases = [
            // wrong meta name
            r#"{"meta-name": "X", "meta-version": 1, "name": "n", "features": [{"name": "A", "locations": [{"type": "gps"}]}]}"#,
            // duplicate feature
            r#"{"meta-name": "NPS-Protocol-Specification", "meta-version": 1, "name": "n", "features": [{"name": "A", "locations": [{"type": "gps"}]}, {"name": "a", "locations": [{"type": "gps"}]}]}"#,
            // duplicate attribute
            r#"{"meta-name": "NPS-Protocol-Specification", "meta-version": 2, "name": "n", "features": [{"name": "A", "attributes": [{"name": "X", "type": 100}, {"name": "x", "type": 700}], "locations": [{"type": "gps"}]}]}"#,
            // no allowed location
            r#"{"meta-name": "NPS-Protocol-Specification", "meta-version": 2, "name": "n", "features": [{"name": "A", "locations": [{"type": "gps", "allow": false}]}]}"#,
            // unknown attribute type
            r#"{"meta-name": "NPS-Protocol-Specification", "meta-version": 2, "name": "n", "features": [{"name": "A", "attributes": [{"name": "X", "type": 42}], "locations": [{"type": "gps"}]}]}"#,
            // unknown meta version
            r#"{"meta-name": "NPS-Protocol-Specification", "meta-version": 3, "name": "n", "features": [{"name": "A", "locations": [{"type": "gps"}]}]}"#,
        ];

        for case in cases {
            match SurveyProtocol::parse(case) {
                Err(SurveyError::ConfigurationInvalid(_)) => {}
                other => return Err(format!("expected invalid protocol, got {:?}", other)),
            }
        }

        Ok(())
    }
}
