//! Running distance/time totals of a mission

use geo::geometry::Point;
use geo::HaversineDistance;
use time::OffsetDateTime;
use tracing::debug;

use crate::model::{AttributeValue, Attributes, Fix};
use crate::protocol::{TotalizerDefinition, TotalizerUnits};

const METERS_PER_MILE: f64 = 1609.344;

/// Distance and time accumulated in one bucket
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Tally {
    pub meters: f64,
    pub seconds: f64,
}

impl Tally {
    fn add(&mut self, meters: f64, seconds: f64) {
        self.meters += meters;
        self.seconds += seconds;
    }

    fn format(&self, units: TotalizerUnits) -> String {
        match units {
            TotalizerUnits::Kilometers => format!("{:.2} km", self.meters / 1000.0),
            TotalizerUnits::Miles => format!("{:.2} mi", self.meters / METERS_PER_MILE),
            TotalizerUnits::Minutes => format!("{:.0} min", self.seconds / 60.0),
        }
    }
}

/// Splits travelled distance and time by observing state.
///
/// Counting only happens between [`Totalizer::setup`] and
/// [`Totalizer::clear`]. A change in any watched attribute restarts all
/// counts at zero.
#[derive(Clone, Debug, Default)]
pub struct Totalizer {
    definition: Option<TotalizerDefinition>,
    observing: bool,
    last: Option<(Point, OffsetDateTime)>,
    watched: Option<Vec<Option<AttributeValue>>>,
    pub total: Tally,
    pub on: Tally,
    pub off: Tally,
}

impl Totalizer {
    pub fn setup(&mut self, definition: &TotalizerDefinition) {
        self.clear();
        self.definition = Some(definition.clone());
    }

    pub fn clear(&mut self) {
        *self = Totalizer::default();
    }

    pub fn is_active(&self) -> bool {
        self.definition.is_some()
    }

    pub fn update_location(&mut self, fix: &Fix) {
        if !self.is_active() {
            return;
        }
        if let Some((point, time)) = self.last {
            let meters = point.haversine_distance(&fix.coordinates);
            let seconds = (fix.time - time).as_seconds_f64().max(0.0);
            self.total.add(meters, seconds);
            if self.observing {
                self.on.add(meters, seconds);
            } else {
                self.off.add(meters, seconds);
            }
        }
        self.last = Some((fix.coordinates, fix.time));
    }

    pub fn update_properties(&mut self, observing: bool, attributes: &Attributes) {
        let definition = match &self.definition {
            Some(d) => d,
            None => return,
        };
        self.observing = observing;

        let values: Vec<Option<AttributeValue>> = definition
            .watched()
            .iter()
            .map(|name| attributes.get(name).cloned())
            .collect();
        if let Some(previous) = &self.watched {
            if *previous != values {
                debug!("watched attribute changed, totalizer restarted");
                self.total = Tally::default();
                self.on = Tally::default();
                self.off = Tally::default();
            }
        }
        self.watched = Some(values);
    }

    /// Summary in the configured units, empty when inactive
    pub fn text(&self) -> String {
        let definition = match &self.definition {
            Some(d) => d,
            None => return String::new(),
        };

        let mut parts = vec![];
        if definition.include_on {
            parts.push(format!("On: {}", self.on.format(definition.units)));
        }
        if definition.include_off {
            parts.push(format!("Off: {}", self.off.format(definition.units)));
        }
        if definition.include_total {
            parts.push(format!("Total: {}", self.total.format(definition.units)));
        }
        parts.join("; ")
    }
}
