use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};
use crate::geometry::BoundingBox;




/// Physical extent of the simulation domain, its boundary periodicity and
/// the simulation time the data belong to.
///
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainSpec {
    pub bbox: BoundingBox,
    pub periodicity: [bool; 3],
    pub current_time: f64,
}

impl DomainSpec {
    pub fn with_bbox(mut self, lower: [f64; 3], upper: [f64; 3]) -> Self {
        self.bbox = BoundingBox::new(lower, upper);
        self
    }

    pub fn with_periodicity(mut self, periodicity: [bool; 3]) -> Self {
        self.periodicity = periodicity;
        self
    }

    pub fn with_current_time(mut self, current_time: f64) -> Self {
        self.current_time = current_time;
        self
    }

    /// Fail unless the bounding box has positive, finite extent on every
    /// axis and the time is finite.
    pub fn validate(&self) -> Result<()> {
        if !self.bbox.is_valid() {
            return Err(Error::config(format!(
                "domain lower corner {:?} must be below upper corner {:?} on every axis",
                self.bbox.lower,
                self.bbox.upper)));
        }
        if !self.current_time.is_finite() {
            return Err(Error::config(format!("simulation time {} is not finite", self.current_time)));
        }
        Ok(())
    }
}

impl Default for DomainSpec {
    fn default() -> Self {
        Self {
            bbox: BoundingBox::default(),
            periodicity: [true; 3],
            current_time: 0.0,
        }
    }
}
