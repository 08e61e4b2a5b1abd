use core::fmt;
use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};
use crate::field::{GridField, ParticleSet};
use crate::geometry::{Axis, BoundingBox};




/// Identifier of a grid within a hierarchy: its position in the hierarchy's
/// level-ordered arena.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GridId(pub usize);

impl fmt::Display for GridId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}", self.0)
    }
}




/**
 * A grid is one rectangular patch of cells at a given refinement level. It
 * covers a physical region given by its left and right edges, which is
 * divided uniformly into `dimensions` cells along each axis. Each grid field
 * holds one value per cell; the grid also owns the particles bound to it.
 *
 * Level 0 is the coarsest level. A grid at level L > 0 is nested inside
 * exactly one grid at level L - 1; that relationship is recorded by the
 * `GridHierarchy`, not by the grid.
 */
#[derive(Clone, Debug)]
pub struct GridDescriptor {
    bounds: BoundingBox,
    level: u32,
    dimensions: [usize; 3],
    fields: BTreeMap<String, GridField>,
    particles: ParticleSet,
}




impl GridDescriptor {




    pub fn new(left_edge: [f64; 3], right_edge: [f64; 3], level: u32, dimensions: [usize; 3]) -> Self {
        Self {
            bounds: BoundingBox::new(left_edge, right_edge),
            level,
            dimensions,
            fields: BTreeMap::new(),
            particles: ParticleSet::default(),
        }
    }


    pub fn with_field<S: Into<String>>(mut self, name: S, field: GridField) -> Self {
        self.insert_field(name, field);
        self
    }


    pub fn with_particles(mut self, particles: ParticleSet) -> Self {
        self.particles = particles;
        self
    }


    pub fn insert_field<S: Into<String>>(&mut self, name: S, field: GridField) {
        self.fields.insert(name.into(), field);
    }




    pub fn left_edge(&self) -> [f64; 3] {
        self.bounds.lower
    }

    pub fn right_edge(&self) -> [f64; 3] {
        self.bounds.upper
    }

    pub fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    /// Return the number of cells along each axis.
    pub fn dimensions(&self) -> [usize; 3] {
        self.dimensions
    }

    pub fn cell_count(&self) -> usize {
        self.dimensions.iter().product()
    }

    pub fn volume(&self) -> f64 {
        self.bounds.volume()
    }




    /**
     * Return the physical width of one cell along each axis.
     */
    pub fn cell_widths(&self) -> [f64; 3] {
        let mut dx = self.bounds.widths();
        for a in Axis::ALL.iter() {
            dx[a.index()] /= self.dimensions[a.index()] as f64
        }
        dx
    }

    pub fn field(&self, name: &str) -> Option<&GridField> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &GridField)> {
        self.fields.iter()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn particles(&self) -> &ParticleSet {
        &self.particles
    }

    pub fn particle_count(&self) -> usize {
        self.particles.count()
    }




    /**
     * Check the structural invariants of this grid: ordered edges, a
     * positive number of cells on each axis, grid fields shaped like the
     * cell dimensions and particle fields sized like the particle count.
     */
    pub fn validate(&self, id: GridId) -> Result<()> {
        if !self.bounds.is_valid() {
            return Err(Error::config(format!(
                "grid {} has left edge {:?} not below right edge {:?}",
                id,
                self.bounds.lower,
                self.bounds.upper)));
        }
        if self.dimensions.iter().any(|&n| n == 0) {
            return Err(Error::config(format!(
                "grid {} has dimensions {:?}; every axis needs at least one cell",
                id,
                self.dimensions)));
        }
        for (name, field) in &self.fields {
            if field.shape() != &self.dimensions[..] {
                return Err(Error::ShapeMismatch {
                    grid: Some(id),
                    field: name.clone(),
                    expected: self.dimensions.to_vec(),
                    found: field.shape().to_vec(),
                });
            }
        }
        self.particles.check_lengths(id)
    }
}
