use std::collections::BTreeMap;
use ndarray::{Array, ArrayView, Ix1, Ix3};
use crate::error::{Error, Result};
use crate::grid::GridId;
use crate::units::Unit;




/// Names of the particle fields holding particle positions, one per axis.
pub const POSITION_FIELDS: [&str; 3] = [
    "particle_position_x",
    "particle_position_y",
    "particle_position_z",
];




/**
 * An array of numeric samples paired with the unit it is expressed in. Grid
 * fields are rank 3 (one value per cell), particle fields are rank 1 (one
 * value per particle).
 */
#[derive(Clone, Debug)]
pub struct Field<D: ndarray::Dimension> {
    values: Array<f64, D>,
    unit: Unit,
}

pub type GridField = Field<Ix3>;
pub type ParticleField = Field<Ix1>;




// ============================================================================
impl<D: ndarray::Dimension> Field<D> {

    pub fn new(values: Array<f64, D>, unit: Unit) -> Self {
        Self { values, unit }
    }

    pub fn values(&self) -> ArrayView<f64, D> {
        self.values.view()
    }

    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    pub fn shape(&self) -> &[usize] {
        self.values.shape()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /**
     * Return a copy of the samples converted to the reference unit system.
     */
    pub fn to_reference(&self) -> Array<f64, D> {
        let scale = self.unit.scale();
        self.values.mapv(|x| x * scale)
    }
}




/**
 * The particles bound to one grid: a declared count and the rank-1 fields
 * describing them.
 */
#[derive(Clone, Debug, Default)]
pub struct ParticleSet {
    count: usize,
    fields: BTreeMap<String, ParticleField>,
}




// ============================================================================
impl ParticleSet {

    pub fn new(count: usize) -> Self {
        Self { count, fields: BTreeMap::new() }
    }

    pub fn with_field<S: Into<String>>(mut self, name: S, field: ParticleField) -> Self {
        self.insert(name, field);
        self
    }

    pub fn insert<S: Into<String>>(&mut self, name: S, field: ParticleField) {
        self.fields.insert(name.into(), field);
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0 && self.fields.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ParticleField> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &ParticleField)> {
        self.fields.iter()
    }

    /**
     * Return the particle positions expressed in the given length unit, if
     * all three position fields are present.
     */
    pub fn positions(&self, length: &Unit) -> Option<impl Iterator<Item = [f64; 3]> + '_> {
        let axis = |name: &str| {
            let field = self.get(name)?;
            Some((field.values(), field.unit().scale() / length.scale()))
        };
        let (x, fx) = axis(POSITION_FIELDS[0])?;
        let (y, fy) = axis(POSITION_FIELDS[1])?;
        let (z, fz) = axis(POSITION_FIELDS[2])?;
        Some((0..self.count).map(move |n| [x[n] * fx, y[n] * fy, z[n] * fz]))
    }

    /**
     * Fail unless every particle field has exactly one value per declared
     * particle.
     */
    pub fn check_lengths(&self, grid: GridId) -> Result<()> {
        for (name, field) in &self.fields {
            if field.len() != self.count {
                return Err(Error::ShapeMismatch {
                    grid: Some(grid),
                    field: name.clone(),
                    expected: vec![self.count],
                    found: field.shape().to_vec(),
                });
            }
        }
        Ok(())
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use ndarray::{arr1, Array3};
    use crate::error::Error;
    use crate::grid::GridId;
    use crate::units::{BaseQuantity, Dimension, Unit};
    use super::*;

    fn unit() -> Unit {
        Unit::new("cm", 1.0, Dimension::DIMENSIONLESS)
    }

    #[test]
    fn fields_convert_to_reference_units() {
        let field = GridField::new(Array3::from_elem((2, 2, 2), 3.0), Unit::new("km", 1e5, Dimension::DIMENSIONLESS));
        assert_eq!(field.shape(), &[2, 2, 2]);
        assert!(field.to_reference().iter().all(|&x| x == 3e5));
    }

    #[test]
    fn particle_positions_are_zipped_per_particle() {
        let particles = ParticleSet::new(2)
            .with_field("particle_position_x", ParticleField::new(arr1(&[0.1, 0.2]), unit()))
            .with_field("particle_position_y", ParticleField::new(arr1(&[0.3, 0.4]), unit()))
            .with_field("particle_position_z", ParticleField::new(arr1(&[0.5, 0.6]), unit()));
        let positions: Vec<_> = particles.positions(&unit()).unwrap().collect();
        assert_eq!(positions, vec![[0.1, 0.3, 0.5], [0.2, 0.4, 0.6]]);
        assert!(particles.check_lengths(GridId(0)).is_ok());
    }

    #[test]
    fn particle_positions_are_converted_to_the_requested_length_unit() {
        let length = BaseQuantity::Length.dimension();
        let pc = Unit::new("pc", 3.0856775814913673e18, length);
        let kpc = Unit::new("kpc", 3.0856775814913673e21, length);
        let particles = ParticleSet::new(1)
            .with_field("particle_position_x", ParticleField::new(arr1(&[500.0]), pc.clone()))
            .with_field("particle_position_y", ParticleField::new(arr1(&[250.0]), pc.clone()))
            .with_field("particle_position_z", ParticleField::new(arr1(&[0.75]), kpc.clone()));
        let p = particles.positions(&kpc).unwrap().next().unwrap();
        assert!((p[0] - 0.5).abs() < 1e-12);
        assert!((p[1] - 0.25).abs() < 1e-12);
        assert_eq!(p[2], 0.75);
    }

    #[test]
    fn missing_position_fields_yield_no_positions() {
        let particles = ParticleSet::new(1)
            .with_field("particle_mass", ParticleField::new(arr1(&[1.0]), unit()));
        assert!(particles.positions(&unit()).is_none());
    }

    #[test]
    fn particle_lengths_must_match_the_declared_count() {
        let particles = ParticleSet::new(3)
            .with_field("particle_mass", ParticleField::new(arr1(&[1.0, 2.0]), unit()));
        match particles.check_lengths(GridId(7)) {
            Err(Error::ShapeMismatch { grid, field, expected, found }) => {
                assert_eq!(grid, Some(GridId(7)));
                assert_eq!(field, "particle_mass");
                assert_eq!(expected, vec![3]);
                assert_eq!(found, vec![2]);
            }
            other => panic!("expected a shape mismatch, got {:?}", other),
        }
    }
}
