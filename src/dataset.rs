//! The dataset handle and the two ways of constructing one: from whole-domain
//! arrays split into equal chunks ("unigrid"), or from a list of nested
//! patches at increasing refinement levels ("AMR grids").

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use log::{info, warn};
use ndarray::{Array1, Array3, ArrayView1, ArrayView3};
use serde::{Deserialize, Serialize};
use crate::chunking::UniformChunker;
use crate::domain::DomainSpec;
use crate::error::{Error, Result};
use crate::field::{GridField, ParticleField, ParticleSet, POSITION_FIELDS};
use crate::geometry::{Axis, BoundingBox};
use crate::grid::{GridDescriptor, GridId};
use crate::hierarchy::{GridHierarchy, HierarchyBuilder};
use crate::units::{BaseQuantity, Dimension, Unit, UnitOverrides, UnitSpec, UnitSystem};
use crate::validate::{ConsistencyValidator, Diagnostic};




/// A grid field as supplied by the caller: cell values and their unit.
///
#[derive(Clone, Debug)]
pub struct FieldInput {
    pub values: Array3<f64>,
    pub unit: UnitSpec,
    pub dimension: Option<Dimension>,
}

impl FieldInput {
    pub fn new<U: Into<UnitSpec>>(values: Array3<f64>, unit: U) -> Self {
        Self { values, unit: unit.into(), dimension: None }
    }

    /// Require the unit to carry this dimension. A bare-number unit is then
    /// taken in the reference unit of that dimension.
    pub fn with_dimension(mut self, dimension: Dimension) -> Self {
        self.dimension = Some(dimension);
        self
    }
}




/// A particle field as supplied by the caller: one value per particle.
/// Position fields must carry a length unit; a bare number is taken in
/// centimeters.
///
#[derive(Clone, Debug)]
pub struct ParticleInput {
    pub values: Array1<f64>,
    pub unit: UnitSpec,
    pub dimension: Option<Dimension>,
}

impl ParticleInput {
    pub fn new<U: Into<UnitSpec>>(values: Array1<f64>, unit: U) -> Self {
        Self { values, unit: unit.into(), dimension: None }
    }

    pub fn with_dimension(mut self, dimension: Dimension) -> Self {
        self.dimension = Some(dimension);
        self
    }
}




/// Whether, and how strictly, the consistency checks run at construction.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Validation {
    /// Run no checks. The caller vouches for the input.
    Skip,
    /// Run the checks and return their diagnostics with the dataset.
    Report,
    /// Run the checks and fail if any diagnostic is produced.
    Strict,
}

impl Default for Validation {
    fn default() -> Self {
        Validation::Report
    }
}




/**
 * Options for building a dataset from whole-domain arrays. Every field must
 * have the shape `domain_dimensions`. The domain is split into `nprocs`
 * level-0 grids. Particles can only be supplied when `nprocs` is 1: they are
 * not distributed among chunks.
 */
#[derive(Clone, Debug)]
pub struct UniformGridConfig {
    pub fields: BTreeMap<String, FieldInput>,
    pub domain_dimensions: [usize; 3],
    pub nprocs: usize,
    pub domain: DomainSpec,
    pub units: UnitOverrides,
    pub particle_count: usize,
    pub particles: BTreeMap<String, ParticleInput>,
    pub validation: Validation,
}

impl UniformGridConfig {
    pub fn new(domain_dimensions: [usize; 3]) -> Self {
        Self {
            fields: BTreeMap::new(),
            domain_dimensions,
            nprocs: 1,
            domain: DomainSpec::default(),
            units: UnitOverrides::default(),
            particle_count: 0,
            particles: BTreeMap::new(),
            validation: Validation::default(),
        }
    }

    pub fn with_field<S: Into<String>>(mut self, name: S, field: FieldInput) -> Self {
        self.fields.insert(name.into(), field);
        self
    }

    pub fn with_nprocs(mut self, nprocs: usize) -> Self {
        self.nprocs = nprocs;
        self
    }

    pub fn with_domain(mut self, domain: DomainSpec) -> Self {
        self.domain = domain;
        self
    }

    pub fn with_units(mut self, units: UnitOverrides) -> Self {
        self.units = units;
        self
    }

    pub fn with_particle_count(mut self, count: usize) -> Self {
        self.particle_count = count;
        self
    }

    pub fn with_particle_field<S: Into<String>>(mut self, name: S, field: ParticleInput) -> Self {
        self.particles.insert(name.into(), field);
        self
    }

    pub fn with_validation(mut self, validation: Validation) -> Self {
        self.validation = validation;
        self
    }
}




/// One caller-supplied AMR patch.
///
#[derive(Clone, Debug)]
pub struct PatchSpec {
    pub left_edge: [f64; 3],
    pub right_edge: [f64; 3],
    pub level: u32,
    pub dimensions: [usize; 3],
    pub fields: BTreeMap<String, FieldInput>,
    pub particle_count: usize,
    pub particles: BTreeMap<String, ParticleInput>,
}

impl PatchSpec {
    pub fn new(left_edge: [f64; 3], right_edge: [f64; 3], level: u32, dimensions: [usize; 3]) -> Self {
        Self {
            left_edge,
            right_edge,
            level,
            dimensions,
            fields: BTreeMap::new(),
            particle_count: 0,
            particles: BTreeMap::new(),
        }
    }

    pub fn with_field<S: Into<String>>(mut self, name: S, field: FieldInput) -> Self {
        self.fields.insert(name.into(), field);
        self
    }

    pub fn with_particle_count(mut self, count: usize) -> Self {
        self.particle_count = count;
        self
    }

    pub fn with_particle_field<S: Into<String>>(mut self, name: S, field: ParticleInput) -> Self {
        self.particles.insert(name.into(), field);
        self
    }
}




/**
 * Options for building a dataset from AMR patches. `refine_by` is the ratio
 * of a parent's cell width to its children's. If `total_particles` is given,
 * the patches' particle counts must add up to it.
 */
#[derive(Clone, Debug)]
pub struct AmrGridConfig {
    pub patches: Vec<PatchSpec>,
    pub domain: DomainSpec,
    pub units: UnitOverrides,
    pub refine_by: u32,
    pub total_particles: Option<usize>,
    pub validation: Validation,
}

impl AmrGridConfig {
    pub fn new(patches: Vec<PatchSpec>) -> Self {
        Self {
            patches,
            domain: DomainSpec::default(),
            units: UnitOverrides::default(),
            refine_by: 2,
            total_particles: None,
            validation: Validation::default(),
        }
    }

    pub fn with_domain(mut self, domain: DomainSpec) -> Self {
        self.domain = domain;
        self
    }

    pub fn with_units(mut self, units: UnitOverrides) -> Self {
        self.units = units;
        self
    }

    pub fn with_refine_by(mut self, refine_by: u32) -> Self {
        self.refine_by = refine_by;
        self
    }

    pub fn with_total_particles(mut self, total: usize) -> Self {
        self.total_particles = Some(total);
        self
    }

    pub fn with_validation(mut self, validation: Validation) -> Self {
        self.validation = validation;
        self
    }
}




/// A successfully constructed dataset together with the consistency
/// diagnostics found while building it.
///
#[derive(Debug)]
pub struct Loaded {
    pub dataset: Dataset,
    pub diagnostics: Vec<Diagnostic>,
}

impl Loaded {
    pub fn is_consistent(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Return the dataset, or fail if any diagnostic was reported.
    pub fn into_strict(self) -> Result<Dataset> {
        if self.diagnostics.is_empty() {
            Ok(self.dataset)
        } else {
            Err(Error::Consistency(self.diagnostics))
        }
    }
}




/**
 * A read-only, hierarchical spatial dataset: domain metadata, the dataset's
 * unit system and its grid hierarchy. Once built it never changes, and can
 * be shared between threads for concurrent reading.
 */
#[derive(Clone, Debug)]
pub struct Dataset {
    domain: DomainSpec,
    domain_dimensions: [usize; 3],
    units: Arc<UnitSystem>,
    hierarchy: GridHierarchy,
}




// ============================================================================
impl Dataset {

    /**
     * Build a dataset from whole-domain arrays, split into `nprocs` level-0
     * grids.
     */
    pub fn load_uniform_grid(config: UniformGridConfig) -> Result<Loaded> {
        let UniformGridConfig {
            fields,
            domain_dimensions,
            nprocs,
            domain,
            units,
            particle_count,
            particles,
            validation,
        } = config;

        domain.validate()?;

        if domain_dimensions.iter().any(|&n| n == 0) {
            return Err(Error::config(format!("domain dimensions {:?} must all be positive", domain_dimensions)));
        }
        if fields.is_empty() {
            return Err(Error::config("a uniform grid needs at least one field"));
        }
        let has_particles = particle_count > 0 || !particles.is_empty();

        if has_particles && nprocs > 1 {
            return Err(Error::config(format!(
                "particles cannot be split across {} chunks; bind them to grids with the AMR loader instead",
                nprocs)));
        }

        let units = UnitSystem::new(&units)?;
        let fields = fields
            .into_iter()
            .map(|(name, input)| {
                let field = resolve_grid_field(&units, &name, input)?;
                Ok((name, field))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        let mut particles = if has_particles {
            Some(resolve_particles(&units, GridId(0), particle_count, particles)?)
        } else {
            None
        };

        let chunks = UniformChunker::new(&domain, domain_dimensions).chunk(&fields, nprocs)?;
        let mut builder = HierarchyBuilder::new();

        for chunk in chunks {
            match particles.take() {
                Some(p) => builder.push(chunk.grid.with_particles(p)),
                None => builder.push(chunk.grid),
            }
        }

        let hierarchy = builder.build()?;
        let dataset = Dataset {
            domain,
            domain_dimensions,
            units: Arc::new(units),
            hierarchy,
        };
        let validator = ConsistencyValidator::new(&dataset.hierarchy, &dataset.domain)
            .with_units(&dataset.units)
            .with_expected_particles(Some(particle_count));
        let diagnostics = run_validation(&validator, validation)?;

        dataset.log_summary();
        Ok(Loaded { dataset, diagnostics })
    }

    /**
     * Build a dataset from a list of AMR patches. Grid ids of the result are
     * positions in level order; for input already in level order they equal
     * the input positions.
     */
    pub fn load_amr_grids(config: AmrGridConfig) -> Result<Loaded> {
        let AmrGridConfig {
            patches,
            domain,
            units,
            refine_by,
            total_particles,
            validation,
        } = config;

        domain.validate()?;

        if patches.is_empty() {
            return Err(Error::config("AMR construction needs at least one patch"));
        }
        if refine_by < 2 {
            return Err(Error::config(format!("refinement ratio {} must be at least 2", refine_by)));
        }

        let units = UnitSystem::new(&units)?;
        let mut builder = HierarchyBuilder::new();

        for (n, patch) in patches.into_iter().enumerate() {
            let id = GridId(n);
            let mut grid = GridDescriptor::new(patch.left_edge, patch.right_edge, patch.level, patch.dimensions);

            for (name, input) in patch.fields {
                let field = resolve_grid_field(&units, &name, input)?;
                grid.insert_field(name, field);
            }
            let grid = grid.with_particles(resolve_particles(&units, id, patch.particle_count, patch.particles)?);
            grid.validate(id)?;
            builder.push(grid);
        }

        let hierarchy = builder.build()?;
        let domain_dimensions = level_zero_dimensions(&domain.bbox, &hierarchy);
        let dataset = Dataset {
            domain,
            domain_dimensions,
            units: Arc::new(units),
            hierarchy,
        };
        let validator = ConsistencyValidator::new(&dataset.hierarchy, &dataset.domain)
            .with_units(&dataset.units)
            .with_refine_by(refine_by)
            .with_expected_particles(total_particles);
        let diagnostics = run_validation(&validator, validation)?;

        dataset.log_summary();
        Ok(Loaded { dataset, diagnostics })
    }




    pub fn domain(&self) -> &DomainSpec {
        &self.domain
    }

    pub fn bounding_box(&self) -> &BoundingBox {
        &self.domain.bbox
    }

    pub fn periodicity(&self) -> [bool; 3] {
        self.domain.periodicity
    }

    pub fn current_time(&self) -> f64 {
        self.domain.current_time
    }

    /// Return the number of level-0 cells along each axis.
    pub fn domain_dimensions(&self) -> [usize; 3] {
        self.domain_dimensions
    }

    pub fn units(&self) -> &UnitSystem {
        &self.units
    }

    pub fn hierarchy(&self) -> &GridHierarchy {
        &self.hierarchy
    }

    pub fn num_grids(&self) -> usize {
        self.hierarchy.len()
    }

    pub fn max_level(&self) -> u32 {
        self.hierarchy.max_level()
    }

    pub fn total_particles(&self) -> usize {
        self.hierarchy.total_particles()
    }

    /// Iterate over all grids in level order, coarsest first.
    pub fn grids(&self) -> impl Iterator<Item = (GridId, &GridDescriptor)> {
        self.hierarchy.iter()
    }

    pub fn grids_at_level(&self, level: u32) -> impl Iterator<Item = (GridId, &GridDescriptor)> {
        self.hierarchy.level(level)
    }

    pub fn grid(&self, id: GridId) -> Option<&GridDescriptor> {
        self.hierarchy.grid(id)
    }

    pub fn parent(&self, id: GridId) -> Option<GridId> {
        self.hierarchy.parent(id)
    }

    pub fn children(&self, id: GridId) -> &[GridId] {
        self.hierarchy.children(id)
    }

    /// Return the names of the grid fields present on any grid.
    pub fn field_names(&self) -> BTreeSet<&str> {
        self.grids().flat_map(|(_, g)| g.field_names()).collect()
    }

    /// Look up a grid field by name on one grid.
    pub fn field(&self, id: GridId, name: &str) -> Option<(ArrayView3<f64>, &Unit)> {
        self.grid(id)?.field(name).map(|f| (f.values(), f.unit()))
    }

    /// Look up a particle field by name on one grid.
    pub fn particle_field(&self, id: GridId, name: &str) -> Option<(ArrayView1<f64>, &Unit)> {
        self.grid(id)?.particles().get(name).map(|f| (f.values(), f.unit()))
    }

    fn log_summary(&self) {
        info!(
            "loaded {} grids on {} levels over {:?}..{:?} with {} particles",
            self.num_grids(),
            self.hierarchy.num_levels(),
            self.domain.bbox.lower,
            self.domain.bbox.upper,
            self.total_particles());
    }
}




fn resolve_unit(units: &UnitSystem, name: &str, spec: &UnitSpec, dimension: Option<Dimension>) -> Result<Unit> {
    match dimension {
        Some(d) => units.resolve_as(spec, name, d),
        None => units.resolve(spec),
    }
}

fn resolve_grid_field(units: &UnitSystem, name: &str, input: FieldInput) -> Result<GridField> {
    let unit = resolve_unit(units, name, &input.unit, input.dimension)?;
    Ok(GridField::new(input.values, unit))
}

fn resolve_particles(
    units: &UnitSystem,
    grid: GridId,
    count: usize,
    inputs: BTreeMap<String, ParticleInput>) -> Result<ParticleSet>
{
    let mut particles = ParticleSet::new(count);

    for (name, input) in inputs {
        let dimension = match input.dimension {
            None if POSITION_FIELDS.contains(&name.as_str()) => Some(BaseQuantity::Length.dimension()),
            declared => declared,
        };
        let unit = resolve_unit(units, &name, &input.unit, dimension)?;
        particles.insert(name, ParticleField::new(input.values, unit));
    }
    particles.check_lengths(grid)?;
    Ok(particles)
}

fn run_validation(validator: &ConsistencyValidator, validation: Validation) -> Result<Vec<Diagnostic>> {
    match validation {
        Validation::Skip => {
            warn!("consistency checks skipped; grid coverage, nesting and particle placement are unverified");
            Ok(Vec::new())
        }
        Validation::Report => {
            let diagnostics = validator.run();
            for diagnostic in &diagnostics {
                warn!("{}", diagnostic);
            }
            Ok(diagnostics)
        }
        Validation::Strict => {
            let diagnostics = validator.run();
            if diagnostics.is_empty() {
                Ok(diagnostics)
            } else {
                Err(Error::Consistency(diagnostics))
            }
        }
    }
}

/**
 * Return the number of cells the domain would have along each axis at the
 * resolution of the level-0 grids.
 */
fn level_zero_dimensions(bbox: &BoundingBox, hierarchy: &GridHierarchy) -> [usize; 3] {
    let mut dims = [0; 3];

    if let Some((_, root)) = hierarchy.roots().next() {
        let dx = root.cell_widths();
        for &a in Axis::ALL.iter() {
            dims[a.index()] = (bbox.width(a) / dx[a.index()]).round() as usize;
        }
    }
    dims
}




// ============================================================================
#[cfg(test)]
mod test {

    use ndarray::{arr1, Array1, Array3};
    use crate::error::{Error, ErrorKind};
    use crate::units::BaseQuantity;
    use crate::validate::DiagnosticKind;
    use super::*;

    fn density(dims: [usize; 3]) -> FieldInput {
        FieldInput::new(Array3::from_elem((dims[0], dims[1], dims[2]), 1.0), "g/cm**3")
    }

    fn positions(config: UniformGridConfig, points: &[[f64; 3]]) -> UniformGridConfig {
        let axis = |k: usize| ParticleInput::new(points.iter().map(|p| p[k]).collect::<Array1<f64>>(), "code_length");
        config
            .with_particle_count(points.len())
            .with_particle_field("particle_position_x", axis(0))
            .with_particle_field("particle_position_y", axis(1))
            .with_particle_field("particle_position_z", axis(2))
    }

    fn patch(l: [f64; 3], r: [f64; 3], level: u32, n: usize) -> PatchSpec {
        PatchSpec::new(l, r, level, [n; 3]).with_field("density", density([n; 3]))
    }

    #[test]
    fn unigrid_of_sixty_four_cubed_splits_into_sixty_four_grids() {
        let domain = DomainSpec::default().with_bbox([-1.5; 3], [1.5; 3]);
        let config = UniformGridConfig::new([64, 64, 64])
            .with_field("density", density([64, 64, 64]))
            .with_nprocs(64)
            .with_domain(domain);

        let loaded = Dataset::load_uniform_grid(config).unwrap();
        assert!(loaded.is_consistent(), "{:?}", loaded.diagnostics);

        let dataset = loaded.dataset;
        assert_eq!(dataset.num_grids(), 64);
        assert_eq!(dataset.max_level(), 0);
        assert!(dataset.grids().all(|(_, g)| g.dimensions() == [16, 16, 16]));
        assert_eq!(dataset.domain_dimensions(), [64, 64, 64]);

        let volume: f64 = dataset.grids().map(|(_, g)| g.volume()).sum();
        assert!((volume - 27.0).abs() < 1e-12);

        let (values, unit) = dataset.field(GridId(5), "density").unwrap();
        assert_eq!(values.dim(), (16, 16, 16));
        assert_eq!(unit.symbol(), "g/cm**3");
        assert!(dataset.field(GridId(5), "temperature").is_none());
        assert!(dataset.field(GridId(64), "density").is_none());
    }

    #[test]
    fn field_units_resolve_against_the_dataset_code_units() {
        let config = UniformGridConfig::new([4, 4, 4])
            .with_field("density", FieldInput::new(Array3::zeros((4, 4, 4)), "code_mass/code_length**3"))
            .with_units(UnitOverrides::default().with_length("kpc").with_mass((1e10, "Msun")));
        let dataset = Dataset::load_uniform_grid(config).unwrap().dataset;

        let (_, unit) = dataset.field(GridId(0), "density").unwrap();
        let length = dataset.units().base(BaseQuantity::Length).scale();
        let mass = dataset.units().base(BaseQuantity::Mass).scale();
        assert!((unit.scale() - mass / length.powi(3)).abs() <= 1e-12 * unit.scale());
    }

    #[test]
    fn declared_field_dimension_is_enforced() {
        let length = BaseQuantity::Length.dimension();
        let config = UniformGridConfig::new([4, 4, 4])
            .with_field("dx", FieldInput::new(Array3::zeros((4, 4, 4)), "Myr").with_dimension(length));
        let err = Dataset::load_uniform_grid(config).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { ref quantity, .. } if quantity == "dx"));
    }

    #[test]
    fn unigrid_particles_attach_to_the_single_grid() {
        let config = positions(UniformGridConfig::new([8, 8, 8]).with_field("density", density([8, 8, 8])), &[[0.5; 3], [0.1; 3]]);
        let loaded = Dataset::load_uniform_grid(config).unwrap();
        assert!(loaded.is_consistent());
        assert_eq!(loaded.dataset.total_particles(), 2);

        let (x, unit) = loaded.dataset.particle_field(GridId(0), "particle_position_x").unwrap();
        assert_eq!(x.to_vec(), vec![0.5, 0.1]);
        assert_eq!(unit.scale(), 1.0);
    }

    #[test]
    fn particle_positions_in_other_length_units_are_located_correctly() {
        let pc = |x: f64| ParticleInput::new(arr1(&[x]), "pc");
        let config = |x: f64| UniformGridConfig::new([8, 8, 8])
            .with_field("density", density([8, 8, 8]))
            .with_units(UnitOverrides::default().with_length("kpc"))
            .with_particle_count(1)
            .with_particle_field("particle_position_x", pc(x))
            .with_particle_field("particle_position_y", pc(x))
            .with_particle_field("particle_position_z", pc(x));

        assert!(Dataset::load_uniform_grid(config(500.0)).unwrap().is_consistent());

        let loaded = Dataset::load_uniform_grid(config(1500.0)).unwrap();
        assert_eq!(loaded.diagnostics.len(), 1);
        assert_eq!(loaded.diagnostics[0].kind, DiagnosticKind::ParticleOutsideGrid);
    }

    #[test]
    fn particle_positions_must_be_lengths() {
        let config = UniformGridConfig::new([8, 8, 8])
            .with_field("density", density([8, 8, 8]))
            .with_particle_count(1)
            .with_particle_field("particle_position_x", ParticleInput::new(arr1(&[0.5]), "Myr"));
        let err = Dataset::load_uniform_grid(config).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { ref quantity, .. } if quantity == "particle_position_x"));
    }

    #[test]
    fn unigrid_particles_are_not_split_across_chunks() {
        let config = positions(UniformGridConfig::new([8, 8, 8]).with_field("density", density([8, 8, 8])), &[[0.5; 3]])
            .with_nprocs(8);
        let err = Dataset::load_uniform_grid(config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn particle_count_must_match_particle_arrays() {
        let config = UniformGridConfig::new([8, 8, 8])
            .with_field("density", density([8, 8, 8]))
            .with_particle_count(3)
            .with_particle_field("particle_mass", ParticleInput::new(arr1(&[1.0, 1.0]), "Msun"));
        let err = Dataset::load_uniform_grid(config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
    }

    #[test]
    fn bad_unigrid_arguments_are_rejected_eagerly() {
        let no_fields = UniformGridConfig::new([8, 8, 8]);
        assert_eq!(Dataset::load_uniform_grid(no_fields).unwrap_err().kind(), ErrorKind::Configuration);

        let zero_chunks = UniformGridConfig::new([8, 8, 8]).with_field("density", density([8, 8, 8])).with_nprocs(0);
        assert_eq!(Dataset::load_uniform_grid(zero_chunks).unwrap_err().kind(), ErrorKind::Chunking);

        let wrong_shape = UniformGridConfig::new([8, 8, 8]).with_field("density", density([8, 8, 4]));
        assert_eq!(Dataset::load_uniform_grid(wrong_shape).unwrap_err().kind(), ErrorKind::ShapeMismatch);

        let bad_unit = UniformGridConfig::new([8, 8, 8]).with_field("density", FieldInput::new(Array3::zeros((8, 8, 8)), "slug"));
        assert_eq!(Dataset::load_uniform_grid(bad_unit).unwrap_err().kind(), ErrorKind::UnitResolution);
    }

    #[test]
    fn amr_patches_build_a_linked_hierarchy() {
        let patches = vec![
            patch([0.0; 3], [1.0; 3], 0, 8),
            patch([0.25; 3], [0.75; 3], 1, 8)
                .with_particle_count(1)
                .with_particle_field("particle_position_x", ParticleInput::new(arr1(&[0.5]), "code_length"))
                .with_particle_field("particle_position_y", ParticleInput::new(arr1(&[0.5]), "code_length"))
                .with_particle_field("particle_position_z", ParticleInput::new(arr1(&[0.5]), "code_length")),
            patch([0.25; 3], [0.5; 3], 2, 8),
        ];
        let config = AmrGridConfig::new(patches)
            .with_total_particles(1)
            .with_domain(DomainSpec::default().with_current_time(4.0).with_periodicity([true, false, false]));

        let loaded = Dataset::load_amr_grids(config).unwrap();
        assert!(loaded.is_consistent(), "{:?}", loaded.diagnostics);

        let dataset = loaded.into_strict().unwrap();
        assert_eq!(dataset.num_grids(), 3);
        assert_eq!(dataset.max_level(), 2);
        assert_eq!(dataset.parent(GridId(2)), Some(GridId(1)));
        assert_eq!(dataset.children(GridId(0)), &[GridId(1)]);
        assert_eq!(dataset.grids_at_level(1).count(), 1);
        assert_eq!(dataset.domain_dimensions(), [8, 8, 8]);
        assert_eq!(dataset.current_time(), 4.0);
        assert_eq!(dataset.periodicity(), [true, false, false]);
        assert_eq!(dataset.field_names().into_iter().collect::<Vec<_>>(), vec!["density"]);
    }

    #[test]
    fn straddling_patch_aborts_amr_construction() {
        let patches = vec![
            patch([0.0, 0.0, 0.0], [0.5, 1.0, 1.0], 0, 4),
            patch([0.5, 0.0, 0.0], [1.0, 1.0, 1.0], 0, 4),
            patch([0.25; 3], [0.75; 3], 1, 4),
        ];
        let err = Dataset::load_amr_grids(AmrGridConfig::new(patches)).unwrap_err();
        assert!(matches!(err, Error::AmbiguousParent { grid: GridId(2), .. }));
    }

    #[test]
    fn misshapen_patch_field_names_the_patch() {
        let patches = vec![
            patch([0.0; 3], [1.0; 3], 0, 4),
            PatchSpec::new([0.25; 3], [0.75; 3], 1, [4, 4, 4]).with_field("density", density([4, 4, 2])),
        ];
        match Dataset::load_amr_grids(AmrGridConfig::new(patches)).unwrap_err() {
            Error::ShapeMismatch { grid, field, .. } => {
                assert_eq!(grid, Some(GridId(1)));
                assert_eq!(field, "density");
            }
            other => panic!("expected a shape mismatch, got {:?}", other),
        }
    }

    #[test]
    fn validation_policy_decides_whether_diagnostics_are_fatal() {
        let gappy = || vec![patch([0.0, 0.0, 0.0], [0.5, 1.0, 1.0], 0, 4)];

        let loaded = Dataset::load_amr_grids(AmrGridConfig::new(gappy())).unwrap();
        assert_eq!(loaded.diagnostics.len(), 1);
        assert_eq!(loaded.diagnostics[0].kind, DiagnosticKind::CoverageGap);
        assert_eq!(loaded.into_strict().unwrap_err().kind(), ErrorKind::ConsistencyViolation);

        let strict = AmrGridConfig::new(gappy()).with_validation(Validation::Strict);
        assert!(matches!(Dataset::load_amr_grids(strict), Err(Error::Consistency(ref d)) if d.len() == 1));

        let skipped = AmrGridConfig::new(gappy()).with_validation(Validation::Skip);
        assert!(Dataset::load_amr_grids(skipped).unwrap().is_consistent());
    }

    #[test]
    fn declared_total_particles_are_conserved() {
        let patches = vec![
            patch([0.0; 3], [1.0; 3], 0, 8),
            patch([0.0; 3], [0.5; 3], 1, 8).with_particle_count(1000),
            patch([0.5; 3], [1.0; 3], 1, 8).with_particle_count(250),
        ];
        let ok = AmrGridConfig::new(patches.clone()).with_total_particles(1250);
        assert!(Dataset::load_amr_grids(ok).unwrap().is_consistent());

        let short = AmrGridConfig::new(patches).with_total_particles(1000);
        let loaded = Dataset::load_amr_grids(short).unwrap();
        assert_eq!(loaded.diagnostics.len(), 1);
        assert_eq!(loaded.diagnostics[0].kind, DiagnosticKind::ParticleCountMismatch);
    }

    #[test]
    fn bad_amr_arguments_are_rejected_eagerly() {
        assert_eq!(Dataset::load_amr_grids(AmrGridConfig::new(Vec::new())).unwrap_err().kind(), ErrorKind::Configuration);

        let once = AmrGridConfig::new(vec![patch([0.0; 3], [1.0; 3], 0, 4)]).with_refine_by(1);
        assert_eq!(Dataset::load_amr_grids(once).unwrap_err().kind(), ErrorKind::Configuration);

        let inverted = AmrGridConfig::new(vec![patch([0.0; 3], [1.0; 3], 0, 4)])
            .with_domain(DomainSpec::default().with_bbox([1.0; 3], [0.0; 3]));
        assert_eq!(Dataset::load_amr_grids(inverted).unwrap_err().kind(), ErrorKind::Configuration);

        let wrong_unit = AmrGridConfig::new(vec![patch([0.0; 3], [1.0; 3], 0, 4)])
            .with_units(UnitOverrides::default().with_mass("km"));
        assert_eq!(Dataset::load_amr_grids(wrong_unit).unwrap_err().kind(), ErrorKind::UnitResolution);
    }

    #[test]
    fn datasets_can_be_shared_between_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Dataset>();

        let dataset = Arc::new(Dataset::load_amr_grids(AmrGridConfig::new(vec![patch([0.0; 3], [1.0; 3], 0, 4)])).unwrap().dataset);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let dataset = Arc::clone(&dataset);
                std::thread::spawn(move || dataset.grids().count())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 1);
        }
    }
}
