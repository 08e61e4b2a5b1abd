//! Certification of the geometric and particle invariants of a built grid
//! hierarchy. Every check reports what it finds as a list of [`Diagnostic`]s
//! instead of failing on the first problem; whether a diagnostic is fatal is
//! up to the caller.

use core::fmt;
use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use crate::domain::DomainSpec;
use crate::geometry::{Axis, BoundingBox};
use crate::grid::{GridDescriptor, GridId};
use crate::hierarchy::GridHierarchy;
use crate::units::{BaseQuantity, Unit, UnitSystem};

/// Relative tolerance on the covered volume of the domain.
const COVERAGE_TOLERANCE: f64 = 1e-9;

/// Relative tolerance on the ratio of parent to child cell widths.
const REFINEMENT_TOLERANCE: f64 = 1e-6;




/// The independent checks run by the validator.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Check {
    Coverage,
    Containment,
    Refinement,
    ParticleLocality,
    CountConservation,
}




/// What a diagnostic is about. Ordered by the check that produces it.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DiagnosticKind {
    /// The level-0 grids leave part of the domain uncovered.
    CoverageGap,
    /// Two level-0 grids overlap.
    CoverageOverlap,
    /// A level-0 grid extends beyond the domain.
    OutsideDomain,
    /// A grid is not contained in one of its ancestors, or is not linked to
    /// a parent one level coarser.
    ContainmentBreach,
    /// A grid's cells are not its parent's cells divided by the refinement
    /// ratio.
    RefinementMismatch,
    /// Particles bound to a grid lie outside of it.
    ParticleOutsideGrid,
    /// Particles bound to a grid lie inside one of its children.
    ParticleInRefinedRegion,
    /// The per-grid particle counts do not add up to the declared total.
    ParticleCountMismatch,
}

impl DiagnosticKind {
    pub fn check(self) -> Check {
        use DiagnosticKind::*;

        match self {
            CoverageGap | CoverageOverlap | OutsideDomain => Check::Coverage,
            ContainmentBreach => Check::Containment,
            RefinementMismatch => Check::Refinement,
            ParticleOutsideGrid | ParticleInRefinedRegion => Check::ParticleLocality,
            ParticleCountMismatch => Check::CountConservation,
        }
    }
}




/**
 * One failed invariant: its kind, the grids involved, a numeric measure of
 * the violation (a volume, distance, ratio or particle count, depending on
 * the kind) and a readable description.
 */
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub grids: Vec<GridId>,
    pub magnitude: f64,
    pub message: String,
}

impl Diagnostic {
    fn new(kind: DiagnosticKind, grids: Vec<GridId>, magnitude: f64, message: String) -> Self {
        Self { kind, grids, magnitude, message }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{:?} {:?}: {}", self.kind, self.grids, self.message)
    }
}




/**
 * Runs the consistency checks over a hierarchy. The checks are independent
 * and run concurrently; their diagnostics are merged and sorted by kind and
 * then by grid.
 */
pub struct ConsistencyValidator<'a> {
    hierarchy: &'a GridHierarchy,
    domain: &'a DomainSpec,
    length: Unit,
    refine_by: Option<u32>,
    expected_particles: Option<usize>,
}




// ============================================================================
impl<'a> ConsistencyValidator<'a> {

    pub fn new(hierarchy: &'a GridHierarchy, domain: &'a DomainSpec) -> Self {
        Self {
            hierarchy,
            domain,
            length: UnitSystem::reference().base(BaseQuantity::Length).clone(),
            refine_by: None,
            expected_particles: None,
        }
    }

    /// Take grid edges to be in the code length of this unit system. Particle
    /// positions are converted to it before they are located.
    pub fn with_units(mut self, units: &UnitSystem) -> Self {
        self.length = units.base(BaseQuantity::Length).clone();
        self
    }

    /// Also check that every child refines its parent by this ratio.
    pub fn with_refine_by(mut self, refine_by: u32) -> Self {
        self.refine_by = Some(refine_by);
        self
    }

    /// Also check that the grids' particle counts add up to this total.
    pub fn with_expected_particles(mut self, total: Option<usize>) -> Self {
        self.expected_particles = total;
        self
    }

    pub fn run(&self) -> Vec<Diagnostic> {
        let ((coverage, containment), (refinement, (locality, count))) = rayon::join(
            || rayon::join(
                || self.check_coverage(),
                || self.check_containment()),
            || rayon::join(
                || self.check_refinement(),
                || rayon::join(
                    || self.check_particle_locality(),
                    || self.check_count_conservation())));

        let mut diagnostics: Vec<_> = coverage
            .into_iter()
            .chain(containment)
            .chain(refinement)
            .chain(locality)
            .chain(count)
            .collect();

        diagnostics.sort_by(|a, b| (a.kind, &a.grids).cmp(&(b.kind, &b.grids)));
        diagnostics
    }




    /**
     * The level-0 grids must lie inside the domain, must not overlap one
     * another, and together must cover all of it.
     */
    pub fn check_coverage(&self) -> Vec<Diagnostic> {
        let bbox = &self.domain.bbox;
        let mut diagnostics = Vec::new();
        let mut roots: Vec<(GridId, &BoundingBox)> = self.hierarchy
            .roots()
            .map(|(id, g)| (id, g.bounds()))
            .collect();

        for &(id, root) in &roots {
            if !bbox.contains_box(root) {
                let outside = root.volume() - root.intersection_volume(bbox);
                diagnostics.push(Diagnostic::new(
                    DiagnosticKind::OutsideDomain,
                    vec![id],
                    outside,
                    format!("extends outside the domain {:?}..{:?}", bbox.lower, bbox.upper)));
            }
        }

        roots.sort_by(|a, b| a.1.lower[0].partial_cmp(&b.1.lower[0]).unwrap_or(core::cmp::Ordering::Equal));

        let mut overlapping = false;

        for (n, &(a, ra)) in roots.iter().enumerate() {
            for &(b, rb) in roots[n + 1..].iter().take_while(|(_, rb)| rb.lower[0] < ra.upper[0]) {
                if ra.overlaps(rb) {
                    let shared = ra.intersection_volume(rb);
                    overlapping = true;
                    diagnostics.push(Diagnostic::new(
                        DiagnosticKind::CoverageOverlap,
                        vec![a.min(b), a.max(b)],
                        shared,
                        format!("level-0 grids {} and {} overlap by volume {:e}", a, b, shared)));
                }
            }
        }

        let covered = if overlapping {
            union_volume(bbox, roots.iter().map(|(_, r)| *r))
        } else {
            roots.iter().map(|(_, r)| r.intersection_volume(bbox)).sum()
        };
        let gap = bbox.volume() - covered;

        if gap > COVERAGE_TOLERANCE * bbox.volume() {
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::CoverageGap,
                Vec::new(),
                gap,
                format!("level-0 grids leave volume {:e} of the domain uncovered", gap)));
        }
        diagnostics
    }




    /**
     * Every non-root grid must be linked to a parent one level coarser, and
     * must lie inside that parent and each further ancestor.
     */
    pub fn check_containment(&self) -> Vec<Diagnostic> {
        let hierarchy = self.hierarchy;

        self.par_grids()
            .filter(|(_, grid)| grid.level() > 0)
            .flat_map_iter(|(id, grid)| {
                let mut diagnostics = Vec::new();

                match hierarchy.parent(id).and_then(|p| Some((p, hierarchy.grid(p)?))) {
                    None => diagnostics.push(Diagnostic::new(
                        DiagnosticKind::ContainmentBreach,
                        vec![id],
                        0.0,
                        format!("grid at level {} has no parent", grid.level()))),
                    Some((p, parent)) if parent.level() + 1 != grid.level() => diagnostics.push(Diagnostic::new(
                        DiagnosticKind::ContainmentBreach,
                        vec![id, p],
                        0.0,
                        format!("grid at level {} has a parent at level {}", grid.level(), parent.level()))),
                    Some(_) => {}
                }

                for a in hierarchy.ancestors(id) {
                    if let Some(ancestor) = hierarchy.grid(a) {
                        if !ancestor.bounds().contains_box(grid.bounds()) {
                            let distance = protrusion(ancestor.bounds(), grid.bounds());
                            diagnostics.push(Diagnostic::new(
                                DiagnosticKind::ContainmentBreach,
                                vec![id, a],
                                distance,
                                format!("sticks out of ancestor {} by {:e}", a, distance)));
                        }
                    }
                }
                diagnostics
            })
            .collect()
    }




    /**
     * With a refinement ratio configured, the cell width of every child must
     * be its parent's cell width divided by that ratio on every axis.
     */
    pub fn check_refinement(&self) -> Vec<Diagnostic> {
        let refine_by = match self.refine_by {
            Some(r) => r as f64,
            None => return Vec::new(),
        };
        let hierarchy = self.hierarchy;

        self.par_grids()
            .filter_map(|(id, grid)| {
                let p = hierarchy.parent(id)?;
                let parent = hierarchy.grid(p)?;
                let (dp, dc) = (parent.cell_widths(), grid.cell_widths());

                let worst = Axis::ALL
                    .iter()
                    .map(|a| dp[a.index()] / dc[a.index()])
                    .max_by(|x, y| (x - refine_by).abs().partial_cmp(&(y - refine_by).abs()).unwrap_or(core::cmp::Ordering::Equal))?;

                if (worst - refine_by).abs() > REFINEMENT_TOLERANCE * refine_by {
                    Some(Diagnostic::new(
                        DiagnosticKind::RefinementMismatch,
                        vec![id, p],
                        worst,
                        format!("refines its parent by {} instead of {}", worst, refine_by)))
                } else {
                    None
                }
            })
            .collect()
    }




    /**
     * Particles bound to a grid must lie within it (faces included), and
     * must not lie within any of its children: those particles belong to the
     * finer grid. Grids whose particles carry no positions are skipped.
     */
    pub fn check_particle_locality(&self) -> Vec<Diagnostic> {
        let hierarchy = self.hierarchy;
        let length = &self.length;

        self.par_grids()
            .filter(|(_, grid)| grid.particle_count() > 0)
            .flat_map_iter(|(id, grid)| {
                let mut diagnostics = Vec::new();

                let positions: Vec<[f64; 3]> = match grid.particles().positions(length) {
                    Some(positions) => positions.collect(),
                    None => {
                        debug!("grid {} has particles without positions; locality not checked", id);
                        return diagnostics;
                    }
                };

                let outside = positions.iter().filter(|&&p| !grid.bounds().encloses_point(p)).count();

                if outside > 0 {
                    diagnostics.push(Diagnostic::new(
                        DiagnosticKind::ParticleOutsideGrid,
                        vec![id],
                        outside as f64,
                        format!("{} of {} particles lie outside the grid", outside, positions.len())));
                }

                for &c in hierarchy.children(id) {
                    if let Some(child) = hierarchy.grid(c) {
                        let inside = positions.iter().filter(|&&p| child.bounds().contains_point(p)).count();

                        if inside > 0 {
                            diagnostics.push(Diagnostic::new(
                                DiagnosticKind::ParticleInRefinedRegion,
                                vec![id, c],
                                inside as f64,
                                format!("{} particles lie inside child grid {}", inside, c)));
                        }
                    }
                }
                diagnostics
            })
            .collect()
    }




    /**
     * With a declared total, the per-grid particle counts must sum to it.
     */
    pub fn check_count_conservation(&self) -> Vec<Diagnostic> {
        let expected = match self.expected_particles {
            Some(n) => n,
            None => return Vec::new(),
        };
        let actual = self.hierarchy.total_particles();

        if actual == expected {
            Vec::new()
        } else {
            vec![Diagnostic::new(
                DiagnosticKind::ParticleCountMismatch,
                Vec::new(),
                actual as f64 - expected as f64,
                format!("grids hold {} particles, {} were declared", actual, expected))]
        }
    }

    fn par_grids(&self) -> impl ParallelIterator<Item = (GridId, &'a GridDescriptor)> {
        let hierarchy = self.hierarchy;
        (0..hierarchy.len())
            .into_par_iter()
            .filter_map(move |n| hierarchy.grid(GridId(n)).map(|g| (GridId(n), g)))
    }
}




/**
 * Return the volume of the part of `bbox` covered by at least one of the
 * boxes. The boxes' faces cut `bbox` into elementary cells, each of which is
 * either wholly covered or wholly uncovered; the covered cells are summed.
 */
fn union_volume<'a, I: Iterator<Item = &'a BoundingBox>>(bbox: &BoundingBox, boxes: I) -> f64 {
    let clipped: Vec<BoundingBox> = boxes
        .map(|b| {
            let mut c = *b;
            for &a in Axis::ALL.iter() {
                let n = a.index();
                c.lower[n] = c.lower[n].max(bbox.lower[n]);
                c.upper[n] = c.upper[n].min(bbox.upper[n]);
            }
            c
        })
        .filter(|c| Axis::ALL.iter().all(|&a| c.lower[a.index()] < c.upper[a.index()]))
        .collect();

    let slabs = |n: usize, boxes: &[&BoundingBox]| -> Vec<(f64, Vec<usize>)> {
        let mut f: Vec<f64> = boxes.iter().flat_map(|c| vec![c.lower[n], c.upper[n]]).collect();
        f.sort_by(|a, b| a.partial_cmp(b).unwrap_or(core::cmp::Ordering::Equal));
        f.dedup();

        f.windows(2)
            .map(|w| {
                let mid = 0.5 * (w[0] + w[1]);
                let inside = (0..boxes.len())
                    .filter(|&m| boxes[m].lower[n] <= mid && mid < boxes[m].upper[n])
                    .collect();
                (w[1] - w[0], inside)
            })
            .collect()
    };

    let all: Vec<&BoundingBox> = clipped.iter().collect();
    let mut volume = 0.0;

    for (dx, in_x) in slabs(0, &all) {
        let bx: Vec<&BoundingBox> = in_x.iter().map(|&m| all[m]).collect();
        for (dy, in_y) in slabs(1, &bx) {
            let by: Vec<&BoundingBox> = in_y.iter().map(|&m| bx[m]).collect();
            for (dz, in_z) in slabs(2, &by) {
                if !in_z.is_empty() {
                    volume += dx * dy * dz;
                }
            }
        }
    }
    volume
}




/**
 * Return the largest distance by which `inner` extends past a face of
 * `outer`.
 */
fn protrusion(outer: &BoundingBox, inner: &BoundingBox) -> f64 {
    Axis::ALL
        .iter()
        .map(|a| {
            let n = a.index();
            (outer.lower[n] - inner.lower[n]).max(inner.upper[n] - outer.upper[n]).max(0.0)
        })
        .fold(0.0, f64::max)
}
