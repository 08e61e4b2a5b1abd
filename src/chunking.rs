//! Splitting a single full-domain array into sibling level-0 grids.

use core::ops::Range;
use std::collections::BTreeMap;
use log::{debug, info};
use rayon::prelude::*;
use crate::domain::DomainSpec;
use crate::error::{Error, Result};
use crate::field::GridField;
use crate::geometry::Axis;
use crate::grid::{GridDescriptor, GridId};
use crate::index_space::IndexSpace;




/// The number of pieces each axis of the domain is split into.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Decomposition {
    pub splits: [usize; 3],
}

impl Decomposition {
    /// Find the factorization of `count` into three per-axis split counts
    /// which are as close to one another as possible, without splitting any
    /// axis into more pieces than it has cells. Among equally balanced
    /// candidates the one whose chunks are closest to cubic wins, and then
    /// the one splitting earlier axes more.
    ///
    pub fn balanced(count: usize, dims: [usize; 3]) -> Result<Self> {
        let invalid = || Error::InvalidChunkCount { count, dims };

        if count == 0 || count > dims.iter().product() {
            return Err(invalid());
        }

        let mut best: Option<(usize, f64, Decomposition)> = None;

        for a in (1..=count.min(dims[0])).rev().filter(|a| count % a == 0) {
            let rest = count / a;
            for b in (1..=rest.min(dims[1])).rev().filter(|b| rest % b == 0) {
                let c = rest / b;
                if c > dims[2] {
                    continue;
                }
                let candidate = Decomposition { splits: [a, b, c] };
                let spread = a.max(b).max(c) - a.min(b).min(c);
                let aspect = candidate.aspect_ratio(dims);

                let better = match &best {
                    None => true,
                    Some((s, r, _)) => spread < *s || (spread == *s && aspect < *r),
                };
                if better {
                    best = Some((spread, aspect, candidate));
                }
            }
        }
        best.map(|(_, _, d)| d).ok_or_else(invalid)
    }

    pub fn num_chunks(&self) -> usize {
        self.splits.iter().product()
    }

    /// Return the ratio of the longest to the shortest edge (in cells) of a
    /// typical chunk.
    fn aspect_ratio(&self, dims: [usize; 3]) -> f64 {
        let sizes: Vec<f64> = (0..3).map(|n| dims[n] as f64 / self.splits[n] as f64).collect();
        let max = sizes.iter().cloned().fold(f64::MIN, f64::max);
        let min = sizes.iter().cloned().fold(f64::MAX, f64::min);
        max / min
    }

    /// Return the index spaces of the chunks, in row-major order over the
    /// chunk layout.
    pub fn index_spaces(&self, dims: [usize; 3]) -> Vec<IndexSpace> {
        let ri = split_axis(dims[0], self.splits[0]);
        let rj = split_axis(dims[1], self.splits[1]);
        let rk = split_axis(dims[2], self.splits[2]);
        let (rj, rk) = (&rj, &rk);

        ri.iter()
            .flat_map(move |di| rj.iter().flat_map(move |dj| rk.iter().map(move |dk| {
                IndexSpace::new(di.clone(), dj.clone(), dk.clone())
            })))
            .collect()
    }
}




/**
 * Divide `n` cells into `parts` contiguous ranges whose sizes differ by at
 * most one. The remainder goes to the earliest ranges.
 */
pub fn split_axis(n: usize, parts: usize) -> Vec<Range<i64>> {
    let base = n / parts;
    let remainder = n % parts;
    let mut start = 0;

    (0..parts)
        .map(|p| {
            let size = base + if p < remainder { 1 } else { 0 };
            let range = start as i64..(start + size) as i64;
            start += size;
            range
        })
        .collect()
}




/// One output of the chunker: the cell index range it was cut from and the
/// level-0 grid holding its share of every field.
///
#[derive(Clone, Debug)]
pub struct Chunk {
    pub space: IndexSpace,
    pub grid: GridDescriptor,
}




/**
 * Splits full-domain rank-3 fields into a requested number of level-0 grids
 * that exactly tile the domain. Particles are not split: binding particles
 * to chunks is left to the caller.
 */
pub struct UniformChunker<'a> {
    domain: &'a DomainSpec,
    dimensions: [usize; 3],
}




// ============================================================================
impl<'a> UniformChunker<'a> {

    pub fn new(domain: &'a DomainSpec, dimensions: [usize; 3]) -> Self {
        Self { domain, dimensions }
    }

    /**
     * Return the physical coordinate of the cell face with the given index
     * along one axis. The last face is the domain's upper edge exactly.
     */
    pub fn face(&self, axis: Axis, index: i64) -> f64 {
        let n = self.dimensions[axis.index()] as i64;
        let bbox = &self.domain.bbox;

        if index == n {
            bbox.upper[axis.index()]
        } else {
            bbox.lower[axis.index()] + bbox.width(axis) * (index as f64 / n as f64)
        }
    }

    /**
     * Split every field into `count` chunks. Chunks are cut concurrently;
     * each one reads a disjoint range of the shared source arrays.
     */
    pub fn chunk(&self, fields: &BTreeMap<String, GridField>, count: usize) -> Result<Vec<Chunk>> {
        for (name, field) in fields {
            if field.shape() != &self.dimensions[..] {
                return Err(Error::ShapeMismatch {
                    grid: None,
                    field: name.clone(),
                    expected: self.dimensions.to_vec(),
                    found: field.shape().to_vec(),
                });
            }
        }

        let decomposition = Decomposition::balanced(count, self.dimensions)?;
        let whole = IndexSpace::with_shape(self.dimensions);

        info!(
            "splitting {:?} cells into {} chunks as {:?}",
            self.dimensions,
            count,
            decomposition.splits);

        let chunks: Vec<Chunk> = decomposition
            .index_spaces(self.dimensions)
            .into_par_iter()
            .map(|space| {
                let mut left = [0.0; 3];
                let mut right = [0.0; 3];

                for &a in Axis::ALL.iter() {
                    left[a.index()] = self.face(a, space.range(a).start);
                    right[a.index()] = self.face(a, space.range(a).end);
                }

                let dim = space.dim();
                let mut grid = GridDescriptor::new(left, right, 0, dim);

                for (name, field) in fields {
                    let values = space.select_in(&whole, field.values());
                    grid.insert_field(name.clone(), GridField::new(values, field.unit().clone()));
                }
                Chunk { space, grid }
            })
            .collect();

        for (n, chunk) in chunks.iter().enumerate() {
            debug!("chunk {} covers {} cells {:?}..{:?}", n, chunk.space.len(), chunk.space.start(), chunk.space.end());
            chunk.grid.validate(GridId(n))?;
        }
        Ok(chunks)
    }
}
