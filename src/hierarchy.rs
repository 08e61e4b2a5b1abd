use core::ops::Range;
use log::{debug, info};
use rayon::prelude::*;
use crate::error::{Error, Result};
use crate::grid::{GridDescriptor, GridId};




/**
 * An arena of grids ordered by level, together with the parent/child links
 * between them. Links are stored as `GridId` indexes into the arena, so the
 * hierarchy owns its grids without any reference cycles and can be shared
 * freely between threads once built.
 */
#[derive(Clone, Debug)]
pub struct GridHierarchy {
    grids: Vec<GridDescriptor>,
    parents: Vec<Option<GridId>>,
    children: Vec<Vec<GridId>>,
    levels: Vec<Range<usize>>,
}




// ============================================================================
impl GridHierarchy {

    pub fn len(&self) -> usize {
        self.grids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grids.is_empty()
    }

    /// Return the number of levels, counting from level 0 to the finest one.
    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn max_level(&self) -> u32 {
        self.levels.len().saturating_sub(1) as u32
    }

    pub fn grid(&self, id: GridId) -> Option<&GridDescriptor> {
        self.grids.get(id.0)
    }

    /// Iterate over all grids in level order, coarsest first.
    pub fn iter(&self) -> impl Iterator<Item = (GridId, &GridDescriptor)> {
        self.grids.iter().enumerate().map(|(n, g)| (GridId(n), g))
    }

    /// Iterate over the grids at one level.
    pub fn level(&self, level: u32) -> impl Iterator<Item = (GridId, &GridDescriptor)> {
        let range = self.levels.get(level as usize).cloned().unwrap_or(0..0);
        range.map(move |n| (GridId(n), &self.grids[n]))
    }

    /// The level-0 grids.
    pub fn roots(&self) -> impl Iterator<Item = (GridId, &GridDescriptor)> {
        self.level(0)
    }

    pub fn parent(&self, id: GridId) -> Option<GridId> {
        self.parents.get(id.0).cloned().flatten()
    }

    pub fn children(&self, id: GridId) -> &[GridId] {
        self.children.get(id.0).map_or(&[][..], Vec::as_slice)
    }

    /// Iterate over the parent, grandparent, and so on of a grid, up to its
    /// level-0 root.
    pub fn ancestors(&self, id: GridId) -> impl Iterator<Item = GridId> + '_ {
        let mut current = id;
        core::iter::from_fn(move || {
            let next = self.parent(current)?;
            current = next;
            Some(next)
        })
    }

    pub fn total_particles(&self) -> usize {
        self.grids.iter().map(GridDescriptor::particle_count).sum()
    }
}




/**
 * Links a flat list of grids into a `GridHierarchy`. The parent of a grid at
 * level L > 0 is the unique grid at level L - 1 whose edges contain its own.
 * Levels are linked in ascending order; within a level the parent lookups
 * run concurrently against the already-linked coarser level.
 */
#[derive(Clone, Debug, Default)]
pub struct HierarchyBuilder {
    grids: Vec<GridDescriptor>,
}




// ============================================================================
impl HierarchyBuilder {

    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, grid: GridDescriptor) {
        self.grids.push(grid)
    }

    pub fn with_grid(mut self, grid: GridDescriptor) -> Self {
        self.push(grid);
        self
    }

    /**
     * Sort the grids by level (keeping the supplied order within a level),
     * check each one, and resolve every parent. The `GridId` of a grid is its
     * position after sorting, which is its position in the input when the
     * input is already in level order.
     */
    pub fn build(self) -> Result<GridHierarchy> {
        let mut grids = self.grids;

        if grids.is_empty() {
            return Err(Error::config("a hierarchy needs at least one grid"));
        }
        grids.sort_by_key(GridDescriptor::level);

        for (n, grid) in grids.iter().enumerate() {
            grid.validate(GridId(n))?;
        }

        let levels = level_ranges(&grids);
        let mut parents = vec![None; grids.len()];
        let mut children = vec![Vec::new(); grids.len()];

        for level in 1..levels.len() {
            let coarse = levels[level - 1].clone();
            let fine = levels[level].clone();

            let found: Vec<Result<GridId>> = fine
                .clone()
                .into_par_iter()
                .map(|n| find_parent(&grids, GridId(n), coarse.clone()))
                .collect();

            for (n, parent) in fine.zip(found) {
                let parent = parent?;
                parents[n] = Some(parent);
                children[parent.0].push(GridId(n));
            }
            debug!("linked {} grids at level {}", levels[level].len(), level);
        }

        info!("built a hierarchy of {} grids on {} levels", grids.len(), levels.len());

        Ok(GridHierarchy { grids, parents, children, levels })
    }
}




/**
 * Return, for each level from 0 to the finest, the range of arena positions
 * holding the grids of that level. Grids must already be sorted by level.
 */
fn level_ranges(grids: &[GridDescriptor]) -> Vec<Range<usize>> {
    let max_level = grids.last().map_or(0, GridDescriptor::level) as usize;
    let mut levels = vec![0..0; max_level + 1];
    let mut start = 0;

    for (level, range) in levels.iter_mut().enumerate() {
        let end = start + grids[start..].iter().take_while(|g| g.level() as usize == level).count();
        *range = start..end;
        start = end;
    }
    levels
}




fn find_parent(grids: &[GridDescriptor], id: GridId, coarse: Range<usize>) -> Result<GridId> {
    let child = &grids[id.0];
    let level = child.level();

    let containing: Vec<GridId> = coarse
        .clone()
        .filter(|&n| grids[n].bounds().contains_box(child.bounds()))
        .map(GridId)
        .collect();

    match containing.len() {
        1 => Ok(containing[0]),
        0 => {
            let overlapping: Vec<GridId> = coarse
                .filter(|&n| grids[n].bounds().overlaps(child.bounds()))
                .map(GridId)
                .collect();

            if overlapping.len() > 1 {
                Err(Error::AmbiguousParent { grid: id, level, candidates: overlapping })
            } else {
                Err(Error::OrphanGrid { grid: id, level })
            }
        }
        _ => Err(Error::AmbiguousParent { grid: id, level, candidates: containing }),
    }
}
