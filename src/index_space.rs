use core::ops::Range;
use ndarray::{s, Array3, ArrayView3};
use crate::geometry::Axis;
use crate::overlap::Overlap;




/**
 * Represents a rectangular region in a discrete, three-dimensional index
 * space of cells
 */
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IndexSpace {
    di: Range<i64>,
    dj: Range<i64>,
    dk: Range<i64>,
}




/**
 * Describes a rectangular index space. The index type is signed 64-bit integer.
 */
impl IndexSpace {


    pub fn new(di: Range<i64>, dj: Range<i64>, dk: Range<i64>) -> Self {

        assert!(
            di.start <= di.end && dj.start <= dj.end && dk.start <= dk.end,
            "index space has negative volume");

        Self { di, dj, dk }
    }


    /**
     * Return an index space starting at the origin with the given shape.
     */
    pub fn with_shape(shape: [usize; 3]) -> Self {
        Self::new(0..shape[0] as i64, 0..shape[1] as i64, 0..shape[2] as i64)
    }


    /**
     * Return the number of indexes on each axis.
     */
    pub fn dim(&self) -> [usize; 3] {
        [(self.di.end - self.di.start) as usize,
         (self.dj.end - self.dj.start) as usize,
         (self.dk.end - self.dk.start) as usize]
    }


    /**
     * Return the number of elements in this index space.
     */
    pub fn len(&self) -> usize {
        self.dim().iter().product()
    }


    /**
     * Return the minimum index (inclusive).
     */
    pub fn start(&self) -> [i64; 3] {
        [self.di.start, self.dj.start, self.dk.start]
    }


    /**
     * Return the maximum index (exclusive).
     */
    pub fn end(&self) -> [i64; 3] {
        [self.di.end, self.dj.end, self.dk.end]
    }


    /**
     * Return the index range along one axis.
     */
    pub fn range(&self, axis: Axis) -> &Range<i64> {
        match axis {
            Axis::I => &self.di,
            Axis::J => &self.dj,
            Axis::K => &self.dk,
        }
    }


    /**
     * Determine whether another index space is a subset of this one.
     */
    pub fn contains_space(&self, other: &Self) -> bool {
        Axis::ALL.iter().all(|&a| {
            let (r, o) = (self.range(a), other.range(a));
            o.start >= r.start && o.end <= r.end
        })
    }


    /**
     * Determine whether this index space shares any index with another one.
     */
    pub fn overlaps(&self, other: &Self) -> bool {
        Axis::ALL.iter().all(|&a| self.range(a).overlaps(other.range(a)))
    }


    /**
     * Copy the selection of this index space out of an array that is
     * allocated for another (enclosing) one.
     */
    pub fn select_in(&self, parent: &Self, array: ArrayView3<f64>) -> Array3<f64> {
        assert!(parent.contains_space(self), "selection is not inside the parent index space");

        let offset = |a: Axis| {
            let r = self.range(a);
            let p = parent.range(a);
            (r.start - p.start) as usize..(r.end - p.start) as usize
        };
        array.slice(s![offset(Axis::I), offset(Axis::J), offset(Axis::K)]).to_owned()
    }
}
