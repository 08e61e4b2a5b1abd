use core::ops::Range;
use serde::{Deserialize, Serialize};
use crate::overlap::Overlap;




/// Relative tolerance used when comparing physical edges, as a fraction of
/// the extent of the region being tested against.
pub const EDGE_TOLERANCE: f64 = 1e-10;




/**
 * Identifier for a Cartesian axis
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    I,
    J,
    K,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::I, Axis::J, Axis::K];

    pub fn index(self) -> usize {
        match self {
            Axis::I => 0,
            Axis::J => 1,
            Axis::K => 2,
        }
    }
}




/**
 * An axis-aligned rectangular region of physical space, given by its lower
 * and upper corners.
 */
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub lower: [f64; 3],
    pub upper: [f64; 3],
}




// ============================================================================
impl BoundingBox {

    pub fn new(lower: [f64; 3], upper: [f64; 3]) -> Self {
        Self { lower, upper }
    }

    /**
     * Return true if every axis has a finite, strictly positive extent.
     */
    pub fn is_valid(&self) -> bool {
        Axis::ALL.iter().all(|&a| {
            let (l, u) = (self.lower[a.index()], self.upper[a.index()]);
            l.is_finite() && u.is_finite() && l < u
        })
    }

    /// Return the extent along the given axis as a half-open range.
    pub fn extent(&self, axis: Axis) -> Range<f64> {
        self.lower[axis.index()]..self.upper[axis.index()]
    }

    pub fn width(&self, axis: Axis) -> f64 {
        self.upper[axis.index()] - self.lower[axis.index()]
    }

    pub fn widths(&self) -> [f64; 3] {
        [self.width(Axis::I), self.width(Axis::J), self.width(Axis::K)]
    }

    pub fn volume(&self) -> f64 {
        self.widths().iter().product()
    }

    /**
     * Determine whether a point lies in this region. Points on the lower face
     * are inside, points on the upper face are not, so that a point on a
     * boundary shared by two abutting regions belongs to exactly one of them.
     */
    pub fn contains_point(&self, point: [f64; 3]) -> bool {
        Axis::ALL.iter().all(|&a| self.extent(a).contains(&point[a.index()]))
    }

    /**
     * Determine whether a point lies in this region or on its boundary.
     */
    pub fn encloses_point(&self, point: [f64; 3]) -> bool {
        Axis::ALL.iter().all(|&a| {
            let x = point[a.index()];
            self.lower[a.index()] <= x && x <= self.upper[a.index()]
        })
    }

    /**
     * Determine whether another region lies inside this one, allowing the
     * other region's faces to stick out by a round-off tolerance.
     */
    pub fn contains_box(&self, other: &Self) -> bool {
        Axis::ALL.iter().all(|&a| {
            let tol = EDGE_TOLERANCE * self.width(a);
            other.lower[a.index()] >= self.lower[a.index()] - tol &&
            other.upper[a.index()] <= self.upper[a.index()] + tol
        })
    }

    /**
     * Determine whether the interiors of two regions intersect. Regions that
     * only share a face, or overlap by less than the round-off tolerance, do
     * not overlap.
     */
    pub fn overlaps(&self, other: &Self) -> bool {
        Axis::ALL.iter().all(|&a| {
            let tol = EDGE_TOLERANCE * self.width(a).min(other.width(a));
            let shrunk = self.lower[a.index()] + tol..self.upper[a.index()] - tol;
            shrunk.overlaps(&other.extent(a))
        })
    }

    /// Return the volume of the intersection of two regions.
    pub fn intersection_volume(&self, other: &Self) -> f64 {
        Axis::ALL
            .iter()
            .map(|&a| {
                let l = self.lower[a.index()].max(other.lower[a.index()]);
                let u = self.upper[a.index()].min(other.upper[a.index()]);
                (u - l).max(0.0)
            })
            .product()
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::new([0.0; 3], [1.0; 3])
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::BoundingBox;

    fn cube(l: f64, u: f64) -> BoundingBox {
        BoundingBox::new([l; 3], [u; 3])
    }

    #[test]
    fn containment_tolerates_round_off() {
        let outer = cube(0.0, 1.0);
        assert!(outer.contains_box(&cube(0.25, 0.75)));
        assert!(outer.contains_box(&cube(0.0, 1.0 + 1e-14)));
        assert!(!outer.contains_box(&cube(0.5, 1.5)));
    }

    #[test]
    fn abutting_boxes_do_not_overlap() {
        let a = BoundingBox::new([0.0, 0.0, 0.0], [0.5, 1.0, 1.0]);
        let b = BoundingBox::new([0.5, 0.0, 0.0], [1.0, 1.0, 1.0]);
        let c = BoundingBox::new([0.4, 0.0, 0.0], [1.0, 1.0, 1.0]);
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!((a.intersection_volume(&c) - 0.1).abs() < 1e-12);
        assert_eq!(a.intersection_volume(&b), 0.0);
    }

    #[test]
    fn points_on_a_shared_face_belong_to_the_upper_box() {
        let a = BoundingBox::new([0.0, 0.0, 0.0], [0.5, 1.0, 1.0]);
        let b = BoundingBox::new([0.5, 0.0, 0.0], [1.0, 1.0, 1.0]);
        assert!(!a.contains_point([0.5, 0.5, 0.5]));
        assert!(b.contains_point([0.5, 0.5, 0.5]));
        assert!(a.encloses_point([0.5, 0.5, 0.5]));
        assert!(!b.contains_point([1.0, 0.5, 0.5]));
        assert!(b.encloses_point([1.0, 0.5, 0.5]));
    }

    #[test]
    fn inverted_boxes_are_invalid() {
        assert!(cube(0.0, 1.0).is_valid());
        assert!(!BoundingBox::new([0.0, 1.0, 0.0], [1.0, 1.0, 1.0]).is_valid());
        assert!(!BoundingBox::new([0.0, 0.0, f64::NAN], [1.0; 3]).is_valid());
    }
}
