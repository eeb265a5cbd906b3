//! Exact point-in-polygon classification using the geo crate.
//!
//! Boundary policy: a point lying exactly on an edge or vertex of a zone is
//! contained by that zone. Two zones sharing an edge therefore both match a
//! point on that edge; the engine's ranking picks one deterministically.

use geo::coordinate_position::{CoordPos, CoordinatePosition};
use geo::{Coord, MultiPolygon};

/// Where a coordinate lies relative to a zone geometry.
///
/// Ordered by match strength: an interior hit ranks before a boundary hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Containment {
    Interior,
    Boundary,
    Outside,
}

impl Containment {
    /// True for interior and boundary positions.
    pub fn is_match(self) -> bool {
        !matches!(self, Containment::Outside)
    }
}

impl From<CoordPos> for Containment {
    fn from(pos: CoordPos) -> Self {
        match pos {
            CoordPos::Inside => Containment::Interior,
            CoordPos::OnBoundary => Containment::Boundary,
            CoordPos::Outside => Containment::Outside,
        }
    }
}

/// Classifies `coord` against `geometry`. Holes are honoured: a point in a
/// hole is outside, a point on a hole's ring is on the boundary.
pub fn classify(geometry: &MultiPolygon<f64>, coord: Coord<f64>) -> Containment {
    geometry.coordinate_position(&coord).into()
}

/// Convenience wrapper returning whether the geometry contains the point
/// under the boundary-inclusive policy.
pub fn contains(geometry: &MultiPolygon<f64>, coord: Coord<f64>) -> bool {
    classify(geometry, coord).is_match()
}
