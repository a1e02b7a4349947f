//! Core data types shared across the crate.
//!
//! FSIM solves 2D (plane-strain) continua; points, vectors and tensors are
//! fixed-size nalgebra types.

use nalgebra::{Matrix2, Vector2};

/// Spatial dimension of the discretized problems.
pub const DIM: usize = 2;

/// A point in the 2D physical domain.
pub type Point2 = Vector2<f64>;

/// A 2D vector (displacement, velocity, traction, ...).
pub type Vec2 = Vector2<f64>;

/// A 2x2 second-order tensor (deformation gradient, velocity gradient, ...).
pub type Mat2 = Matrix2<f64>;

/// A boundary side of a tensor-product patch.
///
/// Sides are named in parameter space: `West`/`East` are the faces of
/// constant first parameter, `South`/`North` of constant second parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    West,
    East,
    South,
    North,
}

impl Side {
    /// All four sides of a patch.
    pub const ALL: [Side; 4] = [Side::West, Side::East, Side::South, Side::North];

    /// Parametric direction tangential to this side (0 = first parameter).
    pub fn tangent_dir(self) -> usize {
        match self {
            Side::West | Side::East => 1,
            Side::South | Side::North => 0,
        }
    }

    /// Rotate an edge tangent vector into the outward normal.
    ///
    /// Assumes a right-handed patch parametrization; the tangent follows
    /// the side's increasing parameter.
    pub fn outward_normal(self, tangent: &Vec2) -> Vec2 {
        let n = match self {
            // +90 degree rotation
            Side::West | Side::North => Vec2::new(-tangent.y, tangent.x),
            // -90 degree rotation
            Side::East | Side::South => Vec2::new(tangent.y, -tangent.x),
        };
        let len = n.norm();
        if len > 0.0 {
            n / len
        } else {
            n
        }
    }
}

/// A (patch index, boundary side) pair identifying one patch boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SideRef {
    pub patch: usize,
    pub side: Side,
}

impl SideRef {
    pub fn new(patch: usize, side: Side) -> Self {
        Self { patch, side }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_outward_normals_unit_square() {
        // Unit square, right-handed parametrization: tangents along the
        // sides' increasing parameter.
        let east = Side::East.outward_normal(&Vec2::new(0.0, 1.0));
        assert_relative_eq!(east.x, 1.0);
        assert_relative_eq!(east.y, 0.0);

        let west = Side::West.outward_normal(&Vec2::new(0.0, 1.0));
        assert_relative_eq!(west.x, -1.0);

        let south = Side::South.outward_normal(&Vec2::new(1.0, 0.0));
        assert_relative_eq!(south.y, -1.0);

        let north = Side::North.outward_normal(&Vec2::new(1.0, 0.0));
        assert_relative_eq!(north.y, 1.0);
    }

    #[test]
    fn test_normal_is_unit_length() {
        let n = Side::East.outward_normal(&Vec2::new(0.0, 2.5));
        assert_relative_eq!(n.norm(), 1.0, epsilon = 1e-14);
    }
}
