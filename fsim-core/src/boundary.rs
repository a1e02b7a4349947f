//! Boundary conditions.
//!
//! Maps (patch, side, field component) to a condition kind: a prescribed
//! Dirichlet value or an applied Neumann traction. Components 0..DIM address
//! the vector field; component DIM addresses the pressure field of mixed
//! formulations.

use std::fmt;
use std::sync::Arc;

use crate::types::{Point2, Side, SideRef, Vec2};

/// A scalar function of a physical point.
pub type ScalarFn = Arc<dyn Fn(&Point2) -> f64 + Send + Sync>;

/// Prescribed Dirichlet data for one component on one side.
///
/// Function values are sampled at boundary control points (interpolation).
#[derive(Clone)]
pub enum DirichletValue {
    Constant(f64),
    Function(ScalarFn),
}

impl DirichletValue {
    pub fn eval(&self, point: &Point2) -> f64 {
        match self {
            DirichletValue::Constant(v) => *v,
            DirichletValue::Function(f) => f(point),
        }
    }
}

impl fmt::Debug for DirichletValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirichletValue::Constant(v) => write!(f, "Constant({})", v),
            DirichletValue::Function(_) => write!(f, "Function(..)"),
        }
    }
}

/// A traction applied on a boundary side.
///
/// `side_param` is the normalized coordinate in [0, 1] along the side
/// (increasing tangential parameter); `normal` is the outward unit normal
/// of the loaded patch at the evaluation point.
pub trait BoundaryLoad: Send + Sync {
    fn traction(&self, point: &Point2, side_param: f64, normal: &Vec2) -> Vec2;
}

/// A uniform traction vector.
#[derive(Debug, Clone, Copy)]
pub struct ConstantLoad(pub Vec2);

impl BoundaryLoad for ConstantLoad {
    fn traction(&self, _point: &Point2, _side_param: f64, _normal: &Vec2) -> Vec2 {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct DirichletBc {
    pub side: SideRef,
    pub component: usize,
    pub value: DirichletValue,
}

#[derive(Clone)]
pub struct NeumannBc {
    pub side: SideRef,
    pub load: Arc<dyn BoundaryLoad>,
}

/// Container for all boundary conditions of one problem.
#[derive(Clone, Default)]
pub struct BoundaryConditions {
    dirichlet: Vec<DirichletBc>,
    neumann: Vec<NeumannBc>,
}

impl BoundaryConditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prescribe one component on a side.
    pub fn add_dirichlet(
        &mut self,
        patch: usize,
        side: Side,
        component: usize,
        value: DirichletValue,
    ) {
        self.dirichlet.push(DirichletBc {
            side: SideRef::new(patch, side),
            component,
            value,
        });
    }

    /// Clamp all vector components to zero on a side.
    pub fn add_fixed(&mut self, patch: usize, side: Side) {
        for d in 0..crate::types::DIM {
            self.add_dirichlet(patch, side, d, DirichletValue::Constant(0.0));
        }
    }

    /// Apply a traction load on a side.
    pub fn add_neumann(&mut self, patch: usize, side: Side, load: Arc<dyn BoundaryLoad>) {
        self.neumann.push(NeumannBc {
            side: SideRef::new(patch, side),
            load,
        });
    }

    /// Replace the load on a side, or add it if none is installed.
    ///
    /// Used by the FSI loop to refresh interface tractions every outer
    /// iteration.
    pub fn set_neumann(&mut self, patch: usize, side: Side, load: Arc<dyn BoundaryLoad>) {
        let side_ref = SideRef::new(patch, side);
        if let Some(bc) = self.neumann.iter_mut().find(|bc| bc.side == side_ref) {
            bc.load = load;
        } else {
            self.neumann.push(NeumannBc { side: side_ref, load });
        }
    }

    pub fn dirichlet(&self) -> &[DirichletBc] {
        &self.dirichlet
    }

    pub fn neumann(&self) -> &[NeumannBc] {
        &self.neumann
    }

    /// Dirichlet conditions for a single component.
    pub fn dirichlet_for(&self, component: usize) -> impl Iterator<Item = &DirichletBc> {
        self.dirichlet
            .iter()
            .filter(move |bc| bc.component == component)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_dirichlet_value_eval() {
        let c = DirichletValue::Constant(2.5);
        assert_relative_eq!(c.eval(&Point2::new(0.0, 0.0)), 2.5);

        let f = DirichletValue::Function(Arc::new(|p: &Point2| p.x * p.y));
        assert_relative_eq!(f.eval(&Point2::new(2.0, 3.0)), 6.0);
    }

    #[test]
    fn test_fixed_side_covers_all_components() {
        let mut bc = BoundaryConditions::new();
        bc.add_fixed(0, Side::West);
        assert_eq!(bc.dirichlet_for(0).count(), 1);
        assert_eq!(bc.dirichlet_for(1).count(), 1);
        assert_eq!(bc.dirichlet_for(2).count(), 0);
    }

    #[test]
    fn test_set_neumann_replaces() {
        let mut bc = BoundaryConditions::new();
        bc.set_neumann(0, Side::East, Arc::new(ConstantLoad(Vec2::new(1.0, 0.0))));
        bc.set_neumann(0, Side::East, Arc::new(ConstantLoad(Vec2::new(2.0, 0.0))));
        assert_eq!(bc.neumann().len(), 1);
        let t = bc.neumann()[0]
            .load
            .traction(&Point2::zeros(), 0.0, &Vec2::x());
        assert_relative_eq!(t.x, 2.0);
    }
}
