//! Element kernels.
//!
//! An [`ElementKernel`] computes, for one quadrature point of one element,
//! the local tangent and residual contributions of a particular physics.
//! Kernels are selected by configuration and injected into the assembler;
//! they hold material parameters and body forces but no cross-element state,
//! so one kernel instance serves every element of an assembly pass.
//!
//! Sign conventions: the assembled right-hand side is the negative residual
//! of the current configuration (external minus internal forces), so a
//! Newton step solves `K * du = rhs` and accumulates `du` onto the current
//! solution.

use std::sync::Arc;

use nalgebra::{DMatrix, DVector};

use crate::error::Result;
use crate::types::{Mat2, Point2, Vec2, DIM};

mod ale;
mod flow;
mod linear;
mod mixed;
mod nonlinear;

pub use ale::AleKernel;
pub use flow::IncompressibleFlow;
pub use linear::LinearElasticity;
pub use mixed::NonlinearMixed;
pub use nonlinear::NonlinearElasticity;

/// A body-force density as a function of the physical point.
pub type BodyForce = Arc<dyn Fn(&Point2) -> Vec2 + Send + Sync>;

/// The zero body force.
pub fn zero_body_force() -> BodyForce {
    Arc::new(|_| Vec2::zeros())
}

/// Everything a kernel needs at one quadrature point.
///
/// The assembler evaluates basis data and the current-configuration fields;
/// kernels only do tensor algebra on top. `weight` already includes the
/// geometry measure. State entries are zero when assembling without a
/// current state (the stateless linear path).
pub struct QuadData {
    /// Quadrature weight times |det J| of the geometry map.
    pub weight: f64,
    /// Physical location of the quadrature point.
    pub point: Point2,
    /// Vector-field basis values.
    pub vals_u: Vec<f64>,
    /// Vector-field basis gradients in physical coordinates.
    pub grads_u: Vec<Vec2>,
    /// Pressure basis values (empty without a pressure basis).
    pub vals_p: Vec<f64>,
    /// Current vector-field value.
    pub state_val: Vec2,
    /// Current vector-field gradient du/dx.
    pub state_grad: Mat2,
    /// Current scalar-field value.
    pub state_p: f64,
}

/// Element-local tangent blocks and residuals.
///
/// Row/column layout follows `component * n_u + basis_index` for the vector
/// field. `kup` stores the pressure-velocity coupling with pressure rows;
/// the assembler scatters it into both off-diagonal blocks.
pub struct LocalSystem {
    pub n_u: usize,
    pub n_p: usize,
    pub kuu: DMatrix<f64>,
    pub kup: DMatrix<f64>,
    pub kpp: DMatrix<f64>,
    pub rhs_u: DVector<f64>,
    pub rhs_p: DVector<f64>,
}

impl LocalSystem {
    pub fn new(n_u: usize, n_p: usize) -> Self {
        Self {
            n_u,
            n_p,
            kuu: DMatrix::zeros(DIM * n_u, DIM * n_u),
            kup: DMatrix::zeros(n_p, DIM * n_u),
            kpp: DMatrix::zeros(n_p, n_p),
            rhs_u: DVector::zeros(DIM * n_u),
            rhs_p: DVector::zeros(n_p),
        }
    }
}

/// Per-element physics: tangent and residual at one quadrature point.
pub trait ElementKernel: Send + Sync {
    /// True if the kernel discretizes a mixed formulation and requires a
    /// pressure basis.
    fn needs_pressure(&self) -> bool {
        false
    }

    /// True if the tangent is symmetric. Symmetric kernels fill `kuu` and
    /// `kpp` only for basis pairs `j >= i`; the assembler mirrors the rest.
    fn symmetric(&self) -> bool {
        true
    }

    /// Accumulate this quadrature point's contribution into `local`.
    ///
    /// Returns an error for invalid physical states (non-positive
    /// deformation gradient determinant); such errors abort the assembly
    /// pass and surface as a bad solution.
    fn accumulate(&self, qp: &QuadData, local: &mut LocalSystem) -> Result<()>;
}
