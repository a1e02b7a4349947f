//! Solver configuration.
//!
//! All options are explicit structs passed at construction time; there is no
//! shared global option state.

/// Material law used by the displacement-only nonlinear elasticity kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialLaw {
    /// S = 2*mu*E + lambda*tr(E)*I
    SaintVenantKirchhoff,
    /// S = lambda*ln(J)*C^-1 + mu*(I - C^-1)
    NeoHookeLn,
}

/// Verbosity of the Newton solver diagnostics.
///
/// Output goes through the `log` facade: `All` emits one line per Newton
/// iteration, `Some` only a final summary, `None` nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    None,
    Some,
    All,
}

/// Linear solver employed inside the Newton iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinearSolverKind {
    /// Sparse LU: no matrix requirements, robust.
    Lu,
    /// Sparse LLT/LDLT: symmetric positive definite matrices only, faster.
    Ldlt,
    /// Conjugate gradient with diagonal preconditioning (symmetric only).
    IterativeCg,
    /// BiCGStab with diagonal preconditioning, no matrix requirements.
    IterativeBiCgStab,
}

/// Strategy for imposing Dirichlet boundary values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirichletStrategy {
    /// Remove prescribed DOFs from the free system; their known values
    /// contribute to the right-hand side of connected rows.
    Eliminate,
    /// Keep prescribed DOFs in the system and add a large diagonal penalty
    /// plus a matching rhs term. Allows fast re-solves when Dirichlet data
    /// changes between calls without rebuilding the dof mapper.
    Penalize,
}

/// Diagonal coefficient used by [`DirichletStrategy::Penalize`].
pub const DIRICHLET_PENALTY: f64 = 1e9;

/// Newton solver configuration.
#[derive(Debug, Clone)]
pub struct NewtonOptions {
    /// Maximum number of Newton iterations allowed.
    pub max_iterations: usize,
    /// Relative tolerance on residual and update norms.
    pub tolerance: f64,
    /// Diagnostic output level.
    pub verbosity: Verbosity,
    /// Linear solver for the tangent systems.
    pub linear_solver: LinearSolverKind,
}

impl Default for NewtonOptions {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-12,
            verbosity: Verbosity::None,
            linear_solver: LinearSolverKind::Lu,
        }
    }
}
