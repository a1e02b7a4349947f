//! FSIM Core - nonlinear solid mechanics and partitioned FSI
//!
//! Solvers for steady and quasi-static nonlinear elasticity on multi-patch
//! tensor-product discretizations, coupled with an incompressible-flow
//! solver and a mesh-motion solver into a partitioned fluid-structure
//! interaction loop:
//!
//! - Element kernels for linear, finite-strain and mixed
//!   displacement-pressure elasticity, mesh motion, and incompressible
//!   Navier-Stokes
//! - Parallel assembly with per-component Dirichlet elimination or
//!   penalization over glued multi-patch domains
//! - A Newton driver with scale-invariant convergence criteria
//! - A staggered FSI coupling loop with interface-residual monitoring
//!
//! # Architecture
//!
//! The solver is designed around these core abstractions:
//!
//! - [`ElementKernel`]: per-element tangent and residual of one physics
//! - [`Assembler`]: dof mapping, global assembly, solution reconstruction
//! - [`Newton`]: assemble-factorize-solve-update iteration
//! - [`FsiSolver`]: the three-field coupling loop

pub mod assembler;
pub mod basis;
pub mod boundary;
pub mod dofmap;
pub mod error;
pub mod fsi;
pub mod kernel;
pub mod linsolve;
pub mod material;
pub mod newton;
pub mod options;
pub mod patch;
pub mod quadrature;
pub mod types;

pub use assembler::{Assembler, FieldSet};
pub use basis::TensorBasis;
pub use boundary::{BoundaryConditions, BoundaryLoad, ConstantLoad, DirichletValue};
pub use error::{Error, Result};
pub use fsi::{FsiCoupling, FsiLoad, FsiOptions, FsiSolver, MovingPatch};
pub use kernel::{
    AleKernel, ElementKernel, IncompressibleFlow, LinearElasticity, NonlinearElasticity,
    NonlinearMixed,
};
pub use linsolve::LinearSolver;
pub use material::Material;
pub use newton::{Newton, NewtonStatus};
pub use options::{
    DirichletStrategy, LinearSolverKind, MaterialLaw, NewtonOptions, Verbosity,
};
pub use patch::{InterfaceGlue, MultiPatch, Patch, PatchField};
pub use types::{Mat2, Point2, Side, SideRef, Vec2, DIM};
