//! Newton's method for the assembled nonlinear systems.
//!
//! Drives repeated assemble-factorize-solve-update cycles against a single
//! assembler. The first iteration establishes the baseline residual and
//! update norms; convergence is tested from iteration 1 onward as
//! `|residue / r0| < tol` OR `|update / u0| < tol`, which makes the
//! criterion scale-invariant across load magnitudes.

use log::info;
use nalgebra::DVector;

use crate::assembler::Assembler;
use crate::error::{Error, Result};
use crate::linsolve::LinearSolver;
use crate::options::{NewtonOptions, Verbosity};

/// Terminal and transient states of the Newton iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewtonStatus {
    /// Converged within the iteration budget.
    Converged,
    /// Iteration budget exhausted without convergence.
    Interrupted,
    /// Solver constructed or still iterating.
    Working,
    /// Assembly hit an invalid physical state (element inversion).
    BadSolution,
}

/// Newton solver over one assembler.
///
/// Created per solve call; `solve` runs to one of the terminal states
/// {converged, interrupted, bad solution} and telemetry stays readable
/// afterwards.
pub struct Newton<'a> {
    assembler: &'a mut Assembler,
    options: NewtonOptions,
    solver: LinearSolver,
    solution: DVector<f64>,
    num_iterations: usize,
    residue: f64,
    update_norm: f64,
    status: NewtonStatus,
}

impl<'a> Newton<'a> {
    /// Start from the zero state.
    pub fn new(assembler: &'a mut Assembler, options: NewtonOptions) -> Self {
        let n = assembler.num_dofs();
        Self::from_parts(assembler, DVector::zeros(n), options)
    }

    /// Start from a given initial free-DOF solution.
    pub fn with_initial(
        assembler: &'a mut Assembler,
        initial: DVector<f64>,
        options: NewtonOptions,
    ) -> Result<Self> {
        if initial.len() != assembler.num_dofs() {
            return Err(Error::Config(format!(
                "initial solution has {} entries, system has {} dofs",
                initial.len(),
                assembler.num_dofs()
            )));
        }
        Ok(Self::from_parts(assembler, initial, options))
    }

    fn from_parts(
        assembler: &'a mut Assembler,
        solution: DVector<f64>,
        options: NewtonOptions,
    ) -> Self {
        let solver = LinearSolver::new(options.linear_solver);
        Self {
            assembler,
            options,
            solver,
            solution,
            num_iterations: 0,
            residue: 0.0,
            update_norm: 0.0,
            status: NewtonStatus::Working,
        }
    }

    /// Run Newton iterations until convergence, budget exhaustion, or an
    /// invalid physical state.
    pub fn solve(&mut self) -> Result<()> {
        if self.options.max_iterations == 0 {
            self.status = NewtonStatus::Interrupted;
            return Ok(());
        }

        self.iteration()?;
        let init_residue = self.residue;
        let init_update = self.update_norm;

        self.num_iterations = 1;
        while self.num_iterations < self.options.max_iterations {
            self.iteration()?;

            let res_ratio = relative(self.residue, init_residue);
            let upd_ratio = relative(self.update_norm, init_update);
            if res_ratio < self.options.tolerance || upd_ratio < self.options.tolerance {
                self.status = NewtonStatus::Converged;
                break;
            }
            self.num_iterations += 1;
        }

        if self.status != NewtonStatus::Converged {
            self.status = NewtonStatus::Interrupted;
        }
        if self.options.verbosity != Verbosity::None {
            info!(
                "Newton finished: status {:?}, {} iterations, residue {:.3e}, update norm {:.3e}",
                self.status, self.num_iterations, self.residue, self.update_norm
            );
        }
        Ok(())
    }

    /// One assemble-factorize-solve-update cycle at the current state.
    fn iteration(&mut self) -> Result<()> {
        let fields = self.assembler.construct_solution(&self.solution)?;
        if let Err(err) = self.assembler.assemble_at(&fields) {
            if matches!(err, Error::BadSolution(_)) {
                self.status = NewtonStatus::BadSolution;
            }
            return Err(err);
        }

        let update = self
            .solver
            .solve(self.assembler.matrix(), self.assembler.rhs())?;
        self.solution += &update;

        // Norms of the system just solved: the residual belongs to the
        // pre-update state, the update norm to the step taken from it.
        self.residue = self.assembler.rhs().norm();
        self.update_norm = update.norm();

        if self.options.verbosity == Verbosity::All {
            info!(
                "Iteration: {}, residue: {:.6e}, update norm: {:.6e}",
                self.num_iterations, self.residue, self.update_norm
            );
        }
        Ok(())
    }

    /// The latest free-DOF solution estimate.
    pub fn solution(&self) -> &DVector<f64> {
        &self.solution
    }

    /// Consume the solver and keep the solution, releasing the assembler.
    pub fn take_solution(self) -> DVector<f64> {
        self.solution
    }

    pub fn converged(&self) -> bool {
        self.status == NewtonStatus::Converged
    }

    pub fn status(&self) -> NewtonStatus {
        self.status
    }

    pub fn num_iterations(&self) -> usize {
        self.num_iterations
    }

    /// Residual norm of the last assembled system.
    pub fn residue(&self) -> f64 {
        self.residue
    }

    /// Norm of the last Newton update.
    pub fn update_norm(&self) -> f64 {
        self.update_norm
    }

    pub fn set_max_iterations(&mut self, n: usize) {
        self.options.max_iterations = n;
    }

    pub fn set_tolerance(&mut self, tol: f64) {
        self.options.tolerance = tol;
    }
}

fn relative(value: f64, reference: f64) -> f64 {
    if reference > 0.0 {
        (value / reference).abs()
    } else {
        0.0
    }
}
