//! Linear system solvers.
//!
//! Direct sparse solvers (LU, LLT) are backed by the faer library with the
//! symbolic analysis cached, so repeated Newton iterations on an unchanged
//! sparsity pattern only pay for numerical factorization. Iterative CG and
//! BiCGStab with diagonal preconditioning operate on the owned CSR matrix.

use faer::prelude::*;
use faer::sparse::linalg::solvers::{Cholesky, Lu, SymbolicCholesky, SymbolicLu};
use faer::sparse::linalg::CholeskyError;
use faer::sparse::{SparseColMat, SymbolicSparseColMat};
use nalgebra::DVector;
use nalgebra_sparse::csr::CsrMatrix;

use crate::error::{Error, Result};
use crate::options::LinearSolverKind;

/// Convert a CSR matrix to faer's CSC storage.
///
/// Transposes the index structure by scanning rows in order, which fills
/// each column's row indices in ascending order as faer requires.
fn csr_to_faer_csc(csr: &CsrMatrix<f64>) -> SparseColMat<usize, f64> {
    let nrows = csr.nrows();
    let ncols = csr.ncols();

    let row_offsets = csr.row_offsets();
    let col_indices = csr.col_indices();
    let values = csr.values();

    let mut col_counts = vec![0usize; ncols];
    for &col in col_indices {
        col_counts[col] += 1;
    }

    let mut col_offsets = vec![0usize; ncols + 1];
    for i in 0..ncols {
        col_offsets[i + 1] = col_offsets[i] + col_counts[i];
    }

    let nnz = values.len();
    let mut csc_row_indices = vec![0usize; nnz];
    let mut csc_values = vec![0.0f64; nnz];
    let mut col_positions = col_offsets[..ncols].to_vec();

    for row in 0..nrows {
        for idx in row_offsets[row]..row_offsets[row + 1] {
            let col = col_indices[idx];
            let pos = col_positions[col];
            csc_row_indices[pos] = row;
            csc_values[pos] = values[idx];
            col_positions[col] += 1;
        }
    }

    // SAFETY: offsets and indices constructed above form valid sorted CSC
    unsafe {
        SparseColMat::new(
            SymbolicSparseColMat::new_unchecked(nrows, ncols, col_offsets, None, csc_row_indices),
            csc_values,
        )
    }
}

enum Symbolic {
    Lu(SymbolicLu<usize>),
    Llt(SymbolicCholesky<usize>),
}

/// A linear solver with cached symbolic analysis.
///
/// The first `solve` performs symbolic analysis for direct solvers; later
/// calls on a matrix with the same sparsity pattern reuse it. Iterative
/// kinds keep no state.
pub struct LinearSolver {
    kind: LinearSolverKind,
    symbolic: Option<Symbolic>,
    /// Relative residual tolerance for the iterative kinds.
    pub iter_tolerance: f64,
    /// Iteration cap for the iterative kinds.
    pub max_iterations: usize,
}

impl LinearSolver {
    pub fn new(kind: LinearSolverKind) -> Self {
        Self {
            kind,
            symbolic: None,
            iter_tolerance: 1e-12,
            max_iterations: 10_000,
        }
    }

    /// Solve `matrix * x = rhs`.
    pub fn solve(&mut self, matrix: &CsrMatrix<f64>, rhs: &DVector<f64>) -> Result<DVector<f64>> {
        let n = matrix.nrows();
        if n != matrix.ncols() {
            return Err(Error::Solver("matrix must be square".into()));
        }
        if n != rhs.len() {
            return Err(Error::Solver("rhs size mismatch".into()));
        }
        if n == 0 {
            return Ok(DVector::zeros(0));
        }
        match self.kind {
            LinearSolverKind::Lu => self.solve_lu(matrix, rhs),
            LinearSolverKind::Ldlt => self.solve_llt(matrix, rhs),
            LinearSolverKind::IterativeCg => self.solve_cg(matrix, rhs),
            LinearSolverKind::IterativeBiCgStab => self.solve_bicgstab(matrix, rhs),
        }
    }

    fn solve_lu(&mut self, matrix: &CsrMatrix<f64>, rhs: &DVector<f64>) -> Result<DVector<f64>> {
        let csc = csr_to_faer_csc(matrix);
        let csc_ref = csc.as_ref();

        if !matches!(self.symbolic, Some(Symbolic::Lu(_))) {
            let symbolic = SymbolicLu::try_new(csc_ref.symbolic())
                .map_err(|_| Error::Solver("symbolic LU analysis failed".into()))?;
            self.symbolic = Some(Symbolic::Lu(symbolic));
        }
        let symbolic = match &self.symbolic {
            Some(Symbolic::Lu(s)) => s,
            _ => unreachable!(),
        };

        let lu = Lu::try_new_with_symbolic(symbolic.clone(), csc_ref)
            .map_err(|_| Error::SingularMatrix("sparse LU factorization failed".into()))?;

        let n = matrix.nrows();
        let mut x = faer::Mat::from_fn(n, 1, |i, _| rhs[i]);
        lu.solve_in_place(x.as_mut());
        Ok(DVector::from_fn(n, |i, _| x[(i, 0)]))
    }

    fn solve_llt(&mut self, matrix: &CsrMatrix<f64>, rhs: &DVector<f64>) -> Result<DVector<f64>> {
        let csc = csr_to_faer_csc(matrix);
        let csc_ref = csc.as_ref();

        if !matches!(self.symbolic, Some(Symbolic::Llt(_))) {
            let symbolic = SymbolicCholesky::try_new(csc_ref.symbolic(), faer::Side::Lower)
                .map_err(|_| Error::Solver("symbolic Cholesky analysis failed".into()))?;
            self.symbolic = Some(Symbolic::Llt(symbolic));
        }
        let symbolic = match &self.symbolic {
            Some(Symbolic::Llt(s)) => s,
            _ => unreachable!(),
        };

        let llt = Cholesky::try_new_with_symbolic(symbolic.clone(), csc_ref, faer::Side::Lower)
            .map_err(|e| match e {
                CholeskyError::Generic(err) => {
                    Error::Solver(format!("sparse Cholesky error: {:?}", err))
                }
                CholeskyError::SymbolicSingular => {
                    Error::SingularMatrix("matrix is structurally singular".into())
                }
                CholeskyError::NotPositiveDefinite => {
                    Error::SingularMatrix("matrix not positive definite".into())
                }
            })?;

        let n = matrix.nrows();
        let mut x = faer::Mat::from_fn(n, 1, |i, _| rhs[i]);
        llt.solve_in_place(x.as_mut());
        Ok(DVector::from_fn(n, |i, _| x[(i, 0)]))
    }

    fn solve_cg(&self, matrix: &CsrMatrix<f64>, rhs: &DVector<f64>) -> Result<DVector<f64>> {
        let n = rhs.len();
        let precond = jacobi_preconditioner(matrix)?;
        let mut x = DVector::zeros(n);
        let mut r = rhs.clone();
        let mut z = precond.component_mul(&r);
        let mut p = z.clone();
        let mut rz = r.dot(&z);
        let rhs_norm = rhs.norm();
        if rhs_norm == 0.0 {
            return Ok(x);
        }

        for _ in 0..self.max_iterations {
            let ap = spmv(matrix, &p);
            let pap = p.dot(&ap);
            if pap <= 0.0 {
                return Err(Error::SingularMatrix(
                    "CG encountered a non-positive curvature direction".into(),
                ));
            }
            let alpha = rz / pap;
            x.axpy(alpha, &p, 1.0);
            r.axpy(-alpha, &ap, 1.0);
            if r.norm() / rhs_norm < self.iter_tolerance {
                return Ok(x);
            }
            z = precond.component_mul(&r);
            let rz_new = r.dot(&z);
            let beta = rz_new / rz;
            rz = rz_new;
            p = &z + beta * &p;
        }
        Err(Error::Solver(format!(
            "CG did not converge in {} iterations",
            self.max_iterations
        )))
    }

    fn solve_bicgstab(&self, matrix: &CsrMatrix<f64>, rhs: &DVector<f64>) -> Result<DVector<f64>> {
        let n = rhs.len();
        let precond = jacobi_preconditioner(matrix)?;
        let mut x = DVector::zeros(n);
        let mut r = rhs.clone();
        let r0 = r.clone();
        let rhs_norm = rhs.norm();
        if rhs_norm == 0.0 {
            return Ok(x);
        }

        let mut rho = 1.0;
        let mut alpha = 1.0;
        let mut omega = 1.0;
        let mut v = DVector::zeros(n);
        let mut p = DVector::zeros(n);

        for _ in 0..self.max_iterations {
            let rho_new = r0.dot(&r);
            if rho_new.abs() < f64::MIN_POSITIVE {
                return Err(Error::Solver("BiCGStab breakdown (rho = 0)".into()));
            }
            let beta = (rho_new / rho) * (alpha / omega);
            rho = rho_new;
            p = &r + beta * (&p - omega * &v);
            let p_hat = precond.component_mul(&p);
            v = spmv(matrix, &p_hat);
            alpha = rho / r0.dot(&v);
            let s = &r - alpha * &v;
            if s.norm() / rhs_norm < self.iter_tolerance {
                x.axpy(alpha, &p_hat, 1.0);
                return Ok(x);
            }
            let s_hat = precond.component_mul(&s);
            let t = spmv(matrix, &s_hat);
            let tt = t.dot(&t);
            if tt.abs() < f64::MIN_POSITIVE {
                return Err(Error::Solver("BiCGStab breakdown (t = 0)".into()));
            }
            omega = t.dot(&s) / tt;
            x.axpy(alpha, &p_hat, 1.0);
            x.axpy(omega, &s_hat, 1.0);
            r = &s - omega * &t;
            if r.norm() / rhs_norm < self.iter_tolerance {
                return Ok(x);
            }
        }
        Err(Error::Solver(format!(
            "BiCGStab did not converge in {} iterations",
            self.max_iterations
        )))
    }
}

/// Sparse matrix-vector product on CSR storage.
fn spmv(matrix: &CsrMatrix<f64>, x: &DVector<f64>) -> DVector<f64> {
    let mut y = DVector::zeros(matrix.nrows());
    let row_offsets = matrix.row_offsets();
    let col_indices = matrix.col_indices();
    let values = matrix.values();
    for row in 0..matrix.nrows() {
        let mut acc = 0.0;
        for idx in row_offsets[row]..row_offsets[row + 1] {
            acc += values[idx] * x[col_indices[idx]];
        }
        y[row] = acc;
    }
    y
}

/// Inverse-diagonal (Jacobi) preconditioner.
fn jacobi_preconditioner(matrix: &CsrMatrix<f64>) -> Result<DVector<f64>> {
    let n = matrix.nrows();
    let mut inv_diag = DVector::zeros(n);
    for row in 0..n {
        let mut diag = 0.0;
        for idx in matrix.row_offsets()[row]..matrix.row_offsets()[row + 1] {
            if matrix.col_indices()[idx] == row {
                diag = matrix.values()[idx];
            }
        }
        if diag == 0.0 {
            return Err(Error::SingularMatrix(format!("zero diagonal at row {}", row)));
        }
        inv_diag[row] = 1.0 / diag;
    }
    Ok(inv_diag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra_sparse::coo::CooMatrix;

    fn spd_matrix() -> CsrMatrix<f64> {
        // [4 2 0; 2 5 2; 0 2 3]
        let mut coo = CooMatrix::new(3, 3);
        coo.push(0, 0, 4.0);
        coo.push(0, 1, 2.0);
        coo.push(1, 0, 2.0);
        coo.push(1, 1, 5.0);
        coo.push(1, 2, 2.0);
        coo.push(2, 1, 2.0);
        coo.push(2, 2, 3.0);
        CsrMatrix::from(&coo)
    }

    fn nonsymmetric_matrix() -> CsrMatrix<f64> {
        // [2 1 0; 0 3 1; 1 0 4]
        let mut coo = CooMatrix::new(3, 3);
        coo.push(0, 0, 2.0);
        coo.push(0, 1, 1.0);
        coo.push(1, 1, 3.0);
        coo.push(1, 2, 1.0);
        coo.push(2, 0, 1.0);
        coo.push(2, 2, 4.0);
        CsrMatrix::from(&coo)
    }

    fn check_residual(matrix: &CsrMatrix<f64>, x: &DVector<f64>, rhs: &DVector<f64>) {
        let r = spmv(matrix, x) - rhs;
        assert!(r.norm() < 1e-9, "residual too large: {}", r.norm());
    }

    #[test]
    fn test_all_kinds_solve_spd_system() {
        let matrix = spd_matrix();
        let rhs = DVector::from_vec(vec![2.0, 8.0, 5.0]);
        for kind in [
            LinearSolverKind::Lu,
            LinearSolverKind::Ldlt,
            LinearSolverKind::IterativeCg,
            LinearSolverKind::IterativeBiCgStab,
        ] {
            let mut solver = LinearSolver::new(kind);
            let x = solver.solve(&matrix, &rhs).unwrap();
            check_residual(&matrix, &x, &rhs);
            // Exact solution of the 3x3 system
            assert_relative_eq!(x[0], -0.1875, epsilon = 1e-8);
            assert_relative_eq!(x[1], 1.375, epsilon = 1e-8);
            assert_relative_eq!(x[2], 0.75, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_lu_solves_nonsymmetric_system() {
        let matrix = nonsymmetric_matrix();
        let rhs = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let mut solver = LinearSolver::new(LinearSolverKind::Lu);
        let x = solver.solve(&matrix, &rhs).unwrap();
        check_residual(&matrix, &x, &rhs);
    }

    #[test]
    fn test_bicgstab_solves_nonsymmetric_system() {
        let matrix = nonsymmetric_matrix();
        let rhs = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let mut solver = LinearSolver::new(LinearSolverKind::IterativeBiCgStab);
        let x = solver.solve(&matrix, &rhs).unwrap();
        check_residual(&matrix, &x, &rhs);
    }

    #[test]
    fn test_ldlt_rejects_indefinite_matrix() {
        // eigenvalues 3 and -1
        let mut coo = CooMatrix::new(2, 2);
        coo.push(0, 0, 1.0);
        coo.push(0, 1, 2.0);
        coo.push(1, 0, 2.0);
        coo.push(1, 1, 1.0);
        let matrix = CsrMatrix::from(&coo);
        let rhs = DVector::from_vec(vec![1.0, 1.0]);
        let mut solver = LinearSolver::new(LinearSolverKind::Ldlt);
        assert!(matches!(
            solver.solve(&matrix, &rhs),
            Err(Error::SingularMatrix(_))
        ));
    }

    #[test]
    fn test_symbolic_reuse_across_solves() {
        let matrix = spd_matrix();
        let rhs1 = DVector::from_vec(vec![4.0, 5.0, 1.0]);
        let rhs2 = 2.0 * &rhs1;
        let mut solver = LinearSolver::new(LinearSolverKind::Ldlt);
        let x1 = solver.solve(&matrix, &rhs1).unwrap();
        let x2 = solver.solve(&matrix, &rhs2).unwrap();
        // Linearity check: the cached-symbolic second solve scales exactly
        for i in 0..3 {
            assert_relative_eq!(x2[i], 2.0 * x1[i], epsilon = 1e-10);
        }
    }

    #[test]
    fn test_size_mismatch_rejected() {
        let matrix = spd_matrix();
        let rhs = DVector::from_vec(vec![1.0, 2.0]);
        let mut solver = LinearSolver::new(LinearSolverKind::Lu);
        assert!(solver.solve(&matrix, &rhs).is_err());
    }

    #[test]
    fn test_empty_system() {
        let coo = CooMatrix::new(0, 0);
        let matrix = CsrMatrix::from(&coo);
        let rhs = DVector::zeros(0);
        let mut solver = LinearSolver::new(LinearSolverKind::Lu);
        let x = solver.solve(&matrix, &rhs).unwrap();
        assert!(x.is_empty());
    }
}
