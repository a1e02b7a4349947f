//! Global assembly.
//!
//! The [`Assembler`] owns the geometry, the field discretizations, the
//! boundary conditions, the dof mapper, and an injected [`ElementKernel`].
//! One assembler instance serves one physics; it iterates elements, invokes
//! the kernel per quadrature point, and accumulates local contributions into
//! a global sparse system.
//!
//! Element-local systems are computed in parallel with rayon and merged into
//! the global triplet store in a deterministic sequential phase, so repeated
//! assemblies of the same state produce bit-identical matrices.
//!
//! Two assembly paths exist:
//!
//! - [`Assembler::assemble`] (stateless): the classic linear path. Dirichlet
//!   DOFs are eliminated and their known values contribute to the right-hand
//!   side of connected rows.
//! - [`Assembler::assemble_at`]: the Newton path. The right-hand side is the
//!   negative residual of the supplied configuration; prescribed values
//!   enter through the configuration itself (reconstructed fields carry
//!   them), so no elimination terms are added.

use nalgebra::DVector;
use nalgebra_sparse::coo::CooMatrix;
use nalgebra_sparse::csr::CsrMatrix;
use rayon::prelude::*;

use crate::basis::TensorBasis;
use crate::boundary::BoundaryConditions;
use crate::dofmap::{DofEntry, DofMapper};
use crate::error::{Error, Result};
use crate::kernel::{ElementKernel, LocalSystem, QuadData};
use crate::options::{DirichletStrategy, DIRICHLET_PENALTY};
use crate::patch::{MultiPatch, PatchField};
use crate::quadrature::gauss_square;
use crate::types::{Mat2, Side, Vec2, DIM};

/// The fields of one physics: a vector field plus, for mixed formulations,
/// a scalar pressure field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSet {
    pub vector: PatchField,
    pub scalar: Option<PatchField>,
}

pub struct Assembler {
    geometry: MultiPatch,
    bases_u: Vec<TensorBasis>,
    bases_p: Option<Vec<TensorBasis>>,
    bc: BoundaryConditions,
    kernel: Box<dyn ElementKernel>,
    mapper: DofMapper,
    matrix: CsrMatrix<f64>,
    rhs: DVector<f64>,
}

impl Assembler {
    /// Build an assembler; constructs the dof mapper over the glued
    /// multi-patch discretization.
    ///
    /// The per-patch field bases must share the geometry's element grids
    /// (degrees may differ, e.g. Taylor-Hood pairs).
    pub fn new(
        geometry: MultiPatch,
        bases_u: Vec<TensorBasis>,
        bases_p: Option<Vec<TensorBasis>>,
        bc: BoundaryConditions,
        kernel: Box<dyn ElementKernel>,
        strategy: DirichletStrategy,
    ) -> Result<Self> {
        if bases_u.len() != geometry.n_patches() {
            return Err(Error::Config(format!(
                "{} vector bases for {} patches",
                bases_u.len(),
                geometry.n_patches()
            )));
        }
        if kernel.needs_pressure() && bases_p.is_none() {
            return Err(Error::Config(
                "kernel uses a mixed formulation but no pressure basis was supplied".into(),
            ));
        }
        for (p, basis) in bases_u.iter().enumerate() {
            if basis.elems() != geometry.patch(p).basis.elems() {
                return Err(Error::Config(format!(
                    "vector basis of patch {} does not share the geometry element grid",
                    p
                )));
            }
        }
        if let Some(bases_p) = &bases_p {
            for (p, basis) in bases_p.iter().enumerate() {
                if basis.elems() != geometry.patch(p).basis.elems() {
                    return Err(Error::Config(format!(
                        "pressure basis of patch {} does not share the geometry element grid",
                        p
                    )));
                }
            }
        }

        let mapper = DofMapper::new(&geometry, &bases_u, bases_p.as_deref(), &bc, strategy)?;
        let n = mapper.n_dofs();
        Ok(Self {
            geometry,
            bases_u,
            bases_p,
            bc,
            kernel,
            mapper,
            matrix: CsrMatrix::zeros(n, n),
            rhs: DVector::zeros(n),
        })
    }

    /// Number of free DOFs of the assembled system.
    pub fn num_dofs(&self) -> usize {
        self.mapper.n_dofs()
    }

    /// The assembled matrix (valid after an assemble call).
    pub fn matrix(&self) -> &CsrMatrix<f64> {
        &self.matrix
    }

    /// The assembled right-hand side (valid after an assemble call).
    pub fn rhs(&self) -> &DVector<f64> {
        &self.rhs
    }

    pub fn geometry(&self) -> &MultiPatch {
        &self.geometry
    }

    /// Mutable geometry access, used by the FSI loop to move the fluid mesh.
    pub fn geometry_mut(&mut self) -> &mut MultiPatch {
        &mut self.geometry
    }

    pub fn basis_u(&self, patch: usize) -> &TensorBasis {
        &self.bases_u[patch]
    }

    pub fn basis_p(&self, patch: usize) -> Option<&TensorBasis> {
        self.bases_p.as_ref().map(|b| &b[patch])
    }

    /// Mutable boundary-condition access, used to refresh Neumann loads
    /// between assemblies.
    pub fn bc_mut(&mut self) -> &mut BoundaryConditions {
        &mut self.bc
    }

    /// Prescribed Dirichlet values of one component.
    pub fn fixed_dofs(&self, component: usize) -> &[f64] {
        self.mapper.fixed_dofs(component)
    }

    /// Overwrite the prescribed Dirichlet values along one side without
    /// rebuilding the dof mapper.
    pub fn set_dirichlet_dofs(
        &mut self,
        component: usize,
        patch: usize,
        side: Side,
        values: &[f64],
    ) -> Result<()> {
        let basis = if component < DIM {
            self.bases_u[patch]
        } else {
            match &self.bases_p {
                Some(b) => b[patch],
                None => {
                    return Err(Error::Config(
                        "no pressure basis for pressure component".into(),
                    ))
                }
            }
        };
        self.mapper
            .set_dirichlet_dofs(component, patch, side, &basis, values)
    }

    /// Classic linear assembly: tangent at the undeformed zero state with
    /// Dirichlet elimination contributions on the right-hand side.
    pub fn assemble(&mut self) -> Result<()> {
        self.assemble_impl(None)
    }

    /// Assemble the tangent and negative residual at the given state.
    pub fn assemble_at(&mut self, state: &FieldSet) -> Result<()> {
        self.validate_state(state)?;
        self.assemble_impl(Some(state))
    }

    /// Map a free-DOF solution vector back into field objects, filling in
    /// prescribed DOFs from the stored boundary data. Idempotent.
    pub fn construct_solution(&self, solution: &DVector<f64>) -> Result<FieldSet> {
        if solution.len() != self.mapper.n_dofs() {
            return Err(Error::Config(format!(
                "solution vector has {} entries, system has {} dofs",
                solution.len(),
                self.mapper.n_dofs()
            )));
        }
        let mut vector = PatchField::zeros(DIM, &self.bases_u);
        for c in 0..DIM {
            let comp = self.mapper.component(c);
            let offset = self.mapper.offset(c);
            for p in 0..self.bases_u.len() {
                for node in 0..self.bases_u[p].n_nodes() {
                    let entry = comp.entry(p, node);
                    let value = match (entry.fixed, entry.free) {
                        (Some(fixed), _) => comp.fixed_values()[fixed],
                        (None, Some(free)) => solution[offset + free],
                        (None, None) => 0.0,
                    };
                    vector.set_value(p, node, c, value);
                }
            }
        }
        let scalar = match &self.bases_p {
            Some(bases_p) => {
                let mut scalar = PatchField::zeros(1, bases_p);
                let comp = self.mapper.component(DIM);
                let offset = self.mapper.offset(DIM);
                for p in 0..bases_p.len() {
                    for node in 0..bases_p[p].n_nodes() {
                        let entry = comp.entry(p, node);
                        let value = match (entry.fixed, entry.free) {
                            (Some(fixed), _) => comp.fixed_values()[fixed],
                            (None, Some(free)) => solution[offset + free],
                            (None, None) => 0.0,
                        };
                        scalar.set_value(p, node, 0, value);
                    }
                }
                Some(scalar)
            }
            None => None,
        };
        Ok(FieldSet { vector, scalar })
    }

    fn validate_state(&self, state: &FieldSet) -> Result<()> {
        if state.vector.components != DIM || state.vector.coefs.len() != self.bases_u.len() {
            return Err(Error::Config(
                "state vector field does not match the discretization".into(),
            ));
        }
        for (p, basis) in self.bases_u.iter().enumerate() {
            if state.vector.coefs[p].len() != DIM * basis.n_nodes() {
                return Err(Error::Config(format!(
                    "state vector field has wrong size on patch {}",
                    p
                )));
            }
        }
        match (&self.bases_p, &state.scalar) {
            (Some(bases_p), Some(scalar)) => {
                if scalar.coefs.len() != bases_p.len() {
                    return Err(Error::Config(
                        "state pressure field does not match the discretization".into(),
                    ));
                }
                for (p, basis) in bases_p.iter().enumerate() {
                    if scalar.coefs[p].len() != basis.n_nodes() {
                        return Err(Error::Config(format!(
                            "state pressure field has wrong size on patch {}",
                            p
                        )));
                    }
                }
            }
            (Some(_), None) => {
                return Err(Error::Config("state is missing the pressure field".into()))
            }
            (None, _) => {}
        }
        Ok(())
    }

    fn assemble_impl(&mut self, state: Option<&FieldSet>) -> Result<()> {
        let n_dofs = self.mapper.n_dofs();
        let tasks: Vec<(usize, usize)> = (0..self.bases_u.len())
            .flat_map(|p| (0..self.bases_u[p].n_elements()).map(move |e| (p, e)))
            .collect();

        // Element contributions are independent; compute them in parallel
        // and merge sequentially for determinism.
        let locals: Result<Vec<LocalSystem>> = tasks
            .par_iter()
            .map(|&(p, e)| self.element_local(p, e, state))
            .collect();
        let locals = locals?;

        let mut coo = CooMatrix::new(n_dofs, n_dofs);
        let mut rhs = DVector::zeros(n_dofs);
        for (&(p, e), local) in tasks.iter().zip(locals.iter()) {
            self.scatter(p, e, local, state.is_some(), &mut coo, &mut rhs);
        }

        self.integrate_neumann(&mut rhs)?;

        if self.mapper.strategy() == DirichletStrategy::Penalize {
            for c in 0..self.mapper.n_components() {
                let offset = self.mapper.offset(c);
                let comp = self.mapper.component(c);
                for (free, fixed) in comp.penalized() {
                    let i = offset + free;
                    coo.push(i, i, DIRICHLET_PENALTY);
                    // In the residual path the reconstructed state already
                    // carries the prescribed value, so the penalty force
                    // vanishes there.
                    if state.is_none() {
                        rhs[i] += DIRICHLET_PENALTY * comp.fixed_values()[fixed];
                    }
                }
            }
        }

        self.matrix = CsrMatrix::from(&coo);
        self.rhs = rhs;
        Ok(())
    }

    /// Compute one element's local system.
    fn element_local(
        &self,
        p: usize,
        element: usize,
        state: Option<&FieldSet>,
    ) -> Result<LocalSystem> {
        let basis_u = &self.bases_u[p];
        let basis_p = self.bases_p.as_ref().map(|b| &b[p]);
        let geo = self.geometry.patch(p);

        let nodes_u = basis_u.element_nodes(element);
        let n_u = nodes_u.len();
        let (nodes_p, n_p) = match basis_p {
            Some(bp) => {
                let nodes = bp.element_nodes(element);
                let n = nodes.len();
                (nodes, n)
            }
            None => (Vec::new(), 0),
        };

        let mut local = LocalSystem::new(n_u, n_p);
        let n_gauss = basis_u.degree().max(geo.basis.degree()) + 1;

        for qp2 in gauss_square(n_gauss) {
            let jac = geo.jacobian(element, qp2.xi, qp2.eta);
            let det = jac.determinant();
            if det <= 0.0 {
                return Err(Error::BadSolution(format!(
                    "non-positive geometry Jacobian on patch {} element {}",
                    p, element
                )));
            }
            let jac_inv = jac
                .try_inverse()
                .ok_or_else(|| Error::BadSolution("geometry Jacobian not invertible".into()))?;

            let (vals_u, grads_ref) = basis_u.shape_at(qp2.xi, qp2.eta);
            // physical gradients: J^-T * grad_ref
            let jac_inv_t = jac_inv.transpose();
            let grads_u: Vec<Vec2> = grads_ref.iter().map(|g| jac_inv_t * g).collect();

            let vals_p = match basis_p {
                Some(bp) => bp.shape_at(qp2.xi, qp2.eta).0,
                None => Vec::new(),
            };

            let (state_val, state_grad, state_p) = match state {
                Some(state) => {
                    let mut val = Vec2::zeros();
                    let mut grad_ref = Mat2::zeros();
                    for (i, &node) in nodes_u.iter().enumerate() {
                        let ux = state.vector.value(p, node, 0);
                        let uy = state.vector.value(p, node, 1);
                        val.x += vals_u[i] * ux;
                        val.y += vals_u[i] * uy;
                        grad_ref[(0, 0)] += ux * grads_ref[i].x;
                        grad_ref[(0, 1)] += ux * grads_ref[i].y;
                        grad_ref[(1, 0)] += uy * grads_ref[i].x;
                        grad_ref[(1, 1)] += uy * grads_ref[i].y;
                    }
                    let grad = grad_ref * jac_inv;
                    let p_val = match (&state.scalar, nodes_p.is_empty()) {
                        (Some(scalar), false) => nodes_p
                            .iter()
                            .enumerate()
                            .map(|(ip, &node)| vals_p[ip] * scalar.value(p, node, 0))
                            .sum(),
                        _ => 0.0,
                    };
                    (val, grad, p_val)
                }
                None => (Vec2::zeros(), Mat2::zeros(), 0.0),
            };

            let qp = QuadData {
                weight: qp2.weight * det,
                point: geo.eval_element(element, qp2.xi, qp2.eta),
                vals_u,
                grads_u,
                vals_p,
                state_val,
                state_grad,
                state_p,
            };
            self.kernel.accumulate(&qp, &mut local)?;
        }
        Ok(local)
    }

    /// Merge one element's local system into the global triplets and rhs.
    fn scatter(
        &self,
        p: usize,
        element: usize,
        local: &LocalSystem,
        at_state: bool,
        coo: &mut CooMatrix<f64>,
        rhs: &mut DVector<f64>,
    ) {
        let n_u = local.n_u;
        let n_p = local.n_p;
        let nodes_u = self.bases_u[p].element_nodes(element);
        let nodes_p = self
            .bases_p
            .as_ref()
            .map(|b| b[p].element_nodes(element))
            .unwrap_or_default();

        let entries_u: Vec<Vec<DofEntry>> = (0..DIM)
            .map(|c| {
                nodes_u
                    .iter()
                    .map(|&n| self.mapper.component(c).entry(p, n))
                    .collect()
            })
            .collect();
        let entries_p: Vec<DofEntry> = nodes_p
            .iter()
            .map(|&n| self.mapper.component(DIM).entry(p, n))
            .collect();

        let push = |row: DofEntry,
                        row_comp: usize,
                        col: DofEntry,
                        col_comp: usize,
                        value: f64,
                        coo: &mut CooMatrix<f64>,
                        rhs: &mut DVector<f64>| {
            if value == 0.0 {
                return;
            }
            if let Some(rf) = row.free {
                let i = self.mapper.offset(row_comp) + rf;
                match col.free {
                    Some(cf) => coo.push(i, self.mapper.offset(col_comp) + cf, value),
                    None => {
                        // Eliminated column: its known value loads the rhs
                        // in the stateless path only.
                        if !at_state {
                            if let Some(cfix) = col.fixed {
                                rhs[i] -=
                                    value * self.mapper.component(col_comp).fixed_values()[cfix];
                            }
                        }
                    }
                }
            }
        };

        // vector-field rows
        let symmetric = self.kernel.symmetric();
        for ai in 0..n_u {
            for ci in 0..DIM {
                let row = entries_u[ci][ai];
                if let Some(rf) = row.free {
                    rhs[self.mapper.offset(ci) + rf] += local.rhs_u[ci * n_u + ai];
                }
                let aj_start = if symmetric { ai } else { 0 };
                for aj in aj_start..n_u {
                    for cj in 0..DIM {
                        let value = local.kuu[(ci * n_u + ai, cj * n_u + aj)];
                        let col = entries_u[cj][aj];
                        push(row, ci, col, cj, value, coo, rhs);
                        if symmetric && aj > ai {
                            push(col, cj, row, ci, value, coo, rhs);
                        }
                    }
                }
                // pressure coupling: B and B^T
                for jp in 0..n_p {
                    let value = local.kup[(jp, ci * n_u + ai)];
                    let col = entries_p[jp];
                    push(row, ci, col, DIM, value, coo, rhs);
                    push(col, DIM, row, ci, value, coo, rhs);
                }
            }
        }

        // pressure rows
        for ip in 0..n_p {
            let row = entries_p[ip];
            if let Some(rf) = row.free {
                rhs[self.mapper.offset(DIM) + rf] += local.rhs_p[ip];
            }
            let jp_start = if symmetric { ip } else { 0 };
            for jp in jp_start..n_p {
                let value = local.kpp[(ip, jp)];
                let col = entries_p[jp];
                push(row, DIM, col, DIM, value, coo, rhs);
                if symmetric && jp > ip {
                    push(col, DIM, row, DIM, value, coo, rhs);
                }
            }
        }
    }

    /// Integrate Neumann boundary loads into the rhs.
    fn integrate_neumann(&self, rhs: &mut DVector<f64>) -> Result<()> {
        for nbc in self.bc.neumann() {
            let p = nbc.side.patch;
            if p >= self.bases_u.len() {
                return Err(Error::Config(format!(
                    "Neumann condition references patch {} but domain has {}",
                    p,
                    self.bases_u.len()
                )));
            }
            let side = nbc.side.side;
            let basis_u = &self.bases_u[p];
            let geo = self.geometry.patch(p);
            let side_elems = basis_u.side_elements(side);
            let n_side = side_elems.len();
            let tdir = side.tangent_dir();

            for (k, &element) in side_elems.iter().enumerate() {
                let nodes = basis_u.element_nodes(element);
                for &(t, wt) in &crate::quadrature::gauss_1d(basis_u.degree() + 1) {
                    let (xi, eta) = TensorBasis::side_ref_point(side, t);
                    let (vals, _) = basis_u.shape_at(xi, eta);
                    let jac = geo.jacobian(element, xi, eta);
                    let tangent = Vec2::new(jac[(0, tdir)], jac[(1, tdir)]);
                    let edge_w = wt * tangent.norm();
                    let normal = side.outward_normal(&tangent);
                    let point = geo.eval_element(element, xi, eta);
                    let side_param = (k as f64 + 0.5 * (t + 1.0)) / n_side as f64;
                    let traction = nbc.load.traction(&point, side_param, &normal);

                    for (i, &node) in nodes.iter().enumerate() {
                        for c in 0..DIM {
                            if let Some(gi) = self.mapper.global_index(c, p, node) {
                                rhs[gi] += edge_w * traction[c] * vals[i];
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
