//! Small-strain linear elasticity (plane strain).

use crate::error::{Error, Result};
use crate::kernel::{BodyForce, ElementKernel, LocalSystem, QuadData};
use crate::material::Material;
use crate::types::DIM;

/// Linear elastic element kernel.
///
/// Assembles the classic B^T D B tangent and, when a current state is
/// supplied, the internal-force residual of that state, so it drives both
/// one-shot linear solves and single-step Newton solves.
pub struct LinearElasticity {
    material: Material,
    body_force: BodyForce,
    tfac: f64,
    // plane-strain constitutive entries
    c11: f64,
    c12: f64,
    c44: f64,
}

impl LinearElasticity {
    pub fn new(material: Material, body_force: BodyForce) -> Result<Self> {
        if material.is_incompressible() {
            return Err(Error::InvalidMaterial(
                "linear kernel requires nu < 0.5; use the mixed formulation".into(),
            ));
        }
        let e = material.youngs_modulus;
        let nu = material.poissons_ratio;
        let factor = e / ((1.0 + nu) * (1.0 - 2.0 * nu));
        Ok(Self {
            material,
            body_force,
            tfac: 1.0,
            c11: factor * (1.0 - nu),
            c12: factor * nu,
            c44: factor * (1.0 - 2.0 * nu) / 2.0,
        })
    }

    /// Scale the body force by a load factor (for caller-side load stepping).
    pub fn with_tfac(mut self, tfac: f64) -> Self {
        self.tfac = tfac;
        self
    }
}

impl ElementKernel for LinearElasticity {
    fn accumulate(&self, qp: &QuadData, local: &mut LocalSystem) -> Result<()> {
        let n = local.n_u;
        let w = qp.weight;
        let h = &qp.state_grad;

        // Stress of the current state in Voigt form
        let exx = h[(0, 0)];
        let eyy = h[(1, 1)];
        let gxy = h[(0, 1)] + h[(1, 0)];
        let sxx = self.c11 * exx + self.c12 * eyy;
        let syy = self.c12 * exx + self.c11 * eyy;
        let txy = self.c44 * gxy;

        let force = (self.body_force)(&qp.point) * (self.material.density * self.tfac);

        for i in 0..n {
            let gi = qp.grads_u[i];

            // internal forces and body force
            local.rhs_u[i] -= w * (sxx * gi.x + txy * gi.y);
            local.rhs_u[n + i] -= w * (syy * gi.y + txy * gi.x);
            for di in 0..DIM {
                local.rhs_u[di * n + i] += w * force[di] * qp.vals_u[i];
            }

            for j in i..n {
                let gj = qp.grads_u[j];
                local.kuu[(i, j)] += w * (self.c11 * gi.x * gj.x + self.c44 * gi.y * gj.y);
                local.kuu[(i, n + j)] += w * (self.c12 * gi.x * gj.y + self.c44 * gi.y * gj.x);
                local.kuu[(n + i, j)] += w * (self.c12 * gi.y * gj.x + self.c44 * gi.x * gj.y);
                local.kuu[(n + i, n + j)] +=
                    w * (self.c11 * gi.y * gj.y + self.c44 * gi.x * gj.x);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::zero_body_force;
    use crate::types::{Mat2, Point2, Vec2};
    use approx::assert_relative_eq;

    fn quad_point(state_grad: Mat2) -> QuadData {
        // One-point cloud standing in for a unit element: two basis
        // functions with simple gradients.
        QuadData {
            weight: 1.0,
            point: Point2::zeros(),
            vals_u: vec![0.5, 0.5],
            grads_u: vec![Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0)],
            vals_p: vec![],
            state_val: Vec2::zeros(),
            state_grad,
            state_p: 0.0,
        }
    }

    #[test]
    fn test_rejects_incompressible_material() {
        let mat = Material::new(1000.0, 0.5).unwrap();
        assert!(LinearElasticity::new(mat, zero_body_force()).is_err());
    }

    #[test]
    fn test_zero_state_zero_residual() {
        let mat = Material::new(1000.0, 0.3).unwrap();
        let kernel = LinearElasticity::new(mat, zero_body_force()).unwrap();
        let mut local = LocalSystem::new(2, 0);
        kernel.accumulate(&quad_point(Mat2::zeros()), &mut local).unwrap();
        assert_relative_eq!(local.rhs_u.norm(), 0.0);
        assert!(local.kuu.norm() > 0.0);
    }

    #[test]
    fn test_tangent_block_symmetric_on_diagonal() {
        let mat = Material::new(1000.0, 0.3).unwrap();
        let kernel = LinearElasticity::new(mat, zero_body_force()).unwrap();
        let mut local = LocalSystem::new(2, 0);
        kernel.accumulate(&quad_point(Mat2::zeros()), &mut local).unwrap();
        let n = 2;
        // Component blocks of a single basis function must be symmetric
        for i in 0..n {
            assert_relative_eq!(
                local.kuu[(i, n + i)],
                local.kuu[(n + i, i)],
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn test_residual_is_tangent_times_state() {
        // For the linear kernel, -rhs at state u must equal K*u of the
        // same local contribution (pure internal force, no body load).
        let mat = Material::new(200.0, 0.25).unwrap();
        let kernel = LinearElasticity::new(mat, zero_body_force()).unwrap();

        // State gradient produced by u = (0.2*phi_0, -0.1*phi_1)
        let u = nalgebra::DVector::from_vec(vec![0.2, 0.0, 0.0, -0.1]);
        let grad = Mat2::new(0.2, 0.0, 0.0, -0.1);

        let mut stateless = LocalSystem::new(2, 0);
        kernel
            .accumulate(&quad_point(Mat2::zeros()), &mut stateless)
            .unwrap();
        // Mirror the basis-pair upper triangle for the check
        let n = 2;
        let mut k = stateless.kuu.clone();
        for i in 0..n {
            for j in 0..i {
                for di in 0..2 {
                    for dj in 0..2 {
                        k[(di * n + i, dj * n + j)] = k[(dj * n + j, di * n + i)];
                    }
                }
            }
        }

        let mut at_state = LocalSystem::new(2, 0);
        kernel.accumulate(&quad_point(grad), &mut at_state).unwrap();

        let expected = -(&k * &u);
        for i in 0..4 {
            assert_relative_eq!(at_state.rhs_u[i], expected[i], epsilon = 1e-10);
        }
    }
}
