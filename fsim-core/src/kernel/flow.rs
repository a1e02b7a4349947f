//! Incompressible Navier-Stokes kernel (Taylor-Hood pairs).
//!
//! Steady momentum/continuity residual with full Newton linearization of
//! the convection term. With dynamic viscosity rho*nu, velocity u and
//! pressure p:
//!
//! - momentum residual: rho*nu*(grad u + grad u^T) : grad v
//!   + rho*(u . grad)u . v - p div(v) - rho*f . v
//! - continuity residual (negated so the Stokes limit stays symmetric):
//!   -div(u) * psi
//!
//! Convection makes the velocity block nonsymmetric, so the kernel fills
//! full blocks and reports `symmetric() == false`; the pressure coupling
//! stays a transpose pair.

use crate::error::{Error, Result};
use crate::kernel::{BodyForce, ElementKernel, LocalSystem, QuadData};
use crate::types::DIM;

pub struct IncompressibleFlow {
    /// Kinematic viscosity nu.
    viscosity: f64,
    /// Fluid density rho.
    density: f64,
    body_force: BodyForce,
}

impl IncompressibleFlow {
    pub fn new(viscosity: f64, density: f64, body_force: BodyForce) -> Result<Self> {
        if viscosity <= 0.0 || density <= 0.0 {
            return Err(Error::Config(
                "viscosity and density must be positive".into(),
            ));
        }
        Ok(Self {
            viscosity,
            density,
            body_force,
        })
    }
}

impl ElementKernel for IncompressibleFlow {
    fn needs_pressure(&self) -> bool {
        true
    }

    fn symmetric(&self) -> bool {
        false
    }

    fn accumulate(&self, qp: &QuadData, local: &mut LocalSystem) -> Result<()> {
        let n = local.n_u;
        let n_p = local.n_p;
        let w = qp.weight;
        let rho = self.density;
        let mu_f = rho * self.viscosity;

        let u = qp.state_val;
        let g = qp.state_grad; // g[(a, b)] = d u_a / d x_b
        let g_sym = g + g.transpose();
        let conv = g * u; // (u . grad)u
        let p = qp.state_p;
        let div_u = g.trace();

        let force = (self.body_force)(&qp.point) * rho;

        for i in 0..n {
            let gi = qp.grads_u[i];
            let ni = qp.vals_u[i];
            for di in 0..DIM {
                // momentum residual (rhs is the negative residual)
                let visc = mu_f * (g_sym[(di, 0)] * gi.x + g_sym[(di, 1)] * gi.y);
                local.rhs_u[di * n + i] -=
                    w * (visc + rho * ni * conv[di] - p * gi[di] - force[di] * ni);

                for j in 0..n {
                    let gj = qp.grads_u[j];
                    let nj = qp.vals_u[j];
                    let u_dot_gj = u.dot(&gj);
                    for dj in 0..DIM {
                        let mut k = mu_f * gi[dj] * gj[di] + rho * ni * nj * g[(di, dj)];
                        if di == dj {
                            k += mu_f * gi.dot(&gj) + rho * ni * u_dot_gj;
                        }
                        local.kuu[(di * n + i, dj * n + j)] += w * k;
                    }
                }

                // pressure coupling, -psi * div(v); mirrored by the
                // assembler into the (negated) continuity rows
                for jp in 0..n_p {
                    local.kup[(jp, di * n + i)] -= w * qp.vals_p[jp] * gi[di];
                }
            }
        }

        for ip in 0..n_p {
            local.rhs_p[ip] += w * qp.vals_p[ip] * div_u;
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

    fn quad_point(u: Vec2, g: Mat2, p: f64) -> QuadData {
        QuadData {
            weight: 1.0,
            point: Point2::zeros(),
            vals_u: vec![0.4, 0.6],
            grads_u: vec![Vec2::new(1.0, 0.5), Vec2::new(-0.5, 1.0)],
            vals_p: vec![1.0],
            state_val: u,
            state_grad: g,
            state_p: p,
        }
    }

    #[test]
    fn test_rejects_nonpositive_parameters() {
        assert!(IncompressibleFlow::new(0.0, 1.0, zero_body_force()).is_err());
        assert!(IncompressibleFlow::new(1.0, -1.0, zero_body_force()).is_err());
        assert!(IncompressibleFlow::new(1.0, 1.0, zero_body_force()).is_ok());
    }

    #[test]
    fn test_stokes_limit_is_symmetric() {
        // At zero velocity the convection terms vanish and the velocity
        // block must be symmetric by value.
        let kernel = IncompressibleFlow::new(0.01, 1.0, zero_body_force()).unwrap();
        let mut local = LocalSystem::new(2, 1);
        kernel
            .accumulate(&quad_point(Vec2::zeros(), Mat2::zeros(), 0.0), &mut local)
            .unwrap();
        for i in 0..4 {
            for j in 0..4 {
                assert_relative_eq!(local.kuu[(i, j)], local.kuu[(j, i)], epsilon = 1e-13);
            }
        }
    }

    #[test]
    fn test_convection_breaks_symmetry() {
        let kernel = IncompressibleFlow::new(0.01, 1.0, zero_body_force()).unwrap();
        let mut local = LocalSystem::new(2, 1);
        let g = Mat2::new(0.2, -0.1, 0.3, -0.2);
        kernel
            .accumulate(&quad_point(Vec2::new(1.0, 0.5), g, 0.0), &mut local)
            .unwrap();
        let asym = (&local.kuu - local.kuu.transpose()).norm();
        assert!(asym > 1e-8, "convection should break symmetry, got {}", asym);
    }

    #[test]
    fn test_divergence_free_state_zero_continuity_residual() {
        let kernel = IncompressibleFlow::new(0.01, 1.0, zero_body_force()).unwrap();
        let mut local = LocalSystem::new(2, 1);
        // trace-free gradient
        let g = Mat2::new(0.3, 0.1, 0.2, -0.3);
        kernel
            .accumulate(&quad_point(Vec2::new(1.0, 0.0), g, 0.0), &mut local)
            .unwrap();
        assert_relative_eq!(local.rhs_p[0], 0.0, epsilon = 1e-14);
    }

    #[test]
    fn test_tangent_consistent_with_residual() {
        // Finite-difference check of the velocity-block entry excited by
        // basis 0 in x: perturbing that DOF changes both the value and the
        // gradient of the state.
        let kernel = IncompressibleFlow::new(0.05, 2.0, zero_body_force()).unwrap();
        let h = 1e-7;
        let u = Vec2::new(0.8, -0.3);
        let g = Mat2::new(0.2, -0.1, 0.3, -0.2);
        let n0 = 0.4;
        let g0 = Vec2::new(1.0, 0.5);

        let mut at_base = LocalSystem::new(2, 1);
        kernel.accumulate(&quad_point(u, g, 0.1), &mut at_base).unwrap();

        let u_pert = u + Vec2::new(h * n0, 0.0);
        let g_pert = g + Mat2::new(h * g0.x, h * g0.y, 0.0, 0.0);
        let mut at_pert = LocalSystem::new(2, 1);
        kernel
            .accumulate(&quad_point(u_pert, g_pert, 0.1), &mut at_pert)
            .unwrap();

        let fd = -(at_pert.rhs_u[0] - at_base.rhs_u[0]) / h;
        assert_relative_eq!(at_base.kuu[(0, 0)], fd, max_relative = 1e-4);
    }

    #[test]
    fn test_pressure_coupling_is_negative_divergence() {
        let kernel = IncompressibleFlow::new(0.01, 1.0, zero_body_force()).unwrap();
        let mut local = LocalSystem::new(2, 1);
        kernel
            .accumulate(&quad_point(Vec2::zeros(), Mat2::zeros(), 0.0), &mut local)
            .unwrap();
        // kup(0, di*n + i) = -psi * dN_i/dx_di
        assert_relative_eq!(local.kup[(0, 0)], -1.0, epsilon = 1e-14); // g0.x
        assert_relative_eq!(local.kup[(0, 2)], -0.5, epsilon = 1e-14); // g0.y
    }
}
