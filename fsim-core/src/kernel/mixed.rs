//! Mixed displacement-pressure kernel for (near-)incompressible nonlinear
//! elasticity (Taylor-Hood pairs).
//!
//! The pressure unknown is dimensionless; the physical pressure is
//! mu * p. At each quadrature point, with H = du/dx, F = I + H, J = det F:
//!
//! - displacement residual: [mu*(F - F^-T) + mu*p*F^-T] : grad(v)
//! - pressure residual: mu*ln(J) * psi
//! - tangent: mu*tr(gradU^T gradV) + (mu - mu*p)*tr(F^-1 gradU F^-1 gradV)
//! - coupling: mu*tr(F^-1 gradU) * psi
//! - stabilization: -(mu^2/lambda) * psi_i psi_j, skipped at the
//!   incompressible limit lambda = infinity
//!
//! Cross terms are computed once per basis pair i <= j and mirrored during
//! assembly.

use crate::error::{Error, Result};
use crate::kernel::{BodyForce, ElementKernel, LocalSystem, QuadData};
use crate::material::Material;
use crate::types::{Mat2, Vec2, DIM};

pub struct NonlinearMixed {
    material: Material,
    body_force: BodyForce,
    tfac: f64,
    mu: f64,
    lambda: f64,
}

impl NonlinearMixed {
    /// Create the mixed kernel. A Poisson ratio of 0.5 selects the exact
    /// incompressible limit.
    pub fn new(material: Material, body_force: BodyForce) -> Self {
        Self {
            material,
            body_force,
            tfac: 1.0,
            mu: material.lame_mu(),
            lambda: material.lame_lambda(),
        }
    }

    /// Scale the body force by a load factor (for caller-side load stepping).
    pub fn with_tfac(mut self, tfac: f64) -> Self {
        self.tfac = tfac;
        self
    }
}

impl ElementKernel for NonlinearMixed {
    fn needs_pressure(&self) -> bool {
        true
    }

    fn accumulate(&self, qp: &QuadData, local: &mut LocalSystem) -> Result<()> {
        let n = local.n_u;
        let n_p = local.n_p;
        let w = qp.weight;
        let mu = self.mu;

        let f = Mat2::identity() + qp.state_grad;
        let det_f = f.determinant();
        if det_f <= 0.0 {
            return Err(Error::BadSolution(format!(
                "non-positive deformation gradient determinant {:.3e}",
                det_f
            )));
        }
        let f_inv = f
            .try_inverse()
            .ok_or_else(|| Error::BadSolution("deformation gradient not invertible".into()))?;
        let log_det_f = w * mu * det_f.ln();

        let prex = mu * qp.state_p;
        let muprex = mu - prex;

        // internal force contribution, mu*(F - F^-T) + p*F^-T
        let res_mat = (w * mu) * (f - f_inv.transpose()) + (w * prex) * f_inv.transpose();

        for i in 0..n {
            let gi = qp.grads_u[i];
            let res_vec = res_mat * gi;
            for di in 0..DIM {
                local.rhs_u[di * n + i] -= res_vec[di];

                let ci = Vec2::new(f_inv[(0, di)], f_inv[(1, di)]); // column di of F^-1
                let trace_i = ci.dot(&gi); // tr(F^-1 gradU)

                for j in i..n {
                    let gj = qp.grads_u[j];
                    for dj in 0..DIM {
                        let cj = Vec2::new(f_inv[(0, dj)], f_inv[(1, dj)]);
                        let mut k = muprex * gi.dot(&cj) * gj.dot(&ci);
                        if di == dj {
                            k += mu * gi.dot(&gj);
                        }
                        local.kuu[(di * n + i, dj * n + j)] += w * k;
                    }
                }

                // displacement-pressure coupling
                for jp in 0..n_p {
                    local.kup[(jp, di * n + i)] += w * mu * trace_i * qp.vals_p[jp];
                }
            }
        }

        // pressure residual and near-incompressibility stabilization;
        // the stabilization vanishes at the incompressible limit
        let near = if self.lambda.is_finite() {
            Some(mu * mu / self.lambda * w)
        } else {
            None
        };
        for ip in 0..n_p {
            local.rhs_p[ip] -= log_det_f * qp.vals_p[ip];
            if let Some(near) = near {
                local.rhs_p[ip] += near / mu * prex * qp.vals_p[ip];
                for jp in ip..n_p {
                    local.kpp[(ip, jp)] -= near * qp.vals_p[ip] * qp.vals_p[jp];
                }
            }
        }

        // body force, rho * f * tfac
        let force = (self.body_force)(&qp.point) * (self.material.density * self.tfac);
        for i in 0..n {
            for di in 0..DIM {
                local.rhs_u[di * n + i] += w * force[di] * qp.vals_u[i];
            }
        }
        Ok(())
    }
}
