//! Displacement-only nonlinear elasticity.
//!
//! Finite-strain kinematics with a material-law switch:
//!
//! - Saint-Venant-Kirchhoff: S = 2*mu*E + lambda*tr(E)*I
//! - neo-Hookean (log volumetric): S = lambda*ln(J)*C^-1 + mu*(I - C^-1)
//!
//! Both laws contribute the residual P : grad(v) with P = F*S and the
//! consistent tangent (geometric plus material part). Cross terms are
//! computed once per basis pair i <= j and mirrored during assembly.

use crate::error::{Error, Result};
use crate::kernel::{BodyForce, ElementKernel, LocalSystem, QuadData};
use crate::material::Material;
use crate::options::MaterialLaw;
use crate::types::{Mat2, Vec2, DIM};

pub struct NonlinearElasticity {
    material: Material,
    law: MaterialLaw,
    body_force: BodyForce,
    tfac: f64,
    mu: f64,
    lambda: f64,
}

impl NonlinearElasticity {
    pub fn new(material: Material, law: MaterialLaw, body_force: BodyForce) -> Result<Self> {
        if material.is_incompressible() {
            return Err(Error::InvalidMaterial(
                "displacement formulation requires nu < 0.5; use the mixed formulation".into(),
            ));
        }
        Ok(Self {
            material,
            law,
            body_force,
            tfac: 1.0,
            mu: material.lame_mu(),
            lambda: material.lame_lambda(),
        })
    }

    /// Scale the body force by a load factor (for caller-side load stepping).
    pub fn with_tfac(mut self, tfac: f64) -> Self {
        self.tfac = tfac;
        self
    }

    fn accumulate_svk(&self, qp: &QuadData, local: &mut LocalSystem) {
        let n = local.n_u;
        let w = qp.weight;
        let (mu, lambda) = (self.mu, self.lambda);

        // F = I + du/dx, E = (F^T F - I)/2, S = 2*mu*E + lambda*tr(E)*I
        let f = Mat2::identity() + qp.state_grad;
        let e = 0.5 * (f.transpose() * f - Mat2::identity());
        let s = 2.0 * mu * e + lambda * e.trace() * Mat2::identity();
        let p = f * s;

        for i in 0..n {
            let gi = qp.grads_u[i];
            for di in 0..DIM {
                // residual: P : (e_di x grad N_i)
                local.rhs_u[di * n + i] -= w * (p[(di, 0)] * gi.x + p[(di, 1)] * gi.y);
                let fi = Vec2::new(f[(di, 0)], f[(di, 1)]); // row di of F

                for j in i..n {
                    let gj = qp.grads_u[j];
                    let geo = gi.dot(&(s * gj));
                    for dj in 0..DIM {
                        let fj = Vec2::new(f[(dj, 0)], f[(dj, 1)]);
                        let mut k = mu
                            * (fi.dot(&fj) * gi.dot(&gj) + fi.dot(&gj) * fj.dot(&gi))
                            + lambda * fi.dot(&gi) * fj.dot(&gj);
                        if di == dj {
                            k += geo;
                        }
                        local.kuu[(di * n + i, dj * n + j)] += w * k;
                    }
                }
            }
        }
    }

    fn accumulate_neo_hooke(&self, qp: &QuadData, local: &mut LocalSystem) -> Result<()> {
        let n = local.n_u;
        let w = qp.weight;
        let (mu, lambda) = (self.mu, self.lambda);

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
        let p_vol = lambda * det_f.ln();

        // P = mu*(F - F^-T) + lambda*ln(J)*F^-T
        let res_mat = (w * mu) * (f - f_inv.transpose()) + (w * p_vol) * f_inv.transpose();

        for i in 0..n {
            let gi = qp.grads_u[i];
            let res_vec = res_mat * gi;
            for di in 0..DIM {
                local.rhs_u[di * n + i] -= res_vec[di];
                let ci = Vec2::new(f_inv[(0, di)], f_inv[(1, di)]); // column di of F^-1

                for j in i..n {
                    let gj = qp.grads_u[j];
                    for dj in 0..DIM {
                        let cj = Vec2::new(f_inv[(0, dj)], f_inv[(1, dj)]);
                        let mut k = lambda * ci.dot(&gi) * cj.dot(&gj)
                            + (mu - p_vol) * gi.dot(&cj) * gj.dot(&ci);
                        if di == dj {
                            k += mu * gi.dot(&gj);
                        }
                        local.kuu[(di * n + i, dj * n + j)] += w * k;
                    }
                }
            }
        }
        Ok(())
    }
}

impl ElementKernel for NonlinearElasticity {
    fn accumulate(&self, qp: &QuadData, local: &mut LocalSystem) -> Result<()> {
        match self.law {
            MaterialLaw::SaintVenantKirchhoff => self.accumulate_svk(qp, local),
            MaterialLaw::NeoHookeLn => self.accumulate_neo_hooke(qp, local)?,
        }

        // body force, rho * f * tfac
        let n = local.n_u;
        let force = (self.body_force)(&qp.point) * (self.material.density * self.tfac);
        for i in 0..n {
            for di in 0..DIM {
                local.rhs_u[di * n + i] += qp.weight * force[di] * qp.vals_u[i];
            }
        }
        Ok(())
    }
}
