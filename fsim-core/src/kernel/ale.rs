//! Mesh-motion (ALE) kernel.

use crate::error::Result;
use crate::kernel::{zero_body_force, ElementKernel, LinearElasticity, LocalSystem, QuadData};
use crate::material::Material;

/// Mesh motion modeled as near-incompressible linear elasticity.
///
/// The stiffness is fictitious (unit Young's modulus); only the Poisson
/// ratio matters, a high value resisting local volume change and keeping
/// deformed mesh cells well shaped.
pub struct AleKernel {
    inner: LinearElasticity,
}

impl AleKernel {
    /// Create a mesh-motion kernel with the given Poisson ratio
    /// (typically 0.4-0.49; must stay below 0.5).
    pub fn new(poissons_ratio: f64) -> Result<Self> {
        let material = Material::new(1.0, poissons_ratio)?;
        Ok(Self {
            inner: LinearElasticity::new(material, zero_body_force())?,
        })
    }
}

impl ElementKernel for AleKernel {
    fn accumulate(&self, qp: &QuadData, local: &mut LocalSystem) -> Result<()> {
        self.inner.accumulate(qp, local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Mat2, Point2, Vec2};
    use approx::assert_relative_eq;

    #[test]
    fn test_rejects_incompressible_ratio() {
        assert!(AleKernel::new(0.5).is_err());
        assert!(AleKernel::new(0.4).is_ok());
    }

    #[test]
    fn test_zero_state_gives_zero_residual() {
        let kernel = AleKernel::new(0.4).unwrap();
        let mut local = LocalSystem::new(1, 0);
        let qp = QuadData {
            weight: 1.0,
            point: Point2::zeros(),
            vals_u: vec![1.0],
            grads_u: vec![Vec2::new(0.3, 0.7)],
            vals_p: vec![],
            state_val: Vec2::zeros(),
            state_grad: Mat2::zeros(),
            state_p: 0.0,
        };
        kernel.accumulate(&qp, &mut local).unwrap();
        assert_relative_eq!(local.rhs_u.norm(), 0.0);
        assert!(local.kuu[(0, 0)] > 0.0);
    }
}
