//! Material property definitions for isotropic continua.

use crate::error::{Error, Result};

/// Isotropic material parameters.
///
/// A Poisson's ratio of exactly 0.5 describes the incompressible limit:
/// the first Lame parameter becomes infinite and kernels that support it
/// (the mixed displacement-pressure formulation) skip their near-
/// incompressibility stabilization terms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    /// Young's modulus E.
    pub youngs_modulus: f64,
    /// Poisson's ratio nu, in (-1, 0.5].
    pub poissons_ratio: f64,
    /// Mass density rho (scales body forces).
    pub density: f64,
}

impl Material {
    /// Create a new isotropic material.
    ///
    /// # Errors
    ///
    /// Returns an error if E is not positive or nu lies outside (-1, 0.5].
    pub fn new(youngs_modulus: f64, poissons_ratio: f64) -> Result<Self> {
        if youngs_modulus <= 0.0 {
            return Err(Error::InvalidMaterial(
                "Young's modulus must be positive".into(),
            ));
        }
        if poissons_ratio <= -1.0 || poissons_ratio > 0.5 {
            return Err(Error::InvalidMaterial(
                "Poisson's ratio must be in range (-1, 0.5]".into(),
            ));
        }
        Ok(Self {
            youngs_modulus,
            poissons_ratio,
            density: 1.0,
        })
    }

    /// Set the mass density.
    pub fn with_density(mut self, density: f64) -> Result<Self> {
        if density <= 0.0 {
            return Err(Error::InvalidMaterial("Density must be positive".into()));
        }
        self.density = density;
        Ok(self)
    }

    /// Shear modulus (second Lame parameter) mu = E / (2(1 + nu)).
    pub fn lame_mu(&self) -> f64 {
        self.youngs_modulus / (2.0 * (1.0 + self.poissons_ratio))
    }

    /// First Lame parameter lambda = E*nu / ((1+nu)(1-2nu)).
    ///
    /// Returns `f64::INFINITY` at the incompressible limit nu = 0.5.
    pub fn lame_lambda(&self) -> f64 {
        let nu = self.poissons_ratio;
        if nu == 0.5 {
            return f64::INFINITY;
        }
        self.youngs_modulus * nu / ((1.0 + nu) * (1.0 - 2.0 * nu))
    }

    /// True if the material is at the incompressible limit.
    pub fn is_incompressible(&self) -> bool {
        self.poissons_ratio == 0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_material_creation() {
        let mat = Material::new(1000.0, 0.3).unwrap();
        assert_relative_eq!(mat.youngs_modulus, 1000.0);
        assert_relative_eq!(mat.poissons_ratio, 0.3);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(Material::new(-10.0, 0.3).is_err());
        assert!(Material::new(0.0, 0.3).is_err());
        assert!(Material::new(1000.0, -1.0).is_err());
        assert!(Material::new(1000.0, 0.6).is_err());
    }

    #[test]
    fn test_lame_parameters() {
        let mat = Material::new(1000.0, 0.3).unwrap();
        assert_relative_eq!(mat.lame_mu(), 1000.0 / 2.6, epsilon = 1e-12);
        assert_relative_eq!(
            mat.lame_lambda(),
            1000.0 * 0.3 / (1.3 * 0.4),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_incompressible_limit() {
        let mat = Material::new(1000.0, 0.5).unwrap();
        assert!(mat.is_incompressible());
        assert!(mat.lame_lambda().is_infinite());
        assert!(mat.lame_mu().is_finite());
    }
}
