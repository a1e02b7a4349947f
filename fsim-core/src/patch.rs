//! Patches, multi-patch domains, and solution fields.
//!
//! A [`Patch`] couples a tensor basis with control-point coefficients and is
//! used both for the domain geometry and, through [`PatchField`], for
//! solution fields (displacement, pressure, velocity, mesh displacement).
//! Patch interfaces inside a [`MultiPatch`] are glued by matching boundary
//! nodes side to side.

use crate::basis::TensorBasis;
use crate::error::{Error, Result};
use crate::types::{Mat2, Side, SideRef, Vec2};

/// A single tensor-product patch: basis plus control points.
#[derive(Debug, Clone)]
pub struct Patch {
    pub basis: TensorBasis,
    /// Control points, one per basis node.
    pub coefs: Vec<Vec2>,
}

impl Patch {
    /// Create a patch from a basis and matching control points.
    pub fn new(basis: TensorBasis, coefs: Vec<Vec2>) -> Result<Self> {
        if coefs.len() != basis.n_nodes() {
            return Err(Error::Config(format!(
                "patch needs {} control points, got {}",
                basis.n_nodes(),
                coefs.len()
            )));
        }
        Ok(Self { basis, coefs })
    }

    /// An axis-aligned rectangular patch with uniformly spaced nodes.
    pub fn rectangle(basis: TensorBasis, x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        let nx = basis.n_nodes_dir(0);
        let ny = basis.n_nodes_dir(1);
        let mut coefs = Vec::with_capacity(nx * ny);
        for iy in 0..ny {
            for ix in 0..nx {
                let u = ix as f64 / (nx - 1) as f64;
                let v = iy as f64 / (ny - 1) as f64;
                coefs.push(Vec2::new(x0 + u * (x1 - x0), y0 + v * (y1 - y0)));
            }
        }
        Self { basis, coefs }
    }

    /// Evaluate the geometry map at a patch parameter in [0, 1]^2.
    pub fn eval(&self, param: &Vec2) -> Vec2 {
        let (e, xi, eta) = self.basis.locate(param);
        self.eval_element(e, xi, eta)
    }

    /// Evaluate the geometry map at element reference coordinates.
    pub fn eval_element(&self, element: usize, xi: f64, eta: f64) -> Vec2 {
        let (values, _) = self.basis.shape_at(xi, eta);
        let nodes = self.basis.element_nodes(element);
        let mut x = Vec2::zeros();
        for (i, &node) in nodes.iter().enumerate() {
            x += values[i] * self.coefs[node];
        }
        x
    }

    /// Geometry Jacobian dx/dref at element reference coordinates.
    pub fn jacobian(&self, element: usize, xi: f64, eta: f64) -> Mat2 {
        let (_, grads) = self.basis.shape_at(xi, eta);
        let nodes = self.basis.element_nodes(element);
        let mut jac = Mat2::zeros();
        for (i, &node) in nodes.iter().enumerate() {
            let c = self.coefs[node];
            let g = grads[i];
            jac[(0, 0)] += c.x * g.x;
            jac[(0, 1)] += c.x * g.y;
            jac[(1, 0)] += c.y * g.x;
            jac[(1, 1)] += c.y * g.y;
        }
        jac
    }

    /// Control points along a boundary side, ordered by increasing
    /// tangential parameter.
    pub fn boundary_coefs(&self, side: Side) -> Vec<Vec2> {
        self.basis
            .side_nodes(side)
            .into_iter()
            .map(|n| self.coefs[n])
            .collect()
    }

    /// Add `sign` times an interleaved 2-component displacement to the
    /// control points. Used by the FSI mesh-motion retract/apply pair.
    pub fn apply_displacement(&mut self, values: &[f64], sign: f64) -> Result<()> {
        if values.len() != 2 * self.coefs.len() {
            return Err(Error::Config(format!(
                "displacement has {} values, patch has {} control points",
                values.len(),
                self.coefs.len()
            )));
        }
        for (n, c) in self.coefs.iter_mut().enumerate() {
            c.x += sign * values[2 * n];
            c.y += sign * values[2 * n + 1];
        }
        Ok(())
    }
}

/// A glued interface between two patch sides.
///
/// The sides must carry the same number of nodes per shared field basis;
/// `reversed` flips the tangential orientation of side `b`.
#[derive(Debug, Clone, Copy)]
pub struct InterfaceGlue {
    pub a: SideRef,
    pub b: SideRef,
    pub reversed: bool,
}

/// A collection of patches with glued interfaces.
#[derive(Debug, Clone)]
pub struct MultiPatch {
    pub patches: Vec<Patch>,
    pub glue: Vec<InterfaceGlue>,
}

impl MultiPatch {
    /// A single-patch domain.
    pub fn single(patch: Patch) -> Self {
        Self {
            patches: vec![patch],
            glue: Vec::new(),
        }
    }

    pub fn new(patches: Vec<Patch>, glue: Vec<InterfaceGlue>) -> Self {
        Self { patches, glue }
    }

    pub fn n_patches(&self) -> usize {
        self.patches.len()
    }

    pub fn patch(&self, i: usize) -> &Patch {
        &self.patches[i]
    }

    pub fn patch_mut(&mut self, i: usize) -> &mut Patch {
        &mut self.patches[i]
    }
}

/// A solution field over a multi-patch domain.
///
/// Coefficients are stored per patch, interleaved by component:
/// `coefs[patch][node * components + c]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchField {
    pub components: usize,
    pub coefs: Vec<Vec<f64>>,
}

impl PatchField {
    /// A zero field over the given per-patch bases.
    pub fn zeros(components: usize, bases: &[TensorBasis]) -> Self {
        Self {
            components,
            coefs: bases
                .iter()
                .map(|b| vec![0.0; b.n_nodes() * components])
                .collect(),
        }
    }

    /// Coefficient of one component at a node.
    pub fn value(&self, patch: usize, node: usize, comp: usize) -> f64 {
        self.coefs[patch][node * self.components + comp]
    }

    pub fn set_value(&mut self, patch: usize, node: usize, comp: usize, v: f64) {
        self.coefs[patch][node * self.components + comp] = v;
    }

    /// Field values of one component along a boundary side, ordered by
    /// increasing tangential parameter.
    pub fn boundary_values(
        &self,
        basis: &TensorBasis,
        patch: usize,
        side: Side,
        comp: usize,
    ) -> Vec<f64> {
        basis
            .side_nodes(side)
            .into_iter()
            .map(|n| self.value(patch, n, comp))
            .collect()
    }

    /// Field value at element reference coordinates (all components).
    pub fn eval_element(
        &self,
        basis: &TensorBasis,
        patch: usize,
        element: usize,
        xi: f64,
        eta: f64,
    ) -> Vec<f64> {
        let (values, _) = basis.shape_at(xi, eta);
        let nodes = basis.element_nodes(element);
        let mut out = vec![0.0; self.components];
        for (i, &node) in nodes.iter().enumerate() {
            for c in 0..self.components {
                out[c] += values[i] * self.value(patch, node, c);
            }
        }
        out
    }

    /// Reference-coordinate gradient of a 2-component field:
    /// `G[(a, b)] = d u_a / d ref_b`. Combine with the inverse geometry
    /// Jacobian for physical gradients.
    pub fn ref_gradient(
        &self,
        basis: &TensorBasis,
        patch: usize,
        element: usize,
        xi: f64,
        eta: f64,
    ) -> Mat2 {
        debug_assert_eq!(self.components, 2);
        let (_, grads) = basis.shape_at(xi, eta);
        let nodes = basis.element_nodes(element);
        let mut g = Mat2::zeros();
        for (i, &node) in nodes.iter().enumerate() {
            let ux = self.value(patch, node, 0);
            let uy = self.value(patch, node, 1);
            g[(0, 0)] += ux * grads[i].x;
            g[(0, 1)] += ux * grads[i].y;
            g[(1, 0)] += uy * grads[i].x;
            g[(1, 1)] += uy * grads[i].y;
        }
        g
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_square(degree: usize) -> Patch {
        Patch::rectangle(TensorBasis::new(degree, 2, 2).unwrap(), 0.0, 0.0, 1.0, 1.0)
    }

    #[test]
    fn test_rectangle_eval_is_identity_map() {
        for degree in 1..=2 {
            let patch = unit_square(degree);
            for &(u, v) in &[(0.0, 0.0), (0.5, 0.5), (0.3, 0.8), (1.0, 1.0)] {
                let x = patch.eval(&Vec2::new(u, v));
                assert_relative_eq!(x.x, u, epsilon = 1e-13);
                assert_relative_eq!(x.y, v, epsilon = 1e-13);
            }
        }
    }

    #[test]
    fn test_rectangle_jacobian() {
        // 2x2 elements on [0,2]x[0,1]: each element maps [-1,1]^2 to a
        // 1.0 x 0.5 cell, so J = diag(0.5, 0.25)
        let patch = Patch::rectangle(TensorBasis::new(1, 2, 2).unwrap(), 0.0, 0.0, 2.0, 1.0);
        let jac = patch.jacobian(0, 0.2, -0.3);
        assert_relative_eq!(jac[(0, 0)], 0.5, epsilon = 1e-13);
        assert_relative_eq!(jac[(1, 1)], 0.25, epsilon = 1e-13);
        assert_relative_eq!(jac[(0, 1)], 0.0, epsilon = 1e-13);
        assert_relative_eq!(jac[(1, 0)], 0.0, epsilon = 1e-13);
    }

    #[test]
    fn test_boundary_coefs() {
        let patch = unit_square(1);
        let east = patch.boundary_coefs(Side::East);
        assert_eq!(east.len(), 3);
        for c in &east {
            assert_relative_eq!(c.x, 1.0);
        }
        assert_relative_eq!(east[0].y, 0.0);
        assert_relative_eq!(east[2].y, 1.0);
    }

    #[test]
    fn test_apply_displacement_roundtrip() {
        let mut patch = unit_square(1);
        let before = patch.coefs.clone();
        let disp: Vec<f64> = (0..2 * patch.coefs.len()).map(|i| 0.01 * i as f64).collect();
        patch.apply_displacement(&disp, 1.0).unwrap();
        patch.apply_displacement(&disp, -1.0).unwrap();
        for (a, b) in patch.coefs.iter().zip(before.iter()) {
            assert_relative_eq!((a - b).norm(), 0.0, epsilon = 1e-15);
        }
    }

    #[test]
    fn test_field_eval_linear() {
        // Field u = (x, 2y) interpolated on the identity patch
        let patch = unit_square(1);
        let basis = patch.basis;
        let mut field = PatchField::zeros(2, &[basis]);
        for n in 0..basis.n_nodes() {
            let p = basis.node_param(n);
            field.set_value(0, n, 0, p.x);
            field.set_value(0, n, 1, 2.0 * p.y);
        }
        let v = field.eval_element(&basis, 0, 0, 0.5, -0.5);
        let x = patch.eval_element(0, 0.5, -0.5);
        assert_relative_eq!(v[0], x.x, epsilon = 1e-13);
        assert_relative_eq!(v[1], 2.0 * x.y, epsilon = 1e-13);

        // du/dx = diag(1, 2): ref gradient times inverse geometry Jacobian
        let g_ref = field.ref_gradient(&basis, 0, 0, 0.5, -0.5);
        let jac = patch.jacobian(0, 0.5, -0.5);
        let g_phys = g_ref
            * jac
                .try_inverse()
                .expect("rectangle Jacobian is invertible");
        assert_relative_eq!(g_phys[(0, 0)], 1.0, epsilon = 1e-12);
        assert_relative_eq!(g_phys[(1, 1)], 2.0, epsilon = 1e-12);
        assert_relative_eq!(g_phys[(0, 1)], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_boundary_values_ordering() {
        let basis = TensorBasis::new(1, 2, 1).unwrap();
        let mut field = PatchField::zeros(1, &[basis]);
        for n in 0..basis.n_nodes() {
            field.set_value(0, n, 0, n as f64);
        }
        assert_eq!(
            field.boundary_values(&basis, 0, Side::South, 0),
            vec![0.0, 1.0, 2.0]
        );
        assert_eq!(
            field.boundary_values(&basis, 0, Side::North, 0),
            vec![3.0, 4.0, 5.0]
        );
    }
}
