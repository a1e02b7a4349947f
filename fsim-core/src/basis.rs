//! Tensor-product Lagrange bases on structured patch grids.
//!
//! This is the basis/geometry collaborator consumed by the assembler: it
//! supplies node numbering, element connectivity, shape-function values and
//! reference gradients, and boundary-side enumeration. Degrees 1 (bilinear)
//! and 2 (biquadratic) are supported, which covers Taylor-Hood mixed pairs
//! (degree-2 vector field with a degree-1 pressure on the same element grid).
//!
//! Nodes are numbered row-major over the structured grid; elements likewise.
//! Within an element, the local node ordering is row-major over the
//! (degree+1) x (degree+1) sub-grid, matching [`TensorBasis::shape_at`].

use crate::error::{Error, Result};
use crate::types::{Side, Vec2};

/// A tensor-product Lagrange basis over a structured grid of elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorBasis {
    degree: usize,
    elems: [usize; 2],
}

/// 1D Lagrange shape values and derivatives at `x` in [-1, 1].
///
/// Nodes are equally spaced; entries beyond `degree + 1` are zero.
fn lagrange_1d(degree: usize, x: f64) -> ([f64; 3], [f64; 3]) {
    match degree {
        1 => (
            [0.5 * (1.0 - x), 0.5 * (1.0 + x), 0.0],
            [-0.5, 0.5, 0.0],
        ),
        2 => (
            [
                0.5 * x * (x - 1.0),
                1.0 - x * x,
                0.5 * x * (x + 1.0),
            ],
            [x - 0.5, -2.0 * x, x + 0.5],
        ),
        _ => unreachable!("degree validated at construction"),
    }
}

impl TensorBasis {
    /// Create a basis of the given degree on an `nx` x `ny` element grid.
    pub fn new(degree: usize, nx: usize, ny: usize) -> Result<Self> {
        if degree == 0 || degree > 2 {
            return Err(Error::Config(format!(
                "unsupported basis degree {} (expected 1 or 2)",
                degree
            )));
        }
        if nx == 0 || ny == 0 {
            return Err(Error::Config("empty element grid".into()));
        }
        Ok(Self {
            degree,
            elems: [nx, ny],
        })
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Element counts per parametric direction.
    pub fn elems(&self) -> [usize; 2] {
        self.elems
    }

    /// Number of nodes along parametric direction `d`.
    pub fn n_nodes_dir(&self, d: usize) -> usize {
        self.degree * self.elems[d] + 1
    }

    /// Total number of basis functions (nodes).
    pub fn n_nodes(&self) -> usize {
        self.n_nodes_dir(0) * self.n_nodes_dir(1)
    }

    /// Flat node index of grid position (ix, iy).
    pub fn node_index(&self, ix: usize, iy: usize) -> usize {
        iy * self.n_nodes_dir(0) + ix
    }

    /// Total number of elements.
    pub fn n_elements(&self) -> usize {
        self.elems[0] * self.elems[1]
    }

    /// Basis functions supported on one element.
    pub fn nodes_per_element(&self) -> usize {
        (self.degree + 1) * (self.degree + 1)
    }

    /// Grid position (ex, ey) of element `e`.
    pub fn element_grid(&self, e: usize) -> (usize, usize) {
        (e % self.elems[0], e / self.elems[0])
    }

    /// Global node indices of element `e`, in local row-major order.
    pub fn element_nodes(&self, e: usize) -> Vec<usize> {
        let (ex, ey) = self.element_grid(e);
        let p = self.degree;
        let mut nodes = Vec::with_capacity(self.nodes_per_element());
        for b in 0..=p {
            for a in 0..=p {
                nodes.push(self.node_index(ex * p + a, ey * p + b));
            }
        }
        nodes
    }

    /// Shape values and reference gradients at (xi, eta) in [-1, 1]^2.
    ///
    /// Ordering matches [`TensorBasis::element_nodes`].
    pub fn shape_at(&self, xi: f64, eta: f64) -> (Vec<f64>, Vec<Vec2>) {
        let p = self.degree;
        let (nx, dx) = lagrange_1d(p, xi);
        let (ny, dy) = lagrange_1d(p, eta);
        let n = self.nodes_per_element();
        let mut values = Vec::with_capacity(n);
        let mut grads = Vec::with_capacity(n);
        for b in 0..=p {
            for a in 0..=p {
                values.push(nx[a] * ny[b]);
                grads.push(Vec2::new(dx[a] * ny[b], nx[a] * dy[b]));
            }
        }
        (values, grads)
    }

    /// Parameter coordinates of a node, in [0, 1]^2.
    pub fn node_param(&self, node: usize) -> Vec2 {
        let nx = self.n_nodes_dir(0);
        let (ix, iy) = (node % nx, node / nx);
        Vec2::new(
            ix as f64 / (self.degree * self.elems[0]) as f64,
            iy as f64 / (self.degree * self.elems[1]) as f64,
        )
    }

    /// Locate a patch parameter point: element index plus reference coords.
    pub fn locate(&self, param: &Vec2) -> (usize, f64, f64) {
        let loc = |u: f64, n: usize| -> (usize, f64) {
            let scaled = (u.clamp(0.0, 1.0)) * n as f64;
            let e = (scaled.floor() as usize).min(n - 1);
            (e, 2.0 * (scaled - e as f64) - 1.0)
        };
        let (ex, xi) = loc(param.x, self.elems[0]);
        let (ey, eta) = loc(param.y, self.elems[1]);
        (ey * self.elems[0] + ex, xi, eta)
    }

    /// Nodes on a boundary side, ordered by increasing tangential parameter.
    pub fn side_nodes(&self, side: Side) -> Vec<usize> {
        let nx = self.n_nodes_dir(0);
        let ny = self.n_nodes_dir(1);
        match side {
            Side::West => (0..ny).map(|iy| self.node_index(0, iy)).collect(),
            Side::East => (0..ny).map(|iy| self.node_index(nx - 1, iy)).collect(),
            Side::South => (0..nx).map(|ix| self.node_index(ix, 0)).collect(),
            Side::North => (0..nx).map(|ix| self.node_index(ix, ny - 1)).collect(),
        }
    }

    /// Elements adjacent to a boundary side, ordered along the side.
    pub fn side_elements(&self, side: Side) -> Vec<usize> {
        let [nx, ny] = self.elems;
        match side {
            Side::West => (0..ny).map(|ey| ey * nx).collect(),
            Side::East => (0..ny).map(|ey| ey * nx + nx - 1).collect(),
            Side::South => (0..nx).collect(),
            Side::North => (0..nx).map(|ex| (ny - 1) * nx + ex).collect(),
        }
    }

    /// Reference coordinates of a point on a side of an element,
    /// given the edge coordinate `t` in [-1, 1].
    pub fn side_ref_point(side: Side, t: f64) -> (f64, f64) {
        match side {
            Side::West => (-1.0, t),
            Side::East => (1.0, t),
            Side::South => (t, -1.0),
            Side::North => (t, 1.0),
        }
    }
}
