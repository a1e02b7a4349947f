//! Degree-of-freedom mapping.
//!
//! One [`ComponentMapper`] per scalar field component translates
//! (patch, basis node) into either a free index of that component's
//! numbering or a fixed slot carrying a prescribed Dirichlet value.
//! Glued patch interfaces share DOFs; gluing is resolved with a union-find
//! over the side nodes.
//!
//! Under [`DirichletStrategy::Eliminate`], prescribed DOFs get no free index
//! and never receive matrix rows or columns. Under
//! [`DirichletStrategy::Penalize`], they stay in the free numbering and the
//! assembler adds a large diagonal penalty instead; prescribed values can
//! then be updated between solves without rebuilding the mapper.

use crate::basis::TensorBasis;
use crate::boundary::BoundaryConditions;
use crate::error::{Error, Result};
use crate::options::DirichletStrategy;
use crate::patch::MultiPatch;
use crate::types::{Side, DIM};

/// Free/fixed classification of one (patch, node) slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DofEntry {
    /// Component-local free index, if the DOF participates in the system.
    pub free: Option<usize>,
    /// Fixed-slot index into the prescribed-value array, if Dirichlet.
    pub fixed: Option<usize>,
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, i: usize) -> usize {
        let mut root = i;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cur = i;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[rb.max(ra)] = rb.min(ra);
        }
    }
}

/// Mapping of one scalar component over all patches.
pub struct ComponentMapper {
    /// [patch][node] -> class id (glued nodes share a class).
    class_of: Vec<Vec<usize>>,
    /// [class] -> free index (None if eliminated).
    free_of: Vec<Option<usize>>,
    /// [class] -> fixed slot (Some iff Dirichlet).
    fixed_of: Vec<Option<usize>>,
    n_free: usize,
    fixed_values: Vec<f64>,
}

impl ComponentMapper {
    fn build(
        geometry: &MultiPatch,
        bases: &[TensorBasis],
        bc: &BoundaryConditions,
        component: usize,
        strategy: DirichletStrategy,
    ) -> Result<Self> {
        let n_patches = bases.len();
        let offsets: Vec<usize> = bases
            .iter()
            .scan(0usize, |acc, b| {
                let o = *acc;
                *acc += b.n_nodes();
                Some(o)
            })
            .collect();
        let total: usize = bases.iter().map(|b| b.n_nodes()).sum();

        // Glue side nodes pairwise across declared interfaces
        let mut uf = UnionFind::new(total);
        for glue in &geometry.glue {
            if glue.a.patch >= n_patches || glue.b.patch >= n_patches {
                return Err(Error::Config(format!(
                    "glue references patch {} but domain has {}",
                    glue.a.patch.max(glue.b.patch),
                    n_patches
                )));
            }
            let nodes_a = bases[glue.a.patch].side_nodes(glue.a.side);
            let mut nodes_b = bases[glue.b.patch].side_nodes(glue.b.side);
            if glue.reversed {
                nodes_b.reverse();
            }
            if nodes_a.len() != nodes_b.len() {
                return Err(Error::Config(format!(
                    "glued sides have {} vs {} nodes",
                    nodes_a.len(),
                    nodes_b.len()
                )));
            }
            for (&na, &nb) in nodes_a.iter().zip(nodes_b.iter()) {
                uf.union(offsets[glue.a.patch] + na, offsets[glue.b.patch] + nb);
            }
        }

        // Number classes deterministically in node order
        let mut class_id = vec![usize::MAX; total];
        let mut n_classes = 0;
        for i in 0..total {
            let root = uf.find(i);
            if class_id[root] == usize::MAX {
                class_id[root] = n_classes;
                n_classes += 1;
            }
            class_id[i] = class_id[root];
        }

        let class_of: Vec<Vec<usize>> = (0..n_patches)
            .map(|p| {
                (0..bases[p].n_nodes())
                    .map(|n| class_id[offsets[p] + n])
                    .collect()
            })
            .collect();

        // Mark Dirichlet classes and collect their interpolated values
        let mut dirichlet_class = vec![false; n_classes];
        let mut value_of_class = vec![0.0; n_classes];
        for dbc in bc.dirichlet_for(component) {
            let p = dbc.side.patch;
            if p >= n_patches {
                return Err(Error::Config(format!(
                    "boundary condition references patch {} but domain has {}",
                    p, n_patches
                )));
            }
            for node in bases[p].side_nodes(dbc.side.side) {
                let class = class_of[p][node];
                dirichlet_class[class] = true;
                let point = geometry.patch(p).eval(&bases[p].node_param(node));
                value_of_class[class] = dbc.value.eval(&point);
            }
        }

        // Free and fixed numbering
        let mut free_of = vec![None; n_classes];
        let mut fixed_of = vec![None; n_classes];
        let mut fixed_values = Vec::new();
        let mut n_free = 0;
        for class in 0..n_classes {
            if dirichlet_class[class] {
                fixed_of[class] = Some(fixed_values.len());
                fixed_values.push(value_of_class[class]);
                if strategy == DirichletStrategy::Penalize {
                    free_of[class] = Some(n_free);
                    n_free += 1;
                }
            } else {
                free_of[class] = Some(n_free);
                n_free += 1;
            }
        }

        Ok(Self {
            class_of,
            free_of,
            fixed_of,
            n_free,
            fixed_values,
        })
    }

    /// Number of free DOFs in this component's numbering.
    pub fn n_free(&self) -> usize {
        self.n_free
    }

    /// Classification of a (patch, node) slot.
    pub fn entry(&self, patch: usize, node: usize) -> DofEntry {
        let class = self.class_of[patch][node];
        DofEntry {
            free: self.free_of[class],
            fixed: self.fixed_of[class],
        }
    }

    /// Prescribed values, indexed by fixed slot.
    pub fn fixed_values(&self) -> &[f64] {
        &self.fixed_values
    }

    /// Penalized/eliminated slots as (free index, fixed slot) pairs.
    /// Non-empty for [`DirichletStrategy::Penalize`] only.
    pub fn penalized(&self) -> Vec<(usize, usize)> {
        (0..self.free_of.len())
            .filter_map(|class| match (self.free_of[class], self.fixed_of[class]) {
                (Some(free), Some(fixed)) => Some((free, fixed)),
                _ => None,
            })
            .collect()
    }
}

/// Multi-component DOF mapper: one [`ComponentMapper`] per scalar component
/// plus global offsets. Components 0..DIM are the vector field; a trailing
/// component addresses the pressure field when present.
pub struct DofMapper {
    components: Vec<ComponentMapper>,
    offsets: Vec<usize>,
    n_dofs: usize,
    strategy: DirichletStrategy,
}

impl DofMapper {
    pub fn new(
        geometry: &MultiPatch,
        bases_u: &[TensorBasis],
        bases_p: Option<&[TensorBasis]>,
        bc: &BoundaryConditions,
        strategy: DirichletStrategy,
    ) -> Result<Self> {
        if bases_u.len() != geometry.n_patches() {
            return Err(Error::Config(format!(
                "{} field bases for {} geometry patches",
                bases_u.len(),
                geometry.n_patches()
            )));
        }
        let mut components = Vec::new();
        for c in 0..DIM {
            components.push(ComponentMapper::build(geometry, bases_u, bc, c, strategy)?);
        }
        if let Some(bases_p) = bases_p {
            if bases_p.len() != geometry.n_patches() {
                return Err(Error::Config(format!(
                    "{} pressure bases for {} geometry patches",
                    bases_p.len(),
                    geometry.n_patches()
                )));
            }
            components.push(ComponentMapper::build(
                geometry, bases_p, bc, DIM, strategy,
            )?);
        }
        let mut offsets = Vec::with_capacity(components.len());
        let mut n_dofs = 0;
        for comp in &components {
            offsets.push(n_dofs);
            n_dofs += comp.n_free();
        }
        Ok(Self {
            components,
            offsets,
            n_dofs,
            strategy,
        })
    }

    /// Total number of free DOFs across all components.
    pub fn n_dofs(&self) -> usize {
        self.n_dofs
    }

    pub fn n_components(&self) -> usize {
        self.components.len()
    }

    pub fn strategy(&self) -> DirichletStrategy {
        self.strategy
    }

    pub fn component(&self, c: usize) -> &ComponentMapper {
        &self.components[c]
    }

    /// Global offset of component `c` in the assembled system.
    pub fn offset(&self, c: usize) -> usize {
        self.offsets[c]
    }

    /// Global free index of a (component, patch, node) slot, if free.
    pub fn global_index(&self, c: usize, patch: usize, node: usize) -> Option<usize> {
        self.components[c]
            .entry(patch, node)
            .free
            .map(|f| self.offsets[c] + f)
    }

    /// Prescribed values of one component.
    pub fn fixed_dofs(&self, c: usize) -> &[f64] {
        self.components[c].fixed_values()
    }

    /// Overwrite the prescribed values along a side of one component.
    ///
    /// `values` are ordered by increasing tangential parameter, one per side
    /// node of `basis`. The mapper structure is untouched, so this is cheap
    /// and valid between repeated assemble/solve calls.
    pub fn set_dirichlet_dofs(
        &mut self,
        c: usize,
        patch: usize,
        side: Side,
        basis: &TensorBasis,
        values: &[f64],
    ) -> Result<()> {
        let comp = &mut self.components[c];
        let nodes = basis.side_nodes(side);
        if nodes.len() != values.len() {
            return Err(Error::Config(format!(
                "side has {} nodes but {} Dirichlet values supplied",
                nodes.len(),
                values.len()
            )));
        }
        for (&node, &v) in nodes.iter().zip(values.iter()) {
            let class = comp.class_of[patch][node];
            match comp.fixed_of[class] {
                Some(fixed) => comp.fixed_values[fixed] = v,
                None => {
                    return Err(Error::Config(format!(
                        "node {} on patch {} is not a Dirichlet DOF",
                        node, patch
                    )))
                }
            }
        }
        Ok(())
    }
}
