//! Finite-volume operator matrices on a single (possibly combined) submesh.
//!
//! On `n` cells, node quantities have length `n` and edge quantities have
//! length `n + 1`.

use std::f64::consts::PI;

use nalgebra_sparse::CsrMatrix;
use volta_core::sparse;
use volta_symbolic::{BoundaryKind, Side};

use crate::{CoordinateSystem, SubMesh};

/// Where a discretized quantity lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Location {
    Scalar,
    Nodes,
    Edges,
}

/// A gradient with its boundary rows set by boundary conditions.
///
/// The edge gradient is `matrix · u + left · bₗ + right · bᵣ`, where `bₗ`
/// and `bᵣ` are the boundary-condition values and `left`/`right` are the
/// `(n + 1) × 1` columns they enter through.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryStencil {
    pub matrix: CsrMatrix<f64>,
    pub left: CsrMatrix<f64>,
    pub right: CsrMatrix<f64>,
}

/// Gradient from nodes to edges, boundary rows set by the condition kinds.
///
/// A Neumann side takes the condition value as the boundary flux. A
/// Dirichlet side uses a half-cell difference against the condition value.
#[must_use]
pub fn gradient(mesh: &SubMesh, left: BoundaryKind, right: BoundaryKind) -> BoundaryStencil {
    let n = mesh.cells();
    let nodes = mesh.nodes();
    let edges = mesh.edges();
    let spacing = mesh.node_spacing();

    let mut triplets = Vec::with_capacity(2 * n + 2);
    for (i, dx) in spacing.iter().enumerate() {
        triplets.push((i + 1, i, -1.0 / dx));
        triplets.push((i + 1, i + 1, 1.0 / dx));
    }

    let left_column = match left {
        BoundaryKind::Neumann => 1.0,
        BoundaryKind::Dirichlet => {
            let half = nodes[0] - edges[0];
            triplets.push((0, 0, 1.0 / half));
            -1.0 / half
        }
    };
    let right_column = match right {
        BoundaryKind::Neumann => 1.0,
        BoundaryKind::Dirichlet => {
            let half = edges[n] - nodes[n - 1];
            triplets.push((n, n - 1, -1.0 / half));
            1.0 / half
        }
    };

    BoundaryStencil {
        matrix: sparse::from_triplets(n + 1, n, triplets),
        left: sparse::from_triplets(n + 1, 1, [(0, 0, left_column)]),
        right: sparse::from_triplets(n + 1, 1, [(n, 0, right_column)]),
    }
}

/// Flux difference from edges to nodes, normalized by cell volume.
///
/// Returns `None` for cylindrical meshes, which have no divergence rule.
#[must_use]
pub fn divergence(mesh: &SubMesh) -> Option<CsrMatrix<f64>> {
    let n = mesh.cells();
    let edges = mesh.edges();
    let mut triplets = Vec::with_capacity(2 * n);

    match mesh.coordinate_system() {
        CoordinateSystem::Cartesian => {
            for (i, dx) in mesh.widths().iter().enumerate() {
                triplets.push((i, i, -1.0 / dx));
                triplets.push((i, i + 1, 1.0 / dx));
            }
        }
        CoordinateSystem::SphericalPolar => {
            for i in 0..n {
                let (r0, r1) = (edges[i], edges[i + 1]);
                let volume = r1.powi(3) - r0.powi(3);
                triplets.push((i, i, -3.0 * r0 * r0 / volume));
                triplets.push((i, i + 1, 3.0 * r1 * r1 / volume));
            }
        }
        CoordinateSystem::CylindricalPolar => return None,
    }

    Some(sparse::from_triplets(n, n + 1, triplets))
}

/// Quadrature weights `1 × n`: cell widths, or spherical shell volumes.
#[must_use]
pub fn integral(mesh: &SubMesh) -> Option<CsrMatrix<f64>> {
    let edges = mesh.edges();
    let weights: Vec<f64> = match mesh.coordinate_system() {
        CoordinateSystem::Cartesian => mesh.widths(),
        CoordinateSystem::SphericalPolar => edges
            .windows(2)
            .map(|w| 4.0 * PI * (w[1].powi(3) - w[0].powi(3)) / 3.0)
            .collect(),
        CoordinateSystem::CylindricalPolar => return None,
    };
    Some(sparse::from_triplets(
        1,
        weights.len(),
        weights.iter().enumerate().map(|(j, w)| (0, j, *w)),
    ))
}

/// Linear extrapolation of node values to one boundary edge, as a `1 × n` row.
#[must_use]
pub fn boundary_value(mesh: &SubMesh, side: Side) -> CsrMatrix<f64> {
    let n = mesh.cells();
    if n == 1 {
        return sparse::from_triplets(1, 1, [(0, 0, 1.0)]);
    }

    let nodes = mesh.nodes();
    let edges = mesh.edges();
    let (near, far, edge) = match side {
        Side::Left => (0, 1, edges[0]),
        Side::Right => (n - 1, n - 2, edges[n]),
    };
    let ratio = (edge - nodes[near]) / (nodes[far] - nodes[near]);
    sparse::from_triplets(1, n, [(0, near, 1.0 - ratio), (0, far, ratio)])
}

/// Shifts node values to edges, `(n + 1) × n`.
///
/// Interior edges interpolate between neighbouring nodes by distance; the
/// two boundary edges extrapolate linearly.
#[must_use]
pub fn node_to_edge(mesh: &SubMesh) -> CsrMatrix<f64> {
    let n = mesh.cells();
    let nodes = mesh.nodes();
    let edges = mesh.edges();

    let mut triplets = Vec::with_capacity(2 * n + 2);
    for j in 1..n {
        let weight = (edges[j] - nodes[j - 1]) / (nodes[j] - nodes[j - 1]);
        triplets.push((j, j - 1, 1.0 - weight));
        triplets.push((j, j, weight));
    }
    for (row, side) in [(0, Side::Left), (n, Side::Right)] {
        let extrapolation = boundary_value(mesh, side);
        triplets.extend(
            extrapolation
                .triplet_iter()
                .map(|(_, j, v)| (row, j, *v)),
        );
    }
    sparse::from_triplets(n + 1, n, triplets)
}

/// A column of ones, `n × 1`, for broadcasting a scalar onto nodes.
#[must_use]
pub fn ones(n: usize) -> CsrMatrix<f64> {
    sparse::from_triplets(n, 1, (0..n).map(|i| (i, 0, 1.0)))
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::DVector;

    use crate::DomainGeometry;

    use super::*;

    fn apply(matrix: &CsrMatrix<f64>, values: &[f64]) -> DVector<f64> {
        sparse::mul_vec(matrix, &DVector::from_column_slice(values))
    }

    fn linear_mesh(cells: usize) -> SubMesh {
        SubMesh::uniform(&DomainGeometry::cartesian(0.0, 1.0), cells).unwrap()
    }

    #[test]
    fn interior_gradient_of_a_linear_field_is_exact() {
        let mesh = linear_mesh(5);
        let u: Vec<f64> = mesh.nodes().iter().map(|x| 3.0 * x + 1.0).collect();
        let stencil = gradient(&mesh, BoundaryKind::Neumann, BoundaryKind::Neumann);
        let g = apply(&stencil.matrix, &u);

        for g in g.iter().skip(1).take(4) {
            assert_relative_eq!(*g, 3.0, epsilon = 1e-12);
        }
        assert_relative_eq!(g[0], 0.0);
    }

    #[test]
    fn dirichlet_rows_use_half_cells() {
        let mesh = linear_mesh(4);
        let u: Vec<f64> = mesh.nodes().iter().map(|x| 2.0 * x).collect();
        let stencil = gradient(&mesh, BoundaryKind::Dirichlet, BoundaryKind::Dirichlet);

        let g = apply(&stencil.matrix, &u)
            + apply(&stencil.left, &[0.0])
            + apply(&stencil.right, &[2.0]);
        for value in g.iter() {
            assert_relative_eq!(*value, 2.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn cartesian_divergence_and_integral() {
        let mesh = linear_mesh(4);
        let flux: Vec<f64> = mesh.edges().iter().map(|x| x * x).collect();
        let d = apply(&divergence(&mesh).unwrap(), &flux);
        for (value, x) in d.iter().zip(mesh.nodes()) {
            assert_relative_eq!(*value, 2.0 * x, epsilon = 1e-12);
        }

        let ones = vec![1.0; 4];
        assert_relative_eq!(apply(&integral(&mesh).unwrap(), &ones)[0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn spherical_divergence_is_conservative() {
        let mesh = SubMesh::uniform(&DomainGeometry::spherical(0.0, 1.0), 6).unwrap();
        // F = r gives div F = 3 exactly under the shell-volume rule.
        let flux: Vec<f64> = mesh.edges().to_vec();
        let d = apply(&divergence(&mesh).unwrap(), &flux);
        for value in d.iter() {
            assert_relative_eq!(*value, 3.0, epsilon = 1e-12);
        }

        let volume = apply(&integral(&mesh).unwrap(), &[1.0; 6])[0];
        assert_relative_eq!(volume, 4.0 * PI / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn cylindrical_has_no_divergence() {
        let mesh = SubMesh::from_edges(vec![0.0, 0.5, 1.0], CoordinateSystem::CylindricalPolar)
            .unwrap();
        assert!(divergence(&mesh).is_none());
        assert!(integral(&mesh).is_none());
    }

    #[test]
    fn boundary_values_and_edge_shift_are_exact_for_linear_fields() {
        let mesh = SubMesh::from_edges(vec![0.0, 0.1, 0.4, 1.0], CoordinateSystem::Cartesian)
            .unwrap();
        let u: Vec<f64> = mesh.nodes().iter().map(|x| 5.0 - 2.0 * x).collect();

        assert_relative_eq!(apply(&boundary_value(&mesh, Side::Left), &u)[0], 5.0, epsilon = 1e-12);
        assert_relative_eq!(apply(&boundary_value(&mesh, Side::Right), &u)[0], 3.0, epsilon = 1e-12);

        let shifted = apply(&node_to_edge(&mesh), &u);
        for (value, x) in shifted.iter().zip(mesh.edges()) {
            assert_relative_eq!(*value, 5.0 - 2.0 * x, epsilon = 1e-12);
        }
    }
}
