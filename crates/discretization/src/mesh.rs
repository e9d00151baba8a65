use std::{
    cmp::Ordering,
    collections::{BTreeMap, hash_map::DefaultHasher},
    hash::{Hash, Hasher},
};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use volta_symbolic::Domain;

use crate::MeshError;

/// Cells per subdomain, keyed by subdomain name.
pub type MeshPoints = BTreeMap<String, usize>;

/// Relative tolerance when checking that adjacent submeshes touch.
const CONTIGUITY_TOL: f64 = 1e-12;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateSystem {
    #[default]
    Cartesian,
    CylindricalPolar,
    SphericalPolar,
}

/// The extent of one subdomain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DomainGeometry {
    pub min: f64,
    pub max: f64,
    #[serde(default)]
    pub coordinate_system: CoordinateSystem,
}

impl DomainGeometry {
    #[must_use]
    pub fn cartesian(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            coordinate_system: CoordinateSystem::Cartesian,
        }
    }

    #[must_use]
    pub fn spherical(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            coordinate_system: CoordinateSystem::SphericalPolar,
        }
    }
}

/// Subdomain geometries in spatial order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Geometry {
    domains: IndexMap<String, DomainGeometry>,
}

impl Geometry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, geometry: DomainGeometry) -> Self {
        self.domains.insert(name.into(), geometry);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&DomainGeometry> {
        self.domains.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DomainGeometry)> {
        self.domains.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// A one-dimensional finite-volume mesh.
///
/// `n` cells are bounded by `n + 1` edges; nodes sit at cell centres.
#[derive(Debug, Clone, PartialEq)]
pub struct SubMesh {
    edges: Vec<f64>,
    nodes: Vec<f64>,
    coordinate_system: CoordinateSystem,
}

impl SubMesh {
    /// Uniformly spaced cells over a subdomain.
    ///
    /// # Errors
    ///
    /// Fails if `cells` is zero or the extent is empty.
    pub fn uniform(geometry: &DomainGeometry, cells: usize) -> Result<Self, MeshError> {
        #[allow(clippy::cast_precision_loss)]
        let width = (geometry.max - geometry.min) / cells as f64;
        #[allow(clippy::cast_precision_loss)]
        let edges = (0..=cells)
            .map(|i| geometry.min + width * i as f64)
            .collect();
        Self::from_edges(edges, geometry.coordinate_system)
    }

    /// A mesh with explicit, strictly increasing edges.
    ///
    /// # Errors
    ///
    /// Fails with fewer than two edges or edges that do not increase.
    pub fn from_edges(
        edges: Vec<f64>,
        coordinate_system: CoordinateSystem,
    ) -> Result<Self, MeshError> {
        if edges.len() < 2 {
            return Err(MeshError::InvalidEdges {
                reason: format!("need at least two edges, got {}", edges.len()),
            });
        }
        if let Some(pair) = edges
            .windows(2)
            .find(|w| w[1].partial_cmp(&w[0]) != Some(Ordering::Greater))
        {
            return Err(MeshError::InvalidEdges {
                reason: format!("edges must increase, got {} then {}", pair[0], pair[1]),
            });
        }
        if coordinate_system != CoordinateSystem::Cartesian && edges[0] < 0.0 {
            return Err(MeshError::InvalidEdges {
                reason: format!("radial edges must be non-negative, got {}", edges[0]),
            });
        }

        let nodes = edges.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect();
        Ok(Self {
            edges,
            nodes,
            coordinate_system,
        })
    }

    /// Number of cells.
    #[must_use]
    pub fn cells(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    #[must_use]
    pub fn nodes(&self) -> &[f64] {
        &self.nodes
    }

    /// Cell widths, `edges[i + 1] - edges[i]`.
    #[must_use]
    pub fn widths(&self) -> Vec<f64> {
        self.edges.windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// Distances between adjacent cell centres.
    #[must_use]
    pub fn node_spacing(&self) -> Vec<f64> {
        self.nodes.windows(2).map(|w| w[1] - w[0]).collect()
    }

    #[must_use]
    pub fn coordinate_system(&self) -> CoordinateSystem {
        self.coordinate_system
    }

    fn hash_into(&self, state: &mut impl Hasher) {
        self.coordinate_system.hash(state);
        for edge in &self.edges {
            edge.to_bits().hash(state);
        }
    }
}

/// Submeshes for every subdomain, immutable once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    submeshes: IndexMap<String, SubMesh>,
}

impl Mesh {
    /// Builds uniform submeshes for every subdomain of `geometry`.
    ///
    /// # Errors
    ///
    /// Fails if a subdomain has no cell count or zero cells.
    pub fn new(geometry: &Geometry, points: &MeshPoints) -> Result<Self, MeshError> {
        let mut submeshes = IndexMap::new();
        for (name, domain) in geometry.iter() {
            let cells = points
                .get(name)
                .copied()
                .ok_or_else(|| MeshError::UnknownDomain {
                    name: name.to_owned(),
                })?;
            if cells == 0 {
                return Err(MeshError::ZeroCells {
                    name: name.to_owned(),
                });
            }
            submeshes.insert(name.to_owned(), SubMesh::uniform(domain, cells)?);
        }
        Ok(Self { submeshes })
    }

    /// A mesh from prebuilt submeshes, in spatial order.
    #[must_use]
    pub fn from_submeshes(submeshes: IndexMap<String, SubMesh>) -> Self {
        Self { submeshes }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SubMesh> {
        self.submeshes.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SubMesh)> {
        self.submeshes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Joins the submeshes of a (possibly concatenated) domain.
    ///
    /// # Errors
    ///
    /// Fails if a subdomain has no submesh, adjacent submeshes do not share
    /// an edge, or their coordinate systems differ.
    pub fn combine(&self, domain: &Domain) -> Result<SubMesh, MeshError> {
        let mut names = domain.names().iter();
        let first = names.next().ok_or(MeshError::EmptyDomain)?;
        let mut previous = first.as_str();
        let mut combined = self.lookup(first)?.clone();

        for name in names {
            let next = self.lookup(name)?;
            let last = combined.edges[combined.edges.len() - 1];
            let gap = next.edges[0] - last;
            let scale = last.abs().max(next.edges[0].abs()).max(f64::MIN_POSITIVE);
            if gap.abs() > CONTIGUITY_TOL * scale {
                return Err(MeshError::NonContiguousMesh {
                    left: previous.to_owned(),
                    right: name.clone(),
                    gap,
                });
            }
            if next.coordinate_system != combined.coordinate_system {
                return Err(MeshError::CoordinateMismatch {
                    left: previous.to_owned(),
                    left_system: combined.coordinate_system,
                    right: name.clone(),
                    right_system: next.coordinate_system,
                });
            }
            combined.edges.extend_from_slice(&next.edges[1..]);
            combined.nodes.extend_from_slice(&next.nodes);
            previous = name;
        }
        Ok(combined)
    }

    /// Number of cells on a (possibly concatenated) domain.
    ///
    /// # Errors
    ///
    /// Fails if a subdomain has no submesh.
    pub fn cells(&self, domain: &Domain) -> Result<usize, MeshError> {
        domain
            .names()
            .iter()
            .map(|name| self.lookup(name).map(SubMesh::cells))
            .sum()
    }

    fn lookup(&self, name: &str) -> Result<&SubMesh, MeshError> {
        self.submeshes
            .get(name)
            .ok_or_else(|| MeshError::UnknownDomain {
                name: name.to_owned(),
            })
    }

    #[must_use]
    pub fn structural_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        for (name, submesh) in &self.submeshes {
            name.hash(&mut hasher);
            submesh.hash_into(&mut hasher);
        }
        hasher.finish()
    }
}
