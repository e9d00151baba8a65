//! Finite-volume discretization of symbolic systems.
//!
//! A [`Mesh`] is built once from a [`Geometry`] and a cell count per
//! subdomain. [`discretize`] then turns a resolved, simplified
//! [`System`](volta_symbolic::System) into a [`DiscretizedModel`]: every
//! variable becomes a slice of one global state vector and every spatial
//! operator becomes a sparse matrix.

mod discretized;
mod discretizer;
mod error;
mod finite_volume;
mod mesh;

pub use discretized::{Bound, DiscreteEvent, DiscretizedModel, StateSlot};
pub use discretizer::discretize;
pub use error::{DiscretizationError, MeshError};
pub use finite_volume::{BoundaryStencil, Location};
pub use mesh::{CoordinateSystem, DomainGeometry, Geometry, Mesh, MeshPoints, SubMesh};
