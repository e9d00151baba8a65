//! Battery model templates with default parameters.
//!
//! Each [`Chemistry`] maps to a [`ChemistryDescriptor`]: the equations that
//! build a [`Model`], default parameter values and the functions they name,
//! and a default geometry and mesh. The templates are reduced models that
//! exercise the generic engine, so every number here is illustrative.
//!
//! The applied current is the runtime input
//! [`CURRENT_INPUT`](crate::experiment::CURRENT_INPUT), so one discretized
//! model serves every current and every experiment step. The cell current
//! is an algebraic state that follows that input, or holds the terminal
//! voltage at [`VOLTAGE_INPUT`](crate::experiment::VOLTAGE_INPUT) when
//! [`CONTROL_INPUT`](crate::experiment::CONTROL_INPUT) is zero.

mod lead_acid;
mod lithium_ion;
mod outputs;

use std::{fmt, sync::Arc};

use serde::Deserialize;
use volta_discretization::{DiscretizedModel, Geometry, Mesh, MeshPoints};
use volta_symbolic::{FunctionTable, parameters::ParameterValues};

use crate::{Model, ModelError, Pipeline, SimulationConfig};

/// Supported chemistries, selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Chemistry {
    /// Electrolyte diffusion across a lead-acid cell.
    LeadAcid,
    /// A single particle model of a lithium-ion cell.
    LithiumIon,
}

impl Chemistry {
    #[must_use]
    pub fn descriptor(self) -> ChemistryDescriptor {
        match self {
            Chemistry::LeadAcid => ChemistryDescriptor {
                chemistry: self,
                template: lead_acid::model,
                functions: lead_acid::functions,
                parameters: lead_acid::parameters,
                geometry: lead_acid::geometry,
                mesh_points: lead_acid::mesh_points,
            },
            Chemistry::LithiumIon => ChemistryDescriptor {
                chemistry: self,
                template: lithium_ion::model,
                functions: lithium_ion::functions,
                parameters: lithium_ion::parameters,
                geometry: lithium_ion::geometry,
                mesh_points: lithium_ion::mesh_points,
            },
        }
    }
}

impl fmt::Display for Chemistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Chemistry::LeadAcid => "lead-acid",
            Chemistry::LithiumIon => "lithium-ion",
        })
    }
}

/// Everything needed to build and solve one chemistry.
#[derive(Debug, Clone, Copy)]
pub struct ChemistryDescriptor {
    chemistry: Chemistry,
    template: fn() -> Result<Model, ModelError>,
    functions: fn() -> FunctionTable,
    parameters: fn() -> ParameterValues,
    geometry: fn() -> Geometry,
    mesh_points: fn() -> MeshPoints,
}

impl ChemistryDescriptor {
    #[must_use]
    pub fn chemistry(&self) -> Chemistry {
        self.chemistry
    }

    /// A fresh constructing model from the equation template.
    ///
    /// # Errors
    ///
    /// Fails only if the template itself is malformed.
    pub fn model(&self) -> Result<Model, ModelError> {
        (self.template)()
    }

    /// The functions that the default parameters refer to by handle.
    #[must_use]
    pub fn functions(&self) -> FunctionTable {
        (self.functions)()
    }

    /// Default parameter values, carrying [`ChemistryDescriptor::functions`].
    ///
    /// The current is a runtime input. Override any other entry with
    /// [`ParameterValues::set`] or [`ParameterValues::update`].
    #[must_use]
    pub fn parameters(&self) -> ParameterValues {
        let mut values = (self.parameters)();
        values.functions_mut().extend(&self.functions());
        values
    }

    #[must_use]
    pub fn geometry(&self) -> Geometry {
        (self.geometry)()
    }

    /// Default cells per subdomain.
    #[must_use]
    pub fn mesh_points(&self) -> MeshPoints {
        (self.mesh_points)()
    }

    /// A mesh of the default geometry with `points` layered over the
    /// default cell counts.
    ///
    /// # Errors
    ///
    /// Fails if a subdomain ends up with zero cells.
    pub fn mesh(&self, points: &MeshPoints) -> Result<Mesh, ModelError> {
        let mut merged = self.mesh_points();
        merged.extend(points.iter().map(|(k, v)| (k.clone(), *v)));
        Ok(Mesh::new(&self.geometry(), &merged)?)
    }

    /// Builds the discretized model through `pipeline` with the mesh points
    /// in `config` and the given parameter values.
    ///
    /// # Errors
    ///
    /// Fails if the mesh or any pipeline stage fails.
    pub fn build(
        &self,
        pipeline: &mut Pipeline,
        values: &ParameterValues,
        config: &SimulationConfig,
    ) -> Result<Arc<DiscretizedModel>, ModelError> {
        let mesh = self.mesh(&config.mesh)?;
        pipeline.build(&self.model()?, values, &mesh)
    }
}
