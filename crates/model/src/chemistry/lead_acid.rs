//! Reduced lead-acid model: electrolyte diffusion across the cell with a
//! uniform reaction in each electrode and an algebraic terminal voltage.
//!
//! Concentrations are scaled by their initial value and the cell spans the
//! unit interval, so the integral of the concentration is its average.

use std::sync::OnceLock;

use volta_core::Direction;
use volta_discretization::{DomainGeometry, Geometry, MeshPoints};
use volta_symbolic::{
    BoundaryCondition, BoundaryConditions, Domain, FunctionTable, NamedFunction, Symbol,
    SymbolError,
    parameters::{FunctionHandle, ParameterValue, ParameterValues},
};

use super::outputs::{self, ELECTRODE_AREA, TYPICAL_CURRENT};
use crate::{
    Model, ModelError,
    experiment::{CAPACITY_OUTPUT, CONTROL_INPUT, CURRENT_INPUT, TEMPERATURE_INPUT, VOLTAGE_INPUT},
};

const NEGATIVE: &str = "negative electrode";
const SEPARATOR: &str = "separator";
const POSITIVE: &str = "positive electrode";

const DIFFUSIVITY: &str = "Electrolyte diffusivity";
const CONDUCTIVITY: &str = "Electrolyte conductivity [S.m-1]";
const VISCOSITY: &str = "Electrolyte viscosity [Pa.s]";
const DARKEN: &str = "Darken thermodynamic factor";
const POSITIVE_OCP: &str = "Positive electrode OCP [V]";
const NEGATIVE_OCP: &str = "Negative electrode OCP [V]";

const INITIAL_CONCENTRATION: &str = "Initial concentration in electrolyte";
const REACTION_RATE: &str = "Electrolyte consumption rate [A-1.s-1]";
const CONTACT_RESISTANCE: &str = "Contact resistance [Ohm]";
const ELECTROLYTE_RESISTANCE: &str = "Electrolyte resistance scale [S]";
const ENTROPIC_CHANGE: &str = "OCV entropic change [V.K-1]";
const REFERENCE_TEMPERATURE: &str = "Reference temperature [K]";
const LOWER_CUT_OFF: &str = "Lower voltage cut-off [V]";

pub(super) fn model() -> Result<Model, ModelError> {
    let cell = Domain::new([NEGATIVE, SEPARATOR, POSITIVE]);
    let c = Symbol::variable("Electrolyte concentration", cell);
    let v = Symbol::variable("Terminal voltage", Domain::empty());
    let i = outputs::current();

    let diffusivity = Symbol::function_parameter(DIFFUSIVITY, vec![c.clone()])?;
    let flux = diffusivity.mul(c.clone().gradient()?)?;
    let reaction = i.clone().mul(Symbol::parameter(REACTION_RATE))?.neg();
    let source = Symbol::concatenation(vec![
        Symbol::broadcast(reaction.clone(), NEGATIVE)?,
        Symbol::broadcast(Symbol::scalar(0.0), SEPARATOR)?,
        Symbol::broadcast(reaction, POSITIVE)?,
    ])?;
    let rhs = flux.divergence()?.add(source)?;

    let average = c.clone().integral()?;
    let voltage = terminal_voltage(average.clone(), i.clone())?;
    let initial_voltage = terminal_voltage(
        Symbol::parameter(INITIAL_CONCENTRATION),
        Symbol::parameter(CURRENT_INPUT),
    )?;

    let mut model = Model::new("lead-acid");
    model
        .add_rhs(c.clone(), rhs)?
        .add_algebraic(v.clone(), voltage.sub(v.clone())?)?
        .set_initial_condition(&c, Symbol::parameter(INITIAL_CONCENTRATION))?
        .set_initial_condition(&v, initial_voltage)?
        .set_boundary_conditions(
            c.clone(),
            BoundaryConditions::new(
                BoundaryCondition::neumann(0.0),
                BoundaryCondition::neumann(0.0),
            ),
        )?
        .add_event(
            "Minimum voltage",
            v.clone().sub(Symbol::parameter(LOWER_CUT_OFF))?,
            Direction::Decreasing,
        )?
        .add_event(
            "Zero electrolyte concentration",
            c.clone().minimum(),
            Direction::Decreasing,
        )?
        .add_output("Electrolyte concentration", c)?
        .add_output("Average electrolyte concentration", average.clone())?
        .add_output(
            VISCOSITY,
            Symbol::function_parameter(VISCOSITY, vec![average.clone()])?,
        )?
        .add_output(
            DARKEN,
            Symbol::function_parameter(DARKEN, vec![average.clone()])?,
        )?
        .add_output("Open-circuit voltage [V]", open_circuit_voltage(average)?)?;
    outputs::control(&mut model, &i, &v)?;
    outputs::standard(&mut model, &i, &v)?;
    Ok(model)
}

fn open_circuit_voltage(concentration: Symbol) -> Result<Symbol, SymbolError> {
    let positive = Symbol::function_parameter(POSITIVE_OCP, vec![concentration.clone()])?;
    let negative = Symbol::function_parameter(NEGATIVE_OCP, vec![concentration])?;
    let thermal = Symbol::parameter(TEMPERATURE_INPUT)
        .sub(Symbol::parameter(REFERENCE_TEMPERATURE))?
        .mul(Symbol::parameter(ENTROPIC_CHANGE))?;
    positive.sub(negative)?.add(thermal)
}

/// `U₊(c) − U₋(c) − I (R_contact + R_e / κ(c))` at average concentration `c`.
fn terminal_voltage(concentration: Symbol, current: Symbol) -> Result<Symbol, SymbolError> {
    let conductivity = Symbol::function_parameter(CONDUCTIVITY, vec![concentration.clone()])?;
    let resistance = Symbol::parameter(CONTACT_RESISTANCE)
        .add(Symbol::parameter(ELECTROLYTE_RESISTANCE).div(conductivity)?)?;
    let drop = current.mul(resistance)?;
    open_circuit_voltage(concentration)?.sub(drop)
}

/// Shared across calls, so parameter sets built from the defaults hash alike.
pub(super) fn functions() -> FunctionTable {
    static FUNCTIONS: OnceLock<FunctionTable> = OnceLock::new();
    FUNCTIONS.get_or_init(registry).clone()
}

fn registry() -> FunctionTable {
    let mut table = FunctionTable::new();
    table
        .register(
            NamedFunction::new("lead_acid_diffusivity", 1, |x| 1e-3 * (1.0 + 0.5 * x[0]))
                .with_partial(0, |_| 5e-4),
        )
        .register(
            NamedFunction::new("lead_acid_conductivity", 1, |x| 0.5 + 2.0 * x[0])
                .with_partial(0, |_| 2.0),
        )
        .register(
            NamedFunction::new("lead_acid_viscosity", 1, |x| 1e-3 * (1.0 + 0.3 * x[0]))
                .with_partial(0, |_| 3e-4),
        )
        .register(
            NamedFunction::new("lead_acid_darken_factor", 1, |x| 1.0 + 0.2 * x[0])
                .with_partial(0, |_| 0.2),
        )
        .register(
            NamedFunction::new("lead_acid_positive_ocp", 1, |x| 2.0 + 0.2 * x[0])
                .with_partial(0, |_| 0.2),
        )
        .register(
            NamedFunction::new("lead_acid_negative_ocp", 1, |x| 0.1 - 0.05 * x[0])
                .with_partial(0, |_| -0.05),
        );
    table
}

pub(super) fn parameters() -> ParameterValues {
    let mut values = ParameterValues::new();
    let handle = |name: &str| ParameterValue::Function(FunctionHandle::from(name));
    values
        .set(CURRENT_INPUT, ParameterValue::Input)
        .set(CONTROL_INPUT, ParameterValue::Input)
        .set(VOLTAGE_INPUT, ParameterValue::Input)
        .set(CAPACITY_OUTPUT, 5.0)
        .set(DIFFUSIVITY, handle("lead_acid_diffusivity"))
        .set(CONDUCTIVITY, handle("lead_acid_conductivity"))
        .set(VISCOSITY, handle("lead_acid_viscosity"))
        .set(DARKEN, handle("lead_acid_darken_factor"))
        .set(POSITIVE_OCP, handle("lead_acid_positive_ocp"))
        .set(NEGATIVE_OCP, handle("lead_acid_negative_ocp"))
        .set(INITIAL_CONCENTRATION, 1.0)
        .set(REACTION_RATE, 5e-5)
        .set(CONTACT_RESISTANCE, 0.01)
        .set(ELECTROLYTE_RESISTANCE, 0.01)
        .set(ENTROPIC_CHANGE, 1e-4)
        .set(REFERENCE_TEMPERATURE, 298.15)
        .set(TEMPERATURE_INPUT, 298.15)
        .set(LOWER_CUT_OFF, 1.95)
        .set(TYPICAL_CURRENT, 1.0)
        .set(ELECTRODE_AREA, 0.0154);
    values
}

pub(super) fn geometry() -> Geometry {
    Geometry::new()
        .with(NEGATIVE, DomainGeometry::cartesian(0.0, 0.4))
        .with(SEPARATOR, DomainGeometry::cartesian(0.4, 0.6))
        .with(POSITIVE, DomainGeometry::cartesian(0.6, 1.0))
}

pub(super) fn mesh_points() -> MeshPoints {
    MeshPoints::from([
        (NEGATIVE.to_owned(), 8),
        (SEPARATOR.to_owned(), 4),
        (POSITIVE.to_owned(), 8),
    ])
}
