//! Single particle model: one representative spherical particle per
//! electrode, with surface fluxes set by the applied current.
//!
//! Particle radii are scaled to one and concentrations to their maximum.

use std::sync::OnceLock;

use volta_core::Direction;
use volta_discretization::{DomainGeometry, Geometry, MeshPoints};
use volta_symbolic::{
    BoundaryCondition, BoundaryConditions, Domain, FunctionTable, NamedFunction, Side, Symbol,
    SymbolError,
    parameters::{FunctionHandle, ParameterValue, ParameterValues},
};

use super::outputs::{self, ELECTRODE_AREA, TYPICAL_CURRENT};
use crate::{
    Model, ModelError,
    experiment::{CAPACITY_OUTPUT, CONTROL_INPUT, CURRENT_INPUT, TEMPERATURE_INPUT, VOLTAGE_INPUT},
};

const NEGATIVE_PARTICLE: &str = "negative particle";
const POSITIVE_PARTICLE: &str = "positive particle";

const NEGATIVE_DIFFUSIVITY: &str = "Negative particle diffusivity";
const POSITIVE_DIFFUSIVITY: &str = "Positive particle diffusivity";
const NEGATIVE_OCP: &str = "Negative electrode OCP [V]";
const POSITIVE_OCP: &str = "Positive electrode OCP [V]";

const NEGATIVE_INITIAL: &str = "Initial concentration in negative electrode";
const POSITIVE_INITIAL: &str = "Initial concentration in positive electrode";
const NEGATIVE_FLUX: &str = "Negative particle flux per current [A-1.s-1]";
const POSITIVE_FLUX: &str = "Positive particle flux per current [A-1.s-1]";
const RESISTANCE: &str = "Cell resistance [Ohm]";
const ENTROPIC_CHANGE: &str = "OCV entropic change [V.K-1]";
const REFERENCE_TEMPERATURE: &str = "Reference temperature [K]";
const LOWER_CUT_OFF: &str = "Lower voltage cut-off [V]";
const UPPER_CUT_OFF: &str = "Upper voltage cut-off [V]";

/// `dc/dt = ∇·(D ∇c)` in a unit sphere with no flux at the centre and
/// `D ∂c/∂r = ±k I` at the surface.
fn particle(
    name: &str,
    domain: &str,
    diffusivity: &str,
    flux: Symbol,
) -> Result<(Symbol, Symbol, BoundaryConditions), SymbolError> {
    let c = Symbol::variable(name, domain);
    let rhs = Symbol::parameter(diffusivity)
        .mul(c.clone().gradient()?)?
        .divergence()?;
    let surface_gradient = flux.div(Symbol::parameter(diffusivity))?;
    let bcs = BoundaryConditions::new(
        BoundaryCondition::neumann(0.0),
        BoundaryCondition::neumann(surface_gradient),
    );
    Ok((c, rhs, bcs))
}

pub(super) fn model() -> Result<Model, ModelError> {
    let i = outputs::current();
    let v = Symbol::variable("Terminal voltage", Domain::empty());

    // Discharge moves lithium out of the negative particle and into the positive one.
    let (c_n, rhs_n, bcs_n) = particle(
        "Negative particle concentration",
        NEGATIVE_PARTICLE,
        NEGATIVE_DIFFUSIVITY,
        i.clone().mul(Symbol::parameter(NEGATIVE_FLUX))?.neg(),
    )?;
    let (c_p, rhs_p, bcs_p) = particle(
        "Positive particle concentration",
        POSITIVE_PARTICLE,
        POSITIVE_DIFFUSIVITY,
        i.clone().mul(Symbol::parameter(POSITIVE_FLUX))?,
    )?;

    let surface_n = c_n.clone().boundary_value(Side::Right)?;
    let surface_p = c_p.clone().boundary_value(Side::Right)?;
    let voltage = terminal_voltage(surface_n.clone(), surface_p.clone(), i.clone())?;
    let initial_voltage = terminal_voltage(
        Symbol::parameter(NEGATIVE_INITIAL),
        Symbol::parameter(POSITIVE_INITIAL),
        Symbol::parameter(CURRENT_INPUT),
    )?;

    let mut model = Model::new("single particle model");
    model
        .add_rhs(c_n.clone(), rhs_n)?
        .add_rhs(c_p.clone(), rhs_p)?
        .add_algebraic(v.clone(), voltage.sub(v.clone())?)?
        .set_initial_condition(&c_n, Symbol::parameter(NEGATIVE_INITIAL))?
        .set_initial_condition(&c_p, Symbol::parameter(POSITIVE_INITIAL))?
        .set_initial_condition(&v, initial_voltage)?
        .set_boundary_conditions(c_n.clone(), bcs_n)?
        .set_boundary_conditions(c_p.clone(), bcs_p)?
        .add_event(
            "Minimum voltage",
            v.clone().sub(Symbol::parameter(LOWER_CUT_OFF))?,
            Direction::Decreasing,
        )?
        .add_event(
            "Maximum voltage",
            v.clone().sub(Symbol::parameter(UPPER_CUT_OFF))?,
            Direction::Increasing,
        )?
        .add_output("Negative particle concentration", c_n.clone())?
        .add_output("Positive particle concentration", c_p.clone())?
        .add_output("Negative particle surface concentration", surface_n.clone())?
        .add_output("Positive particle surface concentration", surface_p.clone())?
        .add_output(
            "Average negative particle concentration",
            average(c_n)?,
        )?
        .add_output(
            "Average positive particle concentration",
            average(c_p)?,
        )?
        .add_output(
            "Open-circuit voltage [V]",
            open_circuit_voltage(surface_n, surface_p)?,
        )?;
    outputs::control(&mut model, &i, &v)?;
    outputs::standard(&mut model, &i, &v)?;
    Ok(model)
}

/// Volume average over the unit sphere.
fn average(c: Symbol) -> Result<Symbol, SymbolError> {
    c.integral()?
        .mul(3.0)?
        .div(4.0 * std::f64::consts::PI)
}

fn open_circuit_voltage(surface_n: Symbol, surface_p: Symbol) -> Result<Symbol, SymbolError> {
    let positive = Symbol::function_parameter(POSITIVE_OCP, vec![surface_p])?;
    let negative = Symbol::function_parameter(NEGATIVE_OCP, vec![surface_n])?;
    let thermal = Symbol::parameter(TEMPERATURE_INPUT)
        .sub(Symbol::parameter(REFERENCE_TEMPERATURE))?
        .mul(Symbol::parameter(ENTROPIC_CHANGE))?;
    positive.sub(negative)?.add(thermal)
}

fn terminal_voltage(
    surface_n: Symbol,
    surface_p: Symbol,
    current: Symbol,
) -> Result<Symbol, SymbolError> {
    let drop = current.mul(Symbol::parameter(RESISTANCE))?;
    open_circuit_voltage(surface_n, surface_p)?.sub(drop)
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
            NamedFunction::new("graphite_ocp", 1, |x| 0.1 + 0.5 * (1.0 - x[0]).powi(2))
                .with_partial(0, |x| -(1.0 - x[0])),
        )
        .register(
            NamedFunction::new("nmc_ocp", 1, |x| 4.3 - x[0]).with_partial(0, |_| -1.0),
        );
    table
}

pub(super) fn parameters() -> ParameterValues {
    let mut values = ParameterValues::new();
    values
        .set(CURRENT_INPUT, ParameterValue::Input)
        .set(CONTROL_INPUT, ParameterValue::Input)
        .set(VOLTAGE_INPUT, ParameterValue::Input)
        .set(CAPACITY_OUTPUT, 1.0)
        .set(
            NEGATIVE_OCP,
            ParameterValue::Function(FunctionHandle::from("graphite_ocp")),
        )
        .set(
            POSITIVE_OCP,
            ParameterValue::Function(FunctionHandle::from("nmc_ocp")),
        )
        .set(NEGATIVE_DIFFUSIVITY, 5e-3)
        .set(POSITIVE_DIFFUSIVITY, 5e-3)
        .set(NEGATIVE_INITIAL, 0.8)
        .set(POSITIVE_INITIAL, 0.6)
        .set(NEGATIVE_FLUX, 6.5e-5)
        .set(POSITIVE_FLUX, 3.2e-5)
        .set(RESISTANCE, 0.02)
        .set(ENTROPIC_CHANGE, -1e-4)
        .set(REFERENCE_TEMPERATURE, 298.15)
        .set(TEMPERATURE_INPUT, 298.15)
        .set(LOWER_CUT_OFF, 3.0)
        .set(UPPER_CUT_OFF, 4.2)
        .set(TYPICAL_CURRENT, 1.0)
        .set(ELECTRODE_AREA, 0.1);
    values
}

pub(super) fn geometry() -> Geometry {
    Geometry::new()
        .with(NEGATIVE_PARTICLE, DomainGeometry::spherical(0.0, 1.0))
        .with(POSITIVE_PARTICLE, DomainGeometry::spherical(0.0, 1.0))
}

pub(super) fn mesh_points() -> MeshPoints {
    MeshPoints::from([
        (NEGATIVE_PARTICLE.to_owned(), 10),
        (POSITIVE_PARTICLE.to_owned(), 10),
    ])
}
