use volta_symbolic::{Domain, Symbol};

use crate::{
    Model, ModelError,
    experiment::{
        CAPACITY_OUTPUT, CONTROL_INPUT, CURRENT_INPUT, CURRENT_OUTPUT, VOLTAGE_INPUT,
        VOLTAGE_OUTPUT,
    },
};

pub(super) const TYPICAL_CURRENT: &str = "Typical current [A]";
pub(super) const ELECTRODE_AREA: &str = "Electrode area [m2]";

/// The cell current, solved for as an algebraic state.
pub(super) fn current() -> Symbol {
    Symbol::variable("Current", Domain::empty())
}

/// `s (I - I_in) + (1 - s) (V - V_in) = 0`: the current follows its input at
/// `s = 1` and holds the terminal voltage at its input at `s = 0`.
pub(super) fn control(
    model: &mut Model,
    current: &Symbol,
    voltage: &Symbol,
) -> Result<(), ModelError> {
    let switch = Symbol::parameter(CONTROL_INPUT);
    let follow = current.clone().sub(Symbol::parameter(CURRENT_INPUT))?;
    let hold = voltage.clone().sub(Symbol::parameter(VOLTAGE_INPUT))?;
    let residual = switch
        .clone()
        .mul(follow)?
        .add(Symbol::scalar(1.0).sub(switch)?.mul(hold)?)?;

    model
        .add_algebraic(current.clone(), residual)?
        .set_initial_condition(current, Symbol::parameter(CURRENT_INPUT))?;
    Ok(())
}

/// Registers the outputs every chemistry provides.
pub(super) fn standard(
    model: &mut Model,
    current: &Symbol,
    voltage: &Symbol,
) -> Result<(), ModelError> {
    let t = Symbol::time();

    model
        .add_output("Time [s]", t.clone())?
        .add_output("Time [min]", t.clone().div(60.0)?)?
        .add_output("Time [h]", t.clone().div(3600.0)?)?
        .add_output(CURRENT_OUTPUT, current.clone())?
        .add_output(
            "Total current density",
            current.clone().div(Symbol::parameter(TYPICAL_CURRENT))?,
        )?
        .add_output(
            "Total current density [A.m-2]",
            current.clone().div(Symbol::parameter(ELECTRODE_AREA))?,
        )?
        .add_output("Discharge capacity [A.h]", current.clone().mul(t)?.div(3600.0)?)?
        .add_output(CAPACITY_OUTPUT, Symbol::parameter(CAPACITY_OUTPUT))?
        .add_output(VOLTAGE_OUTPUT, voltage.clone())?;
    Ok(())
}
