use std::sync::Arc;

use indexmap::IndexMap;
use nalgebra_sparse::CsrMatrix;
use tracing::debug;
use volta_core::sparse;
use volta_symbolic::{
    BoundaryCondition, BoundaryConditions, BoundaryKind, Domain, EquationKind, Kind, Side,
    SpatialOp, Symbol, System,
};

use crate::{
    DiscreteEvent, DiscretizationError, DiscretizedModel, Location, Mesh, StateSlot,
    finite_volume,
};

/// Discretizes a resolved system on a mesh.
///
/// # Errors
///
/// Fails if a parameter is unresolved, a variable has no equation or initial
/// condition, an operator has no rule for its operand or coordinate system,
/// a needed boundary condition is missing, or the mesh cannot cover a domain.
pub fn discretize(system: &System, mesh: &Mesh) -> Result<DiscretizedModel, DiscretizationError> {
    check_resolved(system)?;

    let layout = layout(system, mesh)?;
    let state_len: usize = layout.values().map(|slot| slot.len).sum();
    debug!(
        state_len,
        slots = ?layout.values().map(|s| (s.name.as_str(), s.start, s.len)).collect::<Vec<_>>(),
        "state layout"
    );

    let discretizer = Discretizer {
        system,
        mesh,
        layout: &layout,
    };

    let mut rhs = Vec::with_capacity(layout.len());
    let mut initial = Vec::with_capacity(layout.len());
    for slot in layout.values() {
        let equation = &system.equations[&slot.name];
        rhs.push(discretizer.equation(slot, &equation.expression)?);

        let ic = system.initial_conditions.get(&slot.name).ok_or_else(|| {
            DiscretizationError::InitialConditionMissing {
                name: slot.name.clone(),
            }
        })?;
        initial.push(discretizer.equation(slot, ic)?);
    }

    let mut events = Vec::with_capacity(system.events.len());
    for event in &system.events {
        let (expression, location) = discretizer.symbol(&event.expression)?;
        if location != Location::Scalar {
            return Err(DiscretizationError::NonScalarEvent {
                name: event.name.clone(),
            });
        }
        events.push(DiscreteEvent {
            name: event.name.clone(),
            expression,
            direction: event.direction,
        });
    }

    let mut outputs = IndexMap::with_capacity(system.outputs.len());
    for (name, output) in &system.outputs {
        let (expression, _) = discretizer.symbol(output)?;
        outputs.insert(name.clone(), expression);
    }

    let mass: Vec<f64> = layout
        .values()
        .flat_map(|slot| {
            let d = match slot.kind {
                EquationKind::Differential => 1.0,
                EquationKind::Algebraic => 0.0,
            };
            std::iter::repeat_n(d, slot.len)
        })
        .collect();

    debug!(
        events = events.len(),
        outputs = outputs.len(),
        "discretized system"
    );

    Ok(DiscretizedModel::new(
        layout,
        sparse::diagonal(&mass),
        rhs,
        initial,
        events,
        outputs,
    ))
}

fn check_resolved(system: &System) -> Result<(), DiscretizationError> {
    for expression in system.expressions() {
        let mut unresolved = None;
        expression.visit(&mut |s| {
            if unresolved.is_none()
                && let Kind::Parameter(name) | Kind::FunctionParameter { name, .. } = s.kind()
            {
                unresolved = Some(name.clone());
            }
        });
        if let Some(name) = unresolved {
            return Err(DiscretizationError::UnresolvedParameter { name });
        }
    }
    Ok(())
}

/// Differential equations first, then algebraic, each in insertion order.
fn layout(system: &System, mesh: &Mesh) -> Result<IndexMap<String, StateSlot>, DiscretizationError> {
    let mut layout = IndexMap::with_capacity(system.equations.len());
    let mut start = 0;
    for kind in [EquationKind::Differential, EquationKind::Algebraic] {
        for (name, equation) in &system.equations {
            if equation.kind != kind {
                continue;
            }
            let domain = equation.variable.domain().clone();
            let len = if domain.is_empty() {
                1
            } else {
                mesh.cells(&domain)?
            };
            layout.insert(
                name.clone(),
                StateSlot {
                    name: name.clone(),
                    domain,
                    start,
                    len,
                    kind,
                },
            );
            start += len;
        }
    }
    Ok(layout)
}

struct Discretizer<'a> {
    system: &'a System,
    mesh: &'a Mesh,
    layout: &'a IndexMap<String, StateSlot>,
}

type Discrete = (Symbol, Location);

impl Discretizer<'_> {
    /// Discretizes an expression that must fill `slot`.
    fn equation(&self, slot: &StateSlot, expression: &Symbol) -> Result<Symbol, DiscretizationError> {
        let (symbol, location) = self.symbol(expression)?;
        match (slot.domain.is_empty(), location) {
            (true, Location::Scalar) | (false, Location::Nodes) => Ok(symbol),
            (false, Location::Scalar) => Ok(Symbol::linear_map(
                Arc::new(finite_volume::ones(slot.len)),
                symbol,
                slot.domain.clone(),
            )),
            (_, found) => Err(DiscretizationError::EquationShape {
                name: slot.name.clone(),
                found: format!("{found:?}").to_lowercase(),
            }),
        }
    }

    fn symbol(&self, symbol: &Symbol) -> Result<Discrete, DiscretizationError> {
        let at_rest = |s: &Symbol| {
            if s.domain().is_empty() {
                Location::Scalar
            } else {
                Location::Nodes
            }
        };

        match symbol.kind() {
            Kind::Scalar(_) | Kind::Time | Kind::InputParameter(_) => {
                Ok((symbol.clone(), Location::Scalar))
            }
            Kind::Vector(_) | Kind::StateVector { .. } | Kind::LinearMap { .. } => {
                Ok((symbol.clone(), at_rest(symbol)))
            }
            Kind::Parameter(name) | Kind::FunctionParameter { name, .. } => {
                Err(DiscretizationError::UnresolvedParameter { name: name.clone() })
            }
            Kind::Variable(name) => {
                let slot = self.layout.get(name).ok_or_else(|| {
                    DiscretizationError::UnknownVariable { name: name.clone() }
                })?;
                let state = Symbol::state_vector(name, slot.start, slot.len, slot.domain.clone());
                Ok((state, at_rest(symbol)))
            }
            Kind::Binary { .. } | Kind::Function { .. } => {
                let (children, location) = self.aligned(symbol.children())?;
                Ok((symbol.with_children(children)?, location))
            }
            Kind::Unary { child, .. } | Kind::Interpolant { child, .. } => {
                let (child, location) = self.symbol(child)?;
                Ok((symbol.with_children(vec![child])?, location))
            }
            Kind::Reduce { child, .. } => {
                let (child, _) = self.symbol(child)?;
                Ok((symbol.with_children(vec![child])?, Location::Scalar))
            }
            Kind::Broadcast(child) => {
                let (child, _) = self.symbol(child)?;
                let n = self.mesh.cells(symbol.domain())?;
                let ones = finite_volume::ones(n);
                Ok((fused(ones, child, symbol.domain()), Location::Nodes))
            }
            Kind::Concatenation(parts) => {
                let mut children = Vec::with_capacity(parts.len());
                for part in parts {
                    let (child, location) = self.symbol(part)?;
                    if location != Location::Nodes {
                        return Err(unsupported(symbol, "concatenation needs node values"));
                    }
                    children.push(child);
                }
                Ok((Symbol::concatenation(children)?, Location::Nodes))
            }
            Kind::Spatial { op, child } => self.spatial(symbol, *op, child),
        }
    }

    /// Discretizes operands and moves node values to edges when edge values are present.
    fn aligned(&self, operands: Vec<&Symbol>) -> Result<(Vec<Symbol>, Location), DiscretizationError> {
        let mut discrete = Vec::with_capacity(operands.len());
        for operand in operands {
            discrete.push(self.symbol(operand)?);
        }

        let edges = discrete.iter().any(|(_, loc)| *loc == Location::Edges);
        let location = if edges {
            Location::Edges
        } else if discrete.iter().any(|(_, loc)| *loc == Location::Nodes) {
            Location::Nodes
        } else {
            Location::Scalar
        };

        let mut children = Vec::with_capacity(discrete.len());
        for (child, loc) in discrete {
            if edges && loc == Location::Nodes {
                let submesh = self.mesh.combine(child.domain())?;
                let domain = child.domain().clone();
                children.push(fused(finite_volume::node_to_edge(&submesh), child, &domain));
            } else {
                children.push(child);
            }
        }
        Ok((children, location))
    }

    fn spatial(
        &self,
        symbol: &Symbol,
        op: SpatialOp,
        child: &Symbol,
    ) -> Result<Discrete, DiscretizationError> {
        let domain = child.domain();
        let submesh = self.mesh.combine(domain)?;

        if let SpatialOp::BoundaryValue(side) = op
            && let Some(bc) = self.boundary(child, side)
            && bc.kind == BoundaryKind::Dirichlet
        {
            return self.boundary_value(symbol, bc);
        }

        let (inner, location) = self.symbol(child)?;
        match (op, location) {
            (SpatialOp::Gradient, Location::Nodes) => {
                let (left, right) = self.conditions(child, symbol)?;
                let stencil = finite_volume::gradient(&submesh, left.kind, right.kind);
                let gradient = fused(stencil.matrix, inner, domain);
                let gradient = self.with_boundary(
                    gradient,
                    [(stencil.left, left), (stencil.right, right)],
                    symbol,
                    domain,
                )?;
                Ok((gradient, Location::Edges))
            }
            (SpatialOp::Divergence, Location::Edges) => {
                let matrix = coordinates(finite_volume::divergence(&submesh), symbol)?;
                Ok((fused(matrix, inner, domain), Location::Nodes))
            }
            (SpatialOp::Laplacian, Location::Nodes) => {
                let (left, right) = self.conditions(child, symbol)?;
                let divergence = coordinates(finite_volume::divergence(&submesh), symbol)?;
                let stencil = finite_volume::gradient(&submesh, left.kind, right.kind);
                let laplacian = fused(sparse::matmul(&divergence, &stencil.matrix), inner, domain);
                let laplacian = self.with_boundary(
                    laplacian,
                    [
                        (sparse::matmul(&divergence, &stencil.left), left),
                        (sparse::matmul(&divergence, &stencil.right), right),
                    ],
                    symbol,
                    domain,
                )?;
                Ok((laplacian, Location::Nodes))
            }
            (SpatialOp::Integral, Location::Nodes) => {
                let weights = coordinates(finite_volume::integral(&submesh), symbol)?;
                Ok((fused(weights, inner, &Domain::empty()), Location::Scalar))
            }
            (SpatialOp::BoundaryValue(side), Location::Nodes) => {
                let row = finite_volume::boundary_value(&submesh, side);
                Ok((fused(row, inner, &Domain::empty()), Location::Scalar))
            }
            (SpatialOp::BoundaryValue(side), Location::Edges) => {
                let n = submesh.cells();
                let edge = match side {
                    Side::Left => 0,
                    Side::Right => n,
                };
                let row = sparse::from_triplets(1, n + 1, [(0, edge, 1.0)]);
                Ok((fused(row, inner, &Domain::empty()), Location::Scalar))
            }
            (_, found) => Err(unsupported(
                symbol,
                &format!("operand lives on {}", format!("{found:?}").to_lowercase()),
            )),
        }
    }

    fn boundary(&self, child: &Symbol, side: Side) -> Option<&BoundaryCondition> {
        self.system
            .boundary_conditions
            .get(child)
            .and_then(|bcs: &BoundaryConditions| bcs.get(side))
    }

    fn conditions(
        &self,
        child: &Symbol,
        symbol: &Symbol,
    ) -> Result<(&BoundaryCondition, &BoundaryCondition), DiscretizationError> {
        let get = |side| {
            self.boundary(child, side)
                .ok_or_else(|| DiscretizationError::BoundaryConditionMissing {
                    symbol: symbol.to_string(),
                    domain: child.domain().clone(),
                    side,
                })
        };
        Ok((get(Side::Left)?, get(Side::Right)?))
    }

    fn boundary_value(
        &self,
        symbol: &Symbol,
        bc: &BoundaryCondition,
    ) -> Result<Discrete, DiscretizationError> {
        let (value, location) = self.symbol(&bc.value)?;
        if location != Location::Scalar {
            return Err(unsupported(symbol, "boundary values must be scalars"));
        }
        Ok((value, Location::Scalar))
    }

    /// Adds each boundary value through its column, skipping zero values.
    fn with_boundary(
        &self,
        mut interior: Symbol,
        columns: [(CsrMatrix<f64>, &BoundaryCondition); 2],
        symbol: &Symbol,
        domain: &Domain,
    ) -> Result<Symbol, DiscretizationError> {
        for (column, bc) in columns {
            if bc.value.is_zero() {
                continue;
            }
            let (value, _) = self.boundary_value(symbol, bc)?;
            interior = interior.add(fused(column, value, domain))?;
        }
        Ok(interior)
    }

}

fn coordinates(
    matrix: Option<CsrMatrix<f64>>,
    symbol: &Symbol,
) -> Result<CsrMatrix<f64>, DiscretizationError> {
    matrix.ok_or_else(|| unsupported(symbol, "no rule for cylindrical polar coordinates"))
}

fn unsupported(symbol: &Symbol, reason: &str) -> DiscretizationError {
    let domain = symbol
        .children()
        .first()
        .map_or_else(|| symbol.domain().clone(), |c| c.domain().clone());
    DiscretizationError::UnsupportedOperator {
        operator: symbol.name(),
        domain,
        reason: reason.to_owned(),
    }
}

/// `matrix · child`, folding a child that is itself a linear map.
fn fused(matrix: CsrMatrix<f64>, child: Symbol, domain: &Domain) -> Symbol {
    if let Kind::LinearMap {
        matrix: inner,
        child: grandchild,
    } = child.kind()
    {
        let product = sparse::matmul(&matrix, inner);
        return Symbol::linear_map(Arc::new(product), grandchild.as_ref().clone(), domain.clone());
    }
    Symbol::linear_map(Arc::new(matrix), child, domain.clone())
}
