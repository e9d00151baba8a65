use std::sync::Arc;

use crate::{BinaryOp, Kind, Symbol, SymbolError, UnaryOp, simplify};

impl Symbol {
    /// Differentiates elementwise with respect to the leaf `wrt`.
    ///
    /// The chain rule runs through registered functions (as partial
    /// derivative nodes) and interpolants (as slope nodes). The result is
    /// simplified.
    ///
    /// # Errors
    ///
    /// Fails with [`SymbolError::NotDifferentiable`] on reductions, spatial
    /// operators, and linear maps, which have no elementwise derivative.
    pub fn diff(&self, wrt: &Symbol) -> Result<Symbol, SymbolError> {
        Ok(simplify(&self.diff_raw(wrt)?))
    }

    fn diff_raw(&self, wrt: &Symbol) -> Result<Symbol, SymbolError> {
        if self == wrt {
            return Ok(Symbol::scalar_on(1.0, self.domain()));
        }

        match self.kind() {
            Kind::Scalar(_)
            | Kind::Time
            | Kind::Variable(_)
            | Kind::Parameter(_)
            | Kind::InputParameter(_)
            | Kind::StateVector { .. }
            | Kind::Vector(_) => Ok(Symbol::scalar_on(0.0, self.domain())),
            Kind::Binary { op, left, right } => diff_binary(*op, left, right, wrt),
            Kind::Unary { op, child } => {
                let inner = child.diff_raw(wrt)?;
                let c = child.as_ref().clone();
                let outer = match op {
                    UnaryOp::Neg => return Ok(inner.neg()),
                    UnaryOp::Abs => c.sign(),
                    UnaryOp::Exp => c.exp(),
                    UnaryOp::Log => Symbol::scalar(1.0).div(c)?,
                    UnaryOp::Sqrt => Symbol::scalar(0.5).div(c.sqrt())?,
                    UnaryOp::Sin => c.cos(),
                    UnaryOp::Cos => c.sin().neg(),
                    UnaryOp::Tanh => Symbol::scalar(1.0).sub(c.tanh().pow(2.0)?)?,
                    UnaryOp::Sign => return Ok(Symbol::scalar_on(0.0, self.domain())),
                };
                outer.mul(inner)
            }
            Kind::Broadcast(child) => {
                let inner = child.diff_raw(wrt)?;
                Symbol::broadcast(inner, self.domain().clone())
            }
            Kind::Concatenation(children) => {
                let parts = children
                    .iter()
                    .map(|c| {
                        let d = c.diff_raw(wrt)?;
                        if d.domain().is_empty() {
                            Symbol::broadcast(d, c.domain().clone())
                        } else {
                            Ok(d)
                        }
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Symbol::concatenation(parts)
            }
            Kind::Function {
                function,
                args,
                partials,
            } => {
                let mut total = Symbol::scalar_on(0.0, self.domain());
                for (i, arg) in args.iter().enumerate() {
                    let d_arg = arg.diff_raw(wrt)?;
                    if d_arg.is_zero() {
                        continue;
                    }
                    let mut nested = partials.clone();
                    nested.push(i);
                    let partial =
                        Symbol::function_partial(Arc::clone(function), args.clone(), nested)?;
                    total = total.add(partial.mul(d_arg)?)?;
                }
                Ok(total)
            }
            Kind::Interpolant {
                table,
                child,
                derivative,
            } => {
                if *derivative {
                    return Ok(Symbol::scalar_on(0.0, self.domain()));
                }
                let slope = Symbol::interpolant_slope(Arc::clone(table), child.as_ref().clone());
                slope.mul(child.diff_raw(wrt)?)
            }
            Kind::FunctionParameter { .. }
            | Kind::Reduce { .. }
            | Kind::Spatial { .. }
            | Kind::LinearMap { .. } => Err(SymbolError::NotDifferentiable {
                symbol: self.to_string(),
                wrt: wrt.to_string(),
            }),
        }
    }
}

fn diff_binary(
    op: BinaryOp,
    left: &Symbol,
    right: &Symbol,
    wrt: &Symbol,
) -> Result<Symbol, SymbolError> {
    let dl = left.diff_raw(wrt)?;
    let dr = right.diff_raw(wrt)?;
    let (l, r) = (left.clone(), right.clone());

    match op {
        BinaryOp::Add => dl.add(dr),
        BinaryOp::Sub => dl.sub(dr),
        BinaryOp::Mul => dl.mul(r)?.add(l.mul(dr)?),
        BinaryOp::Div => dl.mul(r.clone())?.sub(l.mul(dr)?)?.div(r.pow(2.0)?),
        BinaryOp::Pow if right.is_constant() => {
            let exponent = r.clone().sub(1.0)?;
            r.mul(l.pow(exponent)?)?.mul(dl)
        }
        BinaryOp::Pow => {
            let power = l.clone().pow(r.clone())?;
            let log_term = dr.mul(l.clone().log())?;
            let ratio_term = r.mul(dl)?.div(l)?;
            power.mul(log_term.add(ratio_term)?)
        }
    }
}
