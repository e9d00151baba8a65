//! Value-preserving rewriting of expression trees.
//!
//! Rules run bottom-up, one pass at a time, until a pass changes nothing.
//! A zero or one that replaces a domain-bearing operand is broadcast onto
//! that domain so the shape of the tree is kept.

use tracing::trace;

use crate::{BinaryOp, EvalContext, Kind, SpatialOp, Symbol, System, UnaryOp, Value};

/// Passes after which simplification stops even without a fixed point.
const MAX_PASSES: usize = 64;

/// Simplifies `symbol` to a fixed point.
#[must_use]
pub fn simplify(symbol: &Symbol) -> Symbol {
    let mut current = symbol.clone();
    for pass_index in 0..MAX_PASSES {
        let next = pass(&current);
        if next == current {
            trace!(passes = pass_index + 1, "simplified");
            return next;
        }
        current = next;
    }
    current
}

/// Simplifies every expression in `system`, boundary-condition keys included.
#[must_use]
pub fn simplify_system(system: &System) -> System {
    system.map(simplify)
}

fn pass(symbol: &Symbol) -> Symbol {
    let children: Vec<Symbol> = symbol.children().into_iter().map(pass).collect();
    let rebuilt = symbol
        .with_children(children)
        .unwrap_or_else(|_| symbol.clone());
    rewrite(rebuilt)
}

fn rewrite(symbol: Symbol) -> Symbol {
    if let Some(folded) = fold_constant(&symbol) {
        return folded;
    }

    let rewritten = match symbol.kind() {
        Kind::Binary { op, left, right } => rewrite_binary(&symbol, *op, left, right),
        Kind::Unary {
            op: UnaryOp::Neg,
            child,
        } => rewrite_neg(child),
        Kind::Spatial {
            op: SpatialOp::Divergence,
            child,
        } => match child.kind() {
            Kind::Spatial {
                op: SpatialOp::Gradient,
                child: inner,
            } => inner.as_ref().clone().laplacian().ok(),
            _ => None,
        },
        _ => None,
    };

    rewritten.unwrap_or(symbol)
}

/// Folds a constant subtree into a scalar, or a vector for discrete nodes.
fn fold_constant(symbol: &Symbol) -> Option<Symbol> {
    let already_folded = match symbol.kind() {
        Kind::Scalar(_) | Kind::Vector(_) => true,
        Kind::Broadcast(child) => matches!(child.kind(), Kind::Scalar(_)),
        _ => false,
    };
    let foldable = symbol.is_constant()
        && !symbol.any(&|s| matches!(s.kind(), Kind::Concatenation(_) | Kind::Spatial { .. }));
    if already_folded || !foldable {
        return None;
    }

    match symbol.evaluate(&EvalContext::default()).ok()? {
        Value::Scalar(x) => Some(Symbol::scalar_on(x, symbol.domain())),
        Value::Vector(v) if v.len() == 1 && symbol.domain().is_empty() => {
            Some(Symbol::scalar(v[0]))
        }
        Value::Vector(v) => Some(Symbol::vector(v, symbol.domain().clone())),
    }
}

/// Re-homes `result` onto the domain of the node it replaces.
fn on_domain_of(node: &Symbol, result: Symbol) -> Option<Symbol> {
    if result.domain() == node.domain() {
        Some(result)
    } else if result.domain().is_empty() {
        Symbol::broadcast(result, node.domain().clone()).ok()
    } else {
        None
    }
}

fn rewrite_neg(child: &Symbol) -> Option<Symbol> {
    match child.kind() {
        Kind::Unary {
            op: UnaryOp::Neg,
            child: inner,
        } => Some(inner.as_ref().clone()),
        Kind::Binary {
            op: BinaryOp::Mul,
            left,
            right,
        } => {
            let c = plain_scalar(left)?;
            Symbol::scalar(-c).mul(right.as_ref().clone()).ok()
        }
        _ => None,
    }
}

/// The scalar of a plain `Scalar` leaf, not of a broadcast.
fn plain_scalar(symbol: &Symbol) -> Option<f64> {
    match symbol.kind() {
        Kind::Scalar(x) => Some(*x),
        _ => None,
    }
}

fn rewrite_binary(node: &Symbol, op: BinaryOp, left: &Symbol, right: &Symbol) -> Option<Symbol> {
    let (l, r) = (left.clone(), right.clone());
    let zero = || Symbol::scalar_on(0.0, node.domain());
    let one = || Symbol::scalar_on(1.0, node.domain());

    match op {
        BinaryOp::Add => {
            if left.is_zero() {
                return on_domain_of(node, r);
            }
            if right.is_zero() {
                return on_domain_of(node, l);
            }
            if left == right {
                return Symbol::scalar(2.0).mul(l).ok();
            }
            if plain_scalar(right).is_some() && plain_scalar(left).is_none() {
                return r.add(l).ok();
            }
            if let (Some(c1), Kind::Binary {
                op: BinaryOp::Add,
                left: inner_left,
                right: inner_right,
            }) = (plain_scalar(left), right.kind())
                && let Some(c2) = plain_scalar(inner_left)
            {
                return Symbol::scalar(c1 + c2).add(inner_right.as_ref().clone()).ok();
            }
            None
        }
        BinaryOp::Sub => {
            if right.is_zero() {
                return on_domain_of(node, l);
            }
            if left.is_zero() {
                return on_domain_of(node, r.neg());
            }
            if left == right {
                return Some(zero());
            }
            None
        }
        BinaryOp::Mul => {
            if left.is_zero() || right.is_zero() {
                return Some(zero());
            }
            if left.is_one() {
                return on_domain_of(node, r);
            }
            if right.is_one() {
                return on_domain_of(node, l);
            }
            if plain_scalar(right).is_some() && plain_scalar(left).is_none() {
                return r.mul(l).ok();
            }
            if let (Some(c1), Kind::Binary {
                op: BinaryOp::Mul,
                left: inner_left,
                right: inner_right,
            }) = (plain_scalar(left), right.kind())
                && let Some(c2) = plain_scalar(inner_left)
            {
                return Symbol::scalar(c1 * c2).mul(inner_right.as_ref().clone()).ok();
            }
            None
        }
        BinaryOp::Div => {
            if left.is_zero() {
                return Some(zero());
            }
            if right.is_one() {
                return on_domain_of(node, l);
            }
            if left == right {
                return Some(one());
            }
            None
        }
        BinaryOp::Pow => {
            if right.is_zero() || left.is_one() {
                return Some(one());
            }
            if right.is_one() {
                return on_domain_of(node, l);
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Arc};

    use approx::assert_relative_eq;

    use crate::{Domain, NamedFunction, TableLookup};

    use super::*;

    fn x() -> Symbol {
        Symbol::variable("x", Domain::empty())
    }

    fn c() -> Symbol {
        Symbol::variable("c", Domain::from("separator"))
    }

    #[test]
    fn identities_are_removed() {
        assert_eq!(simplify(&x().add(0.0).unwrap()), x());
        assert_eq!(simplify(&x().mul(1.0).unwrap()), x());
        assert_eq!(simplify(&x().div(1.0).unwrap()), x());
        assert_eq!(simplify(&x().pow(1.0).unwrap()), x());
        assert_eq!(simplify(&x().neg().neg()), x());
        assert_eq!(simplify(&Symbol::scalar(0.0).sub(x()).unwrap()), x().neg());
        assert!(simplify(&x().pow(0.0).unwrap()).is_one());
        assert!(simplify(&Symbol::scalar(0.0).div(x()).unwrap()).is_zero());
    }

    #[test]
    fn zeros_keep_their_domain() {
        let zero = simplify(&c().mul(0.0).unwrap());
        assert!(zero.is_zero());
        assert_eq!(zero.domain(), c().domain());
        assert!(matches!(zero.kind(), Kind::Broadcast(_)));

        let difference = simplify(&c().sub(c()).unwrap());
        assert_eq!(difference, zero);
    }

    #[test]
    fn constants_fold_through_functions_and_tables() {
        let f = Arc::new(NamedFunction::new("f", 1, |a| a[0] * 10.0));
        let table = Arc::new(TableLookup::new("t", vec![0.0, 1.0], vec![0.0, 4.0]).unwrap());
        let expr = Symbol::function(f, vec![Symbol::scalar(2.0)])
            .unwrap()
            .add(Symbol::interpolant(table, Symbol::scalar(0.5)))
            .unwrap();

        assert_eq!(simplify(&expr), Symbol::scalar(22.0));
    }

    #[test]
    fn like_terms_and_constants_gather() {
        assert_eq!(
            simplify(&x().add(x()).unwrap()),
            Symbol::scalar(2.0).mul(x()).unwrap()
        );
        assert!(simplify(&x().div(x()).unwrap()).is_one());

        let nested = x().mul(3.0).unwrap().mul(2.0).unwrap();
        assert_eq!(simplify(&nested), Symbol::scalar(6.0).mul(x()).unwrap());

        let sums = Symbol::scalar(1.0).add(x().add(2.0).unwrap()).unwrap();
        assert_eq!(simplify(&sums), Symbol::scalar(3.0).add(x()).unwrap());
    }

    #[test]
    fn divergence_of_gradient_becomes_laplacian() {
        let expr = c().gradient().unwrap().divergence().unwrap();
        assert_eq!(simplify(&expr), c().laplacian().unwrap());
    }

    #[test]
    fn value_is_preserved() {
        let expr = x()
            .mul(2.0)
            .unwrap()
            .add(Symbol::scalar(3.0).mul(4.0).unwrap())
            .unwrap()
            .sub(x().mul(0.0).unwrap())
            .unwrap()
            .div(x().pow(1.0).unwrap())
            .unwrap();
        let simplified = simplify(&expr);

        let variables = HashMap::from([("x".to_owned(), Value::Scalar(1.7))]);
        let ctx = EvalContext::new(0.0).with_variables(&variables);
        assert_relative_eq!(
            expr.evaluate(&ctx).unwrap().as_scalar().unwrap(),
            simplified.evaluate(&ctx).unwrap().as_scalar().unwrap(),
            epsilon = 1e-12
        );
        assert_eq!(simplify(&simplified), simplified);
    }
}
