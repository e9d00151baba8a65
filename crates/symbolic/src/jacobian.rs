use nalgebra_sparse::CsrMatrix;
use volta_core::sparse;

use crate::{
    BinaryOp, EvalContext, EvalError, Kind, Symbol, Value,
    evaluate::{args_len, call_function, combine, lookup, map_input, reduce, shape},
};

impl Symbol {
    /// Forward-mode derivative of a discretized tree with respect to the
    /// whole state vector of length `n`.
    ///
    /// Returns the value together with the `len × n` Jacobian, where `len`
    /// is the value's length.
    ///
    /// # Errors
    ///
    /// Fails like [`Symbol::evaluate`], and on nodes that only exist before
    /// discretization.
    pub fn jacobian(
        &self,
        ctx: &EvalContext<'_>,
        n: usize,
    ) -> Result<(Value, CsrMatrix<f64>), EvalError> {
        match self.kind() {
            Kind::Scalar(_)
            | Kind::Time
            | Kind::Parameter(_)
            | Kind::InputParameter(_)
            | Kind::Vector(_) => {
                let value = self.evaluate(ctx)?;
                let rows = value.len();
                Ok((value, sparse::zeros(rows, n)))
            }
            Kind::Variable(_) | Kind::FunctionParameter { .. } | Kind::Spatial { .. } => {
                Err(EvalError::NotDiscretized {
                    symbol: self.to_string(),
                })
            }
            Kind::StateVector { name, start, len } => {
                let value = ctx.state_slice(self, name, *start, *len)?;
                let jac = sparse::from_triplets(*len, n, (0..*len).map(|i| (i, start + i, 1.0)));
                Ok((value, jac))
            }
            Kind::Binary { op, left, right } => {
                let (a, ja) = left.jacobian(ctx, n)?;
                let (b, jb) = right.jacobian(ctx, n)?;
                let value = combine(*op, &a, &b)?;
                let len = value.len();
                let (ja, jb) = (expand(ja, len), expand(jb, len));
                let (av, bv) = (a.to_vector(len), b.to_vector(len));

                let jac = match op {
                    BinaryOp::Add => sparse::linear_combination(&[(1.0, &ja), (1.0, &jb)], len, n),
                    BinaryOp::Sub => {
                        sparse::linear_combination(&[(1.0, &ja), (-1.0, &jb)], len, n)
                    }
                    BinaryOp::Mul => sum(
                        &sparse::scale_rows(&ja, bv.as_slice()),
                        &sparse::scale_rows(&jb, av.as_slice()),
                    ),
                    BinaryOp::Div => {
                        let inv: Vec<f64> = bv.iter().map(|b| 1.0 / b).collect();
                        let quot: Vec<f64> =
                            av.iter().zip(bv.iter()).map(|(a, b)| -a / (b * b)).collect();
                        sum(&sparse::scale_rows(&ja, &inv), &sparse::scale_rows(&jb, &quot))
                    }
                    BinaryOp::Pow => {
                        let base: Vec<f64> = av
                            .iter()
                            .zip(bv.iter())
                            .map(|(a, b)| b * a.powf(b - 1.0))
                            .collect();
                        let base_term = sparse::scale_rows(&ja, &base);
                        if jb.nnz() == 0 {
                            base_term
                        } else {
                            let exponent: Vec<f64> = av
                                .iter()
                                .zip(bv.iter())
                                .map(|(a, b)| a.powf(*b) * a.ln())
                                .collect();
                            sum(&base_term, &sparse::scale_rows(&jb, &exponent))
                        }
                    }
                };
                Ok((value, jac))
            }
            Kind::Unary { op, child } => {
                let (c, jc) = child.jacobian(ctx, n)?;
                let scale: Vec<f64> = c.iter().map(|x| op.derivative(x)).collect();
                Ok((c.map(|x| op.apply(x)), sparse::scale_rows(&jc, &scale)))
            }
            Kind::Reduce { op, child } => {
                let (c, jc) = child.jacobian(ctx, n)?;
                let (index, best) = reduce(*op, &c);
                let all: Vec<usize> = (0..n).collect();
                let row = if jc.nrows() == 0 {
                    sparse::zeros(1, n)
                } else {
                    sparse::submatrix(&jc, &[index], &all)
                };
                Ok((Value::Scalar(best), row))
            }
            Kind::Broadcast(child) => child.jacobian(ctx, n),
            Kind::Concatenation(children) => {
                let mut values = Vec::new();
                let mut blocks = Vec::with_capacity(children.len());
                for child in children {
                    let (v, j) = child.jacobian(ctx, n)?;
                    values.extend(v.iter());
                    blocks.push(j);
                }
                Ok((
                    Value::Vector(nalgebra::DVector::from_vec(values)),
                    sparse::vstack(&blocks, n),
                ))
            }
            Kind::Function {
                function,
                args,
                partials,
            } => {
                let mut values = Vec::with_capacity(args.len());
                let mut jacs = Vec::with_capacity(args.len());
                for arg in args {
                    let (v, j) = arg.jacobian(ctx, n)?;
                    values.push(v);
                    jacs.push(j);
                }
                let value = call_function(function, partials, &values)?;
                let len = args_len(function.name(), &values)?;

                let mut jac = sparse::zeros(len, n);
                for (i, j) in jacs.into_iter().enumerate() {
                    if j.nnz() == 0 {
                        continue;
                    }
                    let mut nested = partials.clone();
                    nested.push(i);
                    let slope = call_function(function, &nested, &values)?;
                    let scaled = sparse::scale_rows(&expand(j, len), slope.to_vector(len).as_slice());
                    jac = sum(&jac, &scaled);
                }
                Ok((value, jac))
            }
            Kind::Interpolant {
                table,
                child,
                derivative,
            } => {
                let (c, jc) = child.jacobian(ctx, n)?;
                let value = lookup(table, *derivative, &c)?;
                let jac = if *derivative {
                    sparse::zeros(c.len(), n)
                } else {
                    let slope: Vec<f64> = c.iter().map(|x| table.slope(x)).collect();
                    sparse::scale_rows(&jc, &slope)
                };
                Ok((value, jac))
            }
            Kind::LinearMap { matrix, child } => {
                let (c, jc) = child.jacobian(ctx, n)?;
                let input = map_input(matrix, &c)?;
                let jc = expand(jc, matrix.ncols());
                Ok((
                    shape(self, sparse::mul_vec(matrix, &input)),
                    sparse::matmul(matrix, &jc),
                ))
            }
        }
    }
}

/// Broadcasts a single-row Jacobian to `len` rows.
fn expand(jac: CsrMatrix<f64>, len: usize) -> CsrMatrix<f64> {
    if jac.nrows() == 1 && len != 1 {
        sparse::repeat_row(&jac, len)
    } else {
        jac
    }
}

fn sum(a: &CsrMatrix<f64>, b: &CsrMatrix<f64>) -> CsrMatrix<f64> {
    sparse::linear_combination(&[(1.0, a), (1.0, b)], a.nrows(), a.ncols())
}
