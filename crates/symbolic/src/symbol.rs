use std::{
    collections::hash_map::DefaultHasher,
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;

use crate::{Domain, NamedFunction, Side, SymbolError, TableLookup};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOp {
    #[must_use]
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Pow => a.powf(b),
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "**",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Abs,
    Exp,
    Log,
    Sqrt,
    Sin,
    Cos,
    Tanh,
    Sign,
}

impl UnaryOp {
    #[must_use]
    pub fn apply(self, x: f64) -> f64 {
        match self {
            UnaryOp::Neg => -x,
            UnaryOp::Abs => x.abs(),
            UnaryOp::Exp => x.exp(),
            UnaryOp::Log => x.ln(),
            UnaryOp::Sqrt => x.sqrt(),
            UnaryOp::Sin => x.sin(),
            UnaryOp::Cos => x.cos(),
            UnaryOp::Tanh => x.tanh(),
            UnaryOp::Sign => sign(x),
        }
    }

    /// Derivative of the operation at `x`.
    #[must_use]
    pub fn derivative(self, x: f64) -> f64 {
        match self {
            UnaryOp::Neg => -1.0,
            UnaryOp::Abs => sign(x),
            UnaryOp::Exp => x.exp(),
            UnaryOp::Log => 1.0 / x,
            UnaryOp::Sqrt => 0.5 / x.sqrt(),
            UnaryOp::Sin => x.cos(),
            UnaryOp::Cos => -x.sin(),
            UnaryOp::Tanh => 1.0 - x.tanh().powi(2),
            UnaryOp::Sign => 0.0,
        }
    }

    fn name(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Abs => "abs",
            UnaryOp::Exp => "exp",
            UnaryOp::Log => "log",
            UnaryOp::Sqrt => "sqrt",
            UnaryOp::Sin => "sin",
            UnaryOp::Cos => "cos",
            UnaryOp::Tanh => "tanh",
            UnaryOp::Sign => "sign",
        }
    }
}

fn sign(x: f64) -> f64 {
    if x.is_nan() {
        x
    } else if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReduceOp {
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpatialOp {
    Gradient,
    Divergence,
    Laplacian,
    Integral,
    BoundaryValue(Side),
}

impl SpatialOp {
    fn name(self) -> &'static str {
        match self {
            SpatialOp::Gradient => "grad",
            SpatialOp::Divergence => "div",
            SpatialOp::Laplacian => "laplacian",
            SpatialOp::Integral => "integral",
            SpatialOp::BoundaryValue(Side::Left) => "boundary_value_left",
            SpatialOp::BoundaryValue(Side::Right) => "boundary_value_right",
        }
    }

    /// Whether the result stays on the child's domain.
    fn keeps_domain(self) -> bool {
        matches!(
            self,
            SpatialOp::Gradient | SpatialOp::Divergence | SpatialOp::Laplacian
        )
    }
}

/// The operator and payload of a [`Symbol`].
#[derive(Debug, Clone)]
pub enum Kind {
    Scalar(f64),
    Time,
    Variable(String),
    Parameter(String),
    FunctionParameter {
        name: String,
        inputs: Vec<Symbol>,
    },
    InputParameter(String),
    Binary {
        op: BinaryOp,
        left: Box<Symbol>,
        right: Box<Symbol>,
    },
    Unary {
        op: UnaryOp,
        child: Box<Symbol>,
    },
    Reduce {
        op: ReduceOp,
        child: Box<Symbol>,
    },
    Spatial {
        op: SpatialOp,
        child: Box<Symbol>,
    },
    Broadcast(Box<Symbol>),
    Concatenation(Vec<Symbol>),
    /// A registered function, or its mixed partial `∂/∂x_{p₁}…∂/∂x_{pₖ}`.
    Function {
        function: Arc<NamedFunction>,
        args: Vec<Symbol>,
        partials: Vec<usize>,
    },
    /// A table lookup, or its slope when `derivative` is set.
    Interpolant {
        table: Arc<TableLookup>,
        child: Box<Symbol>,
        derivative: bool,
    },
    /// The slice `y[start..start + len]` of the state vector.
    StateVector {
        name: String,
        start: usize,
        len: usize,
    },
    Vector(Arc<DVector<f64>>),
    LinearMap {
        matrix: Arc<CsrMatrix<f64>>,
        child: Box<Symbol>,
    },
}

/// An immutable node of the expression tree.
///
/// Fallible constructors validate domains, so every `Symbol` that exists is
/// well formed. Equality and hashing are structural.
#[derive(Debug, Clone)]
pub struct Symbol {
    kind: Kind,
    domain: Domain,
}

impl Symbol {
    fn new(kind: Kind, domain: Domain) -> Self {
        Self { kind, domain }
    }

    #[must_use]
    pub fn scalar(value: f64) -> Self {
        Self::new(Kind::Scalar(value), Domain::empty())
    }

    #[must_use]
    pub fn time() -> Self {
        Self::new(Kind::Time, Domain::empty())
    }

    pub fn variable(name: impl Into<String>, domain: impl Into<Domain>) -> Self {
        Self::new(Kind::Variable(name.into()), domain.into())
    }

    pub fn parameter(name: impl Into<String>) -> Self {
        Self::new(Kind::Parameter(name.into()), Domain::empty())
    }

    pub fn input_parameter(name: impl Into<String>) -> Self {
        Self::new(Kind::InputParameter(name.into()), Domain::empty())
    }

    /// A parameter evaluated at symbolic inputs.
    ///
    /// # Errors
    ///
    /// Fails with [`SymbolError::DomainMismatch`] if the inputs live on
    /// different domains.
    pub fn function_parameter(
        name: impl Into<String>,
        inputs: Vec<Symbol>,
    ) -> Result<Self, SymbolError> {
        let name = name.into();
        let domain = common_domain(&name, &inputs)?;
        Ok(Self::new(Kind::FunctionParameter { name, inputs }, domain))
    }

    /// A binary operation.
    ///
    /// # Errors
    ///
    /// Fails with [`SymbolError::DomainMismatch`] if the operands live on
    /// different non-empty domains.
    pub fn binary(
        op: BinaryOp,
        left: impl Into<Symbol>,
        right: impl Into<Symbol>,
    ) -> Result<Self, SymbolError> {
        let (left, right) = (left.into(), right.into());
        let domain = left.domain.combine(&right.domain).ok_or_else(|| {
            SymbolError::DomainMismatch {
                operator: op.symbol().to_owned(),
                left: left.domain.clone(),
                right: right.domain.clone(),
            }
        })?;
        Ok(Self::new(
            Kind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            domain,
        ))
    }

    /// `self + other`.
    ///
    /// # Errors
    ///
    /// See [`Symbol::binary`].
    #[allow(clippy::should_implement_trait)]
    pub fn add(self, other: impl Into<Symbol>) -> Result<Self, SymbolError> {
        Self::binary(BinaryOp::Add, self, other)
    }

    /// `self - other`.
    ///
    /// # Errors
    ///
    /// See [`Symbol::binary`].
    #[allow(clippy::should_implement_trait)]
    pub fn sub(self, other: impl Into<Symbol>) -> Result<Self, SymbolError> {
        Self::binary(BinaryOp::Sub, self, other)
    }

    /// `self * other`.
    ///
    /// # Errors
    ///
    /// See [`Symbol::binary`].
    #[allow(clippy::should_implement_trait)]
    pub fn mul(self, other: impl Into<Symbol>) -> Result<Self, SymbolError> {
        Self::binary(BinaryOp::Mul, self, other)
    }

    /// `self / other`.
    ///
    /// # Errors
    ///
    /// See [`Symbol::binary`].
    #[allow(clippy::should_implement_trait)]
    pub fn div(self, other: impl Into<Symbol>) -> Result<Self, SymbolError> {
        Self::binary(BinaryOp::Div, self, other)
    }

    /// `self ** other`.
    ///
    /// # Errors
    ///
    /// See [`Symbol::binary`].
    pub fn pow(self, other: impl Into<Symbol>) -> Result<Self, SymbolError> {
        Self::binary(BinaryOp::Pow, self, other)
    }

    #[must_use]
    pub fn unary(op: UnaryOp, child: Symbol) -> Self {
        let domain = child.domain.clone();
        Self::new(
            Kind::Unary {
                op,
                child: Box::new(child),
            },
            domain,
        )
    }

    #[allow(clippy::should_implement_trait)]
    #[must_use]
    pub fn neg(self) -> Self {
        Self::unary(UnaryOp::Neg, self)
    }

    #[must_use]
    pub fn abs(self) -> Self {
        Self::unary(UnaryOp::Abs, self)
    }

    #[must_use]
    pub fn exp(self) -> Self {
        Self::unary(UnaryOp::Exp, self)
    }

    #[must_use]
    pub fn log(self) -> Self {
        Self::unary(UnaryOp::Log, self)
    }

    #[must_use]
    pub fn sqrt(self) -> Self {
        Self::unary(UnaryOp::Sqrt, self)
    }

    #[must_use]
    pub fn sin(self) -> Self {
        Self::unary(UnaryOp::Sin, self)
    }

    #[must_use]
    pub fn cos(self) -> Self {
        Self::unary(UnaryOp::Cos, self)
    }

    #[must_use]
    pub fn tanh(self) -> Self {
        Self::unary(UnaryOp::Tanh, self)
    }

    #[must_use]
    pub fn sign(self) -> Self {
        Self::unary(UnaryOp::Sign, self)
    }

    /// Reduces a vector to a scalar.
    #[must_use]
    pub fn reduce(op: ReduceOp, child: Symbol) -> Self {
        Self::new(
            Kind::Reduce {
                op,
                child: Box::new(child),
            },
            Domain::empty(),
        )
    }

    #[must_use]
    pub fn minimum(self) -> Self {
        Self::reduce(ReduceOp::Min, self)
    }

    #[must_use]
    pub fn maximum(self) -> Self {
        Self::reduce(ReduceOp::Max, self)
    }

    /// A spatial operator.
    ///
    /// Gradient, divergence, and Laplacian stay on the child's domain;
    /// integral and boundary values are scalars.
    ///
    /// # Errors
    ///
    /// Fails with [`SymbolError::EmptyDomain`] if the child is domain-agnostic.
    pub fn spatial(op: SpatialOp, child: Symbol) -> Result<Self, SymbolError> {
        if child.domain.is_empty() {
            return Err(SymbolError::EmptyDomain {
                operator: op.name().to_owned(),
                symbol: child.to_string(),
            });
        }
        let domain = if op.keeps_domain() {
            child.domain.clone()
        } else {
            Domain::empty()
        };
        Ok(Self::new(
            Kind::Spatial {
                op,
                child: Box::new(child),
            },
            domain,
        ))
    }

    /// # Errors
    ///
    /// See [`Symbol::spatial`].
    pub fn gradient(self) -> Result<Self, SymbolError> {
        Self::spatial(SpatialOp::Gradient, self)
    }

    /// # Errors
    ///
    /// See [`Symbol::spatial`].
    pub fn divergence(self) -> Result<Self, SymbolError> {
        Self::spatial(SpatialOp::Divergence, self)
    }

    /// # Errors
    ///
    /// See [`Symbol::spatial`].
    pub fn laplacian(self) -> Result<Self, SymbolError> {
        Self::spatial(SpatialOp::Laplacian, self)
    }

    /// # Errors
    ///
    /// See [`Symbol::spatial`].
    pub fn integral(self) -> Result<Self, SymbolError> {
        Self::spatial(SpatialOp::Integral, self)
    }

    /// # Errors
    ///
    /// See [`Symbol::spatial`].
    pub fn boundary_value(self, side: Side) -> Result<Self, SymbolError> {
        Self::spatial(SpatialOp::BoundaryValue(side), self)
    }

    /// Broadcasts a domain-agnostic child onto a non-empty domain.
    ///
    /// # Errors
    ///
    /// Fails with [`SymbolError::InvalidBroadcast`] if the child already has
    /// a domain or the target domain is empty.
    pub fn broadcast(child: Symbol, domain: impl Into<Domain>) -> Result<Self, SymbolError> {
        let domain = domain.into();
        if !child.domain.is_empty() || domain.is_empty() {
            return Err(SymbolError::InvalidBroadcast {
                symbol: child.to_string(),
                from: child.domain.clone(),
                to: domain,
            });
        }
        Ok(Self::new(Kind::Broadcast(Box::new(child)), domain))
    }

    /// Joins children on disjoint domains, in order.
    ///
    /// # Errors
    ///
    /// Fails if `children` is empty or the domains are empty or overlap.
    pub fn concatenation(children: Vec<Symbol>) -> Result<Self, SymbolError> {
        if children.is_empty() {
            return Err(SymbolError::EmptyConcatenation);
        }
        for (i, child) in children.iter().enumerate() {
            let overlaps = children[..i]
                .iter()
                .any(|other| other.domain.overlaps(&child.domain));
            if child.domain.is_empty() || overlaps {
                return Err(SymbolError::OverlappingDomains {
                    domain: child.domain.clone(),
                });
            }
        }
        let domain = Domain::joined(children.iter().map(|c| &c.domain));
        Ok(Self::new(Kind::Concatenation(children), domain))
    }

    /// Calls a registered function.
    ///
    /// # Errors
    ///
    /// Fails on an arity mismatch or incompatible argument domains.
    pub fn function(function: Arc<NamedFunction>, args: Vec<Symbol>) -> Result<Self, SymbolError> {
        Self::function_partial(function, args, Vec::new())
    }

    /// A mixed partial derivative of a registered function.
    ///
    /// # Errors
    ///
    /// See [`Symbol::function`].
    pub fn function_partial(
        function: Arc<NamedFunction>,
        args: Vec<Symbol>,
        partials: Vec<usize>,
    ) -> Result<Self, SymbolError> {
        if args.len() != function.arity() {
            return Err(SymbolError::Arity {
                name: function.name().to_owned(),
                expected: function.arity(),
                got: args.len(),
            });
        }
        let domain = common_domain(function.name(), &args)?;
        Ok(Self::new(
            Kind::Function {
                function,
                args,
                partials,
            },
            domain,
        ))
    }

    /// Looks `child` up in a table.
    #[must_use]
    pub fn interpolant(table: Arc<TableLookup>, child: Symbol) -> Self {
        Self::interpolant_node(table, child, false)
    }

    fn interpolant_node(table: Arc<TableLookup>, child: Symbol, derivative: bool) -> Self {
        let domain = child.domain.clone();
        Self::new(
            Kind::Interpolant {
                table,
                child: Box::new(child),
                derivative,
            },
            domain,
        )
    }

    /// The slope of a table lookup at `child`.
    #[must_use]
    pub fn interpolant_slope(table: Arc<TableLookup>, child: Symbol) -> Self {
        Self::interpolant_node(table, child, true)
    }

    pub fn state_vector(
        name: impl Into<String>,
        start: usize,
        len: usize,
        domain: impl Into<Domain>,
    ) -> Self {
        Self::new(
            Kind::StateVector {
                name: name.into(),
                start,
                len,
            },
            domain.into(),
        )
    }

    pub fn vector(values: DVector<f64>, domain: impl Into<Domain>) -> Self {
        Self::new(Kind::Vector(Arc::new(values)), domain.into())
    }

    pub fn linear_map(
        matrix: Arc<CsrMatrix<f64>>,
        child: Symbol,
        domain: impl Into<Domain>,
    ) -> Self {
        Self::new(
            Kind::LinearMap {
                matrix,
                child: Box::new(child),
            },
            domain.into(),
        )
    }

    #[must_use]
    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    #[must_use]
    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    /// A short label for the node's operator or leaf.
    #[must_use]
    pub fn name(&self) -> String {
        match &self.kind {
            Kind::Scalar(x) => x.to_string(),
            Kind::Time => "t".to_owned(),
            Kind::Variable(name)
            | Kind::Parameter(name)
            | Kind::InputParameter(name)
            | Kind::FunctionParameter { name, .. }
            | Kind::StateVector { name, .. } => name.clone(),
            Kind::Binary { op, .. } => op.symbol().to_owned(),
            Kind::Unary { op, .. } => op.name().to_owned(),
            Kind::Reduce { op: ReduceOp::Min, .. } => "min".to_owned(),
            Kind::Reduce { op: ReduceOp::Max, .. } => "max".to_owned(),
            Kind::Spatial { op, .. } => op.name().to_owned(),
            Kind::Broadcast(_) => "broadcast".to_owned(),
            Kind::Concatenation(_) => "concatenation".to_owned(),
            Kind::Function { function, .. } => function.name().to_owned(),
            Kind::Interpolant { table, .. } => table.name().to_owned(),
            Kind::Vector(_) => "vector".to_owned(),
            Kind::LinearMap { .. } => "linear_map".to_owned(),
        }
    }

    /// The node's children, in order.
    #[must_use]
    pub fn children(&self) -> Vec<&Symbol> {
        match &self.kind {
            Kind::Scalar(_)
            | Kind::Time
            | Kind::Variable(_)
            | Kind::Parameter(_)
            | Kind::InputParameter(_)
            | Kind::StateVector { .. }
            | Kind::Vector(_) => Vec::new(),
            Kind::FunctionParameter { inputs: children, .. }
            | Kind::Concatenation(children)
            | Kind::Function { args: children, .. } => children.iter().collect(),
            Kind::Binary { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Kind::Unary { child, .. }
            | Kind::Reduce { child, .. }
            | Kind::Spatial { child, .. }
            | Kind::Broadcast(child)
            | Kind::Interpolant { child, .. }
            | Kind::LinearMap { child, .. } => vec![child.as_ref()],
        }
    }

    /// Visits every node depth-first, parents before children.
    pub fn visit(&self, f: &mut impl FnMut(&Symbol)) {
        f(self);
        for child in self.children() {
            child.visit(f);
        }
    }

    /// Returns `true` if any node satisfies `predicate`.
    pub fn any(&self, predicate: &impl Fn(&Symbol) -> bool) -> bool {
        predicate(self) || self.children().into_iter().any(|c| c.any(predicate))
    }

    /// Rebuilds this node over new children, revalidating domains.
    ///
    /// Leaves ignore an empty `children` and return a clone.
    ///
    /// # Errors
    ///
    /// Fails if the child count is wrong or the new children violate a
    /// construction rule.
    pub fn with_children(&self, children: Vec<Symbol>) -> Result<Symbol, SymbolError> {
        let expected = self.children().len();
        if children.len() != expected {
            return Err(SymbolError::ChildCount {
                symbol: self.to_string(),
                expected,
                got: children.len(),
            });
        }

        let mut children = children.into_iter();
        let mut next = || children.next().ok_or_else(|| unreachable_count(self));

        match &self.kind {
            Kind::Scalar(_)
            | Kind::Time
            | Kind::Variable(_)
            | Kind::Parameter(_)
            | Kind::InputParameter(_)
            | Kind::StateVector { .. }
            | Kind::Vector(_) => Ok(self.clone()),
            Kind::FunctionParameter { name, inputs } => {
                let inputs = (0..inputs.len()).map(|_| next()).collect::<Result<_, _>>()?;
                Symbol::function_parameter(name.clone(), inputs)
            }
            Kind::Binary { op, .. } => {
                let left = next()?;
                Symbol::binary(*op, left, next()?)
            }
            Kind::Unary { op, .. } => Ok(Symbol::unary(*op, next()?)),
            Kind::Reduce { op, .. } => Ok(Symbol::reduce(*op, next()?)),
            Kind::Spatial { op, .. } => Symbol::spatial(*op, next()?),
            Kind::Broadcast(_) => Symbol::broadcast(next()?, self.domain.clone()),
            Kind::Concatenation(parts) => {
                let parts = (0..parts.len()).map(|_| next()).collect::<Result<_, _>>()?;
                Symbol::concatenation(parts)
            }
            Kind::Function {
                function,
                args,
                partials,
            } => {
                let args = (0..args.len()).map(|_| next()).collect::<Result<_, _>>()?;
                Symbol::function_partial(Arc::clone(function), args, partials.clone())
            }
            Kind::Interpolant {
                table, derivative, ..
            } => Ok(Symbol::interpolant_node(
                Arc::clone(table),
                next()?,
                *derivative,
            )),
            Kind::LinearMap { matrix, .. } => Ok(Symbol::linear_map(
                Arc::clone(matrix),
                next()?,
                self.domain.clone(),
            )),
        }
    }

    /// Returns `true` if nothing below depends on time, state, or parameters.
    #[must_use]
    pub fn is_constant(&self) -> bool {
        !self.any(&|s| {
            matches!(
                s.kind,
                Kind::Time
                    | Kind::Variable(_)
                    | Kind::StateVector { .. }
                    | Kind::Parameter(_)
                    | Kind::FunctionParameter { .. }
                    | Kind::InputParameter(_)
            )
        })
    }

    /// The value of a `Scalar` node, or of a broadcast scalar.
    #[must_use]
    pub fn as_scalar(&self) -> Option<f64> {
        match &self.kind {
            Kind::Scalar(x) => Some(*x),
            Kind::Broadcast(child) => child.as_scalar(),
            _ => None,
        }
    }

    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn is_zero(&self) -> bool {
        self.as_scalar() == Some(0.0)
    }

    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn is_one(&self) -> bool {
        self.as_scalar() == Some(1.0)
    }

    /// A scalar broadcast onto `domain`, or a plain scalar for the empty domain.
    #[must_use]
    pub fn scalar_on(value: f64, domain: &Domain) -> Symbol {
        if domain.is_empty() {
            Symbol::scalar(value)
        } else {
            Symbol::new(
                Kind::Broadcast(Box::new(Symbol::scalar(value))),
                domain.clone(),
            )
        }
    }

    /// A stable 64-bit structural hash.
    #[must_use]
    pub fn structural_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

fn unreachable_count(symbol: &Symbol) -> SymbolError {
    SymbolError::ChildCount {
        symbol: symbol.to_string(),
        expected: symbol.children().len(),
        got: 0,
    }
}

/// The domain shared by all `args`, allowing domain-agnostic ones.
fn common_domain(operator: &str, args: &[Symbol]) -> Result<Domain, SymbolError> {
    let mut domain = Domain::empty();
    for arg in args {
        domain = domain
            .combine(&arg.domain)
            .ok_or_else(|| SymbolError::DomainMismatch {
                operator: operator.to_owned(),
                left: domain.clone(),
                right: arg.domain.clone(),
            })?;
    }
    Ok(domain)
}

impl From<f64> for Symbol {
    fn from(value: f64) -> Self {
        Symbol::scalar(value)
    }
}

impl From<&Symbol> for Symbol {
    fn from(symbol: &Symbol) -> Self {
        symbol.clone()
    }
}

fn matrices_equal(a: &CsrMatrix<f64>, b: &CsrMatrix<f64>) -> bool {
    a.nrows() == b.nrows()
        && a.ncols() == b.ncols()
        && a.row_offsets() == b.row_offsets()
        && a.col_indices() == b.col_indices()
        && a.values()
            .iter()
            .zip(b.values())
            .all(|(x, y)| x.to_bits() == y.to_bits())
}

fn vectors_equal(a: &DVector<f64>, b: &DVector<f64>) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.to_bits() == y.to_bits())
}

impl PartialEq for Kind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Kind::Scalar(a), Kind::Scalar(b)) => a.to_bits() == b.to_bits(),
            (Kind::Time, Kind::Time) => true,
            (Kind::Variable(a), Kind::Variable(b))
            | (Kind::Parameter(a), Kind::Parameter(b))
            | (Kind::InputParameter(a), Kind::InputParameter(b)) => a == b,
            (
                Kind::FunctionParameter { name: a, inputs: x },
                Kind::FunctionParameter { name: b, inputs: y },
            ) => a == b && x == y,
            (
                Kind::Binary {
                    op: a,
                    left: l1,
                    right: r1,
                },
                Kind::Binary {
                    op: b,
                    left: l2,
                    right: r2,
                },
            ) => a == b && l1 == l2 && r1 == r2,
            (Kind::Unary { op: a, child: x }, Kind::Unary { op: b, child: y }) => {
                a == b && x == y
            }
            (Kind::Reduce { op: a, child: x }, Kind::Reduce { op: b, child: y }) => {
                a == b && x == y
            }
            (Kind::Spatial { op: a, child: x }, Kind::Spatial { op: b, child: y }) => {
                a == b && x == y
            }
            (Kind::Broadcast(x), Kind::Broadcast(y)) => x == y,
            (Kind::Concatenation(x), Kind::Concatenation(y)) => x == y,
            (
                Kind::Function {
                    function: f,
                    args: x,
                    partials: p,
                },
                Kind::Function {
                    function: g,
                    args: y,
                    partials: q,
                },
            ) => Arc::ptr_eq(f, g) && x == y && p == q,
            (
                Kind::Interpolant {
                    table: t1,
                    child: x,
                    derivative: d1,
                },
                Kind::Interpolant {
                    table: t2,
                    child: y,
                    derivative: d2,
                },
            ) => t1 == t2 && x == y && d1 == d2,
            (
                Kind::StateVector {
                    name: a,
                    start: s1,
                    len: n1,
                },
                Kind::StateVector {
                    name: b,
                    start: s2,
                    len: n2,
                },
            ) => a == b && s1 == s2 && n1 == n2,
            (Kind::Vector(a), Kind::Vector(b)) => vectors_equal(a, b),
            (
                Kind::LinearMap {
                    matrix: a,
                    child: x,
                },
                Kind::LinearMap {
                    matrix: b,
                    child: y,
                },
            ) => matrices_equal(a, b) && x == y,
            _ => false,
        }
    }
}

impl Eq for Kind {}

impl Hash for Kind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Kind::Scalar(x) => x.to_bits().hash(state),
            Kind::Time => {}
            Kind::Variable(name) | Kind::Parameter(name) | Kind::InputParameter(name) => {
                name.hash(state);
            }
            Kind::FunctionParameter { name, inputs } => {
                name.hash(state);
                inputs.hash(state);
            }
            Kind::Binary { op, left, right } => {
                op.hash(state);
                left.hash(state);
                right.hash(state);
            }
            Kind::Unary { op, child } => {
                op.hash(state);
                child.hash(state);
            }
            Kind::Reduce { op, child } => {
                op.hash(state);
                child.hash(state);
            }
            Kind::Spatial { op, child } => {
                op.hash(state);
                child.hash(state);
            }
            Kind::Broadcast(child) => child.hash(state),
            Kind::Concatenation(children) => children.hash(state),
            Kind::Function {
                function,
                args,
                partials,
            } => {
                // Functions are identified by their registration, not their name.
                Arc::as_ptr(function).hash(state);
                args.hash(state);
                partials.hash(state);
            }
            Kind::Interpolant {
                table,
                child,
                derivative,
            } => {
                table.hash(state);
                child.hash(state);
                derivative.hash(state);
            }
            Kind::StateVector { name, start, len } => {
                name.hash(state);
                start.hash(state);
                len.hash(state);
            }
            Kind::Vector(values) => {
                for x in values.iter() {
                    x.to_bits().hash(state);
                }
            }
            Kind::LinearMap { matrix, child } => {
                matrix.nrows().hash(state);
                matrix.ncols().hash(state);
                matrix.row_offsets().hash(state);
                matrix.col_indices().hash(state);
                for x in matrix.values() {
                    x.to_bits().hash(state);
                }
                child.hash(state);
            }
        }
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.domain == other.domain && self.kind == other.kind
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.domain.hash(state);
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Symbol]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Kind::Scalar(x) => write!(f, "{x}"),
            Kind::Time => f.write_str("t"),
            Kind::Variable(name) | Kind::Parameter(name) | Kind::InputParameter(name) => {
                f.write_str(name)
            }
            Kind::FunctionParameter { name, inputs } => {
                write!(f, "{name}(")?;
                write_list(f, inputs)?;
                f.write_str(")")
            }
            Kind::Binary { op, left, right } => write!(f, "({left} {} {right})", op.symbol()),
            Kind::Unary {
                op: UnaryOp::Neg,
                child,
            } => write!(f, "-{child}"),
            Kind::Unary { op, child } => write!(f, "{}({child})", op.name()),
            Kind::Reduce { child, .. } | Kind::Spatial { child, .. } | Kind::Broadcast(child) => {
                write!(f, "{}({child})", self.name())
            }
            Kind::Concatenation(children) => {
                f.write_str("concatenation(")?;
                write_list(f, children)?;
                f.write_str(")")
            }
            Kind::Function {
                function,
                args,
                partials,
            } => {
                if partials.is_empty() {
                    write!(f, "{}(", function.name())?;
                } else {
                    let wrt: Vec<String> = partials.iter().map(|p| format!("x{p}")).collect();
                    write!(f, "d{}/d{}(", function.name(), wrt.join("d"))?;
                }
                write_list(f, args)?;
                f.write_str(")")
            }
            Kind::Interpolant {
                table,
                child,
                derivative,
            } => {
                let prime = if *derivative { "'" } else { "" };
                write!(f, "{}{prime}({child})", table.name())
            }
            Kind::StateVector { start, len, .. } => write!(f, "y[{start}:{}]", start + len),
            Kind::Vector(values) => write!(f, "vector({})", values.len()),
            Kind::LinearMap { matrix, child } => {
                write!(f, "(matrix({}x{}) @ {child})", matrix.nrows(), matrix.ncols())
            }
        }
    }
}
