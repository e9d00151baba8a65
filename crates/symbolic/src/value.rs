use std::fmt;

use nalgebra::DVector;

/// The result of evaluating a symbol: a scalar or a vector.
///
/// Binary operations broadcast a scalar, or a vector of length one, against
/// a vector of any length.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(f64),
    Vector(DVector<f64>),
}

impl Value {
    /// Number of entries, with a scalar counting as one.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Value::Scalar(_) => 1,
            Value::Vector(v) => v.len(),
        }
    }

    /// Returns `true` for an empty vector.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The single entry of a scalar or a length-one vector.
    #[must_use]
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar(x) => Some(*x),
            Value::Vector(v) if v.len() == 1 => Some(v[0]),
            Value::Vector(_) => None,
        }
    }

    /// Entry `i`, broadcasting length-one values.
    #[must_use]
    pub fn get(&self, i: usize) -> f64 {
        match self {
            Value::Scalar(x) => *x,
            Value::Vector(v) if v.len() == 1 => v[0],
            Value::Vector(v) => v[i],
        }
    }

    /// Expands to a vector of length `len`, broadcasting length-one values.
    #[must_use]
    pub fn to_vector(&self, len: usize) -> DVector<f64> {
        DVector::from_fn(len, |i, _| self.get(i))
    }

    #[must_use]
    pub fn into_vector(self) -> DVector<f64> {
        match self {
            Value::Scalar(x) => DVector::from_element(1, x),
            Value::Vector(v) => v,
        }
    }

    /// Iterates over the entries.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.len()).map(|i| self.get(i))
    }

    /// Applies `f` to every entry.
    #[must_use]
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Value {
        match self {
            Value::Scalar(x) => Value::Scalar(f(*x)),
            Value::Vector(v) => Value::Vector(v.map(f)),
        }
    }

    /// Applies a fallible `f` to every entry.
    pub(crate) fn try_map<E>(&self, f: impl Fn(f64) -> Result<f64, E>) -> Result<Value, E> {
        match self {
            Value::Scalar(x) => Ok(Value::Scalar(f(*x)?)),
            Value::Vector(v) => {
                let mapped = v.iter().map(|x| f(*x)).collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Vector(DVector::from_vec(mapped)))
            }
        }
    }

    /// Length two values broadcast to, or `None` if they cannot.
    #[must_use]
    pub fn broadcast_len(&self, other: &Value) -> Option<usize> {
        match (self.len(), other.len()) {
            (a, b) if a == b => Some(a),
            (1, b) => Some(b),
            (a, 1) => Some(a),
            _ => None,
        }
    }

    /// Combines two values entrywise with broadcasting.
    ///
    /// Two scalars give a scalar. Returns `None` on a length mismatch.
    #[must_use]
    pub fn zip_with(&self, other: &Value, f: impl Fn(f64, f64) -> f64) -> Option<Value> {
        if let (Value::Scalar(a), Value::Scalar(b)) = (self, other) {
            return Some(Value::Scalar(f(*a, *b)));
        }
        let len = self.broadcast_len(other)?;
        Some(Value::Vector(DVector::from_fn(len, |i, _| {
            f(self.get(i), other.get(i))
        })))
    }

    /// Returns `true` if every entry is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.iter().all(f64::is_finite)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Scalar(x)
    }
}

impl From<DVector<f64>> for Value {
    fn from(v: DVector<f64>) -> Self {
        Value::Vector(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Scalar(x) => write!(f, "{x}"),
            Value::Vector(v) => {
                let entries: Vec<String> = v.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", entries.join(", "))
            }
        }
    }
}
