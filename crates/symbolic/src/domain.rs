use std::fmt;

use serde::{Deserialize, Serialize};

/// An ordered list of named spatial subdomains.
///
/// The empty domain marks a domain-agnostic quantity, such as a scalar
/// parameter or time, which combines with any other domain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Domain(Vec<String>);

impl Domain {
    /// Creates a domain from subdomain names.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    /// The domain-agnostic domain.
    #[must_use]
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.0
    }

    /// Returns `true` if the two domains share any subdomain.
    #[must_use]
    pub fn overlaps(&self, other: &Domain) -> bool {
        self.0.iter().any(|name| other.0.contains(name))
    }

    /// The domain two operands combine onto, or `None` if they are incompatible.
    ///
    /// Equal domains combine onto themselves and the empty domain combines
    /// onto any other.
    #[must_use]
    pub fn combine(&self, other: &Domain) -> Option<Domain> {
        match (self.is_empty(), other.is_empty()) {
            (true, _) => Some(other.clone()),
            (_, true) => Some(self.clone()),
            _ if self == other => Some(self.clone()),
            _ => None,
        }
    }

    /// Concatenates domains in order.
    #[must_use]
    pub fn joined<'a>(parts: impl IntoIterator<Item = &'a Domain>) -> Domain {
        Domain(parts.into_iter().flat_map(|d| d.0.iter().cloned()).collect())
    }
}

impl From<&str> for Domain {
    fn from(name: &str) -> Self {
        Domain(vec![name.to_owned()])
    }
}

impl From<Vec<String>> for Domain {
    fn from(names: Vec<String>) -> Self {
        Domain(names)
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

/// One end of a one-dimensional domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => f.write_str("left"),
            Side::Right => f.write_str("right"),
        }
    }
}
