//! Parameter values and their substitution into a [`System`](crate::System).
//!
//! A model refers to parameters by name. [`ParameterValues`] maps each name
//! to a [`ParameterValue`], and [`resolve`] replaces every reference with
//! the corresponding symbol, in dependency order.

mod error;
mod resolve;
mod values;

pub use error::ParameterError;
pub use resolve::{resolve, resolve_symbol};
pub use values::{FunctionHandle, ParameterValue, ParameterValues};
