use std::{
    collections::{BTreeMap, hash_map::DefaultHasher},
    fs,
    hash::{Hash, Hasher},
    path::Path,
    sync::Arc,
};

use indexmap::IndexMap;
use serde::Deserialize;

use crate::{FunctionTable, Symbol, TableLookup};

use super::ParameterError;

/// The name of a function registered in a [`FunctionTable`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionHandle(pub String);

impl From<&str> for FunctionHandle {
    fn from(name: &str) -> Self {
        Self(name.to_owned())
    }
}

/// What a parameter resolves to.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    Constant(f64),
    /// A subtree, which may reference other parameters.
    Expression(Symbol),
    /// Looked up at time for plain parameters, or at the first input.
    Table(Arc<TableLookup>),
    /// Called with time for plain parameters, or with the inputs.
    Function(FunctionHandle),
    /// Kept symbolic and supplied at solve time.
    Input,
}

impl From<f64> for ParameterValue {
    fn from(value: f64) -> Self {
        Self::Constant(value)
    }
}

impl From<Symbol> for ParameterValue {
    fn from(symbol: Symbol) -> Self {
        Self::Expression(symbol)
    }
}

impl From<TableLookup> for ParameterValue {
    fn from(table: TableLookup) -> Self {
        Self::Table(Arc::new(table))
    }
}

impl From<FunctionHandle> for ParameterValue {
    fn from(handle: FunctionHandle) -> Self {
        Self::Function(handle)
    }
}

impl Hash for ParameterValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            ParameterValue::Constant(x) => x.to_bits().hash(state),
            ParameterValue::Expression(symbol) => symbol.hash(state),
            ParameterValue::Table(table) => table.hash(state),
            ParameterValue::Function(handle) => handle.hash(state),
            ParameterValue::Input => {}
        }
    }
}

/// A named set of parameter values plus the functions they may refer to.
#[derive(Debug, Clone, Default)]
pub struct ParameterValues {
    values: IndexMap<String, ParameterValue>,
    functions: FunctionTable,
}

#[derive(Debug, Deserialize)]
struct ParameterFile {
    parameters: BTreeMap<String, f64>,
}

impl ParameterValues {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_functions(mut self, functions: FunctionTable) -> Self {
        self.functions = functions;
        self
    }

    /// Parses a flat `[parameters]` table of names to numbers.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::Parse`] if the text is not such a table.
    pub fn from_toml_str(text: &str) -> Result<Self, ParameterError> {
        let file: ParameterFile = toml::from_str(text)?;
        let mut values = Self::new();
        for (name, value) in file.parameters {
            values.set(name, value);
        }
        Ok(values)
    }

    /// Reads a parameter table from an explicit path.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ParameterError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ParameterError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Sets one value, replacing any previous one.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<ParameterValue>) -> &mut Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Overrides entries with `other`'s values and adds its functions.
    pub fn update(&mut self, other: &ParameterValues) -> &mut Self {
        for (name, value) in &other.values {
            self.values.insert(name.clone(), value.clone());
        }
        self.functions.extend(&other.functions);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.values.get(name)
    }

    /// The constant value of `name`, if it is one.
    #[must_use]
    pub fn constant(&self, name: &str) -> Option<f64> {
        match self.values.get(name) {
            Some(ParameterValue::Constant(x)) => Some(*x),
            _ => None,
        }
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    #[must_use]
    pub fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    pub fn functions_mut(&mut self) -> &mut FunctionTable {
        &mut self.functions
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParameterValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// A hash of the values, independent of insertion order.
    ///
    /// Registered functions are identified by their registration, so
    /// re-registering a name with a new body changes the hash while clones
    /// of these values keep it.
    #[must_use]
    pub fn structural_hash(&self) -> u64 {
        let mut entries: Vec<_> = self.values.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        let mut hasher = DefaultHasher::new();
        for (name, value) in entries {
            name.hash(&mut hasher);
            value.hash(&mut hasher);
        }
        self.functions.hash_identities(&mut hasher);
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::NamedFunction;

    fn with_ocp(slope: f64) -> ParameterValues {
        let mut functions = FunctionTable::new();
        functions.register(NamedFunction::new("ocp", 1, move |x| slope * x[0]));
        let mut values = ParameterValues::new().with_functions(functions);
        values.set("OCP [V]", ParameterValue::Function(FunctionHandle::from("ocp")));
        values
    }

    #[test]
    fn function_bodies_are_part_of_the_hash() {
        let first = with_ocp(1.0);
        let second = with_ocp(2.0);
        assert_ne!(first.structural_hash(), second.structural_hash());
        assert_eq!(first.structural_hash(), first.clone().structural_hash());
    }

    #[test]
    fn loads_a_flat_toml_table() {
        let values = ParameterValues::from_toml_str(
            r#"
            [parameters]
            "Typical current [A]" = 1.0
            "Separator thickness [m]" = 2.5e-5
            "#,
        )
        .unwrap();

        assert_eq!(values.len(), 2);
        assert_eq!(values.constant("Typical current [A]"), Some(1.0));
    }

    #[test]
    fn rejects_non_numeric_entries() {
        let err = ParameterValues::from_toml_str("[parameters]\nname = \"text\"").unwrap_err();
        assert!(matches!(err, ParameterError::Parse(_)));
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = ParameterValues::from_path("/definitely/not/here.toml").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.toml"));
    }

    #[test]
    fn update_overrides_and_hash_ignores_order() {
        let mut a = ParameterValues::new();
        a.set("x", 1.0).set("y", 2.0);
        let mut b = ParameterValues::new();
        b.set("y", 2.0).set("x", 1.0);
        assert_eq!(a.structural_hash(), b.structural_hash());

        let mut overrides = ParameterValues::new();
        overrides.set("x", ParameterValue::Input);
        a.update(&overrides);
        assert_eq!(a.get("x"), Some(&ParameterValue::Input));
        assert_ne!(a.structural_hash(), b.structural_hash());
    }
}
