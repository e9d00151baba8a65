use std::{
    collections::HashMap,
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

/// A scalar function of scalar arguments.
pub type ScalarFn = Arc<dyn Fn(&[f64]) -> f64 + Send + Sync>;

/// Relative step for central-difference partial derivatives.
const FD_STEP: f64 = 6e-6;

/// A registered function such as a diffusivity or an open-circuit potential.
///
/// Analytic first partials may be attached. Partials without one, and all
/// higher partials, fall back to central differences.
#[derive(Clone)]
pub struct NamedFunction {
    name: String,
    arity: usize,
    eval: ScalarFn,
    partials: Vec<Option<ScalarFn>>,
}

impl NamedFunction {
    pub fn new(
        name: impl Into<String>,
        arity: usize,
        eval: impl Fn(&[f64]) -> f64 + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            arity,
            eval: Arc::new(eval),
            partials: vec![None; arity],
        }
    }

    /// Attaches the analytic partial derivative with respect to argument `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not less than the arity.
    #[must_use]
    pub fn with_partial(
        mut self,
        index: usize,
        partial: impl Fn(&[f64]) -> f64 + Send + Sync + 'static,
    ) -> Self {
        assert!(index < self.arity, "partial index out of range");
        self.partials[index] = Some(Arc::new(partial));
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn arity(&self) -> usize {
        self.arity
    }

    #[must_use]
    pub fn call(&self, args: &[f64]) -> f64 {
        (self.eval)(args)
    }

    /// Evaluates the mixed partial `∂/∂x_{p₁} … ∂/∂x_{pₖ}` at `args`.
    #[must_use]
    pub fn partial(&self, partials: &[usize], args: &[f64]) -> f64 {
        let Some((last, rest)) = partials.split_last() else {
            return self.call(args);
        };

        if rest.is_empty()
            && let Some(Some(analytic)) = self.partials.get(*last)
        {
            return analytic(args);
        }

        let h = FD_STEP * args[*last].abs().max(1.0);
        let mut plus = args.to_vec();
        let mut minus = args.to_vec();
        plus[*last] += h;
        minus[*last] -= h;
        (self.partial(rest, &plus) - self.partial(rest, &minus)) / (2.0 * h)
    }
}

impl fmt::Debug for NamedFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

/// Registered functions, looked up by name during parameter resolution.
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    functions: HashMap<String, Arc<NamedFunction>>,
}

impl FunctionTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a function under its own name, replacing any previous entry.
    pub fn register(&mut self, function: NamedFunction) -> &mut Self {
        self.functions
            .insert(function.name().to_owned(), Arc::new(function));
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<NamedFunction>> {
        self.functions.get(name).cloned()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Adds every function of `other`, keeping `other`'s entry on a clash.
    pub fn extend(&mut self, other: &FunctionTable) {
        self.functions
            .extend(other.functions.iter().map(|(k, v)| (k.clone(), Arc::clone(v))));
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    /// Hashes each name with the identity of the function registered under it.
    pub(crate) fn hash_identities<H: Hasher>(&self, state: &mut H) {
        let mut entries: Vec<_> = self.functions.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        for (name, function) in entries {
            name.hash(state);
            Arc::as_ptr(function).hash(state);
        }
    }
}
