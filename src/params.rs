use crate::basis::Basis;
use crate::error::RvError;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A single named fit parameter: its current value and whether it is free.
///
/// The `vary` flag is read once, when a [FitConfiguration](crate::FitConfiguration)
/// is built; it is never consulted during a running fit.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Parameter {
    pub value: f64,
    pub vary: bool,
}

impl Parameter {
    /// A free parameter.
    pub fn new(value: f64) -> Self {
        Self { value, vary: true }
    }

    /// A parameter held fixed during fitting.
    pub fn fixed(value: f64) -> Self {
        Self { value, vary: false }
    }
}

/// Insertion-ordered mapping from parameter names to [Parameter]s, with a
/// declared [Basis] and planet count.
///
/// Per-planet parameters are suffixed with the 1-based planet index
/// (`per1`, `tc1`, ..., `per2`, ...). Nuisance parameters use an instrument
/// suffix (`gamma`, `jit` for a single unnamed instrument, `gamma_hires` etc.
/// otherwise). The insertion order defines the free-vector order used by the
/// optimizer and the sampler.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ParamSet {
    basis: Basis,
    num_planets: usize,
    entries: Vec<(String, Parameter)>,
}

impl ParamSet {
    pub fn new(num_planets: usize, basis: Basis) -> Self {
        Self {
            basis,
            num_planets,
            entries: Vec::new(),
        }
    }

    pub fn basis(&self) -> Basis {
        self.basis
    }

    pub fn num_planets(&self) -> usize {
        self.num_planets
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a parameter, replacing the value of an existing one in place,
    /// keeping the original position in the ordering.
    pub fn insert(&mut self, name: impl Into<String>, param: Parameter) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, p)) => *p = param,
            None => self.entries.push((name, param)),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, p)| p)
    }

    fn missing(&self, name: &str) -> RvError {
        RvError::InvalidBasis {
            name: name.to_owned(),
            basis: self.basis.name(),
        }
    }

    /// Current value of a named parameter, [RvError::InvalidBasis] if absent.
    pub fn value(&self, name: &str) -> Result<f64, RvError> {
        self.get(name)
            .map(|p| p.value)
            .ok_or_else(|| self.missing(name))
    }

    /// Current value of a named parameter, or a default when absent.
    /// Used for the optional trend terms.
    pub fn value_or(&self, name: &str, default: f64) -> f64 {
        self.get(name).map_or(default, |p| p.value)
    }

    pub fn set_value(&mut self, name: &str, value: f64) -> Result<(), RvError> {
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, p)) => {
                p.value = value;
                Ok(())
            }
            None => Err(self.missing(name)),
        }
    }

    pub fn set_vary(&mut self, name: &str, vary: bool) -> Result<(), RvError> {
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, p)) => {
                p.vary = vary;
                Ok(())
            }
            None => Err(self.missing(name)),
        }
    }

    /// Parameters in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Parameter)> {
        self.entries.iter().map(|(n, p)| (n.as_str(), p))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Check that every parameter required by the declared basis is present
    /// for every declared planet.
    pub fn validate(&self) -> Result<(), RvError> {
        for planet in 1..=self.num_planets {
            for name in self.basis.required_names(planet) {
                if !self.contains(&name) {
                    return Err(self.missing(&name));
                }
            }
        }
        Ok(())
    }

    /// Lossless conversion of the whole set into another basis.
    ///
    /// Orbital parameters are rewritten slot by slot (carrying each slot's
    /// `vary` flag); trend and nuisance parameters are copied verbatim in
    /// their original order. Intended for display and alternate fitting
    /// strategies; the model always decodes the declared basis itself.
    pub fn to_basis(&self, basis: Basis) -> Result<ParamSet, RvError> {
        let mut out = ParamSet::new(self.num_planets, basis);
        for planet in 1..=self.num_planets {
            let synth = self.basis.to_synth(self, planet)?;
            let vary: Vec<bool> = self
                .basis
                .required_names(planet)
                .iter()
                .map(|name| self.value_of_vary(name))
                .collect::<Result<_, _>>()?;
            for ((name, value), vary) in basis
                .entries_from_synth(&synth, planet)?
                .into_iter()
                .zip(vary)
            {
                out.insert(name, Parameter { value, vary });
            }
        }
        let orbital: Vec<String> = (1..=self.num_planets)
            .flat_map(|planet| self.basis.required_names(planet))
            .collect();
        for (name, param) in &self.entries {
            if !orbital.iter().any(|n| n == name) {
                out.insert(name.clone(), *param);
            }
        }
        Ok(out)
    }

    fn value_of_vary(&self, name: &str) -> Result<bool, RvError> {
        self.get(name)
            .map(|p| p.vary)
            .ok_or_else(|| self.missing(name))
    }
}

macro_rules! planet_accessors {
    ($($fn_name:ident => $prefix:literal),* $(,)?) => {
        impl ParamSet {
            $(
                #[doc = concat!("`", $prefix, "{planet}` value for a 1-based planet index.")]
                pub fn $fn_name(&self, planet: usize) -> Result<f64, RvError> {
                    self.value(&format!(concat!($prefix, "{}"), planet))
                }
            )*
        }
    };
}

planet_accessors!(
    per => "per",
    tc => "tc",
    tp => "tp",
    e => "e",
    w => "w",
    k => "k",
    secosw => "secosw",
    sesinw => "sesinw",
    logk => "logk",
);

impl ParamSet {
    /// Velocity zero-point of the instrument with the given suffix.
    pub fn gamma(&self, suffix: &str) -> Result<f64, RvError> {
        self.value(&format!("gamma{suffix}"))
    }

    /// Jitter of the instrument with the given suffix.
    pub fn jit(&self, suffix: &str) -> Result<f64, RvError> {
        self.value(&format!("jit{suffix}"))
    }
}
