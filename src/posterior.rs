use crate::error::RvError;
use crate::likelihood::RvLikelihood;
use crate::params::ParamSet;
use crate::prior::{LnPrior, LnPriorTrait};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The ordered list of free parameter names for one fit.
///
/// Built once, before the [Posterior]; the optimizer and the sampler both
/// address the free vector through this order, so getter and setter can never
/// disagree. This replaces live `vary`-flag mutation during a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FitConfiguration {
    free: Vec<String>,
}

impl FitConfiguration {
    pub fn new(free: impl Into<Vec<String>>) -> Self {
        Self { free: free.into() }
    }

    /// Free names from the `vary` flags, in parameter-set insertion order.
    pub fn from_vary_flags(params: &ParamSet) -> Self {
        Self {
            free: params
                .iter()
                .filter(|(_, p)| p.vary)
                .map(|(n, _)| n.to_owned())
                .collect(),
        }
    }

    pub fn free_names(&self) -> &[String] {
        &self.free
    }

    pub fn len(&self) -> usize {
        self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }
}

/// Log-posterior over the free parameters: likelihood plus an immutable
/// ordered collection of priors.
#[derive(Clone, Debug)]
pub struct Posterior<'a> {
    like: RvLikelihood<'a>,
    priors: Vec<LnPrior>,
    config: FitConfiguration,
}

impl<'a> Posterior<'a> {
    /// Compose likelihood, priors and the free-parameter configuration.
    ///
    /// Every prior's parameter references and every configured free name are
    /// checked against the likelihood's parameter set here, so evaluation
    /// never has to report a dangling name.
    pub fn new(
        like: RvLikelihood<'a>,
        priors: Vec<LnPrior>,
        config: FitConfiguration,
    ) -> Result<Self, RvError> {
        for prior in &priors {
            prior.validate(like.params())?;
        }
        for name in config.free_names() {
            like.params().value(name)?;
        }
        Ok(Self {
            like,
            priors,
            config,
        })
    }

    /// [Posterior::new] with the configuration taken from the `vary` flags.
    pub fn from_vary_flags(like: RvLikelihood<'a>, priors: Vec<LnPrior>) -> Result<Self, RvError> {
        let config = FitConfiguration::from_vary_flags(like.params());
        Self::new(like, priors, config)
    }

    pub fn like(&self) -> &RvLikelihood<'a> {
        &self.like
    }

    pub fn params(&self) -> &ParamSet {
        self.like.params()
    }

    pub fn config(&self) -> &FitConfiguration {
        &self.config
    }

    pub fn priors(&self) -> &[LnPrior] {
        &self.priors
    }

    /// Sum of all prior log-densities at the current parameter values.
    pub fn ln_prior(&self) -> f64 {
        self.priors
            .iter()
            .map(|p| p.ln_prior(self.like.params()))
            .sum()
    }

    pub fn log_likelihood(&self) -> Result<f64, RvError> {
        self.like.log_likelihood()
    }

    /// `ln_prior + log_likelihood` at the current parameter values.
    ///
    /// Priors are evaluated first; a `-inf` prior short-circuits without
    /// touching the model.
    pub fn log_posterior(&self) -> Result<f64, RvError> {
        let ln_prior = self.ln_prior();
        if ln_prior == f64::NEG_INFINITY {
            return Ok(f64::NEG_INFINITY);
        }
        Ok(ln_prior + self.like.log_likelihood()?)
    }

    /// Current values of the free parameters, in configuration order.
    pub fn free_vector(&self) -> Vec<f64> {
        self.config
            .free_names()
            .iter()
            .map(|name| {
                self.like
                    .params()
                    .value(name)
                    .expect("free names validated at construction")
            })
            .collect()
    }

    /// Write a free vector into the live parameter set, in configuration
    /// order. Only the orchestrating thread calls this; evaluation workers
    /// go through [Posterior::ln_posterior_at] snapshots instead.
    pub fn set_free_vector(&mut self, x: &[f64]) -> Result<(), RvError> {
        self.check_free_len(x)?;
        for (name, &value) in self.config.free_names().iter().zip(x) {
            self.like.params_mut().set_value(name, value)?;
        }
        Ok(())
    }

    fn check_free_len(&self, x: &[f64]) -> Result<(), RvError> {
        if x.len() != self.config.len() {
            return Err(RvError::DimensionMismatch {
                what: "free parameter vector",
                expected: self.config.len(),
                actual: x.len(),
            });
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(RvError::NonFiniteInput {
                what: "free parameter vector",
            });
        }
        Ok(())
    }

    /// Log-posterior at an arbitrary free vector, evaluated on an immutable
    /// snapshot of the parameter values; the live set is untouched.
    ///
    /// Length mismatches and non-finite inputs are caller bugs and error
    /// out; proposal-induced domain violations (`e >= 1`, negative jitter,
    /// an overflowing `logk`) are rejection events and come back as `-inf`.
    pub fn ln_posterior_at(&self, x: &[f64]) -> Result<f64, RvError> {
        self.check_free_len(x)?;
        let mut snapshot = self.clone();
        for (name, &value) in self.config.free_names().iter().zip(x) {
            snapshot.like.params_mut().set_value(name, value)?;
        }
        match snapshot.log_posterior() {
            Ok(ln_post) => Ok(ln_post),
            Err(
                RvError::InvalidOrbit { .. }
                | RvError::InvalidPeriod { .. }
                | RvError::InvalidAmplitude { .. }
                | RvError::NegativeJitter { .. },
            ) => Ok(f64::NEG_INFINITY),
            Err(e) => Err(e),
        }
    }

    /// Negated [Posterior::ln_posterior_at] with `-inf` mapped to `+inf`,
    /// the objective shape derivative-free minimizers expect.
    pub fn neg_log_posterior(&self, x: &[f64]) -> Result<f64, RvError> {
        Ok(-self.ln_posterior_at(x)?)
    }
}
