//! Priors over named fit parameters.
//!
//! Priors are composed into an immutable collection handed to
//! [Posterior::new](crate::Posterior::new); they reference parameters by name
//! and are validated against the parameter set at posterior construction, so
//! evaluation itself never fails: a violated bound is a `-inf` contribution.

use crate::error::RvError;
use crate::kepler::timeperi_to_timeeclipse;
use crate::params::ParamSet;

use enum_dispatch::enum_dispatch;
use ordered_float::NotNan;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

#[enum_dispatch]
pub trait LnPriorTrait: Clone {
    /// Natural logarithm of the prior density at the current parameter
    /// values; `-inf` rejects the point.
    fn ln_prior(&self, params: &ParamSet) -> f64;

    /// Check that every parameter this prior references exists in `params`.
    fn validate(&self, params: &ParamSet) -> Result<(), RvError>;
}

/// Natural logarithm of a prior on the radial-velocity fit parameters.
#[enum_dispatch(LnPriorTrait)]
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[non_exhaustive]
pub enum LnPrior {
    Gaussian(GaussianPrior),
    HardBounds(HardBoundsPrior),
    Eccentricity(EccentricityPrior),
    PositiveK(PositiveKPrior),
    SecondaryEclipse(SecondaryEclipsePrior),
}

impl LnPrior {
    pub fn gaussian(param: impl Into<String>, mu: f64, sigma: f64) -> Self {
        GaussianPrior::new(param, mu, sigma).into()
    }

    pub fn hard_bounds(param: impl Into<String>, lower: f64, upper: f64) -> Self {
        HardBoundsPrior::new(param, lower, upper).into()
    }

    pub fn eccentricity(planets: impl Into<Vec<usize>>, upper: f64) -> Self {
        EccentricityPrior::new(planets, upper).into()
    }

    pub fn positive_k(num_planets: usize) -> Self {
        PositiveKPrior::new(num_planets).into()
    }

    pub fn secondary_eclipse(planet: usize, ts: f64, ts_err: f64) -> Self {
        SecondaryEclipsePrior::new(planet, ts, ts_err).into()
    }

    /// If this prior is a hard bound on `param`, its `(lower, upper)` pair.
    /// The optimizer driver uses this to build box constraints.
    pub fn bounds_for(&self, param: &str) -> Option<(f64, f64)> {
        match self {
            Self::HardBounds(p) if p.param == param => {
                Some((p.lower.into_inner(), p.upper.into_inner()))
            }
            _ => None,
        }
    }
}

/// Gaussian prior on a single named parameter, normalization included.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct GaussianPrior {
    param: String,
    mu: NotNan<f64>,
    inv_sigma2: NotNan<f64>,
    ln_prob_coeff: NotNan<f64>,
}

impl GaussianPrior {
    pub fn new(param: impl Into<String>, mu: f64, sigma: f64) -> Self {
        Self {
            param: param.into(),
            mu: NotNan::new(mu).expect("mu must be not NaN"),
            inv_sigma2: NotNan::new(sigma.powi(-2)).expect("sigma must be positive and finite"),
            ln_prob_coeff: NotNan::new(-f64::ln(sigma) - 0.5 * f64::ln(TAU))
                .expect("sigma must be positive and finite"),
        }
    }
}

impl LnPriorTrait for GaussianPrior {
    fn ln_prior(&self, params: &ParamSet) -> f64 {
        let Ok(x) = params.value(&self.param) else {
            return f64::NEG_INFINITY;
        };
        let diff = x - self.mu.into_inner();
        self.ln_prob_coeff.into_inner() - 0.5 * diff * diff * self.inv_sigma2.into_inner()
    }

    fn validate(&self, params: &ParamSet) -> Result<(), RvError> {
        params.value(&self.param).map(|_| ())
    }
}

/// Flat prior inside `[lower, upper]`, `-inf` outside.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct HardBoundsPrior {
    param: String,
    lower: NotNan<f64>,
    upper: NotNan<f64>,
}

impl HardBoundsPrior {
    pub fn new(param: impl Into<String>, lower: f64, upper: f64) -> Self {
        assert!(lower < upper, "lower bound must be below upper bound");
        Self {
            param: param.into(),
            lower: NotNan::new(lower).expect("lower must be not NaN"),
            upper: NotNan::new(upper).expect("upper must be not NaN"),
        }
    }
}

impl LnPriorTrait for HardBoundsPrior {
    fn ln_prior(&self, params: &ParamSet) -> f64 {
        match params.value(&self.param) {
            Ok(x) if x >= self.lower.into_inner() && x <= self.upper.into_inner() => 0.0,
            _ => f64::NEG_INFINITY,
        }
    }

    fn validate(&self, params: &ParamSet) -> Result<(), RvError> {
        params.value(&self.param).map(|_| ())
    }
}

/// Keep the derived eccentricity of the listed planets inside `[0, upper)`.
///
/// The eccentricity is decoded from whichever basis the parameter set
/// declares. Contributes `-inf` exactly when `e >= upper` or `e < 0`, else 0.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct EccentricityPrior {
    planets: Vec<usize>,
    upper: NotNan<f64>,
}

impl EccentricityPrior {
    pub fn new(planets: impl Into<Vec<usize>>, upper: f64) -> Self {
        let planets = planets.into();
        assert!(!planets.is_empty(), "at least one planet index required");
        Self {
            planets,
            upper: NotNan::new(upper).expect("upper limit must be not NaN"),
        }
    }

    /// Apply the same limit to every planet of an N-planet set.
    pub fn all(num_planets: usize, upper: f64) -> Self {
        Self::new((1..=num_planets).collect::<Vec<_>>(), upper)
    }
}

impl LnPriorTrait for EccentricityPrior {
    fn ln_prior(&self, params: &ParamSet) -> f64 {
        for &planet in &self.planets {
            match params.basis().eccentricity(params, planet) {
                Ok(ecc) if ecc < self.upper.into_inner() && ecc >= 0.0 => {}
                _ => return f64::NEG_INFINITY,
            }
        }
        0.0
    }

    fn validate(&self, params: &ParamSet) -> Result<(), RvError> {
        for &planet in &self.planets {
            params.basis().eccentricity(params, planet)?;
        }
        Ok(())
    }
}

/// Reject negative semi-amplitudes.
///
/// Only meaningful in a `k` basis; in a `logk` basis the amplitude is
/// positive by construction and this prior is always satisfied.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct PositiveKPrior {
    num_planets: usize,
}

impl PositiveKPrior {
    pub fn new(num_planets: usize) -> Self {
        Self { num_planets }
    }

    fn k(params: &ParamSet, planet: usize) -> Result<f64, RvError> {
        params
            .k(planet)
            .or_else(|_| params.logk(planet).map(f64::exp))
    }
}

impl LnPriorTrait for PositiveKPrior {
    fn ln_prior(&self, params: &ParamSet) -> f64 {
        for planet in 1..=self.num_planets {
            match Self::k(params, planet) {
                Ok(k) if k >= 0.0 => {}
                _ => return f64::NEG_INFINITY,
            }
        }
        0.0
    }

    fn validate(&self, params: &ParamSet) -> Result<(), RvError> {
        for planet in 1..=self.num_planets {
            Self::k(params, planet)?;
        }
        Ok(())
    }
}

/// Gaussian constraint from a measured secondary-eclipse midpoint.
///
/// The model-implied eclipse time follows from the full orbital solution, so
/// this is an implicit prior on eccentricity and the argument of periastron.
/// Observed and implied times are compared in orbital phase with uncertainty
/// `ts_err / per`, making the constraint insensitive to which orbital cycle
/// the measurement fell in.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct SecondaryEclipsePrior {
    planet: usize,
    ts: NotNan<f64>,
    ts_err: NotNan<f64>,
}

impl SecondaryEclipsePrior {
    pub fn new(planet: usize, ts: f64, ts_err: f64) -> Self {
        assert!(ts.is_finite(), "eclipse time must be finite");
        assert!(
            ts_err > 0.0 && ts_err.is_finite(),
            "eclipse-time uncertainty must be positive and finite"
        );
        Self {
            planet,
            ts: NotNan::new(ts).expect("eclipse time must be not NaN"),
            ts_err: NotNan::new(ts_err).expect("eclipse-time uncertainty must be not NaN"),
        }
    }
}

impl LnPriorTrait for SecondaryEclipsePrior {
    fn ln_prior(&self, params: &ParamSet) -> f64 {
        let Ok(synth) = params.basis().to_synth(params, self.planet) else {
            return f64::NEG_INFINITY;
        };
        let ts_model = timeperi_to_timeeclipse(synth.tp, synth.per, synth.e, synth.w);
        let phase = |t: f64| ((t - synth.tp) / synth.per).rem_euclid(1.0);
        let dphase = phase(ts_model) - phase(self.ts.into_inner());
        let err_phase = self.ts_err.into_inner() / synth.per;
        -0.5 * (dphase / err_phase).powi(2)
    }

    fn validate(&self, params: &ParamSet) -> Result<(), RvError> {
        params.basis().to_synth(params, self.planet).map(|_| ())
    }
}
