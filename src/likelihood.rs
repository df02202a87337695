use crate::error::RvError;
use crate::model::RvModel;
use crate::params::ParamSet;
use crate::types::CowArray1;

use itertools::izip;
use ndarray::Array1;
use std::f64::consts::TAU;

/// Observations of one instrument: epochs, velocities and per-point
/// measurement uncertainties.
///
/// Arrays are [CowArray1], so callers may either lend views for the duration
/// of a fit or hand over ownership. The `suffix` selects this instrument's
/// zero-point and jitter parameters (`gamma{suffix}`, `jit{suffix}`); use an
/// empty suffix for a single unnamed instrument.
#[derive(Clone, Debug)]
pub struct InstrumentData<'a> {
    suffix: String,
    t: CowArray1<'a, f64>,
    vel: CowArray1<'a, f64>,
    errvel: CowArray1<'a, f64>,
}

impl<'a> InstrumentData<'a> {
    pub fn new(
        suffix: impl Into<String>,
        t: impl Into<CowArray1<'a, f64>>,
        vel: impl Into<CowArray1<'a, f64>>,
        errvel: impl Into<CowArray1<'a, f64>>,
    ) -> Result<Self, RvError> {
        let (t, vel, errvel) = (t.into(), vel.into(), errvel.into());
        for (array, what) in [(&vel, "velocities"), (&errvel, "velocity uncertainties")] {
            if array.len() != t.len() {
                return Err(RvError::DimensionMismatch {
                    what,
                    expected: t.len(),
                    actual: array.len(),
                });
            }
        }
        if t.iter().any(|x| !x.is_finite()) {
            return Err(RvError::NonFiniteInput {
                what: "observation times",
            });
        }
        if vel.iter().any(|x| !x.is_finite()) || errvel.iter().any(|x| !x.is_finite()) {
            return Err(RvError::NonFiniteInput {
                what: "observed velocities",
            });
        }
        // Zero uncertainty with zero jitter would divide by zero downstream.
        if errvel.iter().any(|&x| x <= 0.0) {
            return Err(RvError::NonPositiveInput {
                what: "velocity uncertainties",
            });
        }
        Ok(Self {
            suffix: suffix.into(),
            t,
            vel,
            errvel,
        })
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }
}

/// Gaussian log-likelihood of one or more instruments under a shared
/// [RvModel], with a per-instrument velocity zero-point and a jitter term
/// added in quadrature to the measurement uncertainty.
#[derive(Clone, Debug)]
pub struct RvLikelihood<'a> {
    pub model: RvModel,
    instruments: Vec<InstrumentData<'a>>,
}

impl<'a> RvLikelihood<'a> {
    /// Combine a model with instrument datasets.
    ///
    /// Every instrument's `gamma{suffix}` and `jit{suffix}` must already be
    /// present in the model's parameter set; missing ones are
    /// [RvError::InvalidBasis] here rather than deep inside a fit.
    pub fn new(model: RvModel, instruments: Vec<InstrumentData<'a>>) -> Result<Self, RvError> {
        for inst in &instruments {
            model.params.gamma(&inst.suffix)?;
            model.params.jit(&inst.suffix)?;
        }
        Ok(Self { model, instruments })
    }

    /// Single-instrument convenience constructor with an empty suffix.
    pub fn single(
        model: RvModel,
        t: impl Into<CowArray1<'a, f64>>,
        vel: impl Into<CowArray1<'a, f64>>,
        errvel: impl Into<CowArray1<'a, f64>>,
    ) -> Result<Self, RvError> {
        let data = InstrumentData::new("", t, vel, errvel)?;
        Self::new(model, vec![data])
    }

    pub fn params(&self) -> &ParamSet {
        &self.model.params
    }

    pub fn params_mut(&mut self) -> &mut ParamSet {
        &mut self.model.params
    }

    pub fn instruments(&self) -> &[InstrumentData<'a>] {
        &self.instruments
    }

    /// `-1/2 sum[r^2 / (err^2 + jit^2) + ln(2 pi (err^2 + jit^2))]` summed
    /// over instruments, with `r = v - (model(t) + gamma)`.
    ///
    /// Negative or non-finite jitter is an input-contract violation
    /// ([RvError::NegativeJitter]), never clamped.
    pub fn log_likelihood(&self) -> Result<f64, RvError> {
        let mut lnlike = 0.0;
        for inst in &self.instruments {
            let gamma = self.model.params.gamma(&inst.suffix)?;
            if !gamma.is_finite() {
                return Err(RvError::NonFiniteParam {
                    name: format!("gamma{}", inst.suffix),
                    value: gamma,
                });
            }
            let jit = self.model.params.jit(&inst.suffix)?;
            if !(jit >= 0.0 && jit.is_finite()) {
                return Err(RvError::NegativeJitter {
                    name: format!("jit{}", inst.suffix),
                    value: jit,
                });
            }
            let predicted = self.model.evaluate(&inst.t)?;
            for (&vel, &errvel, &m) in izip!(&inst.vel, &inst.errvel, &predicted) {
                let residual = vel - (m + gamma);
                let variance = errvel * errvel + jit * jit;
                lnlike -= 0.5 * (residual * residual / variance + f64::ln(TAU * variance));
            }
        }
        Ok(lnlike)
    }

    /// Per-instrument residuals `v - (model(t) + gamma)`, for reporting.
    pub fn residuals(&self) -> Result<Vec<Array1<f64>>, RvError> {
        self.instruments
            .iter()
            .map(|inst| {
                let gamma = self.model.params.gamma(&inst.suffix)?;
                let predicted = self.model.evaluate(&inst.t)?;
                Ok(Array1::from_iter(
                    izip!(&inst.vel, &predicted).map(|(&v, &m)| v - (m + gamma)),
                ))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::Basis;
    use crate::params::Parameter;

    use approx::assert_relative_eq;
    use ndarray::array;
    use std::f64::consts::PI;

    fn circular_model(gamma: f64, jit: f64) -> RvModel {
        let mut params = ParamSet::new(1, Basis::TcSecoswSesinwLogk);
        params.insert("per1", Parameter::new(5.0));
        params.insert("tc1", Parameter::new(0.0));
        params.insert("secosw1", Parameter::fixed(0.0));
        params.insert("sesinw1", Parameter::fixed(0.0));
        params.insert("logk1", Parameter::new(f64::ln(10.0)));
        params.insert("gamma", Parameter::new(gamma));
        params.insert("jit", Parameter::new(jit));
        RvModel::new(params, 0.0).unwrap()
    }

    #[test]
    fn zero_residuals_leave_only_normalization() {
        // 3-point synthetic dataset lying exactly on the model: the
        // log-likelihood is the Gaussian normalization term alone.
        let t = array![0.0, 1.0, 2.0];
        let model = circular_model(0.0, 0.0);
        let vel = model.evaluate(&t).unwrap();
        let errvel = array![1.5, 2.0, 2.5];

        let like = RvLikelihood::single(model, t, vel, errvel.clone()).unwrap();
        let expected: f64 = errvel
            .iter()
            .map(|&e| -0.5 * f64::ln(2.0 * PI * e * e))
            .sum();
        assert_relative_eq!(like.log_likelihood().unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn jitter_inflates_variance_in_quadrature() {
        let t = array![0.0, 1.0, 2.0, 3.0];
        let model_no_jit = circular_model(0.0, 0.0);
        let vel = model_no_jit.evaluate(&t).unwrap() + 1.0;
        let errvel = array![1.0, 1.0, 1.0, 1.0];

        let like0 =
            RvLikelihood::single(model_no_jit, t.clone(), vel.clone(), errvel.clone()).unwrap();
        let like3 = RvLikelihood::single(circular_model(0.0, 3.0), t, vel, errvel).unwrap();

        let var = 1.0 + 9.0;
        let expected = 4.0 * (-0.5) * (1.0 / var + f64::ln(2.0 * PI * var));
        assert_relative_eq!(like3.log_likelihood().unwrap(), expected, epsilon = 1e-12);
        assert!(like3.log_likelihood().unwrap() > like0.log_likelihood().unwrap());
    }

    #[test]
    fn gamma_shifts_residuals() {
        let t = array![0.0, 0.7, 1.9];
        let model = circular_model(4.0, 0.0);
        let vel = {
            let clean = circular_model(0.0, 0.0);
            clean.evaluate(&t).unwrap() + 4.0
        };
        let like = RvLikelihood::single(model, t, vel, array![1.0, 1.0, 1.0]).unwrap();
        for r in &like.residuals().unwrap()[0] {
            assert_relative_eq!(*r, 0.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn negative_jitter_rejected() {
        let t = array![0.0, 1.0];
        let model = circular_model(0.0, -0.5);
        let like = RvLikelihood::single(model, t, array![0.0, 0.0], array![1.0, 1.0]).unwrap();
        assert_eq!(
            like.log_likelihood(),
            Err(RvError::NegativeJitter {
                name: "jit".into(),
                value: -0.5
            })
        );
    }

    #[test]
    fn nan_jitter_rejected() {
        let t = array![0.0, 1.0];
        let model = circular_model(0.0, f64::NAN);
        let like = RvLikelihood::single(model, t, array![0.0, 0.0], array![1.0, 1.0]).unwrap();
        assert!(matches!(
            like.log_likelihood(),
            Err(RvError::NegativeJitter { name, value }) if name == "jit" && value.is_nan()
        ));
    }

    #[test]
    fn non_finite_gamma_rejected() {
        let t = array![0.0, 1.0];
        let model = circular_model(f64::INFINITY, 0.0);
        let like = RvLikelihood::single(model, t, array![0.0, 0.0], array![1.0, 1.0]).unwrap();
        assert!(matches!(
            like.log_likelihood(),
            Err(RvError::NonFiniteParam { name, .. }) if name == "gamma"
        ));
    }

    #[test]
    fn non_positive_uncertainty_rejected() {
        assert!(matches!(
            InstrumentData::new("", array![0.0, 1.0], array![0.0, 0.0], array![1.0, 0.0]),
            Err(RvError::NonPositiveInput {
                what: "velocity uncertainties"
            })
        ));
    }

    #[test]
    fn length_mismatch_rejected() {
        assert!(matches!(
            InstrumentData::new("", array![0.0, 1.0], array![0.0], array![1.0, 1.0]),
            Err(RvError::DimensionMismatch {
                what: "velocities",
                expected: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn missing_instrument_params_rejected() {
        let mut model = circular_model(0.0, 0.0);
        model.params = {
            let mut p = ParamSet::new(1, Basis::TcSecoswSesinwLogk);
            for (name, param) in model.params.iter().filter(|(n, _)| *n != "jit") {
                p.insert(name, *param);
            }
            p
        };
        let t = array![0.0, 1.0];
        let data = InstrumentData::new("", t.clone(), array![0.0, 0.0], array![1.0, 1.0]).unwrap();
        assert!(matches!(
            RvLikelihood::new(model, vec![data]),
            Err(RvError::InvalidBasis { name, .. }) if name == "jit"
        ));
    }

    #[test]
    fn two_instruments_sum_and_use_own_nuisances() {
        let mut model = circular_model(0.0, 0.0);
        model.params.insert("gamma_a", Parameter::new(1.0));
        model.params.insert("jit_a", Parameter::new(0.0));
        model.params.insert("gamma_b", Parameter::new(-2.0));
        model.params.insert("jit_b", Parameter::new(0.0));

        let t = array![0.0, 1.0, 2.0];
        let clean = circular_model(0.0, 0.0).evaluate(&t).unwrap();
        let a = InstrumentData::new("_a", t.clone(), clean.clone() + 1.0, array![1.0, 1.0, 1.0])
            .unwrap();
        let b =
            InstrumentData::new("_b", t.clone(), clean - 2.0, array![2.0, 2.0, 2.0]).unwrap();
        let like = RvLikelihood::new(model, vec![a, b]).unwrap();

        let expected: f64 = [1.0, 1.0, 1.0, 2.0, 2.0, 2.0]
            .iter()
            .map(|&e: &f64| -0.5 * f64::ln(2.0 * PI * e * e))
            .sum();
        assert_relative_eq!(like.log_likelihood().unwrap(), expected, epsilon = 1e-10);
    }
}
