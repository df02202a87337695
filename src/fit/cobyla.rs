use crate::error::RvError;
use crate::posterior::Posterior;

use cobyla::{Func, RhoBeg, StopTols, minimize};
use ordered_float::NotNan;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Maximum-a-posteriori fit with COBYLA (Constrained Optimization BY Linear
/// Approximations).
///
/// COBYLA is derivative-free, which is the natural match for a posterior
/// whose model goes through an iterative Kepler solve. Box constraints for
/// the free parameters are taken from any
/// [HardBounds](crate::prior::HardBoundsPrior) priors attached to the
/// posterior; unconstrained parameters get infinite bounds.
///
/// The optimum is written back into the posterior's parameter set through
/// the same stable free-vector order the objective reads, so a subsequent
/// [EnsembleSampler](crate::EnsembleSampler) run starts from the fitted
/// values.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename = "Cobyla")]
pub struct CobylaFit {
    pub niterations: u32,
    pub rhobeg: NotNan<f64>,
    pub ftol_rel: NotNan<f64>,
}

impl CobylaFit {
    /// Create a new [CobylaFit].
    ///
    /// # Arguments
    /// - `niterations`: maximum number of objective evaluations
    /// - `rhobeg`: initial change to parameters (initial simplex size)
    /// - `ftol_rel`: relative tolerance on the objective for convergence
    pub fn new(niterations: u32, rhobeg: f64, ftol_rel: f64) -> Self {
        assert!(niterations > 0, "niterations must be positive");
        assert!(rhobeg > 0.0, "rhobeg must be positive");
        assert!(rhobeg.is_finite(), "rhobeg must be finite");
        assert!(ftol_rel >= 0.0, "ftol_rel must be non-negative");
        assert!(ftol_rel.is_finite(), "ftol_rel must be finite");
        Self {
            niterations,
            rhobeg: NotNan::new(rhobeg).expect("rhobeg must be finite and not NaN"),
            ftol_rel: NotNan::new(ftol_rel).expect("ftol_rel must be finite and not NaN"),
        }
    }

    #[inline]
    pub fn default_niterations() -> u32 {
        2000
    }

    #[inline]
    pub fn default_rhobeg() -> f64 {
        0.5
    }

    #[inline]
    pub fn default_ftol_rel() -> f64 {
        1e-9
    }

    /// Minimize the negative log-posterior over the free parameters and
    /// write the optimum back into `post`.
    pub fn fit(&self, post: &mut Posterior) -> Result<FitResult, RvError> {
        if post.config().is_empty() {
            return Err(RvError::DimensionMismatch {
                what: "free parameter configuration",
                expected: 1,
                actual: 0,
            });
        }

        let x0 = post.free_vector();
        let bounds: Vec<(f64, f64)> = post
            .config()
            .free_names()
            .iter()
            .map(|name| {
                post.priors()
                    .iter()
                    .find_map(|prior| prior.bounds_for(name))
                    .unwrap_or((f64::NEG_INFINITY, f64::INFINITY))
            })
            .collect();

        // Dimension mismatches cannot happen here (x comes from COBYLA with
        // x0's length), so any residual error collapses to a rejected point.
        let objective = {
            let post = &*post;
            move |x: &[f64], _user_data: &mut ()| -> f64 {
                post.neg_log_posterior(x).unwrap_or(f64::INFINITY)
            }
        };

        let constraints: Vec<&dyn Func<()>> = vec![];
        let stop_tol = StopTols {
            ftol_rel: self.ftol_rel.into(),
            ..StopTols::default()
        };

        let result = minimize(
            objective,
            &x0,
            &bounds,
            &constraints,
            (),
            self.niterations as usize,
            RhoBeg::All(self.rhobeg.into()),
            Some(stop_tol),
        );

        let (x, neg_ln_post, success) = match result {
            Ok((status, x, neg_ln_post)) => {
                let success = matches!(
                    status,
                    cobyla::SuccessStatus::Success
                        | cobyla::SuccessStatus::FtolReached
                        | cobyla::SuccessStatus::XtolReached
                );
                (x, neg_ln_post, success)
            }
            Err((_status, x, neg_ln_post)) => (x, neg_ln_post, false),
        };

        post.set_free_vector(&x)?;
        Ok(FitResult {
            x,
            ln_posterior: -neg_ln_post,
            success,
        })
    }
}

impl Default for CobylaFit {
    fn default() -> Self {
        Self::new(
            Self::default_niterations(),
            Self::default_rhobeg(),
            Self::default_ftol_rel(),
        )
    }
}

/// Outcome of a [CobylaFit::fit] run.
#[derive(Clone, Debug, PartialEq)]
pub struct FitResult {
    /// Optimal free vector, in configuration order.
    pub x: Vec<f64>,
    /// Log-posterior at the optimum.
    pub ln_posterior: f64,
    /// Whether the minimizer reported convergence.
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::Basis;
    use crate::likelihood::RvLikelihood;
    use crate::model::RvModel;
    use crate::params::{ParamSet, Parameter};
    use crate::prior::LnPrior;

    use approx::assert_abs_diff_eq;
    use ndarray::Array1;
    use rand::prelude::*;
    use rand_distr::StandardNormal;

    fn circular_params(k: f64, gamma: f64, jit: f64) -> ParamSet {
        let mut params = ParamSet::new(1, Basis::TcSecoswSesinwLogk);
        params.insert("per1", Parameter::fixed(5.0));
        params.insert("tc1", Parameter::fixed(0.0));
        params.insert("secosw1", Parameter::fixed(0.0));
        params.insert("sesinw1", Parameter::fixed(0.0));
        params.insert("logk1", Parameter::new(f64::ln(k)));
        params.insert("gamma", Parameter::new(gamma));
        params.insert("jit", Parameter::fixed(jit));
        params
    }

    #[test]
    fn recovers_amplitude_and_offset() {
        const N: usize = 120;
        const NOISE: f64 = 0.4;

        let mut rng = StdRng::seed_from_u64(0);
        let t = Array1::linspace(0.0, 30.0, N);
        let truth = RvModel::new(circular_params(10.0, 3.0, 0.0), 0.0).unwrap();
        let vel = truth.evaluate(&t).unwrap().mapv(|v| {
            let eps: f64 = rng.sample(StandardNormal);
            v + 3.0 + NOISE * eps
        });
        let errvel = Array1::from_elem(N, NOISE);

        // Start away from the truth.
        let model = RvModel::new(circular_params(6.0, 0.0, 0.0), 0.0).unwrap();
        let like = RvLikelihood::single(model, t, vel, errvel).unwrap();
        let mut post = Posterior::from_vary_flags(like, vec![]).unwrap();

        let result = CobylaFit::default().fit(&mut post).unwrap();
        assert!(result.success);
        assert_abs_diff_eq!(
            post.params().logk(1).unwrap(),
            f64::ln(10.0),
            epsilon = 0.05
        );
        assert_abs_diff_eq!(post.params().gamma("").unwrap(), 3.0, epsilon = 0.2);
        // Write-back and reported optimum agree.
        assert_eq!(post.free_vector(), result.x);
    }

    #[test]
    fn hard_bounds_become_box_constraints() {
        let t = Array1::linspace(0.0, 10.0, 30);
        let truth = RvModel::new(circular_params(10.0, 0.0, 0.0), 0.0).unwrap();
        let vel = truth.evaluate(&t).unwrap();
        let model = RvModel::new(circular_params(8.0, 0.5, 0.0), 0.0).unwrap();
        let like = RvLikelihood::single(model, t, vel, Array1::from_elem(30, 1.0)).unwrap();
        let mut post = Posterior::from_vary_flags(
            like,
            vec![LnPrior::hard_bounds("gamma", -1.0, 1.0)],
        )
        .unwrap();

        let result = CobylaFit::default().fit(&mut post).unwrap();
        let gamma = post.params().gamma("").unwrap();
        assert!((-1.0..=1.0).contains(&gamma), "gamma = {gamma}");
        assert!(result.ln_posterior.is_finite());
    }

    #[test]
    fn no_free_parameters_is_an_error() {
        let t = Array1::linspace(0.0, 10.0, 10);
        let mut params = circular_params(10.0, 0.0, 0.0);
        for name in ["logk1", "gamma"] {
            params.set_vary(name, false).unwrap();
        }
        let model = RvModel::new(params, 0.0).unwrap();
        let vel = model.evaluate(&t).unwrap();
        let like = RvLikelihood::single(model, t, vel, Array1::from_elem(10, 1.0)).unwrap();
        let mut post = Posterior::from_vary_flags(like, vec![]).unwrap();
        assert!(matches!(
            CobylaFit::default().fit(&mut post),
            Err(RvError::DimensionMismatch { .. })
        ));
    }
}
