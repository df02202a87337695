use crate::error::RvError;
use crate::fit::convergence::gelman_rubin;
use crate::posterior::Posterior;

use ndarray::Array2;
use ordered_float::NotNan;
use rand::prelude::*;
use rand_distr::StandardNormal;
use rayon::prelude::*;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

/// Affine-invariant ensemble sampler with the stretch move.
///
/// Walkers are split into two halves; each half is updated in turn against
/// the complementary half, which keeps the update valid while letting every
/// proposal in a half be evaluated in parallel. Random draws happen
/// sequentially on the orchestrating thread, so runs with the same seed are
/// reproducible regardless of the thread pool.
///
/// After `nburn` steps the Gelman-Rubin statistic is checked every
/// `check_interval` steps over the post-burn portion of each walker's chain;
/// the run ends early once every free parameter is below `gr_threshold`.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename = "Mcmc")]
pub struct EnsembleSampler {
    pub nwalkers: usize,
    pub nburn: usize,
    pub check_interval: usize,
    pub gr_threshold: NotNan<f64>,
    pub init_scale: NotNan<f64>,
    pub seed: u64,
}

impl EnsembleSampler {
    /// Create a new [EnsembleSampler].
    ///
    /// # Arguments
    /// - `nwalkers`: ensemble size; raised to twice the free-parameter count
    ///   (and to the next even number) when too small
    /// - `nburn`: steps discarded from the front of every chain
    /// - `check_interval`: post-burn steps between convergence checks
    /// - `gr_threshold`: Gelman-Rubin value every parameter must reach
    /// - `init_scale`: relative scatter of the initial walker ball
    /// - `seed`: seed of the random number generator
    pub fn new(
        nwalkers: usize,
        nburn: usize,
        check_interval: usize,
        gr_threshold: f64,
        init_scale: f64,
        seed: u64,
    ) -> Self {
        assert!(nwalkers >= 2, "at least two walkers required");
        assert!(check_interval > 0, "check_interval must be positive");
        assert!(gr_threshold > 1.0, "gr_threshold must exceed unity");
        assert!(init_scale > 0.0, "init_scale must be positive");
        assert!(init_scale.is_finite(), "init_scale must be finite");
        Self {
            nwalkers,
            nburn,
            check_interval,
            gr_threshold: NotNan::new(gr_threshold).expect("gr_threshold must be not NaN"),
            init_scale: NotNan::new(init_scale).expect("init_scale must be not NaN"),
            seed,
        }
    }

    #[inline]
    pub fn default_nwalkers() -> usize {
        50
    }

    #[inline]
    pub fn default_nburn() -> usize {
        0
    }

    #[inline]
    pub fn default_check_interval() -> usize {
        50
    }

    #[inline]
    pub fn default_gr_threshold() -> f64 {
        1.01
    }

    #[inline]
    pub fn default_init_scale() -> f64 {
        1e-4
    }

    /// [EnsembleSampler::run_with_stop] without external cancellation.
    pub fn run(&self, post: &Posterior, nrun: usize) -> Result<McmcRun, RvError> {
        self.run_with_stop(post, nrun, &AtomicBool::new(false))
    }

    /// Sample the posterior for at most `nrun` steps, starting from a tight
    /// ball around the current parameter values.
    ///
    /// The stop flag is polled between steps; raising it from another thread
    /// finishes the run with [RunOutcome::Stopped] and the samples collected
    /// so far. The live parameter set is never mutated.
    pub fn run_with_stop(
        &self,
        post: &Posterior,
        nrun: usize,
        stop: &AtomicBool,
    ) -> Result<McmcRun, RvError> {
        const A: f64 = 2.0;

        let ndim = post.config().len();
        if ndim == 0 {
            return Err(RvError::DimensionMismatch {
                what: "free parameter configuration",
                expected: 1,
                actual: 0,
            });
        }
        let nwalkers = usize::max(self.nwalkers, 2 * ndim).next_multiple_of(2);
        let mut rng = StdRng::seed_from_u64(self.seed);

        let center = post.free_vector();
        let mut positions: Vec<Vec<f64>> = (0..nwalkers)
            .map(|_| {
                let mut x = center.clone();
                for (xi, &ci) in x.iter_mut().zip(&center) {
                    let scale = self.init_scale.into_inner() * f64::max(ci.abs(), 1.0);
                    while *xi == ci {
                        let eps: f64 = rng.sample(StandardNormal);
                        *xi = ci + scale * eps;
                    }
                }
                x
            })
            .collect();
        let mut ln_posts = Vec::with_capacity(nwalkers);
        for (walker, x) in positions.iter().enumerate() {
            let lnp = match post.ln_posterior_at(x) {
                Ok(lnp) => lnp,
                Err(RvError::NonFiniteInput { .. }) => {
                    return Err(RvError::InvalidStart { walker });
                }
                Err(e) => return Err(e),
            };
            if !lnp.is_finite() {
                return Err(RvError::InvalidStart { walker });
            }
            ln_posts.push(lnp);
        }

        let half = nwalkers / 2;
        // history[walker][step][dim], plus the matching log-posterior trace.
        let mut history: Vec<Vec<Vec<f64>>> = vec![Vec::with_capacity(nrun); nwalkers];
        let mut lnp_history: Vec<Vec<f64>> = vec![Vec::with_capacity(nrun); nwalkers];
        let mut gr_trace = Vec::new();
        let mut accepted = 0usize;
        let mut completed = 0usize;
        let mut outcome = RunOutcome::MaxStepsReached;

        'steps: for _ in 0..nrun {
            if stop.load(Ordering::Relaxed) {
                outcome = RunOutcome::Stopped { steps: completed };
                break 'steps;
            }

            for (lo, hi) in [(0, half), (half, nwalkers)] {
                let proposals: Vec<(Vec<f64>, f64)> = (lo..hi)
                    .map(|walker| {
                        let u: f64 = rng.random();
                        let z = ((A - 1.0) * u + 1.0).powi(2) / A;
                        let partner = if lo == 0 {
                            rng.random_range(half..nwalkers)
                        } else {
                            rng.random_range(0..half)
                        };
                        let x = &positions[walker];
                        let c = &positions[partner];
                        let y: Vec<f64> = x
                            .iter()
                            .zip(c)
                            .map(|(&xi, &ci)| ci + z * (xi - ci))
                            .collect();
                        (y, z)
                    })
                    .collect();
                let accept_draws: Vec<f64> = (lo..hi).map(|_| rng.random()).collect();

                let proposal_lnps: Vec<f64> = proposals
                    .par_iter()
                    .map(|(y, _)| post.ln_posterior_at(y).unwrap_or(f64::NEG_INFINITY))
                    .collect();

                for (offset, ((y, z), lnp_y)) in
                    proposals.into_iter().zip(proposal_lnps).enumerate()
                {
                    let walker = lo + offset;
                    let ln_accept =
                        (ndim as f64 - 1.0) * z.ln() + lnp_y - ln_posts[walker];
                    if accept_draws[offset].ln() <= ln_accept {
                        positions[walker] = y;
                        ln_posts[walker] = lnp_y;
                        accepted += 1;
                    }
                }
            }

            completed += 1;
            for walker in 0..nwalkers {
                history[walker].push(positions[walker].clone());
                lnp_history[walker].push(ln_posts[walker]);
            }

            if completed > self.nburn
                && completed - self.nburn >= 2
                && completed % self.check_interval == 0
            {
                let worst = (0..ndim)
                    .map(|dim| {
                        let chains: Vec<Vec<f64>> = history
                            .iter()
                            .map(|walk| {
                                walk[self.nburn..].iter().map(|x| x[dim]).collect()
                            })
                            .collect();
                        gelman_rubin(&chains)
                    })
                    .fold(f64::NEG_INFINITY, f64::max);
                gr_trace.push(worst);
                if worst < self.gr_threshold.into_inner() {
                    outcome = RunOutcome::Converged { steps: completed };
                    break 'steps;
                }
            }
        }

        let retained_steps = completed.saturating_sub(self.nburn);
        let nsamples = retained_steps * nwalkers;
        let mut samples = Array2::zeros((nsamples, ndim));
        let mut walker_idx = Vec::with_capacity(nsamples);
        let mut step_idx = Vec::with_capacity(nsamples);
        let mut ln_posterior = Vec::with_capacity(nsamples);
        let mut row = 0;
        for step in self.nburn..completed {
            for walker in 0..nwalkers {
                samples
                    .row_mut(row)
                    .iter_mut()
                    .zip(&history[walker][step])
                    .for_each(|(out, &x)| *out = x);
                walker_idx.push(walker);
                step_idx.push(step - self.nburn);
                ln_posterior.push(lnp_history[walker][step]);
                row += 1;
            }
        }

        let total_proposals = completed * nwalkers;
        let acceptance_fraction = if total_proposals == 0 {
            0.0
        } else {
            accepted as f64 / total_proposals as f64
        };

        Ok(McmcRun {
            param_names: post.config().free_names().to_vec(),
            samples,
            walker: walker_idx,
            step: step_idx,
            ln_posterior,
            gelman_rubin: gr_trace,
            acceptance_fraction,
            outcome,
        })
    }
}

impl Default for EnsembleSampler {
    fn default() -> Self {
        Self::new(
            Self::default_nwalkers(),
            Self::default_nburn(),
            Self::default_check_interval(),
            Self::default_gr_threshold(),
            Self::default_init_scale(),
            0,
        )
    }
}

/// How an [EnsembleSampler] run finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum RunOutcome {
    /// Every free parameter passed the Gelman-Rubin threshold.
    Converged { steps: usize },
    /// The step budget ran out before convergence.
    MaxStepsReached,
    /// The stop flag was raised between steps.
    Stopped { steps: usize },
}

/// Flattened post-burn chain of one sampler run.
///
/// `samples` has one row per retained walker position; `walker`, `step` and
/// `ln_posterior` are parallel to its rows. Columns follow `param_names`,
/// which is the posterior's free-parameter order.
#[derive(Clone, Debug)]
pub struct McmcRun {
    pub param_names: Vec<String>,
    pub samples: Array2<f64>,
    pub walker: Vec<usize>,
    pub step: Vec<usize>,
    pub ln_posterior: Vec<f64>,
    /// Worst-parameter Gelman-Rubin value at each convergence check.
    pub gelman_rubin: Vec<f64>,
    pub acceptance_fraction: f64,
    pub outcome: RunOutcome,
}

impl McmcRun {
    /// Posterior-mean of each free parameter over the retained samples.
    pub fn means(&self) -> Vec<f64> {
        let n = self.samples.nrows();
        if n == 0 {
            return vec![f64::NAN; self.samples.ncols()];
        }
        self.samples
            .columns()
            .into_iter()
            .map(|col| col.sum() / n as f64)
            .collect()
    }
}
