//! Fitting drivers over a [Posterior](crate::Posterior): a derivative-free
//! MAP optimizer and an affine-invariant ensemble MCMC sampler.

mod convergence;

pub mod cobyla;
pub use cobyla::{CobylaFit, FitResult};

pub mod mcmc;
pub use mcmc::{EnsembleSampler, McmcRun, RunOutcome};
