#![doc = include_str!("../README.md")]

mod basis;
pub use basis::{Basis, SynthParams};

mod error;
pub use error::RvError;

pub mod fit;
pub use fit::{CobylaFit, EnsembleSampler, FitResult, McmcRun, RunOutcome};

pub mod kepler;

mod likelihood;
pub use likelihood::{InstrumentData, RvLikelihood};

mod model;
pub use model::RvModel;

mod params;
pub use params::{ParamSet, Parameter};

mod posterior;
pub use posterior::{FitConfiguration, Posterior};

pub mod prior;
pub use prior::{LnPrior, LnPriorTrait};

mod types;
pub use types::{ArrayRef1, CowArray1};

pub use ndarray;
