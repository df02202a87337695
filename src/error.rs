/// Error returned from model, likelihood, posterior and sampler construction
/// and evaluation.
///
/// Malformed input (missing basis parameters, mismatched array lengths,
/// non-finite observations) is reported eagerly; numerical non-convergence of
/// the Kepler solver is not an error and degrades to the best estimate at the
/// iteration cap.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RvError {
    #[error("parameter `{name}` required by basis `{basis}` is missing")]
    InvalidBasis { name: String, basis: &'static str },

    #[error("planet {planet} has eccentricity {ecc} outside [0, 1)")]
    InvalidOrbit { planet: usize, ecc: f64 },

    #[error("planet {planet} has non-positive period {per}")]
    InvalidPeriod { planet: usize, per: f64 },

    #[error("planet {planet} has non-positive or non-finite semi-amplitude {k}")]
    InvalidAmplitude { planet: usize, k: f64 },

    #[error("walker {walker} starts with a non-finite log-posterior")]
    InvalidStart { walker: usize },

    #[error("{what}: expected length {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{what} contains a non-finite value")]
    NonFiniteInput { what: &'static str },

    #[error("parameter `{name}` has non-finite value {value}")]
    NonFiniteParam { name: String, value: f64 },

    #[error("{what} must be positive")]
    NonPositiveInput { what: &'static str },

    #[error("jitter parameter `{name}` must be non-negative and finite, got {value}")]
    NegativeJitter { name: String, value: f64 },
}
