use crate::error::RvError;
use crate::kepler::rv_at;
use crate::params::ParamSet;
use crate::types::ArrayRef1;

use ndarray::Array1;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// N-planet Keplerian radial-velocity model with optional linear and
/// quadratic trend terms.
///
/// `time_base` is subtracted from every epoch before any trigonometric
/// argument is formed, so that absolute Julian dates keep full precision in
/// the orbital phase. The trend terms `dvdt` and `curv` are anchored at
/// `time_base` and default to zero when absent from the parameter set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RvModel {
    pub params: ParamSet,
    pub time_base: f64,
}

impl RvModel {
    /// Build a model over a validated parameter set.
    ///
    /// Fails with [RvError::InvalidBasis] if any parameter required by the
    /// declared basis and planet count is missing, and with
    /// [RvError::NonFiniteInput] on a non-finite `time_base`.
    pub fn new(params: ParamSet, time_base: f64) -> Result<Self, RvError> {
        if !time_base.is_finite() {
            return Err(RvError::NonFiniteInput { what: "time_base" });
        }
        params.validate()?;
        Ok(Self { params, time_base })
    }

    /// Predicted stellar radial velocity at the given epochs.
    pub fn evaluate(&self, t: &ArrayRef1<f64>) -> Result<Array1<f64>, RvError> {
        if t.iter().any(|x| !x.is_finite()) {
            return Err(RvError::NonFiniteInput {
                what: "model evaluation times",
            });
        }

        let shifted = t.mapv(|x| x - self.time_base);
        let mut rv = Array1::<f64>::zeros(t.len());

        let basis = self.params.basis();
        for planet in 1..=self.params.num_planets() {
            let synth = basis.to_synth(&self.params, planet)?;
            // Keep the periastron epoch in the shifted frame as well.
            let tp = synth.tp - self.time_base;
            for (out, &ts) in rv.iter_mut().zip(&shifted) {
                *out += rv_at(ts, synth.per, tp, synth.e, synth.w, synth.k);
            }
        }

        let dvdt = self.params.value_or("dvdt", 0.0);
        let curv = self.params.value_or("curv", 0.0);
        for (name, value) in [("dvdt", dvdt), ("curv", curv)] {
            if !value.is_finite() {
                return Err(RvError::NonFiniteParam {
                    name: name.to_owned(),
                    value,
                });
            }
        }
        if dvdt != 0.0 || curv != 0.0 {
            for (out, &ts) in rv.iter_mut().zip(&shifted) {
                *out += dvdt * ts + curv * ts * ts;
            }
        }

        Ok(rv)
    }
}
