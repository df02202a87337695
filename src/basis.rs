//! Orbital parameter bases and conversions between them.
//!
//! Fitting is usually carried out in `per tc secosw sesinw logk`, which is
//! well-behaved near circular orbits and makes the semi-amplitude positive by
//! construction. The model itself always decodes whatever basis the
//! [ParamSet] declares into the synthesis parameters
//! (period, time of periastron, eccentricity, argument of periastron,
//! semi-amplitude) before evaluating the orbit.

use crate::error::RvError;
use crate::kepler::{timeperi_to_timetrans, timetrans_to_timeperi};
use crate::params::ParamSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameterization of a single Keplerian orbit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[non_exhaustive]
pub enum Basis {
    /// `per tc secosw sesinw logk`, the canonical fitting basis.
    #[serde(rename = "per tc secosw sesinw logk")]
    TcSecoswSesinwLogk,
    /// `per tc e w k`, physical eccentricity and argument of periastron.
    #[serde(rename = "per tc e w k")]
    TcEWK,
    /// `per tp e w k`, the synthesis basis the model evaluates in.
    #[serde(rename = "per tp e w k")]
    Synth,
}

/// Synthesis parameters of one planet, decoded from any [Basis].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SynthParams {
    pub per: f64,
    pub tp: f64,
    pub e: f64,
    pub w: f64,
    pub k: f64,
}

impl SynthParams {
    /// Reject non-physical orbits: `e` outside `[0, 1)`, non-positive or
    /// non-finite period, non-finite semi-amplitude, argument of periastron
    /// or periastron time. A non-finite `k` also arises from an overflowing
    /// `logk`, so it must surface before any model value is formed.
    pub fn validate(&self, planet: usize) -> Result<(), RvError> {
        if !(self.e >= 0.0 && self.e < 1.0) {
            return Err(RvError::InvalidOrbit {
                planet,
                ecc: self.e,
            });
        }
        if !(self.per > 0.0 && self.per.is_finite()) {
            return Err(RvError::InvalidPeriod {
                planet,
                per: self.per,
            });
        }
        if !self.k.is_finite() {
            return Err(RvError::InvalidAmplitude { planet, k: self.k });
        }
        if !self.w.is_finite() {
            return Err(RvError::NonFiniteParam {
                name: format!("w{planet}"),
                value: self.w,
            });
        }
        if !self.tp.is_finite() {
            return Err(RvError::NonFiniteParam {
                name: format!("tp{planet}"),
                value: self.tp,
            });
        }
        Ok(())
    }
}

impl Basis {
    pub fn name(self) -> &'static str {
        match self {
            Self::TcSecoswSesinwLogk => "per tc secosw sesinw logk",
            Self::TcEWK => "per tc e w k",
            Self::Synth => "per tp e w k",
        }
    }

    /// The five per-planet parameter prefixes of this basis, in basis order.
    pub fn letters(self) -> [&'static str; 5] {
        match self {
            Self::TcSecoswSesinwLogk => ["per", "tc", "secosw", "sesinw", "logk"],
            Self::TcEWK => ["per", "tc", "e", "w", "k"],
            Self::Synth => ["per", "tp", "e", "w", "k"],
        }
    }

    /// Suffixed parameter names required for a 1-based planet index.
    pub fn required_names(self, planet: usize) -> [String; 5] {
        self.letters().map(|letter| format!("{letter}{planet}"))
    }

    /// Decode one planet of `params` into synthesis parameters.
    ///
    /// Fails with [RvError::InvalidBasis] on missing names and with
    /// [RvError::InvalidOrbit]/[RvError::InvalidPeriod] on non-physical
    /// values. The eccentricity check runs before the conjunction-time
    /// conversion, which is undefined for `e >= 1`.
    pub fn to_synth(self, params: &ParamSet, planet: usize) -> Result<SynthParams, RvError> {
        let per = params.per(planet)?;
        match self {
            Self::TcSecoswSesinwLogk => {
                let tc = Self::finite_tc(params.tc(planet)?, planet)?;
                let secosw = params.secosw(planet)?;
                let sesinw = params.sesinw(planet)?;
                let k = f64::exp(params.logk(planet)?);
                let e = secosw * secosw + sesinw * sesinw;
                let w = if e == 0.0 {
                    0.0
                } else {
                    f64::atan2(sesinw, secosw)
                };
                let synth = SynthParams {
                    per,
                    tp: 0.0,
                    e,
                    w,
                    k,
                };
                synth.validate(planet)?;
                Ok(SynthParams {
                    tp: timetrans_to_timeperi(tc, per, e, w),
                    ..synth
                })
            }
            Self::TcEWK => {
                let tc = Self::finite_tc(params.tc(planet)?, planet)?;
                let e = params.e(planet)?;
                let w = params.w(planet)?;
                let k = params.k(planet)?;
                let synth = SynthParams {
                    per,
                    tp: 0.0,
                    e,
                    w,
                    k,
                };
                synth.validate(planet)?;
                Ok(SynthParams {
                    tp: timetrans_to_timeperi(tc, per, e, w),
                    ..synth
                })
            }
            Self::Synth => {
                let synth = SynthParams {
                    per,
                    tp: params.tp(planet)?,
                    e: params.e(planet)?,
                    w: params.w(planet)?,
                    k: params.k(planet)?,
                };
                synth.validate(planet)?;
                Ok(synth)
            }
        }
    }

    fn finite_tc(tc: f64, planet: usize) -> Result<f64, RvError> {
        if tc.is_finite() {
            Ok(tc)
        } else {
            Err(RvError::NonFiniteParam {
                name: format!("tc{planet}"),
                value: tc,
            })
        }
    }

    /// Encode synthesis parameters as the suffixed name/value pairs of this
    /// basis, in basis order.
    pub(crate) fn entries_from_synth(
        self,
        synth: &SynthParams,
        planet: usize,
    ) -> Result<[(String, f64); 5], RvError> {
        synth.validate(planet)?;
        let names = self.required_names(planet);
        let values = match self {
            Self::TcSecoswSesinwLogk => {
                if !(synth.k > 0.0) {
                    return Err(RvError::InvalidAmplitude { planet, k: synth.k });
                }
                let sqrt_e = f64::sqrt(synth.e);
                [
                    synth.per,
                    timeperi_to_timetrans(synth.tp, synth.per, synth.e, synth.w),
                    sqrt_e * f64::cos(synth.w),
                    sqrt_e * f64::sin(synth.w),
                    f64::ln(synth.k),
                ]
            }
            Self::TcEWK => [
                synth.per,
                timeperi_to_timetrans(synth.tp, synth.per, synth.e, synth.w),
                synth.e,
                synth.w,
                synth.k,
            ],
            Self::Synth => [synth.per, synth.tp, synth.e, synth.w, synth.k],
        };
        let mut names = names.into_iter();
        Ok(values.map(|v| (names.next().unwrap(), v)))
    }

    /// Derived eccentricity of one planet without a full synthesis decode.
    /// Used by the eccentricity prior on every posterior evaluation.
    pub fn eccentricity(self, params: &ParamSet, planet: usize) -> Result<f64, RvError> {
        match self {
            Self::TcSecoswSesinwLogk => {
                let secosw = params.secosw(planet)?;
                let sesinw = params.sesinw(planet)?;
                Ok(secosw * secosw + sesinw * sesinw)
            }
            Self::TcEWK | Self::Synth => params.e(planet),
        }
    }
}
