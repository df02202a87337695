//! Kepler's equation and anomaly conversions.
//!
//! These are the hot leaf functions of the radial-velocity model: they are
//! called once per observation epoch per planet on every posterior
//! evaluation. Input validation (finite mean anomaly, `0 <= e < 1`) is the
//! caller's responsibility.

use std::f64::consts::{PI, TAU};

/// Convergence tolerance on the Newton step of [solve_kepler].
pub const KEPLER_TOL: f64 = 1e-10;

/// Iteration cap of [solve_kepler]. On hitting it the current estimate is
/// returned, the evaluation is never aborted over a single hard epoch.
pub const KEPLER_MAX_ITER: usize = 30;

/// Solve Kepler's equation `M = E - e sin E` for the eccentric anomaly `E`.
///
/// Newton-Raphson with the Danby starter `E0 = M + 0.85 e sign(sin M)`.
/// Exact for circular orbits.
pub fn solve_kepler(mean_anom: f64, ecc: f64) -> f64 {
    if ecc == 0.0 {
        return mean_anom;
    }
    let mut e_anom = mean_anom + 0.85 * ecc * f64::sin(mean_anom).signum();
    for _ in 0..KEPLER_MAX_ITER {
        let f = e_anom - ecc * f64::sin(e_anom) - mean_anom;
        let fp = 1.0 - ecc * f64::cos(e_anom);
        let step = f / fp;
        e_anom -= step;
        if step.abs() < KEPLER_TOL {
            break;
        }
    }
    e_anom
}

/// True anomaly from eccentric anomaly.
pub fn true_anomaly(ecc_anom: f64, ecc: f64) -> f64 {
    2.0 * f64::atan(f64::sqrt((1.0 + ecc) / (1.0 - ecc)) * f64::tan(0.5 * ecc_anom))
}

/// Time of inferior conjunction (transit midpoint for a transiting geometry)
/// to time of periastron passage.
pub fn timetrans_to_timeperi(tc: f64, per: f64, ecc: f64, omega: f64) -> f64 {
    // True anomaly at inferior conjunction.
    let f = 0.5 * PI - omega;
    let ecc_anom = 2.0 * f64::atan(f64::tan(0.5 * f) * f64::sqrt((1.0 - ecc) / (1.0 + ecc)));
    tc - per / TAU * (ecc_anom - ecc * f64::sin(ecc_anom))
}

/// Inverse of [timetrans_to_timeperi].
pub fn timeperi_to_timetrans(tp: f64, per: f64, ecc: f64, omega: f64) -> f64 {
    let f = 0.5 * PI - omega;
    let ecc_anom = 2.0 * f64::atan(f64::tan(0.5 * f) * f64::sqrt((1.0 - ecc) / (1.0 + ecc)));
    tp + per / TAU * (ecc_anom - ecc * f64::sin(ecc_anom))
}

/// Time of the secondary eclipse following the periastron passage.
///
/// Same construction as [timeperi_to_timetrans] with the true anomaly of the
/// superior conjunction, `f = 3pi/2 - omega`; the eccentric anomaly is wrapped
/// into `[0, 2pi)` so the returned time always falls within one period after
/// `tp`.
pub fn timeperi_to_timeeclipse(tp: f64, per: f64, ecc: f64, omega: f64) -> f64 {
    let f = 1.5 * PI - omega;
    let mut ecc_anom =
        2.0 * f64::atan(f64::tan(0.5 * f) * f64::sqrt((1.0 - ecc) / (1.0 + ecc)));
    if ecc_anom < 0.0 {
        ecc_anom += TAU;
    }
    tp + per / TAU * (ecc_anom - ecc * f64::sin(ecc_anom))
}

/// Radial-velocity contribution of a single Keplerian orbit at time `t`.
///
/// `tp`, `t` and `per` must share units; `omega` is the argument of
/// periastron of the star's orbit.
pub fn rv_at(t: f64, per: f64, tp: f64, ecc: f64, omega: f64, k: f64) -> f64 {
    let phase = ((t - tp) / per).rem_euclid(1.0);
    let mean_anom = TAU * phase;
    let ecc_anom = solve_kepler(mean_anom, ecc);
    let nu = true_anomaly(ecc_anom, ecc);
    k * (f64::cos(nu + omega) + ecc * f64::cos(omega))
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    #[test]
    fn circular_orbit_is_exact() {
        for m in [-7.3, -1.0, 0.0, 0.5, 2.0 * PI, 13.7] {
            assert_eq!(solve_kepler(m, 0.0), m);
        }
    }

    #[test]
    fn solution_satisfies_kepler_equation() {
        for &ecc in &[0.01, 0.1, 0.3, 0.7, 0.95, 0.99] {
            for i in 0..32 {
                let mean_anom = TAU * (i as f64) / 32.0;
                let e_anom = solve_kepler(mean_anom, ecc);
                assert_relative_eq!(
                    e_anom - ecc * f64::sin(e_anom),
                    mean_anom,
                    epsilon = 1e-9,
                );
            }
        }
    }

    #[test]
    fn true_anomaly_circular() {
        for m in [0.1, 1.0, 2.5] {
            assert_relative_eq!(true_anomaly(m, 0.0), m, epsilon = 1e-12);
        }
    }

    #[test]
    fn tc_tp_round_trip() {
        let per = 42.3;
        for &ecc in &[0.0, 0.1, 0.5, 0.9] {
            for &omega in &[0.0, 0.7, 2.0, 4.5] {
                let tc = 2455812.5;
                let tp = timetrans_to_timeperi(tc, per, ecc, omega);
                assert_relative_eq!(
                    timeperi_to_timetrans(tp, per, ecc, omega),
                    tc,
                    epsilon = 1e-8,
                );
            }
        }
    }

    #[test]
    fn circular_tc_is_quarter_period_after_tp() {
        // For e = 0 the conjunction happens a quarter period after periastron
        // when omega = 0.
        let per = 10.0;
        let tp = timetrans_to_timeperi(100.0, per, 0.0, 0.0);
        assert_relative_eq!(100.0 - tp, per / 4.0, epsilon = 1e-12);
    }

    #[test]
    fn circular_eclipse_is_half_period_after_transit() {
        let per = 10.0;
        let tc = 100.0;
        let tp = timetrans_to_timeperi(tc, per, 0.0, 0.0);
        let ts = timeperi_to_timeeclipse(tp, per, 0.0, 0.0);
        assert_relative_eq!(ts - tc, per / 2.0, epsilon = 1e-10);
    }

    #[test]
    fn eclipse_falls_within_one_period_of_periastron() {
        let per = 7.3;
        let tp = 12.0;
        for &ecc in &[0.0, 0.2, 0.6, 0.9] {
            for &omega in &[0.0, 1.0, 2.5, 4.0, 5.9] {
                let ts = timeperi_to_timeeclipse(tp, per, ecc, omega);
                assert!(
                    (0.0..per).contains(&(ts - tp)),
                    "ts - tp = {} for e = {ecc}, w = {omega}",
                    ts - tp
                );
            }
        }
    }

    #[test]
    fn circular_rv_is_sinusoid() {
        // closed form: K cos(2 pi (t - tc) / P + pi / 2)
        let (per, tc, k) = (5.0, 1.5, 10.0);
        let tp = timetrans_to_timeperi(tc, per, 0.0, 0.0);
        for i in 0..100 {
            let t = -3.0 + 0.17 * i as f64;
            let expected = k * f64::cos(TAU * (t - tc) / per + 0.5 * PI);
            assert_relative_eq!(
                rv_at(t, per, tp, 0.0, 0.0, k),
                expected,
                epsilon = 1e-8,
            );
        }
    }

    #[test]
    fn rv_extrema_bounded_by_amplitude_factor() {
        // |RV - K e cos(w)| <= K for any eccentric orbit.
        let (per, tp, ecc, omega, k) = (3.1, 0.4, 0.6, 1.1, 25.0);
        for i in 0..200 {
            let t = 0.05 * i as f64;
            let rv = rv_at(t, per, tp, ecc, omega, k);
            assert!((rv - k * ecc * f64::cos(omega)).abs() <= k * (1.0 + 1e-12));
        }
    }
}
