/// Gelman-Rubin potential scale reduction factor over per-walker chains of a
/// single parameter.
///
/// Returns `inf` when there is not enough data to form the statistic (fewer
/// than two chains or two samples per chain), so callers can treat any
/// non-finite value as "not converged yet".
pub(crate) fn gelman_rubin(chains: &[Vec<f64>]) -> f64 {
    let m = chains.len();
    if m < 2 {
        return f64::INFINITY;
    }
    let n = chains[0].len();
    if n < 2 || chains.iter().any(|c| c.len() != n) {
        return f64::INFINITY;
    }

    let nf = n as f64;
    let means: Vec<f64> = chains
        .iter()
        .map(|c| c.iter().sum::<f64>() / nf)
        .collect();
    let within = chains
        .iter()
        .zip(&means)
        .map(|(c, &mean)| c.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / (nf - 1.0))
        .sum::<f64>()
        / m as f64;

    let grand_mean = means.iter().sum::<f64>() / m as f64;
    let between_over_n = means
        .iter()
        .map(|&x| (x - grand_mean).powi(2))
        .sum::<f64>()
        / (m as f64 - 1.0);

    if within == 0.0 {
        return if between_over_n == 0.0 {
            1.0
        } else {
            f64::INFINITY
        };
    }

    let var_plus = (nf - 1.0) / nf * within + between_over_n;
    f64::sqrt(var_plus / within)
}
