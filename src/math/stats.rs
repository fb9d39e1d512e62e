//! Replicate summary statistics.

/// Mean and population standard deviation (divisor `n`, not `n - 1`).
///
/// The sum is shifted by the first value, so a slice of identical readings
/// returns exactly that reading and a deviation of exactly zero.
pub fn mean_and_population_std(values: &[f64]) -> Option<(f64, f64)> {
    let (&shift, _) = values.split_first()?;
    let n = values.len() as f64;

    let mean = shift + values.iter().map(|v| v - shift).sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

    Some((mean, var.sqrt()))
}
