/// Enumerations naming the non-isotropic terms, pair variables, multiplicity bins and weight
/// kinds used throughout the analysis.
pub mod enums;

/// A helper method to get histogram edges from evenly-spaced `bins` over a given `range`
/// # See Also
/// [`get_bin_index`]
pub fn get_bin_edges(bins: usize, range: (f64, f64)) -> Vec<f64> {
    let bin_width = (range.1 - range.0) / (bins as f64);
    (0..=bins)
        .map(|i| range.0 + (i as f64 * bin_width))
        .collect()
}

/// A helper method to obtain the index of a bin where a value should go in a histogram with evenly
/// spaced `bins` over a given `range`
///
/// Values outside of `[limits.0, limits.1)` (and NaN) have no bin.
///
/// # See Also
/// [`get_bin_edges`]
pub fn get_bin_index(value: f64, bins: usize, limits: (f64, f64)) -> Option<usize> {
    if bins > 0 && value >= limits.0 && value < limits.1 {
        let bin_width = (limits.1 - limits.0) / bins as f64;
        let bin_index = ((value - limits.0) / bin_width).floor() as usize;
        Some(bin_index.min(bins - 1))
    } else {
        None
    }
}

/// The falling factorial $`M(M-1)\cdots(M-k+1)`$, the number of ordered `k`-tuples of distinct
/// particles out of `M`.
#[inline]
pub fn falling_factorial(m: f64, k: usize) -> f64 {
    (0..k).map(|i| m - i as f64).product()
}
