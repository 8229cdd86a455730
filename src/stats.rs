//! Statistics primitives: plug-in Shannon entropy and streaming mean/stdev.
//!
//! Both functions are pure and operate on iterators, so callers never have
//! to materialize intermediate collections.

/// Shannon entropy (base 2) of a multiset given by per-value occurrence counts.
///
/// Counts are conceptually non-negative. A zero or negative count contributes
/// nothing to the total, and its logarithm term is clamped to `log2(1) == 0`,
/// so stray zero entries are harmless.
///
/// Returns `0.0` when the total count is zero.
///
/// ```rust
/// use entrie::stats::entropy;
///
/// assert_eq!(entropy([1.0, 1.0]), 1.0);
/// assert_eq!(entropy([1.0]), 0.0);
/// assert!((entropy([1.0, 1.0, 0.0, 5.0, 2.0]) - 1.6577).abs() < 1e-4);
/// ```
pub fn entropy(counts: impl IntoIterator<Item = f64>) -> f64 {
    branch_entropy(counts.into_iter().map(|c| (c, false)))
}

/// Entropy over `(count, terminal)` branches.
///
/// A terminal branch of count `c` is counted as `c` unit-weight singleton
/// events: it contributes `c` to the total but nothing to the weighted log
/// sum. This treats closing a phrase as `c` distinct continuations rather
/// than one branch of mass `c`, without materializing the singletons.
pub fn branch_entropy(branches: impl IntoIterator<Item = (f64, bool)>) -> f64 {
    let mut total = 0.0;
    let mut psum = 0.0;
    for (count, terminal) in branches {
        total += count.max(0.0);
        if !terminal {
            psum += count * count.max(1.0).log2();
        }
    }
    if total == 0.0 {
        return 0.0;
    }
    total.log2() - psum / total
}

/// Single-pass mean and population standard deviation (Welford's method).
///
/// Returns `None` for an empty sequence; a single-element sequence yields a
/// standard deviation of `0.0`.
///
/// ```rust
/// use entrie::stats::mean_stdev;
///
/// assert_eq!(mean_stdev([1.0, 3.0]), Some((2.0, 1.0)));
/// assert_eq!(mean_stdev([2.0, 2.0]), Some((2.0, 0.0)));
/// assert_eq!(mean_stdev(std::iter::empty()), None);
/// ```
pub fn mean_stdev(values: impl IntoIterator<Item = f64>) -> Option<(f64, f64)> {
    let mut mean = 0.0;
    let mut q = 0.0;
    let mut k = 0u64;
    for v in values {
        k += 1;
        let old_mean = mean;
        mean += (v - mean) / k as f64;
        q += (v - old_mean) * (v - mean);
    }
    if k == 0 {
        return None;
    }
    Some((mean, (q / k as f64).sqrt()))
}
