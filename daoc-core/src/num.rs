//! Tolerance-based comparisons for accumulated floating-point weights.
//!
//! Sums of link weights accumulate rounding error proportional to the number
//! of accumulated elements, so equality and ordering take that count as an
//! explicit parameter.

/// Comparison tolerance for values accumulated over `count` elements.
#[inline]
#[must_use]
pub fn eps(count: usize) -> f64 {
    f64::EPSILON * 4.0 * count.max(1) as f64
}

/// Whether `a` and `b` are equal within the tolerance of `count` accumulated
/// elements.
#[inline]
#[must_use]
pub fn approx_eq(a: f64, b: f64, count: usize) -> bool {
    (a - b).abs() <= eps(count) * a.abs().max(b.abs()).max(1.0)
}

/// Whether `a` is strictly less than `b` beyond the tolerance.
#[inline]
#[must_use]
pub fn lt(a: f64, b: f64, count: usize) -> bool {
    a < b && !approx_eq(a, b, count)
}
