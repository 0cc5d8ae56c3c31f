//! Scalar distance kernels.
//!
//! Every code path that compares a subvector against a centroid goes through
//! [`squared_euclidean`]. Summation order is fixed (left to right), so two
//! callers handed the same inputs observe bit-identical results no matter how
//! the surrounding work is batched or parallelized.

/// Squared L2 distance `Σ (a[i] - b[i])²`.
///
/// Only the overlapping prefix is compared when the slices differ in length;
/// callers are expected to pass equal-width slices.
pub fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    let mut sum = 0.0;
    for (x, y) in a.iter().zip(b) {
        let diff = x - y;
        sum += diff * diff;
    }
    sum
}

/// Index of the smallest distance; the first occurrence wins ties.
///
/// Returns `None` for an empty input. NaN distances never win against a
/// number; when every distance is NaN, index 0 is returned.
pub fn argmin<I: IntoIterator<Item = f32>>(distances: I) -> Option<usize> {
    let mut iter = distances.into_iter().enumerate();
    let (mut best_idx, mut best) = iter.next()?;
    for (idx, distance) in iter {
        if distance < best || (best.is_nan() && !distance.is_nan()) {
            best = distance;
            best_idx = idx;
        }
    }
    Some(best_idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_squared_euclidean() {
        assert_eq!(squared_euclidean(&[0.0, 0.0], &[3.0, 4.0]), 25.0);
        assert_eq!(squared_euclidean(&[1.5, -2.0], &[1.5, -2.0]), 0.0);
        assert_eq!(squared_euclidean(&[], &[]), 0.0);
    }

    #[test]
    fn test_argmin_prefers_lowest_index_on_ties() {
        assert_eq!(argmin([2.0, 1.0, 1.0, 3.0]), Some(1));
        assert_eq!(argmin([0.0, 0.0]), Some(0));
        assert_eq!(argmin(std::iter::empty()), None);
    }

    #[test]
    fn test_argmin_skips_nan() {
        assert_eq!(argmin([f32::NAN, 4.0, 2.0]), Some(2));
        assert_eq!(argmin([3.0, f32::NAN, 1.0]), Some(2));
        assert_eq!(argmin([f32::NAN, f32::NAN]), Some(0));
    }
}
