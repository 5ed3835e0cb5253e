// ---------------------------------------------------------------------------
// Fixed-window averaging
// ---------------------------------------------------------------------------

/// Downsample `rows` by averaging non-overlapping windows of `bin_size` rows.
///
/// Rows past the largest multiple of `bin_size` are dropped, so `N` input
/// rows yield `N / bin_size` output rows. Each output row is the column-wise
/// arithmetic mean of its window.
///
/// # Panics
/// If `bin_size` is zero.
pub fn bin_rows(rows: &[Vec<f64>], bin_size: usize) -> Vec<Vec<f64>> {
    assert!(bin_size > 0, "bin size must be positive");

    rows.chunks_exact(bin_size)
        .map(|window| {
            let width = window[0].len();
            let mut sums = vec![0.0; width];
            for row in window {
                for (acc, v) in sums.iter_mut().zip(row) {
                    *acc += v;
                }
            }
            sums.into_iter().map(|s| s / bin_size as f64).collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ramp(n: usize) -> Vec<Vec<f64>> {
        (0..n).map(|i| vec![i as f64, 2.0 * i as f64]).collect()
    }

    #[test]
    fn drops_trailing_partial_window() {
        let binned = bin_rows(&ramp(250), 100);
        assert_eq!(binned.len(), 2);
        // mean of 0..=99 and 100..=199
        assert_eq!(binned[0], vec![49.5, 99.0]);
        assert_eq!(binned[1], vec![149.5, 299.0]);
    }

    #[test]
    fn fewer_rows_than_bin_yields_nothing() {
        assert!(bin_rows(&ramp(7), 10).is_empty());
    }

    #[test]
    fn bin_of_one_is_identity() {
        let rows = ramp(5);
        assert_eq!(bin_rows(&rows, 1), rows);
    }

    proptest! {
        #[test]
        fn row_count_is_floor_division(n in 0usize..400, bin in 1usize..50) {
            let binned = bin_rows(&ramp(n), bin);
            prop_assert_eq!(binned.len(), n / bin);
        }

        #[test]
        fn each_row_is_its_window_mean(
            values in proptest::collection::vec(-1.0e3f64..1.0e3, 0..200),
            bin in 1usize..20,
        ) {
            let rows: Vec<Vec<f64>> = values.iter().map(|v| vec![*v]).collect();
            let binned = bin_rows(&rows, bin);
            for (i, out) in binned.iter().enumerate() {
                let window = &values[i * bin..(i + 1) * bin];
                let mean = window.iter().sum::<f64>() / bin as f64;
                prop_assert!((out[0] - mean).abs() < 1e-9);
            }
        }
    }
}
