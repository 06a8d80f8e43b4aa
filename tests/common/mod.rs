/// Common helpers for the integration tests
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Once;

static LOGGER: Once = Once::new();

/// Routes `log` output through the test harness. Safe to call from every test.
pub fn init_logger() {
    LOGGER.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// `ny × nx` row-major matrix with entries in `[lo, hi)`.
pub fn random_matrix(ny: usize, nx: usize, lo: f32, hi: f32, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..ny * nx).map(|_| rng.gen_range(lo..hi)).collect()
}

/// Compare two arrays with a tolerance. `NaN` only matches `NaN`.
pub fn assert_array_close(actual: &[f32], expected: &[f32], rtol: f32, atol: f32, name: &str) {
    assert_eq!(actual.len(), expected.len(),
        "{}: Length mismatch: actual {} vs expected {}", name, actual.len(), expected.len());

    for (i, (&a, &e)) in actual.iter().zip(expected.iter()).enumerate() {
        if e.is_nan() {
            assert!(a.is_nan(), "{}: expected NaN at index {}, got {}", name, i, a);
            continue;
        }

        let diff = (a - e).abs();
        let tol = atol + rtol * e.abs();

        assert!(diff <= tol,
            "{}: Value mismatch at index {}: actual {} vs expected {} (diff: {}, tol: {})",
            name, i, a, e, diff, tol);
    }
}

/// Checks the output layout: exact `0` above the diagonal, `1` or `NaN` on it,
/// `[-1, 1]` or `NaN` below it.
pub fn assert_lower_triangular(result: &[f32], ny: usize, name: &str) {
    assert_eq!(result.len(), ny * ny, "{}: not a {}x{} matrix", name, ny, ny);
    for i in 0..ny {
        for j in 0..ny {
            let v = result[j + i * ny];
            if j > i {
                assert_eq!(v.to_bits(), 0.0f32.to_bits(), "{}: upper ({}, {}) = {}", name, i, j, v);
            } else if j == i {
                assert!(v == 1.0 || v.is_nan(), "{}: diagonal {} = {}", name, i, v);
            } else {
                assert!(v.is_nan() || (-1.0..=1.0).contains(&v), "{}: ({}, {}) = {}", name, i, j, v);
            }
        }
    }
}
