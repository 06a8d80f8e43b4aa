//! Straightforward O(ny²·nx) oracle.
//!
//! Recomputes both means and the centered sums for every pair with no blocking, relayout
//! or SIMD. Same output contract and NaN policy as the main entry point; slow, but its
//! correctness is easy to read off, which is what tests and benchmarks compare against.

use crate::correlate::{CorrelateError, MatrixShape};

pub fn correlate_reference(ny: usize, nx: usize, data: &[f32], result: &mut [f32]) -> Result<(), CorrelateError> {
	let shape = MatrixShape::new(ny, nx);
	let expected = shape.input_len()?;
	if data.len() != expected {
		return Err(CorrelateError::InputLengthMismatch {
			expected,
			got: data.len(),
		});
	}
	let expected = shape.output_len()?;
	if result.len() != expected {
		return Err(CorrelateError::OutputLengthMismatch {
			expected,
			got: result.len(),
		});
	}

	for i in 0..ny {
		for j in 0..ny {
			result[j + i * ny] = if j > i {
				0.0
			} else {
				pair(&data[i * nx..(i + 1) * nx], &data[j * nx..(j + 1) * nx], i == j)
			};
		}
	}
	Ok(())
}

fn pair(x: &[f32], y: &[f32], diagonal: bool) -> f32 {
	let n = x.len() as f64;
	let mean_x = x.iter().map(|&v| v as f64).sum::<f64>() / n;
	let mean_y = y.iter().map(|&v| v as f64).sum::<f64>() / n;

	let mut sxy = 0.0f64;
	let mut sxx = 0.0f64;
	let mut syy = 0.0f64;
	for (&a, &b) in x.iter().zip(y) {
		let dx = a as f64 - mean_x;
		let dy = b as f64 - mean_y;
		sxy += dx * dy;
		sxx += dx * dx;
		syy += dy * dy;
	}

	let regular = |s: f64| s > 0.0 && s.is_finite();
	if !regular(sxx) || !regular(syy) {
		f32::NAN
	} else if diagonal {
		1.0
	} else {
		(sxy / (sxx.sqrt() * syy.sqrt())).clamp(-1.0, 1.0) as f32
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn reference_fixtures() {
		let mut out = [0.0f32; 4];
		correlate_reference(2, 2, &[1.0, 2.0, 2.0, 1.0], &mut out).unwrap();
		assert_eq!(out[0], 1.0);
		assert_eq!(out[1], 0.0);
		assert!((out[2] + 1.0).abs() < 1e-6);

		correlate_reference(2, 3, &[1.0, 2.0, 3.0, 5.0, 5.0, 5.0], &mut out).unwrap();
		assert_eq!(out[0], 1.0);
		assert!(out[2].is_nan() && out[3].is_nan());
	}

	#[test]
	fn reference_rejects_bad_lengths() {
		let mut out = [0.0f32; 4];
		assert!(matches!(
			correlate_reference(2, 2, &[1.0, 2.0, 3.0], &mut out),
			Err(CorrelateError::InputLengthMismatch { expected: 4, got: 3 })
		));
		let mut short = [0.0f32; 3];
		assert!(matches!(
			correlate_reference(2, 2, &[1.0, 2.0, 3.0, 4.0], &mut short),
			Err(CorrelateError::OutputLengthMismatch { expected: 4, got: 3 })
		));
	}
}
