//! Row statistics and the normalized relayout the pairwise engine streams over.
//!
//! Each row is reduced in two passes (sum, then centered sum of squares) in `f64`, then
//! written as `z_k = (x_k - mean) / sqrt(Σ(x - mean)²)`. With that layout the Pearson
//! coefficient of rows `i` and `j` is the plain dot product `Σ_k z_ik z_jk`.

use crate::kernels::pairwise::TILE;
use crate::utilities::aligned_vector::{checked_align_up, AlignedAllocError, AlignedVec};
use crate::utilities::trace::CorrelateTrace;
#[cfg(not(target_arch = "wasm32"))]
use rayon::prelude::*;

/// Row stride granularity in `f64`: one AVX-512 register.
pub const ROW_PAD: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowSummary {
	pub sum: f64,
	pub mean: f64,
	/// `Σ (x - mean)²`, computed after the mean (second pass).
	pub centered_sum_sq: f64,
}

impl RowSummary {
	pub fn from_row(row: &[f32]) -> Self {
		let sum: f64 = row.iter().map(|&x| x as f64).sum();
		let mean = sum / row.len() as f64;
		let centered_sum_sq = row
			.iter()
			.map(|&x| {
				let d = x as f64 - mean;
				d * d
			})
			.sum();
		Self {
			sum,
			mean,
			centered_sum_sq,
		}
	}

	/// Zero variance, or a NaN/∞ somewhere in the row.
	#[inline]
	pub fn is_degenerate(&self) -> bool {
		!(self.centered_sum_sq > 0.0 && self.centered_sum_sq.is_finite())
	}

	#[inline]
	pub fn inv_norm(&self) -> f64 {
		if self.is_degenerate() {
			0.0
		} else {
			1.0 / self.centered_sum_sq.sqrt()
		}
	}
}

/// Centered, unit-norm rows in a zero-padded, 64-byte aligned row-major buffer.
///
/// The stride is `cols` rounded up to [`ROW_PAD`] and the row count is rounded up to
/// [`TILE`]; padding is zero, so it contributes nothing to any dot product. Degenerate
/// rows are left all-zero.
pub struct NormalizedRows {
	values: AlignedVec<f64>,
	summaries: Vec<RowSummary>,
	rows: usize,
	padded_rows: usize,
	stride: usize,
}

impl NormalizedRows {
	pub fn build(
		data: &[f32],
		rows: usize,
		cols: usize,
		parallel: bool,
		trace: Option<&dyn CorrelateTrace>,
	) -> Result<Self, AlignedAllocError> {
		debug_assert_eq!(data.len(), rows * cols);
		let overflow = AlignedAllocError::Overflow {
			len: rows,
			elem_size: cols,
		};
		let stride = checked_align_up(cols, ROW_PAD).ok_or(overflow.clone())?;
		let padded_rows = checked_align_up(rows, TILE).ok_or(overflow.clone())?;
		let len = padded_rows.checked_mul(stride).ok_or(overflow)?;
		let mut values = AlignedVec::<f64>::try_zeroed(len)?;

		let mut summaries = Vec::new();
		summaries
			.try_reserve_exact(rows)
			.map_err(|_| AlignedAllocError::OutOfMemory {
				bytes: rows.saturating_mul(std::mem::size_of::<RowSummary>()),
			})?;

		if cols == 0 {
			summaries.resize(rows, RowSummary::from_row(&[]));
		} else if parallel {
			#[cfg(not(target_arch = "wasm32"))]
			values
				.as_mut_slice()
				.par_chunks_mut(stride)
				.zip(data.par_chunks(cols))
				.map(|(dst, src)| normalize_row(src, dst))
				.collect_into_vec(&mut summaries);

			#[cfg(target_arch = "wasm32")]
			summaries.extend(
				values
					.as_mut_slice()
					.chunks_mut(stride)
					.zip(data.chunks(cols))
					.map(|(dst, src)| normalize_row(src, dst)),
			);
		} else {
			summaries.extend(
				values
					.as_mut_slice()
					.chunks_mut(stride)
					.zip(data.chunks(cols))
					.map(|(dst, src)| normalize_row(src, dst)),
			);
		}

		if let Some(trace) = trace {
			for (row, summary) in summaries.iter().enumerate() {
				trace.row_summary(row, summary);
			}
		}

		Ok(Self {
			values,
			summaries,
			rows,
			padded_rows,
			stride,
		})
	}

	#[inline]
	pub fn rows(&self) -> usize {
		self.rows
	}

	#[inline]
	pub fn padded_rows(&self) -> usize {
		self.padded_rows
	}

	#[inline]
	pub fn stride(&self) -> usize {
		self.stride
	}

	#[inline]
	pub fn as_slice(&self) -> &[f64] {
		self.values.as_slice()
	}

	#[inline]
	pub fn row(&self, r: usize) -> &[f64] {
		&self.values[r * self.stride..(r + 1) * self.stride]
	}

	/// The [`TILE`] consecutive rows starting at `r0` (padded rows included).
	#[inline]
	pub fn tile_rows(&self, r0: usize) -> &[f64] {
		&self.values[r0 * self.stride..(r0 + TILE) * self.stride]
	}

	#[inline]
	pub fn summaries(&self) -> &[RowSummary] {
		&self.summaries
	}

	pub fn degenerate_count(&self) -> usize {
		self.summaries.iter().filter(|s| s.is_degenerate()).count()
	}
}

/// Lowest row of the `rows × cols` matrix `data` with zero or non-finite variance.
///
/// Allocation-free, so callers can reject degenerate input before building the relayout.
pub fn first_degenerate_row(data: &[f32], rows: usize, cols: usize, parallel: bool) -> Option<usize> {
	if cols == 0 {
		return (rows > 0).then_some(0);
	}
	let degenerate = |row: &[f32]| RowSummary::from_row(row).is_degenerate();
	#[cfg(not(target_arch = "wasm32"))]
	if parallel {
		return data.par_chunks(cols).position_first(degenerate);
	}
	let _ = parallel;
	data.chunks(cols).position(degenerate)
}

#[inline]
fn normalize_row(src: &[f32], dst: &mut [f64]) -> RowSummary {
	let summary = RowSummary::from_row(src);
	let inv = summary.inv_norm();
	if inv != 0.0 {
		for (d, &x) in dst.iter_mut().zip(src) {
			*d = (x as f64 - summary.mean) * inv;
		}
	}
	summary
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn summary_two_pass() {
		let s = RowSummary::from_row(&[1.0, 2.0, 3.0, 4.0]);
		assert_eq!(s.sum, 10.0);
		assert_eq!(s.mean, 2.5);
		assert_eq!(s.centered_sum_sq, 5.0);
		assert!(!s.is_degenerate());
	}

	#[test]
	fn summary_degenerate_rows() {
		assert!(RowSummary::from_row(&[5.0, 5.0, 5.0]).is_degenerate());
		assert!(RowSummary::from_row(&[]).is_degenerate());
		assert!(RowSummary::from_row(&[1.0, f32::NAN]).is_degenerate());
		assert!(RowSummary::from_row(&[1.0, f32::INFINITY]).is_degenerate());
		assert_eq!(RowSummary::from_row(&[5.0, 5.0]).inv_norm(), 0.0);
	}

	#[test]
	fn large_constant_row_is_exactly_degenerate() {
		let row = vec![123_456.78f32; 10_001];
		let s = RowSummary::from_row(&row);
		assert_eq!(s.centered_sum_sq, 0.0);
	}

	fn check_normalized_layout(parallel: bool) {
		let data = [1.0f32, 2.0, 3.0, 7.0, 7.0, 7.0, -1.0, 0.0, 1.0];
		let rows = NormalizedRows::build(&data, 3, 3, parallel, None).unwrap();
		assert_eq!(rows.stride(), ROW_PAD);
		assert_eq!(rows.padded_rows(), TILE);
		assert_eq!(rows.as_slice().len(), TILE * ROW_PAD);
		assert_eq!(first_degenerate_row(&data, 3, 3, parallel), Some(1));
		assert_eq!(rows.degenerate_count(), 1);

		let norm: f64 = rows.row(0).iter().map(|z| z * z).sum();
		assert!((norm - 1.0).abs() < 1e-12);
		assert!(rows.row(0)[3..].iter().all(|&z| z == 0.0));
		assert!(rows.row(1).iter().all(|&z| z == 0.0));
		assert!(rows.row(3).iter().all(|&z| z == 0.0));
		assert_eq!(rows.tile_rows(0).len(), TILE * ROW_PAD);

		let dot: f64 = rows.row(0).iter().zip(rows.row(2)).map(|(a, b)| a * b).sum();
		assert!((dot - 1.0).abs() < 1e-12);
	}

	#[test]
	fn normalized_layout_sequential() {
		check_normalized_layout(false);
	}

	#[test]
	fn normalized_layout_parallel() {
		check_normalized_layout(true);
	}

	#[test]
	fn zero_columns_marks_every_row_degenerate() {
		let rows = NormalizedRows::build(&[], 3, 0, false, None).unwrap();
		assert_eq!(rows.stride(), 0);
		assert_eq!(rows.degenerate_count(), 3);
	}

	#[test]
	fn degenerate_scan_finds_lowest_row() {
		let data = [1.0f32, 2.0, 4.0, 1.0, f32::NAN, 3.0, 2.0, 2.0];
		for parallel in [false, true] {
			assert_eq!(first_degenerate_row(&data, 4, 2, parallel), Some(2));
			assert_eq!(first_degenerate_row(&data[..4], 2, 2, parallel), None);
			assert_eq!(first_degenerate_row(&[], 2, 0, parallel), Some(0));
			assert_eq!(first_degenerate_row(&[], 0, 0, parallel), None);
		}
	}
}
