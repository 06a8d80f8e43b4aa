//! Output layout: coefficient `(i, j)` lives at `j + i*ny`; `j ≤ i` holds the coefficient,
//! `j > i` holds `0`.

use crate::kernels::row_stats::RowSummary;
use std::ops::Range;

/// Final `f32` value for a reduced pair.
///
/// Pairs touching a degenerate row are `NaN`, the diagonal of a regular row is exactly
/// `1.0`, and everything else is clamped to `[-1, 1]` before rounding.
#[inline(always)]
pub fn coefficient(dot: f64, i: usize, j: usize, summaries: &[RowSummary]) -> f32 {
	if summaries[i].is_degenerate() || summaries[j].is_degenerate() {
		f32::NAN
	} else if i == j {
		1.0
	} else {
		dot.clamp(-1.0, 1.0) as f32
	}
}

/// Writes the lower-triangle part of block `rows × cols`.
///
/// `out_band` is the output slice starting at row `rows.start`; `acc` holds the reduced
/// dot products with its origin at `(rows.start, cols.start)` and row length `acc_stride`.
pub fn write_block(
	out_band: &mut [f32],
	ny: usize,
	rows: Range<usize>,
	cols: Range<usize>,
	acc: &[f64],
	acc_stride: usize,
	summaries: &[RowSummary],
) {
	for i in rows.clone() {
		let local = i - rows.start;
		let out_row = &mut out_band[local * ny..(local + 1) * ny];
		let acc_row = &acc[local * acc_stride..];
		for j in cols.start..cols.end.min(i + 1) {
			out_row[j] = coefficient(acc_row[j - cols.start], i, j, summaries);
		}
	}
}

/// Zeroes `j > i` for every row of the band starting at `rows.start`.
pub fn zero_upper(out_band: &mut [f32], ny: usize, rows: Range<usize>) {
	for i in rows.clone() {
		let local = i - rows.start;
		out_band[local * ny + i + 1..(local + 1) * ny].fill(0.0);
	}
}

/// Whole-matrix fill when every row is degenerate (`nx == 0`).
pub fn fill_degenerate(result: &mut [f32], ny: usize) {
	for (i, row) in result.chunks_mut(ny).enumerate() {
		row[..=i].fill(f32::NAN);
		row[i + 1..].fill(0.0);
	}
}

/// Copies the lower triangle over the upper one, producing the full symmetric matrix.
pub fn mirror_lower(result: &mut [f32], ny: usize) {
	assert_eq!(result.len(), ny * ny, "mirror_lower: expected a {ny}x{ny} matrix");
	for i in 0..ny {
		for j in i + 1..ny {
			result[j + i * ny] = result[i + j * ny];
		}
	}
}

/// Lower-triangle entries, diagonal included, in `rows`.
#[inline]
pub fn lower_pairs(rows: Range<usize>) -> usize {
	rows.map(|i| i + 1).sum()
}
