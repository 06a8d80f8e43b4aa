//! Balanced triangular work decomposition.
//!
//! Output rows are cut into bands of `block_rows`. Band `b` owns the `b + 1` block pairs
//! `(b, 0..=b)`, so bands get heavier towards the bottom of the triangle. Pairing band `k`
//! with band `nb - 1 - k` gives every task `nb + 1` block pairs.

use std::collections::VecDeque;
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandSchedule {
	rows: usize,
	block_rows: usize,
	bands: usize,
}

impl BandSchedule {
	pub fn new(rows: usize, block_rows: usize) -> Self {
		assert!(block_rows > 0, "block_rows must be positive");
		Self {
			rows,
			block_rows,
			bands: rows.div_ceil(block_rows),
		}
	}

	#[inline]
	pub fn block_rows(&self) -> usize {
		self.block_rows
	}

	#[inline]
	pub fn bands(&self) -> usize {
		self.bands
	}

	/// Real (unpadded) output rows of `band`.
	#[inline]
	pub fn band_rows(&self, band: usize) -> Range<usize> {
		let start = band * self.block_rows;
		start..(start + self.block_rows).min(self.rows)
	}

	/// Block pairs band `band` reduces.
	#[inline]
	pub fn band_cost(&self, band: usize) -> usize {
		band + 1
	}

	#[inline]
	pub fn task_count(&self) -> usize {
		self.bands.div_ceil(2)
	}

	/// Band indices grouped into tasks, lightest band with heaviest.
	pub fn tasks(&self) -> Vec<(usize, Option<usize>)> {
		pair_from_both_ends((0..self.bands).collect())
	}
}

/// Pairs the first item with the last, the second with the second-to-last, and so on.
/// With an odd count the middle item runs alone.
pub fn pair_from_both_ends<T>(items: Vec<T>) -> Vec<(T, Option<T>)> {
	let mut queue: VecDeque<T> = items.into();
	let mut out = Vec::with_capacity(queue.len().div_ceil(2));
	while let Some(front) = queue.pop_front() {
		let back = queue.pop_back();
		out.push((front, back));
	}
	out
}
