//! # Pairwise Pearson Correlation Matrix (CORRELATE)
//!
//! For `ny` rows of `nx` `f32` samples, computes the Pearson correlation coefficient of every
//! pair of rows and stores coefficient `(i, j)` at `result[j + i*ny]`. Only `0 ≤ j ≤ i < ny`
//! is meaningful; every `j > i` slot is written as `0`.
//!
//! Rows are reduced once (two-pass mean and centered sum of squares, in `f64`) and relaid as
//! centered unit-norm vectors, so each coefficient is a single dot product. Pairs are reduced
//! in 4×4 register tiles, blocked over rows and columns, and spread over the rayon pool with a
//! balanced triangular schedule. Results are rounded to `f32` only when written.
//!
//! ## Parameters
//! - **zero_variance**: policy for rows with zero (or non-finite) variance. Defaults to `Nan`.
//! - **block_rows**: rows per cache block / output band. Positive multiple of 4. Unset picks at most
//!   64, small enough that a batch kernel gives every rayon thread a task.
//! - **k_chunk**: columns per cache chunk. Positive multiple of 8, defaults to 256.
//!
//! ## Errors
//! - **NegativeDimension**: correlate: a signed dimension is negative.
//! - **DimensionOverflow**: correlate: `ny*nx` or `ny*ny` does not fit in `usize`.
//! - **InputLengthMismatch** / **OutputLengthMismatch**: correlate: slice lengths disagree with the shape.
//! - **InvalidBlocking**: correlate: `block_rows` or `k_chunk` is not a positive multiple of 4 / 8.
//! - **UnsupportedKernel**: correlate: the requested kernel is not compiled in or not supported by the CPU.
//! - **NoSamples**: correlate: `nx == 0` under `ZeroVariancePolicy::Error`.
//! - **DegenerateRow**: correlate: a row has zero or non-finite variance under `ZeroVariancePolicy::Error`.
//! - **AllocationFailed**: correlate: an internal buffer could not be allocated.
//!
//! Every error is reported before any buffer is allocated and before the first write to the
//! output buffer.
//!
//! ## Returns
//! - **`Ok(())`** with the output fully overwritten, or **`Ok(CorrelateOutput)`** for the
//!   allocating variants.
//! - **`Err(CorrelateError)`** otherwise.

use crate::kernels::pairwise::{accumulate_block, TILE};
use crate::kernels::row_stats::{first_degenerate_row, NormalizedRows};
use crate::kernels::schedule::{pair_from_both_ends, BandSchedule};
use crate::kernels::triangular;
use crate::utilities::aligned_vector::{align_up, AlignedAllocError, AlignedVec};
use crate::utilities::enums::Kernel;
use crate::utilities::helpers::{detect_best_batch_kernel, kernel_available, poison_output};
use crate::utilities::trace::CorrelateTrace;
#[cfg(not(target_arch = "wasm32"))]
use rayon::prelude::*;
use thiserror::Error;

pub const DEFAULT_BLOCK_ROWS: usize = 64;
/// Smallest band [`auto_block_rows`] picks.
pub const MIN_AUTO_BLOCK_ROWS: usize = 2 * TILE;
pub const DEFAULT_K_CHUNK: usize = 256;

/// What a row with zero (or non-finite) variance produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZeroVariancePolicy {
	/// Every coefficient involving the row, its diagonal included, is `NaN`.
	#[default]
	Nan,
	/// The call fails with [`CorrelateError::DegenerateRow`] (or
	/// [`CorrelateError::NoSamples`] when `nx == 0`).
	Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixShape {
	pub ny: usize,
	pub nx: usize,
}

impl MatrixShape {
	#[inline]
	pub const fn new(ny: usize, nx: usize) -> Self {
		Self { ny, nx }
	}

	/// Shape from signed dimensions as handed over by C-style callers.
	pub fn try_from_signed(ny: i64, nx: i64) -> Result<Self, CorrelateError> {
		if ny < 0 || nx < 0 {
			return Err(CorrelateError::NegativeDimension { ny, nx });
		}
		let to_usize = |v: i64| usize::try_from(v).map_err(|_| CorrelateError::DimensionOverflow { ny: usize::MAX, nx: usize::MAX });
		Ok(Self::new(to_usize(ny)?, to_usize(nx)?))
	}

	#[inline]
	pub fn input_len(&self) -> Result<usize, CorrelateError> {
		self.ny
			.checked_mul(self.nx)
			.ok_or(CorrelateError::DimensionOverflow { ny: self.ny, nx: self.nx })
	}

	#[inline]
	pub fn output_len(&self) -> Result<usize, CorrelateError> {
		self.ny
			.checked_mul(self.ny)
			.ok_or(CorrelateError::DimensionOverflow { ny: self.ny, nx: self.nx })
	}
}

#[derive(Debug, Clone)]
pub struct CorrelateParams {
	pub zero_variance: Option<ZeroVariancePolicy>,
	pub block_rows: Option<usize>,
	pub k_chunk: Option<usize>,
}

impl Default for CorrelateParams {
	fn default() -> Self {
		Self {
			zero_variance: Some(ZeroVariancePolicy::Nan),
			block_rows: None,
			k_chunk: Some(DEFAULT_K_CHUNK),
		}
	}
}

#[derive(Clone)]
pub struct CorrelateInput<'a> {
	pub data: &'a [f32],
	pub shape: MatrixShape,
	pub params: CorrelateParams,
	pub trace: Option<&'a dyn CorrelateTrace>,
}

impl<'a> CorrelateInput<'a> {
	#[inline]
	pub fn from_slice(data: &'a [f32], ny: usize, nx: usize, params: CorrelateParams) -> Self {
		Self {
			data,
			shape: MatrixShape::new(ny, nx),
			params,
			trace: None,
		}
	}

	#[inline]
	pub fn with_default_params(data: &'a [f32], ny: usize, nx: usize) -> Self {
		Self::from_slice(data, ny, nx, CorrelateParams::default())
	}

	#[inline]
	pub fn with_trace(mut self, trace: &'a dyn CorrelateTrace) -> Self {
		self.trace = Some(trace);
		self
	}

	#[inline]
	pub fn get_zero_variance(&self) -> ZeroVariancePolicy {
		self.params.zero_variance.unwrap_or_default()
	}

	#[inline]
	pub fn get_block_rows(&self, kernel: Kernel) -> usize {
		self.params
			.block_rows
			.unwrap_or_else(|| auto_block_rows(self.shape.ny, kernel))
	}

	#[inline]
	pub fn get_k_chunk(&self) -> usize {
		self.params.k_chunk.unwrap_or(DEFAULT_K_CHUNK)
	}
}

impl std::fmt::Debug for CorrelateInput<'_> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CorrelateInput")
			.field("len", &self.data.len())
			.field("shape", &self.shape)
			.field("params", &self.params)
			.field("trace", &self.trace.is_some())
			.finish()
	}
}

#[derive(Copy, Clone)]
pub struct CorrelateBuilder<'a> {
	zero_variance: Option<ZeroVariancePolicy>,
	block_rows: Option<usize>,
	k_chunk: Option<usize>,
	kernel: Kernel,
	trace: Option<&'a dyn CorrelateTrace>,
}

impl Default for CorrelateBuilder<'_> {
	fn default() -> Self {
		Self {
			zero_variance: None,
			block_rows: None,
			k_chunk: None,
			kernel: Kernel::Auto,
			trace: None,
		}
	}
}

impl<'a> CorrelateBuilder<'a> {
	#[inline(always)]
	pub fn new() -> Self {
		Self::default()
	}
	#[inline(always)]
	pub fn zero_variance(mut self, policy: ZeroVariancePolicy) -> Self {
		self.zero_variance = Some(policy);
		self
	}
	#[inline(always)]
	pub fn block_rows(mut self, n: usize) -> Self {
		self.block_rows = Some(n);
		self
	}
	#[inline(always)]
	pub fn k_chunk(mut self, n: usize) -> Self {
		self.k_chunk = Some(n);
		self
	}
	#[inline(always)]
	pub fn kernel(mut self, k: Kernel) -> Self {
		self.kernel = k;
		self
	}
	#[inline(always)]
	pub fn trace(mut self, trace: &'a dyn CorrelateTrace) -> Self {
		self.trace = Some(trace);
		self
	}

	fn input<'d>(self, data: &'d [f32], ny: usize, nx: usize) -> CorrelateInput<'d>
	where
		'a: 'd,
	{
		let params = CorrelateParams {
			zero_variance: self.zero_variance,
			block_rows: self.block_rows,
			k_chunk: self.k_chunk,
		};
		CorrelateInput {
			data,
			shape: MatrixShape::new(ny, nx),
			params,
			trace: self.trace,
		}
	}

	#[inline(always)]
	pub fn apply_slice(self, data: &[f32], ny: usize, nx: usize) -> Result<CorrelateOutput, CorrelateError> {
		let input = self.input(data, ny, nx);
		correlate_with_kernel(&input, self.kernel)
	}

	#[inline(always)]
	pub fn apply_into(self, data: &[f32], ny: usize, nx: usize, result: &mut [f32]) -> Result<(), CorrelateError> {
		let input = self.input(data, ny, nx);
		correlate_into(&input, result, self.kernel)
	}
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CorrelateError {
	#[error("correlate: Negative dimension: ny = {ny}, nx = {nx}")]
	NegativeDimension { ny: i64, nx: i64 },
	#[error("correlate: Dimension overflow: ny = {ny}, nx = {nx}")]
	DimensionOverflow { ny: usize, nx: usize },
	#[error("correlate: Input length mismatch: expected = {expected}, got = {got}")]
	InputLengthMismatch { expected: usize, got: usize },
	#[error("correlate: Output length mismatch: expected = {expected}, got = {got}")]
	OutputLengthMismatch { expected: usize, got: usize },
	#[error("correlate: Invalid blocking: block_rows = {block_rows} (multiple of 4), k_chunk = {k_chunk} (multiple of 8)")]
	InvalidBlocking { block_rows: usize, k_chunk: usize },
	#[error("correlate: Kernel {kernel:?} is not available on this target")]
	UnsupportedKernel { kernel: Kernel },
	#[error("correlate: No samples per row (nx = 0).")]
	NoSamples,
	#[error("correlate: Row {row} has zero or non-finite variance.")]
	DegenerateRow { row: usize },
	#[error("correlate: Allocation of {bytes} bytes failed.")]
	AllocationFailed { bytes: usize },
}

impl From<AlignedAllocError> for CorrelateError {
	fn from(e: AlignedAllocError) -> Self {
		CorrelateError::AllocationFailed {
			bytes: e.requested_bytes(),
		}
	}
}

#[derive(Debug, Clone)]
pub struct CorrelateOutput {
	pub values: Vec<f32>,
	pub ny: usize,
}

impl CorrelateOutput {
	/// Coefficient of rows `i` and `j` in either order.
	pub fn get(&self, i: usize, j: usize) -> Option<f32> {
		if i >= self.ny || j >= self.ny {
			return None;
		}
		let (r, c) = if j <= i { (i, j) } else { (j, i) };
		Some(self.values[c + r * self.ny])
	}

	/// The meaningful part of row `i`: coefficients `(i, 0..=i)`.
	pub fn lower_row(&self, i: usize) -> Option<&[f32]> {
		(i < self.ny).then(|| &self.values[i * self.ny..i * self.ny + i + 1])
	}

	pub fn to_symmetric(&self) -> Vec<f32> {
		let mut full = self.values.clone();
		triangular::mirror_lower(&mut full, self.ny);
		full
	}
}

/// `ny × nx` row-major `data` in, `ny × ny` lower-triangular `result` out, with default
/// parameters and the best kernel for this CPU.
#[inline]
pub fn correlate(ny: usize, nx: usize, data: &[f32], result: &mut [f32]) -> Result<(), CorrelateError> {
	let input = CorrelateInput::with_default_params(data, ny, nx);
	correlate_into(&input, result, Kernel::Auto)
}

pub fn correlate_with_kernel(input: &CorrelateInput, kernel: Kernel) -> Result<CorrelateOutput, CorrelateError> {
	let kernel = validate(input, kernel)?;
	check_zero_variance(input, kernel)?;

	let len = input.shape.output_len()?;
	let mut values = Vec::new();
	values
		.try_reserve_exact(len)
		.map_err(|_| CorrelateError::AllocationFailed {
			bytes: len.saturating_mul(std::mem::size_of::<f32>()),
		})?;
	values.resize(len, 0.0);
	correlate_validated(input, &mut values, kernel)?;
	Ok(CorrelateOutput {
		values,
		ny: input.shape.ny,
	})
}

pub fn correlate_into(input: &CorrelateInput, result: &mut [f32], kernel: Kernel) -> Result<(), CorrelateError> {
	let kernel = validate(input, kernel)?;
	let expected = input.shape.output_len()?;
	if result.len() != expected {
		return Err(CorrelateError::OutputLengthMismatch {
			expected,
			got: result.len(),
		});
	}
	check_zero_variance(input, kernel)?;
	correlate_validated(input, result, kernel)
}

/// Rows per band when the caller leaves `block_rows` unset.
///
/// Batch kernels get the largest multiple of [`TILE`] that still yields two bands (one paired
/// task) per rayon thread, kept within `MIN_AUTO_BLOCK_ROWS..=DEFAULT_BLOCK_ROWS`.
pub fn auto_block_rows(ny: usize, kernel: Kernel) -> usize {
	#[cfg(not(target_arch = "wasm32"))]
	if kernel.is_batch() {
		let threads = rayon::current_num_threads().max(1);
		let per_band = ny / (2 * threads) / TILE * TILE;
		return per_band.clamp(MIN_AUTO_BLOCK_ROWS, DEFAULT_BLOCK_ROWS);
	}
	let _ = (ny, kernel);
	DEFAULT_BLOCK_ROWS
}

/// Shape, blocking and kernel checks. Returns the kernel `kernel` resolves to.
fn validate(input: &CorrelateInput, kernel: Kernel) -> Result<Kernel, CorrelateError> {
	let expected = input.shape.input_len()?;
	if input.data.len() != expected {
		return Err(CorrelateError::InputLengthMismatch {
			expected,
			got: input.data.len(),
		});
	}

	let k_chunk = input.get_k_chunk();
	let block_ok = input.params.block_rows.map_or(true, |b| b != 0 && b % TILE == 0);
	if !block_ok || k_chunk == 0 || k_chunk % 8 != 0 {
		return Err(CorrelateError::InvalidBlocking {
			block_rows: input.params.block_rows.unwrap_or(DEFAULT_BLOCK_ROWS),
			k_chunk,
		});
	}

	let chosen = match kernel {
		Kernel::Auto => detect_best_batch_kernel(),
		other => other,
	};
	if !kernel_available(chosen) {
		return Err(CorrelateError::UnsupportedKernel { kernel: chosen });
	}
	Ok(chosen)
}

/// Applies [`ZeroVariancePolicy::Error`] with a scan that allocates nothing.
fn check_zero_variance(input: &CorrelateInput, kernel: Kernel) -> Result<(), CorrelateError> {
	let MatrixShape { ny, nx } = input.shape;
	if input.get_zero_variance() != ZeroVariancePolicy::Error || ny == 0 {
		return Ok(());
	}
	if nx == 0 {
		return Err(CorrelateError::NoSamples);
	}
	match first_degenerate_row(input.data, ny, nx, kernel.is_batch()) {
		Some(row) => Err(CorrelateError::DegenerateRow { row }),
		None => Ok(()),
	}
}

fn correlate_validated(input: &CorrelateInput, result: &mut [f32], kernel: Kernel) -> Result<(), CorrelateError> {
	let MatrixShape { ny, nx } = input.shape;
	if ny == 0 {
		return Ok(());
	}
	if nx == 0 {
		log::debug!("correlate: ny = {ny}, nx = 0; every coefficient is NaN");
		triangular::fill_degenerate(result, ny);
		return Ok(());
	}

	let k_chunk = input.get_k_chunk();
	// A band never needs more rows than the (tile-padded) matrix has.
	let block_rows = input.get_block_rows(kernel).min(align_up(ny, TILE));
	let schedule = BandSchedule::new(ny, block_rows);
	let scratch_len = block_rows
		.checked_mul(block_rows)
		.and_then(|b| schedule.task_count().checked_mul(b))
		.ok_or(CorrelateError::DimensionOverflow { ny, nx })?;

	let rows = NormalizedRows::build(input.data, ny, nx, kernel.is_batch(), input.trace)?;
	let mut scratch = AlignedVec::<f64>::try_zeroed(scratch_len)?;

	log::debug!(
		"correlate: ny = {ny}, nx = {nx}, kernel = {kernel:?}, block_rows = {block_rows}, k_chunk = {k_chunk}, tasks = {}, degenerate rows = {}",
		schedule.task_count(),
		rows.degenerate_count()
	);

	poison_output(result);
	run_bands(&rows, result, &schedule, kernel, k_chunk, &mut scratch, input.trace);
	Ok(())
}

fn run_bands(
	rows: &NormalizedRows,
	result: &mut [f32],
	schedule: &BandSchedule,
	kernel: Kernel,
	k_chunk: usize,
	scratch: &mut [f64],
	trace: Option<&dyn CorrelateTrace>,
) {
	let ny = rows.rows();
	let block_rows = schedule.block_rows();
	let simd = kernel.simd();

	let bands: Vec<(usize, &mut [f32])> = result.chunks_mut(block_rows * ny).enumerate().collect();
	let tasks: Vec<_> = pair_from_both_ends(bands)
		.into_iter()
		.zip(scratch.chunks_mut(block_rows * block_rows))
		.collect();
	debug_assert_eq!(tasks.len(), schedule.task_count());

	let do_task = |((first, second), acc): (((usize, &mut [f32]), Option<(usize, &mut [f32])>), &mut [f64])| {
		correlate_band(rows, first.0, first.1, schedule, simd, k_chunk, acc, trace);
		if let Some((band, out)) = second {
			correlate_band(rows, band, out, schedule, simd, k_chunk, acc, trace);
		}
	};

	#[cfg(not(target_arch = "wasm32"))]
	if kernel.is_batch() {
		tasks.into_par_iter().for_each(do_task);
		return;
	}

	tasks.into_iter().for_each(do_task);
}

/// Reduces and writes every coefficient of output band `band`: blocks `0..=band`, then
/// the zeroed upper part.
#[allow(clippy::too_many_arguments)]
fn correlate_band(
	rows: &NormalizedRows,
	band: usize,
	out: &mut [f32],
	schedule: &BandSchedule,
	kernel: Kernel,
	k_chunk: usize,
	acc: &mut [f64],
	trace: Option<&dyn CorrelateTrace>,
) {
	let ny = rows.rows();
	let block_rows = schedule.block_rows();
	let band_rows = schedule.band_rows(band);
	let band_tiles = band_rows.start..align_up(band_rows.end, TILE);

	for block in 0..=band {
		let cols = schedule.band_rows(block);
		let col_tiles = cols.start..align_up(cols.end, TILE);
		acc.fill(0.0);
		accumulate_block(rows, kernel, band_tiles.clone(), col_tiles, k_chunk, acc, block_rows);
		triangular::write_block(out, ny, band_rows.clone(), cols, acc, block_rows, rows.summaries());
	}
	triangular::zero_upper(out, ny, band_rows.clone());

	if let Some(trace) = trace {
		trace.band_finished(band, band_rows.clone(), triangular::lower_pairs(band_rows));
	}
}
