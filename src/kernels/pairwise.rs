//! Pairwise reduction engine.
//!
//! The unit of work is a `TILE × TILE` register tile: four rows of the band against four
//! rows of the block, streamed along `k` with one `f64` accumulator (or accumulator
//! vector) per pair. [`accumulate_block`] drives tiles over a band/block pair in `k`
//! chunks so the block stays cache resident while the band's tiles sweep it.

use crate::kernels::row_stats::NormalizedRows;
use crate::utilities::enums::Kernel;
use std::ops::Range;

/// Rows per register tile, on both sides of a pair.
pub const TILE: usize = 4;

pub type Tile = [[f64; TILE]; TILE];

#[inline(always)]
fn check_tile_bounds(a: &[f64], b: &[f64], stride: usize, k0: usize, k1: usize, lanes: usize) {
	assert!(k0 <= k1 && k1 <= stride);
	assert!((k1 - k0) % lanes == 0);
	assert!(a.len() >= (TILE - 1) * stride + k1);
	assert!(b.len() >= (TILE - 1) * stride + k1);
}

/// `out[r][c] = Σ_{k0 ≤ k < k1} a[r*stride + k] * b[c*stride + k]`.
#[inline]
pub fn tile_scalar(a: &[f64], b: &[f64], stride: usize, k0: usize, k1: usize) -> Tile {
	check_tile_bounds(a, b, stride, k0, k1, 1);
	let ar: [&[f64]; TILE] = std::array::from_fn(|r| &a[r * stride + k0..r * stride + k1]);
	let br: [&[f64]; TILE] = std::array::from_fn(|c| &b[c * stride + k0..c * stride + k1]);

	let mut acc = [[0.0f64; TILE]; TILE];
	for k in 0..(k1 - k0) {
		let x = [ar[0][k], ar[1][k], ar[2][k], ar[3][k]];
		let y = [br[0][k], br[1][k], br[2][k], br[3][k]];
		for r in 0..TILE {
			for c in 0..TILE {
				acc[r][c] += x[r] * y[c];
			}
		}
	}
	acc
}

#[cfg(all(feature = "nightly-avx", target_arch = "x86_64"))]
#[target_feature(enable = "avx")]
#[inline]
unsafe fn hsum256(v: core::arch::x86_64::__m256d) -> f64 {
	use core::arch::x86_64::*;
	let mut buf = [0.0f64; 4];
	_mm256_storeu_pd(buf.as_mut_ptr(), v);
	buf.iter().sum()
}

/// AVX2 tile: the 4×4 tile runs as two 4×2 halves so the eight accumulators, two `b`
/// rows and one `a` row fit in sixteen `ymm` registers.
///
/// # Safety
/// The CPU must support AVX2 and FMA.
#[cfg(all(feature = "nightly-avx", target_arch = "x86_64"))]
#[target_feature(enable = "avx2,fma")]
pub unsafe fn tile_avx2(a: &[f64], b: &[f64], stride: usize, k0: usize, k1: usize) -> Tile {
	use core::arch::x86_64::*;
	check_tile_bounds(a, b, stride, k0, k1, 4);
	let pa = a.as_ptr();
	let pb = b.as_ptr();
	let mut out = [[0.0f64; TILE]; TILE];

	for half in 0..2 {
		let c0 = half * 2;
		let mut acc = [[_mm256_setzero_pd(); 2]; TILE];
		let mut k = k0;
		while k < k1 {
			let y0 = _mm256_loadu_pd(pb.add(c0 * stride + k));
			let y1 = _mm256_loadu_pd(pb.add((c0 + 1) * stride + k));
			for r in 0..TILE {
				let x = _mm256_loadu_pd(pa.add(r * stride + k));
				acc[r][0] = _mm256_fmadd_pd(x, y0, acc[r][0]);
				acc[r][1] = _mm256_fmadd_pd(x, y1, acc[r][1]);
			}
			k += 4;
		}
		for r in 0..TILE {
			out[r][c0] = hsum256(acc[r][0]);
			out[r][c0 + 1] = hsum256(acc[r][1]);
		}
	}
	out
}

#[cfg(all(feature = "nightly-avx", target_arch = "x86_64"))]
#[target_feature(enable = "avx512f")]
#[inline]
unsafe fn hsum512(v: core::arch::x86_64::__m512d) -> f64 {
	use core::arch::x86_64::*;
	let mut buf = [0.0f64; 8];
	_mm512_storeu_pd(buf.as_mut_ptr(), v);
	buf.iter().sum()
}

/// AVX-512 tile: full 4×4 with sixteen `zmm` accumulators.
///
/// # Safety
/// The CPU must support AVX-512F and FMA.
#[cfg(all(feature = "nightly-avx", target_arch = "x86_64"))]
#[target_feature(enable = "avx512f,fma")]
pub unsafe fn tile_avx512(a: &[f64], b: &[f64], stride: usize, k0: usize, k1: usize) -> Tile {
	use core::arch::x86_64::*;
	check_tile_bounds(a, b, stride, k0, k1, 8);
	let pa = a.as_ptr();
	let pb = b.as_ptr();

	let mut acc = [[_mm512_setzero_pd(); TILE]; TILE];
	let mut k = k0;
	while k < k1 {
		let x = [
			_mm512_loadu_pd(pa.add(k)),
			_mm512_loadu_pd(pa.add(stride + k)),
			_mm512_loadu_pd(pa.add(2 * stride + k)),
			_mm512_loadu_pd(pa.add(3 * stride + k)),
		];
		for c in 0..TILE {
			let y = _mm512_loadu_pd(pb.add(c * stride + k));
			for r in 0..TILE {
				acc[r][c] = _mm512_fmadd_pd(x[r], y, acc[r][c]);
			}
		}
		k += 8;
	}

	let mut out = [[0.0f64; TILE]; TILE];
	for r in 0..TILE {
		for c in 0..TILE {
			out[r][c] = hsum512(acc[r][c]);
		}
	}
	out
}

/// Dispatches one tile to `kernel`'s micro-kernel. The caller has already checked that
/// `kernel` is available on this CPU.
#[inline(always)]
pub fn tile_dot(kernel: Kernel, a: &[f64], b: &[f64], stride: usize, k0: usize, k1: usize) -> Tile {
	match kernel.simd() {
		#[cfg(all(feature = "nightly-avx", target_arch = "x86_64"))]
		Kernel::Avx2 => unsafe { tile_avx2(a, b, stride, k0, k1) },
		#[cfg(all(feature = "nightly-avx", target_arch = "x86_64"))]
		Kernel::Avx512 => unsafe { tile_avx512(a, b, stride, k0, k1) },
		_ => tile_scalar(a, b, stride, k0, k1),
	}
}

/// Adds `Σ_k z_ik z_jk` for `i ∈ band`, `j ∈ block` into `acc`.
///
/// `band` and `block` are tile-aligned row ranges of `rows` (padded rows allowed);
/// `acc` is row-major with row length `acc_stride` and its origin at
/// `(band.start, block.start)`. When the two ranges start at the same row, tiles lying
/// wholly above the diagonal are skipped. `k_chunk` must be a multiple of 8.
pub fn accumulate_block(
	rows: &NormalizedRows,
	kernel: Kernel,
	band: Range<usize>,
	block: Range<usize>,
	k_chunk: usize,
	acc: &mut [f64],
	acc_stride: usize,
) {
	debug_assert!(band.start % TILE == 0 && band.end % TILE == 0);
	debug_assert!(block.start % TILE == 0 && block.end % TILE == 0);
	debug_assert!(band.end <= rows.padded_rows() && block.end <= rows.padded_rows());
	debug_assert!(band.len() <= acc_stride && block.len() <= acc_stride);

	let stride = rows.stride();
	let diagonal = band.start == block.start;
	let mut k0 = 0;
	while k0 < stride {
		let k1 = (k0 + k_chunk).min(stride);
		for ti in band.clone().step_by(TILE) {
			let a = rows.tile_rows(ti);
			for tj in block.clone().step_by(TILE) {
				if diagonal && tj > ti {
					break;
				}
				let t = tile_dot(kernel, a, rows.tile_rows(tj), stride, k0, k1);
				let (r0, c0) = (ti - band.start, tj - block.start);
				for r in 0..TILE {
					let dst = &mut acc[(r0 + r) * acc_stride + c0..(r0 + r) * acc_stride + c0 + TILE];
					for c in 0..TILE {
						dst[c] += t[r][c];
					}
				}
			}
		}
		k0 = k1;
	}
}
