use crate::utilities::enums::Kernel;
use std::sync::OnceLock;

static BEST_SINGLE: OnceLock<Kernel> = OnceLock::new();
static BEST_BATCH: OnceLock<Kernel> = OnceLock::new();

/// Bit pattern written over caller output in debug builds before the writer runs.
/// Any slot still holding it afterwards was never written.
pub const OUTPUT_POISON_BITS: u32 = 0x1111_1111;

#[inline(always)]
pub fn detect_best_kernel() -> Kernel {
    *BEST_SINGLE.get_or_init(|| {
        if kernel_available(Kernel::Avx512) {
            return Kernel::Avx512;
        }
        if kernel_available(Kernel::Avx2) {
            return Kernel::Avx2;
        }
        Kernel::Scalar
    })
}

#[inline(always)]
pub fn detect_best_batch_kernel() -> Kernel {
    *BEST_BATCH.get_or_init(|| detect_best_kernel().to_batch())
}

/// Whether `kernel` was compiled in and the running CPU supports it.
pub fn kernel_available(kernel: Kernel) -> bool {
    match kernel.simd() {
        Kernel::Auto | Kernel::Scalar => true,
        #[cfg(all(feature = "nightly-avx", target_arch = "x86_64"))]
        Kernel::Avx2 => is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma"),
        #[cfg(all(feature = "nightly-avx", target_arch = "x86_64"))]
        Kernel::Avx512 => is_x86_feature_detected!("avx512f") && is_x86_feature_detected!("fma"),
        _ => false,
    }
}

/// Overwrites `out` with [`OUTPUT_POISON_BITS`]. No-op in release builds.
#[inline]
pub fn poison_output(out: &mut [f32]) {
    #[cfg(debug_assertions)]
    out.fill(f32::from_bits(OUTPUT_POISON_BITS));
    #[cfg(not(debug_assertions))]
    let _ = out;
}

/// Returns early with `Ok(())` from a `check_*` test fn when `kernel` can't run here.
#[macro_export]
macro_rules! skip_if_unsupported {
    ($kernel:expr, $test_name:expr) => {
        if !$crate::utilities::helpers::kernel_available($kernel) {
            eprintln!("[{}] Skipping {:?} test - kernel unavailable on this target", $test_name, $kernel);
            return Ok(());
        }
    };
}
