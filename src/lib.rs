#![cfg_attr(all(feature = "nightly-avx", rustc_is_nightly), feature(stdarch_x86_avx512))]
#![cfg_attr(all(feature = "nightly-avx", rustc_is_nightly), feature(avx512_target_feature))]
#![allow(clippy::needless_range_loop)]

//! Pairwise Pearson correlation between every pair of rows of a dense `f32` matrix.
//!
//! The entry point is [`correlate::correlate`]; see [`correlate`] for the builder API and
//! [`kernels`] for the row-statistics, pairwise and triangular-writer stages.

pub mod correlate;
pub mod kernels;
pub mod utilities;

pub use correlate::{
    correlate, correlate_into, correlate_with_kernel, CorrelateBuilder, CorrelateError, CorrelateInput,
    CorrelateOutput, CorrelateParams, MatrixShape, ZeroVariancePolicy,
};
pub use utilities::enums::Kernel;
pub use utilities::trace::{CorrelateTrace, LogTrace};

#[cfg(all(test, not(target_arch = "wasm32")))]
mod _rayon_test_pool {
    use ctor::ctor;
    use rayon::ThreadPoolBuilder;

    #[ctor]
    fn init_rayon_pool() {
        let _ = ThreadPoolBuilder::new()
            .num_threads(4)
            .stack_size(8 * 1024 * 1024)
            .build_global();
    }
}
