/// Compute kernel for the pairwise engine.
///
/// `*Batch` variants run the band schedule on the rayon pool, the others run it on the
/// calling thread. Both use the same arithmetic, so their results are bit-identical.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Kernel {
    Auto,
    Scalar,
    Avx2,
    Avx512,
    ScalarBatch,
    Avx2Batch,
    Avx512Batch,
}

impl Default for Kernel {
    fn default() -> Self {
        Kernel::Auto
    }
}

impl Kernel {
    #[inline(always)]
    pub const fn is_batch(self) -> bool {
        matches!(self, Kernel::ScalarBatch | Kernel::Avx2Batch | Kernel::Avx512Batch)
    }

    /// The single-threaded micro-kernel a variant runs. `Auto` maps to itself.
    #[inline(always)]
    pub const fn simd(self) -> Kernel {
        match self {
            Kernel::ScalarBatch => Kernel::Scalar,
            Kernel::Avx2Batch => Kernel::Avx2,
            Kernel::Avx512Batch => Kernel::Avx512,
            other => other,
        }
    }

    #[inline(always)]
    pub const fn to_batch(self) -> Kernel {
        match self {
            Kernel::Scalar => Kernel::ScalarBatch,
            Kernel::Avx2 => Kernel::Avx2Batch,
            Kernel::Avx512 => Kernel::Avx512Batch,
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_and_simd_are_inverse() {
        for k in [Kernel::Scalar, Kernel::Avx2, Kernel::Avx512] {
            assert!(!k.is_batch());
            assert!(k.to_batch().is_batch());
            assert_eq!(k.to_batch().simd(), k);
        }
        assert_eq!(Kernel::Auto.simd(), Kernel::Auto);
        assert_eq!(Kernel::default(), Kernel::Auto);
    }
}
