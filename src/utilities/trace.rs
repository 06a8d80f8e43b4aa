//! Opt-in instrumentation for a correlation call.
//!
//! Hooks fire once per row summary and once per finished row band, never inside the
//! pairwise inner loops. Nothing is traced unless a hook is injected.

use crate::kernels::row_stats::RowSummary;
use std::ops::Range;

pub trait CorrelateTrace: Sync {
    /// Called after row `row` has been summarized and normalized.
    fn row_summary(&self, row: usize, summary: &RowSummary) {
        let _ = (row, summary);
    }

    /// Called after every coefficient of output rows `rows` has been written.
    /// `pairs` counts the lower-triangle entries (diagonal included) in the band.
    fn band_finished(&self, band: usize, rows: Range<usize>, pairs: usize) {
        let _ = (band, rows, pairs);
    }
}

/// Forwards every hook to `log::trace!` under the `vector_corr::trace` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTrace;

impl CorrelateTrace for LogTrace {
    fn row_summary(&self, row: usize, summary: &RowSummary) {
        log::trace!(
            target: "vector_corr::trace",
            "row {row}: mean = {}, centered_sum_sq = {}, degenerate = {}",
            summary.mean,
            summary.centered_sum_sq,
            summary.is_degenerate()
        );
    }

    fn band_finished(&self, band: usize, rows: Range<usize>, pairs: usize) {
        log::trace!(target: "vector_corr::trace", "band {band} rows {rows:?}: {pairs} coefficients");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Silent;
    impl CorrelateTrace for Silent {}

    #[test]
    fn default_hooks_are_noops() {
        let summary = RowSummary::from_row(&[1.0, 2.0]);
        Silent.row_summary(0, &summary);
        Silent.band_finished(0, 0..1, 1);
        LogTrace.row_summary(0, &summary);
        LogTrace.band_finished(0, 0..1, 1);
    }
}
