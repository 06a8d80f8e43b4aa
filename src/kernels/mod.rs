//! The three stages of a correlation call, plus a reference oracle.
//!
//! [`row_stats`] summarizes and normalizes each row once, [`pairwise`] reduces tiles of row
//! pairs, [`schedule`] splits the triangle into balanced tasks and [`triangular`] owns the
//! output layout.

pub mod pairwise;
pub mod reference;
pub mod row_stats;
pub mod schedule;
pub mod triangular;
