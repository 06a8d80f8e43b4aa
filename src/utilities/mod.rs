pub mod aligned_vector;
pub mod enums;
pub mod helpers;
pub mod trace;
