//! Threshold filtering and change detection for lending rates.

pub mod detector;
pub mod monitor;

pub use detector::*;
pub use monitor::*;
