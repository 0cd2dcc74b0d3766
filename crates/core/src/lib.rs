//! Core data types for the lending-rate monitor.

pub mod apy;
pub mod rate;
pub mod threshold;

pub use apy::*;
pub use rate::*;
pub use threshold::*;
