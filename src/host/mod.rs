//! Host-facing contract, router, and stdio bridge.

pub mod channel;
pub mod contract;
pub mod mirror;
pub mod stdio;
