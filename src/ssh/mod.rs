//! SSH transport, per-host worker state machine, and the parallel
//! executor that drives a build across many hosts concurrently.

pub mod events;
pub mod executor;
pub mod transport;
pub mod worker;
