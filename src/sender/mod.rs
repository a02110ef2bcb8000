//! Producer node: poll the inertial sensor, encode, fan the record out to every
//! registered peer. Fire-and-forget; delivery outcomes come back asynchronously
//! and only feed logging and the per-peer outcome map.

pub mod sampler;
pub mod transmitter;

pub use sampler::{SampleSource, SimImu};
pub use transmitter::{SenderCounters, Transmitter, TransmitterConfig};
