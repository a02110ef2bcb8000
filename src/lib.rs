//! # Wireless motion-tracking gimbal
//!
//! Two-node sensor-to-actuator pipeline: a producer node samples an inertial
//! sensor and radios the readings; a consumer node tracks the sensed rotation
//! with a pan/tilt servo pair.
//!
//! ## Architecture
//! - **sender:** periodic sampling/send loop, fan-out to every registered peer,
//!   asynchronous delivery reports folded into a per-peer outcome map.
//! - **link:** unreliable peer-addressed datagram transport. `SimLink` routes
//!   in-process with configurable loss; `UdpLink` runs over real sockets.
//! - **tracker:** receive handler (elevated priority) publishes into the
//!   single-sample telemetry slot; the fixed-period control loop snapshots it,
//!   runs deadzone → integrate → clamp → map per axis, and commands the servos.
//!
//! ## Concurrency
//! - Slot publish/snapshot is a lock-free pointer swap; no torn reads, no
//!   blocking in the receive context.
//! - Per-node shutdown via a shared atomic flag; worker threads join on clear.
//! - Event trace: bounded lock-free queue → background CSV exporter.

pub mod link;
pub mod sender;
pub mod telemetry;
pub mod tracker;
pub mod util;
