//! telemetry.rs
//! Shared wire schema for the sensor stream: one fixed-size record per datagram.
//! - both nodes compile against this module, so layout agreement is by construction
//! - strict length check on decode; undersized/oversized payloads are rejected, never truncated

use thiserror::Error;

/// Gyro components in deg/s, accel in m/s². One record per radio datagram.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TelemetryRecord {
    pub accel: [f32; 3],
    pub gyro: [f32; 3],
}

/// Wire image: accel x,y,z then gyro x,y,z, little-endian f32, no header.
pub const WIRE_SIZE: usize = 6 * 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("payload length {got} does not match wire size {expected}")]
    BadLength { got: usize, expected: usize },
}

/// Spatial axis selector for the control configuration (pan tracks Z, tilt tracks X
/// in the stock mounting).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GyroAxis {
    X,
    Y,
    Z,
}

impl GyroAxis {
    #[inline]
    pub fn index(self) -> usize {
        match self {
            GyroAxis::X => 0,
            GyroAxis::Y => 1,
            GyroAxis::Z => 2,
        }
    }
}

impl TelemetryRecord {
    pub const ZERO: Self = Self {
        accel: [0.0; 3],
        gyro: [0.0; 3],
    };

    #[inline]
    pub fn rate(&self, axis: GyroAxis) -> f32 {
        self.gyro[axis.index()]
    }

    pub fn encode(&self) -> [u8; WIRE_SIZE] {
        let mut buf = [0u8; WIRE_SIZE];
        for (i, v) in self.accel.iter().chain(self.gyro.iter()).enumerate() {
            buf[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
        }
        buf
    }

    /// Decodes a received payload. Length is validated first: a record from a
    /// mismatched peer build must be dropped, not read as garbage.
    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() != WIRE_SIZE {
            return Err(CodecError::BadLength {
                got: buf.len(),
                expected: WIRE_SIZE,
            });
        }

        let mut words = [0f32; 6];
        for (i, w) in words.iter_mut().enumerate() {
            let mut le = [0u8; 4];
            le.copy_from_slice(&buf[i * 4..i * 4 + 4]);
            *w = f32::from_le_bytes(le);
        }

        Ok(Self {
            accel: [words[0], words[1], words[2]],
            gyro: [words[3], words[4], words[5]],
        })
    }
}
