use thiserror::Error;

/// API-contract errors at the Rust boundary. Guest-triggered degraded
/// conditions (illegal command sequences, queue overflow, malformed
/// sysex) are never represented here — per §7 they are logged and handled
/// in place, not surfaced as `Err`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O port {0:#06x} is not part of the MPU-401 register interface")]
    UnknownPort(u16),

    #[error(transparent)]
    Io(#[from] mpu401_io::Error),

    #[error("invalid configuration value for key {key:?}: {value:?}")]
    InvalidConfig { key: String, value: String },
}
