use thiserror::Error;

/// Errors surfaced by the routing fabric's Rust API boundary.
///
/// Per the device's error-handling design, guest-triggered degraded
/// conditions (dropped bytes, illegal sub-state transitions, sysex
/// overflow) are never represented here — they are logged via `tracing`
/// and handled in place. These variants cover the narrower set of
/// programming-contract violations: a handler that refuses to open.
#[derive(Debug, Error)]
pub enum Error {
    #[error("MIDI handler {0:?} failed to open: {1}")]
    HandlerOpenFailed(String, String),

    #[error("no registered handler accepted the given configuration")]
    NoHandlerAvailable,
}
