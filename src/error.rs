//! Centralized error type for the `mpu401` umbrella crate.
//!
//! Wraps the two subsystem errors so `?` propagates naturally across the
//! crate boundary during device construction.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] mpu401_core::Error),

    #[error(transparent)]
    Io(#[from] mpu401_io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
