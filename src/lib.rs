//! # mpu401 — Emulated Roland MPU-401 MIDI Processing Unit
//!
//! An intelligent-mode MPU-401 sequencer core plus the host MIDI routing
//! fabric (handler registry, output assembler, input demultiplexer) it
//! sits behind, assembled into one `Mpu401Device`.
//!
//! ## Architecture
//!
//! - **mpu401-midi** — byte-level MIDI primitives (status-byte length
//!   table, running status, sysex framing).
//! - **mpu401-io** — the routing fabric: handler registry, output-side
//!   assembler, input-side demultiplexer.
//! - **mpu401-core** — the sequencer itself: register interface,
//!   command/data decoders, clock/tick, reference-table filtering.
//! - **mpu401-metronome** — the click tone generator driven by the
//!   sequencer's measure clock.
//!
//! ## Quick start
//!
//! ```ignore
//! use mpu401::Mpu401Device;
//! use std::sync::Arc;
//!
//! let device = Arc::new(
//!     Mpu401Device::builder()
//!         .handler(Box::new(mpu401_io::NullHandler::new()))
//!         .build()?,
//! );
//!
//! device.write_command(0x3F); // enter UART mode
//! device.write_data(0x90);
//! device.write_data(0x40);
//! device.write_data(0x7F);
//! # Ok::<(), mpu401::Error>(())
//! ```
//!
//! ## Feature flags
//!
//! - `midi-io` (default) — enables `mpu401-io`'s `midir`-backed hardware
//!   handler for the registry's discovery list.

mod builder;
mod device;
mod error;

pub use builder::Mpu401DeviceBuilder;
pub use device::Mpu401Device;
pub use error::{Error, Result};

pub use mpu401_core::{config, DeviceMode, Error as CoreError, IrqLine, MetronomeSink, Mpu401Config, NullIrqLine};
pub use mpu401_io::{HostHandler, InputDevice, MidiRouter, NullHandler, RouterFlags, SlotId};
pub use mpu401_metronome::MetronomeTone;

/// Convenience prelude for common imports.
pub mod prelude {
    pub use crate::{Mpu401Config, Mpu401Device, Mpu401DeviceBuilder};
    pub use mpu401_io::{HostHandler, SlotId};
}
