//! Host MIDI routing fabric: the handler registry, the output-side
//! assembler, and the input-side demultiplexer that sit between the
//! emulated MIDI peripherals and a real MIDI backend.

pub mod assembler;
pub mod error;
pub mod handler;
pub mod input;
pub mod registry;
pub mod router;
pub mod slot;

pub use error::Error;
pub use handler::{HostHandler, NullHandler};
pub use input::InputSink;
pub use registry::HandlerRegistry;
pub use router::{InputDevice, MidiRouter, RouterFlags};
pub use slot::SlotId;

#[cfg(feature = "midi-io")]
pub use handler::midir_backend;
