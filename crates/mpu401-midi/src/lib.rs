//! Byte-level MIDI primitives shared by the host routing fabric and the
//! intelligent sequencer core: the status-byte length table, realtime/sysex
//! byte classification, and a small sysex accumulator. No I/O, no state
//! machine — those live one layer up.

pub mod status;
pub mod sysex;

pub use status::{is_realtime, is_status_byte, is_sysex_start, message_length, SYSEX_SIZE};
pub use sysex::{delay_ms as sysex_delay_ms, is_invalid_short_mt32, SysexBuf};
