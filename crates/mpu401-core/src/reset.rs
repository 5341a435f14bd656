//! Reset (§4.5 "Reset"): `0xFF` schedules an asynchronous completion
//! roughly 14 ms later; any command arriving in between is remembered and
//! replayed once the reset actually lands.

use std::time::{Duration, Instant};

use mpu401_io::MidiRouter;

use crate::clock;
use crate::state::{Mode, Mpu401State, NUM_CHANNELS};

pub const RESET_BUSY: Duration = Duration::from_millis(14);

/// Marks a reset as in progress. Call sites must stop acting on `state`
/// except to remember a pending command (§4.5: "any non-0xFF command is
/// remembered in `cmd_pending` and replayed on completion").
pub fn schedule(state: &mut Mpu401State) {
    state.flags.reset = true;
    state.reset_deadline = Some(Instant::now() + RESET_BUSY);
}

/// True once the busy window has elapsed and the reset is due to complete.
pub fn is_due(state: &Mpu401State) -> bool {
    state.flags.reset
        && state
            .reset_deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
}

/// Performs the actual reset: re-zeroes state (preserving only which
/// personality this device was configured for), restores the default
/// clock/filter/reference-table setup, clears both ring buffers, and sends
/// "all notes off" on every channel. Returns the command byte to replay,
/// if one arrived during the busy window.
pub fn complete(state: &mut Mpu401State, router: &MidiRouter, configured_intelligent: bool) -> Option<u8> {
    let pending = state.cmd_pending.take();
    *state = Mpu401State::new();
    state.mode = if configured_intelligent {
        Mode::Intelligent
    } else {
        Mode::Uart
    };
    clock::recompute(&mut state.clock, false);

    for ch in 0..NUM_CHANNELS as u8 {
        router.output_byte(mpu401_io::SlotId::Mpu, 0xB0 | ch);
        router.output_byte(mpu401_io::SlotId::Mpu, 0x7B);
        router.output_byte(mpu401_io::SlotId::Mpu, 0x00);
    }

    pending
}
