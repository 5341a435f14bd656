//! The four-port guest-visible register interface (§4.4): status
//! composition, the data-port dequeue with its post-read bookkeeping, and
//! the write ports. In UART mode writes bypass the sequencer entirely and
//! go straight to the output assembler, matching the real hardware's
//! transparent byte-pump behavior; in intelligent mode they are decoded.

use mpu401_io::{MidiRouter, SlotId};

use crate::command;
use crate::data;
use crate::eoi;
use crate::irq::IrqLine;
use crate::state::{DataPhase, Mode, Mpu401State};

const STATUS_OUTPUT_NOT_READY: u8 = 0x80;
const STATUS_INPUT_NOT_READY: u8 = 0x40;

/// Status byte read at 0x331. Bit 7 clear iff the output queue holds a
/// byte the guest can read; bit 6 set iff a command is pending
/// acknowledgement, or (with the throttled-status variant installed)
/// reflects `tx_ready` instead. All other bits read 1.
pub fn read_status(state: &Mpu401State, throttle: bool) -> u8 {
    let mut status = 0xFF;
    if !state.output_queue.is_empty() {
        status &= !STATUS_OUTPUT_NOT_READY;
    }
    let busy = if throttle {
        !state.flags.tx_ready
    } else {
        state.cmd_pending.is_some()
    };
    if busy {
        status &= !STATUS_INPUT_NOT_READY;
    }
    status
}

/// Data read at 0x330: dequeues one byte from the output queue and runs
/// the post-read bookkeeping (§4.4). Returns `0xFF` (all bits set, matching
/// an empty bus read) if the queue was already empty.
pub fn read_data(state: &mut Mpu401State, router: &MidiRouter, irq: &dyn IrqLine) -> u8 {
    let byte = match state.output_queue.pop() {
        Some(b) => b,
        None => return 0xFF,
    };

    if state.output_queue.is_empty() {
        irq.deassert();
    }

    match byte {
        0xF0..=0xF7 => {
            state.track = (byte & 7) as usize;
            state.data_onoff = DataPhase::Timing;
            state.flags.cond_req = false;
            state.flags.track_req = true;
        }
        0xF9 => {
            state.flags.cond_req = true;
            state.flags.track_req = false;
            state.data_onoff = DataPhase::Timing;
            if let Some(pending) = state.cmd_pending.take() {
                state.flags.block_ack = true;
                command::write_command(state, router, irq, pending);
            }
        }
        0xFC | 0xFD | 0xFE | 0xF8 => {
            eoi::run_eoi(state, irq);
        }
        _ => {}
    }

    if state.flags.rec_copy && state.record_queue.is_empty() {
        state.flags.rec_copy = false;
        eoi::run_eoi(state, irq);
    } else if state.output_queue.is_empty() {
        if let Some(rec_byte) = state.record_queue.pop() {
            state.flags.rec_copy = true;
            if eoi::queue_byte(state, rec_byte) {
                irq.assert();
            }
        }
    }

    byte
}

/// Data write at 0x330.
pub fn write_data(state: &mut Mpu401State, router: &MidiRouter, irq: &dyn IrqLine, val: u8) {
    if state.mode == Mode::Uart {
        router.output_byte(SlotId::Mpu, val);
        return;
    }
    data::write_data(state, router, irq, val);
}

/// Command write at 0x331.
pub fn write_command(state: &mut Mpu401State, router: &MidiRouter, irq: &dyn IrqLine, val: u8) {
    command::write_command(state, router, irq, val);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::irq::test_support::CountingIrqLine;
    use mpu401_io::NullHandler;
    use std::sync::atomic::Ordering;

    fn router() -> MidiRouter {
        let r = MidiRouter::new();
        r.register_handler(Box::new(NullHandler::new()));
        r.select_output("default", "").unwrap();
        r
    }

    #[test]
    fn status_reflects_empty_output_queue() {
        let state = Mpu401State::new();
        assert_eq!(read_status(&state, false) & STATUS_OUTPUT_NOT_READY, STATUS_OUTPUT_NOT_READY);
    }

    #[test]
    fn status_clears_output_bit_once_queued() {
        let mut state = Mpu401State::new();
        state.output_queue.push(0xFE);
        assert_eq!(read_status(&state, false) & STATUS_OUTPUT_NOT_READY, 0);
    }

    #[test]
    fn reading_empty_queue_returns_0xff() {
        let mut state = Mpu401State::new();
        let irq = CountingIrqLine::default();
        assert_eq!(read_data(&mut state, &router(), &irq), 0xFF);
    }

    #[test]
    fn reading_last_byte_deasserts_irq() {
        let mut state = Mpu401State::new();
        state.output_queue.push(0x10);
        let irq = CountingIrqLine::default();
        read_data(&mut state, &router(), &irq);
        assert_eq!(irq.deasserts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn track_data_request_byte_primes_the_write_state_machine() {
        let mut state = Mpu401State::new();
        state.output_queue.push(0xF2);
        let irq = CountingIrqLine::default();
        read_data(&mut state, &router(), &irq);
        assert!(state.flags.track_req);
        assert_eq!(state.track, 2);
    }

    #[test]
    fn command_request_byte_primes_conductor_and_replays_pending() {
        let mut state = Mpu401State::new();
        state.mode = Mode::Intelligent;
        state.output_queue.push(0xF9);
        state.cmd_pending = Some(0x83);
        let irq = CountingIrqLine::default();
        read_data(&mut state, &router(), &irq);
        assert!(state.flags.cond_req);
        assert_eq!(state.clock.metronome_state, 0);
        assert!(state.cmd_pending.is_none());
    }

    #[test]
    fn record_queue_is_drained_into_output_queue_when_output_empties() {
        let mut state = Mpu401State::new();
        state.output_queue.push(0x42);
        state.record_queue.push(0x55);
        let irq = CountingIrqLine::default();
        read_data(&mut state, &router(), &irq);
        assert!(state.flags.rec_copy);
        assert_eq!(state.output_queue.pop(), Some(0x55));
    }

    #[test]
    fn uart_mode_write_bypasses_sequencer() {
        let mut state = Mpu401State::new();
        state.mode = Mode::Uart;
        write_data(&mut state, &router(), &CountingIrqLine::default(), 0x90);
        assert!(!state.flags.track_req);
    }
}
