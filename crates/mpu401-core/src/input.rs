//! Input path (§4.8): demultiplexed external MIDI arriving on the host
//! input thread, filtered and folded into the device state or forwarded
//! to the output assembler.
//!
//! `Mpu401InputSink` is the `mpu401_io::InputSink` adapter registered with
//! the router; it owns no state of its own beyond the shared device lock,
//! acquiring it for the duration of each callback and releasing it before
//! returning, since the demultiplexer calls these methods from outside any
//! device-wide lock the emulation thread might be holding.

use std::sync::Arc;

use parking_lot::Mutex;

use mpu401_io::{InputSink, MidiRouter, SlotId};

use crate::command;
use crate::irq::IrqLine;
use crate::state::{Mode, Mpu401State, RecordState};

pub struct Mpu401InputSink {
    state: Arc<Mutex<Mpu401State>>,
    router: Arc<MidiRouter>,
    irq: Arc<dyn IrqLine>,
}

impl Mpu401InputSink {
    pub fn new(state: Arc<Mutex<Mpu401State>>, router: Arc<MidiRouter>, irq: Arc<dyn IrqLine>) -> Self {
        Self { state, router, irq }
    }
}

impl InputSink for Mpu401InputSink {
    fn input_message(&mut self, msg: &[u8]) {
        let mut state = self.state.lock();
        handle_input_message(&mut state, &self.router, self.irq.as_ref(), msg);
    }

    fn input_sysex(&mut self, buf: &[u8]) -> usize {
        let mut state = self.state.lock();
        input_sysex_bytes(&mut state, &self.router, buf)
    }

    fn input_sysex_abort(&mut self) {
        let mut state = self.state.lock();
        state.record_queue.clear();
    }
}

/// Dispatches one fully-assembled input message (already length-validated
/// and running-status-expanded by the caller).
pub fn handle_input_message(state: &mut Mpu401State, router: &MidiRouter, irq: &dyn IrqLine, msg: &[u8]) {
    if msg.is_empty() {
        return;
    }
    let status = msg[0];

    if state.mode != Mode::Intelligent {
        for &b in msg {
            state.output_queue.push(b);
        }
        state.flags.irq_pending = true;
        irq.assert();
        return;
    }

    if status >= 0xF8 {
        handle_realtime(state, router, irq, status);
        return;
    }

    if matches!(status & 0xF0, 0xF0) {
        handle_common(state, router, msg);
        return;
    }

    handle_channel_message(state, router, msg);
}

fn handle_channel_message(state: &mut Mpu401State, router: &MidiRouter, msg: &[u8]) {
    let status = msg[0];
    let chan = (status & 0x0F) as usize;
    if state.midi_mask & (1 << chan) == 0 {
        return;
    }

    match status & 0xF0 {
        0xA0 | 0xD0 | 0xE0 => {
            if state.filter.bender_in {
                forward_thru(state, router, msg);
            }
        }
        0xC0 => {
            if !state.filter.data_in_stop {
                if state.rec == RecordState::On {
                    let rec = (state.clock.rec_counter & 0xFF) as u8;
                    state.record_queue.push(rec);
                    state.record_queue.push(status);
                    state.record_queue.push(msg[1]);
                } else {
                    state.prchg_buf[chan] = msg[1];
                    state.prchg_mask |= 1 << chan;
                }
            }
            forward_thru(state, router, msg);
        }
        0xB0 if msg.get(1) == Some(&123) => {
            crate::intelligent_out::notes_off(
                chan as u8,
                &state.ch_to_ref,
                &mut state.chanref,
                &state.inputref,
                state.filter.allnotesoff_out,
                router,
            );
            state.inputref[chan].keys.clear_all();
        }
        0x80 | 0x90 => handle_note(state, router, chan, status & 0xF0, msg),
        _ => forward_thru(state, router, msg),
    }
}

/// Note on/off from the external keyboard (§4.8, retrigger logic symmetric
/// to §4.6's `emit_midi_normal`): a note-on re-striking a key already held
/// by the sequencer's reference table forces a clean retrigger first.
fn handle_note(state: &mut Mpu401State, router: &MidiRouter, chan: usize, kind: u8, msg: &[u8]) {
    let key = msg[1] & 0x7F;
    let chrefnum = state.ch_to_ref[chan] as usize;

    if kind == 0x90 {
        if state.inputref[chan].keys.get(key) || state.chanref[chrefnum].keys.get(key) {
            if state.filter.all_thru && state.filter.midi_thru {
                router.output_byte(SlotId::Thru, 0x80 | chan as u8);
                router.output_byte(SlotId::Thru, key);
                router.output_byte(SlotId::Thru, 0);
            }
        }
        state.inputref[chan].keys.set(key);
    } else {
        state.inputref[chan].keys.clear(key);
    }

    forward_thru(state, router, msg);
}

fn forward_thru(state: &Mpu401State, router: &MidiRouter, msg: &[u8]) {
    if state.filter.all_thru && state.filter.midi_thru {
        for &b in msg {
            router.output_byte(SlotId::Thru, b);
        }
    }
}

fn handle_common(state: &mut Mpu401State, router: &MidiRouter, msg: &[u8]) {
    if state.filter.commonmsgs_thru {
        for &b in msg {
            router.output_byte(SlotId::Thru, b);
        }
    }
    if state.filter.commonmsgs_in {
        for &b in msg {
            state.record_queue.push(b);
        }
    }
}

fn handle_realtime(state: &mut Mpu401State, router: &MidiRouter, irq: &dyn IrqLine, status: u8) {
    match status {
        0xF8 => {
            if state.flags.sync_in && state.clock.active {
                crate::clock::sync_in_adjust(&mut state.clock);
                crate::clock::recompute(&mut state.clock, true);
            }
        }
        0xFC => command::write_command(state, router, irq, 1),
        0xFB => command::write_command(state, router, irq, 2),
        0xFA => command::write_command(state, router, irq, 3),
        0xFF => {}
        _ => {
            if state.filter.rt_in {
                state.record_queue.push(0xFF);
                state.record_queue.push(status);
            }
        }
    }
}

/// Streams a sysex buffer into the device (§4.8). Returns the count of
/// trailing bytes the record queue could not accept, per the
/// `InputSink::input_sysex` contract.
fn input_sysex_bytes(state: &mut Mpu401State, router: &MidiRouter, buf: &[u8]) -> usize {
    if state.mode != Mode::Intelligent {
        for &b in buf {
            state.output_queue.push(b);
        }
        return 0;
    }

    if state.filter.sysex_thru {
        for &b in buf {
            router.output_byte(SlotId::Thru, b);
        }
    }

    if !state.filter.sysex_in {
        return 0;
    }

    if !state.record_queue.push(0xFF) {
        return buf.len();
    }
    let mut accepted = 0;
    for &b in buf {
        if !state.record_queue.push(b) {
            break;
        }
        accepted += 1;
    }
    buf.len() - accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::irq::test_support::CountingIrqLine;
    use mpu401_io::NullHandler;

    fn router() -> MidiRouter {
        let r = MidiRouter::new();
        r.register_handler(Box::new(NullHandler::new()));
        r.select_output("default", "").unwrap();
        r
    }

    #[test]
    fn uart_mode_input_queues_raw_bytes() {
        let mut state = Mpu401State::new();
        let irq = CountingIrqLine::default();
        handle_input_message(&mut state, &router(), &irq, &[0x90, 0x40, 0x7F]);
        assert_eq!(state.output_queue.len(), 3);
    }

    #[test]
    fn note_on_marks_inputref_and_note_off_clears_it() {
        let mut state = Mpu401State::new();
        state.mode = Mode::Intelligent;
        let r = router();
        let irq = CountingIrqLine::default();
        handle_input_message(&mut state, &r, &irq, &[0x90, 0x40, 0x7F]);
        assert!(state.inputref[0].keys.get(0x40));
        handle_input_message(&mut state, &r, &irq, &[0x80, 0x40, 0x00]);
        assert!(!state.inputref[0].keys.get(0x40));
    }

    #[test]
    fn masked_channel_is_ignored() {
        let mut state = Mpu401State::new();
        state.mode = Mode::Intelligent;
        state.midi_mask &= !1;
        handle_input_message(&mut state, &router(), &CountingIrqLine::default(), &[0x90, 0x40, 0x7F]);
        assert!(!state.inputref[0].keys.get(0x40));
    }

    #[test]
    fn realtime_start_invokes_transport_shortcut() {
        let mut state = Mpu401State::new();
        state.mode = Mode::Intelligent;
        handle_input_message(&mut state, &router(), &CountingIrqLine::default(), &[0xFA]);
        assert_eq!(state.last_rtcmd, 0xFA);
    }

    #[test]
    fn active_sensing_is_recorded_when_rt_in_enabled() {
        let mut state = Mpu401State::new();
        state.mode = Mode::Intelligent;
        state.filter.rt_in = true;
        handle_input_message(&mut state, &router(), &CountingIrqLine::default(), &[0xFE]);
        assert_eq!(state.record_queue.len(), 2);
    }

    #[test]
    fn sysex_in_frames_with_0xff_and_records() {
        let mut state = Mpu401State::new();
        state.mode = Mode::Intelligent;
        state.filter.sysex_in = true;
        let unaccepted = input_sysex_bytes(&mut state, &router(), &[0xF0, 0x41, 0xF7]);
        assert_eq!(unaccepted, 0);
        assert_eq!(state.record_queue.len(), 4);
    }
}
