//! Data-port writes (§4.5 "Data write"): tempo/mask parameter bytes,
//! direct-send (`wsd`/`wsm`) sub-state machines, and the track/conductor
//! data-write state machine.

use mpu401_io::{MidiRouter, SlotId};

use crate::eoi;
use crate::intelligent_out::intelligent_out;
use crate::irq::IrqLine;
use crate::state::{DataPhase, Mode, Mpu401State, TrackKind};
use mpu401_midi::message_length;

const CTH_DATA: [u8; 16] = [0, 0, 0, 0, 1, 0, 0, 0, 1, 0, 1, 0, 1, 1, 1, 0];

pub fn write_data(state: &mut Mpu401State, router: &MidiRouter, irq: &dyn IrqLine, val: u8) {
    if state.mode != Mode::Intelligent {
        return;
    }

    if state.command_byte != 0 {
        handle_command_byte_data(state, val);
        state.command_byte = 0;
        return;
    }

    if state.flags.wsd {
        handle_wsd(state, router, val);
        return;
    }

    if state.flags.wsm {
        handle_wsm(state, router, val);
        return;
    }

    if state.flags.track_req || state.flags.cond_req {
        handle_track_data(state, irq, val);
    }
}

fn handle_command_byte_data(state: &mut Mpu401State, val: u8) {
    match state.command_byte {
        0xE0 => {
            state.clock.tempo = (val as u16).clamp(8, 250);
            crate::clock::recompute(&mut state.clock, state.flags.sync_in);
        }
        0xE1 => state.clock.tempo_rel = val,
        0xE2 => state.clock.tempo_grad = val,
        0xE4 => state.clock.midimetro = val,
        0xE6 => state.clock.metromeas = val,
        0xE7 => {
            let base = val >> 2;
            let row = ((val & 3) as usize) * 4;
            for i in 0..4 {
                state.clock.cth_rate[i] = base + CTH_DATA[row + i];
            }
            state.clock.cth_mode = 0;
        }
        0xEC => state.tmask = val,
        0xED => state.cmask = val,
        0xEE => state.midi_mask = (state.midi_mask & 0xFF00) | val as u16,
        0xEF => state.midi_mask = (state.midi_mask & 0x00FF) | ((val as u16) << 8),
        _ => {}
    }
}

fn handle_wsd(state: &mut Mpu401State, router: &MidiRouter, val: u8) {
    if state.wsd_len == 0 {
        if val == 0xF0 {
            tracing::debug!("illegal sysex start in wsd, aborting write-single-data");
            state.flags.wsd = false;
            state.track = state.old_track;
            return;
        }
        let len = message_length(val);
        state.wsd_value[0] = val;
        state.wsd_len = len;
        state.wsd_pos = 1;
        return;
    }

    state.wsd_value[state.wsd_pos as usize] = val;
    state.wsd_pos += 1;
    if state.wsd_pos == state.wsd_len {
        let track_idx = state.track;
        let mut track = state.playbuf[track_idx];
        track.kind = TrackKind::MidiNormal;
        track.value = state.wsd_value;
        track.length = state.wsd_len;
        intelligent_out(
            &track,
            1 << track_idx,
            &mut state.amask,
            &state.ch_to_ref,
            &mut state.chanref,
            &state.inputref,
            router,
        );
        state.flags.wsd = false;
        state.wsd_len = 0;
        state.wsd_pos = 0;
        state.track = state.old_track;
    }
}

fn handle_wsm(state: &mut Mpu401State, router: &MidiRouter, val: u8) {
    if state.wsm_len == 0 && state.wsm_status == 0 {
        state.wsm_status = val;
        state.wsm_len = match val {
            0xF2 => 3,
            0xF3 => 2,
            0xF6 => 1,
            0xF0 => 0,
            _ => 1,
        };
        state.wsm_pos = 1;
        router.output_byte(SlotId::Mpu, val);
        if state.wsm_len <= 1 {
            finish_wsm(state);
        }
        return;
    }

    if state.wsm_status == 0xF0 {
        if val & 0x80 != 0 {
            router.output_byte(SlotId::Mpu, 0xF7);
            finish_wsm(state);
        } else {
            router.output_byte(SlotId::Mpu, val);
        }
        return;
    }

    router.output_byte(SlotId::Mpu, val);
    state.wsm_pos += 1;
    if state.wsm_pos >= state.wsm_len {
        finish_wsm(state);
    }
}

fn finish_wsm(state: &mut Mpu401State) {
    state.flags.wsm = false;
    state.wsm_status = 0;
    state.wsm_len = 0;
    state.wsm_pos = 0;
}

fn handle_track_data(state: &mut Mpu401State, irq: &dyn IrqLine, val: u8) {
    match state.data_onoff {
        DataPhase::Timing => {
            if val >= 0xF0 {
                state.data_onoff = DataPhase::Timing;
                eoi::run_eoi(state, irq);
                return;
            }
            let track = current_track_mut(state);
            track.counter = val as i32;
            state.flags.send_now = val == 0;
            state.data_onoff = DataPhase::Status;
        }
        DataPhase::Status => {
            let is_conductor = state.flags.cond_req;
            let track = current_track_mut(state);
            track.value[0] = val;
            if is_conductor {
                if matches!(val, 0xF8 | 0xF9 | 0xFC) {
                    track.kind = TrackKind::Overflow;
                    state.data_onoff = DataPhase::Timing;
                    state.flags.track_req = false;
                    state.flags.cond_req = false;
                    eoi::run_eoi(state, irq);
                    return;
                }
                if val & 0x80 != 0 && val != 0xE0 {
                    state.data_onoff = DataPhase::Timing;
                    state.flags.track_req = false;
                    state.flags.cond_req = false;
                    eoi::run_eoi(state, irq);
                    return;
                }
            }
            let len = message_length(val);
            if val & 0xF0 != 0xF0 {
                track.kind = TrackKind::MidiNormal;
            } else {
                track.kind = TrackKind::Mark;
                track.sys_val = val;
                if val == 0xF9 {
                    state.clock.measure_counter = 0;
                }
            }
            track.length = len.max(1);
            if len <= 1 {
                state.data_onoff = DataPhase::Timing;
                state.flags.track_req = false;
                state.flags.cond_req = false;
                eoi::run_eoi(state, irq);
            } else {
                state.data_onoff = DataPhase::Data;
            }
        }
        DataPhase::Data => {
            if state.data_pos == 0 {
                state.data_pos = 1;
            }
            let done = {
                let pos = state.data_pos;
                let track = current_track_mut(state);
                track.value[pos as usize] = val;
                pos + 1 >= track.length
            };
            state.data_pos += 1;
            if done {
                state.data_pos = 0;
                state.data_onoff = DataPhase::Timing;
                state.flags.track_req = false;
                state.flags.cond_req = false;
                eoi::run_eoi(state, irq);
            }
        }
    }
}

fn current_track_mut(state: &mut Mpu401State) -> &mut crate::state::Track {
    if state.flags.cond_req {
        &mut state.condbuf
    } else {
        &mut state.playbuf[state.track]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::irq::NullIrqLine;
    use mpu401_io::NullHandler;

    fn router() -> MidiRouter {
        let r = MidiRouter::new();
        r.register_handler(Box::new(NullHandler::new()));
        r.select_output("default", "").unwrap();
        r
    }

    #[test]
    fn tempo_data_byte_is_clamped() {
        let mut state = Mpu401State::new();
        state.mode = Mode::Intelligent;
        state.command_byte = 0xE0;
        write_data(&mut state, &router(), &NullIrqLine, 255);
        assert_eq!(state.clock.tempo, 250);
    }

    #[test]
    fn wsd_note_on_dispatches_and_restores_track() {
        let mut state = Mpu401State::new();
        state.mode = Mode::Intelligent;
        state.old_track = 3;
        state.track = 1;
        state.flags.wsd = true;
        let r = router();
        write_data(&mut state, &r, &NullIrqLine, 0x91);
        write_data(&mut state, &r, &NullIrqLine, 0x40);
        write_data(&mut state, &r, &NullIrqLine, 0x60);
        assert!(!state.flags.wsd);
        assert_eq!(state.track, 3);
    }

    #[test]
    fn wsm_f3_message_passes_through() {
        let mut state = Mpu401State::new();
        state.mode = Mode::Intelligent;
        state.flags.wsm = true;
        let r = router();
        write_data(&mut state, &r, &NullIrqLine, 0xF3);
        write_data(&mut state, &r, &NullIrqLine, 0x01);
        assert!(!state.flags.wsm);
    }
}
