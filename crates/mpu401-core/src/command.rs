//! The command decoder (§4.5 "Command decoder"): every `0x331` write in
//! intelligent mode, atomic under the device lock.

use mpu401_io::MidiRouter;

use crate::eoi::queue_byte;
use crate::intelligent_out::notes_off;
use crate::irq::IrqLine;
use crate::reset;
use crate::state::{Mode, Mpu401State, RecordState, Track, NUM_CHANNELS};

const TIMEBASES: [u16; 7] = [48, 72, 96, 120, 144, 168, 192];

/// Whether the command path already enqueued its own response sequence
/// (version/revision/tempo/rec-counter/record-stop), in which case the
/// decoder must NOT also append the default ACK.
enum Outcome {
    Ack,
    AlreadyResponded,
}

pub fn write_command(
    state: &mut Mpu401State,
    router: &MidiRouter,
    irq: &dyn IrqLine,
    val: u8,
) {
    if val == 0xFF {
        reset::schedule(state);
        return;
    }

    if state.mode == Mode::Uart {
        return;
    }

    if state.flags.reset {
        state.cmd_pending = Some(val);
        return;
    }

    if !state.flags.midi_thru_primed {
        state.filter.midi_thru = true;
        state.flags.midi_thru_primed = true;
    }

    let outcome = dispatch(state, router, irq, val);
    if matches!(outcome, Outcome::Ack) && queue_byte(state, 0xFE) {
        irq.assert();
    }
}

fn dispatch(state: &mut Mpu401State, router: &MidiRouter, irq: &dyn IrqLine, val: u8) -> Outcome {
    match val {
        0x00..=0x2F => transport(state, router, irq, val),
        0x40..=0x7F => {
            reftable_assign(state, val);
            Outcome::Ack
        }
        0xA0..=0xA7 => {
            let t = (val & 7) as usize;
            queue_byte(state, state.playbuf[t].counter as u8);
            Outcome::AlreadyResponded
        }
        0xD0..=0xD7 => {
            state.old_track = state.track;
            state.track = (val & 7) as usize;
            state.flags.wsd = true;
            state.flags.wsd_start = true;
            state.wsd_pos = 0;
            state.wsd_len = 0;
            Outcome::Ack
        }
        0x30 => set(state, |s| s.filter.all_notes_off_stop = false),
        0x32 => set(state, |s| s.filter.rt_out = false),
        0x33 => set(state, |s| {
            s.filter.all_thru = false;
            s.filter.commonmsgs_thru = false;
            s.filter.midi_thru = false;
            for ir in s.inputref.iter_mut() {
                ir.keys.clear_all();
            }
        }),
        0x34 => set(state, |s| s.filter.timing_in_stop = true),
        0x35 => set(state, |s| s.filter.mode_msgs_in = true),
        0x37 => set(state, |s| s.filter.sysex_thru = true),
        0x38 => set(state, |s| s.filter.commonmsgs_in = true),
        0x39 => set(state, |s| s.filter.rt_in = true),
        0x3F => set(state, |s| s.mode = Mode::Uart),
        0x80 => set(state, |s| {
            if s.flags.sync_in {
                s.clock.freq_mod = 1.0;
            }
            s.flags.sync_in = false;
            crate::clock::recompute(&mut s.clock, s.flags.sync_in);
        }),
        0x82 => set(state, |s| s.flags.sync_in = true),
        0x83 => set(state, |s| s.clock.metronome_state = 0),
        0x84 => set(state, |s| s.clock.metronome_state = 1),
        0x85 => set(state, |s| s.clock.metronome_state = 2),
        0x86 => set(state, |s| s.filter.bender_in = false),
        0x87 => set(state, |s| s.filter.bender_in = true),
        0x88 => set(state, |s| {
            s.filter.midi_thru = false;
            for ir in s.inputref.iter_mut() {
                ir.on = false;
                ir.keys.clear_all();
            }
        }),
        0x89 => set(state, |s| {
            s.filter.midi_thru = true;
            for ir in s.inputref.iter_mut() {
                ir.on = true;
                ir.keys.clear_all();
            }
        }),
        0x8A => set(state, |s| s.filter.data_in_stop = false),
        0x8B => set(state, |s| s.filter.data_in_stop = true),
        0x8C => set(state, |s| s.filter.measure_end_report = false),
        0x8D => set(state, |s| s.filter.measure_end_report = true),
        0x8E => set(state, |s| s.flags.cond_set = false),
        0x8F => set(state, |s| s.flags.cond_set = true),
        0x90 => set(state, |s| s.filter.rt_affection = false),
        0x91 => set(state, |s| s.filter.rt_affection = true),
        0x94 => set(state, |s| {
            s.flags.clock_to_host = false;
            stop_clock_if_idle(s);
        }),
        0x95 => set(state, |s| s.flags.clock_to_host = true),
        0x96 => set(state, |s| {
            s.filter.sysex_in = true;
            s.filter.sysex_thru = false;
        }),
        0x97 => set(state, |s| s.filter.sysex_in = false),
        0x98..=0x9F => {
            let idx = ((val - 0x98) / 2) as usize;
            let on = (val - 0x98) % 2 == 1;
            state.chanref[idx].on = on;
            Outcome::Ack
        }
        0xAB => {
            let enqueued = queue_byte(state, 0xFE) | queue_byte(state, 0);
            state.clock.rec_counter = 0;
            if enqueued {
                irq.assert();
            }
            Outcome::AlreadyResponded
        }
        0xAC => {
            let enqueued = queue_byte(state, 0xFE) | queue_byte(state, 0x15);
            if enqueued {
                irq.assert();
            }
            Outcome::AlreadyResponded
        }
        0xAD => {
            let enqueued = queue_byte(state, 0xFE) | queue_byte(state, 0x01);
            if enqueued {
                irq.assert();
            }
            Outcome::AlreadyResponded
        }
        0xAF => {
            let enqueued = queue_byte(state, 0xFE) | queue_byte(state, (state.clock.tempo & 0xFF) as u8);
            if enqueued {
                irq.assert();
            }
            Outcome::AlreadyResponded
        }
        0xB1 => set(state, |s| s.clock.tempo_rel = 0x40),
        0xB8 => set(state, |s| {
            for t in s.playbuf.iter_mut() {
                t.counter = 0;
            }
            s.flags.conductor = s.flags.cond_set;
            s.amask = s.tmask;
        }),
        0xB9 => {
            for ch in 0..NUM_CHANNELS as u8 {
                notes_off(
                    ch,
                    &state.ch_to_ref,
                    &mut state.chanref,
                    &state.inputref,
                    state.filter.allnotesoff_out,
                    router,
                );
            }
            state.playbuf = [Track::default(); crate::state::NUM_TRACKS];
            Outcome::Ack
        }
        0xBA => set(state, |s| s.clock.rec_counter = 0),
        0xC2..=0xC8 => {
            let idx = ((val - 0xC2) as usize).min(TIMEBASES.len() - 1);
            state.clock.timebase = TIMEBASES[idx];
            crate::clock::recompute(&mut state.clock, state.flags.sync_in);
            Outcome::Ack
        }
        0xDF => set(state, |s| {
            s.flags.wsm = true;
            s.wsm_pos = 0;
            s.wsm_len = 0;
            s.wsm_status = 0;
        }),
        0xE0 | 0xE1 | 0xE2 | 0xE4 | 0xE6 | 0xE7 | 0xEC | 0xED | 0xEE | 0xEF => {
            state.command_byte = val;
            Outcome::Ack
        }
        _ => Outcome::Ack,
    }
}

fn set(state: &mut Mpu401State, f: impl FnOnce(&mut Mpu401State)) -> Outcome {
    f(state);
    Outcome::Ack
}

/// Clears `clock.active` once nothing still needs the clock running:
/// playback stopped, recording not in progress, and clock-to-host off.
fn stop_clock_if_idle(state: &mut Mpu401State) {
    if !state.flags.playing && state.rec != RecordState::On && !state.flags.clock_to_host {
        state.clock.active = false;
    }
}

fn reftable_assign(state: &mut Mpu401State, val: u8) {
    let table = ((val >> 4) - 4) as usize;
    let new_chan = (val & 0x0F) as usize;
    let prev_chan = state.chanref[table].chan as usize;
    if prev_chan != new_chan {
        state.ch_to_ref[prev_chan] = 4;
    }
    state.chanref[table].chan = new_chan as u8;
    state.ch_to_ref[new_chan] = table as u8;
}

fn transport(state: &mut Mpu401State, router: &MidiRouter, irq: &dyn IrqLine, val: u8) -> Outcome {
    match val & 3 {
        1 => {
            router.output_rt_byte(0xFC);
            state.clock.meas_old = state.clock.measure_counter;
            state.clock.cth_old = state.clock.cth_counter;
            state.last_rtcmd = 0xFC;
        }
        2 => {
            router.output_rt_byte(0xFB);
            state.clock.measure_counter = 0;
            state.clock.cth_counter = 0;
            state.last_rtcmd = 0xFB;
        }
        3 => {
            router.output_rt_byte(0xFA);
            state.clock.measure_counter = state.clock.meas_old;
            state.clock.cth_counter = state.clock.cth_old;
            state.last_rtcmd = 0xFA;
        }
        _ => {}
    }

    match val & 0xC {
        4 => {
            state.flags.playing = false;
            for ch in 0..NUM_CHANNELS as u8 {
                notes_off(
                    ch,
                    &state.ch_to_ref,
                    &mut state.chanref,
                    &state.inputref,
                    state.filter.allnotesoff_out,
                    router,
                );
            }
            state.prchg_mask = 0;
            stop_clock_if_idle(state);
        }
        8 => {
            state.flags.playing = true;
            state.clock.active = true;
        }
        _ => {}
    }

    let mut outcome = Outcome::Ack;
    match val & 0x30 {
        0x10 => {
            state.rec = RecordState::Off;
            let mut enqueued = queue_byte(state, 0xFE);
            enqueued |= queue_byte(state, (state.clock.rec_counter & 0xFF) as u8);
            enqueued |= queue_byte(state, 0xFC);
            state.clock.rec_counter = 0;
            if enqueued {
                irq.assert();
            }
            stop_clock_if_idle(state);
            outcome = Outcome::AlreadyResponded;
        }
        0x20 => {
            state.rec = RecordState::Standby;
            if matches!(state.last_rtcmd, 0xFA | 0xFB) {
                state.rec = RecordState::On;
                state.clock.active = true;
            }
            // Prism/Ballade compatibility hack: kept verbatim, it is
            // observable hardware behavior rather than a bug.
            state.record_queue.push((state.clock.rec_counter & 0xFF) as u8);
            flush_program_changes(state);
        }
        0x00 => {
            if state.rec == RecordState::Standby && matches!(state.last_rtcmd, 0xFA | 0xFB) {
                state.rec = RecordState::On;
                state.clock.active = true;
            }
        }
        _ => {}
    }

    outcome
}

fn flush_program_changes(state: &mut Mpu401State) {
    for ch in 0..NUM_CHANNELS {
        if state.prchg_mask & (1 << ch) != 0 {
            let rec = (state.clock.rec_counter & 0xFF) as u8;
            state.record_queue.push(rec);
            state.record_queue.push(0xC0 | ch as u8);
            state.record_queue.push(state.prchg_buf[ch]);
        }
    }
    state.prchg_mask = 0;
}
