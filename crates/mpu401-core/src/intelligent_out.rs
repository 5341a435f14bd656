//! Per-track emitter (§4.6) and the notes-off helper (§4.7): turns a
//! track's assembled buffer into bytes on the output assembler, applying
//! reference-table note-on/note-off de-duplication against the external
//! keyboard's held-key state.

use mpu401_io::{MidiRouter, SlotId};

use crate::state::{InputRef, RefTable, Track, TrackKind, NUM_CHANNELS};

/// Emits `track`'s current buffer, clearing the owning track's bit in
/// `amask` if the track has run out (a realtime stop mark), and returns
/// whether that happened (callers use this to decide whether the track is
/// still armed for the next tick).
pub fn intelligent_out(
    track: &Track,
    track_bit: u8,
    amask: &mut u8,
    ch_to_ref: &[u8; NUM_CHANNELS],
    chanref: &mut [RefTable],
    inputref: &[InputRef; NUM_CHANNELS],
    router: &MidiRouter,
) {
    match track.kind {
        TrackKind::Overflow => {}
        TrackKind::Mark => {
            if track.sys_val == 0xFC {
                router.output_rt_byte(0xFC);
                *amask &= !track_bit;
            }
        }
        TrackKind::MidiNormal => {
            emit_midi_normal(track, ch_to_ref, chanref, inputref, router);
        }
        TrackKind::MidiSystem | TrackKind::Command => {
            for &b in &track.value[..track.length as usize] {
                router.output_byte(SlotId::Mpu, b);
            }
        }
    }
}

fn emit_midi_normal(
    track: &Track,
    ch_to_ref: &[u8; NUM_CHANNELS],
    chanref: &mut [RefTable],
    inputref: &[InputRef; NUM_CHANNELS],
    router: &MidiRouter,
) {
    let chan = (track.value[0] & 0x0F) as usize;
    let key = track.value[1] & 0x7F;
    let chrefnum = ch_to_ref[chan] as usize;
    let status_hi = track.value[0] & 0xF0;

    let mut send = true;
    match status_hi {
        0x80 => {
            if inputref[chan].on && inputref[chan].keys.get(key) {
                send = false;
            } else if chanref[chrefnum].on && !chanref[chrefnum].keys.get(key) {
                send = false;
            }
            chanref[chrefnum].keys.clear(key);
        }
        0x90 => {
            if chanref[chrefnum].keys.get(key) || inputref[chan].keys.get(key) {
                router.output_byte(SlotId::Mpu, 0x80 | chan as u8);
                router.output_byte(SlotId::Mpu, key);
                router.output_byte(SlotId::Mpu, 0);
            }
            chanref[chrefnum].keys.set(key);
        }
        0xB0 if track.value[1] == 123 => {
            notes_off(chan as u8, ch_to_ref, chanref, inputref, true, router);
            return;
        }
        _ => {}
    }

    if send {
        for &b in &track.value[..track.length as usize] {
            router.output_byte(SlotId::Mpu, b);
        }
    }
}

/// Turns off every note held on `chan` (§4.7), preferring a single CC-123
/// message when no keys are being held directly by the external keyboard,
/// falling back to explicit per-key note-offs when input and sequencer
/// playback overlap.
pub fn notes_off(
    chan: u8,
    ch_to_ref: &[u8; NUM_CHANNELS],
    chanref: &mut [RefTable],
    inputref: &[InputRef; NUM_CHANNELS],
    allnotesoff_out: bool,
    router: &MidiRouter,
) {
    let has_input_held = inputref[chan as usize].keys.iter_set().next().is_some();

    if allnotesoff_out && !has_input_held {
        router.output_byte(SlotId::Mpu, 0xB0 | chan);
        router.output_byte(SlotId::Mpu, 0x7B);
        router.output_byte(SlotId::Mpu, 0x00);
        return;
    }

    let chrefnum = ch_to_ref[chan as usize] as usize;
    if chanref[chrefnum].on {
        let held: Vec<u8> = chanref[chrefnum]
            .keys
            .iter_set()
            .filter(|&k| !inputref[chan as usize].keys.get(k))
            .collect();
        for key in held {
            router.output_byte(SlotId::Mpu, 0x80 | chan);
            router.output_byte(SlotId::Mpu, key);
            router.output_byte(SlotId::Mpu, 0);
        }
        chanref[chrefnum].keys.clear_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::NUM_REF_TABLES;
    use mpu401_io::NullHandler;

    fn router_with_output() -> MidiRouter {
        let router = MidiRouter::new();
        router.register_handler(Box::new(NullHandler::new()));
        router.select_output("default", "").unwrap();
        router
    }

    fn default_refs() -> (
        [u8; NUM_CHANNELS],
        [RefTable; NUM_REF_TABLES],
        [InputRef; NUM_CHANNELS],
    ) {
        (
            [4; NUM_CHANNELS],
            Default::default(),
            Default::default(),
        )
    }

    #[test]
    fn note_on_then_note_off_round_trip_marks_and_clears_key() {
        let router = router_with_output();
        let (ch_to_ref, mut chanref, inputref) = default_refs();
        let mut amask = 0xFF;

        let on = Track {
            kind: TrackKind::MidiNormal,
            value: [0x90, 0x40, 0x7F],
            length: 3,
            ..Default::default()
        };
        intelligent_out(&on, 1, &mut amask, &ch_to_ref, &mut chanref, &inputref, &router);
        assert!(chanref[4].keys.get(0x40));

        let off = Track {
            kind: TrackKind::MidiNormal,
            value: [0x80, 0x40, 0x00],
            length: 3,
            ..Default::default()
        };
        intelligent_out(&off, 1, &mut amask, &ch_to_ref, &mut chanref, &inputref, &router);
        assert!(!chanref[4].keys.get(0x40));
    }

    #[test]
    fn mark_fc_clears_amask_bit() {
        let router = router_with_output();
        let (ch_to_ref, mut chanref, inputref) = default_refs();
        let mut amask = 0b11;
        let mark = Track {
            kind: TrackKind::Mark,
            sys_val: 0xFC,
            ..Default::default()
        };
        intelligent_out(&mark, 0b01, &mut amask, &ch_to_ref, &mut chanref, &inputref, &router);
        assert_eq!(amask, 0b10);
    }

    #[test]
    fn note_on_suppressed_retrigger_when_already_held_on_input() {
        let router = router_with_output();
        let (ch_to_ref, mut chanref, mut inputref) = default_refs();
        inputref[0].on = true;
        inputref[0].keys.set(0x40);
        let mut amask = 0xFF;
        let on = Track {
            kind: TrackKind::MidiNormal,
            value: [0x90, 0x40, 0x7F],
            length: 3,
            ..Default::default()
        };
        // Should not panic and should still mark chanref (retrigger note-off
        // is emitted first, then the note-on goes through).
        intelligent_out(&on, 1, &mut amask, &ch_to_ref, &mut chanref, &inputref, &router);
        assert!(chanref[4].keys.get(0x40));
    }

    #[test]
    fn all_notes_off_controller_clears_reference_table() {
        let router = router_with_output();
        let (ch_to_ref, mut chanref, inputref) = default_refs();
        chanref[4].on = true;
        chanref[4].keys.set(0x30);
        chanref[4].keys.set(0x31);
        let mut amask = 0xFF;
        let cc = Track {
            kind: TrackKind::MidiNormal,
            value: [0xB0, 123, 0],
            length: 3,
            ..Default::default()
        };
        intelligent_out(&cc, 1, &mut amask, &ch_to_ref, &mut chanref, &inputref, &router);
        assert!(chanref[4].keys.iter_set().next().is_none());
    }
}
