//! The output-side MIDI assembler: reconstructs complete messages and
//! sysex packets from a per-slot byte stream, applies sysex pacing, and
//! dispatches to the active host handler.

use crate::handler::HostHandler;
use crate::slot::SlotState;
use mpu401_midi::{is_invalid_short_mt32, is_sysex_start, message_length, sysex_delay_ms};
use std::time::{Duration, Instant};
use tracing::debug;

/// Capability flags gating the realtime fast path (§4.2, §6 `midioptions`).
#[derive(Debug, Clone, Copy, Default)]
pub struct RealtimeGate {
    pub realtime_enabled: bool,
    pub clock_out_enabled: bool,
}

/// Feeds one guest-emitted byte through `slot`'s assembler and, when a
/// complete message or sysex packet results, dispatches it to `handler`.
///
/// Blocks the calling thread for any pending sysex pacing delay *before*
/// processing `data` further. Callers holding a device-wide lock elsewhere
/// in the system MUST NOT call this while holding that lock — see the
/// concurrency notes on `mpu401_core`'s device state.
pub fn raw_out_byte(slot: &mut SlotState, data: u8, handler: &mut dyn HostHandler) {
    wait_out_pending_delay(slot);

    if data >= 0xF8 {
        handler.play_message(&[data]);
        return;
    }

    if slot.in_sysex() {
        if data & 0x80 == 0 {
            slot.sysex.push(data);
        } else {
            slot.sysex.finish();
            finish_sysex(slot, handler);
        }
        return;
    }

    if data & 0x80 != 0 {
        let len = message_length(data);
        slot.start_message(data, len);
        if is_sysex_start(data) {
            slot.sysex.start();
        }
        return;
    }

    if let Some(msg) = slot.push_data(data) {
        let len = slot.message_len() as usize;
        handler.play_message(&msg[..len]);
    }
}

/// The realtime-only entry point (§4.2): additionally gated by the
/// `realtime_enabled`/`clock_out_enabled` capability flags and never
/// disturbs running status or an in-flight sysex.
pub fn raw_out_rt_byte(data: u8, handler: &mut dyn HostHandler, gate: RealtimeGate) {
    if !gate.realtime_enabled {
        return;
    }
    if data == 0xF8 && !gate.clock_out_enabled {
        return;
    }
    handler.play_message(&[data]);
}

fn wait_out_pending_delay(slot: &mut SlotState) {
    if let Some(last) = slot.last_send {
        let elapsed = last.elapsed();
        let budget = Duration::from_millis(slot.delay_ms as u64);
        if elapsed < budget {
            std::thread::sleep(budget - elapsed);
        }
    }
}

fn finish_sysex(slot: &mut SlotState, handler: &mut dyn HostHandler) {
    let used = slot.sysex.used();
    let buf = slot.sysex.as_bytes().to_vec();

    if is_invalid_short_mt32(&buf, used) {
        debug!(used, "dropping invalid short MT-32 sysex");
    } else {
        handler.play_sysex(&buf);
    }

    if slot.last_send.is_some() {
        slot.delay_ms = sysex_delay_ms(&buf, used);
    }
    slot.last_send = Some(Instant::now());
    slot.sysex.reset();
    slot.running_status = 0;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::NullHandler;

    struct Recording {
        messages: Vec<Vec<u8>>,
        sysex: Vec<Vec<u8>>,
    }

    impl Recording {
        fn new() -> Self {
            Self {
                messages: Vec::new(),
                sysex: Vec::new(),
            }
        }
    }

    impl HostHandler for Recording {
        fn name(&self) -> &str {
            "recording"
        }
        fn open(&mut self, _c: &str) -> Result<(), crate::error::Error> {
            Ok(())
        }
        fn close(&mut self) {}
        fn play_message(&mut self, buf: &[u8]) {
            self.messages.push(buf.to_vec());
        }
        fn play_sysex(&mut self, buf: &[u8]) {
            self.sysex.push(buf.to_vec());
        }
    }

    #[test]
    fn assembles_note_on_with_running_status() {
        let mut slot = SlotState::new();
        let mut h = Recording::new();
        raw_out_byte(&mut slot, 0x90, &mut h);
        raw_out_byte(&mut slot, 0x40, &mut h);
        raw_out_byte(&mut slot, 0x7F, &mut h);
        assert_eq!(h.messages, vec![vec![0x90, 0x40, 0x7F]]);

        // running status: next note without a status byte
        raw_out_byte(&mut slot, 0x41, &mut h);
        raw_out_byte(&mut slot, 0x7F, &mut h);
        assert_eq!(h.messages.len(), 2);
        assert_eq!(h.messages[1], vec![0x90, 0x41, 0x7F]);
    }

    #[test]
    fn assembles_sysex() {
        let mut slot = SlotState::new();
        let mut h = Recording::new();
        for b in [0xF0, 0x41, 0x10, 0x45, 0x12, 0x00, 0xF7] {
            raw_out_byte(&mut slot, b, &mut h);
        }
        assert_eq!(h.sysex.len(), 1);
        assert_eq!(h.sysex[0], vec![0xF0, 0x41, 0x10, 0x45, 0x12, 0x00, 0xF7]);
    }

    #[test]
    fn drops_invalid_short_mt32_sysex() {
        let mut slot = SlotState::new();
        let mut h = Recording::new();
        for b in [0xF0, 0x41, 0x10, 0x16, 0xF7] {
            raw_out_byte(&mut slot, b, &mut h);
        }
        assert!(h.sysex.is_empty());
    }

    #[test]
    fn realtime_byte_bypasses_running_status() {
        let mut slot = SlotState::new();
        let mut h = Recording::new();
        raw_out_byte(&mut slot, 0x90, &mut h);
        raw_out_byte(&mut slot, 0xF8, &mut h);
        raw_out_byte(&mut slot, 0x40, &mut h);
        raw_out_byte(&mut slot, 0x7F, &mut h);
        assert_eq!(h.messages[0], vec![0xF8]);
        assert_eq!(h.messages[1], vec![0x90, 0x40, 0x7F]);
    }

    #[test]
    fn realtime_gate_blocks_when_disabled() {
        let mut h = NullHandler::new();
        let gate = RealtimeGate {
            realtime_enabled: false,
            clock_out_enabled: false,
        };
        raw_out_rt_byte(0xFA, &mut h, gate);
    }
}
