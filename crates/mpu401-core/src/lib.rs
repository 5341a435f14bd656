//! MPU-401 register interface (§4.4) and intelligent sequencer (§4.5–§4.8):
//! state, command/data decoders, clock/tick, EOI, intelligent-out, reset,
//! and configuration parsing.
//!
//! `Mpu401Core` is the crate's single public entry point: a `&self`-only
//! wrapper around a `parking_lot::Mutex<Mpu401State>` shared with the
//! registered [`input::Mpu401InputSink`], implementing the four register
//! operations and the scheduler-driven tick event.

pub mod clock;
pub mod command;
pub mod config;
pub mod data;
pub mod eoi;
pub mod error;
pub mod input;
pub mod intelligent_out;
pub mod irq;
pub mod metronome;
pub mod register;
pub mod reset;
pub mod ringbuffer;
pub mod state;

pub use config::{DeviceMode, Mpu401Config};
pub use error::Error;
pub use irq::{IrqLine, NullIrqLine};
pub use metronome::{MetronomeSink, NullMetronome};
pub use state::{Mode, Mpu401State};

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use mpu401_io::MidiRouter;

use state::{RecordState, TrackKind, NUM_TRACKS};

/// The MPU-401 device core, minus the guest-visible I/O port wiring (owned
/// by the root crate) and the host MIDI backend (owned by `mpu401-io`'s
/// registry).
pub struct Mpu401Core {
    state: Arc<Mutex<Mpu401State>>,
    router: Arc<MidiRouter>,
    irq: Arc<dyn IrqLine>,
    metronome: Arc<dyn MetronomeSink>,
    configured_intelligent: bool,
    throttle: bool,
}

impl Mpu401Core {
    pub fn new(
        router: Arc<MidiRouter>,
        irq: Arc<dyn IrqLine>,
        metronome: Arc<dyn MetronomeSink>,
        config: &Mpu401Config,
    ) -> Self {
        let mut state = Mpu401State::new();
        let configured_intelligent = !matches!(config.mode, DeviceMode::Uart);
        state.mode = match config.mode {
            DeviceMode::Uart | DeviceMode::Disabled => Mode::Uart,
            DeviceMode::Intelligent => Mode::Intelligent,
        };
        clock::recompute(&mut state.clock, false);

        if config.delay_sysex {
            router.prime_sysex_delay();
        }

        Self {
            state: Arc::new(Mutex::new(state)),
            router,
            irq,
            metronome,
            configured_intelligent,
            throttle: config.options.throttle,
        }
    }

    /// Builds the [`InputSink`](mpu401_io::InputSink) adapter for
    /// registration against the shared router (§4.8); it shares this
    /// core's device lock rather than owning a copy of the state.
    pub fn input_sink(&self) -> input::Mpu401InputSink {
        input::Mpu401InputSink::new(Arc::clone(&self.state), Arc::clone(&self.router), Arc::clone(&self.irq))
    }

    pub fn read_data(&self) -> u8 {
        let mut state = self.state.lock();
        register::read_data(&mut state, &self.router, self.irq.as_ref())
    }

    pub fn write_data(&self, val: u8) {
        let mut state = self.state.lock();
        register::write_data(&mut state, &self.router, self.irq.as_ref(), val);
    }

    pub fn read_status(&self) -> u8 {
        let state = self.state.lock();
        register::read_status(&state, self.throttle)
    }

    pub fn write_command(&self, val: u8) {
        let mut state = self.state.lock();
        register::write_command(&mut state, &self.router, self.irq.as_ref(), val);
    }

    /// Runs one sequencer tick (§4.5 "Clock and tick event", steps 1-8) and
    /// returns the interval the caller should wait before the next one.
    pub fn tick(&self) -> Duration {
        let mut state = self.state.lock();

        if reset::is_due(&state) {
            if let Some(pending) = reset::complete(&mut state, &self.router, self.configured_intelligent) {
                drop(state);
                self.write_command(pending);
                state = self.state.lock();
            }
        }

        if state.flags.irq_pending {
            return clock::tick_interval(&state.clock);
        }

        // Step 2: per-track counters.
        for i in 0..NUM_TRACKS {
            if state.amask & (1 << i) == 0 {
                continue;
            }
            state.playbuf[i].counter -= 1;
            if state.playbuf[i].counter <= 0 {
                update_track(&mut state, i, &self.router);
            }
        }

        // Step 3: conductor.
        if state.flags.conductor {
            state.condbuf.counter -= 1;
            if state.condbuf.counter <= 0 {
                state.condbuf.counter = 0xF0;
                state.req_mask |= 1 << 9;
            }
        }

        // Step 4: clock-to-host ticks.
        if state.flags.clock_to_host {
            state.clock.cth_counter += 1;
            let rate = state.clock.cth_rate[state.clock.cth_mode] as u32;
            if state.clock.cth_counter >= rate.max(1) {
                state.clock.cth_counter = 0;
                state.clock.cth_mode = (state.clock.cth_mode + 1) % 4;
                state.req_mask |= 1 << 13;
            }
        }

        // Step 5: recording tick count.
        if state.rec == RecordState::On {
            state.clock.rec_counter += 1;
            if state.clock.rec_counter >= 240 {
                state.clock.rec_counter = 0;
                state.req_mask |= 1 << 8;
            }
        }

        // Step 6: measure bookkeeping and metronome.
        if state.flags.playing || state.rec == RecordState::On {
            state.clock.measure_counter += 1;
            let measure_len = (state.clock.timebase as u32 * state.clock.midimetro as u32 * state.clock.metromeas as u32) / 24;
            if state.clock.measure_counter >= measure_len.max(1) {
                if state.filter.rt_out {
                    self.router.output_rt_byte(0xF8);
                }
                state.clock.measure_counter = 0;
                if state.filter.measure_end_report {
                    state.req_mask |= 1 << 12;
                }
                if state.clock.metronome_state != 0 {
                    self.metronome.trigger(state.clock.metronome_state == 2);
                }
            } else {
                let subtick = ((state.clock.timebase as u32 / 24).max(1)) * state.clock.midimetro as u32;
                if subtick > 0 && state.clock.measure_counter % subtick == 0 && state.clock.metronome_state != 0 {
                    self.metronome.trigger(false);
                }
            }
        }

        // Step 7: EOI dispatch.
        if state.req_mask != 0 && !state.flags.irq_pending {
            eoi::run_eoi(&mut state, self.irq.as_ref());
        }

        // Step 8: sync-in tick accumulation.
        if state.flags.sync_in {
            state.clock.ticks_in += 1;
        }

        clock::tick_interval(&state.clock)
    }
}

/// A track's counter has reached zero: emit its buffer, then either rearm
/// it for the next EOI-driven refresh or mark the overall measure-end
/// condition (§4.5 step 2).
fn update_track(state: &mut state::Mpu401State, i: usize, router: &MidiRouter) {
    let track = state.playbuf[i];
    intelligent_out::intelligent_out(
        &track,
        1 << i,
        &mut state.amask,
        &state.ch_to_ref,
        &mut state.chanref,
        &state.inputref,
        router,
    );
    if state.amask & (1 << i) != 0 {
        state.playbuf[i].kind = TrackKind::Overflow;
        state.playbuf[i].counter = 0xF0;
        state.req_mask |= 1 << i;
    } else if state.amask == 0 && !state.flags.conductor {
        state.req_mask |= 1 << 12;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::irq::test_support::CountingIrqLine;
    use crate::metronome::test_support::CountingMetronome;
    use mpu401_io::NullHandler;

    fn router() -> Arc<MidiRouter> {
        let r = Arc::new(MidiRouter::new());
        r.register_handler(Box::new(NullHandler::new()));
        r.select_output("default", "").unwrap();
        r
    }

    fn core() -> Mpu401Core {
        Mpu401Core::new(
            router(),
            Arc::new(CountingIrqLine::default()),
            Arc::new(CountingMetronome::default()),
            &Mpu401Config::default(),
        )
    }

    #[test]
    fn fresh_core_starts_in_intelligent_mode_by_default() {
        let c = core();
        assert_eq!(c.state.lock().mode, Mode::Intelligent);
    }

    #[test]
    fn write_command_then_read_status_shows_pending_ack() {
        let c = core();
        c.write_command(0x8F);
        assert_eq!(c.read_status() & 0x80, 0);
    }

    #[test]
    fn read_data_drains_the_ack_byte() {
        let c = core();
        c.write_command(0x8F);
        assert_eq!(c.read_data(), 0xFE);
        assert_eq!(c.read_status() & 0x80, 0x80);
    }

    #[test]
    fn tick_advances_measure_counter_while_playing() {
        let c = core();
        c.write_command(0x08); // start playback
        let before = c.state.lock().clock.measure_counter;
        c.tick();
        assert!(c.state.lock().clock.measure_counter >= before);
    }

    #[test]
    fn tick_is_a_no_op_while_irq_is_pending() {
        let c = core();
        c.state.lock().flags.irq_pending = true;
        let before = c.state.lock().clock.measure_counter;
        c.tick();
        assert_eq!(c.state.lock().clock.measure_counter, before);
    }
}
