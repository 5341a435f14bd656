//! Tempo/timebase derivation and the MIDI-clock-in PLL (§4.5 "Clock and
//! tick event", §4.8 "Sync-in PLL").

use crate::state::ClockState;
use std::time::Duration;

fn maxtempo(timebase: u16) -> u16 {
    if timebase >= 168 {
        179
    } else if timebase == 144 {
        208
    } else {
        240
    }
}

fn mintempo(timebase: u16) -> u16 {
    if timebase >= 120 {
        8
    } else {
        16
    }
}

/// `freq = timebase * clamp((tempo * 2 * tempo_rel) >> 7, mintempo, maxtempo)`.
fn base_freq(clock: &ClockState) -> f64 {
    let scaled = (clock.tempo as i64 * 2 * clock.tempo_rel as i64) >> 7;
    let lo = mintempo(clock.timebase) as i64;
    let hi = maxtempo(clock.timebase) as i64;
    clock.timebase as f64 * scaled.clamp(lo, hi) as f64
}

/// Recomputes `clock.freq` from tempo/timebase, additionally scaling by
/// `freq_mod` while sync-in is active, but only accepting the scaled
/// result if it stays inside the valid window for this timebase.
pub fn recompute(clock: &mut ClockState, sync_in: bool) {
    let freq = base_freq(clock);
    if sync_in {
        let scaled = freq * clock.freq_mod;
        let lo = clock.timebase as f64 * mintempo(clock.timebase) as f64;
        let hi = clock.timebase as f64 * maxtempo(clock.timebase) as f64;
        if scaled > lo && scaled < hi {
            clock.freq = scaled;
            return;
        }
    }
    clock.freq = freq;
}

/// `freq` is ticks-per-minute; the scheduler interval is
/// `60_000_000 / freq` microseconds.
pub fn tick_interval(clock: &ClockState) -> Duration {
    let freq = clock.freq.max(1.0);
    Duration::from_micros((60_000_000.0 / freq) as u64)
}

/// Adjusts `freq_mod` from the count of 0xF8 ticks received since the last
/// call, a simple PLL nudging the internal clock toward an external MIDI
/// clock source (§4.8).
pub fn sync_in_adjust(clock: &mut ClockState) {
    let expected = (clock.timebase as u32 / 24).max(1);
    let ticks_in = clock.ticks_in;

    if ticks_in == 0 || ticks_in > expected * 2 {
        clock.freq_mod *= 2.0;
    } else if ticks_in.abs_diff(expected) == 1 {
        clock.freq_mod /= ticks_in as f64 / (expected as f64 * 2.0);
    } else {
        clock.freq_mod /= ticks_in as f64 / expected as f64;
    }
    clock.ticks_in = 0;
}
