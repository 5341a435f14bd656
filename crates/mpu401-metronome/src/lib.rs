//! Metronome tone generator (§4.9): a free-running square-wave click
//! source enabled while the sequencer is playing or recording, triggered
//! from the emulation thread under the device lock and consumed from the
//! mixer callback thread — the two sides are decoupled by a one-shot
//! atomic trigger rather than a mutex, since the mixer thread must never
//! block on it.
//!
//! A pure sample-at-a-time generator rather than a pre-rendered click
//! buffer, since this crate owns no mixer channel to render into ahead of
//! time.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use atomic_float::AtomicF32;

/// Unaccented clicks use a lower pitch than accented downbeats, matching
/// the MT-32/Roland-era click; these are implementation constants, not
/// hardware-mandated ones.
const UNACCENTED_HZ: f32 = 1000.0;
const ACCENTED_HZ: f32 = 1200.0;
const UNACCENTED_GAIN: f32 = 0.7;
const ACCENTED_GAIN: f32 = 1.0;
const CLICK_DURATION_MS: f32 = 30.0;

/// A single square-wave click source. `trigger` arms the next click;
/// `tick` advances and samples it. Safe to share behind an `Arc` and call
/// from two different threads concurrently (trigger from the emulation
/// thread, tick from the mixer thread) — the handoff is a single
/// acquire/release flag, never a lock.
pub struct MetronomeTone {
    armed: AtomicBool,
    armed_accent: AtomicBool,
    active: AtomicBool,
    accent: AtomicBool,
    samples_total: AtomicU32,
    samples_left: AtomicU32,
    phase: AtomicF32,
}

impl MetronomeTone {
    pub fn new() -> Self {
        Self {
            armed: AtomicBool::new(false),
            armed_accent: AtomicBool::new(false),
            active: AtomicBool::new(false),
            accent: AtomicBool::new(false),
            samples_total: AtomicU32::new(0),
            samples_left: AtomicU32::new(0),
            phase: AtomicF32::new(0.0),
        }
    }

    /// Arms a new click, overwriting any not-yet-started pending one
    /// (§4.5 step 6 calls this at most once per downbeat/sub-tick, so the
    /// mixer thread always observes the latest request).
    pub fn trigger(&self, accented: bool) {
        tracing::trace!(accented, "metronome click armed");
        self.armed_accent.store(accented, Ordering::Relaxed);
        self.armed.store(true, Ordering::Release);
    }

    /// Advances the generator by one sample and returns the next
    /// stereo frame, or `None` while idle. Called once per output sample
    /// from the mixer channel callback.
    pub fn tick(&self, sample_rate: f32) -> Option<(f32, f32)> {
        if !self.active.load(Ordering::Relaxed) {
            if !self.armed.swap(false, Ordering::Acquire) {
                return None;
            }
            let accent = self.armed_accent.load(Ordering::Relaxed);
            self.accent.store(accent, Ordering::Relaxed);
            let total = ((sample_rate * CLICK_DURATION_MS / 1000.0) as u32).max(1);
            self.samples_total.store(total, Ordering::Relaxed);
            self.samples_left.store(total, Ordering::Relaxed);
            self.phase.store(0.0, Ordering::Relaxed);
            self.active.store(true, Ordering::Relaxed);
        }

        let remaining = self.samples_left.load(Ordering::Relaxed);
        if remaining == 0 {
            self.active.store(false, Ordering::Relaxed);
            return None;
        }

        let total = self.samples_total.load(Ordering::Relaxed).max(1);
        let accent = self.accent.load(Ordering::Relaxed);
        let freq = if accent { ACCENTED_HZ } else { UNACCENTED_HZ };
        let gain = if accent { ACCENTED_GAIN } else { UNACCENTED_GAIN };

        let phase = self.phase.load(Ordering::Relaxed);
        let square = if phase < 0.5 { 1.0 } else { -1.0 };
        let envelope = envelope_at(total - remaining, total);
        let sample = square * envelope * gain;

        let next_phase = (phase + freq / sample_rate).fract();
        self.phase.store(next_phase, Ordering::Relaxed);
        self.samples_left.store(remaining - 1, Ordering::Relaxed);

        Some((sample, sample))
    }

    /// Whether a click is currently sounding or queued to start on the
    /// next `tick`.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed) || self.armed.load(Ordering::Relaxed)
    }
}

impl Default for MetronomeTone {
    fn default() -> Self {
        Self::new()
    }
}

/// Short attack/release envelope so the click doesn't pop: ramps up over
/// the first tenth of the click and back down over the last fifth.
fn envelope_at(progressed: u32, total: u32) -> f32 {
    let attack = (total / 10).max(1);
    let release = (total / 5).max(1);
    if progressed < attack {
        progressed as f32 / attack as f32
    } else if progressed + release >= total {
        (total - progressed) as f32 / release as f32
    } else {
        1.0
    }
}
