//! The assembled MPU-401 device: sequencer core, routing fabric, and
//! metronome tone generator wired together behind a single `&self`-only
//! handle (§5's `Mpu401Device` threading contract).

use std::sync::Arc;
use std::time::Duration;

use mpu401_core::{MetronomeSink, Mpu401Core};
use mpu401_io::MidiRouter;
use mpu401_metronome::MetronomeTone;

/// Bridges the sequencer's trigger seam to the tone generator crate, which
/// has no knowledge of `mpu401-core` and exposes inherent methods instead
/// of implementing its trait directly.
struct MetronomeBridge(Arc<MetronomeTone>);

impl MetronomeSink for MetronomeBridge {
    fn trigger(&self, accented: bool) {
        self.0.trigger(accented);
    }
}

/// The assembled device: safe to share behind an `Arc` and called from the
/// emulation thread, the tick scheduler, and the host input thread at
/// once. See [`crate::Mpu401DeviceBuilder`] for construction.
pub struct Mpu401Device {
    core: Arc<Mpu401Core>,
    router: Arc<MidiRouter>,
    metronome: Arc<MetronomeTone>,
}

impl Mpu401Device {
    pub(crate) fn from_parts(core: Arc<Mpu401Core>, router: Arc<MidiRouter>, metronome: Arc<MetronomeTone>) -> Self {
        Self { core, router, metronome }
    }

    pub fn builder() -> crate::Mpu401DeviceBuilder {
        crate::Mpu401DeviceBuilder::default()
    }

    /// Reads the 0x330 data register, dequeuing one byte from the output
    /// queue (§4.4).
    pub fn read_data(&self) -> u8 {
        self.core.read_data()
    }

    /// Writes the 0x330 data register.
    pub fn write_data(&self, val: u8) {
        self.core.write_data(val);
    }

    /// Reads the 0x331 status register.
    pub fn read_status(&self) -> u8 {
        self.core.read_status()
    }

    /// Writes the 0x331 command register.
    pub fn write_command(&self, val: u8) {
        self.core.write_command(val);
    }

    /// Runs one sequencer tick and returns the interval to wait before the
    /// next one (§4.5's scheduler callback).
    pub fn tick(&self) -> Duration {
        self.core.tick()
    }

    /// Routes one complete input message to whichever peripheral is
    /// currently selected as the input device (§4.3).
    pub fn deliver_input_message(&self, msg: &[u8]) {
        mpu401_io::input::deliver_message(&self.router, msg);
    }

    /// Streams a sysex buffer through the input demultiplexer (§4.3).
    pub fn deliver_input_sysex(&self, buf: &[u8]) {
        mpu401_io::input::deliver_sysex(&self.router, buf);
    }

    /// Pulls the next metronome click sample, for the mixer callback to
    /// call once per output sample (§4.9). Returns `None` while idle.
    pub fn metronome_tick(&self, sample_rate: f32) -> Option<(f32, f32)> {
        self.metronome.tick(sample_rate)
    }

    /// Direct access to the routing fabric, for callers that need to add
    /// handlers or inspect flags after construction.
    pub fn router(&self) -> &Arc<MidiRouter> {
        &self.router
    }
}

pub(crate) fn bridge(tone: Arc<MetronomeTone>) -> Arc<dyn MetronomeSink> {
    Arc::new(MetronomeBridge(tone))
}
