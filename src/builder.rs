//! Builder for configuring and constructing an [`Mpu401Device`].

use std::collections::HashMap;
use std::sync::Arc;

use mpu401_core::{config, DeviceMode, IrqLine, Mpu401Config, Mpu401Core, NullIrqLine};
use mpu401_io::{HostHandler, InputDevice, MidiRouter};
use mpu401_metronome::MetronomeTone;

use crate::{device, Error, Mpu401Device, Result};

/// Host handlers are registered explicitly via [`handler`](Self::handler);
/// unlike hardware discovery (which enumerates every port at startup) this
/// crate leaves the choice of backend to the embedder. The `midi-io`
/// feature on `mpu401-io` is what makes `mpu401_io::handler::midir_backend`
/// available to construct one.
///
/// # Example
///
/// ```ignore
/// use mpu401::Mpu401Device;
///
/// let device = Mpu401Device::builder()
///     .handler(Box::new(my_handler))
///     .config_from(&[("mpu401", "intelligent"), ("mididevice", "default,none")].into())
///     .build()?;
/// ```
pub struct Mpu401DeviceBuilder {
    handlers: Vec<Box<dyn HostHandler>>,
    config: Mpu401Config,
    irq: Arc<dyn IrqLine>,
}

impl Default for Mpu401DeviceBuilder {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
            config: Mpu401Config::default(),
            irq: Arc::new(NullIrqLine),
        }
    }
}

impl Mpu401DeviceBuilder {
    /// Registers a host MIDI endpoint candidate (§4.1). Candidates are
    /// tried in registration order during `mididevice` discovery.
    pub fn handler(mut self, handler: Box<dyn HostHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Supplies the full typed configuration directly, bypassing
    /// [`config_from`](Self::config_from).
    pub fn config(mut self, config: Mpu401Config) -> Self {
        self.config = config;
        self
    }

    /// Parses the five recognized `midioptions`-style keys (§6) into a
    /// typed configuration.
    pub fn config_from(mut self, keys: &HashMap<&str, &str>) -> Self {
        self.config = config::parse(keys);
        self
    }

    /// Wires a real PIC line (or any other [`IrqLine`] implementation) in
    /// place of the default no-op. Default: [`NullIrqLine`].
    pub fn irq(mut self, irq: Arc<dyn IrqLine>) -> Self {
        self.irq = irq;
        self
    }

    /// Opens the output/input handlers selected by the configuration,
    /// wires the sequencer core to the routing fabric and the metronome
    /// tone generator, and registers the sequencer as the `Mpu` input
    /// sink.
    pub fn build(self) -> Result<Mpu401Device> {
        let router = Arc::new(MidiRouter::new());
        for handler in self.handlers {
            router.register_handler(handler);
        }

        if !matches!(self.config.mode, DeviceMode::Disabled) {
            router.select_output(&self.config.mididevice.0, &self.config.midiconfig).map_err(Error::Io)?;
            if !self.config.mididevice.1.trim().eq_ignore_ascii_case("none") {
                router.select_input(&self.config.mididevice.1, &self.config.inconfig).map_err(Error::Io)?;
            }
        }

        router.update_flags(|f| {
            f.realtime_enabled = !self.config.options.no_realtime;
            f.pass_through_enabled = self.config.options.pass_through;
            f.clock_out_enabled = self.config.options.clock_out;
            f.auto_select_input = self.config.options.auto_input;
            f.input_device = input_device(&self.config);
        });

        tracing::debug!(mode = ?self.config.mode, mididevice = %self.config.mididevice.0, "building mpu401 device");

        let tone = Arc::new(MetronomeTone::new());
        let core = Arc::new(Mpu401Core::new(
            Arc::clone(&router),
            self.irq,
            device::bridge(Arc::clone(&tone)),
            &self.config,
        ));
        router.register_sink(InputDevice::Mpu, Box::new(core.input_sink()));

        Ok(Mpu401Device::from_parts(core, router, tone))
    }
}

/// Picks the routed input peripheral from the `midioptions` flags (§6):
/// `inputmpu401` wins over `inputsbuart`/`inputgus` if more than one is
/// set, matching the original's "MPU401 takes priority" discovery order.
fn input_device(config: &Mpu401Config) -> InputDevice {
    if config.options.input_mpu401 {
        InputDevice::Mpu
    } else if config.options.input_sb_uart {
        InputDevice::SbUart
    } else if config.options.input_gus {
        InputDevice::GusUart
    } else {
        InputDevice::None
    }
}
