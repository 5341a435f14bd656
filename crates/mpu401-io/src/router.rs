//! `MidiRouter`: the process-wide singleton tying together the four output
//! slots, the handler registry, and the capability flags that gate
//! realtime/pass-through/clock-out behavior.
//!
//! Capability flags are published through an `ArcSwap` snapshot so the
//! emulation thread's hot path never blocks behind a config update.

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::assembler::{raw_out_byte, raw_out_rt_byte, RealtimeGate};
use crate::error::Error;
use crate::handler::HostHandler;
use crate::input::InputSink;
use crate::registry::HandlerRegistry;
use crate::slot::{SlotId, SlotState};

/// Which peripheral currently receives routed input (§6 `midioptions`
/// `inputmpu401`/`inputsbuart`/`inputgus`, or none).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputDevice {
    None,
    Mpu,
    SbUart,
    GusUart,
}

#[derive(Debug, Clone, Copy)]
pub struct RouterFlags {
    pub realtime_enabled: bool,
    pub pass_through_enabled: bool,
    pub clock_out_enabled: bool,
    pub auto_select_input: bool,
    pub input_device: InputDevice,
}

impl Default for RouterFlags {
    fn default() -> Self {
        Self {
            realtime_enabled: true,
            pass_through_enabled: false,
            clock_out_enabled: false,
            auto_select_input: false,
            input_device: InputDevice::None,
        }
    }
}

pub struct MidiRouter {
    slots: [Mutex<SlotState>; 4],
    output_handler: Mutex<Option<Box<dyn HostHandler>>>,
    input_handler: Mutex<Option<Box<dyn HostHandler>>>,
    registry: Mutex<HandlerRegistry>,
    flags: ArcSwap<RouterFlags>,
    sinks: Mutex<[Option<Box<dyn InputSink>>; 3]>,
}

impl MidiRouter {
    pub fn new() -> Self {
        Self {
            slots: [
                Mutex::new(SlotState::new()),
                Mutex::new(SlotState::new()),
                Mutex::new(SlotState::new()),
                Mutex::new(SlotState::new()),
            ],
            output_handler: Mutex::new(None),
            input_handler: Mutex::new(None),
            registry: Mutex::new(HandlerRegistry::new()),
            flags: ArcSwap::from_pointee(RouterFlags::default()),
            sinks: Mutex::new([None, None, None]),
        }
    }

    /// Registers the [`InputSink`] that receives demultiplexed input for
    /// `device`. `InputDevice::None` is not a valid registration target.
    pub fn register_sink(&self, device: InputDevice, sink: Box<dyn InputSink>) {
        if let Some(idx) = input_device_index(device) {
            self.sinks.lock()[idx] = Some(sink);
        }
    }

    pub(crate) fn with_sink<R>(&self, device: InputDevice, f: impl FnOnce(&mut dyn InputSink) -> R) -> Option<R> {
        let idx = input_device_index(device)?;
        let mut sinks = self.sinks.lock();
        sinks[idx].as_deref_mut().map(f)
    }

    pub(crate) fn sink_available(&self, device: InputDevice) -> bool {
        input_device_index(device)
            .map(|idx| self.sinks.lock()[idx].is_some())
            .unwrap_or(false)
    }

    pub fn register_handler(&self, handler: Box<dyn HostHandler>) {
        self.registry.lock().register(handler);
    }

    pub fn flags(&self) -> Arc<RouterFlags> {
        self.flags.load_full()
    }

    pub fn update_flags(&self, f: impl FnOnce(&mut RouterFlags)) {
        let mut next = *self.flags.load_full();
        f(&mut next);
        self.flags.store(Arc::new(next));
    }

    /// Implements §6's `mididevice` output half: selects and opens an
    /// output handler by name (or `default`/`none`).
    pub fn select_output(&self, name: &str, config: &str) -> Result<(), Error> {
        let handler = self.registry.lock().select(name, config)?;
        *self.output_handler.lock() = handler;
        Ok(())
    }

    /// Implements §6's `mididevice` input half.
    pub fn select_input(&self, name: &str, config: &str) -> Result<(), Error> {
        if matches!(name.trim().to_ascii_lowercase().as_str(), "none" | "off" | "false") {
            *self.input_handler.lock() = None;
            return Ok(());
        }
        let mut registry = self.registry.lock();
        let mut handler = registry.select(name, "")?;
        if let Some(h) = handler.as_mut() {
            h.open_input(config)?;
        }
        drop(registry);
        *self.input_handler.lock() = handler;
        Ok(())
    }

    /// §6 `midioptions=delaysysex`: primes every slot's pacing clock so the
    /// very first sysex sent is already subject to back-pressure.
    pub fn prime_sysex_delay(&self) {
        for slot in &self.slots {
            slot.lock().last_send = Some(std::time::Instant::now());
        }
    }

    /// Feeds one guest-emitted byte to the named slot's assembler (§4.2).
    pub fn output_byte(&self, slot: SlotId, byte: u8) {
        let mut slot_state = self.slots[slot.index()].lock();
        let mut handler = self.output_handler.lock();
        let handler: &mut dyn HostHandler = match handler.as_deref_mut() {
            Some(h) => h,
            None => return,
        };
        raw_out_byte(&mut slot_state, byte, handler);
    }

    /// §4.2's realtime fast path, shared across slots and gated by
    /// `realtime_enabled`/`clock_out_enabled`.
    pub fn output_rt_byte(&self, byte: u8) {
        let flags = self.flags.load();
        let mut handler = self.output_handler.lock();
        let handler: &mut dyn HostHandler = match handler.as_deref_mut() {
            Some(h) => h,
            None => return,
        };
        raw_out_rt_byte(
            byte,
            handler,
            RealtimeGate {
                realtime_enabled: flags.realtime_enabled,
                clock_out_enabled: flags.clock_out_enabled,
            },
        );
    }

    pub fn has_output(&self) -> bool {
        self.output_handler.lock().is_some()
    }

    pub fn has_input(&self) -> bool {
        self.input_handler.lock().is_some()
    }
}

impl Default for MidiRouter {
    fn default() -> Self {
        Self::new()
    }
}

fn input_device_index(device: InputDevice) -> Option<usize> {
    match device {
        InputDevice::None => None,
        InputDevice::Mpu => Some(0),
        InputDevice::SbUart => Some(1),
        InputDevice::GusUart => Some(2),
    }
}
