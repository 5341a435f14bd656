//! The input-side MIDI demultiplexer (§4.3): routes complete messages and
//! streamed sysex from a host input handler to whichever emulated
//! peripheral is currently selected.

use std::time::Duration;

use crate::router::{InputDevice, MidiRouter};

/// Bounded retry budget for a sysex stream that the addressed peripheral
/// cannot fully accept in one call (§4.3: "up to a bounded retry count,
/// then call once with `abort=true`").
const SYSEX_RETRY_ROUNDS: u32 = 5;
const SYSEX_RETRY_BACKOFF: Duration = Duration::from_millis(5);

/// Receives demultiplexed input. Implemented by each emulated MIDI
/// peripheral that can be an `input_device` target (the MPU-401 sequencer,
/// and the SB/GUS UART peripherals sharing this routing fabric).
pub trait InputSink: Send {
    /// A complete channel/system message, already expanded from running
    /// status and length-validated by the caller.
    fn input_message(&mut self, msg: &[u8]);

    /// Streams sysex bytes. Returns the number of trailing bytes the sink
    /// could NOT accept (0 on full acceptance); the caller is expected to
    /// retry with exactly that trailing slice.
    fn input_sysex(&mut self, buf: &[u8]) -> usize;

    /// Releases any partially-accumulated sysex state after the retry
    /// budget is exhausted.
    fn input_sysex_abort(&mut self);
}

/// Routes one complete input message to the currently-selected device. If
/// `auto_select_input` is set and that device has no registered sink, scans
/// for the next available one (§4.3: "a pure routing decision with no
/// packet loss semantics").
pub fn deliver_message(router: &MidiRouter, msg: &[u8]) {
    let flags = router.flags();
    let mut device = flags.input_device;
    if flags.auto_select_input && !router.sink_available(device) {
        device = next_available(router, device);
    }
    router.with_sink(device, |sink| sink.input_message(msg));
}

/// Streams a sysex buffer to the currently-selected device, retrying the
/// unaccepted tail up to a bounded number of rounds with a short back-off
/// between attempts, then aborting (§4.3).
pub fn deliver_sysex(router: &MidiRouter, buf: &[u8]) {
    let flags = router.flags();
    let mut device = flags.input_device;
    if flags.auto_select_input && !router.sink_available(device) {
        device = next_available(router, device);
    }

    let mut remaining = buf;
    for round in 0..SYSEX_RETRY_ROUNDS {
        if remaining.is_empty() {
            return;
        }
        let unaccepted = router
            .with_sink(device, |sink| sink.input_sysex(remaining))
            .unwrap_or(remaining.len());
        if unaccepted == 0 {
            return;
        }
        remaining = &remaining[remaining.len() - unaccepted..];
        if round + 1 < SYSEX_RETRY_ROUNDS {
            std::thread::sleep(SYSEX_RETRY_BACKOFF);
        }
    }
    router.with_sink(device, |sink| sink.input_sysex_abort());
}

fn next_available(router: &MidiRouter, current: InputDevice) -> InputDevice {
    const ORDER: [InputDevice; 3] = [InputDevice::Mpu, InputDevice::SbUart, InputDevice::GusUart];
    ORDER
        .into_iter()
        .find(|&d| d != current && router.sink_available(d))
        .unwrap_or(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Captured {
        messages: Arc<Mutex<Vec<Vec<u8>>>>,
        accept_at_once: bool,
    }

    impl InputSink for Captured {
        fn input_message(&mut self, msg: &[u8]) {
            self.messages.lock().unwrap().push(msg.to_vec());
        }
        fn input_sysex(&mut self, buf: &[u8]) -> usize {
            if self.accept_at_once {
                0
            } else {
                buf.len()
            }
        }
        fn input_sysex_abort(&mut self) {}
    }

    #[test]
    fn routes_message_to_selected_device() {
        let router = MidiRouter::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        router.register_sink(
            InputDevice::Mpu,
            Box::new(Captured {
                messages: log.clone(),
                accept_at_once: true,
            }),
        );
        router.update_flags(|f| f.input_device = InputDevice::Mpu);
        deliver_message(&router, &[0x90, 0x40, 0x7F]);
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn sysex_retry_gives_up_and_aborts() {
        let router = MidiRouter::new();
        router.register_sink(
            InputDevice::Mpu,
            Box::new(Captured {
                messages: Arc::new(Mutex::new(Vec::new())),
                accept_at_once: false,
            }),
        );
        router.update_flags(|f| f.input_device = InputDevice::Mpu);
        deliver_sysex(&router, &[0xF0, 0x41, 0xF7]);
    }

    #[test]
    fn auto_select_falls_through_to_available_sink() {
        let router = MidiRouter::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        router.register_sink(
            InputDevice::SbUart,
            Box::new(Captured {
                messages: log.clone(),
                accept_at_once: true,
            }),
        );
        router.update_flags(|f| {
            f.input_device = InputDevice::Mpu;
            f.auto_select_input = true;
        });
        deliver_message(&router, &[0x90, 0x40, 0x7F]);
        assert_eq!(log.lock().unwrap().len(), 1);
    }
}
