//! The host-handler contract: the polymorphic endpoint that receives
//! assembled MIDI messages and sysex blobs from the output assembler.
//!
//! Discovery is two-phase: try to match a handler by name, then fall back
//! to a default probe, the same shape `midir::MidiOutput` device selection
//! takes when asked for "the" output port.

use crate::error::Error;

/// A MIDI endpoint: something that can accept assembled messages and sysex
/// blobs, and optionally feed input back in.
///
/// Implementations MUST be safe to call `play_message`/`play_sysex` from
/// the emulation thread. Input callbacks (for implementations that support
/// `open_input`) may arrive on a separate thread and must hand off to
/// whatever input path the caller wired up rather than touching device
/// state directly.
pub trait HostHandler: Send {
    /// Stable, human-readable name used for discovery matching (§6
    /// `mididevice` key) and diagnostics.
    fn name(&self) -> &str;

    /// Opens the output side given a backend-specific configuration
    /// string. Returns `Ok(())` on success; implementations should return
    /// `Err` rather than panic on a refused open so the registry can fall
    /// through to the next candidate.
    fn open(&mut self, config: &str) -> Result<(), Error>;

    /// Opens the input side, if this handler supports receiving MIDI.
    /// Default: unsupported.
    fn open_input(&mut self, _config: &str) -> Result<(), Error> {
        Err(Error::HandlerOpenFailed(
            self.name().to_string(),
            "input not supported".into(),
        ))
    }

    /// Closes both sides cleanly. Must be safe to call even if `open` was
    /// never called or failed.
    fn close(&mut self);

    /// Sends a complete 1-, 2-, or 3-byte channel/system message (already
    /// validated against the status-byte length table).
    fn play_message(&mut self, buf: &[u8]);

    /// Sends a complete sysex buffer (`buf[0] == 0xF0 ..= buf[last] ==
    /// 0xF7`).
    fn play_sysex(&mut self, buf: &[u8]);
}

/// Always-succeeds, discards-everything handler. Last-resort fallback when
/// no real backend is configured, and the default in tests.
#[derive(Debug, Default)]
pub struct NullHandler {
    open: bool,
}

impl NullHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HostHandler for NullHandler {
    fn name(&self) -> &str {
        "none"
    }

    fn open(&mut self, _config: &str) -> Result<(), Error> {
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn play_message(&mut self, _buf: &[u8]) {}

    fn play_sysex(&mut self, _buf: &[u8]) {}
}

#[cfg(feature = "midi-io")]
pub mod midir_backend {
    use super::*;
    use midir::{MidiOutput, MidiOutputConnection};

    /// A [`HostHandler`] backed by a real platform MIDI output port via
    /// `midir`. Input is not implemented here: `midir`'s input connection
    /// requires a callback registered at connect time and is wired up
    /// separately by the router's input path (see `crate::input`).
    pub struct MidirOutputHandler {
        port_name: String,
        conn: Option<MidiOutputConnection>,
    }

    impl MidirOutputHandler {
        pub fn new(port_name: impl Into<String>) -> Self {
            Self {
                port_name: port_name.into(),
                conn: None,
            }
        }
    }

    impl HostHandler for MidirOutputHandler {
        fn name(&self) -> &str {
            &self.port_name
        }

        fn open(&mut self, _config: &str) -> Result<(), Error> {
            let out = MidiOutput::new("mpu401").map_err(|e| {
                Error::HandlerOpenFailed(self.port_name.clone(), e.to_string())
            })?;
            let ports = out.ports();
            let port = ports
                .iter()
                .find(|p| {
                    out.port_name(p)
                        .map(|n| n.eq_ignore_ascii_case(&self.port_name))
                        .unwrap_or(false)
                })
                .ok_or_else(|| {
                    Error::HandlerOpenFailed(
                        self.port_name.clone(),
                        "no matching output port".into(),
                    )
                })?;
            let conn = out
                .connect(port, "mpu401-out")
                .map_err(|e| Error::HandlerOpenFailed(self.port_name.clone(), e.to_string()))?;
            self.conn = Some(conn);
            Ok(())
        }

        fn close(&mut self) {
            self.conn = None;
        }

        fn play_message(&mut self, buf: &[u8]) {
            if let Some(conn) = &mut self.conn {
                let _ = conn.send(buf);
            }
        }

        fn play_sysex(&mut self, buf: &[u8]) {
            if let Some(conn) = &mut self.conn {
                let _ = conn.send(buf);
            }
        }
    }

    /// Enumerates the names of every available `midir` output port, used
    /// to populate the handler registry's default discovery list.
    pub fn list_output_ports() -> Vec<String> {
        let Ok(out) = MidiOutput::new("mpu401-discovery") else {
            return Vec::new();
        };
        out.ports()
            .iter()
            .filter_map(|p| out.port_name(p).ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_handler_always_opens() {
        let mut h = NullHandler::new();
        assert!(h.open("anything").is_ok());
        h.play_message(&[0x90, 0x40, 0x7F]);
        h.close();
    }

    #[test]
    fn null_handler_rejects_input_by_default() {
        let mut h = NullHandler::new();
        assert!(h.open_input("x").is_err());
    }
}
