//! Handler discovery list: a process-wide ordered collection of candidate
//! endpoints, built at load time. Order defines default-discovery
//! precedence, replacing the original's linked-list-of-handlers with a
//! plain `Vec` and two-phase selection (§9 design note).

use crate::error::Error;
use crate::handler::HostHandler;
use tracing::warn;

/// An ordered list of unopened handler instances. `select` implements the
/// two-phase rule from §6/§9: try a case-insensitive name match first,
/// then fall back to "first candidate that opens" for `default`.
pub struct HandlerRegistry {
    candidates: Vec<Box<dyn HostHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            candidates: Vec::new(),
        }
    }

    pub fn register(&mut self, handler: Box<dyn HostHandler>) {
        self.candidates.push(handler);
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.candidates.iter().map(|h| h.name()).collect()
    }

    /// Selects and opens an output handler.
    ///
    /// - `"none"`/`"off"`/`"false"` disables output and returns `Ok(None)`.
    /// - `"default"` tries every candidate in registration order, keeping
    ///   the first one that opens.
    /// - Anything else is matched case-insensitively against registered
    ///   names; if the name does not match any candidate, falls through to
    ///   the `"default"` probe (a misconfigured name should still get
    ///   *some* output rather than none).
    pub fn select(
        &mut self,
        name: &str,
        config: &str,
    ) -> Result<Option<Box<dyn HostHandler>>, Error> {
        let name = name.trim();
        if matches!(name.to_ascii_lowercase().as_str(), "none" | "off" | "false") {
            return Ok(None);
        }

        if !name.eq_ignore_ascii_case("default") {
            if let Some(idx) = self
                .candidates
                .iter()
                .position(|h| h.name().eq_ignore_ascii_case(name))
            {
                let mut handler = self.candidates.remove(idx);
                if handler.open(config).is_ok() {
                    return Ok(Some(handler));
                }
                warn!(handler = name, "named MIDI handler refused to open");
            }
        }

        while !self.candidates.is_empty() {
            let mut handler = self.candidates.remove(0);
            match handler.open(config) {
                Ok(()) => return Ok(Some(handler)),
                Err(e) => warn!(handler = handler.name(), error = %e, "handler refused to open"),
            }
        }

        Err(Error::NoHandlerAvailable)
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
