//! Configuration parsing (§6): turns the five recognized string keys into
//! a typed `Mpu401Config`. Parsing is pure and never hard-fails — an
//! unrecognized `midioptions` token is logged and ignored, matching the
//! original's laissez-faire policy (§7).

use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMode {
    Disabled,
    Uart,
    Intelligent,
}

/// The bitset of `midioptions` tokens (§6).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MidiOptions {
    pub auto_input: bool,
    pub input_mpu401: bool,
    pub input_sb_uart: bool,
    pub input_gus: bool,
    pub no_realtime: bool,
    pub pass_through: bool,
    pub clock_out: bool,
    pub throttle: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mpu401Config {
    pub mode: DeviceMode,
    pub mididevice: (String, String),
    pub midiconfig: String,
    pub delay_sysex: bool,
    pub inconfig: String,
    pub options: MidiOptions,
}

impl Default for Mpu401Config {
    fn default() -> Self {
        Self {
            mode: DeviceMode::Intelligent,
            mididevice: ("default".to_string(), "none".to_string()),
            midiconfig: String::new(),
            delay_sysex: false,
            inconfig: "none".to_string(),
            options: MidiOptions::default(),
        }
    }
}

/// Parses `mpu401` into a [`DeviceMode`].
pub fn parse_mode(value: &str) -> DeviceMode {
    match value.trim().to_ascii_lowercase().as_str() {
        "none" | "off" | "false" => DeviceMode::Disabled,
        "uart" => DeviceMode::Uart,
        _ => DeviceMode::Intelligent,
    }
}

/// Parses `mididevice` into an `(output, input)` pair, trimming whitespace
/// around the comma. A missing input half defaults to `"none"`.
pub fn parse_mididevice(value: &str) -> (String, String) {
    let mut parts = value.splitn(2, ',').map(str::trim);
    let output = parts.next().unwrap_or("default").to_string();
    let input = parts.next().unwrap_or("none").to_string();
    (output, input)
}

/// Parses `midiconfig`, consuming the `delaysysex` token if present and
/// returning the remainder untouched for the backend to interpret.
pub fn parse_midiconfig(value: &str) -> (String, bool) {
    let delay_sysex = value.contains("delaysysex");
    let remainder = value
        .split(',')
        .filter(|tok| tok.trim() != "delaysysex")
        .collect::<Vec<_>>()
        .join(",");
    (remainder, delay_sysex)
}

/// Parses `midioptions`'s comma-separated token list. Unrecognized tokens
/// are logged and otherwise ignored.
pub fn parse_midioptions(value: &str) -> MidiOptions {
    let mut opts = MidiOptions::default();
    for token in value.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        match token {
            "autoinput" => opts.auto_input = true,
            "inputmpu401" => opts.input_mpu401 = true,
            "inputsbuart" => opts.input_sb_uart = true,
            "inputgus" => opts.input_gus = true,
            "norealtime" => opts.no_realtime = true,
            "passthrough" => opts.pass_through = true,
            "clockout" => opts.clock_out = true,
            "throttle" => opts.throttle = true,
            other => warn!(token = other, "ignoring unrecognized midioptions token"),
        }
    }
    opts
}

/// Parses the full key/value set (§6), substituting defaults for any key
/// that is absent from `keys`.
pub fn parse(keys: &std::collections::HashMap<&str, &str>) -> Mpu401Config {
    let mode = keys.get("mpu401").map(|v| parse_mode(v)).unwrap_or(DeviceMode::Intelligent);
    let mididevice = keys
        .get("mididevice")
        .map(|v| parse_mididevice(v))
        .unwrap_or_else(|| ("default".to_string(), "none".to_string()));
    let (midiconfig, delay_sysex) = keys.get("midiconfig").map(|v| parse_midiconfig(v)).unwrap_or_default();
    let inconfig = keys.get("inconfig").map(|v| v.trim().to_string()).unwrap_or_else(|| "none".to_string());
    let options = keys.get("midioptions").map(|v| parse_midioptions(v)).unwrap_or_default();

    Mpu401Config {
        mode,
        mididevice,
        midiconfig,
        delay_sysex,
        inconfig,
        options,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn mpu401_none_disables() {
        assert_eq!(parse_mode("none"), DeviceMode::Disabled);
        assert_eq!(parse_mode("off"), DeviceMode::Disabled);
        assert_eq!(parse_mode("false"), DeviceMode::Disabled);
    }

    #[test]
    fn mpu401_uart_selects_uart_mode() {
        assert_eq!(parse_mode("uart"), DeviceMode::Uart);
    }

    #[test]
    fn mpu401_anything_else_is_intelligent() {
        assert_eq!(parse_mode("intelligent"), DeviceMode::Intelligent);
        assert_eq!(parse_mode(""), DeviceMode::Intelligent);
    }

    #[test]
    fn mididevice_splits_and_trims_the_pair() {
        assert_eq!(
            parse_mididevice(" coreaudio , coremidi "),
            ("coreaudio".to_string(), "coremidi".to_string())
        );
    }

    #[test]
    fn mididevice_without_input_half_defaults_to_none() {
        assert_eq!(parse_mididevice("alsa"), ("alsa".to_string(), "none".to_string()));
    }

    #[test]
    fn midiconfig_extracts_delaysysex() {
        let (rest, delay) = parse_midiconfig("2,delaysysex");
        assert!(delay);
        assert_eq!(rest, "2");
    }

    #[test]
    fn midioptions_recognizes_all_tokens() {
        let opts = parse_midioptions("autoinput,inputgus,norealtime,passthrough,clockout,throttle");
        assert!(opts.auto_input);
        assert!(opts.input_gus);
        assert!(opts.no_realtime);
        assert!(opts.pass_through);
        assert!(opts.clock_out);
        assert!(opts.throttle);
        assert!(!opts.input_mpu401);
    }

    #[test]
    fn midioptions_ignores_unknown_tokens() {
        let opts = parse_midioptions("bogus,clockout");
        assert!(opts.clock_out);
    }

    #[test]
    fn full_parse_uses_defaults_for_missing_keys() {
        let keys = HashMap::new();
        let config = parse(&keys);
        assert_eq!(config.mode, DeviceMode::Intelligent);
        assert_eq!(config.inconfig, "none");
    }
}
