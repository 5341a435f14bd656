//! The intelligent sequencer's data model (§3): track counters, the
//! conductor, clock/tempo bookkeeping, filter flags, and the per-channel
//! reference tables. Field names describe what each one holds rather than
//! abbreviating it.

use crate::ringbuffer::RingBuffer;

/// One of the 8 playback tracks, or the conductor ("track 9"), sharing the
/// same counter/value/kind shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct Track {
    /// Signed and wide enough to hold `0xF0` and tolerate decrementing past
    /// zero (§9 design note).
    pub counter: i32,
    pub value: [u8; 3],
    pub sys_val: u8,
    pub length: u8,
    pub kind: TrackKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackKind {
    #[default]
    Overflow,
    Mark,
    MidiSystem,
    MidiNormal,
    Command,
}

/// Sub-phase of the track/conductor data-write state machine (§4.5 "data
/// write"). The machine is only consulted while `track_req`/`cond_req` is
/// set; `Timing` is also the phase a fresh request starts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataPhase {
    #[default]
    Timing,
    Status,
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordState {
    #[default]
    Off,
    Standby,
    On,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Uart,
    Intelligent,
}

/// Orthogonal boolean flags tracked across a command write (§4.5).
#[derive(Debug, Clone)]
pub struct StateFlags {
    pub wsd: bool,
    pub wsm: bool,
    pub wsd_start: bool,
    pub irq_pending: bool,
    pub tx_ready: bool,
    pub conductor: bool,
    pub cond_req: bool,
    pub cond_set: bool,
    pub track_req: bool,
    pub block_ack: bool,
    pub playing: bool,
    pub send_now: bool,
    pub clock_to_host: bool,
    pub sync_in: bool,
    pub sysex_in_finished: bool,
    pub rec_copy: bool,
    pub eoi_scheduled: bool,
    pub reset: bool,
    /// Set after the first command write in intelligent mode (§4.5:
    /// "`midi_thru` is enabled on first command after power-on").
    pub midi_thru_primed: bool,
}

impl Default for StateFlags {
    fn default() -> Self {
        Self {
            wsd: false,
            wsm: false,
            wsd_start: false,
            irq_pending: false,
            tx_ready: false,
            conductor: false,
            cond_req: false,
            cond_set: false,
            track_req: false,
            block_ack: false,
            playing: false,
            send_now: false,
            clock_to_host: false,
            sync_in: false,
            sysex_in_finished: true,
            rec_copy: false,
            eoi_scheduled: false,
            reset: false,
            midi_thru_primed: false,
        }
    }
}

/// Tempo/timebase derivation state (§4.5 "Clock and tick event").
#[derive(Debug, Clone)]
pub struct ClockState {
    pub timebase: u16,
    pub tempo: u16,
    pub tempo_rel: u8,
    pub tempo_grad: u8,
    pub freq: f64,
    pub freq_mod: f64,
    pub cth_rate: [u8; 4],
    pub cth_mode: usize,
    pub cth_counter: u32,
    pub cth_old: u32,
    pub measure_counter: u32,
    pub meas_old: u32,
    pub rec_counter: u32,
    pub midimetro: u8,
    pub metromeas: u8,
    pub metronome_state: u8,
    pub active: bool,
    pub ticks_in: u32,
}

impl Default for ClockState {
    fn default() -> Self {
        Self {
            timebase: 120,
            tempo: 100,
            tempo_rel: 0x40,
            tempo_grad: 0,
            freq: 0.0,
            freq_mod: 1.0,
            cth_rate: [60; 4],
            cth_mode: 0,
            cth_counter: 0,
            cth_old: 0,
            measure_counter: 0,
            meas_old: 0,
            rec_counter: 0,
            midimetro: 12,
            metromeas: 8,
            metronome_state: 0,
            active: false,
            ticks_in: 0,
        }
    }
}

/// Routing/recording toggles (§4.5's one-off configuration commands).
#[derive(Debug, Clone)]
pub struct FilterFlags {
    pub all_notes_off_stop: bool,
    pub rt_out: bool,
    pub rt_affection: bool,
    pub allnotesoff_out: bool,
    pub all_thru: bool,
    pub midi_thru: bool,
    pub commonmsgs_thru: bool,
    pub timing_in_stop: bool,
    pub mode_msgs_in: bool,
    pub sysex_thru: bool,
    pub commonmsgs_in: bool,
    pub rt_in: bool,
    pub bender_in: bool,
    pub data_in_stop: bool,
    pub measure_end_report: bool,
    pub sysex_in: bool,
}

impl Default for FilterFlags {
    fn default() -> Self {
        Self {
            all_notes_off_stop: true,
            rt_out: true,
            rt_affection: true,
            allnotesoff_out: true,
            all_thru: true,
            midi_thru: true,
            commonmsgs_thru: true,
            timing_in_stop: false,
            mode_msgs_in: false,
            sysex_thru: false,
            commonmsgs_in: false,
            rt_in: false,
            bender_in: false,
            data_in_stop: false,
            measure_end_report: false,
            sysex_in: false,
        }
    }
}

/// 128-bit held-key set for one reference table or input channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyBitset(u128);

impl KeyBitset {
    pub fn set(&mut self, key: u8) {
        self.0 |= 1u128 << (key & 0x7F);
    }
    pub fn clear(&mut self, key: u8) {
        self.0 &= !(1u128 << (key & 0x7F));
    }
    pub fn get(&self, key: u8) -> bool {
        self.0 & (1u128 << (key & 0x7F)) != 0
    }
    pub fn clear_all(&mut self) {
        self.0 = 0;
    }
    pub fn iter_set(&self) -> impl Iterator<Item = u8> + '_ {
        (0..128u8).filter(move |&k| self.get(k))
    }
}

#[derive(Debug, Clone, Default)]
pub struct RefTable {
    pub chan: u8,
    pub keys: KeyBitset,
    pub on: bool,
}

#[derive(Debug, Clone, Default)]
pub struct InputRef {
    pub keys: KeyBitset,
    pub on: bool,
}

pub const NUM_TRACKS: usize = 8;
pub const NUM_REF_TABLES: usize = 5; // 4 configurable + sink at index 4
pub const NUM_CHANNELS: usize = 16;

/// The full intelligent-sequencer state, guarded by a single device lock
/// (§5) owned by `crate::Mpu401Core`.
pub struct Mpu401State {
    pub mode: Mode,
    pub output_queue: RingBuffer<64>,
    pub record_queue: RingBuffer<1024>,
    pub playbuf: [Track; NUM_TRACKS],
    pub condbuf: Track,
    pub flags: StateFlags,
    pub data_onoff: DataPhase,
    /// Number of data bytes written into the current track/conductor
    /// message so far (§4.5 "Track/conductor data" phase 2).
    pub data_pos: u8,
    pub command_byte: u8,
    pub tmask: u8,
    pub cmask: u8,
    pub amask: u8,
    pub midi_mask: u16,
    pub req_mask: u16,
    pub track: usize,
    pub old_track: usize,
    pub last_rtcmd: u8,
    pub cmd_pending: Option<u8>,
    pub rec: RecordState,
    pub clock: ClockState,
    pub filter: FilterFlags,
    pub ch_to_ref: [u8; NUM_CHANNELS],
    pub chanref: [RefTable; NUM_REF_TABLES],
    pub inputref: [InputRef; NUM_CHANNELS],
    pub prchg_buf: [u8; NUM_CHANNELS],
    pub prchg_mask: u16,
    /// Scratch accumulator for the `wsd` (write-single-data) sub-state
    /// machine (§4.5 "data write"): a direct MIDI send targeting one
    /// track, assembled one byte at a time the same way a host-facing
    /// slot would be, but entirely guest-side.
    pub wsd_value: [u8; 3],
    pub wsd_pos: u8,
    pub wsd_len: u8,
    /// Scratch accumulator for the `wsm` (write system message) sub-state
    /// machine.
    pub wsm_status: u8,
    pub wsm_pos: u8,
    pub wsm_len: u8,
    /// Set while a reset is in progress (§4.5 "Reset": `RESETBUSY ≈ 14 ms`).
    /// Any non-`0xFF` command arriving before this deadline is remembered
    /// in `cmd_pending` and replayed once the reset completes.
    pub reset_deadline: Option<std::time::Instant>,
}

impl Mpu401State {
    pub fn new() -> Self {
        let mut s = Self {
            mode: Mode::Uart,
            output_queue: RingBuffer::new(),
            record_queue: RingBuffer::new(),
            playbuf: [Track::default(); NUM_TRACKS],
            condbuf: Track::default(),
            flags: StateFlags::default(),
            data_onoff: DataPhase::Timing,
            data_pos: 0,
            command_byte: 0,
            tmask: 0,
            cmask: 0,
            amask: 0,
            midi_mask: 0xFFFF,
            req_mask: 0,
            track: 0,
            old_track: 0,
            last_rtcmd: 0,
            cmd_pending: None,
            rec: RecordState::Off,
            clock: ClockState::default(),
            filter: FilterFlags::default(),
            ch_to_ref: [4; NUM_CHANNELS],
            chanref: Default::default(),
            inputref: Default::default(),
            prchg_buf: [0; NUM_CHANNELS],
            prchg_mask: 0,
            wsd_value: [0; 3],
            wsd_pos: 0,
            wsd_len: 0,
            wsm_status: 0,
            wsm_pos: 0,
            wsm_len: 0,
            reset_deadline: None,
        };
        for i in 0..4 {
            s.chanref[i].chan = i as u8;
            s.ch_to_ref[i] = i as u8;
        }
        s
    }
}

impl Default for Mpu401State {
    fn default() -> Self {
        Self::new()
    }
}
