//! The EOI (End-Of-Input) handler (§4.5 "EOI handler"): converts the
//! lowest pending bit in `req_mask` into a control byte the guest reads
//! back on the data port, and the `QueueByte` helper its ambiguous-source
//! early exit is resolved into (§9 design note).

use crate::irq::IrqLine;
use crate::state::Mpu401State;

/// Enqueues a byte into the guest-visible output queue.
///
/// If `block_ack` is set (a self-generated ACK that must be swallowed
/// rather than delivered, e.g. replaying a buffered conductor command),
/// clears the flag and returns without enqueuing or asserting IRQ.
/// Otherwise marks the IRQ line pending and enqueues, dropping the byte
/// silently if the queue is already full (§7).
pub fn queue_byte(state: &mut Mpu401State, byte: u8) -> bool {
    if state.flags.block_ack {
        state.flags.block_ack = false;
        return false;
    }
    state.flags.irq_pending = true;
    state.output_queue.push(byte)
}

/// Runs the EOI dispatcher: selects the lowest set bit in `req_mask`,
/// enqueues `0xF0 | bit`, clears that bit, and asserts IRQ.
///
/// Deferred (a no-op) while a sysex-in stream is mid-flight or a
/// record-queue-to-output-queue copy is in progress, since either would
/// race the control byte this produces. Otherwise always clears
/// `irq_pending` first, which is what lets `tick` resume stepping the
/// track counters again after a response it queued earlier.
pub fn run_eoi(state: &mut Mpu401State, irq: &dyn IrqLine) {
    if !state.flags.sysex_in_finished || state.flags.rec_copy {
        return;
    }
    state.flags.send_now = false;
    state.flags.irq_pending = false;

    if state.req_mask == 0 {
        return;
    }
    let bit = state.req_mask.trailing_zeros();
    state.req_mask &= !(1 << bit);
    if queue_byte(state, 0xF0 | bit as u8) {
        irq.assert();
    }
}
