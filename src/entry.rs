//! External entry points a host program drives: one-time context setup and
//! teardown, the worker-fleet priming call, the per-activation worker
//! dispatch, and the error handler.
//!
//! Grounded in `original_source/src/dpa/ldo_context.c`
//! (`ldo_context_setup`/`ldo_context_finalize`/`ldo_error_handler`) and
//! `original_source/src/dpa/ldo_worker.c`
//! (`ldo_dev_worker_setup`/`ldo_dev_worker`).

use log::{error, info};
use thiserror::Error;

use crate::coordinator::Coordinator;
use crate::device::Device;
use crate::window::MemoryWindow;
use crate::worker::{self, WorkerCtx};

/// Errors surfaced by the entry points, as distinct from the per-window
/// `W::Error` a caller already handles at the call site.
#[derive(Debug, Error)]
pub enum EntryError {
    /// A structural invariant the original enforces with
    /// `_Static_assert` did not hold. Since this crate expresses those
    /// layouts with Rust types rather than a flat struct cast from a byte
    /// buffer, this should be unreachable in practice; it is kept so a
    /// caller that hand-builds a [`WorkerCtx`] with mismatched ring depths
    /// fails loudly instead of silently racing.
    #[error("structural invariant violated: {0}")]
    InvariantViolated(&'static str),
}

/// One-time startup check. The original's `_Static_assert`s on struct sizes
/// have no equivalent here (this crate doesn't cast a flat byte buffer into
/// `WorkerCtx`), so this instead checks the ring-depth invariants the rest
/// of the worker relies on: SQ/CQ ring lengths must be powers of two and
/// agree with their masks.
pub fn context_setup<W: MemoryWindow, D: Device>(
    workers: &[WorkerCtx<W, D>],
) -> Result<(), EntryError> {
    for w in workers {
        check_pow2_ring(w.trig.sq_ring.len(), w.trig.sq_mask, "trig.sq_ring")?;
        check_pow2_ring(w.trig.cq_ring.len(), w.trig.cq_mask, "trig.cq_ring")?;
        check_pow2_ring(w.net.cq_ring.len(), w.net.cq_mask, "net.cq_ring")?;
        for peer in &w.net.peers {
            check_pow2_ring(peer.sq_ring.len(), peer.sq_mask, "net.peers[].sq_ring")?;
        }
    }
    info!("DPA worker context initialized ({} worker(s))", workers.len());
    Ok(())
}

fn check_pow2_ring(len: usize, mask: u32, name: &'static str) -> Result<(), EntryError> {
    if len == 0 || (len as u32 - 1) != mask || !len.is_power_of_two() {
        return Err(EntryError::InvariantViolated(name));
    }
    Ok(())
}

/// Log the final value of every remote completion-flag cell. Mirrors
/// `ldo_context_finalize`'s diagnostic dump, run once at teardown.
pub fn context_finalize<W: MemoryWindow, D: Device>(workers: &[WorkerCtx<W, D>]) {
    for (rank, w) in workers.iter().enumerate() {
        for (slot, flag) in w.remote_cmp_flags.iter().enumerate() {
            info!(
                "worker {rank}: remote_cmp_flags[{slot}] = {}",
                flag.load(std::sync::atomic::Ordering::SeqCst)
            );
        }
    }
}

/// Prime every worker: arm its initial host-command watcher, fence, ring
/// its trigger doorbell, and arm its trigger CQ. Run once before any
/// worker thread is scheduled. Mirrors `ldo_dev_worker_setup`.
pub fn worker_setup<W: MemoryWindow, D: Device>(
    workers: &mut [WorkerCtx<W, D>],
) -> Result<(), EntryError> {
    context_setup(workers)?;

    for w in workers.iter_mut() {
        worker::host_cmd::wait_host_cmd(w);
    }
    for w in workers.iter_mut() {
        w.device.memory_writeback();
    }
    for w in workers.iter_mut() {
        w.device.ring_sq_db(w.trig.qpn, w.trig_sq_pi);
        w.device.arm_cq(w.trig_cq.idx(), w.trig.cqn);
    }

    info!("welcome to the DPA worker infrastructure");
    Ok(())
}

/// Run one activation of a single worker thread to completion (activation,
/// progress loop, hangup). Mirrors the body of `ldo_dev_worker`, minus the
/// reschedule call a real accelerator runtime performs after this returns.
pub fn worker<W: MemoryWindow, D: Device>(
    ctx: &mut WorkerCtx<W, D>,
    coordinator: &Coordinator,
    poll_quota_usec: u64,
    clock: quanta::Clock,
) -> Result<(), W::Error> {
    worker::run_once(ctx, coordinator, poll_quota_usec, clock)
}

/// Log a fatal device error. Mirrors `ldo_error_handler`; a real accelerator
/// runtime would reschedule the thread afterward; there is nothing further
/// for this crate to do once the caller regains control.
pub fn error_handler(err: &(dyn std::error::Error + 'static)) {
    error!("DPA error handler invoked: {err}");
}
